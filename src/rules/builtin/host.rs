use serde_json::Value;

use crate::rules::context::pod_spec;
use crate::rules::{Rule, DEFAULT_KINDS};

pub const HOST_NETWORK: Rule = Rule {
    id: "HostNetwork",
    selector: ".spec .hostNetwork == true",
    reason: "Sharing the host's network namespace permits processes in the pod to communicate with processes bound to the host's loopback adapter",
    link: "",
    kinds: DEFAULT_KINDS,
    points: -9,
    advise: 0,
    predicate: host_network,
};

pub const HOST_PID: Rule = Rule {
    id: "HostPID",
    selector: ".spec .hostPID == true",
    reason: "Sharing the host's PID namespace allows visibility of processes on the host, potentially leaking information such as environment variables and configuration",
    link: "",
    kinds: DEFAULT_KINDS,
    points: -9,
    advise: 0,
    predicate: host_pid,
};

pub const HOST_IPC: Rule = Rule {
    id: "HostIPC",
    selector: ".spec .hostIPC == true",
    reason: "Sharing the host's IPC namespace allows container processes to communicate with processes on the host",
    link: "",
    kinds: DEFAULT_KINDS,
    points: -9,
    advise: 0,
    predicate: host_ipc,
};

pub const HOST_ALIASES: Rule = Rule {
    id: "HostAliases",
    selector: ".spec .hostAliases",
    reason: "Managing /etc/hosts aliases can prevent the container engine from modifying the file after a pod's containers have already been started",
    link: "",
    kinds: DEFAULT_KINDS,
    points: -3,
    advise: 0,
    predicate: host_aliases,
};

pub const HOST_USERS: Rule = Rule {
    id: "HostUsers",
    selector: ".spec .hostUsers == false",
    reason: "Running the pod in its own user namespace limits the impact of a container breakout",
    link: "https://kubernetes.io/docs/concepts/workloads/pods/user-namespaces/",
    kinds: DEFAULT_KINDS,
    points: 1,
    advise: 0,
    predicate: host_users,
};

fn flag(document: &Value, field: &str, expected: bool) -> usize {
    usize::from(pod_spec(document).at(field).as_bool() == Some(expected))
}

fn host_network(document: &Value) -> usize {
    flag(document, "hostNetwork", true)
}

fn host_pid(document: &Value) -> usize {
    flag(document, "hostPID", true)
}

fn host_ipc(document: &Value) -> usize {
    flag(document, "hostIPC", true)
}

fn host_aliases(document: &Value) -> usize {
    usize::from(pod_spec(document).at("hostAliases").count() > 0)
}

// Absent means the pod shares the host's user namespace.
fn host_users(document: &Value) -> usize {
    flag(document, "hostUsers", false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::builtin::tests::parse;

    #[test]
    fn host_namespaces_count_once_per_pod_spec() {
        let doc = parse(
            r#"
kind: Deployment
spec:
  template:
    spec:
      hostNetwork: true
      hostPID: true
      hostIPC: false
      containers:
        - name: a
        - name: b
"#,
        );
        assert_eq!(host_network(&doc), 1);
        assert_eq!(host_pid(&doc), 1);
        assert_eq!(host_ipc(&doc), 0);
    }

    #[test]
    fn host_ipc_matches_explicit_true() {
        let doc = parse(
            r#"
kind: DaemonSet
spec:
  template:
    spec:
      hostIPC: true
      containers:
        - name: agent
"#,
        );
        assert_eq!(host_ipc(&doc), 1);
        assert_eq!(host_network(&doc), 0);
        assert_eq!(host_ipc(&parse("kind: Pod\nspec: {}\n")), 0);
    }

    #[test]
    fn bare_pod_reads_spec_directly() {
        let doc = parse(
            r#"
kind: Pod
spec:
  hostNetwork: true
"#,
        );
        assert_eq!(host_network(&doc), 1);
    }

    #[test]
    fn non_boolean_host_network_does_not_match() {
        let doc = parse(
            r#"
kind: Pod
spec:
  hostNetwork: "true"
"#,
        );
        assert_eq!(host_network(&doc), 0);
    }

    #[test]
    fn host_aliases_need_entries() {
        let with = parse(
            r#"
kind: Pod
spec:
  hostAliases:
    - ip: "127.0.0.1"
      hostnames: ["foo.local"]
"#,
        );
        let empty = parse("kind: Pod\nspec:\n  hostAliases: []\n");
        let absent = parse("kind: Pod\nspec: {}\n");
        assert_eq!(host_aliases(&with), 1);
        assert_eq!(host_aliases(&empty), 0);
        assert_eq!(host_aliases(&absent), 0);
    }

    #[test]
    fn host_users_only_matches_explicit_false() {
        assert_eq!(host_users(&parse("kind: Pod\nspec:\n  hostUsers: false\n")), 1);
        assert_eq!(host_users(&parse("kind: Pod\nspec:\n  hostUsers: true\n")), 0);
        assert_eq!(host_users(&parse("kind: Pod\nspec: {}\n")), 0);
        assert_eq!(host_users(&parse("kind: Pod\nspec:\n  hostUsers: \"false\"\n")), 0);
    }
}
