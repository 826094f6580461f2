//! Seccomp and AppArmor profile rules.
//!
//! Both profiles can be set on the pod or per container through the
//! structured `securityContext` fields. Older manifests use annotations
//! instead; those are honoured wherever the structured field is unset.

use serde_json::Value;

use crate::manifest::Node;
use crate::rules::context::{check_security_context_with, pod_metadata, CheckResult, Scope};
use crate::rules::{Rule, DEFAULT_KINDS};

const UNCONFINED: &str = "Unconfined";
const LEGACY_UNCONFINED: &str = "unconfined";

const SECCOMP_POD_ANNOTATION: &str = "seccomp.security.alpha.kubernetes.io/pod";
const SECCOMP_CONTAINER_ANNOTATION: &str = "container.seccomp.security.alpha.kubernetes.io/";
const APPARMOR_CONTAINER_ANNOTATION: &str = "container.apparmor.security.beta.kubernetes.io/";

pub const SECCOMP_UNCONFINED: Rule = Rule {
    id: "SeccompUnconfined",
    selector: "containers[] .securityContext .seccompProfile .type == Unconfined",
    reason: "Unconfined Seccomp profiles have full system call access",
    link: "https://kubernetes.io/docs/tutorials/security/seccomp/",
    kinds: DEFAULT_KINDS,
    points: -1,
    advise: 0,
    predicate: seccomp_unconfined,
};

pub const SECCOMP_ANY: Rule = Rule {
    id: "SeccompAny",
    selector: "containers[] .securityContext .seccompProfile .type != Unconfined",
    reason: "Seccomp profiles set minimum privilege and secure against unknown threats",
    link: "https://kubernetes.io/docs/tutorials/security/seccomp/",
    kinds: DEFAULT_KINDS,
    points: 1,
    advise: 0,
    predicate: seccomp_any,
};

pub const APPARMOR_ANY: Rule = Rule {
    id: "ApparmorAny",
    selector: "containers[] .securityContext .appArmorProfile .type != Unconfined",
    reason: "Well defined AppArmor policies may provide greater protection from unknown threats",
    link: "https://kubernetes.io/docs/tutorials/security/apparmor/",
    kinds: DEFAULT_KINDS,
    points: 3,
    advise: 0,
    predicate: apparmor_any,
};

/// Look up an annotation on the pod metadata, then on the object itself.
fn annotation<'a>(document: &'a Value, key: &str) -> Option<&'a str> {
    [pod_metadata(document), Node::new(document).at("metadata")]
        .into_iter()
        .find_map(|meta| {
            meta.at("annotations")
                .string_entries()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v)
        })
}

fn profile_type(context: Node<'_>, field: &str, unconfined: bool) -> CheckResult {
    CheckResult::of(context.at(field).as_str(), |t| (t == UNCONFINED) == unconfined)
}

// An empty annotation value names no profile.
fn legacy_profile(value: Option<&str>, unconfined: bool) -> CheckResult {
    let value = value.filter(|v| !v.is_empty());
    CheckResult::of(value, |v| (v == LEGACY_UNCONFINED) == unconfined)
}

fn seccomp(document: &Value, unconfined: bool) -> usize {
    check_security_context_with(
        document,
        true,
        |ctx| profile_type(ctx, "seccompProfile.type", unconfined),
        |scope| match scope {
            Scope::Pod => legacy_profile(annotation(document, SECCOMP_POD_ANNOTATION), unconfined),
            Scope::Container(name) => legacy_profile(
                annotation(document, &format!("{SECCOMP_CONTAINER_ANNOTATION}{name}")),
                unconfined,
            ),
        },
    )
}

fn seccomp_unconfined(document: &Value) -> usize {
    seccomp(document, true)
}

fn seccomp_any(document: &Value) -> usize {
    seccomp(document, false)
}

fn apparmor_any(document: &Value) -> usize {
    check_security_context_with(
        document,
        true,
        |ctx| profile_type(ctx, "appArmorProfile.type", false),
        |scope| match scope {
            // AppArmor annotations were only ever per container
            Scope::Pod => CheckResult::UNSET,
            Scope::Container(name) => legacy_profile(
                annotation(document, &format!("{APPARMOR_CONTAINER_ANNOTATION}{name}")),
                false,
            ),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::builtin::tests::parse;

    const MISSING: &str = r#"
kind: Pod
spec:
  containers:
    - name: trustworthy-container
      image: sotrustworthy:latest
"#;

    fn pod_level(field: &str, kind: &str) -> String {
        format!(
            r#"
kind: Pod
spec:
  securityContext:
    {field}:
      type: {kind}
  containers:
    - name: trustworthy-container
      image: sotrustworthy:latest
"#
        )
    }

    fn init_level(field: &str, kind: &str) -> String {
        format!(
            r#"
kind: Pod
spec:
  initContainers:
    - name: trustworthy-initcontainer
      image: sotrustworthy:latest
      securityContext:
        {field}:
          type: {kind}
"#
        )
    }

    #[test]
    fn seccomp_missing_matches_neither() {
        let doc = parse(MISSING);
        assert_eq!(seccomp_any(&doc), 0);
        assert_eq!(seccomp_unconfined(&doc), 0);
    }

    #[test]
    fn seccomp_pod_level_profiles() {
        for (kind, any, unconfined) in [("RuntimeDefault", 1, 0), ("Localhost", 1, 0), ("Unconfined", 0, 1)] {
            let doc = parse(&pod_level("seccompProfile", kind));
            assert_eq!(seccomp_any(&doc), any, "{kind}");
            assert_eq!(seccomp_unconfined(&doc), unconfined, "{kind}");
        }
    }

    #[test]
    fn seccomp_init_container_profiles() {
        let doc = parse(&init_level("seccompProfile", "Unconfined"));
        assert_eq!(seccomp_unconfined(&doc), 1);
        let doc = parse(&init_level("seccompProfile", "RuntimeDefault"));
        assert_eq!(seccomp_any(&doc), 1);
    }

    #[test]
    fn container_profile_overrides_pod_profile() {
        let doc = parse(
            r#"
kind: Deployment
spec:
  template:
    spec:
      securityContext:
        seccompProfile:
          type: RuntimeDefault
      containers:
        - name: a
        - name: b
          securityContext:
            seccompProfile:
              type: Unconfined
"#,
        );
        assert_eq!(seccomp_any(&doc), 1);
        assert_eq!(seccomp_unconfined(&doc), 1);
    }

    #[test]
    fn legacy_seccomp_pod_annotation() {
        let doc = parse(
            r#"
kind: Pod
metadata:
  annotations:
    seccomp.security.alpha.kubernetes.io/pod: runtime/default
spec:
  containers:
    - name: a
    - name: b
"#,
        );
        assert_eq!(seccomp_any(&doc), 2);
        assert_eq!(seccomp_unconfined(&doc), 0);
    }

    #[test]
    fn legacy_seccomp_container_annotation_on_template() {
        let doc = parse(
            r#"
kind: Deployment
spec:
  template:
    metadata:
      annotations:
        container.seccomp.security.alpha.kubernetes.io/a: unconfined
    spec:
      containers:
        - name: a
        - name: b
"#,
        );
        assert_eq!(seccomp_unconfined(&doc), 1);
        assert_eq!(seccomp_any(&doc), 0);
    }

    #[test]
    fn apparmor_profiles() {
        assert_eq!(apparmor_any(&parse(MISSING)), 0);
        assert_eq!(apparmor_any(&parse(&pod_level("appArmorProfile", "RuntimeDefault"))), 1);
        assert_eq!(apparmor_any(&parse(&pod_level("appArmorProfile", "Unconfined"))), 0);
        assert_eq!(apparmor_any(&parse(&pod_level("appArmorProfile", "LocalHost"))), 1);
        assert_eq!(apparmor_any(&parse(&init_level("appArmorProfile", "RuntimeDefault"))), 1);
    }

    #[test]
    fn legacy_apparmor_annotation_per_container() {
        let doc = parse(
            r#"
kind: Pod
metadata:
  annotations:
    container.apparmor.security.beta.kubernetes.io/nginx: runtime/default
    container.apparmor.security.beta.kubernetes.io/debug: unconfined
spec:
  containers:
    - name: nginx
    - name: debug
    - name: other
"#,
        );
        assert_eq!(apparmor_any(&doc), 1);
    }

    #[test]
    fn empty_legacy_annotations_are_unset() {
        let doc = parse(
            r#"
kind: Pod
metadata:
  annotations:
    seccomp.security.alpha.kubernetes.io/pod: ""
    container.apparmor.security.beta.kubernetes.io/app: ""
spec:
  containers:
    - name: app
"#,
        );
        assert_eq!(apparmor_any(&doc), 0);
        assert_eq!(seccomp_any(&doc), 0);
        assert_eq!(seccomp_unconfined(&doc), 0);
    }
}
