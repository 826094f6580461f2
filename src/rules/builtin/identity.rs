use serde_json::Value;

use crate::manifest::Node;
use crate::rules::context::{check_security_context, pod_spec, CheckResult};
use crate::rules::{Rule, DEFAULT_KINDS};

/// UIDs and GIDs above this value are unlikely to collide with host users.
const HIGH_ID: i64 = 10000;

pub const RUN_AS_NON_ROOT: Rule = Rule {
    id: "RunAsNonRoot",
    selector: "containers[] .securityContext .runAsNonRoot == true",
    reason: "Force the running image to run as a non-root user to ensure least privilege",
    link: "",
    kinds: DEFAULT_KINDS,
    points: 1,
    advise: 10,
    predicate: run_as_non_root,
};

pub const RUN_AS_USER: Rule = Rule {
    id: "RunAsUser",
    selector: "containers[] .securityContext .runAsUser -gt 10000",
    reason: "Run as a high-UID user to avoid conflicts with the host's user table",
    link: "",
    kinds: DEFAULT_KINDS,
    points: 1,
    advise: 4,
    predicate: run_as_user,
};

pub const RUN_AS_GROUP: Rule = Rule {
    id: "RunAsGroup",
    selector: "containers[] .securityContext .runAsGroup -gt 10000",
    reason: "Run as a high-GID group to avoid conflicts with the host's group table",
    link: "",
    kinds: DEFAULT_KINDS,
    points: 1,
    advise: 0,
    predicate: run_as_group,
};

pub const SERVICE_ACCOUNT_NAME: Rule = Rule {
    id: "ServiceAccountName",
    selector: ".spec .serviceAccountName",
    reason: "Service accounts restrict Kubernetes API access and should be configured with least privilege",
    link: "",
    kinds: DEFAULT_KINDS,
    points: 3,
    advise: 0,
    predicate: service_account_name,
};

pub const AUTOMOUNT_SERVICE_ACCOUNT_TOKEN: Rule = Rule {
    id: "AutomountServiceAccountToken",
    selector: ".spec .automountServiceAccountToken == false",
    reason: "Disabling the automounting of Service Account Token reduces the attack surface of the API server",
    link: "",
    kinds: DEFAULT_KINDS,
    points: 1,
    advise: 0,
    predicate: automount_service_account_token,
};

fn run_as_non_root(document: &Value) -> usize {
    check_security_context(document, true, |ctx: Node<'_>| {
        CheckResult::of(ctx.at("runAsNonRoot").as_bool(), |v| v)
    })
}

fn run_as_user(document: &Value) -> usize {
    check_security_context(document, true, |ctx: Node<'_>| {
        CheckResult::of(ctx.at("runAsUser").as_i64(), |uid| uid > HIGH_ID)
    })
}

fn run_as_group(document: &Value) -> usize {
    check_security_context(document, true, |ctx: Node<'_>| {
        CheckResult::of(ctx.at("runAsGroup").as_i64(), |gid| gid > HIGH_ID)
    })
}

fn service_account_name(document: &Value) -> usize {
    usize::from(pod_spec(document).at("serviceAccountName").has_text())
}

fn automount_service_account_token(document: &Value) -> usize {
    usize::from(pod_spec(document).at("automountServiceAccountToken").is_false())
}
