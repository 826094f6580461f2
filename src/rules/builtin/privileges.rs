use serde_json::Value;

use crate::rules::context::count_containers;
use crate::rules::{Rule, DEFAULT_KINDS};

pub const PRIVILEGED: Rule = Rule {
    id: "Privileged",
    selector: "containers[] .securityContext .privileged == true",
    reason: "Privileged containers can allow almost completely unrestricted host access",
    link: "",
    kinds: DEFAULT_KINDS,
    points: -30,
    advise: 0,
    predicate: privileged,
};

pub const CAP_SYS_ADMIN: Rule = Rule {
    id: "CapSysAdmin",
    selector: "containers[] .securityContext .capabilities .add == SYS_ADMIN",
    reason: "CAP_SYS_ADMIN is the most privileged capability and should always be avoided",
    link: "",
    kinds: DEFAULT_KINDS,
    points: -30,
    advise: 0,
    predicate: cap_sys_admin,
};

pub const ALLOW_PRIVILEGE_ESCALATION: Rule = Rule {
    id: "AllowPrivilegeEscalation",
    selector: "containers[] .securityContext .allowPrivilegeEscalation == true",
    reason: "Allowing privilege escalation lets a process gain more privileges than its parent process",
    link: "",
    kinds: DEFAULT_KINDS,
    points: -7,
    advise: 0,
    predicate: allow_privilege_escalation,
};

pub const READ_ONLY_ROOT_FILESYSTEM: Rule = Rule {
    id: "ReadOnlyRootFilesystem",
    selector: "containers[] .securityContext .readOnlyRootFilesystem == true",
    reason: "An immutable root filesystem can prevent malicious binaries being added to PATH and increase attack cost",
    link: "",
    kinds: DEFAULT_KINDS,
    points: 1,
    advise: 3,
    predicate: read_only_root_filesystem,
};

pub const CAP_DROP_ANY: Rule = Rule {
    id: "CapDropAny",
    selector: "containers[] .securityContext .capabilities .drop",
    reason: "Reducing kernel capabilities available to a container limits its attack surface",
    link: "",
    kinds: DEFAULT_KINDS,
    points: 1,
    advise: 0,
    predicate: cap_drop_any,
};

pub const CAP_DROP_ALL: Rule = Rule {
    id: "CapDropAll",
    selector: "containers[] .securityContext .capabilities .drop | index(\"ALL\")",
    reason: "Drop all capabilities and add only those required to reduce syscall attack surface",
    link: "",
    kinds: DEFAULT_KINDS,
    points: 1,
    advise: 0,
    predicate: cap_drop_all,
};

fn privileged(document: &Value) -> usize {
    count_containers(document, |c| c.at("securityContext.privileged").is_true())
}

fn cap_sys_admin(document: &Value) -> usize {
    count_containers(document, |c| {
        c.at("securityContext.capabilities.add").contains_str("SYS_ADMIN")
    })
}

fn allow_privilege_escalation(document: &Value) -> usize {
    count_containers(document, |c| {
        c.at("securityContext.allowPrivilegeEscalation").is_true()
    })
}

fn read_only_root_filesystem(document: &Value) -> usize {
    count_containers(document, |c| {
        c.at("securityContext.readOnlyRootFilesystem").is_true()
    })
}

fn cap_drop_any(document: &Value) -> usize {
    count_containers(document, |c| {
        c.at("securityContext.capabilities.drop").count() > 0
    })
}

fn cap_drop_all(document: &Value) -> usize {
    count_containers(document, |c| {
        c.at("securityContext.capabilities.drop")
            .contains_str_ignore_case("ALL")
    })
}
