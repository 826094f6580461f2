use k8s_openapi::api::core::v1::{PodSpec, SELinuxOptions};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::{containers, join_quote, pluralize, subject, CheckResult, PodCheck};
use crate::pss::api::{Level, Version};

const V1_0: Version = Version::new(1, 0);

pub(super) fn checks() -> Vec<Box<dyn PodCheck>> {
    vec![
        Box::new(HostNamespaces),
        Box::new(Privileged),
        Box::new(CapabilitiesBaseline),
        Box::new(HostPathVolumes),
        Box::new(HostPorts),
        Box::new(AppArmorProfile),
        Box::new(SeLinux),
        Box::new(ProcMount),
        Box::new(SeccompProfileBaseline),
        Box::new(Sysctls),
        Box::new(WindowsHostProcess),
    ]
}

/// Pods must not share the host's network, PID or IPC namespaces.
pub struct HostNamespaces;

impl PodCheck for HostNamespaces {
    fn id(&self) -> &'static str {
        "hostNamespaces"
    }

    fn level(&self) -> Level {
        Level::Baseline
    }

    fn min_version(&self) -> Version {
        V1_0
    }

    fn check(&self, _: Version, _: &ObjectMeta, spec: &PodSpec) -> CheckResult {
        let shared: Vec<&str> = [
            (spec.host_network, "hostNetwork=true"),
            (spec.host_pid, "hostPID=true"),
            (spec.host_ipc, "hostIPC=true"),
        ]
        .into_iter()
        .filter(|(flag, _)| *flag == Some(true))
        .map(|(_, detail)| detail)
        .collect();

        if shared.is_empty() {
            CheckResult::allowed()
        } else {
            CheckResult::forbidden("host namespaces", shared.join(", "))
        }
    }
}

pub struct Privileged;

impl PodCheck for Privileged {
    fn id(&self) -> &'static str {
        "privileged"
    }

    fn level(&self) -> Level {
        Level::Baseline
    }

    fn min_version(&self) -> Version {
        V1_0
    }

    fn check(&self, _: Version, _: &ObjectMeta, spec: &PodSpec) -> CheckResult {
        let names: Vec<&str> = containers(spec)
            .filter(|c| c.security_context.and_then(|sc| sc.privileged) == Some(true))
            .map(|c| c.name)
            .collect();
        if names.is_empty() {
            return CheckResult::allowed();
        }
        CheckResult::forbidden(
            "privileged",
            format!(
                "{} must not set securityContext.privileged=true",
                subject("container", "containers", &names)
            ),
        )
    }
}

const BASELINE_CAPABILITIES: &[&str] = &[
    "AUDIT_WRITE",
    "CHOWN",
    "DAC_OVERRIDE",
    "FOWNER",
    "FSETID",
    "KILL",
    "MKNOD",
    "NET_BIND_SERVICE",
    "SETFCAP",
    "SETGID",
    "SETPCAP",
    "SETUID",
    "SYS_CHROOT",
];

/// Only the container runtime's default capabilities may be added.
pub struct CapabilitiesBaseline;

impl PodCheck for CapabilitiesBaseline {
    fn id(&self) -> &'static str {
        "capabilities_baseline"
    }

    fn level(&self) -> Level {
        Level::Baseline
    }

    fn min_version(&self) -> Version {
        V1_0
    }

    fn check(&self, _: Version, _: &ObjectMeta, spec: &PodSpec) -> CheckResult {
        let mut names: Vec<&str> = Vec::new();
        let mut capabilities: Vec<&str> = Vec::new();

        for container in containers(spec) {
            let added = container
                .security_context
                .and_then(|sc| sc.capabilities.as_ref())
                .and_then(|caps| caps.add.as_deref())
                .unwrap_or_default();
            let forbidden: Vec<&str> = added
                .iter()
                .map(String::as_str)
                .filter(|cap| !BASELINE_CAPABILITIES.contains(cap))
                .collect();
            if forbidden.is_empty() {
                continue;
            }
            names.push(container.name);
            for cap in forbidden {
                if !capabilities.contains(&cap) {
                    capabilities.push(cap);
                }
            }
        }

        if names.is_empty() {
            return CheckResult::allowed();
        }
        CheckResult::forbidden(
            "non-default capabilities",
            format!(
                "{} must not include {} in securityContext.capabilities.add",
                subject("container", "containers", &names),
                join_quote(&capabilities)
            ),
        )
    }
}

pub struct HostPathVolumes;

impl PodCheck for HostPathVolumes {
    fn id(&self) -> &'static str {
        "hostPathVolumes"
    }

    fn level(&self) -> Level {
        Level::Baseline
    }

    fn min_version(&self) -> Version {
        V1_0
    }

    fn check(&self, _: Version, _: &ObjectMeta, spec: &PodSpec) -> CheckResult {
        let names: Vec<&str> = spec
            .volumes
            .iter()
            .flatten()
            .filter(|v| v.host_path.is_some())
            .map(|v| v.name.as_str())
            .collect();
        if names.is_empty() {
            return CheckResult::allowed();
        }
        CheckResult::forbidden(
            "hostPath volumes",
            format!(
                "{} {} hostPath",
                subject("volume", "volumes", &names),
                pluralize("uses", "use", names.len())
            ),
        )
    }
}

pub struct HostPorts;

impl PodCheck for HostPorts {
    fn id(&self) -> &'static str {
        "hostPorts"
    }

    fn level(&self) -> Level {
        Level::Baseline
    }

    fn min_version(&self) -> Version {
        V1_0
    }

    fn check(&self, _: Version, _: &ObjectMeta, spec: &PodSpec) -> CheckResult {
        let mut names: Vec<&str> = Vec::new();
        let mut ports: Vec<String> = Vec::new();

        for container in containers(spec) {
            let used: Vec<i32> = container
                .ports
                .iter()
                .filter_map(|p| p.host_port)
                .filter(|port| *port != 0)
                .collect();
            if used.is_empty() {
                continue;
            }
            names.push(container.name);
            ports.extend(used.iter().map(i32::to_string));
        }

        if names.is_empty() {
            return CheckResult::allowed();
        }
        CheckResult::forbidden(
            "hostPort",
            format!(
                "{} {} {} {}",
                subject("container", "containers", &names),
                pluralize("uses", "use", names.len()),
                pluralize("hostPort", "hostPorts", ports.len()),
                ports.join(", ")
            ),
        )
    }
}

const APPARMOR_ANNOTATION_PREFIX: &str = "container.apparmor.security.beta.kubernetes.io/";

fn allowed_apparmor_annotation(value: &str) -> bool {
    value == "runtime/default" || value.starts_with("localhost/")
}

fn allowed_apparmor_type(profile_type: &str) -> bool {
    matches!(profile_type, "RuntimeDefault" | "Localhost")
}

/// AppArmor may be left at the runtime default or set to a local profile,
/// never disabled.
pub struct AppArmorProfile;

impl PodCheck for AppArmorProfile {
    fn id(&self) -> &'static str {
        "appArmorProfile"
    }

    fn level(&self) -> Level {
        Level::Baseline
    }

    fn min_version(&self) -> Version {
        V1_0
    }

    fn check(&self, _: Version, meta: &ObjectMeta, spec: &PodSpec) -> CheckResult {
        let mut bad: Vec<String> = Vec::new();

        for (key, value) in meta.annotations.iter().flatten() {
            if key.starts_with(APPARMOR_ANNOTATION_PREFIX) && !allowed_apparmor_annotation(value) {
                bad.push(format!("{key}={value:?}"));
            }
        }

        let pod_type = spec
            .security_context
            .as_ref()
            .and_then(|sc| sc.app_armor_profile.as_ref())
            .map(|p| p.type_.as_str());
        if let Some(profile_type) = pod_type.filter(|t| !allowed_apparmor_type(t)) {
            bad.push(format!("pod must not set securityContext.appArmorProfile.type to {profile_type:?}"));
        }

        let names: Vec<&str> = containers(spec)
            .filter(|c| {
                c.security_context
                    .and_then(|sc| sc.app_armor_profile.as_ref())
                    .is_some_and(|p| !allowed_apparmor_type(&p.type_))
            })
            .map(|c| c.name)
            .collect();
        if !names.is_empty() {
            bad.push(format!(
                "{} must not set securityContext.appArmorProfile.type to \"Unconfined\"",
                subject("container", "containers", &names)
            ));
        }

        if bad.is_empty() {
            return CheckResult::allowed();
        }
        CheckResult::forbidden(
            pluralize("forbidden AppArmor profile", "forbidden AppArmor profiles", bad.len()),
            bad.join(", "),
        )
    }
}

const SELINUX_TYPES: &[&str] = &["container_t", "container_init_t", "container_kvm_t"];
const SELINUX_ENGINE_TYPE: &str = "container_engine_t";

/// SELinux may only be narrowed to the standard container types.
pub struct SeLinux;

impl PodCheck for SeLinux {
    fn id(&self) -> &'static str {
        "seLinuxOptions"
    }

    fn level(&self) -> Level {
        Level::Baseline
    }

    fn min_version(&self) -> Version {
        V1_0
    }

    fn check(&self, version: Version, _: &ObjectMeta, spec: &PodSpec) -> CheckResult {
        let allowed_type = |t: &str| {
            t.is_empty()
                || SELINUX_TYPES.contains(&t)
                || (t == SELINUX_ENGINE_TYPE && version.at_least(Version::new(1, 31)))
        };

        let mut bad_types: Vec<String> = Vec::new();
        let mut set_user = false;
        let mut set_role = false;
        let mut inspect = |options: &SELinuxOptions| -> bool {
            let mut bad = false;
            if let Some(t) = options.type_.as_deref().filter(|t| !allowed_type(*t)) {
                if !bad_types.iter().any(|b| b == t) {
                    bad_types.push(t.to_string());
                }
                bad = true;
            }
            if options.user.as_deref().is_some_and(|u| !u.is_empty()) {
                set_user = true;
                bad = true;
            }
            if options.role.as_deref().is_some_and(|r| !r.is_empty()) {
                set_role = true;
                bad = true;
            }
            bad
        };

        let pod_bad = spec
            .security_context
            .as_ref()
            .and_then(|sc| sc.se_linux_options.as_ref())
            .is_some_and(&mut inspect);
        let names: Vec<&str> = containers(spec)
            .filter(|c| {
                c.security_context
                    .and_then(|sc| sc.se_linux_options.as_ref())
                    .is_some_and(&mut inspect)
            })
            .map(|c| c.name)
            .collect();

        if !pod_bad && names.is_empty() {
            return CheckResult::allowed();
        }

        let mut issues = Vec::new();
        if !bad_types.is_empty() {
            issues.push(format!(
                "{} {}",
                pluralize("type", "types", bad_types.len()),
                join_quote(&bad_types)
            ));
        }
        if set_user {
            issues.push("user may not be set".to_string());
        }
        if set_role {
            issues.push("role may not be set".to_string());
        }

        let who = match (pod_bad, names.is_empty()) {
            (true, true) => "pod".to_string(),
            (true, false) => format!("pod and {}", subject("container", "containers", &names)),
            _ => subject("container", "containers", &names),
        };
        CheckResult::forbidden(
            "seLinuxOptions",
            format!("{who} set forbidden securityContext.seLinuxOptions: {}", issues.join("; ")),
        )
    }
}

pub struct ProcMount;

impl PodCheck for ProcMount {
    fn id(&self) -> &'static str {
        "procMount"
    }

    fn level(&self) -> Level {
        Level::Baseline
    }

    fn min_version(&self) -> Version {
        V1_0
    }

    fn check(&self, _: Version, _: &ObjectMeta, spec: &PodSpec) -> CheckResult {
        let mut names: Vec<&str> = Vec::new();
        let mut mounts: Vec<&str> = Vec::new();
        for container in containers(spec) {
            let Some(mount) = container
                .security_context
                .and_then(|sc| sc.proc_mount.as_deref())
                .filter(|m| *m != "Default")
            else {
                continue;
            };
            names.push(container.name);
            if !mounts.contains(&mount) {
                mounts.push(mount);
            }
        }

        if names.is_empty() {
            return CheckResult::allowed();
        }
        CheckResult::forbidden(
            "procMount",
            format!(
                "{} must not set securityContext.procMount to {}",
                subject("container", "containers", &names),
                join_quote(&mounts)
            ),
        )
    }
}

/// Seccomp may not be explicitly disabled.
pub struct SeccompProfileBaseline;

impl PodCheck for SeccompProfileBaseline {
    fn id(&self) -> &'static str {
        "seccompProfile_baseline"
    }

    fn level(&self) -> Level {
        Level::Baseline
    }

    fn min_version(&self) -> Version {
        Version::new(1, 19)
    }

    fn check(&self, _: Version, _: &ObjectMeta, spec: &PodSpec) -> CheckResult {
        let unconfined = |t: &str| t == "Unconfined";
        let mut bad = Vec::new();

        if spec
            .security_context
            .as_ref()
            .and_then(|sc| sc.seccomp_profile.as_ref())
            .is_some_and(|p| unconfined(p.type_.as_str()))
        {
            bad.push("pod must not set securityContext.seccompProfile.type to \"Unconfined\"".to_string());
        }

        let names: Vec<&str> = containers(spec)
            .filter(|c| {
                c.security_context
                    .and_then(|sc| sc.seccomp_profile.as_ref())
                    .is_some_and(|p| unconfined(p.type_.as_str()))
            })
            .map(|c| c.name)
            .collect();
        if !names.is_empty() {
            bad.push(format!(
                "{} must not set securityContext.seccompProfile.type to \"Unconfined\"",
                subject("container", "containers", &names)
            ));
        }

        if bad.is_empty() {
            return CheckResult::allowed();
        }
        CheckResult::forbidden("seccompProfile", bad.join("; "))
    }
}

fn safe_sysctls(version: Version) -> Vec<&'static str> {
    let mut safe = vec![
        "kernel.shm_rmid_forced",
        "net.ipv4.ip_local_port_range",
        "net.ipv4.tcp_syncookies",
        "net.ipv4.ping_group_range",
        "net.ipv4.ip_unprivileged_port_start",
    ];
    if version.at_least(Version::new(1, 27)) {
        safe.push("net.ipv4.ip_local_reserved_ports");
    }
    if version.at_least(Version::new(1, 29)) {
        safe.extend([
            "net.ipv4.tcp_keepalive_time",
            "net.ipv4.tcp_fin_timeout",
            "net.ipv4.tcp_keepalive_intvl",
            "net.ipv4.tcp_keepalive_probes",
        ]);
    }
    if version.at_least(Version::new(1, 32)) {
        safe.extend(["net.ipv4.tcp_rmem", "net.ipv4.tcp_wmem"]);
    }
    safe
}

/// Only namespaced sysctls known to be safe may be set.
pub struct Sysctls;

impl PodCheck for Sysctls {
    fn id(&self) -> &'static str {
        "sysctls"
    }

    fn level(&self) -> Level {
        Level::Baseline
    }

    fn min_version(&self) -> Version {
        V1_0
    }

    fn check(&self, version: Version, _: &ObjectMeta, spec: &PodSpec) -> CheckResult {
        let safe = safe_sysctls(version);
        let forbidden: Vec<&str> = spec
            .security_context
            .as_ref()
            .and_then(|sc| sc.sysctls.as_deref())
            .unwrap_or_default()
            .iter()
            .map(|s| s.name.as_str())
            .filter(|name| !safe.contains(name))
            .collect();

        if forbidden.is_empty() {
            return CheckResult::allowed();
        }
        CheckResult::forbidden("forbidden sysctls", forbidden.join(", "))
    }
}

pub struct WindowsHostProcess;

impl PodCheck for WindowsHostProcess {
    fn id(&self) -> &'static str {
        "windowsHostProcess"
    }

    fn level(&self) -> Level {
        Level::Baseline
    }

    fn min_version(&self) -> Version {
        V1_0
    }

    fn check(&self, _: Version, _: &ObjectMeta, spec: &PodSpec) -> CheckResult {
        let pod = spec
            .security_context
            .as_ref()
            .and_then(|sc| sc.windows_options.as_ref())
            .and_then(|w| w.host_process)
            == Some(true);
        let names: Vec<&str> = containers(spec)
            .filter(|c| {
                c.security_context
                    .and_then(|sc| sc.windows_options.as_ref())
                    .and_then(|w| w.host_process)
                    == Some(true)
            })
            .map(|c| c.name)
            .collect();

        let who = match (pod, names.is_empty()) {
            (false, true) => return CheckResult::allowed(),
            (true, true) => "pod".to_string(),
            (true, false) => format!("pod and {}", subject("container", "containers", &names)),
            (false, false) => subject("container", "containers", &names),
        };
        CheckResult::forbidden(
            "hostProcess",
            format!("{who} must not set securityContext.windowsOptions.hostProcess=true"),
        )
    }
}
