use k8s_openapi::api::core::v1::PodSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::{containers, join_quote, pluralize, subject, CheckResult, PodCheck};
use crate::pss::api::{Level, Version};

pub(super) fn checks() -> Vec<Box<dyn PodCheck>> {
    vec![
        Box::new(RestrictedVolumes),
        Box::new(AllowPrivilegeEscalation),
        Box::new(RunAsNonRoot),
        Box::new(RunAsUser),
        Box::new(SeccompProfileRestricted),
        Box::new(CapabilitiesRestricted),
    ]
}

const ALLOWED_VOLUME_SOURCES: &[&str] = &[
    "configMap",
    "csi",
    "downwardAPI",
    "emptyDir",
    "ephemeral",
    "persistentVolumeClaim",
    "projected",
    "secret",
];

/// Volumes are limited to non-host, non-network sources.
pub struct RestrictedVolumes;

impl PodCheck for RestrictedVolumes {
    fn id(&self) -> &'static str {
        "restrictedVolumes"
    }

    fn level(&self) -> Level {
        Level::Restricted
    }

    fn min_version(&self) -> Version {
        Version::new(1, 0)
    }

    fn check(&self, _: Version, _: &ObjectMeta, spec: &PodSpec) -> CheckResult {
        let mut names: Vec<&str> = Vec::new();
        let mut types: Vec<String> = Vec::new();

        for volume in spec.volumes.iter().flatten() {
            // the serialized form names exactly the populated source
            let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(volume) else {
                continue;
            };
            let restricted: Vec<&String> = fields
                .keys()
                .filter(|k| k.as_str() != "name" && !ALLOWED_VOLUME_SOURCES.contains(&k.as_str()))
                .collect();
            if restricted.is_empty() {
                continue;
            }
            names.push(&volume.name);
            for source in restricted {
                if !types.contains(source) {
                    types.push(source.clone());
                }
            }
        }

        if names.is_empty() {
            return CheckResult::allowed();
        }
        CheckResult::forbidden(
            "restricted volume types",
            format!(
                "{} {} restricted volume {} {}",
                subject("volume", "volumes", &names),
                pluralize("uses", "use", names.len()),
                pluralize("type", "types", types.len()),
                join_quote(&types)
            ),
        )
    }
}

pub struct AllowPrivilegeEscalation;

impl PodCheck for AllowPrivilegeEscalation {
    fn id(&self) -> &'static str {
        "allowPrivilegeEscalation"
    }

    fn level(&self) -> Level {
        Level::Restricted
    }

    fn min_version(&self) -> Version {
        Version::new(1, 8)
    }

    fn linux_only(&self) -> bool {
        true
    }

    fn check(&self, _: Version, _: &ObjectMeta, spec: &PodSpec) -> CheckResult {
        let names: Vec<&str> = containers(spec)
            .filter(|c| c.security_context.and_then(|sc| sc.allow_privilege_escalation) != Some(false))
            .map(|c| c.name)
            .collect();
        if names.is_empty() {
            return CheckResult::allowed();
        }
        CheckResult::forbidden(
            "allowPrivilegeEscalation != false",
            format!(
                "{} must set securityContext.allowPrivilegeEscalation=false",
                subject("container", "containers", &names)
            ),
        )
    }
}

/// Containers must run as non-root, either directly or through the pod
/// default. An explicit `false` anywhere is a violation.
pub struct RunAsNonRoot;

impl PodCheck for RunAsNonRoot {
    fn id(&self) -> &'static str {
        "runAsNonRoot"
    }

    fn level(&self) -> Level {
        Level::Restricted
    }

    fn min_version(&self) -> Version {
        Version::new(1, 0)
    }

    fn check(&self, _: Version, _: &ObjectMeta, spec: &PodSpec) -> CheckResult {
        let pod_setting = spec.security_context.as_ref().and_then(|sc| sc.run_as_non_root);
        let pod_explicitly_bad = pod_setting == Some(false);
        let pod_run_as_non_root = pod_setting == Some(true);

        let mut explicitly_bad: Vec<&str> = Vec::new();
        let mut implicitly_bad: Vec<&str> = Vec::new();
        for container in containers(spec) {
            match container.security_context.and_then(|sc| sc.run_as_non_root) {
                Some(false) => explicitly_bad.push(container.name),
                Some(true) => {}
                None if !pod_run_as_non_root => implicitly_bad.push(container.name),
                None => {}
            }
        }

        let mut details = Vec::new();
        if pod_explicitly_bad {
            details.push("pod must not set securityContext.runAsNonRoot=false".to_string());
        }
        if !explicitly_bad.is_empty() {
            details.push(format!(
                "{} must not set securityContext.runAsNonRoot=false",
                subject("container", "containers", &explicitly_bad)
            ));
        }
        if !implicitly_bad.is_empty() {
            details.push(format!(
                "pod or {} must set securityContext.runAsNonRoot=true",
                subject("container", "containers", &implicitly_bad)
            ));
        }

        if details.is_empty() {
            return CheckResult::allowed();
        }
        CheckResult::forbidden("runAsNonRoot != true", details.join("; "))
    }
}

pub struct RunAsUser;

impl PodCheck for RunAsUser {
    fn id(&self) -> &'static str {
        "runAsUser"
    }

    fn level(&self) -> Level {
        Level::Restricted
    }

    fn min_version(&self) -> Version {
        Version::new(1, 23)
    }

    fn check(&self, _: Version, _: &ObjectMeta, spec: &PodSpec) -> CheckResult {
        let pod_root = spec.security_context.as_ref().and_then(|sc| sc.run_as_user) == Some(0);
        let names: Vec<&str> = containers(spec)
            .filter(|c| c.security_context.and_then(|sc| sc.run_as_user) == Some(0))
            .map(|c| c.name)
            .collect();

        let mut details = Vec::new();
        if pod_root {
            details.push("pod must not set runAsUser=0".to_string());
        }
        if !names.is_empty() {
            details.push(format!(
                "{} must not set runAsUser=0",
                subject("container", "containers", &names)
            ));
        }

        if details.is_empty() {
            return CheckResult::allowed();
        }
        CheckResult::forbidden("runAsUser=0", details.join("; "))
    }
}

fn valid_seccomp_type(profile_type: &str) -> bool {
    matches!(profile_type, "RuntimeDefault" | "Localhost")
}

/// Seccomp must be set to the runtime default or a local profile, at pod
/// level or on every container.
pub struct SeccompProfileRestricted;

impl PodCheck for SeccompProfileRestricted {
    fn id(&self) -> &'static str {
        "seccompProfile_restricted"
    }

    fn level(&self) -> Level {
        Level::Restricted
    }

    fn min_version(&self) -> Version {
        Version::new(1, 19)
    }

    fn overrides(&self) -> &'static [&'static str] {
        &["seccompProfile_baseline"]
    }

    fn linux_only(&self) -> bool {
        true
    }

    fn check(&self, _: Version, _: &ObjectMeta, spec: &PodSpec) -> CheckResult {
        let pod_type = spec
            .security_context
            .as_ref()
            .and_then(|sc| sc.seccomp_profile.as_ref())
            .map(|p| p.type_.as_str());
        let pod_valid = pod_type.is_some_and(valid_seccomp_type);

        let mut explicitly_bad: Vec<&str> = Vec::new();
        let mut bad_types: Vec<&str> = Vec::new();
        let mut implicitly_bad: Vec<&str> = Vec::new();
        for container in containers(spec) {
            let container_type = container
                .security_context
                .and_then(|sc| sc.seccomp_profile.as_ref())
                .map(|p| p.type_.as_str());
            match container_type {
                Some(t) if valid_seccomp_type(t) => {}
                Some(t) => {
                    explicitly_bad.push(container.name);
                    if !bad_types.contains(&t) {
                        bad_types.push(t);
                    }
                }
                None if !pod_valid => implicitly_bad.push(container.name),
                None => {}
            }
        }

        let mut details = Vec::new();
        if let Some(t) = pod_type.filter(|t| !valid_seccomp_type(t)) {
            details.push(format!("pod must not set securityContext.seccompProfile.type to {t:?}"));
        }
        if !explicitly_bad.is_empty() {
            details.push(format!(
                "{} must not set securityContext.seccompProfile.type to {}",
                subject("container", "containers", &explicitly_bad),
                join_quote(&bad_types)
            ));
        }
        if !implicitly_bad.is_empty() {
            details.push(format!(
                "pod or {} must set securityContext.seccompProfile.type to \"RuntimeDefault\" or \"Localhost\"",
                subject("container", "containers", &implicitly_bad)
            ));
        }

        if details.is_empty() {
            return CheckResult::allowed();
        }
        CheckResult::forbidden("seccompProfile", details.join("; "))
    }
}

const RESTRICTED_ADDABLE: &str = "NET_BIND_SERVICE";

/// Every container drops ALL capabilities and adds back at most
/// NET_BIND_SERVICE.
pub struct CapabilitiesRestricted;

impl PodCheck for CapabilitiesRestricted {
    fn id(&self) -> &'static str {
        "capabilities_restricted"
    }

    fn level(&self) -> Level {
        Level::Restricted
    }

    fn min_version(&self) -> Version {
        Version::new(1, 22)
    }

    fn overrides(&self) -> &'static [&'static str] {
        &["capabilities_baseline"]
    }

    fn linux_only(&self) -> bool {
        true
    }

    fn check(&self, _: Version, _: &ObjectMeta, spec: &PodSpec) -> CheckResult {
        let mut missing_drop: Vec<&str> = Vec::new();
        let mut adding: Vec<&str> = Vec::new();
        let mut added: Vec<&str> = Vec::new();

        for container in containers(spec) {
            let caps = container.security_context.and_then(|sc| sc.capabilities.as_ref());
            let drops_all = caps
                .and_then(|c| c.drop.as_deref())
                .unwrap_or_default()
                .iter()
                .any(|d| d == "ALL");
            if !drops_all {
                missing_drop.push(container.name);
            }

            let forbidden: Vec<&str> = caps
                .and_then(|c| c.add.as_deref())
                .unwrap_or_default()
                .iter()
                .map(String::as_str)
                .filter(|cap| *cap != RESTRICTED_ADDABLE)
                .collect();
            if !forbidden.is_empty() {
                adding.push(container.name);
                for cap in forbidden {
                    if !added.contains(&cap) {
                        added.push(cap);
                    }
                }
            }
        }

        let mut details = Vec::new();
        if !missing_drop.is_empty() {
            details.push(format!(
                "{} must set securityContext.capabilities.drop=[\"ALL\"]",
                subject("container", "containers", &missing_drop)
            ));
        }
        if !adding.is_empty() {
            details.push(format!(
                "{} must not include {} in securityContext.capabilities.add",
                subject("container", "containers", &adding),
                join_quote(&added)
            ));
        }

        if details.is_empty() {
            return CheckResult::allowed();
        }
        CheckResult::forbidden("unrestricted capabilities", details.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pss::checks::tests::run;

    const HARDENED: &str = r#"
apiVersion: v1
kind: Pod
metadata:
  name: hardened
spec:
  securityContext:
    runAsNonRoot: true
    seccompProfile:
      type: RuntimeDefault
  volumes:
    - name: config
      configMap:
        name: settings
    - name: scratch
      emptyDir: {}
  containers:
    - name: app
      image: app:1.0
      securityContext:
        allowPrivilegeEscalation: false
        capabilities:
          drop: ["ALL"]
          add: ["NET_BIND_SERVICE"]
"#;

    #[test]
    fn hardened_pod_passes_every_restricted_check() {
        for check in checks() {
            let result = run(check.as_ref(), HARDENED);
            assert!(result.allowed, "{}: {}", check.id(), result.forbidden_detail);
        }
    }

    #[test]
    fn network_and_host_volumes_are_restricted() {
        let yaml = HARDENED.replace(
            "    - name: scratch\n      emptyDir: {}\n",
            "    - name: share\n      nfs:\n        server: nfs.local\n        path: /exports\n",
        );
        let result = run(&RestrictedVolumes, &yaml);
        assert_eq!(
            result.forbidden_detail,
            "volume \"share\" uses restricted volume type \"nfs\""
        );
    }

    #[test]
    fn privilege_escalation_must_be_disabled_explicitly() {
        let yaml = HARDENED.replace("allowPrivilegeEscalation: false", "allowPrivilegeEscalation: true");
        let result = run(&AllowPrivilegeEscalation, &yaml);
        assert_eq!(result.forbidden_reason, "allowPrivilegeEscalation != false");
        assert_eq!(
            result.forbidden_detail,
            "container \"app\" must set securityContext.allowPrivilegeEscalation=false"
        );
    }

    #[test]
    fn run_as_non_root_explicit_and_implicit() {
        let yaml = r#"
apiVersion: v1
kind: Pod
spec:
  containers:
    - name: a
    - name: b
      securityContext:
        runAsNonRoot: false
    - name: c
      securityContext:
        runAsNonRoot: true
"#;
        let result = run(&RunAsNonRoot, yaml);
        assert_eq!(
            result.forbidden_detail,
            "container \"b\" must not set securityContext.runAsNonRoot=false; pod or container \"a\" must set securityContext.runAsNonRoot=true"
        );
    }

    #[test]
    fn root_user_is_forbidden() {
        let yaml = HARDENED.replace("runAsNonRoot: true", "runAsNonRoot: true\n    runAsUser: 0");
        assert_eq!(run(&RunAsUser, &yaml).forbidden_detail, "pod must not set runAsUser=0");
    }

    #[test]
    fn seccomp_must_be_set_somewhere() {
        let yaml = HARDENED.replace("    seccompProfile:\n      type: RuntimeDefault\n", "");
        let result = run(&SeccompProfileRestricted, &yaml);
        assert_eq!(
            result.forbidden_detail,
            "pod or container \"app\" must set securityContext.seccompProfile.type to \"RuntimeDefault\" or \"Localhost\""
        );
    }

    #[test]
    fn capabilities_must_drop_all() {
        let yaml = HARDENED
            .replace("drop: [\"ALL\"]", "drop: [\"NET_RAW\"]")
            .replace("add: [\"NET_BIND_SERVICE\"]", "add: [\"SYS_TIME\"]");
        let result = run(&CapabilitiesRestricted, &yaml);
        assert_eq!(
            result.forbidden_detail,
            "container \"app\" must set securityContext.capabilities.drop=[\"ALL\"]; container \"app\" must not include \"SYS_TIME\" in securityContext.capabilities.add"
        );
    }
}
