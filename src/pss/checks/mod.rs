//! Pod Security Standards checks.
//!
//! Each check inspects the pod metadata and spec of a workload and reports
//! whether the pod is allowed at the check's level. Checks are versioned:
//! a check only applies from the Kubernetes release that introduced it.

mod baseline;
mod restricted;

use k8s_openapi::api::core::v1::{ContainerPort, PodSpec, SecurityContext};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::api::{Level, LevelVersion, Version};

/// Outcome of a single check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub allowed: bool,
    pub forbidden_reason: String,
    pub forbidden_detail: String,
}

impl CheckResult {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            forbidden_reason: String::new(),
            forbidden_detail: String::new(),
        }
    }

    pub fn forbidden(reason: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            allowed: false,
            forbidden_reason: reason.into(),
            forbidden_detail: detail.into(),
        }
    }
}

/// A named check result, as returned by [`evaluate_pod`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedResult {
    pub id: &'static str,
    pub result: CheckResult,
}

/// A single Pod Security Standards control.
pub trait PodCheck: Send + Sync {
    fn id(&self) -> &'static str;

    /// Lowest level the check is enforced at.
    fn level(&self) -> Level;

    /// First policy version the check applies to.
    fn min_version(&self) -> Version;

    /// Checks that this one replaces when both would apply.
    fn overrides(&self) -> &'static [&'static str] {
        &[]
    }

    /// Linux-only controls are not enforced on Windows pods from v1.25.
    fn linux_only(&self) -> bool {
        false
    }

    fn check(&self, version: Version, meta: &ObjectMeta, spec: &PodSpec) -> CheckResult;
}

/// Returns every check, baseline first.
pub fn all_checks() -> Vec<Box<dyn PodCheck>> {
    let mut checks = baseline::checks();
    checks.extend(restricted::checks());
    checks
}

const WINDOWS_EXEMPTION: Version = Version::new(1, 25);

fn is_windows(spec: &PodSpec) -> bool {
    spec.os.as_ref().is_some_and(|os| os.name == "windows")
}

/// Run the checks that apply at `level_version` against one pod.
pub fn evaluate_pod(
    checks: &[Box<dyn PodCheck>],
    level_version: LevelVersion,
    meta: &ObjectMeta,
    spec: &PodSpec,
) -> Vec<NamedResult> {
    let LevelVersion { level, version } = level_version;
    if level == Level::Privileged {
        return Vec::new();
    }

    let applicable: Vec<&dyn PodCheck> = checks
        .iter()
        .map(|c| c.as_ref())
        .filter(|c| c.level() <= level && version.at_least(c.min_version()))
        .collect();
    let overridden: Vec<&str> = applicable.iter().flat_map(|c| c.overrides()).copied().collect();
    let windows = is_windows(spec);

    applicable
        .into_iter()
        .filter(|c| !overridden.contains(&c.id()))
        .map(|c| {
            let result = if windows && c.linux_only() && version.at_least(WINDOWS_EXEMPTION) {
                CheckResult::allowed()
            } else {
                c.check(version, meta, spec)
            };
            NamedResult { id: c.id(), result }
        })
        .collect()
}

/// A pod is allowed only when every check allowed it.
pub fn aggregate_check_results(results: &[NamedResult]) -> bool {
    results.iter().all(|r| r.result.allowed)
}

/// Uniform view over regular, init and ephemeral containers.
pub(crate) struct ContainerView<'a> {
    pub name: &'a str,
    pub security_context: Option<&'a SecurityContext>,
    pub ports: &'a [ContainerPort],
}

/// Init containers, then containers, then ephemeral containers.
pub(crate) fn containers(spec: &PodSpec) -> impl Iterator<Item = ContainerView<'_>> {
    let regular = spec
        .init_containers
        .iter()
        .flatten()
        .chain(spec.containers.iter())
        .map(|c| ContainerView {
            name: &c.name,
            security_context: c.security_context.as_ref(),
            ports: c.ports.as_deref().unwrap_or_default(),
        });
    let ephemeral = spec.ephemeral_containers.iter().flatten().map(|c| ContainerView {
        name: &c.name,
        security_context: c.security_context.as_ref(),
        ports: c.ports.as_deref().unwrap_or_default(),
    });
    regular.chain(ephemeral)
}

pub(crate) fn pluralize<'a>(singular: &'a str, plural: &'a str, count: usize) -> &'a str {
    if count == 1 {
        singular
    } else {
        plural
    }
}

/// `"a", "b"`
pub(crate) fn join_quote<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|s| format!("{:?}", s.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `container "a"` / `containers "a", "b"`
pub(crate) fn subject<S: AsRef<str>>(noun: &str, nouns: &str, names: &[S]) -> String {
    format!("{} {}", pluralize(noun, nouns, names.len()), join_quote(names))
}

#[cfg(test)]
pub(crate) mod tests {
    use k8s_openapi::api::core::v1::Pod;

    use super::*;

    /// Decode a pod from YAML and return its metadata and spec.
    pub(crate) fn pod(yaml: &str) -> (ObjectMeta, PodSpec) {
        let pod: Pod = serde_yaml::from_str(yaml).unwrap();
        (pod.metadata, pod.spec.unwrap_or_default())
    }

    pub(crate) fn run(check: &dyn PodCheck, yaml: &str) -> CheckResult {
        let (meta, spec) = pod(yaml);
        check.check(Version::Latest, &meta, &spec)
    }

    const WINDOWS_POD: &str = r#"
apiVersion: v1
kind: Pod
metadata:
  name: win
spec:
  os:
    name: windows
  containers:
    - name: app
      image: mcr.microsoft.com/windows/nanoserver
"#;

    fn evaluate(level: &str, version: &str, yaml: &str) -> Vec<NamedResult> {
        let (meta, spec) = pod(yaml);
        evaluate_pod(&all_checks(), LevelVersion::parse(level, version).unwrap(), &meta, &spec)
    }

    #[test]
    fn check_ids_are_unique() {
        let checks = all_checks();
        let mut ids: Vec<_> = checks.iter().map(|c| c.id()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), checks.len());
    }

    #[test]
    fn privileged_level_runs_nothing() {
        assert!(evaluate("privileged", "latest", WINDOWS_POD).is_empty());
    }

    #[test]
    fn restricted_overrides_baseline_variants() {
        let ids: Vec<_> = evaluate("restricted", "latest", WINDOWS_POD)
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert!(ids.contains(&"seccompProfile_restricted"));
        assert!(!ids.contains(&"seccompProfile_baseline"));
        assert!(ids.contains(&"capabilities_restricted"));
        assert!(!ids.contains(&"capabilities_baseline"));
    }

    #[test]
    fn version_gates_checks() {
        let ids: Vec<_> = evaluate("restricted", "v1.18", WINDOWS_POD)
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert!(!ids.contains(&"seccompProfile_restricted"));
        assert!(!ids.contains(&"seccompProfile_baseline"));
        assert!(!ids.contains(&"runAsUser"));
        assert!(ids.contains(&"capabilities_baseline"));
    }

    #[test]
    fn windows_pods_skip_linux_only_checks_from_1_25() {
        let latest = evaluate("restricted", "latest", WINDOWS_POD);
        let failing: Vec<_> = latest.iter().filter(|r| !r.result.allowed).map(|r| r.id).collect();
        // runAsNonRoot still applies to Windows pods
        assert_eq!(failing, vec!["runAsNonRoot"]);

        let older = evaluate("restricted", "v1.24", WINDOWS_POD);
        assert!(older
            .iter()
            .any(|r| r.id == "allowPrivilegeEscalation" && !r.result.allowed));
    }

    #[test]
    fn aggregate_requires_every_check() {
        let results = evaluate("baseline", "latest", WINDOWS_POD);
        assert!(aggregate_check_results(&results));
        let results = evaluate("restricted", "latest", WINDOWS_POD);
        assert!(!aggregate_check_results(&results));
    }

    #[test]
    fn detail_helpers() {
        assert_eq!(subject("container", "containers", &["a"]), "container \"a\"");
        assert_eq!(subject("container", "containers", &["a", "b"]), "containers \"a\", \"b\"");
    }
}
