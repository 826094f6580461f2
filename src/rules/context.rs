//! Pod spec resolution and pod/container security context precedence.
//!
//! Kubernetes lets several security attributes be set on the pod-level
//! `securityContext` as a default for every container, while a container's
//! own `securityContext` overrides it field by field. Rules that score such
//! attributes go through [`check_security_context`] so that inheritance is
//! applied the same way everywhere.

use serde_json::Value;

use crate::manifest::Node;

pub const POD_KIND: &str = "Pod";

/// Container collections of a pod spec, in evaluation order.
pub const CONTAINER_COLLECTIONS: [&str; 3] = ["initContainers", "containers", "ephemeralContainers"];

/// Path of the `PodSpec` inside a document of the given kind.
pub fn pod_spec_path(kind: Option<&str>) -> &'static str {
    match kind {
        Some(POD_KIND) => "spec",
        _ => "spec.template.spec",
    }
}

/// The `PodSpec` node of a document. Bare pods carry it at `.spec`, every
/// controller kind at `.spec.template.spec`.
pub fn pod_spec(document: &Value) -> Node<'_> {
    let root = Node::new(document);
    root.at(pod_spec_path(root.at("kind").as_str()))
}

/// The metadata belonging to the pod: the document's own metadata for a
/// bare pod, the pod template's metadata otherwise.
pub fn pod_metadata(document: &Value) -> Node<'_> {
    let root = Node::new(document);
    match root.at("kind").as_str() {
        Some(POD_KIND) => root.at("metadata"),
        _ => root.at("spec.template.metadata"),
    }
}

/// Every container of a pod spec: init containers, then regular
/// containers, then ephemeral containers.
pub fn all_containers(spec: Node<'_>) -> impl Iterator<Item = Node<'_>> {
    CONTAINER_COLLECTIONS
        .into_iter()
        .flat_map(move |collection| spec.at(collection).items())
}

/// Init and regular containers only. Ephemeral containers cannot declare
/// resources and are not scored by the per-container flag rules.
pub fn workload_containers(spec: Node<'_>) -> impl Iterator<Item = Node<'_>> {
    CONTAINER_COLLECTIONS
        .into_iter()
        .take(2)
        .flat_map(move |collection| spec.at(collection).items())
}

/// Count the init and regular containers of a document satisfying
/// `predicate`.
pub fn count_containers(document: &Value, predicate: impl Fn(Node<'_>) -> bool) -> usize {
    workload_containers(pod_spec(document))
        .filter(|c| predicate(*c))
        .count()
}

/// State of one security attribute at one level.
///
/// `unset` and `valid` are never both true.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CheckResult {
    /// The attribute is absent or has the wrong type.
    pub unset: bool,
    /// The attribute is present and satisfies the rule.
    pub valid: bool,
}

impl CheckResult {
    pub const UNSET: Self = Self {
        unset: true,
        valid: false,
    };

    /// Build a result from an optional typed value.
    pub fn of<T>(value: Option<T>, satisfies: impl FnOnce(T) -> bool) -> Self {
        match value {
            None => Self::UNSET,
            Some(v) => Self {
                unset: false,
                valid: satisfies(v),
            },
        }
    }
}

/// Where an attribute is being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    Pod,
    /// A container, identified by its `name` (empty when missing).
    Container(&'a str),
}

/// Count containers for which the attribute is effectively valid.
///
/// `check` receives a `securityContext` node (possibly missing). When
/// `pod_level` is set, the pod-level context is checked first and a
/// container whose own attribute is unset inherits that outcome.
pub fn check_security_context(
    document: &Value,
    pod_level: bool,
    check: impl Fn(Node<'_>) -> CheckResult,
) -> usize {
    check_security_context_with(document, pod_level, check, |_| CheckResult::UNSET)
}

/// [`check_security_context`] with a secondary source consulted whenever the
/// structured field is unset at a given scope. Legacy annotations plug in
/// here.
pub fn check_security_context_with(
    document: &Value,
    pod_level: bool,
    check: impl Fn(Node<'_>) -> CheckResult,
    fallback: impl Fn(Scope<'_>) -> CheckResult,
) -> usize {
    let spec = pod_spec(document);

    let resolve = |context: Node<'_>, scope: Scope<'_>| {
        let result = check(context);
        if result.unset {
            fallback(scope)
        } else {
            result
        }
    };

    let valid_at_pod_level = pod_level && resolve(spec.at("securityContext"), Scope::Pod).valid;

    all_containers(spec)
        .filter(|container| {
            let name = container.at("name").as_str().unwrap_or_default();
            let result = resolve(container.at("securityContext"), Scope::Container(name));
            result.valid || (result.unset && valid_at_pod_level)
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run_as_non_root(ctx: Node<'_>) -> CheckResult {
        CheckResult::of(ctx.at("runAsNonRoot").as_bool(), |v| v)
    }

    #[test]
    fn pod_spec_depends_on_kind() {
        let pod = json!({"kind": "Pod", "spec": {"hostPID": true}});
        let deploy = json!({"kind": "Deployment", "spec": {"template": {"spec": {"hostPID": true}}}});
        let unknown = json!({"spec": {"template": {"spec": {"hostPID": true}}}});
        assert!(pod_spec(&pod).at("hostPID").is_true());
        assert!(pod_spec(&deploy).at("hostPID").is_true());
        assert!(pod_spec(&unknown).at("hostPID").is_true());
    }

    #[test]
    fn pod_level_setting_is_inherited_by_every_container() {
        let doc = json!({
            "kind": "Pod",
            "spec": {
                "securityContext": {"runAsNonRoot": true},
                "initContainers": [{"name": "i"}],
                "containers": [{"name": "a"}, {"name": "b", "securityContext": {}}],
                "ephemeralContainers": [{"name": "e"}]
            }
        });
        assert_eq!(check_security_context(&doc, true, run_as_non_root), 4);
    }

    #[test]
    fn container_override_suppresses_inheritance_for_that_container() {
        let doc = json!({
            "kind": "Pod",
            "spec": {
                "securityContext": {"runAsNonRoot": true},
                "containers": [
                    {"name": "a", "securityContext": {"runAsNonRoot": false}},
                    {"name": "b"}
                ]
            }
        });
        assert_eq!(check_security_context(&doc, true, run_as_non_root), 1);
    }

    #[test]
    fn container_setting_wins_over_invalid_pod_setting() {
        let doc = json!({
            "kind": "Deployment",
            "spec": {"template": {"spec": {
                "securityContext": {"runAsNonRoot": false},
                "containers": [
                    {"name": "a", "securityContext": {"runAsNonRoot": true}},
                    {"name": "b"}
                ]
            }}}
        });
        assert_eq!(check_security_context(&doc, true, run_as_non_root), 1);
    }

    #[test]
    fn pod_level_is_ignored_when_not_allowed_there() {
        let doc = json!({
            "kind": "Pod",
            "spec": {
                "securityContext": {"runAsNonRoot": true},
                "containers": [{"name": "a"}]
            }
        });
        assert_eq!(check_security_context(&doc, false, run_as_non_root), 0);
    }

    #[test]
    fn fallback_applies_only_when_structured_field_unset() {
        let doc = json!({
            "kind": "Pod",
            "spec": {"containers": [
                {"name": "a"},
                {"name": "b", "securityContext": {"runAsNonRoot": false}}
            ]}
        });
        let count = check_security_context_with(&doc, true, run_as_non_root, |scope| match scope {
            Scope::Container(_) => CheckResult { unset: false, valid: true },
            Scope::Pod => CheckResult::UNSET,
        });
        assert_eq!(count, 1);
    }

    #[test]
    fn check_results_are_never_unset_and_valid() {
        for value in [None, Some(true), Some(false)] {
            let result = CheckResult::of(value, |v| v);
            assert!(!(result.unset && result.valid));
        }
        assert!(!(CheckResult::UNSET.unset && CheckResult::UNSET.valid));
    }

    #[test]
    fn missing_containers_count_zero() {
        let doc = json!({"kind": "Pod", "spec": {"containers": "oops"}});
        assert_eq!(check_security_context(&doc, true, run_as_non_root), 0);
        assert_eq!(count_containers(&doc, |_| true), 0);
    }
}
