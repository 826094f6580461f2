pub mod builtin;
pub mod context;
pub mod report;
pub mod ruleset;

use serde::Serialize;
use serde_json::Value;

use crate::manifest::Node;

pub use report::{Report, RuleRef, RuleScoring};
pub use ruleset::Ruleset;

/// Counts how many containers (or pod specs) of a document satisfy a rule.
/// Must be total: malformed input counts as zero.
pub type Predicate = fn(&Value) -> usize;

/// Workload kinds most rules apply to.
pub const DEFAULT_KINDS: &[&str] = &["Pod", "Deployment", "StatefulSet", "DaemonSet"];

/// A catalogue entry. Built once, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct Rule {
    pub id: &'static str,
    /// Human-readable description of what is inspected.
    pub selector: &'static str,
    pub reason: &'static str,
    #[serde(rename = "href", skip_serializing_if = "str::is_empty")]
    pub link: &'static str,
    pub kinds: &'static [&'static str],
    /// Negative points mark a dangerous condition, non-negative points a
    /// hardening measure.
    pub points: i32,
    /// How strongly the measure is recommended when missing.
    #[serde(skip_serializing_if = "is_zero")]
    pub advise: i32,
    #[serde(skip)]
    pub predicate: Predicate,
}

fn is_zero(v: &i32) -> bool {
    *v == 0
}

/// Result of evaluating one rule against one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// The rule applies; the predicate matched this many elements.
    Applicable(usize),
    /// The document's kind is outside the rule's scope.
    NotApplicable { kind: String },
    /// The document could not be evaluated at all.
    Error(String),
}

impl Rule {
    pub fn applies_to(&self, kind: &str) -> bool {
        self.kinds.contains(&kind)
    }

    /// Check kind applicability, then run the predicate.
    pub fn eval(&self, document: &Value) -> Evaluation {
        if !document.is_object() {
            return Evaluation::Error(format!("rule {} expects a mapping document", self.id));
        }

        let kind = Node::new(document).at("kind").as_str().unwrap_or_default();
        if !self.applies_to(kind) {
            return Evaluation::NotApplicable {
                kind: kind.to_string(),
            };
        }

        Evaluation::Applicable((self.predicate)(document))
    }

    /// Materialize the outcome of this rule for a report.
    pub fn to_ref(&self, container_match_count: usize) -> RuleRef {
        RuleRef {
            id: self.id.to_string(),
            selector: self.selector.to_string(),
            reason: self.reason.to_string(),
            points: self.points,
            link: self.link.to_string(),
            container_match_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn always_two(_: &Value) -> usize {
        2
    }

    const STATEFUL_ONLY: Rule = Rule {
        id: "Test",
        selector: ".spec",
        reason: "test",
        link: "",
        kinds: &["StatefulSet"],
        points: 1,
        advise: 0,
        predicate: always_two,
    };

    #[test]
    fn applicable_kind_runs_predicate() {
        let doc = json!({"kind": "StatefulSet"});
        assert_eq!(STATEFUL_ONLY.eval(&doc), Evaluation::Applicable(2));
    }

    #[test]
    fn other_kind_is_not_applicable_rather_than_zero() {
        let doc = json!({"kind": "Deployment"});
        assert_eq!(
            STATEFUL_ONLY.eval(&doc),
            Evaluation::NotApplicable {
                kind: "Deployment".into()
            }
        );
    }

    #[test]
    fn missing_kind_is_not_applicable() {
        let doc = json!({"spec": {}});
        assert!(matches!(STATEFUL_ONLY.eval(&doc), Evaluation::NotApplicable { .. }));
    }

    #[test]
    fn scalar_document_is_an_error() {
        assert!(matches!(STATEFUL_ONLY.eval(&json!("Pod")), Evaluation::Error(_)));
    }

    #[test]
    fn rule_serializes_without_predicate() {
        let json = serde_json::to_value(STATEFUL_ONLY).unwrap();
        assert_eq!(json["id"], "Test");
        assert!(json.get("predicate").is_none());
        assert!(json.get("advise").is_none());
        assert!(json.get("href").is_none());
    }
}
