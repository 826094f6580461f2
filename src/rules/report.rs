use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// The outcome of one catalogue rule evaluated against one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRef {
    pub id: String,
    pub selector: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub points: i32,
    #[serde(rename = "href", default, skip_serializing_if = "String::is_empty")]
    pub link: String,
    /// How many containers (or pod specs) satisfied the rule's condition.
    #[serde(skip)]
    pub container_match_count: usize,
}

fn is_zero(points: &i32) -> bool {
    *points == 0
}

impl RuleRef {
    /// Bucket ordering: positive points descending first, then non-positive
    /// points ascending (most negative first), then selector, then id.
    ///
    /// Comparing two entries where either is positive sorts the larger one
    /// first; comparing two non-positive entries sorts the smaller one first.
    /// Encoding that as a key keeps the relation transitive across mixed signs.
    pub fn compare(&self, other: &Self) -> Ordering {
        points_key(self.points)
            .cmp(&points_key(other.points))
            .then_with(|| self.selector.cmp(&other.selector))
            .then_with(|| self.id.cmp(&other.id))
            .then_with(|| self.reason.cmp(&other.reason))
            .then_with(|| self.link.cmp(&other.link))
    }
}

fn points_key(points: i32) -> (u8, i64) {
    if points > 0 {
        (0, -i64::from(points))
    } else {
        (1, i64::from(points))
    }
}

/// Rule outcomes grouped by how they affect the score.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleScoring {
    /// Dangerous conditions that matched (negative points).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub critical: Vec<RuleRef>,
    /// Hardening that was found (positive points earned).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub passed: Vec<RuleRef>,
    /// Hardening that was missing (positive points not earned).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advise: Vec<RuleRef>,
}

impl RuleScoring {
    pub fn sort(&mut self) {
        for bucket in [&mut self.critical, &mut self.passed, &mut self.advise] {
            bucket.sort_by(RuleRef::compare);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.critical.is_empty() && self.passed.is_empty() && self.advise.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.critical
            .iter()
            .chain(&self.passed)
            .chain(&self.advise)
            .any(|r| r.id == id)
    }
}

/// Scan result for a single manifest document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub object: String,
    pub valid: bool,
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    pub score: i32,
    pub scoring: RuleScoring,
}

impl Report {
    /// A scan "passes" when the document was valid and earned a positive score.
    pub fn passed(&self) -> bool {
        self.valid && self.score > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rule_ref(id: &str, selector: &str, points: i32) -> RuleRef {
        RuleRef {
            id: id.into(),
            selector: selector.into(),
            reason: "r".into(),
            points,
            link: String::new(),
            container_match_count: 0,
        }
    }

    #[test]
    fn positives_sort_descending() {
        let mut bucket = vec![rule_ref("A", "a", 1), rule_ref("B", "b", 3)];
        bucket.sort_by(RuleRef::compare);
        assert_eq!(bucket[0].id, "B");
    }

    #[test]
    fn negatives_sort_most_negative_first() {
        let mut bucket = vec![rule_ref("A", "a", -1), rule_ref("B", "b", -30), rule_ref("C", "c", -9)];
        bucket.sort_by(RuleRef::compare);
        let ids: Vec<_> = bucket.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["B", "C", "A"]);
    }

    #[test]
    fn equal_points_break_ties_by_selector() {
        let mut bucket = vec![
            rule_ref("LimitsCPU", "containers[] .resources .limits .cpu", 1),
            rule_ref("CapDropAny", "containers[] .securityContext .capabilities .drop", 1),
            rule_ref("HostUsers", ".spec .hostUsers == false", 1),
        ];
        bucket.sort_by(RuleRef::compare);
        let ids: Vec<_> = bucket.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["HostUsers", "LimitsCPU", "CapDropAny"]);
    }

    #[test]
    fn serializes_with_fixed_field_names() {
        let report = Report {
            object: "Pod/web.default".into(),
            valid: true,
            file_name: "pod.yaml".into(),
            message: String::new(),
            score: -30,
            scoring: RuleScoring {
                critical: vec![rule_ref("Privileged", "containers[] .securityContext .privileged == true", -30)],
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["fileName"], "pod.yaml");
        assert!(json.get("message").is_none());
        assert!(json["scoring"].get("advise").is_none());
        assert_eq!(json["scoring"]["critical"][0]["points"], -30);
        assert!(json["scoring"]["critical"][0].get("href").is_none());
        assert!(json["scoring"]["critical"][0].get("container_match_count").is_none());
    }

    fn arb_ref() -> impl Strategy<Value = RuleRef> {
        ("[A-D]", "[a-d]{1,2}", -30i32..30).prop_map(|(id, sel, pts)| rule_ref(&id, &sel, pts))
    }

    proptest! {
        #[test]
        fn ordering_is_independent_of_input_order(mut refs in prop::collection::vec(arb_ref(), 0..12)) {
            let mut sorted = refs.clone();
            sorted.sort_by(RuleRef::compare);
            refs.reverse();
            refs.sort_by(RuleRef::compare);
            prop_assert_eq!(sorted, refs);
        }

        #[test]
        fn ordering_is_antisymmetric(a in arb_ref(), b in arb_ref()) {
            prop_assert_eq!(a.compare(&b), b.compare(&a).reverse());
            if a.compare(&b) == Ordering::Equal {
                prop_assert_eq!(a, b);
            }
        }
    }
}
