//! Path queries over decoded manifest documents.
//!
//! Rule predicates never index `serde_json::Value` directly. They go through
//! [`Node`], which treats missing, null and wrong-typed fields uniformly as
//! "absent" so that every predicate is total over arbitrary input.

use serde_json::Value;

/// A possibly-missing position inside a document.
#[derive(Debug, Clone, Copy)]
pub struct Node<'a>(Option<&'a Value>);

impl<'a> Node<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self(Some(value))
    }

    pub fn missing() -> Self {
        Self(None)
    }

    /// Descend along a dotted path. Numeric segments index into arrays,
    /// so `containers.0.securityContext` is valid.
    pub fn at(self, path: &str) -> Self {
        let mut current = self.0;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            current = match current {
                Some(Value::Object(map)) => map.get(segment),
                Some(Value::Array(items)) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            if current.is_none() {
                break;
            }
        }
        Self(current)
    }

    pub fn get(self) -> Option<&'a Value> {
        self.0
    }

    /// Absent or explicitly `null`.
    pub fn is_nil(self) -> bool {
        matches!(self.0, None | Some(Value::Null))
    }

    pub fn as_bool(self) -> Option<bool> {
        self.0.and_then(Value::as_bool)
    }

    pub fn as_i64(self) -> Option<i64> {
        self.0.and_then(Value::as_i64)
    }

    pub fn as_str(self) -> Option<&'a str> {
        self.0.and_then(Value::as_str)
    }

    pub fn is_true(self) -> bool {
        self.as_bool() == Some(true)
    }

    pub fn is_false(self) -> bool {
        self.as_bool() == Some(false)
    }

    /// Non-empty string.
    pub fn has_text(self) -> bool {
        self.as_str().is_some_and(|s| !s.is_empty())
    }

    /// Present and not null. Used for "field is set" checks such as
    /// `resources.limits.cpu`, where the value may be a string or a number.
    pub fn is_present(self) -> bool {
        !self.is_nil()
    }

    /// Elements of an array node. Anything else yields nothing.
    pub fn items(self) -> impl Iterator<Item = Node<'a>> {
        self.0
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(|v| Node(Some(v)))
    }

    pub fn count(self) -> usize {
        self.0.and_then(Value::as_array).map_or(0, Vec::len)
    }

    pub fn count_where(self, predicate: impl Fn(Node<'a>) -> bool) -> usize {
        self.items().filter(|n| predicate(*n)).count()
    }

    /// Whether an array of strings contains `needle`.
    pub fn contains_str(self, needle: &str) -> bool {
        self.items().any(|n| n.as_str() == Some(needle))
    }

    pub fn contains_str_ignore_case(self, needle: &str) -> bool {
        self.items()
            .filter_map(Node::as_str)
            .any(|s| s.eq_ignore_ascii_case(needle))
    }

    /// Key/value pairs of an object node whose values are strings.
    pub fn string_entries(self) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.0
            .and_then(Value::as_object)
            .into_iter()
            .flatten()
            .filter_map(|(k, v)| v.as_str().map(|v| (k.as_str(), v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn descends_objects_and_arrays() {
        let doc = json!({"spec": {"containers": [{"name": "a"}, {"name": "b"}]}});
        let root = Node::new(&doc);
        assert_eq!(root.at("spec.containers.1.name").as_str(), Some("b"));
        assert_eq!(root.at("spec.containers").count(), 2);
        assert!(root.at("spec.containers.2.name").is_nil());
    }

    #[test]
    fn wrong_types_read_as_absent() {
        let doc = json!({"hostNetwork": "true", "runAsUser": "10001", "containers": {}});
        let root = Node::new(&doc);
        assert!(!root.at("hostNetwork").is_true());
        assert_eq!(root.at("runAsUser").as_i64(), None);
        assert_eq!(root.at("containers").count(), 0);
        assert!(root.at("hostNetwork.nested").is_nil());
    }

    #[test]
    fn null_is_nil_but_not_present() {
        let doc = json!({"cpu": null, "memory": "64Mi"});
        let root = Node::new(&doc);
        assert!(root.at("cpu").is_nil());
        assert!(!root.at("cpu").is_present());
        assert!(root.at("memory").is_present());
    }

    #[test]
    fn string_array_helpers() {
        let doc = json!({"drop": ["all", "NET_RAW"]});
        let drop = Node::new(&doc).at("drop");
        assert!(drop.contains_str("NET_RAW"));
        assert!(!drop.contains_str("ALL"));
        assert!(drop.contains_str_ignore_case("ALL"));
    }
}
