use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A set of named abilities.
///
/// Workers advertise one, handlers declare the one they require. Matching is
/// plain set inclusion; there is no versioning or wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(BTreeSet<String>);

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, capability: impl Into<String>) -> bool {
        self.0.insert(capability.into())
    }

    pub fn contains(&self, capability: &str) -> bool {
        self.0.contains(capability)
    }

    pub fn is_subset(&self, other: &Capabilities) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn union(&self, other: &Capabilities) -> Capabilities {
        Capabilities(self.0.union(&other.0).cloned().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for Capabilities {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Capabilities(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_is_subset_of_everything() {
        let worker: Capabilities = ["cpu", "gpu"].into_iter().collect();
        assert!(Capabilities::new().is_subset(&worker));
    }

    #[test]
    fn subset_requires_every_member() {
        let worker: Capabilities = ["cpu"].into_iter().collect();
        let handler: Capabilities = ["cpu", "gpu"].into_iter().collect();
        assert!(!handler.is_subset(&worker));
        assert!(worker.is_subset(&handler));
    }

    #[test]
    fn union_and_display() {
        let a: Capabilities = ["b", "a"].into_iter().collect();
        let b: Capabilities = ["c"].into_iter().collect();
        assert_eq!(a.union(&b).to_string(), "{a, b, c}");
    }

    #[test]
    fn serializes_as_list() {
        let caps: Capabilities = ["x", "y"].into_iter().collect();
        assert_eq!(serde_json::to_string(&caps).unwrap(), r#"["x","y"]"#);
    }
}
