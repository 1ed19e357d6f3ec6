//! Path prefixes per id namespace.

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::layer::{Layer, Next};

/// Fetches ids starting with a registered name from below a path prefix.
///
/// Names are checked in registration order and the first match wins. The
/// prefixed id still goes through the rest of the chain, so the default
/// extension rule applies to it.
#[derive(Debug, Clone, Default)]
pub struct PrefixLayer {
    prefixes: IndexMap<String, String>,
}

impl PrefixLayer {
    /// Create a layer with no prefixes
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch ids starting with `name` from `prefix + id`
    #[must_use]
    pub fn prefix(mut self, name: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.prefixes.insert(name.into(), prefix.into());
        self
    }

    /// Whether no prefix was registered
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    fn prefix_for(&self, id: &str) -> Option<&str> {
        self.prefixes
            .iter()
            .find(|(name, _)| id.starts_with(name.as_str()))
            .map(|(_, prefix)| prefix.as_str())
    }
}

impl FromIterator<(String, String)> for PrefixLayer {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            prefixes: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Layer for PrefixLayer {
    fn path(&self, id: &str, next: Next<'_>) -> String {
        match self.prefix_for(id) {
            Some(prefix) => next.path(&format!("{prefix}{id}")),
            None => next.path(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_matching_prefix_wins() {
        let layer = PrefixLayer::new()
            .prefix("vendor/", "/static/")
            .prefix("vendor/lib", "/lib/");
        assert_eq!(layer.prefix_for("vendor/lib/x"), Some("/static/"));
        assert_eq!(layer.prefix_for("app/main"), None);
        assert!(!layer.is_empty());
    }
}
