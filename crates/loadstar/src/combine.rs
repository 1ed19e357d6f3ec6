//! Merging of configuration layers.

use indexmap::{IndexMap, IndexSet};
use std::hash::Hash;

/// Merge of a higher-precedence value with a lower-precedence one
pub trait Combine {
    /// Combine two values, preferring the values in `self`.
    ///
    /// Sets are joined with the items of `self` placed first. Maps are
    /// joined key by key, and a key present in both keeps the value from
    /// `self`.
    #[must_use]
    fn combine(self, other: Self) -> Self;
}

impl<T> Combine for IndexSet<T>
where
    T: Eq + Hash,
{
    fn combine(mut self, other: Self) -> Self {
        self.extend(other);
        self
    }
}

impl<K, V> Combine for IndexMap<K, V>
where
    K: Eq + Hash,
{
    fn combine(mut self, other: Self) -> Self {
        for (key, value) in other {
            self.entry(key).or_insert(value);
        }
        self
    }
}

impl<T> Combine for Option<T>
where
    T: Combine,
{
    fn combine(self, other: Self) -> Self {
        match (self, other) {
            (Some(a), Some(b)) => Some(a.combine(b)),
            (a, b) => a.or(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sets_keep_higher_precedence_first() {
        let project = IndexSet::from(["b".to_owned(), "a".to_owned()]);
        let user = IndexSet::from(["c".to_owned(), "a".to_owned()]);
        let merged: Vec<String> = project.combine(user).into_iter().collect();
        assert_eq!(merged, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_maps_prefer_self() {
        let project = IndexMap::from([("vendor/".to_owned(), "/project/".to_owned())]);
        let user = IndexMap::from([
            ("vendor/".to_owned(), "/user/".to_owned()),
            ("lib/".to_owned(), "/lib/".to_owned()),
        ]);
        let merged = project.combine(user);
        assert_eq!(merged.get("vendor/").map(String::as_str), Some("/project/"));
        assert_eq!(merged.get("lib/").map(String::as_str), Some("/lib/"));
    }

    #[test]
    fn test_options() {
        let some = Some(IndexSet::from([1]));
        assert_eq!(some.clone().combine(None), some);
        assert_eq!(None.combine(Some(IndexSet::from([2]))), Some(IndexSet::from([2])));
        assert_eq!(
            Some(IndexSet::from([1])).combine(Some(IndexSet::from([2]))),
            Some(IndexSet::from([1, 2]))
        );
    }
}
