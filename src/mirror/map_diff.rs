//! Generic key/value differ.
//!
//! # Responsibilities
//! - Classify every key of two mappings as added, missing, changed or equal
//! - Stay agnostic of the value type; callers supply the equality
//!
//! # Design Decisions
//! - "Added" means present only on the main side, "missing" only on the shadow side
//! - Pure function: no allocation beyond the result, no logging
//! - Order of the entry lists is unspecified; `changed` is keyed for lookup

use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};

use serde::Serialize;

/// Read-only view over a key/value mapping.
///
/// Implemented for the standard maps so header maps, flattened JSON documents
/// and XML node sets can all be fed to [`diff_maps`].
pub trait Mapping<K, V> {
    /// Look up the value stored under `key`.
    fn lookup(&self, key: &K) -> Option<&V>;

    /// Iterate over every entry.
    fn entries<'a>(&'a self) -> impl Iterator<Item = (&'a K, &'a V)>
    where
        K: 'a,
        V: 'a;
}

impl<K, V, S> Mapping<K, V> for HashMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    fn lookup(&self, key: &K) -> Option<&V> {
        self.get(key)
    }

    fn entries<'a>(&'a self) -> impl Iterator<Item = (&'a K, &'a V)>
    where
        K: 'a,
        V: 'a,
    {
        self.iter()
    }
}

impl<K: Ord, V> Mapping<K, V> for BTreeMap<K, V> {
    fn lookup(&self, key: &K) -> Option<&V> {
        self.get(key)
    }

    fn entries<'a>(&'a self) -> impl Iterator<Item = (&'a K, &'a V)>
    where
        K: 'a,
        V: 'a,
    {
        self.iter()
    }
}

/// A single reported entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapEntry<K, V> {
    pub key: K,
    pub value: V,
}

/// Values of a key present on both sides that compared unequal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffValue<V> {
    pub main: V,
    pub shadow: V,
}

/// Four-way classification of the union of keys of two mappings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapDiffResult<K: Ord, V> {
    /// Keys only present in the main mapping.
    pub added: Vec<MapEntry<K, V>>,
    /// Keys only present in the shadow mapping.
    pub missing: Vec<MapEntry<K, V>>,
    /// Keys present on both sides with different values.
    pub changed: BTreeMap<K, DiffValue<V>>,
    /// Keys present on both sides with identical values.
    pub equal: Vec<MapEntry<K, V>>,
}

impl<K: Ord, V> Default for MapDiffResult<K, V> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            missing: Vec::new(),
            changed: BTreeMap::new(),
            equal: Vec::new(),
        }
    }
}

impl<K: Ord, V> MapDiffResult<K, V> {
    /// True when at least one key was added, missing or changed.
    pub fn has_differences(&self) -> bool {
        !self.added.is_empty() || !self.missing.is_empty() || !self.changed.is_empty()
    }

    /// Number of keys that are not equal.
    pub fn difference_count(&self) -> usize {
        self.added.len() + self.missing.len() + self.changed.len()
    }
}

/// Compare two mappings key by key.
///
/// `equals` decides value equality, so scalars can use `==` while multi-valued
/// headers compare their value sequences in order.
pub fn diff_maps<K, V, M, S, F>(main: &M, shadow: &S, equals: F) -> MapDiffResult<K, V>
where
    K: Ord + Clone,
    V: Clone,
    M: Mapping<K, V> + ?Sized,
    S: Mapping<K, V> + ?Sized,
    F: Fn(&V, &V) -> bool,
{
    let mut result = MapDiffResult::default();

    for (key, main_value) in main.entries() {
        match shadow.lookup(key) {
            Some(shadow_value) if equals(main_value, shadow_value) => {
                result.equal.push(MapEntry {
                    key: key.clone(),
                    value: main_value.clone(),
                });
            }
            Some(shadow_value) => {
                result.changed.insert(
                    key.clone(),
                    DiffValue {
                        main: main_value.clone(),
                        shadow: shadow_value.clone(),
                    },
                );
            }
            None => {
                result.added.push(MapEntry {
                    key: key.clone(),
                    value: main_value.clone(),
                });
            }
        }
    }

    for (key, shadow_value) in shadow.entries() {
        if main.lookup(key).is_none() {
            result.missing.push(MapEntry {
                key: key.clone(),
                value: shadow_value.clone(),
            });
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn keys<V>(entries: &[MapEntry<String, V>]) -> BTreeSet<String> {
        entries.iter().map(|e| e.key.clone()).collect()
    }

    #[test]
    fn classifies_each_key() {
        let main: HashMap<String, i32> =
            [("a".into(), 1), ("b".into(), 2), ("c".into(), 3)].into_iter().collect();
        let shadow: HashMap<String, i32> =
            [("b".into(), 2), ("c".into(), 4), ("d".into(), 5)].into_iter().collect();

        let diff = diff_maps(&main, &shadow, |a, b| a == b);

        assert_eq!(keys(&diff.added), BTreeSet::from(["a".to_string()]));
        assert_eq!(keys(&diff.missing), BTreeSet::from(["d".to_string()]));
        assert_eq!(keys(&diff.equal), BTreeSet::from(["b".to_string()]));
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed["c"], DiffValue { main: 3, shadow: 4 });
        assert_eq!(diff.difference_count(), 3);
    }

    #[test]
    fn multi_values_compare_in_order() {
        let main: BTreeMap<String, Vec<String>> =
            [("vary".into(), vec!["a".into(), "b".into()])].into_iter().collect();
        let shadow: BTreeMap<String, Vec<String>> =
            [("vary".into(), vec!["b".into(), "a".into()])].into_iter().collect();

        let diff = diff_maps(&main, &shadow, |a, b| a == b);
        assert!(diff.changed.contains_key("vary"));
        assert!(diff.has_differences());
    }

    #[test]
    fn hash_and_btree_maps_mix() {
        let main: HashMap<&str, i32> = [("a", 1), ("b", 2)].into_iter().collect();
        let shadow: BTreeMap<&str, i32> = [("b", 3), ("c", 4)].into_iter().collect();

        let diff = diff_maps(&main, &shadow, |a, b| a == b);
        assert_eq!(diff.added, vec![MapEntry { key: "a", value: 1 }]);
        assert_eq!(diff.missing, vec![MapEntry { key: "c", value: 4 }]);
        assert_eq!(diff.changed["b"], DiffValue { main: 2, shadow: 3 });
        assert_eq!(diff.difference_count(), 3);
    }

    #[test]
    fn empty_maps_have_no_differences() {
        let empty: BTreeMap<usize, i32> = BTreeMap::new();
        let diff = diff_maps(&empty, &empty, |a, b| a == b);
        assert_eq!(diff, MapDiffResult::default());
        assert!(!diff.has_differences());
    }

    fn small_map() -> impl Strategy<Value = HashMap<String, u8>> {
        prop::collection::hash_map("[a-f]{1,2}", 0u8..4, 0..12)
    }

    proptest! {
        #[test]
        fn every_key_lands_in_exactly_one_class(main in small_map(), shadow in small_map()) {
            let diff = diff_maps(&main, &shadow, |a, b| a == b);

            let added = keys(&diff.added);
            let missing = keys(&diff.missing);
            let equal = keys(&diff.equal);
            let changed: BTreeSet<String> = diff.changed.keys().cloned().collect();

            let total = added.len() + missing.len() + equal.len() + changed.len();
            let union: BTreeSet<String> = main.keys().chain(shadow.keys()).cloned().collect();
            prop_assert_eq!(total, union.len());

            let mut seen = BTreeSet::new();
            seen.extend(added);
            seen.extend(missing);
            seen.extend(equal);
            seen.extend(changed);
            prop_assert_eq!(seen, union);
        }

        #[test]
        fn swapping_sides_swaps_added_and_missing(main in small_map(), shadow in small_map()) {
            let forward = diff_maps(&main, &shadow, |a, b| a == b);
            let backward = diff_maps(&shadow, &main, |a, b| a == b);

            prop_assert_eq!(keys(&forward.added), keys(&backward.missing));
            prop_assert_eq!(keys(&forward.missing), keys(&backward.added));
            prop_assert_eq!(keys(&forward.equal), keys(&backward.equal));
            for (key, value) in &forward.changed {
                let mirrored = &backward.changed[key];
                prop_assert_eq!(value.main, mirrored.shadow);
                prop_assert_eq!(value.shadow, mirrored.main);
            }
            prop_assert_eq!(forward.changed.len(), backward.changed.len());
        }

        #[test]
        fn diff_against_itself_is_all_equal(main in small_map()) {
            let diff = diff_maps(&main, &main, |a, b| a == b);
            prop_assert!(diff.added.is_empty());
            prop_assert!(diff.missing.is_empty());
            prop_assert!(diff.changed.is_empty());
            prop_assert_eq!(diff.equal.len(), main.len());
        }
    }
}
