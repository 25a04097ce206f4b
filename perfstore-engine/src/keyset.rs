//! The set of keys known to exist in the backend.

use std::collections::HashSet;

use rand::Rng;

/// Number of digits of the counter in generated keys.
const KEY_DIGITS: usize = 10;

/// An unordered collection of keys known to exist in the backend.
///
/// The set is built once during [preset](crate::preset::preset) and then shared read-only by all
/// workload workers, so workers never need to synchronize on it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeySet {
    keys: Vec<String>,
}

impl KeySet {
    /// Creates an empty key set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if the set contains no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns an iterator over all keys.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Selects a key uniformly at random, or `None` if the set is empty.
    pub fn choose(&self, rng: &mut impl Rng) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }

        let index = rng.random_range(0..self.keys.len());
        Some(&self.keys[index])
    }
}

impl FromIterator<String> for KeySet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut seen = HashSet::new();
        let keys = iter
            .into_iter()
            .filter(|key| seen.insert(key.clone()))
            .collect();

        Self { keys }
    }
}

impl Extend<String> for KeySet {
    fn extend<I: IntoIterator<Item = String>>(&mut self, iter: I) {
        let mut seen: HashSet<String> = self.keys.iter().cloned().collect();
        self.keys.extend(iter.into_iter().filter(|key| seen.insert(key.clone())));
    }
}

/// Generates `count` new keys that collide with none of the `existing` keys.
///
/// Keys are `<prefix><counter>` with a zero-padded counter starting at zero. Counter values whose
/// key already exists are skipped, so gaps left by failed creates of an earlier run are filled
/// first.
pub fn generate_keys(prefix: &str, count: usize, existing: &KeySet) -> Vec<String> {
    let taken: HashSet<&str> = existing.iter().collect();

    (0u64..)
        .map(|counter| format!("{prefix}{counter:0width$}", width = KEY_DIGITS))
        .filter(|key| !taken.contains(key.as_str()))
        .take(count)
        .collect()
}
