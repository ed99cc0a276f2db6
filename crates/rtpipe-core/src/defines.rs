//! Preprocessor define lists.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Set of preprocessor defines passed to the shader compiler.
///
/// Keys are unique; adding an existing key replaces its value. Iteration
/// order is sorted by key so compiler invocations are reproducible.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DefineList {
    defines: BTreeMap<String, String>,
}

impl DefineList {
    /// Create an empty define list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a define.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.defines.insert(name.into(), value.into());
        self
    }

    /// Merge another list into this one. Entries from `other` win.
    pub fn extend(&mut self, other: &Self) -> &mut Self {
        for (name, value) in &other.defines {
            self.defines.insert(name.clone(), value.clone());
        }
        self
    }

    /// Remove a define, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.defines.remove(name)
    }

    /// Look up a define.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.defines.get(name).map(String::as_str)
    }

    /// Number of defines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.defines.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defines.is_empty()
    }

    /// Iterate over `(name, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.defines
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DefineList {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut list = Self::new();
        for (name, value) in iter {
            list.add(name, value);
        }
        list
    }
}
