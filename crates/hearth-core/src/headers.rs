//! HTTP header map.
//!
//! Lookup and containment are case-insensitive: names are keyed by
//! their lowercase ASCII form. The case the caller used is kept around
//! for serialization, and iteration order is stable (alphabetical by
//! lowercase name), which keeps wire output deterministic.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct HeaderEntry {
    /// The name as originally provided, serialized as-is.
    name: String,
    value: String,
}

/// Ordered header collection with case-insensitive keys.
///
/// Setting a header that differs only in case from an existing one
/// replaces it; the most recent name casing wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: BTreeMap<String, HeaderEntry>,
}

impl HeaderMap {
    /// Create an empty header map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a header value by name (case-insensitive).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|entry| entry.value.as_str())
    }

    /// Set a header, replacing any existing value under the same
    /// case-insensitive name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let key = name.to_ascii_lowercase();
        self.entries.insert(
            key,
            HeaderEntry {
                name,
                value: value.into(),
            },
        );
    }

    /// Set a header only if it is not already present.
    pub fn set_if_absent(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let key = name.to_ascii_lowercase();
        self.entries.entry(key).or_insert_with(|| HeaderEntry {
            name,
            value: value.into(),
        });
    }

    /// Check if a header exists (case-insensitive).
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Remove a header by name (case-insensitive). Returns the removed
    /// value, if any.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries
            .remove(&name.to_ascii_lowercase())
            .map(|entry| entry.value)
    }

    /// Iterate over `(name, value)` pairs in stable order.
    ///
    /// Names come back with the casing the caller used.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|entry| (entry.name.as_str(), entry.value.as_str()))
    }

    /// Returns the number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
