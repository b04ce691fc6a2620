//! Parameter Override Tables
//!
//! Instances store their overrides in small sorted tables keyed by interned
//! [`Symbol`]. Entries carry an override flag: a non-overridden entry is kept
//! around for editor display but is skipped by resolution.

use uuid::Uuid;
use xxhash_rust::xxh3::Xxh3;

use crate::interner::{self, Symbol};
use crate::params::value::{ParameterKind, ParameterValue};

/// One row of an override table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterOverride {
    pub name: Symbol,
    pub value: ParameterValue,
    pub overridden: bool,
    /// Identity of the graph node the parameter belongs to. Only meaningful
    /// for static kinds, where it contributes to permutation identity.
    pub expression_id: Uuid,
}

/// Ordered collection of parameter overrides.
///
/// Kept sorted by symbol so lookup is a binary search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterOverrideTable {
    entries: Vec<ParameterOverride>,
}

impl ParameterOverrideTable {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Sets an overridden value by name.
    pub fn set(&mut self, name: &str, value: ParameterValue) -> Option<ParameterValue> {
        self.set_symbol(interner::intern(name), value)
    }

    /// Sets an overridden value, returning the previous overridden value.
    pub fn set_symbol(&mut self, name: Symbol, value: ParameterValue) -> Option<ParameterValue> {
        self.insert(ParameterOverride {
            name,
            value,
            overridden: true,
            expression_id: Uuid::nil(),
        })
    }

    /// Inserts or replaces a full entry.
    pub fn insert(&mut self, entry: ParameterOverride) -> Option<ParameterValue> {
        match self.entries.binary_search_by_key(&entry.name, |e| e.name) {
            Ok(idx) => {
                let previous = self.entries[idx];
                self.entries[idx] = entry;
                previous.overridden.then_some(previous.value)
            }
            Err(idx) => {
                self.entries.insert(idx, entry);
                None
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn entry(&self, name: Symbol) -> Option<&ParameterOverride> {
        self.entries
            .binary_search_by_key(&name, |e| e.name)
            .ok()
            .map(|idx| &self.entries[idx])
    }

    /// Value of an entry whose override flag is set.
    #[inline]
    #[must_use]
    pub fn overridden(&self, name: Symbol) -> Option<&ParameterValue> {
        self.entry(name)
            .filter(|e| e.overridden)
            .map(|e| &e.value)
    }

    pub fn remove(&mut self, name: Symbol) -> Option<ParameterOverride> {
        self.entries
            .binary_search_by_key(&name, |e| e.name)
            .ok()
            .map(|idx| self.entries.remove(idx))
    }

    /// Drops every entry for which `keep` returns false.
    pub fn retain(&mut self, keep: impl FnMut(&ParameterOverride) -> bool) {
        self.entries.retain(keep);
    }

    /// Removes entries whose override flag is clear.
    pub fn trim_to_overridden(&mut self) {
        self.entries.retain(|e| e.overridden);
    }

    #[inline]
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn overridden_count(&self) -> usize {
        self.entries.iter().filter(|e| e.overridden).count()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &ParameterOverride> {
        self.entries.iter()
    }

    /// Overridden entries of one kind.
    pub fn iter_kind(&self, kind: ParameterKind) -> impl Iterator<Item = &ParameterOverride> {
        self.entries
            .iter()
            .filter(move |e| e.overridden && e.value.kind() == kind)
    }
}

/// Compile-time parameters of an instance.
///
/// Only overridden entries count: a set whose entries are all inherited is
/// empty and shares its parent's compiled programs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticParameterSet {
    table: ParameterOverrideTable,
}

impl StaticParameterSet {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a static value. Non-static values are ignored and reported as `false`.
    pub fn set(&mut self, name: Symbol, value: ParameterValue, expression_id: Uuid) -> bool {
        if !value.is_static() {
            return false;
        }
        self.table.insert(ParameterOverride {
            name,
            value,
            overridden: true,
            expression_id,
        });
        true
    }

    #[inline]
    #[must_use]
    pub fn get(&self, name: Symbol) -> Option<&ParameterOverride> {
        self.table.entry(name).filter(|e| e.overridden)
    }

    pub fn remove(&mut self, name: Symbol) -> bool {
        self.table.remove(name).is_some()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.table.clear();
    }

    pub fn retain(&mut self, keep: impl FnMut(&ParameterOverride) -> bool) {
        self.table.retain(keep);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.overridden_count() == 0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.overridden_count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterOverride> {
        self.table.iter().filter(|e| e.overridden)
    }

    /// Stable content hash used as part of permutation identity.
    ///
    /// Hashes parameter names as strings so the key does not depend on the
    /// order in which names were interned.
    #[must_use]
    pub fn permutation_key(&self) -> u64 {
        let mut hasher = Xxh3::new();
        self.hash_into(&mut hasher);
        hasher.digest()
    }

    pub(crate) fn hash_into(&self, hasher: &mut Xxh3) {
        let mut sorted: Vec<(&'static str, &ParameterOverride)> = self
            .iter()
            .map(|e| (interner::resolve(e.name), e))
            .collect();
        sorted.sort_unstable_by_key(|(name, _)| *name);

        hasher.update(&(sorted.len() as u64).to_le_bytes());
        for (name, entry) in sorted {
            hasher.update(name.as_bytes());
            hasher.update(&[0]);
            entry.value.hash_into(hasher);
            hasher.update(entry.expression_id.as_bytes());
        }
    }
}
