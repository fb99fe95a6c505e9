//! Structurally shared maps for copy-on-write snapshot edits.
//!
//! A `CowMap` is an `Arc`'d ordered map of `Arc`'d records. Producing an
//! edited map copies the outer map (one refcount bump per entry) and
//! replaces exactly one record; every other record stays shared with the
//! map it was derived from. Published snapshots are never mutated in place.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CowMap<V>(Arc<BTreeMap<String, Arc<V>>>);

impl<V> Default for CowMap<V> {
    fn default() -> Self {
        Self(Arc::new(BTreeMap::new()))
    }
}

impl<V> CowMap<V> {
    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.get(key).map(|v| v.as_ref())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &V)> {
        self.0.iter().map(|(k, v)| (k, v.as_ref()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.0.values().map(|v| v.as_ref())
    }

    /// Returns a map with `key` set to `value`, sharing all other records.
    pub fn with(&self, key: impl Into<String>, value: V) -> Self {
        let mut next = self.0.as_ref().clone();
        next.insert(key.into(), Arc::new(value));
        Self(Arc::new(next))
    }

    /// Returns a map without `key`, sharing all remaining records.
    pub fn without(&self, key: &str) -> Self {
        let mut next = self.0.as_ref().clone();
        next.remove(key);
        Self(Arc::new(next))
    }

    /// True if both maps hold the very same record allocation for `key`.
    pub fn shares(&self, other: &Self, key: &str) -> bool {
        match (self.0.get(key), other.0.get(key)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<V: Clone> CowMap<V> {
    /// Copies the record at `key`, lets `edit` change the copy and returns
    /// the resulting map. `None` if `key` is absent.
    pub fn update<E>(
        &self,
        key: &str,
        edit: impl FnOnce(&mut V) -> Result<(), E>,
    ) -> Option<Result<Self, E>> {
        let mut record = self.get(key)?.clone();
        Some(edit(&mut record).map(|()| self.with(key, record)))
    }
}

impl<V> FromIterator<(String, V)> for CowMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        Self(Arc::new(
            iter.into_iter().map(|(k, v)| (k, Arc::new(v))).collect(),
        ))
    }
}
