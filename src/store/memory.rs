//! Process-local store.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{BucketStore, StoreError};

/// An in-memory [`BucketStore`] backed by a concurrent map.
///
/// State is only shared between limiters in the same process, so this is
/// suitable for tests and single-instance deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read one field directly, decoded lossily as UTF-8.
    pub fn field(&self, key: &str, field: &str) -> Option<String> {
        self.entries
            .get(key)
            .and_then(|hash| hash.get(field).map(|v| String::from_utf8_lossy(v).into_owned()))
    }

    /// Write one field as arbitrary bytes.
    pub fn set_raw(&self, key: &str, field: &str, value: impl Into<Vec<u8>>) {
        self.entries
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.into());
    }

    /// Drop every key.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[async_trait]
impl BucketStore for MemoryStore {
    async fn get_fields(
        &self,
        key: &str,
        fields: &[&str],
    ) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        let values = match self.entries.get(key) {
            Some(hash) => fields.iter().map(|f| hash.get(*f).cloned()).collect(),
            None => vec![None; fields.len()],
        };
        Ok(values)
    }

    async fn set_fields(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError> {
        let mut hash = self.entries.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert((*field).to_string(), value.clone().into_bytes());
        }
        Ok(())
    }
}
