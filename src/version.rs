//! Per-name version history
//!
//! A [`VersionStore`] holds every distinct body registered under one qualified
//! name. `versions` is append-only in registration order; `major_versions`
//! marks compatibility epochs and only its last slot is ever overwritten.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::checksum::Checksum;
use crate::dependency::Snapshot;

/// One registered schema body. Immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationEntry {
    /// Qualified name of the schema
    pub name: String,
    /// Canonical content hash
    pub hash: Checksum,
    /// Index into the minor version list
    pub version: usize,
    /// Index into the major version list. Under strict evolution every entry
    /// opens its own major version, so this equals `version`.
    pub major_version: usize,
    /// The schema as submitted
    pub schema: Arc<Value>,
    /// Dependency bodies as they were when this entry was created
    pub snapshot: Snapshot,
    pub registered_at: DateTime<Utc>,
}

/// Where a new entry lands in the major version list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Epoch {
    /// Append: the entry opens a new major version
    Start,
    /// Overwrite the last slot: the entry continues the current major version
    Continue,
}

/// Version history for a single qualified name
#[derive(Debug, Default)]
pub struct VersionStore {
    versions: Vec<Checksum>,
    major_versions: Vec<Checksum>,
    schemas: HashMap<Checksum, Arc<RegistrationEntry>>,
}

impl VersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry already registered under this content hash
    pub fn find(&self, hash: &Checksum) -> Option<&Arc<RegistrationEntry>> {
        self.schemas.get(hash)
    }

    /// Number of distinct bodies registered
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn major_len(&self) -> usize {
        self.major_versions.len()
    }

    /// Most recently registered entry
    pub fn latest(&self) -> Option<&Arc<RegistrationEntry>> {
        self.get_minor(None)
    }

    /// Entry currently representing the newest major version
    pub fn latest_major(&self) -> Option<&Arc<RegistrationEntry>> {
        self.get_major(None)
    }

    pub fn get_minor(&self, index: Option<i64>) -> Option<&Arc<RegistrationEntry>> {
        lookup(&self.versions, &self.schemas, index)
    }

    pub fn get_major(&self, index: Option<i64>) -> Option<&Arc<RegistrationEntry>> {
        lookup(&self.major_versions, &self.schemas, index)
    }

    /// All entries in registration order
    pub fn entries(&self) -> impl Iterator<Item = &Arc<RegistrationEntry>> + '_ {
        self.versions.iter().filter_map(|h| self.schemas.get(h))
    }

    /// Major version index the next entry gets for the given placement
    pub fn major_index_for(&self, epoch: Epoch) -> usize {
        match epoch {
            Epoch::Start => self.major_versions.len(),
            Epoch::Continue => self.major_versions.len().saturating_sub(1),
        }
    }

    /// Append a new entry and place it in the major version list
    pub fn insert(&mut self, entry: Arc<RegistrationEntry>, epoch: Epoch) {
        let hash = entry.hash.clone();
        self.versions.push(hash.clone());

        match (epoch, self.major_versions.last_mut()) {
            (Epoch::Continue, Some(slot)) => *slot = hash.clone(),
            _ => self.major_versions.push(hash.clone()),
        }

        self.schemas.insert(hash, entry);
    }
}

/// Resolve a possibly relative index against a list of length `len`.
///
/// `None` is the last element; negative values count back from it, so `-1`
/// is the second most recent. Out of range gives `None`.
pub fn resolve_index(len: usize, index: Option<i64>) -> Option<usize> {
    let last = len.checked_sub(1)? as i64;
    let effective = match index {
        None => last,
        Some(i) if i < 0 => last + i,
        Some(i) => i,
    };
    (0..=last).contains(&effective).then_some(effective as usize)
}

fn lookup<'a>(
    list: &[Checksum],
    schemas: &'a HashMap<Checksum, Arc<RegistrationEntry>>,
    index: Option<i64>,
) -> Option<&'a Arc<RegistrationEntry>> {
    resolve_index(list.len(), index).and_then(|i| schemas.get(&list[i]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(n: usize, major: usize) -> Arc<RegistrationEntry> {
        let schema = json!({ "name": "t", "type": "enum", "symbols": [format!("S{}", n)] });
        Arc::new(RegistrationEntry {
            name: "t".to_string(),
            hash: Checksum::of_schema(&schema),
            version: n,
            major_version: major,
            schema: Arc::new(schema),
            snapshot: Snapshot::new(),
            registered_at: Utc::now(),
        })
    }

    #[test]
    fn test_resolve_index() {
        assert_eq!(resolve_index(0, None), None);
        assert_eq!(resolve_index(3, None), Some(2));
        assert_eq!(resolve_index(3, Some(0)), Some(0));
        assert_eq!(resolve_index(3, Some(2)), Some(2));
        assert_eq!(resolve_index(3, Some(3)), None);
        assert_eq!(resolve_index(3, Some(-1)), Some(1));
        assert_eq!(resolve_index(3, Some(-2)), Some(0));
        assert_eq!(resolve_index(3, Some(-3)), None);
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut store = VersionStore::new();
        assert!(store.latest().is_none());

        store.insert(entry(0, 0), Epoch::Start);
        store.insert(entry(1, 1), Epoch::Start);

        assert_eq!(store.len(), 2);
        assert_eq!(store.latest().unwrap().version, 1);
        assert_eq!(store.get_minor(Some(0)).unwrap().version, 0);
        assert!(store.get_minor(Some(2)).is_none());
        assert_eq!(store.major_len(), 2);
        assert_eq!(store.get_major(Some(1)).unwrap().version, 1);
        assert!(store.find(&store.get_minor(Some(0)).unwrap().hash.clone()).is_some());
    }

    #[test]
    fn test_major_epochs() {
        let mut store = VersionStore::new();
        store.insert(entry(0, 0), Epoch::Start);
        assert_eq!(store.major_index_for(Epoch::Continue), 0);
        store.insert(entry(1, 0), Epoch::Continue);
        assert_eq!(store.major_index_for(Epoch::Start), 1);
        store.insert(entry(2, 1), Epoch::Start);

        assert_eq!(store.len(), 3);
        assert_eq!(store.major_len(), 2);
        assert_eq!(store.get_major(Some(0)).unwrap().version, 1);
        assert_eq!(store.latest_major().unwrap().version, 2);
        assert_eq!(store.get_major(Some(-1)).unwrap().version, 1);

        let order: Vec<_> = store.entries().map(|e| e.version).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_continue_on_empty_store_opens_first_major() {
        let mut store = VersionStore::new();
        store.insert(entry(0, 0), Epoch::Continue);
        assert_eq!(store.major_len(), 1);
        assert_eq!(store.latest_major().unwrap().version, 0);
    }
}
