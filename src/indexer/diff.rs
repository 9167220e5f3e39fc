//! Classify scanned files against what the index already holds.
use std::collections::{HashMap, HashSet};
use std::path::Path;

use super::scanner::FileRecord;
use crate::store::{IndexStore, IndexStoreError};

/// Path key → last known fingerprint, rebuilt from the store each scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FingerprintIndex {
    fingerprints: HashMap<String, String>,
}

impl FingerprintIndex {
    /// Last write wins when a path carries more than one fingerprint.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            fingerprints: pairs.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fingerprints.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fingerprints.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }
}

/// One `fetch_all_metadata` call reduced to a fingerprint per path.
pub fn load_baseline(store: &dyn IndexStore) -> Result<FingerprintIndex, IndexStoreError> {
    let metadata = store.fetch_all_metadata()?;
    Ok(FingerprintIndex::from_pairs(
        metadata.into_iter().map(|m| (m.path, m.fingerprint)),
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChange {
    New,
    Updated,
    Unchanged,
}

#[derive(Debug, Default)]
pub struct Classification {
    pub changes: Vec<(FileRecord, FileChange)>,
    /// Sorted path keys present in the baseline but gone from disk.
    pub deleted: Vec<String>,
}

impl Classification {
    #[must_use]
    pub fn count(&self, kind: FileChange) -> usize {
        self.changes.iter().filter(|(_, c)| *c == kind).count()
    }
}

/// Compare captured `records` with `baseline`.
///
/// `discovered` holds the keys of every file found on disk, supported or not.
/// Only baseline paths under `root` are deletion candidates.
#[must_use]
pub fn diff(
    records: Vec<FileRecord>,
    discovered: &HashSet<String>,
    baseline: &FingerprintIndex,
    root: &Path,
) -> Classification {
    let changes = records
        .into_iter()
        .map(|record| {
            let change = match baseline.get(&record.key) {
                None => FileChange::New,
                Some(fp) if fp == record.fingerprint => FileChange::Unchanged,
                Some(_) => FileChange::Updated,
            };
            (record, change)
        })
        .collect();

    let mut deleted: Vec<String> = baseline
        .keys()
        .filter(|key| !discovered.contains(*key))
        .filter(|key| Path::new(key.as_str()).starts_with(root))
        .cloned()
        .collect();
    deleted.sort();

    Classification { changes, deleted }
}
