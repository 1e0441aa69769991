// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use crate::PatchHash;

/// Strings computed from patch data, keyed by the content hash.
///
/// Entries are never evicted.
#[derive(Debug, Default)]
pub struct HashCache {
    entries: RwLock<HashMap<PatchHash, String>>,
}

impl HashCache {
    #[must_use]
    pub fn get(&self, hash: &PatchHash) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(hash)
            .cloned()
    }

    pub fn insert(&self, hash: PatchHash, value: String) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hash, value);
    }

    /// Look up a value or compute and insert it.
    ///
    /// The read lock is not held while computing the value. Nothing is
    /// inserted if the computation fails.
    pub fn get_or_try_insert_with<F>(&self, hash: PatchHash, compute: F) -> Option<String>
    where
        F: FnOnce() -> Option<String>,
    {
        if let Some(value) = self.get(&hash) {
            return Some(value);
        }
        let value = compute()?;
        self.insert(hash, value.clone());
        Some(value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
