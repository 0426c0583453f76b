// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SHA-1 digests and the channel hash index

use sha1::{Digest, Sha1};
use std::io::Read;
use std::path::Path;
use swarm_core::RwMap;

/// Hex SHA-1 of a byte slice
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hex SHA-1 of a file, streamed
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Channel name -> digest of the last known-good content.
///
/// An entry, when present, matches the file on disk. Writers that change
/// a file update or drop its entry under the same operation.
#[derive(Default)]
pub struct HashIndex {
    entries: RwMap<String, String>,
}

impl HashIndex {
    pub fn get(&self, name: &str) -> Option<String> {
        self.entries.get(&name.to_string())
    }

    pub fn set(&self, name: &str, hash: String) {
        self.entries.insert(name.to_string(), hash);
    }

    pub fn forget(&self, name: &str) {
        self.entries.remove(&name.to_string());
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted copy, for comparisons
    pub fn snapshot(&self) -> Vec<(String, String)> {
        let mut entries = self.entries.entries();
        entries.sort();
        entries
    }
}

#[cfg(test)]
#[path = "hash_tests.rs"]
mod tests;
