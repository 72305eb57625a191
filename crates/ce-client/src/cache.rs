//! Memoized compile results
//!
//! The boundary search revisits the same compiler across runs and groups,
//! so compile results are cached for the lifetime of a client. Entries are
//! never evicted.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use crate::models::{CompileRequest, CompileResponse};

/// Cache key: compiler, normalized arguments, library set, source hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompileKey {
    pub compiler_id: String,
    pub user_arguments: String,
    /// Sorted, deduplicated `(id, version)` pairs
    pub libraries: Vec<(String, String)>,
    /// SHA-256 of the source text, hex encoded
    pub source_digest: String,
}

impl CompileKey {
    pub fn for_request(req: &CompileRequest) -> Self {
        let libraries: BTreeSet<(String, String)> = req
            .libraries
            .iter()
            .map(|l| (l.id.trim().to_string(), l.version.trim().to_string()))
            .filter(|(id, ver)| !id.is_empty() && !ver.is_empty())
            .collect();

        CompileKey {
            compiler_id: req.compiler_id.clone(),
            user_arguments: normalize_whitespace(&req.user_arguments),
            libraries: libraries.into_iter().collect(),
            source_digest: source_digest(&req.source),
        }
    }
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Hex SHA-256 of a source text.
pub fn source_digest(source: &str) -> String {
    hex::encode(Sha256::digest(source.as_bytes()))
}

/// Thread-safe map from [`CompileKey`] to the normalized response.
#[derive(Debug, Default)]
pub struct CompileCache {
    entries: Mutex<HashMap<CompileKey, CompileResponse>>,
}

impl CompileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CompileKey) -> Option<CompileResponse> {
        self.lock().get(key).cloned()
    }

    pub fn insert(&self, key: CompileKey, response: CompileResponse) {
        self.lock().insert(key, response);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CompileKey, CompileResponse>> {
        // A panic while holding the guard leaves the map itself intact.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
