//! Identifiers we have already acted on.

use std::collections::HashSet;

use hamster_core::InfoHash;

/// Insert-once set of info hashes. Lives for the process lifetime.
#[derive(Debug, Default)]
pub struct HashDedupSet {
    seen: HashSet<InfoHash>,
}

impl HashDedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `hash` as known. Returns true only the first time.
    pub fn insert(&mut self, hash: InfoHash) -> bool {
        self.seen.insert(hash)
    }

    pub fn contains(&self, hash: &InfoHash) -> bool {
        self.seen.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
