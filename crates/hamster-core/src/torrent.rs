//! Torrent descriptions as they are indexed.

use crate::infohash::InfoHash;

/// One file inside a torrent, in the order the torrent lists it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentFile {
    pub path: String,
    pub size: u64,
}

impl TorrentFile {
    pub fn new(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }
}

/// A completed metadata description waiting to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTorrent {
    pub info_hash: InfoHash,
    pub name: String,
    pub total_size: u64,
    pub files: Vec<TorrentFile>,
}

/// A torrent row read back from the store. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentRecord {
    pub id: i64,
    pub info_hash: InfoHash,
    pub name: String,
    pub total_size: u64,
    pub files: Vec<TorrentFile>,
}
