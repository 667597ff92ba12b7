//! Network engine contract.
//!
//! The engine owns the DHT wire protocol, the routing table and metadata
//! transfers. The crawler only issues fire-and-forget requests through
//! [`NetworkEngine`] and reacts to [`EngineEvent`]s delivered on a channel.

use std::time::Duration;

use tokio::sync::mpsc;

use hamster_core::{Endpoint, InfoHash, TorrentFile};

/// Random 160-bit target sent with a sample request.
pub type SampleTarget = [u8; 20];

/// Engine-side handle for an in-flight metadata download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DownloadHandle(pub u64);

/// Full description of a torrent whose metadata finished downloading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataDescriptor {
    pub handle: DownloadHandle,
    pub info_hash: InfoHash,
    pub name: String,
    pub total_size: u64,
    pub files: Vec<TorrentFile>,
}

/// Everything the engine reports back, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Any DHT packet arrived from this node.
    PeerObserved(Endpoint),
    /// A node answered a sample request.
    QueryResult {
        hashes: Vec<InfoHash>,
        peers: Vec<Endpoint>,
        interval: Duration,
    },
    MetadataReady(MetadataDescriptor),
}

pub type EventSender = mpsc::UnboundedSender<EngineEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

/// Requests the crawler can make of the engine. None of them block.
pub trait NetworkEngine: Send {
    /// Ask `endpoint` for a sample of the info hashes it has seen.
    fn send_query_request(&self, endpoint: Endpoint, target: SampleTarget);

    /// Start fetching metadata for `info_hash`. Timeouts and retries are
    /// the engine's business.
    fn request_metadata(&self, info_hash: &InfoHash) -> DownloadHandle;

    /// Drop a download, optionally deleting its temporary files.
    fn release_download(&self, handle: DownloadHandle, delete_files: bool);
}
