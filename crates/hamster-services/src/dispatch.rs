//! Routes engine events into the registry, the dedup set and the store.

use std::time::Duration;

use tokio::time::Instant;

use hamster_core::{Endpoint, InfoHash, NewTorrent};

use crate::crawler::Crawler;
use crate::engine::{EngineEvent, MetadataDescriptor, NetworkEngine};
use crate::store::InsertOutcome;

impl<E: NetworkEngine> Crawler<E> {
    /// Handle one engine event, stamped with the current time.
    pub fn handle_event(&mut self, event: EngineEvent) {
        self.handle_event_at(event, Instant::now());
    }

    pub fn handle_event_at(&mut self, event: EngineEvent, now: Instant) {
        match event {
            EngineEvent::PeerObserved(endpoint) => self.on_node_observed(endpoint, now),
            EngineEvent::QueryResult {
                hashes,
                peers,
                interval,
            } => self.on_query_result(&hashes, &peers, interval, now),
            EngineEvent::MetadataReady(meta) => self.on_metadata_ready(meta),
        }
    }

    pub fn on_node_observed(&mut self, endpoint: Endpoint, now: Instant) {
        if self.registry.observe(endpoint, now) {
            tracing::trace!(node = %endpoint, "node discovered");
        }
    }

    pub fn on_query_result(
        &mut self,
        hashes: &[InfoHash],
        peers: &[Endpoint],
        interval: Duration,
        now: Instant,
    ) {
        let requested = self.on_identifiers_discovered(hashes);
        let added = self.registry.on_query_result_peers(peers, interval, now);
        tracing::debug!(
            samples = hashes.len(),
            requested,
            peers = peers.len(),
            new_peers = added,
            interval = ?interval,
            "sample response"
        );
    }

    /// Request metadata for every hash not seen before. Returns how many
    /// requests went out.
    pub fn on_identifiers_discovered(&mut self, hashes: &[InfoHash]) -> usize {
        let mut requested = 0;
        for hash in hashes {
            if !self.dedup.insert(*hash) {
                continue;
            }
            self.stats.hashes_discovered += 1;

            // The dedup set starts empty on every run; the index does not.
            match self.store.torrent_exists(hash) {
                Ok(true) => {
                    tracing::trace!(info_hash = %hash, "already indexed");
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(info_hash = %hash, error = %e, "index lookup failed, requesting anyway");
                }
            }

            let handle = self.engine.request_metadata(hash);
            self.stats.metadata_requested += 1;
            requested += 1;
            tracing::trace!(info_hash = %hash, handle = handle.0, "metadata requested");
        }
        requested
    }

    /// Persist a finished description and release the download. A failed
    /// write is logged and dropped; the hash stays known and is not retried.
    pub fn on_metadata_ready(&mut self, meta: MetadataDescriptor) {
        let MetadataDescriptor {
            handle,
            info_hash,
            name,
            total_size,
            files,
        } = meta;

        self.dedup.insert(info_hash);

        let torrent = NewTorrent {
            info_hash,
            name,
            total_size,
            files,
        };

        match self.store.insert_torrent(&torrent) {
            Ok(InsertOutcome::Inserted(id)) => {
                self.stats.torrents_indexed += 1;
                tracing::info!(
                    id,
                    name = %torrent.name,
                    size = torrent.total_size,
                    files = torrent.files.len(),
                    info_hash = %info_hash,
                    "torrent indexed"
                );
            }
            Ok(InsertOutcome::AlreadyPresent) => {
                self.stats.duplicates += 1;
                tracing::debug!(info_hash = %info_hash, "torrent already indexed");
            }
            Err(e) => {
                self.stats.persist_failures += 1;
                tracing::warn!(info_hash = %info_hash, error = %e, "failed to persist torrent");
            }
        }

        self.engine.release_download(handle, true);
    }
}
