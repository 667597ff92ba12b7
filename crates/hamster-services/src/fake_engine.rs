//! Deterministic in-process engine for tests.
//!
//! Records every request in call order, hands out sequential download
//! handles, and pushes scripted events into the same channel type the
//! production adapter uses.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use hamster_core::{Endpoint, InfoHash};

use crate::engine::{
    DownloadHandle, EngineEvent, EventReceiver, EventSender, NetworkEngine, SampleTarget,
};

/// A request the crawler made of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Query { endpoint: Endpoint, target: SampleTarget },
    RequestMetadata { info_hash: InfoHash, handle: DownloadHandle },
    Release { handle: DownloadHandle, delete_files: bool },
}

#[derive(Default)]
struct FakeState {
    calls: Vec<EngineCall>,
    next_handle: u64,
}

/// Cloneable fake; clones share the call log and the event channel.
#[derive(Clone)]
pub struct FakeEngine {
    state: Arc<Mutex<FakeState>>,
    events: EventSender,
}

impl FakeEngine {
    /// Start a fake session. The receiver goes to the crawler.
    pub fn start() -> (Self, EventReceiver) {
        let (events, rx) = mpsc::unbounded_channel();
        let engine = Self {
            state: Arc::new(Mutex::new(FakeState::default())),
            events,
        };
        (engine, rx)
    }

    /// Deliver one event. Returns false once the crawler stopped listening.
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Deliver a scripted sequence in order.
    pub fn script(&self, events: impl IntoIterator<Item = EngineEvent>) {
        for event in events {
            if !self.emit(event) {
                break;
            }
        }
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.lock().calls.clone()
    }

    pub fn queried(&self) -> Vec<Endpoint> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                EngineCall::Query { endpoint, .. } => Some(*endpoint),
                _ => None,
            })
            .collect()
    }

    pub fn metadata_requests(&self) -> Vec<InfoHash> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                EngineCall::RequestMetadata { info_hash, .. } => Some(*info_hash),
                _ => None,
            })
            .collect()
    }

    pub fn released(&self) -> Vec<DownloadHandle> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                EngineCall::Release { handle, .. } => Some(*handle),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        // A test that panicked mid-call still leaves a usable log.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl NetworkEngine for FakeEngine {
    fn send_query_request(&self, endpoint: Endpoint, target: SampleTarget) {
        self.lock().calls.push(EngineCall::Query { endpoint, target });
    }

    fn request_metadata(&self, info_hash: &InfoHash) -> DownloadHandle {
        let mut state = self.lock();
        state.next_handle += 1;
        let handle = DownloadHandle(state.next_handle);
        state.calls.push(EngineCall::RequestMetadata {
            info_hash: *info_hash,
            handle,
        });
        handle
    }

    fn release_download(&self, handle: DownloadHandle, delete_files: bool) {
        self.lock().calls.push(EngineCall::Release {
            handle,
            delete_files,
        });
    }
}
