//! Production engine adapter.
//!
//! The DHT itself runs in a separate engine process. We talk to it over one
//! TCP connection carrying newline-delimited JSON: commands go out from a
//! writer task, events come back through a reader task onto the crawler's
//! event channel.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use hamster_core::{EngineConfig, InfoHash, InfoHashError, TorrentFile};
use hamster_services::{
    DownloadHandle, EngineEvent, EventReceiver, EventSender, MetadataDescriptor, NetworkEngine,
    SampleTarget,
};

// ── Wire format ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct WireInfoHash {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    v1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    v2: Option<String>,
}

impl From<&InfoHash> for WireInfoHash {
    fn from(hash: &InfoHash) -> Self {
        Self {
            v1: hash.v1_hex(),
            v2: hash.v2_hex(),
        }
    }
}

impl TryFrom<WireInfoHash> for InfoHash {
    type Error = InfoHashError;

    fn try_from(wire: WireInfoHash) -> Result<Self, Self::Error> {
        InfoHash::from_hex_parts(wire.v1.as_deref(), wire.v2.as_deref())
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum Command {
    Start {
        bootstrap_nodes: Vec<String>,
        save_path: String,
    },
    SampleInfohashes {
        endpoint: SocketAddr,
        target: String,
    },
    AddTorrent {
        handle: u64,
        info_hash: WireInfoHash,
        save_path: String,
    },
    RemoveTorrent {
        handle: u64,
        delete_files: bool,
    },
}

#[derive(Debug, Deserialize)]
struct WireFile {
    path: String,
    size: u64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    DhtPkt {
        node: SocketAddr,
    },
    DhtSampleInfohashes {
        samples: Vec<String>,
        nodes: Vec<SocketAddr>,
        interval_secs: u64,
    },
    MetadataReceived {
        handle: u64,
        info_hash: WireInfoHash,
        name: String,
        total_size: u64,
        files: Vec<WireFile>,
    },
}

impl TryFrom<WireEvent> for EngineEvent {
    type Error = InfoHashError;

    fn try_from(wire: WireEvent) -> Result<Self, Self::Error> {
        Ok(match wire {
            WireEvent::DhtPkt { node } => EngineEvent::PeerObserved(node),
            WireEvent::DhtSampleInfohashes {
                samples,
                nodes,
                interval_secs,
            } => {
                let mut hashes = Vec::with_capacity(samples.len());
                for sample in &samples {
                    match sample.parse::<InfoHash>() {
                        Ok(h) => hashes.push(h),
                        Err(e) => tracing::debug!(sample = %sample, error = %e, "skipping malformed sample"),
                    }
                }
                EngineEvent::QueryResult {
                    hashes,
                    peers: nodes,
                    interval: Duration::from_secs(interval_secs),
                }
            }
            WireEvent::MetadataReceived {
                handle,
                info_hash,
                name,
                total_size,
                files,
            } => EngineEvent::MetadataReady(MetadataDescriptor {
                handle: DownloadHandle(handle),
                info_hash: info_hash.try_into()?,
                name,
                total_size,
                files: files
                    .into_iter()
                    .map(|f| TorrentFile::new(f.path, f.size))
                    .collect(),
            }),
        })
    }
}

fn parse_event(line: &str) -> Result<EngineEvent> {
    let wire: WireEvent = serde_json::from_str(line).context("malformed engine event")?;
    Ok(EngineEvent::try_from(wire)?)
}

// ── Adapter ───────────────────────────────────────────────────────────────────

pub struct SidecarEngine {
    commands: mpsc::UnboundedSender<Command>,
    next_handle: AtomicU64,
    save_path: String,
    reader: JoinHandle<()>,
    _writer: JoinHandle<()>,
}

impl SidecarEngine {
    /// Connect to the engine and start a session.
    pub async fn start(config: &EngineConfig) -> Result<(Self, EventReceiver)> {
        let stream = TcpStream::connect(&config.addr)
            .await
            .with_context(|| format!("failed to connect to engine at {}", config.addr))?;
        stream.set_nodelay(true).ok();
        let (read, write) = stream.into_split();

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (events, event_rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(write_loop(write, command_rx));
        let reader = tokio::spawn(read_loop(read, events));

        let save_path = config.save_path.to_string_lossy().into_owned();
        commands
            .send(Command::Start {
                bootstrap_nodes: config.bootstrap_nodes.clone(),
                save_path: save_path.clone(),
            })
            .context("engine writer exited before session start")?;

        tracing::info!(addr = %config.addr, "engine session started");

        let engine = Self {
            commands,
            next_handle: AtomicU64::new(1),
            save_path,
            reader,
            _writer: writer,
        };
        Ok((engine, event_rx))
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("engine connection gone, dropping command");
        }
    }
}

impl NetworkEngine for SidecarEngine {
    fn send_query_request(&self, endpoint: SocketAddr, target: SampleTarget) {
        self.send(Command::SampleInfohashes {
            endpoint,
            target: hex::encode(target),
        });
    }

    fn request_metadata(&self, info_hash: &InfoHash) -> DownloadHandle {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.send(Command::AddTorrent {
            handle,
            info_hash: info_hash.into(),
            save_path: self.save_path.clone(),
        });
        DownloadHandle(handle)
    }

    fn release_download(&self, handle: DownloadHandle, delete_files: bool) {
        self.send(Command::RemoveTorrent {
            handle: handle.0,
            delete_files,
        });
    }
}

impl Drop for SidecarEngine {
    fn drop(&mut self) {
        // The writer stops on its own once `commands` is dropped.
        self.reader.abort();
    }
}

async fn write_loop(mut write: OwnedWriteHalf, mut commands: mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = commands.recv().await {
        let mut line = match serde_json::to_vec(&command) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode engine command");
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = write.write_all(&line).await {
            tracing::warn!(error = %e, "engine connection write failed");
            return;
        }
    }
    let _ = write.shutdown().await;
}

async fn read_loop(read: OwnedReadHalf, events: EventSender) {
    let mut lines = BufReader::new(read).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::info!("engine closed the connection");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "engine connection read failed");
                return;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match parse_event(&line) {
            Ok(event) => {
                if events.send(event).is_err() {
                    // crawler stopped listening
                    return;
                }
            }
            Err(e) => tracing::warn!(error = %format!("{e:#}"), "skipping engine event"),
        }
    }
}
