//! hamster-core: shared identifiers, torrent types and configuration.
//! All other Hamster crates depend on this one.

pub mod config;
pub mod infohash;
pub mod torrent;

pub use config::{ConfigError, CrawlerConfig, DatabaseConfig, EngineConfig, HamsterConfig};
pub use infohash::{Endpoint, InfoHash, InfoHashError};
pub use torrent::{NewTorrent, TorrentFile, TorrentRecord};
