//! hamster-services: crawl state, scheduling and persistence.

pub mod crawler;
pub mod dedup;
mod dispatch;
pub mod engine;
pub mod fake_engine;
pub mod migrator;
pub mod registry;
mod sampler;
pub mod store;

pub use crawler::{CrawlSettings, CrawlStats, Crawler};
pub use dedup::HashDedupSet;
pub use engine::{
    DownloadHandle, EngineEvent, EventReceiver, EventSender, MetadataDescriptor, NetworkEngine,
    SampleTarget,
};
pub use fake_engine::{EngineCall, FakeEngine};
pub use migrator::{MigrationError, MigrationReport, LATEST_VERSION};
pub use registry::{NodeRegistry, NodeState};
pub use store::{InsertOutcome, Store, StoreError};
