//! Crawler: the single task that owns all crawl state.
//!
//! Sampling ticks, engine events and the stats timer are multiplexed onto
//! one `select!` loop, so the registry, dedup set and store are only ever
//! touched from here and in arrival order. Persistence runs inline: a slow
//! disk stalls event processing until the write returns.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use hamster_core::CrawlerConfig;

use crate::dedup::HashDedupSet;
use crate::engine::{EventReceiver, NetworkEngine};
use crate::registry::NodeRegistry;
use crate::store::Store;

/// Timing and sizing knobs for the crawl loop.
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub tick_interval: Duration,
    pub sample_cooldown: Duration,
    pub min_requery: Duration,
    pub max_nodes: usize,
    pub node_ttl: Duration,
    pub stats_interval: Option<Duration>,
}

/// Bounds for the tick and stats timers.
const MIN_PERIOD: Duration = Duration::from_millis(1);
const MAX_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

impl CrawlSettings {
    /// Timer periods pulled into a range `tokio::time::interval` accepts.
    fn clamped(mut self) -> Self {
        self.tick_interval = self.tick_interval.clamp(MIN_PERIOD, MAX_PERIOD);
        self.stats_interval = self
            .stats_interval
            .map(|every| every.clamp(MIN_PERIOD, MAX_PERIOD));
        self
    }
}

impl From<&CrawlerConfig> for CrawlSettings {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            // the file counts in whole seconds; zero would spin
            tick_interval: config.tick_interval().max(Duration::from_secs(1)),
            sample_cooldown: config.sample_cooldown(),
            min_requery: config.min_requery(),
            max_nodes: config.max_nodes,
            node_ttl: config.node_ttl(),
            stats_interval: config.stats_interval(),
        }
    }
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self::from(&CrawlerConfig::default())
    }
}

/// Running counters, reported on the stats timer and returned from `run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub samples_sent: u64,
    pub hashes_discovered: u64,
    pub metadata_requested: u64,
    pub torrents_indexed: u64,
    pub duplicates: u64,
    pub persist_failures: u64,
    /// Periodic stats lines emitted by the stats timer.
    pub reports: u64,
}

pub struct Crawler<E> {
    pub(crate) registry: NodeRegistry,
    pub(crate) dedup: HashDedupSet,
    pub(crate) store: Store,
    pub(crate) engine: E,
    pub(crate) settings: CrawlSettings,
    pub(crate) stats: CrawlStats,
}

impl<E: NetworkEngine> Crawler<E> {
    /// `store` must already be migrated.
    pub fn new(store: Store, engine: E, settings: CrawlSettings) -> Self {
        let settings = settings.clamped();
        Self {
            registry: NodeRegistry::new(settings.min_requery, settings.max_nodes, settings.node_ttl),
            dedup: HashDedupSet::new(),
            store,
            engine,
            settings,
            stats: CrawlStats::default(),
        }
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn dedup(&self) -> &HashDedupSet {
        &self.dedup
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn stats(&self) -> CrawlStats {
        self.stats
    }

    /// Process ticks and engine events until shutdown or until the engine
    /// hangs up. In-flight queries and downloads are abandoned, not drained.
    pub async fn run(
        mut self,
        mut events: EventReceiver,
        mut shutdown: broadcast::Receiver<()>,
    ) -> CrawlStats {
        let period = self.settings.tick_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut stats_ticker = self.settings.stats_interval.map(|every| {
            let mut i = time::interval_at(Instant::now() + every, every);
            i.set_missed_tick_behavior(MissedTickBehavior::Delay);
            i
        });

        tracing::info!(tick = ?period, "crawler starting");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    tracing::info!("crawler shutting down");
                    break;
                }

                _ = ticker.tick() => {
                    self.tick(Instant::now());
                }

                // ahead of events so a busy engine cannot starve it
                _ = tick_optional(&mut stats_ticker) => {
                    self.stats.reports += 1;
                    self.log_stats();
                }

                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        tracing::warn!("engine event stream closed");
                        break;
                    }
                },
            }
        }

        // Silence the engine before the state it would call into goes away.
        events.close();
        self.log_stats();
        self.stats
    }

    pub fn log_stats(&self) {
        tracing::info!(
            nodes = self.registry.len(),
            known_hashes = self.dedup.len(),
            samples_sent = self.stats.samples_sent,
            metadata_requested = self.stats.metadata_requested,
            torrents_indexed = self.stats.torrents_indexed,
            duplicates = self.stats.duplicates,
            persist_failures = self.stats.persist_failures,
            "crawl stats"
        );
    }
}

async fn tick_optional(interval: &mut Option<Interval>) {
    match interval {
        Some(i) => {
            i.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
