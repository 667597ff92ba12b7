//! Hamster integration test harness.
//!
//! Tests drive a real `Crawler` against a SQLite file with the scripted
//! `FakeEngine` standing in for the DHT. The index is inspected through a
//! second connection, the way an external reader would see it.

mod crawl;
mod migration;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{bail, Result};
use rusqlite::Connection;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use hamster_services::{CrawlSettings, CrawlStats, Crawler, FakeEngine, Store};

// ── Harness ───────────────────────────────────────────────────────────────────

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// A scratch directory removed on drop.
pub struct TempDir(PathBuf);

impl TempDir {
    pub fn new(tag: &str) -> Self {
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "hamster-it-{tag}-{}-{id}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        Self(dir)
    }

    pub fn db_path(&self) -> PathBuf {
        self.0.join("hamster.db")
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// Settings with a fast tick so sampling is observable in tests.
pub fn fast_settings() -> CrawlSettings {
    CrawlSettings {
        tick_interval: Duration::from_millis(20),
        stats_interval: None,
        ..CrawlSettings::default()
    }
}

/// A crawler running on its own task.
pub struct RunningCrawler {
    pub engine: FakeEngine,
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<CrawlStats>,
}

impl RunningCrawler {
    pub fn spawn(db: &Path, settings: CrawlSettings) -> Result<Self> {
        let mut store = Store::open(db)?;
        store.migrate()?;

        let (engine, events) = FakeEngine::start();
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let crawler = Crawler::new(store, engine.clone(), settings);
        let task = tokio::spawn(crawler.run(events, shutdown_rx));

        Ok(Self {
            engine,
            shutdown,
            task,
        })
    }

    pub async fn stop(self) -> Result<CrawlStats> {
        let _ = self.shutdown.send(());
        Ok(self.task.await?)
    }
}

/// Read-only view of the index, as a second connection.
pub fn open_reader(db: &Path) -> Result<Connection> {
    Ok(Connection::open(db)?)
}

pub fn count(conn: &Connection, table: &str) -> Result<i64> {
    Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })?)
}

/// Poll until `check` passes or `timeout` elapses.
pub async fn wait_for<F>(timeout: Duration, mut check: F) -> Result<()>
where
    F: FnMut() -> Result<bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check()? {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
    let names = stmt.query_map([], |row| row.get(0))?;
    Ok(names.collect::<rusqlite::Result<_>>()?)
}
