//! Schema migrations.
//!
//! Migrations run once at startup, in order, from the version recorded in
//! `PRAGMA user_version`. The whole run happens inside one transaction so
//! a failing step leaves both the schema and the version untouched.

use rusqlite::{Connection, Transaction};

/// One forward-only schema step.
struct Migration {
    name: &'static str,
    apply: fn(&Transaction<'_>) -> rusqlite::Result<()>,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "init",
        apply: init,
    },
    Migration {
        name: "remove_unnecessary_tables",
        apply: remove_unnecessary_tables,
    },
];

/// Schema version after every known migration has run.
pub const LATEST_VERSION: u32 = MIGRATIONS.len() as u32;

fn init(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(
        "CREATE TABLE nodes (
             id           INTEGER PRIMARY KEY,
             remote_addr  TEXT    NOT NULL,
             port         INTEGER NOT NULL,
             last_seen    INTEGER NOT NULL,
             next_request INTEGER NOT NULL,
             UNIQUE (remote_addr, port)
         );

         CREATE TABLE samples (
             id           INTEGER NOT NULL PRIMARY KEY,
             info_hash_v1 TEXT    NULL UNIQUE,
             info_hash_v2 TEXT    NULL UNIQUE,
             timestamp    INTEGER NOT NULL
         );

         CREATE TABLE torrents (
             id           INTEGER PRIMARY KEY,
             info_hash_v1 TEXT    NULL UNIQUE,
             info_hash_v2 TEXT    NULL UNIQUE,
             name         TEXT    NOT NULL,
             size         INTEGER NOT NULL
         );

         CREATE TABLE torrentfiles (
             id         INTEGER PRIMARY KEY,
             torrent_id INTEGER NOT NULL REFERENCES torrents(id),
             path       TEXT    NOT NULL,
             size       INTEGER NOT NULL
         );",
    )
}

/// Node and sample bookkeeping moved into memory.
fn remove_unnecessary_tables(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(
        "DROP TABLE IF EXISTS nodes;
         DROP TABLE IF EXISTS samples;",
    )
}

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("failed to read schema version: {0}")]
    ReadVersion(#[source] rusqlite::Error),
    #[error("failed to begin migration transaction: {0}")]
    Begin(#[source] rusqlite::Error),
    #[error("database schema version {found} is newer than this build supports ({latest})")]
    UnknownVersion { found: u32, latest: u32 },
    #[error("migration #{index} ({name}) failed: {source}")]
    Step {
        index: u32,
        name: &'static str,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to record schema version: {0}")]
    WriteVersion(#[source] rusqlite::Error),
}

/// Outcome of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    pub from: u32,
    pub to: u32,
}

impl MigrationReport {
    pub fn applied(&self) -> u32 {
        self.to - self.from
    }
}

pub fn schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
}

/// Bring the schema up to [`LATEST_VERSION`].
pub fn migrate(conn: &mut Connection) -> Result<MigrationReport, MigrationError> {
    let current = schema_version(conn).map_err(MigrationError::ReadVersion)?;

    if current > LATEST_VERSION {
        return Err(MigrationError::UnknownVersion {
            found: current,
            latest: LATEST_VERSION,
        });
    }

    let pending = LATEST_VERSION - current;
    tracing::info!(version = current, pending, "database version checked");

    if pending == 0 {
        return Ok(MigrationReport {
            from: current,
            to: current,
        });
    }

    let tx = conn.transaction().map_err(MigrationError::Begin)?;

    for (index, migration) in MIGRATIONS.iter().enumerate().skip(current as usize) {
        let index = index as u32;
        (migration.apply)(&tx).map_err(|source| MigrationError::Step {
            index,
            name: migration.name,
            source,
        })?;
        tracing::debug!(index, name = migration.name, "migration applied");
    }

    tx.pragma_update(None, "user_version", LATEST_VERSION)
        .map_err(MigrationError::WriteVersion)?;
    tx.commit().map_err(MigrationError::WriteVersion)?;

    tracing::info!(version = LATEST_VERSION, "database migrated and up to date");

    Ok(MigrationReport {
        from: current,
        to: LATEST_VERSION,
    })
}
