//! Persistence gateway over the SQLite index.
//!
//! Single owner: the store lives on the crawler task and is never shared.
//! Writes run inline on that task.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use hamster_core::{InfoHash, InfoHashError, NewTorrent, TorrentFile, TorrentRecord};

use crate::migrator::{self, MigrationError, MigrationReport};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("corrupt info hash in row {id}: {source}")]
    CorruptInfoHash {
        id: i64,
        #[source]
        source: InfoHashError,
    },
    #[error("size {0} does not fit in an SQLite integer")]
    SizeOutOfRange(u64),
    #[error("negative size {size} in torrent {id}")]
    NegativeSize { id: i64, size: i64 },
}

/// Matches a row sharing either present component, mirroring the UNIQUE
/// constraints on both columns.
const MATCH_EITHER: &str = "(?1 IS NOT NULL AND info_hash_v1 = ?1) \
                            OR (?2 IS NOT NULL AND info_hash_v2 = ?2)";

fn to_sql_size(size: u64) -> Result<i64, StoreError> {
    i64::try_from(size).map_err(|_| StoreError::SizeOutOfRange(size))
}

fn from_sql_size(id: i64, size: i64) -> Result<u64, StoreError> {
    u64::try_from(size).map_err(|_| StoreError::NegativeSize { id, size })
}

/// Result of an insert-if-absent write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// New torrent row with its generated id.
    Inserted(i64),
    /// A torrent with the same v1 or v2 identifier is already indexed.
    AlreadyPresent,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database file. `:memory:` opens a private
    /// in-memory database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        Self::configure(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> Result<Self, StoreError> {
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(journal_mode = %mode, "database opened");
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn })
    }

    pub fn migrate(&mut self) -> Result<MigrationReport, MigrationError> {
        migrator::migrate(&mut self.conn)
    }

    pub fn schema_version(&self) -> Result<u32, StoreError> {
        Ok(migrator::schema_version(&self.conn)?)
    }

    /// Write a torrent and its files as one unit.
    ///
    /// The torrent row is inserted first with `ON CONFLICT DO NOTHING`, so
    /// a concurrent duplicate is reported as [`InsertOutcome::AlreadyPresent`]
    /// instead of a constraint error. File rows reference the generated id.
    pub fn insert_torrent(&mut self, torrent: &NewTorrent) -> Result<InsertOutcome, StoreError> {
        let total_size = to_sql_size(torrent.total_size)?;
        let file_sizes = torrent
            .files
            .iter()
            .map(|f| to_sql_size(f.size))
            .collect::<Result<Vec<_>, _>>()?;

        let tx = self.conn.transaction()?;

        let inserted = tx.execute(
            "INSERT INTO torrents (info_hash_v1, info_hash_v2, name, size)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT DO NOTHING",
            params![
                torrent.info_hash.v1_hex(),
                torrent.info_hash.v2_hex(),
                torrent.name,
                total_size,
            ],
        )?;

        if inserted == 0 {
            return Ok(InsertOutcome::AlreadyPresent);
        }

        let id = tx.last_insert_rowid();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO torrentfiles (torrent_id, path, size) VALUES (?1, ?2, ?3)",
            )?;
            for (file, size) in torrent.files.iter().zip(file_sizes) {
                stmt.execute(params![id, file.path, size])?;
            }
        }
        tx.commit()?;

        Ok(InsertOutcome::Inserted(id))
    }

    /// Is a torrent sharing either identifier component indexed?
    ///
    /// Each component is compared against its own column only. DHT samples
    /// carry v1 alone, so a hybrid row must match on its v1 half.
    pub fn torrent_exists(&self, hash: &InfoHash) -> Result<bool, StoreError> {
        let found = self
            .conn
            .query_row(
                &format!("SELECT 1 FROM torrents WHERE {MATCH_EITHER} LIMIT 1"),
                params![hash.v1_hex(), hash.v2_hex()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Look up a torrent by either identifier component.
    pub fn find_torrent(&self, hash: &InfoHash) -> Result<Option<TorrentRecord>, StoreError> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT id, info_hash_v1, info_hash_v2, name, size
                     FROM torrents
                     WHERE {MATCH_EITHER}
                     ORDER BY id
                     LIMIT 1"
                ),
                params![hash.v1_hex(), hash.v2_hex()],
                TorrentRow::from_row,
            )
            .optional()?;

        row.map(|r| self.load_record(r)).transpose()
    }

    /// Most recently indexed torrents, newest first.
    pub fn recent_torrents(&self, limit: usize) -> Result<Vec<TorrentRecord>, StoreError> {
        let rows = {
            let mut stmt = self.conn.prepare(
                "SELECT id, info_hash_v1, info_hash_v2, name, size
                 FROM torrents
                 ORDER BY id DESC
                 LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], TorrentRow::from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        rows.into_iter().map(|r| self.load_record(r)).collect()
    }

    pub fn torrent_count(&self) -> Result<u64, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM torrents", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    fn files_for(&self, torrent_id: i64) -> Result<Vec<TorrentFile>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT path, size FROM torrentfiles WHERE torrent_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![torrent_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut files = Vec::new();
        for row in rows {
            let (path, size) = row?;
            files.push(TorrentFile {
                path,
                size: from_sql_size(torrent_id, size)?,
            });
        }
        Ok(files)
    }

    fn load_record(&self, row: TorrentRow) -> Result<TorrentRecord, StoreError> {
        let info_hash = InfoHash::from_hex_parts(row.v1.as_deref(), row.v2.as_deref())
            .map_err(|source| StoreError::CorruptInfoHash { id: row.id, source })?;
        Ok(TorrentRecord {
            id: row.id,
            info_hash,
            name: row.name,
            total_size: from_sql_size(row.id, row.size)?,
            files: self.files_for(row.id)?,
        })
    }
}

struct TorrentRow {
    id: i64,
    v1: Option<String>,
    v2: Option<String>,
    name: String,
    size: i64,
}

impl TorrentRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            v1: row.get(1)?,
            v2: row.get(2)?,
            name: row.get(3)?,
            size: row.get(4)?,
        })
    }
}
