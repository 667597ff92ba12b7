use rusqlite::Connection;

use hamster_core::{InfoHash, NewTorrent, TorrentFile};
use hamster_services::migrator::{migrate, schema_version};
use hamster_services::{InsertOutcome, MigrationError, Store, LATEST_VERSION};

use crate::*;

/// A fresh file ends at the latest version with only the index tables.
#[test]
fn test_fresh_database_is_migrated() {
    let dir = TempDir::new("fresh");
    let db = dir.db_path();

    let mut store = Store::open(&db).unwrap();
    let report = store.migrate().unwrap();
    assert_eq!(report.from, 0);
    assert_eq!(report.to, LATEST_VERSION);
    assert_eq!(LATEST_VERSION, 2);
    drop(store);

    let conn = open_reader(&db).unwrap();
    assert_eq!(schema_version(&conn).unwrap(), 2);
    assert_eq!(tables(&conn).unwrap(), vec!["torrentfiles", "torrents"]);
}

/// Re-opening an up-to-date index runs nothing and keeps the data.
#[test]
fn test_second_run_is_noop() {
    let dir = TempDir::new("noop");
    let db = dir.db_path();

    let mut store = Store::open(&db).unwrap();
    store.migrate().unwrap();
    let outcome = store
        .insert_torrent(&NewTorrent {
            info_hash: InfoHash::from_v1([0x05; 20]),
            name: "kept".to_string(),
            total_size: 9,
            files: vec![TorrentFile::new("kept.bin", 9)],
        })
        .unwrap();
    assert!(matches!(outcome, InsertOutcome::Inserted(_)));
    drop(store);

    let mut store = Store::open(&db).unwrap();
    let report = store.migrate().unwrap();
    assert_eq!(report.applied(), 0);
    assert_eq!(store.schema_version().unwrap(), LATEST_VERSION);
    assert_eq!(store.torrent_count().unwrap(), 1);
}

/// A version-1 file still carrying node and sample tables is upgraded in
/// place: the bookkeeping tables go, the index stays.
#[test]
fn test_version_one_drops_bookkeeping_tables() {
    let dir = TempDir::new("v1");
    let db = dir.db_path();

    {
        let conn = Connection::open(&db).unwrap();
        conn.execute_batch(
            "CREATE TABLE nodes (
                 id INTEGER PRIMARY KEY, remote_addr TEXT NOT NULL, port INTEGER NOT NULL,
                 last_seen INTEGER NOT NULL, next_request INTEGER NOT NULL,
                 UNIQUE (remote_addr, port));
             CREATE TABLE samples (
                 id INTEGER NOT NULL PRIMARY KEY, info_hash_v1 TEXT NULL UNIQUE,
                 info_hash_v2 TEXT NULL UNIQUE, timestamp INTEGER NOT NULL);
             CREATE TABLE torrents (
                 id INTEGER PRIMARY KEY, info_hash_v1 TEXT NULL UNIQUE,
                 info_hash_v2 TEXT NULL UNIQUE, name TEXT NOT NULL, size INTEGER NOT NULL);
             CREATE TABLE torrentfiles (
                 id INTEGER PRIMARY KEY, torrent_id INTEGER NOT NULL REFERENCES torrents(id),
                 path TEXT NOT NULL, size INTEGER NOT NULL);
             INSERT INTO nodes (remote_addr, port, last_seen, next_request)
                 VALUES ('198.51.100.1', 6881, 0, 0);
             INSERT INTO torrents (info_hash_v1, info_hash_v2, name, size)
                 VALUES ('0606060606060606060606060606060606060606', NULL, 'old', 3);
             PRAGMA user_version = 1;",
        )
        .unwrap();
    }

    let mut conn = Connection::open(&db).unwrap();
    let report = migrate(&mut conn).unwrap();
    assert_eq!((report.from, report.to), (1, 2));
    assert_eq!(tables(&conn).unwrap(), vec!["torrentfiles", "torrents"]);
    assert_eq!(count(&conn, "torrents").unwrap(), 1);
    drop(conn);

    let store = Store::open(&db).unwrap();
    let old = store
        .find_torrent(&InfoHash::from_v1([0x06; 20]))
        .unwrap()
        .expect("pre-existing torrent survives");
    assert_eq!(old.name, "old");
}

/// An index written by a newer build is left alone.
#[test]
fn test_newer_schema_is_refused() {
    let dir = TempDir::new("newer");
    let db = dir.db_path();

    {
        let conn = Connection::open(&db).unwrap();
        conn.pragma_update(None, "user_version", 7).unwrap();
    }

    let mut store = Store::open(&db).unwrap();
    match store.migrate() {
        Err(MigrationError::UnknownVersion { found, latest }) => {
            assert_eq!(found, 7);
            assert_eq!(latest, LATEST_VERSION);
        }
        other => panic!("unexpected migration result: {other:?}"),
    }
    assert_eq!(store.schema_version().unwrap(), 7);
}
