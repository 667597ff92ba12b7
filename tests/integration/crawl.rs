use std::time::Duration;

use hamster_core::{Endpoint, InfoHash, TorrentFile};
use hamster_services::{DownloadHandle, EngineEvent, MetadataDescriptor};

use crate::*;

fn node(last: u8) -> Endpoint {
    Endpoint::from(([203, 0, 113, last], 6881))
}

/// MetadataReady for (v1 = "aaaa...", v2 = null) lands as one torrent row
/// and one file row pointing at it.
#[tokio::test]
async fn test_metadata_ready_is_indexed() {
    let dir = TempDir::new("metadata");
    let db = dir.db_path();
    let crawler = RunningCrawler::spawn(&db, fast_settings()).unwrap();

    crawler.engine.emit(EngineEvent::MetadataReady(MetadataDescriptor {
        handle: DownloadHandle(1),
        info_hash: InfoHash::from_v1([0xaa; 20]),
        name: "x".to_string(),
        total_size: 100,
        files: vec![TorrentFile::new("a.txt", 100)],
    }));

    let reader = open_reader(&db).unwrap();
    wait_for(Duration::from_secs(5), || Ok(count(&reader, "torrents")? == 1))
        .await
        .unwrap();

    let (id, v1, v2, name, size): (i64, Option<String>, Option<String>, String, i64) = reader
        .query_row(
            "SELECT id, info_hash_v1, info_hash_v2, name, size FROM torrents",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .unwrap();
    assert_eq!(v1.as_deref(), Some("aa".repeat(20).as_str()));
    assert_eq!(v2, None);
    assert_eq!(name, "x");
    assert_eq!(size, 100);

    let (torrent_id, path, file_size): (i64, String, i64) = reader
        .query_row(
            "SELECT torrent_id, path, size FROM torrentfiles",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(count(&reader, "torrentfiles").unwrap(), 1);
    assert_eq!(torrent_id, id);
    assert_eq!(path, "a.txt");
    assert_eq!(file_size, 100);

    let engine = crawler.engine.clone();
    let stats = crawler.stop().await.unwrap();
    assert_eq!(stats.torrents_indexed, 1);
    assert_eq!(engine.released(), vec![DownloadHandle(1)]);
}

/// The same hash delivered twice yields one metadata request and one row.
#[tokio::test]
async fn test_duplicate_discovery_requests_once() {
    let dir = TempDir::new("dedup");
    let db = dir.db_path();
    let crawler = RunningCrawler::spawn(&db, fast_settings()).unwrap();
    let hash = InfoHash::from_v2([0x42; 32]);

    let sample = EngineEvent::QueryResult {
        hashes: vec![hash],
        peers: vec![],
        interval: Duration::from_secs(60),
    };
    crawler.engine.script([sample.clone(), sample]);

    let engine = crawler.engine.clone();
    wait_for(Duration::from_secs(5), || {
        Ok(engine.metadata_requests().len() == 1)
    })
    .await
    .unwrap();

    let handle = match engine.calls().as_slice() {
        [hamster_services::EngineCall::RequestMetadata { handle, .. }] => *handle,
        other => panic!("unexpected engine calls: {other:?}"),
    };

    // the engine reports completion twice (at-least-once delivery)
    for _ in 0..2 {
        engine.emit(EngineEvent::MetadataReady(MetadataDescriptor {
            handle,
            info_hash: hash,
            name: "dup".to_string(),
            total_size: 1,
            files: vec![TorrentFile::new("dup.bin", 1)],
        }));
    }

    wait_for(Duration::from_secs(5), || Ok(engine.released().len() == 2))
        .await
        .unwrap();

    let reader = open_reader(&db).unwrap();
    assert_eq!(count(&reader, "torrents").unwrap(), 1);
    assert_eq!(count(&reader, "torrentfiles").unwrap(), 1);

    let stats = crawler.stop().await.unwrap();
    assert_eq!(stats.metadata_requested, 1);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(engine.metadata_requests(), vec![hash]);
}

/// Observed nodes are sampled on the next tick and then held off for the
/// cool-down, so repeated ticks do not re-query them.
#[tokio::test]
async fn test_observed_nodes_are_sampled_once_per_cooldown() {
    let dir = TempDir::new("sampling");
    let db = dir.db_path();
    let crawler = RunningCrawler::spawn(&db, fast_settings()).unwrap();

    crawler.engine.script([
        EngineEvent::PeerObserved(node(1)),
        EngineEvent::PeerObserved(node(2)),
        EngineEvent::PeerObserved(node(1)),
    ]);

    let engine = crawler.engine.clone();
    wait_for(Duration::from_secs(5), || Ok(engine.queried().len() >= 2))
        .await
        .unwrap();

    // several more ticks pass
    tokio::time::sleep(Duration::from_millis(150)).await;

    let mut queried = engine.queried();
    queried.sort();
    assert_eq!(queried, vec![node(1), node(2)]);

    let stats = crawler.stop().await.unwrap();
    assert_eq!(stats.samples_sent, 2);
}

/// Peers learned from a sample response are sampled; the responder's
/// suggested interval keeps already-known peers quiet.
#[tokio::test]
async fn test_query_result_peers_respect_interval() {
    let dir = TempDir::new("interval");
    let db = dir.db_path();
    let crawler = RunningCrawler::spawn(&db, fast_settings()).unwrap();
    let engine = crawler.engine.clone();

    engine.emit(EngineEvent::PeerObserved(node(10)));
    wait_for(Duration::from_secs(5), || Ok(engine.queried() == vec![node(10)]))
        .await
        .unwrap();

    // node(10) shows up again in a response, node(11) is new
    engine.emit(EngineEvent::QueryResult {
        hashes: vec![],
        peers: vec![node(10), node(11)],
        interval: Duration::ZERO,
    });
    wait_for(Duration::from_secs(5), || Ok(engine.queried().len() == 2))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(engine.queried(), vec![node(10), node(11)]);
    crawler.stop().await.unwrap();
}

/// After a restart the in-memory dedup set is empty, but hashes already in
/// the index are not fetched again.
#[tokio::test]
async fn test_restart_skips_indexed_hashes() {
    let dir = TempDir::new("restart");
    let db = dir.db_path();
    let hash = InfoHash::from_v1([0x77; 20]);

    let first = RunningCrawler::spawn(&db, fast_settings()).unwrap();
    first.engine.emit(EngineEvent::MetadataReady(MetadataDescriptor {
        handle: DownloadHandle(1),
        info_hash: hash,
        name: "persisted".to_string(),
        total_size: 5,
        files: vec![TorrentFile::new("p", 5)],
    }));
    let reader = open_reader(&db).unwrap();
    wait_for(Duration::from_secs(5), || Ok(count(&reader, "torrents")? == 1))
        .await
        .unwrap();
    first.stop().await.unwrap();

    let second = RunningCrawler::spawn(&db, fast_settings()).unwrap();
    let other = InfoHash::from_v1([0x78; 20]);
    second.engine.emit(EngineEvent::QueryResult {
        hashes: vec![hash, other],
        peers: vec![],
        interval: Duration::from_secs(60),
    });

    let engine = second.engine.clone();
    wait_for(Duration::from_secs(5), || {
        Ok(!engine.metadata_requests().is_empty())
    })
    .await
    .unwrap();
    let stats = second.stop().await.unwrap();

    assert_eq!(engine.metadata_requests(), vec![other]);
    assert_eq!(stats.hashes_discovered, 2);
    assert_eq!(stats.metadata_requested, 1);
}

/// Shutdown returns promptly and stops listening to the engine.
#[tokio::test]
async fn test_shutdown_silences_engine() {
    let dir = TempDir::new("shutdown");
    let crawler = RunningCrawler::spawn(&dir.db_path(), fast_settings()).unwrap();
    let engine = crawler.engine.clone();

    tokio::time::timeout(Duration::from_secs(5), crawler.stop())
        .await
        .expect("crawler did not stop")
        .unwrap();

    assert!(!engine.emit(EngineEvent::PeerObserved(node(1))));
}
