
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use test_harness::{CountingStore, HangingStore};
use worker_pulse::keys;
use worker_pulse::liveness::policy::parse_timestamp;
use worker_pulse::store::{LivenessStore, MemoryStore};
use worker_pulse::worker::{HeartbeatEmitter, WorkerId};

const INTERVAL: Duration = Duration::from_secs(2);

fn emitter(store: Arc<dyn LivenessStore>) -> HeartbeatEmitter {
    HeartbeatEmitter::new(WorkerId::new("host1:111"), store, INTERVAL)
}

#[tokio::test(start_paused = true)]
async fn test_first_beat_after_one_interval() {
    let store = Arc::new(MemoryStore::new());
    let mut heart = emitter(store.clone());
    heart.start();
    assert!(heart.is_running());

    tokio::time::sleep(Duration::from_millis(1900)).await;
    assert!(store
        .get("worker:host1:111:heartbeat")
        .await
        .unwrap()
        .is_none());

    tokio::time::sleep(Duration::from_millis(200)).await;
    let beat = store
        .get("worker:host1:111:heartbeat")
        .await
        .unwrap()
        .expect("heartbeat should be written after one interval");
    assert!(parse_timestamp(&beat).is_some(), "unparsable beat {}", beat);
    assert_eq!(
        store.set_members(keys::WORKERS_SET_KEY).await.unwrap(),
        vec!["host1:111"]
    );

    heart.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_beats_once_per_interval() {
    let store = Arc::new(CountingStore::new());
    let mut heart = emitter(store.clone());
    heart.start();

    tokio::time::sleep(Duration::from_millis(10_500)).await;
    assert_eq!(store.sets(), 5);

    heart.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_start_is_idempotent() {
    let store = Arc::new(CountingStore::new());
    let mut heart = emitter(store.clone());
    heart.start();
    heart.start();
    heart.start();

    tokio::time::sleep(Duration::from_millis(6_500)).await;
    // One loop: beats at 2s, 4s, 6s
    assert_eq!(store.sets(), 3);

    heart.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_beat_failures_do_not_stop_the_loop() {
    let store = Arc::new(MemoryStore::new());
    let mut heart = emitter(store.clone());
    store.set_unavailable(true);
    heart.start();

    // Several failed beats
    tokio::time::sleep(Duration::from_millis(6_500)).await;
    assert!(heart.is_running());

    store.set_unavailable(false);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(store
        .get("worker:host1:111:heartbeat")
        .await
        .unwrap()
        .is_some());
    assert!(heart.is_running());

    heart.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_removes_key_and_ends_loop() {
    let store = Arc::new(MemoryStore::new());
    let mut heart = emitter(store.clone());
    heart.start();
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert!(store
        .get("worker:host1:111:heartbeat")
        .await
        .unwrap()
        .is_some());

    heart.stop().await;
    assert!(!heart.is_running());
    assert!(store
        .get("worker:host1:111:heartbeat")
        .await
        .unwrap()
        .is_none());

    // No beat resurrects the key
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(store
        .get("worker:host1:111:heartbeat")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stop_completes_when_store_unreachable() {
    let store = Arc::new(MemoryStore::new());
    let mut heart = emitter(store.clone());
    heart.start();
    tokio::time::sleep(Duration::from_millis(2_500)).await;

    store.set_unavailable(true);
    heart.stop().await;
    assert!(!heart.is_running());

    // The key is left behind for a pruner
    store.set_unavailable(false);
    assert!(store
        .get("worker:host1:111:heartbeat")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_bounded_when_store_hangs() {
    let store = Arc::new(HangingStore::new());
    let mut heart = emitter(store.clone()).with_stop_timeout(Duration::from_millis(500));
    heart.start();
    tokio::time::sleep(Duration::from_millis(2_500)).await;

    // Next beat (at 4s) blocks forever mid-write
    store.set_hang(true);
    tokio::time::sleep(Duration::from_secs(2)).await;

    let started = tokio::time::Instant::now();
    heart.stop().await;
    // Loop join and key deletion each give up after the stop timeout
    assert!(started.elapsed() <= Duration::from_millis(1_000));
    assert!(!heart.is_running());
}

#[tokio::test]
async fn test_stop_without_start() {
    let store = Arc::new(MemoryStore::new());
    store
        .set("worker:host1:111:heartbeat", "stale")
        .await
        .unwrap();

    let mut heart = emitter(store.clone());
    heart.stop().await;

    assert!(store
        .get("worker:host1:111:heartbeat")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_stop() {
    let store = Arc::new(CountingStore::new());
    let mut heart = emitter(store.clone());

    heart.start();
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    heart.stop().await;
    assert_eq!(store.sets(), 1);

    heart.start();
    assert!(heart.is_running());
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert_eq!(store.sets(), 2);
    assert!(store
        .get("worker:host1:111:heartbeat")
        .await
        .unwrap()
        .is_some());

    heart.stop().await;
}

#[tokio::test]
async fn test_single_beat_writes_current_time() {
    let store = Arc::new(MemoryStore::new());
    let heart = emitter(store.clone());

    let before = Utc::now();
    heart.beat().await.unwrap();
    let after = Utc::now();

    let raw = store
        .get("worker:host1:111:heartbeat")
        .await
        .unwrap()
        .unwrap();
    let beat = parse_timestamp(&raw).unwrap();
    // Stored with millisecond precision
    assert!(beat >= before - chrono::Duration::milliseconds(1));
    assert!(beat <= after);
    assert_eq!(
        store.set_members(keys::WORKERS_SET_KEY).await.unwrap(),
        vec!["host1:111"]
    );
}

#[tokio::test]
async fn test_single_beat_surfaces_store_errors() {
    let store = Arc::new(MemoryStore::new());
    store.set_unavailable(true);
    let heart = emitter(store.clone());
    assert!(heart.beat().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_dropping_emitter_cancels_loop() {
    let store = Arc::new(CountingStore::new());
    let mut heart = emitter(store.clone());
    heart.start();
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    drop(heart);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(store.sets(), 1);
}
