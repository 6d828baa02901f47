//! Event queue rotation, dedup, and backpressure against real files.

use quarry_core::FnListener;
use quarry_queue::{EventQueue, EventRecord, PushOutcome, QueueConfig, QueueEvent};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

fn payload(fill: usize) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("feature".to_string(), json!("queried_insights"));
    map.insert("fill".to_string(), json!("x".repeat(fill)));
    map
}

fn rotation_listener() -> (
    Arc<Mutex<Vec<(PathBuf, u64)>>>,
    FnListener<QueueEvent, impl Fn(&QueueEvent) + Send + Sync>,
) {
    let seen: Arc<Mutex<Vec<(PathBuf, u64)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener = FnListener::new(move |event: &QueueEvent| {
        let QueueEvent::FileRotated { path, events, .. } = event;
        sink.lock().unwrap().push((path.clone(), *events));
    });
    (seen, listener)
}

fn read_lines(path: &std::path::Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

/// Scenario: 1 KiB cap, ~200-byte events. Five land in the first file;
/// the sixth rotates and lands alone in the fresh one. Exactly one
/// rotation, old file published, sequences contiguous across the split.
#[tokio::test]
async fn size_rotation_splits_at_the_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let (rotations, listener) = rotation_listener();
    let queue = EventQueue::open(
        QueueConfig::builder(dir.path().join("events.ndjson"))
            .max_size(1024)
            .listener(listener)
            .build(),
    )
    .unwrap();

    for _ in 0..6 {
        let outcome = queue.push(EventRecord::new(payload(20))).await.unwrap();
        assert!(matches!(outcome, PushOutcome::Queued { .. }));
    }

    let stats = queue.stats();
    assert_eq!(stats.rotation_count, 1);
    assert_eq!(stats.total_queued, 6);

    let published = rotations.lock().unwrap().clone();
    assert_eq!(published.len(), 1);
    let (old_path, old_events) = &published[0];
    assert_eq!(*old_events, 5);

    let old_lines = read_lines(old_path);
    let new_lines = read_lines(&queue.active_path());
    assert_eq!(old_lines.len(), 5);
    assert_eq!(new_lines.len(), 1);

    let sequences: Vec<u64> = old_lines
        .iter()
        .chain(new_lines.iter())
        .map(|line| line["_queue_sequence"].as_u64().unwrap())
        .collect();
    assert_eq!(sequences, vec![1, 2, 3, 4, 5, 6]);

    // Rotated names carry the sanitized timestamp and 8-hex suffix:
    // no ':' survives, and the only '.' left introduces the extension.
    let name = old_path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("events-") && name.ends_with(".ndjson"));
    assert!(!name.contains(':'));
    assert_eq!(name.matches('.').count(), 1);
}

/// Pushing the same activity id twice stores exactly one line; the
/// duplicate reports success as a dedup drop.
#[tokio::test]
async fn duplicate_activity_ids_store_once() {
    let dir = tempfile::tempdir().unwrap();
    let queue = EventQueue::open(
        QueueConfig::builder(dir.path().join("events.ndjson")).build(),
    )
    .unwrap();

    let id = Uuid::new_v4();
    let event = EventRecord::new(payload(8)).with_activity_id(id);

    assert!(matches!(
        queue.push(event.clone()).await.unwrap(),
        PushOutcome::Queued { sequence: 1 }
    ));
    assert_eq!(queue.push(event).await.unwrap(), PushOutcome::Deduplicated);

    let stats = queue.stats();
    assert_eq!(stats.total_queued, 1);
    assert_eq!(stats.dedup_dropped, 1);

    let lines = read_lines(&queue.active_path());
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["activity_id"], id.to_string());
}

/// Capacity rejections set the backpressure flag; closing publishes the
/// tail file so nothing is stranded.
#[tokio::test]
async fn backpressure_then_tail_publication() {
    let dir = tempfile::tempdir().unwrap();
    let (rotations, listener) = rotation_listener();
    let queue = EventQueue::open(
        QueueConfig::builder(dir.path().join("events.ndjson"))
            .max_events(3)
            .listener(listener)
            .build(),
    )
    .unwrap();

    for _ in 0..3 {
        queue.push(EventRecord::new(payload(8))).await.unwrap();
    }
    let err = queue.push(EventRecord::new(payload(8))).await.unwrap_err();
    assert!(err.is_at_capacity());
    assert!(queue.stats().backpressure_active);

    queue.close().await.unwrap();
    let published = rotations.lock().unwrap().clone();
    assert_eq!(published.len(), 1, "close publishes the tail");
    assert_eq!(published[0].1, 3);
    assert_eq!(read_lines(&published[0].0).len(), 3);
}
