use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::record::EventRecord;
use chrono::{SecondsFormat, Utc};
#[cfg(feature = "metrics")]
use metrics::counter;
use quarry_core::ComponentEvent;
use std::collections::{HashSet, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Best-effort dedup horizon: the seen-set is cleared once it reaches
/// this many entries.
const DEDUP_HORIZON: usize = 100_000;

/// Write latencies remembered for the moving average.
const LATENCY_RING: usize = 1000;

/// Moving-average write latency above which the queue reports degraded.
const DEGRADED_LATENCY: Duration = Duration::from_millis(100);

/// What happened to a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Appended with this sequence number.
    Queued { sequence: u64 },
    /// Same `activity_id` was already accepted; the event was dropped
    /// and the push reports success.
    Deduplicated,
}

/// Events published by the queue. The remote-storage uploader subscribes
/// to `FileRotated` externally; rotated files are never modified again.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    FileRotated {
        queue: String,
        path: PathBuf,
        events: u64,
    },
}

impl ComponentEvent for QueueEvent {
    fn event_type(&self) -> &'static str {
        match self {
            QueueEvent::FileRotated { .. } => "file_rotated",
        }
    }

    fn component(&self) -> &str {
        match self {
            QueueEvent::FileRotated { queue, .. } => queue,
        }
    }
}

/// Counter snapshot.
#[derive(Debug, Clone)]
pub struct QueueStats {
    /// Events accepted since open, dedup drops excluded.
    pub total_queued: u64,
    /// Events in the active file.
    pub events_in_file: u64,
    pub current_file_size: u64,
    pub dedup_dropped: u64,
    pub rotation_count: u64,
    pub backpressure_active: bool,
    pub write_errors: u64,
    pub avg_write_latency: Duration,
}

/// Health as the outer runtime reports it.
#[derive(Debug, Clone)]
pub struct QueueHealth {
    pub healthy: bool,
    pub avg_write_latency: Duration,
    pub write_errors: u64,
    pub backpressure_active: bool,
}

struct QueueInner {
    file: Option<File>,
    active_path: PathBuf,
    opened_at: Instant,
    current_size: u64,
    events_in_file: u64,
    sequence: u64,
    seen: HashSet<String>,
    total_queued: u64,
    dedup_dropped: u64,
    rotation_count: u64,
    backpressure: bool,
    write_errors: u64,
    latencies: VecDeque<Duration>,
    closed: bool,
}

/// Append-only NDJSON event queue with rotation, dedup, and
/// backpressure.
///
/// Every push runs as one synchronous critical section under the queue
/// mutex — dedup, envelope encode, rotate-if-needed, capacity gate,
/// append, optional fsync — so sequence numbers are assigned under the
/// same lock that governs the write and are strictly monotonic.
pub struct EventQueue {
    name: String,
    config: QueueConfig,
    inner: Mutex<QueueInner>,
}

impl EventQueue {
    /// Open the queue: generate the active file name next to the
    /// configured base path and open it for append.
    pub fn open(config: QueueConfig) -> Result<Self, QueueError> {
        let name = config
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "events".to_string());
        let active_path = generated_path(&config.path);
        let file = open_append(&active_path)?;
        tracing::info!(queue = %name, path = %active_path.display(), "event queue opened");
        Ok(Self {
            name,
            config,
            inner: Mutex::new(QueueInner {
                file: Some(file),
                active_path,
                opened_at: Instant::now(),
                current_size: 0,
                events_in_file: 0,
                sequence: 0,
                seen: HashSet::new(),
                total_queued: 0,
                dedup_dropped: 0,
                rotation_count: 0,
                backpressure: false,
                write_errors: 0,
                latencies: VecDeque::new(),
                closed: false,
            }),
        })
    }

    /// Append one event. See the type docs for the exact pipeline.
    pub async fn push(&self, record: EventRecord) -> Result<PushOutcome, QueueError> {
        let outcome = self.push_sync(&record);
        #[cfg(feature = "metrics")]
        {
            let label = match &outcome {
                Ok(PushOutcome::Queued { .. }) => "queued",
                Ok(PushOutcome::Deduplicated) => "deduplicated",
                Err(QueueError::AtCapacity { .. }) => "at_capacity",
                Err(_) => "error",
            };
            counter!("quarry_queue_events_total", "queue" => self.name.clone(), "outcome" => label)
                .increment(1);
        }
        outcome
    }

    fn push_sync(&self, record: &EventRecord) -> Result<PushOutcome, QueueError> {
        let mut inner = self.inner.lock().expect("queue mutex poisoned");
        if inner.closed {
            return Err(QueueError::Closed);
        }

        record.validate()?;

        let activity_id = record.activity_id.unwrap_or_else(Uuid::new_v4);
        let dedup_key = activity_id.to_string();
        if self.config.dedup && inner.seen.contains(&dedup_key) {
            inner.dedup_dropped += 1;
            return Ok(PushOutcome::Deduplicated);
        }

        let sequence = inner.sequence + 1;
        let line = record.encode(activity_id, Utc::now(), sequence)?;
        let line_len = line.len() as u64;

        let size_exceeded = inner.current_size + line_len >= self.config.max_size;
        let age_exceeded = inner.opened_at.elapsed() >= self.config.max_age;
        if inner.events_in_file > 0 && (size_exceeded || age_exceeded) {
            self.rotate(&mut inner)?;
        }

        if inner.events_in_file >= self.config.max_events {
            inner.backpressure = true;
            tracing::warn!(queue = %self.name, "event queue at capacity; backpressure active");
            return Err(QueueError::AtCapacity {
                max_events: self.config.max_events,
            });
        }

        let started = Instant::now();
        let result = self.append(&mut inner, line.as_bytes());
        let latency = started.elapsed();
        if let Err(err) = result {
            inner.write_errors += 1;
            tracing::error!(queue = %self.name, error = %err, "event append failed");
            return Err(QueueError::Io(err));
        }

        inner.sequence = sequence;
        inner.current_size += line_len;
        inner.events_in_file += 1;
        inner.total_queued += 1;
        if self.config.dedup {
            if inner.seen.len() >= DEDUP_HORIZON {
                inner.seen.clear();
            }
            inner.seen.insert(dedup_key);
        }
        inner.latencies.push_back(latency);
        while inner.latencies.len() > LATENCY_RING {
            inner.latencies.pop_front();
        }

        Ok(PushOutcome::Queued { sequence })
    }

    fn append(&self, inner: &mut QueueInner, bytes: &[u8]) -> std::io::Result<()> {
        let file = inner.file.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotConnected, "active stream closed")
        })?;
        file.write_all(bytes)?;
        if self.config.sync_writes {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Swap in a fresh active file and publish the filled one.
    fn rotate(&self, inner: &mut QueueInner) -> Result<(), QueueError> {
        if let Some(file) = inner.file.take() {
            // Close the stream before anyone is told the file is ready.
            let _ = file.sync_all();
            drop(file);
        }
        let old_path = std::mem::replace(&mut inner.active_path, generated_path(&self.config.path));
        let events = inner.events_in_file;

        inner.file = Some(open_append(&inner.active_path)?);
        inner.opened_at = Instant::now();
        inner.current_size = 0;
        inner.events_in_file = 0;
        inner.rotation_count += 1;
        inner.backpressure = false;

        tracing::info!(
            queue = %self.name,
            old = %old_path.display(),
            new = %inner.active_path.display(),
            events,
            "event file rotated"
        );
        #[cfg(feature = "metrics")]
        counter!("quarry_queue_rotations_total", "queue" => self.name.clone()).increment(1);
        self.config.listeners.emit(&QueueEvent::FileRotated {
            queue: self.name.clone(),
            path: old_path,
            events,
        });
        Ok(())
    }

    /// Flush and close. A non-empty active file is published as a final
    /// rotation so the tail is never stranded.
    pub async fn close(&self) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().expect("queue mutex poisoned");
        if inner.closed {
            return Ok(());
        }
        inner.closed = true;

        if let Some(file) = inner.file.take() {
            let _ = file.sync_all();
            drop(file);
        }
        if inner.events_in_file > 0 {
            let events = inner.events_in_file;
            let path = inner.active_path.clone();
            inner.events_in_file = 0;
            inner.rotation_count += 1;
            tracing::info!(queue = %self.name, path = %path.display(), events, "final rotation at close");
            self.config.listeners.emit(&QueueEvent::FileRotated {
                queue: self.name.clone(),
                path,
                events,
            });
        }
        Ok(())
    }

    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock().expect("queue mutex poisoned");
        QueueStats {
            total_queued: inner.total_queued,
            events_in_file: inner.events_in_file,
            current_file_size: inner.current_size,
            dedup_dropped: inner.dedup_dropped,
            rotation_count: inner.rotation_count,
            backpressure_active: inner.backpressure,
            write_errors: inner.write_errors,
            avg_write_latency: average(&inner.latencies),
        }
    }

    /// Degraded when writes are slow on average, any write has errored,
    /// or the active stream is gone.
    pub fn health(&self) -> QueueHealth {
        let inner = self.inner.lock().expect("queue mutex poisoned");
        let avg = average(&inner.latencies);
        let writable = inner.file.is_some() && !inner.closed;
        QueueHealth {
            healthy: writable && inner.write_errors == 0 && avg <= DEGRADED_LATENCY,
            avg_write_latency: avg,
            write_errors: inner.write_errors,
            backpressure_active: inner.backpressure,
        }
    }

    /// Path of the file currently receiving appends.
    pub fn active_path(&self) -> PathBuf {
        self.inner
            .lock()
            .expect("queue mutex poisoned")
            .active_path
            .clone()
    }
}

fn average(latencies: &VecDeque<Duration>) -> Duration {
    if latencies.is_empty() {
        return Duration::ZERO;
    }
    latencies.iter().sum::<Duration>() / latencies.len() as u32
}

fn open_append(path: &Path) -> Result<File, QueueError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(QueueError::Io)
}

/// `<base>-<timestamp with ':' and '.' replaced>-<8 hex>.<ext>` next to
/// the configured base path.
fn generated_path(base: &Path) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "events".to_string());
    let ext = base
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ndjson".to_string());
    let ts = Utc::now()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    let suffix = Uuid::new_v4().simple().to_string();
    let name = format!("{stem}-{ts}-{}.{ext}", &suffix[..8]);
    match base.parent() {
        Some(parent) if parent != Path::new("") => parent.join(name),
        _ => PathBuf::from(name),
    }
}
