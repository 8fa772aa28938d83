// crates/kernel-storage/src/store.rs
// ============================================================================
// Module: File Store
// Description: Durable, atomic, crash-safe persistence of run state.
// Purpose: Give the orchestrator a Storage implementation it can trust to
//          leave either the old state or the new state on disk, never a
//          torn write, and to detect event-log corruption loudly.
// Dependencies: kernel-core, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Each run gets a directory under the store's root: an append-only
//! `events.jsonl`, a `run_state.json` snapshot refreshed opportunistically,
//! and a `checkpoints.jsonl` naming safe resumption points. Handoff envelopes
//! live in a flat `envelopes/` directory keyed by envelope identifier, since
//! [`Storage::write_envelope`] is not run-scoped. Every durable write goes
//! through [`atomic_write`]: write a temp file in the same directory, fsync
//! it, rename over the destination, then fsync the directory entry. A crash
//! at any point during that sequence leaves only a stray temp file, never a
//! half-written destination.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::fs;
use std::fs::File;
use std::io;
use std::io::BufRead;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Instant;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use kernel_core::core::EventSeq;
use kernel_core::core::HandoffEnvelope;
use kernel_core::core::Receipt;
use kernel_core::core::ReplayError;
use kernel_core::core::RunEvent;
use kernel_core::core::RunId;
use kernel_core::core::RunState;
use kernel_core::interfaces::Page;
use kernel_core::interfaces::Storage;
use kernel_core::interfaces::StoreError;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// File store errors, convertible into [`StoreError`] at the `Storage` seam.
///
/// # Invariants
/// - Error messages avoid embedding raw run state or envelope payloads.
#[derive(Debug, Error, Clone)]
pub enum FileStoreError {
    /// Filesystem I/O error.
    #[error("file store io error: {0}")]
    Io(String),
    /// Stored data failed integrity checks (sequence gap, unparsable line).
    #[error("file store corruption: {0}")]
    Corrupt(String),
    /// Caller supplied an out-of-order or otherwise invalid write.
    #[error("file store invalid write: {0}")]
    Invalid(String),
    /// Two writers raced for the same run's append position.
    #[error("file store write conflict: {0}")]
    Conflict(String),
}

impl From<FileStoreError> for StoreError {
    fn from(error: FileStoreError) -> Self {
        match error {
            FileStoreError::Io(message) => Self::Io(message),
            FileStoreError::Corrupt(message) => Self::Corrupt(message),
            FileStoreError::Invalid(message) => Self::Invalid(message),
            FileStoreError::Conflict(message) => Self::Conflict(message),
        }
    }
}

impl From<io::Error> for FileStoreError {
    fn from(error: io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<ReplayError> for FileStoreError {
    fn from(error: ReplayError) -> Self {
        Self::Corrupt(error.to_string())
    }
}

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the file-backed run store.
///
/// # Invariants
/// - `root` must be a directory (created on first use if absent).
#[derive(Debug, Clone, Deserialize)]
pub struct FileStoreConfig {
    /// Root directory under which every run's state lives.
    pub root: PathBuf,
    /// Whether writes fsync before their rename becomes visible.
    ///
    /// Disabling this is only intended for throwaway test fixtures; a
    /// production deployment must leave it at its default of `true`.
    #[serde(default = "default_fsync")]
    pub fsync: bool,
}

const fn default_fsync() -> bool {
    true
}

// ============================================================================
// SECTION: Stats
// ============================================================================

/// Per-operation call counts against the store.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StorageOpCounts {
    /// `load` calls.
    pub load: u64,
    /// `append_event` calls.
    pub append_event: u64,
    /// `read_events` calls.
    pub read_events: u64,
    /// `write_envelope` calls.
    pub write_envelope: u64,
    /// `commit_step_completion` calls.
    pub commit_step_completion: u64,
}

/// A simple, file-backed analogue of a database store's perf snapshot: no
/// histograms, just call counts and cumulative wall-clock time per operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageStats {
    /// Per-operation call counts.
    pub op_counts: StorageOpCounts,
    /// Cumulative microseconds spent inside `load`.
    pub load_micros: u64,
    /// Cumulative microseconds spent inside `append_event`.
    pub append_event_micros: u64,
    /// Cumulative microseconds spent inside `read_events`.
    pub read_events_micros: u64,
    /// Cumulative microseconds spent inside `write_envelope`.
    pub write_envelope_micros: u64,
    /// Cumulative microseconds spent inside `commit_step_completion`.
    pub commit_step_completion_micros: u64,
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// One line of the append-only event log.
#[derive(Debug, Serialize, Deserialize)]
struct EventLine {
    seq: EventSeq,
    event: RunEvent,
}

/// A file-backed [`Storage`] implementation.
///
/// # Invariants
/// - Per-run single-writer: callers serialize through the per-run [`Mutex`]
///   this store hands out, so only one in-process execution ever appends to
///   a given run's log at a time.
pub struct FileStore {
    config: FileStoreConfig,
    run_locks: Mutex<HashMap<RunId, Arc<Mutex<()>>>>,
    stats: Mutex<StorageStats>,
}

impl FileStore {
    /// Opens (creating if absent) a file store rooted at `config.root`.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError`] when the root directory cannot be created.
    pub fn open(config: FileStoreConfig) -> Result<Self, FileStoreError> {
        fs::create_dir_all(&config.root)?;
        Ok(Self { config, run_locks: Mutex::new(HashMap::new()), stats: Mutex::new(StorageStats::default()) })
    }

    /// Returns a snapshot of this store's lightweight perf counters.
    #[must_use]
    pub fn stats_snapshot(&self) -> StorageStats {
        self.stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    /// Records a checkpoint naming a safe resumption point for `run_id`.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError`] when the run has no log to append to, or
    /// the checkpoint cannot be written.
    pub fn create_checkpoint(&self, run_id: &RunId, label: &str) -> Result<EventSeq, FileStoreError> {
        let lock = self.lock_for(run_id);
        let _guard = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let tail = self.tail_seq_locked(run_id)?;
        let next = tail.map_or(EventSeq::first(), EventSeq::next);
        let event = RunEvent::CheckpointCreated { label: label.to_string(), at: now() };
        self.append_event_locked(run_id, next, &event)?;
        Ok(next)
    }

    /// Rebuilds a run's state by replaying its log up to and including the
    /// event at `checkpoint_seq`.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError::Corrupt`] when the log cannot be read or
    /// replayed up to the requested point.
    pub fn resume_from_checkpoint(&self, run_id: &RunId, checkpoint_seq: EventSeq) -> Result<RunState, FileStoreError> {
        let all = self.read_events_locked(run_id, None, usize::MAX)?;
        let truncated: Vec<(EventSeq, RunEvent)> = all.into_iter().take_while(|(seq, _)| *seq <= checkpoint_seq).collect();
        kernel_core::core::rebuild_state(run_id.clone(), &truncated).map_err(Into::into)
    }

    // ------------------------------------------------------------------
    // Path helpers
    // ------------------------------------------------------------------

    fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.config.root.join("runs").join(sanitize_component(run_id.as_str()))
    }

    fn events_path(&self, run_id: &RunId) -> PathBuf {
        self.run_dir(run_id).join("events.jsonl")
    }

    fn state_path(&self, run_id: &RunId) -> PathBuf {
        self.run_dir(run_id).join("run_state.json")
    }

    fn envelopes_dir(&self) -> PathBuf {
        self.config.root.join("envelopes")
    }

    fn envelope_path(&self, envelope_id: &str) -> PathBuf {
        self.envelopes_dir().join(format!("{}.json", sanitize_component(envelope_id)))
    }

    fn lock_for(&self, run_id: &RunId) -> Arc<Mutex<()>> {
        let mut locks = self.run_locks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(locks.entry(run_id.clone()).or_insert_with(|| Arc::new(Mutex::new(()))))
    }

    // ------------------------------------------------------------------
    // Locked primitives (caller must already hold the per-run lock)
    // ------------------------------------------------------------------

    fn tail_seq_locked(&self, run_id: &RunId) -> Result<Option<EventSeq>, FileStoreError> {
        let path = self.events_path(run_id);
        if !path.exists() {
            return Ok(None);
        }
        let file = File::open(&path)?;
        let mut last = None;
        for line in io::BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed: EventLine =
                serde_json::from_str(&line).map_err(|err| FileStoreError::Corrupt(format!("unparsable event line: {err}")))?;
            last = Some(parsed.seq);
        }
        Ok(last)
    }

    fn append_event_locked(&self, run_id: &RunId, seq: EventSeq, event: &RunEvent) -> Result<(), FileStoreError> {
        let tail = self.tail_seq_locked(run_id)?;
        let expected = tail.map_or(EventSeq::first(), EventSeq::next);
        if seq != expected {
            return Err(FileStoreError::Invalid(format!(
                "append_event called with seq {seq} but the log's next expected seq is {expected}"
            )));
        }

        let dir = self.run_dir(run_id);
        fs::create_dir_all(&dir)?;
        let line = EventLine { seq, event: event.clone() };
        let mut serialized =
            serde_json::to_vec(&line).map_err(|err| FileStoreError::Invalid(format!("event not serializable: {err}")))?;
        serialized.push(b'\n');

        let path = self.events_path(run_id);
        let mut file = fs::OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(&serialized)?;
        file.flush()?;
        if self.config.fsync {
            file.sync_all()?;
        }
        Ok(())
    }

    fn read_events_locked(&self, run_id: &RunId, after: Option<EventSeq>, limit: usize) -> Result<Vec<(EventSeq, RunEvent)>, FileStoreError> {
        let path = self.events_path(run_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&path)?;
        let mut expected = EventSeq::first();
        let mut out = Vec::new();
        for line in io::BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed: EventLine =
                serde_json::from_str(&line).map_err(|err| FileStoreError::Corrupt(format!("unparsable event line: {err}")))?;
            if parsed.seq != expected {
                return Err(FileStoreError::Corrupt(format!(
                    "event log is not gap-free: expected seq {expected}, found {}",
                    parsed.seq
                )));
            }
            expected = expected.next();
            let include = after.is_none_or(|cutoff| parsed.seq > cutoff);
            if include {
                out.push((parsed.seq, parsed.event));
            }
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }
}

impl Storage for FileStore {
    fn load(&self, run_id: &RunId) -> Result<Option<RunState>, StoreError> {
        let start = Instant::now();
        let lock = self.lock_for(run_id);
        let _guard = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let result = (|| {
            let events = self.read_events_locked(run_id, None, usize::MAX)?;
            if events.is_empty() {
                return Ok(None);
            }
            let state = kernel_core::core::rebuild_state(run_id.clone(), &events)?;
            if let Ok(bytes) = serde_json::to_vec_pretty(&state) {
                let _ = atomic_write(&self.state_path(run_id), &bytes, self.config.fsync);
            }
            Ok(Some(state))
        })();
        self.record(start, |stats| {
            stats.op_counts.load += 1;
            stats.load_micros += micros_since(start);
        });
        result.map_err(FileStoreError::into)
    }

    fn append_event(&self, run_id: &RunId, seq: EventSeq, event: &RunEvent) -> Result<(), StoreError> {
        let start = Instant::now();
        let lock = self.lock_for(run_id);
        let _guard = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let result = self.append_event_locked(run_id, seq, event);
        self.record(start, |stats| {
            stats.op_counts.append_event += 1;
            stats.append_event_micros += micros_since(start);
        });
        result.map_err(FileStoreError::into)
    }

    fn read_events(&self, run_id: &RunId, after: Option<EventSeq>, limit: usize) -> Result<Page<(EventSeq, RunEvent)>, StoreError> {
        let start = Instant::now();
        let lock = self.lock_for(run_id);
        let _guard = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let result = self.read_events_locked(run_id, after, limit);
        self.record(start, |stats| {
            stats.op_counts.read_events += 1;
            stats.read_events_micros += micros_since(start);
        });
        let items = result.map_err(StoreError::from)?;
        let next_cursor = items.last().map(|(seq, _)| seq.to_string());
        Ok(Page { items, next_cursor })
    }

    fn write_envelope(&self, envelope: &HandoffEnvelope) -> Result<(), StoreError> {
        let start = Instant::now();
        let dir = self.envelopes_dir();
        let result = (|| -> Result<(), FileStoreError> {
            fs::create_dir_all(&dir)?;
            let bytes = serde_json::to_vec_pretty(envelope)
                .map_err(|err| FileStoreError::Invalid(format!("envelope not serializable: {err}")))?;
            atomic_write(&self.envelope_path(envelope.envelope_id.as_str()), &bytes, self.config.fsync)
        })();
        self.record(start, |stats| {
            stats.op_counts.write_envelope += 1;
            stats.write_envelope_micros += micros_since(start);
        });
        result.map_err(FileStoreError::into)
    }

    fn commit_step_completion(&self, run_id: &RunId, seq: EventSeq, receipt: &Receipt) -> Result<(), StoreError> {
        let start = Instant::now();
        let lock = self.lock_for(run_id);
        let _guard = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let event = RunEvent::ReceiptRecorded { receipt: receipt.clone() };
        let result = self.append_event_locked(run_id, seq, &event);
        self.record(start, |stats| {
            stats.op_counts.commit_step_completion += 1;
            stats.commit_step_completion_micros += micros_since(start);
        });
        result.map_err(FileStoreError::into)
    }

    fn readiness(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.config.root).map_err(|err| StoreError::Io(err.to_string()))
    }
}

impl FileStore {
    fn record(&self, _start: Instant, update: impl FnOnce(&mut StorageStats)) {
        let mut stats = self.stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        update(&mut stats);
    }
}

// ============================================================================
// SECTION: Free functions
// ============================================================================

/// Writes `bytes` to `path` without ever leaving a partially-written file
/// visible at that path: the data lands in a sibling temp file first, is
/// fsynced, then renamed over the destination (rename is atomic on the same
/// filesystem), and finally the containing directory is fsynced so the
/// rename itself survives a crash.
///
/// # Errors
///
/// Returns [`FileStoreError::Io`] on any filesystem failure. A stray temp
/// file may be left behind on failure; callers are expected to run a janitor
/// pass that removes `*.tmp-*` files older than the crash-recovery window.
fn atomic_write(path: &Path, bytes: &[u8], fsync: bool) -> Result<(), FileStoreError> {
    let dir = path.parent().ok_or_else(|| FileStoreError::Invalid("write path has no parent directory".to_string()))?;
    fs::create_dir_all(dir)?;
    let tmp_path = dir.join(format!(".tmp-{}-{}", std::process::id(), unix_nanos()));
    {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        if fsync {
            tmp.sync_all()?;
        }
    }
    fs::rename(&tmp_path, path)?;
    if fsync {
        if let Ok(dir_handle) = File::open(dir) {
            let _ = dir_handle.sync_all();
        }
    }
    Ok(())
}

/// Replaces filesystem-unsafe characters so identifiers are always usable as
/// a single path component.
fn sanitize_component(raw: &str) -> String {
    raw.chars().map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' { ch } else { '_' }).collect()
}

fn unix_nanos() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|dur| dur.as_nanos()).unwrap_or(0)
}

fn micros_since(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX)
}

fn now() -> kernel_core::core::Timestamp {
    let millis = SystemTime::now().duration_since(UNIX_EPOCH).map(|dur| dur.as_millis()).unwrap_or(0);
    kernel_core::core::Timestamp::UnixMillis(i64::try_from(millis).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use kernel_core::core::FlowId;
    use kernel_core::core::RunConfig;
    use kernel_core::core::StepId;

    use super::*;

    fn store(dir: &tempfile::TempDir) -> FileStore {
        FileStore::open(FileStoreConfig { root: dir.path().to_path_buf(), fsync: false }).expect("open store")
    }

    fn started(run_id: &RunId) -> RunEvent {
        RunEvent::RunStarted {
            run_id: run_id.clone(),
            flow_id: FlowId::new("flow-1"),
            entry_step: StepId::new("step-1"),
            config: RunConfig::default(),
            at: now(),
        }
    }

    #[test]
    fn append_then_load_rebuilds_state_via_replay() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(&dir);
        let run_id = RunId::new("run-1");
        store.append_event(&run_id, EventSeq::first(), &started(&run_id)).expect("append");
        let state = store.load(&run_id).expect("load").expect("state present");
        assert_eq!(state.current_step, StepId::new("step-1"));
    }

    #[test]
    fn loading_an_unknown_run_returns_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(&dir);
        let result = store.load(&RunId::new("never-started")).expect("load");
        assert!(result.is_none());
    }

    #[test]
    fn append_event_rejects_a_sequence_gap() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(&dir);
        let run_id = RunId::new("run-1");
        store.append_event(&run_id, EventSeq::first(), &started(&run_id)).expect("append");
        let skip_ahead = EventSeq::first().next().next();
        let err = store.append_event(&run_id, skip_ahead, &started(&run_id)).expect_err("gap rejected");
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[test]
    fn read_events_after_a_cursor_excludes_earlier_events() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(&dir);
        let run_id = RunId::new("run-1");
        let first = EventSeq::first();
        store.append_event(&run_id, first, &started(&run_id)).expect("append");
        store.append_event(&run_id, first.next(), &RunEvent::RunCompleted { at: now() }).expect("append");
        let page = store.read_events(&run_id, Some(first), usize::MAX).expect("read");
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].0, first.next());
    }

    #[test]
    fn checkpoint_resume_replays_only_up_to_the_checkpoint() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(&dir);
        let run_id = RunId::new("run-1");
        store.append_event(&run_id, EventSeq::first(), &started(&run_id)).expect("append");
        let checkpoint_seq = store.create_checkpoint(&run_id, "before-risky-step").expect("checkpoint");
        store.append_event(&run_id, checkpoint_seq.next(), &RunEvent::RunCompleted { at: now() }).expect("append");
        let resumed = store.resume_from_checkpoint(&run_id, checkpoint_seq).expect("resume");
        assert!(!resumed.status.is_terminal());
    }

    #[test]
    fn write_envelope_is_idempotent_on_identical_content() {
        use kernel_core::core::EnvelopeMeta;
        use kernel_core::core::EnvelopeStatus;
        use kernel_core::core::EnvelopeSummary;
        use kernel_core::core::Evidence;
        use kernel_core::core::FileChanges;
        use kernel_core::core::HandoffEnvelope;
        use kernel_core::core::RoutingRecommendation;
        use kernel_core::core::{CorrelationId, EnvelopeId, RunId, SessionId};

        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(&dir);
        let envelope = HandoffEnvelope {
            schema_version: "1.0.0".to_string(),
            envelope_id: EnvelopeId::new("env-1"),
            session_id: SessionId::new("sess-1"),
            correlation_id: CorrelationId::new("corr-1"),
            meta: EnvelopeMeta {
                step_id: StepId::new("step-1"),
                flow_key: "flow-1".to_string(),
                run_id: RunId::new("run-1"),
                agent_key: "backend-1".to_string(),
            },
            status: EnvelopeStatus::Verified,
            summary: EnvelopeSummary {
                what_i_did: "wrote a test".to_string(),
                what_i_found: "nothing surprising".to_string(),
                key_decisions: vec![],
                evidence: Evidence { artifacts_produced: vec![], commands_run: vec![], measurements: serde_json::json!({}) },
            },
            concerns: vec![],
            assumptions: vec![],
            file_changes: FileChanges { files: vec![], totals: serde_json::json!({}) },
            routing: RoutingRecommendation {
                recommendation: "advance".to_string(),
                reason: "work is complete".to_string(),
                next_step_suggestion: None,
                can_further_iteration_help: false,
            },
            content_hash: kernel_core::core::hash_value(&serde_json::json!({"hello": "world"})).expect("hash"),
            closed_at: now(),
        };
        store.write_envelope(&envelope).expect("write once");
        store.write_envelope(&envelope).expect("write twice");
    }
}
