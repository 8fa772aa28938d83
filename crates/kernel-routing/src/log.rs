// crates/kernel-routing/src/log.rs
// ============================================================================
// Module: File Routing Log
// Description: Append-only persistence for routing decisions and their
//              sidecar graph-mutation proposals.
// Purpose: Keep a forensically replayable record of every routing decision,
//          independent of (but cross-referenced with) the run event log.
// Dependencies: kernel-core, serde_json
// ============================================================================

//! ## Overview
//! Every routing outcome is appended as one line to `<run>/routing/decisions.jsonl`.
//! `INJECT_FLOW` and `INJECT_NODES` decisions additionally write a sidecar
//! file describing what was spliced in, and `EXTEND_GRAPH` proposals (new
//! nodes offered by an authoritative navigator) are written for operator
//! review rather than applied automatically.

use std::fs;
use std::fs::File;
use std::io;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;

use kernel_core::core::RoutingDecisionRecord;
use kernel_core::core::RunId;
use kernel_core::interfaces::RoutingLog;
use kernel_core::interfaces::RoutingLogError;
use serde::Serialize;
use thiserror::Error;

/// Errors raised while writing to the file-backed routing log.
#[derive(Debug, Error)]
pub enum FileRoutingLogError {
    /// Filesystem I/O error.
    #[error("routing log io error: {0}")]
    Io(String),
    /// The record could not be serialized.
    #[error("routing log record not serializable: {0}")]
    Serialize(String),
}

impl From<io::Error> for FileRoutingLogError {
    fn from(error: io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<FileRoutingLogError> for RoutingLogError {
    fn from(error: FileRoutingLogError) -> Self {
        Self::WriteFailed(error.to_string())
    }
}

/// An append-only, file-backed routing decision log.
///
/// # Invariants
/// - `record` never truncates or reorders prior lines; it only appends.
pub struct FileRoutingLog {
    root: PathBuf,
}

impl FileRoutingLog {
    /// Opens (creating if absent) a routing log rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`FileRoutingLogError`] when `root` cannot be created.
    pub fn open(root: PathBuf) -> Result<Self, FileRoutingLogError> {
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Appends `record` to `<run>/routing/decisions.jsonl`.
    ///
    /// # Errors
    ///
    /// Returns [`FileRoutingLogError`] when the write fails.
    pub fn append_decision(&self, run_id: &RunId, record: &RoutingDecisionRecord) -> Result<(), FileRoutingLogError> {
        append_json_line(&self.decisions_path(run_id), record)
    }

    /// Writes a sidecar describing an `INJECT_FLOW` or `INJECT_NODES`
    /// decision's payload, under `<run>/routing/injections/<name>.json`.
    ///
    /// # Errors
    ///
    /// Returns [`FileRoutingLogError`] when the write fails.
    pub fn write_injection<T: Serialize>(&self, run_id: &RunId, name: &str, payload: &T) -> Result<(), FileRoutingLogError> {
        let dir = self.run_routing_dir(run_id).join("injections");
        fs::create_dir_all(&dir)?;
        write_json_file(&dir.join(format!("{}.json", sanitize_component(name))), payload)
    }

    /// Writes an `EXTEND_GRAPH` proposal for operator review, under
    /// `<run>/routing/proposals/<name>.json`. Proposals are never applied
    /// automatically; an operator or a later run must promote them into the
    /// flow graph explicitly.
    ///
    /// # Errors
    ///
    /// Returns [`FileRoutingLogError`] when the write fails.
    pub fn write_graph_extension_proposal<T: Serialize>(&self, run_id: &RunId, name: &str, proposal: &T) -> Result<(), FileRoutingLogError> {
        let dir = self.run_routing_dir(run_id).join("proposals");
        fs::create_dir_all(&dir)?;
        write_json_file(&dir.join(format!("{}.json", sanitize_component(name))), proposal)
    }

    fn run_routing_dir(&self, run_id: &RunId) -> PathBuf {
        self.root.join("runs").join(sanitize_component(run_id.as_str())).join("routing")
    }

    fn decisions_path(&self, run_id: &RunId) -> PathBuf {
        self.run_routing_dir(run_id).join("decisions.jsonl")
    }
}

impl RoutingLog for FileRoutingLog {
    fn record(&self, run_id: &RunId, record: &RoutingDecisionRecord) -> Result<(), RoutingLogError> {
        self.append_decision(run_id, record).map_err(Into::into)
    }
}

fn append_json_line<T: Serialize>(path: &Path, value: &T) -> Result<(), FileRoutingLogError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut serialized = serde_json::to_vec(value).map_err(|err| FileRoutingLogError::Serialize(err.to_string()))?;
    serialized.push(b'\n');
    let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(&serialized)?;
    file.flush()?;
    Ok(())
}

fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<(), FileRoutingLogError> {
    let serialized = serde_json::to_vec_pretty(value).map_err(|err| FileRoutingLogError::Serialize(err.to_string()))?;
    let tmp_path = path.with_extension("json.tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(&serialized)?;
        file.flush()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn sanitize_component(raw: &str) -> String {
    raw.chars().map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' { ch } else { '_' }).collect()
}

#[cfg(test)]
mod tests {
    use kernel_core::core::Confidence;
    use kernel_core::core::Decision;
    use kernel_core::core::IterationCounters;
    use kernel_core::core::Timestamp;
    use serde_json::json;

    use super::*;

    fn sample_record() -> RoutingDecisionRecord {
        RoutingDecisionRecord {
            schema_version: "1.0.0".to_string(),
            ts: Timestamp::UnixMillis(0),
            run_id: "run-1".to_string(),
            flow_key: "flow-1".to_string(),
            step_id: "a".to_string(),
            decision: Decision::Advance,
            target: "b".to_string(),
            reason: "only eligible edge".to_string(),
            forensic_digest: "deadbeef".to_string(),
            iteration: IterationCounters { current: 0, max: 3 },
            signature_matched: false,
            confidence: Confidence::High,
            source: "fast_path".to_string(),
        }
    }

    #[test]
    fn record_appends_one_line_per_call() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = FileRoutingLog::open(dir.path().to_path_buf()).expect("open log");
        let run_id = RunId::new("run-1");
        log.record(&run_id, &sample_record()).expect("record");
        log.record(&run_id, &sample_record()).expect("record");
        let contents = fs::read_to_string(dir.path().join("runs").join("run-1").join("routing").join("decisions.jsonl")).expect("read");
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn write_injection_creates_a_sidecar_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = FileRoutingLog::open(dir.path().to_path_buf()).expect("open log");
        let run_id = RunId::new("run-1");
        log.write_injection(&run_id, "step-a-inject", &json!({"flow_key": "utility-cleanup"})).expect("write injection");
        let path = dir.path().join("runs").join("run-1").join("routing").join("injections").join("step-a-inject.json");
        assert!(path.exists());
    }

    #[test]
    fn write_graph_extension_proposal_creates_a_proposal_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = FileRoutingLog::open(dir.path().to_path_buf()).expect("open log");
        let run_id = RunId::new("run-1");
        log.write_graph_extension_proposal(&run_id, "new-step", &json!({"proposed_step_id": "fix-flaky-test"})).expect("write proposal");
        let path = dir.path().join("runs").join("run-1").join("routing").join("proposals").join("new-step.json");
        assert!(path.exists());
    }
}
