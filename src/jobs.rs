//! Job lifecycle tracking.
//!
//! A job is one audio-to-subtitle conversion request. Records live in a
//! process-wide store: created on upload, mutated by the one background task
//! assigned to that job id, read by status/download queries. Per-record
//! mutation is single-writer (one job id, one worker), so the store only has
//! to support concurrent insert-by-new-key and read-by-key.
//!
//! State is in-memory only and lost on restart. That matches the intended
//! ephemeral single-process deployment.

use std::path::PathBuf;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{Error, Result};

/// Identifier for one transcription job. Generated with UUIDv4, so collisions
/// are negligible.
pub type JobId = Uuid;

/// Lifecycle state of a job.
///
/// Transitions: `Processing -> Completed` and `Processing -> Failed`. Terminal
/// states are final; a record never reverts to `Processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Processing,
    Completed,
    Failed,
}

impl JobState {
    /// Wire-format state value used in API responses.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Processing)
    }
}

/// One tracked transcription job.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    #[serde(rename = "status")]
    pub state: JobState,

    /// Original (client-supplied) upload filename. Used to name the download.
    pub filename: String,

    /// Where the finished SRT artifact is written.
    #[serde(rename = "output")]
    pub output_path: PathBuf,
}

impl JobRecord {
    /// A fresh record in the `Processing` state.
    pub fn new(filename: impl Into<String>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            state: JobState::Processing,
            filename: filename.into(),
            output_path: output_path.into(),
        }
    }
}

/// Storage contract for job records.
///
/// The store is injectable (handlers and workers hold `Arc<dyn JobStore>`) so
/// tests can substitute their own instance instead of relying on process-wide
/// state.
pub trait JobStore: Send + Sync {
    /// Insert a new record. The record should be in the `Processing` state.
    ///
    /// A duplicate id is a caller bug (ids come from UUIDv4) and is reported
    /// as an error rather than silently overwriting the existing record.
    fn create(&self, id: JobId, record: JobRecord) -> Result<()>;

    /// Current record for `id`, if any.
    fn get(&self, id: &JobId) -> Option<JobRecord>;

    /// Set the state of an existing record.
    ///
    /// Missing ids and already-terminal records both indicate a caller bug
    /// under the single-writer discipline; we warn and apply last-write-wins
    /// semantics instead of panicking, because this is called from background
    /// workers that must never take the process down.
    fn set_state(&self, id: &JobId, state: JobState);

    fn mark_completed(&self, id: &JobId) {
        self.set_state(id, JobState::Completed);
    }

    fn mark_failed(&self, id: &JobId) {
        self.set_state(id, JobState::Failed);
    }
}

/// The default `JobStore`: a concurrent in-memory map.
///
/// `DashMap` gives us lock-free-enough concurrent insert/read across the many
/// in-flight jobs; per-record writes need no further coordination because each
/// record has exactly one writer.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    records: DashMap<JobId, JobRecord>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently tracked. Primarily for diagnostics/tests.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl JobStore for InMemoryJobStore {
    fn create(&self, id: JobId, record: JobRecord) -> Result<()> {
        match self.records.entry(id) {
            Entry::Occupied(_) => Err(Error::msg(format!("job id collision: {id}"))),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    fn get(&self, id: &JobId) -> Option<JobRecord> {
        self.records.get(id).map(|record| record.clone())
    }

    fn set_state(&self, id: &JobId, state: JobState) {
        match self.records.get_mut(id) {
            Some(mut record) => {
                if record.state.is_terminal() {
                    warn!(job_id = %id, from = record.state.as_str(), to = state.as_str(),
                        "overwriting terminal job state (caller bug)");
                }
                record.state = state;
            }
            None => {
                warn!(job_id = %id, to = state.as_str(), "state change for unknown job id");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JobRecord {
        JobRecord::new("talk.mp3", "/tmp/out/talk.srt")
    }

    #[test]
    fn fresh_job_reads_back_as_processing() -> anyhow::Result<()> {
        let store = InMemoryJobStore::new();
        let id = Uuid::new_v4();
        store.create(id, record())?;

        let got = store.get(&id).expect("record should exist");
        assert_eq!(got.state, JobState::Processing);
        assert_eq!(got.filename, "talk.mp3");
        Ok(())
    }

    #[test]
    fn get_on_unknown_id_is_none() {
        let store = InMemoryJobStore::new();
        assert!(store.get(&Uuid::new_v4()).is_none());
    }

    #[test]
    fn duplicate_create_errors() -> anyhow::Result<()> {
        let store = InMemoryJobStore::new();
        let id = Uuid::new_v4();
        store.create(id, record())?;

        let err = store.create(id, record()).unwrap_err();
        assert!(err.to_string().contains("collision"));

        // The original record is untouched.
        assert_eq!(store.len(), 1);
        Ok(())
    }

    #[test]
    fn mark_completed_is_visible_and_does_not_revert() -> anyhow::Result<()> {
        let store = InMemoryJobStore::new();
        let id = Uuid::new_v4();
        store.create(id, record())?;

        store.mark_completed(&id);
        assert_eq!(store.get(&id).expect("exists").state, JobState::Completed);

        // Re-reading never flips a terminal record back to processing.
        assert_eq!(store.get(&id).expect("exists").state, JobState::Completed);
        Ok(())
    }

    #[test]
    fn mark_failed_on_unknown_id_is_a_no_op() {
        let store = InMemoryJobStore::new();
        store.mark_failed(&Uuid::new_v4());
        assert!(store.is_empty());
    }

    #[test]
    fn terminal_overwrite_is_last_write_wins() -> anyhow::Result<()> {
        let store = InMemoryJobStore::new();
        let id = Uuid::new_v4();
        store.create(id, record())?;

        store.mark_completed(&id);
        store.mark_failed(&id);
        assert_eq!(store.get(&id).expect("exists").state, JobState::Failed);
        Ok(())
    }

    #[test]
    fn concurrent_creates_and_completions_do_not_corrupt_records() -> anyhow::Result<()> {
        use std::sync::Arc;

        let store = Arc::new(InMemoryJobStore::new());
        let n: usize = 32;

        let mut handles = Vec::new();
        for i in 0..n {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                let id = Uuid::new_v4();
                let record = JobRecord::new(format!("audio-{i}.wav"), format!("/tmp/{i}.srt"));
                store.create(id, record).expect("fresh UUID cannot collide");
                store.mark_completed(&id);
                (i, id)
            }));
        }

        for handle in handles {
            let (i, id) = handle.join().expect("worker thread panicked");
            let got = store.get(&id).expect("record should exist");
            assert_eq!(got.state, JobState::Completed);
            assert_eq!(got.filename, format!("audio-{i}.wav"));
        }

        assert_eq!(store.len(), n);
        Ok(())
    }
}
