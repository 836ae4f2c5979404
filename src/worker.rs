//! Background processing of a single transcription job.
//!
//! One job id, one worker task, one writer of the job record. The worker is
//! the only place that touches the record after creation, which is what makes
//! per-record mutation race-free without locking.
//!
//! Two guarantees hold on *every* exit path, including panics:
//! - the temporary input file is deleted (`RemoveFileGuard`)
//! - the job record ends up in a terminal state (`OutcomeGuard`)

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::formatter::format_transcript;
use crate::jobs::{JobId, JobState, JobStore};
use crate::opts::FormatOpts;
use crate::provider::TranscriptionProvider;

/// Everything a worker needs to process one job.
#[derive(Debug, Clone)]
pub struct JobInput {
    pub job_id: JobId,

    /// Temporary copy of the uploaded audio. Deleted when processing ends.
    pub audio_path: PathBuf,

    /// Where the finished SRT artifact is written.
    pub output_path: PathBuf,

    /// MIME type of the uploaded audio, inferred from the original filename.
    pub mime_type: String,
}

/// Run one job to completion or failure and return its terminal state.
///
/// Upstream failures (network, quota, timeout) are caught and mapped to
/// `Failed`; no detail beyond logging, no retries, no cancellation.
pub async fn process_job(
    store: Arc<dyn JobStore>,
    provider: Arc<dyn TranscriptionProvider>,
    input: JobInput,
    opts: FormatOpts,
) -> JobState {
    let _cleanup = RemoveFileGuard::new(input.audio_path.clone());
    let outcome = OutcomeGuard::new(store, input.job_id);

    match run(provider.as_ref(), &input, opts).await {
        Ok(()) => {
            info!(job_id = %input.job_id, output = %input.output_path.display(), "job completed");
            outcome.complete()
        }
        Err(err) => {
            error!(job_id = %input.job_id, error = %err, "job failed");
            outcome.fail()
        }
    }
}

async fn run(
    provider: &dyn TranscriptionProvider,
    input: &JobInput,
    opts: FormatOpts,
) -> crate::Result<()> {
    let transcript = provider
        .transcribe(&input.audio_path, &input.mime_type)
        .await?;

    let srt = format_transcript(&transcript, &opts);
    tokio::fs::write(&input.output_path, srt).await?;

    Ok(())
}

/// Deletes a file when dropped.
///
/// Drop runs on success, on error, and during unwinding, so the temporary
/// input never outlives its job.
struct RemoveFileGuard {
    path: PathBuf,
}

impl RemoveFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Drop for RemoveFileGuard {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %err, "failed to remove input file");
            }
        }
    }
}

/// Forces the job record into a terminal state.
///
/// The worker resolves the guard explicitly via `complete`/`fail`. If the
/// guard is instead dropped unresolved (a panic somewhere in the processing
/// path), it marks the job failed so no record is ever stuck in `processing`.
struct OutcomeGuard {
    store: Arc<dyn JobStore>,
    job_id: JobId,
    resolved: bool,
}

impl OutcomeGuard {
    fn new(store: Arc<dyn JobStore>, job_id: JobId) -> Self {
        Self {
            store,
            job_id,
            resolved: false,
        }
    }

    fn complete(mut self) -> JobState {
        self.resolved = true;
        self.store.mark_completed(&self.job_id);
        JobState::Completed
    }

    fn fail(mut self) -> JobState {
        self.resolved = true;
        self.store.mark_failed(&self.job_id);
        JobState::Failed
    }
}

impl Drop for OutcomeGuard {
    fn drop(&mut self) {
        if !self.resolved {
            warn!(job_id = %self.job_id, "worker exited without resolving job; marking failed");
            self.store.mark_failed(&self.job_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{InMemoryJobStore, JobRecord};
    use uuid::Uuid;

    #[test]
    fn remove_file_guard_deletes_the_file_on_drop() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("input.wav");
        std::fs::write(&path, b"fake audio")?;

        {
            let _guard = RemoveFileGuard::new(path.clone());
        }

        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn remove_file_guard_tolerates_a_missing_file() {
        let _guard = RemoveFileGuard::new(PathBuf::from("/nonexistent/input.wav"));
    }

    #[test]
    fn unresolved_outcome_guard_marks_the_job_failed() -> anyhow::Result<()> {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let id = Uuid::new_v4();
        store.create(id, JobRecord::new("a.mp3", "/tmp/a.srt"))?;

        {
            let _guard = OutcomeGuard::new(Arc::clone(&store), id);
        }

        assert_eq!(store.get(&id).expect("exists").state, JobState::Failed);
        Ok(())
    }

    #[test]
    fn resolved_outcome_guard_does_not_override_completion() -> anyhow::Result<()> {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let id = Uuid::new_v4();
        store.create(id, JobRecord::new("a.mp3", "/tmp/a.srt"))?;

        let guard = OutcomeGuard::new(Arc::clone(&store), id);
        assert_eq!(guard.complete(), JobState::Completed);

        assert_eq!(store.get(&id).expect("exists").state, JobState::Completed);
        Ok(())
    }
}
