//! Transcription provider abstraction.
//!
//! The HTTP layer and the background worker depend on the
//! [`TranscriptionProvider`] trait instead of a concrete implementation, which
//! keeps request handling decoupled from the external model API and lets tests
//! substitute a mock.

use std::path::Path;

use async_trait::async_trait;

use crate::Result;

/// Contract implemented by external speech-to-text providers.
///
/// A provider accepts an audio file plus whatever instruction/prompt it is
/// configured with, and returns free transcript text. The text may or may not
/// already be SRT-formatted; the formatter decides downstream.
///
/// The call is the only long-blocking operation in the system (potentially
/// minutes), so it must always run off the request-serving path. Failures
/// surface as errors; the worker maps them to the `failed` job state. No
/// retries are attempted at this layer.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Transcribe the audio file at `audio_path`.
    ///
    /// `mime_type` describes the uploaded audio (e.g. `audio/mpeg`); providers
    /// that transmit the raw bytes need it for their own upload step.
    async fn transcribe(&self, audio_path: &Path, mime_type: &str) -> Result<String>;
}
