//! `subgen` — a small transcription-to-subtitle service library.
//!
//! This crate provides:
//! - A transcript formatter that turns raw model output into SRT
//! - Job lifecycle tracking for in-flight transcriptions
//! - A pluggable transcription provider (Gemini-backed by default)
//! - Pluggable output encoders (SRT, JSON)
//!
//! The library is designed to be used by both CLI tools and long-running services,
//! with an emphasis on clarity and minimal surprises. The actual transcription
//! intelligence lives in the external model API; this crate is the plumbing and
//! the (deliberately naive) subtitle formatting around it.

// High-level API (most consumers should start here).
pub mod formatter;
pub mod opts;

// Job lifecycle tracking.
pub mod jobs;

// Background processing of a single job.
pub mod worker;

// External transcription providers.
pub mod provider;
pub mod providers;

// Cue data structures.
pub mod cue;

// Output selection and encoder interfaces.
pub mod cue_encoder;
pub mod output_type;

// Output encoders that serialize cues into various formats.
pub mod json_cue_encoder;
pub mod srt_encoder;

// Logging configuration and control.
#[cfg(feature = "logging")]
pub mod logging;

mod error;

pub use crate::error::{Error, Result};
pub use crate::formatter::format_transcript;
pub use crate::jobs::{InMemoryJobStore, JobId, JobRecord, JobState, JobStore};
pub use crate::opts::FormatOpts;
pub use crate::output_type::OutputType;
pub use crate::provider::TranscriptionProvider;
pub use crate::providers::gemini::{GeminiConfig, GeminiProvider};

#[cfg(feature = "logging")]
pub use crate::logging::init as init_logging;
