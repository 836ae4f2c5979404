//! Concrete transcription provider implementations.

pub mod gemini;
