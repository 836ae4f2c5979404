//! Gemini-backed transcription provider.
//!
//! The call sequence mirrors the reference deployment:
//! 1. Upload the raw audio bytes to the Files API, receiving a file URI.
//! 2. Call `generateContent` with a system instruction, a user prompt, and a
//!    reference to the uploaded file.
//! 3. Concatenate the text parts of the first candidate.
//!
//! The model is asked to answer in SRT form, but its output is treated as free
//! text: the formatter downstream decides whether it can be passed through or
//! needs the fixed-window fallback.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::provider::TranscriptionProvider;
use crate::{Error, Result};

/// Default model used for transcription requests.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Default API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default end-to-end timeout for a single API call.
///
/// Transcribing long audio can take minutes; this bounds how long a background
/// job may block on the provider. There is no retry on top of it.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Default system instruction sent with every transcription request.
///
/// The service was built for Hindi-English mixed audio (Hinglish), so that is
/// what the defaults steer the model toward. Deployments transcribing other
/// material override `system_instruction`/`prompt` in [`GeminiConfig`].
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "\
You are a specialized transcription assistant focused on Hindi-English mixed audio (Hinglish).
Your task is to transcribe the audio accurately, preserving the mixed language nature.
Write the transcript in Roman script (not Devanagari), and format as a properly timed SRT file.
Focus on natural Hinglish transcription without attempting to translate either to pure Hindi or English.";

/// Default user prompt sent alongside the audio.
pub const DEFAULT_PROMPT: &str = "Transcribe this audio file to Hinglish (Hindi-English mix) in \
SRT format. Use Roman script for Hindi words. Include proper timestamps.";

/// Configuration for [`GeminiProvider`].
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key. The server binary reads this from `GOOGLE_API_KEY`.
    pub api_key: String,

    /// Model name (e.g. `gemini-2.0-flash`).
    pub model: String,

    /// API base URL. Overridable so tests and proxies can point elsewhere.
    pub base_url: String,

    /// System instruction steering the model toward transcription.
    pub system_instruction: String,

    /// User prompt sent together with the uploaded audio.
    pub prompt: String,

    /// End-to-end timeout applied to each HTTP call.
    pub request_timeout: Duration,
}

impl GeminiConfig {
    /// Configuration with reference-deployment defaults for everything but the key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_owned(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_owned(),
            prompt: DEFAULT_PROMPT.to_owned(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// A `TranscriptionProvider` that calls the Gemini REST API.
#[derive(Debug)]
pub struct GeminiProvider {
    http: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiProvider {
    /// Create a provider from `config`.
    ///
    /// We fail fast on an empty API key so a misconfigured deployment is
    /// caught at startup instead of on the first upload.
    pub fn new(config: GeminiConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(Error::msg("Gemini API key must not be empty"));
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { http, config })
    }

    /// Upload raw audio bytes to the Files API and return the file URI.
    async fn upload_media(&self, bytes: Vec<u8>, mime_type: &str) -> Result<String> {
        let url = format!("{}/upload/v1beta/files", self.config.base_url);

        debug!(bytes = bytes.len(), mime_type, "uploading audio to the Files API");
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .header("x-goog-upload-protocol", "raw")
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes)
            .send()
            .await?;

        let response = check_status(response, "file upload").await?;
        let uploaded: UploadResponse = response.json().await?;
        Ok(uploaded.file.uri)
    }

    /// Ask the model for a transcript of the previously uploaded file.
    async fn generate(&self, file_uri: String, mime_type: &str) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url, self.config.model
        );

        let request = GenerateRequest {
            system_instruction: Content {
                parts: vec![Part::text(&self.config.system_instruction)],
            },
            contents: vec![Content {
                parts: vec![
                    Part::text(&self.config.prompt),
                    Part::file(file_uri, mime_type),
                ],
            }],
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let response = check_status(response, "content generation").await?;
        let generated: GenerateResponse = response.json().await?;
        extract_text(generated)
    }
}

#[async_trait]
impl TranscriptionProvider for GeminiProvider {
    async fn transcribe(&self, audio_path: &Path, mime_type: &str) -> Result<String> {
        info!(path = %audio_path.display(), "sending audio to Gemini");

        let bytes = tokio::fs::read(audio_path).await?;
        let file_uri = self.upload_media(bytes, mime_type).await?;
        let transcript = self.generate(file_uri, mime_type).await?;

        info!(chars = transcript.len(), "received transcript from Gemini");
        Ok(transcript)
    }
}

/// Map a non-success HTTP status to an error carrying the response body.
///
/// `reqwest::Response::error_for_status` drops the body, which is where the
/// API puts its diagnostics, so we do this by hand.
async fn check_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(Error::msg(format!(
        "gemini {what} failed with status {status}: {body}"
    )))
}

/// Concatenate the text parts of the first candidate.
fn extract_text(response: GenerateResponse) -> Result<String> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| Error::msg("gemini returned no candidates"))?;

    let text: String = candidate
        .content
        .parts
        .into_iter()
        .filter_map(|part| part.text)
        .collect();

    if text.is_empty() {
        return Err(Error::msg("gemini returned an empty transcript"));
    }

    Ok(text)
}

// --- Wire types -------------------------------------------------------------
//
// The REST API accepts snake_case field names, so plain derives suffice.

#[derive(Debug, Serialize)]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    file_data: Option<FileData>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            file_data: None,
        }
    }

    fn file(file_uri: String, mime_type: impl Into<String>) -> Self {
        Self {
            text: None,
            file_data: Some(FileData {
                mime_type: mime_type.into(),
                file_uri,
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: UploadedFile,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    uri: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_api_key_is_rejected() {
        let err = GeminiProvider::new(GeminiConfig::new("  ")).unwrap_err();
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    fn config_defaults_match_the_reference_deployment() {
        let config = GeminiConfig::new("key");
        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.request_timeout, Duration::from_secs(600));

        // The default instructions target Hinglish audio in Roman script.
        assert!(config.system_instruction.contains("Hinglish"));
        assert!(config.system_instruction.contains("Roman script"));
        assert!(config.prompt.contains("Hinglish"));
        assert!(config.prompt.contains("Roman script"));
    }

    #[test]
    fn extract_text_concatenates_candidate_parts() -> anyhow::Result<()> {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"hello "},{"text":"world"}]}}]}"#,
        )?;
        assert_eq!(extract_text(response)?, "hello world");
        Ok(())
    }

    #[test]
    fn extract_text_errors_on_missing_candidates() -> anyhow::Result<()> {
        let response: GenerateResponse = serde_json::from_str(r#"{}"#)?;
        let err = extract_text(response).unwrap_err();
        assert!(err.to_string().contains("no candidates"));
        Ok(())
    }

    #[test]
    fn generate_request_serializes_snake_case_file_data() -> anyhow::Result<()> {
        let request = GenerateRequest {
            system_instruction: Content {
                parts: vec![Part::text("sys")],
            },
            contents: vec![Content {
                parts: vec![
                    Part::text("prompt"),
                    Part::file("files/abc".to_owned(), "audio/mpeg"),
                ],
            }],
        };

        let json = serde_json::to_value(&request)?;
        assert_eq!(json["system_instruction"]["parts"][0]["text"], "sys");
        assert_eq!(
            json["contents"][0]["parts"][1]["file_data"]["file_uri"],
            "files/abc"
        );
        // Unset part fields are omitted entirely.
        assert!(json["contents"][0]["parts"][0].get("file_data").is_none());
        Ok(())
    }
}
