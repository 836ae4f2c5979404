use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::from_fn;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::{Level, error, info};
use uuid::Uuid;

mod metrics;

use subgen::jobs::JobRecord;
use subgen::worker::{JobInput, process_job};
use subgen::{
    FormatOpts, GeminiConfig, GeminiProvider, InMemoryJobStore, JobState, JobStore,
    TranscriptionProvider,
};

#[derive(Parser, Debug)]
#[command(name = "subgen-server")]
#[command(about = "HTTP server for audio-to-SRT transcription")]
struct Params {
    /// Host interface to bind to.
    #[arg(long = "host", default_value = "127.0.0.1")]
    host: String,

    /// TCP port to listen on.
    #[arg(long = "port", default_value_t = 8000)]
    port: u16,

    /// Maximum request body size (bytes).
    #[arg(long = "max-bytes", default_value_t = 100 * 1024 * 1024)]
    max_bytes: usize,

    /// Gemini model name.
    #[arg(long = "model", default_value = subgen::providers::gemini::DEFAULT_MODEL)]
    model: String,

    /// Timeout for a single provider call, in seconds.
    #[arg(long = "request-timeout-secs", default_value_t = 600)]
    request_timeout_secs: u64,

    /// Per-cue duration (seconds) for the fixed-window formatting fallback.
    #[arg(long = "window-seconds", default_value_t = 5.0, value_parser = parse_window_seconds)]
    window_seconds: f64,
}

/// Cue windows must be positive and finite, or every generated cue would
/// violate `end > start`.
fn parse_window_seconds(raw: &str) -> std::result::Result<f64, String> {
    let value: f64 = raw.parse().map_err(|err| format!("invalid number: {err}"))?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err("window seconds must be greater than zero".to_owned())
    }
}

/// Process-local working directories for one server instance.
///
/// Everything lives under a `TempDir` that is removed when the server exits;
/// artifacts have no durability guarantee across restarts.
struct WorkDirs {
    input_dir: PathBuf,
    output_dir: PathBuf,

    // Held so the directory outlives the server.
    _tmp: tempfile::TempDir,
}

impl WorkDirs {
    fn new() -> Result<Self> {
        let tmp = tempfile::tempdir().context("failed to create work directory")?;
        let input_dir = tmp.path().join("input");
        let output_dir = tmp.path().join("output");
        std::fs::create_dir_all(&input_dir).context("failed to create input directory")?;
        std::fs::create_dir_all(&output_dir).context("failed to create output directory")?;

        Ok(Self {
            input_dir,
            output_dir,
            _tmp: tmp,
        })
    }
}

#[derive(Clone)]
struct AppState {
    store: Arc<dyn JobStore>,
    provider: Arc<dyn TranscriptionProvider>,
    dirs: Arc<WorkDirs>,
    format_opts: FormatOpts,
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    job_id: Uuid,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[tokio::main]
async fn main() {
    subgen::init_logging();

    if let Err(err) = run().await {
        error!(error = ?err, "subgen-server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let params = Params::parse();

    metrics::init();

    let addr: SocketAddr = format!("{}:{}", params.host, params.port)
        .parse()
        .context("invalid host/port bind address")?;

    let api_key =
        std::env::var("GOOGLE_API_KEY").context("GOOGLE_API_KEY environment variable not set")?;

    let mut config = GeminiConfig::new(api_key);
    config.model = params.model.clone();
    config.request_timeout = Duration::from_secs(params.request_timeout_secs);
    let provider = GeminiProvider::new(config).context("failed to initialize Gemini provider")?;

    let state = AppState {
        store: Arc::new(InMemoryJobStore::new()),
        provider: Arc::new(provider),
        dirs: Arc::new(WorkDirs::new()?),
        format_opts: FormatOpts {
            window_seconds: params.window_seconds,
        },
    };

    let app = Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics::prometheus_metrics))
        .route("/upload", post(upload))
        .route("/status/{job_id}", get(status))
        .route("/download/{job_id}", get(download))
        .route_layer(from_fn(metrics::track_http_metrics))
        .with_state(state)
        .layer(DefaultBodyLimit::max(params.max_bytes))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .level(Level::INFO)
                        .include_headers(false),
                )
                .on_response(DefaultOnResponse::new().level(Level::INFO))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        );

    let listener = TcpListener::bind(addr).await.context("bind failed")?;
    info!(%addr, "listening");
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

async fn root() -> Html<&'static str> {
    Html(include_str!("index.html"))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> std::result::Result<Json<UploadResponse>, AppError> {
    let mut accepted: Option<(String, axum::body::Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(err.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = sanitize_filename(field.file_name().unwrap_or_default());
        let bytes = field
            .bytes()
            .await
            .map_err(|err| AppError::bad_request(err.to_string()))?;
        accepted = Some((filename, bytes));
        break;
    }

    let Some((filename, bytes)) = accepted else {
        return Err(AppError::bad_request("multipart field 'file' is required"));
    };
    if bytes.is_empty() {
        return Err(AppError::bad_request("uploaded file was empty"));
    }

    let job_id = Uuid::new_v4();
    let audio_path = state.dirs.input_dir.join(format!("{job_id}_{filename}"));
    let output_path = state.dirs.output_dir.join(format!("{job_id}.srt"));
    let mime_type = mime_guess::from_path(&filename)
        .first_or_octet_stream()
        .to_string();

    tokio::fs::write(&audio_path, &bytes)
        .await
        .map_err(|err| AppError::internal(format!("failed to store upload: {err}")))?;

    state
        .store
        .create(job_id, JobRecord::new(filename.as_str(), &output_path))
        .map_err(|err| AppError::internal(err.to_string()))?;

    info!(%job_id, filename, bytes = bytes.len(), "upload accepted");

    // One spawned task per job: the single writer for this record. The worker
    // guarantees a terminal state and input cleanup even if it panics; the
    // in-flight slot rides along so the gauge unwinds with it too.
    let in_flight = metrics::InFlightJob::start();
    let store = Arc::clone(&state.store);
    let provider = Arc::clone(&state.provider);
    let format_opts = state.format_opts;
    let input = JobInput {
        job_id,
        audio_path,
        output_path,
        mime_type,
    };
    tokio::spawn(async move {
        let outcome = process_job(store, provider, input, format_opts).await;
        in_flight.finish(outcome);
    });

    Ok(Json(UploadResponse {
        job_id,
        status: "processing",
    }))
}

async fn status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> std::result::Result<Json<JobRecord>, AppError> {
    let job_id = parse_job_id(&job_id).ok_or_else(|| AppError::not_found("Job not found"))?;

    match state.store.get(&job_id) {
        Some(record) => Ok(Json(record)),
        None => Err(AppError::not_found("Job not found")),
    }
}

async fn download(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> std::result::Result<Response, AppError> {
    let job_id = parse_job_id(&job_id).ok_or_else(|| AppError::not_found("Job not found"))?;

    let Some(record) = state.store.get(&job_id) else {
        return Err(AppError::not_found("Job not found"));
    };

    if record.state != JobState::Completed {
        return Err(AppError::bad_request(format!(
            "job is {}, not ready for download",
            record.state.as_str()
        )));
    }

    let srt = tokio::fs::read(&record.output_path)
        .await
        .map_err(|err| AppError::internal(format!("failed to read artifact: {err}")))?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/x-subrip"),
            ),
            (
                header::CONTENT_DISPOSITION,
                content_disposition(&record.filename),
            ),
        ],
        srt,
    )
        .into_response())
}

/// Job ids are UUIDs; anything else can only ever be an unknown job.
fn parse_job_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw).ok()
}

/// Reduce a client-supplied filename to its final path component.
///
/// Uploaded filenames become part of a path inside the input directory, so
/// separators and parent references must not survive.
fn sanitize_filename(raw: &str) -> String {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches('.');

    if name.is_empty() {
        "upload".to_owned()
    } else {
        name.to_owned()
    }
}

/// `Content-Disposition` naming the download after the original upload,
/// with the extension swapped for `.srt`.
fn content_disposition(original_filename: &str) -> HeaderValue {
    let stem = std::path::Path::new(original_filename)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("transcript");

    HeaderValue::from_str(&format!("attachment; filename=\"{stem}.srt\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment; filename=\"transcript.srt\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_window_seconds_rejects_non_positive_values() {
        assert_eq!(parse_window_seconds("5"), Ok(5.0));
        assert_eq!(parse_window_seconds("0.5"), Ok(0.5));
        assert!(parse_window_seconds("0").is_err());
        assert!(parse_window_seconds("-3").is_err());
        assert!(parse_window_seconds("inf").is_err());
        assert!(parse_window_seconds("NaN").is_err());
        assert!(parse_window_seconds("five").is_err());
    }

    #[test]
    fn parse_job_id_accepts_uuids_and_rejects_noise() {
        assert!(parse_job_id("b9f7c4de-8d4a-4b3e-9a6f-0c2f6f1f2a3b").is_some());
        assert!(parse_job_id("not-a-job-id").is_none());
        assert!(parse_job_id("").is_none());
    }

    #[test]
    fn sanitize_filename_strips_path_components() {
        assert_eq!(sanitize_filename("talk.mp3"), "talk.mp3");
        assert_eq!(sanitize_filename("/etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("..\\..\\evil.exe"), "evil.exe");
        assert_eq!(sanitize_filename("a/b/c/audio.wav"), "audio.wav");
    }

    #[test]
    fn sanitize_filename_falls_back_for_degenerate_names() {
        assert_eq!(sanitize_filename(""), "upload");
        assert_eq!(sanitize_filename("..."), "upload");
        assert_eq!(sanitize_filename("dir/"), "upload");
    }

    #[test]
    fn content_disposition_swaps_extension_for_srt() {
        assert_eq!(
            content_disposition("interview.mp3").to_str().unwrap(),
            "attachment; filename=\"interview.srt\""
        );
        assert_eq!(
            content_disposition("noext").to_str().unwrap(),
            "attachment; filename=\"noext.srt\""
        );
    }

    #[test]
    fn content_disposition_survives_unrepresentable_names() {
        // Header values must be visible ASCII; fall back instead of panicking.
        let value = content_disposition("na\u{00ef}ve.mp3");
        assert!(value.to_str().unwrap().ends_with(".srt\""));
    }
}
