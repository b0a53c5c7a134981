use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, header};
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::{Level, error, info, warn};

mod metrics;

use skitvoice::TtsRequest;
use skitvoice::prosody::{Tone, VoiceSettings};

#[derive(Parser, Debug)]
#[command(name = "skitvoice-server")]
#[command(about = "Voice generation proxy: picks voice settings from the line and calls the TTS provider")]
struct Params {
    /// Host interface to bind to.
    #[arg(long = "host", default_value = "127.0.0.1")]
    host: String,

    /// TCP port to listen on.
    #[arg(long = "port", default_value_t = 8080)]
    port: u16,

    /// Maximum request body size (bytes).
    #[arg(long = "max-bytes", default_value_t = 64 * 1024)]
    max_bytes: usize,

    /// Base URL of the TTS provider.
    #[arg(long = "upstream", default_value = "https://api.elevenlabs.io")]
    upstream: String,

    /// Provider model used for every request.
    #[arg(long = "model-id", default_value = "eleven_multilingual_v2")]
    model_id: String,

    /// Upstream request timeout (seconds).
    #[arg(long = "timeout-secs", default_value_t = 30)]
    timeout_secs: u64,

    /// Provider API key.
    #[arg(long = "api-key", env = "ELEVENLABS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[derive(Clone)]
struct AppState {
    inner: Arc<Upstream>,
}

struct Upstream {
    http: reqwest::Client,
    base_url: String,
    model_id: String,
    api_key: Option<String>,
}

/// Incoming body. Fields are optional so missing ones produce our own 400 instead of a
/// generic deserialization rejection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVoiceBody {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    voice_id: Option<String>,
    #[serde(default)]
    previous_text: Option<String>,
}

#[derive(Debug, Serialize)]
struct UpstreamBody<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
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
    skitvoice::init_logging();

    if let Err(err) = run().await {
        error!(error = ?err, "skitvoice-server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let params = Params::parse();

    if let Err(err) = metrics::init() {
        warn!(error = ?err, "metrics disabled (init failed)");
    }

    let addr: SocketAddr = format!("{}:{}", params.host, params.port)
        .parse()
        .context("invalid host/port bind address")?;

    if params.api_key.is_none() {
        warn!("no provider API key configured; voice requests will fail with 500");
    }

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(params.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let state = AppState {
        inner: Arc::new(Upstream {
            http,
            base_url: params.upstream.trim_end_matches('/').to_owned(),
            model_id: params.model_id,
            api_key: params.api_key,
        }),
    };

    let app = router(state, params.max_bytes);

    let listener = TcpListener::bind(addr).await.context("bind failed")?;
    info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

fn router(state: AppState, max_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("apikey"),
            HeaderName::from_static("x-client-info"),
        ]);

    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics::prometheus_metrics))
        .route("/v1/generate-voice", post(generate_voice))
        .route_layer(from_fn(metrics::track_http_metrics))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_bytes))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .level(Level::INFO)
                        .include_headers(false),
                )
                .on_response(DefaultOnResponse::new().level(Level::INFO))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = ?err, "failed to listen for shutdown signal");
    }
}

async fn root() -> &'static str {
    "skitvoice-server: POST /v1/generate-voice {text, voiceId, previousText?}"
}

async fn healthz() -> &'static str {
    "ok"
}

async fn generate_voice(
    State(state): State<AppState>,
    body: Bytes,
) -> std::result::Result<Response, AppError> {
    let request = parse_request(&body)?;
    let upstream = &state.inner;

    let Some(api_key) = upstream.api_key.as_deref() else {
        return Err(AppError::internal("TTS provider API key not configured"));
    };

    let tone = Tone::classify(&request.text, request.previous_text.as_deref());
    info!(
        voice_id = %request.voice_id,
        tone = tone.as_str(),
        has_previous = request.previous_text.is_some(),
        "generating voice"
    );

    let response = upstream
        .http
        .post(upstream_url(&upstream.base_url, &request.voice_id))
        .header(ACCEPT, "audio/mpeg")
        .header("xi-api-key", api_key)
        .json(&UpstreamBody {
            text: &request.text,
            model_id: &upstream.model_id,
            voice_settings: tone.voice_settings(),
        })
        .send()
        .await
        .map_err(|err| {
            error!(error = %err, "upstream request failed");
            AppError::internal("upstream TTS request failed")
        })?;

    let status = response.status();
    metrics::record_upstream(tone.as_str(), status.as_u16());

    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        error!(status = status.as_u16(), %detail, "upstream TTS error");
        let status = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        return Err(AppError::new(
            status,
            format!("upstream TTS error: {}", status.as_u16()),
        ));
    }

    let audio = response.bytes().await.map_err(|err| {
        error!(error = %err, "failed reading upstream audio");
        AppError::internal("failed reading upstream audio")
    })?;

    Ok((
        [(header::CONTENT_TYPE, HeaderValue::from_static("audio/mpeg"))],
        audio,
    )
        .into_response())
}

fn parse_request(body: &[u8]) -> std::result::Result<TtsRequest, AppError> {
    let parsed: GenerateVoiceBody = serde_json::from_slice(body)
        .map_err(|err| AppError::bad_request(format!("invalid JSON body: {err}")))?;

    let text = parsed.text.filter(|t| !t.trim().is_empty());
    let voice_id = parsed.voice_id.filter(|v| !v.trim().is_empty());
    let (Some(text), Some(voice_id)) = (text, voice_id) else {
        return Err(AppError::bad_request(
            "missing required parameters: text and voiceId",
        ));
    };

    Ok(TtsRequest {
        text,
        voice_id,
        previous_text: parsed.previous_text.filter(|p| !p.trim().is_empty()),
    })
}

fn upstream_url(base_url: &str, voice_id: &str) -> String {
    format!("{base_url}/v1/text-to-speech/{voice_id}")
}
