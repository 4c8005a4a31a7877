use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::process::Command;
use tokio::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};

pub const SECRET_HEADER: &str = "x-gastropath-secret";
pub const TRUSTED_HOST: &str = "maps.app.goo.gl";
const ALLOWED_QUERY_PARAMS: &[&str] = &["g_st"];
const MAX_URL_LENGTH: usize = 2000;
const EXAMPLE_URL: &str = "https://maps.app.goo.gl/example";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchOutcome {
    pub success: bool,
    pub code: Option<i32>,
}

#[async_trait]
pub trait PipelineLauncher: Send + Sync {
    async fn launch(&self, url: &str) -> AppResult<LaunchOutcome>;
}

pub struct ProcessLauncher {
    program: PathBuf,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl PipelineLauncher for ProcessLauncher {
    async fn launch(&self, url: &str) -> AppResult<LaunchOutcome> {
        debug!(program = %self.program.display(), url, "launching pipeline process");
        let mut child = Command::new(&self.program)
            .arg("add")
            .arg(url)
            .stdin(Stdio::null())
            .spawn()?;
        // The run outlives the request; a disconnected caller only loses the reply.
        let status = tokio::spawn(async move { child.wait().await })
            .await
            .map_err(io::Error::other)??;
        Ok(LaunchOutcome {
            success: status.success(),
            code: status.code(),
        })
    }
}

pub struct RequestCeiling {
    max_per_window: u32,
    window: Duration,
    state: Mutex<(Instant, u32)>,
}

impl RequestCeiling {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window: max_per_window.max(1),
            window,
            state: Mutex::new((Instant::now(), 0)),
        }
    }

    pub fn per_second(max: u32) -> Self {
        Self::new(max, Duration::from_secs(1))
    }

    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();
        if now.duration_since(state.0) >= self.window {
            *state = (now, 0);
        }
        if state.1 >= self.max_per_window {
            return false;
        }
        state.1 += 1;
        true
    }
}

#[derive(Clone)]
pub struct TriggerState {
    secret: Option<SecretString>,
    ceiling: Arc<RequestCeiling>,
    launcher: Arc<dyn PipelineLauncher>,
}

impl TriggerState {
    pub fn new(
        secret: Option<SecretString>,
        ceiling: RequestCeiling,
        launcher: Arc<dyn PipelineLauncher>,
    ) -> Self {
        Self {
            secret,
            ceiling: Arc::new(ceiling),
            launcher,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.trigger_shared_secret.clone(),
            RequestCeiling::per_second(config.trigger_max_requests_per_sec),
            Arc::new(ProcessLauncher::new(config.pipeline_bin.clone())),
        )
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), TriggerError> {
        let Some(expected) = &self.secret else {
            warn!("rejecting trigger request: no shared secret configured");
            return Err(TriggerError::Unauthorized);
        };
        let provided = headers
            .get(SECRET_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(TriggerError::Unauthorized)?;
        // Compare equal-length digests rather than the raw header bytes.
        if Sha256::digest(provided.as_bytes()) == Sha256::digest(expected.expose_secret().as_bytes())
        {
            Ok(())
        } else {
            Err(TriggerError::Unauthorized)
        }
    }
}

pub fn router(state: TriggerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/add_restaurant", post(add_restaurant))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct AddRestaurantRequest {
    #[serde(alias = "URL")]
    url: String,
}

#[derive(Debug)]
pub enum TriggerError {
    RateLimited,
    Unauthorized,
    BadRequest(String),
    PipelineFailed(Option<i32>),
    Launch(String),
}

impl IntoResponse for TriggerError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            TriggerError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({ "error": "too many requests" }),
            ),
            TriggerError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "missing or invalid shared secret" }),
            ),
            TriggerError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": message, "expected_format": { "url": EXAMPLE_URL } }),
            ),
            TriggerError::PipelineFailed(code) => (
                StatusCode::BAD_GATEWAY,
                json!({ "error": "pipeline run failed", "exit_code": code }),
            ),
            TriggerError::Launch(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": format!("failed to launch pipeline: {message}") }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "message": "Server is running"
    }))
}

async fn add_restaurant(
    State(state): State<TriggerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, TriggerError> {
    let request_id = Utc::now().format("%Y%m%d%H%M%S%f").to_string();
    if !state.ceiling.try_acquire() {
        warn!(request_id = %request_id, "trigger request over the rate ceiling");
        return Err(TriggerError::RateLimited);
    }
    state.authorize(&headers).inspect_err(|_| {
        warn!(request_id = %request_id, "trigger request failed authentication");
    })?;

    let request: AddRestaurantRequest = serde_json::from_slice(&body).map_err(|err| {
        warn!(request_id = %request_id, ?err, "malformed trigger body");
        TriggerError::BadRequest(format!("Invalid request format: {err}"))
    })?;
    let sanitized = validate_and_sanitize_url(&request.url).map_err(|err| {
        warn!(request_id = %request_id, ?err, "rejected trigger url");
        TriggerError::BadRequest(err.to_string())
    })?;
    info!(request_id = %request_id, url = %sanitized, "launching pipeline for trigger request");

    let outcome = state.launcher.launch(&sanitized).await.map_err(|err| {
        error!(request_id = %request_id, ?err, "failed to launch pipeline");
        TriggerError::Launch(err.to_string())
    })?;
    if !outcome.success {
        error!(request_id = %request_id, code = ?outcome.code, "pipeline run failed");
        return Err(TriggerError::PipelineFailed(outcome.code));
    }

    info!(request_id = %request_id, "restaurant added");
    Ok(Json(json!({
        "status": "success",
        "message": "Restaurant added successfully"
    })))
}

pub fn validate_and_sanitize_url(raw: &str) -> AppResult<String> {
    let raw = raw.trim();
    if raw.len() > MAX_URL_LENGTH {
        return Err(AppError::Validation("URL exceeds maximum length".into()));
    }
    let parsed =
        Url::parse(raw).map_err(|_| AppError::Validation("Invalid URL format".into()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AppError::Validation("URL must use http or https".into()));
    }
    let host = parsed.host_str().unwrap_or_default();
    if host != TRUSTED_HOST {
        return Err(AppError::Validation("URL is not from a trusted domain".into()));
    }
    if parsed.path().len() < 2 {
        return Err(AppError::Validation("Invalid URL path".into()));
    }

    let mut sanitized = Url::parse(&format!("https://{TRUSTED_HOST}"))?;
    sanitized.set_path(parsed.path());
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| ALLOWED_QUERY_PARAMS.contains(&key.as_ref()))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    if !kept.is_empty() {
        sanitized.query_pairs_mut().extend_pairs(kept);
    }
    Ok(sanitized.to_string())
}
