use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use rust_embed::Embed;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::settings::{SettingsDocument, SettingsError, SettingsUpdate, SettingsView, ValidationError};
use crate::status;

/// Embedded static files (compiled into binary at build time)
#[derive(Embed)]
#[folder = "src/static"]
struct StaticAssets;

pub struct AppState {
    pub settings_path: PathBuf,
    pub state_path: PathBuf,
    /// Serializes settings read-modify-write
    pub settings_lock: Mutex<()>,
}

impl AppState {
    pub fn new(settings_path: PathBuf, state_path: PathBuf) -> Self {
        Self {
            settings_path,
            state_path,
            settings_lock: Mutex::new(()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Settings(e) => {
                tracing::error!("Settings file error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = json!({
            "status": "error",
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/settings", get(get_settings).post(update_settings))
        .route("/api/status", get(get_status))
        .route("/api/health", get(health_check))
        // Serve embedded static files
        .fallback(static_handler)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn get_settings(State(state): State<Arc<AppState>>) -> Result<Json<SettingsView>, ApiError> {
    let doc = SettingsDocument::load(&state.settings_path).await?;
    Ok(Json(doc.view()))
}

async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let settings = update.validate()?;

    let _guard = state.settings_lock.lock().await;
    let mut doc = SettingsDocument::load(&state.settings_path).await?;
    doc.apply(&settings);
    doc.save(&state.settings_path).await?;

    tracing::info!(
        poll_seconds = settings.poll_seconds,
        webhook = !settings.discord_webhook.is_empty(),
        custom_base = !settings.umbrel_app_base.is_empty(),
        "Settings saved"
    );

    Ok(Json(json!({
        "status": "ok",
        "message": "Settings saved. The watcher applies them on its next poll.",
    })))
}

async fn get_status(State(state): State<Arc<AppState>>) -> Response {
    match status::check(&state.state_path, SystemTime::now()).await {
        Ok(status) => Json(status).into_response(),
        Err(e) => {
            tracing::warn!("Failed to read state file metadata: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}

/// Handler for embedded static files
async fn static_handler(uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/');

    // Default to index.html for root path
    let path = if path.is_empty() { "index.html" } else { path };

    if let Some(content) = StaticAssets::get(path) {
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        return (
            [(header::CONTENT_TYPE, mime.as_ref().to_string())],
            Body::from(content.data.into_owned()),
        )
            .into_response();
    }

    // Directory-like paths get the page itself
    if !path.contains('.') {
        if let Some(content) = StaticAssets::get("index.html") {
            return (
                [(header::CONTENT_TYPE, "text/html".to_string())],
                Body::from(content.data.into_owned()),
            )
                .into_response();
        }
    }

    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MIN_POLL_SECONDS;
    use axum::http::Request;
    use tower::ServiceExt;

    struct Fixture {
        _dir: tempfile::TempDir,
        state: Arc<AppState>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let state = Arc::new(AppState::new(
                dir.path().join("settings.toml"),
                dir.path().join("state.json"),
            ));
            Self { _dir: dir, state }
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
            let response = create_router(self.state.clone()).oneshot(request).await.unwrap();
            let status = response.status();
            let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, body.to_vec())
        }

        async fn get_json(&self, uri: &str) -> (StatusCode, serde_json::Value) {
            let (status, body) = self
                .send(Request::get(uri).body(Body::empty()).unwrap())
                .await;
            (status, serde_json::from_slice(&body).unwrap())
        }

        async fn post_settings(&self, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
            let request = Request::post("/api/settings")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap();
            let (status, body) = self.send(request).await;
            (status, serde_json::from_slice(&body).unwrap())
        }
    }

    #[tokio::test]
    async fn test_get_settings_defaults() {
        let fx = Fixture::new();
        let (status, body) = fx.get_json("/api/settings").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"discord_webhook": "", "poll_seconds": 15, "umbrel_app_base": ""})
        );
    }

    #[tokio::test]
    async fn test_post_settings_saves_and_preserves_unknown_keys() {
        let fx = Fixture::new();
        std::fs::write(&fx.state.settings_path, "owner = \"me\"\n").unwrap();

        let (status, body) = fx
            .post_settings(json!({
                "discord_webhook": " https://discord.com/api/webhooks/1/x ",
                "poll_seconds": 30,
            }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (_, settings) = fx.get_json("/api/settings").await;
        assert_eq!(settings["discord_webhook"], "https://discord.com/api/webhooks/1/x");
        assert_eq!(settings["poll_seconds"], 30);

        let doc = SettingsDocument::load(&fx.state.settings_path).await.unwrap();
        assert_eq!(doc.get("owner").and_then(|v| v.as_str()), Some("me"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overlapping_posts_all_saved() {
        let fx = Arc::new(Fixture::new());
        std::fs::write(&fx.state.settings_path, "owner = \"me\"\n").unwrap();

        let mut requests = Vec::new();
        for i in 0..16u64 {
            let fx = fx.clone();
            requests.push(tokio::spawn(async move {
                fx.post_settings(json!({"poll_seconds": MIN_POLL_SECONDS + i})).await
            }));
        }
        for request in requests {
            let (status, body) = request.await.unwrap();
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "ok");
        }

        let doc = SettingsDocument::load(&fx.state.settings_path).await.unwrap();
        let poll_seconds = doc.view().poll_seconds;
        assert!((MIN_POLL_SECONDS..MIN_POLL_SECONDS + 16).contains(&poll_seconds));
        assert_eq!(doc.get("owner").and_then(|v| v.as_str()), Some("me"));
    }

    #[tokio::test]
    async fn test_post_settings_rejects_invalid_values() {
        let fx = Fixture::new();

        let (status, body) = fx.post_settings(json!({"poll_seconds": 2})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");

        let (status, _) = fx
            .post_settings(json!({"discord_webhook": "not a url"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // Nothing written on rejection
        assert!(!fx.state.settings_path.exists());
    }

    #[tokio::test]
    async fn test_malformed_settings_file_is_server_error() {
        let fx = Fixture::new();
        std::fs::write(&fx.state.settings_path, "[[[").unwrap();

        let (status, body) = fx.get_json("/api/settings").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let fx = Fixture::new();

        let (status, body) = fx.get_json("/api/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state_file_exists"], false);
        assert_eq!(body["status"], "waiting_for_first_run");

        std::fs::write(&fx.state.state_path, "{\"last_bestever\":{}}").unwrap();
        let (_, body) = fx.get_json("/api/status").await;
        assert_eq!(body["state_file_exists"], true);
        assert_eq!(body["status"], "running");
        assert!(body["last_update_seconds_ago"].as_u64().unwrap() < 60);
    }

    #[tokio::test]
    async fn test_health_and_static_fallback() {
        let fx = Fixture::new();

        let (status, body) = fx
            .send(Request::get("/api/health").body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK");

        let (status, index) = fx
            .send(Request::get("/").body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8_lossy(&index).contains("<html"));

        let (status, page) = fx
            .send(Request::get("/settings").body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page, index);

        let (status, _) = fx
            .send(Request::get("/missing.js").body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
