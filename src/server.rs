use std::{collections::BTreeMap, sync::Arc, time::Instant};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        DefaultBodyLimit, Multipart, Query, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::QueryRejection,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::info;

use crate::{
    config::AppConfig,
    error::ServiceError,
    model::{Caption, CaptionResponse, ModelMetadata, ModelRegistry},
    storage::UploadStore,
    ui::Templates,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<ModelRegistry>,
    pub uploads: UploadStore,
    pub templates: Arc<Templates>,
}

#[derive(Serialize)]
struct ServiceInfo {
    message: &'static str,
    version: &'static str,
    model_id: String,
    model: Option<ModelMetadata>,
    endpoints: BTreeMap<&'static str, &'static str>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model_loaded: bool,
}

#[derive(Debug, Deserialize)]
pub struct CaptionParams {
    pub max_length: Option<usize>,
}

#[derive(Debug)]
pub struct Upload {
    pub bytes: Bytes,
    pub content_type: Option<String>,
    pub filename: Option<String>,
}

pub fn build_router(
    config: Arc<AppConfig>,
    registry: Arc<ModelRegistry>,
) -> Result<Router, ServiceError> {
    let state = AppState {
        uploads: UploadStore::new(config.upload_dir(), "/static/uploads"),
        templates: Arc::new(Templates::new()?),
        registry,
        config: config.clone(),
    };

    Ok(Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/caption", post(caption))
        .route("/ui", get(ui_index))
        .route("/ui/caption", post(ui_caption))
        .nest_service("/static", ServeDir::new(&config.static_dir))
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.body_limit_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http()))
}

async fn root(State(state): State<AppState>) -> Json<ServiceInfo> {
    let endpoints = BTreeMap::from([
        ("/caption", "POST - Upload an image to get a caption"),
        ("/health", "GET - Check API health status"),
        ("/ui", "GET - Browser upload form"),
    ]);

    Json(ServiceInfo {
        message: "Image Captioning API",
        version: env!("CARGO_PKG_VERSION"),
        model_id: state.config.model_id.clone(),
        model: state.registry.metadata(),
        endpoints,
    })
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        model_loaded: state.registry.is_loaded(),
    })
}

async fn caption(
    State(state): State<AppState>,
    params: Result<Query<CaptionParams>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<CaptionResponse>, ServiceError> {
    let max_length = resolve_max_length(&state.config, params)?;
    let upload = read_upload(multipart?).await?;
    let caption = run_caption(&state, &upload, max_length).await?;

    Ok(Json(CaptionResponse {
        success: true,
        caption: caption.text,
        filename: upload.filename,
    }))
}

async fn ui_index(State(state): State<AppState>) -> Response {
    match state
        .templates
        .index(&state.config.model_id, state.config.default_max_length)
    {
        Ok(page) => Html(page).into_response(),
        Err(err) => error_page(&state, err),
    }
}

async fn ui_caption(
    State(state): State<AppState>,
    params: Result<Query<CaptionParams>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let rendered = async {
        let max_length = resolve_max_length(&state.config, params)?;
        let upload = read_upload(multipart?).await?;
        let caption = run_caption(&state, &upload, max_length).await?;
        let stored = state
            .uploads
            .save(upload.filename.as_deref(), &upload.bytes)
            .await?;
        let filename = upload.filename.as_deref().unwrap_or("upload");
        state.templates.result(filename, &stored.url, &caption.text)
    }
    .await;

    match rendered {
        Ok(page) => Html(page).into_response(),
        Err(err) => error_page(&state, err),
    }
}

async fn run_caption(
    state: &AppState,
    upload: &Upload,
    max_length: usize,
) -> Result<Caption, ServiceError> {
    let start = Instant::now();
    let caption = state
        .registry
        .caption(upload.bytes.clone(), max_length)
        .await?;
    info!(
        filename = upload.filename.as_deref().unwrap_or("-"),
        size = upload.bytes.len(),
        tokens = caption.tokens,
        max_length,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "caption generated"
    );
    Ok(caption)
}

fn error_page(state: &AppState, err: ServiceError) -> Response {
    match state.templates.error(&err.to_string()) {
        Ok(page) => {
            err.log();
            (err.status(), Html(page)).into_response()
        }
        Err(_) => err.into_response(),
    }
}

pub fn resolve_max_length(
    config: &AppConfig,
    params: Result<Query<CaptionParams>, QueryRejection>,
) -> Result<usize, ServiceError> {
    let Query(params) = params.map_err(|e| ServiceError::BadRequest(e.body_text()))?;
    match params.max_length {
        None => Ok(config.default_max_length),
        Some(0) => Err(ServiceError::BadRequest(
            "max_length must be a positive integer".into(),
        )),
        Some(n) if n > config.max_length_limit => Err(ServiceError::BadRequest(format!(
            "max_length must not exceed {}",
            config.max_length_limit
        ))),
        Some(n) => Ok(n),
    }
}

// A missing content type is let through.
pub fn validate_content_type(content_type: Option<&str>) -> Result<(), ServiceError> {
    match content_type {
        Some(ct) if !ct.trim().to_ascii_lowercase().starts_with("image/") => {
            Err(ServiceError::InvalidContentType(ct.to_string()))
        }
        _ => Ok(()),
    }
}

pub async fn read_upload(mut multipart: Multipart) -> Result<Upload, ServiceError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field.content_type().map(str::to_owned);
        let filename = field.file_name().map(str::to_owned);
        // Rejected before the body is read.
        validate_content_type(content_type.as_deref())?;

        let bytes = field.bytes().await.map_err(multipart_error)?;
        return Ok(Upload {
            bytes,
            content_type,
            filename,
        });
    }
    Err(ServiceError::BadRequest("missing multipart field `file`".into()))
}

fn multipart_error(err: MultipartError) -> ServiceError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServiceError::PayloadTooLarge(err.body_text())
    } else {
        ServiceError::BadRequest(err.body_text())
    }
}

impl From<MultipartRejection> for ServiceError {
    fn from(rejection: MultipartRejection) -> Self {
        ServiceError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_must_be_image() {
        assert!(validate_content_type(Some("image/jpeg")).is_ok());
        assert!(validate_content_type(Some("IMAGE/PNG")).is_ok());
        assert!(validate_content_type(None).is_ok());

        let err = validate_content_type(Some("text/plain")).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidContentType(ref ct) if ct == "text/plain"));
        assert!(validate_content_type(Some("application/octet-stream")).is_err());
    }

    #[test]
    fn max_length_defaults_and_bounds() {
        let config = AppConfig::default();
        let ok = |n| Ok(Query(CaptionParams { max_length: n }));

        assert_eq!(resolve_max_length(&config, ok(None)).unwrap(), 50);
        assert_eq!(resolve_max_length(&config, ok(Some(30))).unwrap(), 30);
        assert!(resolve_max_length(&config, ok(Some(0))).is_err());
        assert!(resolve_max_length(&config, ok(Some(config.max_length_limit + 1))).is_err());
    }
}
