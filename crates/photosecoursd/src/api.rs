//! HTTP surface.

use crate::engine::EngineHandle;
use crate::error::ApiError;
use crate::upload::{self, UploadStore};
use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use image::{DynamicImage, RgbImage};
use photosecours_advice::{FirstAidRecommendations, Severity, SkinAnalysis, SkincareRecommendations};
use photosecours_core::FaceValidation;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Room for multipart boundaries and headers on top of the image itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    engine: EngineHandle,
    store: UploadStore,
    max_upload_bytes: usize,
    keep_uploads: bool,
}

impl AppState {
    pub fn new(engine: EngineHandle, store: UploadStore, max_upload_bytes: usize, keep_uploads: bool) -> Self {
        Self { engine, store, max_upload_bytes, keep_uploads }
    }

    /// Drop the stored upload when the analysis failed or uploads are not kept.
    async fn release(&self, path: &std::path::Path, succeeded: bool) {
        if !succeeded || !self.keep_uploads {
            self.store.remove(path).await;
        }
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes + MULTIPART_OVERHEAD;
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/analyze", post(analyze_skin))
        .route("/api/wound", post(analyze_wound))
        .route("/api/validate", post(validate))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct SkinResponse {
    id: String,
    #[serde(flatten)]
    analysis: SkinAnalysis,
    recommendations: SkincareRecommendations,
    validation: FaceValidation,
    analyzed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct WoundResponse {
    id: String,
    description: String,
    recommendations: FirstAidRecommendations,
    severity_level: Severity,
    analyzed_at: DateTime<Utc>,
}

struct Upload {
    bytes: Bytes,
    extension: &'static str,
}

/// A checked upload written to the store under a fresh analysis id.
struct StoredUpload {
    id: Uuid,
    extension: &'static str,
    path: PathBuf,
    bytes: Bytes,
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Bienvenue sur l'API PhotoSecours",
        "status": "operational",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "photosecours-api" }))
}

async fn analyze_skin(State(state): State<AppState>, multipart: Multipart) -> Result<Json<SkinResponse>, ApiError> {
    let stored = receive(&state, multipart).await?;
    let outcome = skin_flow(&state, &stored).await;
    state.release(&stored.path, outcome.is_ok()).await;
    outcome.map(Json)
}

async fn skin_flow(state: &AppState, stored: &StoredUpload) -> Result<SkinResponse, ApiError> {
    let image = decode(stored.bytes.clone()).await?;
    let report = state.engine.analyze_skin(image).await?;

    let (Some(analysis), Some(recommendations)) = (report.analysis, report.recommendations) else {
        return Err(ApiError::Rejected(Box::new(report.validation)));
    };
    if let (true, Some(prepared)) = (state.keep_uploads, report.prepared) {
        save_processed(state, stored, upload::SKIN_PROCESSED, prepared).await?;
    }

    tracing::info!(
        id = %stored.id,
        skin_type = %analysis.skin_type.category,
        problems = analysis.problems_detected.len(),
        "skin analysis complete"
    );

    Ok(SkinResponse {
        id: stored.id.to_string(),
        analysis,
        recommendations,
        validation: report.validation,
        analyzed_at: Utc::now(),
    })
}

async fn analyze_wound(State(state): State<AppState>, multipart: Multipart) -> Result<Json<WoundResponse>, ApiError> {
    let stored = receive(&state, multipart).await?;
    let outcome = wound_flow(&state, &stored).await;
    state.release(&stored.path, outcome.is_ok()).await;
    outcome.map(Json)
}

async fn wound_flow(state: &AppState, stored: &StoredUpload) -> Result<WoundResponse, ApiError> {
    let image = decode(stored.bytes.clone()).await?;
    let report = state.engine.analyze_wound(image).await?;

    if state.keep_uploads {
        save_processed(state, stored, upload::WOUND_PROCESSED, report.processed).await?;
    }

    let severity = report.recommendations.severity;
    tracing::info!(id = %stored.id, kind = %report.description.kind.category, %severity, "wound analysis complete");

    Ok(WoundResponse {
        id: stored.id.to_string(),
        description: report.description.text,
        recommendations: report.recommendations,
        severity_level: severity,
        analyzed_at: Utc::now(),
    })
}

/// Encode and write a processed image next to its upload on the blocking pool.
async fn save_processed(
    state: &AppState,
    stored: &StoredUpload,
    suffix: &'static str,
    image: RgbImage,
) -> Result<(), ApiError> {
    let store = state.store.clone();
    let (id, ext) = (stored.id, stored.extension);
    tokio::task::spawn_blocking(move || store.save_processed(&id, suffix, ext, &image))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(())
}

async fn validate(State(state): State<AppState>, multipart: Multipart) -> Result<Json<FaceValidation>, ApiError> {
    let stored = receive(&state, multipart).await?;
    let outcome = async {
        let image = decode(stored.bytes.clone()).await?;
        Ok::<_, ApiError>(state.engine.validate(image).await?)
    }
    .await;
    state.release(&stored.path, outcome.is_ok()).await;
    outcome.map(Json)
}

/// Read the `file` field, check it and store it.
async fn receive(state: &AppState, multipart: Multipart) -> Result<StoredUpload, ApiError> {
    let upload = read_upload(multipart, state.max_upload_bytes).await?;
    let id = Uuid::new_v4();
    let path = state.store.save(&id, upload.extension, &upload.bytes).await?;
    Ok(StoredUpload {
        id,
        extension: upload.extension,
        path,
        bytes: upload.bytes,
    })
}

async fn read_upload(mut multipart: Multipart, max_bytes: usize) -> Result<Upload, ApiError> {
    // A body past the route limit surfaces as a multipart stream error.
    let oversized = |e: MultipartError| -> ApiError {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            upload::UploadError::TooLarge { max_bytes }.into()
        } else {
            e.into()
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(oversized)? {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field.content_type().map(str::to_owned);
        let extension = upload::extension_for(field.file_name());
        let bytes = field.bytes().await.map_err(oversized)?;
        upload::check_upload(content_type.as_deref(), bytes.len(), max_bytes)?;
        return Ok(Upload { bytes, extension });
    }
    Err(ApiError::MissingFile)
}

async fn decode(bytes: Bytes) -> Result<DynamicImage, ApiError> {
    let image = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(image)
}
