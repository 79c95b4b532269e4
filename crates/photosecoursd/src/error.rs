use crate::engine::EngineError;
use crate::upload::UploadError;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use photosecours_core::FaceValidation;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("Aucun fichier fourni (champ 'file' manquant)")]
    MissingFile,
    #[error("{}", .0.body_text())]
    Multipart(#[from] MultipartError),
    #[error("Impossible de lire l'image: {0}")]
    Decode(#[from] image::ImageError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("{}", .0.reason)]
    Rejected(Box<FaceValidation>),
    #[error("Erreur lors de l'analyse de l'image: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Upload(UploadError::NotAnImage) | ApiError::MissingFile | ApiError::Rejected(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Upload(UploadError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Multipart(e) => e.status(),
            ApiError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Engine(EngineError::ChannelClosed) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Engine(EngineError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Upload(_) | ApiError::Engine(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Engine(EngineError::ChannelClosed) => {
                "Le service d'analyse est indisponible".to_string()
            }
            ApiError::Engine(EngineError::Timeout(_)) => {
                "L'analyse a pris trop de temps, veuillez réessayer".to_string()
            }
            ApiError::Engine(e) => format!("Erreur lors de l'analyse de l'image: {e}"),
            ApiError::Upload(e @ (UploadError::Io(_) | UploadError::Encode(_))) => {
                format!("Erreur lors de l'analyse de l'image: {e}")
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, %status, "request failed");
        } else {
            tracing::warn!(error = %self, %status, "request rejected");
        }

        let body = match self {
            ApiError::Rejected(validation) => json!({
                "error": {
                    "reason": validation.reason,
                    "suggestion": validation.suggestion,
                    "details": validation.details,
                }
            }),
            other => json!({ "error": other.message() }),
        };
        (status, Json(body)).into_response()
    }
}
