//! HTTP surface: routing, multipart intake and the error-to-status mapping.

use crate::inference::{self, InferenceError, Prediction};
use crate::model::ModelKind;
use crate::preprocess::{self, PreprocessError};
use crate::registry::ModelRegistry;
use crate::response::{self, PredictionResult, ShapeError};
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub const API_VERSION: &str = "1.0";

const SUPPORTED_EXTENSIONS: [&str; 3] = [".jpg", ".jpeg", ".png"];

pub type SharedRegistry = Arc<ModelRegistry>;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("Invalid model type. Choose from: {valid:?}")]
    InvalidModelType { valid: Vec<&'static str> },
    #[error("Only JPG/PNG images are supported")]
    InvalidFileExtension,
    #[error("Field required: {0}")]
    MissingField(&'static str),
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    MultipartRejection(#[from] MultipartRejection),
    #[error("Image processing error: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("Prediction failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("Prediction failed: {0}")]
    Shape(#[from] ShapeError),
    #[error("Prediction failed: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidModelType { .. }
            | ApiError::InvalidFileExtension
            | ApiError::Preprocess(_) => StatusCode::BAD_REQUEST,
            ApiError::MissingField(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Multipart(err) => err.status(),
            ApiError::MultipartRejection(rejection) => rejection.status(),
            ApiError::Inference(_) | ApiError::Shape(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = ?self, "Unexpected error: {self}");
        } else {
            warn!("Validation error: {self}");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub models_loaded: Vec<&'static str>,
    pub api_version: &'static str,
}

pub fn router(registry: SharedRegistry, max_upload_bytes: Option<usize>) -> Router {
    let body_limit = match max_upload_bytes {
        Some(limit) => DefaultBodyLimit::max(limit),
        None => DefaultBodyLimit::disable(),
    };

    Router::new()
        .route("/", get(status))
        .route("/health", get(health))
        .route("/predict", post(predict))
        .with_state(registry)
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::POST])
                .allow_headers(Any),
        )
}

/// GET / - service status and loaded models
async fn status(State(registry): State<SharedRegistry>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "running",
        models_loaded: registry.loaded().into_iter().map(ModelKind::as_str).collect(),
        api_version: API_VERSION,
    })
}

/// GET /health
async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

/// POST /predict - multipart `model_type` + `file`
async fn predict(
    State(registry): State<SharedRegistry>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResult>, ApiError> {
    let mut multipart = multipart?;
    let mut model_type = None;
    let mut upload = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("model_type") => model_type = Some(field.text().await?),
            Some("file") => {
                // A part without a filename is not an upload.
                let filename = field
                    .file_name()
                    .map(str::to_owned)
                    .ok_or(ApiError::MissingField("file"))?;
                upload = Some((filename, field.bytes().await?));
            }
            _ => {}
        }
    }

    let model_type = model_type.ok_or(ApiError::MissingField("model_type"))?;
    let (filename, contents) = upload.ok_or(ApiError::MissingField("file"))?;
    info!("Prediction request started for {model_type}");

    let invalid_model = || ApiError::InvalidModelType {
        valid: registry.loaded().into_iter().map(ModelKind::as_str).collect(),
    };
    let kind: ModelKind = model_type.parse().map_err(|_| invalid_model())?;
    let model = registry.get(kind).map_err(|_| invalid_model())?;

    if !has_supported_extension(&filename) {
        return Err(ApiError::InvalidFileExtension);
    }

    let prediction = tokio::task::spawn_blocking(move || -> Result<Prediction, ApiError> {
        let tensor = preprocess::prepare(&contents, kind)?;
        info!("Image processed, shape: {:?}", tensor.shape());
        Ok(inference::infer(model.as_ref(), tensor.view())?)
    })
    .await
    .map_err(|err| ApiError::Internal(err.to_string()))??;

    info!(
        "Prediction completed: class {}, confidence {}",
        prediction.class_index, prediction.confidence
    );

    Ok(Json(response::shape(kind, &prediction)?))
}

fn has_supported_extension(filename: &str) -> bool {
    let filename = filename.to_lowercase();
    SUPPORTED_EXTENSIONS.iter().any(|ext| filename.ends_with(ext))
}
