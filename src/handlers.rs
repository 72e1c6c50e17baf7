use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use kwtag_types::{Language, Tag, TaggingResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::engine::{TagError, TaggingEngine};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TaggingEngine>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeywordRequest {
    pub keyword: String,
    pub language: String,
}

#[derive(Serialize)]
struct LanguagesResponse {
    languages: Vec<&'static str>,
    tags: Vec<&'static str>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/languages", get(languages))
        .route("/tokenize-and-tag", post(tokenize_and_tag))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn languages() -> Json<LanguagesResponse> {
    Json(LanguagesResponse {
        languages: Language::ALL.iter().map(|lang| lang.code()).collect(),
        tags: Tag::ALL.iter().map(|tag| tag.label()).collect(),
    })
}

async fn tokenize_and_tag(
    State(state): State<AppState>,
    payload: Result<Json<KeywordRequest>, JsonRejection>,
) -> Result<Json<TaggingResult>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    // Run on its own task so a panic while tagging becomes a 500, not a dropped connection.
    let engine = Arc::clone(&state.engine);
    let KeywordRequest { keyword, language } = request;
    let outcome =
        tokio::spawn(async move { engine.tag(&keyword, &language).await }).await;

    match outcome {
        Ok(Ok(result)) => Ok(Json(result)),
        Ok(Err(TagError::UnsupportedLanguage(err))) => Err(ApiError::bad_request(err.to_string())),
        Ok(Err(err)) => {
            error!("tagging failed: {err}");
            Err(ApiError::Internal(err.to_string()))
        }
        Err(err) => {
            error!("tagging task failed: {err}");
            Err(ApiError::Internal("tagging task failed".to_string()))
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        ApiError::BadRequest(msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}
