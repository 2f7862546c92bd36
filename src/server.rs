use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::handlers::{AnalysisHandler, AnalyzeError};
use crate::models::AnalyzeRequest;
use crate::services::rate_limit::{self, AdmissionDenied};
use crate::services::vision::UpstreamError;

/// Fallback Retry-After when the upstream is saturated but gave no hint.
const UPSTREAM_RETRY_HINT_SECS: u64 = 30;

pub struct AppState {
    pub analysis: Arc<AnalysisHandler>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub fn create_router(
    analysis: Arc<AnalysisHandler>,
    allowed_origins: &[String],
    max_image_bytes: usize,
) -> Router {
    let state = Arc::new(AppState { analysis });

    // Twice the decoded image ceiling: base64 costs 4/3, and payloads just
    // over the limit must still reach the validator for a structured
    // rejection. The validator stays the authority on image size.
    let body_cap = max_image_bytes.saturating_mul(2);

    Router::new()
        .route("/", get(root_handler))
        .route("/api/analyze", post(analyze_handler))
        .route("/health", get(health_check))
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::max(body_cap))
                .layer(cors_layer(allowed_origins)),
        )
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("⚠️ Skipping unparseable allowed origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

async fn analyze_handler(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    body: String,
) -> Response {
    let request: AnalyzeRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            log::warn!("⚠️ Unreadable analyze request body: {}", e);
            return error_response(StatusCode::BAD_REQUEST, "invalid request body");
        }
    };

    let client_key = rate_limit::derive_client_key(
        header_str(&headers, "x-forwarded-for"),
        header_str(&headers, "x-real-ip"),
    );
    let origin = header_str(&headers, "origin");

    match state
        .analysis
        .handle(&client_key, origin, &request.normalize())
        .await
    {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(error) => error.into_response(),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

impl IntoResponse for AnalyzeError {
    fn into_response(self) -> Response {
        let (status, message, retry_after_secs) = match &self {
            AnalyzeError::Image(rejection) => {
                (StatusCode::BAD_REQUEST, rejection.to_string(), None)
            }
            AnalyzeError::Admission(AdmissionDenied::OriginForbidden) => (
                StatusCode::FORBIDDEN,
                "origin is not allowed".to_string(),
                None,
            ),
            AnalyzeError::Admission(AdmissionDenied::RateLimited { retry_after_secs }) => (
                StatusCode::TOO_MANY_REQUESTS,
                "too many requests, please slow down".to_string(),
                Some(*retry_after_secs),
            ),
            AnalyzeError::Configuration => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "analysis service is unavailable".to_string(),
                None,
            ),
            AnalyzeError::Upstream(
                UpstreamError::QuotaExceeded { retry_after_secs }
                | UpstreamError::RateLimited { retry_after_secs },
            ) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "analysis service is busy, try again shortly".to_string(),
                Some((*retry_after_secs).unwrap_or(UPSTREAM_RETRY_HINT_SECS)),
            ),
            AnalyzeError::Upstream(_) => (
                StatusCode::BAD_GATEWAY,
                "could not analyze the image, please retry".to_string(),
                None,
            ),
        };

        if status.is_server_error() {
            log::error!("❌ Analyze request failed: {}", self);
        } else {
            log::warn!("⚠️ Analyze request rejected: {}", self);
        }

        let mut response = (status, Json(ErrorBody { error: message })).into_response();
        if let Some(secs) = retry_after_secs {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

async fn root_handler() -> &'static str {
    "Food Calorie Scanner API. POST a food photo to /api/analyze."
}

async fn health_check() -> &'static str {
    "OK"
}
