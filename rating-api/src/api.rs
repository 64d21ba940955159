use crate::submission::{RatingService, RatingSubmission, SubmitError};
use crate::types::{RatingInput, RepoMetadata};
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Redirect, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const RATE_PATH: &str = "/api/rate";
pub const SESSION_ID_HEADER: &str = "sessionid";
pub const INVALID_SESSION_REDIRECT: &str = "/?alert=error&message=Invalid Session";

pub fn router(service: Arc<RatingService>) -> Router {
    Router::new()
        .route(RATE_PATH, post(rate_handler))
        .with_state(service)
}

#[derive(Deserialize, Debug)]
struct RateRequest {
    url: String,
    rating: RatingInput,
}

#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<RepoMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponse {
    fn success(data: RepoMetadata) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn failure(error: String) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

async fn rate_handler(
    State(service): State<Arc<RatingService>>,
    headers: HeaderMap,
    Json(body): Json<RateRequest>,
) -> Result<ApiResponse, SubmitError> {
    let jwt = header_str(&headers, AUTHORIZATION.as_str())
        .map(|value| value.strip_prefix("Bearer ").unwrap_or(value).to_string());

    let submission = RatingSubmission {
        session_id: header_str(&headers, SESSION_ID_HEADER).map(str::to_string),
        jwt,
        url: body.url,
        rating: body.rating,
    };

    service.submit(submission).await.map(ApiResponse::success)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

impl IntoResponse for SubmitError {
    fn into_response(self) -> Response {
        match &self {
            SubmitError::InvalidSession(_) => {
                Redirect::temporary(INVALID_SESSION_REDIRECT).into_response()
            }
            SubmitError::InvalidUrl | SubmitError::InvalidRating => {
                ApiResponse::failure(self.to_string()).into_response()
            }
            SubmitError::CodeHost(_) | SubmitError::Store(_) | SubmitError::MissingAppTotals => {
                tracing::error!(error = %self, "Rating submission failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
