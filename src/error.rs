use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

use crate::models::ErrorBody;

/// Failures reaching the provider. None of these carry an HTTP status from
/// the provider itself.
#[derive(Debug, Error)]
pub enum UpstreamError {
  #[error("GROQ_API_KEY is not set")]
  MissingApiKey,
  #[error("Groq request timed out after {}s", .0.as_secs())]
  Timeout(Duration),
  #[error("Groq request failed: {0}")]
  Network(#[source] reqwest::Error),
  #[error("failed to read Groq response: {0}")]
  Body(#[source] reqwest::Error),
}

impl UpstreamError {
  pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
    if err.is_timeout() {
      UpstreamError::Timeout(timeout)
    } else {
      UpstreamError::Network(err)
    }
  }
}

/// Everything a handler can answer with besides success. Rendered as
/// `{"error": {"message": ...}}`.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("{0}")]
  BadRequest(String),
  #[error("{0}")]
  Forbidden(String),
  #[error("{0}")]
  NotFound(String),
  #[error("Request body exceeds {limit} bytes")]
  PayloadTooLarge { limit: usize },
  #[error(transparent)]
  Upstream(#[from] UpstreamError),
  #[error("{message}")]
  UpstreamStatus { status: StatusCode, message: String },
  #[error("{0}")]
  BadGateway(String),
  #[error("{0}")]
  Internal(String),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
      ApiError::Upstream(UpstreamError::MissingApiKey) => StatusCode::UNAUTHORIZED,
      ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
      ApiError::UpstreamStatus { status, .. } => *status,
      ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
      ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let message = self.to_string();

    match &self {
      ApiError::Upstream(err) => error!(error = ?err, status = status.as_u16(), "{message}"),
      _ => error!(status = status.as_u16(), "{message}"),
    }

    let mut response = (status, Json(ErrorBody::new(message))).into_response();
    if matches!(self, ApiError::PayloadTooLarge { .. }) {
      response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    }
    response
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_key_maps_to_unauthorized() {
    let err = ApiError::from(UpstreamError::MissingApiKey);
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(err.to_string(), "GROQ_API_KEY is not set");
  }

  #[test]
  fn timeout_maps_to_bad_gateway() {
    let err = ApiError::from(UpstreamError::Timeout(Duration::from_secs(120)));
    assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(err.to_string(), "Groq request timed out after 120s");
  }

  #[test]
  fn upstream_status_is_preserved() {
    let err = ApiError::UpstreamStatus {
      status: StatusCode::TOO_MANY_REQUESTS,
      message: "Groq error: slow down".to_string(),
    };
    assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
  }

  #[test]
  fn payload_too_large_closes_connection() {
    let response = ApiError::PayloadTooLarge { limit: 10 }.into_response();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.headers().get(header::CONNECTION).unwrap(), "close");
  }
}
