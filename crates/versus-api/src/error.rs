//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use versus_core::Error as CoreError;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Engine(#[from] CoreError),

  #[error("unauthorized: {0}")]
  Unauthorized(String),

  #[error("bad request: {0}")]
  BadRequest(String),
}

fn status_of(e: &CoreError) -> StatusCode {
  match e {
    CoreError::NoPairsAvailable(_) => StatusCode::GONE,
    CoreError::SelfPairing
    | CoreError::InvalidCategory(_)
    | CoreError::ItemNotInCategory { .. }
    | CoreError::InvalidFingerprint(_) => StatusCode::BAD_REQUEST,
    CoreError::CategoryNotFound(_)
    | CoreError::UnknownCategoryName(_)
    | CoreError::ItemNotFound(_) => StatusCode::NOT_FOUND,
    CoreError::AlreadyJudged { .. } | CoreError::DuplicateCategory(_) => StatusCode::CONFLICT,
    CoreError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
    CoreError::InvalidSettings(_) | CoreError::Storage(_) => {
      StatusCode::INTERNAL_SERVER_ERROR
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    match self {
      ApiError::Engine(CoreError::RateLimited { remaining, resets_at }) => {
        let retry_after = (resets_at - Utc::now()).num_seconds().max(0);
        let body = json!({
          "error":           "anonymous vote limit reached",
          "remaining_votes": remaining,
          "resets_at":       resets_at,
        });
        let mut res = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        res
          .headers_mut()
          .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        res
      }
      ApiError::Engine(e) => {
        let status = status_of(&e);
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
          tracing::error!(error = %e, "request failed");
          "internal error".to_owned()
        } else {
          e.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
      }
      ApiError::Unauthorized(m) => {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": m }))).into_response()
      }
      ApiError::BadRequest(m) => {
        (StatusCode::BAD_REQUEST, Json(json!({ "error": m }))).into_response()
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeDelta;
  use uuid::Uuid;

  use super::*;

  #[test]
  fn rate_limit_carries_retry_after() {
    let err = ApiError::from(CoreError::RateLimited {
      remaining: 0,
      resets_at: Utc::now() + TimeDelta::minutes(5),
    });
    let res = err.into_response();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let secs: i64 = res.headers()[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
    assert!((290..=300).contains(&secs), "{secs}");
  }

  #[test]
  fn domain_errors_map_to_statuses() {
    let id = Uuid::new_v4();
    let cases = [
      (CoreError::NoPairsAvailable(id), StatusCode::GONE),
      (CoreError::SelfPairing, StatusCode::BAD_REQUEST),
      (CoreError::InvalidCategory(id), StatusCode::BAD_REQUEST),
      (CoreError::CategoryNotFound(id), StatusCode::NOT_FOUND),
      (CoreError::AlreadyJudged { low: id, high: id }, StatusCode::CONFLICT),
      (CoreError::Storage("disk full".into()), StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (err, status) in cases {
      assert_eq!(ApiError::from(err).into_response().status(), status);
    }
  }
}
