//! Error taxonomy shared by every business operation.
//!
//! Every operation is a single all-or-nothing unit of work, so any `CoreError`
//! reaching a caller means nothing was committed.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
  /// Missing, malformed or expired identity.
  #[error("Authentication required: {0}")]
  Authentication(String),

  /// Verified identity lacking the admin role.
  #[error("Not authorized: {0}")]
  Authorization(String),

  #[error("Invalid input: {0}")]
  Validation(String),

  /// Store write failed; the unit of work was discarded.
  #[error("Persistence failure: {0}")]
  Persistence(String),

  #[error("Not found: {0}")]
  NotFound(String),
}

impl CoreError {
  pub fn status_code(&self) -> StatusCode {
    match self {
      CoreError::Authentication(_) => StatusCode::UNAUTHORIZED,
      CoreError::Authorization(_) => StatusCode::FORBIDDEN,
      CoreError::Validation(_) => StatusCode::BAD_REQUEST,
      CoreError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
      CoreError::NotFound(_) => StatusCode::NOT_FOUND,
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      CoreError::Authentication(_) => "authentication_error",
      CoreError::Authorization(_) => "authorization_error",
      CoreError::Validation(_) => "validation_error",
      CoreError::Persistence(_) => "persistence_error",
      CoreError::NotFound(_) => "not_found_error",
    }
  }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
  pub error: String,
  pub kind: &'static str,
  pub code: u16,
  pub committed: bool,
}

impl From<&CoreError> for ErrorBody {
  fn from(err: &CoreError) -> Self {
    Self {
      error: err.to_string(),
      kind: err.kind(),
      code: err.status_code().as_u16(),
      committed: false,
    }
  }
}

impl IntoResponse for CoreError {
  fn into_response(self) -> Response {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(target: "lophoc_backend", error = %self, "Request failed");
    } else {
      tracing::debug!(target: "lophoc_backend", error = %self, "Request rejected");
    }
    (status, Json(ErrorBody::from(&self))).into_response()
  }
}
