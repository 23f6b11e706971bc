use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Input is not a (URL-safe or standard) base64 payload, or does not decode to text.
///
/// Never fatal: callers treat it as "try the next format".
#[derive(Debug, Error)]
pub enum DecodeError {
  #[error("invalid base64: {0}")]
  Base64(#[from] base64::DecodeError),

  #[error("decoded payload is not utf-8")]
  NotUtf8(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, Error)]
pub enum StagingError {
  #[error("blob store unavailable: {0}")]
  Unavailable(String),

  #[error("corrupt header entry for {key}: {source}")]
  Headers {
    key: String,
    #[source]
    source: serde_json::Error,
  },
}

/// Batch-level failures of a conversion request. Per-item failures never reach this type.
#[derive(Debug, Error)]
pub enum ConvertError {
  #[error("Missing URL parameter")]
  MissingUrl,

  #[error("There are no valid links")]
  NoValidLinks,

  #[error("upstream request to {target} failed: {message}")]
  UpstreamFetch { target: String, message: String },

  #[error("staging failed: {0}")]
  Staging(#[from] StagingError),
}

impl ConvertError {
  pub fn upstream(target: impl Into<String>, message: impl ToString) -> Self {
    Self::UpstreamFetch {
      target: target.into(),
      message: message.to_string(),
    }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      ConvertError::MissingUrl | ConvertError::NoValidLinks => StatusCode::BAD_REQUEST,
      ConvertError::UpstreamFetch { .. } | ConvertError::Staging(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    }
  }
}

impl IntoResponse for ConvertError {
  fn into_response(self) -> Response {
    let status = self.status();
    let body = if status == StatusCode::BAD_REQUEST {
      self.to_string()
    } else {
      format!("Processing error: {self}")
    };
    (status, body).into_response()
  }
}
