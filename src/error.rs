use std::fmt::{self, Display};

use reqwest::StatusCode;

/// Failure of a single request against the osu! API.
///
/// `status` is the upstream HTTP status when one was received, or `INTERNAL_SERVER_ERROR` when the
/// request never produced a usable response (transport errors, undecodable bodies).
#[derive(Debug, Clone)]
pub struct APIError {
  pub status: StatusCode,
  pub message: String,
}

impl APIError {
  pub(crate) fn internal(message: impl Into<String>) -> Self {
    APIError {
      status: StatusCode::INTERNAL_SERVER_ERROR,
      message: message.into(),
    }
  }
}

impl Display for APIError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ({})", self.message, self.status)
  }
}

impl std::error::Error for APIError {}
