//! Error taxonomy for gateway requests.
//!
//! Every failure a query or mutation can hit ends up as one of three causes.
//! None of them are fatal; they are stored as the terminal state of the
//! query that produced them and shown to whoever is subscribed.

use serde::Deserialize;
use thiserror::Error;

/// Application-level error payload returned by the board service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiErrorBody {
  #[serde(alias = "error")]
  pub message: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
  /// The request never reached the server or no response came back.
  #[error("Network failure: {message}")]
  NetworkFailure { message: String },

  /// The server answered with a non-success status.
  #[error("Server returned HTTP {status}: {}", describe_body(.body))]
  ServerError {
    status: u16,
    body: Option<ApiErrorBody>,
  },

  /// The response body did not match the expected shape.
  #[error("Failed to decode response: {message}")]
  DecodeFailure { message: String },
}

impl TransportError {
  pub fn network(message: impl Into<String>) -> Self {
    Self::NetworkFailure {
      message: message.into(),
    }
  }

  /// True when the failure happened below HTTP (no status was received).
  pub fn is_network(&self) -> bool {
    matches!(self, Self::NetworkFailure { .. })
  }

  /// Decoded error payload, if the server sent one.
  pub fn server_message(&self) -> Option<&str> {
    match self {
      Self::ServerError {
        body: Some(body), ..
      } => Some(&body.message),
      _ => None,
    }
  }
}

impl From<reqwest::Error> for TransportError {
  fn from(err: reqwest::Error) -> Self {
    Self::network(err.to_string())
  }
}

fn describe_body(body: &Option<ApiErrorBody>) -> &str {
  body
    .as_ref()
    .map(|b| b.message.as_str())
    .unwrap_or("no error body")
}
