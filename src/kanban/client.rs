//! Transport for the board service.
//!
//! `Transport` is the seam between the gateway and the network: it sends a
//! request and hands back the raw status and body. Status checks and JSON
//! decoding happen in `decode_response`, so every transport reports failures
//! the same way.

use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use futures::future::{BoxFuture, FutureExt};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::config::ApiConfig;
use crate::error::{ApiErrorBody, TransportError};

/// A request against the board service, relative to its base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
  pub method: Method,
  /// Unencoded path segments, e.g. `["boards", "Roadmap", "gettasks"]`
  pub segments: Vec<String>,
}

impl ApiRequest {
  pub fn new(method: Method, segments: Vec<String>) -> Self {
    Self { method, segments }
  }

  /// Percent-encoded absolute path, e.g. `/boards/Platform%20Launch/gettasks`
  pub fn path(&self) -> String {
    let mut path = String::new();
    for segment in &self.segments {
      path.push('/');
      path.extend(
        url::form_urlencoded::byte_serialize(segment.as_bytes()).map(|s| s.replace('+', "%20")),
      );
    }
    if path.is_empty() {
      path.push('/');
    }
    path
  }
}

/// Raw response handed back by a transport.
#[derive(Debug, Clone)]
pub struct RawResponse {
  pub status: StatusCode,
  pub body: String,
}

/// Issues requests to the board service.
pub trait Transport: Send + Sync {
  /// Send `request`. Only failures below HTTP are errors here; any status
  /// code comes back as a `RawResponse`.
  fn send(&self, request: ApiRequest) -> BoxFuture<'static, Result<RawResponse, TransportError>>;
}

/// Check the status and decode the body of a response.
///
/// An empty body decodes as JSON `null`, so `Option<W>` accepts it.
pub fn decode_response<W: DeserializeOwned>(response: RawResponse) -> Result<W, TransportError> {
  if !response.status.is_success() {
    let body = serde_json::from_str::<ApiErrorBody>(&response.body).ok();
    return Err(TransportError::ServerError {
      status: response.status.as_u16(),
      body,
    });
  }

  let text = if response.body.trim().is_empty() {
    "null"
  } else {
    response.body.as_str()
  };

  serde_json::from_str(text).map_err(|e| TransportError::DecodeFailure {
    message: e.to_string(),
  })
}

/// reqwest-backed transport.
#[derive(Clone)]
pub struct HttpTransport {
  client: Client,
  base_url: Url,
}

impl HttpTransport {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    let base_url = Url::parse(&config.base_url)
      .map_err(|e| eyre!("Invalid API base URL {}: {}", config.base_url, e))?;
    if base_url.cannot_be_a_base() {
      return Err(eyre!("API base URL cannot have paths: {}", config.base_url));
    }

    let mut builder =
      Client::builder().user_agent(concat!("kanban-gateway/", env!("CARGO_PKG_VERSION")));
    if let Some(secs) = config.timeout_secs {
      builder = builder.timeout(Duration::from_secs(secs));
    }
    let client = builder
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, base_url })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  /// Absolute URL for `request`: the base path followed by `request.path()`.
  pub fn url_for(&self, request: &ApiRequest) -> Url {
    let mut url = self.base_url.clone();
    let base = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{}{}", base, request.path()));
    url
  }
}

impl Transport for HttpTransport {
  fn send(&self, request: ApiRequest) -> BoxFuture<'static, Result<RawResponse, TransportError>> {
    let client = self.client.clone();
    let url = self.url_for(&request);

    async move {
      debug!(method = %request.method, %url, "sending request");
      let response = client.request(request.method, url).send().await?;
      let status = response.status();
      let body = response.text().await?;
      debug!(%status, bytes = body.len(), "response received");
      Ok::<_, TransportError>(RawResponse { status, body })
    }
    .boxed()
  }
}
