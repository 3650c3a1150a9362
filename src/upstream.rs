use std::time::{Duration, Instant};

use reqwest::{Method, StatusCode};
use tracing::debug;

use crate::error::UpstreamError;

pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(120);
pub const MODELS_PATH: &str = "/models";
pub const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

/// Status and raw body of a provider response. The body is not parsed here;
/// each handler decides what a malformed body means for it.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
  pub status: StatusCode,
  pub body: String,
}

/// Thin client for the provider's OpenAI-compatible HTTP API.
#[derive(Clone)]
pub struct GroqClient {
  http: reqwest::Client,
  api_base: String,
  api_key: String,
  timeout: Duration,
}

impl GroqClient {
  pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> anyhow::Result<Self> {
    let http = reqwest::Client::builder()
      .user_agent(concat!("groq-relay/", env!("CARGO_PKG_VERSION")))
      .build()?;
    Ok(Self {
      http,
      api_base: api_base.into().trim_end_matches('/').to_string(),
      api_key: api_key.into(),
      timeout: UPSTREAM_TIMEOUT,
    })
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn has_api_key(&self) -> bool {
    !self.api_key.trim().is_empty()
  }

  /// Issues exactly one request to `path` under the API base. Never retries.
  pub async fn call(
    &self,
    method: Method,
    path: &str,
    body: Option<&serde_json::Value>,
  ) -> Result<UpstreamResponse, UpstreamError> {
    if !self.has_api_key() {
      return Err(UpstreamError::MissingApiKey);
    }

    let url = format!("{}{}", self.api_base, path);
    let mut request = self
      .http
      .request(method.clone(), &url)
      .bearer_auth(self.api_key.trim())
      .timeout(self.timeout);
    if let Some(body) = body {
      request = request.json(body);
    }

    let started = Instant::now();
    debug!(%method, %url, "calling Groq");

    let response = request
      .send()
      .await
      .map_err(|err| UpstreamError::from_reqwest(err, self.timeout))?;
    let status = response.status();
    let body = response.text().await.map_err(|err| {
      if err.is_timeout() {
        UpstreamError::Timeout(self.timeout)
      } else {
        UpstreamError::Body(err)
      }
    })?;

    debug!(
      %method,
      %url,
      status = status.as_u16(),
      elapsed_ms = started.elapsed().as_millis() as u64,
      "Groq responded"
    );
    Ok(UpstreamResponse { status, body })
  }
}
