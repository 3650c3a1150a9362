use reqwest::Method;
use serde_json::Value;
use tracing::{info, warn};

use crate::models::{ModelInfo, ModelsResponse};
use crate::upstream::{GroqClient, MODELS_PATH};

/// Shown whenever live discovery fails or yields nothing usable.
pub const FALLBACK_MODELS: &[&str] = &[
  "llama-3.3-70b-versatile",
  "llama-3.1-8b-instant",
  "meta-llama/llama-4-scout-17b-16e-instruct",
  "meta-llama/llama-4-maverick-17b-128e-instruct",
  "openai/gpt-oss-120b",
  "openai/gpt-oss-20b",
  "qwen/qwen3-32b",
  "moonshotai/kimi-k2-instruct",
];

/// Id fragments of models that cannot serve chat completions. Matched
/// case-sensitively.
pub const BLOCKED_FRAGMENTS: &[&str] = &["whisper", "tts", "embed", "guard"];

pub fn fallback_models() -> ModelsResponse {
  ModelsResponse {
    models: FALLBACK_MODELS
      .iter()
      .map(|name| ModelInfo {
        name: name.to_string(),
      })
      .collect(),
  }
}

pub fn is_chat_model(id: &str) -> bool {
  !BLOCKED_FRAGMENTS.iter().any(|fragment| id.contains(fragment))
}

/// Pulls usable ids out of a `{"data": [{"id": ...}]}` listing.
pub fn filter_listing(listing: &Value) -> Vec<ModelInfo> {
  listing
    .get("data")
    .and_then(Value::as_array)
    .map(|entries| {
      entries
        .iter()
        .filter_map(|entry| entry.get("id").and_then(Value::as_str))
        .filter(|id| !id.is_empty() && is_chat_model(id))
        .map(|id| ModelInfo { name: id.to_string() })
        .collect()
    })
    .unwrap_or_default()
}

/// Lists chat-capable models. Never fails: any problem yields the fallback list.
pub async fn discover_models(client: &GroqClient) -> ModelsResponse {
  let response = match client.call(Method::GET, MODELS_PATH, None).await {
    Ok(response) => response,
    Err(err) => {
      warn!(error = %err, "model discovery failed, using fallback list");
      return fallback_models();
    }
  };

  if !response.status.is_success() {
    warn!(
      status = response.status.as_u16(),
      "model discovery returned an error status, using fallback list"
    );
    return fallback_models();
  }

  let listing: Value = match serde_json::from_str(&response.body) {
    Ok(listing) => listing,
    Err(err) => {
      warn!(error = %err, "model discovery returned non-JSON, using fallback list");
      return fallback_models();
    }
  };

  let models = filter_listing(&listing);
  if models.is_empty() {
    warn!("model discovery found no chat models, using fallback list");
    return fallback_models();
  }

  info!(count = models.len(), "discovered models");
  ModelsResponse { models }
}
