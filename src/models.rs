use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_IMAGE_MIME: &str = "image/png";

/// One message as sent by the frontend. `content` is kept as raw JSON so
/// messages without attachments reach the provider exactly as they came in.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Message {
  #[serde(default)]
  pub role: String,
  #[serde(default)]
  pub content: Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub images: Option<Vec<ImageAttachment>>,
}

impl Message {
  /// Attachments, treating a missing or `null` list as empty.
  pub fn attachments(&self) -> &[ImageAttachment] {
    self.images.as_deref().unwrap_or(&[])
  }
}

/// An attached image: either bare base64 data (or a ready-made data URI), or
/// base64 data with an explicit MIME type.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum ImageAttachment {
  Raw(String),
  Inline {
    #[serde(default)]
    data: String,
    #[serde(default)]
    mime: Option<String>,
  },
}

impl ImageAttachment {
  /// `data:<mime>;base64,<data>` for this attachment, or `None` when it has no data.
  pub fn data_url(&self) -> Option<String> {
    match self {
      ImageAttachment::Raw(data) => {
        let data = data.trim();
        if data.is_empty() {
          None
        } else if data.starts_with("data:") {
          Some(data.to_string())
        } else {
          Some(format!("data:{DEFAULT_IMAGE_MIME};base64,{data}"))
        }
      }
      ImageAttachment::Inline { data, mime } => {
        let data = data.trim();
        if data.is_empty() {
          return None;
        }
        let mime = mime
          .as_deref()
          .map(str::trim)
          .filter(|m| !m.is_empty())
          .unwrap_or(DEFAULT_IMAGE_MIME);
        Some(format!("data:{mime};base64,{data}"))
      }
    }
  }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
  Text { text: String },
  ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ImageUrl {
  pub url: String,
}

/// An entry of a content list: either one this relay built, or one the
/// caller already sent in structured form.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum ContentPart {
  Block(ContentBlock),
  Other(Value),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
  Blocks(Vec<ContentPart>),
  Raw(Value),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UpstreamMessage {
  pub role: String,
  pub content: MessageContent,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UpstreamChatRequest {
  pub model: String,
  pub messages: Vec<UpstreamMessage>,
  pub temperature: f64,
  pub max_tokens: u32,
  pub stream: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChatReply {
  pub text: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ModelInfo {
  pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ModelsResponse {
  pub models: Vec<ModelInfo>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
  pub ok: bool,
  pub uptime_sec: u64,
  pub api_key: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct ErrorBody {
  pub error: ErrorDetail,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct ErrorDetail {
  pub message: String,
}

impl ErrorBody {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      error: ErrorDetail {
        message: message.into(),
      },
    }
  }
}
