use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::models::{
  ChatReply, ContentBlock, ContentPart, ImageUrl, Message, MessageContent, UpstreamChatRequest,
  UpstreamMessage,
};
use crate::upstream::{GroqClient, CHAT_COMPLETIONS_PATH};

pub const TEMPERATURE: f64 = 0.4;
pub const MAX_TOKENS: u32 = 1500;
pub const MAX_BODY_BYTES: usize = 20_000_000;

const RAW_PREVIEW_CHARS: usize = 180;
const SHAPE_PREVIEW_CHARS: usize = 280;
const GENERIC_PROVIDER_ERROR: &str = "provider returned an error";

/// A validated inbound chat request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatPayload {
  pub model: String,
  pub messages: Vec<Message>,
}

/// Checks the raw request body. Only `model` and `messages` are required;
/// unknown fields are ignored. `model` is forwarded exactly as sent.
pub fn parse_payload(body: &[u8]) -> Result<ChatPayload, ApiError> {
  let value: Value = serde_json::from_slice(body)
    .map_err(|err| ApiError::BadRequest(format!("Invalid JSON body: {err}")))?;

  let model = match value.get("model") {
    Some(Value::String(model)) if !model.trim().is_empty() => model.clone(),
    _ => return Err(ApiError::BadRequest("Missing \"model\"".to_string())),
  };

  let raw_messages = match value.get("messages") {
    Some(Value::Array(items)) => items,
    _ => return Err(ApiError::BadRequest("\"messages\" must be an array".to_string())),
  };

  let messages = raw_messages
    .iter()
    .enumerate()
    .map(|(idx, item)| {
      serde_json::from_value::<Message>(item.clone())
        .map_err(|err| ApiError::BadRequest(format!("Invalid message at index {idx}: {err}")))
    })
    .collect::<Result<Vec<_>, _>>()?;

  Ok(ChatPayload { model, messages })
}

/// Turns a frontend message into the provider's shape. Attachments become
/// image blocks after the message's own content: a text block for non-empty
/// text, or the caller's blocks for structured content. When no block
/// survives the original content is sent as-is.
pub fn to_upstream_message(msg: &Message) -> UpstreamMessage {
  let attachments = msg.attachments();
  if attachments.is_empty() {
    return UpstreamMessage {
      role: msg.role.clone(),
      content: MessageContent::Raw(msg.content.clone()),
    };
  }

  let mut blocks = Vec::with_capacity(attachments.len() + 1);
  match &msg.content {
    Value::String(text) if !text.is_empty() => {
      blocks.push(ContentPart::Block(ContentBlock::Text { text: text.clone() }))
    }
    Value::Array(parts) => blocks.extend(parts.iter().cloned().map(ContentPart::Other)),
    _ => {}
  }
  blocks.extend(
    attachments
      .iter()
      .filter_map(|img| img.data_url())
      .map(|url| ContentPart::Block(ContentBlock::ImageUrl { image_url: ImageUrl { url } })),
  );

  let content = if blocks.is_empty() {
    MessageContent::Raw(msg.content.clone())
  } else {
    MessageContent::Blocks(blocks)
  };
  UpstreamMessage {
    role: msg.role.clone(),
    content,
  }
}

pub fn build_request(payload: &ChatPayload) -> UpstreamChatRequest {
  UpstreamChatRequest {
    model: payload.model.clone(),
    messages: payload.messages.iter().map(to_upstream_message).collect(),
    temperature: TEMPERATURE,
    max_tokens: MAX_TOKENS,
    stream: false,
  }
}

/// Validates `body`, forwards it to chat completions and pulls out the first
/// choice's text.
pub async fn proxy_chat(client: &GroqClient, body: &[u8]) -> Result<ChatReply, ApiError> {
  let payload = parse_payload(body)?;
  let request = build_request(&payload);
  let image_count: usize = payload.messages.iter().map(|m| m.attachments().len()).sum();
  info!(
    model = %payload.model,
    messages = payload.messages.len(),
    images = image_count,
    "forwarding chat request"
  );

  let request_json = serde_json::to_value(&request)
    .map_err(|err| ApiError::Internal(format!("failed to encode chat request: {err}")))?;
  let response = client
    .call(Method::POST, CHAT_COMPLETIONS_PATH, Some(&request_json))
    .await?;

  let json: Value = serde_json::from_str(&response.body).map_err(|_| {
    ApiError::BadGateway(format!(
      "Groq returned a non-JSON response ({}): {}",
      response.status.as_u16(),
      preview(&response.body, RAW_PREVIEW_CHARS)
    ))
  })?;

  if response.status.as_u16() >= 400 {
    let detail = json
      .pointer("/error/message")
      .and_then(Value::as_str)
      .filter(|m| !m.is_empty())
      .unwrap_or(GENERIC_PROVIDER_ERROR);
    return Err(ApiError::UpstreamStatus {
      status: response.status,
      message: format!("Groq error: {detail}"),
    });
  }

  let text = extract_text(&json).ok_or_else(|| {
    ApiError::BadGateway(format!(
      "Unexpected Groq response shape: {}",
      preview(&json.to_string(), SHAPE_PREVIEW_CHARS)
    ))
  })?;

  debug!(chars = text.chars().count(), "chat completion received");
  Ok(ChatReply { text })
}

/// `choices[0].message.content`, if present and non-empty.
pub fn extract_text(response: &Value) -> Option<String> {
  response
    .pointer("/choices/0/message/content")
    .and_then(Value::as_str)
    .filter(|text| !text.is_empty())
    .map(str::to_string)
}

fn preview(text: &str, max_chars: usize) -> String {
  text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::ImageAttachment;
  use axum::http::StatusCode;
  use serde_json::json;
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn user(content: &str, images: Vec<ImageAttachment>) -> Message {
    Message {
      role: "user".to_string(),
      content: json!(content),
      images: Some(images),
    }
  }

  async fn stub(status: u16, body: &str) -> (MockServer, GroqClient) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/chat/completions"))
      .respond_with(ResponseTemplate::new(status).set_body_string(body))
      .mount(&server)
      .await;
    let client = GroqClient::new(server.uri(), "gsk_test").unwrap();
    (server, client)
  }

  #[test]
  fn rejects_invalid_json() {
    let err = parse_payload(b"{not json").unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
  }

  #[test]
  fn rejects_missing_model_and_non_array_messages() {
    for body in [
      json!({ "messages": [] }),
      json!({ "model": "", "messages": [] }),
      json!({ "model": 7, "messages": [] }),
      json!({ "model": "x" }),
      json!({ "model": "x", "messages": "hi" }),
      json!({ "model": "x", "messages": { "role": "user" } }),
    ] {
      let err = parse_payload(body.to_string().as_bytes()).unwrap_err();
      assert_eq!(err.status(), StatusCode::BAD_REQUEST, "body: {body}");
    }
  }

  #[test]
  fn plain_messages_pass_through() {
    let msg = to_upstream_message(&user("2+2", vec![]));
    assert_eq!(
      serde_json::to_value(&msg).unwrap(),
      json!({ "role": "user", "content": "2+2" })
    );
  }

  #[test]
  fn images_follow_text_in_order() {
    let msg = to_upstream_message(&user(
      "what is this?",
      vec![
        ImageAttachment::Raw("AAA".to_string()),
        ImageAttachment::Inline {
          data: String::new(),
          mime: Some("image/jpeg".to_string()),
        },
        ImageAttachment::Inline {
          data: "BBB".to_string(),
          mime: Some("image/jpeg".to_string()),
        },
      ],
    ));
    assert_eq!(
      serde_json::to_value(&msg).unwrap(),
      json!({
        "role": "user",
        "content": [
          { "type": "text", "text": "what is this?" },
          { "type": "image_url", "image_url": { "url": "data:image/png;base64,AAA" } },
          { "type": "image_url", "image_url": { "url": "data:image/jpeg;base64,BBB" } }
        ]
      })
    );
  }

  #[test]
  fn image_only_message_has_no_text_block() {
    let msg = to_upstream_message(&user("", vec![ImageAttachment::Raw("AAA".to_string())]));
    match msg.content {
      MessageContent::Blocks(blocks) => {
        assert_eq!(blocks.len(), 1);
        assert!(matches!(blocks[0], ContentPart::Block(ContentBlock::ImageUrl { .. })));
      }
      other => panic!("expected blocks, got {other:?}"),
    }
  }

  #[test]
  fn all_empty_attachments_fall_back_to_text() {
    let msg = to_upstream_message(&user("", vec![ImageAttachment::Raw(String::new())]));
    assert_eq!(msg.content, MessageContent::Raw(json!("")));
  }

  #[test]
  fn null_images_and_content_are_accepted() {
    let body = json!({
      "model": "x",
      "messages": [
        { "role": "user", "content": "hi", "images": null },
        { "role": "assistant", "content": null }
      ]
    });
    let payload = parse_payload(body.to_string().as_bytes()).expect("nulls are valid");
    let request = serde_json::to_value(build_request(&payload)).unwrap();
    assert_eq!(
      request["messages"],
      json!([
        { "role": "user", "content": "hi" },
        { "role": "assistant", "content": null }
      ])
    );
  }

  #[test]
  fn structured_content_passes_through_unchanged() {
    let content = json!([{ "type": "text", "text": "hi", "cache_control": { "type": "ephemeral" } }]);
    let body = json!({ "model": "x", "messages": [{ "role": "user", "content": content.clone() }] });
    let payload = parse_payload(body.to_string().as_bytes()).expect("array content is valid");
    let request = serde_json::to_value(build_request(&payload)).unwrap();
    assert_eq!(request["messages"][0]["content"], content);
  }

  #[test]
  fn structured_content_keeps_its_blocks_before_images() {
    let msg = Message {
      role: "user".to_string(),
      content: json!([{ "type": "text", "text": "look" }]),
      images: Some(vec![ImageAttachment::Raw("AAA".to_string())]),
    };
    assert_eq!(
      serde_json::to_value(to_upstream_message(&msg)).unwrap()["content"],
      json!([
        { "type": "text", "text": "look" },
        { "type": "image_url", "image_url": { "url": "data:image/png;base64,AAA" } }
      ])
    );
  }

  #[test]
  fn model_is_forwarded_untrimmed() {
    let body = json!({ "model": " llama-3.1-8b-instant ", "messages": [] });
    let payload = parse_payload(body.to_string().as_bytes()).unwrap();
    assert_eq!(payload.model, " llama-3.1-8b-instant ");

    let blank = json!({ "model": "   ", "messages": [] });
    let err = parse_payload(blank.to_string().as_bytes()).unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
  }

  #[test]
  fn request_uses_fixed_sampling() {
    let payload = ChatPayload {
      model: "llama-3.3-70b-versatile".to_string(),
      messages: vec![user("hi", vec![])],
    };
    let json = serde_json::to_value(build_request(&payload)).unwrap();
    assert_eq!(json["temperature"], json!(0.4));
    assert_eq!(json["max_tokens"], json!(1500));
    assert_eq!(json["stream"], json!(false));
    assert_eq!(json["model"], json!("llama-3.3-70b-versatile"));
  }

  #[test]
  fn preview_counts_chars_not_bytes() {
    assert_eq!(preview("ééé", 2), "éé");
    assert_eq!(preview("short", 180), "short");
  }

  #[tokio::test]
  async fn returns_first_choice_text() {
    let (_server, client) = stub(200, r#"{"choices":[{"message":{"content":"4"}}]}"#).await;
    let body = json!({ "model": "x", "messages": [{ "role": "user", "content": "2+2" }] });
    let reply = proxy_chat(&client, body.to_string().as_bytes()).await.unwrap();
    assert_eq!(reply.text, "4");
  }

  #[tokio::test]
  async fn upstream_error_status_is_passed_through() {
    let (_server, client) = stub(500, r#"{"error":{"message":"boom"}}"#).await;
    let body = json!({ "model": "x", "messages": [] });
    let err = proxy_chat(&client, body.to_string().as_bytes()).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(err.to_string(), "Groq error: boom");
  }

  #[tokio::test]
  async fn upstream_error_without_message_is_generic() {
    let (_server, client) = stub(429, r#"{"detail":"nope"}"#).await;
    let body = json!({ "model": "x", "messages": [] });
    let err = proxy_chat(&client, body.to_string().as_bytes()).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(err.to_string(), "Groq error: provider returned an error");
  }

  #[tokio::test]
  async fn non_json_upstream_is_bad_gateway_with_preview() {
    let html = format!("<html>{}</html>", "x".repeat(500));
    let (_server, client) = stub(200, &html).await;
    let body = json!({ "model": "x", "messages": [] });
    let err = proxy_chat(&client, body.to_string().as_bytes()).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    let message = err.to_string();
    assert!(message.contains("<html>xxx"));
    assert!(!message.contains("</html>"));
  }

  #[tokio::test]
  async fn missing_content_is_bad_gateway() {
    let (_server, client) = stub(200, r#"{"choices":[{"message":{"content":""}}]}"#).await;
    let body = json!({ "model": "x", "messages": [] });
    let err = proxy_chat(&client, body.to_string().as_bytes()).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    assert!(err.to_string().starts_with("Unexpected Groq response shape: {"));
  }

  #[tokio::test]
  async fn invalid_payload_makes_no_outbound_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(200))
      .expect(0)
      .mount(&server)
      .await;
    let client = GroqClient::new(server.uri(), "gsk_test").unwrap();

    let err = proxy_chat(&client, br#"{"messages":[]}"#).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn missing_key_is_unauthorized() {
    let client = GroqClient::new("http://127.0.0.1:9", "").unwrap();
    let body = json!({ "model": "x", "messages": [] });
    let err = proxy_chat(&client, body.to_string().as_bytes()).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
  }
}
