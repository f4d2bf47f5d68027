//! Anthropic Messages API types (inbound side)

use serde::{Deserialize, Deserializer, Serialize};

/// Request body for `POST /v1/messages`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesRequest {
    #[serde(default = "default_model", deserialize_with = "model_or_default")]
    pub model: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages: Vec<InputMessage>,
    /// System prompt, either a plain string or a list of text blocks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<MessageContent>,
    #[serde(default = "default_max_tokens", deserialize_with = "max_tokens_or_default")]
    pub max_tokens: u32,
    #[serde(default = "default_sampling", deserialize_with = "sampling_or_default")]
    pub temperature: f64,
    #[serde(default = "default_sampling", deserialize_with = "sampling_or_default")]
    pub top_p: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

impl MessagesRequest {
    /// Minimal request with every optional field at its default
    pub fn new(model: impl Into<String>, messages: Vec<InputMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            system: None,
            max_tokens: default_max_tokens(),
            temperature: default_sampling(),
            top_p: default_sampling(),
            stream: false,
            stop_sequences: None,
        }
    }
}

fn default_model() -> String {
    "unknown".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_sampling() -> f64 {
    1.0
}

// An explicit `null` means the same as leaving the field out.

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn model_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::deserialize(deserializer)?.unwrap_or_else(default_model))
}

fn max_tokens_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Ok(Option::deserialize(deserializer)?.unwrap_or_else(default_max_tokens))
}

fn sampling_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::deserialize(deserializer)?.unwrap_or_else(default_sampling))
}

/// One conversation turn in a [`MessagesRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputMessage {
    pub role: String,
    pub content: MessageContent,
}

impl InputMessage {
    pub fn text(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: MessageContent::Text(content.into()),
        }
    }
}

/// Message content: a plain string or an ordered list of parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenate the text of every text part, in order.
    ///
    /// Non-text parts (images, tool results, ...) contribute nothing.
    pub fn flatten(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts.iter().filter_map(ContentPart::as_text).collect(),
        }
    }
}

/// A single entry of structured message content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentPart {
    /// A bare string inside the content list
    Bare(String),
    /// A typed block such as `{"type": "text", "text": "..."}`
    Block {
        #[serde(rename = "type", default)]
        kind: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    /// Anything else; ignored
    Other(serde_json::Value),
}

impl ContentPart {
    fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Bare(text) => Some(text),
            ContentPart::Block { kind, text } if kind == "text" => {
                Some(text.as_deref().unwrap_or(""))
            }
            _ => None,
        }
    }
}

/// Non-streaming response body for `POST /v1/messages`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub role: String,
    pub content: Vec<ContentBlock>,
    pub model: String,
    pub stop_reason: StopReason,
    pub stop_sequence: Option<String>,
    pub usage: Usage,
}

/// Output content block; only text is ever produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
}

impl StopReason {
    /// `end_turn` iff the backend finished with `"stop"`, `max_tokens` otherwise
    pub fn from_finish_reason(finish_reason: Option<&str>) -> Self {
        match finish_reason {
            Some("stop") => StopReason::EndTurn,
            _ => StopReason::MaxTokens,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Server-sent event of the Messages streaming envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        message: MessageStart,
    },
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    MessageStop,
}

impl StreamEvent {
    /// The `type` tag as it appears on the wire
    pub fn event_type(&self) -> &'static str {
        match self {
            StreamEvent::MessageStart { .. } => "message_start",
            StreamEvent::ContentBlockStart { .. } => "content_block_start",
            StreamEvent::ContentBlockDelta { .. } => "content_block_delta",
            StreamEvent::MessageStop => "message_stop",
        }
    }
}

/// Message envelope carried by `message_start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageStart {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub role: String,
    pub content: Vec<ContentBlock>,
    pub model: String,
    pub usage: Usage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    TextDelta { text: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_defaults() {
        let request: MessagesRequest = serde_json::from_value(json!({
            "model": "x",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap();

        assert_eq!(request.model, "x");
        assert_eq!(request.max_tokens, 4096);
        assert_eq!(request.temperature, 1.0);
        assert_eq!(request.top_p, 1.0);
        assert!(!request.stream);
        assert!(request.system.is_none());
        assert!(request.stop_sequences.is_none());
    }

    #[test]
    fn test_request_without_model_or_messages() {
        let request: MessagesRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(request.model, "unknown");
        assert!(request.messages.is_empty());
    }

    #[test]
    fn test_request_null_fields_use_defaults() {
        let request: MessagesRequest = serde_json::from_value(json!({
            "model": null,
            "messages": null,
            "max_tokens": null,
            "temperature": null,
            "top_p": null,
            "stream": null,
            "system": null,
            "stop_sequences": null
        }))
        .unwrap();

        assert_eq!(request, MessagesRequest::new("unknown", Vec::new()));
    }

    #[test]
    fn test_request_ignores_unknown_fields() {
        let request: MessagesRequest = serde_json::from_value(json!({
            "model": "x",
            "messages": [],
            "metadata": {"user_id": "abc"},
            "tools": []
        }))
        .unwrap();
        assert_eq!(request.model, "x");
    }

    #[test]
    fn test_content_flatten_mixed_parts() {
        let content: MessageContent = serde_json::from_value(json!([
            {"type": "text", "text": "Hello"},
            {"type": "image", "source": {"type": "base64", "data": "..."}},
            " ",
            {"type": "text", "text": "world"},
            42
        ]))
        .unwrap();

        assert_eq!(content.flatten(), "Hello world");
    }

    #[test]
    fn test_content_flatten_text_block_without_text() {
        let content: MessageContent =
            serde_json::from_value(json!([{"type": "text"}, {"type": "text", "text": "a"}]))
                .unwrap();
        assert_eq!(content.flatten(), "a");
    }

    #[test]
    fn test_stop_reason_mapping() {
        assert_eq!(StopReason::from_finish_reason(Some("stop")), StopReason::EndTurn);
        assert_eq!(StopReason::from_finish_reason(Some("length")), StopReason::MaxTokens);
        assert_eq!(StopReason::from_finish_reason(None), StopReason::MaxTokens);
    }

    #[test]
    fn test_stream_event_wire_shape() {
        let delta = StreamEvent::ContentBlockDelta {
            index: 0,
            delta: BlockDelta::TextDelta {
                text: "Hel".to_string(),
            },
        };
        assert_eq!(
            serde_json::to_value(&delta).unwrap(),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hel"}})
        );

        assert_eq!(
            serde_json::to_value(StreamEvent::MessageStop).unwrap(),
            json!({"type": "message_stop"})
        );

        let start = StreamEvent::ContentBlockStart {
            index: 0,
            content_block: ContentBlock::Text {
                text: String::new(),
            },
        };
        assert_eq!(
            serde_json::to_value(&start).unwrap(),
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}})
        );
        assert_eq!(start.event_type(), "content_block_start");
    }

    #[test]
    fn test_response_serializes_null_stop_sequence() {
        let response = MessagesResponse {
            id: "msg_1".to_string(),
            kind: "message".to_string(),
            role: "assistant".to_string(),
            content: vec![ContentBlock::Text {
                text: "hi".to_string(),
            }],
            model: "m".to_string(),
            stop_reason: StopReason::EndTurn,
            stop_sequence: None,
            usage: Usage::default(),
        };

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["stop_reason"], "end_turn");
        assert!(value.get("stop_sequence").unwrap().is_null());
    }
}
