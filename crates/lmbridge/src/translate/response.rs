use super::{IdGenerator, TranslateError};
use crate::protocol::{ChatCompletionResponse, ContentBlock, MessagesResponse, StopReason, Usage};

/// Deserialize a backend completion body.
///
/// Bodies that do not fit the chat completions schema are reported as
/// [`TranslateError::MalformedUpstreamResponse`].
pub fn parse_response(body: &[u8]) -> Result<ChatCompletionResponse, TranslateError> {
    serde_json::from_slice(body)
        .map_err(|e| TranslateError::MalformedUpstreamResponse(format!("invalid JSON body: {e}")))
}

/// Translate a non-streaming chat completion into a Messages API response.
///
/// Only the first choice is used. The upstream id is kept when present,
/// otherwise one is drawn from `ids`.
pub fn translate_response(
    response: ChatCompletionResponse,
    ids: &dyn IdGenerator,
) -> Result<MessagesResponse, TranslateError> {
    let choice = response
        .choices
        .and_then(|choices| choices.into_iter().next())
        .ok_or_else(|| {
            TranslateError::MalformedUpstreamResponse("response has no choices".to_string())
        })?;

    let id = response
        .id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| ids.next_id());

    let usage = response.usage.unwrap_or_default();

    Ok(MessagesResponse {
        id,
        kind: "message".to_string(),
        role: "assistant".to_string(),
        content: vec![ContentBlock::Text {
            text: choice.message.content.unwrap_or_default(),
        }],
        model: response.model.unwrap_or_else(|| "unknown".to_string()),
        stop_reason: StopReason::from_finish_reason(choice.finish_reason.as_deref()),
        stop_sequence: None,
        usage: Usage {
            input_tokens: usage.prompt_tokens.unwrap_or(0),
            output_tokens: usage.completion_tokens.unwrap_or(0),
        },
    })
}
