use crate::protocol::{ChatCompletionRequest, ChatMessage, MessagesRequest};

/// Map the legacy `human` role to `user`; every other role passes through
pub fn normalize_role(role: &str) -> &str {
    match role {
        "human" => "user",
        other => other,
    }
}

/// Translate a Messages API request into a chat completions request.
///
/// Total: every field has a default, so this never fails.
pub fn translate_request(request: &MessagesRequest) -> ChatCompletionRequest {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    if let Some(system) = &request.system {
        let system = system.flatten();
        if !system.is_empty() {
            messages.push(ChatMessage::new("system", system));
        }
    }

    messages.extend(
        request
            .messages
            .iter()
            .map(|message| ChatMessage::new(normalize_role(&message.role), message.content.flatten())),
    );

    let stop = request
        .stop_sequences
        .as_ref()
        .filter(|stop| !stop.is_empty())
        .cloned();

    ChatCompletionRequest {
        messages,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        top_p: request.top_p,
        stream: request.stream,
        stop,
    }
}
