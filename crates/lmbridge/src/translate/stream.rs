//! Streaming translation: chat completion chunks to Messages API events
//!
//! The backend sends one `data:` line per delta. Messages API clients expect
//! an envelope around those deltas:
//!
//! ```text
//! message_start
//! content_block_start        (index 0, empty text block)
//! content_block_delta * N    (one per non-empty backend delta)
//! message_stop               (when the backend reports finish_reason "stop")
//! ```
//!
//! `content_block_stop` and `message_delta` are never produced.

use bytes::Bytes;

use super::TranslateError;
use crate::protocol::{
    BlockDelta, ChatCompletionChunk, ContentBlock, MessageStart, StreamEvent, Usage,
};

const DONE_SENTINEL: &str = "[DONE]";

/// SSE field names other than `data` that carry no payload for us
const IGNORED_FIELDS: &[&str] = &["event:", "id:", "retry:"];

/// Lifecycle of a [`StreamTranslator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// `open` has not been called yet
    NotStarted,
    /// Envelope opened, deltas are being forwarded
    Streaming,
    /// `message_stop` has been emitted; further lines are dropped
    Stopped,
    /// `close` has been called
    Done,
}

/// Per-request state machine turning backend stream lines into events
#[derive(Debug)]
pub struct StreamTranslator {
    model: String,
    message_id: String,
    state: StreamState,
    synthesize_stop: bool,
    deltas: usize,
    malformed_fragments: usize,
}

impl StreamTranslator {
    pub fn new(model: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            message_id: message_id.into(),
            state: StreamState::NotStarted,
            synthesize_stop: false,
            deltas: 0,
            malformed_fragments: 0,
        }
    }

    /// Emit `message_stop` from [`close`](Self::close) if the backend never
    /// sent `finish_reason: "stop"`.
    pub fn synthesize_stop(mut self, enabled: bool) -> Self {
        self.synthesize_stop = enabled;
        self
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Number of `content_block_delta` events produced so far
    pub fn deltas(&self) -> usize {
        self.deltas
    }

    /// Number of lines that could not be parsed and were skipped
    pub fn malformed_fragments(&self) -> usize {
        self.malformed_fragments
    }

    /// Open the envelope: `message_start` followed by `content_block_start`.
    pub fn open(&mut self) -> Result<[StreamEvent; 2], TranslateError> {
        self.expect_state("open", &[StreamState::NotStarted])?;
        self.state = StreamState::Streaming;

        Ok([
            StreamEvent::MessageStart {
                message: MessageStart {
                    id: self.message_id.clone(),
                    kind: "message".to_string(),
                    role: "assistant".to_string(),
                    content: Vec::new(),
                    model: self.model.clone(),
                    usage: Usage::default(),
                },
            },
            StreamEvent::ContentBlockStart {
                index: 0,
                content_block: ContentBlock::Text {
                    text: String::new(),
                },
            },
        ])
    }

    /// Translate one backend line into at most one event.
    ///
    /// Blank lines, comments and the `[DONE]` sentinel yield `Ok(None)`. So
    /// do lines that fail to parse; they are logged and counted instead.
    /// `Err` is only returned when called before `open` or after `close`.
    pub fn feed(&mut self, line: &str) -> Result<Option<StreamEvent>, TranslateError> {
        self.expect_state("feed", &[StreamState::Streaming, StreamState::Stopped])?;

        if self.state == StreamState::Stopped {
            return Ok(None);
        }

        let Some(payload) = extract_payload(line) else {
            return Ok(None);
        };

        let chunk: ChatCompletionChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                self.malformed_fragments += 1;
                let error = TranslateError::MalformedStreamFragment(e.to_string());
                tracing::warn!(fragment = %payload, error = %error, "Skipping stream fragment");
                return Ok(None);
            }
        };

        let Some(choice) = chunk.first_choice() else {
            return Ok(None);
        };

        if let Some(text) = choice.content() {
            self.deltas += 1;
            return Ok(Some(StreamEvent::ContentBlockDelta {
                index: 0,
                delta: BlockDelta::TextDelta {
                    text: text.to_string(),
                },
            }));
        }

        if choice.finish_reason.as_deref() == Some("stop") {
            self.state = StreamState::Stopped;
            return Ok(Some(StreamEvent::MessageStop));
        }

        Ok(None)
    }

    /// Finish the stream.
    ///
    /// Returns `message_stop` only when stop synthesis is enabled and the
    /// backend never signalled completion.
    pub fn close(&mut self) -> Result<Option<StreamEvent>, TranslateError> {
        self.expect_state("close", &[StreamState::Streaming, StreamState::Stopped])?;

        let stopped = self.state == StreamState::Stopped;
        self.state = StreamState::Done;

        if !stopped && self.synthesize_stop {
            tracing::debug!(
                message_id = %self.message_id,
                "Backend stream ended without finish_reason=stop, synthesizing message_stop"
            );
            return Ok(Some(StreamEvent::MessageStop));
        }

        Ok(None)
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[StreamState],
    ) -> Result<(), TranslateError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(TranslateError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }
}

/// Strip the SSE framing from a backend line, returning the JSON payload
fn extract_payload(line: &str) -> Option<&str> {
    let line = line.trim();

    if line.starts_with(':') || IGNORED_FIELDS.iter().any(|field| line.starts_with(field)) {
        return None;
    }

    let payload = line
        .strip_prefix("data:")
        .map(str::trim_start)
        .unwrap_or(line);

    if payload.is_empty() || payload == DONE_SENTINEL {
        None
    } else {
        Some(payload)
    }
}

/// Encode an event as a `text/event-stream` frame: `data: <json>\n\n`
pub fn encode_frame(event: &StreamEvent) -> Result<Bytes, TranslateError> {
    let json =
        serde_json::to_string(event).map_err(|e| TranslateError::Serialization(e.to_string()))?;
    Ok(Bytes::from(format!("data: {json}\n\n")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn opened() -> StreamTranslator {
        let mut translator = StreamTranslator::new("local-model", "msg_test");
        translator.open().unwrap();
        translator
    }

    fn delta_line(text: &str) -> String {
        format!(
            "data: {}",
            json!({"id": "chatcmpl-1", "choices": [{"index": 0, "delta": {"content": text}, "finish_reason": null}]})
        )
    }

    fn stop_line() -> String {
        format!(
            "data: {}",
            json!({"id": "chatcmpl-1", "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]})
        )
    }

    fn delta_text(event: &StreamEvent) -> &str {
        match event {
            StreamEvent::ContentBlockDelta {
                delta: BlockDelta::TextDelta { text },
                ..
            } => text,
            other => panic!("expected content_block_delta, got {other:?}"),
        }
    }

    #[test]
    fn test_open_emits_envelope() {
        let mut translator = StreamTranslator::new("local-model", "msg_test");
        let [start, block] = translator.open().unwrap();

        assert_eq!(
            serde_json::to_value(&start).unwrap(),
            json!({
                "type": "message_start",
                "message": {
                    "id": "msg_test",
                    "type": "message",
                    "role": "assistant",
                    "content": [],
                    "model": "local-model",
                    "usage": {"input_tokens": 0, "output_tokens": 0}
                }
            })
        );
        assert_eq!(
            serde_json::to_value(&block).unwrap(),
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}})
        );
        assert_eq!(translator.state(), StreamState::Streaming);
    }

    #[test]
    fn test_deltas_then_stop() {
        let mut translator = opened();

        let first = translator.feed(&delta_line("Hel")).unwrap().unwrap();
        let second = translator.feed(&delta_line("lo")).unwrap().unwrap();
        let stop = translator.feed(&stop_line()).unwrap().unwrap();

        assert_eq!(delta_text(&first), "Hel");
        assert_eq!(delta_text(&second), "lo");
        assert_eq!(stop, StreamEvent::MessageStop);
        assert_eq!(translator.deltas(), 2);
        assert_eq!(translator.state(), StreamState::Stopped);
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        let mut translator = opened();

        assert_eq!(translator.feed("data: {not json").unwrap(), None);
        assert_eq!(translator.feed("garbage").unwrap(), None);
        assert_eq!(translator.malformed_fragments(), 2);

        let event = translator.feed(&delta_line("still going")).unwrap().unwrap();
        assert_eq!(delta_text(&event), "still going");
    }

    #[test]
    fn test_blank_comment_and_done_lines_produce_nothing() {
        let mut translator = opened();

        for line in ["", "   ", "\r", ": keep-alive", "data: [DONE]", "[DONE]", "data:", "event: chunk"] {
            assert_eq!(translator.feed(line).unwrap(), None, "line {line:?}");
        }
        assert_eq!(translator.malformed_fragments(), 0);
    }

    #[test]
    fn test_data_prefix_optional() {
        let mut translator = opened();

        let bare = json!({"choices": [{"delta": {"content": "a"}}]}).to_string();
        let tight = format!("data:{bare}");

        assert_eq!(delta_text(&translator.feed(&bare).unwrap().unwrap()), "a");
        assert_eq!(delta_text(&translator.feed(&tight).unwrap().unwrap()), "a");
    }

    #[test]
    fn test_delta_text_forwarded_verbatim() {
        let mut translator = opened();

        let event = translator.feed(&delta_line("  spaced\n")).unwrap().unwrap();
        assert_eq!(delta_text(&event), "  spaced\n");
    }

    #[test]
    fn test_content_wins_over_finish_reason_on_same_line() {
        let mut translator = opened();
        let line = json!({"choices": [{"delta": {"content": "end"}, "finish_reason": "stop"}]});

        let event = translator.feed(&line.to_string()).unwrap().unwrap();
        assert_eq!(delta_text(&event), "end");
        assert_eq!(translator.state(), StreamState::Streaming);
    }

    #[test]
    fn test_role_and_empty_deltas_produce_nothing() {
        let mut translator = opened();

        let role = json!({"choices": [{"delta": {"role": "assistant"}}]}).to_string();
        let empty = json!({"choices": [{"delta": {"content": ""}}]}).to_string();
        let no_choices = json!({"choices": []}).to_string();
        let length = json!({"choices": [{"delta": {}, "finish_reason": "length"}]}).to_string();

        for line in [role, empty, no_choices, length] {
            assert_eq!(translator.feed(&line).unwrap(), None);
        }
        assert_eq!(translator.deltas(), 0);
    }

    #[test]
    fn test_message_stop_emitted_at_most_once() {
        let mut translator = opened();

        assert_eq!(translator.feed(&stop_line()).unwrap(), Some(StreamEvent::MessageStop));
        assert_eq!(translator.feed(&stop_line()).unwrap(), None);
        assert_eq!(translator.feed(&delta_line("late")).unwrap(), None);
    }

    #[test]
    fn test_event_sequence_invariants() {
        let lines = vec![
            delta_line("a"),
            "data: {broken".to_string(),
            String::new(),
            json!({"choices": [{"delta": {"role": "assistant"}}]}).to_string(),
            delta_line("b"),
            delta_line(""),
            delta_line("c"),
            stop_line(),
            "data: [DONE]".to_string(),
        ];

        let mut translator = StreamTranslator::new("m", "msg_1");
        let mut events: Vec<StreamEvent> = translator.open().unwrap().into_iter().collect();
        for line in &lines {
            events.extend(translator.feed(line).unwrap());
        }
        events.extend(translator.close().unwrap());

        let types: Vec<_> = events.iter().map(StreamEvent::event_type).collect();
        assert_eq!(
            types,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_delta",
                "message_stop",
            ]
        );
    }

    #[test]
    fn test_close_without_stop_emits_nothing_by_default() {
        let mut translator = opened();
        translator.feed(&delta_line("partial")).unwrap();

        assert_eq!(translator.close().unwrap(), None);
        assert_eq!(translator.state(), StreamState::Done);
    }

    #[test]
    fn test_close_without_stop_synthesizes_when_enabled() {
        let mut translator = StreamTranslator::new("m", "msg_1").synthesize_stop(true);
        translator.open().unwrap();
        translator.feed(&delta_line("partial")).unwrap();

        assert_eq!(translator.close().unwrap(), Some(StreamEvent::MessageStop));
    }

    #[test]
    fn test_close_after_stop_never_duplicates() {
        let mut translator = StreamTranslator::new("m", "msg_1").synthesize_stop(true);
        translator.open().unwrap();
        translator.feed(&stop_line()).unwrap();

        assert_eq!(translator.close().unwrap(), None);
    }

    #[test]
    fn test_feed_before_open_fails() {
        let mut translator = StreamTranslator::new("m", "msg_1");
        let err = translator.feed(&delta_line("x")).unwrap_err();

        assert_eq!(
            err,
            TranslateError::InvalidState {
                operation: "feed",
                state: StreamState::NotStarted
            }
        );
    }

    #[test]
    fn test_feed_after_close_fails() {
        let mut translator = opened();
        translator.close().unwrap();

        assert!(matches!(
            translator.feed(&delta_line("x")),
            Err(TranslateError::InvalidState {
                state: StreamState::Done,
                ..
            })
        ));
        assert!(translator.close().is_err());
    }

    #[test]
    fn test_open_twice_fails() {
        let mut translator = opened();
        assert!(translator.open().is_err());
    }

    #[test]
    fn test_encode_frame() {
        let frame = encode_frame(&StreamEvent::MessageStop).unwrap();
        assert_eq!(&frame[..], b"data: {\"type\":\"message_stop\"}\n\n");
    }
}
