//! Wire schemas for both sides of the bridge
//!
//! - [`messages`]: the Anthropic Messages API spoken by inbound clients
//! - [`chat`]: the OpenAI chat completions API spoken by the backend

pub mod chat;
pub mod messages;

pub use chat::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ChatUsage,
    Choice, ChunkChoice, ChunkDelta, ResponseMessage,
};
pub use messages::{
    BlockDelta, ContentBlock, ContentPart, InputMessage, MessageContent, MessageStart,
    MessagesRequest, MessagesResponse, StopReason, StreamEvent, Usage,
};
