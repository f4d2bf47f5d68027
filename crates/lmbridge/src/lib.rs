//! lmbridge - Anthropic Messages API front end for OpenAI-compatible backends
//!
//! Clients that speak the Messages API (typed content blocks, multi-event
//! streaming) are served by a backend that only speaks chat completions,
//! such as LM Studio. Requests are translated on the way in and responses,
//! streamed or not, on the way out.

pub mod config;
pub mod error;
pub mod protocol;
pub mod proxy;
pub mod translate;

pub use error::BridgeError;
