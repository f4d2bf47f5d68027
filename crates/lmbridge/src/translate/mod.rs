//! Pure translation between the Messages API and the chat completions API
//!
//! Nothing in here performs I/O. The proxy layer feeds bytes in and writes
//! the results out.

mod ids;
mod request;
mod response;
mod stream;

use thiserror::Error;

pub use ids::{IdGenerator, SequentialIdGenerator, UuidIdGenerator};
pub use request::{normalize_role, translate_request};
pub use response::{parse_response, translate_response};
pub use stream::{StreamState, StreamTranslator, encode_frame};

/// Errors raised while translating between protocols
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    /// Backend reply is missing the fields a Messages response is built from
    #[error("Malformed upstream response: {0}")]
    MalformedUpstreamResponse(String),

    /// A single stream line could not be parsed; the stream carries on
    #[error("Malformed stream fragment: {0}")]
    MalformedStreamFragment(String),

    /// An event could not be encoded as an SSE frame
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The stream translator was driven out of order
    #[error("Invalid stream state: cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: StreamState,
    },
}
