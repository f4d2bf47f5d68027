mod backend;
mod error;
mod server;
mod streaming;

pub use backend::{BackendClient, BackendStatus, ByteStream};
pub use error::ProxyError;
pub use server::{AppState, ProxyServer, create_router};
pub use streaming::{SseLineStream, TranslatedStream};
