//! HTTP client for the OpenAI-compatible backend

use std::pin::Pin;
use std::time::Duration;

use axum::http::StatusCode;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use serde::Serialize;

use super::ProxyError;
use crate::config::BackendConfig;
use crate::error::{BridgeError, Result};
use crate::protocol::{ChatCompletionRequest, ChatCompletionResponse};
use crate::translate::parse_response;

const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
const MODELS_PATH: &str = "/v1/models";

/// Raw body of a streamed completion
pub type ByteStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send>>;

/// Backend reachability as reported by `/health`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendStatus {
    /// `/v1/models` answered 200
    Healthy,
    /// The backend answered with another status
    Unhealthy,
    /// No answer within the health timeout
    Unreachable,
}

/// Thin wrapper around `reqwest` for the two backend endpoints we use
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    health_timeout: Duration,
}

impl BackendClient {
    /// Build a client for the configured backend.
    ///
    /// No overall timeout is set: completions may legitimately run for as
    /// long as the model keeps generating.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BridgeError::Proxy(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            health_timeout: Duration::from_secs(config.health_timeout_secs),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Non-streaming completion
    pub async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> std::result::Result<ChatCompletionResponse, ProxyError> {
        let response = self.send(request).await?;

        let body = response
            .bytes()
            .await
            .map_err(|e| ProxyError::UpstreamUnreachable(format!("Failed to read response body: {e}")))?;

        tracing::debug!(
            body = %String::from_utf8_lossy(&body),
            "Received chat completions response"
        );

        Ok(parse_response(&body)?)
    }

    /// Streaming completion; the returned stream yields the raw SSE body
    pub async fn chat_completion_stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> std::result::Result<ByteStream, ProxyError> {
        let response = self.send(request).await?;
        Ok(response.bytes_stream().boxed())
    }

    /// Probe `GET /v1/models` with the health timeout
    pub async fn probe(&self) -> BackendStatus {
        let result = self
            .client
            .get(self.endpoint(MODELS_PATH))
            .timeout(self.health_timeout)
            .send()
            .await;

        match result {
            Ok(response) if response.status() == reqwest::StatusCode::OK => BackendStatus::Healthy,
            Ok(response) => {
                tracing::debug!(status = %response.status(), "Backend health probe returned non-200");
                BackendStatus::Unhealthy
            }
            Err(e) => {
                tracing::debug!(error = %e, "Backend health probe failed");
                BackendStatus::Unreachable
            }
        }
    }

    async fn send(
        &self,
        request: &ChatCompletionRequest,
    ) -> std::result::Result<reqwest::Response, ProxyError> {
        let url = self.endpoint(CHAT_COMPLETIONS_PATH);
        tracing::debug!(url = %url, stream = request.stream, "Forwarding to backend");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ProxyError::UpstreamUnreachable(format!("Request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(ProxyError::UpstreamStatus {
                status: StatusCode::from_u16(status.as_u16())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                body,
            });
        }

        Ok(response)
    }
}

/// Body of a failed backend response, empty if it cannot be read
async fn error_body(response: reqwest::Response) -> String {
    match response.text().await {
        Ok(body) => body,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to read backend error body");
            String::new()
        }
    }
}
