// gptutils-core/src/client.rs

//! HTTP client for the chat-completions endpoint.

use crate::config::Config;
use crate::errors::{BoxError, ChatError, ConfigError, TransportError};
use crate::models::chat::{ChatResponse, Message};
use crate::models::request::ChatRequest;
use crate::stream::{self, StreamSummary};
use reqwest::{header, Client, Response};
use std::io::Write;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

const EVENT_STREAM: &str = "text/event-stream";

/// Chat client bound to one [`Config`]. Cloning is cheap and clones share the
/// underlying connection pool.
#[derive(Clone, Debug)]
pub struct ChatClient {
    config: Config,
    http_client: Client,
}

impl ChatClient {
    /// Validates `config` and builds the HTTP client.
    pub fn new(config: Config) -> Result<Self, ChatError> {
        config.validate()?;
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build().map_err(ConfigError::HttpClient)?;
        Ok(Self {
            config,
            http_client,
        })
    }

    /// Builds a client from `API_KEY`, `API_BASE_URL` and `API_MODEL`.
    pub fn from_env() -> Result<Self, ChatError> {
        Self::new(Config::from_env()?)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Sends a non-streaming completion request.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ChatError> {
        let response = self.send(request, false).await?;
        let body = response.bytes().await.map_err(TransportError::Request)?;

        let mut chat_response: ChatResponse = match serde_json::from_slice(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(
                    body = %String::from_utf8_lossy(&body),
                    "Failed to deserialize chat completion response."
                );
                return Err(ChatError::InvalidResponse(e));
            }
        };

        if chat_response.id.is_empty() {
            chat_response.id = format!("chatcmpl-{}", Uuid::new_v4());
            debug!(id = %chat_response.id, "Added missing 'id' to chat completion response.");
        }
        debug!(
            id = %chat_response.id,
            choices = chat_response.choices.len(),
            usage = ?chat_response.usage,
            "Received chat completion."
        );
        Ok(chat_response)
    }

    /// Sends a streaming completion request and feeds every text delta to
    /// `handler`, in order, on the calling task.
    pub async fn chat_stream<F, E>(
        &self,
        request: ChatRequest,
        handler: F,
    ) -> Result<StreamSummary, ChatError>
    where
        F: FnMut(&str) -> Result<(), E>,
        E: Into<BoxError>,
    {
        let response = self.send(request, true).await?;
        let summary = stream::decode_response(response, handler).await?;
        debug!(
            fragments = summary.fragments,
            completed = summary.completed,
            usage = ?summary.usage,
            "Chat stream finished."
        );
        Ok(summary)
    }

    /// [`ChatClient::chat`] that gives up with [`TransportError::Cancelled`]
    /// as soon as `cancel` fires.
    pub async fn chat_with_cancel(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, ChatError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Chat request cancelled.");
                Err(TransportError::Cancelled.into())
            }
            result = self.chat(request) => result,
        }
    }

    /// [`ChatClient::chat_stream`] that aborts the in-flight read with
    /// [`TransportError::Cancelled`] as soon as `cancel` fires. Fragments
    /// already delivered stay delivered.
    pub async fn chat_stream_with_cancel<F, E>(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
        handler: F,
    ) -> Result<StreamSummary, ChatError>
    where
        F: FnMut(&str) -> Result<(), E>,
        E: Into<BoxError>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Chat stream cancelled.");
                Err(TransportError::Cancelled.into())
            }
            result = self.chat_stream(request, handler) => result,
        }
    }

    /// Sends one user message and returns the first choice's text.
    pub async fn simple_chat(&self, message: impl Into<String>) -> Result<String, ChatError> {
        let response = self.chat(ChatRequest::new(vec![Message::user(message)])).await?;
        Ok(response.first_content().to_string())
    }

    /// Streams the reply to one user message.
    pub async fn simple_chat_stream<F, E>(
        &self,
        message: impl Into<String>,
        handler: F,
    ) -> Result<StreamSummary, ChatError>
    where
        F: FnMut(&str) -> Result<(), E>,
        E: Into<BoxError>,
    {
        self.chat_stream(ChatRequest::new(vec![Message::user(message)]), handler)
            .await
    }

    /// Streams the reply into `writer`. A failed write is reported as a
    /// handler error and stops the stream.
    pub async fn chat_stream_to_writer<W: Write>(
        &self,
        request: ChatRequest,
        mut writer: W,
    ) -> Result<StreamSummary, ChatError> {
        let summary = self
            .chat_stream(request, |text: &str| writer.write_all(text.as_bytes()))
            .await?;
        writer.flush().map_err(ChatError::handler)?;
        Ok(summary)
    }

    async fn send(&self, request: ChatRequest, stream: bool) -> Result<Response, ChatError> {
        let request = request.prepare(&self.config.model, stream);
        let body = serde_json::to_vec(&request).map_err(ChatError::Serialization)?;
        let url = self.config.completions_url();

        debug!(
            url = %url,
            model = request.model.as_deref().unwrap_or_default(),
            stream,
            messages = request.messages.len(),
            "Sending chat completion request."
        );
        trace!(payload = %String::from_utf8_lossy(&body), "Request JSON");

        let mut builder = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .header(header::CONTENT_TYPE, "application/json");
        if stream {
            builder = builder.header(header::ACCEPT, EVENT_STREAM);
        }

        let response = builder
            .body(body)
            .send()
            .await
            .map_err(TransportError::Request)?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Failed to read API error response body.");
                    String::new()
                }
            };
            debug!(
                "API request failed. Status: {}, Headers: {:#?}, Body: {}",
                status, headers, body
            );
            return Err(TransportError::Status { status, body }.into());
        }

        Ok(response)
    }
}
