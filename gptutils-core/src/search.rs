// gptutils-core/src/search.rs

//! Web-search augmented chat (DashScope `enable_search` extension).

use crate::client::ChatClient;
use crate::errors::{BoxError, ChatError};
use crate::models::chat::{ChatResponse, Message};
use crate::models::request::{ChatRequest, SearchParams};
use crate::stream::StreamSummary;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchOptions {
    pub enable_search: bool,
    /// Search even when the model would not decide to on its own.
    pub forced_search: bool,
}

impl SearchOptions {
    pub fn enabled() -> Self {
        Self {
            enable_search: true,
            forced_search: false,
        }
    }

    pub fn forced() -> Self {
        Self {
            enable_search: true,
            forced_search: true,
        }
    }

    /// Applies these options to `request`.
    pub fn apply(&self, request: ChatRequest) -> ChatRequest {
        let request = request.enable_search(self.enable_search);
        if self.enable_search && self.forced_search {
            request.search_options(SearchParams {
                forced_search: Some(true),
            })
        } else {
            request
        }
    }
}

impl ChatClient {
    /// Sends one user message with web search configured by `options`.
    pub async fn chat_with_search(
        &self,
        message: impl Into<String>,
        options: SearchOptions,
    ) -> Result<ChatResponse, ChatError> {
        let request = options.apply(ChatRequest::new(vec![Message::user(message)]));
        self.chat(request).await
    }

    /// Streaming variant of [`ChatClient::chat_with_search`].
    pub async fn chat_with_search_stream<F, E>(
        &self,
        message: impl Into<String>,
        options: SearchOptions,
        handler: F,
    ) -> Result<StreamSummary, ChatError>
    where
        F: FnMut(&str) -> Result<(), E>,
        E: Into<BoxError>,
    {
        let request = options.apply(ChatRequest::new(vec![Message::user(message)]));
        self.chat_stream(request, handler).await
    }
}
