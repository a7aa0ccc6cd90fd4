// gptutils-core/src/errors.rs
use reqwest::StatusCode;
use thiserror::Error;

/// Boxed error produced by caller-supplied stream handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during a chat or chat-stream call.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Error related to configuration loading or validation.
    #[error("Configuration Error: {0}")]
    Config(#[from] ConfigError),

    /// Error while talking to the chat-completion endpoint.
    #[error("Transport Error: {0}")]
    Transport(#[from] TransportError),

    /// The stream handler reported a failure; streaming stopped at that chunk.
    #[error("Handler Error: {0}")]
    Handler(#[source] BoxError),

    /// The request payload could not be encoded.
    #[error("Serialization Error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// A successful (2xx) non-streaming response body was not a valid completion.
    #[error("Invalid Response: {0}")]
    InvalidResponse(#[source] serde_json::Error),

    /// Error related to tool lookup or execution.
    #[error("Tool Error: {0}")]
    Tool(#[from] ToolError),
}

impl ChatError {
    /// Wraps a handler failure so that it is propagated verbatim.
    pub fn handler(err: impl Into<BoxError>) -> Self {
        ChatError::Handler(err.into())
    }

    /// Returns the HTTP status if this is a non-success response error.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ChatError::Transport(TransportError::Status { status, .. }) => Some(*status),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChatError::Transport(TransportError::Cancelled))
    }
}

/// Startup-time configuration problems.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{var} environment variable is not set. Please set it before running the application.")]
    MissingApiKey { var: String },

    #[error("model name is empty")]
    EmptyModel,

    #[error("invalid base URL '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Connection, status and body-read failures. Never retried internally.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-2xx response; carries the status and the raw body text.
    #[error("API error: {status} - {body}")]
    Status { status: StatusCode, body: String },

    #[error("failed to read response body: {0}")]
    Read(#[from] std::io::Error),

    #[error("request cancelled")]
    Cancelled,
}

/// Errors from the tool registry.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("invalid arguments for tool '{tool}': {source}")]
    InvalidArguments {
        tool: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    Execution(String),
}

impl ToolError {
    pub fn execution(msg: impl Into<String>) -> Self {
        ToolError::Execution(msg.into())
    }
}
