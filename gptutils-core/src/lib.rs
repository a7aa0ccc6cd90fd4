// gptutils-core/src/lib.rs

#![doc = include_str!("../../README.md")]

pub mod agent;
pub mod client;
pub mod config;
pub mod errors;
pub mod search;
pub mod stream;
pub mod tools;

#[cfg(test)]
mod client_tests;

pub use agent::{ToolChatOutput, ToolExecutionResult, ToolExecutionStatus};
pub use client::ChatClient;
pub use config::Config;
pub use errors::{BoxError, ChatError, ConfigError, ToolError, TransportError};
pub use models::chat::{ChatResponse, Choice, FinishReason, Message, Role, StreamChunk, Usage};
pub use models::request::{ChatRequest, ResponseFormat, ToolChoice};
pub use models::tools::{
    ToolCall, ToolDefinition, ToolFunction, ToolParameter, ToolParameterType,
    ToolParametersDefinition,
};
pub use search::SearchOptions;
pub use stream::StreamSummary;
pub use tools::{FnTool, Tool, ToolRegistry};

pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;

pub mod models {
    pub mod chat;
    pub mod request;
    pub mod tools;
}
