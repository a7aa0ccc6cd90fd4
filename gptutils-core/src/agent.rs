// gptutils-core/src/agent.rs

//! Tool-calling conversation loop.

use crate::client::ChatClient;
use crate::errors::ChatError;
use crate::models::chat::{ChatResponse, FinishReason, Message};
use crate::models::request::ChatRequest;
use crate::models::tools::ToolCall;
use crate::tools::ToolRegistry;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

/// Used when `chat_with_tools` is given a limit of zero.
pub const DEFAULT_MAX_TOOL_ITERATIONS: usize = 5;

/// Result of [`ChatClient::chat_with_tools`].
#[derive(Debug, Clone)]
pub struct ToolChatOutput {
    /// The last completion received.
    pub response: ChatResponse,
    /// Full conversation: the request's messages plus every assistant
    /// tool-call message and tool result appended along the way.
    pub messages: Vec<Message>,
    /// One entry per tool call executed, in order.
    pub tool_results: Vec<ToolExecutionResult>,
}

/// Details the execution result of a single tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionResult {
    pub tool_call_id: String,
    pub tool_name: String,
    /// Raw JSON arguments as sent by the model.
    pub arguments: String,
    /// Tool output, or the error text sent back to the model.
    pub output: String,
    pub status: ToolExecutionStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToolExecutionStatus {
    Success,
    Failure,
}

/// Tool calls the model is waiting on, if the response asks for any.
fn pending_tool_calls(response: &ChatResponse) -> Option<(&Message, &[ToolCall])> {
    let choice = response.choices.first()?;
    if choice.finish_reason != Some(FinishReason::ToolCalls) {
        return None;
    }
    match choice.message.tool_calls.as_deref() {
        Some(calls) if !calls.is_empty() => Some((&choice.message, calls)),
        _ => None,
    }
}

impl ChatClient {
    /// Runs a conversation in which the model may call tools from `registry`.
    ///
    /// Each round trip sends the conversation with the registry's tool list.
    /// While the model answers with `finish_reason = "tool_calls"`, the tools
    /// are run and their output is appended as `tool` messages. A failing tool
    /// does not abort the run; its error text becomes the tool result. Stops
    /// after `max_iterations` requests (zero means
    /// [`DEFAULT_MAX_TOOL_ITERATIONS`]).
    pub async fn chat_with_tools(
        &self,
        request: ChatRequest,
        registry: &ToolRegistry,
        max_iterations: usize,
    ) -> Result<ToolChatOutput, ChatError> {
        let max_iterations = if max_iterations == 0 {
            DEFAULT_MAX_TOOL_ITERATIONS
        } else {
            max_iterations
        };

        let mut request = request;
        if !registry.is_empty() {
            request = request.tools(registry.definitions());
        }
        let mut tool_results = Vec::new();
        let mut iteration = 0;

        loop {
            iteration += 1;
            debug!(iteration, messages = request.messages.len(), "Sending tool-chat request.");
            let response = self.chat(request.clone()).await.map_err(|e| {
                error!(error = %e, iteration, "Chat request failed during tool run.");
                e
            })?;

            let (assistant_message, tool_calls) = match pending_tool_calls(&response) {
                Some((message, calls)) => (message.clone(), calls.to_vec()),
                None => {
                    info!(iteration, "Received final response (no tool calls requested).");
                    return Ok(ToolChatOutput {
                        response,
                        messages: request.messages,
                        tool_results,
                    });
                }
            };

            if iteration >= max_iterations {
                warn!(
                    limit = max_iterations,
                    pending = tool_calls.len(),
                    "Reached tool iteration limit; returning last response."
                );
                return Ok(ToolChatOutput {
                    response,
                    messages: request.messages,
                    tool_results,
                });
            }

            info!(count = tool_calls.len(), "Model requested {} tool call(s).", tool_calls.len());
            request.messages.push(assistant_message);

            for tool_call in tool_calls {
                let tool_name = tool_call.function.name;
                let arguments = tool_call.function.arguments;
                trace!(tool_call_id = %tool_call.id, arguments = %arguments, "Raw arguments for '{}'", tool_name);

                // Every call id listed in the assistant message needs a tool reply.
                let (output, status) = if tool_call.call_type != "function" {
                    warn!(tool_call_id = %tool_call.id, call_type = %tool_call.call_type, "Unsupported tool call type.");
                    (
                        format!(
                            "Error executing tool: unsupported tool call type '{}'",
                            tool_call.call_type
                        ),
                        ToolExecutionStatus::Failure,
                    )
                } else {
                    match registry.invoke(&tool_name, &arguments).await {
                        Ok(output) => {
                            debug!(tool_call_id = %tool_call.id, tool_name = %tool_name, "Tool executed successfully.");
                            (output, ToolExecutionStatus::Success)
                        }
                        Err(e) => {
                            error!(tool_call_id = %tool_call.id, tool_name = %tool_name, error = %e, "Tool execution failed.");
                            (format!("Error executing tool: {}", e), ToolExecutionStatus::Failure)
                        }
                    }
                };

                request.messages.push(Message::tool(tool_call.id.clone(), output.clone()));
                tool_results.push(ToolExecutionResult {
                    tool_call_id: tool_call.id,
                    tool_name,
                    arguments,
                    output,
                    status,
                });
            }
        }
    }
}
