// gptutils-core/src/tools/mod.rs

//! Name-keyed registry of tools the model may call.
//!
//! A tool takes the model's JSON argument string and returns text that is
//! fed back into the conversation as a `tool` message.

pub mod builtin;

use crate::errors::ToolError;
use crate::models::tools::{ToolDefinition, ToolParametersDefinition};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A callable unit with a text-in/text-out contract.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Schema presented to the model.
    fn definition(&self) -> ToolDefinition;

    /// Runs the tool with the raw JSON arguments sent by the model.
    async fn call(&self, arguments: &str) -> Result<String, ToolError>;
}

type ToolFn = dyn Fn(&str) -> Result<String, ToolError> + Send + Sync;

/// Tool backed by a plain closure.
pub struct FnTool {
    definition: ToolDefinition,
    function: Box<ToolFn>,
}

impl FnTool {
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParametersDefinition,
        function: F,
    ) -> Self
    where
        F: Fn(&str) -> Result<String, ToolError> + Send + Sync + 'static,
    {
        Self {
            definition: ToolDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
            function: Box::new(function),
        }
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.definition.name)
            .finish()
    }
}

#[async_trait]
impl Tool for FnTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn call(&self, arguments: &str) -> Result<String, ToolError> {
        (self.function)(arguments)
    }
}

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `tool` under its definition's name, returning any tool it
    /// replaced.
    pub fn register<T>(&mut self, tool: T) -> Option<Arc<dyn Tool>>
    where
        T: Tool + 'static,
    {
        let name = tool.definition().name;
        debug!(tool = %name, "Registering tool.");
        self.tools.insert(name, Arc::new(tool))
    }

    /// Registers a closure as a tool.
    pub fn register_fn<F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParametersDefinition,
        function: F,
    ) -> Option<Arc<dyn Tool>>
    where
        F: Fn(&str) -> Result<String, ToolError> + Send + Sync + 'static,
    {
        self.register(FnTool::new(name, description, parameters, function))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions of every registered tool, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> =
            self.tools.values().map(|tool| tool.definition()).collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Looks up `name` and runs it with `arguments`.
    pub async fn invoke(&self, name: &str, arguments: &str) -> Result<String, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.call(arguments).await
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}
