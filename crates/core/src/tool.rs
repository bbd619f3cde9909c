//! Tool interface
//!
//! Every domain tool exposes a name, JSON-schema'd arguments, and an output
//! with a success flag. Execution is wrapped in a per-tool timeout by the
//! registry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Default timeout for tool execution
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 10;

/// Tool errors
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("tool {tool} timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("tool execution failed: {0}")]
    Execution(String),
}

impl ToolError {
    pub fn not_found(name: impl Into<String>) -> Self {
        ToolError::NotFound(name.into())
    }

    pub fn invalid(tool: impl Into<String>, message: impl Into<String>) -> Self {
        ToolError::InvalidArguments {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn timeout(tool: impl Into<String>, secs: u64) -> Self {
        ToolError::Timeout {
            tool: tool.into(),
            secs,
        }
    }
}

/// Schema describing a tool to the registry and the language model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments object
    pub parameters: Value,
}

/// Output of a successful tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Text fed back to the model (and usable as a spoken line)
    pub text: String,
    /// Structured payload, when the backend returns one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Terminal outcome: stop the normal flow and hand the call to an
    /// operator
    #[serde(default)]
    pub transfer: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: None,
            transfer: false,
        }
    }

    pub fn with_data(text: impl Into<String>, data: Value) -> Self {
        Self {
            text: text.into(),
            data: Some(data),
            transfer: false,
        }
    }

    pub fn transfer(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: None,
            transfer: true,
        }
    }
}

impl From<ToolSchema> for crate::llm_types::ToolDefinition {
    fn from(schema: ToolSchema) -> Self {
        crate::llm_types::ToolDefinition::new(schema.name, schema.description, schema.parameters)
    }
}

/// A callable domain tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable tool name, e.g. "get_order_status"
    fn name(&self) -> &str;

    /// Short description for the model
    fn description(&self) -> &str;

    /// Full schema (name + description + JSON Schema parameters)
    fn schema(&self) -> ToolSchema;

    /// Validate arguments before execution
    fn validate(&self, arguments: &Value) -> Result<(), ToolError>;

    /// Execute with validated arguments
    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolError>;

    /// Per-tool execution timeout
    fn timeout_secs(&self) -> u64 {
        DEFAULT_TOOL_TIMEOUT_SECS
    }
}
