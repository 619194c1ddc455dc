//! Tool Protocol Abstraction Layer
//!
//! Agents never talk to tool backends directly. Every call goes through a
//! [`ToolInvoker`], which looks the tool up in a [`ToolRegistry`], enforces a
//! timeout, and normalizes every failure into a [`ToolError`] the calling
//! agent can inspect (and decide to retry, hand off, or report).
//!
//! # Architecture
//!
//! ```text
//! TurnContext (allow-list) → ToolInvoker (timeout) → ToolRegistry → ToolProtocol (trait)
//!                                                                   ├─ CustomToolProtocol
//!                                                                   ├─ WebProtocol
//!                                                                   ├─ CodeExecutionProtocol
//!                                                                   └─ FileReadProtocol
//! ```
//!
//! # Example
//!
//! ```rust
//! use cloudswarm::tool_protocol::{ToolMetadata, ToolParameter, ToolParameterType};
//!
//! let meta = ToolMetadata::new("get_page_content", "Fetch a web page as text")
//!     .with_parameter(
//!         ToolParameter::new("url", ToolParameterType::String)
//!             .with_description("Absolute URL to fetch")
//!             .required(),
//!     );
//! assert_eq!(meta.parameters.len(), 1);
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Represents the result of a tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool execution was successful
    pub success: bool,
    /// The output data from the tool
    pub output: serde_json::Value,
    /// Optional error message if execution failed
    pub error: Option<String>,
    /// Metadata about the execution (timing, cost, etc.)
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ToolResult {
    /// Convenience constructor for successful tool execution.
    pub fn success(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
            metadata: HashMap::new(),
        }
    }

    /// Convenience constructor for failed tool execution.
    pub fn failure(error: String) -> Self {
        Self {
            success: false,
            output: serde_json::Value::Null,
            error: Some(error),
            metadata: HashMap::new(),
        }
    }

    /// Attach protocol or application specific metadata to the result.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Mark a failed result as worth retrying (e.g. a transient network error).
    pub fn retryable(self) -> Self {
        self.with_metadata("retryable", serde_json::Value::Bool(true))
    }
}

/// Defines the type of a tool parameter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ToolParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

/// Defines a parameter for a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ToolParameterType,
    pub description: Option<String>,
    pub required: bool,
    pub default: Option<serde_json::Value>,
}

impl ToolParameter {
    /// Define a new tool parameter with the provided name and type.
    pub fn new(name: impl Into<String>, param_type: ToolParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: None,
            required: false,
            default: None,
        }
    }

    /// Add a human readable description that will surface in agent prompts.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark the argument as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Provide a default value that will be used when the caller omits the parameter.
    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Metadata about a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolMetadata {
    /// Create metadata with the supplied identifier and description.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    /// Append a parameter definition to the tool metadata.
    pub fn with_parameter(mut self, param: ToolParameter) -> Self {
        self.parameters.push(param);
        self
    }
}

/// Trait for implementing tool execution protocols
#[async_trait]
pub trait ToolProtocol: Send + Sync {
    /// Execute a tool with the given parameters
    async fn execute(
        &self,
        tool_name: &str,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>>;

    /// Get metadata about available tools
    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>>;

    /// Protocol identifier (e.g., "custom", "web", "code")
    fn protocol_name(&self) -> &str;
}

/// Error types for tool operations
///
/// A `ToolError` is never fatal to a run. It is handed back to the calling
/// agent as data, and the agent decides what to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolError {
    /// Requested tool is not registered.
    NotFound(String),
    /// The provided JSON parameters failed validation.
    InvalidParameters(String),
    /// Tool execution completed with a failure.
    ExecutionFailed { message: String, retryable: bool },
    /// The tool did not finish within its deadline.
    Timeout { tool: String, after: Duration },
    /// A lower level protocol/transport error occurred.
    ProtocolError(String),
}

impl ToolError {
    /// Whether trying the same call again could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ToolError::ExecutionFailed { retryable, .. } => *retryable,
            ToolError::Timeout { .. } | ToolError::ProtocolError(_) => true,
            ToolError::NotFound(_) | ToolError::InvalidParameters(_) => false,
        }
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::NotFound(name) => write!(f, "Tool not found: {}", name),
            ToolError::InvalidParameters(msg) => write!(f, "Invalid parameters: {}", msg),
            ToolError::ExecutionFailed { message, .. } => {
                write!(f, "Tool execution failed: {}", message)
            }
            ToolError::Timeout { tool, after } => write!(
                f,
                "Tool '{}' timed out after {:.1}s",
                tool,
                after.as_secs_f64()
            ),
            ToolError::ProtocolError(msg) => write!(f, "Protocol error: {}", msg),
        }
    }
}

impl Error for ToolError {}

/// A tool that can be used by agents
pub struct Tool {
    /// Metadata describing the tool interface.
    metadata: ToolMetadata,
    /// Underlying protocol implementation that actually executes the tool.
    protocol: Arc<dyn ToolProtocol>,
}

impl Tool {
    /// Bind `metadata` to the protocol that executes it.
    pub fn new(metadata: ToolMetadata, protocol: Arc<dyn ToolProtocol>) -> Self {
        Self { metadata, protocol }
    }

    /// Borrow the static metadata for the tool.
    pub fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    /// Execute the tool using the configured protocol.
    pub async fn execute(
        &self,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        self.protocol.execute(&self.metadata.name, parameters).await
    }
}

/// Registry for managing tools available to a team
///
/// Tools are keyed by name; a later registration with the same name replaces
/// the earlier one.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a tool definition.
    pub fn add_tool(&mut self, tool: Tool) {
        self.tools.insert(tool.metadata.name.clone(), tool);
    }

    /// Register every tool a protocol advertises, returning how many were added.
    pub async fn discover(
        &mut self,
        protocol: Arc<dyn ToolProtocol>,
    ) -> Result<usize, Box<dyn Error + Send + Sync>> {
        let tools = protocol.list_tools().await?;
        let count = tools.len();
        for metadata in tools {
            log::debug!(
                "cloudswarm::tool_protocol: registering '{}' from protocol '{}'",
                metadata.name,
                protocol.protocol_name()
            );
            self.add_tool(Tool::new(metadata, Arc::clone(&protocol)));
        }
        Ok(count)
    }

    /// Remove a tool by name returning the owned entry if present.
    pub fn remove_tool(&mut self, name: &str) -> Option<Tool> {
        self.tools.remove(name)
    }

    /// Borrow a tool by name.
    pub fn get_tool(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// List metadata for registered tools, sorted by name.
    pub fn list_tools(&self) -> Vec<&ToolMetadata> {
        let mut tools: Vec<&ToolMetadata> = self.tools.values().map(|t| &t.metadata).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Executes named tools with a deadline and normalized errors.
///
/// The invoker never retries: retry policy belongs to the calling agent.
#[derive(Clone)]
pub struct ToolInvoker {
    registry: Arc<ToolRegistry>,
    default_timeout: Duration,
}

impl ToolInvoker {
    pub fn new(registry: Arc<ToolRegistry>, default_timeout: Duration) -> Self {
        Self {
            registry,
            default_timeout,
        }
    }

    /// Borrow the registry this invoker dispatches into.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Run `tool_name` with `arguments`, giving up after `timeout` (or the
    /// invoker's default).
    ///
    /// A result with `success == false` is converted into
    /// [`ToolError::ExecutionFailed`], so callers have a single failure path.
    pub async fn invoke(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<ToolResult, ToolError> {
        let tool = self
            .registry
            .get_tool(tool_name)
            .ok_or_else(|| ToolError::NotFound(tool_name.to_string()))?;
        let deadline = timeout.unwrap_or(self.default_timeout);
        let started = Instant::now();

        let outcome = tokio::time::timeout(deadline, tool.execute(arguments)).await;
        log::debug!(
            "cloudswarm::tool_protocol: '{}' finished in {} ms",
            tool_name,
            started.elapsed().as_millis()
        );

        match outcome {
            Err(_) => Err(ToolError::Timeout {
                tool: tool_name.to_string(),
                after: deadline,
            }),
            Ok(Err(err)) => Err(match err.downcast_ref::<ToolError>() {
                Some(tool_err) => tool_err.clone(),
                None => ToolError::ExecutionFailed {
                    message: err.to_string(),
                    retryable: false,
                },
            }),
            Ok(Ok(result)) if !result.success => Err(ToolError::ExecutionFailed {
                message: result
                    .error
                    .clone()
                    .unwrap_or_else(|| "Unknown error".to_string()),
                retryable: result
                    .metadata
                    .get("retryable")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
            }),
            Ok(Ok(result)) => Ok(result),
        }
    }
}
