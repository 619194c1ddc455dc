//! Tool Protocol Implementations
//!
//! Concrete [`ToolProtocol`] implementations. Each struct advertises one or
//! more tools through `list_tools` and executes them by name; register them
//! with [`ToolRegistry::discover`](crate::tool_protocol::ToolRegistry::discover).
//!
//! # Available Implementations
//!
//! - **CustomToolProtocol**: Direct Rust function calls (sync and async)
//! - **CodeExecutionProtocol**: `execute_code` backed by [`CodeExecutor`]
//! - **WebProtocol**: `google_search` and `get_page_content` backed by
//!   [`WebSearch`] and [`WebFetcher`]
//! - **FileReadProtocol**: `read_file` and `list_directory` backed by [`FileReader`]
//!
//! Backend failures come back as `Ok(ToolResult::failure(..))` (flagged
//! retryable when a second attempt could succeed). Missing or malformed
//! arguments are `Err(ToolError::InvalidParameters)`.

use crate::cloudswarm::tool_protocol::{
    ToolError, ToolMetadata, ToolParameter, ToolParameterType, ToolProtocol, ToolResult,
};
use crate::cloudswarm::tools::{CodeExecutor, FileReader, Language, WebFetcher, WebSearch};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Type alias for synchronous tool functions exposed via the custom adapter.
pub type ToolFunction =
    Arc<dyn Fn(JsonValue) -> Result<ToolResult, Box<dyn Error + Send + Sync>> + Send + Sync>;

/// Type alias for asynchronous tool functions exposed via the custom adapter.
pub type AsyncToolFunction = Arc<
    dyn Fn(
            JsonValue,
        ) -> std::pin::Pin<
            Box<
                dyn std::future::Future<Output = Result<ToolResult, Box<dyn Error + Send + Sync>>>
                    + Send,
            >,
        > + Send
        + Sync,
>;

fn required_str<'a>(parameters: &'a JsonValue, name: &str) -> Result<&'a str, ToolError> {
    parameters[name]
        .as_str()
        .ok_or_else(|| ToolError::InvalidParameters(format!("'{}' parameter is required", name)))
}

/// Custom function-calling tool adapter
///
/// Registers plain Rust closures as tools. Handy for application specific
/// tools and for tests.
///
/// # Example
///
/// ```rust
/// use cloudswarm::tool_protocols::CustomToolProtocol;
/// use cloudswarm::tool_protocol::{ToolResult, ToolMetadata, ToolParameter, ToolParameterType};
/// use std::sync::Arc;
///
/// # async {
/// let adapter = CustomToolProtocol::new();
/// adapter.register_tool(
///     ToolMetadata::new("add", "Adds two numbers")
///         .with_parameter(ToolParameter::new("a", ToolParameterType::Number).required())
///         .with_parameter(ToolParameter::new("b", ToolParameterType::Number).required()),
///     Arc::new(|params| {
///         let a = params["a"].as_f64().unwrap_or(0.0);
///         let b = params["b"].as_f64().unwrap_or(0.0);
///         Ok(ToolResult::success(serde_json::json!({"result": a + b})))
///     }),
/// ).await;
/// # };
/// ```
pub struct CustomToolProtocol {
    tools: Arc<RwLock<HashMap<String, ToolMetadata>>>,
    sync_functions: Arc<RwLock<HashMap<String, ToolFunction>>>,
    async_functions: Arc<RwLock<HashMap<String, AsyncToolFunction>>>,
}

impl CustomToolProtocol {
    /// Create an empty adapter ready to accept new tool registrations.
    pub fn new() -> Self {
        Self {
            tools: Arc::new(RwLock::new(HashMap::new())),
            sync_functions: Arc::new(RwLock::new(HashMap::new())),
            async_functions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a synchronous tool function.
    ///
    /// Subsequent calls will overwrite any existing tool with the same name.
    pub async fn register_tool(&self, metadata: ToolMetadata, function: ToolFunction) {
        let name = metadata.name.clone();
        self.tools.write().await.insert(name.clone(), metadata);
        self.async_functions.write().await.remove(&name);
        self.sync_functions.write().await.insert(name, function);
    }

    /// Register an asynchronous tool function.
    pub async fn register_async_tool(&self, metadata: ToolMetadata, function: AsyncToolFunction) {
        let name = metadata.name.clone();
        self.tools.write().await.insert(name.clone(), metadata);
        self.sync_functions.write().await.remove(&name);
        self.async_functions.write().await.insert(name, function);
    }

    /// Remove a tool from the adapter.
    pub async fn unregister_tool(&self, name: &str) {
        self.tools.write().await.remove(name);
        self.sync_functions.write().await.remove(name);
        self.async_functions.write().await.remove(name);
    }
}

impl Default for CustomToolProtocol {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolProtocol for CustomToolProtocol {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: JsonValue,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        // Clone the function out so the lock is not held across the call.
        let async_func = self.async_functions.read().await.get(tool_name).cloned();
        if let Some(func) = async_func {
            return func(parameters).await;
        }

        let sync_func = self.sync_functions.read().await.get(tool_name).cloned();
        if let Some(func) = sync_func {
            return func(parameters);
        }

        Err(Box::new(ToolError::NotFound(tool_name.to_string())))
    }

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
        let tools = self.tools.read().await;
        Ok(tools.values().cloned().collect())
    }

    fn protocol_name(&self) -> &str {
        "custom"
    }
}

/// Exposes a [`CodeExecutor`] as the `execute_code` tool.
///
/// A script that exits non-zero is still a successful tool call: the output
/// carries `success: false`, the exit code and stderr, which is what a coder
/// agent needs to decide on a handoff to a debugger.
///
/// ```json
/// { "name": "execute_code", "parameters": { "code": "print(1 + 1)", "language": "python" } }
/// ```
pub struct CodeExecutionProtocol {
    executor: Arc<CodeExecutor>,
}

impl CodeExecutionProtocol {
    pub fn new(executor: Arc<CodeExecutor>) -> Self {
        Self { executor }
    }

    fn metadata() -> ToolMetadata {
        ToolMetadata::new(
            "execute_code",
            "Execute a complete script in the shared working directory and return stdout, stderr and the exit code",
        )
        .with_parameter(
            ToolParameter::new("code", ToolParameterType::String)
                .with_description("Full source of the script to run")
                .required(),
        )
        .with_parameter(
            ToolParameter::new("language", ToolParameterType::String)
                .with_description("'python' or 'bash'")
                .with_default(serde_json::json!("python")),
        )
    }
}

#[async_trait]
impl ToolProtocol for CodeExecutionProtocol {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: JsonValue,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        if tool_name != "execute_code" {
            return Err(Box::new(ToolError::NotFound(tool_name.to_string())));
        }
        let code = required_str(&parameters, "code")?;
        let language_name = parameters["language"].as_str().unwrap_or("python");
        let language = Language::parse(language_name).ok_or_else(|| {
            ToolError::InvalidParameters(format!("unsupported language '{}'", language_name))
        })?;

        match self.executor.execute(language, code).await {
            Ok(result) => Ok(ToolResult::success(serde_json::json!({
                "success": result.success,
                "exit_code": result.exit_code,
                "stdout": result.stdout,
                "stderr": result.stderr,
                "script": result.script,
            }))
            .with_metadata("duration_ms", serde_json::json!(result.duration_ms))),
            Err(e) => Ok(ToolResult::failure(e.to_string())),
        }
    }

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
        Ok(vec![Self::metadata()])
    }

    fn protocol_name(&self) -> &str {
        "code"
    }
}

/// Web research tools: `google_search` and `get_page_content`.
///
/// `google_search` is only advertised when a [`WebSearch`] is attached.
pub struct WebProtocol {
    fetcher: WebFetcher,
    search: Option<Arc<WebSearch>>,
}

impl WebProtocol {
    /// Page fetching only.
    pub fn new(fetcher: WebFetcher) -> Self {
        Self {
            fetcher,
            search: None,
        }
    }

    /// Also advertise `google_search`.
    pub fn with_search(mut self, search: Arc<WebSearch>) -> Self {
        self.search = Some(search);
        self
    }
}

#[async_trait]
impl ToolProtocol for WebProtocol {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: JsonValue,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let outcome = match tool_name {
            "get_page_content" => {
                let url = required_str(&parameters, "url")?;
                self.fetcher
                    .fetch(url)
                    .await
                    .map(|text| serde_json::json!({ "url": url, "content": text }))
            }
            "google_search" => {
                let Some(search) = &self.search else {
                    return Err(Box::new(ToolError::NotFound(tool_name.to_string())));
                };
                let query = required_str(&parameters, "query")?;
                let num = parameters["num_results"].as_u64().map(|n| n as usize);
                search
                    .search(query, num)
                    .await
                    .map(|hits| serde_json::json!(hits))
            }
            _ => return Err(Box::new(ToolError::NotFound(tool_name.to_string()))),
        };

        Ok(match outcome {
            Ok(output) => ToolResult::success(output),
            Err(e) if e.is_retryable() => ToolResult::failure(e.to_string()).retryable(),
            Err(e) => ToolResult::failure(e.to_string()),
        })
    }

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
        let mut tools = vec![ToolMetadata::new(
            "get_page_content",
            "Fetch content from a web page URL and return its visible text",
        )
        .with_parameter(
            ToolParameter::new("url", ToolParameterType::String)
                .with_description("Absolute http(s) URL")
                .required(),
        )];

        if self.search.is_some() {
            tools.push(
                ToolMetadata::new(
                    "google_search",
                    "Search Google for information, returns results with a snippet and body content",
                )
                .with_parameter(
                    ToolParameter::new("query", ToolParameterType::String)
                        .with_description("Search terms")
                        .required(),
                )
                .with_parameter(
                    ToolParameter::new("num_results", ToolParameterType::Integer)
                        .with_description("Number of pages to retrieve (at most 10)"),
                ),
            );
        }
        Ok(tools)
    }

    fn protocol_name(&self) -> &str {
        "web"
    }
}

/// Read-only file tools: `read_file` and `list_directory`.
pub struct FileReadProtocol {
    reader: Arc<FileReader>,
}

impl FileReadProtocol {
    pub fn new(reader: Arc<FileReader>) -> Self {
        Self { reader }
    }
}

#[async_trait]
impl ToolProtocol for FileReadProtocol {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: JsonValue,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        match tool_name {
            "read_file" => {
                let path = required_str(&parameters, "path")?;
                Ok(match self.reader.read_file(path).await {
                    Ok(content) => {
                        ToolResult::success(serde_json::json!({ "path": path, "content": content }))
                    }
                    Err(e) => ToolResult::failure(e.to_string()),
                })
            }
            "list_directory" => {
                let path = parameters["path"].as_str().unwrap_or(".");
                Ok(match self.reader.list_directory(path).await {
                    Ok(entries) => ToolResult::success(serde_json::json!(entries)),
                    Err(e) => ToolResult::failure(e.to_string()),
                })
            }
            _ => Err(Box::new(ToolError::NotFound(tool_name.to_string()))),
        }
    }

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
        Ok(vec![
            ToolMetadata::new("read_file", "Read a text file from the working directory")
                .with_parameter(
                    ToolParameter::new("path", ToolParameterType::String)
                        .with_description("Path relative to the working directory")
                        .required(),
                ),
            ToolMetadata::new("list_directory", "List files in a working directory folder")
                .with_parameter(
                    ToolParameter::new("path", ToolParameterType::String)
                        .with_description("Folder relative to the working directory")
                        .with_default(serde_json::json!(".")),
                ),
        ])
    }

    fn protocol_name(&self) -> &str {
        "file"
    }
}
