//! Built-in Tool Implementations
//!
//! Backends for the leaf services a coding swarm needs. Each one is plain
//! async Rust with its own error type; the matching
//! [`ToolProtocol`](crate::tool_protocol::ToolProtocol) adapters in
//! [`tool_protocols`](crate::tool_protocols) expose them to agents.
//!
//! # Available Tools
//!
//! - **CodeExecutor**: writes Python or shell scripts into a working directory
//!   and runs them as subprocesses with a timeout
//! - **WebFetcher**: downloads a page and extracts its visible text
//! - **WebSearch**: Google Custom Search with every hit enriched by its page body
//! - **FileReader**: sandboxed read-only access to a directory tree
//!
//! ```ignore
//! use cloudswarm::tools::CodeExecutor;
//! use cloudswarm::tool_protocols::CodeExecutionProtocol;
//! use cloudswarm::tool_protocol::ToolRegistry;
//! use std::sync::Arc;
//!
//! let executor = Arc::new(CodeExecutor::new("coding_output"));
//! let mut registry = ToolRegistry::new();
//! registry.discover(Arc::new(CodeExecutionProtocol::new(executor))).await?;
//! ```

pub mod code_executor;
pub mod file_reader;
pub mod web;

pub use code_executor::{CodeExecutionError, CodeExecutor, ExecutionResult, Language};
pub use file_reader::{DirectoryEntry, FileReadError, FileReader};
pub use web::{extract_text, SearchHit, WebError, WebFetcher, WebSearch};
