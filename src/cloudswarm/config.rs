//! Configuration for swarm runs, model access and web search.
//!
//! All three structs are plain data built in code; nothing here parses a
//! config file. The `from_env` constructors read the same variables the
//! `coding_swarm` binary documents, and fall back to the defaults below.
//!
//! # Example
//!
//! ```rust
//! use cloudswarm::config::SwarmConfig;
//! use std::time::Duration;
//!
//! let config = SwarmConfig {
//!     max_turns: Some(20),
//!     tool_timeout: Duration::from_secs(60),
//!     ..SwarmConfig::default()
//! };
//! let termination = config.termination();
//! assert_eq!(termination.len(), 3);
//! ```

use crate::cloudswarm::termination::{
    HandoffTermination, MaxTurnsTermination, TerminationEvaluator, TextMentionTermination,
};
use std::path::PathBuf;
use std::time::Duration;

/// Gemini's OpenAI-compatible chat endpoint.
pub const GEMINI_OPENAI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// Knobs for a swarm run and the agents taking part in it.
#[derive(Clone, Debug)]
pub struct SwarmConfig {
    /// Deadline for each tool invocation.
    pub tool_timeout: Duration,
    /// Turn guard per start/resume segment; `None` disables the guard.
    pub max_turns: Option<usize>,
    /// Cap on tool round-trips inside one model-backed turn.
    pub max_tool_iterations: usize,
    /// Completion token that ends a run when it appears in a final message.
    pub sentinel: String,
    /// Directory scripts run in and artifacts are written to.
    pub work_dir: PathBuf,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            tool_timeout: Duration::from_secs(300),
            max_turns: Some(50),
            max_tool_iterations: 5,
            sentinel: "TERMINATE".to_string(),
            work_dir: PathBuf::from("coding_output"),
        }
    }
}

impl SwarmConfig {
    /// The standard evaluator: human handoff, then the sentinel, then the turn
    /// guard (if enabled), in that priority order.
    pub fn termination(&self) -> TerminationEvaluator {
        let evaluator = TerminationEvaluator::new()
            .with_condition(HandoffTermination::human())
            .with_condition(TextMentionTermination::new(self.sentinel.clone()));
        match self.max_turns {
            Some(turns) => evaluator.with_condition(MaxTurnsTermination::new(turns)),
            None => evaluator,
        }
    }
}

/// Where and how to reach the chat model.
#[derive(Clone, Debug)]
pub struct ModelConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    /// Retries on 429/5xx and transport errors before giving up.
    pub max_retries: u32,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: GEMINI_OPENAI_BASE_URL.to_string(),
            model: "gemini-2.5-flash-lite".to_string(),
            api_key: String::new(),
            max_retries: 150,
            timeout: Duration::from_secs(300),
        }
    }
}

impl ModelConfig {
    /// Read `SWARM_MODEL`, `SWARM_BASE_URL`, `SWARM_MAX_RETRIES` and the API key
    /// from `GEMINI_API_KEY` (or `OPENAI_API_KEY`).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            base_url: lookup("SWARM_BASE_URL").unwrap_or(defaults.base_url),
            model: lookup("SWARM_MODEL").unwrap_or(defaults.model),
            api_key: lookup("GEMINI_API_KEY")
                .or_else(|| lookup("OPENAI_API_KEY"))
                .unwrap_or_default(),
            max_retries: lookup("SWARM_MAX_RETRIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_retries),
            timeout: defaults.timeout,
        }
    }
}

/// Google Custom Search settings.
#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub api_key: Option<String>,
    /// The `cx` search engine id.
    pub engine_id: Option<String>,
    /// Hits per query; the API caps this at 10.
    pub num_results: usize,
    /// Character budget for each hit's page body.
    pub max_chars: usize,
    /// Pause between page fetches.
    pub delay: Duration,
    /// Timeout for the search API request itself.
    pub request_timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            engine_id: None,
            num_results: 10,
            max_chars: 15_000,
            delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl SearchConfig {
    /// Read `GOOGLE_API_KEY` and `GOOGLE_SEARCH_ENGINE_ID`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            api_key: lookup("GOOGLE_API_KEY").filter(|v| !v.is_empty()),
            engine_id: lookup("GOOGLE_SEARCH_ENGINE_ID").filter(|v| !v.is_empty()),
            ..Self::default()
        }
    }

    /// Whether both credentials are present.
    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some() && self.engine_id.is_some()
    }
}
