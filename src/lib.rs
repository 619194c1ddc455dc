//! # CloudSwarm
//!
//! CloudSwarm coordinates a team of agents that pass control to one another
//! through explicit handoffs, call tools along the way, and pause whenever one
//! of them hands the conversation to a human.
//!
//! The crate provides layered abstractions for:
//!
//! * **Agents**: [`AgentDefinition`] pairs a name and capability allow-lists
//!   with a pluggable [`AgentBehavior`]. [`LlmBehavior`] is the model-backed
//!   implementation.
//! * **Teams**: [`Team`] validates names, handoff targets and tool
//!   assignments once, before any run starts, and is shared read-only by
//!   concurrent runs.
//! * **Tools**: [`tool_protocol::ToolRegistry`] and [`tool_protocol::ToolInvoker`]
//!   run named tools with a timeout; [`tool_protocols`] adapts code execution,
//!   web search, page fetching and sandboxed file reads.
//! * **Termination**: composable conditions (`HandoffTermination::human() |
//!   TextMentionTermination::new("TERMINATE") | MaxTurnsTermination::new(50)`),
//!   each reporting a stable reason tag.
//! * **Orchestration**: [`Swarm`] runs the handoff loop and returns a
//!   [`RunResult`] that is terminated, suspended on the human, or failed. A
//!   suspended run is resumed from its [`RunState`], in this process or any
//!   other.
//!
//! ## A two-agent swarm
//!
//! ```rust
//! use async_trait::async_trait;
//! use cloudswarm::{AgentBehavior, AgentDefinition, Swarm, Team, TurnContext, TurnOutput};
//! use cloudswarm::error::TurnError;
//! use cloudswarm::termination::{HandoffTermination, TextMentionTermination};
//! use std::sync::Arc;
//!
//! struct Analyst;
//! struct Coder;
//!
//! #[async_trait]
//! impl AgentBehavior for Analyst {
//!     async fn respond(&self, _ctx: &TurnContext<'_>) -> Result<TurnOutput, TurnError> {
//!         Ok(TurnOutput::handoff("coder", "Print the first ten squares."))
//!     }
//! }
//!
//! #[async_trait]
//! impl AgentBehavior for Coder {
//!     async fn respond(&self, _ctx: &TurnContext<'_>) -> Result<TurnOutput, TurnError> {
//!         Ok(TurnOutput::reply("print([i * i for i in range(10)])\nTERMINATE"))
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let team = Team::builder()
//!     .with_agent(AgentDefinition::new("analyst", "Writes requirements", Analyst)
//!         .with_handoffs(vec!["coder".into(), "human".into()]))
//!     .with_agent(AgentDefinition::new("coder", "Writes Python", Coder))
//!     .build()
//!     .unwrap();
//!
//! let mut swarm = Swarm::new(
//!     Arc::new(team),
//!     HandoffTermination::human() | TextMentionTermination::new("TERMINATE"),
//! );
//! let result = swarm.start("Squares please").await;
//! assert_eq!(result.status_tag(), "terminated");
//! assert_eq!(result.reason_tag(), "sentinel");
//! assert_eq!(result.history.len(), 3);
//! # }
//! ```
//!
//! ## Model-backed agents
//!
//! ```rust,no_run
//! use cloudswarm::clients::openai::OpenAIClient;
//! use cloudswarm::config::ModelConfig;
//! use cloudswarm::{AgentDefinition, LlmBehavior};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let client = Arc::new(OpenAIClient::from_config(&ModelConfig::from_env())?);
//! let analyst = AgentDefinition::new(
//!     "requirements_analyst",
//!     "Turns a request into precise requirements",
//!     LlmBehavior::new(client, "Be specific about inputs and outputs."),
//! )
//! .with_handoffs(vec!["python_coder".into(), "human".into()]);
//! # Ok(())
//! # }
//! ```
//!
//! See the `coding_swarm` binary for a complete four-agent team with code
//! execution, web search and an interactive human loop.

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Applications embedding CloudSwarm opt in to `RUST_LOG` driven diagnostics
/// by calling this early; the library itself only uses the `log` facade.
///
/// ```rust
/// cloudswarm::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `cloudswarm` module.
pub mod cloudswarm;

// Re-exporting key items for easier external access.
pub use cloudswarm::agent;
pub use cloudswarm::agent::{AgentBehavior, AgentDefinition, TurnContext, TurnOutput};
pub use cloudswarm::client_wrapper;
pub use cloudswarm::client_wrapper::{ClientWrapper, Message, Role, TokenUsage};
pub use cloudswarm::clients;
pub use cloudswarm::config;
pub use cloudswarm::config::{ModelConfig, SearchConfig, SwarmConfig};
pub use cloudswarm::error;
pub use cloudswarm::error::{CapabilityViolation, SwarmError, TurnError};
pub use cloudswarm::event;
pub use cloudswarm::event::{AgentEvent, EventHandler, SwarmEvent};
pub use cloudswarm::llm_agent;
pub use cloudswarm::llm_agent::LlmBehavior;
pub use cloudswarm::message;
pub use cloudswarm::message::{ConversationHistory, MessageKind, SwarmMessage, HUMAN};
pub use cloudswarm::swarm;
pub use cloudswarm::swarm::{RunResult, RunState, RunStatus, Swarm};
pub use cloudswarm::team;
pub use cloudswarm::team::{Speaker, Team, TeamBuilder};
pub use cloudswarm::termination;
pub use cloudswarm::termination::{TerminationCondition, TerminationEvaluator, TerminationReason};

// Re-export tool protocol functionality
pub use cloudswarm::tool_protocol;
pub use cloudswarm::tool_protocols;
pub use cloudswarm::tools;
