//! Swarm and agent event system.
//!
//! Provides a callback-based observability layer over swarm runs. Implement
//! [`EventHandler`] to receive real-time notifications about:
//!
//! - **Run lifecycle**: start, resume, suspension on a human handoff, completion, failure
//! - **Turns**: which agent is speaking, what it appended, where control goes next
//! - **Tool operations**: every invocation made through a turn context and its outcome
//! - **LLM round-trips**: emitted by model-backed behaviors
//!
//! Both trait methods have default no-op implementations, so you only
//! override what you care about. The handler is attached with
//! [`Swarm::with_event_handler`](crate::swarm::Swarm::with_event_handler) and
//! handed to every turn, where behaviors can reach it through
//! [`TurnContext::emit_agent_event`](crate::agent::TurnContext::emit_agent_event).
//!
//! # Event Flow (one run segment)
//!
//! ```text
//! RunStarted | RunResumed
//!   └─ TurnStarted { turn: 1 }
//!       ├─ ToolCallStarted / ToolCallCompleted   (zero or more)
//!       └─ TurnCompleted | TurnFailed
//!   └─ TerminationFired                           (if a condition matched)
//!   └─ HandoffResolved                            (otherwise)
//!   ...
//! RunSuspended | RunCompleted | RunFailed
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use cloudswarm::event::{EventHandler, SwarmEvent};
//! use async_trait::async_trait;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl EventHandler for Printer {
//!     async fn on_swarm_event(&self, event: &SwarmEvent) {
//!         if let SwarmEvent::TurnStarted { agent, turn, .. } = event {
//!             println!("---------- {} (turn {}) ----------", agent, turn);
//!         }
//!     }
//! }
//! ```

use crate::cloudswarm::client_wrapper::TokenUsage;
use crate::cloudswarm::termination::TerminationReason;
use async_trait::async_trait;

/// Events emitted by the [`Swarm`](crate::swarm::Swarm) orchestrator.
///
/// Every variant carries the `run_id` of the start/resume segment that
/// produced it. A resumed run gets a fresh id.
#[derive(Debug, Clone)]
pub enum SwarmEvent {
    /// `start` seeded the history and is about to run the entry agent.
    RunStarted {
        run_id: String,
        entry_agent: String,
        /// First ~120 characters of the task.
        task_preview: String,
    },

    /// `resume` appended the human message and is about to run `target`.
    RunResumed {
        run_id: String,
        target: String,
        /// History length after the human message was appended.
        history_len: usize,
    },

    /// An agent became the active speaker and its behavior is being invoked.
    TurnStarted {
        run_id: String,
        agent: String,
        /// 1-based turn counter within this segment.
        turn: usize,
    },

    /// The active agent asked its turn context for a tool.
    ToolCallStarted {
        run_id: String,
        agent: String,
        turn: usize,
        tool_name: String,
        parameters: serde_json::Value,
    },

    /// A tool call returned (success or failure).
    ToolCallCompleted {
        run_id: String,
        agent: String,
        turn: usize,
        tool_name: String,
        success: bool,
        /// Error text on failure, `None` on success.
        error: Option<String>,
        duration_ms: u64,
    },

    /// The turn's messages were appended to history.
    TurnCompleted {
        run_id: String,
        agent: String,
        turn: usize,
        /// Tool traffic plus the final message.
        messages_appended: usize,
        /// Handoff target named by the final message.
        target: Option<String>,
    },

    /// The turn failed; nothing from it was appended.
    TurnFailed {
        run_id: String,
        agent: String,
        turn: usize,
        /// Stable error tag, e.g. `"CapabilityError"`.
        error_kind: &'static str,
        message: String,
    },

    /// Control passed from one agent to another.
    HandoffResolved {
        run_id: String,
        from: String,
        to: String,
        turn: usize,
    },

    /// A termination condition matched after `turn`.
    TerminationFired {
        run_id: String,
        turn: usize,
        reason: TerminationReason,
    },

    /// The run stopped waiting on the human.
    RunSuspended {
        run_id: String,
        pending_target: String,
        turns: usize,
    },

    /// The run reached a non-human terminal condition.
    RunCompleted {
        run_id: String,
        reason: String,
        turns: usize,
    },

    /// The run aborted.
    RunFailed {
        run_id: String,
        error_kind: &'static str,
        message: String,
        turns: usize,
    },
}

/// Events emitted by model-backed agent behaviors.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// Fired **before** each LLM round-trip inside the tool loop.
    ///
    /// Iteration 1 is the initial call; later iterations follow tool results.
    LLMCallStarted {
        agent_name: String,
        /// 1-based iteration counter.
        iteration: usize,
    },

    /// Fired **after** each LLM round-trip completes.
    LLMCallCompleted {
        agent_name: String,
        iteration: usize,
        /// Usage reported by the provider for this call, if any.
        tokens_used: Option<TokenUsage>,
        /// Character length of this specific LLM response.
        response_length: usize,
    },

    /// A `{"tool_call": {...}}` directive was parsed from the LLM response.
    ToolCallDetected {
        agent_name: String,
        tool_name: String,
        parameters: serde_json::Value,
        iteration: usize,
    },

    /// The tool loop hit its iteration cap.
    ToolMaxIterationsReached {
        agent_name: String,
        max_iterations: usize,
    },
}

/// Receives swarm and agent events.
///
/// Handlers are shared as `Arc<dyn EventHandler>` and awaited inline, so keep
/// them fast; spawn if you need to do slow work.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Called when the orchestrator emits an event.
    async fn on_swarm_event(&self, _event: &SwarmEvent) {}

    /// Called when an agent behavior emits an event.
    async fn on_agent_event(&self, _event: &AgentEvent) {}
}
