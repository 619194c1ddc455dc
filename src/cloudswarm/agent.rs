//! Agents: named participants with capability allow-lists and a pluggable
//! turn behavior.
//!
//! An [`AgentDefinition`] is immutable once its [`Team`](crate::team::Team)
//! is built. The interesting part is the [`AgentBehavior`] it carries: a
//! black-box step that receives a [`TurnContext`] (read-only history plus
//! capability-scoped tool access) and returns a [`TurnOutput`] naming the next
//! speaker.
//!
//! ```rust
//! use async_trait::async_trait;
//! use cloudswarm::agent::{AgentBehavior, AgentDefinition, TurnContext, TurnOutput};
//! use cloudswarm::error::TurnError;
//!
//! struct Analyst;
//!
//! #[async_trait]
//! impl AgentBehavior for Analyst {
//!     async fn respond(&self, ctx: &TurnContext<'_>) -> Result<TurnOutput, TurnError> {
//!         let task = ctx.history().first().map(|m| m.content.clone()).unwrap_or_default();
//!         Ok(TurnOutput::handoff("python_coder", format!("Requirements for: {}", task)))
//!     }
//! }
//!
//! let analyst = AgentDefinition::new("requirements_analyst", "Writes requirements", Analyst)
//!     .with_tools(vec!["google_search".into()])
//!     .with_handoffs(vec!["python_coder".into(), "human".into()]);
//! assert!(analyst.can_hand_off_to("python_coder"));
//! assert!(!analyst.can_use_tool("execute_code"));
//! ```

use crate::cloudswarm::error::{CapabilityViolation, TurnError};
use crate::cloudswarm::event::{AgentEvent, EventHandler, SwarmEvent};
use crate::cloudswarm::message::SwarmMessage;
use crate::cloudswarm::tool_protocol::{ToolError, ToolInvoker, ToolMetadata, ToolResult};
use async_trait::async_trait;
use futures_util::future::join_all;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Turn logic for one agent.
///
/// Implementations must finish with exactly one [`TurnOutput`]; any
/// intermediate tool traffic goes through [`TurnContext::call_tool`]. Errors
/// fail the turn as a unit and abort the run.
#[async_trait]
pub trait AgentBehavior: Send + Sync {
    async fn respond(&self, ctx: &TurnContext<'_>) -> Result<TurnOutput, TurnError>;
}

/// The final message of a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutput {
    pub content: String,
    /// Next speaker (agent name or `"human"`); `None` means no handoff.
    pub handoff: Option<String>,
    /// Optional structured payload carried on the final message.
    pub data: Option<serde_json::Value>,
}

impl TurnOutput {
    /// A final message without a handoff.
    pub fn reply(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            handoff: None,
            data: None,
        }
    }

    /// A final message passing control to `target`.
    pub fn handoff(target: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            handoff: Some(target.into()),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub(crate) fn into_message(self, source: &str) -> SwarmMessage {
        let msg = match self.handoff {
            Some(target) => SwarmMessage::handoff(source, target, self.content),
            None => SwarmMessage::plain(source, self.content),
        };
        match self.data {
            Some(data) => msg.with_data(data),
            None => msg,
        }
    }
}

/// A named participant: role description, allow-lists and behavior.
#[derive(Clone)]
pub struct AgentDefinition {
    name: String,
    description: String,
    tools: Vec<String>,
    handoffs: Vec<String>,
    behavior: Arc<dyn AgentBehavior>,
}

impl AgentDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        behavior: impl AgentBehavior + 'static,
    ) -> Self {
        Self::with_shared_behavior(name, description, Arc::new(behavior))
    }

    /// Build from a behavior already shared with other agents.
    pub fn with_shared_behavior(
        name: impl Into<String>,
        description: impl Into<String>,
        behavior: Arc<dyn AgentBehavior>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            tools: Vec::new(),
            handoffs: Vec::new(),
            behavior,
        }
    }

    /// Tool allow-list.
    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }

    /// Handoff allow-list. Include `"human"` to let the agent pause the run,
    /// and the agent's own name to let it keep the floor.
    pub fn with_handoffs(mut self, handoffs: Vec<String>) -> Self {
        self.handoffs = handoffs;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn tools(&self) -> &[String] {
        &self.tools
    }

    pub fn handoffs(&self) -> &[String] {
        &self.handoffs
    }

    pub fn behavior(&self) -> &Arc<dyn AgentBehavior> {
        &self.behavior
    }

    pub fn can_use_tool(&self, tool: &str) -> bool {
        self.tools.iter().any(|t| t == tool)
    }

    pub fn can_hand_off_to(&self, target: &str) -> bool {
        self.handoffs.iter().any(|t| t == target)
    }
}

impl fmt::Debug for AgentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentDefinition")
            .field("name", &self.name)
            .field("tools", &self.tools)
            .field("handoffs", &self.handoffs)
            .finish()
    }
}

/// Everything a behavior may see or do during one turn.
///
/// Tool calls made through the context are recorded as `ToolCall` /
/// `ToolResult` messages; the orchestrator appends them, followed by the final
/// message, once the turn succeeds. A disallowed tool request is remembered
/// even if the behavior discards the error, and fails the turn.
pub struct TurnContext<'a> {
    history: &'a [SwarmMessage],
    agent: &'a AgentDefinition,
    invoker: &'a ToolInvoker,
    turn: usize,
    run_id: &'a str,
    events: Option<Arc<dyn EventHandler>>,
    emitted: Mutex<Vec<SwarmMessage>>,
    violation: Mutex<Option<CapabilityViolation>>,
}

impl<'a> TurnContext<'a> {
    pub fn new(
        history: &'a [SwarmMessage],
        agent: &'a AgentDefinition,
        invoker: &'a ToolInvoker,
        turn: usize,
        run_id: &'a str,
    ) -> Self {
        Self {
            history,
            agent,
            invoker,
            turn,
            run_id,
            events: None,
            emitted: Mutex::new(Vec::new()),
            violation: Mutex::new(None),
        }
    }

    pub fn with_event_handler(mut self, handler: Option<Arc<dyn EventHandler>>) -> Self {
        self.events = handler;
        self
    }

    /// Read-only view of the conversation so far.
    pub fn history(&self) -> &'a [SwarmMessage] {
        self.history
    }

    pub fn agent(&self) -> &'a AgentDefinition {
        self.agent
    }

    pub fn agent_name(&self) -> &'a str {
        self.agent.name()
    }

    pub fn description(&self) -> &'a str {
        self.agent.description()
    }

    pub fn allowed_tools(&self) -> &'a [String] {
        self.agent.tools()
    }

    pub fn handoff_targets(&self) -> &'a [String] {
        self.agent.handoffs()
    }

    /// 1-based turn counter within the current run segment.
    pub fn turn(&self) -> usize {
        self.turn
    }

    /// Metadata of the tools this agent may call, sorted by name.
    pub fn tool_metadata(&self) -> Vec<&'a ToolMetadata> {
        let invoker: &'a ToolInvoker = self.invoker;
        invoker
            .registry()
            .list_tools()
            .into_iter()
            .filter(|m| self.agent.can_use_tool(&m.name))
            .collect()
    }

    /// Messages this turn has emitted so far.
    pub fn emitted(&self) -> Vec<SwarmMessage> {
        lock(&self.emitted).clone()
    }

    fn record_violation(&self, violation: CapabilityViolation) -> TurnError {
        log::warn!(
            "cloudswarm::agent: '{}' turn {}: {}",
            self.agent.name(),
            self.turn,
            violation
        );
        let mut slot = lock(&self.violation);
        if slot.is_none() {
            *slot = Some(violation.clone());
        }
        TurnError::Capability(violation)
    }

    /// Fail fast if `target` is outside the handoff allow-list.
    pub fn check_handoff(&self, target: &str) -> Result<(), TurnError> {
        if self.agent.can_hand_off_to(target) {
            Ok(())
        } else {
            Err(self.record_violation(CapabilityViolation::Handoff(target.to_string())))
        }
    }

    /// Invoke a tool from the allow-list.
    ///
    /// The outer `Err` is a capability violation and should be propagated
    /// with `?`. The inner result is the tool's own outcome: a [`ToolError`]
    /// is data for the behavior to act on.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<Result<ToolResult, ToolError>, TurnError> {
        self.invoke_tool(name, arguments, None).await
    }

    /// Like [`call_tool`](Self::call_tool), but bounded by `timeout` instead
    /// of the invoker's default.
    pub async fn call_tool_with_timeout(
        &self,
        name: &str,
        arguments: serde_json::Value,
        timeout: Duration,
    ) -> Result<Result<ToolResult, ToolError>, TurnError> {
        self.invoke_tool(name, arguments, Some(timeout)).await
    }

    async fn invoke_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<Result<ToolResult, ToolError>, TurnError> {
        if !self.agent.can_use_tool(name) {
            return Err(self.record_violation(CapabilityViolation::Tool(name.to_string())));
        }

        lock(&self.emitted).push(SwarmMessage::tool_call(
            self.agent.name(),
            name,
            arguments.clone(),
        ));
        self.emit_swarm_event(SwarmEvent::ToolCallStarted {
            run_id: self.run_id.to_string(),
            agent: self.agent.name().to_string(),
            turn: self.turn,
            tool_name: name.to_string(),
            parameters: arguments.clone(),
        })
        .await;

        let started = Instant::now();
        let outcome = self.invoker.invoke(name, arguments, timeout).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        log::debug!(
            "cloudswarm::agent: '{}' called '{}' ({} ms, ok={})",
            self.agent.name(),
            name,
            duration_ms,
            outcome.is_ok()
        );

        let (output, error) = match &outcome {
            Ok(result) => (Some(result.output.clone()), None),
            Err(e) => (None, Some(e.to_string())),
        };
        lock(&self.emitted).push(SwarmMessage::tool_result(
            self.agent.name(),
            name,
            output,
            error.clone(),
        ));
        self.emit_swarm_event(SwarmEvent::ToolCallCompleted {
            run_id: self.run_id.to_string(),
            agent: self.agent.name().to_string(),
            turn: self.turn,
            tool_name: name.to_string(),
            success: error.is_none(),
            error,
            duration_ms,
        })
        .await;

        Ok(outcome)
    }

    /// Invoke several tools concurrently. Every name is checked against the
    /// allow-list before any of them runs.
    pub async fn call_tools(
        &self,
        calls: Vec<(String, serde_json::Value)>,
    ) -> Result<Vec<Result<ToolResult, ToolError>>, TurnError> {
        if let Some((name, _)) = calls.iter().find(|(n, _)| !self.agent.can_use_tool(n)) {
            return Err(self.record_violation(CapabilityViolation::Tool(name.clone())));
        }
        join_all(
            calls
                .into_iter()
                .map(|(name, args)| async move { self.call_tool(&name, args).await }),
        )
        .await
        .into_iter()
        .collect()
    }

    /// Forward an agent-level event to the swarm's handler, if any.
    pub async fn emit_agent_event(&self, event: AgentEvent) {
        if let Some(handler) = &self.events {
            handler.on_agent_event(&event).await;
        }
    }

    async fn emit_swarm_event(&self, event: SwarmEvent) {
        if let Some(handler) = &self.events {
            handler.on_swarm_event(&event).await;
        }
    }

    /// Consume the context, returning the emitted messages and the first
    /// capability violation, if any.
    pub(crate) fn into_parts(self) -> (Vec<SwarmMessage>, Option<CapabilityViolation>) {
        let emitted = self
            .emitted
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let violation = self
            .violation
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        (emitted, violation)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
