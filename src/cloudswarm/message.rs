//! Swarm messages and the append-only conversation history.
//!
//! Every task, tool call, tool result, reply, and handoff flowing through a
//! [`Swarm`](crate::swarm::Swarm) is captured as a [`SwarmMessage`]. Messages
//! are immutable once created and live in a [`ConversationHistory`] that only
//! the orchestrator appends to. Insertion order is the only ordering signal;
//! the timestamp and id exist for observability and persistence.
//!
//! # Example
//!
//! ```
//! use cloudswarm::message::{MessageKind, SwarmMessage, HUMAN};
//!
//! let task = SwarmMessage::from_human("analyst", "Plot a sine wave");
//! assert_eq!(task.source, HUMAN);
//! assert_eq!(task.target.as_deref(), Some("analyst"));
//!
//! let reply = SwarmMessage::handoff("analyst", "coder", "Requirements attached.");
//! assert_eq!(reply.kind, MessageKind::Handoff);
//! assert!(reply.is_final());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved participant name for the human operator.
///
/// A message whose `target` is `HUMAN` suspends the run; agents may never be
/// registered under this name.
pub const HUMAN: &str = "human";

/// What a [`SwarmMessage`] represents inside a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Free text with no handoff attached.
    Plain,
    /// An agent requested a tool invocation.
    ToolCall,
    /// The outcome of a tool invocation.
    ToolResult,
    /// Text that passes control to `target`.
    Handoff,
}

/// A single immutable entry in the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmMessage {
    /// Unique id, useful when correlating events and persisted state.
    pub id: Uuid,

    /// UTC timestamp recorded when the message was created.
    pub timestamp: DateTime<Utc>,

    /// Agent name, or [`HUMAN`] for operator messages.
    pub source: String,

    /// Handoff target (agent name or [`HUMAN`]), `None` for no handoff.
    pub target: Option<String>,

    /// The message body.
    pub content: String,

    /// Role of this message within the turn.
    pub kind: MessageKind,

    /// Structured payload: tool arguments for tool calls, tool output for
    /// results, or whatever a behavior chose to attach to its final message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl SwarmMessage {
    fn build(
        source: impl Into<String>,
        target: Option<String>,
        content: impl Into<String>,
        kind: MessageKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            target,
            content: content.into(),
            kind,
            data: None,
        }
    }

    /// A message authored by the human operator and addressed to `target`.
    pub fn from_human(target: impl Into<String>, content: impl Into<String>) -> Self {
        Self::build(HUMAN, Some(target.into()), content, MessageKind::Handoff)
    }

    /// A final message without a handoff.
    pub fn plain(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self::build(source, None, content, MessageKind::Plain)
    }

    /// A final message that passes control to `target`.
    pub fn handoff(
        source: impl Into<String>,
        target: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::build(source, Some(target.into()), content, MessageKind::Handoff)
    }

    /// Record that `source` asked for `tool` with `arguments`.
    pub fn tool_call(
        source: impl Into<String>,
        tool: &str,
        arguments: serde_json::Value,
    ) -> Self {
        let content = format!("{}({})", tool, arguments);
        let mut msg = Self::build(source, None, content, MessageKind::ToolCall);
        msg.data = Some(serde_json::json!({ "tool": tool, "arguments": arguments }));
        msg
    }

    /// Record the outcome of a tool call made by `source`.
    ///
    /// `output` is the tool's JSON output on success, `error` its failure text.
    pub fn tool_result(
        source: impl Into<String>,
        tool: &str,
        output: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Self {
        let content = match (&output, &error) {
            (_, Some(err)) => format!("Tool '{}' failed: {}", tool, err),
            (Some(out), None) => format!("Tool '{}' returned: {}", tool, out),
            (None, None) => format!("Tool '{}' returned nothing", tool),
        };
        let mut msg = Self::build(source, None, content, MessageKind::ToolResult);
        msg.data = Some(serde_json::json!({
            "tool": tool,
            "success": error.is_none(),
            "output": output,
            "error": error,
        }));
        msg
    }

    /// Attach a structured payload (builder pattern).
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Whether this message hands control to the human operator.
    pub fn targets_human(&self) -> bool {
        self.target.as_deref() == Some(HUMAN)
    }

    /// Plain and handoff messages end a turn; tool traffic does not.
    pub fn is_final(&self) -> bool {
        matches!(self.kind, MessageKind::Plain | MessageKind::Handoff)
    }
}

/// Ordered, append-only sequence of [`SwarmMessage`]s.
///
/// Only the orchestrator appends; callers and agents get read-only views.
/// Serializes as a plain JSON array so persisted run state stays readable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory {
    messages: Vec<SwarmMessage>,
}

impl ConversationHistory {
    /// An empty history.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&mut self, message: SwarmMessage) {
        self.messages.push(message);
    }

    pub(crate) fn extend(&mut self, messages: impl IntoIterator<Item = SwarmMessage>) {
        self.messages.extend(messages);
    }

    /// Borrow every message in insertion order.
    pub fn messages(&self) -> &[SwarmMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The newest message, if any.
    pub fn last(&self) -> Option<&SwarmMessage> {
        self.messages.last()
    }

    /// The newest plain or handoff message, skipping tool traffic.
    pub fn last_final(&self) -> Option<&SwarmMessage> {
        self.messages.iter().rev().find(|m| m.is_final())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SwarmMessage> {
        self.messages.iter()
    }

    /// Consume the history, returning the underlying messages.
    pub fn into_messages(self) -> Vec<SwarmMessage> {
        self.messages
    }
}

impl From<Vec<SwarmMessage>> for ConversationHistory {
    fn from(messages: Vec<SwarmMessage>) -> Self {
        Self { messages }
    }
}

impl<'a> IntoIterator for &'a ConversationHistory {
    type Item = &'a SwarmMessage;
    type IntoIter = std::slice::Iter<'a, SwarmMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}
