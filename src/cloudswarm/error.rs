//! Error types for team assembly and swarm runs.
//!
//! [`SwarmError`] is what a failed run reports to the caller. Only tool
//! failures are ever recovered, and that recovery belongs to agent logic:
//! they reach behaviors as [`ToolError`](crate::tool_protocol::ToolError)
//! data rather than as a `SwarmError`.
//!
//! ```
//! use cloudswarm::error::SwarmError;
//!
//! let err = SwarmError::Configuration("duplicate agent name 'coder'".into());
//! assert_eq!(err.kind(), "ConfigurationError");
//! assert_eq!(err.to_string(), "Configuration error: duplicate agent name 'coder'");
//! ```

use std::error::Error;
use std::fmt;

/// Which capability an agent overstepped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityViolation {
    /// The tool is not in the agent's tool allow-list.
    Tool(String),
    /// The handoff target is not in the agent's handoff allow-list.
    Handoff(String),
}

impl fmt::Display for CapabilityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityViolation::Tool(name) => write!(f, "tool '{}' is not allowed", name),
            CapabilityViolation::Handoff(target) => {
                write!(f, "handoff to '{}' is not allowed", target)
            }
        }
    }
}

/// Errors an [`AgentBehavior`](crate::agent::AgentBehavior) can end its turn with.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnError {
    /// Raised by [`TurnContext`](crate::agent::TurnContext) when a disallowed
    /// tool is requested. Propagate it with `?`.
    Capability(CapabilityViolation),
    /// The model or behavior backend failed.
    Backend(String),
}

impl fmt::Display for TurnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnError::Capability(v) => write!(f, "Capability error: {}", v),
            TurnError::Backend(msg) => write!(f, "Backend error: {}", msg),
        }
    }
}

impl Error for TurnError {}

impl From<Box<dyn Error + Send + Sync>> for TurnError {
    fn from(err: Box<dyn Error + Send + Sync>) -> Self {
        TurnError::Backend(err.to_string())
    }
}

/// Fatal errors surfaced to the caller of [`Swarm::start`](crate::swarm::Swarm::start)
/// and [`Swarm::resume`](crate::swarm::Swarm::resume), or raised while
/// assembling a [`Team`](crate::team::Team).
#[derive(Debug, Clone, PartialEq)]
pub enum SwarmError {
    /// A turn ended without a handoff and without any termination condition
    /// firing.
    Protocol {
        agent: String,
        turn: usize,
        message: String,
    },

    /// An agent used a tool or handoff target outside its allow-lists.
    Capability {
        agent: String,
        turn: usize,
        violation: CapabilityViolation,
    },

    /// The team is malformed. Raised before any run starts.
    Configuration(String),

    /// The agent's behavior returned an error (typically a model backend
    /// failure).
    TurnFailed {
        agent: String,
        turn: usize,
        message: String,
    },

    /// The active speaker does not name a team member.
    UnknownAgent(String),
}

impl SwarmError {
    /// Stable tag identifying the error kind, used as the failed run's reason.
    pub fn kind(&self) -> &'static str {
        match self {
            SwarmError::Protocol { .. } => "ProtocolError",
            SwarmError::Capability { .. } => "CapabilityError",
            SwarmError::Configuration(_) => "ConfigurationError",
            SwarmError::TurnFailed { .. } => "TurnError",
            SwarmError::UnknownAgent(_) => "UnknownAgentError",
        }
    }

    /// The agent whose turn caused the error, when there is one.
    pub fn agent(&self) -> Option<&str> {
        match self {
            SwarmError::Protocol { agent, .. }
            | SwarmError::Capability { agent, .. }
            | SwarmError::TurnFailed { agent, .. } => Some(agent),
            SwarmError::UnknownAgent(name) => Some(name),
            SwarmError::Configuration(_) => None,
        }
    }

    /// The 1-based turn number that failed, when the error is turn-scoped.
    pub fn turn(&self) -> Option<usize> {
        match self {
            SwarmError::Protocol { turn, .. }
            | SwarmError::Capability { turn, .. }
            | SwarmError::TurnFailed { turn, .. } => Some(*turn),
            _ => None,
        }
    }
}

impl fmt::Display for SwarmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwarmError::Protocol {
                agent,
                turn,
                message,
            } => write!(f, "Protocol error: agent '{}' turn {}: {}", agent, turn, message),
            SwarmError::Capability {
                agent,
                turn,
                violation,
            } => write!(
                f,
                "Capability error: agent '{}' turn {}: {}",
                agent, turn, violation
            ),
            SwarmError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            SwarmError::TurnFailed {
                agent,
                turn,
                message,
            } => write!(f, "Turn failed: agent '{}' turn {}: {}", agent, turn, message),
            SwarmError::UnknownAgent(name) => write!(f, "Unknown agent: {}", name),
        }
    }
}

impl Error for SwarmError {}
