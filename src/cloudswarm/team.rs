//! Team assembly and routing.
//!
//! A [`Team`] is the fixed mapping from agent name to [`AgentDefinition`],
//! plus the tool invoker every agent shares. It is validated once, when
//! [`TeamBuilder::build`] runs, and never mutated afterwards; concurrent runs
//! share it through an `Arc`.
//!
//! Handoff targets are free text in agent output, so [`Team::resolve`] turns
//! them into a [`Speaker`] by looking them up in the closed set of declared
//! names.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use cloudswarm::agent::{AgentBehavior, AgentDefinition, TurnContext, TurnOutput};
//! use cloudswarm::error::TurnError;
//! use cloudswarm::team::{Speaker, Team};
//!
//! struct Done;
//!
//! #[async_trait]
//! impl AgentBehavior for Done {
//!     async fn respond(&self, _ctx: &TurnContext<'_>) -> Result<TurnOutput, TurnError> {
//!         Ok(TurnOutput::reply("TERMINATE"))
//!     }
//! }
//!
//! let team = Team::builder()
//!     .with_agent(AgentDefinition::new("analyst", "", Done).with_handoffs(vec!["coder".into()]))
//!     .with_agent(AgentDefinition::new("coder", "", Done).with_handoffs(vec!["human".into()]))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(team.entry_agent().name(), "analyst");
//! assert_eq!(team.resolve("human"), Some(Speaker::Human));
//! assert!(team.resolve("debugger").is_none());
//! ```

use crate::cloudswarm::agent::AgentDefinition;
use crate::cloudswarm::error::SwarmError;
use crate::cloudswarm::message::HUMAN;
use crate::cloudswarm::tool_protocol::{ToolInvoker, ToolRegistry};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Index of an agent inside its [`Team`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AgentId(usize);

impl AgentId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A resolved handoff target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Agent(AgentId),
    Human,
}

/// Collects agent definitions and tools, then validates them into a [`Team`].
pub struct TeamBuilder {
    agents: Vec<AgentDefinition>,
    entry: Option<String>,
    tools: ToolRegistry,
    tool_timeout: Duration,
}

impl Default for TeamBuilder {
    fn default() -> Self {
        Self {
            agents: Vec::new(),
            entry: None,
            tools: ToolRegistry::new(),
            tool_timeout: Duration::from_secs(300),
        }
    }
}

impl TeamBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an agent. Declaration order matters only for the default entry
    /// agent, which is the first one added.
    pub fn with_agent(mut self, agent: AgentDefinition) -> Self {
        self.agents.push(agent);
        self
    }

    /// Start runs with `name` instead of the first agent.
    pub fn with_entry_agent(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    /// Tools the agents' allow-lists are checked against.
    pub fn with_tools(mut self, registry: ToolRegistry) -> Self {
        self.tools = registry;
        self
    }

    /// Default deadline for every tool invocation.
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Validate and freeze the team.
    ///
    /// Fails with [`SwarmError::Configuration`] on an empty team, an empty,
    /// duplicate or reserved agent name, a handoff to an undeclared agent, a
    /// tool missing from the registry, or an unknown entry agent.
    pub fn build(self) -> Result<Team, SwarmError> {
        if self.agents.is_empty() {
            return Err(SwarmError::Configuration(
                "a team needs at least one agent".to_string(),
            ));
        }

        let mut index = HashMap::with_capacity(self.agents.len());
        for (i, agent) in self.agents.iter().enumerate() {
            let name = agent.name();
            if name.trim().is_empty() {
                return Err(SwarmError::Configuration(format!(
                    "agent #{} has an empty name",
                    i + 1
                )));
            }
            if name == HUMAN {
                return Err(SwarmError::Configuration(format!(
                    "'{}' is reserved for the human operator",
                    HUMAN
                )));
            }
            if index.insert(name.to_string(), AgentId(i)).is_some() {
                return Err(SwarmError::Configuration(format!(
                    "duplicate agent name '{}'",
                    name
                )));
            }
        }

        for agent in &self.agents {
            let mut seen = HashSet::new();
            for target in agent.handoffs() {
                if target != HUMAN && !index.contains_key(target) {
                    return Err(SwarmError::Configuration(format!(
                        "agent '{}' hands off to unknown agent '{}'",
                        agent.name(),
                        target
                    )));
                }
                if !seen.insert(target.as_str()) {
                    log::warn!(
                        "cloudswarm::team: agent '{}' lists handoff target '{}' twice",
                        agent.name(),
                        target
                    );
                }
            }
            for tool in agent.tools() {
                if !self.tools.contains(tool) {
                    return Err(SwarmError::Configuration(format!(
                        "agent '{}' is allowed unknown tool '{}'",
                        agent.name(),
                        tool
                    )));
                }
            }
        }

        let entry = match &self.entry {
            Some(name) => *index.get(name).ok_or_else(|| {
                SwarmError::Configuration(format!("unknown entry agent '{}'", name))
            })?,
            None => AgentId(0),
        };

        log::info!(
            "cloudswarm::team: assembled {} agents ({} tools), entry '{}'",
            self.agents.len(),
            self.tools.len(),
            self.agents[entry.0].name()
        );

        Ok(Team {
            agents: self.agents,
            index,
            entry,
            invoker: ToolInvoker::new(Arc::new(self.tools), self.tool_timeout),
        })
    }
}

/// A validated, immutable set of agents sharing one tool invoker.
pub struct Team {
    agents: Vec<AgentDefinition>,
    index: HashMap<String, AgentId>,
    entry: AgentId,
    invoker: ToolInvoker,
}

impl Team {
    pub fn builder() -> TeamBuilder {
        TeamBuilder::new()
    }

    /// Map a handoff target to a speaker. `None` for undeclared names.
    pub fn resolve(&self, name: &str) -> Option<Speaker> {
        if name == HUMAN {
            return Some(Speaker::Human);
        }
        self.index.get(name).copied().map(Speaker::Agent)
    }

    pub fn get(&self, id: AgentId) -> &AgentDefinition {
        &self.agents[id.0]
    }

    /// Look an agent up by name.
    pub fn agent(&self, name: &str) -> Option<&AgentDefinition> {
        self.index.get(name).map(|id| &self.agents[id.0])
    }

    pub fn entry(&self) -> AgentId {
        self.entry
    }

    pub fn entry_agent(&self) -> &AgentDefinition {
        self.get(self.entry)
    }

    /// Agent names in declaration order.
    pub fn agent_names(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn invoker(&self) -> &ToolInvoker {
        &self.invoker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudswarm::agent::{AgentBehavior, TurnContext, TurnOutput};
    use crate::cloudswarm::error::TurnError;
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl AgentBehavior for Noop {
        async fn respond(&self, _ctx: &TurnContext<'_>) -> Result<TurnOutput, TurnError> {
            Ok(TurnOutput::reply(""))
        }
    }

    fn agent(name: &str) -> AgentDefinition {
        AgentDefinition::new(name, "", Noop)
    }

    fn config_error(builder: TeamBuilder) -> String {
        match builder.build() {
            Err(SwarmError::Configuration(msg)) => msg,
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("expected a configuration error"),
        }
    }

    #[test]
    fn test_team_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Team>();
    }

    #[test]
    fn test_rejects_empty_team() {
        assert!(config_error(Team::builder()).contains("at least one agent"));
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let msg = config_error(Team::builder().with_agent(agent("a")).with_agent(agent("a")));
        assert!(msg.contains("duplicate agent name 'a'"));
    }

    #[test]
    fn test_rejects_reserved_name() {
        let msg = config_error(Team::builder().with_agent(agent(HUMAN)));
        assert!(msg.contains("reserved"));
    }

    #[test]
    fn test_rejects_unknown_handoff_target() {
        let msg = config_error(
            Team::builder().with_agent(agent("a").with_handoffs(vec!["ghost".into()])),
        );
        assert!(msg.contains("unknown agent 'ghost'"));
    }

    #[test]
    fn test_rejects_unknown_tool() {
        let msg = config_error(
            Team::builder().with_agent(agent("a").with_tools(vec!["google_search".into()])),
        );
        assert!(msg.contains("unknown tool 'google_search'"));
    }

    #[test]
    fn test_entry_agent_defaults_to_first() {
        let team = Team::builder()
            .with_agent(agent("a").with_handoffs(vec!["b".into(), HUMAN.into()]))
            .with_agent(agent("b"))
            .build()
            .unwrap();
        assert_eq!(team.entry_agent().name(), "a");
        assert_eq!(team.resolve("b"), Some(Speaker::Agent(AgentId(1))));
        assert_eq!(team.agent_names(), vec!["a", "b"]);

        let team = Team::builder()
            .with_agent(agent("a"))
            .with_agent(agent("b"))
            .with_entry_agent("b")
            .build()
            .unwrap();
        assert_eq!(team.entry_agent().name(), "b");
        assert!(config_error(Team::builder().with_agent(agent("a")).with_entry_agent("z"))
            .contains("unknown entry agent 'z'"));
    }
}
