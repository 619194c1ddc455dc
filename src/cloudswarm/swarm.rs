//! Swarm orchestration: handoff-driven turn loop with a human suspend/resume
//! boundary.
//!
//! A [`Swarm`] owns the active-speaker pointer and a [`TerminationEvaluator`];
//! the [`Team`] it drives is immutable and may be shared with other swarms
//! running concurrently. There is no fixed turn order: after every turn the
//! final message's handoff target becomes the next speaker, until a
//! termination condition fires.
//!
//! When a run stops because control was handed to the human, the result is
//! [`RunStatus::Suspended`]. The swarm keeps nothing across that boundary;
//! the caller owns the [`RunState`] and resumes whenever (and wherever) it
//! likes:
//!
//! ```rust,no_run
//! use cloudswarm::swarm::{RunStatus, Swarm};
//! use cloudswarm::termination::{HandoffTermination, TextMentionTermination};
//! # use cloudswarm::team::Team;
//! # use std::sync::Arc;
//! # async fn demo(team: Arc<Team>) {
//! let termination = HandoffTermination::human() | TextMentionTermination::new("TERMINATE");
//! let mut swarm = Swarm::new(team, termination);
//! let mut result = swarm.start("Write a script that plots a sine wave").await;
//! while let Some(state) = result.run_state() {
//!     let reply = "Looks good, save it as sine.png".to_string();
//!     result = swarm.resume(state, reply).await;
//! }
//! match &result.status {
//!     RunStatus::Terminated { reason } => println!("done: {}", reason),
//!     RunStatus::Failed { error } => eprintln!("failed: {}", error),
//!     RunStatus::Suspended { .. } => unreachable!(),
//! }
//! # }
//! ```

use crate::cloudswarm::agent::TurnContext;
use crate::cloudswarm::error::{CapabilityViolation, SwarmError, TurnError};
use crate::cloudswarm::event::{EventHandler, SwarmEvent};
use crate::cloudswarm::message::{ConversationHistory, SwarmMessage};
use crate::cloudswarm::team::{AgentId, Speaker, Team};
use crate::cloudswarm::termination::{
    TerminationCondition, TerminationContext, TerminationEvaluator, TerminationReason,
};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// The externalised snapshot needed to resume a suspended run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub history: ConversationHistory,
    /// The agent that handed control to the human and will receive the reply.
    pub pending_target: String,
}

impl RunState {
    pub fn new(history: ConversationHistory, pending_target: impl Into<String>) -> Self {
        Self {
            history,
            pending_target: pending_target.into(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Write the state to `path` as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> io::Result<()> {
        std::fs::write(path, self.to_json()?)
    }

    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&json)?)
    }
}

/// How a `start`/`resume` segment ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    /// A non-human condition fired (or the human handoff condition was
    /// configured for some other target).
    Terminated { reason: TerminationReason },
    /// Waiting on the human; resume with a message for `pending_target`.
    Suspended {
        reason: TerminationReason,
        pending_target: String,
    },
    /// The run aborted.
    Failed { error: SwarmError },
}

/// The single value returned by [`Swarm::start`] and [`Swarm::resume`].
#[derive(Debug, Clone)]
pub struct RunResult {
    pub status: RunStatus,
    /// The full history, including any earlier segments.
    pub history: ConversationHistory,
    /// Turns executed in this segment.
    pub turns: usize,
}

impl RunResult {
    /// `"terminated"`, `"suspended"` or `"failed"`.
    pub fn status_tag(&self) -> &'static str {
        match self.status {
            RunStatus::Terminated { .. } => "terminated",
            RunStatus::Suspended { .. } => "suspended",
            RunStatus::Failed { .. } => "failed",
        }
    }

    /// The termination reason tag, or the error kind for failed runs.
    pub fn reason_tag(&self) -> &str {
        match &self.status {
            RunStatus::Terminated { reason } | RunStatus::Suspended { reason, .. } => reason.tag(),
            RunStatus::Failed { error } => error.kind(),
        }
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self.status, RunStatus::Suspended { .. })
    }

    pub fn pending_target(&self) -> Option<&str> {
        match &self.status {
            RunStatus::Suspended { pending_target, .. } => Some(pending_target),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&SwarmError> {
        match &self.status {
            RunStatus::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// The newest plain or handoff message.
    pub fn last_message(&self) -> Option<&SwarmMessage> {
        self.history.last_final()
    }

    /// Convert a suspended result into the state needed to resume it.
    pub fn into_run_state(self) -> Option<RunState> {
        match self.status {
            RunStatus::Suspended { pending_target, .. } => {
                Some(RunState::new(self.history, pending_target))
            }
            _ => None,
        }
    }

    /// Like [`into_run_state`](Self::into_run_state), cloning the history.
    pub fn run_state(&self) -> Option<RunState> {
        self.pending_target()
            .map(|target| RunState::new(self.history.clone(), target))
    }
}

/// Drives one conversation at a time over a shared [`Team`].
pub struct Swarm {
    team: Arc<Team>,
    termination: TerminationEvaluator,
    active_speaker: Option<AgentId>,
    events: Option<Arc<dyn EventHandler>>,
}

impl Swarm {
    pub fn new(team: Arc<Team>, termination: TerminationEvaluator) -> Self {
        Self {
            team,
            termination,
            active_speaker: None,
            events: None,
        }
    }

    /// Receive [`SwarmEvent`]s, and let agent behaviors emit
    /// [`AgentEvent`](crate::event::AgentEvent)s, through `handler`.
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.events = Some(handler);
        self
    }

    pub fn team(&self) -> &Arc<Team> {
        &self.team
    }

    /// Name of the agent currently taking its turn; `None` between runs.
    pub fn active_speaker(&self) -> Option<&str> {
        self.active_speaker.map(|id| self.team.get(id).name())
    }

    async fn emit(&self, event: SwarmEvent) {
        if let Some(handler) = &self.events {
            handler.on_swarm_event(&event).await;
        }
    }

    /// Begin a run: seed the history with `task` addressed to the entry agent
    /// and loop until a termination condition fires or a turn fails.
    pub async fn start(&mut self, task: impl Into<String>) -> RunResult {
        let task = task.into();
        let run_id = Uuid::new_v4().to_string();
        let entry = self.team.entry();
        let entry_name = self.team.get(entry).name().to_string();

        let mut history = ConversationHistory::new();
        history.append(SwarmMessage::from_human(entry_name.clone(), task.clone()));

        log::info!(
            "cloudswarm::swarm: run {} started with '{}'",
            run_id,
            entry_name
        );
        self.emit(SwarmEvent::RunStarted {
            run_id: run_id.clone(),
            entry_agent: entry_name,
            task_preview: task.chars().take(120).collect(),
        })
        .await;

        self.run_loop(history, entry, run_id).await
    }

    /// Continue a suspended run: append `human_message` addressed to the
    /// pending target and re-enter the loop with that agent active.
    pub async fn resume(&mut self, state: RunState, human_message: impl Into<String>) -> RunResult {
        let run_id = Uuid::new_v4().to_string();
        let RunState {
            mut history,
            pending_target,
        } = state;

        let target = match self.team.resolve(&pending_target) {
            Some(Speaker::Agent(id)) => id,
            _ => {
                let error = SwarmError::UnknownAgent(pending_target);
                return self
                    .finish(run_id, RunStatus::Failed { error }, history, 0)
                    .await;
            }
        };

        history.append(SwarmMessage::from_human(
            pending_target.clone(),
            human_message,
        ));
        log::info!(
            "cloudswarm::swarm: run {} resumed with '{}' ({} messages)",
            run_id,
            pending_target,
            history.len()
        );
        self.emit(SwarmEvent::RunResumed {
            run_id: run_id.clone(),
            target: pending_target,
            history_len: history.len(),
        })
        .await;

        self.run_loop(history, target, run_id).await
    }

    async fn run_loop(
        &mut self,
        mut history: ConversationHistory,
        mut speaker: AgentId,
        run_id: String,
    ) -> RunResult {
        let team = Arc::clone(&self.team);
        self.termination.reset();
        let mut turn = 0;

        loop {
            turn += 1;
            self.active_speaker = Some(speaker);
            let agent = team.get(speaker);
            log::info!(
                "cloudswarm::swarm: turn {} -> '{}'",
                turn,
                agent.name()
            );
            self.emit(SwarmEvent::TurnStarted {
                run_id: run_id.clone(),
                agent: agent.name().to_string(),
                turn,
            })
            .await;

            let ctx = TurnContext::new(history.messages(), agent, team.invoker(), turn, &run_id)
                .with_event_handler(self.events.clone());
            let outcome = agent.behavior().respond(&ctx).await;
            let (emitted, violation) = ctx.into_parts();

            let capability = |violation| SwarmError::Capability {
                agent: agent.name().to_string(),
                turn,
                violation,
            };
            let checked = match (violation, outcome) {
                (Some(violation), _) | (None, Err(TurnError::Capability(violation))) => {
                    Err(capability(violation))
                }
                (None, Err(TurnError::Backend(message))) => Err(SwarmError::TurnFailed {
                    agent: agent.name().to_string(),
                    turn,
                    message,
                }),
                (None, Ok(output)) => match output.handoff.as_deref() {
                    Some(target) if !agent.can_hand_off_to(target) => Err(capability(
                        CapabilityViolation::Handoff(target.to_string()),
                    )),
                    _ => Ok(output),
                },
            };

            let output = match checked {
                Ok(output) => output,
                Err(error) => {
                    log::warn!("cloudswarm::swarm: {}", error);
                    self.emit(SwarmEvent::TurnFailed {
                        run_id: run_id.clone(),
                        agent: agent.name().to_string(),
                        turn,
                        error_kind: error.kind(),
                        message: error.to_string(),
                    })
                    .await;
                    return self
                        .finish(run_id, RunStatus::Failed { error }, history, turn)
                        .await;
                }
            };

            let final_message = output.into_message(agent.name());
            let target = final_message.target.clone();
            let first_new = history.len();
            let appended = emitted.len() + 1;
            history.extend(emitted);
            history.append(final_message);

            self.emit(SwarmEvent::TurnCompleted {
                run_id: run_id.clone(),
                agent: agent.name().to_string(),
                turn,
                messages_appended: appended,
                target: target.clone(),
            })
            .await;

            let fired = {
                let messages = history.messages();
                let ctx = TerminationContext::new(messages, &messages[first_new..], turn);
                self.termination.check(&ctx)
            };

            if let Some(reason) = fired {
                self.emit(SwarmEvent::TerminationFired {
                    run_id: run_id.clone(),
                    turn,
                    reason: reason.clone(),
                })
                .await;
                let status = if reason.is_human_handoff() {
                    RunStatus::Suspended {
                        reason,
                        pending_target: agent.name().to_string(),
                    }
                } else {
                    RunStatus::Terminated { reason }
                };
                return self.finish(run_id, status, history, turn).await;
            }

            let next = match target.as_deref() {
                None => {
                    let error = SwarmError::Protocol {
                        agent: agent.name().to_string(),
                        turn,
                        message: "turn ended without a handoff and no termination condition fired"
                            .to_string(),
                    };
                    log::warn!("cloudswarm::swarm: {}", error);
                    return self
                        .finish(run_id, RunStatus::Failed { error }, history, turn)
                        .await;
                }
                Some(target) => team.resolve(target),
            };

            match next {
                Some(Speaker::Agent(id)) => {
                    log::debug!(
                        "cloudswarm::swarm: '{}' hands off to '{}'",
                        agent.name(),
                        team.get(id).name()
                    );
                    self.emit(SwarmEvent::HandoffResolved {
                        run_id: run_id.clone(),
                        from: agent.name().to_string(),
                        to: team.get(id).name().to_string(),
                        turn,
                    })
                    .await;
                    speaker = id;
                }
                Some(Speaker::Human) => {
                    // No condition watches for the human, but nobody else can
                    // take the floor either.
                    let status = RunStatus::Suspended {
                        reason: TerminationReason::HumanHandoff {
                            from: agent.name().to_string(),
                        },
                        pending_target: agent.name().to_string(),
                    };
                    return self.finish(run_id, status, history, turn).await;
                }
                None => {
                    let error = SwarmError::UnknownAgent(target.unwrap_or_default());
                    return self
                        .finish(run_id, RunStatus::Failed { error }, history, turn)
                        .await;
                }
            }
        }
    }

    async fn finish(
        &mut self,
        run_id: String,
        status: RunStatus,
        history: ConversationHistory,
        turns: usize,
    ) -> RunResult {
        self.active_speaker = None;
        let event = match &status {
            RunStatus::Terminated { reason } => {
                log::info!(
                    "cloudswarm::swarm: run {} terminated after {} turns ({})",
                    run_id,
                    turns,
                    reason
                );
                SwarmEvent::RunCompleted {
                    run_id,
                    reason: reason.tag().to_string(),
                    turns,
                }
            }
            RunStatus::Suspended { pending_target, .. } => {
                log::info!(
                    "cloudswarm::swarm: run {} suspended, '{}' is waiting on the human",
                    run_id,
                    pending_target
                );
                SwarmEvent::RunSuspended {
                    run_id,
                    pending_target: pending_target.clone(),
                    turns,
                }
            }
            RunStatus::Failed { error } => {
                log::error!("cloudswarm::swarm: run {} failed: {}", run_id, error);
                SwarmEvent::RunFailed {
                    run_id,
                    error_kind: error.kind(),
                    message: error.to_string(),
                    turns,
                }
            }
        };
        self.emit(event).await;
        RunResult {
            status,
            history,
            turns,
        }
    }
}
