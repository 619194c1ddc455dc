//! Termination conditions and their OR-composition.
//!
//! After every turn the [`Swarm`](crate::swarm::Swarm) asks its
//! [`TerminationEvaluator`] whether the run should stop. The evaluator checks
//! every condition (so counting conditions advance uniformly) and reports the
//! first one that fired, in declaration order. That order is the tie-break
//! when one message satisfies several conditions at once.
//!
//! ```
//! use cloudswarm::termination::{
//!     HandoffTermination, MaxTurnsTermination, TerminationCondition, TerminationContext,
//!     TextMentionTermination,
//! };
//! use cloudswarm::message::SwarmMessage;
//!
//! let mut termination = HandoffTermination::human()
//!     | TextMentionTermination::new("TERMINATE")
//!     | MaxTurnsTermination::new(25);
//!
//! // Matches both the handoff and the sentinel: the handoff was declared first.
//! let history = vec![SwarmMessage::handoff("evaluator", "human", "All good. TERMINATE")];
//! let ctx = TerminationContext::new(&history, &history, 1);
//! assert_eq!(termination.check(&ctx).unwrap().tag(), "human-handoff");
//! ```

use crate::cloudswarm::message::{SwarmMessage, HUMAN};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// What a condition gets to look at after a turn.
#[derive(Debug, Clone, Copy)]
pub struct TerminationContext<'a> {
    /// The full history, including the turn that just completed.
    pub history: &'a [SwarmMessage],
    /// The messages appended by that turn, in emission order.
    pub turn_messages: &'a [SwarmMessage],
    /// 1-based turn counter within the current start/resume segment.
    pub turn: usize,
}

impl<'a> TerminationContext<'a> {
    pub fn new(history: &'a [SwarmMessage], turn_messages: &'a [SwarmMessage], turn: usize) -> Self {
        Self {
            history,
            turn_messages,
            turn,
        }
    }

    /// The final (plain or handoff) message of the turn, falling back to the
    /// newest history entry.
    pub fn latest(&self) -> Option<&'a SwarmMessage> {
        self.turn_messages
            .iter()
            .rev()
            .find(|m| m.is_final())
            .or_else(|| self.history.last())
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminationReason {
    /// The latest message handed control to the human.
    HumanHandoff { from: String },
    /// The latest message contained the completion token.
    Sentinel { text: String },
    /// The turn guard tripped.
    MaxTurns { turns: usize },
    /// The message guard tripped.
    MaxMessages { messages: usize },
    /// Raised by an application defined condition.
    Custom { tag: String, detail: String },
}

impl TerminationReason {
    /// Stable tag callers can match on.
    pub fn tag(&self) -> &str {
        match self {
            TerminationReason::HumanHandoff { .. } => "human-handoff",
            TerminationReason::Sentinel { .. } => "sentinel",
            TerminationReason::MaxTurns { .. } => "max-turns",
            TerminationReason::MaxMessages { .. } => "max-messages",
            TerminationReason::Custom { tag, .. } => tag,
        }
    }

    pub fn is_human_handoff(&self) -> bool {
        matches!(self, TerminationReason::HumanHandoff { .. })
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::HumanHandoff { from } => {
                write!(f, "human-handoff: '{}' is waiting on the human", from)
            }
            TerminationReason::Sentinel { text } => write!(f, "sentinel: '{}' mentioned", text),
            TerminationReason::MaxTurns { turns } => write!(f, "max-turns: {} turns", turns),
            TerminationReason::MaxMessages { messages } => {
                write!(f, "max-messages: {} messages", messages)
            }
            TerminationReason::Custom { tag, detail } => write!(f, "{}: {}", tag, detail),
        }
    }
}

/// A predicate over the conversation, checked after every turn.
///
/// Conditions may carry counters; `reset` is called at the start of every
/// `start`/`resume` segment.
pub trait TerminationCondition: Send + Sync {
    fn check(&mut self, ctx: &TerminationContext<'_>) -> Option<TerminationReason>;

    fn reset(&mut self) {}
}

/// Fires when the latest message hands off to `target` (the human by default).
#[derive(Debug, Clone)]
pub struct HandoffTermination {
    target: String,
}

impl HandoffTermination {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn human() -> Self {
        Self::new(HUMAN)
    }
}

impl Default for HandoffTermination {
    fn default() -> Self {
        Self::human()
    }
}

impl TerminationCondition for HandoffTermination {
    fn check(&mut self, ctx: &TerminationContext<'_>) -> Option<TerminationReason> {
        let latest = ctx.latest()?;
        if latest.target.as_deref() != Some(self.target.as_str()) {
            return None;
        }
        Some(if self.target == HUMAN {
            TerminationReason::HumanHandoff {
                from: latest.source.clone(),
            }
        } else {
            TerminationReason::Custom {
                tag: "handoff".to_string(),
                detail: format!("{} -> {}", latest.source, self.target),
            }
        })
    }
}

/// Fires when the latest message's content contains `text`.
#[derive(Debug, Clone)]
pub struct TextMentionTermination {
    text: String,
    sources: Option<Vec<String>>,
}

impl TextMentionTermination {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sources: None,
        }
    }

    /// Only honour mentions by these participants.
    pub fn from_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = Some(sources);
        self
    }
}

impl TerminationCondition for TextMentionTermination {
    fn check(&mut self, ctx: &TerminationContext<'_>) -> Option<TerminationReason> {
        let latest = ctx.latest()?;
        if let Some(sources) = &self.sources {
            if !sources.iter().any(|s| *s == latest.source) {
                return None;
            }
        }
        latest
            .content
            .contains(&self.text)
            .then(|| TerminationReason::Sentinel {
                text: self.text.clone(),
            })
    }
}

/// Fires once `max` turns have run in the current segment.
#[derive(Debug, Clone)]
pub struct MaxTurnsTermination {
    max: usize,
    turns: usize,
}

impl MaxTurnsTermination {
    pub fn new(max: usize) -> Self {
        Self { max, turns: 0 }
    }
}

impl TerminationCondition for MaxTurnsTermination {
    fn check(&mut self, _ctx: &TerminationContext<'_>) -> Option<TerminationReason> {
        self.turns += 1;
        (self.turns >= self.max).then_some(TerminationReason::MaxTurns { turns: self.turns })
    }

    fn reset(&mut self) {
        self.turns = 0;
    }
}

/// Fires once `max` messages have been appended by turns in the current segment.
#[derive(Debug, Clone)]
pub struct MaxMessageTermination {
    max: usize,
    seen: usize,
}

impl MaxMessageTermination {
    pub fn new(max: usize) -> Self {
        Self { max, seen: 0 }
    }
}

impl TerminationCondition for MaxMessageTermination {
    fn check(&mut self, ctx: &TerminationContext<'_>) -> Option<TerminationReason> {
        self.seen += ctx.turn_messages.len();
        (self.seen >= self.max).then_some(TerminationReason::MaxMessages {
            messages: self.seen,
        })
    }

    fn reset(&mut self) {
        self.seen = 0;
    }
}

type Predicate = Box<dyn Fn(&TerminationContext<'_>) -> Option<String> + Send + Sync>;

/// Wraps a closure as a condition; a returned string becomes the
/// [`TerminationReason::Custom`] detail.
pub struct FunctionTermination {
    tag: String,
    predicate: Predicate,
}

impl FunctionTermination {
    pub fn new(
        tag: impl Into<String>,
        predicate: impl Fn(&TerminationContext<'_>) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            tag: tag.into(),
            predicate: Box::new(predicate),
        }
    }
}

impl TerminationCondition for FunctionTermination {
    fn check(&mut self, ctx: &TerminationContext<'_>) -> Option<TerminationReason> {
        (self.predicate)(ctx).map(|detail| TerminationReason::Custom {
            tag: self.tag.clone(),
            detail,
        })
    }
}

/// OR-composition of conditions.
#[derive(Default)]
pub struct TerminationEvaluator {
    conditions: Vec<Box<dyn TerminationCondition>>,
}

impl TerminationEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a condition; earlier conditions win ties.
    pub fn with_condition(mut self, condition: impl TerminationCondition + 'static) -> Self {
        self.push(condition);
        self
    }

    pub fn push(&mut self, condition: impl TerminationCondition + 'static) {
        self.conditions.push(Box::new(condition));
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

impl TerminationCondition for TerminationEvaluator {
    fn check(&mut self, ctx: &TerminationContext<'_>) -> Option<TerminationReason> {
        let mut fired = None;
        for condition in self.conditions.iter_mut() {
            let reason = condition.check(ctx);
            if fired.is_none() {
                fired = reason;
            }
        }
        if let Some(reason) = &fired {
            log::debug!("cloudswarm::termination: turn {} fired {}", ctx.turn, reason);
        }
        fired
    }

    fn reset(&mut self) {
        for condition in self.conditions.iter_mut() {
            condition.reset();
        }
    }
}

impl<R: TerminationCondition + 'static> BitOr<R> for TerminationEvaluator {
    type Output = TerminationEvaluator;

    fn bitor(self, rhs: R) -> TerminationEvaluator {
        self.with_condition(rhs)
    }
}

macro_rules! impl_bitor {
    ($($condition:ty),* $(,)?) => {
        $(
            impl<R: TerminationCondition + 'static> BitOr<R> for $condition {
                type Output = TerminationEvaluator;

                fn bitor(self, rhs: R) -> TerminationEvaluator {
                    TerminationEvaluator::new().with_condition(self).with_condition(rhs)
                }
            }
        )*
    };
}

impl_bitor!(
    HandoffTermination,
    TextMentionTermination,
    MaxTurnsTermination,
    MaxMessageTermination,
    FunctionTermination,
);

#[cfg(test)]
mod tests {
    use super::*;

    fn check_one(
        condition: &mut dyn TerminationCondition,
        msg: SwarmMessage,
    ) -> Option<TerminationReason> {
        let history = vec![msg];
        condition.check(&TerminationContext::new(&history, &history, 1))
    }

    #[test]
    fn test_handoff_to_human() {
        let mut cond = HandoffTermination::human();
        assert_eq!(
            check_one(&mut cond, SwarmMessage::handoff("analyst", HUMAN, "questions?")),
            Some(TerminationReason::HumanHandoff {
                from: "analyst".into()
            })
        );
        assert_eq!(
            check_one(&mut cond, SwarmMessage::handoff("analyst", "coder", "go")),
            None
        );
    }

    #[test]
    fn test_text_mention_with_source_filter() {
        let mut cond =
            TextMentionTermination::new("TERMINATE").from_sources(vec!["evaluator".into()]);
        assert!(check_one(&mut cond, SwarmMessage::plain("coder", "TERMINATE")).is_none());
        assert_eq!(
            check_one(&mut cond, SwarmMessage::plain("evaluator", "done, TERMINATE"))
                .unwrap()
                .tag(),
            "sentinel"
        );
    }

    #[test]
    fn test_latest_ignores_tool_traffic() {
        let turn = vec![
            SwarmMessage::handoff("coder", "debugger", "please fix"),
            SwarmMessage::tool_result("coder", "run", Some(serde_json::json!("TERMINATE")), None),
        ];
        let mut cond = TextMentionTermination::new("TERMINATE");
        assert!(cond
            .check(&TerminationContext::new(&turn, &turn, 1))
            .is_none());
    }

    #[test]
    fn test_max_turns_counts_and_resets() {
        let mut cond = MaxTurnsTermination::new(2);
        let msg = || SwarmMessage::handoff("a", "b", "x");
        assert!(check_one(&mut cond, msg()).is_none());
        assert_eq!(
            check_one(&mut cond, msg()),
            Some(TerminationReason::MaxTurns { turns: 2 })
        );
        cond.reset();
        assert!(check_one(&mut cond, msg()).is_none());
    }

    #[test]
    fn test_max_messages_counts_turn_messages() {
        let mut cond = MaxMessageTermination::new(3);
        let turn = vec![
            SwarmMessage::tool_call("a", "t", serde_json::json!({})),
            SwarmMessage::handoff("a", "b", "x"),
        ];
        let ctx = TerminationContext::new(&turn, &turn, 1);
        assert!(cond.check(&ctx).is_none());
        assert_eq!(
            cond.check(&ctx).unwrap().tag(),
            "max-messages"
        );
    }

    #[test]
    fn test_evaluator_declaration_order_wins() {
        let msg = SwarmMessage::handoff("evaluator", HUMAN, "TERMINATE");

        let mut handoff_first = HandoffTermination::human() | TextMentionTermination::new("TERMINATE");
        assert_eq!(check_one(&mut handoff_first, msg.clone()).unwrap().tag(), "human-handoff");

        let mut sentinel_first = TextMentionTermination::new("TERMINATE") | HandoffTermination::human();
        assert_eq!(check_one(&mut sentinel_first, msg).unwrap().tag(), "sentinel");
    }

    #[test]
    fn test_evaluator_advances_every_counter() {
        let mut eval = TextMentionTermination::new("STOP") | MaxTurnsTermination::new(2);
        assert_eq!(
            check_one(&mut eval, SwarmMessage::plain("a", "STOP")).unwrap().tag(),
            "sentinel"
        );
        // The turn guard counted the first turn even though the sentinel won.
        assert_eq!(
            check_one(&mut eval, SwarmMessage::plain("a", "go on")).unwrap().tag(),
            "max-turns"
        );
    }

    #[test]
    fn test_function_termination() {
        let mut cond = FunctionTermination::new("too-long", |ctx| {
            (ctx.history.len() > 1).then(|| format!("{} messages", ctx.history.len()))
        });
        assert!(check_one(&mut cond, SwarmMessage::plain("a", "x")).is_none());
        let history = vec![SwarmMessage::plain("a", "x"), SwarmMessage::plain("b", "y")];
        let reason = cond
            .check(&TerminationContext::new(&history, &history[1..], 2))
            .unwrap();
        assert_eq!(reason.tag(), "too-long");
    }

    #[test]
    fn test_reason_serializes_with_kind() {
        let json = serde_json::to_value(TerminationReason::Sentinel {
            text: "TERMINATE".into(),
        })
        .unwrap();
        assert_eq!(json["kind"], "sentinel");
    }
}
