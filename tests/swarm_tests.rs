use async_trait::async_trait;
use cloudswarm::agent::{AgentBehavior, AgentDefinition, TurnContext, TurnOutput};
use cloudswarm::error::{CapabilityViolation, SwarmError, TurnError};
use cloudswarm::event::{EventHandler, SwarmEvent};
use cloudswarm::message::{MessageKind, HUMAN};
use cloudswarm::swarm::{RunState, RunStatus, Swarm};
use cloudswarm::team::Team;
use cloudswarm::termination::{
    HandoffTermination, MaxTurnsTermination, TerminationEvaluator, TextMentionTermination,
};
use cloudswarm::tool_protocol::{ToolMetadata, ToolRegistry, ToolResult};
use cloudswarm::tool_protocols::CustomToolProtocol;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One scripted turn.
#[derive(Clone)]
enum Step {
    Say(TurnOutput),
    /// Call a tool, propagate capability errors, then say something.
    CallThen(&'static str, TurnOutput),
    /// Call a tool and ignore whatever happens.
    CallAndSwallow(&'static str, TurnOutput),
    /// Call a tool; hand off to the first target on failure, the second on success.
    Branch(&'static str, &'static str, &'static str),
}

struct Script {
    steps: Mutex<VecDeque<Step>>,
}

impl Script {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
        }
    }
}

#[async_trait]
impl AgentBehavior for Script {
    async fn respond(&self, ctx: &TurnContext<'_>) -> Result<TurnOutput, TurnError> {
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Say(output)) => Ok(output),
            Some(Step::CallThen(tool, output)) => {
                let _ = ctx
                    .call_tool(tool, serde_json::json!({"code": "print(1)"}))
                    .await?;
                Ok(output)
            }
            Some(Step::CallAndSwallow(tool, output)) => {
                let _ = ctx.call_tool(tool, serde_json::json!({})).await;
                Ok(output)
            }
            Some(Step::Branch(tool, on_failure, on_success)) => {
                match ctx.call_tool(tool, serde_json::json!({})).await? {
                    Ok(result) => Ok(TurnOutput::handoff(on_success, result.output.to_string())),
                    Err(err) => Ok(TurnOutput::handoff(on_failure, err.to_string())),
                }
            }
            None => Err(TurnError::Backend(format!(
                "{} has nothing left to say",
                ctx.agent_name()
            ))),
        }
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<SwarmEvent>>,
}

#[async_trait]
impl EventHandler for Recorder {
    async fn on_swarm_event(&self, event: &SwarmEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

impl Recorder {
    fn turn_log(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                SwarmEvent::TurnStarted { agent, .. } => Some(format!("start:{}", agent)),
                SwarmEvent::TurnCompleted { agent, .. } => Some(format!("done:{}", agent)),
                SwarmEvent::TurnFailed { agent, .. } => Some(format!("fail:{}", agent)),
                _ => None,
            })
            .collect()
    }
}

async fn registry() -> ToolRegistry {
    let protocol = CustomToolProtocol::new();
    protocol
        .register_tool(
            ToolMetadata::new("execute_code", "Runs code"),
            Arc::new(|params| {
                Ok(ToolResult::success(
                    serde_json::json!({"stdout": "1", "params": params}),
                ))
            }),
        )
        .await;
    protocol
        .register_tool(
            ToolMetadata::new("flaky", "Always fails"),
            Arc::new(|_| Ok(ToolResult::failure("connection reset".into()).retryable())),
        )
        .await;
    let mut registry = ToolRegistry::new();
    registry.discover(Arc::new(protocol)).await.unwrap();
    registry
}

fn standard_termination() -> TerminationEvaluator {
    HandoffTermination::human() | TextMentionTermination::new("TERMINATE")
}

async fn analyst_and_coder(analyst: Vec<Step>, coder: Vec<Step>) -> Arc<Team> {
    let team = Team::builder()
        .with_agent(
            AgentDefinition::new("analyst", "Writes requirements", Script::new(analyst))
                .with_handoffs(vec!["coder".into(), HUMAN.into()]),
        )
        .with_agent(
            AgentDefinition::new("coder", "Writes code", Script::new(coder))
                .with_handoffs(vec!["analyst".into()]),
        )
        .with_tools(registry().await)
        .build()
        .unwrap();
    Arc::new(team)
}

#[tokio::test]
async fn test_handoff_then_sentinel_terminates() {
    let team = analyst_and_coder(
        vec![Step::Say(TurnOutput::handoff("coder", "Print 1."))],
        vec![Step::Say(TurnOutput::reply("Printed it. TERMINATE"))],
    )
    .await;
    let mut swarm = Swarm::new(team, standard_termination());

    let result = swarm.start("print the number one").await;

    assert_eq!(result.status_tag(), "terminated");
    assert_eq!(result.reason_tag(), "sentinel");
    assert_eq!(result.turns, 2);
    let sources: Vec<_> = result.history.iter().map(|m| m.source.as_str()).collect();
    assert_eq!(sources, vec![HUMAN, "analyst", "coder"]);
    assert_eq!(result.history.messages()[0].target.as_deref(), Some("analyst"));
}

#[tokio::test]
async fn test_human_handoff_suspends_and_resume_continues() {
    let team = analyst_and_coder(
        vec![
            Step::Say(TurnOutput::handoff(HUMAN, "Which Python version?")),
            Step::Say(TurnOutput::handoff("coder", "Target 3.12.")),
        ],
        vec![Step::Say(TurnOutput::reply("Done. TERMINATE"))],
    )
    .await;
    let recorder = Arc::new(Recorder::default());
    let mut swarm = Swarm::new(team, standard_termination()).with_event_handler(recorder.clone());

    let first = swarm.start("write a script").await;
    assert_eq!(first.status_tag(), "suspended");
    assert_eq!(first.reason_tag(), "human-handoff");
    assert_eq!(first.pending_target(), Some("analyst"));
    assert!(swarm.active_speaker().is_none());

    let before = first.history.clone();
    let state = first.into_run_state().unwrap();
    let second = swarm.resume(state, "3.12 please").await;

    assert_eq!(second.status_tag(), "terminated");
    assert_eq!(second.reason_tag(), "sentinel");
    assert_eq!(second.turns, 2);

    // earlier turns + human reply + later turns, nothing dropped or duplicated
    let history = second.history.messages();
    assert_eq!(history.len(), before.len() + 3);
    assert_eq!(&history[..before.len()], before.messages());
    let reply = &history[before.len()];
    assert_eq!(reply.source, HUMAN);
    assert_eq!(reply.target.as_deref(), Some("analyst"));
    assert_eq!(reply.content, "3.12 please");

    assert_eq!(
        recorder.turn_log(),
        vec![
            "start:analyst",
            "done:analyst",
            "start:analyst",
            "done:analyst",
            "start:coder",
            "done:coder",
        ]
    );
}

#[tokio::test]
async fn test_disallowed_tool_fails_run_without_touching_history() {
    let team = analyst_and_coder(
        vec![Step::Say(TurnOutput::handoff("coder", "Run it."))],
        vec![Step::CallThen("execute_code", TurnOutput::reply("TERMINATE"))],
    )
    .await;
    let mut swarm = Swarm::new(team, standard_termination());

    let result = swarm.start("task").await;

    assert_eq!(result.status_tag(), "failed");
    assert_eq!(result.reason_tag(), "CapabilityError");
    match result.error() {
        Some(SwarmError::Capability {
            agent,
            turn,
            violation,
        }) => {
            assert_eq!(agent, "coder");
            assert_eq!(*turn, 2);
            assert_eq!(violation, &CapabilityViolation::Tool("execute_code".into()));
        }
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(result.history.len(), 2);
    assert!(result.history.iter().all(|m| m.source != "coder"));
}

#[tokio::test]
async fn test_swallowed_capability_error_still_fails_the_turn() {
    let team = analyst_and_coder(
        vec![Step::Say(TurnOutput::handoff("coder", "Run it."))],
        vec![Step::CallAndSwallow("execute_code", TurnOutput::reply("TERMINATE"))],
    )
    .await;
    let mut swarm = Swarm::new(team, standard_termination());

    let result = swarm.start("task").await;

    assert_eq!(result.reason_tag(), "CapabilityError");
    assert_eq!(result.history.len(), 2);
}

#[tokio::test]
async fn test_missing_handoff_is_a_protocol_error() {
    let team = analyst_and_coder(vec![Step::Say(TurnOutput::reply("Hmm."))], vec![]).await;
    let mut swarm = Swarm::new(team, standard_termination());

    let result = swarm.start("task").await;

    assert_eq!(result.status_tag(), "failed");
    assert_eq!(result.reason_tag(), "ProtocolError");
    let error = result.error().unwrap();
    assert_eq!(error.agent(), Some("analyst"));
    assert_eq!(error.turn(), Some(1));
}

#[tokio::test]
async fn test_backend_failure_is_a_turn_error() {
    let team = analyst_and_coder(vec![], vec![]).await;
    let mut swarm = Swarm::new(team, standard_termination());

    let result = swarm.start("task").await;

    assert_eq!(result.reason_tag(), "TurnError");
    assert_eq!(result.history.len(), 1);
}

#[tokio::test]
async fn test_tool_failure_is_handled_by_the_agent() {
    let team = Team::builder()
        .with_agent(
            AgentDefinition::new(
                "coder",
                "",
                Script::new(vec![Step::Branch("flaky", "debugger", "evaluator")]),
            )
            .with_tools(vec!["flaky".into()])
            .with_handoffs(vec!["debugger".into(), "evaluator".into()]),
        )
        .with_agent(AgentDefinition::new(
            "debugger",
            "",
            Script::new(vec![Step::Say(TurnOutput::reply("Network issue. TERMINATE"))]),
        ))
        .with_agent(AgentDefinition::new("evaluator", "", Script::new(vec![])))
        .with_tools(registry().await)
        .build()
        .unwrap();
    let mut swarm = Swarm::new(Arc::new(team), standard_termination());

    let result = swarm.start("fetch the page").await;

    assert_eq!(result.reason_tag(), "sentinel");
    let kinds: Vec<_> = result.history.iter().map(|m| m.kind).collect();
    assert_eq!(
        kinds,
        vec![
            MessageKind::Handoff,
            MessageKind::ToolCall,
            MessageKind::ToolResult,
            MessageKind::Handoff,
            MessageKind::Plain,
        ]
    );
    let handoff = &result.history.messages()[3];
    assert_eq!(handoff.target.as_deref(), Some("debugger"));
    assert!(handoff.content.contains("connection reset"));
}

#[tokio::test]
async fn test_turn_guard_stops_ping_pong() {
    let pings = vec![Step::Say(TurnOutput::handoff("pong", "ping")); 10];
    let pongs = vec![Step::Say(TurnOutput::handoff("ping", "pong")); 10];
    let team = Team::builder()
        .with_agent(
            AgentDefinition::new("ping", "", Script::new(pings)).with_handoffs(vec!["pong".into()]),
        )
        .with_agent(
            AgentDefinition::new("pong", "", Script::new(pongs)).with_handoffs(vec!["ping".into()]),
        )
        .build()
        .unwrap();
    let mut swarm = Swarm::new(
        Arc::new(team),
        standard_termination() | MaxTurnsTermination::new(4),
    );

    let result = swarm.start("go").await;

    assert_eq!(result.reason_tag(), "max-turns");
    assert_eq!(result.turns, 4);
    assert_eq!(result.history.len(), 5);
}

#[tokio::test]
async fn test_next_speaker_is_always_the_handoff_target() {
    let team = analyst_and_coder(
        vec![
            Step::Say(TurnOutput::handoff("coder", "one")),
            Step::Say(TurnOutput::handoff("coder", "two")),
        ],
        vec![
            Step::Say(TurnOutput::handoff("analyst", "back")),
            Step::Say(TurnOutput::reply("TERMINATE")),
        ],
    )
    .await;
    let recorder = Arc::new(Recorder::default());
    let mut swarm = Swarm::new(team, standard_termination()).with_event_handler(recorder.clone());

    let result = swarm.start("task").await;
    assert_eq!(result.turns, 4);

    let started: Vec<String> = recorder
        .events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            SwarmEvent::TurnStarted { agent, .. } => Some(agent.clone()),
            _ => None,
        })
        .collect();
    let finals: Vec<_> = result.history.iter().filter(|m| m.is_final()).collect();
    for (i, speaker) in started.iter().enumerate() {
        // the message that preceded turn i named its speaker
        assert_eq!(finals[i].target.as_deref(), Some(speaker.as_str()));
    }

    // turns never interleave
    let log = recorder.turn_log();
    for pair in log.chunks(2) {
        assert!(pair[0].starts_with("start:"));
        assert_eq!(pair[0].trim_start_matches("start:"), pair[1].trim_start_matches("done:"));
    }
}

#[tokio::test]
async fn test_history_is_append_only_across_segments() {
    let team = analyst_and_coder(
        vec![
            Step::Say(TurnOutput::handoff(HUMAN, "first question")),
            Step::Say(TurnOutput::handoff(HUMAN, "second question")),
            Step::Say(TurnOutput::handoff("coder", "ok")),
        ],
        vec![Step::Say(TurnOutput::reply("TERMINATE"))],
    )
    .await;
    let mut swarm = Swarm::new(team, standard_termination());

    let mut result = swarm.start("task").await;
    let mut snapshots = vec![result.history.clone()];
    while let Some(state) = result.run_state() {
        result = swarm.resume(state, "answer").await;
        snapshots.push(result.history.clone());
    }

    assert_eq!(result.reason_tag(), "sentinel");
    for pair in snapshots.windows(2) {
        assert!(pair[1].len() > pair[0].len());
        assert_eq!(&pair[1].messages()[..pair[0].len()], pair[0].messages());
    }
}

#[tokio::test]
async fn test_run_state_survives_a_process_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let first_team = analyst_and_coder(
        vec![Step::Say(TurnOutput::handoff(HUMAN, "Which file?"))],
        vec![],
    )
    .await;
    let result = Swarm::new(first_team, standard_termination())
        .start("task")
        .await;
    result.into_run_state().unwrap().save(&path).unwrap();

    // a fresh team and swarm, as a new process would build them
    let second_team = analyst_and_coder(
        vec![Step::Say(TurnOutput::handoff("coder", "data.csv it is"))],
        vec![Step::Say(TurnOutput::reply("TERMINATE"))],
    )
    .await;
    let state = RunState::load(&path).unwrap();
    assert_eq!(state.pending_target, "analyst");
    let mut swarm = Swarm::new(second_team, standard_termination());
    let result = swarm.resume(state, "data.csv").await;

    assert!(matches!(result.status, RunStatus::Terminated { .. }));
    assert_eq!(result.history.len(), 5);
    assert_eq!(result.history.messages()[1].content, "Which file?");
}

#[tokio::test]
async fn test_concurrent_runs_share_a_team() {
    let team = Team::builder()
        .with_agent(AgentDefinition::new("solo", "", Echo))
        .build()
        .unwrap();
    let team = Arc::new(team);

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let team = Arc::clone(&team);
            tokio::spawn(async move {
                let mut swarm = Swarm::new(team, standard_termination());
                swarm.start(format!("task {}", i)).await
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.unwrap();
        assert_eq!(result.reason_tag(), "sentinel");
        assert_eq!(result.history.messages()[0].content, format!("task {}", i));
        assert_eq!(
            result.history.messages()[1].content,
            format!("task {} TERMINATE", i)
        );
    }
}

/// Repeats the task back with the sentinel appended.
struct Echo;

#[async_trait]
impl AgentBehavior for Echo {
    async fn respond(&self, ctx: &TurnContext<'_>) -> Result<TurnOutput, TurnError> {
        let task = ctx.history()[0].content.clone();
        Ok(TurnOutput::reply(format!("{} TERMINATE", task)))
    }
}
