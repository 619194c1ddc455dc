//! Interactive coding swarm.
//!
//! Four model-backed agents build a Python script from a plain-language
//! request, handing work to one another until the result is approved:
//!
//! - **requirements_analyst**: researches the request (web search, page
//!   fetch) and writes a precise specification; can ask the user questions
//! - **python_coder**: writes the script and runs it in the working directory
//! - **code_debugger**: diagnoses failed runs and sends targeted fixes back
//! - **results_evaluator**: checks the output against the requirements and
//!   reports to the user
//!
//! Every time an agent hands off to the user the run pauses and waits for a
//! reply on stdin. An empty reply (or end of input) saves the run state and
//! exits; `--resume <file>` picks it up again later.
//!
//! # Usage
//!
//! ```text
//! coding_swarm [--resume <state.json>] [--save <state.json>]
//! ```
//!
//! # Environment Variables
//!
//! - `GEMINI_API_KEY` (or `OPENAI_API_KEY`): key for the chat endpoint (required)
//! - `SWARM_MODEL`, `SWARM_BASE_URL`, `SWARM_MAX_RETRIES`: model overrides
//! - `GOOGLE_API_KEY`, `GOOGLE_SEARCH_ENGINE_ID`: enable `google_search`
//! - `RUST_LOG`: library diagnostics, e.g. `RUST_LOG=cloudswarm=debug`

use async_trait::async_trait;
use cloudswarm::clients::openai::OpenAIClient;
use cloudswarm::config::{ModelConfig, SearchConfig, SwarmConfig};
use cloudswarm::event::{AgentEvent, EventHandler, SwarmEvent};
use cloudswarm::tool_protocol::ToolRegistry;
use cloudswarm::tool_protocols::{CodeExecutionProtocol, FileReadProtocol, WebProtocol};
use cloudswarm::tools::{CodeExecutor, FileReader, WebFetcher, WebSearch};
use cloudswarm::{
    AgentDefinition, ClientWrapper, LlmBehavior, RunResult, RunState, RunStatus, Swarm, Team,
    HUMAN,
};
use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

const ANALYST_PROMPT: &str = "You write the specification the python_coder implements. \
Gather what you need first: when the user gives you a URL, read it with get_page_content; \
when they ask for existing solutions, look for examples, algorithms and libraries with google_search. \
Never write code yourself. If something is unclear, ask the user and hand off to human. \
Otherwise state the final requirements and algorithm in detail and hand off to python_coder.";

const CODER_PROMPT: &str = "You are an expert Python programmer. Write one complete, \
well-commented script that satisfies the requirements, using google_search for reference code \
when it helps. The script must finish on its own and must not wait for user interaction: \
save plots and other artifacts to files instead of displaying them. Run it with execute_code. \
If it succeeds, report stdout and hand off to results_evaluator. If it fails, report stdout \
and stderr and hand off to code_debugger. Never hand off to the user.";

const DEBUGGER_PROMPT: &str = "You are a debugging expert. Study the script's output and any \
errors, and send the python_coder specific, targeted fixes rather than a full rewrite. \
Search the web with google_search for errors you cannot resolve on your own. If the error \
comes from unclear requirements, explain what needs clarifying and hand off to \
requirements_analyst; otherwise hand off to python_coder.";

const EVALUATOR_PROMPT: &str = "You critically evaluate a Python script's results against its \
requirements. You may inspect files the script produced with list_directory and read_file. \
If every requirement is met, summarise the results and hand off to human. If not, explain \
which requirement failed and why, and hand off to requirements_analyst for a revised \
specification.";

/// Prints tool traffic and run transitions as they happen.
struct ConsolePrinter;

#[async_trait]
impl EventHandler for ConsolePrinter {
    async fn on_swarm_event(&self, event: &SwarmEvent) {
        match event {
            SwarmEvent::ToolCallStarted {
                agent,
                tool_name,
                parameters,
                ..
            } => {
                let args = parameters.to_string();
                let preview: String = args.chars().take(200).collect();
                println!("  [{}] -> {}({})", agent, tool_name, preview);
            }
            SwarmEvent::ToolCallCompleted {
                tool_name,
                success,
                error,
                duration_ms,
                ..
            } => {
                if *success {
                    println!("  [{}] ok in {} ms", tool_name, duration_ms);
                } else {
                    println!(
                        "  [{}] failed in {} ms: {}",
                        tool_name,
                        duration_ms,
                        error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
            SwarmEvent::HandoffResolved { from, to, .. } => {
                println!("  ({} hands off to {})", from, to);
            }
            SwarmEvent::TerminationFired { reason, .. } => {
                println!("  (stop: {})", reason);
            }
            _ => {}
        }
    }

    async fn on_agent_event(&self, event: &AgentEvent) {
        if let AgentEvent::ToolMaxIterationsReached {
            agent_name,
            max_iterations,
        } = event
        {
            println!(
                "  [{}] reached {} tool calls, asking for a final answer",
                agent_name, max_iterations
            );
        }
    }
}

struct Args {
    resume: Option<PathBuf>,
    save: PathBuf,
}

fn parse_args() -> Result<Args, String> {
    parse_args_from(std::env::args().skip(1))
}

fn parse_args_from(argv: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut args = Args {
        resume: None,
        save: PathBuf::from("swarm_state.json"),
    };
    let mut iter = argv.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--resume" => {
                args.resume = Some(iter.next().ok_or("--resume needs a file")?.into());
            }
            "--save" => {
                args.save = iter.next().ok_or("--save needs a file")?.into();
            }
            other => return Err(format!("unknown argument '{}'", other)),
        }
    }
    Ok(args)
}

async fn build_team(
    config: &SwarmConfig,
    client: Arc<dyn ClientWrapper>,
) -> Result<Team, Box<dyn Error + Send + Sync>> {
    tokio::fs::create_dir_all(&config.work_dir).await?;

    let executor = CodeExecutor::new(&config.work_dir).with_timeout(config.tool_timeout);
    let search = WebSearch::new(SearchConfig::from_env());
    if !search.config().has_credentials() {
        log::warn!("GOOGLE_API_KEY / GOOGLE_SEARCH_ENGINE_ID not set; google_search will fail");
    }

    let mut registry = ToolRegistry::new();
    registry
        .discover(Arc::new(CodeExecutionProtocol::new(Arc::new(executor))))
        .await?;
    registry
        .discover(Arc::new(
            WebProtocol::new(WebFetcher::new()).with_search(Arc::new(search)),
        ))
        .await?;
    registry
        .discover(Arc::new(FileReadProtocol::new(Arc::new(FileReader::new(
            &config.work_dir,
        )))))
        .await?;

    let behavior = |prompt: &str| {
        LlmBehavior::new(client.clone(), prompt)
            .with_max_tool_iterations(config.max_tool_iterations)
    };

    let team = Team::builder()
        .with_agent(
            AgentDefinition::new(
                "requirements_analyst",
                "Turns the user's request into a detailed specification.",
                behavior(ANALYST_PROMPT),
            )
            .with_tools(vec!["get_page_content".into(), "google_search".into()])
            .with_handoffs(vec!["python_coder".into(), HUMAN.into()]),
        )
        .with_agent(
            AgentDefinition::new(
                "python_coder",
                "Writes and runs the Python script.",
                behavior(CODER_PROMPT),
            )
            .with_tools(vec!["execute_code".into(), "google_search".into()])
            .with_handoffs(vec!["results_evaluator".into(), "code_debugger".into()]),
        )
        .with_agent(
            AgentDefinition::new(
                "code_debugger",
                "Diagnoses failed runs and proposes fixes.",
                behavior(DEBUGGER_PROMPT),
            )
            .with_tools(vec!["google_search".into()])
            .with_handoffs(vec!["python_coder".into(), "requirements_analyst".into()]),
        )
        .with_agent(
            AgentDefinition::new(
                "results_evaluator",
                "Checks the results against the requirements.",
                behavior(EVALUATOR_PROMPT),
            )
            .with_tools(vec!["list_directory".into(), "read_file".into()])
            .with_handoffs(vec![HUMAN.into(), "requirements_analyst".into()]),
        )
        .with_tool_timeout(config.tool_timeout)
        .with_tools(registry)
        .build()?;
    Ok(team)
}

/// Print every final message appended since `printed`.
fn print_new_messages(result: &RunResult, printed: usize) -> usize {
    for message in result.history.messages().iter().skip(printed) {
        if message.is_final() && message.source != HUMAN {
            println!("---------- {} ----------", message.source);
            println!("{}", message.content);
        }
    }
    result.history.len()
}

async fn prompt_line(
    lines: &mut Lines<BufReader<Stdin>>,
    prompt: &str,
) -> Result<Option<String>, Box<dyn Error + Send + Sync>> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    let line = lines.next_line().await?;
    Ok(line
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    cloudswarm::init_logger();

    let args = parse_args()?;
    let model = ModelConfig::from_env();
    if model.api_key.is_empty() {
        return Err("set GEMINI_API_KEY (or OPENAI_API_KEY) to talk to the model".into());
    }
    let config = SwarmConfig::default();
    let client: Arc<dyn ClientWrapper> = Arc::new(OpenAIClient::from_config(&model)?);

    let team = Arc::new(build_team(&config, client).await?);
    let mut swarm = Swarm::new(Arc::clone(&team), config.termination())
        .with_event_handler(Arc::new(ConsolePrinter));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let (mut result, mut printed) = match &args.resume {
        Some(path) => {
            let state = RunState::load(path)?;
            let printed = state.history.len();
            println!(
                "Resuming with {} ({} messages so far)",
                state.pending_target, printed
            );
            match prompt_line(&mut lines, "User: ").await? {
                Some(reply) => (swarm.resume(state, reply).await, printed),
                None => return Ok(()),
            }
        }
        None => match prompt_line(&mut lines, "What is your task? \nUser: ").await? {
            Some(task) => (swarm.start(task).await, 0),
            None => return Ok(()),
        },
    };

    loop {
        printed = print_new_messages(&result, printed);
        if let Some(state) = result.run_state() {
            match prompt_line(&mut lines, "User: ").await? {
                Some(reply) => {
                    result = swarm.resume(state, reply).await;
                    continue;
                }
                None => {
                    state.save(&args.save)?;
                    println!("Run state saved to {}", args.save.display());
                    return Ok(());
                }
            }
        }

        return report_outcome(result);
    }
}

/// Print how a finished run ended; a failed run becomes `main`'s error.
fn report_outcome(result: RunResult) -> Result<(), Box<dyn Error + Send + Sync>> {
    match result.status {
        RunStatus::Failed { error } => {
            eprintln!("Run failed: {}", error);
            Err(error.into())
        }
        RunStatus::Terminated { reason } => {
            println!("Done ({}) after {} turns.", reason, result.turns);
            Ok(())
        }
        RunStatus::Suspended { .. } => Ok(()),
    }
}
