//! Model-backed agent behavior.
//!
//! [`LlmBehavior`] adapts any [`ClientWrapper`] into an [`AgentBehavior`].
//! Each turn it renders the swarm history as a chat transcript, tells the
//! model which tools and handoff targets it has, and runs a small tool loop:
//!
//! 1. The model answers. If the answer contains
//!    `{"tool_call": {"name": "...", "parameters": {...}}}`, the tool is run
//!    through the [`TurnContext`] and its result is fed back as a user message.
//! 2. This repeats up to `max_tool_iterations` times, after which the model is
//!    asked once more for its final answer.
//! 3. The final answer may carry `{"handoff": "<target>"}`. The directive is
//!    removed from the content and becomes the turn's handoff.
//!
//! Tool failures are fed back to the model like successes, so it can decide
//! to retry, fix its code, or hand the problem to someone else.

use crate::cloudswarm::agent::{AgentBehavior, TurnContext, TurnOutput};
use crate::cloudswarm::client_wrapper::{ClientWrapper, Message, Role};
use crate::cloudswarm::error::TurnError;
use crate::cloudswarm::event::AgentEvent;
use crate::cloudswarm::message::{SwarmMessage, HUMAN};
use crate::cloudswarm::tool_protocol::{ToolError, ToolResult};
use async_trait::async_trait;
use std::ops::Range;
use std::sync::Arc;

/// A tool request parsed out of a model response.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub parameters: serde_json::Value,
}

/// Drives one agent's turns through a chat model.
pub struct LlmBehavior {
    client: Arc<dyn ClientWrapper>,
    system_prompt: String,
    max_tool_iterations: usize,
}

impl LlmBehavior {
    pub fn new(client: Arc<dyn ClientWrapper>, system_prompt: impl Into<String>) -> Self {
        Self {
            client,
            system_prompt: system_prompt.into(),
            max_tool_iterations: 5,
        }
    }

    /// Cap on tool round-trips per turn (default 5).
    pub fn with_max_tool_iterations(mut self, max: usize) -> Self {
        self.max_tool_iterations = max;
        self
    }

    pub fn client(&self) -> &Arc<dyn ClientWrapper> {
        &self.client
    }

    /// System prompt plus a description of the agent's tools and handoffs.
    fn augment_system_prompt(&self, ctx: &TurnContext<'_>) -> String {
        let mut prompt = format!("You are '{}'.", ctx.agent_name());
        if !ctx.description().is_empty() {
            prompt.push(' ');
            prompt.push_str(ctx.description());
        }
        if !self.system_prompt.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&self.system_prompt);
        }

        let tools = ctx.tool_metadata();
        if !tools.is_empty() {
            prompt.push_str("\n\nYou have access to the following tools:\n");
            for tool in tools {
                prompt.push_str(&format!("- {}: {}\n", tool.name, tool.description));
                for param in &tool.parameters {
                    prompt.push_str(&format!(
                        "    - {} ({:?}{}): {}\n",
                        param.name,
                        param.param_type,
                        if param.required { ", required" } else { "" },
                        param.description.as_deref().unwrap_or("No description")
                    ));
                }
            }
            prompt.push_str(
                "\nTo use a tool, respond with a JSON object in the following format:\n\
                 {\"tool_call\": {\"name\": \"tool_name\", \"parameters\": {...}}}\n\
                 After tool execution, I'll provide the result and you can continue.\n",
            );
        }

        let targets = ctx.handoff_targets();
        if !targets.is_empty() {
            prompt.push_str("\nWhen your part is done, pass control on by ending your reply with\n");
            prompt.push_str("{\"handoff\": \"<target>\"}\nwhere <target> is one of: ");
            prompt.push_str(&targets.join(", "));
            prompt.push('.');
            if targets.iter().any(|t| t == HUMAN) {
                prompt.push_str(" Use \"human\" to ask the user a question or report back.");
            }
            prompt.push('\n');
        }
        prompt
    }

    /// Render the history for the model: this agent's final messages as
    /// assistant turns, everyone else's as attributed user turns. Tool traffic
    /// from earlier turns is left out.
    fn render_history(&self, ctx: &TurnContext<'_>) -> Vec<Message> {
        let mut messages = vec![Message::new(Role::System, self.augment_system_prompt(ctx))];
        messages.extend(
            ctx.history()
                .iter()
                .filter(|m| m.is_final())
                .map(|m| render_message(m, ctx.agent_name())),
        );
        messages
    }

    async fn call_model(
        &self,
        ctx: &TurnContext<'_>,
        messages: &[Message],
        iteration: usize,
    ) -> Result<String, TurnError> {
        ctx.emit_agent_event(AgentEvent::LLMCallStarted {
            agent_name: ctx.agent_name().to_string(),
            iteration,
        })
        .await;
        let response = self.client.send_message(messages).await?;
        log::debug!(
            "cloudswarm::llm_agent: '{}' iteration {} got {} chars from {}",
            ctx.agent_name(),
            iteration,
            response.content.len(),
            self.client.model_name()
        );
        ctx.emit_agent_event(AgentEvent::LLMCallCompleted {
            agent_name: ctx.agent_name().to_string(),
            iteration,
            tokens_used: self.client.get_last_usage(),
            response_length: response.content.len(),
        })
        .await;
        Ok(response.content)
    }
}

#[async_trait]
impl AgentBehavior for LlmBehavior {
    async fn respond(&self, ctx: &TurnContext<'_>) -> Result<TurnOutput, TurnError> {
        let mut messages = self.render_history(ctx);
        let mut iteration = 1;
        let mut tool_iterations = 0;
        let mut response = self.call_model(ctx, &messages, iteration).await?;

        while let Some(call) = parse_tool_call(&response) {
            if tool_iterations >= self.max_tool_iterations {
                log::warn!(
                    "cloudswarm::llm_agent: '{}' hit {} tool iterations",
                    ctx.agent_name(),
                    self.max_tool_iterations
                );
                ctx.emit_agent_event(AgentEvent::ToolMaxIterationsReached {
                    agent_name: ctx.agent_name().to_string(),
                    max_iterations: self.max_tool_iterations,
                })
                .await;
                messages.push(Message::new(Role::Assistant, response));
                messages.push(Message::new(
                    Role::User,
                    "Maximum tool iterations reached. Do not call any more tools: \
                     give your final answer now and end it with a handoff directive.",
                ));
                iteration += 1;
                response = self.call_model(ctx, &messages, iteration).await?;
                if let Some(range) = find_directive(&response, "tool_call").map(|(r, _)| r) {
                    response.replace_range(range, "");
                }
                break;
            }
            tool_iterations += 1;

            ctx.emit_agent_event(AgentEvent::ToolCallDetected {
                agent_name: ctx.agent_name().to_string(),
                tool_name: call.name.clone(),
                parameters: call.parameters.clone(),
                iteration: tool_iterations,
            })
            .await;

            let outcome = ctx.call_tool(&call.name, call.parameters).await?;
            messages.push(Message::new(Role::Assistant, response));
            messages.push(Message::new(Role::User, tool_feedback(&call.name, &outcome)));

            iteration += 1;
            response = self.call_model(ctx, &messages, iteration).await?;
        }

        let (content, handoff) = split_handoff(&response);
        Ok(TurnOutput {
            content,
            handoff,
            data: None,
        })
    }
}

fn render_message(message: &SwarmMessage, me: &str) -> Message {
    if message.source == me {
        Message::new(Role::Assistant, message.content.clone())
    } else {
        Message::new(
            Role::User,
            format!("[{}]: {}", message.source, message.content),
        )
    }
}

fn tool_feedback(name: &str, outcome: &Result<ToolResult, ToolError>) -> String {
    match outcome {
        Ok(result) => format!(
            "Tool '{}' executed successfully. Result: {}",
            name,
            serde_json::to_string_pretty(&result.output)
                .unwrap_or_else(|_| result.output.to_string())
        ),
        Err(err) => {
            let hint = if err.is_retryable() {
                " (this may succeed if retried)"
            } else {
                ""
            };
            format!("Tool '{}' failed. Error: {}{}", name, err, hint)
        }
    }
}

/// Find the first JSON object in `text` that has a top-level `key`.
///
/// One pass over the text keeps a stack of open-brace offsets; each closing
/// brace is matched against its opener and the enclosed slice is tried as JSON.
/// Braces are counted outside string literals only, so code snippets inside
/// the parameters don't confuse the scan, and stray unbalanced braces in the
/// surrounding prose cost nothing extra. Returns the leftmost matching
/// object's byte range and its parsed value.
pub fn find_directive(text: &str, key: &str) -> Option<(Range<usize>, serde_json::Value)> {
    let mut open: Vec<usize> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut found: Option<(Range<usize>, serde_json::Value)> = None;

    for (i, b) in text.bytes().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                // JSON strings never span raw newlines
                b'"' | b'\n' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' if !open.is_empty() => in_string = true,
            b'{' => open.push(i),
            b'}' => {
                let Some(start) = open.pop() else {
                    continue;
                };
                let leftmost = found.as_ref().map_or(true, |(range, _)| start < range.start);
                if leftmost {
                    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text[start..=i]) {
                        if value.get(key).is_some() {
                            found = Some((start..i + 1, value));
                        }
                    }
                }
                // nothing that opens later can start further left
                if open.is_empty() && found.is_some() {
                    return found;
                }
            }
            _ => {}
        }
    }
    found
}

/// Parse the first `{"tool_call": {...}}` directive in a model response.
pub fn parse_tool_call(response: &str) -> Option<ToolCall> {
    let (_, value) = find_directive(response, "tool_call")?;
    let call = value.get("tool_call")?;
    let name = call.get("name")?.as_str()?;
    Some(ToolCall {
        name: name.to_string(),
        parameters: call
            .get("parameters")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({})),
    })
}

/// Strip a `{"handoff": "<target>"}` directive from `response`, returning the
/// remaining text and the target.
pub fn split_handoff(response: &str) -> (String, Option<String>) {
    match find_directive(response, "handoff") {
        Some((range, value)) => {
            let target = value
                .get("handoff")
                .and_then(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
            let mut content = String::with_capacity(response.len());
            content.push_str(&response[..range.start]);
            content.push_str(&response[range.end..]);
            (content.trim().to_string(), target)
        }
        None => (response.trim().to_string(), None),
    }
}
