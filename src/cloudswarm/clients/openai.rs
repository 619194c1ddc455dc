//! The `OpenAIClient` struct implements `ClientWrapper` for any endpoint that
//! speaks the OpenAI chat-completions JSON dialect: OpenAI itself, Gemini's
//! compatibility layer, local servers such as Ollama or vLLM.
//!
//! # Key Features
//!
//! - **Retries**: 429 and 5xx answers, timeouts and connection failures are
//!   retried with exponential backoff (honouring `Retry-After`) up to
//!   `max_retries` times.
//! - **Automatic Usage Capture**: stores the latest `TokenUsage` internally;
//!   call `get_last_usage()` after `send_message()`.
//!
//! # Example
//!
//! ```rust,no_run
//! use cloudswarm::clients::openai::OpenAIClient;
//! use cloudswarm::client_wrapper::{ClientWrapper, Message, Role};
//! use cloudswarm::config::ModelConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let client = OpenAIClient::from_config(&ModelConfig::from_env())?;
//!     let resp = client
//!         .send_message(&[
//!             Message::new(Role::System, "You are an assistant."),
//!             Message::new(Role::User, "Hello!"),
//!         ])
//!         .await?;
//!     println!("Assistant: {}", resp.content);
//!     if let Some(usage) = client.get_last_usage() {
//!         println!("Tokens: {}", usage.total_tokens);
//!     }
//!     Ok(())
//! }
//! ```

use std::error::Error;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cloudswarm::client_wrapper::{ClientWrapper, Message, Role, TokenUsage};
use crate::cloudswarm::clients::http_pool::get_http_client;
use crate::cloudswarm::config::ModelConfig;

/// Default endpoint when none is given.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// A chat-completions request failed for good.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatApiError {
    /// HTTP status, `None` for transport failures
    pub status: Option<u16>,
    pub message: String,
    /// How many attempts were made in total
    pub attempts: u32,
}

impl fmt::Display for ChatApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(
                f,
                "chat API returned {} after {} attempt(s): {}",
                status, self.attempts, self.message
            ),
            None => write!(
                f,
                "chat API unreachable after {} attempt(s): {}",
                self.attempts, self.message
            ),
        }
    }
}

impl Error for ChatApiError {}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
    #[serde(default)]
    total_tokens: usize,
}

/// Client wrapper for OpenAI-compatible Chat Completions APIs.
pub struct OpenAIClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    token_usage: Mutex<Option<TokenUsage>>,
}

impl OpenAIClient {
    /// Talk to OpenAI proper.
    pub fn new(api_key: &str, model: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        Self::new_with_base_url(api_key, model, OPENAI_BASE_URL)
    }

    /// Talk to any OpenAI-compatible endpoint, e.g. `http://localhost:11434/v1`.
    pub fn new_with_base_url(
        api_key: &str,
        model: &str,
        base_url: &str,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        Self::build(api_key, model, base_url, Duration::from_secs(300))
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self, Box<dyn Error + Send + Sync>> {
        Ok(
            Self::build(&config.api_key, &config.model, &config.base_url, config.timeout)?
                .with_max_retries(config.max_retries),
        )
    }

    fn build(
        api_key: &str,
        model: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let base_url = base_url.trim_end_matches('/').to_string();
        Ok(Self {
            http: get_http_client(&base_url, timeout)?,
            base_url,
            api_key: api_key.to_string(),
            model: model.to_string(),
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            token_usage: Mutex::new(None),
        })
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// First retry waits `initial`, doubling up to `max`.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(16));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    fn record_usage(&self, usage: Option<ChatUsage>) {
        let usage = usage.map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });
        *self
            .token_usage
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = usage;
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl ClientWrapper for OpenAIClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn send_message(
        &self,
        messages: &[Message],
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        let request = ChatRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
        };
        let url = format!("{}/chat/completions", self.base_url);

        let mut retry = 0u32;
        loop {
            let attempt = self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await;

            let (status, message, wait) = match attempt {
                Ok(response) if response.status().is_success() => {
                    let parsed: ChatResponse = response.json().await?;
                    self.record_usage(parsed.usage);
                    let content = parsed
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.message.content)
                        .unwrap_or_default();
                    return Ok(Message::new(Role::Assistant, content));
                }
                Ok(response) => {
                    let status = response.status();
                    let wait = retry_after(&response);
                    let body = response.text().await.unwrap_or_default();
                    if !(status.as_u16() == 429 || status.is_server_error()) {
                        log::error!(
                            "cloudswarm::clients::openai: {} returned {}: {}",
                            url,
                            status.as_u16(),
                            body
                        );
                        return Err(Box::new(ChatApiError {
                            status: Some(status.as_u16()),
                            message: body,
                            attempts: retry + 1,
                        }));
                    }
                    (Some(status.as_u16()), body, wait)
                }
                Err(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                    (None, e.to_string(), None)
                }
                Err(e) => return Err(Box::new(e)),
            };

            if retry >= self.max_retries {
                return Err(Box::new(ChatApiError {
                    status,
                    message,
                    attempts: retry + 1,
                }));
            }

            let delay = wait
                .unwrap_or_else(|| self.backoff_for(retry))
                .min(self.max_backoff);
            log::warn!(
                "cloudswarm::clients::openai: attempt {} failed ({}), retrying in {:?}",
                retry + 1,
                status.map_or_else(|| "transport".to_string(), |s| s.to_string()),
                delay
            );
            tokio::time::sleep(delay).await;
            retry += 1;
        }
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.token_usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve canned `(status, body)` answers in order, one per connection.
    async fn serve(answers: Vec<(u16, &'static str)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        tokio::spawn(async move {
            for (status, body) in answers {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 64 * 1024];
                let mut read = 0;
                // Read until the JSON body closes.
                loop {
                    let n = socket.read(&mut buf[read..]).await.unwrap();
                    read += n;
                    if n == 0 || buf[..read].ends_with(b"}") {
                        break;
                    }
                }
                counter.fetch_add(1, Ordering::SeqCst);
                let response = format!(
                    "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });
        (format!("http://{}/v1", addr), hits)
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_succeeds() {
        let (base, hits) = serve(vec![
            (503, r#"{"error":"overloaded"}"#),
            (429, r#"{"error":"quota"}"#),
            (
                200,
                r#"{"choices":[{"message":{"role":"assistant","content":"hi"}}],"usage":{"prompt_tokens":3,"completion_tokens":1,"total_tokens":4}}"#,
            ),
        ])
        .await;
        let client = OpenAIClient::new_with_base_url("k", "m", &base)
            .unwrap()
            .with_max_retries(5)
            .with_backoff(Duration::from_millis(1), Duration::from_millis(5));

        let reply = client
            .send_message(&[Message::new(Role::User, "hello")])
            .await
            .unwrap();
        assert_eq!(reply.content, "hi");
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(client.get_last_usage().unwrap().total_tokens, 4);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let (base, hits) = serve(vec![(401, r#"{"error":"bad key"}"#)]).await;
        let client = OpenAIClient::new_with_base_url("k", "m", &base)
            .unwrap()
            .with_max_retries(5);
        let err = client
            .send_message(&[Message::new(Role::User, "hello")])
            .await
            .unwrap_err();
        let api = err.downcast_ref::<ChatApiError>().unwrap();
        assert_eq!(api.status, Some(401));
        assert_eq!(api.attempts, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let (base, _) = serve(vec![(500, "{}"), (500, "{}")]).await;
        let client = OpenAIClient::new_with_base_url("k", "m", &base)
            .unwrap()
            .with_max_retries(1)
            .with_backoff(Duration::from_millis(1), Duration::from_millis(1));
        let err = client
            .send_message(&[Message::new(Role::User, "hello")])
            .await
            .unwrap_err();
        let api = err.downcast_ref::<ChatApiError>().unwrap();
        assert_eq!(api.status, Some(500));
        assert_eq!(api.attempts, 2);
    }

    #[test]
    fn test_backoff_is_capped() {
        let client = OpenAIClient::new_with_base_url("k", "m", "http://localhost/v1/")
            .unwrap()
            .with_backoff(Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(client.base_url(), "http://localhost/v1");
        assert_eq!(client.backoff_for(0), Duration::from_millis(100));
        assert_eq!(client.backoff_for(2), Duration::from_millis(400));
        assert_eq!(client.backoff_for(10), Duration::from_secs(1));
    }
}
