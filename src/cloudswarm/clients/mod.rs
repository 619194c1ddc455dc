//! Provider specific [`ClientWrapper`](crate::client_wrapper::ClientWrapper) implementations.
//!
//! Every provider the swarm targets today speaks the OpenAI chat-completions
//! dialect (Gemini included, through its compatibility endpoint), so a single
//! client covers them; [`http_pool`] keeps one connection pool per base URL.

pub mod http_pool;
pub mod openai;
