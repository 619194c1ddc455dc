// src/cloudswarm/mod.rs

pub mod agent;
pub mod client_wrapper;
pub mod clients;
pub mod config;
pub mod error;
pub mod event;
pub mod llm_agent;
pub mod message;
pub mod swarm;
pub mod team;
pub mod termination;
pub mod tool_protocol;
pub mod tool_protocols;
pub mod tools;

// Export the orchestrator so callers can write cloudswarm::cloudswarm::Swarm
// as well as cloudswarm::swarm::Swarm.
pub use swarm::Swarm;
