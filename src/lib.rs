//! Duologue - two LLM personas talking to each other, live
//!
//! Two agent actors (a responder and an initiator) trade turns over bounded
//! channels, each mirrored to its own websocket gateway for a viewer.

pub mod actors;
pub mod audio;
mod config;
pub mod core;
pub mod gateway;
pub mod utils;

pub mod cli;

pub use actors::messages::{GatewayMessage, Role, StateSnapshot, Turn};
pub use actors::{Orchestrator, RunningConversation};
pub use config::{AudioConfig, Settings};
pub use core::fragment::{RepairOutcome, TagFormat};
pub use core::llm::{ChatMessage, Generator, GeneratorFactory};

