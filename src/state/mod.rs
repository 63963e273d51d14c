//! Assistant session state machine
//!
//! Provides an explicit state machine with four states:
//! - Idle: waiting for a wake
//! - Listening: waiting for a command, bounded by the inactivity timeout
//! - Thinking: the command router is handling the command
//! - Speaking: a response is being played back

mod history;
mod machine;

pub use machine::{AssistantSessionManager, AssistantState};
