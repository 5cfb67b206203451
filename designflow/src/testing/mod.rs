//! Test doubles for driving the orchestrator without a model provider.
//!
//! [`ScriptedGenerator`] answers every structured call from a script, and
//! [`fixtures`] provides the shared login-form scenario.

pub mod fixtures;
mod scripted;

pub use scripted::{CallCounts, Gate, ScriptedGenerator};
