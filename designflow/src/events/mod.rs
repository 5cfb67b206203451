//! Event emission for run observability.
//!
//! The orchestrator owns one [`EventSink`]. Every timeline entry is emitted
//! under its [`TimelineKind::event_name`](crate::core::TimelineKind::event_name),
//! and batch slots report under [`GENERATION_PROGRESS`].

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event name for per-slot progress changes during a parallel batch.
pub const GENERATION_PROGRESS: &str = "generation.progress";
