//! Timeline events recorded over the lifetime of a run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::StageId;

/// The kind of a timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineKind {
    /// A run was started with a brief.
    RunStarted,
    /// A stage's async work was launched.
    StageStarted,
    /// A stage was marked completed.
    StageCompleted,
    /// A stage reported a failure.
    StageFailed,
    /// A stage substituted a fallback payload.
    FallbackUsed,
    /// The run was aborted.
    Aborted,
    /// A stage was marked validated by the user.
    Validated,
    /// A stage was marked invalidated by the user.
    Invalidated,
    /// The selection was handed off for packaging.
    PackageCreated,
    /// Every stage completed.
    RunCompleted,
}

impl TimelineKind {
    /// Returns the dotted event name used by event sinks.
    #[must_use]
    pub const fn event_name(self) -> &'static str {
        match self {
            Self::RunStarted => "pipeline.started",
            Self::StageStarted => "stage.started",
            Self::StageCompleted => "stage.completed",
            Self::StageFailed => "stage.failed",
            Self::FallbackUsed => "stage.fallback",
            Self::Aborted => "pipeline.aborted",
            Self::Validated => "stage.validated",
            Self::Invalidated => "stage.invalidated",
            Self::PackageCreated => "package.created",
            Self::RunCompleted => "pipeline.completed",
        }
    }
}

impl fmt::Display for TimelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_name())
    }
}

/// An entry in a run's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// What happened.
    pub kind: TimelineKind,

    /// When it happened (RFC 3339).
    pub timestamp: String,

    /// The stage involved, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_index: Option<usize>,

    /// Human-readable summary.
    pub message: String,

    /// Additional structured data.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data: HashMap<String, serde_json::Value>,
}

impl TimelineEvent {
    /// Creates a new timeline event.
    #[must_use]
    pub fn new(kind: TimelineKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            timestamp: crate::utils::iso_timestamp(),
            stage_index: None,
            message: message.into(),
            data: HashMap::new(),
        }
    }

    /// Creates a new event tied to a stage.
    #[must_use]
    pub fn for_stage(kind: TimelineKind, stage: StageId, message: impl Into<String>) -> Self {
        let mut event = Self::new(kind, message);
        event.stage_index = Some(stage.index());
        event
    }

    /// Adds a data field to the event.
    #[must_use]
    pub fn add_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Creates a "stage completed" event.
    #[must_use]
    pub fn completed(stage: StageId) -> Self {
        Self::for_stage(TimelineKind::StageCompleted, stage, format!("{} completed", stage.name()))
    }

    /// Creates a "stage failed" event.
    #[must_use]
    pub fn failed(stage: StageId, error: &str) -> Self {
        Self::for_stage(TimelineKind::StageFailed, stage, format!("{} failed: {error}", stage.name()))
    }

    /// Converts the event into the JSON payload sent to event sinks.
    #[must_use]
    pub fn to_payload(&self) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "timestamp": self.timestamp,
            "message": self.message,
        });
        if let Some(index) = self.stage_index {
            payload["stage_index"] = serde_json::json!(index);
        }
        if !self.data.is_empty() {
            let data: serde_json::Map<String, serde_json::Value> =
                self.data.clone().into_iter().collect();
            payload["data"] = serde_json::Value::Object(data);
        }
        payload
    }
}
