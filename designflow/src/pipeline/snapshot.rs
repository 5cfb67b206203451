//! Read-only view of a run for presentation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::run::{PipelineRun, StageFailure, StageOutputs, ValidationMark};
use crate::core::{StageId, TimelineEvent};

/// Everything a presentation layer needs to render a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    /// Identifier of the current start.
    pub run_id: Uuid,
    /// Ordered stage names.
    pub steps: Vec<String>,
    /// −1 before start, 0..=6 while running, 7 when complete.
    pub current_stage_index: i32,
    /// Completed stage indices in ascending order.
    pub completed_stages: Vec<usize>,
    /// True once aborted.
    pub aborted: bool,
    /// Stage of the latest unresolved failure.
    pub failure_stage_index: Option<usize>,
    /// Message of the latest unresolved failure.
    pub failure_message: Option<String>,
    /// All failures and fallbacks reported so far.
    pub errors: Vec<StageFailure>,
    /// Stage outputs.
    pub outputs: StageOutputs,
    /// The run timeline.
    pub timeline: Vec<TimelineEvent>,
    /// Validation marks by stage index.
    pub validations: BTreeMap<usize, ValidationMark>,
    /// Stages with work in flight.
    pub running_stages: Vec<usize>,
    /// True when every stage has completed.
    pub is_complete: bool,
}

impl RunSnapshot {
    /// Returns true if `stage` has completed.
    #[must_use]
    pub fn is_stage_completed(&self, stage: StageId) -> bool {
        self.completed_stages.contains(&stage.index())
    }

    /// Returns true if no stage work is in flight.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.running_stages.is_empty()
    }
}

impl From<&PipelineRun> for RunSnapshot {
    fn from(run: &PipelineRun) -> Self {
        Self {
            run_id: run.run_id(),
            steps: StageId::step_names(),
            current_stage_index: run.current_stage_index(),
            completed_stages: run.completed_stages().iter().copied().collect(),
            aborted: run.is_aborted(),
            failure_stage_index: run.failure().map(|f| f.stage_index),
            failure_message: run.failure().map(|f| f.message.clone()),
            errors: run.errors().to_vec(),
            outputs: run.outputs().clone(),
            timeline: run.timeline().to_vec(),
            validations: run.validations().clone(),
            running_stages: run.running_stages().iter().map(|s| s.index()).collect(),
            is_complete: run.is_complete(),
        }
    }
}
