//! The seven-stage design pipeline.
//!
//! This module provides:
//! - The run state and its named transitions
//! - The dispatcher deciding which stages are eligible
//! - The orchestrator executing stage work and exposing commands
//! - The packaging hand-off for downloads

mod dispatcher;
mod guard;
mod handlers;
mod orchestrator;
mod packaging;
mod run;
mod snapshot;

#[cfg(test)]
mod integration_tests;

pub use dispatcher::{next_actions, Action};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use packaging::{JsonBundlePackager, PackageReceipt, PackageRequest, PackagedArtifact, Packager};
pub use run::{stage_at, BatchKind, PipelineRun, StageFailure, StageOutputs, StartOutcome, ValidationMark};
pub use snapshot::RunSnapshot;
