//! RAII re-entry guard for a stage's async work.

use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use super::orchestrator::Shared;
use super::run::PipelineRun;
use crate::core::StageId;

/// Holds a stage's running flag for the lifetime of its task.
///
/// The flag is cleared by [`release`](Self::release) together with the
/// stage's results, or on drop if the task ends without releasing.
pub(crate) struct StageGuard {
    shared: Arc<Shared>,
    stage: StageId,
    run_id: Uuid,
    released: bool,
}

impl StageGuard {
    /// Sets the running flag for `stage`, returning `None` if already set.
    pub(crate) fn acquire(shared: &Arc<Shared>, run: &mut PipelineRun, stage: StageId) -> Option<Self> {
        run.try_acquire(stage).then(|| Self {
            shared: Arc::clone(shared),
            stage,
            run_id: run.run_id(),
            released: false,
        })
    }

    pub(crate) const fn stage(&self) -> StageId {
        self.stage
    }

    pub(crate) const fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// Clears the running flag. The caller holds the run lock.
    pub(crate) fn release(mut self, run: &mut PipelineRun) {
        run.release(self.stage, self.run_id);
        self.released = true;
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!(stage = %self.stage, run_id = %self.run_id, "Stage task ended without releasing its guard");
        self.shared.run.lock().release(self.stage, self.run_id);
        self.shared.bump();
    }
}
