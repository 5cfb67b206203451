//! Parallel generation coordinator.
//!
//! Runs a fixed-size batch of independent requests concurrently with
//! all-settled semantics: the batch as a whole never fails, and every slot
//! keeps its position so callers can see exactly which requests failed.

use futures::future::join_all;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::{GenerationProgressState, LinearProgressEstimator};

/// Callback receiving `(slot, state)` after every progress change.
pub type ProgressObserver = Arc<dyn Fn(usize, GenerationProgressState) + Send + Sync>;

/// Progress handle given to each request in a batch.
///
/// Requests that can observe their own progress report it here; values are
/// mapped through the batch's [`LinearProgressEstimator`] and never reach 100
/// before the request actually completes.
#[derive(Clone)]
pub struct SlotProgress {
    slot: usize,
    state: Arc<Mutex<GenerationProgressState>>,
    checkpoints: Arc<Mutex<u32>>,
    estimator: LinearProgressEstimator,
    observer: Option<ProgressObserver>,
}

impl fmt::Debug for SlotProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotProgress")
            .field("slot", &self.slot)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl SlotProgress {
    fn new(slot: usize, estimator: LinearProgressEstimator, observer: Option<ProgressObserver>) -> Self {
        Self {
            slot,
            state: Arc::new(Mutex::new(GenerationProgressState::waiting())),
            checkpoints: Arc::new(Mutex::new(0)),
            estimator,
            observer,
        }
    }

    /// Index of this request within its batch.
    #[must_use]
    pub const fn slot(&self) -> usize {
        self.slot
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> GenerationProgressState {
        *self.state.lock()
    }

    /// Records one more unit of observed work.
    pub fn checkpoint(&self) {
        let observed = {
            let mut count = self.checkpoints.lock();
            *count = count.saturating_add(1);
            *count
        };
        let estimate = self.estimator.estimate(observed);
        self.update(|state| state.advance_to(estimate));
    }

    /// Reports an observed completion fraction in `[0, 1]`.
    pub fn report_fraction(&self, fraction: f64) {
        let estimate = self.estimator.estimate_fraction(fraction);
        self.update(|state| state.advance_to(estimate));
    }

    fn begin(&self) {
        let floor = self.estimator.estimate(0);
        self.update(|state| {
            state.begin();
            state.advance_to(floor);
        });
    }

    fn finish(&self, success: bool) {
        self.update(|state| {
            if success {
                state.complete();
            } else {
                state.fail();
            }
        });
    }

    fn update(&self, change: impl FnOnce(&mut GenerationProgressState)) {
        let (before, after) = {
            let mut state = self.state.lock();
            let before = *state;
            change(&mut state);
            (before, *state)
        };
        if before != after {
            self.notify(after);
        }
    }

    fn notify(&self, state: GenerationProgressState) {
        if let Some(observer) = &self.observer {
            observer(self.slot, state);
        }
    }
}

/// The settled result of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome<T> {
    slots: Vec<Option<T>>,
    progress: Vec<GenerationProgressState>,
    errors: Vec<(usize, String)>,
}

impl<T> BatchOutcome<T> {
    /// Per-slot results; failed slots are `None`.
    #[must_use]
    pub fn slots(&self) -> &[Option<T>] {
        &self.slots
    }

    /// Consumes the outcome, returning the positional results.
    #[must_use]
    pub fn into_slots(self) -> Vec<Option<T>> {
        self.slots
    }

    /// Successful results in slot order.
    #[must_use]
    pub fn successes(&self) -> Vec<&T> {
        self.slots.iter().flatten().collect()
    }

    /// Indices of failed slots.
    #[must_use]
    pub fn failed_slots(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.is_none().then_some(i))
            .collect()
    }

    /// Number of successful slots.
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Final progress state of every slot.
    #[must_use]
    pub fn progress(&self) -> &[GenerationProgressState] {
        &self.progress
    }

    /// `(slot, message)` for every failed slot.
    #[must_use]
    pub fn errors(&self) -> &[(usize, String)] {
        &self.errors
    }

    /// Batch size.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true for an empty batch.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Runs batches of concurrent requests.
#[derive(Clone, Default)]
pub struct ParallelCoordinator {
    estimator: LinearProgressEstimator,
    observer: Option<ProgressObserver>,
}

impl fmt::Debug for ParallelCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelCoordinator")
            .field("estimator", &self.estimator)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl ParallelCoordinator {
    /// Creates a coordinator with the default estimator and no observer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the progress estimator.
    #[must_use]
    pub fn with_estimator(mut self, estimator: LinearProgressEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    /// Sets the progress observer.
    #[must_use]
    pub fn with_observer(mut self, observer: ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Runs `n` concurrent invocations of `request_fn` and waits for all of them.
    ///
    /// Each slot moves waiting → processing → completed or error. Failures
    /// are logged and recorded as `None`; completion order does not matter.
    pub async fn run<T, E, F, Fut>(&self, n: usize, request_fn: F) -> BatchOutcome<T>
    where
        F: Fn(usize, SlotProgress) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let handles: Vec<SlotProgress> = (0..n)
            .map(|slot| SlotProgress::new(slot, self.estimator, self.observer.clone()))
            .collect();
        for handle in &handles {
            handle.notify(GenerationProgressState::waiting());
        }

        let requests = handles.iter().map(|handle| {
            let request = request_fn(handle.slot, handle.clone());
            async move {
                handle.begin();
                match request.await {
                    Ok(value) => {
                        handle.finish(true);
                        debug!(slot = handle.slot, "Batch request completed");
                        Ok(value)
                    }
                    Err(e) => {
                        handle.finish(false);
                        warn!(slot = handle.slot, error = %e, "Batch request failed");
                        Err(e.to_string())
                    }
                }
            }
        });
        let results = join_all(requests).await;

        let mut slots = Vec::with_capacity(n);
        let mut errors = Vec::new();
        for (slot, result) in results.into_iter().enumerate() {
            match result {
                Ok(value) => slots.push(Some(value)),
                Err(message) => {
                    errors.push((slot, message));
                    slots.push(None);
                }
            }
        }

        BatchOutcome {
            slots,
            progress: handles.iter().map(SlotProgress::state).collect(),
            errors,
        }
    }
}

/// Runs `n` concurrent requests and returns their positional results.
///
/// The returned list always has length `n`; failed slots are `None`.
pub async fn run_batch<T, E, F, Fut>(n: usize, request_fn: F) -> Vec<Option<T>>
where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    ParallelCoordinator::new()
        .run(n, |slot, _| request_fn(slot))
        .await
        .into_slots()
}
