//! Per-request progress tracking for parallel generation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of one unit of parallel generation work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    /// Not yet started.
    #[default]
    Waiting,
    /// The request is in flight.
    Processing,
    /// The request produced a usable result.
    Completed,
    /// The request failed.
    Error,
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl GenerationStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Progress of one unit of parallel work.
///
/// Progress never decreases while processing, `Completed` always reports 100
/// and `Error` always reports 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenerationProgressState {
    status: GenerationStatus,
    progress: u8,
}

impl GenerationProgressState {
    /// Highest value reported before a request completes.
    pub const MAX_IN_FLIGHT: u8 = 99;

    /// Creates a waiting state.
    #[must_use]
    pub const fn waiting() -> Self {
        Self {
            status: GenerationStatus::Waiting,
            progress: 0,
        }
    }

    /// Returns the status.
    #[must_use]
    pub const fn status(&self) -> GenerationStatus {
        self.status
    }

    /// Returns the progress percentage.
    #[must_use]
    pub const fn progress(&self) -> u8 {
        self.progress
    }

    /// Moves a waiting request to processing.
    pub fn begin(&mut self) {
        if self.status == GenerationStatus::Waiting {
            self.status = GenerationStatus::Processing;
        }
    }

    /// Raises progress while processing; lower values and terminal states are ignored.
    pub fn advance_to(&mut self, progress: u8) {
        if self.status != GenerationStatus::Processing {
            return;
        }
        let capped = progress.min(Self::MAX_IN_FLIGHT);
        if capped > self.progress {
            self.progress = capped;
        }
    }

    /// Marks the request completed.
    pub fn complete(&mut self) {
        self.status = GenerationStatus::Completed;
        self.progress = 100;
    }

    /// Marks the request failed.
    pub fn fail(&mut self) {
        self.status = GenerationStatus::Error;
        self.progress = 0;
    }
}

/// Bounded linear progress estimate for requests that report no native progress.
///
/// Maps observed work units onto `[floor, ceiling]`; the ceiling stays below 100
/// so only an actual completion reports 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearProgressEstimator {
    expected_units: u32,
    floor: u8,
    ceiling: u8,
}

impl Default for LinearProgressEstimator {
    fn default() -> Self {
        Self::new(4)
    }
}

impl LinearProgressEstimator {
    /// Creates an estimator expecting `expected_units` checkpoints.
    #[must_use]
    pub fn new(expected_units: u32) -> Self {
        Self {
            expected_units: expected_units.max(1),
            floor: 5,
            ceiling: 95,
        }
    }

    /// Sets the reported range.
    #[must_use]
    pub fn with_bounds(mut self, floor: u8, ceiling: u8) -> Self {
        let ceiling = ceiling.min(GenerationProgressState::MAX_IN_FLIGHT);
        self.floor = floor.min(ceiling);
        self.ceiling = ceiling;
        self
    }

    /// Estimates progress after `observed_units` checkpoints.
    #[must_use]
    pub fn estimate(&self, observed_units: u32) -> u8 {
        let observed = observed_units.min(self.expected_units);
        let span = u32::from(self.ceiling - self.floor);
        let step = span * observed / self.expected_units;
        // step <= span <= 99
        self.floor + u8::try_from(step).unwrap_or(0)
    }

    /// Estimates progress for an observed fraction in `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn estimate_fraction(&self, fraction: f64) -> u8 {
        let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
        let span = f64::from(self.ceiling - self.floor);
        self.floor + (span * fraction).floor() as u8
    }
}
