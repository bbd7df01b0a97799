//! Monotone search counters.

use std::time::Duration;

/// Counters accumulated over a search run. Every field besides
/// `progress_ratio`/`progress_ratio_prev` only ever increases within a run.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct SearchStats {
    pub solutions: u64,
    pub guesses: u64,
    pub backtracks: u64,
    pub cells_searched: u64,
    pub values_tried: u64,
    pub constraints_processed: u64,
    pub progress_ratio: f64,
    pub progress_ratio_prev: f64,
    pub branches_ignored: u64,
    #[serde(skip)]
    pub puzzle_setup_time: Duration,
    #[serde(skip)]
    pub time_ms: u64,
}

impl SearchStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances `progress_ratio` by `delta`, remembering the prior value in
    /// `progress_ratio_prev` the way the engine reports "was / is" progress
    /// to a host across a throttled callback.
    pub(crate) fn advance_progress(&mut self, delta: f64) {
        self.progress_ratio_prev = self.progress_ratio;
        self.progress_ratio += delta;
    }
}
