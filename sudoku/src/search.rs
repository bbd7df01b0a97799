//! Depth-first search engine and the engine-state snapshot reported to a
//! host.
//!
//! Recursion would read closer to textbook DFS, but the "nth step"
//! operation needs to suspend mid-search and hand a live partial state back
//! to a host, then resume later from that exact point. Rust has no portable
//! way to pause and later re-enter an arbitrary call stack, so the engine
//! keeps its own explicit frame stack instead — the same information a
//! recursive call's stack frames would hold, just addressable between
//! calls.

use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::grid::CellState;
use crate::handler::HandlerSet;
use crate::lookup::LookupTables;
use crate::mask::CellMask;
use crate::shape::GridShape;
use crate::solution::encode_mask_row;
use crate::stats::SearchStats;

/// What the caller wants out of a run.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Stop once the `n`th solution (1-indexed) has been reported. `n == 1`
    /// is "find any solution".
    FindNthSolution { n: u64 },
    /// Keep searching until exhausted or `limit` solutions have been seen
    /// (`None` means no limit — enumerate every solution).
    CountSolutions { limit: Option<u64> },
    /// Run only the handlers the caller built the engine with (expected to
    /// be the layout-only subset: jigsaw/region handlers) and report
    /// satisfiability via whether a first solution exists.
    ValidateLayout,
}

impl Operation {
    fn satisfied_after(&self, solutions_found: u64) -> bool {
        match self {
            Operation::FindNthSolution { n } => solutions_found >= *n,
            Operation::CountSolutions { limit } => limit.is_some_and(|l| solutions_found >= l),
            Operation::ValidateLayout => solutions_found >= 1,
        }
    }
}

/// Why a [`SearchEngine::run`] or [`SearchEngine::step_n`] call stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The search space was fully explored (every branch backtracked).
    Exhausted,
    /// The operation's stop condition was reached (nth solution found,
    /// solution-count limit hit, layout validated).
    SatisfiedOperation,
    /// The host-supplied yield predicate returned `true`.
    Cancelled,
    /// The node budget passed to [`SearchEngine::step_n`] ran out before
    /// either of the above.
    NodeLimitReached,
}

/// The result of one unit of DFS work, used by the "nth step" operation
/// to classify what just happened without the caller needing to
/// inspect engine internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepClass {
    Solution,
    Conflict,
    Backtracked,
    Branched,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub stats: SearchStats,
    pub solutions: Vec<Vec<CellMask>>,
    pub reason: StopReason,
}

/// Host-facing engine state snapshot.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Progress {
    pub counters: SearchStats,
    pub done: bool,
    pub time_ms: u64,
    pub puzzle_setup_time_ms: u64,
    /// The most recent solution(s), short-solution encoded.
    pub solutions: Vec<String>,
}

/// One pending decision: the branch cell, the checkpoint to restore to
/// before trying each of its remaining candidate values, and this level's
/// progress-ratio weight (weighted by 1/fanout at each level).
#[derive(Debug)]
struct Frame {
    cell: usize,
    checkpoint: usize,
    remaining: std::collections::VecDeque<u8>,
    weight: f64,
}

/// Owns the grid, trail, handlers and frame stack for one solve. Not reusable
/// across independent puzzles (not incremental between independent
/// puzzles) and not reusable after [`StopReason::Cancelled`] —
/// build a fresh one via [`crate::builder::Builder`] for each solve.
pub struct SearchEngine {
    tables: &'static LookupTables,
    handlers: HandlerSet,
    grid: CellState,
    stack: Vec<Frame>,
    stats: SearchStats,
    setup_time: Duration,
}

impl SearchEngine {
    pub(crate) fn new(
        shape: &GridShape,
        handlers: HandlerSet,
        grid: CellState,
        setup_time: Duration,
    ) -> Self {
        Self {
            tables: LookupTables::get(shape.num_values()),
            handlers,
            grid,
            stack: Vec::new(),
            stats: SearchStats::new(),
            setup_time,
        }
    }

    #[must_use]
    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    /// The cell with the smallest popcount greater than 1, tie-broken by
    /// index (deterministic).
    fn branch_cell(&self) -> Option<usize> {
        (0..self.grid.num_cells())
            .filter(|&c| self.tables.popcount(self.grid.get(c)) > 1)
            .min_by_key(|&c| self.tables.popcount(self.grid.get(c)))
    }

    fn propagate(&mut self) -> Result<(), crate::handler::Contradiction> {
        let stats = &mut self.stats;
        self.handlers
            .propagate(&mut self.grid, || stats.constraints_processed += 1)
    }

    fn assign(&mut self, cell: usize, value: u8) {
        let mask = self.tables.from_value(value);
        self.grid.set(cell, mask);
        self.handlers.mark_cell_dirty(cell);
        self.stats.guesses += 1;
        self.stats.values_tried += 1;
    }

    /// Undoes the current frame's last assignment and either assigns its
    /// next candidate, or (if exhausted) pops it and recurses up a level.
    /// Returns `None` once the whole stack is exhausted.
    fn backtrack(&mut self) -> Option<StepClass> {
        loop {
            let frame = self.stack.last_mut()?;
            self.grid.restore_to(frame.checkpoint);
            self.stats.backtracks += 1;
            if let Some(value) = frame.remaining.pop_front() {
                let cell = frame.cell;
                self.assign(cell, value);
                return Some(StepClass::Backtracked);
            }
            let exhausted = self.stack.pop().expect("checked by last_mut above");
            self.stats.advance_progress(exhausted.weight);
        }
    }

    /// One indivisible unit of DFS work: propagate the current state to
    /// quiescence, then either report a solution, report a conflict (and
    /// backtrack), or branch onto a new cell.
    fn step(&mut self) -> StepClass {
        if self.propagate().is_err() {
            trace!("contradiction at {} guesses", self.stats.guesses);
            return match self.backtrack() {
                Some(class) => class,
                None => StepClass::Conflict,
            };
        }

        if self.grid.is_solved(self.tables) {
            return StepClass::Solution;
        }

        let Some(cell) = self.branch_cell() else {
            // Every cell has popcount >= 1 and we're not solved only if some
            // cell has popcount 0, which `propagate` would have caught as a
            // contradiction. Defensive fallback: treat as a conflict.
            return match self.backtrack() {
                Some(class) => class,
                None => StepClass::Conflict,
            };
        };
        self.stats.cells_searched += 1;

        let mut values: std::collections::VecDeque<u8> =
            self.tables.value_iter(self.grid.get(cell)).collect();
        let fanout = values.len().max(1) as f64;
        let parent_weight = self.stack.last().map_or(1.0, |f| f.weight);
        let checkpoint = self.grid.checkpoint();
        let first = values
            .pop_front()
            .expect("branch_cell only selects cells with popcount > 1");
        self.stack.push(Frame {
            cell,
            checkpoint,
            remaining: values,
            weight: parent_weight / fanout,
        });
        self.assign(cell, first);
        StepClass::Branched
    }

    /// Runs to completion against `operation`, stopping early if
    /// `should_cancel` returns `true` (checked at least once per decision
    /// node).
    pub fn run(
        &mut self,
        operation: Operation,
        mut should_cancel: impl FnMut(&SearchStats) -> bool,
    ) -> SearchOutcome {
        let start = Instant::now();
        let mut solutions = Vec::new();
        let reason = loop {
            if should_cancel(&self.stats) {
                break StopReason::Cancelled;
            }
            match self.step() {
                StepClass::Solution => {
                    self.stats.solutions += 1;
                    solutions.push(self.grid.snapshot());
                    debug!("solution #{} after {} guesses", self.stats.solutions, self.stats.guesses);
                    if operation.satisfied_after(solutions.len() as u64) {
                        break StopReason::SatisfiedOperation;
                    }
                    match self.backtrack() {
                        Some(_) => continue,
                        None => break StopReason::Exhausted,
                    }
                }
                StepClass::Conflict => break StopReason::Exhausted,
                StepClass::Backtracked | StepClass::Branched => continue,
            }
        };
        self.stats.time_ms = start.elapsed().as_millis() as u64;
        SearchOutcome {
            stats: self.stats,
            solutions,
            reason,
        }
    }

    /// Resumable variant of [`Self::run`] (the "nth step" operation): advances
    /// at most `node_budget` decision nodes (guesses) from wherever the
    /// engine currently sits, then returns — the engine instance itself is
    /// the resumable state; calling `step_n` again continues where this
    /// call left off.
    pub fn step_n(&mut self, node_budget: u64, mut should_cancel: impl FnMut(&SearchStats) -> bool) -> SearchOutcome {
        let start = Instant::now();
        let start_guesses = self.stats.guesses;
        let mut solutions = Vec::new();
        let reason = loop {
            if should_cancel(&self.stats) {
                break StopReason::Cancelled;
            }
            if self.stats.guesses.saturating_sub(start_guesses) >= node_budget {
                break StopReason::NodeLimitReached;
            }
            match self.step() {
                StepClass::Solution => {
                    self.stats.solutions += 1;
                    solutions.push(self.grid.snapshot());
                    break StopReason::SatisfiedOperation;
                }
                StepClass::Conflict => break StopReason::Exhausted,
                StepClass::Backtracked | StepClass::Branched => continue,
            }
        };
        self.stats.time_ms = start.elapsed().as_millis() as u64;
        SearchOutcome {
            stats: self.stats,
            solutions,
            reason,
        }
    }

    /// Solve-all-possibilities / "true candidates" mode: finds,
    /// for every cell and every one of its initial candidate values, at
    /// least one full solution using that value, and returns the union of
    /// supported values per cell. `support_threshold` caps how many
    /// solutions are counted per (cell, value) pair once support is
    /// established — counting stops at `threshold + 1`, the "one higher
    /// than the limit" sentinel, so a host can distinguish
    /// "exactly at the threshold" from "known to exceed it" without an
    /// unbounded counter.
    pub fn true_candidates(
        &mut self,
        support_threshold: Option<u64>,
        mut should_cancel: impl FnMut(&SearchStats) -> bool,
    ) -> (Vec<CellMask>, SearchStats) {
        let start = Instant::now();
        let num_cells = self.grid.num_cells();
        let target_masks: Vec<CellMask> = (0..num_cells).map(|c| self.grid.get(c)).collect();
        let mut supported = vec![0u16; num_cells];
        let mut support_count = vec![[0u64; crate::shape::GridShape::MAX_VALUES]; num_cells];

        loop {
            if should_cancel(&self.stats) {
                break;
            }
            match self.step() {
                StepClass::Solution => {
                    self.stats.solutions += 1;
                    let snapshot = self.grid.snapshot();
                    for (cell, &mask) in snapshot.iter().enumerate() {
                        let value = self
                            .tables
                            .min_value(mask)
                            .expect("solved cell has exactly one candidate");
                        let slot = &mut support_count[cell][value as usize - 1];
                        let under_threshold = support_threshold.is_none_or(|t| *slot <= t);
                        if under_threshold {
                            *slot += 1;
                            supported[cell] |= self.tables.from_value(value);
                        }
                    }
                    let fully_supported = (0..num_cells).all(|c| supported[c] == target_masks[c]);
                    if fully_supported {
                        break;
                    }
                    match self.backtrack() {
                        Some(_) => continue,
                        None => break,
                    }
                }
                StepClass::Conflict => break,
                StepClass::Backtracked | StepClass::Branched => continue,
            }
        }
        self.stats.time_ms = start.elapsed().as_millis() as u64;
        (supported, self.stats)
    }

    /// Builds the host-facing [`Progress`] snapshot for an outcome.
    #[must_use]
    pub fn progress_from(&self, outcome: &SearchOutcome, done: bool) -> Progress {
        Progress {
            counters: outcome.stats,
            done,
            time_ms: outcome.stats.time_ms,
            puzzle_setup_time_ms: self.setup_time.as_millis() as u64,
            solutions: outcome
                .solutions
                .iter()
                .map(|snapshot| encode_mask_row(snapshot, self.tables))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::constraint::Constraint;
    use crate::shape::GridShape;

    fn classic_givens() -> Vec<Constraint> {
        // A minimal 4x4 ("classic" 2x2-box) puzzle with a unique solution.
        let givens: &[(&str, u8)] = &[
            ("R1C1", 1),
            ("R2C3", 1),
            ("R3C2", 1),
            ("R4C4", 1),
        ];
        let mut constraints = vec![Constraint::Shape {
            num_rows: 4,
            num_cols: 4,
            num_values: 4,
            box_height: Some(2),
            box_width: Some(2),
        }];
        for &(cell, value) in givens {
            constraints.push(Constraint::Given {
                cell: cell.to_string(),
                value,
            });
        }
        constraints
    }

    #[test]
    fn finds_a_solution_for_a_consistent_board() {
        let builder = Builder::new(classic_givens()).expect("valid constraint tree");
        let mut engine = builder.build().expect("buildable");
        let outcome = engine.run(Operation::FindNthSolution { n: 1 }, |_| false);
        assert_eq!(outcome.reason, StopReason::SatisfiedOperation);
        assert_eq!(outcome.solutions.len(), 1);
    }

    #[test]
    fn step_n_can_resume_across_calls() {
        let builder = Builder::new(classic_givens()).expect("valid constraint tree");
        let mut engine = builder.build().expect("buildable");
        let mut total = SearchOutcome {
            stats: SearchStats::new(),
            solutions: Vec::new(),
            reason: StopReason::NodeLimitReached,
        };
        for _ in 0..50 {
            total = engine.step_n(1, |_| false);
            if total.reason != StopReason::NodeLimitReached {
                break;
            }
        }
        assert_eq!(total.reason, StopReason::SatisfiedOperation);
    }
}
