//! The constraint handler protocol.

mod all_different;
mod binary;
mod dfa_line;
mod lunchbox;
mod or_and;
mod same_values;
mod skyscraper;
mod sum;

pub use all_different::AllDifferent;
pub use binary::{BinaryConstraint, BinaryPairwise, BinaryTable};
pub use dfa_line::{Dfa, DfaLine};
pub use lunchbox::Lunchbox;
pub use or_and::{And, Or};
pub use same_values::SameValues;
pub use skyscraper::Skyscraper;
pub use sum::Sum;

use std::collections::VecDeque;
use std::fmt::Debug;

use crate::exclusions::CellExclusions;
use crate::grid::CellState;
use crate::shape::GridShape;

/// Local control-flow signal: the current search branch is unsatisfiable.
/// Never surfaced past the search engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contradiction;

pub type HandlerResult = Result<(), Contradiction>;

/// A propagator over a fixed set of cells.
///
/// Implementations may not write to any cell outside `cells()` (or the
/// handler's declared complement, for cage-style handlers) — the scheduler
/// relies on `cells()` to know which handlers to re-queue, so writes
/// elsewhere would silently fail to wake the handlers that need to see them.
pub trait Handler: Debug {
    /// Cells this handler watches and may mutate.
    fn cells(&self) -> &[usize];

    /// Scheduling hint: smaller runs earlier when multiple handlers are
    /// dirty at once (cheap/tight checks first). Doesn't affect
    /// correctness, only how quickly propagation reaches quiescence.
    fn priority(&self) -> i32 {
        0
    }

    /// Canonical identity, used by the builder to deduplicate handlers
    /// lowered more than once from equivalent constraints.
    fn id_str(&self) -> String;

    /// One-time setup against the (normally all-ones) initial grid.
    /// Registers any mutual exclusions this handler implies and may reject
    /// statically-impossible constraints without entering search.
    fn initialize(
        &mut self,
        grid: &mut CellState,
        exclusions: &mut CellExclusions,
        shape: &GridShape,
    ) -> HandlerResult {
        let _ = (grid, exclusions, shape);
        Ok(())
    }

    /// Runs one round of propagation. Returns `Err(Contradiction)` iff the
    /// handler determined the branch unsatisfiable. Every cell it mutates
    /// must be reported via `accumulator.add_for_cell`.
    fn enforce_consistency(
        &mut self,
        grid: &mut CellState,
        accumulator: &mut Accumulator,
    ) -> HandlerResult;

    /// For sum/cage-style handlers: the rest of the enclosing house, so the
    /// handler can also enforce the complementary sum.
    fn set_complement_cells(&mut self, _cells: Vec<usize>) {}

    /// Whether this handler's `initialize` calls one of
    /// [`CellExclusions`]'s getters (which seals it) rather than only its
    /// mutators. The builder runs every non-reading handler's `initialize`
    /// first, regardless of constraint-list order, so a later-lowered
    /// `AllDifferent`/`SameValues` can always still register its exclusions
    /// instead of tripping a [`crate::error::SealedError`] against a
    /// `Sum`/`BinaryPairwise` that happened to be lowered earlier.
    fn reads_exclusions_at_init(&self) -> bool {
        false
    }

    /// Downcast hook used only by the builder's redundancy-elimination pass,
    /// which needs to tell a plain `Sum` apart from every other handler to
    /// check whether it duplicates an already-implied house total.
    fn as_sum(&self) -> Option<&sum::Sum> {
        None
    }
}

/// Passed to [`Handler::enforce_consistency`]; the only way a handler
/// reports which cells it touched, so the scheduler can wake every other
/// handler watching them.
pub struct Accumulator<'a> {
    scheduler: &'a mut Scheduler,
}

impl Accumulator<'_> {
    #[inline]
    pub fn add_for_cell(&mut self, cell: usize) {
        self.scheduler.mark_dirty(cell);
    }
}

/// A throwaway single-use [`Scheduler`]/[`Accumulator`] pair for running a
/// lone handler outside a [`HandlerSet`] — used by meta-handlers (`Or`) that
/// need to propagate a child against a scratch grid copy, and by handler
/// unit tests.
pub(crate) struct ScratchScheduler(Scheduler);

impl ScratchScheduler {
    pub(crate) fn new(num_cells: usize) -> Self {
        Self(Scheduler::new(num_cells, 0, vec![Vec::new(); num_cells]))
    }

    pub(crate) fn accumulator(&mut self) -> Accumulator<'_> {
        Accumulator { scheduler: &mut self.0 }
    }
}

/// Dirty-handler queue plus the cell -> watching-handlers index.
#[derive(Debug)]
struct Scheduler {
    watchers: Vec<Vec<usize>>,
    queue: VecDeque<usize>,
    queued: Vec<bool>,
    /// The handler currently executing, excluded from re-queueing by its
    /// own writes (except the caller).
    running: Option<usize>,
}

impl Scheduler {
    fn new(num_cells: usize, num_handlers: usize, watchers: Vec<Vec<usize>>) -> Self {
        debug_assert_eq!(watchers.len(), num_cells);
        Self {
            watchers,
            queue: VecDeque::new(),
            queued: vec![false; num_handlers],
            running: None,
        }
    }

    fn mark_dirty(&mut self, cell: usize) {
        for &handler in &self.watchers[cell] {
            if Some(handler) == self.running {
                continue;
            }
            if !self.queued[handler] {
                self.queued[handler] = true;
                self.queue.push_back(handler);
            }
        }
    }

    fn enqueue_all(&mut self, num_handlers: usize) {
        for h in 0..num_handlers {
            if !self.queued[h] {
                self.queued[h] = true;
                self.queue.push_back(h);
            }
        }
    }

    fn pop(&mut self) -> Option<usize> {
        let handler = self.queue.pop_front()?;
        self.queued[handler] = false;
        Some(handler)
    }

    fn clear(&mut self) {
        self.queue.clear();
        self.queued.iter_mut().for_each(|q| *q = false);
        self.running = None;
    }
}

/// Ordered collection of handlers plus the scheduler wiring built from their
/// declared `cells()`.
pub struct HandlerSet {
    handlers: Vec<Box<dyn Handler>>,
    scheduler: Scheduler,
}

impl HandlerSet {
    /// Builds the cell -> handler-index watch lists and wraps `handlers`.
    /// Handlers keep whatever order the builder produced —
    /// priority only matters for initial queue order, set up here by
    /// stable-sorting once, not on every propagation round.
    #[must_use]
    pub fn new(num_cells: usize, mut handlers: Vec<Box<dyn Handler>>) -> Self {
        handlers.sort_by_key(|h| h.priority());

        let mut watchers = vec![Vec::new(); num_cells];
        for (idx, handler) in handlers.iter().enumerate() {
            for &cell in handler.cells() {
                watchers[cell].push(idx);
            }
        }

        let scheduler = Scheduler::new(num_cells, handlers.len(), watchers);
        Self { handlers, scheduler }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Handler>> {
        self.handlers.iter_mut()
    }

    /// Marks every handler dirty (used once before the first propagation
    /// round of a solve).
    pub fn mark_all_dirty(&mut self) {
        self.scheduler.enqueue_all(self.handlers.len());
    }

    /// Marks every handler watching `cell` dirty.
    pub fn mark_cell_dirty(&mut self, cell: usize) {
        self.scheduler.mark_dirty(cell);
    }

    /// Drains the dirty queue, running each handler's `enforce_consistency`
    /// until quiescence or a contradiction. `constraints_processed` is
    /// incremented by the caller once per handler run so it can be folded
    /// into [`crate::stats::SearchStats`] without this module depending on
    /// it directly.
    pub fn propagate(&mut self, grid: &mut CellState, mut on_run: impl FnMut()) -> HandlerResult {
        while let Some(handler_idx) = self.scheduler.pop() {
            self.scheduler.running = Some(handler_idx);
            on_run();
            let result = {
                let mut accumulator = Accumulator {
                    scheduler: &mut self.scheduler,
                };
                self.handlers[handler_idx].enforce_consistency(grid, &mut accumulator)
            };
            self.scheduler.running = None;
            if result.is_err() {
                self.scheduler.clear();
                return result;
            }
        }
        Ok(())
    }
}

impl Debug for HandlerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerSet")
            .field("num_handlers", &self.handlers.len())
            .finish()
    }
}

/// Test-only helper shared by every handler's unit tests: a throwaway
/// scheduler/accumulator pair for calling `enforce_consistency` in
/// isolation, without needing a full `HandlerSet`.
#[cfg(test)]
pub(crate) mod test_support {
    use super::{Accumulator, Scheduler};

    pub(crate) fn throwaway_accumulator(num_cells: usize) -> Accumulator<'static> {
        let scheduler: &'static mut Scheduler =
            Box::leak(Box::new(Scheduler::new(num_cells, 0, vec![Vec::new(); num_cells])));
        Accumulator { scheduler }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct CountingHandler {
        cells: Vec<usize>,
        runs: std::rc::Rc<std::cell::Cell<u32>>,
    }

    impl Handler for CountingHandler {
        fn cells(&self) -> &[usize] {
            &self.cells
        }
        fn id_str(&self) -> String {
            "counting".into()
        }
        fn enforce_consistency(
            &mut self,
            _grid: &mut CellState,
            _acc: &mut Accumulator,
        ) -> HandlerResult {
            self.runs.set(self.runs.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn dirty_handler_not_requeued_by_its_own_write() {
        let runs = std::rc::Rc::new(std::cell::Cell::new(0));
        let handler = Box::new(CountingHandler {
            cells: vec![0, 1],
            runs: runs.clone(),
        });
        let mut set = HandlerSet::new(2, vec![handler]);
        let mut grid = CellState::new(2, 0b11);
        set.mark_all_dirty();
        set.propagate(&mut grid, || {}).unwrap();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn propagation_wakes_other_watchers_not_self() {
        let runs_a = std::rc::Rc::new(std::cell::Cell::new(0));
        let runs_b = std::rc::Rc::new(std::cell::Cell::new(0));

        #[derive(Debug)]
        struct WritesCell0 {
            cells: Vec<usize>,
            runs: std::rc::Rc<std::cell::Cell<u32>>,
        }
        impl Handler for WritesCell0 {
            fn cells(&self) -> &[usize] {
                &self.cells
            }
            fn id_str(&self) -> String {
                "writer".into()
            }
            fn enforce_consistency(
                &mut self,
                grid: &mut CellState,
                acc: &mut Accumulator,
            ) -> HandlerResult {
                self.runs.set(self.runs.get() + 1);
                if self.runs.get() == 1 {
                    grid.set(0, 0b01);
                    acc.add_for_cell(0);
                }
                Ok(())
            }
        }

        let a = Box::new(WritesCell0 {
            cells: vec![0],
            runs: runs_a.clone(),
        });
        let b = Box::new(CountingHandler {
            cells: vec![0],
            runs: runs_b.clone(),
        });
        let mut set = HandlerSet::new(1, vec![a, b]);
        let mut grid = CellState::new(1, 0b11);
        set.mark_all_dirty();
        set.propagate(&mut grid, || {}).unwrap();
        // `a` ran once (not requeued by its own write), `b` ran once from
        // the initial dirty-all and once more from being woken by `a`.
        assert_eq!(runs_a.get(), 1);
        assert_eq!(runs_b.get(), 2);
    }
}
