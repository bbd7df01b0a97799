//! Meta-handlers over child sub-handlers: `And` runs every
//! child in turn, `Or` prunes only what every child would prune.

use crate::exclusions::CellExclusions;
use crate::grid::CellState;
use crate::shape::GridShape;

use super::{Accumulator, Contradiction, Handler, HandlerResult};

/// Depth budget for `Or`'s per-branch re-propagation (re-runs
/// propagation within each branch to a fixed depth"). One full round per
/// child is enough to surface the pruning a child handler alone can derive
/// from the branch's private grid copy; deeper search belongs to the outer
/// engine, not a meta-handler.
const OR_BRANCH_ROUNDS: usize = 1;

/// Every child must hold. Equivalent to running each child handler as if it
/// were registered directly, just grouped under one `id_str`/`cells()` pair
/// for builder-level deduplication.
#[derive(Debug)]
pub struct And {
    cells: Vec<usize>,
    children: Vec<Box<dyn Handler>>,
}

impl And {
    #[must_use]
    pub fn new(children: Vec<Box<dyn Handler>>) -> Self {
        let mut cells: Vec<usize> = children.iter().flat_map(|c| c.cells().to_vec()).collect();
        cells.sort_unstable();
        cells.dedup();
        Self { cells, children }
    }
}

impl Handler for And {
    fn cells(&self) -> &[usize] {
        &self.cells
    }

    fn id_str(&self) -> String {
        let mut ids: Vec<String> = self.children.iter().map(|c| c.id_str()).collect();
        ids.sort_unstable();
        format!("and:{ids:?}")
    }

    fn initialize(
        &mut self,
        grid: &mut CellState,
        exclusions: &mut CellExclusions,
        shape: &GridShape,
    ) -> HandlerResult {
        for child in &mut self.children {
            child.initialize(grid, exclusions, shape)?;
        }
        Ok(())
    }

    /// `And` forwards `initialize` straight to its children against the real
    /// exclusions relation (unlike `Or`, which isolates each branch behind a
    /// scratch copy), so it reads exclusions at init iff any child does —
    /// the builder needs this to keep a nested reading child from sealing
    /// the relation ahead of an unrelated top-level mutator.
    fn reads_exclusions_at_init(&self) -> bool {
        self.children.iter().any(|c| c.reads_exclusions_at_init())
    }

    fn enforce_consistency(
        &mut self,
        grid: &mut CellState,
        accumulator: &mut Accumulator,
    ) -> HandlerResult {
        for child in &mut self.children {
            child.enforce_consistency(grid, accumulator)?;
        }
        Ok(())
    }
}

/// At least one child must hold. Can only prune a value from a cell if
/// *every* child's private branch agrees the value is gone, so the handler
/// clones the grid per branch, runs each child to a fixed depth on its own
/// copy, and unions the surviving candidate masks back onto the real grid.
///
/// A branch that contradicts outright contributes nothing (an empty mask)
/// to the union — it's simply excluded from the "at least one holds" set,
/// which is exactly what "this disjunct is impossible" should mean.
#[derive(Debug)]
pub struct Or {
    cells: Vec<usize>,
    children: Vec<Box<dyn Handler>>,
}

impl Or {
    #[must_use]
    pub fn new(children: Vec<Box<dyn Handler>>) -> Self {
        let mut cells: Vec<usize> = children.iter().flat_map(|c| c.cells().to_vec()).collect();
        cells.sort_unstable();
        cells.dedup();
        Self { cells, children }
    }

    /// Runs `child` against a scratch copy of `grid` for [`OR_BRANCH_ROUNDS`]
    /// rounds, returning `None` if the branch contradicts, or the resulting
    /// per-cell masks over [`Self::cells`] otherwise.
    fn branch_masks(&self, child: &mut Box<dyn Handler>, grid: &CellState) -> Option<Vec<u16>> {
        let mut scratch = grid.clone();
        let mut scheduler = super::ScratchScheduler::new(scratch.num_cells());
        for _ in 0..OR_BRANCH_ROUNDS {
            if child
                .enforce_consistency(&mut scratch, &mut scheduler.accumulator())
                .is_err()
            {
                return None;
            }
        }
        Some(self.cells.iter().map(|&c| scratch.get(c)).collect())
    }
}

impl Handler for Or {
    fn cells(&self) -> &[usize] {
        &self.cells
    }

    fn id_str(&self) -> String {
        let mut ids: Vec<String> = self.children.iter().map(|c| c.id_str()).collect();
        ids.sort_unstable();
        format!("or:{ids:?}")
    }

    fn initialize(
        &mut self,
        grid: &mut CellState,
        exclusions: &mut CellExclusions,
        shape: &GridShape,
    ) -> HandlerResult {
        // Exclusions are shared, sealed state: a disjunction can't commit
        // any child's mutual-exclusion pairs without ruling out the others,
        // so `Or` deliberately does not forward `initialize` to its
        // children beyond handing each a scratch grid to validate itself
        // against statically. A child detecting its own branch is
        // unreachable simply drops out of the union below instead of
        // failing the whole `Or`.
        let _ = exclusions;
        for child in &mut self.children {
            let mut scratch_grid = grid.clone();
            let mut scratch_exclusions = CellExclusions::new(scratch_grid.num_cells());
            let _ = child.initialize(&mut scratch_grid, &mut scratch_exclusions, shape);
        }
        Ok(())
    }

    fn enforce_consistency(
        &mut self,
        grid: &mut CellState,
        accumulator: &mut Accumulator,
    ) -> HandlerResult {
        let mut union: Vec<u16> = vec![0; self.cells.len()];
        let mut any_branch_survives = false;

        for child in &mut self.children {
            if let Some(masks) = self.branch_masks(child, grid) {
                any_branch_survives = true;
                for (slot, mask) in union.iter_mut().zip(masks) {
                    *slot |= mask;
                }
            }
        }

        if !any_branch_survives {
            return Err(Contradiction);
        }

        for (&cell, &allowed) in self.cells.iter().zip(&union) {
            let mask = grid.get(cell);
            if mask & !allowed != 0 {
                if grid.remove_values(cell, !allowed) {
                    return Err(Contradiction);
                }
                accumulator.add_for_cell(cell);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::LookupTables;

    #[derive(Debug)]
    struct FixTo {
        cell: usize,
        value: u8,
    }
    impl Handler for FixTo {
        fn cells(&self) -> &[usize] {
            std::slice::from_ref(&self.cell)
        }
        fn id_str(&self) -> String {
            format!("fix:{}:{}", self.cell, self.value)
        }
        fn enforce_consistency(
            &mut self,
            grid: &mut CellState,
            accumulator: &mut Accumulator,
        ) -> HandlerResult {
            let tables = LookupTables::get(4);
            let mask = tables.from_value(self.value);
            if grid.get(self.cell) & mask == 0 {
                return Err(Contradiction);
            }
            if grid.remove_values(self.cell, !mask) {
                return Err(Contradiction);
            }
            accumulator.add_for_cell(self.cell);
            Ok(())
        }
    }

    #[test]
    fn and_runs_every_child() {
        let mut h = And::new(vec![
            Box::new(FixTo { cell: 0, value: 1 }),
            Box::new(FixTo { cell: 1, value: 2 }),
        ]);
        let t = LookupTables::get(4);
        let mut grid = CellState::new(2, t.all_values());
        let mut acc = crate::handler::test_support::throwaway_accumulator(2);
        h.enforce_consistency(&mut grid, &mut acc).unwrap();
        assert_eq!(grid.get(0), t.from_value(1));
        assert_eq!(grid.get(1), t.from_value(2));
    }

    #[test]
    fn or_unions_surviving_branches() {
        // cell 0 is either 1 or 2: the union must keep both candidates.
        let mut h = Or::new(vec![
            Box::new(FixTo { cell: 0, value: 1 }),
            Box::new(FixTo { cell: 0, value: 2 }),
        ]);
        let t = LookupTables::get(4);
        let mut grid = CellState::new(1, t.all_values());
        let mut acc = crate::handler::test_support::throwaway_accumulator(1);
        h.enforce_consistency(&mut grid, &mut acc).unwrap();
        assert_eq!(grid.get(0), t.from_value(1) | t.from_value(2));
    }

    #[test]
    fn or_contradicts_when_every_branch_fails() {
        let mut h = Or::new(vec![
            Box::new(FixTo { cell: 0, value: 1 }),
            Box::new(FixTo { cell: 0, value: 2 }),
        ]);
        let t = LookupTables::get(4);
        let mut grid = CellState::new(1, t.from_value(3));
        let mut acc = crate::handler::test_support::throwaway_accumulator(1);
        assert_eq!(h.enforce_consistency(&mut grid, &mut acc), Err(Contradiction));
    }
}
