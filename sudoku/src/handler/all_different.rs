//! All-different handler.

use crate::exclusions::CellExclusions;
use crate::grid::CellState;
use crate::lookup::LookupTables;
use crate::shape::GridShape;

use super::{Accumulator, Contradiction, Handler, HandlerResult};

/// Cells that must hold pairwise distinct values.
///
/// Registers the all-pairs mutual exclusion during `initialize`; afterward
/// it mostly rides the generic naked-single/hidden-single inference that
/// every handler benefits from through the shared exclusions relation. Its
/// own `enforce_consistency` handles the two things that are specific to
/// "distinct values over exactly this cell list": stripping a fixed value
/// from its exclusive neighbors within the group, and catching the case
/// where more cells are in the group than there are values to fill them.
#[derive(Debug)]
pub struct AllDifferent {
    cells: Vec<usize>,
    num_values: usize,
}

impl AllDifferent {
    #[must_use]
    pub fn new(cells: Vec<usize>, num_values: usize) -> Self {
        Self { cells, num_values }
    }
}

impl Handler for AllDifferent {
    fn cells(&self) -> &[usize] {
        &self.cells
    }

    fn priority(&self) -> i32 {
        -40
    }

    fn id_str(&self) -> String {
        let mut cells = self.cells.clone();
        cells.sort_unstable();
        format!("all_different:{cells:?}")
    }

    fn initialize(
        &mut self,
        _grid: &mut CellState,
        exclusions: &mut CellExclusions,
        _shape: &GridShape,
    ) -> HandlerResult {
        if self.cells.len() > self.num_values {
            return Err(Contradiction);
        }
        exclusions
            .add_all_different(&self.cells)
            .expect("exclusions not sealed during initialize");
        Ok(())
    }

    fn enforce_consistency(
        &mut self,
        grid: &mut CellState,
        accumulator: &mut Accumulator,
    ) -> HandlerResult {
        let tables = LookupTables::get(self.num_values);

        let fixed: Vec<(usize, u16)> = self
            .cells
            .iter()
            .copied()
            .filter_map(|c| {
                let mask = grid.get(c);
                (tables.popcount(mask) == 1).then_some((c, mask))
            })
            .collect();

        for &(fixed_cell, fixed_mask) in &fixed {
            for &other in &self.cells {
                if other == fixed_cell {
                    continue;
                }
                let mask = grid.get(other);
                if mask & fixed_mask != 0 {
                    if mask == fixed_mask {
                        return Err(Contradiction);
                    }
                    if grid.remove_values(other, fixed_mask) {
                        return Err(Contradiction);
                    }
                    accumulator.add_for_cell(other);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn propagate_once(h: &mut AllDifferent, grid: &mut CellState) -> HandlerResult {
        let mut accumulator = crate::handler::test_support::throwaway_accumulator(grid.num_cells());
        h.enforce_consistency(grid, &mut accumulator)
    }

    #[test]
    fn rejects_oversized_group() {
        let mut h = AllDifferent::new(vec![0, 1, 2, 3], 3);
        let mut grid = CellState::new(4, 0b111);
        let mut exclusions = CellExclusions::new(4);
        let shape = GridShape::new(2, 2, 3);
        assert_eq!(h.initialize(&mut grid, &mut exclusions, &shape), Err(Contradiction));
    }

    #[test]
    fn strips_fixed_value_from_peers() {
        let mut h = AllDifferent::new(vec![0, 1, 2], 3);
        let mut grid = CellState::new(3, 0b111);
        grid.set(0, 0b001);
        assert!(propagate_once(&mut h, &mut grid).is_ok());
        assert_eq!(grid.get(1), 0b110);
        assert_eq!(grid.get(2), 0b110);
    }
}
