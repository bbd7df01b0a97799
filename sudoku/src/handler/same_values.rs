//! Same-values handler: two equal-size cell lists whose
//! values, as multisets, must match — used for things like "these two
//! rows of an anti-knight board contain the same digits in some order".

use crate::exclusions::CellExclusions;
use crate::grid::CellState;
use crate::shape::GridShape;

use super::{Accumulator, Contradiction, Handler, HandlerResult};

#[derive(Debug)]
pub struct SameValues {
    group_a: Vec<usize>,
    group_b: Vec<usize>,
    all_cells: Vec<usize>,
}

impl SameValues {
    /// `num_values` isn't needed by this handler's own inference (which
    /// only ever intersects candidate masks it's handed, never builds a
    /// mask from a raw value), but every other handler constructor takes
    /// it so the builder can treat them uniformly.
    #[must_use]
    pub fn new(group_a: Vec<usize>, group_b: Vec<usize>, _num_values: usize) -> Self {
        assert_eq!(group_a.len(), group_b.len(), "same_values groups must be equal size");
        let all_cells = group_a.iter().chain(group_b.iter()).copied().collect();
        Self {
            group_a,
            group_b,
            all_cells,
        }
    }

    /// The union of candidate values each group can possibly contribute;
    /// each side must be able to cover whatever the other side requires.
    fn union_mask(group: &[usize], grid: &CellState) -> u16 {
        group.iter().fold(0u16, |acc, &c| acc | grid.get(c))
    }
}

impl Handler for SameValues {
    fn cells(&self) -> &[usize] {
        &self.all_cells
    }

    fn priority(&self) -> i32 {
        -5
    }

    fn id_str(&self) -> String {
        let mut a = self.group_a.clone();
        let mut b = self.group_b.clone();
        a.sort_unstable();
        b.sort_unstable();
        format!("same_values:{a:?}:{b:?}")
    }

    fn initialize(
        &mut self,
        _grid: &mut CellState,
        exclusions: &mut CellExclusions,
        _shape: &GridShape,
    ) -> HandlerResult {
        if self.group_a.len() == 1 {
            exclusions
                .are_same_value(self.group_a[0], self.group_b[0])
                .expect("exclusions not sealed during initialize");
        }
        Ok(())
    }

    fn enforce_consistency(
        &mut self,
        grid: &mut CellState,
        accumulator: &mut Accumulator,
    ) -> HandlerResult {
        // Neither group can use a value the other side has no candidate
        // for at all — the multisets must match exactly, so a value absent
        // from every cell in B can't appear in A either, and vice versa.
        let union_a = Self::union_mask(&self.group_a, grid);
        let union_b = Self::union_mask(&self.group_b, grid);
        let shared = union_a & union_b;
        if shared == 0 {
            return Err(Contradiction);
        }

        for &cell in &self.group_a {
            let mask = grid.get(cell);
            if mask & !shared != 0 {
                if grid.remove_values(cell, !shared) {
                    return Err(Contradiction);
                }
                accumulator.add_for_cell(cell);
            }
        }
        for &cell in &self.group_b {
            let mask = grid.get(cell);
            if mask & !shared != 0 {
                if grid.remove_values(cell, !shared) {
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

    #[test]
    fn pair_case_pins_equal_candidates() {
        let mut h = SameValues::new(vec![0], vec![1], 4);
        let t = LookupTables::get(4);
        let mut grid = CellState::new(2, t.all_values());
        grid.set(0, t.from_value(2) | t.from_value(3));
        let mut acc = crate::handler::test_support::throwaway_accumulator(2);
        h.enforce_consistency(&mut grid, &mut acc).unwrap();
        assert_eq!(grid.get(1), t.from_value(2) | t.from_value(3));
    }

    #[test]
    fn disjoint_candidate_unions_contradict() {
        let mut h = SameValues::new(vec![0], vec![1], 4);
        let t = LookupTables::get(4);
        let mut grid = CellState::new(2, t.all_values());
        grid.set(0, t.from_value(1));
        grid.set(1, t.from_value(2));
        let mut acc = crate::handler::test_support::throwaway_accumulator(2);
        assert_eq!(h.enforce_consistency(&mut grid, &mut acc), Err(Contradiction));
    }
}
