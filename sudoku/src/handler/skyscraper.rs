//! Skyscraper / visible-peaks handler: scanning an ordered
//! list of cells from one end, the number of "new tallest so far" values
//! seen must equal a fixed target.

use crate::exclusions::CellExclusions;
use crate::grid::CellState;
use crate::lookup::LookupTables;
use crate::shape::GridShape;

use super::{Accumulator, Contradiction, Handler, HandlerResult};

/// `cells` in viewing order (index 0 is nearest the viewer). `target` is the
/// exact count of values that are a new running maximum when scanned in
/// that order.
#[derive(Debug)]
pub struct Skyscraper {
    cells: Vec<usize>,
    target: usize,
    num_values: usize,
}

impl Skyscraper {
    #[must_use]
    pub fn new(cells: Vec<usize>, target: usize, num_values: usize) -> Self {
        Self { cells, target, num_values }
    }

    /// `forward[i][max][count]`: reachable after consuming cells `0..i`
    /// with running max `max` (0 meaning "none yet") and `count` peaks seen.
    fn forward_reachable(&self, grid: &CellState) -> Vec<Vec<Vec<bool>>> {
        let n = self.cells.len();
        let tables = LookupTables::get(self.num_values);
        let mut forward = vec![vec![vec![false; n + 1]; self.num_values + 1]; n + 1];
        forward[0][0][0] = true;
        for i in 0..n {
            let mask = grid.get(self.cells[i]);
            for max in 0..=self.num_values {
                for count in 0..=n {
                    if !forward[i][max][count] {
                        continue;
                    }
                    for v in tables.value_iter(mask) {
                        let v = v as usize;
                        let (new_max, new_count) = if v > max { (v, count + 1) } else { (max, count) };
                        if new_count <= n {
                            forward[i + 1][new_max][new_count] = true;
                        }
                    }
                }
            }
        }
        forward
    }

    /// `backward[i][max][needed]`: starting at position `i` with running
    /// max `max`, whether exactly `needed` more peaks can be produced by
    /// cells `i..n` *and* the line's overall maximum ends up `>= n` (spec
    /// §4.3.5's "the maximum along the line is >= numCells"). The base case
    /// at `i == n` is where that requirement actually bites: with no cells
    /// left, the running max carried in is the line's final max, so it only
    /// counts as feasible when it already clears the `n` threshold.
    fn backward_feasible(&self, grid: &CellState) -> Vec<Vec<Vec<bool>>> {
        let n = self.cells.len();
        let tables = LookupTables::get(self.num_values);
        let mut backward = vec![vec![vec![false; n + 1]; self.num_values + 1]; n + 1];
        for max in 0..=self.num_values {
            backward[n][max][0] = max >= n;
        }
        for i in (0..n).rev() {
            let mask = grid.get(self.cells[i]);
            for max in 0..=self.num_values {
                for needed in 0..=n {
                    let mut ok = false;
                    for v in tables.value_iter(mask) {
                        let v = v as usize;
                        if v > max {
                            if needed >= 1 && backward[i + 1][v][needed - 1] {
                                ok = true;
                                break;
                            }
                        } else if backward[i + 1][max][needed] {
                            ok = true;
                            break;
                        }
                    }
                    backward[i][max][needed] = ok;
                }
            }
        }
        backward
    }
}

impl Handler for Skyscraper {
    fn cells(&self) -> &[usize] {
        &self.cells
    }

    fn priority(&self) -> i32 {
        -5
    }

    fn id_str(&self) -> String {
        format!("skyscraper:{}:{:?}", self.target, self.cells)
    }

    fn initialize(
        &mut self,
        _grid: &mut CellState,
        _exclusions: &mut CellExclusions,
        _shape: &GridShape,
    ) -> HandlerResult {
        if self.target > self.cells.len() {
            return Err(Contradiction);
        }
        Ok(())
    }

    fn enforce_consistency(
        &mut self,
        grid: &mut CellState,
        accumulator: &mut Accumulator,
    ) -> HandlerResult {
        let n = self.cells.len();
        if self.target > n {
            return Err(Contradiction);
        }
        let tables = LookupTables::get(self.num_values);
        let forward = self.forward_reachable(grid);
        let backward = self.backward_feasible(grid);

        if !(n..=self.num_values).any(|max| forward[n][max][self.target]) {
            return Err(Contradiction);
        }

        for i in 0..n {
            let mask = grid.get(self.cells[i]);
            let mut allowed = 0u16;
            for max in 0..=self.num_values {
                for count in 0..=n {
                    if !forward[i][max][count] {
                        continue;
                    }
                    for v in tables.value_iter(mask) {
                        let vv = v as usize;
                        let (new_max, new_count) = if vv > max { (vv, count + 1) } else { (max, count) };
                        if new_count > self.target {
                            continue;
                        }
                        let needed = self.target - new_count;
                        if backward[i + 1][new_max][needed] {
                            allowed |= tables.from_value(v);
                        }
                    }
                }
            }
            if allowed == 0 {
                return Err(Contradiction);
            }
            if allowed != mask {
                if grid.remove_values(self.cells[i], !allowed) {
                    return Err(Contradiction);
                }
                accumulator.add_for_cell(self.cells[i]);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_one_forces_max_first() {
        // 4 cells, exactly 1 peak visible means the first cell must be the
        // largest value, 4.
        let mut h = Skyscraper::new(vec![0, 1, 2, 3], 1, 4);
        let t = LookupTables::get(4);
        let mut grid = CellState::new(4, t.all_values());
        let mut acc = crate::handler::test_support::throwaway_accumulator(4);
        h.enforce_consistency(&mut grid, &mut acc).unwrap();
        assert_eq!(grid.get(0), t.from_value(4));
    }

    #[test]
    fn visibility_full_forces_strictly_increasing() {
        let mut h = Skyscraper::new(vec![0, 1, 2, 3], 4, 4);
        let t = LookupTables::get(4);
        let mut grid = CellState::new(4, t.all_values());
        let mut acc = crate::handler::test_support::throwaway_accumulator(4);
        h.enforce_consistency(&mut grid, &mut acc).unwrap();
        assert_eq!(grid.get(0), t.from_value(1));
        assert_eq!(grid.get(3), t.from_value(4));
    }

    #[test]
    fn line_max_below_num_cells_does_not_falsely_satisfy_one_peak() {
        // Without the line-max >= numCells requirement, [3,3,3,3] has
        // exactly one prefix-maximum and would wrongly leave cell 0's mask
        // full; the line max (3) never reaches the 4-cell threshold, so
        // only a completion through 4 may satisfy the one-peak count.
        let mut h = Skyscraper::new(vec![0, 1, 2, 3], 1, 4);
        let t = LookupTables::get(4);
        let mut grid = CellState::new(4, t.all_values());
        let mut acc = crate::handler::test_support::throwaway_accumulator(4);
        h.enforce_consistency(&mut grid, &mut acc).unwrap();
        assert_eq!(grid.get(0), t.from_value(4));
        for cell in 1..4 {
            assert_eq!(grid.get(cell) & t.from_value(4), 0);
        }
    }

    #[test]
    fn visibility_greater_than_line_length_rejected_at_init() {
        let mut h = Skyscraper::new(vec![0, 1, 2], 4, 4);
        let mut grid = CellState::new(3, LookupTables::get(4).all_values());
        let mut exclusions = CellExclusions::new(3);
        let shape = GridShape::new(1, 3, 4);
        assert_eq!(
            h.initialize(&mut grid, &mut exclusions, &shape),
            Err(Contradiction)
        );
    }
}
