//! Sum/cage handler: killer cages, arrows (via the builder's
//! lowering), little-killer diagonals, sandwich lines, and anything else
//! that reduces to "these cells (weighted by `coeffs`) sum to a target".

use crate::exclusions::CellExclusions;
use crate::grid::CellState;
use crate::lookup::LookupTables;
use crate::mask::CellMask;
use crate::shape::GridShape;

use super::{Accumulator, Contradiction, Handler, HandlerResult};

/// Cages above this size skip exact combination enumeration and fall back
/// to bounds-only inference (long cages get bounds-only inference).
const EXACT_COMBINATION_LIMIT: usize = 8;

#[derive(Debug)]
pub struct Sum {
    cells: Vec<usize>,
    coeffs: Vec<i64>,
    target: i64,
    num_values: usize,
    complement_cells: Option<Vec<usize>>,
    complement_target: i64,
    /// `true` once `initialize` has confirmed every pair of cage cells is
    /// mutually exclusive, which licenses the stronger exact-combination
    /// inference (a repeated value in the cage would otherwise need a
    /// different combinatorial treatment this handler doesn't implement).
    all_different: bool,
}

impl Sum {
    #[must_use]
    pub fn new(cells: Vec<usize>, target: i64, num_values: usize) -> Self {
        let coeffs = vec![1i64; cells.len()];
        Self {
            cells,
            coeffs,
            target,
            num_values,
            complement_cells: None,
            complement_target: 0,
            all_different: false,
        }
    }

    #[must_use]
    pub fn with_coeffs(cells: Vec<usize>, coeffs: Vec<i64>, target: i64, num_values: usize) -> Self {
        assert_eq!(cells.len(), coeffs.len());
        Self {
            cells,
            coeffs,
            target,
            num_values,
            complement_cells: None,
            complement_target: 0,
            all_different: false,
        }
    }

    fn cell_bounds(mask: CellMask, coeff: i64, tables: &LookupTables) -> (i64, i64) {
        let (min_v, max_v) = (
            tables.min_value(mask).unwrap_or(0) as i64,
            tables.max_value(mask).unwrap_or(0) as i64,
        );
        if coeff >= 0 {
            (coeff * min_v, coeff * max_v)
        } else {
            (coeff * max_v, coeff * min_v)
        }
    }

    fn bounds(&self, grid: &CellState, tables: &LookupTables) -> (i64, i64) {
        self.cells.iter().zip(&self.coeffs).fold(
            (0i64, 0i64),
            |(min_acc, max_acc), (&cell, &coeff)| {
                let (lo, hi) = Self::cell_bounds(grid.get(cell), coeff, tables);
                (min_acc + lo, max_acc + hi)
            },
        )
    }

    /// Bounds-tightening pass: for each cell, the value range
    /// that could still reach `target` given the min/max the *other* cells
    /// can contribute.
    fn tighten_bounds(
        &self,
        grid: &mut CellState,
        tables: &LookupTables,
        target: i64,
        accumulator: &mut Accumulator,
    ) -> HandlerResult {
        for i in 0..self.cells.len() {
            let cell = self.cells[i];
            let coeff = self.coeffs[i];
            if coeff == 0 {
                continue;
            }
            let (mut others_min, mut others_max) = (0i64, 0i64);
            for (j, (&other_cell, &other_coeff)) in self.cells.iter().zip(&self.coeffs).enumerate() {
                if i == j {
                    continue;
                }
                let (lo, hi) = Self::cell_bounds(grid.get(other_cell), other_coeff, tables);
                others_min += lo;
                others_max += hi;
            }
            // coeff * value + others in [others_min, others_max] must equal target.
            let (lo_val, hi_val) = {
                let lo = (target - others_max) as f64 / coeff as f64;
                let hi = (target - others_min) as f64 / coeff as f64;
                if coeff > 0 {
                    (lo.ceil() as i64, hi.floor() as i64)
                } else {
                    (hi.ceil() as i64, lo.floor() as i64)
                }
            };

            let mut allowed = 0u16;
            for v in 1..=self.num_values as i64 {
                if v >= lo_val && v <= hi_val {
                    allowed |= tables.from_value(v as u8);
                }
            }
            if grid.get(cell) & allowed == 0 {
                return Err(Contradiction);
            }
            if grid.remove_values(cell, !allowed) {
                return Err(Contradiction);
            }
            if grid.get(cell) != tables.all_values() {
                accumulator.add_for_cell(cell);
            }
        }
        Ok(())
    }

    /// Exact combination enumeration for short all-different cages: search
    /// every assignment of distinct values to the cage's cells (respecting
    /// current candidate masks) that sums to `target`, and intersect the
    /// surviving per-position masks back onto the grid.
    fn enforce_exact(
        &self,
        grid: &mut CellState,
        tables: &LookupTables,
        target: i64,
        accumulator: &mut Accumulator,
    ) -> HandlerResult {
        let masks: Vec<CellMask> = self.cells.iter().map(|&c| grid.get(c)).collect();
        let mut supported = vec![0u16; self.cells.len()];
        let mut used = 0u16;
        let mut assignment = vec![0u8; self.cells.len()];

        fn recurse(
            pos: usize,
            remaining_target: i64,
            masks: &[CellMask],
            coeffs: &[i64],
            tables: &LookupTables,
            used: &mut CellMask,
            assignment: &mut [u8],
            supported: &mut [CellMask],
        ) {
            if pos == masks.len() {
                if remaining_target == 0 {
                    for (slot, &v) in supported.iter_mut().zip(assignment.iter()) {
                        *slot |= tables.from_value(v);
                    }
                }
                return;
            }
            for v in tables.value_iter(masks[pos]) {
                let vmask = tables.from_value(v);
                if *used & vmask != 0 {
                    continue;
                }
                let contribution = coeffs[pos] * v as i64;
                // Bound remaining cells before recursing.
                let (mut rem_lo, mut rem_hi) = (0i64, 0i64);
                for i in (pos + 1)..masks.len() {
                    let (lo, hi) = Sum::cell_bounds(masks[i], coeffs[i], tables);
                    rem_lo += lo;
                    rem_hi += hi;
                }
                let next_target = remaining_target - contribution;
                if next_target < rem_lo || next_target > rem_hi {
                    continue;
                }
                *used |= vmask;
                assignment[pos] = v;
                recurse(
                    pos + 1,
                    next_target,
                    masks,
                    coeffs,
                    tables,
                    used,
                    assignment,
                    supported,
                );
                *used &= !vmask;
            }
        }

        recurse(
            0,
            target,
            &masks,
            &self.coeffs,
            tables,
            &mut used,
            &mut assignment,
            &mut supported,
        );

        for (i, &cell) in self.cells.iter().enumerate() {
            if supported[i] == 0 {
                return Err(Contradiction);
            }
            if grid.get(cell) & !supported[i] != 0 {
                if grid.remove_values(cell, !supported[i]) {
                    return Err(Contradiction);
                }
                accumulator.add_for_cell(cell);
            }
        }
        Ok(())
    }

    fn enforce_one(
        &self,
        cells: &[usize],
        coeffs: &[i64],
        target: i64,
        grid: &mut CellState,
        tables: &LookupTables,
        accumulator: &mut Accumulator,
    ) -> HandlerResult {
        let (min_sum, max_sum) = cells.iter().zip(coeffs).fold((0i64, 0i64), |(lo, hi), (&c, &k)| {
            let (l, h) = Self::cell_bounds(grid.get(c), k, tables);
            (lo + l, hi + h)
        });
        if target < min_sum || target > max_sum {
            return Err(Contradiction);
        }

        let sum_inner = Sum {
            cells: cells.to_vec(),
            coeffs: coeffs.to_vec(),
            target,
            num_values: self.num_values,
            complement_cells: None,
            complement_target: 0,
            all_different: self.all_different,
        };
        sum_inner.tighten_bounds(grid, tables, target, accumulator)?;
        if self.all_different && cells.len() <= EXACT_COMBINATION_LIMIT {
            sum_inner.enforce_exact(grid, tables, target, accumulator)?;
        }
        Ok(())
    }
}

impl Handler for Sum {
    fn cells(&self) -> &[usize] {
        &self.cells
    }

    fn priority(&self) -> i32 {
        if self.cells.len() <= EXACT_COMBINATION_LIMIT { -20 } else { -10 }
    }

    fn id_str(&self) -> String {
        let mut cells = self.cells.clone();
        cells.sort_unstable();
        format!("sum:{}:{cells:?}", self.target)
    }

    fn initialize(
        &mut self,
        grid: &mut CellState,
        exclusions: &mut CellExclusions,
        _shape: &GridShape,
    ) -> HandlerResult {
        let tables = LookupTables::get(self.num_values);
        let (min_sum, max_sum) = self.bounds(grid, tables);
        if self.target < min_sum || self.target > max_sum {
            return Err(Contradiction);
        }

        self.all_different = self.cells.len() <= 1
            || self
                .cells
                .iter()
                .enumerate()
                .all(|(i, &a)| {
                    self.cells[i + 1..]
                        .iter()
                        .all(|&b| exclusions.is_mutually_exclusive(a, b))
                });

        Ok(())
    }

    fn enforce_consistency(
        &mut self,
        grid: &mut CellState,
        accumulator: &mut Accumulator,
    ) -> HandlerResult {
        let tables = LookupTables::get(self.num_values);
        self.enforce_one(&self.cells, &self.coeffs, self.target, grid, tables, accumulator)?;

        if let Some(complement) = self.complement_cells.clone() {
            let complement_coeffs = vec![1i64; complement.len()];
            self.enforce_one(
                &complement,
                &complement_coeffs,
                self.complement_target,
                grid,
                tables,
                accumulator,
            )?;
        }
        Ok(())
    }

    fn set_complement_cells(&mut self, cells: Vec<usize>) {
        let house_sum = self.num_values as i64 * (self.num_values as i64 + 1) / 2;
        self.complement_target = house_sum - self.target;
        self.complement_cells = Some(cells);
    }

    fn as_sum(&self) -> Option<&Sum> {
        Some(self)
    }

    fn reads_exclusions_at_init(&self) -> bool {
        true
    }
}

impl Sum {
    /// The fixed target this handler enforces, used by the builder's
    /// redundancy check (not needed by the handler's own propagation, which
    /// only ever reads `self.target` directly).
    #[must_use]
    pub fn target(&self) -> i64 {
        self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unreachable_sum() {
        let mut h = Sum::new(vec![0, 1], 100, 9);
        let mut grid = CellState::new(2, LookupTables::get(9).all_values());
        let mut ex = CellExclusions::new(2);
        let shape = GridShape::new(1, 2, 9);
        assert_eq!(h.initialize(&mut grid, &mut ex, &shape), Err(Contradiction));
    }

    #[test]
    fn two_cell_cage_prunes_to_combination() {
        // {1,4} summing to 5, all-different.
        let mut h = Sum::new(vec![0, 1], 5, 9);
        let mut grid = CellState::new(2, LookupTables::get(9).all_values());
        let mut ex = CellExclusions::new(2);
        ex.add_mutual_exclusion(0, 1).unwrap();
        let shape = GridShape::new(1, 2, 9);
        h.initialize(&mut grid, &mut ex, &shape).unwrap();
        let mut acc = crate::handler::test_support::throwaway_accumulator(2);
        h.enforce_consistency(&mut grid, &mut acc).unwrap();
        let t = LookupTables::get(9);
        let expected = t.from_value(1) | t.from_value(2) | t.from_value(3) | t.from_value(4);
        assert_eq!(grid.get(0), expected);
        assert_eq!(grid.get(1), expected);
    }
}
