//! Two-cell relation handler: Kropki dots, XV, thermometer
//! steps, and every other "these two adjacent cells must satisfy relation R"
//! constraint lower to this one primitive with a different table.

use crate::exclusions::CellExclusions;
use crate::grid::CellState;
use crate::lookup::LookupTables;
use crate::mask::CellMask;

use super::{Accumulator, Contradiction, Handler, HandlerResult};

/// A relation over two cells, represented per-value rather than as a full
/// `2^n x 2^n` table: `allowed_for_b[v - 1]` is the mask of values cell `b`
/// may hold when cell `a` holds `v`. Given a whole candidate mask for `a`,
/// the supported mask for `b` is the union (`|`) of `allowed_for_b[v - 1]`
/// over every candidate `v`, which is equivalent to the relation table
/// describes but doesn't require materializing all `2^num_values` rows.
#[derive(Debug, Clone)]
pub struct BinaryTable {
    num_values: usize,
    allowed_for_b: Vec<CellMask>,
    allowed_for_a: Vec<CellMask>,
    irreflexive: bool,
}

impl BinaryTable {
    /// Builds the table from a symmetric-or-not predicate `allowed(va, vb)`
    /// (1-indexed values).
    #[must_use]
    pub fn from_relation(num_values: usize, allowed: impl Fn(u8, u8) -> bool) -> Self {
        let mut allowed_for_b = vec![0u16; num_values];
        let mut allowed_for_a = vec![0u16; num_values];
        let mut irreflexive = true;
        for va in 1..=num_values as u8 {
            for vb in 1..=num_values as u8 {
                if allowed(va, vb) {
                    allowed_for_b[va as usize - 1] |= 1 << (vb - 1);
                    allowed_for_a[vb as usize - 1] |= 1 << (va - 1);
                    if va == vb {
                        irreflexive = false;
                    }
                }
            }
        }
        Self {
            num_values,
            allowed_for_b,
            allowed_for_a,
            irreflexive,
        }
    }

    /// Kropki white dot: consecutive values.
    #[must_use]
    pub fn consecutive(num_values: usize) -> Self {
        Self::from_relation(num_values, |a, b| a.abs_diff(b) == 1)
    }

    /// Kropki black dot: one value is double the other.
    #[must_use]
    pub fn ratio(num_values: usize, ratio: u8) -> Self {
        Self::from_relation(num_values, move |a, b| {
            a == b.saturating_mul(ratio) || b == a.saturating_mul(ratio)
        })
    }

    /// XV: the pair sums to `target` (3 for X, 5 for V).
    #[must_use]
    pub fn sums_to(num_values: usize, target: u8) -> Self {
        Self::from_relation(num_values, move |a, b| a + b == target)
    }

    /// Plain inequality: `a != b`. The degenerate relation `AllDifferent`
    /// reduces to for a 2-cell group, and the one every other table is
    /// implicitly intersected with via `CellExclusions`.
    #[must_use]
    pub fn not_equal(num_values: usize) -> Self {
        Self::from_relation(num_values, |a, b| a != b)
    }

    /// Strict ordering `a < b`, used by thermometer/arrow-shaft adjacent
    /// pairs and `GreaterThan`.
    #[must_use]
    pub fn less_than(num_values: usize) -> Self {
        Self::from_relation(num_values, |a, b| a < b)
    }

    fn support_for_b(&self, mask_a: CellMask) -> CellMask {
        let tables = LookupTables::get(self.num_values);
        tables
            .value_iter(mask_a)
            .fold(0u16, |acc, v| acc | self.allowed_for_b[v as usize - 1])
    }

    fn support_for_a(&self, mask_b: CellMask) -> CellMask {
        let tables = LookupTables::get(self.num_values);
        tables
            .value_iter(mask_b)
            .fold(0u16, |acc, v| acc | self.allowed_for_a[v as usize - 1])
    }

    /// A value forced to appear in *every* valid `(a, b)` pair consistent
    /// with `mask_a`/`mask_b`, if the relation is irreflexive and such a
    /// value exists. `None` for reflexive relations (a value could "satisfy
    /// itself" so nothing is forced onto the pair as a whole).
    fn forced_pair_value(&self, mask_a: CellMask, mask_b: CellMask) -> Option<CellMask> {
        if !self.irreflexive {
            return None;
        }
        let tables = LookupTables::get(self.num_values);
        let mut common = tables.all_values();
        let mut any_pair = false;
        for va in tables.value_iter(mask_a) {
            if self.allowed_for_b[va as usize - 1] & mask_b == 0 {
                continue;
            }
            for vb in tables.value_iter(self.allowed_for_b[va as usize - 1] & mask_b) {
                any_pair = true;
                common &= tables.from_value(va) | tables.from_value(vb);
                if common == 0 {
                    return None;
                }
            }
        }
        any_pair.then_some(common).filter(|&c| c != 0)
    }
}

/// Enforces a [`BinaryTable`] relation over exactly two cells.
#[derive(Debug)]
pub struct BinaryConstraint {
    cells: [usize; 2],
    table: BinaryTable,
}

impl BinaryConstraint {
    #[must_use]
    pub fn new(a: usize, b: usize, table: BinaryTable) -> Self {
        Self { cells: [a, b], table }
    }
}

impl Handler for BinaryConstraint {
    fn cells(&self) -> &[usize] {
        &self.cells
    }

    fn priority(&self) -> i32 {
        -30
    }

    fn id_str(&self) -> String {
        format!("binary:{}:{}", self.cells[0], self.cells[1])
    }

    fn enforce_consistency(
        &mut self,
        grid: &mut CellState,
        accumulator: &mut Accumulator,
    ) -> HandlerResult {
        let [a, b] = self.cells;
        let (mask_a, mask_b) = (grid.get(a), grid.get(b));

        let new_b = mask_b & self.table.support_for_b(mask_a);
        if new_b == 0 {
            return Err(Contradiction);
        }
        if new_b != mask_b {
            grid.set(b, new_b);
            accumulator.add_for_cell(b);
        }

        let new_a = mask_a & self.table.support_for_a(new_b);
        if new_a == 0 {
            return Err(Contradiction);
        }
        if new_a != mask_a {
            grid.set(a, new_a);
            accumulator.add_for_cell(a);
        }

        Ok(())
    }
}

/// A [`BinaryConstraint`] whose forced-pair-value (when irreflexive) is
/// additionally stripped from every cell mutually excluded from both
/// endpoints — the "pair exclusion" inference, split out so
/// it can run only where the caller has a live [`CellExclusions`] handle
/// (it's an `initialize`-time derived fact, not something `enforce_consistency`
/// alone can see without it).
#[derive(Debug)]
pub struct BinaryPairwise {
    inner: BinaryConstraint,
    pair_exclusions: Vec<usize>,
}

impl BinaryPairwise {
    #[must_use]
    pub fn new(a: usize, b: usize, table: BinaryTable) -> Self {
        Self {
            inner: BinaryConstraint::new(a, b, table),
            pair_exclusions: Vec::new(),
        }
    }
}

impl Handler for BinaryPairwise {
    fn cells(&self) -> &[usize] {
        self.inner.cells()
    }

    fn priority(&self) -> i32 {
        -30
    }

    fn id_str(&self) -> String {
        format!("binary_pairwise:{}:{}", self.inner.cells[0], self.inner.cells[1])
    }

    fn initialize(
        &mut self,
        _grid: &mut CellState,
        exclusions: &mut CellExclusions,
        _shape: &crate::shape::GridShape,
    ) -> HandlerResult {
        let [a, b] = self.inner.cells;
        self.pair_exclusions = exclusions.get_pair_exclusions(a, b);
        Ok(())
    }

    fn reads_exclusions_at_init(&self) -> bool {
        true
    }

    fn enforce_consistency(
        &mut self,
        grid: &mut CellState,
        accumulator: &mut Accumulator,
    ) -> HandlerResult {
        self.inner.enforce_consistency(grid, accumulator)?;

        let [a, b] = self.inner.cells;
        if let Some(forced) = self
            .inner
            .table
            .forced_pair_value(grid.get(a), grid.get(b))
        {
            for &cell in &self.pair_exclusions {
                if grid.get(cell) & forced != 0 {
                    if grid.remove_values(cell, forced) {
                        return Err(Contradiction);
                    }
                    accumulator.add_for_cell(cell);
                }
            }
        }
        Ok(())
    }
}
