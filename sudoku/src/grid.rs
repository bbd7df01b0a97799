//! The cell mask buffer and its undo trail.

use crate::mask::CellMask;

/// Dense per-cell candidate masks, with a flat undo journal of
/// `(cell, prior_mask)` pairs recorded since the last checkpoint.
///
/// All mutation flows through [`CellState::set`] so that every write is
/// trailed; nothing else is allowed to touch the mask array directly. This
/// mirrors a `Defer`-style undo stack (`(value, pos)` pairs popped to undo
/// a cascade) generalized to whole-mask writes and a dynamic cell count.
#[derive(Debug, Clone)]
pub struct CellState {
    masks: Vec<CellMask>,
    trail: Vec<(usize, CellMask)>,
}

impl CellState {
    /// Builds a grid of `num_cells` cells, all initialized to `full_mask`.
    #[must_use]
    pub fn new(num_cells: usize, full_mask: CellMask) -> Self {
        Self {
            masks: vec![full_mask; num_cells],
            trail: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn num_cells(&self) -> usize {
        self.masks.len()
    }

    /// Current candidate mask at `cell`.
    #[inline]
    #[must_use]
    pub fn get(&self, cell: usize) -> CellMask {
        self.masks[cell]
    }

    /// Writes `new_mask` to `cell`, trailing the prior value if it changed.
    ///
    /// Returns `true` if `new_mask` is empty (a contradiction at this cell).
    /// The write still happens and is still trailed in that case: the
    /// caller backtracks via [`Self::restore_to`], it doesn't leave the grid
    /// mid-update.
    #[inline]
    pub fn set(&mut self, cell: usize, new_mask: CellMask) -> bool {
        let prior = self.masks[cell];
        if prior != new_mask {
            self.trail.push((cell, prior));
            self.masks[cell] = new_mask;
        }
        new_mask == 0
    }

    /// Intersects `cell`'s mask with `remove_mask` removed (i.e. `mask &
    /// !remove_mask`). Convenience wrapper used by handlers that prune a
    /// specific set of values rather than compute a whole new mask.
    #[inline]
    pub fn remove_values(&mut self, cell: usize, remove_mask: CellMask) -> bool {
        self.set(cell, self.masks[cell] & !remove_mask)
    }

    /// Current trail length, to be passed back to [`Self::restore_to`].
    #[inline]
    #[must_use]
    pub fn checkpoint(&self) -> usize {
        self.trail.len()
    }

    /// Undoes every mutation recorded since `checkpoint`, restoring each
    /// trailed cell to its prior mask in reverse order.
    ///
    /// `O(k)` where `k` is the number of mutations since `checkpoint`.
    pub fn restore_to(&mut self, checkpoint: usize) {
        debug_assert!(checkpoint <= self.trail.len());
        while self.trail.len() > checkpoint {
            let (cell, prior) = self.trail.pop().expect("checked by loop condition");
            self.masks[cell] = prior;
        }
    }

    /// `true` iff every cell holds exactly one candidate.
    #[must_use]
    pub fn is_solved(&self, tables: &crate::lookup::LookupTables) -> bool {
        self.masks.iter().all(|&m| tables.popcount(m) == 1)
    }

    /// Snapshot of every cell's mask, in cell-index order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<CellMask> {
        self.masks.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restore_undoes_exactly_to_checkpoint() {
        let mut grid = CellState::new(3, 0b111);
        let cp = grid.checkpoint();
        grid.set(0, 0b110);
        grid.set(1, 0b100);
        assert_eq!(grid.get(0), 0b110);
        assert_eq!(grid.get(1), 0b100);
        grid.restore_to(cp);
        assert_eq!(grid.get(0), 0b111);
        assert_eq!(grid.get(1), 0b111);
    }

    #[test]
    fn nested_checkpoints() {
        let mut grid = CellState::new(2, 0b11);
        let cp1 = grid.checkpoint();
        grid.set(0, 0b01);
        let cp2 = grid.checkpoint();
        grid.set(1, 0b10);
        grid.restore_to(cp2);
        assert_eq!(grid.get(1), 0b11);
        assert_eq!(grid.get(0), 0b01);
        grid.restore_to(cp1);
        assert_eq!(grid.get(0), 0b11);
    }

    #[test]
    fn set_reports_contradiction_and_still_trails() {
        let mut grid = CellState::new(1, 0b11);
        let cp = grid.checkpoint();
        assert!(grid.set(0, 0));
        assert_eq!(grid.get(0), 0);
        grid.restore_to(cp);
        assert_eq!(grid.get(0), 0b11);
    }

    #[test]
    fn no_op_write_does_not_trail() {
        let mut grid = CellState::new(1, 0b11);
        grid.set(0, 0b11);
        assert_eq!(grid.checkpoint(), 0);
    }
}
