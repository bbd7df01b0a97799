//! The mutual-exclusion relation between cells.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::bitset::CellBitSet;
use crate::error::SealedError;

/// Symmetric "these cells must take different values" relation.
///
/// Mutable during handler initialization (`add_mutual_exclusion`,
/// `are_same_value`); the moment any getter is called the structure seals
/// and every subsequent mutator call returns [`SealedError`]. This is
/// load-bearing: handlers that read the relation during `enforce_consistency`
/// must see a relation that can no longer move under them.
///
/// Caches (bitset-per-cell, pair exclusions, list exclusions) are filled
/// lazily behind a `RefCell` so read-only getters can still memoize without
/// needing `&mut self` — the engine holds this structure behind a shared
/// reference for the whole solve once sealed.
#[derive(Debug)]
pub struct CellExclusions {
    num_cells: usize,
    neighbors: Vec<Vec<usize>>,
    sealed: Cell<bool>,
    bitset_cache: RefCell<Vec<Option<CellBitSet>>>,
    pair_cache: RefCell<HashMap<usize, Vec<usize>>>,
    list_cache: RefCell<HashMap<Vec<usize>, Vec<usize>>>,
}

impl CellExclusions {
    #[must_use]
    pub fn new(num_cells: usize) -> Self {
        Self {
            num_cells,
            neighbors: vec![Vec::new(); num_cells],
            sealed: Cell::new(false),
            bitset_cache: RefCell::new(vec![None; num_cells]),
            pair_cache: RefCell::new(HashMap::new()),
            list_cache: RefCell::new(HashMap::new()),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed.get()
    }

    /// Registers that `a` and `b` may never hold the same value.
    ///
    /// `a == b` is accepted silently: contradictory user constraints can
    /// produce self-exclusion edges, and downstream consumers tolerate a
    /// cell appearing in its own neighbor list rather than crashing on it.
    pub fn add_mutual_exclusion(&mut self, a: usize, b: usize) -> Result<(), SealedError> {
        if self.sealed.get() {
            return Err(SealedError);
        }
        insert_sorted(&mut self.neighbors[a], b);
        if a != b {
            insert_sorted(&mut self.neighbors[b], a);
        }
        Ok(())
    }

    /// Registers the all-pairs mutual exclusion for `cells` (used by
    /// `AllDifferent`-flavored handlers).
    pub fn add_all_different(&mut self, cells: &[usize]) -> Result<(), SealedError> {
        for i in 0..cells.len() {
            for j in (i + 1)..cells.len() {
                self.add_mutual_exclusion(cells[i], cells[j])?;
            }
        }
        Ok(())
    }

    /// Declares that `a` and `b` must hold equal values: merges their
    /// exclusion sets so that anything excluded from one is excluded from
    /// the other, and propagates the merge to every third cell that already
    /// referenced either.
    pub fn are_same_value(&mut self, a: usize, b: usize) -> Result<(), SealedError> {
        if self.sealed.get() {
            return Err(SealedError);
        }
        if a == b {
            return Ok(());
        }
        let old_a = std::mem::take(&mut self.neighbors[a]);
        let old_b = std::mem::take(&mut self.neighbors[b]);

        let mut union: Vec<usize> = old_a.iter().chain(old_b.iter()).copied().collect();
        union.sort_unstable();
        union.dedup();

        self.neighbors[a] = union.clone();
        self.neighbors[b] = union;

        for &x in &old_a {
            if x != b {
                insert_sorted(&mut self.neighbors[x], b);
            }
        }
        for &x in &old_b {
            if x != a {
                insert_sorted(&mut self.neighbors[x], a);
            }
        }
        Ok(())
    }

    fn seal(&self) {
        self.sealed.set(true);
    }

    /// The neighbor set of `cell` as a sorted, deduplicated array.
    #[must_use]
    pub fn get_array(&self, cell: usize) -> Vec<usize> {
        self.seal();
        self.neighbors[cell].clone()
    }

    /// The neighbor set of `cell` as a cached [`CellBitSet`].
    pub fn get_bit_set(&self, cell: usize) -> CellBitSet {
        self.seal();
        let mut cache = self.bitset_cache.borrow_mut();
        if cache[cell].is_none() {
            cache[cell] = Some(CellBitSet::from_cells(
                self.num_cells,
                self.neighbors[cell].iter().copied(),
            ));
        }
        cache[cell].clone().expect("just inserted")
    }

    /// `true` iff `a` and `b` mutually exclude each other. Tolerates `a ==
    /// b` appearing in its own neighbor list (contradictory user input) by
    /// simply answering according to whatever's in the array, rather than
    /// special-casing it.
    #[must_use]
    pub fn is_mutually_exclusive(&self, a: usize, b: usize) -> bool {
        self.seal();
        self.neighbors[a].binary_search(&b).is_ok()
    }

    /// Cells mutually exclusive with *both* `a` and `b`, cached by the
    /// canonical unordered-pair key `min(a,b) * num_cells + max(a,b)`.
    #[must_use]
    pub fn get_pair_exclusions(&self, a: usize, b: usize) -> Vec<usize> {
        self.seal();
        let (lo, hi) = (a.min(b), a.max(b));
        let key = lo * self.num_cells + hi;
        let mut cache = self.pair_cache.borrow_mut();
        cache
            .entry(key)
            .or_insert_with(|| intersect_sorted(&self.neighbors[a], &self.neighbors[b]))
            .clone()
    }

    /// Cells mutually exclusive with *every* member of `cells`, cached by
    /// the sorted member list.
    #[must_use]
    pub fn get_list_exclusions(&self, cells: &[usize]) -> Vec<usize> {
        self.seal();
        let mut key: Vec<usize> = cells.to_vec();
        key.sort_unstable();
        key.dedup();
        let mut cache = self.list_cache.borrow_mut();
        if let Some(hit) = cache.get(&key) {
            return hit.clone();
        }
        let result = match key.split_first() {
            None => Vec::new(),
            Some((first, rest)) => {
                let mut acc = self.neighbors[*first].clone();
                for &c in rest {
                    acc = intersect_sorted(&acc, &self.neighbors[c]);
                }
                acc
            }
        };
        cache.insert(key, result.clone());
        result
    }
}

fn insert_sorted(list: &mut Vec<usize>, value: usize) {
    if let Err(pos) = list.binary_search(&value) {
        list.insert(pos, value);
    }
}

fn intersect_sorted(a: &[usize], b: &[usize]) -> Vec<usize> {
    let (mut i, mut j) = (0, 0);
    let mut out = Vec::new();
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symmetric() {
        let mut ex = CellExclusions::new(5);
        ex.add_mutual_exclusion(0, 1).unwrap();
        assert!(ex.is_mutually_exclusive(0, 1));
        assert!(ex.is_mutually_exclusive(1, 0));
    }

    #[test]
    fn seals_after_first_getter() {
        let mut ex = CellExclusions::new(3);
        ex.add_mutual_exclusion(0, 1).unwrap();
        let _ = ex.get_array(0);
        assert!(ex.is_sealed());
        assert!(matches!(
            ex.add_mutual_exclusion(1, 2),
            Err(SealedError)
        ));
        assert!(matches!(ex.are_same_value(0, 2), Err(SealedError)));
    }

    #[test]
    fn are_same_value_propagates_to_third_cells() {
        // 0 excludes 2; 1 excludes 3. After are_same_value(0, 1):
        // both 0 and 1 exclude {2, 3}, and 2/3 each now exclude the other's
        // original partner too.
        let mut ex = CellExclusions::new(4);
        ex.add_mutual_exclusion(0, 2).unwrap();
        ex.add_mutual_exclusion(1, 3).unwrap();
        ex.are_same_value(0, 1).unwrap();

        assert!(ex.is_mutually_exclusive(0, 2));
        assert!(ex.is_mutually_exclusive(0, 3));
        assert!(ex.is_mutually_exclusive(1, 2));
        assert!(ex.is_mutually_exclusive(1, 3));
        // third-cell symmetry: 2 was excluded from 0 before the merge, so
        // afterward it must also be excluded from 1, and vice versa for 3.
        assert!(ex.is_mutually_exclusive(2, 1));
        assert!(ex.is_mutually_exclusive(3, 0));
    }

    #[test]
    fn self_exclusion_tolerated() {
        let mut ex = CellExclusions::new(2);
        ex.add_mutual_exclusion(0, 0).unwrap();
        assert!(ex.is_mutually_exclusive(0, 0));
    }

    #[test]
    fn pair_and_list_exclusions() {
        let mut ex = CellExclusions::new(6);
        // cells 0,1 both excluded by 2,3,4; only 0 excluded by 5.
        for other in [2, 3, 4] {
            ex.add_mutual_exclusion(0, other).unwrap();
            ex.add_mutual_exclusion(1, other).unwrap();
        }
        ex.add_mutual_exclusion(0, 5).unwrap();

        let mut pair = ex.get_pair_exclusions(0, 1);
        pair.sort_unstable();
        assert_eq!(pair, vec![2, 3, 4]);

        let mut list = ex.get_list_exclusions(&[0, 1]);
        list.sort_unstable();
        assert_eq!(list, vec![2, 3, 4]);
    }
}
