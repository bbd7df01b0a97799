//! A small fixed-universe bitset over cell indices.
//!
//! Grids top out at 16x16 = 256 cells, so a handful of `u64` words always
//! suffice; this avoids reaching for a `HashSet<usize>` on every
//! cell-exclusion cache.

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CellBitSet {
    words: Vec<u64>,
}

impl CellBitSet {
    #[must_use]
    pub fn new(universe_size: usize) -> Self {
        Self {
            words: vec![0u64; universe_size.div_ceil(64).max(1)],
        }
    }

    #[must_use]
    pub fn from_cells(universe_size: usize, cells: impl IntoIterator<Item = usize>) -> Self {
        let mut set = Self::new(universe_size);
        for cell in cells {
            set.insert(cell);
        }
        set
    }

    #[inline]
    pub fn insert(&mut self, cell: usize) {
        self.words[cell / 64] |= 1u64 << (cell % 64);
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, cell: usize) -> bool {
        (self.words[cell / 64] >> (cell % 64)) & 1 != 0
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            words: self
                .words
                .iter()
                .zip(other.words.iter())
                .map(|(a, b)| a | b)
                .collect(),
        }
    }

    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        Self {
            words: self
                .words
                .iter()
                .zip(other.words.iter())
                .map(|(a, b)| a & b)
                .collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Iterates set cell indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(word_idx, &word)| {
            let mut remaining = word;
            std::iter::from_fn(move || {
                if remaining == 0 {
                    return None;
                }
                let bit = remaining.trailing_zeros() as usize;
                remaining &= remaining - 1;
                Some(word_idx * 64 + bit)
            })
        })
    }

    #[must_use]
    pub fn to_sorted_vec(&self) -> Vec<usize> {
        self.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_membership() {
        let set = CellBitSet::from_cells(100, [3, 17, 64, 99]);
        assert!(set.contains(3));
        assert!(set.contains(99));
        assert!(!set.contains(4));
        assert_eq!(set.len(), 4);
        assert_eq!(set.to_sorted_vec(), vec![3, 17, 64, 99]);
    }

    #[test]
    fn union_and_intersection() {
        let a = CellBitSet::from_cells(64, [1, 2, 3]);
        let b = CellBitSet::from_cells(64, [2, 3, 4]);
        assert_eq!(a.union(&b).to_sorted_vec(), vec![1, 2, 3, 4]);
        assert_eq!(a.intersection(&b).to_sorted_vec(), vec![2, 3]);
    }
}
