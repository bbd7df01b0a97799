//! DFA-over-a-line handler: renban/german-whispers-style lines,
//! palindromes, and anything else expressible as "walk this ordered list of
//! cells through a finite automaton whose edges are labeled by value masks".

use crate::grid::CellState;
use crate::lookup::LookupTables;
use crate::mask::CellMask;

use super::{Accumulator, Contradiction, Handler, HandlerResult};

/// An automaton over values `1..=num_values`: `transitions[state]` lists the
/// outgoing edges from `state` as `(value_mask, target_state)` pairs. An
/// edge fires for a cell if the cell's candidate mask intersects its
/// `value_mask`.
#[derive(Debug, Clone)]
pub struct Dfa {
    start: usize,
    accepting: Vec<bool>,
    transitions: Vec<Vec<(CellMask, usize)>>,
}

impl Dfa {
    #[must_use]
    pub fn new(num_states: usize, start: usize) -> Self {
        assert!(start < num_states);
        Self {
            start,
            accepting: vec![false; num_states],
            transitions: vec![Vec::new(); num_states],
        }
    }

    pub fn set_accepting(&mut self, state: usize, accepting: bool) {
        self.accepting[state] = accepting;
    }

    pub fn add_transition(&mut self, from: usize, value_mask: CellMask, to: usize) {
        self.transitions[from].push((value_mask, to));
    }

    fn num_states(&self) -> usize {
        self.accepting.len()
    }

    /// Two-state "all values distinct from the previous cell" automaton,
    /// generalized to an arbitrary per-step relation closure — used to build
    /// e.g. German whisper lines (`|a - b| >= threshold`) by taking
    /// `relation(prev, cur)` over every ordered pair and folding it into a
    /// single accepting state per "last value seen".
    #[must_use]
    pub fn from_step_relation(num_values: usize, relation: impl Fn(u8, u8) -> bool) -> Self {
        let tables = LookupTables::get(num_values);
        // One state per "last value emitted", plus a single start state.
        let mut dfa = Dfa::new(num_values + 1, num_values);
        for v in 1..=num_values as u8 {
            dfa.set_accepting(v as usize - 1, true);
            dfa.add_transition(num_values, tables.from_value(v), v as usize - 1);
        }
        for prev in 1..=num_values as u8 {
            let mut by_target: Vec<(u8, CellMask)> = Vec::new();
            for next in 1..=num_values as u8 {
                if relation(prev, next) {
                    by_target.push((next, tables.from_value(next)));
                }
            }
            for (next, mask) in by_target {
                dfa.add_transition(prev as usize - 1, mask, next as usize - 1);
            }
        }
        dfa
    }
}

/// Enforces a [`Dfa`] walk over an ordered list of cells.
#[derive(Debug)]
pub struct DfaLine {
    cells: Vec<usize>,
    dfa: Dfa,
}

impl DfaLine {
    #[must_use]
    pub fn new(cells: Vec<usize>, dfa: Dfa) -> Self {
        Self { cells, dfa }
    }

    /// Forward reachability: `forward[i][s]` is whether `s` is reachable
    /// after consuming cells `0..i` under their *current* candidate masks.
    fn forward_reachable(&self, grid: &CellState) -> Vec<Vec<bool>> {
        let n = self.cells.len();
        let num_states = self.dfa.num_states();
        let mut forward = vec![vec![false; num_states]; n + 1];
        forward[0][self.dfa.start] = true;
        for i in 0..n {
            let mask = grid.get(self.cells[i]);
            for s in 0..num_states {
                if !forward[i][s] {
                    continue;
                }
                for &(edge_mask, target) in &self.dfa.transitions[s] {
                    if edge_mask & mask != 0 {
                        forward[i + 1][target] = true;
                    }
                }
            }
        }
        forward
    }

    /// Backward reachability: `backward[i][s]` is whether an accepting state
    /// can still be reached from `s` consuming cells `i..n` under their
    /// current candidate masks.
    fn backward_reachable(&self, grid: &CellState) -> Vec<Vec<bool>> {
        let n = self.cells.len();
        let num_states = self.dfa.num_states();
        let mut backward = vec![vec![false; num_states]; n + 1];
        backward[n] = self.dfa.accepting.clone();
        for i in (0..n).rev() {
            let mask = grid.get(self.cells[i]);
            for s in 0..num_states {
                let reaches = self.dfa.transitions[s]
                    .iter()
                    .any(|&(edge_mask, target)| edge_mask & mask != 0 && backward[i + 1][target]);
                backward[i][s] = reaches;
            }
        }
        backward
    }
}

impl Handler for DfaLine {
    fn cells(&self) -> &[usize] {
        &self.cells
    }

    fn priority(&self) -> i32 {
        -10
    }

    fn id_str(&self) -> String {
        format!("dfa_line:{:?}", self.cells)
    }

    fn enforce_consistency(
        &mut self,
        grid: &mut CellState,
        accumulator: &mut Accumulator,
    ) -> HandlerResult {
        let forward = self.forward_reachable(grid);
        let backward = self.backward_reachable(grid);
        let n = self.cells.len();

        if !self.dfa.accepting.iter().enumerate().any(|(s, &acc)| acc && forward[n][s]) {
            return Err(Contradiction);
        }

        for i in 0..n {
            let mask = grid.get(self.cells[i]);
            let mut allowed: CellMask = 0;
            for s in 0..self.dfa.num_states() {
                if !forward[i][s] {
                    continue;
                }
                for &(edge_mask, target) in &self.dfa.transitions[s] {
                    if backward[i + 1][target] {
                        allowed |= edge_mask & mask;
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
    fn german_whisper_prunes_adjacent_cells() {
        // |a - b| >= 5 over 9 values.
        let dfa = Dfa::from_step_relation(9, |a, b| a.abs_diff(b) >= 5);
        let mut h = DfaLine::new(vec![0, 1], dfa);
        let t = LookupTables::get(9);
        let mut grid = CellState::new(2, t.all_values());
        grid.set(0, t.from_value(9));
        let mut acc = crate::handler::test_support::throwaway_accumulator(2);
        h.enforce_consistency(&mut grid, &mut acc).unwrap();
        // only 1,2,3,4 are >=5 away from 9.
        let expected = t.from_value(1) | t.from_value(2) | t.from_value(3) | t.from_value(4);
        assert_eq!(grid.get(1), expected);
    }

    #[test]
    fn contradiction_when_no_path_survives() {
        let dfa = Dfa::from_step_relation(9, |a, b| a.abs_diff(b) >= 5);
        let mut h = DfaLine::new(vec![0, 1], dfa);
        let t = LookupTables::get(9);
        let mut grid = CellState::new(2, t.all_values());
        grid.set(0, t.from_value(5));
        grid.set(1, t.from_value(6));
        let mut acc = crate::handler::test_support::throwaway_accumulator(2);
        assert_eq!(h.enforce_consistency(&mut grid, &mut acc), Err(Contradiction));
    }
}
