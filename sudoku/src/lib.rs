//! A propagation engine for Sudoku-family constraint puzzles:
//! per-cell candidate bitmasks, a scheduler of pluggable constraint
//! handlers, a mutual-exclusion relation shared across handlers, and a
//! depth-first search engine on top. The textual constraint grammar, any
//! UI, and transport plumbing are all external collaborators — this crate
//! only consumes a [`constraint::Constraint`] tree and produces
//! [`search::Progress`] snapshots.

pub mod bitset;
pub mod builder;
pub mod constraint;
pub mod error;
pub mod exclusions;
pub mod grid;
pub mod handler;
pub mod lookup;
pub mod mask;
pub mod search;
pub mod shape;
pub mod solution;
pub mod stats;

pub use builder::Builder;
pub use constraint::Constraint;
pub use error::Error;
pub use mask::{CellMask, CellValue};
pub use search::{Operation, Progress, SearchEngine, SearchOutcome, StepClass, StopReason};
pub use shape::GridShape;
pub use stats::SearchStats;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_api_builds_and_solves_a_puzzle() {
        let givens: &[(&str, u8)] = &[
            ("R1C1", 5), ("R1C2", 3), ("R1C5", 7),
            ("R2C1", 6), ("R2C4", 1), ("R2C5", 9), ("R2C6", 5),
            ("R3C2", 9), ("R3C3", 8), ("R3C8", 6),
            ("R4C1", 8), ("R4C5", 6), ("R4C9", 3),
            ("R5C1", 4), ("R5C4", 8), ("R5C6", 3), ("R5C9", 1),
            ("R6C1", 7), ("R6C5", 2), ("R6C9", 6),
            ("R7C2", 6), ("R7C7", 2), ("R7C8", 8),
            ("R8C4", 4), ("R8C5", 1), ("R8C6", 9), ("R8C9", 5),
            ("R9C5", 8), ("R9C8", 7), ("R9C9", 9),
        ];
        let constraints: Vec<Constraint> = givens
            .iter()
            .map(|&(cell, value)| Constraint::Given { cell: cell.to_string(), value })
            .collect();

        let builder = Builder::new(constraints).expect("valid constraint tree");
        let mut engine = builder.build().expect("buildable");
        let outcome = engine.run(Operation::FindNthSolution { n: 1 }, |_| false);
        assert_eq!(outcome.reason, StopReason::SatisfiedOperation);
        assert_eq!(outcome.solutions.len(), 1);

        let progress = engine.progress_from(&outcome, true);
        assert!(progress.done);
        assert_eq!(progress.solutions.len(), 1);
        assert!(!progress.solutions[0].contains('.'));
    }
}
