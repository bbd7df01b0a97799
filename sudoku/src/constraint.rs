//! The consumed constraint tree: a parsed, tagged description of
//! a puzzle handed to the [`crate::builder::Builder`]. The textual grammar
//! that produces this tree is an external collaborator — this
//! module only defines the shape the builder lowers from.

use serde::{Deserialize, Serialize};

/// A cell reference in the `R{row}C{col}` convention, resolved to
/// a linear index by [`crate::shape::GridShape::parse_cell_id`] at build
/// time.
pub type CellRef = String;

/// A tagged constraint node. One variant per recognized constraint type;
/// each carries whatever payload its lowering is
/// defined over.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Constraint {
    /// Configures the grid dimensions. At most one may appear in a tree;
    /// the builder defaults to a 9x9/3x3 classic shape if none is given.
    Shape {
        num_rows: usize,
        num_cols: usize,
        num_values: usize,
        box_height: Option<usize>,
        box_width: Option<usize>,
    },
    /// Pins a single cell to a fixed value before any handler initializes.
    Given { cell: CellRef, value: u8 },
    /// Multiple independent `Given`s in one node (a convenience wrapper
    /// some hosts use instead of repeating `Given`).
    FixedValues { cells: Vec<CellRef>, values: Vec<u8> },

    AllDifferent { cells: Vec<CellRef> },
    Jigsaw { regions: Vec<Vec<CellRef>> },
    Diagonal { anti: bool },
    AntiKnight,
    AntiKing,
    AntiConsecutive,
    NoBoxes,
    Windoku,
    RegionSize { width: usize, height: usize },

    Cage {
        cells: Vec<CellRef>,
        sum: i64,
        #[serde(default)]
        coeffs: Option<Vec<i64>>,
    },
    Thermo { cells: Vec<CellRef> },
    Arrow { shaft: Vec<CellRef>, head: Vec<CellRef> },
    DoubleArrow { shaft: Vec<CellRef>, heads: [CellRef; 2] },
    PillArrow { shaft: Vec<CellRef>, head: Vec<CellRef> },
    Whisper { cells: Vec<CellRef>, min_diff: u8 },
    GermanWhispers { cells: Vec<CellRef> },
    Palindrome { cells: Vec<CellRef> },
    Between { cells: Vec<CellRef> },
    Renban { cells: Vec<CellRef> },
    Lockout { cells: Vec<CellRef>, min_diff: u8 },
    LittleKiller { cells: Vec<CellRef>, sum: i64 },
    Sandwich { cells: Vec<CellRef>, sum: i64 },
    Skyscraper { cells: Vec<CellRef>, visible: usize },
    Lunchbox { cells: Vec<CellRef>, sum: i64 },

    Kropki { a: CellRef, b: CellRef, dot: KropkiDot },
    XV { a: CellRef, b: CellRef, target: u8 },
    Quadruple { cells: Vec<CellRef>, values: Vec<u8> },
    CountingCircles { cells: Vec<CellRef> },
    Indexing { index_cell: CellRef, target_cells: Vec<CellRef> },
    ValueIndexing { index_cell: CellRef, target_cells: Vec<CellRef> },

    RegionSumLine { cells: Vec<CellRef> },
    SumLine { cells: Vec<CellRef>, sum: i64 },
    ModularLine { cells: Vec<CellRef>, modulus: u8 },
    EntropicLine { cells: Vec<CellRef> },
    ZipperLine { cells: Vec<CellRef> },
    Regex { cells: Vec<CellRef>, pattern: String },
    Nfa { cells: Vec<CellRef>, dfa: NfaSpec },

    SameValue { a: CellRef, b: CellRef },
    SameValues { group_a: Vec<CellRef>, group_b: Vec<CellRef> },
    EqualityCage { group_a: Vec<CellRef>, group_b: Vec<CellRef>, sum: i64 },
    GreaterThan { a: CellRef, b: CellRef },
    DutchFlatmates { a: CellRef, b: CellRef },
    FullRank { cells: Vec<CellRef> },

    Or { children: Vec<Constraint> },
    And { children: Vec<Constraint> },
    Set { children: Vec<Constraint> },
    Clone { source: CellRef, target: CellRef },
    OrGivens { options: Vec<Vec<(CellRef, u8)>> },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum KropkiDot {
    White,
    Black,
}

/// A serializable transition table for [`Constraint::Nfa`], mirroring
/// [`crate::handler::Dfa`] but expressed over raw values rather than masks
/// so it survives round-tripping through the parser collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NfaSpec {
    pub num_states: usize,
    pub start: usize,
    pub accepting: Vec<usize>,
    /// `(from_state, allowed_values, to_state)` triples.
    pub transitions: Vec<(usize, Vec<u8>, usize)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let c = Constraint::Cage {
            cells: vec!["R1C1".into(), "R1C2".into()],
            sum: 5,
            coeffs: None,
        };
        let json = serde_json::to_string(&c).unwrap();
        let back: Constraint = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, Constraint::Cage { sum: 5, .. }));
    }
}
