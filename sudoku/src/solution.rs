//! Value <-> character mapping and the "short solution" string encoding
//! format.

use crate::grid::CellState;
use crate::lookup::LookupTables;

/// Character used for `1..=9`, then `A..=G` for `10..=16`.
#[must_use]
pub fn value_to_char(value: u8) -> Option<char> {
    match value {
        1..=9 => Some((b'0' + value) as char),
        10..=16 => Some((b'A' + (value - 10)) as char),
        _ => None,
    }
}

/// Inverse of [`value_to_char`].
#[must_use]
pub fn char_to_value(c: char) -> Option<u8> {
    match c {
        '1'..='9' => Some(c as u8 - b'0'),
        'A'..='G' => Some(c as u8 - b'A' + 10),
        _ => None,
    }
}

/// Encodes a grid as the length-`num_cells` "short solution" string: one
/// character per cell in row-major order, `1..9` then `A..G`, and `.` for
/// any cell whose candidate set doesn't have size exactly 1.
#[must_use]
pub fn encode_short_solution(grid: &CellState, tables: &LookupTables) -> String {
    encode_mask_row(&grid.snapshot(), tables)
}

/// Same encoding as [`encode_short_solution`], over a raw mask slice (a
/// solution snapshot taken during search, rather than a live grid).
#[must_use]
pub fn encode_mask_row(masks: &[crate::mask::CellMask], tables: &LookupTables) -> String {
    let mut out = String::with_capacity(masks.len());
    for &mask in masks {
        match tables.popcount(mask) {
            1 => {
                let value = tables.min_value(mask).expect("popcount 1 implies a value");
                out.push(value_to_char(value).expect("value within lookup range"));
            }
            _ => out.push('.'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_roundtrip() {
        for v in 1..=16u8 {
            let c = value_to_char(v).unwrap();
            assert_eq!(char_to_value(c), Some(v));
        }
    }

    #[test]
    fn encodes_mixed_grid() {
        let tables = LookupTables::get(9);
        let mut grid = CellState::new(3, tables.all_values());
        grid.set(0, tables.from_value(5));
        grid.set(1, tables.from_value(1) | tables.from_value(2));
        // cell 2 left at all_values (unsolved)
        assert_eq!(encode_short_solution(&grid, tables), "5..");
    }
}
