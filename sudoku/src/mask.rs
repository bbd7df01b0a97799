//! The packed bitmask representation shared by every cell.

/// One bit per possible value; bit `v - 1` set means value `v` is still a
/// candidate. An empty mask (`0`) signals a contradiction at that cell.
///
/// `num_values <= 16` (enforced by [`crate::shape::GridShape`]) so a `u16`
/// always suffices.
pub type CellMask = u16;

/// A cell's value, disambiguated from the raw packed mask.
///
/// The source material this crate generalizes overloads "value" with a
/// number, a set of numbers, or nothing depending on context; call sites here
/// use this explicit sum type instead whenever that distinction matters (the
/// raw [`CellMask`] remains the hot-path representation inside propagation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellValue {
    /// Exactly one candidate remains: the cell is settled.
    Fixed(u8),
    /// More than one candidate remains.
    Pencilmarks(CellMask),
    /// No candidates remain: the cell is contradictory.
    Unknown,
}

impl CellValue {
    /// Classifies a raw mask using `tables` for popcount/min-value lookups.
    #[must_use]
    pub fn from_mask(mask: CellMask, tables: &crate::lookup::LookupTables) -> Self {
        match tables.popcount(mask) {
            0 => CellValue::Unknown,
            1 => CellValue::Fixed(tables.min_value(mask).expect("popcount 1 implies a value")),
            _ => CellValue::Pencilmarks(mask),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::LookupTables;

    #[test]
    fn classifies_masks() {
        let t = LookupTables::get(9);
        assert_eq!(CellValue::from_mask(0, t), CellValue::Unknown);
        assert_eq!(CellValue::from_mask(t.from_value(3), t), CellValue::Fixed(3));
        let pencil = t.from_value(1) | t.from_value(2);
        assert_eq!(CellValue::from_mask(pencil, t), CellValue::Pencilmarks(pencil));
    }
}
