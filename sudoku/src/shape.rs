//! Grid dimensions and cell indexing.

/// Immutable descriptor of a puzzle grid's dimensions.
///
/// A cell's linear index is `row * num_cols + col`. The box tiling
/// (`box_height` x `box_width`) is optional: some grids (irregular/jigsaw
/// shapes, or sizes that don't factor nicely) have no uniform box regions at
/// all, in which case `boxes()` yields nothing and callers fall back to
/// row/column houses plus whatever region constraints the builder lowered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridShape {
    num_rows: usize,
    num_cols: usize,
    num_values: usize,
    box_height: Option<usize>,
    box_width: Option<usize>,
}

impl GridShape {
    /// Values fit in a `u16` bitmask, so `num_values` can't exceed 16.
    pub const MAX_VALUES: usize = 16;

    /// Builds a shape with no box tiling (row/column houses only).
    ///
    /// Panics if `num_values` exceeds [`Self::MAX_VALUES`] or is smaller than
    /// the larger of `num_rows`/`num_cols` (a house can't hold more distinct
    /// cells than there are values to fill them with).
    pub fn new(num_rows: usize, num_cols: usize, num_values: usize) -> Self {
        assert!(num_values <= Self::MAX_VALUES, "num_values must be <= 16");
        assert!(
            num_values >= num_rows.max(num_cols),
            "num_values must be at least max(num_rows, num_cols)"
        );
        Self {
            num_rows,
            num_cols,
            num_values,
            box_height: None,
            box_width: None,
        }
    }

    /// Builds a shape with uniform `box_height` x `box_width` tiling.
    ///
    /// Panics unless the boxes evenly tile the grid (`num_rows % box_height
    /// == 0` and `num_cols % box_width == 0`), in addition to the checks in
    /// [`Self::new`].
    pub fn with_boxes(
        num_rows: usize,
        num_cols: usize,
        num_values: usize,
        box_height: usize,
        box_width: usize,
    ) -> Self {
        assert!(box_height > 0 && box_width > 0);
        assert_eq!(num_rows % box_height, 0, "box_height must tile num_rows");
        assert_eq!(num_cols % box_width, 0, "box_width must tile num_cols");
        let mut shape = Self::new(num_rows, num_cols, num_values);
        shape.box_height = Some(box_height);
        shape.box_width = Some(box_width);
        shape
    }

    #[inline]
    #[must_use]
    pub const fn num_rows(&self) -> usize {
        self.num_rows
    }

    #[inline]
    #[must_use]
    pub const fn num_cols(&self) -> usize {
        self.num_cols
    }

    #[inline]
    #[must_use]
    pub const fn num_values(&self) -> usize {
        self.num_values
    }

    #[inline]
    #[must_use]
    pub const fn num_cells(&self) -> usize {
        self.num_rows * self.num_cols
    }

    #[inline]
    #[must_use]
    pub const fn box_height(&self) -> Option<usize> {
        self.box_height
    }

    #[inline]
    #[must_use]
    pub const fn box_width(&self) -> Option<usize> {
        self.box_width
    }

    #[inline]
    #[must_use]
    pub const fn has_boxes(&self) -> bool {
        self.box_height.is_some() && self.box_width.is_some()
    }

    /// Linear index of the cell at `(row, col)`.
    #[inline]
    #[must_use]
    pub const fn cell_index(&self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.num_rows);
        debug_assert!(col < self.num_cols);
        row * self.num_cols + col
    }

    /// Row/column of a linear cell index.
    #[inline]
    #[must_use]
    pub const fn row_col(&self, cell: usize) -> (usize, usize) {
        (cell / self.num_cols, cell % self.num_cols)
    }

    /// The box index (`0..num_boxes`) containing a cell, if boxes are
    /// configured.
    #[must_use]
    pub fn box_index(&self, cell: usize) -> Option<usize> {
        let (bh, bw) = (self.box_height?, self.box_width?);
        let (row, col) = self.row_col(cell);
        let boxes_per_row = self.num_cols / bw;
        Some((row / bh) * boxes_per_row + (col / bw))
    }

    /// Cell-ID string, `R{row+1}C{col+1}`.
    #[must_use]
    pub fn cell_id(&self, cell: usize) -> String {
        let (row, col) = self.row_col(cell);
        format!("R{}C{}", row + 1, col + 1)
    }

    /// Parses a cell-ID string of the form `R{row}C{col}` (1-indexed) back
    /// into a linear cell index.
    #[must_use]
    pub fn parse_cell_id(&self, id: &str) -> Option<usize> {
        let rest = id.strip_prefix('R')?;
        let (row_str, col_str) = rest.split_once('C')?;
        let row: usize = row_str.parse().ok()?;
        let col: usize = col_str.parse().ok()?;
        if row == 0 || col == 0 || row > self.num_rows || col > self.num_cols {
            return None;
        }
        Some(self.cell_index(row - 1, col - 1))
    }

    /// Cells in the given row, in column order.
    pub fn row_cells(&self, row: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_cols).map(move |col| self.cell_index(row, col))
    }

    /// Cells in the given column, in row order.
    pub fn col_cells(&self, col: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_rows).map(move |row| self.cell_index(row, col))
    }

    /// Cells in the given box, in row-major order within the box.
    ///
    /// Returns an empty vector if the shape has no box tiling.
    #[must_use]
    pub fn box_cells(&self, box_index: usize) -> Vec<usize> {
        let (Some(bh), Some(bw)) = (self.box_height, self.box_width) else {
            return Vec::new();
        };
        let boxes_per_row = self.num_cols / bw;
        let box_row = box_index / boxes_per_row;
        let box_col = box_index % boxes_per_row;
        let mut cells = Vec::with_capacity(bh * bw);
        for r in 0..bh {
            for c in 0..bw {
                cells.push(self.cell_index(box_row * bh + r, box_col * bw + c));
            }
        }
        cells
    }

    /// Number of boxes, or 0 if the shape has no box tiling.
    #[must_use]
    pub fn num_boxes(&self) -> usize {
        match (self.box_height, self.box_width) {
            (Some(bh), Some(bw)) => (self.num_rows / bh) * (self.num_cols / bw),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classic_9x9_boxes() {
        let shape = GridShape::with_boxes(9, 9, 9, 3, 3);
        assert_eq!(shape.num_cells(), 81);
        assert_eq!(shape.num_boxes(), 9);
        assert_eq!(shape.box_index(0), Some(0));
        assert_eq!(shape.box_index(shape.cell_index(4, 4)), Some(4));
        assert_eq!(shape.box_cells(4).len(), 9);
    }

    #[test]
    fn cell_id_roundtrip() {
        let shape = GridShape::new(9, 9, 9);
        for cell in 0..shape.num_cells() {
            let id = shape.cell_id(cell);
            assert_eq!(shape.parse_cell_id(&id), Some(cell));
        }
    }

    #[test]
    fn rectangular_grid_without_boxes() {
        let shape = GridShape::new(4, 6, 6);
        assert!(!shape.has_boxes());
        assert_eq!(shape.num_boxes(), 0);
        assert!(shape.box_cells(0).is_empty());
    }

    #[test]
    #[should_panic]
    fn rejects_too_few_values() {
        GridShape::new(9, 9, 8);
    }
}
