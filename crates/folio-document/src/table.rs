//! Span-aware table grid editing.
//!
//! ## The Occupancy Map
//!
//! With `colspan`/`rowspan`, a row's list of cells no longer lines up with
//! grid columns. The editor therefore derives, per operation, a grid of
//! `(row, col) -> originating cell`:
//!
//! ```text
//!  cells            occupancy
//!  row0: A(rs=2) B  | A | B |
//!  row1: C          | A | C |   <- A spans into row1, C lands in col 1
//! ```
//!
//! Structural edits consult the map to tell a cell's *originating* row or
//! column apart from positions it merely spans into, so one logical cell is
//! never shrunk or removed twice.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;

use crate::{TableError, TableResult};

/// Largest accepted `colspan`, as in HTML.
pub const MAX_COL_SPAN: usize = 1000;

/// Largest accepted `rowspan`, as in HTML.
pub const MAX_ROW_SPAN: usize = 65534;

/// How many grid positions a cell covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellSpan {
    pub col_span: usize,
    pub row_span: usize,
}

impl CellSpan {
    /// A 1×1 cell.
    pub const SINGLE: CellSpan = CellSpan {
        col_span: 1,
        row_span: 1,
    };

    /// Creates a span clamped to `1..=MAX_COL_SPAN` and `1..=MAX_ROW_SPAN`.
    pub fn new(col_span: usize, row_span: usize) -> Self {
        Self {
            col_span: col_span.clamp(1, MAX_COL_SPAN),
            row_span: row_span.clamp(1, MAX_ROW_SPAN),
        }
    }
}

impl Default for CellSpan {
    fn default() -> Self {
        Self::SINGLE
    }
}

/// Read access to a table made of rows of cells, each carrying a [`CellSpan`].
///
/// ## Learning: Associated Types
///
/// `Cell` is chosen by the implementor: the in-memory [`Table`] uses a
/// row/index pair, the tree adapter uses the cell's `NodeId`. The editor
/// only needs to copy, compare and hash handles.
pub trait GridLayout {
    /// Handle identifying one cell.
    type Cell: Copy + Eq + Hash + Debug;

    /// Number of rows.
    fn row_count(&self) -> usize;

    /// Cells defined in a row, left to right.
    fn row_cells(&self, row: usize) -> Vec<Self::Cell>;

    /// The cell's span, within the `CellSpan::new` bounds.
    fn span(&self, cell: Self::Cell) -> CellSpan;
}

/// A [`GridLayout`] that can be structurally edited.
pub trait GridSurface: GridLayout {
    /// Replaces the cell's span.
    fn set_span(&mut self, cell: Self::Cell, span: CellSpan);

    /// Appends an empty 1×1 cell to a row.
    fn append_cell(&mut self, row: usize);

    /// Removes a cell from its row.
    fn remove_cell(&mut self, cell: Self::Cell);

    /// Appends a row of `cells` empty 1×1 cells.
    fn append_row(&mut self, cells: usize);

    /// Removes a row and the cells defined in it.
    fn remove_row(&mut self, row: usize);
}

/// One grid position's owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot<C> {
    pub cell: C,
    pub origin_row: usize,
    pub origin_col: usize,
    pub span: CellSpan,
}

impl<C> Slot<C> {
    /// Returns true if the cell's top-left position is `(row, col)`.
    pub fn originates_at(&self, row: usize, col: usize) -> bool {
        self.origin_row == row && self.origin_col == col
    }
}

/// Grid of `(row, col) -> originating cell`.
#[derive(Debug, Clone)]
pub struct OccupancyMap<C> {
    grid: Vec<Vec<Option<Slot<C>>>>,
    columns: usize,
}

impl<C: Copy + Eq> OccupancyMap<C> {
    /// Scans rows top to bottom, left to right.
    ///
    /// Each cell is placed at the first position of its row not already
    /// claimed by a span from above and claims `col_span × row_span`
    /// positions. Spans reaching past the last row are cut off; overlapping
    /// claims keep the first owner.
    pub fn build<S: GridLayout<Cell = C> + ?Sized>(surface: &S) -> Self {
        let rows = surface.row_count();
        let mut grid: Vec<Vec<Option<Slot<C>>>> = vec![Vec::new(); rows];

        for row in 0..rows {
            let mut col = 0;
            for cell in surface.row_cells(row) {
                while grid[row].get(col).is_some_and(Option::is_some) {
                    col += 1;
                }
                let raw = surface.span(cell);
                let span = CellSpan::new(raw.col_span, raw.row_span);
                let end = col.saturating_add(span.col_span);
                let slot = Slot {
                    cell,
                    origin_row: row,
                    origin_col: col,
                    span,
                };
                for covered in grid.iter_mut().skip(row).take(span.row_span) {
                    for c in col..end {
                        if covered.len() <= c {
                            covered.resize(c + 1, None);
                        }
                        if covered[c].is_none() {
                            covered[c] = Some(slot);
                        }
                    }
                }
                col = end;
            }
        }

        let columns = grid.iter().map(Vec::len).max().unwrap_or(0);
        Self { grid, columns }
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.grid.len()
    }

    /// Number of grid columns (the widest row).
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// The owner of a grid position.
    pub fn slot(&self, row: usize, col: usize) -> Option<&Slot<C>> {
        self.grid.get(row)?.get(col)?.as_ref()
    }

    /// Number of positions occupied in a row, spans included.
    pub fn row_width(&self, row: usize) -> usize {
        self.grid
            .get(row)
            .map_or(0, |line| line.iter().filter(|slot| slot.is_some()).count())
    }

    /// Returns true if every row covers every column.
    pub fn is_rectangular(&self) -> bool {
        (0..self.rows()).all(|row| self.row_width(row) == self.columns)
    }
}

/// Size bounds enforced by the growing operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLimits {
    pub max_rows: usize,
    pub max_cols: usize,
}

impl Default for TableLimits {
    fn default() -> Self {
        Self {
            max_rows: usize::MAX,
            max_cols: usize::MAX,
        }
    }
}

/// Structural editor for a [`GridSurface`].
///
/// Only trailing-edge operations are provided; every operation leaves a
/// rectangular table rectangular.
pub struct TableGridEditor<'a, S: GridSurface> {
    surface: &'a mut S,
    limits: TableLimits,
}

impl<'a, S: GridSurface> TableGridEditor<'a, S> {
    /// Creates an editor over a table.
    pub fn new(surface: &'a mut S) -> Self {
        Self {
            surface,
            limits: TableLimits::default(),
        }
    }

    /// Applies size limits to the growing operations.
    pub fn with_limits(mut self, limits: TableLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Builds the current occupancy map.
    pub fn occupancy(&self) -> OccupancyMap<S::Cell> {
        OccupancyMap::build(&*self.surface)
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.surface.row_count()
    }

    /// Number of grid columns.
    pub fn column_count(&self) -> usize {
        self.occupancy().columns()
    }

    /// Appends a 1×1 cell to every row.
    ///
    /// Assumes a rectangular grid: no existing cell covers the new column,
    /// so rows covered by a rowspan at the old trailing column still get a
    /// cell of their own.
    pub fn insert_column_end(&mut self) -> TableResult<()> {
        let rows = self.surface.row_count();
        if rows == 0 {
            return Err(TableError::Empty);
        }
        let columns = self.column_count();
        if columns >= self.limits.max_cols {
            return Err(TableError::LimitExceeded {
                axis: "columns",
                limit: self.limits.max_cols,
            });
        }
        for row in 0..rows {
            self.surface.append_cell(row);
        }
        tracing::debug!(columns = columns + 1, "Inserted trailing column");
        Ok(())
    }

    /// Removes the last grid column.
    ///
    /// Per row, the cell occupying the last column is looked at only if it
    /// originates in that row: a cell with `col_span > 1` shrinks by one,
    /// a 1-wide cell is removed. Rows the cell merely spans into are left
    /// alone.
    pub fn delete_column_end(&mut self) -> TableResult<()> {
        let map = self.occupancy();
        if map.rows() == 0 {
            return Err(TableError::Empty);
        }
        if map.columns() <= 1 {
            return Err(TableError::LastColumn);
        }
        let last = map.columns() - 1;

        let mut shrink = Vec::new();
        let mut remove = Vec::new();
        for row in 0..map.rows() {
            let Some(slot) = map.slot(row, last) else {
                continue;
            };
            if slot.origin_row != row {
                continue;
            }
            if slot.span.col_span > 1 {
                shrink.push(*slot);
            } else {
                remove.push(slot.cell);
            }
        }

        for slot in shrink {
            let span = CellSpan::new(slot.span.col_span - 1, slot.span.row_span);
            self.surface.set_span(slot.cell, span);
        }
        for cell in remove {
            self.surface.remove_cell(cell);
        }
        tracing::debug!(columns = last, "Deleted trailing column");
        Ok(())
    }

    /// Appends a row with one 1×1 cell per grid column.
    pub fn insert_row_end(&mut self) -> TableResult<()> {
        let map = self.occupancy();
        if map.columns() == 0 {
            return Err(TableError::Empty);
        }
        if map.rows() >= self.limits.max_rows {
            return Err(TableError::LimitExceeded {
                axis: "rows",
                limit: self.limits.max_rows,
            });
        }
        // Spans from loaded markup can make the grid wider than the limit.
        if map.columns() > self.limits.max_cols {
            return Err(TableError::LimitExceeded {
                axis: "columns",
                limit: self.limits.max_cols,
            });
        }
        self.surface.append_row(map.columns());
        tracing::debug!(rows = map.rows() + 1, "Inserted trailing row");
        Ok(())
    }

    /// Removes the last row.
    ///
    /// Cells defined in the last row go with it. Cells from earlier rows
    /// that span into it lose one row of span, once each.
    pub fn delete_row_end(&mut self) -> TableResult<()> {
        let map = self.occupancy();
        if map.rows() == 0 {
            return Err(TableError::Empty);
        }
        if map.rows() == 1 {
            return Err(TableError::LastRow);
        }
        let last = map.rows() - 1;

        let mut seen = HashSet::new();
        let mut shrink = Vec::new();
        for col in 0..map.columns() {
            if let Some(slot) = map.slot(last, col) {
                if slot.origin_row < last && seen.insert(slot.cell) {
                    shrink.push(*slot);
                }
            }
        }

        for slot in shrink {
            let span = CellSpan::new(slot.span.col_span, slot.span.row_span - 1);
            self.surface.set_span(slot.cell, span);
        }
        self.surface.remove_row(last);
        tracing::debug!(rows = last, "Deleted trailing row");
        Ok(())
    }
}

/// A cell of the in-memory [`Table`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCell {
    pub content: String,
    pub span: CellSpan,
}

impl TableCell {
    /// Creates a 1×1 cell.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            span: CellSpan::SINGLE,
        }
    }

    /// Sets the cell's span.
    pub fn with_span(mut self, col_span: usize, row_span: usize) -> Self {
        self.span = CellSpan::new(col_span, row_span);
        self
    }
}

/// Position of a cell in a [`Table`]'s row list (not a grid column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellPos {
    pub row: usize,
    pub index: usize,
}

/// Plain grid-of-cells table model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    rows: Vec<Vec<TableCell>>,
}

impl Table {
    /// Creates a table from rows of cells.
    pub fn new(rows: Vec<Vec<TableCell>>) -> Self {
        Self { rows }
    }

    /// Creates a `rows × cols` table of empty 1×1 cells.
    pub fn grid(rows: usize, cols: usize) -> Self {
        Self {
            rows: vec![vec![TableCell::default(); cols]; rows],
        }
    }

    /// Returns the rows.
    pub fn rows(&self) -> &[Vec<TableCell>] {
        &self.rows
    }

    /// Returns a cell by row and list index.
    pub fn cell(&self, row: usize, index: usize) -> Option<&TableCell> {
        self.rows.get(row)?.get(index)
    }

    /// Returns a mutable cell by row and list index.
    pub fn cell_mut(&mut self, row: usize, index: usize) -> Option<&mut TableCell> {
        self.rows.get_mut(row)?.get_mut(index)
    }
}

impl GridLayout for Table {
    type Cell = CellPos;

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn row_cells(&self, row: usize) -> Vec<CellPos> {
        let len = self.rows.get(row).map_or(0, Vec::len);
        (0..len).map(|index| CellPos { row, index }).collect()
    }

    fn span(&self, cell: CellPos) -> CellSpan {
        self.cell(cell.row, cell.index)
            .map_or(CellSpan::SINGLE, |c| c.span)
    }
}

impl GridSurface for Table {
    fn set_span(&mut self, cell: CellPos, span: CellSpan) {
        if let Some(c) = self.cell_mut(cell.row, cell.index) {
            c.span = span;
        }
    }

    fn append_cell(&mut self, row: usize) {
        if let Some(cells) = self.rows.get_mut(row) {
            cells.push(TableCell::default());
        }
    }

    fn remove_cell(&mut self, cell: CellPos) {
        if let Some(cells) = self.rows.get_mut(cell.row) {
            if cell.index < cells.len() {
                cells.remove(cell.index);
            }
        }
    }

    fn append_row(&mut self, cells: usize) {
        self.rows.push(vec![TableCell::default(); cells]);
    }

    fn remove_row(&mut self, row: usize) {
        if row < self.rows.len() {
            self.rows.remove(row);
        }
    }
}
