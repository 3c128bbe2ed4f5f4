//! [`GridSurface`] over a `<table>` element of a [`DocumentTree`].

use std::ops::{Deref, DerefMut};

use crate::selection::NodeTree;
use crate::table::{CellSpan, GridLayout, GridSurface, MAX_COL_SPAN, MAX_ROW_SPAN, OccupancyMap};
use crate::tree::{DocumentTree, NodeId};
use crate::{DocumentError, DocumentResult};

const SECTION_TAGS: &[&str] = &["thead", "tbody", "tfoot"];

/// A `<table>` element viewed as rows of spanning cells.
///
/// Rows are `<tr>` children of the table or of its `thead`/`tbody`/`tfoot`
/// sections; cells are `<td>`/`<th>` children of a row. Spans come from
/// the `colspan`/`rowspan` attributes (missing or invalid values mean 1).
///
/// Over `&DocumentTree` the table can only be measured; over
/// `&mut DocumentTree` it can be edited with a `TableGridEditor`.
pub struct TreeTable<T> {
    tree: T,
    table: NodeId,
}

impl<T: Deref<Target = DocumentTree>> TreeTable<T> {
    /// Wraps a table element.
    pub fn new(tree: T, table: NodeId) -> DocumentResult<Self> {
        if tree.tag(table) != Some("table") {
            return Err(DocumentError::NotATable(table));
        }
        Ok(Self { tree, table })
    }

    /// Returns the table element.
    pub fn node(&self) -> NodeId {
        self.table
    }

    /// Row elements in order.
    pub fn rows(&self) -> Vec<NodeId> {
        rows_of(&self.tree, self.table)
    }

    /// Grid size as `(rows, columns)`, spans included.
    pub fn dimensions(&self) -> (usize, usize) {
        let map = OccupancyMap::build(self);
        (map.rows(), map.columns())
    }

    /// Reads a span attribute; missing, invalid or zero values mean 1, and
    /// values above `max` are clamped to it.
    fn span_attr(&self, cell: NodeId, name: &str, max: usize) -> usize {
        let Some(value) = self.tree.attr(cell, name).map(str::trim) else {
            return 1;
        };
        if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
            // All digits: only overflow can make this fail.
            value.parse::<usize>().unwrap_or(max).clamp(1, max)
        } else {
            1
        }
    }
}

impl<T: DerefMut<Target = DocumentTree>> TreeTable<T> {
    fn write_span_attr(&mut self, cell: NodeId, name: &str, value: usize) {
        if value <= 1 {
            self.tree.remove_attr(cell, name);
        } else {
            // Cells are elements, so this cannot fail.
            let _ = self.tree.set_attr(cell, name, value.to_string());
        }
    }
}

/// Row elements of a table, sections flattened.
pub fn rows_of(tree: &DocumentTree, table: NodeId) -> Vec<NodeId> {
    let mut rows = Vec::new();
    for &child in tree.children(table) {
        match tree.tag(child) {
            Some("tr") => rows.push(child),
            Some(tag) if SECTION_TAGS.contains(&tag) => rows.extend(
                tree.children(child)
                    .iter()
                    .copied()
                    .filter(|&row| tree.tag(row) == Some("tr")),
            ),
            _ => {}
        }
    }
    rows
}

fn is_cell(tree: &DocumentTree, node: NodeId) -> bool {
    matches!(tree.tag(node), Some("td" | "th"))
}

impl<T: Deref<Target = DocumentTree>> GridLayout for TreeTable<T> {
    type Cell = NodeId;

    fn row_count(&self) -> usize {
        self.rows().len()
    }

    fn row_cells(&self, row: usize) -> Vec<NodeId> {
        let Some(&row) = self.rows().get(row) else {
            return Vec::new();
        };
        self.tree
            .children(row)
            .iter()
            .copied()
            .filter(|&cell| is_cell(&self.tree, cell))
            .collect()
    }

    fn span(&self, cell: NodeId) -> CellSpan {
        CellSpan::new(
            self.span_attr(cell, "colspan", MAX_COL_SPAN),
            self.span_attr(cell, "rowspan", MAX_ROW_SPAN),
        )
    }
}

impl<T: DerefMut<Target = DocumentTree>> GridSurface for TreeTable<T> {
    fn set_span(&mut self, cell: NodeId, span: CellSpan) {
        self.write_span_attr(cell, "colspan", span.col_span);
        self.write_span_attr(cell, "rowspan", span.row_span);
    }

    fn append_cell(&mut self, row: usize) {
        if let Some(&row) = self.rows().get(row) {
            let cell = self.tree.create_element("td");
            self.tree.attach(row, cell);
        }
    }

    fn remove_cell(&mut self, cell: NodeId) {
        self.tree.detach(cell);
    }

    fn append_row(&mut self, cells: usize) {
        let parent = self
            .rows()
            .last()
            .and_then(|&row| NodeTree::parent(&*self.tree, row))
            .unwrap_or(self.table);
        let row = self.tree.create_element("tr");
        for _ in 0..cells {
            let cell = self.tree.create_element("td");
            self.tree.attach(row, cell);
        }
        self.tree.attach(parent, row);
    }

    fn remove_row(&mut self, row: usize) {
        if let Some(&row) = self.rows().get(row) {
            self.tree.detach(row);
        }
    }
}
