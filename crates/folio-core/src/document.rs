//! The live document commands operate on.
//!
//! ## Learning: Composition over Inheritance
//!
//! `Document` composes a `DocumentTree`, the live selection and the
//! floating images, and adds editing operations on top. The engine turns
//! it into a [`DocumentState`] after every command and rebuilds it from
//! one on undo/redo.

use folio_document::{
    BoundaryPoint, DocumentTree, NodeId, NodeTree, SelectionCodec, SelectionRange, TableGridEditor,
    TableLimits, TreeTable,
};
use uuid::Uuid;

use crate::config::Config;
use crate::state::{DocumentState, FloatingImage};
use crate::{CoreError, CoreResult};

/// Size bounds applied by editing operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditLimits {
    pub table: TableLimits,
    pub image_max_size: usize,
    pub image_max_width: usize,
    pub image_max_height: usize,
}

impl From<&Config> for EditLimits {
    fn from(config: &Config) -> Self {
        Self {
            table: TableLimits {
                max_rows: config.table.max_rows,
                max_cols: config.table.max_cols,
            },
            image_max_size: config.image.max_size,
            image_max_width: config.image.max_width,
            image_max_height: config.image.max_height,
        }
    }
}

impl Default for EditLimits {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Trailing-edge table operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableEdit {
    InsertRowEnd,
    DeleteRowEnd,
    InsertColumnEnd,
    DeleteColumnEnd,
}

/// Tree, selection and floating images being edited.
#[derive(Debug, Clone)]
pub struct Document {
    tree: DocumentTree,
    selection: Option<SelectionRange>,
    is_editing: bool,
    floating_images: Vec<FloatingImage>,
    limits: EditLimits,
}

impl Document {
    /// Parses `content` into an editable document.
    pub fn new(content: &str) -> Self {
        Self::from_state(&DocumentState::new(content), EditLimits::default())
    }

    /// Builds a document from a state snapshot.
    pub fn from_state(state: &DocumentState, limits: EditLimits) -> Self {
        Self {
            tree: DocumentTree::parse(&state.content),
            selection: None,
            is_editing: state.is_editing,
            floating_images: state.floating_images.clone(),
            limits,
        }
    }

    pub fn tree(&self) -> &DocumentTree {
        &self.tree
    }

    pub fn selection(&self) -> Option<&SelectionRange> {
        self.selection.as_ref()
    }

    pub fn set_selection(&mut self, selection: Option<SelectionRange>) {
        self.selection = selection;
    }

    /// Selects the flattened text between two character offsets.
    pub fn select_offsets(&mut self, from: usize, to: usize) {
        let start = self.tree.point_at(from);
        let end = self.tree.point_at(to);
        self.selection = Some(SelectionRange::new(start, end));
    }

    /// Selects all text.
    pub fn select_all(&mut self) {
        let len = self.tree.subtree_text_len(self.tree.root());
        self.select_offsets(0, len);
    }

    /// Text covered by the selection, empty without one.
    pub fn selected_text(&self) -> String {
        self.selection
            .as_ref()
            .and_then(|range| self.tree.selected_text(range))
            .unwrap_or_default()
    }

    pub fn is_editing(&self) -> bool {
        self.is_editing
    }

    pub fn set_editing(&mut self, editing: bool) {
        self.is_editing = editing;
    }

    pub fn floating_images(&self) -> &[FloatingImage] {
        &self.floating_images
    }

    pub fn limits(&self) -> EditLimits {
        self.limits
    }

    pub fn set_limits(&mut self, limits: EditLimits) {
        self.limits = limits;
    }

    /// Serialized markup of the tree.
    pub fn content(&self) -> String {
        self.tree.to_html()
    }

    /// Flattened text of the whole document.
    pub fn text(&self) -> String {
        self.tree.text_content(self.tree.root())
    }

    /// Captures the current state.
    pub fn snapshot(&self) -> DocumentState {
        DocumentState {
            content: self.content(),
            is_editing: self.is_editing,
            floating_images: self.floating_images.clone(),
        }
    }

    /// Replaces everything with `state`, keeping the selection if its
    /// paths still resolve in the new tree.
    pub fn restore(&mut self, state: &DocumentState) {
        let anchors =
            SelectionCodec::capture(&self.tree, self.tree.root(), self.selection.as_ref());
        // Node ids from the old tree are meaningless after re-parsing.
        self.selection = None;
        self.tree.replace_content(&state.content);
        self.is_editing = state.is_editing;
        self.floating_images = state.floating_images.clone();
        if let Some(anchors) = anchors {
            SelectionCodec::restore(&self.tree, self.tree.root(), &anchors, &mut self.selection);
        }
    }

    // ==================== Text ====================

    /// Replaces the selection with `text`, or appends it at the end when
    /// nothing is selected. The caret ends up after the inserted text.
    pub fn insert_text(&mut self, text: &str) -> CoreResult<()> {
        let point = match self.selection {
            Some(range) if range.is_collapsed() => range.start,
            Some(range) => self.tree.delete_range(&range)?,
            None => self.end_point(),
        };
        let caret = self.tree.insert_text(point, text)?;
        self.selection = Some(SelectionRange::caret(caret));
        Ok(())
    }

    /// Deletes the selected text. Returns false if there was nothing to delete.
    pub fn delete_selection(&mut self) -> CoreResult<bool> {
        let Some(range) = self.selection.filter(|range| !range.is_collapsed()) else {
            return Ok(false);
        };
        let caret = self.tree.delete_range(&range)?;
        self.selection = Some(SelectionRange::caret(caret));
        Ok(true)
    }

    /// Replaces the content with parsed markup and drops the selection.
    pub fn set_content(&mut self, html: &str) {
        self.tree.replace_content(html);
        self.selection = None;
    }

    fn end_point(&self) -> BoundaryPoint {
        let root = self.tree.root();
        match self.tree.children(root).last() {
            Some(&last) if self.tree.is_text(last) => {
                BoundaryPoint::new(last, self.tree.text_len(last))
            }
            _ => BoundaryPoint::new(root, self.tree.child_count(root)),
        }
    }

    // ==================== Tables ====================

    /// The table around the selection start, else the first table.
    pub fn current_table(&self) -> Option<NodeId> {
        self.selection
            .and_then(|range| self.tree.find_ancestor(range.start.node, "table"))
            .or_else(|| self.tree.tables().first().copied())
    }

    /// Returns true if the selection start lies inside a table.
    pub fn selection_in_table(&self) -> bool {
        self.selection
            .is_some_and(|range| self.tree.find_ancestor(range.start.node, "table").is_some())
    }

    /// Grid size of the current table as `(rows, columns)`.
    pub fn table_dimensions(&self) -> Option<(usize, usize)> {
        let table = self.current_table()?;
        TreeTable::new(&self.tree, table)
            .ok()
            .map(|table| table.dimensions())
    }

    /// Inserts an empty `rows × cols` table after the block holding the
    /// selection, or at the end of the document.
    pub fn insert_table(&mut self, rows: usize, cols: usize) -> CoreResult<NodeId> {
        let limits = self.limits.table;
        if rows == 0 || cols == 0 {
            return Err(folio_document::TableError::Empty.into());
        }
        if rows > limits.max_rows {
            return Err(folio_document::TableError::LimitExceeded {
                axis: "rows",
                limit: limits.max_rows,
            }
            .into());
        }
        if cols > limits.max_cols {
            return Err(folio_document::TableError::LimitExceeded {
                axis: "columns",
                limit: limits.max_cols,
            }
            .into());
        }

        let table = self.tree.create_element("table");
        let body = self.tree.create_element("tbody");
        self.tree.append_child(table, body)?;
        for _ in 0..rows {
            let row = self.tree.create_element("tr");
            for _ in 0..cols {
                let cell = self.tree.create_element("td");
                self.tree.append_child(row, cell)?;
            }
            self.tree.append_child(body, row)?;
        }

        let root = self.tree.root();
        let index = self
            .selection
            .and_then(|range| self.top_level_index(range.start.node))
            .map_or(self.tree.child_count(root), |index| index + 1);
        self.tree.insert_child(root, index, table)?;
        tracing::debug!(rows, cols, "Inserted table");
        Ok(table)
    }

    fn top_level_index(&self, node: NodeId) -> Option<usize> {
        let root = self.tree.root();
        let mut current = node;
        while self.tree.parent(current)? != root {
            current = self.tree.parent(current)?;
        }
        self.tree.index_in_parent(current)
    }

    /// Applies a trailing-edge edit to the current table.
    pub fn edit_table(&mut self, edit: TableEdit) -> CoreResult<()> {
        let table = self.current_table().ok_or(CoreError::NoTable)?;
        let limits = self.limits.table;
        let mut surface = TreeTable::new(&mut self.tree, table)?;
        let mut editor = TableGridEditor::new(&mut surface).with_limits(limits);
        match edit {
            TableEdit::InsertRowEnd => editor.insert_row_end()?,
            TableEdit::DeleteRowEnd => editor.delete_row_end()?,
            TableEdit::InsertColumnEnd => editor.insert_column_end()?,
            TableEdit::DeleteColumnEnd => editor.delete_column_end()?,
        }
        self.drop_detached_selection();
        Ok(())
    }

    fn drop_detached_selection(&mut self) {
        let detached = self.selection.is_some_and(|range| {
            !self.tree.is_attached(range.start.node) || !self.tree.is_attached(range.end.node)
        });
        if detached {
            self.selection = None;
        }
    }

    // ==================== Floating images ====================

    /// Adds a floating image and returns its generated id.
    pub fn insert_floating_image(
        &mut self,
        src: &str,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> CoreResult<String> {
        self.check_image_size(width, height)?;
        if let Some(bytes) = data_uri_size(src) {
            if bytes > self.limits.image_max_size {
                return Err(CoreError::ImageRejected(format!(
                    "{bytes} bytes exceeds the {} byte limit",
                    self.limits.image_max_size
                )));
            }
        }
        let id = Uuid::new_v4().to_string();
        self.floating_images.push(FloatingImage {
            id: id.clone(),
            src: src.to_string(),
            x,
            y,
            width,
            height,
        });
        Ok(id)
    }

    /// Moves a floating image.
    pub fn move_floating_image(&mut self, id: &str, x: f64, y: f64) -> CoreResult<()> {
        let image = self.image_mut(id)?;
        image.x = x;
        image.y = y;
        Ok(())
    }

    /// Resizes a floating image within the configured bounds.
    pub fn resize_floating_image(&mut self, id: &str, width: f64, height: f64) -> CoreResult<()> {
        self.check_image_size(width, height)?;
        let image = self.image_mut(id)?;
        image.width = width;
        image.height = height;
        Ok(())
    }

    /// Removes a floating image.
    pub fn remove_floating_image(&mut self, id: &str) -> CoreResult<()> {
        let index = self
            .floating_images
            .iter()
            .position(|image| image.id == id)
            .ok_or_else(|| CoreError::ImageNotFound(id.to_string()))?;
        self.floating_images.remove(index);
        Ok(())
    }

    fn image_mut(&mut self, id: &str) -> CoreResult<&mut FloatingImage> {
        self.floating_images
            .iter_mut()
            .find(|image| image.id == id)
            .ok_or_else(|| CoreError::ImageNotFound(id.to_string()))
    }

    fn check_image_size(&self, width: f64, height: f64) -> CoreResult<()> {
        if !(width > 0.0 && height > 0.0) {
            return Err(CoreError::ImageRejected(format!(
                "size {width}x{height} must be positive"
            )));
        }
        if width > self.limits.image_max_width as f64
            || height > self.limits.image_max_height as f64
        {
            return Err(CoreError::ImageRejected(format!(
                "size {width}x{height} exceeds {}x{}",
                self.limits.image_max_width, self.limits.image_max_height
            )));
        }
        Ok(())
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new("")
    }
}

/// Decoded size of a base64 `data:` URI payload.
fn data_uri_size(src: &str) -> Option<usize> {
    let rest = src.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    if meta.ends_with(";base64") {
        let padding = payload.chars().rev().take_while(|&c| c == '=').count();
        Some((payload.len() / 4 * 3).saturating_sub(padding))
    } else {
        Some(payload.len())
    }
}
