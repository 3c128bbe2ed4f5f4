//! # Folio Document
//!
//! The document surface the editing engine mutates, plus the two
//! structural algorithms it relies on.
//!
//! ## Modules
//!
//! - `tree`: arena tree of element and text nodes
//! - `html`: lenient HTML-subset reader/writer for the tree
//! - `selection`: selection capture/restore as child-index paths
//! - `table`: occupancy map and span-aware trailing-edge table edits
//! - `tree_table`: the table editor's view of a `<table>` element
//!
//! ## Key Concepts for Learning Rust
//!
//! ### Traits as Seams
//! - `NodeTree` is all `SelectionCodec` needs from a tree
//! - `GridLayout` is all the occupancy map needs to read a table, and
//!   `GridSurface` adds the edits `TableGridEditor` performs
//! - Both algorithms are tested against plain in-memory models and the
//!   real tree with no code changes

mod html;
mod selection;
mod table;
mod tree;
mod tree_table;

pub use html::decode_entities;
pub use selection::{
    BoundaryPoint, NodeTree, SelectionAnchor, SelectionAnchors, SelectionCodec, SelectionRange,
};
pub use table::{
    CellPos, CellSpan, GridLayout, GridSurface, MAX_COL_SPAN, MAX_ROW_SPAN, OccupancyMap, Slot,
    Table, TableCell, TableGridEditor, TableLimits,
};
pub use tree::{DocumentTree, NodeId, NodeKind, ROOT_TAG};
pub use tree_table::{TreeTable, rows_of};

/// Result type for tree operations
pub type DocumentResult<T> = Result<T, DocumentError>;

/// Result type for table operations
pub type TableResult<T> = Result<T, TableError>;

/// Errors raised by tree manipulation
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Node {0} is not an element")]
    NotAnElement(NodeId),

    #[error("Node {0} is not a text node")]
    NotAText(NodeId),

    #[error("Node {0} is not a table")]
    NotATable(NodeId),

    #[error("Node {0} is not attached to the document")]
    Detached(NodeId),

    #[error("Cannot insert {child} under {parent}: would create a cycle")]
    InvalidHierarchy { parent: NodeId, child: NodeId },
}

/// Errors raised by structural table edits
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("Table has no rows or columns")]
    Empty,

    #[error("Cannot delete the only remaining row")]
    LastRow,

    #[error("Cannot delete the only remaining column")]
    LastColumn,

    #[error("Table {axis} limit of {limit} reached")]
    LimitExceeded { axis: &'static str, limit: usize },
}
