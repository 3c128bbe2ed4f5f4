//! Selection persistence across structural mutations.
//!
//! A live selection points at nodes; nodes do not survive a content
//! re-parse. [`SelectionCodec`] turns each boundary into a path of child
//! indices from the editing root so the selection can be re-resolved
//! against a tree of the same shape.
//!
//! Paths are invalidated when the subtree between the root and a boundary
//! is structurally replaced. Restoration is only reliable across in-place
//! mutations of the same tree shape.

use serde::{Deserialize, Serialize};

use crate::tree::NodeId;

/// Read access to a tree of nodes with ordered children.
///
/// Any rendering target (arena tree, virtual DOM, native widget) that can
/// answer these four questions works with [`SelectionCodec`].
pub trait NodeTree {
    /// Node handle type.
    type Node: Copy + Eq;

    /// Returns the parent of a node, `None` for the root or detached nodes.
    fn parent(&self, node: Self::Node) -> Option<Self::Node>;

    /// Number of children.
    fn child_count(&self, node: Self::Node) -> usize;

    /// The child at `index`, if in range.
    fn child(&self, node: Self::Node, index: usize) -> Option<Self::Node>;

    /// Text length of a node (characters).
    fn text_len(&self, node: Self::Node) -> usize;

    /// Position of `node` among its parent's children.
    fn index_in_parent(&self, node: Self::Node) -> Option<usize> {
        let parent = self.parent(node)?;
        (0..self.child_count(parent)).find(|&i| self.child(parent, i) == Some(node))
    }
}

/// A position inside the tree: a node and an offset within it.
///
/// For text nodes the offset counts characters; for elements it counts
/// children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundaryPoint<N = NodeId> {
    pub node: N,
    pub offset: usize,
}

impl<N> BoundaryPoint<N> {
    /// Creates a boundary point.
    pub fn new(node: N, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// A live selection between two boundary points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionRange<N = NodeId> {
    pub start: BoundaryPoint<N>,
    pub end: BoundaryPoint<N>,
}

impl<N: Copy + Eq> SelectionRange<N> {
    /// Creates a range.
    pub fn new(start: BoundaryPoint<N>, end: BoundaryPoint<N>) -> Self {
        Self { start, end }
    }

    /// Creates a collapsed range (a caret).
    pub fn caret(point: BoundaryPoint<N>) -> Self {
        Self {
            start: point,
            end: point,
        }
    }

    /// Returns true if start and end coincide.
    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

/// A boundary expressed structurally: child indices from the root plus an offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectionAnchor {
    pub path: Vec<usize>,
    pub offset: usize,
}

/// Both ends of a captured selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionAnchors {
    pub start: SelectionAnchor,
    pub end: SelectionAnchor,
}

/// Captures and restores selections as [`SelectionAnchors`].
pub struct SelectionCodec;

impl SelectionCodec {
    /// Captures the live selection relative to `root`.
    ///
    /// Returns `None` when there is no active range, or when a boundary
    /// does not lie under `root`.
    pub fn capture<T: NodeTree>(
        tree: &T,
        root: T::Node,
        selection: Option<&SelectionRange<T::Node>>,
    ) -> Option<SelectionAnchors> {
        let range = selection?;
        Some(SelectionAnchors {
            start: Self::encode(tree, root, range.start)?,
            end: Self::encode(tree, root, range.end)?,
        })
    }

    /// Re-resolves captured anchors and replaces the live selection.
    ///
    /// Never fails loudly: if either path no longer resolves, the live
    /// selection is left untouched and `false` is returned. Offsets are
    /// clamped to the resolved node's text length.
    pub fn restore<T: NodeTree>(
        tree: &T,
        root: T::Node,
        anchors: &SelectionAnchors,
        selection: &mut Option<SelectionRange<T::Node>>,
    ) -> bool {
        let resolved = Self::resolve(tree, root, &anchors.start)
            .zip(Self::resolve(tree, root, &anchors.end));
        match resolved {
            Some((start, end)) => {
                *selection = Some(SelectionRange::new(start, end));
                true
            }
            None => {
                tracing::warn!("Selection path no longer resolves; keeping previous selection");
                false
            }
        }
    }

    /// Encodes one boundary as a path from `root`.
    pub fn encode<T: NodeTree>(
        tree: &T,
        root: T::Node,
        point: BoundaryPoint<T::Node>,
    ) -> Option<SelectionAnchor> {
        let mut path = Vec::new();
        let mut current = point.node;
        while current != root {
            path.push(tree.index_in_parent(current)?);
            current = tree.parent(current)?;
        }
        path.reverse();
        Some(SelectionAnchor {
            path,
            offset: point.offset,
        })
    }

    /// Walks a path from `root`; `None` if any index is out of range.
    pub fn resolve<T: NodeTree>(
        tree: &T,
        root: T::Node,
        anchor: &SelectionAnchor,
    ) -> Option<BoundaryPoint<T::Node>> {
        let node = anchor
            .path
            .iter()
            .try_fold(root, |node, &index| tree.child(node, index))?;
        Some(BoundaryPoint::new(node, anchor.offset.min(tree.text_len(node))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DocumentTree;

    fn select(tree: &DocumentTree, from: usize, to: usize) -> SelectionRange {
        SelectionRange::new(tree.point_at(from), tree.point_at(to))
    }

    #[test]
    fn test_capture_restore_roundtrip() {
        let tree = DocumentTree::parse("<p>Test content</p>");
        let live = select(&tree, 0, 4);
        let anchors = SelectionCodec::capture(&tree, tree.root(), Some(&live)).unwrap();
        assert_eq!(anchors.start.path, vec![0, 0]);

        let mut restored = None;
        assert!(SelectionCodec::restore(&tree, tree.root(), &anchors, &mut restored));
        let range = restored.unwrap();
        assert_eq!(tree.selected_text(&range).as_deref(), Some("Test"));
    }

    #[test]
    fn test_capture_without_range() {
        let tree = DocumentTree::parse("<p>x</p>");
        assert!(SelectionCodec::capture(&tree, tree.root(), None).is_none());
    }

    #[test]
    fn test_restore_across_reparse_of_same_shape() {
        let tree = DocumentTree::parse("<p>one</p><p>two</p>");
        let live = select(&tree, 4, 6);
        let anchors = SelectionCodec::capture(&tree, tree.root(), Some(&live)).unwrap();

        let reparsed = DocumentTree::parse(&tree.to_html());
        let mut restored = None;
        assert!(SelectionCodec::restore(&reparsed, reparsed.root(), &anchors, &mut restored));
        assert_eq!(reparsed.selected_text(&restored.unwrap()).as_deref(), Some("wo"));
    }

    #[test]
    fn test_unresolvable_path_keeps_selection() {
        let tree = DocumentTree::parse("<p>a</p><p>b</p>");
        let live = select(&tree, 1, 2);
        let anchors = SelectionCodec::capture(&tree, tree.root(), Some(&live)).unwrap();

        let shrunk = DocumentTree::parse("<p>a</p>");
        let previous = SelectionRange::caret(shrunk.point_at(0));
        let mut current = Some(previous);
        assert!(!SelectionCodec::restore(&shrunk, shrunk.root(), &anchors, &mut current));
        assert_eq!(current, Some(previous));
    }

    #[test]
    fn test_offset_clamped_to_shrunk_text() {
        let tree = DocumentTree::parse("<p>long text</p>");
        let live = select(&tree, 2, 9);
        let anchors = SelectionCodec::capture(&tree, tree.root(), Some(&live)).unwrap();

        let shorter = DocumentTree::parse("<p>long</p>");
        let mut restored = None;
        assert!(SelectionCodec::restore(&shorter, shorter.root(), &anchors, &mut restored));
        let range = restored.unwrap();
        assert_eq!(range.end.offset, 4);
        assert_eq!(shorter.selected_text(&range).as_deref(), Some("ng"));
    }

    #[test]
    fn test_boundary_outside_root_is_not_captured() {
        let mut tree = DocumentTree::parse("<p>x</p>");
        let stray = tree.create_text("detached");
        let live = SelectionRange::caret(BoundaryPoint::new(stray, 0));
        assert!(SelectionCodec::capture(&tree, tree.root(), Some(&live)).is_none());
    }
}
