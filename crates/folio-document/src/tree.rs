//! Arena-backed document tree.
//!
//! ## Learning: Arenas Instead of Pointers
//!
//! A DOM-like tree needs parent links, and parent links with `Rc` need
//! `Weak` back-references and `RefCell` everywhere. Storing every node in
//! one `Vec` and addressing it by index sidesteps all of that:
//! - `NodeId` is `Copy`, so it can live inside selections and snapshots
//! - Parent and child links are plain indices
//! - Detached nodes simply stay in the arena until the tree is dropped

use ropey::Rope;
use std::fmt;

use crate::selection::{BoundaryPoint, NodeTree, SelectionRange};
use crate::{DocumentError, DocumentResult};

/// Index of a node inside a [`DocumentTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Returns the raw arena index.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a node holds.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// An element with a lowercase tag name and ordered attributes
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    /// A run of text
    Text(Rope),
}

#[derive(Debug, Clone)]
struct NodeData {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

/// A mutable tree of element and text nodes.
///
/// The root is a synthetic element that is never serialized; the editable
/// content is its children.
#[derive(Debug, Clone)]
pub struct DocumentTree {
    nodes: Vec<NodeData>,
    root: NodeId,
}

/// Tag name of the synthetic root element.
pub const ROOT_TAG: &str = "#root";

impl DocumentTree {
    /// Creates a tree containing only the root.
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Element {
                    tag: ROOT_TAG.to_string(),
                    attrs: Vec::new(),
                },
            }],
            root: NodeId(0),
        }
    }

    /// Returns the root node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    // ==================== Construction ====================

    /// Creates a detached element node.
    pub fn create_element(&mut self, tag: impl Into<String>) -> NodeId {
        self.push(NodeKind::Element {
            tag: tag.into().to_ascii_lowercase(),
            attrs: Vec::new(),
        })
    }

    /// Creates a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text(Rope::from_str(text)))
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            parent: None,
            children: Vec::new(),
            kind,
        });
        id
    }

    /// Appends `child` as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> DocumentResult<()> {
        let index = self.child_count(parent);
        self.insert_child(parent, index, child)
    }

    /// Inserts `child` at `index` among the children of `parent`.
    ///
    /// The child is detached from its previous parent first.
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        index: usize,
        child: NodeId,
    ) -> DocumentResult<()> {
        self.data(child)?;
        if self.tag(parent).is_none() {
            return Err(DocumentError::NotAnElement(parent));
        }
        if child == self.root || self.is_ancestor_or_self(child, parent) {
            return Err(DocumentError::InvalidHierarchy { parent, child });
        }
        self.detach(child);
        let index = index.min(self.child_count(parent));
        self.attach_at(parent, index, child);
        Ok(())
    }

    /// Links a child without validation; callers guarantee `parent` is an element.
    pub(crate) fn attach(&mut self, parent: NodeId, child: NodeId) {
        let index = self.child_count(parent);
        self.attach_at(parent, index, child);
    }

    fn attach_at(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.nodes[parent.0].children.insert(index, child);
        self.nodes[child.0].parent = Some(parent);
    }

    /// Removes a node (and its subtree) from its parent.
    ///
    /// Detaching an already detached node is a no-op.
    pub fn detach(&mut self, node: NodeId) {
        let Some(parent) = self.nodes.get(node.0).and_then(|n| n.parent) else {
            return;
        };
        self.nodes[parent.0].children.retain(|&c| c != node);
        self.nodes[node.0].parent = None;
    }

    /// Removes every child of `node`.
    pub fn clear_children(&mut self, node: NodeId) {
        for child in self.children(node).to_vec() {
            self.detach(child);
        }
    }

    // ==================== Inspection ====================

    fn data(&self, node: NodeId) -> DocumentResult<&NodeData> {
        self.nodes.get(node.0).ok_or(DocumentError::UnknownNode(node))
    }

    /// Returns the node's kind.
    pub fn kind(&self, node: NodeId) -> Option<&NodeKind> {
        self.nodes.get(node.0).map(|n| &n.kind)
    }

    /// Returns the tag name for element nodes.
    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match self.kind(node)? {
            NodeKind::Element { tag, .. } => Some(tag),
            NodeKind::Text(_) => None,
        }
    }

    /// Returns true if the node is a text node.
    pub fn is_text(&self, node: NodeId) -> bool {
        matches!(self.kind(node), Some(NodeKind::Text(_)))
    }

    /// Returns the text of a text node.
    pub fn text(&self, node: NodeId) -> Option<&Rope> {
        match self.kind(node)? {
            NodeKind::Text(rope) => Some(rope),
            NodeKind::Element { .. } => None,
        }
    }

    fn text_mut(&mut self, node: NodeId) -> DocumentResult<&mut Rope> {
        match self.nodes.get_mut(node.0).map(|n| &mut n.kind) {
            Some(NodeKind::Text(rope)) => Ok(rope),
            Some(NodeKind::Element { .. }) => Err(DocumentError::NotAText(node)),
            None => Err(DocumentError::UnknownNode(node)),
        }
    }

    /// Returns an attribute value.
    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        match self.kind(node)? {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    /// Returns all attributes of an element.
    pub fn attrs(&self, node: NodeId) -> &[(String, String)] {
        match self.kind(node) {
            Some(NodeKind::Element { attrs, .. }) => attrs,
            _ => &[],
        }
    }

    /// Sets (or replaces) an attribute.
    pub fn set_attr(
        &mut self,
        node: NodeId,
        name: &str,
        value: impl Into<String>,
    ) -> DocumentResult<()> {
        let value = value.into();
        match self.nodes.get_mut(node.0).map(|n| &mut n.kind) {
            Some(NodeKind::Element { attrs, .. }) => {
                match attrs.iter_mut().find(|(key, _)| key == name) {
                    Some(entry) => entry.1 = value,
                    None => attrs.push((name.to_ascii_lowercase(), value)),
                }
                Ok(())
            }
            Some(NodeKind::Text(_)) => Err(DocumentError::NotAnElement(node)),
            None => Err(DocumentError::UnknownNode(node)),
        }
    }

    /// Removes an attribute if present.
    pub fn remove_attr(&mut self, node: NodeId, name: &str) {
        if let Some(NodeKind::Element { attrs, .. }) =
            self.nodes.get_mut(node.0).map(|n| &mut n.kind)
        {
            attrs.retain(|(key, _)| key != name);
        }
    }

    /// Returns the children of a node (empty for unknown nodes).
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes.get(node.0).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Returns true if the node is reachable from the root.
    pub fn is_attached(&self, node: NodeId) -> bool {
        self.nodes.get(node.0).is_some() && self.is_ancestor_or_self(self.root, node)
    }

    /// Returns the closest inclusive ancestor with the given tag.
    pub fn find_ancestor(&self, node: NodeId, tag: &str) -> Option<NodeId> {
        let mut current = Some(node);
        while let Some(id) = current {
            if self.tag(id) == Some(tag) {
                return Some(id);
            }
            current = self.parent(id);
        }
        None
    }

    /// Returns the subtree of `node` in document (pre-)order, `node` included.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if self.nodes.get(node.0).is_none() {
            return out;
        }
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev());
        }
        out
    }

    /// Returns every attached element with the given tag, in document order.
    pub fn elements_by_tag(&self, tag: &str) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|&id| self.tag(id) == Some(tag))
            .collect()
    }

    /// Returns every attached `<table>` element.
    pub fn tables(&self) -> Vec<NodeId> {
        self.elements_by_tag("table")
    }

    /// Concatenated text of a subtree.
    pub fn text_content(&self, node: NodeId) -> String {
        self.descendants(node)
            .into_iter()
            .filter_map(|id| self.text(id))
            .map(|rope| rope.to_string())
            .collect()
    }

    /// Character count of a subtree.
    pub fn subtree_text_len(&self, node: NodeId) -> usize {
        self.descendants(node)
            .into_iter()
            .filter_map(|id| self.text(id))
            .map(Rope::len_chars)
            .sum()
    }

    // ==================== Linear offsets ====================

    /// Number of characters in text nodes that precede `node` in document order.
    fn linear_start(&self, node: NodeId) -> Option<usize> {
        let mut count = 0;
        for id in self.descendants(self.root) {
            if id == node {
                return Some(count);
            }
            if let Some(rope) = self.text(id) {
                count += rope.len_chars();
            }
        }
        None
    }

    /// Maps a boundary point to a character offset into the flattened text.
    pub fn linear_offset(&self, point: BoundaryPoint) -> Option<usize> {
        let start = self.linear_start(point.node)?;
        if let Some(rope) = self.text(point.node) {
            return Some(start + point.offset.min(rope.len_chars()));
        }
        let before: usize = self
            .children(point.node)
            .iter()
            .take(point.offset)
            .map(|&child| self.subtree_text_len(child))
            .sum();
        Some(start + before)
    }

    /// Maps a flattened character offset back to a point inside a text node.
    ///
    /// Offsets past the end clamp to the end of the last text node. A tree
    /// without text resolves to the end of the root.
    pub fn point_at(&self, offset: usize) -> BoundaryPoint {
        let mut count = 0;
        let mut last = None;
        for id in self.descendants(self.root) {
            if let Some(rope) = self.text(id) {
                let len = rope.len_chars();
                if offset <= count + len {
                    return BoundaryPoint::new(id, offset - count);
                }
                count += len;
                last = Some((id, len));
            }
        }
        match last {
            Some((id, len)) => BoundaryPoint::new(id, len),
            None => BoundaryPoint::new(self.root, self.child_count(self.root)),
        }
    }

    /// Returns the text covered by a range.
    pub fn selected_text(&self, range: &SelectionRange) -> Option<String> {
        let a = self.linear_offset(range.start)?;
        let b = self.linear_offset(range.end)?;
        let (from, to) = (a.min(b), a.max(b));
        Some(
            self.text_content(self.root)
                .chars()
                .skip(from)
                .take(to - from)
                .collect(),
        )
    }

    // ==================== Editing ====================

    /// Inserts text at a point and returns the caret after the insertion.
    ///
    /// Inside a text node the text is spliced in; at an element boundary a
    /// new text node is created at that child position.
    pub fn insert_text(
        &mut self,
        point: BoundaryPoint,
        text: &str,
    ) -> DocumentResult<BoundaryPoint> {
        if !self.is_attached(point.node) {
            return Err(DocumentError::Detached(point.node));
        }
        let inserted = text.chars().count();
        if self.is_text(point.node) {
            let rope = self.text_mut(point.node)?;
            let at = point.offset.min(rope.len_chars());
            rope.insert(at, text);
            return Ok(BoundaryPoint::new(point.node, at + inserted));
        }
        let node = self.create_text(text);
        self.insert_child(point.node, point.offset, node)?;
        Ok(BoundaryPoint::new(node, inserted))
    }

    /// Deletes the text covered by a range and returns the collapsed caret.
    ///
    /// Text nodes emptied by a multi-node deletion are detached, except the
    /// one holding the caret.
    pub fn delete_range(&mut self, range: &SelectionRange) -> DocumentResult<BoundaryPoint> {
        let a = self
            .linear_offset(range.start)
            .ok_or(DocumentError::Detached(range.start.node))?;
        let b = self
            .linear_offset(range.end)
            .ok_or(DocumentError::Detached(range.end.node))?;
        let (from, to) = (a.min(b), a.max(b));
        let caret = self.point_at(from);
        if from == to {
            return Ok(caret);
        }

        let mut count = 0;
        let mut emptied = Vec::new();
        for id in self.descendants(self.root) {
            let Some(len) = self.text(id).map(Rope::len_chars) else {
                continue;
            };
            let (start, end) = (count, count + len);
            count = end;
            let cut_from = from.max(start);
            let cut_to = to.min(end);
            if cut_from >= cut_to {
                continue;
            }
            let rope = self.text_mut(id)?;
            rope.remove(cut_from - start..cut_to - start);
            if rope.len_chars() == 0 && id != caret.node {
                emptied.push(id);
            }
        }
        for id in emptied {
            self.detach(id);
        }
        Ok(caret)
    }

    /// Replaces the root's content with a parsed fragment.
    pub fn replace_content(&mut self, html: &str) {
        *self = Self::parse(html);
    }
}

impl Default for DocumentTree {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeTree for DocumentTree {
    type Node = NodeId;

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0).and_then(|n| n.parent)
    }

    fn child_count(&self, node: NodeId) -> usize {
        self.children(node).len()
    }

    fn child(&self, node: NodeId, index: usize) -> Option<NodeId> {
        self.children(node).get(index).copied()
    }

    fn text_len(&self, node: NodeId) -> usize {
        match self.text(node) {
            Some(rope) => rope.len_chars(),
            None => self.subtree_text_len(node),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(text: &str) -> (DocumentTree, NodeId, NodeId) {
        let mut tree = DocumentTree::new();
        let p = tree.create_element("p");
        let t = tree.create_text(text);
        tree.append_child(tree.root(), p).unwrap();
        tree.append_child(p, t).unwrap();
        (tree, p, t)
    }

    #[test]
    fn test_append_and_inspect() {
        let (tree, p, t) = paragraph("Hello");
        assert_eq!(tree.tag(p), Some("p"));
        assert_eq!(tree.parent(t), Some(p));
        assert_eq!(tree.text_len(p), 5);
        assert_eq!(tree.text_content(tree.root()), "Hello");
    }

    #[test]
    fn test_rejects_cycles_and_text_parents() {
        let (mut tree, p, t) = paragraph("x");
        assert!(matches!(
            tree.append_child(t, p),
            Err(DocumentError::NotAnElement(_))
        ));
        let root = tree.root();
        assert!(matches!(
            tree.append_child(p, root),
            Err(DocumentError::InvalidHierarchy { .. })
        ));
    }

    #[test]
    fn test_insert_text_in_text_node() {
        let (mut tree, _, t) = paragraph("Helo");
        let caret = tree.insert_text(BoundaryPoint::new(t, 3), "l").unwrap();
        assert_eq!(tree.text_content(tree.root()), "Hello");
        assert_eq!(caret, BoundaryPoint::new(t, 4));
    }

    #[test]
    fn test_delete_across_nodes() {
        let mut tree = DocumentTree::parse("<p>abc</p><p>def</p>");
        let first = tree.point_at(1);
        let second = tree.point_at(5);
        let caret = tree
            .delete_range(&SelectionRange::new(first, second))
            .unwrap();
        assert_eq!(tree.text_content(tree.root()), "af");
        assert_eq!(tree.linear_offset(caret), Some(1));
    }

    #[test]
    fn test_selected_text_with_element_boundaries() {
        let tree = DocumentTree::parse("<p>ab</p><p>cd</p>");
        let root = tree.root();
        let range = SelectionRange::new(BoundaryPoint::new(root, 1), BoundaryPoint::new(root, 2));
        assert_eq!(tree.selected_text(&range).as_deref(), Some("cd"));
    }

    #[test]
    fn test_detached_nodes_are_not_attached() {
        let (mut tree, p, t) = paragraph("x");
        tree.detach(p);
        assert!(!tree.is_attached(t));
        assert_eq!(tree.linear_offset(BoundaryPoint::new(t, 0)), None);
    }
}
