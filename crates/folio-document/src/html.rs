//! HTML-subset reader and writer for [`DocumentTree`].
//!
//! The reader is lenient: it never fails. Stray closing tags are dropped,
//! unclosed elements are closed at the end of input, and a `<` that does
//! not start markup is kept as text.

use std::fmt::Write;

use crate::tree::{DocumentTree, NodeId, NodeKind};

/// Elements that never have children or a closing tag.
const VOID_TAGS: &[&str] = &["br", "img", "hr", "input", "col", "wbr"];

fn is_void(tag: &str) -> bool {
    VOID_TAGS.contains(&tag)
}

fn starts_markup(s: &str) -> bool {
    s.starts_with("<!--")
        || s.starts_with("</")
        || (s.starts_with('<') && s[1..].starts_with(|c: char| c.is_ascii_alphabetic()))
}

/// A parsed opening tag.
struct OpenTag {
    name: String,
    attrs: Vec<(String, String)>,
    self_closing: bool,
    len: usize,
}

/// Parses `<name attr=value ...>` at the start of `s`.
///
/// Returns `None` when the tag is not terminated.
fn parse_open_tag(s: &str) -> Option<OpenTag> {
    let bytes = s.as_bytes();
    let mut i = 1;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'-') {
        i += 1;
    }
    let name = s[1..i].to_ascii_lowercase();
    let mut attrs = Vec::new();

    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        match bytes.get(i)? {
            b'>' => {
                return Some(OpenTag {
                    name,
                    attrs,
                    self_closing: false,
                    len: i + 1,
                });
            }
            b'/' if bytes.get(i + 1) == Some(&b'>') => {
                return Some(OpenTag {
                    name,
                    attrs,
                    self_closing: true,
                    len: i + 2,
                });
            }
            b'/' => {
                i += 1;
                continue;
            }
            _ => {}
        }

        let key_start = i;
        while i < bytes.len()
            && !matches!(bytes[i], b'=' | b'>' | b'/')
            && !bytes[i].is_ascii_whitespace()
        {
            i += 1;
        }
        let key = s[key_start..i].to_ascii_lowercase();
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let mut value = String::new();
        if bytes.get(i) == Some(&b'=') {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            match bytes.get(i)? {
                quote @ (b'"' | b'\'') => {
                    let close = s[i + 1..].find(*quote as char)? + i + 1;
                    value = decode_entities(&s[i + 1..close]);
                    i = close + 1;
                }
                _ => {
                    let value_start = i;
                    while i < bytes.len() && bytes[i] != b'>' && !bytes[i].is_ascii_whitespace() {
                        i += 1;
                    }
                    value = decode_entities(&s[value_start..i]);
                }
            }
        }
        if !key.is_empty() {
            attrs.push((key, value));
        }
    }
}

/// Decodes the named and numeric character references the writer emits.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').filter(|&semi| semi <= 10).and_then(|semi| {
            let entity = &rest[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" | "#39" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, semi + 1))
        });
        match decoded {
            Some((ch, len)) => {
                out.push(ch);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            _ => out.push(ch),
        }
    }
}

impl DocumentTree {
    /// Builds a tree from an HTML fragment.
    pub fn parse(html: &str) -> Self {
        let mut tree = DocumentTree::new();
        let root = tree.root();
        let mut stack = vec![root];
        let mut rest = html;

        while !rest.is_empty() {
            let top = *stack.last().unwrap_or(&root);

            if let Some(after) = rest.strip_prefix("<!--") {
                rest = after.find("-->").map_or("", |end| &after[end + 3..]);
                continue;
            }

            if rest.starts_with("</") {
                let end = rest.find('>').unwrap_or(rest.len());
                let name = rest[2..end].trim().to_ascii_lowercase();
                rest = rest.get(end + 1..).unwrap_or("");
                if let Some(pos) = stack
                    .iter()
                    .rposition(|&id| id != root && tree.tag(id) == Some(name.as_str()))
                {
                    stack.truncate(pos);
                }
                continue;
            }

            if starts_markup(rest) {
                if let Some(tag) = parse_open_tag(rest) {
                    rest = &rest[tag.len..];
                    let element = tree.create_element(tag.name.as_str());
                    for (key, value) in tag.attrs {
                        // Freshly created elements always accept attributes.
                        let _ = tree.set_attr(element, &key, value);
                    }
                    tree.attach(top, element);
                    if !tag.self_closing && !is_void(&tag.name) {
                        stack.push(element);
                    }
                    continue;
                }
            }

            // Text runs until the next markup, always consuming at least one char.
            let first = rest.chars().next().map_or(1, char::len_utf8);
            let end = rest[first..]
                .char_indices()
                .map(|(i, _)| i + first)
                .find(|&i| starts_markup(&rest[i..]))
                .unwrap_or(rest.len());
            let text = decode_entities(&rest[..end]);
            rest = &rest[end..];
            tree.append_text(top, &text);
        }

        tree
    }

    /// Appends text to `parent`, merging into a trailing text child.
    fn append_text(&mut self, parent: NodeId, text: &str) {
        if let Some(&last) = self.children(parent).last() {
            if self.is_text(last) {
                if let Some(rope) = self.text(last) {
                    let at = rope.len_chars();
                    let _ = self.insert_text(crate::BoundaryPoint::new(last, at), text);
                    return;
                }
            }
        }
        let node = self.create_text(text);
        self.attach(parent, node);
    }

    /// Serializes the root's content.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for &child in self.children(self.root()) {
            self.write_node(child, &mut out);
        }
        out
    }

    /// Serializes a single node and its subtree.
    pub fn node_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_node(node, &mut out);
        out
    }

    /// Writes a subtree with an explicit stack, so nesting depth is bounded
    /// only by memory.
    fn write_node(&self, node: NodeId, out: &mut String) {
        let mut stack = vec![Frame::Enter(node)];
        while let Some(frame) = stack.pop() {
            let id = match frame {
                Frame::Enter(id) => id,
                Frame::Exit(tag) => {
                    let _ = write!(out, "</{tag}>");
                    continue;
                }
            };
            match self.kind(id) {
                Some(NodeKind::Text(rope)) => {
                    for chunk in rope.chunks() {
                        escape_text(chunk, out);
                    }
                }
                Some(NodeKind::Element { tag, attrs }) => {
                    out.push('<');
                    out.push_str(tag);
                    for (key, value) in attrs {
                        let _ = write!(out, " {key}=\"");
                        escape_attr(value, out);
                        out.push('"');
                    }
                    out.push('>');
                    if is_void(tag) {
                        continue;
                    }
                    stack.push(Frame::Exit(tag));
                    stack.extend(
                        self.children(id)
                            .iter()
                            .rev()
                            .map(|&child| Frame::Enter(child)),
                    );
                }
                None => {}
            }
        }
    }
}

/// Serializer work item.
enum Frame<'a> {
    Enter(NodeId),
    Exit(&'a str),
}
