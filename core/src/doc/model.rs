//! Tree document model with integer positions.
//!
//! Positions count tokens the way ProseMirror does: a text node is one
//! token per char, an inline leaf is one token, and every other node adds an
//! opening and a closing token around its content. Position `0` is the
//! start of the document's content and `content_size()` is its end.

use serde::Serialize;

/// Inline formatting attached to text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mark {
    Bold,
    Italic,
    Underline,
    Strike,
    Code,
    Link { href: String },
    Highlight { color: String },
}

impl Mark {
    pub fn same_kind(&self, other: &Mark) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Kinds of non-text, non-leaf nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Doc,
    Paragraph,
    Heading(u8),
    Blockquote,
    BulletList,
    OrderedList,
    ListItem,
}

impl BlockKind {
    /// Blocks whose content is inline (text and breaks).
    pub fn is_textblock(self) -> bool {
        matches!(self, BlockKind::Paragraph | BlockKind::Heading(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Text { text: String, marks: Vec<Mark> },
    HardBreak,
    Block { kind: BlockKind, content: Fragment },
}

impl Node {
    pub fn text(text: impl Into<String>) -> Node {
        Node::Text {
            text: text.into(),
            marks: Vec::new(),
        }
    }

    pub fn marked_text(text: impl Into<String>, marks: Vec<Mark>) -> Node {
        Node::Text {
            text: text.into(),
            marks: normalize_marks(marks),
        }
    }

    pub fn block(kind: BlockKind, content: Vec<Node>) -> Node {
        Node::Block {
            kind,
            content: Fragment::from_nodes(content),
        }
    }

    pub fn doc(blocks: Vec<Node>) -> Node {
        Node::block(BlockKind::Doc, blocks)
    }

    pub fn paragraph(inline: Vec<Node>) -> Node {
        Node::block(BlockKind::Paragraph, inline)
    }

    /// Width of this node in the position space.
    pub fn size(&self) -> usize {
        match self {
            Node::Text { text, .. } => text.chars().count(),
            Node::HardBreak => 1,
            Node::Block { content, .. } => content.size() + 2,
        }
    }

    pub fn content_size(&self) -> usize {
        match self {
            Node::Block { content, .. } => content.size(),
            _ => 0,
        }
    }

    pub fn content(&self) -> Option<&Fragment> {
        match self {
            Node::Block { content, .. } => Some(content),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<BlockKind> {
        match self {
            Node::Block { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_inline(&self) -> bool {
        !matches!(self, Node::Block { .. })
    }

    pub fn is_textblock(&self) -> bool {
        self.kind().is_some_and(BlockKind::is_textblock)
    }

    /// Same node type with new content.
    pub fn with_content(&self, content: Fragment) -> Node {
        match self {
            Node::Block { kind, .. } => Node::Block {
                kind: *kind,
                content,
            },
            other => other.clone(),
        }
    }

    /// Concatenated text of all descendants, without separators.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Node::Text { text, .. } => out.push_str(text),
            Node::HardBreak => {}
            Node::Block { content, .. } => {
                for child in content.iter() {
                    child.collect_text(out);
                }
            }
        }
    }

    /// Copy of this node restricted to content positions `from..to`.
    pub fn cut(&self, from: usize, to: usize) -> Node {
        match self {
            Node::Text { text, marks } => {
                let to = to.min(text.chars().count());
                Node::Text {
                    text: text.chars().skip(from).take(to.saturating_sub(from)).collect(),
                    marks: marks.clone(),
                }
            }
            Node::HardBreak => Node::HardBreak,
            Node::Block { kind, content } => Node::Block {
                kind: *kind,
                content: content.cut(from, to),
            },
        }
    }

    /// Visit every descendant with the position where it starts.
    /// Returning `false` from the callback skips that node's children.
    pub fn descendants<F>(&self, f: &mut F)
    where
        F: FnMut(&Node, usize) -> bool,
    {
        if let Node::Block { content, .. } = self {
            content.for_each_at(0, f);
        }
    }

    /// Locate the textblock holding `pos`, if `pos` is an inline position.
    pub fn resolve_inline(&self, pos: usize) -> Option<InlinePos> {
        let mut path = Vec::new();
        let mut node = self;
        let mut base = 0;
        loop {
            let Node::Block { kind, content } = node else {
                return None;
            };
            if kind.is_textblock() {
                if pos > base + content.size() {
                    return None;
                }
                return Some(InlinePos {
                    path,
                    content_start: base,
                    offset: pos - base,
                });
            }
            let mut child_start = base;
            let mut next = None;
            for (idx, child) in content.iter().enumerate() {
                let end = child_start + child.size();
                if matches!(child, Node::Block { .. }) && pos > child_start && pos < end {
                    next = Some((idx, child, child_start + 1));
                    break;
                }
                child_start = end;
            }
            let (idx, child, child_base) = next?;
            path.push(idx);
            node = child;
            base = child_base;
        }
    }

    /// Text between two positions, with `separator` between blocks.
    pub fn text_between(&self, from: usize, to: usize, separator: &str) -> String {
        let mut out = String::new();
        let mut last_was_block = false;
        self.descendants(&mut |node, pos| {
            let end = pos + node.size();
            if end <= from || pos >= to {
                return false;
            }
            match node {
                Node::Text { text, .. } => {
                    let start = from.saturating_sub(pos);
                    let stop = (to - pos).min(text.chars().count());
                    out.extend(text.chars().skip(start).take(stop.saturating_sub(start)));
                    last_was_block = false;
                }
                Node::HardBreak => {
                    out.push_str(separator);
                    last_was_block = false;
                }
                Node::Block { kind, .. } => {
                    if kind.is_textblock() && !out.is_empty() && !last_was_block {
                        out.push_str(separator);
                        last_was_block = true;
                    }
                }
            }
            true
        });
        out
    }
}

/// An inline position resolved to its textblock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinePos {
    /// Child indices from the document down to the textblock.
    pub path: Vec<usize>,
    /// Position of the first content token of the textblock.
    pub content_start: usize,
    /// Offset of the position inside the textblock's content.
    pub offset: usize,
}

/// Ordered child list that keeps adjacent text with equal marks merged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct Fragment {
    nodes: Vec<Node>,
}

impl Fragment {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_nodes(nodes: Vec<Node>) -> Self {
        let mut fragment = Fragment::empty();
        for node in nodes {
            fragment.push(node);
        }
        fragment
    }

    /// Append a node, merging it into a preceding text node when possible.
    pub fn push(&mut self, node: Node) {
        if let Node::Text { text, marks } = &node {
            if text.is_empty() {
                return;
            }
            if let Some(Node::Text {
                text: prev,
                marks: prev_marks,
            }) = self.nodes.last_mut()
            {
                if prev_marks == marks {
                    prev.push_str(text);
                    return;
                }
            }
        }
        self.nodes.push(node);
    }

    pub fn append(mut self, other: Fragment) -> Fragment {
        for node in other.nodes {
            self.push(node);
        }
        self
    }

    pub fn size(&self) -> usize {
        self.nodes.iter().map(Node::size).sum()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.nodes.iter()
    }

    pub fn first(&self) -> Option<&Node> {
        self.nodes.first()
    }

    pub fn last(&self) -> Option<&Node> {
        self.nodes.last()
    }

    pub fn into_nodes(self) -> Vec<Node> {
        self.nodes
    }

    /// Copy restricted to positions `from..to` of this fragment; nodes cut
    /// in the middle keep their type with truncated content.
    pub fn cut(&self, from: usize, to: usize) -> Fragment {
        let mut result = Fragment::empty();
        let mut pos = 0;
        for child in &self.nodes {
            if pos >= to {
                break;
            }
            let size = child.size();
            let end = pos + size;
            if end > from {
                let piece = if from <= pos && end <= to {
                    child.clone()
                } else {
                    match child {
                        Node::Block { .. } => child.cut(
                            from.saturating_sub(pos + 1),
                            child.content_size().min(to - pos - 1),
                        ),
                        _ => child.cut(from.saturating_sub(pos), to - pos),
                    }
                };
                result.push(piece);
            }
            pos = end;
        }
        result
    }

    fn for_each_at<F>(&self, base: usize, f: &mut F)
    where
        F: FnMut(&Node, usize) -> bool,
    {
        let mut pos = base;
        for child in &self.nodes {
            if f(child, pos) {
                if let Node::Block { content, .. } = child {
                    content.for_each_at(pos + 1, f);
                }
            }
            pos += child.size();
        }
    }
}

impl From<Vec<Node>> for Fragment {
    fn from(nodes: Vec<Node>) -> Self {
        Fragment::from_nodes(nodes)
    }
}

/// A fragment cut out of (or destined for) a document. `open_start` and
/// `open_end` count how many textblock levels are open on each edge; open
/// edges merge into the surrounding text when the slice is inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slice {
    pub content: Fragment,
    pub open_start: usize,
    pub open_end: usize,
}

impl Slice {
    pub fn new(content: Fragment, open_start: usize, open_end: usize) -> Self {
        Self {
            content,
            open_start,
            open_end,
        }
    }

    /// Slice of inline nodes, wrapped in an open paragraph.
    pub fn inline(nodes: Vec<Node>) -> Self {
        Self::new(Fragment::from_nodes(vec![Node::paragraph(nodes)]), 1, 1)
    }

    /// Positions this slice adds when it is inserted.
    pub fn size(&self) -> usize {
        self.content
            .size()
            .saturating_sub(self.open_start + self.open_end)
    }
}

/// Sort marks and keep at most one mark of each kind (the last one wins).
pub fn normalize_marks(marks: Vec<Mark>) -> Vec<Mark> {
    let mut out: Vec<Mark> = Vec::with_capacity(marks.len());
    for mark in marks {
        out.retain(|m| !m.same_kind(&mark));
        out.push(mark);
    }
    out.sort();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Node {
        Node::doc(vec![
            Node::paragraph(vec![Node::text("Hello world")]),
            Node::paragraph(vec![Node::text("Goodbye")]),
        ])
    }

    #[test]
    fn sizes_count_open_and_close_tokens() {
        let doc = sample();
        assert_eq!(doc.content_size(), 13 + 9);
        assert_eq!(doc.size(), 24);
    }

    #[test]
    fn adjacent_text_merges() {
        let frag = Fragment::from_nodes(vec![Node::text("ab"), Node::text(""), Node::text("cd")]);
        assert_eq!(frag.len(), 1);
        let frag = Fragment::from_nodes(vec![
            Node::text("ab"),
            Node::marked_text("cd", vec![Mark::Bold]),
        ]);
        assert_eq!(frag.len(), 2);
    }

    #[test]
    fn resolves_inline_positions() {
        let doc = sample();
        let at = doc.resolve_inline(1).unwrap();
        assert_eq!(at.path, vec![0]);
        assert_eq!(at.offset, 0);
        let at = doc.resolve_inline(12).unwrap();
        assert_eq!(at.offset, 11);
        assert!(doc.resolve_inline(0).is_none());
        assert!(doc.resolve_inline(13).is_none());
        let at = doc.resolve_inline(14).unwrap();
        assert_eq!(at.path, vec![1]);
        assert_eq!(at.content_start, 14);
    }

    #[test]
    fn resolves_inside_nested_lists() {
        let doc = Node::doc(vec![Node::block(
            BlockKind::BulletList,
            vec![Node::block(
                BlockKind::ListItem,
                vec![Node::paragraph(vec![Node::text("item")])],
            )],
        )]);
        let at = doc.resolve_inline(3).unwrap();
        assert_eq!(at.path, vec![0, 0, 0]);
        assert_eq!(at.offset, 0);
        assert!(doc.resolve_inline(2).is_none());
    }

    #[test]
    fn cut_keeps_open_wrappers() {
        let doc = sample();
        let left = doc.content().unwrap().cut(0, 7);
        assert_eq!(
            left,
            Fragment::from_nodes(vec![Node::paragraph(vec![Node::text("Hello ")])])
        );
        let right = doc.content().unwrap().cut(9, doc.content_size());
        assert_eq!(right.len(), 2);
        assert_eq!(right.first().unwrap().text_content(), "rld");
    }

    #[test]
    fn text_between_inserts_separators() {
        let doc = sample();
        assert_eq!(doc.text_between(0, doc.content_size(), "\n"), "Hello world\nGoodbye");
        assert_eq!(doc.text_between(7, 16, " "), "world Go");
    }

    #[test]
    fn marks_are_normalized() {
        let marks = normalize_marks(vec![
            Mark::Italic,
            Mark::Bold,
            Mark::Highlight { color: "red".into() },
            Mark::Highlight { color: "blue".into() },
        ]);
        assert_eq!(
            marks,
            vec![Mark::Bold, Mark::Italic, Mark::Highlight { color: "blue".into() }]
        );
    }
}
