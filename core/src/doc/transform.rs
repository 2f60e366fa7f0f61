//! Document transactions: replace and mark steps with position mapping.
//!
//! A replace keeps everything left of `from` and right of `to`, drops the
//! content between, and inserts a slice. Textblocks cut open by the range
//! are joined, and open slice edges merge into them, so replacing a phrase
//! that spans two paragraphs leaves a single paragraph behind.

use serde::Serialize;
use tracing::debug;

use crate::doc::model::{normalize_marks, Fragment, Mark, Node, Slice};
use crate::error::Error;

/// Which side a position sticks to when content is inserted at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Assoc {
    Before,
    #[default]
    After,
}

/// Position change caused by one replace step.
///
/// `new_size` is the width of the inserted slice. Joining structure around
/// the range can also drop wrapper tokens after it, so positions past the
/// range shift by `new_size - old_size` and are clamped to `doc_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepMap {
    pub start: usize,
    pub old_size: usize,
    pub new_size: usize,
    /// Content size of the document after the step.
    pub doc_size: usize,
}

impl StepMap {
    pub fn map(&self, pos: usize, assoc: Assoc) -> usize {
        let end = self.start + self.old_size;
        if pos < self.start {
            return pos;
        }
        if pos > end {
            return (pos - self.old_size + self.new_size).min(self.doc_size);
        }
        let before = if self.old_size == 0 {
            assoc == Assoc::Before
        } else if pos == self.start {
            true
        } else if pos == end {
            false
        } else {
            assoc == Assoc::Before
        };
        if before {
            self.start
        } else {
            self.start + self.new_size
        }
    }

    /// Signed change in document size.
    pub fn delta(&self) -> isize {
        self.new_size as isize - self.old_size as isize
    }
}

/// Ordered step maps of a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Mapping {
    maps: Vec<StepMap>,
}

impl Mapping {
    pub fn push(&mut self, map: StepMap) {
        self.maps.push(map);
    }

    pub fn maps(&self) -> &[StepMap] {
        &self.maps
    }

    pub fn map(&self, pos: usize, assoc: Assoc) -> usize {
        self.maps.iter().fold(pos, |p, m| m.map(p, assoc))
    }

    /// True when `pos` fell strictly inside a range some step replaced.
    pub fn touches(&self, pos: usize) -> bool {
        let mut pos = pos;
        for m in &self.maps {
            if m.start < pos && pos < m.start + m.old_size {
                return true;
            }
            pos = m.map(pos, Assoc::After);
        }
        false
    }
}

/// A batch of steps applied to a working copy of a document.
#[derive(Debug, Clone)]
pub struct Transaction {
    doc: Node,
    mapping: Mapping,
    steps: usize,
}

impl Transaction {
    pub fn new(doc: &Node) -> Self {
        Self {
            doc: doc.clone(),
            mapping: Mapping::default(),
            steps: 0,
        }
    }

    pub fn doc(&self) -> &Node {
        &self.doc
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn step_count(&self) -> usize {
        self.steps
    }

    pub fn doc_changed(&self) -> bool {
        self.steps > 0
    }

    pub fn into_doc(self) -> Node {
        self.doc
    }

    /// Replace `from..to` with `slice`. On error the working document is
    /// left as it was.
    pub fn replace(&mut self, from: usize, to: usize, slice: &Slice) -> Result<StepMap, Error> {
        let replaced = replace_range(&self.doc, from, to, slice)?;
        let map = StepMap {
            start: from,
            old_size: to - from,
            new_size: slice.size(),
            doc_size: replaced.content_size(),
        };
        debug!(from, to, inserted = map.new_size, doc_size = map.doc_size, "replace step");
        self.doc = replaced;
        self.mapping.push(map);
        self.steps += 1;
        Ok(map)
    }

    /// Add `mark` to every text char between `from` and `to`.
    pub fn add_mark(&mut self, from: usize, to: usize, mark: &Mark) -> Result<(), Error> {
        check_bounds(&self.doc, from, to)?;
        if from == to {
            return Err(Error::InvalidRange { from, to });
        }
        let Node::Block { content, .. } = &self.doc else {
            return Err(Error::NotInline(from));
        };
        let marked = mark_fragment(content, 0, from, to, mark);
        self.doc = self.doc.with_content(marked);
        self.steps += 1;
        Ok(())
    }
}

fn check_bounds(doc: &Node, from: usize, to: usize) -> Result<(), Error> {
    let size = doc.content_size();
    if from > to {
        return Err(Error::InvalidRange { from, to });
    }
    if to > size {
        return Err(Error::PositionOutOfBounds { pos: to, size });
    }
    Ok(())
}

/// Build the document that results from replacing `from..to` with `slice`.
pub fn replace_range(doc: &Node, from: usize, to: usize, slice: &Slice) -> Result<Node, Error> {
    check_bounds(doc, from, to)?;
    for pos in [from, to] {
        if doc.resolve_inline(pos).is_none() {
            return Err(Error::NotInline(pos));
        }
    }
    let Node::Block { content, .. } = doc else {
        return Err(Error::NotInline(from));
    };
    let left = content.cut(0, from);
    let right = content.cut(to, content.size());

    let slice_open_start = slice.open_start > 0;
    let left_open_after = if slice.content.is_empty() {
        true
    } else {
        slice.open_end > 0
    };
    // A closed slice end leaves the cut textblock's tail on its own; when
    // that tail is empty it is a leftover, not content.
    let right = if left_open_after {
        right
    } else {
        drop_empty_leading_textblock(right)
    };
    let joined = join(left, true, slice.content.clone(), slice_open_start);
    let joined = join(joined, left_open_after, right, true);
    Ok(doc.with_content(joined))
}

/// Remove an empty textblock at the start of `fragment`, along with any
/// wrappers that become empty once it is gone.
fn drop_empty_leading_textblock(fragment: Fragment) -> Fragment {
    let mut nodes = fragment.into_nodes();
    if nodes.is_empty() {
        return Fragment::empty();
    }
    let first = nodes.remove(0);
    if first.is_textblock() {
        if first.content_size() > 0 {
            nodes.insert(0, first);
        }
    } else if let Some(content) = first.content() {
        let inner = drop_empty_leading_textblock(content.clone());
        if !inner.is_empty() {
            nodes.insert(0, first.with_content(inner));
        }
    } else {
        nodes.insert(0, first);
    }
    Fragment::from_nodes(nodes)
}

/// Concatenate two fragments, merging the last node of `a` with the first
/// node of `b` when both edges are open.
fn join(a: Fragment, a_open: bool, b: Fragment, b_open: bool) -> Fragment {
    if !a_open || !b_open || a.is_empty() || b.is_empty() {
        return a.append(b);
    }
    let mut head = a.into_nodes();
    let mut tail = b.into_nodes().into_iter();
    let (Some(last), Some(first)) = (head.pop(), tail.next()) else {
        return Fragment::empty();
    };
    head.extend(join_nodes(last, first));
    head.extend(tail);
    Fragment::from_nodes(head)
}

fn join_nodes(left: Node, right: Node) -> Vec<Node> {
    let (Some(left_content), Some(right_content)) = (left.content(), right.content()) else {
        return vec![left, right];
    };
    match (left.is_textblock(), right.is_textblock()) {
        (true, true) => {
            let merged = left_content.clone().append(right_content.clone());
            vec![left.with_content(merged)]
        }
        (false, false) => {
            let merged = join(left_content.clone(), true, right_content.clone(), true);
            vec![left.with_content(merged)]
        }
        (false, true) => {
            let merged = join(left_content.clone(), true, Fragment::from_nodes(vec![right]), true);
            vec![left.with_content(merged)]
        }
        (true, false) => match take_first_textblock(right) {
            (Some(textblock), rest) => {
                let inline = textblock.content().cloned().unwrap_or_default();
                let merged = left.with_content(left_content.clone().append(inline));
                let mut out = vec![merged];
                out.extend(rest);
                out
            }
            (None, rest) => {
                let mut out = vec![left];
                out.extend(rest);
                out
            }
        },
    }
}

/// Detach the first textblock found along the first-child chain of `node`.
/// Returns the textblock and whatever remains of `node` (if anything).
fn take_first_textblock(node: Node) -> (Option<Node>, Option<Node>) {
    if node.is_textblock() {
        return (Some(node), None);
    }
    let Some(content) = node.content().cloned() else {
        return (None, Some(node));
    };
    let mut children = content.into_nodes().into_iter();
    let Some(first) = children.next() else {
        return (None, Some(node));
    };
    let (found, rest_first) = take_first_textblock(first);
    if found.is_none() {
        let mut kept: Vec<Node> = rest_first.into_iter().collect();
        kept.extend(children);
        return (None, Some(node.with_content(Fragment::from_nodes(kept))));
    }
    let mut kept: Vec<Node> = rest_first.into_iter().collect();
    kept.extend(children);
    if kept.is_empty() {
        (found, None)
    } else {
        (found, Some(node.with_content(Fragment::from_nodes(kept))))
    }
}

fn mark_fragment(fragment: &Fragment, base: usize, from: usize, to: usize, mark: &Mark) -> Fragment {
    let mut out = Fragment::empty();
    let mut pos = base;
    for child in fragment.iter() {
        let end = pos + child.size();
        if end <= from || pos >= to {
            out.push(child.clone());
            pos = end;
            continue;
        }
        match child {
            Node::Text { text, marks } => {
                let len = text.chars().count();
                let start = from.saturating_sub(pos);
                let stop = (to - pos).min(len);
                let before: String = text.chars().take(start).collect();
                let middle: String = text.chars().skip(start).take(stop - start).collect();
                let after: String = text.chars().skip(stop).collect();
                let mut with_mark = marks.clone();
                with_mark.push(mark.clone());
                out.push(Node::Text {
                    text: before,
                    marks: marks.clone(),
                });
                out.push(Node::Text {
                    text: middle,
                    marks: normalize_marks(with_mark),
                });
                out.push(Node::Text {
                    text: after,
                    marks: marks.clone(),
                });
            }
            Node::HardBreak => out.push(Node::HardBreak),
            Node::Block { content, .. } => {
                let inner = mark_fragment(content, pos + 1, from, to, mark);
                out.push(child.with_content(inner));
            }
        }
        pos = end;
    }
    out
}
