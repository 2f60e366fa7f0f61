//! Live document handle and the suggestion replacer.
//!
//! Replacing is split in two calls. [`Editor::replace`] commits every range
//! in one transaction and returns a [`CommitResult`]; the caller decides
//! when to run [`Editor::restore_selection`] with it.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::doc::find::{find_phrases, find_text_ranges};
use crate::doc::html::{parse_document, parse_slice, to_html};
use crate::doc::model::{Mark, Node, Slice};
use crate::doc::transform::{Assoc, Mapping, Transaction};
use crate::error::Error;
use crate::phrase::normalize_phrase;
use crate::{ComplianceResult, MatchRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Selection {
    pub anchor: usize,
    pub head: usize,
}

impl Selection {
    pub fn new(anchor: usize, head: usize) -> Self {
        Self { anchor, head }
    }

    pub fn cursor(pos: usize) -> Self {
        Self::new(pos, pos)
    }

    pub fn from(&self) -> usize {
        self.anchor.min(self.head)
    }

    pub fn to(&self) -> usize {
        self.anchor.max(self.head)
    }

    pub fn is_empty(&self) -> bool {
        self.anchor == self.head
    }
}

/// Outcome of one committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitResult {
    /// Ranges that were replaced, in the coordinates they had when applied.
    pub applied: Vec<MatchRange>,
    /// Input ranges that were skipped.
    pub skipped: Vec<MatchRange>,
    #[serde(skip)]
    pub mapping: Mapping,
    pub selection_before: Selection,
    pub size_before: usize,
    pub size_after: usize,
}

impl CommitResult {
    pub fn changed(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Where the selection ended up after [`Editor::restore_selection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "selection", rename_all = "snake_case")]
pub enum SelectionRestore {
    /// Both ends were still valid inline positions.
    Restored(Selection),
    /// Clamped or moved to the nearest inline position.
    Adjusted(Selection),
    /// Nothing resolvable near the old offsets; cursor placed at the end.
    DocumentEnd(Selection),
}

impl SelectionRestore {
    pub fn selection(&self) -> Selection {
        match self {
            SelectionRestore::Restored(s)
            | SelectionRestore::Adjusted(s)
            | SelectionRestore::DocumentEnd(s) => *s,
        }
    }
}

/// A document plus the user's selection, passed explicitly to every
/// operation that reads or mutates it.
#[derive(Debug, Clone)]
pub struct Editor {
    doc: Node,
    selection: Selection,
}

impl Editor {
    pub fn new(doc: Node) -> Self {
        let start = nearest_inline(&doc, 0).unwrap_or(0);
        Self {
            doc,
            selection: Selection::cursor(start),
        }
    }

    pub fn from_html(html: &str) -> Self {
        Self::new(parse_document(html))
    }

    pub fn doc(&self) -> &Node {
        &self.doc
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = selection;
    }

    pub fn to_html(&self) -> String {
        to_html(&self.doc)
    }

    /// Replace every range with `slice` in a single transaction.
    ///
    /// Ranges are applied from the last to the first, each mapped through
    /// the steps already taken. Ranges with an end inside an earlier
    /// replacement, ranges that collapse after mapping, and steps that fail
    /// are skipped. The document is only swapped if at least one
    /// step succeeded; if every range was rejected the last error is
    /// returned.
    pub fn replace(&mut self, ranges: &[MatchRange], slice: &Slice) -> Result<CommitResult, Error> {
        let size_before = self.doc.content_size();
        let mut sorted = ranges.to_vec();
        sorted.sort_by(|a, b| b.from.cmp(&a.from));

        let mut tr = Transaction::new(&self.doc);
        let mut applied = Vec::new();
        let mut skipped = Vec::new();
        let mut last_err = None;
        for range in sorted {
            if tr.mapping().touches(range.from) || tr.mapping().touches(range.to) {
                warn!(from = range.from, to = range.to, "range overlaps an earlier replacement, skipping");
                last_err = Some(Error::InvalidRange {
                    from: range.from,
                    to: range.to,
                });
                skipped.push(range);
                continue;
            }
            let from = tr.mapping().map(range.from, Assoc::After);
            let to = tr.mapping().map(range.to, Assoc::Before);
            if from >= to {
                warn!(from = range.from, to = range.to, mapped_from = from, mapped_to = to, "range collapsed after mapping, skipping");
                last_err = Some(Error::InvalidRange { from, to });
                skipped.push(range);
                continue;
            }
            match tr.replace(from, to, slice) {
                Ok(_) => applied.push(MatchRange::new(from, to)),
                Err(err) => {
                    warn!(from, to, %err, "replace step failed, skipping");
                    last_err = Some(err);
                    skipped.push(range);
                }
            }
        }

        if applied.is_empty() {
            if let Some(err) = last_err {
                return Err(err);
            }
        }
        let mapping = tr.mapping().clone();
        if tr.doc_changed() {
            self.doc = tr.into_doc();
        }
        let size_after = self.doc.content_size();
        info!(applied = applied.len(), skipped = skipped.len(), size_before, size_after, "committed replacement");
        Ok(CommitResult {
            applied,
            skipped,
            mapping,
            selection_before: self.selection,
            size_before,
            size_after,
        })
    }

    /// Put the selection back near where it was before `commit`.
    ///
    /// The old offsets are clamped to the new document and moved to the
    /// nearest inline position. Content is never rolled back here.
    pub fn restore_selection(&mut self, commit: &CommitResult) -> SelectionRestore {
        let size = self.doc.content_size();
        let old = commit.selection_before;
        let anchor = old.anchor.min(size);
        let head = old.head.min(size);

        let restored = match (nearest_inline(&self.doc, anchor), nearest_inline(&self.doc, head)) {
            (Some(a), Some(h)) => {
                let selection = Selection::new(a, h);
                if selection == old {
                    SelectionRestore::Restored(selection)
                } else {
                    SelectionRestore::Adjusted(selection)
                }
            }
            _ => {
                let end = last_inline(&self.doc).unwrap_or(size);
                warn!(anchor = old.anchor, head = old.head, end, "could not restore selection, moving to document end");
                SelectionRestore::DocumentEnd(Selection::cursor(end))
            }
        };
        self.selection = restored.selection();
        debug!(?restored, "selection restored");
        restored
    }
}

/// Replace every occurrence of `phrase` in the editor's document with the
/// parsed `replacement_html`.
///
/// Never fails: empty input, unparseable HTML, a phrase that is not found,
/// or a transaction with no applicable steps are logged and yield `None`
/// with the document untouched.
pub fn apply_suggestion_across(
    editor: &mut Editor,
    phrase: &str,
    replacement_html: &str,
) -> Option<CommitResult> {
    let Some(phrase) = normalize_phrase(phrase) else {
        warn!("no original text to replace");
        return None;
    };
    let slice = match parse_slice(replacement_html) {
        Ok(slice) => slice,
        Err(err) => {
            warn!(phrase, %err, "could not parse replacement");
            return None;
        }
    };
    let ranges = find_text_ranges(editor.doc(), phrase);
    if ranges.is_empty() {
        info!(phrase, "phrase not found in document");
        return None;
    }
    match editor.replace(&ranges, &slice) {
        Ok(commit) => Some(commit),
        Err(err) => {
            warn!(phrase, %err, "no range could be replaced");
            None
        }
    }
}

/// Add a highlight mark over every actionable finding in one transaction.
/// Returns the number of ranges marked.
pub fn highlight_findings(editor: &mut Editor, results: &[ComplianceResult], color: &str) -> usize {
    let phrases: Vec<&str> = results
        .iter()
        .filter(|r| r.is_actionable())
        .map(|r| r.original.as_str())
        .collect();
    let found = find_phrases(editor.doc(), &phrases);
    if found.is_empty() {
        debug!(findings = phrases.len(), "nothing to highlight");
        return 0;
    }

    let mark = Mark::Highlight {
        color: color.to_string(),
    };
    let mut tr = Transaction::new(editor.doc());
    let mut marked = 0;
    for (idx, range) in found {
        match tr.add_mark(range.from, range.to, &mark) {
            Ok(()) => marked += 1,
            Err(err) => warn!(phrase = phrases[idx], %err, "could not highlight range"),
        }
    }
    if tr.doc_changed() {
        editor.doc = tr.into_doc();
    }
    marked
}

/// Closest position to `pos` that resolves into a textblock, preferring the
/// left side on ties.
fn nearest_inline(doc: &Node, pos: usize) -> Option<usize> {
    let size = doc.content_size();
    let pos = pos.min(size);
    for distance in 0..=size {
        if let Some(left) = pos.checked_sub(distance) {
            if doc.resolve_inline(left).is_some() {
                return Some(left);
            }
        }
        let right = pos + distance;
        if right <= size && doc.resolve_inline(right).is_some() {
            return Some(right);
        }
    }
    None
}

fn last_inline(doc: &Node) -> Option<usize> {
    (0..=doc.content_size())
        .rev()
        .find(|&pos| doc.resolve_inline(pos).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::find::flatten;

    fn finding(original: &str) -> ComplianceResult {
        ComplianceResult {
            original: original.into(),
            compliant: false,
            suggestion: None,
            reason: None,
            citations: Vec::new(),
        }
    }

    #[test]
    fn replaces_across_paragraphs() {
        let mut editor = Editor::from_html("<p>Hello world</p><p>Goodbye</p>");
        let commit = apply_suggestion_across(&mut editor, "world goodbye", "<em>friend</em>").unwrap();
        assert_eq!(editor.to_html(), "<p>Hello <em>friend</em></p>");
        assert_eq!(commit.applied, vec![MatchRange::new(7, 21)]);
        assert_eq!(commit.size_before, 22);
        assert_eq!(commit.size_after, 14);
    }

    #[test]
    fn replaces_every_occurrence() {
        let mut editor = Editor::from_html("<p>Fee and fee</p>");
        let commit = apply_suggestion_across(&mut editor, "fee", "charge").unwrap();
        assert_eq!(editor.to_html(), "<p>charge and charge</p>");
        assert_eq!(commit.applied.len(), 2);
        assert_eq!(flatten(editor.doc()).as_string(), "charge and charge");
    }

    #[test]
    fn collapsed_ranges_are_skipped() {
        let mut editor = Editor::from_html("<p>aaaa</p>");
        let slice = Slice::inline(vec![Node::text("X")]);
        let commit = editor
            .replace(&[MatchRange::new(1, 5), MatchRange::new(1, 3)], &slice)
            .unwrap();
        assert_eq!(editor.to_html(), "<p>X</p>");
        assert_eq!(commit.applied.len(), 1);
        assert_eq!(commit.skipped, vec![MatchRange::new(1, 3)]);
    }

    #[test]
    fn overlapping_matches_skip_the_inner_range() {
        let mut editor = Editor::from_html("<p>aaaa</p>");
        let slice = Slice::inline(vec![Node::text("X")]);
        let ranges = [MatchRange::new(1, 3), MatchRange::new(2, 4), MatchRange::new(3, 5)];
        let commit = editor.replace(&ranges, &slice).unwrap();
        assert_eq!(editor.to_html(), "<p>XX</p>");
        assert_eq!(commit.applied, vec![MatchRange::new(3, 5), MatchRange::new(1, 3)]);
        assert_eq!(commit.skipped, vec![MatchRange::new(2, 4)]);
    }

    #[test]
    fn replacement_can_reach_into_a_sole_list_item() {
        let mut editor = Editor::from_html("<p>Intro text</p><ul><li>first item</li></ul>");
        let commit = apply_suggestion_across(&mut editor, "text first", "X").unwrap();
        assert_eq!(editor.to_html(), "<p>Intro X item</p>");
        assert_eq!(commit.applied, vec![MatchRange::new(7, 20)]);
        assert_eq!(commit.size_after, 14);
    }

    #[test]
    fn all_failing_ranges_report_an_error() {
        let mut editor = Editor::from_html("<p>abc</p>");
        let slice = Slice::inline(vec![Node::text("X")]);
        let err = editor.replace(&[MatchRange::new(0, 3)], &slice).unwrap_err();
        assert!(matches!(err, Error::NotInline(0)));
        assert_eq!(editor.to_html(), "<p>abc</p>");
    }

    #[test]
    fn soft_failures_leave_document_alone() {
        let mut editor = Editor::from_html("<p>Hello world</p>");
        assert!(apply_suggestion_across(&mut editor, "   ", "x").is_none());
        assert!(apply_suggestion_across(&mut editor, "world", "").is_none());
        assert!(apply_suggestion_across(&mut editor, "world", "<p></p>").is_none());
        assert!(apply_suggestion_across(&mut editor, "planet", "x").is_none());
        assert_eq!(editor.to_html(), "<p>Hello world</p>");
    }

    #[test]
    fn selection_is_clamped_and_moved_inline() {
        let mut editor = Editor::from_html("<p>Hello world</p><p>Goodbye</p>");
        editor.set_selection(Selection::cursor(20));
        let commit = apply_suggestion_across(&mut editor, "world goodbye", "friend").unwrap();
        // content is now 14 wide; 14 sits after the paragraph, 13 is its end
        let restored = editor.restore_selection(&commit);
        assert_eq!(restored, SelectionRestore::Adjusted(Selection::cursor(13)));
        assert_eq!(editor.selection(), Selection::cursor(13));
    }

    #[test]
    fn selection_before_the_change_is_restored() {
        let mut editor = Editor::from_html("<p>Hello world</p>");
        editor.set_selection(Selection::new(1, 3));
        let commit = apply_suggestion_across(&mut editor, "world", "there").unwrap();
        assert_eq!(
            editor.restore_selection(&commit),
            SelectionRestore::Restored(Selection::new(1, 3))
        );
    }

    #[test]
    fn highlights_findings_as_marks() {
        let mut editor = Editor::from_html("<p>The quick fox</p>");
        let results = vec![finding("quick"), finding("absent")];
        assert_eq!(highlight_findings(&mut editor, &results, "#ff000077"), 1);
        assert_eq!(
            editor.to_html(),
            r#"<p>The <mark style="background-color: #ff000077;">quick</mark> fox</p>"#
        );
    }
}
