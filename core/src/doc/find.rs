//! Flatten a document to plain text and map matches back to positions.

use aho_corasick::AhoCorasickBuilder;
use serde::Serialize;
use tracing::{debug, warn};

use crate::doc::model::{BlockKind, Node};
use crate::phrase::{fold, normalize_phrase};
use crate::MatchRange;

/// Document position of one flattened char.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PosMapEntry {
    pub pos: usize,
    /// 1 for a real char, 0 for a block-boundary separator.
    pub node_size: usize,
}

/// Plain-text projection of a document with one map entry per char.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flattened {
    pub text: Vec<char>,
    pub pos_map: Vec<PosMapEntry>,
}

impl Flattened {
    pub fn as_string(&self) -> String {
        self.text.iter().collect()
    }

    fn push(&mut self, c: char, pos: usize, node_size: usize) {
        self.text.push(c);
        self.pos_map.push(PosMapEntry { pos, node_size });
    }

    /// Document range covering chars `index..index + len`.
    pub fn range_for(&self, index: usize, len: usize) -> Option<MatchRange> {
        if len == 0 || index + len > self.pos_map.len() {
            return None;
        }
        let first = self.pos_map[index];
        let last = self.pos_map[index + len - 1];
        Some(MatchRange::new(first.pos, last.pos + last.node_size))
    }
}

/// Depth-first flatten. A single space separates blocks unless the text
/// already ends in one; hard breaks flatten to a space of width 1.
pub fn flatten(doc: &Node) -> Flattened {
    let mut out = Flattened::default();
    doc.descendants(&mut |node, pos| {
        match node {
            Node::Text { text, .. } => {
                for (offset, c) in text.chars().enumerate() {
                    out.push(c, pos + offset, 1);
                }
            }
            Node::HardBreak => out.push(' ', pos, 1),
            Node::Block { kind, .. } => {
                if *kind != BlockKind::Doc && !out.text.is_empty() && out.text.last() != Some(&' ') {
                    out.push(' ', pos, 0);
                }
            }
        }
        true
    });
    out
}

/// Every case-insensitive occurrence of `phrase`, overlapping ones included.
pub fn find_text_ranges(doc: &Node, phrase: &str) -> Vec<MatchRange> {
    let Some(phrase) = normalize_phrase(phrase) else {
        warn!("empty search phrase");
        return Vec::new();
    };
    let flat = flatten(doc);
    let haystack = fold(&flat.as_string());
    let needle = fold(phrase);

    let mut ranges = Vec::new();
    let mut start = 0;
    while start + needle.len() <= haystack.len() {
        let Some(found) = haystack[start..]
            .windows(needle.len())
            .position(|window| window == needle.as_slice())
        else {
            break;
        };
        let index = start + found;
        if let Some(range) = checked_range(&flat, index, needle.len()) {
            ranges.push(range);
        }
        start = index + 1;
    }
    debug!(phrase, matches = ranges.len(), "searched document");
    ranges
}

/// Search several phrases over one flatten pass. Returns the index of the
/// matching phrase with each range, ordered by match end.
pub fn find_phrases(doc: &Node, phrases: &[&str]) -> Vec<(usize, MatchRange)> {
    let mut patterns = Vec::new();
    let mut owners = Vec::new();
    for (idx, phrase) in phrases.iter().enumerate() {
        if let Some(p) = normalize_phrase(phrase) {
            patterns.push(fold(p).into_iter().collect::<String>());
            owners.push(idx);
        }
    }
    if patterns.is_empty() {
        return Vec::new();
    }

    let flat = flatten(doc);
    let haystack: String = fold(&flat.as_string()).into_iter().collect();
    let char_starts: Vec<usize> = haystack.char_indices().map(|(b, _)| b).collect();
    let automaton = AhoCorasickBuilder::new().build(&patterns);

    let mut found = Vec::new();
    for mat in automaton.find_overlapping_iter(&haystack) {
        let Ok(index) = char_starts.binary_search(&mat.start()) else {
            continue;
        };
        let len = patterns[mat.pattern()].chars().count();
        if let Some(range) = checked_range(&flat, index, len) {
            found.push((owners[mat.pattern()], range));
        }
    }
    found
}

fn checked_range(flat: &Flattened, index: usize, len: usize) -> Option<MatchRange> {
    let range = flat.range_for(index, len)?;
    if range.is_empty() {
        let boundary = flat.pos_map[index + len - 1].node_size == 0;
        if boundary {
            debug!(from = range.from, to = range.to, "skipping block-boundary artifact");
        } else {
            warn!(from = range.from, to = range.to, "skipping degenerate match range");
        }
        return None;
    }
    Some(range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::html::parse_document;

    fn two_paragraphs() -> Node {
        Node::doc(vec![
            Node::paragraph(vec![Node::text("Hello world")]),
            Node::paragraph(vec![Node::text("Goodbye")]),
        ])
    }

    #[test]
    fn flatten_separates_blocks() {
        let flat = flatten(&two_paragraphs());
        assert_eq!(flat.as_string(), "Hello world Goodbye");
        assert_eq!(flat.pos_map.len(), flat.text.len());
        assert_eq!(flat.pos_map[0], PosMapEntry { pos: 1, node_size: 1 });
        assert_eq!(flat.pos_map[11], PosMapEntry { pos: 13, node_size: 0 });
        assert_eq!(flat.pos_map[12], PosMapEntry { pos: 14, node_size: 1 });
    }

    #[test]
    fn no_double_separator_after_trailing_space() {
        let doc = Node::doc(vec![
            Node::paragraph(vec![Node::text("end ")]),
            Node::paragraph(vec![Node::text("next")]),
        ]);
        assert_eq!(flatten(&doc).as_string(), "end next");
    }

    #[test]
    fn finds_within_and_across_blocks() {
        let doc = two_paragraphs();
        assert_eq!(find_text_ranges(&doc, "WORLD"), vec![MatchRange::new(7, 12)]);
        assert_eq!(find_text_ranges(&doc, "world goodbye"), vec![MatchRange::new(7, 21)]);
    }

    #[test]
    fn overlapping_matches_are_all_reported() {
        let doc = Node::doc(vec![Node::paragraph(vec![Node::text("aaaa")])]);
        assert_eq!(
            find_text_ranges(&doc, "aa"),
            vec![MatchRange::new(1, 3), MatchRange::new(2, 4), MatchRange::new(3, 5)]
        );
    }

    #[test]
    fn matches_across_marks_and_trims_phrase() {
        let doc = parse_document("<p>pay <b>late</b> fees</p>");
        assert_eq!(find_text_ranges(&doc, "  late fees "), vec![MatchRange::new(5, 14)]);
        assert!(find_text_ranges(&doc, "   ").is_empty());
        assert!(find_text_ranges(&doc, "missing").is_empty());
    }

    #[test]
    fn hard_break_counts_as_space() {
        let doc = parse_document("<p>line one<br>line two</p>");
        let ranges = find_text_ranges(&doc, "one line");
        assert_eq!(ranges, vec![MatchRange::new(6, 14)]);
    }

    #[test]
    fn find_phrases_reports_owner() {
        let doc = two_paragraphs();
        let mut found = find_phrases(&doc, &["hello", "", "goodbye", "o w"]);
        found.sort_by_key(|(_, r)| r.from);
        assert_eq!(
            found,
            vec![
                (0, MatchRange::new(1, 6)),
                (3, MatchRange::new(5, 8)),
                (2, MatchRange::new(14, 21)),
            ]
        );
    }
}
