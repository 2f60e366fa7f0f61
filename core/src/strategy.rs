//! One interface over both matchers.
//!
//! HTML strings go through the flat tokenizer and get `<mark>` elements;
//! documents go through the flatten/position-map finder and get highlight
//! marks. Callers pick the strategy by the shape of their content.

use tracing::warn;

use crate::doc::find::find_text_ranges;
use crate::doc::model::{Mark, Node};
use crate::doc::transform::Transaction;
use crate::highlight::{find_phrase_ranges, wrap_ranges, AnnotateOptions};
use crate::{ComplianceResult, MatchRange, DEFAULT_HIGHLIGHT_COLOR};

pub trait MatchStrategy {
    type Content;

    /// Every range of `content` that matches `phrase`.
    fn find_matches(&self, content: &Self::Content, phrase: &str) -> Vec<MatchRange>;

    /// Highlight `ranges` in `content`. Ranges that do not fit are skipped.
    fn annotate(&self, content: &Self::Content, ranges: &[MatchRange]) -> Self::Content;

    /// Find and highlight every actionable finding, one finding at a time.
    fn annotate_findings(&self, content: &Self::Content, results: &[ComplianceResult]) -> Self::Content
    where
        Self::Content: Clone,
    {
        results
            .iter()
            .filter(|r| r.is_actionable())
            .fold(content.clone(), |current, finding| {
                let ranges = self.find_matches(&current, &finding.original);
                if ranges.is_empty() {
                    current
                } else {
                    self.annotate(&current, &ranges)
                }
            })
    }
}

/// Byte ranges over an HTML string, wrapped in `<mark>` elements.
#[derive(Debug, Clone, Default)]
pub struct HtmlStrategy {
    pub options: AnnotateOptions,
}

impl HtmlStrategy {
    pub fn new(options: AnnotateOptions) -> Self {
        Self { options }
    }
}

impl MatchStrategy for HtmlStrategy {
    type Content = String;

    fn find_matches(&self, content: &String, phrase: &str) -> Vec<MatchRange> {
        find_phrase_ranges(content, phrase)
    }

    fn annotate(&self, content: &String, ranges: &[MatchRange]) -> String {
        wrap_ranges(content, ranges, &self.options)
    }
}

/// Document positions over a tree, highlighted with a mark.
#[derive(Debug, Clone)]
pub struct DocumentStrategy {
    pub color: String,
}

impl Default for DocumentStrategy {
    fn default() -> Self {
        Self {
            color: DEFAULT_HIGHLIGHT_COLOR.to_string(),
        }
    }
}

impl DocumentStrategy {
    pub fn new(color: impl Into<String>) -> Self {
        Self { color: color.into() }
    }
}

impl MatchStrategy for DocumentStrategy {
    type Content = Node;

    fn find_matches(&self, content: &Node, phrase: &str) -> Vec<MatchRange> {
        find_text_ranges(content, phrase)
    }

    fn annotate(&self, content: &Node, ranges: &[MatchRange]) -> Node {
        let mark = Mark::Highlight {
            color: self.color.clone(),
        };
        let mut tr = Transaction::new(content);
        for range in ranges {
            if let Err(err) = tr.add_mark(range.from, range.to, &mark) {
                warn!(from = range.from, to = range.to, %err, "skipping highlight range");
            }
        }
        tr.into_doc()
    }
}
