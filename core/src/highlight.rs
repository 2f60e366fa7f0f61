//! Word-by-word highlighter for flat HTML strings.
//!
//! A finding's `original` text is split into words and matched against the
//! word tokens of the HTML. Tags and whitespace between matched words are
//! absorbed into the match, so a phrase still matches when markup
//! interrupts it. Matching is case-insensitive and word-order exact; there
//! is no stemming or punctuation folding.

use tracing::{debug, warn};

use crate::phrase::{target_words, words_equal};
use crate::token::{tokenize, HtmlToken, TokenKind};
use crate::{AnnotateMode, ComplianceResult, MarkPolicy, MatchRange, DEFAULT_MARK_STYLE};

/// Rendering options for [`add_marks_word_by_word`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotateOptions {
    /// Inline CSS for the `style` attribute of each `<mark>`; empty omits it.
    pub style: String,
    pub policy: MarkPolicy,
    pub mode: AnnotateMode,
}

impl Default for AnnotateOptions {
    fn default() -> Self {
        Self {
            style: DEFAULT_MARK_STYLE.into(),
            policy: MarkPolicy::Enclose,
            mode: AnnotateMode::Sequential,
        }
    }
}

impl AnnotateOptions {
    fn open_tag(&self) -> String {
        if self.style.is_empty() {
            "<mark>".to_string()
        } else {
            format!("<mark style=\"{}\">", self.style)
        }
    }
}

/// Wrap every occurrence of each non-compliant finding in a `<mark>`.
///
/// Never fails: empty HTML or a list without actionable findings returns
/// the input unchanged.
pub fn add_marks_word_by_word(
    html: &str,
    results: &[ComplianceResult],
    options: &AnnotateOptions,
) -> String {
    if html.is_empty() {
        warn!("no HTML content to annotate");
        return String::new();
    }
    let findings: Vec<&ComplianceResult> = results.iter().filter(|r| r.is_actionable()).collect();
    if findings.is_empty() {
        debug!(total = results.len(), "no non-compliant findings to highlight");
        return html.to_string();
    }

    match options.mode {
        AnnotateMode::Sequential => annotate_sequential(html, &findings, options),
        AnnotateMode::SinglePass => annotate_single_pass(html, &findings, options),
    }
}

fn annotate_sequential(html: &str, findings: &[&ComplianceResult], options: &AnnotateOptions) -> String {
    let mut current = html.to_string();
    for finding in findings {
        let words = target_words(&finding.original);
        let tokens = tokenize(&current);
        let ranges: Vec<MatchRange> = scan(&tokens, &words)
            .into_iter()
            .map(|(first, last)| MatchRange::new(tokens[first].start, tokens[last].end))
            .collect();
        debug!(phrase = %finding.original, matches = ranges.len(), "highlighting finding");
        if ranges.is_empty() {
            continue;
        }
        let next = wrap_ranges(&current, &ranges, options);
        current = next;
    }
    current
}

fn annotate_single_pass(html: &str, findings: &[&ComplianceResult], options: &AnnotateOptions) -> String {
    let tokens = tokenize(html);
    let mut candidates: Vec<(MatchRange, usize)> = Vec::new();
    for (idx, finding) in findings.iter().enumerate() {
        let words = target_words(&finding.original);
        for (first, last) in scan(&tokens, &words) {
            candidates.push((MatchRange::new(tokens[first].start, tokens[last].end), idx));
        }
    }
    candidates.sort_by(|(a, ai), (b, bi)| {
        a.from
            .cmp(&b.from)
            .then(b.len().cmp(&a.len()))
            .then(ai.cmp(bi))
    });

    let mut accepted: Vec<MatchRange> = Vec::new();
    for (range, idx) in candidates {
        if accepted.last().is_some_and(|prev| prev.overlaps(&range)) {
            debug!(phrase = %findings[idx].original, from = range.from, "dropping overlapping match");
            continue;
        }
        accepted.push(range);
    }
    debug!(matches = accepted.len(), "single-pass highlight resolved");
    wrap_ranges(html, &accepted, options)
}

/// Byte ranges of every match of `phrase` in `html`, first word to last word.
pub fn find_phrase_ranges(html: &str, phrase: &str) -> Vec<MatchRange> {
    let words = target_words(phrase);
    let tokens = tokenize(html);
    scan(&tokens, &words)
        .into_iter()
        .map(|(first, last)| MatchRange::new(tokens[first].start, tokens[last].end))
        .collect()
}

/// Greedy left-to-right matcher returning `(first_token, last_token)` spans.
///
/// A mismatching word abandons the open candidate and is then tried as the
/// start of a new one; earlier tokens of the abandoned candidate are not
/// revisited.
fn scan(tokens: &[HtmlToken<'_>], words: &[String]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    if words.is_empty() {
        return spans;
    }
    let mut candidate: Option<(usize, usize)> = None;
    let mut idx = 0;
    while idx < tokens.len() {
        let token = &tokens[idx];
        match candidate {
            None => {
                if token.is_word() && words_equal(token.text, &words[0]) {
                    if words.len() == 1 {
                        spans.push((idx, idx));
                    } else {
                        candidate = Some((idx, 1));
                    }
                }
                idx += 1;
            }
            Some((start, matched)) => match token.kind {
                TokenKind::Tag | TokenKind::Whitespace => idx += 1,
                TokenKind::Word => {
                    if words_equal(token.text, &words[matched]) {
                        if matched + 1 == words.len() {
                            spans.push((start, idx));
                            candidate = None;
                        } else {
                            candidate = Some((start, matched + 1));
                        }
                        idx += 1;
                    } else {
                        // re-evaluate this token as a fresh start
                        candidate = None;
                    }
                }
                TokenKind::Other => {
                    candidate = None;
                    idx += 1;
                }
            },
        }
    }
    spans
}

/// Wrap the given byte ranges of `html` in marks.
///
/// Ranges are sorted first; empty, out-of-bounds, misaligned or overlapping
/// ranges are skipped with a warning.
pub fn wrap_ranges(html: &str, ranges: &[MatchRange], options: &AnnotateOptions) -> String {
    let mut sorted = ranges.to_vec();
    sorted.sort();
    let open = options.open_tag();
    let mut out = String::with_capacity(html.len() + sorted.len() * (open.len() + 7));
    let mut cursor = 0;
    for range in sorted {
        if range.is_empty()
            || range.to > html.len()
            || !html.is_char_boundary(range.from)
            || !html.is_char_boundary(range.to)
        {
            warn!(from = range.from, to = range.to, "skipping invalid highlight range");
            continue;
        }
        if range.from < cursor {
            warn!(from = range.from, to = range.to, "skipping overlapping highlight range");
            continue;
        }
        out.push_str(&html[cursor..range.from]);
        render_mark(&mut out, &html[range.from..range.to], &open, options.policy);
        cursor = range.to;
    }
    out.push_str(&html[cursor..]);
    out
}

fn render_mark(out: &mut String, segment: &str, open: &str, policy: MarkPolicy) {
    match policy {
        MarkPolicy::Enclose => {
            out.push_str(open);
            out.push_str(segment);
            out.push_str("</mark>");
        }
        MarkPolicy::SplitAroundTags => {
            let mut is_open = false;
            for token in tokenize(segment) {
                if token.kind == TokenKind::Tag {
                    if is_open {
                        out.push_str("</mark>");
                        is_open = false;
                    }
                } else if !is_open {
                    out.push_str(open);
                    is_open = true;
                }
                out.push_str(token.text);
            }
            if is_open {
                out.push_str("</mark>");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(original: &str) -> ComplianceResult {
        ComplianceResult {
            original: original.into(),
            compliant: false,
            suggestion: None,
            reason: None,
            citations: Vec::new(),
        }
    }

    fn annotate(html: &str, originals: &[&str]) -> String {
        let results: Vec<_> = originals.iter().map(|o| finding(o)).collect();
        add_marks_word_by_word(html, &results, &AnnotateOptions::default())
    }

    const OPEN: &str = r#"<mark style="background-color: #ff000077;">"#;

    #[test]
    fn mismatched_word_restarts_candidate() {
        let out = annotate("<p>net net 30 days</p>", &["net 30"]);
        assert_eq!(out, format!("<p>net {OPEN}net 30</mark> days</p>"));
    }

    #[test]
    fn greedy_matching_does_not_backtrack_into_buffer() {
        // "a a a b" contains "a a b" at word 2, but the abandoned candidate
        // is not rescanned from its second word.
        let out = annotate("a a a b", &["a a b"]);
        assert_eq!(out, "a a a b");
    }

    #[test]
    fn incomplete_candidate_at_end_is_flushed() {
        let out = annotate("<p>the quick</p>", &["quick brown"]);
        assert_eq!(out, "<p>the quick</p>");
    }

    #[test]
    fn every_occurrence_is_marked() {
        let out = annotate("fee and fee", &["FEE"]);
        assert_eq!(out, format!("{OPEN}fee</mark> and {OPEN}fee</mark>"));
    }

    #[test]
    fn punctuation_must_match_exactly() {
        let out = annotate("<p>late fee.</p>", &["late fee"]);
        assert_eq!(out, "<p>late fee.</p>");
    }

    #[test]
    fn split_policy_reopens_around_tags() {
        let options = AnnotateOptions {
            policy: MarkPolicy::SplitAroundTags,
            style: String::new(),
            ..AnnotateOptions::default()
        };
        let out = add_marks_word_by_word(
            "<p>this <b>important</b> statement</p>",
            &[finding("this important statement")],
            &options,
        );
        assert_eq!(
            out,
            "<p><mark>this </mark><b><mark>important</mark></b><mark> statement</mark></p>"
        );
    }

    #[test]
    fn later_findings_see_earlier_marks() {
        let out = annotate("<p>quick fox</p>", &["quick", "quick fox"]);
        assert_eq!(
            out,
            format!("<p>{OPEN}{OPEN}quick</mark> fox</mark></p>")
        );
    }

    #[test]
    fn single_pass_resolves_overlaps() {
        let options = AnnotateOptions {
            mode: AnnotateMode::SinglePass,
            ..AnnotateOptions::default()
        };
        let out = add_marks_word_by_word(
            "<p>quick fox jumps</p>",
            &[finding("quick"), finding("quick fox"), finding("jumps")],
            &options,
        );
        assert_eq!(
            out,
            format!("<p>{OPEN}quick fox</mark> {OPEN}jumps</mark></p>")
        );
    }

    #[test]
    fn find_phrase_ranges_reports_word_bounds() {
        let html = "<p>this <b>important</b> statement</p>";
        let ranges = find_phrase_ranges(html, "this important statement");
        assert_eq!(ranges, vec![MatchRange::new(3, html.len() - 4)]);
        assert!(find_phrase_ranges(html, "   ").is_empty());
    }

    #[test]
    fn wrap_ranges_skips_bad_ranges() {
        let options = AnnotateOptions::default();
        let out = wrap_ranges(
            "abcdef",
            &[
                MatchRange::new(1, 3),
                MatchRange::new(2, 4),
                MatchRange::new(4, 4),
                MatchRange::new(5, 99),
            ],
            &options,
        );
        assert_eq!(out, format!("a{OPEN}bc</mark>def"));
    }

    #[test]
    fn empty_html_stays_empty() {
        assert_eq!(annotate("", &["x"]), "");
    }
}
