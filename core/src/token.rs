//! Lossless lexer that splits an HTML string into tags, words and whitespace.
//!
//! The lexer is deliberately shallow: it does not understand attributes,
//! comments or entities. A tag is everything from `<` to the next `>`, so
//! concatenating the tokens always reproduces the input byte for byte.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenKind {
    Word,
    Tag,
    Whitespace,
    Other,
}

/// A lexical unit borrowed from the source HTML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HtmlToken<'a> {
    pub text: &'a str,
    pub kind: TokenKind,
    /// Byte offset of the first byte.
    pub start: usize,
    /// Byte offset one past the last byte.
    pub end: usize,
}

impl HtmlToken<'_> {
    pub fn is_word(&self) -> bool {
        self.kind == TokenKind::Word
    }
}

/// Read the token starting at byte offset `start`.
///
/// Returns `None` once `start` reaches the end of the input, or if `start`
/// does not fall on a char boundary.
pub fn next_token(html: &str, start: usize) -> Option<HtmlToken<'_>> {
    if start >= html.len() {
        return None;
    }
    let rest = html.get(start..)?;
    let first = rest.chars().next()?;

    let (len, kind) = if first == '<' {
        match rest.find('>') {
            Some(close) => (close + 1, TokenKind::Tag),
            None => (1, TokenKind::Tag),
        }
    } else if first.is_whitespace() {
        (run_len(rest, |c| c.is_whitespace()), TokenKind::Whitespace)
    } else {
        let len = run_len(rest, |c| c != '<' && !c.is_whitespace());
        if len == 0 {
            (first.len_utf8(), TokenKind::Other)
        } else {
            (len, TokenKind::Word)
        }
    };

    let end = start + len;
    Some(HtmlToken {
        text: &html[start..end],
        kind,
        start,
        end,
    })
}

fn run_len(text: &str, keep: impl Fn(char) -> bool) -> usize {
    text.char_indices()
        .find(|&(_, c)| !keep(c))
        .map(|(idx, _)| idx)
        .unwrap_or(text.len())
}

/// Iterator over every token of an HTML string.
pub struct Tokenizer<'a> {
    html: &'a str,
    cursor: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(html: &'a str) -> Self {
        Self { html, cursor: 0 }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = HtmlToken<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let token = next_token(self.html, self.cursor)?;
        self.cursor = token.end;
        Some(token)
    }
}

pub fn tokenize(html: &str) -> Vec<HtmlToken<'_>> {
    Tokenizer::new(html).collect()
}
