//! HTML parsing into the document schema, and serialization back out.
//!
//! Parsing runs on top of the flat tokenizer. Tags outside the schema are
//! unwrapped (their content is kept), script-like elements are dropped,
//! whitespace collapses to single spaces, and inline content that appears
//! outside a textblock gets an implicit paragraph.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::doc::model::{normalize_marks, BlockKind, Fragment, Mark, Node, Slice};
use crate::error::Error;
use crate::token::{TokenKind, Tokenizer};
use crate::DEFAULT_HIGHLIGHT_COLOR;

static TAG_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<\s*(/)?\s*([A-Za-z][A-Za-z0-9-]*)").expect("static regex"));

static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("static regex")
});

static BACKGROUND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)background(?:-color)?\s*:\s*([^;]+)").expect("static regex"));

static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});").expect("static regex"));

/// Parse a replacement HTML snippet into a slice that can be spliced into
/// a document. Edges that are textblocks are left open so their inline
/// content joins the surrounding text.
pub fn parse_slice(html: &str) -> Result<Slice, Error> {
    if html.trim().is_empty() {
        return Err(Error::EmptyReplacement);
    }
    let content = parse_fragment(html);
    let open_start = usize::from(content.first().is_some_and(Node::is_textblock));
    let open_end = usize::from(content.last().is_some_and(Node::is_textblock));
    let slice = Slice::new(content, open_start, open_end);
    if slice.size() == 0 {
        return Err(Error::Parse(format!(
            "no document content in replacement `{}`",
            truncate(html, 40)
        )));
    }
    Ok(slice)
}

/// Parse a whole HTML document. An empty input yields one empty paragraph.
pub fn parse_document(html: &str) -> Node {
    let content = parse_fragment(html);
    if content.is_empty() {
        return Node::doc(vec![Node::paragraph(Vec::new())]);
    }
    Node::doc(content.into_nodes())
}

/// Parse HTML into top-level block content.
pub fn parse_fragment(html: &str) -> Fragment {
    let mut parser = Parser::new();
    for token in Tokenizer::new(html) {
        match token.kind {
            TokenKind::Tag => parser.tag(token.text),
            TokenKind::Whitespace => parser.whitespace(),
            TokenKind::Word | TokenKind::Other => parser.word(&decode_entities(token.text)),
        }
    }
    parser.finish()
}

struct Frame {
    kind: BlockKind,
    tag: Option<String>,
    nodes: Vec<Node>,
}

struct Parser {
    stack: Vec<Frame>,
    marks: Vec<(String, Mark)>,
    skip_until: Option<String>,
}

impl Parser {
    fn new() -> Self {
        Self {
            stack: vec![Frame {
                kind: BlockKind::Doc,
                tag: None,
                nodes: Vec::new(),
            }],
            marks: Vec::new(),
            skip_until: None,
        }
    }

    fn top(&mut self) -> &mut Frame {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn tag(&mut self, raw: &str) {
        let Some(caps) = TAG_NAME_RE.captures(raw) else {
            return;
        };
        let closing = caps.get(1).is_some();
        let name = caps[2].to_ascii_lowercase();

        if self.skip_until.is_some() {
            if closing && self.skip_until.as_deref() == Some(name.as_str()) {
                self.skip_until = None;
            }
            return;
        }

        if closing {
            self.close_tag(&name);
        } else {
            self.open_tag(&name, raw);
        }
    }

    fn open_tag(&mut self, name: &str, raw: &str) {
        if let Some(kind) = block_kind_for(name) {
            self.close_textblocks();
            if kind == BlockKind::ListItem {
                self.close_until_list();
            }
            self.stack.push(Frame {
                kind,
                tag: Some(name.to_string()),
                nodes: Vec::new(),
            });
            return;
        }
        match name {
            "br" => {
                self.ensure_textblock();
                self.top().nodes.push(Node::HardBreak);
            }
            "script" | "style" | "head" | "title" | "template" => {
                if !raw.trim_end_matches('>').ends_with('/') {
                    self.skip_until = Some(name.to_string());
                }
            }
            _ => {
                if let Some(mark) = mark_for(name, raw) {
                    self.marks.push((name.to_string(), mark));
                }
            }
        }
    }

    fn close_tag(&mut self, name: &str) {
        if block_kind_for(name).is_some() {
            let Some(idx) = self
                .stack
                .iter()
                .rposition(|frame| frame.tag.as_deref() == Some(name))
            else {
                return;
            };
            while self.stack.len() > idx {
                self.pop_frame();
            }
            return;
        }
        if let Some(idx) = self.marks.iter().rposition(|(tag, _)| tag == name) {
            self.marks.remove(idx);
        }
    }

    fn whitespace(&mut self) {
        if self.skip_until.is_some() {
            return;
        }
        let frame = self.top();
        if !frame.kind.is_textblock() {
            return;
        }
        let ends_open = match frame.nodes.last() {
            None | Some(Node::HardBreak) => true,
            Some(Node::Text { text, .. }) => text.ends_with(' '),
            Some(Node::Block { .. }) => true,
        };
        if !ends_open {
            let marks = self.current_marks();
            self.top().nodes.push(Node::marked_text(" ", marks));
        }
    }

    fn word(&mut self, text: &str) {
        if self.skip_until.is_some() {
            return;
        }
        self.ensure_textblock();
        let marks = self.current_marks();
        self.top().nodes.push(Node::marked_text(text, marks));
    }

    fn current_marks(&self) -> Vec<Mark> {
        normalize_marks(self.marks.iter().map(|(_, m)| m.clone()).collect())
    }

    fn ensure_textblock(&mut self) {
        if self.top().kind.is_textblock() {
            return;
        }
        if matches!(self.top().kind, BlockKind::BulletList | BlockKind::OrderedList) {
            self.stack.push(Frame {
                kind: BlockKind::ListItem,
                tag: None,
                nodes: Vec::new(),
            });
        }
        self.stack.push(Frame {
            kind: BlockKind::Paragraph,
            tag: None,
            nodes: Vec::new(),
        });
    }

    fn close_textblocks(&mut self) {
        while self.stack.len() > 1 && self.top().kind.is_textblock() {
            self.pop_frame();
        }
    }

    fn close_until_list(&mut self) {
        while self.stack.len() > 1
            && !matches!(self.top().kind, BlockKind::BulletList | BlockKind::OrderedList)
            && self.stack.iter().any(|f| matches!(f.kind, BlockKind::BulletList | BlockKind::OrderedList))
        {
            self.pop_frame();
        }
    }

    fn pop_frame(&mut self) {
        let Some(mut frame) = self.stack.pop() else {
            return;
        };
        if frame.kind.is_textblock() {
            trim_trailing_space(&mut frame.nodes);
        }
        if frame.tag.is_none() && frame.nodes.is_empty() {
            return;
        }
        let node = Node::block(frame.kind, frame.nodes);
        match self.stack.last_mut() {
            Some(parent) => parent.nodes.push(node),
            None => self.stack.push(Frame {
                kind: BlockKind::Doc,
                tag: None,
                nodes: vec![node],
            }),
        }
    }

    fn finish(mut self) -> Fragment {
        while self.stack.len() > 1 {
            self.pop_frame();
        }
        let root = self.stack.pop().map(|f| f.nodes).unwrap_or_default();
        Fragment::from_nodes(root)
    }
}

fn trim_trailing_space(nodes: &mut Vec<Node>) {
    if let Some(Node::Text { text, .. }) = nodes.last_mut() {
        if text.ends_with(' ') {
            text.pop();
        }
        if text.is_empty() {
            nodes.pop();
        }
    }
}

fn block_kind_for(name: &str) -> Option<BlockKind> {
    let kind = match name {
        "p" => BlockKind::Paragraph,
        "h1" => BlockKind::Heading(1),
        "h2" => BlockKind::Heading(2),
        "h3" => BlockKind::Heading(3),
        "h4" => BlockKind::Heading(4),
        "h5" => BlockKind::Heading(5),
        "h6" => BlockKind::Heading(6),
        "blockquote" => BlockKind::Blockquote,
        "ul" => BlockKind::BulletList,
        "ol" => BlockKind::OrderedList,
        "li" => BlockKind::ListItem,
        _ => return None,
    };
    Some(kind)
}

fn mark_for(name: &str, raw: &str) -> Option<Mark> {
    let mark = match name {
        "b" | "strong" => Mark::Bold,
        "i" | "em" => Mark::Italic,
        "u" => Mark::Underline,
        "s" | "strike" | "del" => Mark::Strike,
        "code" => Mark::Code,
        "a" => Mark::Link {
            href: attribute(raw, "href").unwrap_or_default(),
        },
        "mark" => {
            let color = attribute(raw, "style")
                .and_then(|style| {
                    BACKGROUND_RE
                        .captures(&style)
                        .map(|c| c[1].trim().to_string())
                })
                .unwrap_or_else(|| DEFAULT_HIGHLIGHT_COLOR.to_string());
            Mark::Highlight { color }
        }
        _ => return None,
    };
    Some(mark)
}

fn attribute(raw: &str, wanted: &str) -> Option<String> {
    ATTR_RE.captures_iter(raw).find_map(|caps| {
        if !caps[1].eq_ignore_ascii_case(wanted) {
            return None;
        }
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| m.as_str())
            .unwrap_or("");
        Some(decode_entities(value))
    })
}

/// Decode numeric and common named character references.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let body = &caps[1];
            let decoded = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                named_entity(body)
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "hellip" => '\u{2026}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "sect" => '\u{a7}',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        _ => return None,
    };
    Some(c)
}

/// Serialize a document (or any block) back to HTML.
pub fn to_html(node: &Node) -> String {
    let mut out = String::new();
    match node {
        Node::Block {
            kind: BlockKind::Doc,
            content,
        } => write_fragment(&mut out, content),
        other => write_node(&mut out, other),
    }
    out
}

fn write_fragment(out: &mut String, fragment: &Fragment) {
    for node in fragment.iter() {
        write_node(out, node);
    }
}

fn write_node(out: &mut String, node: &Node) {
    match node {
        Node::Text { text, marks } => {
            for mark in marks {
                out.push_str(&open_mark(mark));
            }
            escape_into(out, text);
            for mark in marks.iter().rev() {
                out.push_str(close_mark(mark));
            }
        }
        Node::HardBreak => out.push_str("<br>"),
        Node::Block { kind, content } => {
            let tag = match kind {
                BlockKind::Doc => {
                    write_fragment(out, content);
                    return;
                }
                BlockKind::Paragraph => "p".to_string(),
                BlockKind::Heading(level) => format!("h{}", (*level).clamp(1, 6)),
                BlockKind::Blockquote => "blockquote".to_string(),
                BlockKind::BulletList => "ul".to_string(),
                BlockKind::OrderedList => "ol".to_string(),
                BlockKind::ListItem => "li".to_string(),
            };
            out.push('<');
            out.push_str(&tag);
            out.push('>');
            write_fragment(out, content);
            out.push_str("</");
            out.push_str(&tag);
            out.push('>');
        }
    }
}

fn open_mark(mark: &Mark) -> String {
    match mark {
        Mark::Bold => "<strong>".into(),
        Mark::Italic => "<em>".into(),
        Mark::Underline => "<u>".into(),
        Mark::Strike => "<s>".into(),
        Mark::Code => "<code>".into(),
        Mark::Link { href } => {
            let mut tag = String::from("<a href=\"");
            escape_into(&mut tag, href);
            tag.push_str("\">");
            tag
        }
        Mark::Highlight { color } => {
            let mut tag = String::from("<mark style=\"background-color: ");
            escape_into(&mut tag, color);
            tag.push_str(";\">");
            tag
        }
    }
}

fn close_mark(mark: &Mark) -> &'static str {
    match mark {
        Mark::Bold => "</strong>",
        Mark::Italic => "</em>",
        Mark::Underline => "</u>",
        Mark::Strike => "</s>",
        Mark::Code => "</code>",
        Mark::Link { .. } => "</a>",
        Mark::Highlight { .. } => "</mark>",
    }
}

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}
