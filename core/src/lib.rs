//! markmatch core engine.
//! Locates compliance findings inside HTML strings and rich-text documents,
//! highlights them, and splices suggested fixes back into the document.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub mod doc;
pub mod error;
pub mod highlight;
pub mod phrase;
pub mod strategy;
pub mod token;

pub use doc::editor::{
    apply_suggestion_across, highlight_findings, CommitResult, Editor, Selection, SelectionRestore,
};
pub use error::Error;
pub use highlight::{add_marks_word_by_word, find_phrase_ranges, AnnotateOptions};
pub use strategy::{DocumentStrategy, HtmlStrategy, MatchStrategy};
pub use token::{next_token, tokenize, HtmlToken, TokenKind, Tokenizer};

/// Default inline style applied to `<mark>` wrappers.
pub const DEFAULT_MARK_STYLE: &str = "background-color: #ff000077;";

/// Default highlight colour for document-model highlight marks.
pub const DEFAULT_HIGHLIGHT_COLOR: &str = "#ff000077";

/// One finding returned by the upstream compliance check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceResult {
    pub original: String,
    pub compliant: bool,
    #[serde(default)]
    pub suggestion: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub citations: Vec<String>,
}

impl ComplianceResult {
    /// Non-compliant finding with a non-blank `original` span.
    pub fn is_actionable(&self) -> bool {
        !self.compliant && !self.original.trim().is_empty()
    }
}

/// Parse the backend's JSON array of findings.
pub fn parse_results(json: &str) -> Result<Vec<ComplianceResult>, Error> {
    Ok(serde_json::from_str(json)?)
}

/// Half-open span `[from, to)` in HTML byte offsets or document positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatchRange {
    pub from: usize,
    pub to: usize,
}

impl MatchRange {
    pub fn new(from: usize, to: usize) -> Self {
        Self { from, to }
    }

    pub fn len(&self) -> usize {
        self.to.saturating_sub(self.from)
    }

    /// Zero-length or inverted spans are never applied.
    pub fn is_empty(&self) -> bool {
        self.from >= self.to
    }

    pub fn overlaps(&self, other: &MatchRange) -> bool {
        self.from < other.to && other.from < self.to
    }
}

/// How interrupting tags inside a matched span are treated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MarkPolicy {
    /// One `<mark>` around the whole span, tags included.
    #[default]
    Enclose,
    /// Close the mark before every tag and reopen it after.
    SplitAroundTags,
}

/// How findings are applied to an HTML string.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AnnotateMode {
    /// Re-tokenize the output of each finding before applying the next.
    #[default]
    Sequential,
    /// Tokenize once, resolve overlaps, and rewrite in one pass.
    SinglePass,
}

/// `<mark>` rendering for the flat-HTML annotator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightConfig {
    pub style: String,
    pub policy: MarkPolicy,
    pub mode: AnnotateMode,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            style: DEFAULT_MARK_STYLE.into(),
            policy: MarkPolicy::Enclose,
            mode: AnnotateMode::Sequential,
        }
    }
}

/// Document-model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    pub highlight_color: String,
    pub restore_selection: bool,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            highlight_color: DEFAULT_HIGHLIGHT_COLOR.into(),
            restore_selection: true,
        }
    }
}

/// Input discovery for the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub extensions: Vec<String>,
    pub ignore_globs: Vec<String>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["html".into(), "htm".into()],
            ignore_globs: vec!["**/node_modules/**".into(), "**/.git/**".into()],
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub highlight: HighlightConfig,
    pub document: DocumentConfig,
    pub files: FileConfig,
}

impl Config {
    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        let cfg: Config = serde_yaml::from_str(text).context("invalid markmatch config")?;
        if cfg.highlight.style.contains('"') {
            anyhow::bail!("highlight.style must not contain double quotes");
        }
        Ok(cfg)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Annotator options derived from the `highlight` section.
    pub fn annotate_options(&self) -> AnnotateOptions {
        AnnotateOptions {
            style: self.highlight.style.clone(),
            policy: self.highlight.policy,
            mode: self.highlight.mode,
        }
    }
}
