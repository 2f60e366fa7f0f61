//! Error type shared by the matcher, the document model and the replacer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("replacement HTML is empty")]
    EmptyReplacement,

    #[error("could not parse HTML: {0}")]
    Parse(String),

    #[error("invalid range {from}..{to}")]
    InvalidRange { from: usize, to: usize },

    #[error("position {pos} is outside the document (size {size})")]
    PositionOutOfBounds { pos: usize, size: usize },

    #[error("position {0} does not point into a textblock")]
    NotInline(usize),

    #[error("invalid findings payload: {0}")]
    Findings(#[from] serde_json::Error),
}
