//! Tree document model: parsing, flattening, transactions and the editor.

pub mod editor;
pub mod find;
pub mod html;
pub mod model;
pub mod transform;

pub use find::{find_phrases, find_text_ranges, flatten, Flattened, PosMapEntry};
pub use html::{parse_document, parse_slice, to_html};
pub use model::{BlockKind, Fragment, Mark, Node, Slice};
pub use transform::{Assoc, Mapping, StepMap, Transaction};
