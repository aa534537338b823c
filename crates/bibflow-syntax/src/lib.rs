//! BibTeX syntax layer for bibflow
//!
//! Reading goes in two steps: [`splitter`] cuts the text into raw blocks, tracking braces
//! and quotes but nothing else, then [`fields`] tokenizes each block body with nom.
//! [`parser::parse`] runs both and never fails: broken blocks are kept as
//! `ParsingFailed` blocks next to their healthy neighbours.
//!
//! [`writer`] goes the other way.

pub mod fields;
pub mod parser;
pub mod splitter;
pub mod writer;

pub use parser::{parse, parse_blocks};
pub use splitter::{split, Chunk, RawBlock, RawKind};
pub use writer::{format_value, write_block, write_library, ValueColumn, WriterConfig};
