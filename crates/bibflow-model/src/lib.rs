//! Document model for bibflow
//!
//! This crate provides the in-memory representation of a parsed `.bib` file:
//! - [`Block`]: one top-level unit (entry, `@string`, `@preamble`, comment or failed span)
//! - [`Value`]: a field's content, from raw `#`-separated tokens to resolved text
//! - [`Library`]: the ordered blocks plus key indices and the list of failures
//! - [`Metadata`]: per-block notes stages leave for themselves
//! - [`ParsedName`]: a personal name split into first, von, last and jr

pub mod block;
pub mod library;
pub mod metadata;
pub mod name;
pub mod value;

pub use block::{
    Block, BlockError, BlockKind, Boundary, Comment, Entry, Field, FieldErrorKind,
    ParsingFailedBlock, Preamble, Span, StringDefinition,
};
pub use library::{DuplicateKey, DuplicateKeyFlag, Library, LibraryError};
pub use metadata::{Metadata, MetadataOwner};
pub use name::{split_coauthors, NameError, ParsedName};
pub use value::{Reference, ReferenceState, ResolutionFailure, Token, Value};
