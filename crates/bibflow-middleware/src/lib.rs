//! Transformation pipeline for bibflow libraries
//!
//! - [`pipeline`]: the engine, the two stage traits and their error types
//! - [`stages`]: the built-in stages (string resolution, delimiters, months, names,
//!   field order, block order)
//! - [`stacks`]: versioned stage lists for parsing and writing
//!
//! With the default `parallel` feature, parallel-safe block stages run on rayon's pool.

pub mod pipeline;
pub mod stacks;
pub mod stages;

pub use pipeline::{
    BlockMiddleware, Capabilities, LibraryMiddleware, MiddlewareError, Outcome, Pipeline,
    PipelineError,
};
pub use stacks::{DefaultStack, UnknownStack};
pub use stages::*;
