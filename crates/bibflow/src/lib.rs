//! bibflow: BibTeX in, BibTeX out
//!
//! [`parse_str`] splits and tokenizes the text, then runs the configured parse pipeline;
//! [`write_string`] runs the write pipeline and formats the result. Everything between
//! is an ordinary [`Library`] that can be inspected, edited or run through further
//! [`Pipeline`]s.
//!
//! ```no_run
//! use bibflow::{parse_str, write_string, BibflowConfig};
//!
//! let config = BibflowConfig::default();
//! let library = parse_str("@string{ap = {Acta Physica}}\n@article{k, journal = ap}", &config)?;
//! assert_eq!(library.get_entry("k").and_then(|e| e.get_text("journal")).as_deref(), Some("Acta Physica"));
//! let text = write_string(library, &config)?;
//! # Ok::<(), bibflow::BibflowError>(())
//! ```

pub mod config;
pub mod error;

pub use config::{BibflowConfig, ConfigError, StackConfig, StageSpec};
pub use error::{BibflowError, Result};

pub use bibflow_middleware as middleware;
pub use bibflow_middleware::{
    BlockMiddleware, DefaultStack, LibraryMiddleware, MiddlewareError, Outcome, Pipeline,
    PipelineError,
};
pub use bibflow_model as model;
pub use bibflow_model::{Block, BlockKind, Entry, Library, ParsedName, Value};
pub use bibflow_syntax as syntax;
pub use bibflow_syntax::WriterConfig;

/// Parse `input` and run the configured parse pipeline over it.
pub fn parse_str(input: &str, config: &BibflowConfig) -> Result<Library> {
    let pipeline = config.parse_pipeline()?;
    parse_with(input, &pipeline)
}

/// Parse `input` and run `pipeline` over it.
pub fn parse_with(input: &str, pipeline: &Pipeline) -> Result<Library> {
    let library = bibflow_syntax::parse(input);
    let library = pipeline.run(library)?;
    let failed = library.failed_blocks().count();
    if failed > 0 {
        tracing::warn!(
            "Parsed {} blocks, {} could not be processed",
            library.len(),
            failed
        );
    }
    Ok(library)
}

/// Run the configured write pipeline and format the library as text.
pub fn write_string(library: Library, config: &BibflowConfig) -> Result<String> {
    let pipeline = config.write_pipeline()?;
    write_with(library, &pipeline, &config.writer)
}

/// Run `pipeline` and format the library with `writer`.
pub fn write_with(library: Library, pipeline: &Pipeline, writer: &WriterConfig) -> Result<String> {
    let library = pipeline.run(library)?;
    Ok(bibflow_syntax::write_library(&library, writer))
}
