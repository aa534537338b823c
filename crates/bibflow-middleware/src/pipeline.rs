//! Pipeline engine
//!
//! A [`Pipeline`] is an ordered list of stages applied to a [`Library`]:
//! - [`BlockMiddleware`]: rewrites one block at a time. Stages that declare themselves
//!   parallel-safe run on the rayon pool (with the `parallel` feature), the rest run in
//!   document order. A failure only affects the block it happened on.
//! - [`LibraryMiddleware`]: sees the whole library at once. A failure stops the run.
//!
//! Block stages never touch the library's indices; results are merged back and the
//! library re-indexed on the calling thread once the stage is done.

use std::fmt;

use bibflow_model::{Block, FieldErrorKind, Library, MetadataOwner, NameError};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// What a block stage did to a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Changed,
    Unchanged,
    /// Remove the block from the library.
    Drop,
}

/// Error type for stage failures
#[derive(Debug, thiserror::Error)]
pub enum MiddlewareError {
    #[error("field '{field}': {message}")]
    Field { field: String, message: String },

    #[error("field '{field}': {source}")]
    Name { field: String, source: NameError },

    #[error("invalid field list: {0}")]
    Fields(#[from] FieldErrorKind),

    #[error("metadata serialization failed: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("{0}")]
    Message(String),
}

impl MiddlewareError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        MiddlewareError::Field {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A library-wide stage failed. Carries the library as it was before that stage ran.
#[derive(Debug, thiserror::Error)]
#[error("stage '{stage}' failed: {source}")]
pub struct PipelineError {
    pub stage: String,
    pub source: MiddlewareError,
    pub library: Box<Library>,
}

/// Execution constraints of a block stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Blocks may be transformed concurrently on different threads.
    pub parallel_safe: bool,
    /// The stage leaves a block untouched when it returns an error, so it can work on
    /// the block itself rather than a copy. The pipeline trusts this: a failure marker
    /// keeps whatever the stage left in the block.
    pub in_place_safe: bool,
}

/// A stage that transforms blocks independently of each other.
///
/// Parsing-failed blocks are never passed to a stage.
pub trait BlockMiddleware: MetadataOwner + Send + Sync {
    const PARALLEL_SAFE: bool = true;
    const IN_PLACE_SAFE: bool = true;

    /// Stage identifier used in logs and failure markers.
    fn name(&self) -> &'static str;

    fn transform(&self, block: &mut Block) -> Result<Outcome, MiddlewareError>;
}

/// A stage that needs to see the whole library.
pub trait LibraryMiddleware: MetadataOwner + Send + Sync {
    fn name(&self) -> &'static str;

    fn transform(&self, library: Library) -> Result<Library, MiddlewareError>;
}

// Object-safe view of a block stage; the associated consts become a runtime value.
trait DynBlockStage: Send + Sync {
    fn stage_name(&self) -> &'static str;
    fn capabilities(&self) -> Capabilities;
    fn apply(&self, block: &mut Block) -> Result<Outcome, MiddlewareError>;
}

impl<T: BlockMiddleware> DynBlockStage for T {
    fn stage_name(&self) -> &'static str {
        BlockMiddleware::name(self)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            parallel_safe: T::PARALLEL_SAFE,
            in_place_safe: T::IN_PLACE_SAFE,
        }
    }

    fn apply(&self, block: &mut Block) -> Result<Outcome, MiddlewareError> {
        BlockMiddleware::transform(self, block)
    }
}

enum Stage {
    Block(Box<dyn DynBlockStage>),
    Library(Box<dyn LibraryMiddleware>),
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Stage::Block(stage) => stage.stage_name(),
            Stage::Library(stage) => stage.name(),
        }
    }
}

/// Ordered list of stages, run in declaration order.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block<S: BlockMiddleware + 'static>(mut self, stage: S) -> Self {
        self.push_block(stage);
        self
    }

    pub fn with_library<S: LibraryMiddleware + 'static>(mut self, stage: S) -> Self {
        self.push_library(stage);
        self
    }

    pub fn push_block<S: BlockMiddleware + 'static>(&mut self, stage: S) {
        self.stages.push(Stage::Block(Box::new(stage)));
    }

    pub fn push_library<S: LibraryMiddleware + 'static>(&mut self, stage: S) {
        self.stages.push(Stage::Library(Box::new(stage)));
    }

    /// Run `other`'s stages before this pipeline's.
    pub fn prepend(mut self, mut other: Pipeline) -> Self {
        other.stages.append(&mut self.stages);
        other
    }

    /// Run `other`'s stages after this pipeline's.
    pub fn append(mut self, mut other: Pipeline) -> Self {
        self.stages.append(&mut other.stages);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(Stage::name).collect()
    }

    /// Apply every stage in order.
    ///
    /// Block stage failures are recorded in the library as failed blocks; only a
    /// library-wide stage failure aborts the run.
    pub fn run(&self, mut library: Library) -> Result<Library, PipelineError> {
        for stage in &self.stages {
            let span = tracing::debug_span!("stage", name = stage.name());
            let _guard = span.enter();

            library = match stage {
                Stage::Block(stage) => run_block_stage(stage.as_ref(), library),
                Stage::Library(stage) => {
                    let before = library.clone();
                    match stage.transform(library) {
                        Ok(library) => library,
                        Err(source) => {
                            tracing::warn!("Stage '{}' failed: {}", stage.name(), source);
                            return Err(PipelineError {
                                stage: stage.name().to_string(),
                                source,
                                library: Box::new(before),
                            });
                        }
                    }
                }
            };
        }
        Ok(library)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applied {
    Changed,
    Unchanged,
    Dropped,
    Failed,
    Skipped,
}

fn run_block_stage(stage: &dyn DynBlockStage, library: Library) -> Library {
    let capabilities = stage.capabilities();
    let blocks = library.into_blocks();
    let total = blocks.len();

    let results = map_blocks(blocks, capabilities.parallel_safe, |block| {
        apply_to_block(stage, capabilities, block)
    });

    let count = |kind: Applied| results.iter().filter(|(_, applied)| *applied == kind).count();
    tracing::debug!(
        "Stage '{}' on {} blocks: {} changed, {} unchanged, {} dropped, {} failed, {} skipped",
        stage.stage_name(),
        total,
        count(Applied::Changed),
        count(Applied::Unchanged),
        count(Applied::Dropped),
        count(Applied::Failed),
        count(Applied::Skipped)
    );

    Library::from_blocks(results.into_iter().filter_map(|(block, _)| block).collect())
}

fn apply_to_block(
    stage: &dyn DynBlockStage,
    capabilities: Capabilities,
    block: Block,
) -> (Option<Block>, Applied) {
    if block.is_failed() {
        return (Some(block), Applied::Skipped);
    }

    let (original, result) = if capabilities.in_place_safe {
        let mut block = block;
        let result = stage.apply(&mut block);
        (block, result.map(|outcome| (outcome, None)))
    } else {
        let mut copy = block.clone();
        let result = stage.apply(&mut copy);
        (block, result.map(|outcome| (outcome, Some(copy))))
    };

    match result {
        Ok((Outcome::Drop, _)) => (None, Applied::Dropped),
        Ok((outcome, copy)) => {
            let applied = match outcome {
                Outcome::Changed => Applied::Changed,
                _ => Applied::Unchanged,
            };
            (Some(copy.unwrap_or(original)), applied)
        }
        Err(err) => {
            tracing::warn!(
                "Stage '{}' failed on block at line {}: {}",
                stage.stage_name(),
                original.span.start_line,
                err
            );
            let failed = Block::transform_failed(original, stage.stage_name(), err.to_string());
            (Some(failed), Applied::Failed)
        }
    }
}

#[cfg(feature = "parallel")]
fn map_blocks<F>(blocks: Vec<Block>, parallel: bool, f: F) -> Vec<(Option<Block>, Applied)>
where
    F: Fn(Block) -> (Option<Block>, Applied) + Send + Sync,
{
    if parallel {
        blocks.into_par_iter().map(f).collect()
    } else {
        blocks.into_iter().map(f).collect()
    }
}

#[cfg(not(feature = "parallel"))]
fn map_blocks<F>(blocks: Vec<Block>, _parallel: bool, f: F) -> Vec<(Option<Block>, Applied)>
where
    F: Fn(Block) -> (Option<Block>, Applied) + Send + Sync,
{
    blocks.into_iter().map(f).collect()
}
