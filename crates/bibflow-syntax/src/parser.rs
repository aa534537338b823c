//! Raw parse: splitter plus field tokenizer, no middleware
//!
//! Every chunk of the input ends up as exactly one block, in document order. Nothing here
//! returns an error; problems are recorded as failed blocks in the library.

use bibflow_model::{Block, BlockKind, Comment, Library, Span};

use crate::fields;
use crate::splitter::{self, Chunk, RawBlock, RawKind};

/// Split and tokenize `input` into a library of raw blocks.
pub fn parse(input: &str) -> Library {
    Library::from_blocks(parse_blocks(input))
}

/// Like [`parse`], but returns the bare block list.
pub fn parse_blocks(input: &str) -> Vec<Block> {
    let blocks: Vec<Block> = splitter::split(input).into_iter().map(build_block).collect();

    let failed = blocks.iter().filter(|b| b.is_failed()).count();
    if failed > 0 {
        tracing::warn!("{} of {} blocks failed to parse", failed, blocks.len());
    } else {
        tracing::debug!("Parsed {} blocks", blocks.len());
    }
    blocks
}

fn build_block(chunk: Chunk<'_>) -> Block {
    match chunk {
        Chunk::Block(raw) => tokenize_block(raw),
        Chunk::Text {
            start_line,
            end_line,
            text,
        } => Block::new(BlockKind::ImplicitComment(Comment::new(text)))
            .with_span(Span::new(start_line, end_line, text)),
        Chunk::Failed {
            start_line,
            end_line,
            raw,
            error,
        } => Block::failed(Span::new(start_line, end_line, raw), error),
    }
}

fn tokenize_block(raw: RawBlock<'_>) -> Block {
    let span = Span::new(raw.start_line, raw.end_line, raw.raw);
    let result = match raw.kind {
        RawKind::Entry(entry_type) => {
            fields::parse_entry(entry_type, raw.body, raw.body_line).map(Block::entry)
        }
        RawKind::String => fields::parse_string(raw.body, raw.body_line).map(Block::string),
        RawKind::Preamble => fields::parse_preamble(raw.body, raw.body_line).map(Block::preamble),
        RawKind::Comment => Ok(Block::new(BlockKind::ExplicitComment(Comment::new(
            raw.body,
        )))),
    };

    match result {
        Ok(block) => block.with_span(span),
        Err(error) => {
            tracing::warn!("Failed to tokenize block at line {}: {}", raw.start_line, error);
            Block::failed(span, error)
        }
    }
}
