//! Library: the parsed document
//!
//! Blocks are kept in document order. Two derived indices (citation key → entry, string
//! name → definition) and the positions of failed blocks are rebuilt whenever the block
//! list changes, inside the same `&mut self` call, so nobody ever sees them out of sync.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::block::{Block, BlockKind, Entry, Preamble, StringDefinition};
use crate::metadata::MetadataOwner;

/// Metadata slot set on a block whose key was already taken by an earlier block.
pub struct DuplicateKeyFlag;

impl MetadataOwner for DuplicateKeyFlag {
    fn metadata_key(&self) -> &'static str {
        "duplicate_key"
    }
}

/// A key collision found while indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateKey {
    pub key: String,
    /// Position of the block that owns the key in the index.
    pub first: usize,
    /// Position of the later block with the same key.
    pub duplicate: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LibraryError {
    #[error("block index {index} out of range (library has {len} blocks)")]
    OutOfRange { index: usize, len: usize },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Library {
    blocks: Vec<Block>,
    entry_index: HashMap<String, usize>,
    // Keyed by lower-cased name.
    string_index: HashMap<String, usize>,
    failed: Vec<usize>,
    duplicates: Vec<DuplicateKey>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        let mut library = Self {
            blocks,
            ..Self::default()
        };
        library.reindex();
        library
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    /// Append a block in document order and return its position.
    ///
    /// A key collision is not an error: both blocks stay, the collision is listed in
    /// [`Library::duplicate_keys`] and flagged in the later block's metadata.
    pub fn add(&mut self, mut block: Block) -> usize {
        let index = self.blocks.len();
        self.index_block(index, &mut block);
        self.blocks.push(block);
        index
    }

    /// Swap the block at `index` for `block`, returning the old one.
    pub fn replace(&mut self, index: usize, block: Block) -> Result<Block, LibraryError> {
        let len = self.blocks.len();
        let slot = self
            .blocks
            .get_mut(index)
            .ok_or(LibraryError::OutOfRange { index, len })?;
        let old = std::mem::replace(slot, block);
        self.reindex();
        Ok(old)
    }

    /// Remove the block at `index`; later blocks shift down by one.
    pub fn remove(&mut self, index: usize) -> Result<Block, LibraryError> {
        let len = self.blocks.len();
        if index >= len {
            return Err(LibraryError::OutOfRange { index, len });
        }
        let old = self.blocks.remove(index);
        self.reindex();
        Ok(old)
    }

    pub fn get_entry(&self, key: &str) -> Option<&Entry> {
        self.entry_index
            .get(key)
            .and_then(|&i| self.blocks[i].as_entry())
    }

    /// Look up a string definition; names compare case-insensitively.
    pub fn get_string(&self, name: &str) -> Option<&StringDefinition> {
        self.string_index
            .get(&name.to_lowercase())
            .and_then(|&i| self.blocks[i].as_string())
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn get(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.blocks.iter().filter_map(Block::as_entry)
    }

    pub fn strings(&self) -> impl Iterator<Item = &StringDefinition> {
        self.blocks.iter().filter_map(Block::as_string)
    }

    pub fn preambles(&self) -> impl Iterator<Item = &Preamble> {
        self.blocks.iter().filter_map(|b| match &b.kind {
            BlockKind::Preamble(preamble) => Some(preamble),
            _ => None,
        })
    }

    pub fn comments(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter().filter(|b| b.is_comment())
    }

    /// Blocks the splitter, tokenizer or a stage could not handle, in document order.
    pub fn failed_blocks(&self) -> impl Iterator<Item = &Block> {
        self.failed.iter().map(move |&i| &self.blocks[i])
    }

    pub fn duplicate_keys(&self) -> &[DuplicateKey] {
        &self.duplicates
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    fn reindex(&mut self) {
        self.entry_index.clear();
        self.string_index.clear();
        self.failed.clear();
        self.duplicates.clear();

        let mut blocks = std::mem::take(&mut self.blocks);
        for (index, block) in blocks.iter_mut().enumerate() {
            self.index_block(index, block);
        }
        self.blocks = blocks;
    }

    fn index_block(&mut self, index: usize, block: &mut Block) {
        block.metadata.remove(&DuplicateKeyFlag);

        let (index_map, key) = match &block.kind {
            BlockKind::Entry(entry) => (&mut self.entry_index, entry.key.clone()),
            BlockKind::String(definition) => {
                (&mut self.string_index, definition.name.to_lowercase())
            }
            BlockKind::ParsingFailed(_) => {
                self.failed.push(index);
                return;
            }
            _ => return,
        };

        match index_map.get(&key) {
            Some(&first) => {
                tracing::warn!(
                    "Duplicate key '{}' at block {} (first defined at block {})",
                    key,
                    index,
                    first
                );
                block
                    .metadata
                    .insert(&DuplicateKeyFlag, json!({ "key": key, "first": first }));
                self.duplicates.push(DuplicateKey {
                    key,
                    first,
                    duplicate: index,
                });
            }
            None => {
                index_map.insert(key, index);
            }
        }
    }
}

impl FromIterator<Block> for Library {
    fn from_iter<I: IntoIterator<Item = Block>>(iter: I) -> Self {
        Self::from_blocks(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Library {
    type Item = &'a Block;
    type IntoIter = std::slice::Iter<'a, Block>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}
