//! Library-wide block ordering

use serde_json::json;

use bibflow_model::{Block, BlockKind, Library, MetadataOwner};

use crate::pipeline::{LibraryMiddleware, MiddlewareError};

/// Reorder blocks: preambles, then string definitions, then entries sorted by citation
/// key, then failed blocks.
///
/// Comments move together with the block that follows them; comments after the last
/// other block stay at the end. Preambles, strings and failed blocks keep their relative
/// order, since definitions may refer to earlier ones. Every block's position before
/// sorting is recorded in its metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct SortBlocksByTypeAndKey;

impl MetadataOwner for SortBlocksByTypeAndKey {
    fn metadata_key(&self) -> &'static str {
        "sort_blocks"
    }
}

// A block with the comments directly above it.
struct Unit {
    blocks: Vec<Block>,
    rank: u8,
    key: String,
}

fn rank(block: &Block) -> (u8, String) {
    match &block.kind {
        BlockKind::Preamble(_) => (0, String::new()),
        BlockKind::String(_) => (1, String::new()),
        BlockKind::Entry(entry) => (2, entry.key.to_lowercase()),
        _ => (3, String::new()),
    }
}

impl LibraryMiddleware for SortBlocksByTypeAndKey {
    fn name(&self) -> &'static str {
        "sort_blocks"
    }

    fn transform(&self, library: Library) -> Result<Library, MiddlewareError> {
        let mut units = Vec::new();
        let mut pending = Vec::new();

        for (index, mut block) in library.into_blocks().into_iter().enumerate() {
            block.metadata.insert(self, json!({ "original_index": index }));
            if block.is_comment() {
                pending.push(block);
                continue;
            }
            let (rank, key) = rank(&block);
            pending.push(block);
            units.push(Unit {
                blocks: std::mem::take(&mut pending),
                rank,
                key,
            });
        }

        units.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.key.cmp(&b.key)));

        let blocks: Vec<Block> = units
            .into_iter()
            .flat_map(|unit| unit.blocks)
            .chain(pending)
            .collect();
        tracing::debug!("Sorted {} blocks", blocks.len());
        Ok(Library::from_blocks(blocks))
    }
}

/// Position a block had before [`SortBlocksByTypeAndKey`] moved it.
pub fn original_index(block: &Block) -> Option<usize> {
    block
        .metadata
        .get(&SortBlocksByTypeAndKey)
        .and_then(|slot| slot.get("original_index"))
        .and_then(serde_json::Value::as_u64)
        .map(|index| index as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bibflow_syntax::parse;

    fn order(library: &Library) -> Vec<String> {
        library
            .blocks()
            .iter()
            .map(|block| match &block.kind {
                BlockKind::Entry(entry) => entry.key.clone(),
                BlockKind::String(definition) => format!("@{}", definition.name),
                BlockKind::Preamble(_) => "preamble".to_string(),
                BlockKind::ExplicitComment(comment) | BlockKind::ImplicitComment(comment) => {
                    format!("# {}", comment.text.trim())
                }
                BlockKind::ParsingFailed(_) => "failed".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_sort_blocks() {
        let input = r#"@article{zeta, title = {Z}}

about alpha

@book{Alpha, title = {A}}
@string{b = {B}}
@preamble{"\noop"}
@string{a = b}
@misc{mid,
trailing text"#;
        let library = parse(input);
        let before = library.len();
        let sorted = SortBlocksByTypeAndKey.transform(library).unwrap();

        assert_eq!(sorted.len(), before);
        assert_eq!(
            order(&sorted),
            vec!["preamble", "@b", "@a", "# about alpha", "Alpha", "zeta", "failed"]
        );
        assert_eq!(original_index(&sorted.blocks()[0]), Some(4));
        assert!(sorted.get_entry("zeta").is_some());
    }

    #[test]
    fn test_trailing_comments_stay_last() {
        let library = parse("@misc{b}\n@misc{a}\n\nthe end\n");
        let sorted = SortBlocksByTypeAndKey.transform(library).unwrap();
        assert_eq!(order(&sorted), vec!["a", "b", "# the end"]);
    }

    #[test]
    fn test_duplicate_keys_keep_document_order() {
        let library = parse("@misc{k, note = {first}}\n@misc{k, note = {second}}\n@misc{a}");
        let sorted = SortBlocksByTypeAndKey.transform(library).unwrap();
        assert_eq!(order(&sorted), vec!["a", "k", "k"]);
        assert_eq!(original_index(&sorted.blocks()[1]), Some(0));
        assert_eq!(sorted.duplicate_keys().len(), 1);
    }
}
