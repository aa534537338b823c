//! Built-in stages
//!
//! Each stage owns one metadata slot (its [`MetadataOwner`] key) where it records what it
//! changed on a block. Stages that undo each other share a slot.
//!
//! [`MetadataOwner`]: bibflow_model::MetadataOwner

pub mod enclosing;
pub mod fields;
pub mod months;
pub mod names;
pub mod references;
pub mod sort;

pub use enclosing::{AddEnclosing, Enclosing, RemoveEnclosing};
pub use fields::{NormalizeFieldKeys, SortFieldsAlphabetically, SortFieldsCustom};
pub use months::{MonthAbbreviation, MonthInt, MonthLongString};
pub use names::{MergeCoAuthors, MergeNameParts, NameStyle, SeparateCoAuthors, SplitNameParts};
pub use references::{substituted_names, ResolveStringReferences};
pub use sort::{original_index, SortBlocksByTypeAndKey};

use bibflow_model::{Block, BlockKind, Value};

/// Fields holding lists of people.
pub const PERSON_FIELDS: [&str; 3] = ["author", "editor", "translator"];

pub(crate) fn default_person_fields() -> Vec<String> {
    PERSON_FIELDS.iter().map(|f| f.to_string()).collect()
}

/// Values of a block, each with the name it is recorded under in metadata: the field
/// name for entries, `value` for string definitions and preambles.
pub(crate) fn named_values(block: &mut Block) -> Vec<(String, &mut Value)> {
    match &mut block.kind {
        BlockKind::Entry(entry) => entry
            .values_mut()
            .map(|(name, value)| (name.to_string(), value))
            .collect(),
        BlockKind::String(definition) => vec![("value".to_string(), &mut definition.value)],
        BlockKind::Preamble(preamble) => vec![("value".to_string(), &mut preamble.value)],
        _ => Vec::new(),
    }
}
