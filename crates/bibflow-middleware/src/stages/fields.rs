//! Field name and order stages

use serde::{Deserialize, Serialize};
use serde_json::json;

use bibflow_model::{Block, Field, MetadataOwner};

use crate::pipeline::{BlockMiddleware, MiddlewareError, Outcome};

/// Lower-case every field name of an entry.
///
/// Names that only differ in non-ASCII case can end up identical; such a block fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeFieldKeys;

impl MetadataOwner for NormalizeFieldKeys {
    fn metadata_key(&self) -> &'static str {
        "normalize_field_keys"
    }
}

impl BlockMiddleware for NormalizeFieldKeys {
    fn name(&self) -> &'static str {
        "normalize_field_keys"
    }

    fn transform(&self, block: &mut Block) -> Result<Outcome, MiddlewareError> {
        let Some(entry) = block.as_entry_mut() else {
            return Ok(Outcome::Unchanged);
        };

        let mut renamed = serde_json::Map::new();
        let fields: Vec<Field> = entry
            .fields()
            .iter()
            .map(|field| {
                let lower = field.name.to_lowercase();
                if lower != field.name {
                    renamed.insert(lower.clone(), json!(field.name));
                }
                Field {
                    name: lower,
                    ..field.clone()
                }
            })
            .collect();

        if renamed.is_empty() {
            return Ok(Outcome::Unchanged);
        }
        entry.replace_fields(fields)?;
        block
            .metadata
            .insert(self, serde_json::Value::Object(renamed));
        Ok(Outcome::Changed)
    }
}

const SORT_FIELDS_KEY: &str = "sort_fields";

// Reorder with a stable sort and record the original order.
fn sort_fields<O: MetadataOwner>(
    owner: &O,
    block: &mut Block,
    rank: impl Fn(&Field) -> (usize, String),
) -> Result<Outcome, MiddlewareError> {
    let Some(entry) = block.as_entry_mut() else {
        return Ok(Outcome::Unchanged);
    };

    let original: Vec<String> = entry.fields().iter().map(|f| f.name.clone()).collect();
    let mut fields = entry.fields().to_vec();
    fields.sort_by_cached_key(|field| rank(field));
    if fields.iter().map(|f| &f.name).eq(original.iter()) {
        return Ok(Outcome::Unchanged);
    }

    entry.replace_fields(fields)?;
    block.metadata.insert(owner, json!(original));
    Ok(Outcome::Changed)
}

/// Order entry fields by name, ignoring case.
#[derive(Debug, Clone, Copy, Default)]
pub struct SortFieldsAlphabetically;

impl MetadataOwner for SortFieldsAlphabetically {
    fn metadata_key(&self) -> &'static str {
        SORT_FIELDS_KEY
    }
}

impl BlockMiddleware for SortFieldsAlphabetically {
    fn name(&self) -> &'static str {
        "sort_fields_alphabetically"
    }

    fn transform(&self, block: &mut Block) -> Result<Outcome, MiddlewareError> {
        sort_fields(self, block, |field| (0, field.name.to_lowercase()))
    }
}

/// Put the listed fields first, in the listed order. Other fields keep their relative
/// order after them, or are sorted by name when `sort_remaining` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortFieldsCustom {
    pub order: Vec<String>,
    pub sort_remaining: bool,
}

impl SortFieldsCustom {
    pub fn new<I, S>(order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            order: order.into_iter().map(Into::into).collect(),
            sort_remaining: false,
        }
    }
}

impl MetadataOwner for SortFieldsCustom {
    fn metadata_key(&self) -> &'static str {
        SORT_FIELDS_KEY
    }
}

impl BlockMiddleware for SortFieldsCustom {
    fn name(&self) -> &'static str {
        "sort_fields_custom"
    }

    fn transform(&self, block: &mut Block) -> Result<Outcome, MiddlewareError> {
        sort_fields(self, block, |field| {
            let position = self
                .order
                .iter()
                .position(|name| name.eq_ignore_ascii_case(&field.name));
            match position {
                Some(i) => (i, String::new()),
                None if self.sort_remaining => (self.order.len(), field.name.to_lowercase()),
                None => (self.order.len(), String::new()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bibflow_model::{Entry, Value};

    fn entry(names: &[&str]) -> Block {
        let mut entry = Entry::new("article", "k");
        for name in names {
            entry.set(*name, Value::resolved(name.to_uppercase()));
        }
        Block::entry(entry)
    }

    fn names(block: &Block) -> Vec<&str> {
        block
            .as_entry()
            .unwrap()
            .fields()
            .iter()
            .map(|f| f.name.as_str())
            .collect()
    }

    #[test]
    fn test_normalize_field_keys() {
        let mut block = entry(&["Title", "year", "AUTHOR"]);
        assert_eq!(NormalizeFieldKeys.transform(&mut block).unwrap(), Outcome::Changed);
        assert_eq!(names(&block), vec!["title", "year", "author"]);
        assert_eq!(
            block.metadata.get(&NormalizeFieldKeys),
            Some(&json!({"title": "Title", "author": "AUTHOR"}))
        );
        // Values are untouched.
        assert_eq!(
            block.as_entry().unwrap().get("title"),
            Some(&Value::resolved("TITLE"))
        );

        assert_eq!(NormalizeFieldKeys.transform(&mut block).unwrap(), Outcome::Unchanged);
    }

    #[test]
    fn test_normalize_ignores_non_entries() {
        let mut block = Block::preamble(Value::braced("x"));
        assert_eq!(NormalizeFieldKeys.transform(&mut block).unwrap(), Outcome::Unchanged);
    }

    #[test]
    fn test_sort_alphabetically() {
        let mut block = entry(&["year", "Title", "author"]);
        SortFieldsAlphabetically.transform(&mut block).unwrap();
        assert_eq!(names(&block), vec!["author", "Title", "year"]);
        assert_eq!(
            block.metadata.get(&SortFieldsAlphabetically),
            Some(&json!(["year", "Title", "author"]))
        );
        assert_eq!(
            SortFieldsAlphabetically.transform(&mut block).unwrap(),
            Outcome::Unchanged
        );
    }

    #[test]
    fn test_sort_custom() {
        let stage = SortFieldsCustom::new(["title", "author"]);
        let mut block = entry(&["year", "note", "Author", "title"]);
        stage.transform(&mut block).unwrap();
        assert_eq!(names(&block), vec!["title", "Author", "year", "note"]);

        let stage = SortFieldsCustom {
            sort_remaining: true,
            ..SortFieldsCustom::new(["title"])
        };
        let mut block = entry(&["year", "note", "title"]);
        stage.transform(&mut block).unwrap();
        assert_eq!(names(&block), vec!["title", "note", "year"]);
    }
}
