//! Person-list stages
//!
//! The usual chain is `SeparateCoAuthors` (text → list of names) then `SplitNameParts`
//! (list → first/von/last/jr), and `MergeNameParts` then `MergeCoAuthors` on the way
//! back. All of them only look at the configured person fields.

use serde::{Deserialize, Serialize};
use serde_json::json;

use bibflow_model::{split_coauthors, Block, MetadataOwner, ParsedName, Value};

use super::default_person_fields;
use crate::pipeline::{BlockMiddleware, MiddlewareError, Outcome};

// Person fields of an entry, with their values.
fn person_values<'a>(block: &'a mut Block, fields: &[String]) -> Vec<(String, &'a mut Value)> {
    match block.as_entry_mut() {
        Some(entry) => entry
            .values_mut()
            .filter(|(name, _)| fields.iter().any(|f| f.eq_ignore_ascii_case(name)))
            .map(|(name, value)| (name.to_string(), value))
            .collect(),
        None => Vec::new(),
    }
}

fn record<O: MetadataOwner>(owner: &O, block: &mut Block, fields: Vec<String>) -> Outcome {
    if fields.is_empty() {
        return Outcome::Unchanged;
    }
    block.metadata.insert(owner, json!(fields));
    Outcome::Changed
}

/// Split person fields on the top-level `and` into a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparateCoAuthors {
    pub fields: Vec<String>,
}

impl Default for SeparateCoAuthors {
    fn default() -> Self {
        Self {
            fields: default_person_fields(),
        }
    }
}

impl MetadataOwner for SeparateCoAuthors {
    fn metadata_key(&self) -> &'static str {
        "separate_coauthors"
    }
}

impl BlockMiddleware for SeparateCoAuthors {
    fn name(&self) -> &'static str {
        "separate_coauthors"
    }

    fn transform(&self, block: &mut Block) -> Result<Outcome, MiddlewareError> {
        let mut changed = Vec::new();
        for (name, value) in person_values(block, &self.fields) {
            let text = match &*value {
                Value::List(_) | Value::Names(_) => continue,
                other => match other.text() {
                    Some(text) => text,
                    None => {
                        tracing::debug!("Not splitting '{}': unresolved string reference", name);
                        continue;
                    }
                },
            };
            *value = Value::List(split_coauthors(&text));
            changed.push(name);
        }
        Ok(record(self, block, changed))
    }
}

/// Join list values back into one `and`-separated string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeCoAuthors {
    pub fields: Vec<String>,
}

impl Default for MergeCoAuthors {
    fn default() -> Self {
        Self {
            fields: default_person_fields(),
        }
    }
}

impl MetadataOwner for MergeCoAuthors {
    fn metadata_key(&self) -> &'static str {
        "merge_coauthors"
    }
}

impl BlockMiddleware for MergeCoAuthors {
    fn name(&self) -> &'static str {
        "merge_coauthors"
    }

    fn transform(&self, block: &mut Block) -> Result<Outcome, MiddlewareError> {
        let mut changed = Vec::new();
        for (name, value) in person_values(block, &self.fields) {
            if let Value::List(items) = &*value {
                *value = Value::Resolved(items.join(" and "));
                changed.push(name);
            }
        }
        Ok(record(self, block, changed))
    }
}

/// Decompose each person into first, von, last and jr parts.
///
/// Works on lists and on plain text (split on `and` first). A value that still holds
/// unresolved references is an error, and in strict mode so is a malformed name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitNameParts {
    pub fields: Vec<String>,
    pub strict: bool,
}

impl Default for SplitNameParts {
    fn default() -> Self {
        Self {
            fields: default_person_fields(),
            strict: false,
        }
    }
}

impl SplitNameParts {
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }
}

impl MetadataOwner for SplitNameParts {
    fn metadata_key(&self) -> &'static str {
        "split_name_parts"
    }
}

impl BlockMiddleware for SplitNameParts {
    // Fails part-way through a block, so it works on a copy.
    const IN_PLACE_SAFE: bool = false;

    fn name(&self) -> &'static str {
        "split_name_parts"
    }

    fn transform(&self, block: &mut Block) -> Result<Outcome, MiddlewareError> {
        let mut changed = Vec::new();
        for (name, value) in person_values(block, &self.fields) {
            let people = match &*value {
                Value::Names(_) => continue,
                Value::List(items) => items.clone(),
                other => match other.text() {
                    Some(text) => split_coauthors(&text),
                    None => {
                        return Err(MiddlewareError::field(
                            name,
                            "cannot split names with unresolved string references",
                        ))
                    }
                },
            };
            let names = people
                .iter()
                .map(|person| ParsedName::parse(person, self.strict))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|source| MiddlewareError::Name {
                    field: name.clone(),
                    source,
                })?;
            *value = Value::Names(names);
            changed.push(name);
        }
        Ok(record(self, block, changed))
    }
}

/// How [`MergeNameParts`] writes a name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NameStyle {
    /// `First von Last, Jr`
    FirstNameFirst,
    /// `von Last, Jr, First`
    #[default]
    LastNameFirst,
}

/// Turn decomposed names back into a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeNameParts {
    pub fields: Vec<String>,
    pub style: NameStyle,
}

impl Default for MergeNameParts {
    fn default() -> Self {
        Self {
            fields: default_person_fields(),
            style: NameStyle::default(),
        }
    }
}

impl MetadataOwner for MergeNameParts {
    fn metadata_key(&self) -> &'static str {
        "merge_name_parts"
    }
}

impl BlockMiddleware for MergeNameParts {
    fn name(&self) -> &'static str {
        "merge_name_parts"
    }

    fn transform(&self, block: &mut Block) -> Result<Outcome, MiddlewareError> {
        let merge = match self.style {
            NameStyle::FirstNameFirst => ParsedName::merge_first_name_first,
            NameStyle::LastNameFirst => ParsedName::merge_last_name_first,
        };
        let mut changed = Vec::new();
        for (name, value) in person_values(block, &self.fields) {
            if let Value::Names(names) = &*value {
                *value = Value::List(names.iter().map(merge).collect());
                changed.push(name);
            }
        }
        Ok(record(self, block, changed))
    }
}
