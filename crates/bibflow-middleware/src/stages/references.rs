//! String reference resolution
//!
//! Expands every bare name in every value (`journal = jphys`) with the text of the
//! matching `@string` definition. Definitions may refer to each other; each is resolved
//! once and memoized. Names are compared case-insensitively and `jan`..`dec` are
//! predefined unless the library defines them itself.
//!
//! A reference that cannot be expanded stays in its value, flagged as circular or
//! undefined, so the writer can still emit it by name.

use std::collections::{HashMap, HashSet};

use serde_json::json;

use bibflow_model::{Block, Library, MetadataOwner, ReferenceState, ResolutionFailure, Token, Value};

use super::{months::MONTHS, named_values};
use crate::pipeline::{LibraryMiddleware, MiddlewareError};

type Resolution = Result<String, ResolutionFailure>;

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveStringReferences {
    /// Also turn values whose references all resolved into a single `Resolved` string.
    pub collapse: bool,
}

impl ResolveStringReferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collapsing() -> Self {
        Self { collapse: true }
    }
}

impl MetadataOwner for ResolveStringReferences {
    fn metadata_key(&self) -> &'static str {
        "resolve_string_references"
    }
}

impl LibraryMiddleware for ResolveStringReferences {
    fn name(&self) -> &'static str {
        "resolve_string_references"
    }

    fn transform(&self, library: Library) -> Result<Library, MiddlewareError> {
        let mut resolver = Resolver::new(&library);
        let mut blocks = library.into_blocks();
        let mut expanded = 0usize;

        for block in &mut blocks {
            expanded += self.resolve_block(&mut resolver, block);
        }

        tracing::debug!(
            "Expanded {} string references ({} names resolved)",
            expanded,
            resolver.resolved.len()
        );
        Ok(Library::from_blocks(blocks))
    }
}

impl ResolveStringReferences {
    // Returns the number of references expanded in this block.
    fn resolve_block(&self, resolver: &mut Resolver, block: &mut Block) -> usize {
        let mut substituted = serde_json::Map::new();
        let mut expanded = 0;

        for (name, value) in named_values(block) {
            let Value::Tokens(tokens) = &mut *value else {
                continue;
            };
            let mut names = Vec::new();
            for token in tokens.iter_mut() {
                if let Token::Reference(reference) = token {
                    reference.state = match resolver.resolve(&reference.name) {
                        Ok(text) => {
                            expanded += 1;
                            names.push(reference.name.clone());
                            ReferenceState::Expanded(text)
                        }
                        Err(failure) => ReferenceState::Failed(failure),
                    };
                }
            }
            if !names.is_empty() {
                substituted.insert(name, json!(names));
            }
            if self.collapse {
                if let Some(text) = value.text() {
                    *value = Value::Resolved(text);
                }
            }
        }

        if !substituted.is_empty() {
            // Merge with an earlier run so collapsed values keep their record.
            let mut record = match block.metadata.remove(self) {
                Some(serde_json::Value::Object(previous)) => previous,
                _ => serde_json::Map::new(),
            };
            record.extend(substituted);
            block.metadata.insert(self, serde_json::Value::Object(record));
        }
        expanded
    }
}

/// Memoized expansion of string names.
struct Resolver {
    // Lower-cased name → the definition's value.
    definitions: HashMap<String, Value>,
    resolved: HashMap<String, Resolution>,
    in_progress: HashSet<String>,
}

impl Resolver {
    fn new(library: &Library) -> Self {
        let mut definitions = HashMap::new();
        for definition in library.strings() {
            // The first definition of a name wins, as in the library index.
            definitions
                .entry(definition.name.to_lowercase())
                .or_insert_with(|| definition.value.clone());
        }
        Self {
            definitions,
            resolved: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    fn resolve(&mut self, name: &str) -> Resolution {
        let key = name.to_lowercase();
        if let Some(resolution) = self.resolved.get(&key) {
            return resolution.clone();
        }
        if self.in_progress.contains(&key) {
            return Err(ResolutionFailure::Circular);
        }

        let resolution = match self.definitions.get(&key).cloned() {
            Some(value) => {
                self.in_progress.insert(key.clone());
                let resolution = self.expand(&value);
                self.in_progress.remove(&key);
                resolution
            }
            None => builtin_month(&key).ok_or(ResolutionFailure::Undefined),
        };

        match &resolution {
            Err(ResolutionFailure::Circular) => {
                tracing::warn!("String '{}' is part of a reference cycle", name)
            }
            Err(ResolutionFailure::Undefined) => {
                tracing::debug!("String '{}' is not defined", name)
            }
            Ok(_) => {}
        }
        self.resolved.insert(key, resolution.clone());
        resolution
    }

    fn expand(&mut self, value: &Value) -> Resolution {
        let tokens = match value {
            Value::Tokens(tokens) => tokens,
            other => return Ok(other.text().unwrap_or_default()),
        };
        let mut text = String::new();
        for token in tokens {
            match token {
                Token::Literal(s) | Token::Braced(s) | Token::Quoted(s) => text.push_str(s),
                Token::Reference(reference) => text.push_str(&self.resolve(&reference.name)?),
            }
        }
        Ok(text)
    }
}

fn builtin_month(name: &str) -> Option<String> {
    MONTHS
        .iter()
        .find(|(abbreviation, _)| *abbreviation == name)
        .map(|(_, long)| long.to_string())
}

/// Names of the references substituted in one block, as recorded by the stage.
pub fn substituted_names(block: &Block) -> HashMap<String, Vec<String>> {
    block
        .metadata
        .get(&ResolveStringReferences::default())
        .and_then(|slot| serde_json::from_value(slot.clone()).ok())
        .unwrap_or_default()
}
