//! Value delimiters
//!
//! [`RemoveEnclosing`] turns token values into plain text after parsing;
//! [`AddEnclosing`] turns plain text back into tokens before writing. Both use the
//! `enclosing` metadata slot: removal records the original tokens per field, and adding
//! restores them when the text did not change in between.

use serde::{Deserialize, Serialize};

use bibflow_model::{Block, MetadataOwner, Token, Value};

use super::named_values;
use crate::pipeline::{BlockMiddleware, MiddlewareError, Outcome};

const ENCLOSING_KEY: &str = "enclosing";

/// Collapse every fully resolvable token value into `Resolved` text.
///
/// Values with unresolved references keep their tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveEnclosing;

impl MetadataOwner for RemoveEnclosing {
    fn metadata_key(&self) -> &'static str {
        ENCLOSING_KEY
    }
}

impl BlockMiddleware for RemoveEnclosing {
    fn name(&self) -> &'static str {
        "remove_enclosing"
    }

    fn transform(&self, block: &mut Block) -> Result<Outcome, MiddlewareError> {
        let mut record = match block.metadata.get(self) {
            Some(serde_json::Value::Object(map)) => map.clone(),
            _ => serde_json::Map::new(),
        };

        // Serialize everything first so a failure leaves the block as it was.
        let mut collapsed = Vec::new();
        for (name, value) in named_values(block) {
            let tokens = match &*value {
                Value::Tokens(tokens) => tokens,
                _ => continue,
            };
            let Some(text) = value.text() else {
                continue;
            };
            record.insert(name, serde_json::to_value(tokens)?);
            collapsed.push((value, text));
        }

        if collapsed.is_empty() {
            return Ok(Outcome::Unchanged);
        }
        for (value, text) in collapsed {
            *value = Value::Resolved(text);
        }
        block.metadata.insert(self, serde_json::Value::Object(record));
        Ok(Outcome::Changed)
    }
}

/// Delimiter used for text that has no recorded tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Enclosing {
    #[default]
    Braces,
    Quotes,
}

/// Turn `Resolved` text back into tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddEnclosing {
    /// Restore the tokens recorded by [`RemoveEnclosing`] when their text still matches.
    pub reuse_previous: bool,
    /// Put delimiters around bare integers too.
    pub enclose_integers: bool,
    pub default_enclosing: Enclosing,
}

impl Default for AddEnclosing {
    fn default() -> Self {
        Self {
            reuse_previous: true,
            enclose_integers: false,
            default_enclosing: Enclosing::Braces,
        }
    }
}

impl AddEnclosing {
    fn enclose(&self, text: String) -> Token {
        if !self.enclose_integers && !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
            return Token::Literal(text);
        }
        match self.default_enclosing {
            Enclosing::Quotes if quotable(&text) => Token::Quoted(text),
            _ => Token::Braced(text),
        }
    }
}

// A quoted group cannot hold a `"` outside braces or unbalanced braces.
fn quotable(text: &str) -> bool {
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '{' => depth += 1,
            '}' => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            '"' if depth == 0 => return false,
            _ => {}
        }
    }
    depth == 0
}

impl MetadataOwner for AddEnclosing {
    fn metadata_key(&self) -> &'static str {
        ENCLOSING_KEY
    }
}

impl BlockMiddleware for AddEnclosing {
    fn name(&self) -> &'static str {
        "add_enclosing"
    }

    fn transform(&self, block: &mut Block) -> Result<Outcome, MiddlewareError> {
        let mut record = match block.metadata.get(self) {
            Some(serde_json::Value::Object(map)) if self.reuse_previous => map.clone(),
            _ => serde_json::Map::new(),
        };

        let mut changed = false;
        for (name, value) in named_values(block) {
            let Value::Resolved(text) = &*value else {
                continue;
            };
            let previous = record
                .remove(&name)
                .and_then(|tokens| serde_json::from_value::<Vec<Token>>(tokens).ok())
                .filter(|tokens| Value::Tokens(tokens.clone()).text().as_deref() == Some(text.as_str()));
            let tokens = match previous {
                Some(tokens) => tokens,
                None => vec![self.enclose(text.clone())],
            };
            *value = Value::Tokens(tokens);
            changed = true;
        }

        if block.metadata.remove(self).is_some() {
            changed = true;
        }
        Ok(if changed {
            Outcome::Changed
        } else {
            Outcome::Unchanged
        })
    }
}
