//! Field values
//!
//! A value starts life as the sequence of tokens the tokenizer found between `=` and the
//! next field, e.g. `"Proc. of " # conf # {, 2nd ed.}`. Stages later rewrite it into a
//! single resolved string, a co-author list or a list of decomposed names.

use serde::{Deserialize, Serialize};

use crate::name::ParsedName;

/// Why a symbolic reference could not be expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
pub enum ResolutionFailure {
    #[error("circular string reference")]
    Circular,
    #[error("undefined string reference")]
    Undefined,
}

/// Resolution state of a reference token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceState {
    /// No resolution stage has looked at this token yet.
    Pending,
    /// The reference was substituted with this text.
    Expanded(String),
    /// Resolution was attempted and failed.
    Failed(ResolutionFailure),
}

/// A bare name inside a value that refers to an `@string` definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub name: String,
    pub state: ReferenceState,
}

impl Reference {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ReferenceState::Pending,
        }
    }

    /// The substituted text, if this reference has been expanded.
    pub fn expanded(&self) -> Option<&str> {
        match &self.state {
            ReferenceState::Expanded(text) => Some(text),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<ResolutionFailure> {
        match self.state {
            ReferenceState::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// One operand of a `#` concatenation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Token {
    /// A bare numeral, e.g. `2024`.
    Literal(String),
    /// Content of a `{...}` group, without the outer braces.
    Braced(String),
    /// Content of a `"..."` group, without the quotes.
    Quoted(String),
    Reference(Reference),
}

impl Token {
    pub fn reference(name: impl Into<String>) -> Self {
        Token::Reference(Reference::new(name))
    }

    /// The text this token contributes to the concatenated value. `None` for a reference
    /// that has not been expanded.
    pub fn text(&self) -> Option<&str> {
        match self {
            Token::Literal(s) | Token::Braced(s) | Token::Quoted(s) => Some(s),
            Token::Reference(reference) => reference.expanded(),
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Token::Reference(reference) => Some(reference),
            _ => None,
        }
    }
}

/// The content of a field, string definition or preamble.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// Raw `#`-separated tokens as found in the source.
    Tokens(Vec<Token>),
    /// A single resolved string.
    Resolved(String),
    /// Co-authors split on the top-level `and` separator.
    List(Vec<String>),
    /// Decomposed personal names.
    Names(Vec<ParsedName>),
}

impl Value {
    /// A value consisting of one `{...}` group.
    pub fn braced(content: impl Into<String>) -> Self {
        Value::Tokens(vec![Token::Braced(content.into())])
    }

    pub fn resolved(text: impl Into<String>) -> Self {
        Value::Resolved(text.into())
    }

    pub fn tokens(&self) -> Option<&[Token]> {
        match self {
            Value::Tokens(tokens) => Some(tokens),
            _ => None,
        }
    }

    pub fn references(&self) -> Vec<&Reference> {
        match self {
            Value::Tokens(tokens) => tokens.iter().filter_map(Token::as_reference).collect(),
            _ => Vec::new(),
        }
    }

    /// True if some reference token is still pending or failed to resolve.
    pub fn has_unresolved(&self) -> bool {
        self.references().iter().any(|r| r.expanded().is_none())
    }

    /// The value as one string, or `None` while references are unresolved.
    ///
    /// Lists are joined with ` and `; names are rendered first-name-first and joined the
    /// same way.
    pub fn text(&self) -> Option<String> {
        match self {
            Value::Tokens(tokens) => {
                let mut out = String::new();
                for token in tokens {
                    out.push_str(token.text()?);
                }
                Some(out)
            }
            Value::Resolved(text) => Some(text.clone()),
            Value::List(items) => Some(items.join(" and ")),
            Value::Names(names) => Some(
                names
                    .iter()
                    .map(ParsedName::merge_first_name_first)
                    .collect::<Vec<_>>()
                    .join(" and "),
            ),
        }
    }

    pub fn as_resolved(&self) -> Option<&str> {
        match self {
            Value::Resolved(text) => Some(text),
            _ => None,
        }
    }
}
