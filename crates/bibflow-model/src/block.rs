//! Blocks: the top-level syntactic units of a `.bib` document

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::metadata::Metadata;
use crate::value::Value;

/// Where a block came from in the source text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// 1-based line of the first character.
    pub start_line: usize,
    /// 1-based line of the last character.
    pub end_line: usize,
    pub raw: String,
}

impl Span {
    pub fn new(start_line: usize, end_line: usize, raw: impl Into<String>) -> Self {
        Self {
            start_line,
            end_line,
            raw: raw.into(),
        }
    }
}

/// What ended the scan of an unterminated block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Boundary {
    EndOfInput,
    NextBlock,
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Boundary::EndOfInput => write!(f, "end of input"),
            Boundary::NextBlock => write!(f, "the next block"),
        }
    }
}

/// Problems inside an otherwise well-delimited block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum FieldErrorKind {
    #[error("missing citation key")]
    MissingKey,
    #[error("invalid citation key `{0}`")]
    InvalidKey(String),
    #[error("expected a field name")]
    MissingName,
    #[error("expected `=` after `{0}`")]
    MissingEquals(String),
    #[error("expected a value")]
    MissingValue,
    #[error("unbalanced braces in value")]
    UnbalancedBraces,
    #[error("unterminated quoted value")]
    UnterminatedQuote,
    #[error("unexpected text `{0}` after value")]
    UnexpectedText(String),
    #[error("duplicate field `{0}`")]
    DuplicateField(String),
}

/// Why a block ended up as a [`ParsingFailedBlock`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum BlockError {
    #[error("`{delimiter}` opened on line {line} is not closed before {boundary}")]
    Unterminated {
        delimiter: char,
        line: usize,
        boundary: Boundary,
    },
    #[error("unmatched `}}` on line {line}")]
    UnmatchedClosingBrace { line: usize },
    #[error("line {line}: {kind}")]
    Field { line: usize, kind: FieldErrorKind },
    #[error("stage `{stage}` failed: {message}")]
    Transform { stage: String, message: String },
}

impl BlockError {
    /// True for splitter and tokenizer failures, false for stage failures.
    pub fn is_parse_error(&self) -> bool {
        !matches!(self, BlockError::Transform { .. })
    }
}

/// A named field of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: Value,
    /// 1-based line the field name starts on, 0 when built programmatically.
    pub start_line: usize,
}

impl Field {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
            start_line: 0,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.start_line = line;
        self
    }
}

/// One bibliographic record, e.g. `@article{key, title = {...}}`.
///
/// Field names are unique when compared case-insensitively; the original spelling and
/// order are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub entry_type: String,
    pub key: String,
    fields: Vec<Field>,
}

impl Entry {
    pub fn new(entry_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            entry_type: entry_type.into(),
            key: key.into(),
            fields: Vec::new(),
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.position(name).map(|i| &self.fields[i])
    }

    /// Get a field value by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.field(name).map(|f| &f.value)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        let i = self.position(name)?;
        Some(&mut self.fields[i].value)
    }

    /// The field's value as one string, if it is fully resolved.
    pub fn get_text(&self, name: &str) -> Option<String> {
        self.get(name).and_then(Value::text)
    }

    /// Append a field, rejecting a name that is already present.
    pub fn add_field(&mut self, field: Field) -> Result<(), FieldErrorKind> {
        if self.position(&field.name).is_some() {
            return Err(FieldErrorKind::DuplicateField(field.name));
        }
        self.fields.push(field);
        Ok(())
    }

    /// Set a field's value, replacing it in place if present and appending otherwise.
    /// Returns the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        let name = name.into();
        match self.position(&name) {
            Some(i) => Some(std::mem::replace(&mut self.fields[i].value, value)),
            None => {
                self.fields.push(Field::new(name, value));
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Field> {
        let i = self.position(name)?;
        Some(self.fields.remove(i))
    }

    /// Iterate over field names and mutable values. Names cannot be changed this way.
    pub fn values_mut(&mut self) -> impl Iterator<Item = (&str, &mut Value)> {
        self.fields
            .iter_mut()
            .map(|f| (f.name.as_str(), &mut f.value))
    }

    /// Replace the whole field list, e.g. after reordering or renaming.
    pub fn replace_fields(&mut self, fields: Vec<Field>) -> Result<(), FieldErrorKind> {
        for (i, field) in fields.iter().enumerate() {
            if fields[..i]
                .iter()
                .any(|other| other.name.eq_ignore_ascii_case(&field.name))
            {
                return Err(FieldErrorKind::DuplicateField(field.name.clone()));
            }
        }
        self.fields = fields;
        Ok(())
    }

    pub fn take_fields(&mut self) -> Vec<Field> {
        std::mem::take(&mut self.fields)
    }

    pub fn title(&self) -> Option<String> {
        self.get_text("title")
    }

    pub fn author(&self) -> Option<String> {
        self.get_text("author")
    }

    pub fn year(&self) -> Option<String> {
        self.get_text("year")
    }
}

/// `@string{name = value}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringDefinition {
    pub name: String,
    pub value: Value,
}

impl StringDefinition {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// `@preamble{value}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preamble {
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub text: String,
}

impl Comment {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A span the splitter, tokenizer or a stage could not handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsingFailedBlock {
    pub error: BlockError,
    /// For stage failures, the block as it was before the stage ran.
    pub original: Option<Box<Block>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlockKind {
    Entry(Entry),
    String(StringDefinition),
    Preamble(Preamble),
    /// `@comment{...}`
    ExplicitComment(Comment),
    /// Free text between blocks.
    ImplicitComment(Comment),
    ParsingFailed(ParsingFailedBlock),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    pub span: Span,
    pub metadata: Metadata,
}

impl Block {
    pub fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            span: Span::default(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn entry(entry: Entry) -> Self {
        Self::new(BlockKind::Entry(entry))
    }

    pub fn string(definition: StringDefinition) -> Self {
        Self::new(BlockKind::String(definition))
    }

    pub fn preamble(value: Value) -> Self {
        Self::new(BlockKind::Preamble(Preamble { value }))
    }

    pub fn failed(span: Span, error: BlockError) -> Self {
        Self::new(BlockKind::ParsingFailed(ParsingFailedBlock {
            error,
            original: None,
        }))
        .with_span(span)
    }

    /// Wrap a block a stage failed on. The original is kept intact inside the marker.
    pub fn transform_failed(original: Block, stage: &str, message: impl Into<String>) -> Self {
        let span = original.span.clone();
        Self::new(BlockKind::ParsingFailed(ParsingFailedBlock {
            error: BlockError::Transform {
                stage: stage.to_string(),
                message: message.into(),
            },
            original: Some(Box::new(original)),
        }))
        .with_span(span)
    }

    /// Citation key for entries, name for string definitions.
    pub fn key(&self) -> Option<&str> {
        match &self.kind {
            BlockKind::Entry(entry) => Some(&entry.key),
            BlockKind::String(definition) => Some(&definition.name),
            _ => None,
        }
    }

    pub fn as_entry(&self) -> Option<&Entry> {
        match &self.kind {
            BlockKind::Entry(entry) => Some(entry),
            _ => None,
        }
    }

    pub fn as_entry_mut(&mut self) -> Option<&mut Entry> {
        match &mut self.kind {
            BlockKind::Entry(entry) => Some(entry),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&StringDefinition> {
        match &self.kind {
            BlockKind::String(definition) => Some(definition),
            _ => None,
        }
    }

    pub fn as_failed(&self) -> Option<&ParsingFailedBlock> {
        match &self.kind {
            BlockKind::ParsingFailed(failed) => Some(failed),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.kind, BlockKind::ParsingFailed(_))
    }

    pub fn is_comment(&self) -> bool {
        matches!(
            self.kind,
            BlockKind::ExplicitComment(_) | BlockKind::ImplicitComment(_)
        )
    }

    /// Every value held by this block: entry fields, the string value or the preamble.
    pub fn values_mut(&mut self) -> Vec<&mut Value> {
        match &mut self.kind {
            BlockKind::Entry(entry) => entry.values_mut().map(|(_, v)| v).collect(),
            BlockKind::String(definition) => vec![&mut definition.value],
            BlockKind::Preamble(preamble) => vec![&mut preamble.value],
            _ => Vec::new(),
        }
    }
}
