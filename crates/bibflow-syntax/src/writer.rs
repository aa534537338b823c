//! BibTeX writer
//!
//! Converts a [`Library`] back to BibTeX text. Blocks are written in library order;
//! failed blocks are written as their raw source so nothing the parser saw is lost.

use serde::{Deserialize, Serialize};

use bibflow_model::{Block, BlockKind, Entry, Library, ParsedName, Token, Value};

/// Where field values start within an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueColumn {
    /// Pad field names to at least this many characters.
    Fixed(usize),
    /// Pad field names to the longest name in the entry.
    Auto,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    pub indent: String,
    pub block_separator: String,
    /// Emit a comma after the last field too.
    pub trailing_comma: bool,
    pub value_column: ValueColumn,
    /// Comment line written before the raw text of a block that failed to parse.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_block_comment: Option<String>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            indent: "    ".to_string(),
            block_separator: "\n\n".to_string(),
            trailing_comma: false,
            value_column: ValueColumn::Fixed(0),
            failed_block_comment: None,
        }
    }
}

/// Format a whole library. The result ends with a newline unless the library is empty.
pub fn write_library(library: &Library, config: &WriterConfig) -> String {
    let mut result = library
        .blocks()
        .iter()
        .map(|block| write_block(block, config))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(&config.block_separator);
    if !result.is_empty() {
        result.push('\n');
    }
    result
}

/// Format a single block without a trailing separator.
pub fn write_block(block: &Block, config: &WriterConfig) -> String {
    match &block.kind {
        BlockKind::Entry(entry) => write_entry(entry, config),
        BlockKind::String(definition) => {
            format!("@string{{{} = {}}}", definition.name, format_value(&definition.value))
        }
        BlockKind::Preamble(preamble) => format!("@preamble{{{}}}", format_value(&preamble.value)),
        BlockKind::ExplicitComment(comment) => format!("@comment{{{}}}", comment.text),
        BlockKind::ImplicitComment(comment) => comment.text.clone(),
        BlockKind::ParsingFailed(failed) => match &failed.original {
            Some(original) => write_block(original, config),
            None => match &config.failed_block_comment {
                Some(comment) => format!("{}\n{}", comment, block.span.raw),
                None => block.span.raw.clone(),
            },
        },
    }
}

fn write_entry(entry: &Entry, config: &WriterConfig) -> String {
    let mut result = String::new();

    // Entry type and cite key
    result.push('@');
    result.push_str(&entry.entry_type);
    result.push('{');
    result.push_str(&entry.key);

    if entry.fields().is_empty() {
        result.push('}');
        return result;
    }
    result.push(',');
    result.push('\n');

    let width = match config.value_column {
        ValueColumn::Fixed(width) => width,
        ValueColumn::Auto => entry
            .fields()
            .iter()
            .map(|f| f.name.chars().count())
            .max()
            .unwrap_or(0),
    };

    let last = entry.fields().len() - 1;
    for (i, field) in entry.fields().iter().enumerate() {
        result.push_str(&config.indent);
        result.push_str(&format!("{:<width$}", field.name, width = width));
        result.push_str(" = ");
        result.push_str(&format_value(&field.value));
        if i < last || config.trailing_comma {
            result.push(',');
        }
        result.push('\n');
    }

    result.push('}');
    result
}

/// Format a field value, choosing delimiters for resolved text
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Tokens(tokens) => tokens
            .iter()
            .map(format_token)
            .collect::<Vec<_>>()
            .join(" # "),
        Value::Resolved(text) => format_text(text),
        Value::List(items) => braced(&items.join(" and ")),
        Value::Names(names) => braced(
            &names
                .iter()
                .map(ParsedName::merge_last_name_first)
                .collect::<Vec<_>>()
                .join(" and "),
        ),
    }
}

fn format_token(token: &Token) -> String {
    match token {
        Token::Literal(s) => s.clone(),
        Token::Braced(s) => braced(s),
        Token::Quoted(s) => format!("\"{}\"", s),
        // Written by name whatever its resolution state
        Token::Reference(reference) => reference.name.clone(),
    }
}

fn format_text(text: &str) -> String {
    // Purely numeric values need no delimiters
    if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
        return text.to_string();
    }
    braced(text)
}

fn braced(text: &str) -> String {
    let mut result = String::with_capacity(text.len() + 2);
    result.push('{');
    result.push_str(text);
    result.push('}');
    result
}
