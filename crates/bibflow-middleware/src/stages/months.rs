//! Month normalization
//!
//! Reads the `month` field in any common spelling (`3`, `03`, `mar`, `Mar.`, `March`, an
//! unresolved `mar` macro) and rewrites it in one canonical form. Unrecognized values are
//! left alone.

use std::collections::HashMap;

use lazy_static::lazy_static;

use bibflow_model::{Block, MetadataOwner, Reference, ReferenceState, Token, Value};

use crate::pipeline::{BlockMiddleware, MiddlewareError, Outcome};

lazy_static! {
    /// BibTeX's predefined month macros, in calendar order.
    pub static ref MONTHS: Vec<(&'static str, &'static str)> = vec![
        ("jan", "January"),
        ("feb", "February"),
        ("mar", "March"),
        ("apr", "April"),
        ("may", "May"),
        ("jun", "June"),
        ("jul", "July"),
        ("aug", "August"),
        ("sep", "September"),
        ("oct", "October"),
        ("nov", "November"),
        ("dec", "December"),
    ];

    static ref MONTH_LOOKUP: HashMap<String, usize> = {
        let mut lookup = HashMap::new();
        for (i, (abbreviation, long)) in MONTHS.iter().enumerate() {
            lookup.insert(abbreviation.to_string(), i + 1);
            lookup.insert(long.to_lowercase(), i + 1);
        }
        lookup.insert("sept".to_string(), 9);
        lookup
    };
}

/// 1-based month number for a month spelling, if it is one.
pub fn month_number(text: &str) -> Option<usize> {
    let text = text.trim().trim_end_matches('.').to_lowercase();
    if let Ok(number) = text.parse::<usize>() {
        return (1..=12).contains(&number).then_some(number);
    }
    MONTH_LOOKUP.get(&text).copied()
}

// The text to interpret: the value's text, or the name of a lone unresolved reference.
fn month_source(value: &Value) -> Option<String> {
    if let Some(text) = value.text() {
        return Some(text);
    }
    match value.tokens() {
        Some([Token::Reference(reference)]) => Some(reference.name.clone()),
        _ => None,
    }
}

fn normalize_month<O: MetadataOwner>(
    owner: &O,
    block: &mut Block,
    render: impl Fn(usize) -> Value,
) -> Result<Outcome, MiddlewareError> {
    let Some(entry) = block.as_entry_mut() else {
        return Ok(Outcome::Unchanged);
    };
    let Some(value) = entry.get("month") else {
        return Ok(Outcome::Unchanged);
    };
    let Some(number) = month_source(value).and_then(|text| month_number(&text)) else {
        tracing::debug!("Leaving unrecognized month in '{}'", entry.key);
        return Ok(Outcome::Unchanged);
    };

    let normalized = render(number);
    if *value == normalized {
        return Ok(Outcome::Unchanged);
    }
    let original = serde_json::to_value(value)?;
    entry.set("month", normalized);
    block.metadata.insert(owner, original);
    Ok(Outcome::Changed)
}

/// `month = 3`
#[derive(Debug, Clone, Copy, Default)]
pub struct MonthInt;

impl MetadataOwner for MonthInt {
    fn metadata_key(&self) -> &'static str {
        "month_int"
    }
}

impl BlockMiddleware for MonthInt {
    fn name(&self) -> &'static str {
        "month_int"
    }

    fn transform(&self, block: &mut Block) -> Result<Outcome, MiddlewareError> {
        normalize_month(self, block, |n| Value::Resolved(n.to_string()))
    }
}

/// `month = mar`, written as the bare macro.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonthAbbreviation;

impl MetadataOwner for MonthAbbreviation {
    fn metadata_key(&self) -> &'static str {
        "month_abbreviation"
    }
}

impl BlockMiddleware for MonthAbbreviation {
    fn name(&self) -> &'static str {
        "month_abbreviation"
    }

    fn transform(&self, block: &mut Block) -> Result<Outcome, MiddlewareError> {
        normalize_month(self, block, |n| {
            let (abbreviation, long) = MONTHS[n - 1];
            Value::Tokens(vec![Token::Reference(Reference {
                name: abbreviation.to_string(),
                state: ReferenceState::Expanded(long.to_string()),
            })])
        })
    }
}

/// `month = {March}`
#[derive(Debug, Clone, Copy, Default)]
pub struct MonthLongString;

impl MetadataOwner for MonthLongString {
    fn metadata_key(&self) -> &'static str {
        "month_long_string"
    }
}

impl BlockMiddleware for MonthLongString {
    fn name(&self) -> &'static str {
        "month_long_string"
    }

    fn transform(&self, block: &mut Block) -> Result<Outcome, MiddlewareError> {
        normalize_month(self, block, |n| Value::Resolved(MONTHS[n - 1].1.to_string()))
    }
}
