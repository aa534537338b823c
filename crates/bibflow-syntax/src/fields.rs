//! Field tokenizer using nom
//!
//! Turns the body of one block (the text between its delimiters) into fields and values:
//! - entry bodies: `key, name = value # value, ...`
//! - `@string` bodies: `name = value`
//! - `@preamble` bodies: a single value
//!
//! Values are kept as tokens; references are not looked up here. Any problem makes the
//! whole body fail with a [`BlockError::Field`] carrying the line it was found on.

use std::cell::Cell;

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, digit1, multispace0},
    combinator::map,
    error::{ErrorKind, ParseError},
    IResult,
};

use bibflow_model::{BlockError, Entry, Field, FieldErrorKind, StringDefinition, Token, Value};

/// Error carried through the combinators: where it happened and what went wrong.
#[derive(Debug, Clone, PartialEq)]
struct TokenError<'a> {
    input: &'a str,
    kind: FieldErrorKind,
}

impl<'a> ParseError<&'a str> for TokenError<'a> {
    fn from_error_kind(input: &'a str, _kind: ErrorKind) -> Self {
        TokenError {
            input,
            kind: FieldErrorKind::MissingValue,
        }
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

type PResult<'a, T> = IResult<&'a str, T, TokenError<'a>>;

fn fail<T>(input: &str, kind: FieldErrorKind) -> PResult<'_, T> {
    Err(nom::Err::Failure(TokenError { input, kind }))
}

// Turn a recoverable miss into a hard failure of the given kind.
fn require<'a, T>(result: PResult<'a, T>, input: &'a str, kind: FieldErrorKind) -> PResult<'a, T> {
    result.or_else(|err| match err {
        nom::Err::Error(_) => fail(input, kind),
        other => Err(other),
    })
}

/// Characters allowed in field names and string references.
pub fn is_identifier_char(c: char) -> bool {
    !c.is_whitespace()
        && !c.is_control()
        && !matches!(c, '{' | '}' | '(' | ')' | ',' | '=' | '#' | '%' | '"' | '\\')
}

/// The body text being tokenized, used to turn positions back into line numbers.
///
/// Lookups move forward through the body, so the last position and its line are kept
/// and only the newlines after it are counted.
struct Body<'a> {
    text: &'a str,
    first_line: usize,
    cursor: Cell<(usize, usize)>,
}

impl<'a> Body<'a> {
    fn new(text: &'a str, first_line: usize) -> Self {
        Self {
            text,
            first_line,
            cursor: Cell::new((0, first_line)),
        }
    }

    // `rest` is always a suffix of `text`.
    fn line_of(&self, rest: &str) -> usize {
        let consumed = self.text.len() - rest.len();
        let (from, line) = match self.cursor.get() {
            (offset, line) if offset <= consumed => (offset, line),
            _ => (0, self.first_line),
        };
        let line = line + self.text[from..consumed].matches('\n').count();
        self.cursor.set((consumed, line));
        line
    }

    fn error(&self, err: nom::Err<TokenError<'_>>) -> BlockError {
        let (input, kind) = match err {
            nom::Err::Error(e) | nom::Err::Failure(e) => (e.input, e.kind),
            nom::Err::Incomplete(_) => ("", FieldErrorKind::MissingValue),
        };
        BlockError::Field {
            line: self.line_of(input),
            kind,
        }
    }
}

/// Tokenize an entry body. `body_line` is the line the body starts on.
pub fn parse_entry(entry_type: &str, body: &str, body_line: usize) -> Result<Entry, BlockError> {
    let body = Body::new(body, body_line);
    entry_body(&body, entry_type)
        .map(|(_, entry)| entry)
        .map_err(|err| body.error(err))
}

/// Tokenize an `@string` body.
pub fn parse_string(body: &str, body_line: usize) -> Result<StringDefinition, BlockError> {
    let body = Body::new(body, body_line);
    string_body(body.text)
        .map(|(_, definition)| definition)
        .map_err(|err| body.error(err))
}

/// Tokenize an `@preamble` body.
pub fn parse_preamble(body: &str, body_line: usize) -> Result<Value, BlockError> {
    let body = Body::new(body, body_line);
    preamble_body(body.text)
        .map(|(_, value)| value)
        .map_err(|err| body.error(err))
}

fn entry_body<'a>(body: &Body<'a>, entry_type: &str) -> PResult<'a, Entry> {
    let (rest, _) = multispace0(body.text)?;

    let key_end = key_end(rest);
    let key = rest[..key_end].trim();
    if key.is_empty() {
        return fail(rest, FieldErrorKind::MissingKey);
    }
    if key.contains(|c: char| c.is_whitespace() || matches!(c, '=' | '{' | '}' | '"')) {
        return fail(rest, FieldErrorKind::InvalidKey(key.to_string()));
    }

    let mut entry = Entry::new(entry_type, key);
    let mut remaining = &rest[key_end..];

    loop {
        let (rest, _) = multispace0(remaining)?;
        if rest.is_empty() {
            return Ok((rest, entry));
        }
        let (rest, _) = require(
            char(',')(rest),
            rest,
            FieldErrorKind::UnexpectedText(snippet(rest)),
        )?;

        // Trailing comma
        let (rest, _) = multispace0(rest)?;
        if rest.is_empty() {
            return Ok((rest, entry));
        }

        let line = body.line_of(rest);
        let (after, (name, value)) = field(rest)?;
        if let Err(kind) = entry.add_field(Field::new(name, value).at_line(line)) {
            return fail(rest, kind);
        }
        remaining = after;
    }
}

fn string_body(input: &str) -> PResult<'_, StringDefinition> {
    let (rest, _) = multispace0(input)?;
    let (rest, (name, value)) = field(rest)?;
    let (rest, _) = multispace0(rest)?;
    let rest = rest.strip_prefix(',').unwrap_or(rest);
    let (rest, _) = multispace0(rest)?;
    if !rest.is_empty() {
        return fail(rest, FieldErrorKind::UnexpectedText(snippet(rest)));
    }
    Ok((rest, StringDefinition::new(name, value)))
}

fn preamble_body(input: &str) -> PResult<'_, Value> {
    let (rest, _) = multispace0(input)?;
    let (rest, value) = field_value(rest)?;
    let (rest, _) = multispace0(rest)?;
    if !rest.is_empty() {
        return fail(rest, FieldErrorKind::UnexpectedText(snippet(rest)));
    }
    Ok((rest, value))
}

/// End of the cite key: the first comma outside braces, or the end of the body.
fn key_end(input: &str) -> usize {
    let mut depth = 0usize;
    for (pos, byte) in input.bytes().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => return pos,
            _ => {}
        }
    }
    input.len()
}

/// Parse a single field (name = value)
fn field(input: &str) -> PResult<'_, (&str, Value)> {
    let (rest, name) = require(
        take_while1(is_identifier_char)(input),
        input,
        FieldErrorKind::MissingName,
    )?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = require(
        char('=')(rest),
        rest,
        FieldErrorKind::MissingEquals(name.to_string()),
    )?;
    let (rest, _) = multispace0(rest)?;
    let (rest, value) = field_value(rest)?;
    Ok((rest, (name, value)))
}

/// Parse a field value: one or more tokens joined by `#`
fn field_value(input: &str) -> PResult<'_, Value> {
    let (mut remaining, first) = value_token(input)?;
    let mut tokens = vec![first];

    loop {
        let (rest, _) = multispace0(remaining)?;
        match rest.strip_prefix('#') {
            Some(stripped) => {
                let (rest, _) = multispace0(stripped)?;
                let (rest, token) = value_token(rest)?;
                tokens.push(token);
                remaining = rest;
            }
            None => return Ok((remaining, Value::Tokens(tokens))),
        }
    }
}

/// Braced group, quoted group, numeral or string reference
fn value_token(input: &str) -> PResult<'_, Token> {
    require(
        alt((
            braced_value,
            quoted_value,
            map(digit1, |s: &str| Token::Literal(s.to_string())),
            map(take_while1(is_identifier_char), |s: &str| Token::reference(s)),
        ))(input),
        input,
        FieldErrorKind::MissingValue,
    )
}

/// Parse a braced value {content}, nested braces included
fn braced_value(input: &str) -> PResult<'_, Token> {
    let (rest, _) = char('{')(input)?;

    let mut depth = 1usize;
    for (pos, byte) in rest.bytes().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&rest[pos + 1..], Token::Braced(rest[..pos].to_string())));
                }
            }
            _ => {}
        }
    }

    fail(input, FieldErrorKind::UnbalancedBraces)
}

/// Parse a quoted value "content"; quotes inside braces do not end it
fn quoted_value(input: &str) -> PResult<'_, Token> {
    let (rest, _) = char('"')(input)?;

    let mut depth = 0usize;
    for (pos, byte) in rest.bytes().enumerate() {
        match byte {
            b'"' if depth == 0 => {
                return Ok((&rest[pos + 1..], Token::Quoted(rest[..pos].to_string())));
            }
            b'{' => depth += 1,
            b'}' => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return fail(&rest[pos..], FieldErrorKind::UnbalancedBraces),
            },
            _ => {}
        }
    }

    if depth > 0 {
        fail(input, FieldErrorKind::UnbalancedBraces)
    } else {
        fail(input, FieldErrorKind::UnterminatedQuote)
    }
}

// A short excerpt for error messages.
fn snippet(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default().trim();
    match line.char_indices().nth(24) {
        Some((cut, _)) => format!("{}...", &line[..cut]),
        None => line.to_string(),
    }
}
