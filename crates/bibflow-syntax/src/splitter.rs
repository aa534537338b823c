//! Block splitter
//!
//! Cuts the input into raw block spans without understanding their fields. A block
//! starts at `@type{` or `@type(` and ends at the matching closer; braces and quotes in
//! between are tracked so that a `}` inside a value does not end the block early.
//!
//! A block that never closes (or hits the start of the next block at depth zero first)
//! becomes a [`Chunk::Failed`] and scanning resumes right there. When a block runs off the
//! end of the input, or into a stray closer, the failure is cut back to the first
//! `@type{` that began a line inside it, so a single broken entry cannot swallow the
//! rest of the file. A block that closes normally keeps such lines as content.

use bibflow_model::{BlockError, Boundary};

/// What the type token after `@` says the block is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawKind<'a> {
    /// Any unrecognized type; holds the type as written.
    Entry(&'a str),
    String,
    Preamble,
    Comment,
}

/// A well-delimited block, fields not yet tokenized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock<'a> {
    pub kind: RawKind<'a>,
    pub start_line: usize,
    pub end_line: usize,
    /// From the `@` through the closing delimiter.
    pub raw: &'a str,
    /// Between the delimiters.
    pub body: &'a str,
    /// Line the body starts on.
    pub body_line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Chunk<'a> {
    Block(RawBlock<'a>),
    /// Non-blank text between or after blocks, trimmed.
    Text {
        start_line: usize,
        end_line: usize,
        text: &'a str,
    },
    Failed {
        start_line: usize,
        end_line: usize,
        raw: &'a str,
        error: BlockError,
    },
}

struct BlockStart<'a> {
    at: usize,
    type_token: &'a str,
    open: usize,
    delimiter: u8,
}

struct Splitter<'a> {
    input: &'a str,
    bytes: &'a [u8],
    line_starts: Vec<usize>,
}

/// Split `input` into chunks in document order.
///
/// Text before the first block is dropped (logged at debug level).
pub fn split(input: &str) -> Vec<Chunk<'_>> {
    let splitter = Splitter::new(input);
    let mut chunks = Vec::new();
    let mut pos = 0;
    let mut seen_block = false;

    while let Some(start) = splitter.next_block_start(pos) {
        splitter.push_text(pos, start.at, seen_block, &mut chunks);
        seen_block = true;
        let (chunk, next) = splitter.scan_block(&start);
        chunks.push(chunk);
        pos = next;
    }
    splitter.push_text(pos, input.len(), seen_block, &mut chunks);

    chunks
}

impl<'a> Splitter<'a> {
    fn new(input: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(input.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            input,
            bytes: input.as_bytes(),
            line_starts,
        }
    }

    // 1-based line of byte offset `pos`.
    fn line_of(&self, pos: usize) -> usize {
        self.line_starts.partition_point(|&start| start <= pos)
    }

    fn push_text(&self, from: usize, to: usize, seen_block: bool, chunks: &mut Vec<Chunk<'a>>) {
        let slice = &self.input[from..to];
        let text = slice.trim();
        if text.is_empty() {
            return;
        }
        if !seen_block {
            tracing::debug!("Discarding {} bytes of text before the first block", text.len());
            return;
        }
        let offset = from + (slice.len() - slice.trim_start().len());
        chunks.push(Chunk::Text {
            start_line: self.line_of(offset),
            end_line: self.line_of(offset + text.len() - 1),
            text,
        });
    }

    fn next_block_start(&self, from: usize) -> Option<BlockStart<'a>> {
        (from..self.bytes.len())
            .filter(|&i| self.bytes[i] == b'@')
            .find_map(|i| self.block_start_at(i))
    }

    // `@`, optional whitespace, a type token, optional whitespace, `{` or `(`.
    fn block_start_at(&self, at: usize) -> Option<BlockStart<'a>> {
        let skip_white = |mut i: usize| {
            while i < self.bytes.len() && self.bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            i
        };

        let type_start = skip_white(at + 1);
        let mut type_end = type_start;
        while type_end < self.bytes.len() && is_type_byte(self.bytes[type_end]) {
            type_end += 1;
        }
        if type_end == type_start {
            return None;
        }

        let open = skip_white(type_end);
        match self.bytes.get(open) {
            Some(&delimiter @ (b'{' | b'(')) => Some(BlockStart {
                at,
                type_token: &self.input[type_start..type_end],
                open,
                delimiter,
            }),
            _ => None,
        }
    }

    // Returns the chunk and the offset to resume scanning from.
    fn scan_block(&self, start: &BlockStart<'a>) -> (Chunk<'a>, usize) {
        let kind = match start.type_token.to_ascii_lowercase().as_str() {
            "string" => RawKind::String,
            "preamble" => RawKind::Preamble,
            "comment" => RawKind::Comment,
            _ => RawKind::Entry(start.type_token),
        };
        // Comment bodies are raw text: quotes and `@` mean nothing there.
        let raw_body = kind == RawKind::Comment;
        let closer = if start.delimiter == b'{' { b'}' } else { b')' };

        let mut depth = 0usize;
        let mut in_quote = false;
        // Only blanks so far on the current line.
        let mut line_start = false;
        // First block start that began a line while nested, used if the block never closes.
        let mut fallback = None;
        let mut i = start.open + 1;
        while i < self.bytes.len() {
            let byte = self.bytes[i];
            match byte {
                b'{' => depth += 1,
                b'}' if depth > 0 => depth -= 1,
                b'}' if closer == b'}' && !in_quote => return (self.block(start, kind, i), i + 1),
                b'}' => {
                    let error = BlockError::UnmatchedClosingBrace {
                        line: self.line_of(i),
                    };
                    return self.fail_or_fall_back(start, fallback, i + 1, error);
                }
                b')' if closer == b')' && depth == 0 && !in_quote => {
                    return (self.block(start, kind, i), i + 1)
                }
                b'"' if depth == 0 && !raw_body => in_quote = !in_quote,
                b'@' if !raw_body && self.block_start_at(i).is_some() => {
                    if depth == 0 && !in_quote {
                        let error = self.unterminated(start, Boundary::NextBlock);
                        return (self.failed(start.at, i, error), i);
                    }
                    if line_start && fallback.is_none() {
                        fallback = Some(i);
                    }
                }
                _ => {}
            }
            line_start = match byte {
                b'\n' => true,
                b if b.is_ascii_whitespace() => line_start,
                _ => false,
            };
            i += 1;
        }

        let error = self.unterminated(start, Boundary::EndOfInput);
        self.fail_or_fall_back(start, fallback, self.bytes.len(), error)
    }

    fn unterminated(&self, start: &BlockStart<'a>, boundary: Boundary) -> BlockError {
        BlockError::Unterminated {
            delimiter: start.delimiter as char,
            line: self.line_of(start.open),
            boundary,
        }
    }

    // A block that cannot close ends at the first line-start block inside it, if any.
    fn fail_or_fall_back(
        &self,
        start: &BlockStart<'a>,
        fallback: Option<usize>,
        end: usize,
        error: BlockError,
    ) -> (Chunk<'a>, usize) {
        match fallback {
            Some(at) => {
                let error = self.unterminated(start, Boundary::NextBlock);
                (self.failed(start.at, at, error), at)
            }
            None => (self.failed(start.at, end, error), end),
        }
    }

    fn block(&self, start: &BlockStart<'a>, kind: RawKind<'a>, close: usize) -> Chunk<'a> {
        Chunk::Block(RawBlock {
            kind,
            start_line: self.line_of(start.at),
            end_line: self.line_of(close),
            raw: &self.input[start.at..=close],
            body: &self.input[start.open + 1..close],
            body_line: self.line_of(start.open),
        })
    }

    fn failed(&self, from: usize, to: usize, error: BlockError) -> Chunk<'a> {
        let raw = self.input[from..to].trim_end();
        tracing::warn!("Failed to split block at line {}: {}", self.line_of(from), error);
        Chunk::Failed {
            start_line: self.line_of(from),
            end_line: self.line_of(from + raw.len().saturating_sub(1)),
            raw,
            error,
        }
    }
}

fn is_type_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b':' | b'.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks<'a>(chunks: &'a [Chunk<'a>]) -> Vec<&'a RawBlock<'a>> {
        chunks
            .iter()
            .filter_map(|c| match c {
                Chunk::Block(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_split_recognizes_block_types() {
        let input = r#"
@String{jphys = "Journal of Physics"}
@preamble{"\newcommand{\noop}[1]{}"}
@comment{ignore me}
@Article(key, title = {T})
"#;
        let chunks = split(input);
        let kinds: Vec<_> = blocks(&chunks).iter().map(|b| b.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                RawKind::String,
                RawKind::Preamble,
                RawKind::Comment,
                RawKind::Entry("Article")
            ]
        );
        let article = blocks(&chunks)[3];
        assert_eq!(article.body, "key, title = {T}");
        assert_eq!(article.start_line, 5);
    }

    #[test]
    fn test_braces_and_quotes_do_not_end_block() {
        let input = "@misc{k, title = {a {nested} b}, note = \"x {y} z\"}";
        let chunks = split(input);
        assert_eq!(chunks.len(), 1);
        assert_eq!(blocks(&chunks)[0].body, "k, title = {a {nested} b}, note = \"x {y} z\"");
    }

    #[test]
    fn test_closing_brace_inside_quotes_fails() {
        let chunks = split("@misc{k, note = \"x } \"}");
        assert!(matches!(
            chunks[0],
            Chunk::Failed {
                error: BlockError::UnmatchedClosingBrace { line: 1 },
                ..
            }
        ));
    }

    #[test]
    fn test_text_before_first_block_is_dropped() {
        let input = "This file was exported.\n\n@misc{a}\nbetween\n@misc{b}\ntrailer";
        let chunks = split(input);
        assert_eq!(chunks.len(), 4);
        assert!(matches!(chunks[1], Chunk::Text { text: "between", start_line: 4, .. }));
        assert!(matches!(chunks[3], Chunk::Text { text: "trailer", .. }));
    }

    #[test]
    fn test_at_sign_in_text_is_not_a_block() {
        let input = "@misc{a}\nmail me at someone@example.org\n@misc{b, email = {x@y.z}}";
        let chunks = split(input);
        assert_eq!(blocks(&chunks).len(), 2);
        assert!(matches!(chunks[1], Chunk::Text { .. }));
    }

    #[test]
    fn test_unterminated_block_is_contained() {
        let input = "@article{a, title = {Open\n\n@book{b, title = {Fine}}\n";
        let chunks = split(input);
        assert_eq!(chunks.len(), 2);
        match &chunks[0] {
            Chunk::Failed { raw, error, .. } => {
                assert_eq!(*raw, "@article{a, title = {Open");
                assert_eq!(
                    *error,
                    BlockError::Unterminated {
                        delimiter: '{',
                        line: 1,
                        boundary: Boundary::NextBlock
                    }
                );
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(blocks(&chunks)[0].body, "b, title = {Fine}");
    }

    #[test]
    fn test_unterminated_at_end_of_input() {
        let chunks = split("@misc{a}
@article{b, title = {Open");
        assert_eq!(chunks.len(), 2);
        assert!(matches!(
            &chunks[1],
            Chunk::Failed {
                error: BlockError::Unterminated { boundary: Boundary::EndOfInput, .. },
                start_line: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_unclosed_entry_stops_at_next_block() {
        let input = "@article{a, title = \"Open\n@book{b, title = {Fine}}";
        let chunks = split(input);
        assert_eq!(chunks.len(), 2);
        assert!(matches!(chunks[0], Chunk::Failed { .. }));

        let input = "@article{a, title = {Fine}\n@book{b, title = {Fine}}";
        let chunks = split(input);
        assert_eq!(chunks.len(), 2);
        assert!(matches!(
            &chunks[0],
            Chunk::Failed {
                error: BlockError::Unterminated { boundary: Boundary::NextBlock, .. },
                end_line: 1,
                ..
            }
        ));
        assert_eq!(blocks(&chunks)[0].body, "b, title = {Fine}");
    }

    #[test]
    fn test_at_sign_mid_line_inside_braces_is_content() {
        let chunks = split("@misc{a, note = {see @book{x} here}}");
        assert_eq!(chunks.len(), 1);
        assert_eq!(blocks(&chunks)[0].body, "a, note = {see @book{x} here}");
    }

    #[test]
    fn test_line_start_at_sign_inside_closed_block_is_content() {
        let input = "@misc{k,\n  note = {Java example:\n@SuppressWarnings(\"x\")\n  end}\n}\n@misc{next}";
        let chunks = split(input);
        assert_eq!(chunks.len(), 2);
        let block = blocks(&chunks)[0];
        assert!(block.body.contains("\n@SuppressWarnings(\"x\")\n"));
        assert_eq!((block.start_line, block.end_line), (1, 5));
        assert_eq!(blocks(&chunks)[1].body, "next");
    }

    #[test]
    fn test_unclosed_block_falls_back_to_first_line_start() {
        let input = "@misc{a, note = {Open\n  @book{b, title = {B}}\n@book{c, title = {C}}\n";
        let chunks = split(input);
        assert_eq!(chunks.len(), 3);
        assert!(matches!(
            &chunks[0],
            Chunk::Failed {
                raw: "@misc{a, note = {Open",
                error: BlockError::Unterminated { boundary: Boundary::NextBlock, .. },
                ..
            }
        ));
        let keys: Vec<_> = blocks(&chunks).iter().map(|b| b.body).collect();
        assert_eq!(keys, vec!["b, title = {B}", "c, title = {C}"]);
    }

    #[test]
    fn test_stray_closer_in_quotes_falls_back() {
        // The quote never closes, so the `}` of the next block is stray.
        let chunks = split("@misc{a, note = \"Open\n@misc{b, note = {B}}");
        assert_eq!(chunks.len(), 2);
        assert!(matches!(
            chunks[0],
            Chunk::Failed {
                error: BlockError::Unterminated { boundary: Boundary::NextBlock, .. },
                ..
            }
        ));
        assert_eq!(blocks(&chunks)[0].body, "b, note = {B}");
    }

    #[test]
    fn test_delimiters_must_match() {
        let chunks = split("@misc(a, title = {x})");
        assert_eq!(blocks(&chunks)[0].body, "a, title = {x}");

        let chunks = split("@misc(a, title = x}");
        assert!(matches!(chunks[0], Chunk::Failed { .. }));

        // `)` does not close a brace-delimited block.
        let chunks = split("@misc{a, note = {(x)}, title = y)}");
        assert_eq!(blocks(&chunks)[0].body, "a, note = {(x)}, title = y)");
    }

    #[test]
    fn test_comment_body_is_raw() {
        let chunks = split("@comment{see @article{x} and \"quotes}");
        let block = blocks(&chunks)[0];
        assert_eq!(block.kind, RawKind::Comment);
        assert_eq!(block.body, "see @article{x} and \"quotes");
    }

    #[test]
    fn test_line_numbers() {
        let input = "\n\n@misc{a,\n  title = {x}\n}\n";
        let chunks = split(input);
        let block = blocks(&chunks)[0];
        assert_eq!((block.start_line, block.end_line, block.body_line), (3, 5, 3));
    }
}
