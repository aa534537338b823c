//! Personal name decomposition
//!
//! Splits one BibTeX name into its first, von, last and jr parts, following BibTeX's
//! rules: the number of top-level commas picks the form (`First von Last`,
//! `von Last, First` or `von Last, Jr, First`), and the von part is found by looking at
//! the case of each word's first letter. Brace groups are opaque words and are skipped
//! when determining case, unless they start with a control sequence like `{\'e}`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("unterminated brace group in name `{0}`")]
    UnterminatedBrace(String),
    #[error("unmatched closing brace in name `{0}`")]
    UnmatchedBrace(String),
    #[error("too many commas in name `{0}`")]
    TooManyCommas(String),
}

/// A name split into its four parts, each a sequence of words.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedName {
    pub first: Vec<String>,
    pub von: Vec<String>,
    pub last: Vec<String>,
    pub jr: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Case {
    Lower,
    Upper,
    Unknown,
}

impl ParsedName {
    /// Decompose `raw`. In strict mode unbalanced braces and more than two commas are
    /// errors; otherwise unterminated groups are closed, stray `}` dropped and extra
    /// comma-separated segments folded into the first name.
    pub fn parse(raw: &str, strict: bool) -> Result<ParsedName, NameError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(ParsedName::default());
        }

        // Corporate authors and the like: `{Barnes and Noble}` is never decomposed.
        if is_fully_braced(trimmed) {
            return Ok(ParsedName {
                last: vec![trimmed.to_string()],
                ..ParsedName::default()
            });
        }

        let mut segments = tokenize(trimmed, strict)?;
        if segments.len() > 3 {
            if strict {
                return Err(NameError::TooManyCommas(trimmed.to_string()));
            }
            let extra = segments.split_off(3);
            segments[2].extend(extra.into_iter().flatten());
        }

        let mut segments = segments.into_iter();
        let name = match (segments.next(), segments.next(), segments.next()) {
            (Some(words), None, None) => first_von_last(words),
            (Some(von_last), Some(first), None) => {
                let (von, last) = split_von_last(von_last);
                ParsedName {
                    first,
                    von,
                    last,
                    jr: Vec::new(),
                }
            }
            (Some(von_last), Some(jr), Some(first)) => {
                let (von, last) = split_von_last(von_last);
                ParsedName {
                    first,
                    von,
                    last,
                    jr,
                }
            }
            _ => ParsedName::default(),
        };
        Ok(name)
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_empty() && self.von.is_empty() && self.last.is_empty() && self.jr.is_empty()
    }

    /// `First von Last, Jr`
    pub fn merge_first_name_first(&self) -> String {
        let mut out = self
            .first
            .iter()
            .chain(&self.von)
            .chain(&self.last)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        if !self.jr.is_empty() {
            out.push_str(", ");
            out.push_str(&self.jr.join(" "));
        }
        out
    }

    /// `von Last, Jr, First`, which parses back to the same parts.
    pub fn merge_last_name_first(&self) -> String {
        let mut out = self
            .von
            .iter()
            .chain(&self.last)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        if !self.jr.is_empty() {
            out.push_str(", ");
            out.push_str(&self.jr.join(" "));
            out.push(',');
            if !self.first.is_empty() {
                out.push(' ');
                out.push_str(&self.first.join(" "));
            }
        } else if !self.first.is_empty() {
            out.push_str(", ");
            out.push_str(&self.first.join(" "));
        }
        out
    }
}

/// Split an author field on the word `and` at brace depth zero.
///
/// Whitespace inside each name is normalized to single spaces; empty names are dropped.
pub fn split_coauthors(field: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut current: Vec<String> = Vec::new();
    for word in top_level_words(field) {
        if word.eq_ignore_ascii_case("and") {
            if !current.is_empty() {
                names.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(word);
        }
    }
    if !current.is_empty() {
        names.push(current.join(" "));
    }
    names
}

// Whitespace-separated words at depth zero; separators inside braces are kept.
fn top_level_words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '{' => {
                depth += 1;
                word.push(c);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                word.push(c);
            }
            c if depth == 0 && c.is_whitespace() => {
                if !word.is_empty() {
                    words.push(std::mem::take(&mut word));
                }
            }
            c => word.push(c),
        }
    }
    if !word.is_empty() {
        words.push(word);
    }
    words
}

// Comma-separated segments of words. Words are split on whitespace and `~` at depth zero.
fn tokenize(name: &str, strict: bool) -> Result<Vec<Vec<String>>, NameError> {
    let mut segments: Vec<Vec<String>> = vec![Vec::new()];
    let mut word = String::new();
    let mut depth = 0usize;

    fn flush(word: &mut String, segments: &mut [Vec<String>]) {
        if !word.is_empty() {
            if let Some(segment) = segments.last_mut() {
                segment.push(std::mem::take(word));
            }
        }
    }

    for c in name.chars() {
        match c {
            '{' => {
                depth += 1;
                word.push(c);
            }
            '}' => {
                if depth == 0 {
                    if strict {
                        return Err(NameError::UnmatchedBrace(name.to_string()));
                    }
                    continue;
                }
                depth -= 1;
                word.push(c);
            }
            ',' if depth == 0 => {
                flush(&mut word, &mut segments);
                segments.push(Vec::new());
            }
            c if depth == 0 && (c.is_whitespace() || c == '~') => {
                flush(&mut word, &mut segments);
            }
            c => word.push(c),
        }
    }

    if depth > 0 {
        if strict {
            return Err(NameError::UnterminatedBrace(name.to_string()));
        }
        word.extend(std::iter::repeat('}').take(depth));
    }
    flush(&mut word, &mut segments);
    Ok(segments)
}

fn first_von_last(mut words: Vec<String>) -> ParsedName {
    let n = words.len();
    if n <= 1 {
        return ParsedName {
            last: words,
            ..ParsedName::default()
        };
    }

    // The final word always belongs to the last name, so it never starts a von part.
    let lower: Vec<usize> = (0..n - 1)
        .filter(|&i| word_case(&words[i]) == Case::Lower)
        .collect();

    match (lower.first(), lower.last()) {
        (Some(&start), Some(&end)) => {
            let last = words.split_off(end + 1);
            let von = words.split_off(start);
            ParsedName {
                first: words,
                von,
                last,
                jr: Vec::new(),
            }
        }
        _ => {
            let last = words.split_off(n - 1);
            ParsedName {
                first: words,
                von: Vec::new(),
                last,
                jr: Vec::new(),
            }
        }
    }
}

// Inside the `von Last` segment: von runs up to the last lower-case word that is not the
// segment's final word.
fn split_von_last(mut words: Vec<String>) -> (Vec<String>, Vec<String>) {
    let n = words.len();
    if n == 0 {
        return (Vec::new(), Vec::new());
    }
    match (0..n - 1).rev().find(|&i| word_case(&words[i]) == Case::Lower) {
        Some(end) => {
            let last = words.split_off(end + 1);
            (words, last)
        }
        None => (Vec::new(), words),
    }
}

fn is_fully_braced(name: &str) -> bool {
    if !name.starts_with('{') || !name.ends_with('}') {
        return false;
    }
    let mut depth = 0usize;
    let last = name.len() - 1;
    for (i, c) in name.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = match depth.checked_sub(1) {
                    Some(d) => d,
                    None => return false,
                };
                if depth == 0 {
                    return i == last;
                }
            }
            _ => {}
        }
    }
    false
}

// Case of the first letter at depth zero. A brace group starting with a control sequence
// decides by that sequence; any other brace group is skipped.
fn word_case(word: &str) -> Case {
    let chars: Vec<char> = word.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '{' {
            let end = group_end(&chars, i);
            let inner = &chars[i + 1..end.min(chars.len())];
            if inner.first() == Some(&'\\') {
                let case = control_sequence_case(inner);
                if case != Case::Unknown {
                    return case;
                }
            }
            i = end + 1;
            continue;
        }
        if c.is_lowercase() {
            return Case::Lower;
        }
        if c.is_uppercase() {
            return Case::Upper;
        }
        i += 1;
    }
    Case::Unknown
}

// Index of the `}` closing the group opened at `open`, or the slice length if unterminated.
fn group_end(chars: &[char], open: usize) -> usize {
    let mut depth = 0usize;
    for (i, &c) in chars.iter().enumerate().skip(open) {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return i;
                }
            }
            _ => {}
        }
    }
    chars.len()
}

// `inner` starts with a backslash. A few control sequences are letters with a known case;
// otherwise the first letter after the sequence decides.
fn control_sequence_case(inner: &[char]) -> Case {
    let name_len = inner[1..]
        .iter()
        .take_while(|c| c.is_ascii_alphabetic())
        .count();
    let name: String = inner[1..=name_len].iter().collect();
    match name.as_str() {
        "OE" | "AE" | "AA" | "O" | "L" => return Case::Upper,
        "i" | "j" | "oe" | "ae" | "aa" | "o" | "l" | "ss" => return Case::Lower,
        _ => {}
    }
    for &c in &inner[1 + name_len..] {
        if c.is_lowercase() {
            return Case::Lower;
        }
        if c.is_uppercase() {
            return Case::Upper;
        }
    }
    Case::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parts(name: &str) -> (String, String, String, String) {
        let parsed = ParsedName::parse(name, true).unwrap();
        (
            parsed.first.join(" "),
            parsed.von.join(" "),
            parsed.last.join(" "),
            parsed.jr.join(" "),
        )
    }

    #[rstest]
    #[case("Jean de La Fontaine", "Jean", "de", "La Fontaine", "")]
    #[case("von Beethoven, Ludwig", "Ludwig", "von", "Beethoven", "")]
    #[case("Robert", "", "", "Robert", "")]
    #[case("{Corporate Name}", "", "", "{Corporate Name}", "")]
    #[case("AA BB", "AA", "", "BB", "")]
    #[case("AA", "", "", "AA", "")]
    #[case("AA bb", "AA", "", "bb", "")]
    #[case("aa", "", "", "aa", "")]
    #[case("AA bb CC", "AA", "bb", "CC", "")]
    #[case("AA bb CC dd EE", "AA", "bb CC dd", "EE", "")]
    #[case("AA 1B cc dd", "AA 1B", "cc", "dd", "")]
    #[case("AA 1b cc dd", "AA", "1b cc", "dd", "")]
    #[case("AA {b}B cc dd", "AA {b}B", "cc", "dd", "")]
    #[case("AA {b}b cc dd", "AA", "{b}b cc", "dd", "")]
    #[case("AA {B}b cc dd", "AA", "{B}b cc", "dd", "")]
    #[case("AA \\bb{b} cc dd", "AA", "\\bb{b} cc", "dd", "")]
    #[case("AA {bb} cc DD", "AA {bb}", "cc", "DD", "")]
    #[case("AA bb {cc} DD", "AA", "bb", "{cc} DD", "")]
    #[case("bb CC, AA", "AA", "bb", "CC", "")]
    #[case("bb CC, aa", "aa", "bb", "CC", "")]
    #[case("bb CC dd EE, AA", "AA", "bb CC dd", "EE", "")]
    #[case("bb, AA", "AA", "", "bb", "")]
    #[case("BB,", "", "", "BB", "")]
    #[case("bb CC, XX, AA", "AA", "bb", "CC", "XX")]
    #[case("bb CC, xx, AA", "AA", "bb", "CC", "xx")]
    #[case("Martin Luther King, Jr.", "Jr.", "", "Martin Luther King", "")]
    #[case("King, Jr., Martin Luther", "Martin Luther", "", "King", "Jr.")]
    #[case("Charles Louis Xavier Joseph de la Vall{\\'e}e Poussin", "Charles Louis Xavier Joseph", "de la", "Vall{\\'e}e Poussin", "")]
    #[case("Ludwig~van Beethoven", "Ludwig", "van", "Beethoven", "")]
    #[case("{\\'E}mile Zola", "{\\'E}mile", "", "Zola", "")]
    #[case("AA {\\'e}mile Zola", "AA", "{\\'e}mile", "Zola", "")]
    fn test_name_parts(
        #[case] input: &str,
        #[case] first: &str,
        #[case] von: &str,
        #[case] last: &str,
        #[case] jr: &str,
    ) {
        assert_eq!(
            parts(input),
            (first.to_string(), von.to_string(), last.to_string(), jr.to_string())
        );
    }

    #[test]
    fn test_fully_braced_name_is_not_decomposed() {
        let parsed = ParsedName::parse("  {Barnes and Noble, Inc.}  ", true).unwrap();
        assert_eq!(parsed.last, vec!["{Barnes and Noble, Inc.}"]);
        assert!(parsed.first.is_empty() && parsed.von.is_empty() && parsed.jr.is_empty());

        // Two groups are not one enclosing group.
        let parsed = ParsedName::parse("{Barnes} {Noble}", true).unwrap();
        assert_eq!(parsed.first, vec!["{Barnes}"]);
        assert_eq!(parsed.last, vec!["{Noble}"]);
    }

    #[test]
    fn test_empty_name() {
        assert!(ParsedName::parse("   ", true).unwrap().is_empty());
    }

    #[test]
    fn test_strict_errors() {
        assert!(matches!(
            ParsedName::parse("A, B, C, D", true),
            Err(NameError::TooManyCommas(_))
        ));
        assert!(matches!(
            ParsedName::parse("A {B", true),
            Err(NameError::UnterminatedBrace(_))
        ));
        assert!(matches!(
            ParsedName::parse("A B}", true),
            Err(NameError::UnmatchedBrace(_))
        ));
    }

    #[test]
    fn test_lenient_recovery() {
        let parsed = ParsedName::parse("Last, Jr, First, Extra", false).unwrap();
        assert_eq!(parsed.first, vec!["First", "Extra"]);
        assert_eq!(parsed.jr, vec!["Jr"]);
        assert_eq!(parsed.last, vec!["Last"]);

        let parsed = ParsedName::parse("Ada {Love", false).unwrap();
        assert_eq!(parsed.last, vec!["{Love}"]);

        let parsed = ParsedName::parse("Ada} Lovelace", false).unwrap();
        assert_eq!(parsed.first, vec!["Ada"]);
        assert_eq!(parsed.last, vec!["Lovelace"]);
    }

    #[test]
    fn test_merge_round_trips() {
        for raw in [
            "Jean de La Fontaine",
            "von Beethoven, Ludwig",
            "King, Jr., Martin Luther",
            "Robert",
            "Ford, Jr.,",
        ] {
            let parsed = ParsedName::parse(raw, true).unwrap();
            let merged = parsed.merge_last_name_first();
            assert_eq!(ParsedName::parse(&merged, true).unwrap(), parsed, "{raw} -> {merged}");
        }
    }

    #[test]
    fn test_merge_first_name_first() {
        let parsed = ParsedName::parse("King, Jr., Martin Luther", true).unwrap();
        assert_eq!(parsed.merge_first_name_first(), "Martin Luther King, Jr.");
        let parsed = ParsedName::parse("von Beethoven, Ludwig", true).unwrap();
        assert_eq!(parsed.merge_first_name_first(), "Ludwig von Beethoven");
        assert_eq!(parsed.merge_last_name_first(), "von Beethoven, Ludwig");
    }

    #[test]
    fn test_split_coauthors() {
        assert_eq!(
            split_coauthors("AA BB and CC DD"),
            vec!["AA BB".to_string(), "CC DD".to_string()]
        );
        assert_eq!(split_coauthors("AA Andy BB and CC DD").len(), 2);
        assert_eq!(
            split_coauthors("{Barnes and Noble} AND Smith, John"),
            vec!["{Barnes and Noble}".to_string(), "Smith, John".to_string()]
        );
        assert!(split_coauthors("").is_empty());
        assert_eq!(split_coauthors("Sand\n  and\tSandy"), vec!["Sand", "Sandy"]);
    }
}
