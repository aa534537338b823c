//! Parse/write integration tests

mod common;

use bibflow::model::{BlockError, MetadataOwner, ReferenceState, ResolutionFailure};
use bibflow::{
    parse_str, parse_with, write_string, write_with, BibflowConfig, BibflowError, DefaultStack,
    Library, LibraryMiddleware, MiddlewareError, Pipeline, Value, WriterConfig,
};
use common::fixtures::{fixture_path, load_bibtex_fixture};
use common::init_tracing;
use proptest::prelude::*;
use rstest::rstest;

fn field<'a>(library: &'a Library, key: &str, name: &str) -> &'a Value {
    library
        .get_entry(key)
        .and_then(|entry| entry.get(name))
        .unwrap_or_else(|| panic!("missing {}.{}", key, name))
}

// === Round trip ===

#[rstest]
#[case("simple.bib")]
#[case("strings.bib")]
fn test_default_stacks_round_trip(#[case] fixture: &str) {
    init_tracing();
    let input = load_bibtex_fixture(fixture);
    let config = BibflowConfig::default();

    let library = parse_str(&input, &config).unwrap();
    assert_eq!(library.failed_blocks().count(), 0);
    let output = write_string(library, &config).unwrap();
    assert_eq!(output, input);
}

#[test]
fn test_parse_resolves_and_strips_delimiters() {
    let library = parse_str(&load_bibtex_fixture("simple.bib"), &BibflowConfig::default()).unwrap();

    assert_eq!(library.entries().count(), 2);
    assert_eq!(library.preambles().count(), 1);
    assert_eq!(library.comments().count(), 1);
    assert_eq!(
        field(&library, "Einstein1905", "journal"),
        &Value::resolved("Annalen der Physik")
    );
    assert_eq!(field(&library, "Einstein1905", "month"), &Value::resolved("June"));
    assert_eq!(field(&library, "Knuth1984", "title"), &Value::resolved("The {\\TeX}book"));
}

#[test]
fn test_edits_are_written_with_default_delimiters() {
    let config = BibflowConfig::default();
    let mut library = parse_str(&load_bibtex_fixture("simple.bib"), &config).unwrap();

    let index = library
        .blocks()
        .iter()
        .position(|block| block.key() == Some("Knuth1984"))
        .unwrap();
    let mut block = library.get(index).cloned().unwrap();
    if let Some(entry) = block.as_entry_mut() {
        entry.set("title", Value::resolved("The METAFONTbook"));
        entry.set("edition", Value::resolved("2"));
    }
    library.replace(index, block).unwrap();

    let output = write_string(library, &config).unwrap();
    assert!(output.contains("    title = {The METAFONTbook},\n"));
    assert!(output.contains("    edition = 2\n"));
    // Untouched values keep their original delimiters.
    assert!(output.contains("    year = {1984},\n"));
}

// === String references ===

#[test]
fn test_string_cycles_and_shadowed_months() {
    let library = parse_str(&load_bibtex_fixture("strings.bib"), &BibflowConfig::default()).unwrap();

    assert_eq!(field(&library, "cycle", "publisher"), &Value::resolved("Springer Verlag"));
    assert_eq!(field(&library, "cycle", "month"), &Value::resolved("Janvier"));

    let note = field(&library, "cycle", "note");
    assert_eq!(
        note.references()[0].state,
        ReferenceState::Failed(ResolutionFailure::Circular)
    );
    let undefined = field(&library, "cycle", "howpublished");
    assert_eq!(
        undefined.references()[0].state,
        ReferenceState::Failed(ResolutionFailure::Undefined)
    );
}

// === Failure containment ===

#[test]
fn test_malformed_blocks_are_isolated() {
    init_tracing();
    let input = load_bibtex_fixture("malformed.bib");
    let library = parse_str(&input, &BibflowConfig::default()).unwrap();

    let keys: Vec<&str> = library.entries().map(|entry| entry.key.as_str()).collect();
    assert_eq!(keys, vec!["good1", "good2", "good3"]);

    let failed: Vec<_> = library.failed_blocks().collect();
    assert_eq!(failed.len(), 2);
    assert!(failed[0].span.raw.contains("{Unclosed"));
    assert!(matches!(
        failed[1].as_failed().map(|f| &f.error),
        Some(BlockError::Field { .. })
    ));
    assert_eq!(failed[1].span.start_line, 11);
}

#[test]
fn test_line_start_at_sign_inside_value() {
    let input = "@misc{k,\n    note = {Java example:\n@SuppressWarnings(\"x\")\n  end}\n}\n";
    let config = BibflowConfig::default();
    let library = parse_str(input, &config).unwrap();

    assert_eq!(library.failed_blocks().count(), 0);
    assert_eq!(
        field(&library, "k", "note"),
        &Value::resolved("Java example:\n@SuppressWarnings(\"x\")\n  end")
    );
    assert_eq!(write_string(library, &config).unwrap(), input);
}

#[test]
fn test_failed_blocks_written_verbatim() {
    let mut config = BibflowConfig::default();
    config.writer.failed_block_comment = Some("% could not parse:".to_string());
    let library = parse_str(&load_bibtex_fixture("malformed.bib"), &config).unwrap();
    let output = write_string(library, &config).unwrap();

    assert!(output.contains("% could not parse:\n@misc{missing_comma, title = {x} year = 2001}"));
    assert!(output.contains("    title = {Unclosed\n"));
    assert!(output.contains("@article{good2,\n    title = {Also fine}\n}"));
}

// === Names ===

#[test]
fn test_names_from_toml_config() {
    let config = BibflowConfig::from_toml(
        r#"
[parse]
stack = "parse-v1"

[[parse.stages]]
kind = "split-name-parts"
fields = ["author", "editor"]

[write]

[[write.stages]]
kind = "merge-name-parts"

[[write.stages]]
kind = "merge-co-authors"

[[write.stages]]
kind = "add-enclosing"
"#,
    )
    .unwrap();

    let library = parse_str(&load_bibtex_fixture("names.bib"), &config).unwrap();
    let names = |key: &str, name: &str| match field(&library, key, name) {
        Value::Names(names) => names.clone(),
        other => panic!("expected names, got {:?}", other),
    };

    let fontaine = &names("fontaine", "author")[0];
    assert_eq!(fontaine.first, vec!["Jean"]);
    assert_eq!(fontaine.von, vec!["de"]);
    assert_eq!(fontaine.last, vec!["La", "Fontaine"]);

    let beethoven = &names("beethoven", "author")[0];
    assert_eq!(beethoven.von, vec!["von"]);
    assert_eq!(beethoven.last, vec!["Beethoven"]);
    assert_eq!(beethoven.first, vec!["Ludwig"]);

    let robert = &names("robert", "author")[0];
    assert!(robert.first.is_empty());
    assert_eq!(robert.last, vec!["Robert"]);

    assert_eq!(names("corporate", "author")[0].last, vec!["{Corporate Name}"]);

    let many = names("many", "author");
    assert_eq!(many.len(), 3);
    assert_eq!(many[2].last, vec!["{Barnes and Noble}"]);

    let king = &names("king", "editor")[0];
    assert_eq!(king.jr, vec!["Jr."]);
    assert_eq!(king.first, vec!["Martin", "Luther"]);

    let output = write_string(library, &config).unwrap();
    assert!(output.contains("@book{fontaine,\n    author = {de La Fontaine, Jean}\n}"));
    assert!(output.contains("author = {Lovelace, Ada and Babbage, Charles and {Barnes and Noble}}"));
    assert!(output.contains("editor = {King, Jr., Martin Luther}"));
}

// === Configuration files ===

#[test]
fn test_load_config_files() {
    let dir = tempfile::tempdir().unwrap();

    let toml_path = dir.path().join("bibflow.toml");
    std::fs::write(&toml_path, "[writer]\nindent = \"\\t\"\ntrailing_comma = true\n").unwrap();
    let config = BibflowConfig::load(&toml_path).unwrap();
    assert_eq!(config.writer.indent, "\t");
    assert!(config.writer.trailing_comma);

    let json_path = dir.path().join("bibflow.json");
    std::fs::write(&json_path, config.to_json().unwrap()).unwrap();
    assert_eq!(BibflowConfig::load(&json_path).unwrap(), config);

    let library = parse_str("@misc{k, note = {x}}", &config).unwrap();
    assert_eq!(
        write_string(library, &config).unwrap(),
        "@misc{k,\n\tnote = {x},\n}\n"
    );

    assert!(BibflowConfig::load(dir.path().join("missing.toml")).is_err());
}

#[test]
fn test_fixture_path() {
    assert!(fixture_path("bibtex/simple.bib").exists());
}

// === Library-wide failures ===

struct AlwaysFails;

impl MetadataOwner for AlwaysFails {
    fn metadata_key(&self) -> &'static str {
        "always_fails"
    }
}

impl LibraryMiddleware for AlwaysFails {
    fn name(&self) -> &'static str {
        "always_fails"
    }

    fn transform(&self, _library: Library) -> Result<Library, MiddlewareError> {
        Err(MiddlewareError::Message("no".to_string()))
    }
}

#[test]
fn test_library_stage_failure_returns_previous_library() {
    let pipeline = DefaultStack::ParseV1.pipeline().with_library(AlwaysFails);
    let err = parse_with("@string{s = {S}}\n@misc{k, note = s}", &pipeline).unwrap_err();
    assert!(err.to_string().contains("always_fails"));

    let library = err.into_library().unwrap();
    // Stages before the failing one did run.
    assert_eq!(field(&library, "k", "note"), &Value::resolved("S"));
}

#[test]
fn test_write_with_explicit_pipeline() {
    let library = parse_with("@misc{k, year = 2001}", &Pipeline::new()).unwrap();
    let writer = WriterConfig {
        indent: "  ".into(),
        ..WriterConfig::default()
    };
    let output = write_with(library, &Pipeline::new(), &writer).unwrap();
    assert_eq!(output, "@misc{k,\n  year = 2001\n}\n");
}

#[test]
fn test_invalid_config_is_an_error() {
    let mut config = BibflowConfig::default();
    config.parse.stack = Some("nope".to_string());
    assert!(matches!(
        parse_str("@misc{k}", &config),
        Err(BibflowError::Config(_))
    ));
}

// === Property-Based Tests ===

fn word() -> impl Strategy<Value = String> {
    "[A-Za-z][a-z]{0,8}"
}

// One value as written: braced, quoted or bare-number tokens joined by `#`.
fn written_value() -> impl Strategy<Value = String> {
    let token = prop_oneof![
        prop::collection::vec(word(), 1..5).prop_map(|words| format!("{{{}}}", words.join(" "))),
        prop::collection::vec(word(), 1..5).prop_map(|words| format!("\"{}\"", words.join(" "))),
        "[0-9]{1,4}",
    ];
    prop::collection::vec(token, 1..4).prop_map(|tokens| tokens.join(" # "))
}

proptest! {
    #[test]
    fn test_generated_entries_round_trip(
        entries in prop::collection::vec(
            (
                "[a-z][a-z0-9]{2,8}",
                prop::collection::vec(("[a-z]{2,8}", written_value()), 1..5),
            ),
            1..6,
        )
    ) {
        let mut input = Vec::new();
        for (i, (key, fields)) in entries.iter().enumerate() {
            let mut seen = std::collections::HashSet::new();
            let body: Vec<String> = fields
                .iter()
                .filter(|(name, _)| seen.insert(name.clone()))
                .map(|(name, value)| format!("    {} = {}", name, value))
                .collect();
            input.push(format!("@misc{{{}{},\n{}\n}}", key, i, body.join(",\n")));
        }
        let input = input.join("\n\n") + "\n";

        let config = BibflowConfig::default();
        let library = parse_str(&input, &config).unwrap();
        prop_assert_eq!(library.entries().count(), entries.len());
        prop_assert_eq!(write_string(library, &config).unwrap(), input);
    }

    #[test]
    fn test_garbage_between_entries_is_contained(
        garbage in prop::collection::vec("[a-z {}=,\"#]{0,20}", 3)
    ) {
        let input = format!(
            "@misc{{a, note = {{A}}}}\n{}\n@misc{{b, note = {{B}}}}\n{}\n@misc{{c, note = {{C}}}}\n{}\n",
            garbage[0], garbage[1], garbage[2]
        );
        let library = parse_str(&input, &BibflowConfig::default()).unwrap();
        for key in ["a", "b", "c"] {
            let note = library.get_entry(key).and_then(|e| e.get_text("note"));
            prop_assert_eq!(note, Some(key.to_uppercase()));
        }
    }
}
