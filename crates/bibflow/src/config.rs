//! Configuration for bibflow
//!
//! Which stages run when reading and writing, and how the writer lays out text.
//!
//! ```toml
//! [parse]
//! stack = "parse-v1"
//!
//! [[parse.stages]]
//! kind = "split-name-parts"
//! strict = true
//!
//! [write]
//! stack = "write-v1"
//!
//! [writer]
//! indent = "  "
//! trailing_comma = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use bibflow_middleware::{
    AddEnclosing, DefaultStack, MergeCoAuthors, MergeNameParts, MonthAbbreviation, MonthInt,
    MonthLongString, NormalizeFieldKeys, Pipeline, RemoveEnclosing, ResolveStringReferences,
    SeparateCoAuthors, SortBlocksByTypeAndKey, SortFieldsAlphabetically, SortFieldsCustom,
    SplitNameParts, UnknownStack,
};
use bibflow_syntax::WriterConfig;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BibflowConfig {
    /// Stages run after parsing
    #[serde(default = "StackConfig::default_parse")]
    pub parse: StackConfig,
    /// Stages run before writing
    #[serde(default = "StackConfig::default_write")]
    pub write: StackConfig,
    #[serde(default)]
    pub writer: WriterConfig,
}

impl Default for BibflowConfig {
    fn default() -> Self {
        Self {
            parse: StackConfig::default_parse(),
            write: StackConfig::default_write(),
            writer: WriterConfig::default(),
        }
    }
}

/// A named default stack, followed by extra stages.
///
/// Either part may be absent; with neither, the pipeline is empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<StageSpec>,
}

impl StackConfig {
    pub fn default_parse() -> Self {
        Self::named(DefaultStack::current_parse())
    }

    pub fn default_write() -> Self {
        Self::named(DefaultStack::current_write())
    }

    pub fn named(stack: DefaultStack) -> Self {
        Self {
            stack: Some(stack.name().to_string()),
            stages: Vec::new(),
        }
    }

    /// Only the listed stages, no default stack.
    pub fn stages(stages: Vec<StageSpec>) -> Self {
        Self {
            stack: None,
            stages,
        }
    }

    pub fn default_stack(&self) -> Result<Option<DefaultStack>, ConfigError> {
        self.stack
            .as_deref()
            .map(|name| name.parse::<DefaultStack>())
            .transpose()
            .map_err(ConfigError::from)
    }

    /// Build the pipeline this configuration describes.
    pub fn pipeline(&self) -> Result<Pipeline, ConfigError> {
        let mut pipeline = match self.default_stack()? {
            Some(stack) => stack.pipeline(),
            None => Pipeline::new(),
        };
        for spec in &self.stages {
            spec.validate()?;
            spec.push_onto(&mut pipeline);
        }
        Ok(pipeline)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.default_stack()?;
        self.stages.iter().try_for_each(StageSpec::validate)
    }
}

/// One stage with its parameters, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StageSpec {
    ResolveStringReferences {
        #[serde(default)]
        collapse: bool,
    },
    RemoveEnclosing,
    AddEnclosing(AddEnclosing),
    MonthInt,
    MonthAbbreviation,
    MonthLongString,
    SeparateCoAuthors(SeparateCoAuthors),
    MergeCoAuthors(MergeCoAuthors),
    SplitNameParts(SplitNameParts),
    MergeNameParts(MergeNameParts),
    NormalizeFieldKeys,
    SortFieldsAlphabetically,
    SortFieldsCustom(SortFieldsCustom),
    SortBlocks,
}

impl StageSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            StageSpec::ResolveStringReferences { .. } => "resolve-string-references",
            StageSpec::RemoveEnclosing => "remove-enclosing",
            StageSpec::AddEnclosing(_) => "add-enclosing",
            StageSpec::MonthInt => "month-int",
            StageSpec::MonthAbbreviation => "month-abbreviation",
            StageSpec::MonthLongString => "month-long-string",
            StageSpec::SeparateCoAuthors(_) => "separate-co-authors",
            StageSpec::MergeCoAuthors(_) => "merge-co-authors",
            StageSpec::SplitNameParts(_) => "split-name-parts",
            StageSpec::MergeNameParts(_) => "merge-name-parts",
            StageSpec::NormalizeFieldKeys => "normalize-field-keys",
            StageSpec::SortFieldsAlphabetically => "sort-fields-alphabetically",
            StageSpec::SortFieldsCustom(_) => "sort-fields-custom",
            StageSpec::SortBlocks => "sort-blocks",
        }
    }

    /// Check stage parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        let person_fields = match self {
            StageSpec::SeparateCoAuthors(stage) => Some(&stage.fields),
            StageSpec::MergeCoAuthors(stage) => Some(&stage.fields),
            StageSpec::SplitNameParts(stage) => Some(&stage.fields),
            StageSpec::MergeNameParts(stage) => Some(&stage.fields),
            _ => None,
        };
        if person_fields.is_some_and(|fields| fields.is_empty()) {
            return Err(self.invalid("fields must not be empty"));
        }
        if let StageSpec::SortFieldsCustom(stage) = self {
            if stage.order.is_empty() {
                return Err(self.invalid("order must not be empty"));
            }
        }
        Ok(())
    }

    fn invalid(&self, message: &str) -> ConfigError {
        ConfigError::InvalidStage {
            kind: self.kind().to_string(),
            message: message.to_string(),
        }
    }

    fn push_onto(&self, pipeline: &mut Pipeline) {
        match self.clone() {
            StageSpec::ResolveStringReferences { collapse } => {
                pipeline.push_library(ResolveStringReferences { collapse })
            }
            StageSpec::RemoveEnclosing => pipeline.push_block(RemoveEnclosing),
            StageSpec::AddEnclosing(stage) => pipeline.push_block(stage),
            StageSpec::MonthInt => pipeline.push_block(MonthInt),
            StageSpec::MonthAbbreviation => pipeline.push_block(MonthAbbreviation),
            StageSpec::MonthLongString => pipeline.push_block(MonthLongString),
            StageSpec::SeparateCoAuthors(stage) => pipeline.push_block(stage),
            StageSpec::MergeCoAuthors(stage) => pipeline.push_block(stage),
            StageSpec::SplitNameParts(stage) => pipeline.push_block(stage),
            StageSpec::MergeNameParts(stage) => pipeline.push_block(stage),
            StageSpec::NormalizeFieldKeys => pipeline.push_block(NormalizeFieldKeys),
            StageSpec::SortFieldsAlphabetically => pipeline.push_block(SortFieldsAlphabetically),
            StageSpec::SortFieldsCustom(stage) => pipeline.push_block(stage),
            StageSpec::SortBlocks => pipeline.push_library(SortBlocksByTypeAndKey),
        }
    }
}

impl BibflowConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load configuration from a JSON string
    pub fn from_json(json_str: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a `.json` or `.toml` file; anything else is read as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        tracing::debug!("Loading configuration from {}", path.display());
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_toml(&content),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parse.validate()?;
        self.write.validate()?;

        if !self.writer.indent.chars().all(|c| c == ' ' || c == '\t') {
            return Err(ConfigError::InvalidWriter(
                "indent must only contain spaces and tabs".to_string(),
            ));
        }
        if !self.writer.block_separator.contains('\n') {
            return Err(ConfigError::InvalidWriter(
                "block_separator must contain a line break".to_string(),
            ));
        }
        if let Some(comment) = &self.writer.failed_block_comment {
            if comment.contains('\n') || comment.contains('@') {
                return Err(ConfigError::InvalidWriter(
                    "failed_block_comment must be a single line without '@'".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn parse_pipeline(&self) -> Result<Pipeline, ConfigError> {
        self.parse.pipeline()
    }

    pub fn write_pipeline(&self) -> Result<Pipeline, ConfigError> {
        self.write.pipeline()
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown stack: {0}")]
    UnknownStack(#[from] UnknownStack),

    #[error("Invalid stage '{kind}': {message}")]
    InvalidStage { kind: String, message: String },

    #[error("Invalid writer settings: {0}")]
    InvalidWriter(String),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
