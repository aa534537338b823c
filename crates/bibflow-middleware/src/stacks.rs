//! Versioned default stacks
//!
//! Named, fixed stage lists for the common case. A stack's content never changes once
//! published; improvements get a new version and `current_*` moves to it.

use serde::{Deserialize, Serialize};

use crate::pipeline::Pipeline;
use crate::stages::{AddEnclosing, RemoveEnclosing, ResolveStringReferences};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DefaultStack {
    /// Resolve string references, then strip delimiters.
    ParseV1,
    /// Put delimiters back.
    WriteV1,
}

/// A stack name that is not known.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stack '{0}'")]
pub struct UnknownStack(pub String);

impl DefaultStack {
    pub fn current_parse() -> Self {
        DefaultStack::ParseV1
    }

    pub fn current_write() -> Self {
        DefaultStack::WriteV1
    }

    pub fn name(&self) -> &'static str {
        match self {
            DefaultStack::ParseV1 => "parse-v1",
            DefaultStack::WriteV1 => "write-v1",
        }
    }

    pub fn pipeline(&self) -> Pipeline {
        match self {
            DefaultStack::ParseV1 => Pipeline::new()
                .with_library(ResolveStringReferences::new())
                .with_block(RemoveEnclosing),
            DefaultStack::WriteV1 => Pipeline::new().with_block(AddEnclosing::default()),
        }
    }
}

impl std::fmt::Display for DefaultStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for DefaultStack {
    type Err = UnknownStack;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "parse-v1" => Ok(DefaultStack::ParseV1),
            "write-v1" => Ok(DefaultStack::WriteV1),
            "parse" | "current-parse" => Ok(DefaultStack::current_parse()),
            "write" | "current-write" => Ok(DefaultStack::current_write()),
            _ => Err(UnknownStack(s.to_string())),
        }
    }
}
