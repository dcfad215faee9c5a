//! Post parsing error types.

use std::path::PathBuf;
use thiserror::Error;

/// Authoring errors found while reading a single post file.
#[derive(Debug, Error)]
pub enum PostError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("invalid post filename `{name}`: {reason}")]
    Filename { name: String, reason: String },

    #[error("missing front matter block (the file must start with `---`)")]
    MissingFrontMatter,

    #[error("front matter opened on line 1 is never closed by `---`")]
    UnclosedFrontMatter,

    #[error("invalid front matter: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("front matter must be a mapping of keys to values")]
    NotAMapping,

    #[error("invalid front matter date `{0}`")]
    Date(String),

    #[error("unbalanced `$$` math delimiter opened on line {line}")]
    UnbalancedMath { line: usize },
}

impl PostError {
    /// Short rule name used by the checker.
    pub const fn rule(&self) -> &'static str {
        match self {
            Self::Io(..) => "io",
            Self::Filename { .. } => "filename",
            Self::MissingFrontMatter | Self::UnclosedFrontMatter => "front-matter",
            Self::Yaml(_) | Self::NotAMapping | Self::Date(_) => "yaml",
            Self::UnbalancedMath { .. } => "unbalanced-math",
        }
    }

    pub(crate) fn filename(name: &str, reason: impl Into<String>) -> Self {
        Self::Filename {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
