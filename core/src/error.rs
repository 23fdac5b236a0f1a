//! Compiler error types
//!
//! Every failure surfaced by the compilation pipeline is a [`CompileError`]
//! carrying one of six categories. Errors halt the pipeline; warnings are
//! collected separately (see [`crate::diagnostics`]) and never alter control
//! flow.

use std::path::Path;
use std::path::PathBuf;
use thiserror::Error;

/// Where users are asked to report invariant violations. Internal errors are
/// compiler bugs by definition, not authoring mistakes.
pub const BUG_REPORT_URL: &str = "https://github.com/githubnext/gh-aw/issues/new";

/// Error category for structured logging and exit-code mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed front-matter or body syntax
    Parse,
    /// Missing file, import cycle, conflicting engines
    Import,
    /// Front-matter or emitted lock file fails its JSON schema
    Schema,
    /// Semantic checks: permissions, expressions, targets, runners
    Validation,
    /// Size limits: expression, lock file, prompt chunks
    Limit,
    /// Step-order tracker violation, duplicate step, dangling needs
    Internal,
}

impl ErrorKind {
    /// Machine-readable code for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parse => "PARSE_ERROR",
            Self::Import => "IMPORT_ERROR",
            Self::Schema => "SCHEMA_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::Limit => "LIMIT_ERROR",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

/// Compilation error with category and source-location context.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{path}:{line}:{column}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("import cycle detected: {}", format_cycle(.chain))]
    ImportCycle { chain: Vec<PathBuf> },

    #[error("{message}")]
    Import { message: String },

    #[error("{message}")]
    Schema { message: String },

    #[error("{message}")]
    Validation { message: String },

    #[error("{message}")]
    Limit { message: String },

    #[error("internal error: {message}. This is a compiler bug; please report it at {BUG_REPORT_URL}")]
    Internal { message: String },
}

impl CompileError {
    /// Get the error category
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse { .. } => ErrorKind::Parse,
            Self::FileRead { .. } | Self::ImportCycle { .. } | Self::Import { .. } => {
                ErrorKind::Import
            }
            Self::FileWrite { .. } => ErrorKind::Internal,
            Self::Schema { .. } => ErrorKind::Schema,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Limit { .. } => ErrorKind::Limit,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn parse(
        path: impl Into<PathBuf>,
        line: usize,
        column: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::Parse {
            path: path.into(),
            line,
            column,
            message: message.into(),
        }
    }

    pub fn import(message: impl Into<String>) -> Self {
        Self::Import {
            message: message.into(),
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn limit(message: impl Into<String>) -> Self {
        Self::Limit {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Prefix the error message with the workflow file it was raised for.
    /// Location-bearing variants already carry their own path and are
    /// returned unchanged.
    pub fn locate(self, path: &Path) -> Self {
        match self {
            Self::Parse { .. }
            | Self::FileRead { .. }
            | Self::FileWrite { .. }
            | Self::ImportCycle { .. } => self,
            Self::Internal { .. } => self,
            other => {
                let kind = other.kind();
                let message = format!("{}: {other}", path.display());
                match kind {
                    ErrorKind::Import => Self::Import { message },
                    ErrorKind::Schema => Self::Schema { message },
                    ErrorKind::Limit => Self::Limit { message },
                    _ => Self::Validation { message },
                }
            }
        }
    }
}

fn format_cycle(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Result type for compiler operations
pub type Result<T> = std::result::Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_codes_are_stable() {
        assert_eq!(ErrorKind::Parse.as_str(), "PARSE_ERROR");
        assert_eq!(ErrorKind::Internal.as_str(), "INTERNAL_ERROR");
    }

    #[test]
    fn cycle_error_lists_chain() {
        let err = CompileError::ImportCycle {
            chain: vec![PathBuf::from("a.md"), PathBuf::from("b.md"), PathBuf::from("a.md")],
        };
        let rendered = err.to_string();
        assert!(rendered.starts_with("import cycle detected: "), "{rendered}");
        assert!(rendered.contains("a.md -> b.md -> a.md"), "{rendered}");
    }

    #[test]
    fn internal_error_names_report_url() {
        let err = CompileError::internal("duplicate step");
        assert!(err.to_string().contains(BUG_REPORT_URL));
    }

    #[test]
    fn locate_prefixes_validation_errors() {
        let err = CompileError::validation("bad target").locate(Path::new("wf.md"));
        assert_eq!(err.to_string(), "wf.md: bad target");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
