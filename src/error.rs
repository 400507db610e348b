use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for erbdoc operations
#[derive(Error, Debug)]
pub enum RenderError {
    /// IO error when reading or writing files
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// File not found error with specific path
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Malformed tag or code inside the template
    #[error("Syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    /// Embedded code raised while being evaluated
    #[error("Evaluation error on line {line}: {message}")]
    Eval { line: usize, message: String },

    /// Path traversal security error
    #[error("Path traversal detected (trying to access files outside base directory): {path}")]
    PathTraversal { path: PathBuf },

    /// Rendered output differs from what is on disk (`--check`)
    #[error("{path} is out of date; re-run erbdoc to regenerate it")]
    OutOfDate { path: PathBuf },

    /// Regex compilation error
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// Invalid glob pattern
    #[error("Glob error: {0}")]
    Glob(#[from] globset::Error),

    /// `WalkDir` error when traversing directories
    #[error("Directory traversal error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// YAML parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RenderError {
    pub(crate) fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn eval(line: usize, message: impl Into<String>) -> Self {
        Self::Eval {
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;
