//! Error types for outsync
//!
//! All modules use `OutsyncResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for outsync operations
pub type OutsyncResult<T> = Result<T, OutsyncError>;

/// Broad classification of a failure, as reported to the calling pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid or conflicting configuration, raised before any cycle runs
    Configuration,
    /// The compiler itself could not complete
    HardCompiler,
    /// The compiler completed but reported error diagnostics
    SoftCompiler,
    /// Reading or writing the cache store, output tree or build record failed
    Io,
    /// Broken internal invariant
    Internal,
}

/// All errors that can occur in outsync
#[derive(Error, Debug)]
pub enum OutsyncError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("outsync sets the compiler `{field}` itself, it must not be configured")]
    ReservedOption { field: &'static str },

    #[error("Expected exactly one input directory, got {0}")]
    InputCount(usize),

    #[error("Unknown configuration key: {0}")]
    UnknownConfigKey(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidConfigValue { key: String, reason: String },

    // Compiler errors
    #[error("Compiler failed: {message}{}", module_suffix(.module))]
    CompilerFailed {
        message: String,
        detail: Option<String>,
        module: Option<String>,
    },

    #[error("{message}")]
    Compilation { count: usize, message: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid artifact path {path:?}: {reason}")]
    ArtifactPath { path: String, reason: String },

    #[error("Build record not found: {0}")]
    RecordNotFound(PathBuf),

    #[error("{0} artifact(s) in the output directory do not match the build record")]
    OutputMismatch(usize),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

fn module_suffix(module: &Option<String>) -> String {
    match module {
        Some(module) => format!(" (in {})", module),
        None => String::new(),
    }
}

impl OutsyncError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Classify the error for the calling pipeline
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigInvalid { .. }
            | Self::ReservedOption { .. }
            | Self::InputCount(_)
            | Self::UnknownConfigKey(_)
            | Self::InvalidConfigValue { .. }
            | Self::TomlParse(_)
            | Self::TomlSerialize(_) => ErrorKind::Configuration,
            Self::CompilerFailed { .. } => ErrorKind::HardCompiler,
            Self::Compilation { .. } => ErrorKind::SoftCompiler,
            Self::Io { .. }
            | Self::RecordNotFound(_)
            | Self::OutputMismatch(_)
            | Self::Json(_) => ErrorKind::Io,
            Self::ArtifactPath { .. } | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the error came out of the compiler rather than outsync itself
    pub fn is_compiler_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::HardCompiler | ErrorKind::SoftCompiler
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ReservedOption { .. } => {
                Some("Remove it from [compiler]; set [build] input/cache_dir/output_dir instead")
            }
            Self::InputCount(_) => {
                Some("Set build.input in outsync.toml or pass --input <DIR>")
            }
            Self::UnknownConfigKey(_) => Some("Run: outsync config show"),
            Self::RecordNotFound(_) | Self::OutputMismatch(_) => Some("Run: outsync build"),
            Self::InvalidConfigValue { key, .. } if key == "compiler.program" => {
                Some("Set compiler.program in outsync.toml to the build command to run")
            }
            _ => None,
        }
    }
}
