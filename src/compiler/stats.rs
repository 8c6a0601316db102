//! Compiler results
//!
//! A compiler run ends either in a [`HardError`] (the compiler could not
//! finish) or in [`CompileStats`], which may still carry error diagnostics.

use crate::config::StatsLevel;
use crate::error::OutsyncError;
use std::fmt;
use std::time::Duration;

/// A single structured compiler message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// One-line description
    pub message: String,
    /// Longer explanation, stack or code frame
    pub detail: Option<String>,
    /// Module or file the message is about
    pub module: Option<String>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
            module: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(module) = &self.module {
            write!(f, "{}: ", module)?;
        }
        write!(f, "{}", self.message)?;
        if let Some(detail) = &self.detail {
            write!(f, "\n{}", detail)?;
        }
        Ok(())
    }
}

/// The compiler could not complete at all
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardError {
    pub message: String,
    pub detail: Option<String>,
    pub module: Option<String>,
}

impl HardError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
            module: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }
}

impl From<HardError> for OutsyncError {
    fn from(err: HardError) -> Self {
        OutsyncError::CompilerFailed {
            message: err.message,
            detail: err.detail,
            module: err.module,
        }
    }
}

/// Result of a compiler run that completed
#[derive(Debug, Clone, Default)]
pub struct CompileStats {
    /// Error diagnostics; any entry fails the cycle
    pub errors: Vec<Diagnostic>,
    /// Warnings, surfaced but never fatal
    pub warnings: Vec<Diagnostic>,
    /// Assets known to the compiler after this run
    pub assets: Vec<String>,
    /// Wall time of the run
    pub elapsed: Duration,
    /// Free-form compiler output, shown at verbose level
    pub output: Option<String>,
}

impl CompileStats {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Render the human-readable summary for `level`.
    ///
    /// Returns `None` when nothing should be shown.
    pub fn render(&self, level: StatsLevel) -> Option<String> {
        match level {
            StatsLevel::None => return None,
            StatsLevel::ErrorsOnly if !self.has_errors() => return None,
            _ => {}
        }

        let mut lines = vec![format!(
            "{} {} with {} {} and {} {} in {}ms",
            self.assets.len(),
            plural(self.assets.len(), "asset", "assets"),
            self.errors.len(),
            plural(self.errors.len(), "error", "errors"),
            self.warnings.len(),
            plural(self.warnings.len(), "warning", "warnings"),
            self.elapsed.as_millis()
        )];

        if level != StatsLevel::Minimal {
            if level >= StatsLevel::Normal {
                lines.extend(self.assets.iter().map(|asset| format!("  asset {}", asset)));
            }
            for error in &self.errors {
                lines.push(format!("  ERROR {}", headline(error)));
            }
            for warning in &self.warnings {
                lines.push(format!("  WARNING {}", headline(warning)));
            }
        }

        if level == StatsLevel::Verbose {
            for diagnostic in self.errors.iter().chain(&self.warnings) {
                if let Some(detail) = &diagnostic.detail {
                    lines.push(detail.clone());
                }
            }
            if let Some(output) = &self.output {
                lines.push(output.clone());
            }
        }

        Some(lines.join("\n"))
    }
}

fn headline(diagnostic: &Diagnostic) -> String {
    match &diagnostic.module {
        Some(module) => format!("in {}: {}", module, diagnostic.message),
        None => diagnostic.message.clone(),
    }
}

fn plural<'a>(count: usize, one: &'a str, many: &'a str) -> &'a str {
    if count == 1 {
        one
    } else {
        many
    }
}

/// Fold error diagnostics into a single cycle failure.
///
/// One error is reported as-is; several are prefixed with their count and
/// listed with their details.
pub fn aggregate_errors(errors: &[Diagnostic]) -> OutsyncError {
    let message = match errors {
        [] => "compilation failed".to_string(),
        [single] => single.to_string(),
        many => {
            let listed: Vec<String> = many.iter().map(Diagnostic::to_string).collect();
            format!("{} compilation errors:\n{}", many.len(), listed.join("\n\n"))
        }
    };

    OutsyncError::Compilation {
        count: errors.len(),
        message,
    }
}
