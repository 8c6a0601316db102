//! UI module for consistent CLI output
//!
//! Uses `indicatif` spinners and `console` styling in interactive
//! terminals, with automatic fallback to plain tagged lines in CI and
//! other non-interactive environments.
//!
//! # Example
//!
//! ```rust,ignore
//! use outsync::ui::{self, UiContext, TaskSpinner};
//!
//! let ctx = UiContext::detect();
//!
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Compiling...");
//! // ... do work ...
//! spinner.stop("3 artifacts, 1 changed");
//!
//! ui::step_warn_hint(&ctx, "Build record missing", "Run: outsync build");
//! ```

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{
    key_value, key_value_status, section, step_error_detail, step_ok, step_ok_detail, step_warn,
    step_warn_hint,
};
pub use progress::TaskSpinner;
