//! Compiler integration
//!
//! The driver talks to compilers only through the [`Compiler`] trait. The
//! one shipped implementation, [`CommandCompiler`], runs an external
//! program per cycle and ingests what it wrote.

mod backend;
pub mod command;
pub mod setup;
pub mod stats;

pub use backend::{Compiler, CompilerFactory};
pub use command::{CommandCompiler, CommandCompilerFactory};
pub use setup::{CompilerCache, CompilerSetup};
pub use stats::{aggregate_errors, CompileStats, Diagnostic, HardError};

use tokio::io::{AsyncBufReadExt, BufReader};

/// Max number of output lines to include in compiler error messages.
const ERROR_TAIL_LINES: usize = 50;

/// Extract the useful tail of compiler output for error diagnostics.
///
/// Combines stdout and stderr lines and returns the last
/// `ERROR_TAIL_LINES` so messages stay actionable without being
/// overwhelming.
pub(crate) fn error_output_tail(lines: &[String]) -> String {
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Returns all collected output lines for diagnostics. This is a standalone
/// async function (not behind `async_trait`) to avoid lifetime issues with the
/// `dyn Fn` callback.
pub(crate) async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: &(dyn Fn(&str) + Send + Sync),
) -> Vec<String> {
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Vec::new();
    };

    let mut stderr_reader = BufReader::new(stderr).lines();
    let mut stdout_reader = BufReader::new(stdout).lines();

    let mut all_output = Vec::new();
    let mut stderr_done = false;
    let mut stdout_done = false;

    while !stderr_done || !stdout_done {
        tokio::select! {
            line = stderr_reader.next_line(), if !stderr_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(&line);
                        all_output.push(line);
                    }
                    _ => stderr_done = true,
                }
            }
            line = stdout_reader.next_line(), if !stdout_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(&line);
                        all_output.push(line);
                    }
                    _ => stdout_done = true,
                }
            }
        }
    }

    all_output
}
