//! Compiler abstraction
//!
//! Provides the seam between the driver and whatever actually compiles:
//! an external program, or a scripted stand-in under test.

use crate::compiler::setup::CompilerSetup;
use crate::compiler::stats::{CompileStats, HardError};
use crate::error::OutsyncResult;
use async_trait::async_trait;

/// A long-lived compiler handle, run once per build cycle.
///
/// Implementations write every artifact they know about into the
/// [`MemoryOutput`](crate::capture::MemoryOutput) from their setup and keep
/// whatever incremental state they like between runs.
#[async_trait]
pub trait Compiler: Send {
    /// Run one compilation.
    ///
    /// `Err` means the compiler itself failed. `Ok` may still carry error
    /// diagnostics, which the driver treats as a failed cycle.
    async fn run(&mut self) -> Result<CompileStats, HardError>;

    /// Human-readable compiler name for logs
    fn name(&self) -> &str;
}

/// Creates the compiler handle once the driver has resolved its setup
pub trait CompilerFactory: Send + Sync {
    fn create(&self, setup: CompilerSetup) -> OutsyncResult<Box<dyn Compiler>>;
}
