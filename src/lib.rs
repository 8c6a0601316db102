//! outsync - incremental build-output cache
//!
//! Runs a compiler once per build cycle, keeps its output in memory,
//! persists only the artifacts that changed since the previous cycle and
//! links the complete artifact set into an output directory.

pub mod artifact;
pub mod capture;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod driver;
pub mod error;
pub mod store;
pub mod ui;

pub use error::{OutsyncError, OutsyncResult};
