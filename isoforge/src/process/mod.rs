//! External tool invocation.
//!
//! This module provides:
//! - `CommandExecutor`, the seam that actually launches processes
//! - `ProcessRunner`, which enforces the exit-code contract and surfaces output
//! - `OutputFilter` for trimming noisy tool output

mod executor;
mod filter;
mod runner;

pub use executor::{CommandExecutor, Output, SystemExecutor};
pub use filter::OutputFilter;
pub use runner::{CommandSpec, ProcessRunner};
