//! Testing utilities for isoforge.
//!
//! This module provides:
//! - `FakeToolchain`, an in-process stand-in for the imaging tools with
//!   failure injection
//! - `BuildFixture`, a temporary asset/input/output layout

mod fixtures;
mod toolchain;

pub use fixtures::BuildFixture;
pub use toolchain::{FakeToolchain, Invocation};
