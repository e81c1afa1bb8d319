//! Shared test utilities for batchdoc integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring an orchestrator to in-memory collaborators
//! - Scripted engine fakes and builders for settings and PDF fixtures

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
