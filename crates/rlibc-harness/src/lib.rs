//! Conformance testing harness for rlibc.
//!
//! This crate provides:
//! - Fixture loading: JSON case files grouped by function family
//! - Execution: run each case against the rlibc-core engines over the
//!   in-memory raw layer, so results are deterministic
//! - Verification and reports: markdown and JSON summaries with diffs
//! - Structured logs: one JSONL record per case plus a SHA-256 artifact index

#![forbid(unsafe_code)]

pub mod diff;
pub mod error;
pub mod exec;
pub mod fixtures;
pub mod report;
pub mod runner;
pub mod structured_log;
pub mod verify;

pub use error::HarnessError;
pub use fixtures::{FixtureCase, FixtureSet};
pub use report::ConformanceReport;
pub use runner::TestRunner;
pub use verify::VerificationResult;
