//! Conformance harness for the pymem allocation shim.
//!
//! This crate provides:
//! - Scenarios: every allocation contract expressed as a named, runnable check
//! - Runner: executes scenarios and emits one structured log line per case
//! - Report generation: machine-readable conformance report
//! - Artifact index: links logs to their SHA-256 digests

pub mod artifact;
pub mod error;
pub mod report;
pub mod runner;
pub mod scenarios;
pub mod structured_log;

pub use error::HarnessError;
pub use report::ConformanceReport;
pub use runner::{ScenarioResult, ScenarioRunner};
pub use scenarios::{Scenario, ScenarioError, all_scenarios};
