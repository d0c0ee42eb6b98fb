//! Conformance report generation.

use serde::Serialize;

use crate::runner::ScenarioResult;

/// Machine-readable summary of one harness run.
#[derive(Debug, Clone, Serialize)]
pub struct ConformanceReport {
    pub run_id: String,
    pub generated_utc: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<ScenarioResult>,
}

impl ConformanceReport {
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        generated_utc: impl Into<String>,
        results: Vec<ScenarioResult>,
    ) -> Self {
        let passed = results.iter().filter(|r| r.passed).count();
        Self {
            run_id: run_id.into(),
            generated_utc: generated_utc.into(),
            total: results.len(),
            passed,
            failed: results.len() - passed,
            results,
        }
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Names of the failing scenarios.
    #[must_use]
    pub fn failures(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.name.as_str())
            .collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
