//! Scenario execution engine.

use std::time::Instant;

use serde::Serialize;

use crate::scenarios::Scenario;
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome, StreamKind};

/// Outcome of one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioResult {
    pub name: String,
    pub symbol: String,
    pub property: String,
    pub passed: bool,
    /// Failure message, when the scenario failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub latency_ns: u64,
}

/// Runs scenarios and logs one entry per case.
pub struct ScenarioRunner {
    /// Identifier stamped on every log line of this run.
    pub run_id: String,
}

impl ScenarioRunner {
    #[must_use]
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }

    /// Runs every scenario in order, writing to `emitter` when given.
    pub fn run(
        &self,
        scenarios: &[Scenario],
        mut emitter: Option<&mut LogEmitter>,
    ) -> std::io::Result<Vec<ScenarioResult>> {
        let mut results = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            let started = Instant::now();
            let outcome = (scenario.run)();
            let latency_ns = u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX);

            let result = ScenarioResult {
                name: scenario.name.to_string(),
                symbol: scenario.symbol.to_string(),
                property: scenario.property.to_string(),
                passed: outcome.is_ok(),
                detail: outcome.err().map(|e| e.to_string()),
                latency_ns,
            };

            if let Some(emitter) = emitter.as_deref_mut() {
                emitter.emit_entry(log_entry(&self.run_id, &result))?;
            }
            results.push(result);
        }
        if let Some(emitter) = emitter {
            emitter.flush()?;
        }
        Ok(results)
    }
}

fn log_entry(run_id: &str, result: &ScenarioResult) -> LogEntry {
    let (level, outcome) = if result.passed {
        (LogLevel::Info, Outcome::Pass)
    } else {
        (LogLevel::Error, Outcome::Fail)
    };
    let mut entry = LogEntry::new(String::new(), level, "scenario")
        .with_run(run_id)
        .with_stream(StreamKind::Conformance)
        .with_symbol(&result.symbol)
        .with_scenario(&result.name)
        .with_outcome(outcome)
        .with_latency_ns(result.latency_ns);
    if let Some(detail) = &result.detail {
        entry = entry.with_details(serde_json::json!({ "detail": detail }));
    }
    entry
}
