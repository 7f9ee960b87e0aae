//! Test execution engine.

use std::time::Instant;

use rlibc_membrane::metrics::global_metrics;

use crate::diff::{errno_note, render_diff};
use crate::exec::execute_fixture_case;
use crate::fixtures::{FixtureCase, FixtureSet};
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};
use crate::verify::VerificationResult;

/// Runs fixture sets and collects verification results.
pub struct TestRunner {
    /// Name of the test campaign.
    pub campaign: String,
}

impl TestRunner {
    #[must_use]
    pub fn new(campaign: impl Into<String>) -> Self {
        Self {
            campaign: campaign.into(),
        }
    }

    /// Run all fixtures in a set and return results.
    pub fn run(&self, fixture_set: &FixtureSet) -> Vec<VerificationResult> {
        fixture_set
            .cases
            .iter()
            .map(|case| execute_case(&fixture_set.family, case).0)
            .collect()
    }

    /// Like [`run`](Self::run), also emitting one log entry per case with
    /// its outcome, latency and the runtime counters it moved.
    pub fn run_logged(
        &self,
        fixture_set: &FixtureSet,
        emitter: &mut LogEmitter,
    ) -> std::io::Result<Vec<VerificationResult>> {
        let mut results = Vec::with_capacity(fixture_set.cases.len());
        for case in &fixture_set.cases {
            let before = global_metrics().snapshot();
            let started = Instant::now();
            let (result, harness_error) = execute_case(&fixture_set.family, case);
            let latency = u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX);
            let moved = global_metrics().snapshot().since(&before);

            let (level, outcome) = match (&harness_error, result.passed) {
                (Some(_), _) => (LogLevel::Error, Outcome::Error),
                (None, true) => (LogLevel::Info, Outcome::Pass),
                (None, false) => (LogLevel::Warn, Outcome::Fail),
            };
            let mut details = serde_json::json!({
                "case": case.name,
                "spec_section": case.spec_section,
                "counters": moved,
            });
            if let Some(diff) = &result.diff {
                details["diff"] = serde_json::Value::from(diff.as_str());
            }
            let entry = LogEntry::new(String::new(), level, "case_result")
                .with_campaign(&self.campaign)
                .with_api(&fixture_set.family, &case.function)
                .with_outcome(outcome)
                .with_errno(result.actual_errno)
                .with_latency_ns(latency)
                .with_details(details);
            emitter.emit_entry(entry)?;
            results.push(result);
        }
        Ok(results)
    }
}

/// Execute one case. The second value is set when the case could not run
/// at all (unknown executor or malformed inputs).
fn execute_case(family: &str, case: &FixtureCase) -> (VerificationResult, Option<String>) {
    let (actual, actual_errno, harness_error) =
        match execute_fixture_case(&case.function, &case.inputs) {
            Ok(run) => (run.output, run.errno, None),
            Err(e) => {
                let msg = e.to_string();
                (format!("<harness error: {msg}>"), 0, Some(msg))
            }
        };

    let output_matches = actual == case.expected_output;
    let passed = harness_error.is_none() && output_matches && actual_errno == case.expected_errno;
    let diff = (!passed).then(|| {
        let mut notes = Vec::new();
        if !output_matches {
            notes.push(render_diff(&case.expected_output, &actual));
        }
        notes.extend(errno_note(case.expected_errno, actual_errno));
        notes.join("\n")
    });

    let result = VerificationResult {
        case_name: case.name.clone(),
        family: family.to_string(),
        function: case.function.clone(),
        spec_section: case.spec_section.clone(),
        passed,
        expected: case.expected_output.clone(),
        actual,
        expected_errno: case.expected_errno,
        actual_errno,
        diff,
    };
    (result, harness_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn set(cases: Vec<FixtureCase>) -> FixtureSet {
        FixtureSet {
            version: String::from("1"),
            family: String::from("printf"),
            captured_at: String::from("2026-01-01T00:00:00Z"),
            cases,
        }
    }

    fn case(name: &str, function: &str, inputs: serde_json::Value, expected: &str, errno: i32) -> FixtureCase {
        FixtureCase {
            name: name.to_string(),
            function: function.to_string(),
            spec_section: String::from("C11 7.21.6.1"),
            inputs,
            expected_output: expected.to_string(),
            expected_errno: errno,
        }
    }

    #[test]
    fn passing_and_failing_cases() {
        let fixtures = set(vec![
            case("ok", "printf", json!({"format": "%d", "args": [{"int": 123}]}), "123", 0),
            case("wrong", "printf", json!({"format": "%d", "args": [{"int": 124}]}), "123", 0),
        ]);
        let results = TestRunner::new("unit").run(&fixtures);
        assert!(results[0].passed);
        assert!(results[0].diff.is_none());
        assert!(!results[1].passed);
        assert!(results[1].diff.as_deref().unwrap().contains("-123\n+124"));
    }

    #[test]
    fn errno_mismatch_fails_even_when_output_matches() {
        let fixtures = set(vec![case(
            "pipe",
            "pipe",
            json!({"data": "x", "close_writer": false}),
            "x|<blocked>",
            0,
        )]);
        let results = TestRunner::new("unit").run(&fixtures);
        assert!(!results[0].passed);
        assert_eq!(results[0].diff.as_deref(), Some("errno: expected 0, got 11"));
    }

    #[test]
    fn harness_errors_become_failures() {
        let fixtures = set(vec![case("bogus", "no_such_fn", json!({}), "", 0)]);
        let mut emitter = LogEmitter::to_buffer("unit", "r1");
        let results = TestRunner::new("unit").run_logged(&fixtures, &mut emitter).unwrap();
        assert!(!results[0].passed);
        assert!(results[0].actual.starts_with("<harness error:"));

        let text = String::from_utf8(emitter.buffered().unwrap().to_vec()).unwrap();
        let v: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(v["outcome"], "error");
        assert_eq!(v["symbol"], "no_such_fn");
        assert_eq!(v["details"]["case"], "bogus");
    }
}
