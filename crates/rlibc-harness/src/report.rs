//! Report generation for conformance results.

use rlibc_membrane::metrics::MetricsSnapshot;
use serde::Serialize;

use crate::verify::VerificationSummary;

/// A conformance report: the verification summary plus the runtime
/// counters accumulated while the cases ran.
#[derive(Debug, Clone, Serialize)]
pub struct ConformanceReport {
    /// Report title.
    pub title: String,
    /// Timestamp (UTC).
    pub timestamp: String,
    /// Verification summary.
    pub summary: VerificationSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsSnapshot>,
}

impl ConformanceReport {
    /// Render the report as markdown.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# {}\n\n", self.title));
        out.push_str(&format!("- Timestamp: {}\n", self.timestamp));
        out.push_str(&format!("- Total: {}\n", self.summary.total));
        out.push_str(&format!("- Passed: {}\n", self.summary.passed));
        out.push_str(&format!("- Failed: {}\n\n", self.summary.failed));

        out.push_str("| Case | Family | Spec | Status |\n");
        out.push_str("|------|--------|------|--------|\n");
        for r in &self.summary.results {
            let status = if r.passed { "PASS" } else { "FAIL" };
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                r.case_name, r.family, r.spec_section, status
            ));
        }

        let mut failures = self.summary.failures().peekable();
        if failures.peek().is_some() {
            out.push_str("\n## Failures\n");
            for r in failures {
                out.push_str(&format!("\n### {}\n\n```\n", r.case_name));
                out.push_str(r.diff.as_deref().unwrap_or(""));
                if !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str("```\n");
            }
        }

        if let Some(m) = &self.metrics {
            out.push_str("\n## Runtime counters\n\n");
            out.push_str(&format!(
                "- allocations {} / frees {} / alloc failures {} / invalid frees {}\n",
                m.allocations, m.frees, m.alloc_failures, m.invalid_frees
            ));
            out.push_str(&format!(
                "- raw reads {} / raw writes {} / flushes {} / stream errors {}\n",
                m.raw_reads, m.raw_writes, m.flushes, m.stream_errors
            ));
            out.push_str(&format!("- forks {} / waits {}\n", m.forks, m.waits));
        }
        out
    }

    /// Render the report as JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::VerificationResult;

    fn report() -> ConformanceReport {
        let results = vec![
            VerificationResult {
                case_name: String::from("percent_d"),
                family: String::from("printf"),
                function: String::from("printf"),
                spec_section: String::from("C11 7.21.6.1"),
                passed: true,
                expected: String::from("123"),
                actual: String::from("123"),
                expected_errno: 0,
                actual_errno: 0,
                diff: None,
            },
            VerificationResult {
                case_name: String::from("zero_pad"),
                family: String::from("printf"),
                function: String::from("printf"),
                spec_section: String::from("C11 7.21.6.1"),
                passed: false,
                expected: String::from("00042"),
                actual: String::from("42"),
                expected_errno: 0,
                actual_errno: 0,
                diff: Some(String::from("--- expected\n+++ actual\n@@ line 1 @@\n-00042\n+42\n")),
            },
        ];
        ConformanceReport {
            title: String::from("rlibc conformance"),
            timestamp: String::from("2026-01-01T00:00:00Z"),
            summary: VerificationSummary::from_results(results),
            metrics: None,
        }
    }

    #[test]
    fn markdown_lists_cases_and_failures() {
        let md = report().to_markdown();
        assert!(md.starts_with("# rlibc conformance\n"));
        assert!(md.contains("| percent_d | printf | C11 7.21.6.1 | PASS |"));
        assert!(md.contains("| zero_pad | printf | C11 7.21.6.1 | FAIL |"));
        assert!(md.contains("### zero_pad"));
        assert!(!md.contains("Runtime counters"));
    }

    #[test]
    fn json_carries_summary_counts() {
        let v: serde_json::Value = serde_json::from_str(&report().to_json()).unwrap();
        assert_eq!(v["summary"]["failed"], 1);
        assert!(v.get("metrics").is_none());
    }

    #[test]
    fn metrics_section_when_present() {
        let mut r = report();
        r.metrics = Some(MetricsSnapshot {
            forks: 2,
            ..MetricsSnapshot::default()
        });
        assert!(r.to_markdown().contains("- forks 2 / waits 0"));
    }
}
