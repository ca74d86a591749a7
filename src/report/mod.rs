//! Run reporting
//!
//! Aggregates per-plan verdicts into chapter-categorized totals with
//! summary, JSON, and TAP renderings. Infrastructure errors (unreadable
//! file, missing include, realm seeding failure) are tracked alongside
//! verdicts but never counted as Pass or Fail; they carry their own count
//! and their own slot in every rendering.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::verdict::{aggregate, Outcome, Verdict};

/// One infrastructure failure: the harness could not run the plan at all.
#[derive(Debug, Clone, Serialize)]
pub struct InfraError {
    pub path: PathBuf,
    pub message: String,
}

/// Results for one chapter (first path component under the suite root).
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChapterTotals {
    pub name: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl ChapterTotals {
    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f64 / self.total as f64 * 100.0
        }
    }
}

/// Aggregated results of one run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Per-chapter totals, keyed and therefore rendered in path order.
    pub chapters: BTreeMap<String, ChapterTotals>,
    /// Every verdict, in completion order.
    pub verdicts: Vec<Verdict>,
    /// Infrastructure errors, in occurrence order.
    pub infra_errors: Vec<InfraError>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub timeouts: usize,
    /// Advisory failures; counted separately, never in `failed`.
    pub warnings: usize,
    pub elapsed: Duration,
}

impl RunReport {
    /// Pass rate over plans that actually ran.
    pub fn pass_rate(&self) -> f64 {
        let runnable = self.total - self.skipped;
        if runnable == 0 {
            0.0
        } else {
            self.passed as f64 / runnable as f64 * 100.0
        }
    }

    /// Fold one verdict into the totals.
    pub fn record(&mut self, verdict: Verdict) {
        self.total += 1;
        match verdict.outcome {
            Outcome::Pass => self.passed += 1,
            Outcome::Fail | Outcome::TimedOut if verdict.advisory => self.warnings += 1,
            Outcome::Fail => self.failed += 1,
            Outcome::TimedOut => self.timeouts += 1,
            Outcome::Skip => self.skipped += 1,
        }

        let chapter = chapter_of(&verdict.path);
        let entry = self
            .chapters
            .entry(chapter.clone())
            .or_insert_with(|| ChapterTotals {
                name: chapter,
                ..Default::default()
            });
        entry.total += 1;
        match verdict.outcome {
            Outcome::Pass => entry.passed += 1,
            Outcome::Fail | Outcome::TimedOut if !verdict.advisory => entry.failed += 1,
            _ => {}
        }

        self.verdicts.push(verdict);
    }

    /// Record a plan the harness itself could not carry out.
    pub fn record_infra(&mut self, path: PathBuf, message: String) {
        self.infra_errors.push(InfraError { path, message });
    }

    /// Whether the run should exit green.
    ///
    /// Any non-advisory failure or timeout, or any infrastructure error,
    /// makes the run red. Skips and warnings never do.
    pub fn exit_code(&self) -> i32 {
        if self.failed == 0 && self.timeouts == 0 && self.infra_errors.is_empty() {
            0
        } else {
            1
        }
    }

    /// Test-level outcomes: the conjunction of each file's plan verdicts.
    ///
    /// A file passes only when every non-advisory plan passed; one mode
    /// passing never masks the other mode's failure.
    pub fn test_rollup(&self) -> BTreeMap<PathBuf, Outcome> {
        let mut by_path: BTreeMap<PathBuf, Vec<&Verdict>> = BTreeMap::new();
        for verdict in &self.verdicts {
            by_path.entry(verdict.path.clone()).or_default().push(verdict);
        }
        by_path
            .into_iter()
            .map(|(path, verdicts)| (path, aggregate(verdicts)))
            .collect()
    }

    /// Non-advisory failing verdicts, for triage listings.
    pub fn failing(&self) -> impl Iterator<Item = &Verdict> {
        self.verdicts
            .iter()
            .filter(|v| v.outcome.is_failing() && !v.advisory)
    }

    /// Format as a human-readable summary.
    pub fn format_summary(&self) -> String {
        let mut s = String::new();
        s.push_str("\n=== Conformance Report ===\n\n");
        s.push_str(&format!(
            "Plans: {} | Pass: {} | Fail: {} | Skip: {} | Timeout: {} | Warn: {}\n",
            self.total, self.passed, self.failed, self.skipped, self.timeouts, self.warnings
        ));
        let rollup = self.test_rollup();
        s.push_str(&format!(
            "Tests: {} | Pass: {} | Fail: {} | Skip: {}\n",
            rollup.len(),
            rollup.values().filter(|o| **o == Outcome::Pass).count(),
            rollup.values().filter(|o| o.is_failing()).count(),
            rollup.values().filter(|o| **o == Outcome::Skip).count(),
        ));
        s.push_str(&format!(
            "Pass Rate: {:.1}% ({}/{})\n",
            self.pass_rate(),
            self.passed,
            self.total - self.skipped
        ));
        if !self.infra_errors.is_empty() {
            s.push_str(&format!(
                "Infrastructure errors: {}\n",
                self.infra_errors.len()
            ));
        }
        s.push_str(&format!("Time: {:?}\n\n", self.elapsed));

        s.push_str("Per-Chapter Results:\n");
        s.push_str(&format!(
            "{:<30} {:>6} {:>6} {:>6} {:>7}\n",
            "Chapter", "Total", "Pass", "Fail", "Rate"
        ));
        s.push_str(&"-".repeat(61));
        s.push('\n');
        for chapter in self.chapters.values() {
            s.push_str(&format!(
                "{:<30} {:>6} {:>6} {:>6} {:>6.1}%\n",
                chapter.name,
                chapter.total,
                chapter.passed,
                chapter.failed,
                chapter.pass_rate()
            ));
        }

        if self.failing().next().is_some() {
            s.push_str("\nFailing plans:\n");
            for verdict in self.failing() {
                s.push_str(&format!(
                    "  {} [{}] {}: {}\n",
                    verdict.outcome,
                    verdict.mode,
                    verdict.path.display(),
                    verdict.diagnostic.as_deref().unwrap_or("")
                ));
            }
        }
        for err in &self.infra_errors {
            s.push_str(&format!("  INFRA {}: {}\n", err.path.display(), err.message));
        }
        s
    }

    /// Export as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        let chapters: serde_json::Map<String, serde_json::Value> = self
            .chapters
            .iter()
            .map(|(name, ch)| {
                (
                    name.clone(),
                    serde_json::json!({
                        "total": ch.total,
                        "passed": ch.passed,
                        "failed": ch.failed,
                        "pass_rate": ch.pass_rate(),
                    }),
                )
            })
            .collect();

        let rollup = self.test_rollup();
        serde_json::json!({
            "tests": {
                "total": rollup.len(),
                "passed": rollup.values().filter(|o| **o == Outcome::Pass).count(),
                "failed": rollup.values().filter(|o| o.is_failing()).count(),
                "skipped": rollup.values().filter(|o| **o == Outcome::Skip).count(),
            },
            "total": self.total,
            "passed": self.passed,
            "failed": self.failed,
            "skipped": self.skipped,
            "timeouts": self.timeouts,
            "warnings": self.warnings,
            "infra_errors": &self.infra_errors,
            "pass_rate": self.pass_rate(),
            "elapsed_ms": self.elapsed.as_millis(),
            "chapters": chapters,
            "verdicts": &self.verdicts,
        })
    }

    /// Export as TAP for CI consumption.
    ///
    /// Skips are emitted with a SKIP directive, advisory failures with
    /// TODO, and infrastructure errors as trailing `not ok` entries so a
    /// TAP consumer flags them without any out-of-band channel.
    pub fn to_tap(&self) -> String {
        let count = self.verdicts.len() + self.infra_errors.len();
        let mut s = format!("TAP version 13\n1..{count}\n");
        let mut n = 0usize;

        for verdict in &self.verdicts {
            n += 1;
            let label = format!("{} ({})", verdict.path.display(), verdict.mode);
            match verdict.outcome {
                Outcome::Pass => s.push_str(&format!("ok {n} - {label}\n")),
                Outcome::Skip => {
                    s.push_str(&format!(
                        "ok {n} - {label} # SKIP {}\n",
                        verdict.diagnostic.as_deref().unwrap_or("")
                    ));
                }
                Outcome::Fail | Outcome::TimedOut if verdict.advisory => {
                    s.push_str(&format!(
                        "not ok {n} - {label} # TODO nondeterministic\n"
                    ));
                }
                Outcome::Fail | Outcome::TimedOut => {
                    s.push_str(&format!("not ok {n} - {label}\n"));
                    if let Some(ref message) = verdict.diagnostic {
                        s.push_str(&format!("  ---\n  message: {message}\n  ---\n"));
                    }
                }
            }
        }
        for err in &self.infra_errors {
            n += 1;
            s.push_str(&format!(
                "not ok {n} - {} # infrastructure\n  ---\n  message: {}\n  ---\n",
                err.path.display(),
                err.message
            ));
        }
        s
    }
}

fn chapter_of(path: &Path) -> String {
    path.iter()
        .next()
        .map(|c| c.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ErrorPhase, Thrown};
    use crate::metadata::TestDescriptor;
    use crate::planner;
    use crate::verdict::{classify, RawOutcome};
    use std::sync::Arc;

    fn verdict_for(path: &str, raw: RawOutcome) -> Verdict {
        let d: Arc<TestDescriptor> =
            TestDescriptor::parse(path, "/*---\nflags: [onlyStrict]\n---*/\n").expect("parse");
        let plan = planner::plan(&d).remove(0);
        classify(&plan, raw)
    }

    fn failing(path: &str) -> Verdict {
        verdict_for(
            path,
            RawOutcome::Thrown(Thrown::new("TypeError", "boom", ErrorPhase::Runtime)),
        )
    }

    #[test]
    fn counts_and_chapters() {
        let mut report = RunReport::default();
        report.record(verdict_for("language/types/t1.js", RawOutcome::Completed));
        report.record(verdict_for("language/types/t2.js", RawOutcome::Completed));
        report.record(failing("built-ins/Array/t3.js"));

        assert_eq!(report.total, 3);
        assert_eq!(report.passed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.chapters.len(), 2);
        assert_eq!(report.chapters["language"].passed, 2);
        assert_eq!(report.chapters["built-ins"].failed, 1);
    }

    #[test]
    fn advisory_failures_count_as_warnings() {
        let d: Arc<TestDescriptor> = TestDescriptor::parse(
            "language/flaky.js",
            "/*---\nflags: [onlyStrict, nonDeterministic]\n---*/\n",
        )
        .expect("parse");
        let plan = planner::plan(&d).remove(0);
        let verdict = classify(
            &plan,
            RawOutcome::Thrown(Thrown::new("Test262Error", "x", ErrorPhase::Runtime)),
        );

        let mut report = RunReport::default();
        report.record(verdict);
        assert_eq!(report.warnings, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn exit_code_red_on_failure() {
        let mut report = RunReport::default();
        report.record(failing("language/t.js"));
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn exit_code_red_on_infra_error() {
        let mut report = RunReport::default();
        report.record(verdict_for("language/t.js", RawOutcome::Completed));
        report.record_infra(
            PathBuf::from("language/broken.js"),
            "missing include nope.js".to_string(),
        );
        assert_eq!(report.exit_code(), 1);
        assert!(report.format_summary().contains("INFRA"));
    }

    #[test]
    fn skips_do_not_affect_pass_rate_denominator() {
        let d: Arc<TestDescriptor> = TestDescriptor::parse(
            "intl402/t.js",
            "/*---\nflags: [onlyStrict]\nfeatures: [Temporal]\n---*/\n",
        )
        .expect("parse");
        let plan = planner::plan(&d).remove(0);
        let skip = Verdict::skipped(
            &plan,
            &crate::gate::SkipReason::UnsupportedFeature("Temporal".to_string()),
        );

        let mut report = RunReport::default();
        report.record(verdict_for("language/t.js", RawOutcome::Completed));
        report.record(skip);
        assert_eq!(report.total, 2);
        assert!((report.pass_rate() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn tap_marks_skips_and_failures() {
        let d: Arc<TestDescriptor> = TestDescriptor::parse(
            "intl402/t.js",
            "/*---\nflags: [onlyStrict]\nfeatures: [Temporal]\n---*/\n",
        )
        .expect("parse");
        let plan = planner::plan(&d).remove(0);
        let skip = Verdict::skipped(
            &plan,
            &crate::gate::SkipReason::UnsupportedFeature("Temporal".to_string()),
        );

        let mut report = RunReport::default();
        report.record(verdict_for("language/ok.js", RawOutcome::Completed));
        report.record(failing("language/bad.js"));
        report.record(skip);
        report.record_infra(PathBuf::from("language/broken.js"), "io".to_string());

        let tap = report.to_tap();
        assert!(tap.starts_with("TAP version 13\n1..4\n"));
        assert!(tap.contains("ok 1 - language/ok.js (strict)"));
        assert!(tap.contains("not ok 2 - language/bad.js (strict)"));
        assert!(tap.contains("# SKIP unsupported-feature:Temporal"));
        assert!(tap.contains("# infrastructure"));
    }

    #[test]
    fn rollup_is_conjunction_over_modes() {
        let d: Arc<TestDescriptor> =
            TestDescriptor::parse("language/modes.js", "var x = 1;\n").expect("parse");
        let plans = planner::plan(&d);
        assert_eq!(plans.len(), 2);

        let mut report = RunReport::default();
        report.record(classify(&plans[0], RawOutcome::Completed));
        report.record(classify(
            &plans[1],
            RawOutcome::Thrown(Thrown::new("TypeError", "sloppy only", ErrorPhase::Runtime)),
        ));
        report.record(verdict_for("language/ok.js", RawOutcome::Completed));

        let rollup = report.test_rollup();
        assert_eq!(rollup.len(), 2);
        assert_eq!(rollup[&PathBuf::from("language/modes.js")], Outcome::Fail);
        assert_eq!(rollup[&PathBuf::from("language/ok.js")], Outcome::Pass);

        let summary = report.format_summary();
        assert!(summary.contains("Tests: 2 | Pass: 1 | Fail: 1 | Skip: 0"));
        let json = report.to_json();
        assert_eq!(json["tests"]["total"], 2);
        assert_eq!(json["tests"]["failed"], 1);
    }

    #[test]
    fn json_carries_totals() {
        let mut report = RunReport::default();
        report.record(verdict_for("language/t.js", RawOutcome::Completed));
        let json = report.to_json();
        assert_eq!(json["total"], 1);
        assert_eq!(json["passed"], 1);
        assert_eq!(json["chapters"]["language"]["total"], 1);
    }
}
