//! End-to-end runs over the mock engine.
//!
//! Each test lays out a miniature suite on disk (harness directory plus
//! test tree), runs it through the full pipeline, and checks the report.

mod common;

use std::path::PathBuf;
use std::time::Duration;

use common::MockEngine;

use cinnabar::engine::EngineCapabilities;
use cinnabar::runner::{Runner, RunnerConfig};
use cinnabar::verdict::Outcome;
use cinnabar::{ExecutionMode, RunReport};

struct Suite {
    _dir: tempfile::TempDir,
    harness: PathBuf,
    root: PathBuf,
}

impl Suite {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let harness = dir.path().join("harness");
        let root = dir.path().join("test");
        std::fs::create_dir(&harness).expect("mkdir harness");
        std::fs::create_dir(&root).expect("mkdir test");
        for (name, body) in [
            ("assert.js", "//@define assert\n"),
            ("sta.js", "//@define Test262Error\n"),
            ("doneprintHandle.js", "//@define $DONE\n"),
        ] {
            std::fs::write(harness.join(name), body).expect("write include");
        }
        Self {
            _dir: dir,
            harness,
            root,
        }
    }

    fn add_include(&self, name: &str, body: &str) {
        std::fs::write(self.harness.join(name), body).expect("write include");
    }

    fn add_test(&self, rel: &str, body: &str) {
        let path = self.root.join(rel);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(path, body).expect("write test");
    }

    fn run(&self) -> RunReport {
        self.run_with(MockEngine::bare(), RunnerConfig::default())
    }

    fn run_with(
        &self,
        engine: std::sync::Arc<MockEngine>,
        config: RunnerConfig,
    ) -> RunReport {
        Runner::new(engine, &self.harness, config)
            .run_suite(&self.root)
            .expect("run")
    }
}

fn fast_config() -> RunnerConfig {
    RunnerConfig {
        plan_timeout: Duration::from_millis(50),
        poll_interval: Duration::from_millis(1),
        ..RunnerConfig::default()
    }
}

#[test]
fn passing_test_runs_in_both_modes() {
    let suite = Suite::new();
    suite.add_test("language/ok.js", "//@require assert\n");
    let report = suite.run();
    assert_eq!(report.total, 2);
    assert_eq!(report.passed, 2);
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn one_mode_failing_is_not_masked_by_the_other() {
    let suite = Suite::new();
    suite.add_test(
        "language/sloppy-only-bug.js",
        "//@throw-sloppy TypeError runtime\n",
    );
    let report = suite.run();
    assert_eq!(report.passed, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.exit_code(), 1);
    let failing: Vec<_> = report.failing().collect();
    assert_eq!(failing.len(), 1);
    assert_eq!(failing[0].mode, ExecutionMode::Sloppy);
}

#[test]
fn declared_includes_are_seeded_before_the_body() {
    let suite = Suite::new();
    suite.add_include("compareArray.js", "//@define compareArray\n");
    suite.add_test(
        "built-ins/Array/cmp.js",
        "/*---\nincludes: [compareArray.js]\n---*/\n//@require assert\n//@require compareArray\n",
    );
    let report = suite.run();
    assert_eq!(report.passed, 2);
    assert_eq!(report.failed, 0);
}

#[test]
fn raw_test_gets_no_harness_at_all() {
    let suite = Suite::new();
    suite.add_test(
        "language/raw.js",
        "/*---\nflags: [raw]\n---*/\n//@require assert\n",
    );
    let report = suite.run();
    // Single sloppy plan; assert was never seeded.
    assert_eq!(report.total, 1);
    assert_eq!(report.failed, 1);
    assert!(report.failing().next().expect("one failure")
        .diagnostic
        .as_deref()
        .expect("diagnostic")
        .contains("ReferenceError"));
}

#[test]
fn module_test_runs_once_strict_with_includes() {
    let suite = Suite::new();
    suite.add_test(
        "language/module-code/m.js",
        "/*---\nflags: [module]\n---*/\n//@require assert\n",
    );
    let report = suite.run();
    assert_eq!(report.total, 1);
    assert_eq!(report.passed, 1);
    assert_eq!(report.verdicts[0].mode, ExecutionMode::Strict);
}

#[test]
fn async_completion_protocol() {
    let suite = Suite::new();
    suite.add_test(
        "built-ins/Promise/ok.js",
        "/*---\nflags: [async, onlyStrict]\n---*/\n//@done\n",
    );
    suite.add_test(
        "built-ins/Promise/bad.js",
        "/*---\nflags: [async, onlyStrict]\n---*/\n//@done-fail promise rejected\n",
    );
    suite.add_test(
        "built-ins/Promise/hang.js",
        "/*---\nflags: [async, onlyStrict]\n---*/\n//@print unrelated\n",
    );
    let report = suite.run_with(MockEngine::bare(), fast_config());
    assert_eq!(report.passed, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.timeouts, 1);
    let failure = report
        .verdicts
        .iter()
        .find(|v| v.outcome == Outcome::Fail)
        .expect("failure");
    assert!(failure
        .diagnostic
        .as_deref()
        .expect("diagnostic")
        .contains("promise rejected"));
}

#[test]
fn negative_parse_expectation_requires_parse_phase() {
    let suite = Suite::new();
    suite.add_test(
        "language/neg-ok.js",
        "/*---\nflags: [onlyStrict]\nnegative:\n  phase: parse\n  type: SyntaxError\n---*/\n//@throw SyntaxError parse\n",
    );
    suite.add_test(
        "language/neg-late.js",
        "/*---\nflags: [onlyStrict]\nnegative:\n  phase: parse\n  type: SyntaxError\n---*/\n//@throw SyntaxError runtime\n",
    );
    suite.add_test(
        "language/neg-silent.js",
        "/*---\nflags: [onlyStrict]\nnegative:\n  phase: parse\n  type: SyntaxError\n---*/\n",
    );
    let report = suite.run();
    assert_eq!(report.passed, 1);
    assert_eq!(report.failed, 2);
}

#[test]
fn runtime_negative_matches_by_constructor_name() {
    let suite = Suite::new();
    suite.add_test(
        "language/neg-rt.js",
        "/*---\nflags: [noStrict]\nnegative:\n  phase: runtime\n  type: TypeError\n---*/\n//@throw TypeError runtime\n",
    );
    let report = suite.run();
    assert_eq!(report.passed, 1);
    assert_eq!(report.failed, 0);
}

#[test]
fn unsupported_feature_is_skipped_not_failed() {
    let suite = Suite::new();
    suite.add_test(
        "built-ins/Temporal/t.js",
        "/*---\nfeatures: [Temporal]\n---*/\n//@throw TypeError runtime\n",
    );
    let report = suite.run();
    assert_eq!(report.skipped, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.exit_code(), 0);
    assert!(report.verdicts[0]
        .diagnostic
        .as_deref()
        .expect("diagnostic")
        .contains("unsupported-feature:Temporal"));
}

#[test]
fn supported_feature_runs() {
    let suite = Suite::new();
    suite.add_test(
        "built-ins/Symbol/s.js",
        "/*---\nfeatures: [Symbol]\nflags: [onlyStrict]\n---*/\n//@require assert\n",
    );
    let engine = MockEngine::new(EngineCapabilities::with_features(["Symbol"]));
    let report = suite.run_with(engine, RunnerConfig::default());
    assert_eq!(report.passed, 1);
    assert_eq!(report.skipped, 0);
}

#[test]
fn can_block_mismatch_is_skipped() {
    let suite = Suite::new();
    suite.add_test(
        "built-ins/Atomics/wait.js",
        "/*---\nflags: [CanBlockIsTrue, onlyStrict]\n---*/\n",
    );
    let report = suite.run();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn missing_include_is_infrastructure_and_run_continues() {
    let suite = Suite::new();
    suite.add_test(
        "language/broken.js",
        "/*---\nincludes: [nope.js]\n---*/\n",
    );
    suite.add_test("language/ok.js", "//@require assert\n");
    let report = suite.run();
    assert_eq!(report.infra_errors.len(), 2);
    assert_eq!(report.passed, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn malformed_frontmatter_is_infrastructure() {
    let suite = Suite::new();
    suite.add_test(
        "language/bad-meta.js",
        "/*---\nnegative: SyntaxError\n---*/\n",
    );
    suite.add_test("language/ok.js", "//@require assert\n");
    let report = suite.run();
    assert_eq!(report.infra_errors.len(), 1);
    assert_eq!(report.passed, 2);
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn realms_do_not_leak_between_plans() {
    let suite = Suite::new();
    // Path order runs pollute.js first; its binding must not be visible
    // to probe.js, which runs in fresh realms.
    suite.add_test("language/a-pollute.js", "//@define contaminated\n");
    suite.add_test("language/b-probe.js", "//@require contaminated\n");
    let report = suite.run();
    assert_eq!(report.passed, 2);
    assert_eq!(report.failed, 2);
}

#[test]
fn non_deterministic_failure_is_a_warning() {
    let suite = Suite::new();
    suite.add_test(
        "built-ins/Math/random.js",
        "/*---\nflags: [nonDeterministic, onlyStrict]\n---*/\n//@throw Test262Error runtime\n",
    );
    let report = suite.run();
    assert_eq!(report.warnings, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn fixture_files_are_never_run() {
    let suite = Suite::new();
    suite.add_test(
        "language/module-code/dep_FIXTURE.js",
        "//@throw TypeError runtime\n",
    );
    suite.add_test("language/module-code/ok.js", "//@require assert\n");
    let report = suite.run();
    assert_eq!(report.total, 2);
    assert_eq!(report.failed, 0);
}

#[test]
fn tap_output_covers_every_plan() {
    let suite = Suite::new();
    suite.add_test(
        "language/ok.js",
        "/*---\nflags: [onlyStrict]\n---*/\n",
    );
    suite.add_test(
        "language/bad.js",
        "/*---\nflags: [onlyStrict]\n---*/\n//@throw TypeError runtime\n",
    );
    suite.add_test(
        "language/skipped.js",
        "/*---\nfeatures: [Temporal]\nflags: [onlyStrict]\n---*/\n",
    );
    let report = suite.run();
    let tap = report.to_tap();
    assert!(tap.starts_with("TAP version 13\n1..3\n"));
    // One passing entry, one skip directive, one failure.
    assert_eq!(tap.matches("\nok ").count(), 2);
    assert!(tap.contains("# SKIP"));
    assert!(tap.contains("not ok"));
}

#[test]
fn filter_restricts_the_run() {
    let suite = Suite::new();
    suite.add_test("language/a.js", "");
    suite.add_test("built-ins/b.js", "");
    let config = RunnerConfig {
        filter: Some("built-ins".to_string()),
        ..RunnerConfig::default()
    };
    let report = suite.run_with(MockEngine::bare(), config);
    assert_eq!(report.chapters.len(), 1);
    assert!(report.chapters.contains_key("built-ins"));
}

#[test]
fn run_deadline_forces_timeouts_for_outstanding_plans() {
    let suite = Suite::new();
    for i in 0..4 {
        suite.add_test(
            &format!("language/hang-{i}.js"),
            "/*---\nflags: [async, onlyStrict]\n---*/\n",
        );
    }
    let config = RunnerConfig {
        jobs: 1,
        plan_timeout: Duration::from_secs(30),
        run_deadline: Some(Duration::from_millis(100)),
        poll_interval: Duration::from_millis(1),
        ..RunnerConfig::default()
    };
    let report = suite.run_with(MockEngine::bare(), config);
    assert_eq!(report.total, 4);
    assert_eq!(report.timeouts, 4);
    assert_eq!(report.exit_code(), 1);
}
