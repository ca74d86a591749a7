//! Plan execution and scheduling
//!
//! Plans are independent by construction (fresh realm each), so the runner
//! fans them out over a fixed pool of worker threads. Workers are detached:
//! a hung engine evaluation can strand its worker, but it can never strand
//! the run, because the collector enforces the global deadline on its own
//! clock and synthesizes timeout verdicts for whatever never came back.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, RecvTimeoutError};
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::engine::{Engine, Realm};
use crate::error::Result;
use crate::gate::FeatureGate;
use crate::includes::IncludeResolver;
use crate::metadata::TestDescriptor;
use crate::planner::{self, ExecutionMode, ExecutionPlan, PlanId};
use crate::realm::RealmFactory;
use crate::report::RunReport;
use crate::verdict::{classify, RawOutcome, Verdict};

/// Host message signalling successful async completion.
pub const ASYNC_COMPLETE: &str = "Test262:AsyncTestComplete";

/// Host message prefix signalling async failure; the remainder is the
/// failure description.
pub const ASYNC_FAILURE_PREFIX: &str = "Test262:AsyncTestFailure:";

/// Fixture files are imported by module tests, never run directly.
const FIXTURE_SUFFIX: &str = "_FIXTURE.js";

// ---------------------------------------------------------------------------
// RunnerConfig
// ---------------------------------------------------------------------------

/// Runner tuning knobs.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Worker thread count.
    pub jobs: usize,
    /// Per-plan budget for the async completion signal.
    pub plan_timeout: Duration,
    /// Whole-run wall-clock budget. `None` means unbounded.
    pub run_deadline: Option<Duration>,
    /// Sleep between polls of the host message channel.
    pub poll_interval: Duration,
    /// Substring filter over relative test paths.
    pub filter: Option<String>,
    /// Cap on the number of test files executed.
    pub max: Option<usize>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            jobs: thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            plan_timeout: Duration::from_secs(5),
            run_deadline: None,
            poll_interval: Duration::from_millis(5),
            filter: None,
            max: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// One message back from a worker.
enum PlanResult {
    Verdict(Verdict),
    Infra {
        plan_id: PlanId,
        path: PathBuf,
        message: String,
    },
}

/// Drives discovery, planning, gating, and the worker pool for one run.
pub struct Runner {
    factory: Arc<RealmFactory>,
    gate: FeatureGate,
    config: RunnerConfig,
}

impl Runner {
    pub fn new(engine: Arc<dyn Engine>, harness_root: impl Into<PathBuf>, config: RunnerConfig) -> Self {
        let gate = FeatureGate::new(engine.capabilities().clone());
        let resolver = Arc::new(IncludeResolver::new(harness_root));
        let factory = Arc::new(RealmFactory::new(engine, resolver));
        Self {
            factory,
            gate,
            config,
        }
    }

    /// Walk the suite root and return runnable test files in path order.
    ///
    /// Fixture files and non-`.js` entries are excluded here; the filter
    /// and cap are applied later, over relative paths.
    pub fn discover(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                crate::error::Error::io(
                    e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf()),
                    e.into(),
                )
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !name.ends_with(".js") || name.ends_with(FIXTURE_SUFFIX) {
                continue;
            }
            files.push(entry.into_path());
        }
        Ok(files)
    }

    /// Run every test under `root` and aggregate the results.
    pub fn run_suite(&self, root: &Path) -> Result<RunReport> {
        let started = Instant::now();
        let deadline_at = self.config.run_deadline.map(|d| started + d);

        let mut files = self.discover(root)?;
        if let Some(ref needle) = self.config.filter {
            files.retain(|f| relative(root, f).to_string_lossy().contains(needle.as_str()));
        }
        if let Some(max) = self.config.max {
            files.truncate(max);
        }
        info!(tests = files.len(), root = %root.display(), "starting run");

        let mut report = RunReport::default();
        let (job_tx, job_rx) = unbounded::<ExecutionPlan>();
        let (result_tx, result_rx) = unbounded::<PlanResult>();

        for worker in 0..self.config.jobs.max(1) {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let factory = Arc::clone(&self.factory);
            let config = self.config.clone();
            thread::Builder::new()
                .name(format!("cinnabar-worker-{worker}"))
                .spawn(move || {
                    while let Ok(plan) = job_rx.recv() {
                        let plan_id = plan.id;
                        let path = plan.descriptor.path.clone();
                        let message = match execute_plan(&factory, &plan, &config) {
                            Ok(verdict) => PlanResult::Verdict(verdict),
                            Err(e) => PlanResult::Infra {
                                plan_id,
                                path,
                                message: e.to_string(),
                            },
                        };
                        if result_tx.send(message).is_err() {
                            break;
                        }
                    }
                })
                .map_err(|e| crate::error::Error::Engine(format!("worker spawn failed: {e}")))?;
        }
        drop(job_rx);
        drop(result_tx);

        // Gate and dispatch. Skips are verdicts in their own right and are
        // recorded without touching the pool.
        let mut outstanding: FxHashMap<PlanId, (PathBuf, ExecutionMode)> = FxHashMap::default();
        for file in &files {
            let descriptor = match load_descriptor(root, file) {
                Ok(d) => d,
                Err(e) => {
                    warn!(path = %file.display(), error = %e, "unreadable test");
                    report.record_infra(relative(root, file), e.to_string());
                    continue;
                }
            };

            for plan in planner::plan(&descriptor) {
                if let Some(reason) = self.gate.screen_plan(&plan) {
                    debug!(path = %plan.descriptor.path.display(), %reason, "skipping plan");
                    report.record(Verdict::skipped(&plan, &reason));
                    continue;
                }
                outstanding.insert(plan.id, (plan.descriptor.path.clone(), plan.mode));
                if job_tx.send(plan).is_err() {
                    break;
                }
            }
        }
        drop(job_tx);

        // Collect until every dispatched plan is accounted for or the run
        // deadline fires, whichever comes first.
        while !outstanding.is_empty() {
            let received = match deadline_at {
                Some(at) => result_rx.recv_deadline(at),
                None => result_rx
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(PlanResult::Verdict(verdict)) => {
                    outstanding.remove(&verdict.plan_id);
                    report.record(verdict);
                }
                Ok(PlanResult::Infra {
                    plan_id,
                    path,
                    message,
                }) => {
                    outstanding.remove(&plan_id);
                    warn!(path = %path.display(), %message, "infrastructure error");
                    report.record_infra(path, message);
                }
                Err(_) => {
                    warn!(
                        outstanding = outstanding.len(),
                        "run deadline reached, forcing timeouts"
                    );
                    for (plan_id, (path, mode)) in outstanding.drain() {
                        report.record(Verdict::forced_timeout(plan_id, path, mode));
                    }
                }
            }
        }

        report.elapsed = started.elapsed();
        info!(
            passed = report.passed,
            failed = report.failed,
            skipped = report.skipped,
            elapsed = ?report.elapsed,
            "run complete"
        );
        Ok(report)
    }

    /// Run a single test file synchronously, one verdict per plan.
    pub fn run_file(&self, root: &Path, file: &Path) -> Result<Vec<Verdict>> {
        let descriptor = load_descriptor(root, file)?;
        let mut verdicts = Vec::new();
        for plan in planner::plan(&descriptor) {
            if let Some(reason) = self.gate.screen_plan(&plan) {
                verdicts.push(Verdict::skipped(&plan, &reason));
            } else {
                verdicts.push(execute_plan(&self.factory, &plan, &self.config)?);
            }
        }
        Ok(verdicts)
    }
}

fn relative(root: &Path, file: &Path) -> PathBuf {
    file.strip_prefix(root).unwrap_or(file).to_path_buf()
}

/// Read and parse a test, keyed by its suite-relative path.
fn load_descriptor(root: &Path, file: &Path) -> Result<Arc<TestDescriptor>> {
    let source =
        std::fs::read_to_string(file).map_err(|e| crate::error::Error::io(file, e))?;
    TestDescriptor::parse(relative(root, file), source)
}

// ---------------------------------------------------------------------------
// Plan execution
// ---------------------------------------------------------------------------

/// Provision a realm, evaluate the composed body, and classify.
///
/// An `Err` here is an infrastructure failure (realm provisioning or a
/// missing include); throws from the test body itself flow through the
/// classifier as raw outcomes.
fn execute_plan(
    factory: &RealmFactory,
    plan: &ExecutionPlan,
    config: &RunnerConfig,
) -> Result<Verdict> {
    let mut realm = factory.provision(plan)?;
    let source = plan.compose_source();
    let deadline = Instant::now() + config.plan_timeout;

    debug!(
        plan = %plan.id,
        path = %plan.descriptor.path.display(),
        mode = %plan.mode,
        "evaluating"
    );
    let raw = match realm.evaluate(&source, plan.source_type) {
        Err(thrown) => RawOutcome::Thrown(thrown),
        Ok(_) if !plan.async_expected => RawOutcome::Completed,
        Ok(_) => await_async(realm.as_mut(), deadline, config.poll_interval),
    };
    Ok(classify(plan, raw))
}

/// Poll the host message channel for the async completion signal.
///
/// The first sentinel wins; any later signal from the same body is ignored
/// by construction since polling stops here.
fn await_async(realm: &mut dyn Realm, deadline: Instant, poll_interval: Duration) -> RawOutcome {
    loop {
        for message in realm.take_messages() {
            let message = message.trim();
            if message == ASYNC_COMPLETE {
                return RawOutcome::Completed;
            }
            if let Some(rest) = message.strip_prefix(ASYNC_FAILURE_PREFIX) {
                return RawOutcome::AsyncFailed {
                    message: rest.trim().to_string(),
                };
            }
        }
        if Instant::now() >= deadline {
            return RawOutcome::TimedOut;
        }
        thread::sleep(poll_interval);
    }
}
