//! Verdict classification
//!
//! Pure mapping from a plan's raw outcome to a [`Verdict`]. Three disjoint
//! judgements exist at this layer: the outcome matched a declared
//! `negative` contract (Pass), it diverged from the contract (Fail with
//! full diagnostic), or the plan never ran (Skip). Infrastructure errors
//! never pass through here; they are reported separately by the runner.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::engine::{ErrorPhase, Thrown};
use crate::gate::SkipReason;
use crate::metadata::{NegativeExpectation, NegativePhase};
use crate::planner::{ExecutionMode, ExecutionPlan, PlanId};

// ---------------------------------------------------------------------------
// Outcome / Verdict
// ---------------------------------------------------------------------------

/// Classified outcome of one plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Pass,
    Fail,
    Skip,
    TimedOut,
}

impl Outcome {
    /// Whether this outcome blocks a green exit code.
    pub fn is_failing(&self) -> bool {
        matches!(self, Outcome::Fail | Outcome::TimedOut)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pass => write!(f, "PASS"),
            Outcome::Fail => write!(f, "FAIL"),
            Outcome::Skip => write!(f, "SKIP"),
            Outcome::TimedOut => write!(f, "TIMEOUT"),
        }
    }
}

/// Final judgement for one plan. Produced exactly once per plan.
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub plan_id: PlanId,
    pub path: PathBuf,
    pub mode: ExecutionMode,
    pub outcome: Outcome,
    /// A `nonDeterministic` failure downgraded to a non-blocking warning.
    /// The downgrade is explicit, never applied by default.
    pub advisory: bool,
    /// Failure or skip explanation for triage.
    pub diagnostic: Option<String>,
}

impl Verdict {
    /// Skip verdict for a plan screened out before execution.
    pub fn skipped(plan: &ExecutionPlan, reason: &SkipReason) -> Self {
        Verdict {
            plan_id: plan.id,
            path: plan.descriptor.path.clone(),
            mode: plan.mode,
            outcome: Outcome::Skip,
            advisory: false,
            diagnostic: Some(reason.to_string()),
        }
    }

    /// Forced timeout for a plan still outstanding at run shutdown.
    pub fn forced_timeout(plan_id: PlanId, path: PathBuf, mode: ExecutionMode) -> Self {
        Verdict {
            plan_id,
            path,
            mode,
            outcome: Outcome::TimedOut,
            advisory: false,
            diagnostic: Some("still running at run deadline".to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// RawOutcome
// ---------------------------------------------------------------------------

/// Terminal state of the runner's per-plan state machine.
#[derive(Debug, Clone)]
pub enum RawOutcome {
    /// Evaluation completed normally (and the async success signal was
    /// observed, when one was expected).
    Completed,
    /// `$DONE` was invoked with a failure value.
    AsyncFailed { message: String },
    /// The engine threw.
    Thrown(Thrown),
    /// The async completion signal never arrived within the deadline.
    TimedOut,
}

// ---------------------------------------------------------------------------
// classify()
// ---------------------------------------------------------------------------

/// Map a raw outcome to the plan's verdict.
pub fn classify(plan: &ExecutionPlan, raw: RawOutcome) -> Verdict {
    let (outcome, diagnostic) = match (&plan.descriptor.negative, raw) {
        // TimedOut is always a failure regardless of `negative`.
        (_, RawOutcome::TimedOut) => (
            Outcome::TimedOut,
            Some("completion signal never arrived".to_string()),
        ),

        (None, RawOutcome::Completed) => (Outcome::Pass, None),
        (None, RawOutcome::AsyncFailed { message }) => {
            (Outcome::Fail, Some(format!("$DONE reported failure: {message}")))
        }
        (None, RawOutcome::Thrown(thrown)) => {
            (Outcome::Fail, Some(format!("unexpected throw: {thrown}")))
        }

        (Some(expected), RawOutcome::Thrown(thrown)) => classify_negative(expected, thrown),
        (Some(expected), RawOutcome::Completed) => (
            Outcome::Fail,
            Some(format!(
                "expected {} during {} phase, but evaluation completed normally",
                expected.kind,
                phase_name(expected.phase)
            )),
        ),
        (Some(expected), RawOutcome::AsyncFailed { message }) => (
            Outcome::Fail,
            Some(format!(
                "expected {} but $DONE reported failure: {message}",
                expected.kind
            )),
        ),
    };

    let advisory = outcome == Outcome::Fail && plan.descriptor.non_deterministic();
    Verdict {
        plan_id: plan.id,
        path: plan.descriptor.path.clone(),
        mode: plan.mode,
        outcome,
        advisory,
        diagnostic,
    }
}

fn classify_negative(expected: &NegativeExpectation, thrown: Thrown) -> (Outcome, Option<String>) {
    if thrown.name != expected.kind {
        return (
            Outcome::Fail,
            Some(format!("expected {}, got {thrown}", expected.kind)),
        );
    }

    match expected.phase {
        // A parse-phase expectation is satisfied only when the error arose
        // before any statement ran. A matching error thrown after partial
        // execution is a runtime failure, not a parse failure.
        NegativePhase::Parse => {
            if thrown.phase == ErrorPhase::Parse {
                (Outcome::Pass, None)
            } else {
                (
                    Outcome::Fail,
                    Some(format!(
                        "{} was raised during the {} phase, after evaluation began",
                        expected.kind, thrown.phase
                    )),
                )
            }
        }
        // For resolution/runtime expectations the constructor name is the
        // contract; engines differ in how precisely they report the phase.
        NegativePhase::Resolution | NegativePhase::Runtime => (Outcome::Pass, None),
    }
}

fn phase_name(phase: NegativePhase) -> &'static str {
    match phase {
        NegativePhase::Parse => "parse",
        NegativePhase::Resolution => "resolution",
        NegativePhase::Runtime => "runtime",
    }
}

/// Conjunction of plan outcomes into a test-level outcome.
///
/// One mode passing never masks the other's failure; advisory failures do
/// not participate.
pub fn aggregate<'a, I>(verdicts: I) -> Outcome
where
    I: IntoIterator<Item = &'a Verdict>,
{
    let mut saw_pass = false;
    let mut saw_skip = false;
    for verdict in verdicts {
        match verdict.outcome {
            Outcome::Fail | Outcome::TimedOut if !verdict.advisory => return Outcome::Fail,
            Outcome::Fail | Outcome::TimedOut => {}
            Outcome::Pass => saw_pass = true,
            Outcome::Skip => saw_skip = true,
        }
    }
    if saw_pass {
        Outcome::Pass
    } else if saw_skip {
        Outcome::Skip
    } else {
        Outcome::Pass
    }
}
