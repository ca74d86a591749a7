//! Execution planning
//!
//! One descriptor expands into zero, one, or two concrete plans. The
//! strict/sloppy axis is an enumerated [`ExecutionMode`] expanded
//! exhaustively here, so capability flags compose with it predictably
//! instead of through ad hoc boolean checks. The dual strict/sloppy run for
//! unflagged tests is the primary defense against mode-only regressions
//! and is never collapsed into a single plan.

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::engine::SourceType;
use crate::metadata::TestDescriptor;

/// Prologue prepended to the strict-mode copy of a script body.
pub const STRICT_PROLOGUE: &str = "\"use strict\";\n";

// ---------------------------------------------------------------------------
// ExecutionMode
// ---------------------------------------------------------------------------

/// Strictness mode of one plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecutionMode {
    /// Body runs with a `"use strict";` prologue (or is a module).
    Strict,
    /// Body runs verbatim.
    Sloppy,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Strict => write!(f, "strict"),
            ExecutionMode::Sloppy => write!(f, "sloppy"),
        }
    }
}

// ---------------------------------------------------------------------------
// PlanId
// ---------------------------------------------------------------------------

/// Run-unique identifier for one plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PlanId(u64);

impl PlanId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        PlanId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ExecutionPlan
// ---------------------------------------------------------------------------

/// One concrete (mode, source type) execution of a descriptor.
///
/// Created here, consumed by the runner, never mutated.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// Run-unique plan id.
    pub id: PlanId,
    /// The descriptor this plan executes.
    pub descriptor: Arc<TestDescriptor>,
    /// Strictness mode.
    pub mode: ExecutionMode,
    /// Script or module evaluation.
    pub source_type: SourceType,
    /// Whether the body must signal completion through `$DONE`.
    pub async_expected: bool,
}

impl ExecutionPlan {
    fn new(
        descriptor: &Arc<TestDescriptor>,
        mode: ExecutionMode,
        source_type: SourceType,
    ) -> Self {
        Self {
            id: PlanId::next(),
            descriptor: Arc::clone(descriptor),
            mode,
            source_type,
            async_expected: descriptor.is_async(),
        }
    }

    /// The source text handed to the engine for this plan.
    ///
    /// Only strict Script plans get the prologue; modules are inherently
    /// strict and raw bodies are byte-exact.
    pub fn compose_source(&self) -> Cow<'_, str> {
        if self.mode == ExecutionMode::Strict && self.source_type == SourceType::Script {
            let mut source =
                String::with_capacity(STRICT_PROLOGUE.len() + self.descriptor.source.len());
            source.push_str(STRICT_PROLOGUE);
            source.push_str(&self.descriptor.source);
            Cow::Owned(source)
        } else {
            Cow::Borrowed(self.descriptor.source.as_str())
        }
    }
}

// ---------------------------------------------------------------------------
// plan()
// ---------------------------------------------------------------------------

/// Expand a descriptor into its concrete plans.
pub fn plan(descriptor: &Arc<TestDescriptor>) -> Vec<ExecutionPlan> {
    if descriptor.is_raw() {
        // Byte-exact sloppy script; the realm factory seeds nothing.
        return vec![ExecutionPlan::new(
            descriptor,
            ExecutionMode::Sloppy,
            SourceType::Script,
        )];
    }

    if descriptor.is_module() {
        // Module code is inherently strict; onlyStrict/noStrict are
        // ignored for this flag.
        return vec![ExecutionPlan::new(
            descriptor,
            ExecutionMode::Strict,
            SourceType::Module,
        )];
    }

    if descriptor.only_strict() {
        return vec![ExecutionPlan::new(
            descriptor,
            ExecutionMode::Strict,
            SourceType::Script,
        )];
    }
    if descriptor.no_strict() {
        return vec![ExecutionPlan::new(
            descriptor,
            ExecutionMode::Sloppy,
            SourceType::Script,
        )];
    }

    vec![
        ExecutionPlan::new(descriptor, ExecutionMode::Strict, SourceType::Script),
        ExecutionPlan::new(descriptor, ExecutionMode::Sloppy, SourceType::Script),
    ]
}
