//! Capability gating
//!
//! A plan whose descriptor names a feature the engine does not declare, or
//! demands a blocking capability the host does not match, must never reach
//! the engine: an unsupported feature crashing the engine would be misread
//! as a genuine conformance failure. Such plans become Skip before
//! execution.

use std::fmt;

use crate::engine::EngineCapabilities;
use crate::metadata::TestDescriptor;
use crate::planner::ExecutionPlan;

/// Why a plan was skipped without running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A required feature is not in the engine's declared set.
    UnsupportedFeature(String),
    /// The test demands a blocking capability the host does not match.
    BlockingCapability { required: bool, available: bool },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnsupportedFeature(name) => write!(f, "unsupported-feature:{name}"),
            SkipReason::BlockingCapability {
                required,
                available,
            } => write!(
                f,
                "blocking-capability-mismatch (requires can-block={required}, host has {available})"
            ),
        }
    }
}

/// Screens descriptors and plans against declared engine capabilities.
#[derive(Debug, Clone)]
pub struct FeatureGate {
    capabilities: EngineCapabilities,
}

impl FeatureGate {
    pub fn new(capabilities: EngineCapabilities) -> Self {
        Self { capabilities }
    }

    /// First unsupported feature named by the descriptor, if any.
    ///
    /// All of a descriptor's plans share this answer; the first offending
    /// feature in declaration order is reported.
    pub fn screen_descriptor(&self, descriptor: &TestDescriptor) -> Option<SkipReason> {
        descriptor
            .features
            .iter()
            .find(|feature| !self.capabilities.supports(feature))
            .map(|feature| SkipReason::UnsupportedFeature(feature.clone()))
    }

    /// Full screening for one plan: features plus blocking capability.
    pub fn screen_plan(&self, plan: &ExecutionPlan) -> Option<SkipReason> {
        if let Some(reason) = self.screen_descriptor(&plan.descriptor) {
            return Some(reason);
        }
        if let Some(required) = plan.descriptor.can_block_requirement() {
            if required != self.capabilities.can_block {
                return Some(SkipReason::BlockingCapability {
                    required,
                    available: self.capabilities.can_block,
                });
            }
        }
        None
    }
}
