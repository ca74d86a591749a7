//! Engine boundary
//!
//! Cinnabar never links a JavaScript engine; it talks to one through the
//! [`Engine`] and [`Realm`] traits. The whole contract is "evaluate this
//! source text, hand back a completion or a throw" plus a host message
//! channel that carries `print`-style output (used by the async completion
//! protocol). The harness never introspects engine internals.

pub mod command;

use std::fmt;

use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::error::Result;

// ---------------------------------------------------------------------------
// SourceType
// ---------------------------------------------------------------------------

/// How a source text is presented to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceType {
    /// Classic script evaluated in the realm's global scope.
    Script,
    /// ES module (inherently strict, resolution phase applies).
    Module,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Script => write!(f, "script"),
            SourceType::Module => write!(f, "module"),
        }
    }
}

// ---------------------------------------------------------------------------
// Completions
// ---------------------------------------------------------------------------

/// Phase at which a throw was raised, as reported by the engine.
///
/// Engines are expected to report their best effort; the classifier only
/// relies on the parse/non-parse distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorPhase {
    /// Raised while parsing, before any statement ran.
    Parse,
    /// Raised while resolving module imports.
    Resolution,
    /// Raised during evaluation.
    Runtime,
}

impl fmt::Display for ErrorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPhase::Parse => write!(f, "parse"),
            ErrorPhase::Resolution => write!(f, "resolution"),
            ErrorPhase::Runtime => write!(f, "runtime"),
        }
    }
}

/// Normal completion of an evaluation.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    /// String rendering of the completion value, when the engine offers one.
    pub value: Option<String>,
}

/// An abrupt completion: the engine threw.
#[derive(Debug, Clone)]
pub struct Thrown {
    /// Constructor name of the thrown value (e.g. `"SyntaxError"`), or the
    /// engine's closest description for non-Error throws.
    pub name: String,
    /// The error message.
    pub message: String,
    /// Phase at which the throw arose.
    pub phase: ErrorPhase,
    /// Stack trace text, when available.
    pub stack: Option<String>,
}

impl Thrown {
    /// Construct a throw with no stack information.
    pub fn new(name: impl Into<String>, message: impl Into<String>, phase: ErrorPhase) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            phase,
            stack: None,
        }
    }
}

impl fmt::Display for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({} phase)", self.name, self.message, self.phase)?;
        if let Some(ref stack) = self.stack {
            write!(f, "\n{}", stack)?;
        }
        Ok(())
    }
}

/// Result of one evaluation at the engine boundary.
pub type EvalOutcome = std::result::Result<Completion, Thrown>;

// ---------------------------------------------------------------------------
// EngineCapabilities
// ---------------------------------------------------------------------------

/// Capabilities an engine declares up front.
///
/// The feature names follow the test262 `features.txt` vocabulary; a test
/// listing a feature absent from this set is skipped before any source
/// reaches the engine.
#[derive(Debug, Clone, Default)]
pub struct EngineCapabilities {
    /// Supported feature names.
    pub features: FxHashSet<String>,
    /// Whether the hosting agent may block (Atomics.wait and friends).
    pub can_block: bool,
}

impl EngineCapabilities {
    /// Build a capability set from an iterator of feature names.
    pub fn with_features<I, S>(features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            features: features.into_iter().map(Into::into).collect(),
            can_block: false,
        }
    }

    /// Declare the blocking capability.
    pub fn can_block(mut self, can_block: bool) -> Self {
        self.can_block = can_block;
        self
    }

    /// Check a single feature name.
    pub fn supports(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }
}

// ---------------------------------------------------------------------------
// Engine / Realm traits
// ---------------------------------------------------------------------------

/// A JavaScript engine viewed through the harness boundary.
///
/// Implementations must be shareable across the worker pool; each worker
/// asks for its own realms.
pub trait Engine: Send + Sync {
    /// The engine's declared capabilities.
    fn capabilities(&self) -> &EngineCapabilities;

    /// Produce a fresh, isolated global environment.
    fn create_realm(&self) -> Result<Box<dyn Realm>>;
}

/// One isolated global environment.
///
/// Realms are single-owner and move onto the worker thread that runs the
/// plan; nothing is shared between realms.
pub trait Realm: Send {
    /// Evaluate a harness seed script (include file, shim prelude) in the
    /// realm's global scope. Seeds always evaluate as classic sloppy-mode
    /// scripts, even when the test body is a module.
    fn seed(&mut self, name: &str, source: &str) -> EvalOutcome;

    /// Evaluate the composed test body and report its outcome.
    fn evaluate(&mut self, source: &str, source_type: SourceType) -> EvalOutcome;

    /// Drain host messages (`print` output) emitted since the last call.
    /// The async completion protocol rides on this channel.
    fn take_messages(&mut self) -> Vec<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_feature_lookup() {
        let caps = EngineCapabilities::with_features(["Symbol", "Proxy"]);
        assert!(caps.supports("Symbol"));
        assert!(!caps.supports("Temporal"));
        assert!(!caps.can_block);
    }

    #[test]
    fn capabilities_can_block_builder() {
        let caps = EngineCapabilities::default().can_block(true);
        assert!(caps.can_block);
    }

    #[test]
    fn thrown_display_includes_phase() {
        let thrown = Thrown::new("TypeError", "x is not a function", ErrorPhase::Runtime);
        let text = thrown.to_string();
        assert!(text.contains("TypeError"));
        assert!(text.contains("runtime"));
    }
}
