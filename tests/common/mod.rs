//! Shared test support: a scriptable in-process engine.
//!
//! `MockEngine` interprets a tiny directive language instead of JavaScript,
//! which keeps integration tests hermetic and fast. Directives appear one
//! per line:
//!
//! ```text
//! //@define NAME          bind NAME in this realm
//! //@require NAME         throw ReferenceError if NAME is unbound
//! //@throw NAME PHASE     throw unconditionally (phase: parse|resolution|runtime)
//! //@throw-strict NAME PHASE   throw only when the body carries the strict prologue
//! //@throw-sloppy NAME PHASE   throw only when it does not
//! //@print TEXT           emit TEXT on the host message channel
//! //@done                 emit the async success sentinel
//! //@done-fail TEXT       emit the async failure sentinel with TEXT
//! ```
//!
//! Every line that is not a directive is ignored, so directive bodies can
//! carry arbitrary filler text.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use cinnabar::engine::{
    Completion, Engine, EngineCapabilities, ErrorPhase, EvalOutcome, Realm, SourceType, Thrown,
};
use cinnabar::Result;

pub struct MockEngine {
    capabilities: EngineCapabilities,
}

impl MockEngine {
    pub fn new(capabilities: EngineCapabilities) -> Arc<Self> {
        Arc::new(Self { capabilities })
    }

    /// Engine with no features and a non-blocking agent.
    pub fn bare() -> Arc<Self> {
        Self::new(EngineCapabilities::default())
    }
}

impl Engine for MockEngine {
    fn capabilities(&self) -> &EngineCapabilities {
        &self.capabilities
    }

    fn create_realm(&self) -> Result<Box<dyn Realm>> {
        Ok(Box::new(MockRealm {
            bound: FxHashSet::default(),
            messages: Vec::new(),
        }))
    }
}

struct MockRealm {
    bound: FxHashSet<String>,
    messages: Vec<String>,
}

impl MockRealm {
    fn interpret(&mut self, source: &str, strict: bool) -> EvalOutcome {
        for line in source.lines() {
            let Some(directive) = line.trim().strip_prefix("//@") else {
                continue;
            };
            let (verb, rest) = match directive.split_once(' ') {
                Some((verb, rest)) => (verb, rest.trim()),
                None => (directive.trim(), ""),
            };
            match verb {
                "define" => {
                    self.bound.insert(rest.to_string());
                }
                "require" => {
                    if !self.bound.contains(rest) {
                        return Err(Thrown::new(
                            "ReferenceError",
                            format!("{rest} is not defined"),
                            ErrorPhase::Runtime,
                        ));
                    }
                }
                "throw" => return Err(parse_throw(rest)),
                "throw-strict" if strict => return Err(parse_throw(rest)),
                "throw-sloppy" if !strict => return Err(parse_throw(rest)),
                "throw-strict" | "throw-sloppy" => {}
                "print" => self.messages.push(rest.to_string()),
                "done" => self
                    .messages
                    .push("Test262:AsyncTestComplete".to_string()),
                "done-fail" => self
                    .messages
                    .push(format!("Test262:AsyncTestFailure: {rest}")),
                other => panic!("unknown mock directive: {other}"),
            }
        }
        Ok(Completion::default())
    }
}

fn parse_throw(rest: &str) -> Thrown {
    let (name, phase) = rest.split_once(' ').unwrap_or((rest, "runtime"));
    let phase = match phase.trim() {
        "parse" => ErrorPhase::Parse,
        "resolution" => ErrorPhase::Resolution,
        _ => ErrorPhase::Runtime,
    };
    Thrown::new(name, "mock throw", phase)
}

impl Realm for MockRealm {
    fn seed(&mut self, _name: &str, source: &str) -> EvalOutcome {
        self.interpret(source, false)
    }

    fn evaluate(&mut self, source: &str, source_type: SourceType) -> EvalOutcome {
        let strict =
            source_type == SourceType::Module || source.starts_with("\"use strict\";");
        self.interpret(source, strict)
    }

    fn take_messages(&mut self) -> Vec<String> {
        std::mem::take(&mut self.messages)
    }
}
