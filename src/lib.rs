//! Cinnabar: an ECMAScript conformance test harness
//!
//! Cinnabar runs test262-style conformance suites against any JavaScript
//! engine reachable through its [`engine`] boundary. It owns everything a
//! suite run needs except the engine itself: frontmatter parsing, harness
//! include resolution, strict/sloppy plan expansion, capability gating,
//! realm provisioning, scheduling, verdict classification, and reporting.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use cinnabar::engine::command::{CommandEngine, CommandEngineConfig};
//! use cinnabar::engine::EngineCapabilities;
//! use cinnabar::runner::{Runner, RunnerConfig};
//!
//! fn main() -> cinnabar::Result<()> {
//!     let engine = Arc::new(CommandEngine::new(
//!         CommandEngineConfig::new("jsc"),
//!         EngineCapabilities::with_features(["Symbol", "Proxy"]),
//!     ));
//!     let runner = Runner::new(engine, "test262/harness", RunnerConfig::default());
//!     let report = runner.run_suite(Path::new("test262/test"))?;
//!     println!("{}", report.format_summary());
//!     std::process::exit(report.exit_code());
//! }
//! ```
//!
//! # Pipeline
//!
//! Source file → [`metadata`] → [`planner`] → [`gate`] → [`realm`] →
//! [`runner`] → [`verdict`] → [`report`]
//!
//! Each test file expands into independent execution plans (one per
//! strictness mode), each plan gets a fresh realm, and plan isolation is
//! what makes the worker pool in [`runner`] safe.

pub mod engine;
pub mod error;
pub mod gate;
pub mod includes;
pub mod metadata;
pub mod planner;
pub mod realm;
pub mod report;
pub mod runner;
pub mod verdict;

pub use error::{Error, Result};
pub use metadata::{TestDescriptor, TestFlags};
pub use planner::{ExecutionMode, ExecutionPlan};
pub use report::RunReport;
pub use runner::{Runner, RunnerConfig};
pub use verdict::{Outcome, Verdict};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
