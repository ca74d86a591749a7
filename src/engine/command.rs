//! External-process engine adapter
//!
//! Drives any JavaScript shell that offers `print` and file evaluation
//! (`jsc`, `d8`, `js`). A realm corresponds to exactly one shell
//! invocation: seeds are buffered, then the evaluate call writes a single
//! composite file and runs the shell over it. Isolation comes from the
//! process boundary itself.
//!
//! Throws are reported back through a sentinel line on stdout for scripts
//! (the driver wraps the body in a syntax check plus indirect eval) and
//! through exit status plus stderr for modules, where no driver can wrap
//! the body.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::engine::{
    Completion, Engine, EngineCapabilities, ErrorPhase, EvalOutcome, Realm, SourceType, Thrown,
};
use crate::error::{Error, Result};

/// Stdout marker emitted by the script driver when the body throws.
/// Format: `Cinnabar:Thrown:<phase>:<name>:<message>`.
const THROWN_MARKER: &str = "Cinnabar:Thrown:";

/// Configuration for an external shell.
#[derive(Debug, Clone)]
pub struct CommandEngineConfig {
    /// Shell executable.
    pub program: PathBuf,
    /// Arguments passed before the file path.
    pub args: Vec<String>,
    /// Flag that switches the shell into module evaluation (`--module`
    /// for jsc and d8). `None` means the shell cannot evaluate modules.
    pub module_flag: Option<String>,
    /// Hard cap on one shell invocation.
    pub eval_timeout: Duration,
}

impl CommandEngineConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            module_flag: Some("--module".to_string()),
            eval_timeout: Duration::from_secs(10),
        }
    }
}

/// Engine backed by an external shell executable.
pub struct CommandEngine {
    config: CommandEngineConfig,
    capabilities: EngineCapabilities,
}

impl CommandEngine {
    pub fn new(config: CommandEngineConfig, capabilities: EngineCapabilities) -> Self {
        Self {
            config,
            capabilities,
        }
    }
}

impl Engine for CommandEngine {
    fn capabilities(&self) -> &EngineCapabilities {
        &self.capabilities
    }

    fn create_realm(&self) -> Result<Box<dyn Realm>> {
        Ok(Box::new(CommandRealm {
            config: self.config.clone(),
            seeds: Vec::new(),
            messages: Vec::new(),
        }))
    }
}

/// One pending shell invocation.
struct CommandRealm {
    config: CommandEngineConfig,
    /// Buffered (name, source) seed scripts, in seeding order.
    seeds: Vec<(String, String)>,
    messages: Vec<String>,
}

impl Realm for CommandRealm {
    fn seed(&mut self, name: &str, source: &str) -> EvalOutcome {
        // Contract divergence from in-process realms: the shell runs seeds
        // and body in one invocation, so a throwing seed cannot be caught
        // at seeding time and surfaces as a test failure during body
        // evaluation instead of an infrastructure error. Harness includes
        // are trusted not to throw at load.
        self.seeds.push((name.to_string(), source.to_string()));
        Ok(Completion::default())
    }

    fn evaluate(&mut self, source: &str, source_type: SourceType) -> EvalOutcome {
        match self.run_shell(source, source_type) {
            Ok(outcome) => outcome,
            Err(e) => Err(Thrown::new(
                "EngineError",
                e.to_string(),
                ErrorPhase::Runtime,
            )),
        }
    }

    fn take_messages(&mut self) -> Vec<String> {
        std::mem::take(&mut self.messages)
    }
}

impl CommandRealm {
    fn run_shell(&mut self, source: &str, source_type: SourceType) -> Result<EvalOutcome> {
        let mut file = tempfile::Builder::new()
            .prefix("cinnabar-")
            .suffix(if source_type == SourceType::Module {
                ".mjs"
            } else {
                ".js"
            })
            .tempfile()
            .map_err(|e| Error::Engine(format!("temp file: {e}")))?;

        let composite = match source_type {
            SourceType::Script => self.compose_script(source),
            SourceType::Module => self.compose_module(source),
        };
        file.write_all(composite.as_bytes())
            .map_err(|e| Error::Engine(format!("temp file write: {e}")))?;
        file.flush()
            .map_err(|e| Error::Engine(format!("temp file write: {e}")))?;

        let mut command = Command::new(&self.config.program);
        command.args(&self.config.args);
        if source_type == SourceType::Module {
            match self.config.module_flag {
                Some(ref flag) => {
                    command.arg(flag);
                }
                None => {
                    return Err(Error::Engine(format!(
                        "{} cannot evaluate modules",
                        self.config.program.display()
                    )));
                }
            }
        }
        command
            .arg(file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        trace!(program = %self.config.program.display(), "spawning shell");
        let child = command
            .spawn()
            .map_err(|e| Error::Engine(format!("spawn {}: {e}", self.config.program.display())))?;
        let output = wait_with_deadline(child, self.config.eval_timeout)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(status = ?output.status.code(), "shell finished");

        let mut thrown = None;
        for line in stdout.lines() {
            if let Some(rest) = line.strip_prefix(THROWN_MARKER) {
                thrown = Some(parse_marker(rest));
            } else {
                self.messages.push(line.to_string());
            }
        }
        if let Some(thrown) = thrown {
            return Ok(Err(thrown));
        }

        if !output.status.success() {
            // No marker and a failing exit: the shell itself rejected the
            // file. For modules this is the parse/resolution path.
            return Ok(Err(thrown_from_stderr(&stderr, source_type)));
        }
        Ok(Ok(Completion::default()))
    }

    /// Seeds, then a driver that syntax-checks the body before running it
    /// with indirect eval so parse errors are phase-attributed correctly.
    fn compose_script(&self, body: &str) -> String {
        let mut out = String::new();
        for (name, source) in &self.seeds {
            out.push_str(&format!("// seed: {name}\n"));
            out.push_str(source);
            out.push('\n');
        }
        let body_literal =
            serde_json::to_string(body).unwrap_or_else(|_| "\"\"".to_string());
        out.push_str(&format!(
            r#"(function() {{
    var body = {body_literal};
    try {{
        new Function(body);
    }} catch (e) {{
        if (e instanceof SyntaxError) {{
            print("{THROWN_MARKER}parse:" + e.name + ":" + e.message);
            return;
        }}
    }}
    try {{
        (0, eval)(body);
    }} catch (e) {{
        var name = (e && e.constructor && e.constructor.name) || (e && e.name) || "unknown";
        var message = (e && e.message) !== undefined ? e.message : String(e);
        print("{THROWN_MARKER}runtime:" + name + ":" + message);
    }}
}})();
"#
        ));
        out
    }

    /// Modules cannot be wrapped in a driver. Seed sources are prepended
    /// verbatim before the module body; the harness includes parse cleanly
    /// as module code, and parse errors the shell reports are attributed
    /// via exit status and stderr instead of a marker line.
    fn compose_module(&self, body: &str) -> String {
        let mut out = String::new();
        for (name, source) in &self.seeds {
            out.push_str(&format!("// seed: {name}\n"));
            out.push_str(source);
            out.push('\n');
        }
        out.push_str(body);
        out
    }
}

fn parse_marker(rest: &str) -> Thrown {
    let mut parts = rest.splitn(3, ':');
    let phase = match parts.next() {
        Some("parse") => ErrorPhase::Parse,
        Some("resolution") => ErrorPhase::Resolution,
        _ => ErrorPhase::Runtime,
    };
    let name = parts.next().unwrap_or("unknown").to_string();
    let message = parts.next().unwrap_or("").to_string();
    Thrown::new(name, message, phase)
}

/// Best-effort classification of a shell's stderr diagnostic.
fn thrown_from_stderr(stderr: &str, source_type: SourceType) -> Thrown {
    let line = stderr
        .lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("shell exited with failure");
    let (name, message) = match line.split_once(':') {
        Some((name, message)) if name.chars().all(|c| c.is_ascii_alphanumeric()) => {
            (name.trim(), message.trim())
        }
        _ => ("unknown", line.trim()),
    };
    let phase = if name == "SyntaxError" {
        ErrorPhase::Parse
    } else if source_type == SourceType::Module && line.contains("import") {
        ErrorPhase::Resolution
    } else {
        ErrorPhase::Runtime
    };
    Thrown::new(name, message, phase)
}

fn wait_with_deadline(
    mut child: std::process::Child,
    timeout: Duration,
) -> Result<std::process::Output> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => {
                return child
                    .wait_with_output()
                    .map_err(|e| Error::Engine(format!("collect output: {e}")));
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Error::Engine("shell evaluation timed out".to_string()));
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            Err(e) => return Err(Error::Engine(format!("wait: {e}"))),
        }
    }
}
