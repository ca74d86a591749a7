//! Frontmatter parsing
//!
//! Conformance test files carry their configuration in a structured comment
//! block between `/*---` and `---*/`. The grammar is deliberately closed:
//! free-text keys (`description`, `info`), list keys (`features`,
//! `includes`, `flags`, `locale`), and one nested two-key map (`negative`).
//! Anything outside that grammar is a [`crate::Error::Frontmatter`]
//! infrastructure error, never an engine failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bitflags::bitflags;
use serde::Serialize;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// TestFlags
// ---------------------------------------------------------------------------

bitflags! {
    /// Execution flags recognized in the `flags:` list.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TestFlags: u16 {
        /// Run in strict mode only.
        const ONLY_STRICT = 1 << 0;
        /// Run in sloppy mode only.
        const NO_STRICT = 1 << 1;
        /// Evaluate the body as an ES module.
        const MODULE = 1 << 2;
        /// Byte-exact body: no includes, no prologue, no helpers.
        const RAW = 1 << 3;
        /// The body signals completion through `$DONE`.
        const ASYNC = 1 << 4;
        /// Produced by a test generator; metadata only.
        const GENERATED = 1 << 5;
        /// Requires an agent that cannot block.
        const CAN_BLOCK_IS_FALSE = 1 << 6;
        /// Requires an agent that can block.
        const CAN_BLOCK_IS_TRUE = 1 << 7;
        /// A failure is advisory, not blocking.
        const NON_DETERMINISTIC = 1 << 8;
    }
}

impl TestFlags {
    /// Map a frontmatter flag spelling to its bit. Distinct from the
    /// bitflags-generated `from_name`, which matches the const identifiers
    /// (`ONLY_STRICT`), not the frontmatter spellings.
    /// Unknown names are a frontmatter error at the call site.
    pub fn from_frontmatter_name(name: &str) -> Option<TestFlags> {
        match name {
            "onlyStrict" => Some(TestFlags::ONLY_STRICT),
            "noStrict" => Some(TestFlags::NO_STRICT),
            "module" => Some(TestFlags::MODULE),
            "raw" => Some(TestFlags::RAW),
            "async" => Some(TestFlags::ASYNC),
            "generated" => Some(TestFlags::GENERATED),
            "CanBlockIsFalse" => Some(TestFlags::CAN_BLOCK_IS_FALSE),
            "CanBlockIsTrue" => Some(TestFlags::CAN_BLOCK_IS_TRUE),
            "nonDeterministic" => Some(TestFlags::NON_DETERMINISTIC),
            _ => None,
        }
    }

    /// Names of the set flags, in declaration-bit order.
    pub fn names(&self) -> Vec<&'static str> {
        self.iter_names().map(|(name, _)| match name {
            "ONLY_STRICT" => "onlyStrict",
            "NO_STRICT" => "noStrict",
            "MODULE" => "module",
            "RAW" => "raw",
            "ASYNC" => "async",
            "GENERATED" => "generated",
            "CAN_BLOCK_IS_FALSE" => "CanBlockIsFalse",
            "CAN_BLOCK_IS_TRUE" => "CanBlockIsTrue",
            "NON_DETERMINISTIC" => "nonDeterministic",
            other => other,
        })
        .collect()
    }
}

// ---------------------------------------------------------------------------
// NegativeExpectation
// ---------------------------------------------------------------------------

/// Phase named by a `negative.phase` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NegativePhase {
    Parse,
    Resolution,
    Runtime,
}

impl NegativePhase {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "parse" => Some(NegativePhase::Parse),
            "resolution" => Some(NegativePhase::Resolution),
            "runtime" => Some(NegativePhase::Runtime),
            _ => None,
        }
    }
}

/// Declared expectation of a negative test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NegativeExpectation {
    /// Phase at which the error must be raised.
    pub phase: NegativePhase,
    /// Constructor name of the expected error (e.g. `"SyntaxError"`).
    pub kind: String,
}

// ---------------------------------------------------------------------------
// TestDescriptor
// ---------------------------------------------------------------------------

/// Parsed, immutable description of one test file.
///
/// Created once per file and shared by reference between the planner, the
/// gate, and the verdict classifier. Files without a frontmatter block get
/// an empty descriptor (no includes, no flags, no negative expectation).
#[derive(Debug, Clone, PartialEq)]
pub struct TestDescriptor {
    /// Path to the test file.
    pub path: PathBuf,
    /// One-line description of what the test verifies.
    pub description: Option<String>,
    /// Free-text elaboration.
    pub info: Option<String>,
    /// Specification section id (`esid`, or legacy `es5id`/`es6id`).
    pub esid: Option<String>,
    /// Test author, carried verbatim.
    pub author: Option<String>,
    /// Required engine features, in declaration order.
    pub features: Vec<String>,
    /// Declared harness includes, in declaration order.
    pub includes: Vec<String>,
    /// Required locales (Intl tests).
    pub locale: Vec<String>,
    /// Execution flags.
    pub flags: TestFlags,
    /// Expected error for negative tests.
    pub negative: Option<NegativeExpectation>,
    /// The complete file text. The frontmatter block is a comment to the
    /// engine, so execution always uses the full text; `raw` tests depend
    /// on it being byte-exact.
    pub source: String,
}

impl TestDescriptor {
    /// Parse a descriptor from raw file text.
    pub fn parse(path: impl Into<PathBuf>, source: impl Into<String>) -> Result<Arc<Self>> {
        let path = path.into();
        let source = source.into();

        let mut descriptor = TestDescriptor {
            path: path.clone(),
            description: None,
            info: None,
            esid: None,
            author: None,
            features: Vec::new(),
            includes: Vec::new(),
            locale: Vec::new(),
            flags: TestFlags::empty(),
            negative: None,
            source: String::new(),
        };

        if let Some(block) = extract_frontmatter(&path, &source)? {
            parse_block(&path, &block, &mut descriptor)?;
        }
        descriptor.source = source;
        descriptor.validate()?;
        Ok(Arc::new(descriptor))
    }

    /// Load and parse a test file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::parse(path, source)
    }

    pub fn is_module(&self) -> bool {
        self.flags.contains(TestFlags::MODULE)
    }

    pub fn is_raw(&self) -> bool {
        self.flags.contains(TestFlags::RAW)
    }

    pub fn is_async(&self) -> bool {
        self.flags.contains(TestFlags::ASYNC)
    }

    pub fn only_strict(&self) -> bool {
        self.flags.contains(TestFlags::ONLY_STRICT)
    }

    pub fn no_strict(&self) -> bool {
        self.flags.contains(TestFlags::NO_STRICT)
    }

    pub fn non_deterministic(&self) -> bool {
        self.flags.contains(TestFlags::NON_DETERMINISTIC)
    }

    /// The blocking capability the test demands, if any.
    pub fn can_block_requirement(&self) -> Option<bool> {
        if self.flags.contains(TestFlags::CAN_BLOCK_IS_TRUE) {
            Some(true)
        } else if self.flags.contains(TestFlags::CAN_BLOCK_IS_FALSE) {
            Some(false)
        } else {
            None
        }
    }

    /// Enforce the flag co-occurrence rules.
    fn validate(&self) -> Result<()> {
        let err = |message: &str| Err(Error::frontmatter(&self.path, message));

        if self.is_raw() {
            if self.is_module() {
                return err("flags 'raw' and 'module' are mutually exclusive");
            }
            if self.only_strict() || self.no_strict() {
                return err("flag 'raw' cannot be combined with 'onlyStrict' or 'noStrict'");
            }
            if self.is_async() {
                return err("flag 'raw' cannot be combined with 'async'");
            }
            if !self.includes.is_empty() {
                return err("flag 'raw' forbids harness includes");
            }
        }
        if self.only_strict() && self.no_strict() {
            return err("flags 'onlyStrict' and 'noStrict' are mutually exclusive");
        }
        if self.flags.contains(TestFlags::CAN_BLOCK_IS_TRUE)
            && self.flags.contains(TestFlags::CAN_BLOCK_IS_FALSE)
        {
            return err("flags 'CanBlockIsTrue' and 'CanBlockIsFalse' are mutually exclusive");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Frontmatter extraction and the mini-grammar
// ---------------------------------------------------------------------------

const OPEN: &str = "/*---";
const CLOSE: &str = "---*/";

/// Slice out the frontmatter text. `None` when the file has no block.
fn extract_frontmatter(path: &Path, source: &str) -> Result<Option<String>> {
    let Some(start) = source.find(OPEN) else {
        return Ok(None);
    };
    let after_open = start + OPEN.len();
    let Some(len) = source[after_open..].find(CLOSE) else {
        return Err(Error::frontmatter(path, "unterminated frontmatter block"));
    };
    Ok(Some(source[after_open..after_open + len].to_string()))
}

/// Which multi-line construct the line cursor is inside.
enum Continuation {
    None,
    /// `- item` lines feeding a list key.
    List(ListKey),
    /// Indented free-text lines feeding `info:` or `description:`.
    /// `folded` distinguishes `>` (lines joined with spaces) from `|`
    /// (newlines preserved).
    Text {
        key: TextKey,
        folded: bool,
        buffer: Vec<String>,
    },
    /// Indented `phase:` / `type:` lines under `negative:`.
    Negative,
}

#[derive(Clone, Copy)]
enum ListKey {
    Features,
    Includes,
    Flags,
    Locale,
}

#[derive(Clone, Copy)]
enum TextKey {
    Description,
    Info,
}

fn parse_block(path: &Path, block: &str, out: &mut TestDescriptor) -> Result<()> {
    let mut state = Continuation::None;
    let mut neg_phase: Option<NegativePhase> = None;
    let mut neg_kind: Option<String> = None;
    let mut saw_negative = false;
    // Flag names are collected as plain strings and resolved at the end so
    // list parsing stays uniform across keys.
    let mut flag_names: Vec<String> = Vec::new();

    for raw_line in block.lines() {
        let line = raw_line.trim_end();
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            continue;
        }
        let indented = line.len() > trimmed.len();

        // Feed continuations first; a non-matching line falls through and
        // is re-parsed as a new top-level key.
        match &mut state {
            Continuation::List(key) => {
                if let Some(item) = trimmed.strip_prefix("- ") {
                    push_list_item(*key, item.trim(), out, &mut flag_names);
                    continue;
                }
                state = Continuation::None;
            }
            Continuation::Text { key, folded, buffer } => {
                if indented {
                    buffer.push(trimmed.to_string());
                    continue;
                }
                let text = join_scalar(*folded, buffer);
                assign_text(*key, text, out);
                state = Continuation::None;
            }
            Continuation::Negative => {
                if indented {
                    if let Some(value) = trimmed.strip_prefix("phase:") {
                        let value = value.trim();
                        neg_phase = Some(NegativePhase::from_name(value).ok_or_else(|| {
                            Error::frontmatter(
                                path,
                                format!("unknown negative phase '{value}'"),
                            )
                        })?);
                        continue;
                    }
                    if let Some(value) = trimmed.strip_prefix("type:") {
                        neg_kind = Some(value.trim().to_string());
                        continue;
                    }
                    return Err(Error::frontmatter(
                        path,
                        format!("unexpected line under 'negative': '{trimmed}'"),
                    ));
                }
                state = Continuation::None;
            }
            Continuation::None => {}
        }

        // Top-level key.
        let Some((key, value)) = trimmed.split_once(':') else {
            return Err(Error::frontmatter(
                path,
                format!("expected 'key: value', found '{trimmed}'"),
            ));
        };
        let key = key.trim();
        let value = value.trim();

        match key {
            "description" | "info" => {
                let text_key = if key == "info" {
                    TextKey::Info
                } else {
                    TextKey::Description
                };
                // `|` introduces a literal block scalar, `>` a folded one;
                // inline text is taken as-is.
                if value.is_empty() || value == "|" || value == ">" {
                    state = Continuation::Text {
                        key: text_key,
                        folded: value == ">",
                        buffer: Vec::new(),
                    };
                } else {
                    assign_text(text_key, unquote(value), out);
                }
            }
            "esid" | "es5id" | "es6id" => {
                out.esid.get_or_insert_with(|| value.to_string());
            }
            "author" => out.author = Some(value.to_string()),
            "features" | "includes" | "flags" | "locale" => {
                let list_key = match key {
                    "features" => ListKey::Features,
                    "includes" => ListKey::Includes,
                    "flags" => ListKey::Flags,
                    _ => ListKey::Locale,
                };
                if value.is_empty() {
                    state = Continuation::List(list_key);
                } else {
                    for item in parse_inline_list(path, value)? {
                        push_list_item(list_key, &item, out, &mut flag_names);
                    }
                }
            }
            "negative" => {
                if !value.is_empty() {
                    // The pre-2017 single-line `negative: SyntaxError` form
                    // is outside the closed grammar.
                    return Err(Error::frontmatter(
                        path,
                        "'negative' must be a nested map with 'phase' and 'type'",
                    ));
                }
                saw_negative = true;
                state = Continuation::Negative;
            }
            other => {
                return Err(Error::frontmatter(
                    path,
                    format!("unknown frontmatter key '{other}'"),
                ));
            }
        }
    }

    // Flush a trailing text continuation.
    if let Continuation::Text { key, folded, buffer } = state {
        assign_text(key, join_scalar(folded, &buffer), out);
    }

    if saw_negative {
        let phase = neg_phase
            .ok_or_else(|| Error::frontmatter(path, "'negative' is missing 'phase'"))?;
        let kind =
            neg_kind.ok_or_else(|| Error::frontmatter(path, "'negative' is missing 'type'"))?;
        out.negative = Some(NegativeExpectation { phase, kind });
    }

    let mut flags = TestFlags::empty();
    for name in flag_names {
        match TestFlags::from_frontmatter_name(&name) {
            Some(flag) => flags |= flag,
            None => {
                return Err(Error::frontmatter(path, format!("unknown flag '{name}'")));
            }
        }
    }
    out.flags = flags;
    Ok(())
}

/// `[a, b, c]` inline list form.
fn parse_inline_list(path: &Path, value: &str) -> Result<Vec<String>> {
    let Some(inner) = value
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    else {
        return Err(Error::frontmatter(
            path,
            format!("expected an inline '[a, b]' list, found '{value}'"),
        ));
    };
    Ok(inner
        .split(',')
        .map(|item| unquote(item.trim()))
        .filter(|item| !item.is_empty())
        .collect())
}

fn push_list_item(key: ListKey, item: &str, out: &mut TestDescriptor, flag_names: &mut Vec<String>) {
    let item = unquote(item);
    match key {
        ListKey::Features => out.features.push(item),
        ListKey::Includes => out.includes.push(item),
        ListKey::Flags => flag_names.push(item),
        ListKey::Locale => out.locale.push(item),
    }
}

fn join_scalar(folded: bool, lines: &[String]) -> String {
    if folded {
        lines.join(" ")
    } else {
        lines.join("\n")
    }
}

fn assign_text(key: TextKey, text: String, out: &mut TestDescriptor) {
    let slot = match key {
        TextKey::Description => &mut out.description,
        TextKey::Info => &mut out.info,
    };
    *slot = Some(text);
}

/// Strip one layer of matching quotes.
fn unquote(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'\'' || first == b'"') {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}
