//! Harness include resolution
//!
//! Includes are flat scripts with no transitive dependencies; resolving a
//! descriptor is a single ordered concatenation, never a dependency graph.
//! The baseline assertion helpers are always first (unless `raw`), the
//! async completion handler follows for `async` tests, then the declared
//! includes in declaration order, each file at most once.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Error, Result};
use crate::metadata::TestDescriptor;

/// Helpers every non-raw test may rely on.
pub const BASELINE_INCLUDES: &[&str] = &["assert.js", "sta.js"];

/// Defines `$DONE` for async tests; reports through the host print channel.
pub const ASYNC_INCLUDE: &str = "doneprintHandle.js";

/// One loaded harness script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeScript {
    /// File name as declared in frontmatter (e.g. `compareArray.js`).
    pub name: String,
    /// Script text.
    pub source: String,
}

/// Loads harness scripts from a directory and caches them for the run.
///
/// Shared read-mostly across the worker pool; the cache lock is held only
/// for lookups and inserts, never across file I/O results being used.
pub struct IncludeResolver {
    root: PathBuf,
    cache: Mutex<FxHashMap<String, Arc<IncludeScript>>>,
}

impl IncludeResolver {
    /// Create a resolver rooted at the harness directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: Mutex::new(FxHashMap::default()),
        }
    }

    /// The harness directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve the ordered include list for a descriptor.
    ///
    /// Idempotent composition: a file implicitly required and also listed,
    /// or listed twice, is loaded once at its first position.
    pub fn resolve(&self, descriptor: &TestDescriptor) -> Result<Vec<Arc<IncludeScript>>> {
        if descriptor.is_raw() {
            return Ok(Vec::new());
        }

        let mut names: Vec<&str> = BASELINE_INCLUDES.to_vec();
        if descriptor.is_async() {
            names.push(ASYNC_INCLUDE);
        }
        names.extend(descriptor.includes.iter().map(String::as_str));

        let mut seen: FxHashSet<&str> = FxHashSet::default();
        let mut scripts = Vec::with_capacity(names.len());
        for name in names {
            if seen.insert(name) {
                scripts.push(self.load(name)?);
            }
        }
        Ok(scripts)
    }

    /// Load one include through the cache.
    fn load(&self, name: &str) -> Result<Arc<IncludeScript>> {
        if let Some(script) = self.cache.lock().unwrap().get(name) {
            return Ok(Arc::clone(script));
        }

        let path = self.root.join(name);
        let source = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::MissingInclude {
                    name: name.to_string(),
                    root: self.root.clone(),
                }
            } else {
                Error::io(path.clone(), e)
            }
        })?;

        let script = Arc::new(IncludeScript {
            name: name.to_string(),
            source,
        });
        self.cache
            .lock()
            .unwrap()
            .insert(name.to_string(), Arc::clone(&script));
        Ok(script)
    }
}
