//! Error types for the Cinnabar conformance harness
//!
//! Every variant here is a *test infrastructure* error: a problem with the
//! harness inputs (frontmatter, include files, the filesystem, the engine
//! process itself), never a judgement about the JavaScript under test.
//! Engine throws travel through [`crate::engine::Thrown`] instead and are
//! classified by the verdict layer.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Cinnabar
#[derive(Error, Debug)]
pub enum Error {
    /// The `/*--- ... ---*/` block exists but does not follow the
    /// restricted key:value/list grammar.
    #[error("malformed frontmatter in {}: {message}", path.display())]
    Frontmatter { path: PathBuf, message: String },

    /// A declared harness include has no corresponding file.
    #[error("missing harness include '{name}' under {}", root.display())]
    MissingInclude { name: String, root: PathBuf },

    /// Filesystem failure while reading a test or include file.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Realm creation or seeding failed before the test body ran.
    #[error("realm setup failed for {}: {message}", path.display())]
    Realm { path: PathBuf, message: String },

    /// The engine boundary itself misbehaved (process spawn failure,
    /// unparseable completion report).
    #[error("engine error: {0}")]
    Engine(String),
}

impl Error {
    /// Create a frontmatter error for the given test file.
    pub fn frontmatter(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Frontmatter {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a realm-setup error for the given test file.
    pub fn realm(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Realm {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Wrap an I/O error with the path that produced it.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for Cinnabar
pub type Result<T> = std::result::Result<T, Error>;
