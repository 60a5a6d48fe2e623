//! Error types for the tool repository

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// A single failed build inside a `BuildAll` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFailure {
    /// Import path of the entry that failed
    pub import_path: String,
    /// Captured toolchain output
    pub diagnostics: String,
}

/// Main error type for bingen operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// An import path failed validation; nothing was persisted
    #[error("Invalid import path '{import_path}': {reason}")]
    #[diagnostic(
        code(bingen::manifest::invalid_import_path),
        help("Import paths look like 'example.org/owner/tool' with an optional '@version' suffix")
    )]
    InvalidImportPath {
        /// The rejected input
        import_path: String,
        /// Why it was rejected
        reason: String,
    },

    /// Two different import paths would produce the same tool name
    #[error("Tool name '{name}' is already provided by '{existing}', cannot add '{import_path}'")]
    #[diagnostic(code(bingen::manifest::name_conflict))]
    ToolNameConflict {
        /// The conflicting tool name
        name: String,
        /// Import path already tracked under that name
        existing: String,
        /// Import path that was being added
        import_path: String,
    },

    /// The manifest file exists but cannot be parsed
    #[error("Manifest {} is corrupt: {message}", path.display())]
    #[diagnostic(
        code(bingen::manifest::corrupt),
        help("Fix or remove the manifest file; it is never reset automatically")
    )]
    CorruptManifest {
        /// Manifest location
        path: Box<Path>,
        /// Parse failure details
        message: String,
    },

    /// `Run` was asked for a tool the manifest does not track
    #[error("Unknown tool '{name}'")]
    #[diagnostic(
        code(bingen::dispatch::unknown_tool),
        help("Track it first with `bingen --add <import path>`")
    )]
    UnknownTool {
        /// The requested name
        name: String,
    },

    /// The toolchain failed to build an entry
    #[error("Failed to build {import_path}\n{diagnostics}")]
    #[diagnostic(code(bingen::build::failed))]
    BuildFailed {
        /// Import path of the entry
        import_path: String,
        /// Captured toolchain output
        diagnostics: String,
    },

    /// One or more entries failed during `BuildAll`
    #[error("{} of the tracked tools failed to build:\n\n{}", failures.len(), render_failures(failures))]
    #[diagnostic(
        code(bingen::build::aggregate),
        help("Successfully built tools remain cached and usable")
    )]
    BuildsFailed {
        /// Every failed entry with its diagnostics
        failures: Vec<BuildFailure>,
    },

    /// The operation was aborted through its cancellation token
    #[error("Operation cancelled")]
    #[diagnostic(code(bingen::cancelled))]
    Cancelled,

    /// The resolved binary could not be launched
    #[error("Failed to execute {}: {source}", binary.display())]
    #[diagnostic(code(bingen::dispatch::execution_failed))]
    ExecutionFailed {
        /// Binary that failed to start
        binary: Box<Path>,
        /// The launch failure
        #[source]
        source: std::io::Error,
    },

    /// The toolchain is unavailable or misbehaving
    #[error("Toolchain error: {message}")]
    #[diagnostic(code(bingen::toolchain))]
    Toolchain {
        /// What went wrong
        message: String,
        /// Optional remedy
        #[help]
        help: Option<String>,
    },

    /// I/O error with path context
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(bingen::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed
        operation: String,
    },

    /// Binary cache failure
    #[error(transparent)]
    #[diagnostic(transparent)]
    Cache(#[from] bingen_cache::Error),
}

impl Error {
    /// Create an invalid import path error
    #[must_use]
    pub fn invalid_import_path(import_path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidImportPath {
            import_path: import_path.into(),
            reason: reason.into(),
        }
    }

    /// Create a corrupt manifest error
    #[must_use]
    pub fn corrupt_manifest(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::CorruptManifest {
            path: path.as_ref().into(),
            message: message.into(),
        }
    }

    /// Create an unknown tool error
    #[must_use]
    pub fn unknown_tool(name: impl Into<String>) -> Self {
        Self::UnknownTool { name: name.into() }
    }

    /// Create a build failure error
    #[must_use]
    pub fn build_failed(import_path: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self::BuildFailed {
            import_path: import_path.into(),
            diagnostics: diagnostics.into(),
        }
    }

    /// Create an execution failure error
    #[must_use]
    pub fn execution_failed(binary: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::ExecutionFailed {
            binary: binary.as_ref().into(),
            source,
        }
    }

    /// Create a toolchain error
    #[must_use]
    pub fn toolchain(message: impl Into<String>) -> Self {
        Self::Toolchain {
            message: message.into(),
            help: None,
        }
    }

    /// Create a toolchain error with help text
    #[must_use]
    pub fn toolchain_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Toolchain {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create an I/O error without path context
    #[must_use]
    pub fn io_no_path(source: std::io::Error, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: None,
            operation: operation.into(),
        }
    }

    /// Whether this error came from the caller's cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

fn render_failures(failures: &[BuildFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}:\n{}", f.import_path, f.diagnostics))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Result type alias for bingen operations
pub type Result<T> = std::result::Result<T, Error>;
