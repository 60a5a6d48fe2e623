//! Toolchain seam for building tools.
//!
//! A [`Toolchain`] turns a manifest entry into a build command and reports
//! the identity that makes its outputs reusable. The default implementation
//! drives the `go` command; tests plug in scripted toolchains.

mod go;
mod platform;

pub use go::GoToolchain;
pub use platform::{Arch, Os, Platform};

use crate::Result;
use crate::manifest::ManifestEntry;
use async_trait::async_trait;
use bingen_cache::ToolchainFingerprint;
use std::fmt;
use std::path::Path;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Inputs for building one entry.
#[derive(Debug, Clone, Copy)]
pub struct BuildRequest<'a> {
    /// The entry to build
    pub entry: &'a ManifestEntry,
    /// Where the executable must be written
    pub output: &'a Path,
    /// Project root (the working directory for the build)
    pub project_root: &'a Path,
}

impl BuildRequest<'_> {
    /// Directory the executable is expected in.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        self.output.parent().unwrap_or(self.project_root)
    }
}

/// Builds executables from source package references.
#[async_trait]
pub trait Toolchain: Send + Sync + fmt::Debug {
    /// Toolchain name (e.g., "go").
    fn name(&self) -> &'static str;

    /// Human-readable description for diagnostics.
    fn description(&self) -> &'static str;

    /// Identify the compiler and target platform.
    ///
    /// Binaries built under different fingerprints are never shared.
    ///
    /// # Errors
    ///
    /// Returns `Toolchain` if the compiler cannot be queried, or `Cancelled`.
    async fn fingerprint(&self, cancel: &CancellationToken) -> Result<ToolchainFingerprint>;

    /// The command that builds `request.entry` into `request.output`.
    ///
    /// Output streams are captured by the caller.
    fn build_command(&self, request: &BuildRequest<'_>) -> Command;

    /// Fingerprint of local inputs that should invalidate a cached build
    /// when they change (lockfiles and the like).
    ///
    /// # Default Implementation
    ///
    /// Returns `Ok(None)`: only the cache key decides reuse.
    async fn source_fingerprint(
        &self,
        _entry: &ManifestEntry,
        _project_root: &Path,
    ) -> Result<Option<String>> {
        Ok(None)
    }

    /// Check that the toolchain is installed.
    ///
    /// Called before any build is attempted so a missing compiler is
    /// reported once instead of once per entry.
    ///
    /// # Default Implementation
    ///
    /// Returns `Ok(())`.
    async fn check_prerequisites(&self) -> Result<()> {
        Ok(())
    }
}
