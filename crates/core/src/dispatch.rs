//! Running tracked tools by name.

use crate::build::BuildOrchestrator;
use crate::manifest::{Manifest, ManifestEntry};
use crate::process::run_inherited;
use crate::{Error, Result};
use std::ffi::OsString;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Resolves a tool name to a cached binary and executes it.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    orchestrator: BuildOrchestrator,
}

impl Dispatcher {
    /// Create a dispatcher building through `orchestrator`.
    #[must_use]
    pub fn new(orchestrator: BuildOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// Find the entry `name` refers to.
    ///
    /// Tool names win over full import paths.
    pub fn resolve<'m>(manifest: &'m Manifest, name: &str) -> Result<&'m ManifestEntry> {
        manifest
            .find_tool(name)
            .ok_or_else(|| Error::unknown_tool(name))
    }

    /// Run the tool `name` with `args`, building it first if it is missing
    /// or stale.
    ///
    /// The child inherits stdio and the working directory. Its exit code is
    /// returned as is; only failing to launch it is an error.
    #[instrument(skip_all, fields(tool = name))]
    pub async fn run(
        &self,
        manifest: &Manifest,
        name: &str,
        args: &[OsString],
        cancel: &CancellationToken,
    ) -> Result<i32> {
        let entry = Self::resolve(manifest, name)?;
        let outcome = self.orchestrator.ensure_built(entry, cancel).await?;
        let binary = outcome.entry.binary_path;

        debug!(
            binary = %binary.display(),
            built = outcome.built,
            args = args.len(),
            "Dispatching"
        );
        let mut command = Command::new(&binary);
        command.args(args);
        let code = run_inherited(command, &binary, cancel).await?;
        debug!(code, "Tool exited");
        Ok(code)
    }
}
