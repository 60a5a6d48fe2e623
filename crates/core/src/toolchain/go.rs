//! The `go` command as a toolchain.

use super::{BuildRequest, Platform, Toolchain};
use crate::manifest::ManifestEntry;
use crate::process::{FAILURE_TAIL_LINES, run_captured, summarize_failure};
use crate::{Error, Result};
use async_trait::async_trait;
use bingen_cache::ToolchainFingerprint;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Module files whose contents decide which dependency versions an
/// unpinned build resolves.
const MODULE_FILES: &[&str] = &["go.mod", "go.sum"];

/// Builds tools with the Go toolchain.
///
/// Unpinned entries are built inside the project module with `go build`, so
/// the project's `go.mod` decides the version. Pinned entries use
/// `go install path@version`, which resolves the pin independently of the
/// project.
#[derive(Debug, Clone)]
pub struct GoToolchain {
    program: PathBuf,
}

impl Default for GoToolchain {
    fn default() -> Self {
        Self {
            program: PathBuf::from("go"),
        }
    }
}

impl GoToolchain {
    /// Use `go` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific `go` executable.
    #[must_use]
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self) -> Command {
        Command::new(&self.program)
    }
}

#[async_trait]
impl Toolchain for GoToolchain {
    fn name(&self) -> &'static str {
        "go"
    }

    fn description(&self) -> &'static str {
        "Build tools from Go package import paths"
    }

    async fn fingerprint(&self, cancel: &CancellationToken) -> Result<ToolchainFingerprint> {
        let mut cmd = self.command();
        cmd.args(["env", "GOVERSION", "GOOS", "GOARCH"]);
        let output = run_captured(cmd, cancel).await?;
        if !output.success {
            return Err(Error::toolchain(format!(
                "'go env' failed\n{}",
                summarize_failure(&output, FAILURE_TAIL_LINES)
            )));
        }
        parse_go_env(&output.stdout)
    }

    fn build_command(&self, request: &BuildRequest<'_>) -> Command {
        let entry = request.entry;
        let mut cmd = self.command();
        cmd.current_dir(request.project_root);
        match &entry.version {
            Some(version) => {
                cmd.arg("install")
                    .arg(format!("{}@{version}", entry.import_path))
                    .env("GOBIN", request.output_dir());
            }
            None => {
                cmd.arg("build")
                    .arg("-o")
                    .arg(request.output)
                    .arg(&entry.import_path);
            }
        }
        cmd
    }

    async fn source_fingerprint(
        &self,
        entry: &ManifestEntry,
        project_root: &Path,
    ) -> Result<Option<String>> {
        if entry.version.is_some() {
            return Ok(None);
        }

        let mut hasher = Sha256::new();
        let mut found = false;
        for name in MODULE_FILES {
            let path = project_root.join(name);
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    hasher.update(name.as_bytes());
                    hasher.update([0]);
                    hasher.update(&bytes);
                    found = true;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::io(e, &path, "read module file")),
            }
        }

        Ok(found.then(|| hex::encode(hasher.finalize())))
    }

    async fn check_prerequisites(&self) -> Result<()> {
        let found = which::which(&self.program).map_err(|_| {
            Error::toolchain_with_help(
                format!("'{}' was not found", self.program.display()),
                "Install Go from https://go.dev/dl/ and make sure it is on PATH",
            )
        })?;
        debug!(go = %found.display(), "Found go toolchain");
        Ok(())
    }
}

fn parse_go_env(stdout: &str) -> Result<ToolchainFingerprint> {
    let mut lines = stdout.lines().map(str::trim);
    let (Some(version), Some(os), Some(arch)) = (lines.next(), lines.next(), lines.next()) else {
        return Err(Error::toolchain(format!(
            "unexpected 'go env' output: {stdout:?}"
        )));
    };
    if version.is_empty() || os.is_empty() || arch.is_empty() {
        return Err(Error::toolchain(format!(
            "unexpected 'go env' output: {stdout:?}"
        )));
    }

    let platform = Platform::parse(&format!("{os}/{arch}"))
        .ok_or_else(|| Error::toolchain(format!("unrecognised platform {os}/{arch}")))?;
    Ok(ToolchainFingerprint::new(version, platform.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ToolSpec;
    use chrono::Utc;
    use std::ffi::OsStr;
    use tempfile::TempDir;

    fn entry(spec: &str) -> ManifestEntry {
        ManifestEntry::new(ToolSpec::parse(spec).unwrap(), Utc::now())
    }

    fn args(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn parses_go_env_output() {
        let fp = parse_go_env("go1.22.4\nlinux\namd64\n").unwrap();
        assert_eq!(fp.toolchain, "go1.22.4");
        assert_eq!(fp.platform, "linux/amd64");
    }

    #[test]
    fn rejects_short_go_env_output() {
        assert!(parse_go_env("go1.22.4\n").is_err());
        assert!(parse_go_env("go1.22.4\n\namd64\n").is_err());
    }

    #[test]
    fn unpinned_entry_uses_go_build() {
        let entry = entry("example.org/tool/a");
        let output = Path::new("/cache/.staging-x/a");
        let root = Path::new("/project");
        let cmd = GoToolchain::new().build_command(&BuildRequest {
            entry: &entry,
            output,
            project_root: root,
        });
        assert_eq!(
            args(&cmd),
            vec!["build", "-o", "/cache/.staging-x/a", "example.org/tool/a"]
        );
        assert_eq!(cmd.as_std().get_current_dir(), Some(root));
    }

    #[test]
    fn pinned_entry_uses_go_install_with_gobin() {
        let entry = entry("example.org/tool/a@v1.2.3");
        let cmd = GoToolchain::new().build_command(&BuildRequest {
            entry: &entry,
            output: Path::new("/cache/.staging-x/a"),
            project_root: Path::new("/project"),
        });
        assert_eq!(args(&cmd), vec!["install", "example.org/tool/a@v1.2.3"]);
        let gobin = cmd
            .as_std()
            .get_envs()
            .find(|(k, _)| *k == OsStr::new("GOBIN"))
            .and_then(|(_, v)| v);
        assert_eq!(gobin, Some(OsStr::new("/cache/.staging-x")));
    }

    #[tokio::test]
    async fn source_fingerprint_tracks_module_files() {
        let temp = TempDir::new().unwrap();
        let go = GoToolchain::new();
        let unpinned = entry("example.org/tool/a");

        assert_eq!(go.source_fingerprint(&unpinned, temp.path()).await.unwrap(), None);

        std::fs::write(temp.path().join("go.mod"), "module example.org/p\n").unwrap();
        let first = go.source_fingerprint(&unpinned, temp.path()).await.unwrap();
        assert!(first.is_some());

        std::fs::write(temp.path().join("go.sum"), "example.org/tool v1.0.0 h1:abc=\n").unwrap();
        let second = go.source_fingerprint(&unpinned, temp.path()).await.unwrap();
        assert_ne!(first, second);

        let pinned = entry("example.org/tool/a@v1.0.0");
        assert_eq!(go.source_fingerprint(&pinned, temp.path()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_go_is_reported_with_help() {
        let go = GoToolchain::with_program("bingen-no-such-go");
        let err = go.check_prerequisites().await.unwrap_err();
        assert!(matches!(err, Error::Toolchain { help: Some(_), .. }));
    }
}
