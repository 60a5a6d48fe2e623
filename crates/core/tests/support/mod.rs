//! Test support: a toolchain that "compiles" shell scripts.
//!
//! Every build appends the import path to a log file, so tests can count
//! real toolchain invocations. Built tools are POSIX shell scripts:
//!
//! - `--flag` exits 42
//! - `--exit=N` exits N
//! - `--sleep` sleeps for 30 seconds
//!
//! Import paths containing `/fail` fail to build; paths containing `/noop`
//! "succeed" without producing an executable.

#![allow(dead_code)]

use async_trait::async_trait;
use bingen_core::{
    BuildRequest, Config, ManifestEntry, Platform, Result, ToolRepository, Toolchain,
    ToolchainFingerprint,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Input file whose contents act as the source fingerprint.
pub const INPUTS_FILE: &str = "inputs.lock";

const BUILD_SCRIPT: &str = r#"
set -e
echo "$2" >> "$3"
sleep "$4"
case "$2" in
  */fail*)
    echo "building $2"
    echo "syntax error: unexpected token" >&2
    exit 2
    ;;
  */noop*)
    exit 0
    ;;
esac
printf '#!/bin/sh\necho "%s $*"\ncase "$1" in\n  --flag) exit 42;;\n  --exit=*) exit "${1#--exit=}";;\n  --sleep) sleep 30;;\nesac\nexit 0\n' "$2" > "$1"
chmod +x "$1"
"#;

#[derive(Debug)]
pub struct ScriptToolchain {
    log: PathBuf,
    version: String,
    build_delay: String,
    fingerprints: AtomicUsize,
}

impl ScriptToolchain {
    pub fn new(log_dir: &Path) -> Self {
        Self {
            log: log_dir.join("builds.log"),
            version: "script1".to_string(),
            build_delay: "0".to_string(),
            fingerprints: AtomicUsize::new(0),
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Seconds each build sleeps before producing output (`sleep` syntax).
    pub fn with_build_delay(mut self, seconds: &str) -> Self {
        self.build_delay = seconds.to_string();
        self
    }

    /// Import paths built so far, in invocation order.
    pub fn builds(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn build_count(&self, import_path: &str) -> usize {
        self.builds().iter().filter(|p| *p == import_path).count()
    }

    pub fn fingerprint_calls(&self) -> usize {
        self.fingerprints.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Toolchain for ScriptToolchain {
    fn name(&self) -> &'static str {
        "script"
    }

    fn description(&self) -> &'static str {
        "Builds shell scripts for tests"
    }

    async fn fingerprint(&self, _cancel: &CancellationToken) -> Result<ToolchainFingerprint> {
        self.fingerprints.fetch_add(1, Ordering::SeqCst);
        Ok(ToolchainFingerprint::new(
            self.version.clone(),
            Platform::current().to_string(),
        ))
    }

    fn build_command(&self, request: &BuildRequest<'_>) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(BUILD_SCRIPT)
            .arg("sh")
            .arg(request.output)
            .arg(&request.entry.import_path)
            .arg(&self.log)
            .arg(&self.build_delay)
            .current_dir(request.project_root);
        cmd
    }

    async fn source_fingerprint(
        &self,
        _entry: &ManifestEntry,
        project_root: &Path,
    ) -> Result<Option<String>> {
        Ok(std::fs::read_to_string(project_root.join(INPUTS_FILE)).ok())
    }
}

/// A repository over `project` built by `toolchain`.
pub fn repo(project: &Path, toolchain: &Arc<ScriptToolchain>) -> ToolRepository {
    config(project, toolchain).create().unwrap()
}

pub fn config(project: &Path, toolchain: &Arc<ScriptToolchain>) -> Config {
    let toolchain: Arc<dyn Toolchain> = toolchain.clone();
    Config::new(project)
        .with_toolchain(toolchain)
        .with_max_parallel_builds(4)
}

/// In-memory log sink.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
