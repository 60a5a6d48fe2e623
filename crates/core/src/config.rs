//! Repository configuration.

use crate::Result;
use crate::manifest::MANIFEST_FILE_NAME;
use crate::repository::ToolRepository;
use crate::toolchain::{GoToolchain, Toolchain};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Dispatch, Level};
use tracing_subscriber::fmt::MakeWriter;

/// Default cache directory, relative to the project root.
pub const DEFAULT_CACHE_DIR: &str = ".bingen/bin";

/// Options for [`ToolRepository::create`].
///
/// Relative `manifest_file` and `cache_dir` paths are resolved against
/// `root_dir`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Project root
    pub root_dir: PathBuf,
    /// Manifest location
    pub manifest_file: PathBuf,
    /// Binary cache location
    pub cache_dir: PathBuf,
    /// Concurrent builds during `build_all` (0 = twice the available cores)
    pub max_parallel_builds: usize,
    /// Toolchain used for builds (`None` = [`GoToolchain`])
    pub toolchain: Option<Arc<dyn Toolchain>>,
    /// Emit build and cache diagnostics
    pub verbose: bool,
    /// Sink for this repository's diagnostics.
    ///
    /// When unset, `verbose` installs a debug-level stderr sink; otherwise
    /// events go to the process-wide subscriber.
    pub logger: Option<Dispatch>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            manifest_file: PathBuf::from(MANIFEST_FILE_NAME),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            max_parallel_builds: 0,
            toolchain: None,
            verbose: false,
            logger: None,
        }
    }
}

impl Config {
    /// Configuration for the project at `root_dir`.
    #[must_use]
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    /// Set the manifest location.
    #[must_use]
    pub fn with_manifest_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_file = path.into();
        self
    }

    /// Set the binary cache location.
    #[must_use]
    pub fn with_cache_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_dir = path.into();
        self
    }

    /// Limit concurrent builds.
    #[must_use]
    pub fn with_max_parallel_builds(mut self, max: usize) -> Self {
        self.max_parallel_builds = max;
        self
    }

    /// Use a specific toolchain.
    #[must_use]
    pub fn with_toolchain(mut self, toolchain: Arc<dyn Toolchain>) -> Self {
        self.toolchain = Some(toolchain);
        self
    }

    /// Toggle diagnostics.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Route diagnostics to a subscriber.
    #[must_use]
    pub fn with_logger(mut self, logger: impl Into<Dispatch>) -> Self {
        self.logger = Some(logger.into());
        self
    }

    /// Route diagnostics as plain text to `writer`.
    ///
    /// The level is taken from `verbose` at the time of the call: debug when
    /// set, warnings only otherwise.
    #[must_use]
    pub fn with_log_writer<W>(self, writer: W) -> Self
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let level = if self.verbose { Level::DEBUG } else { Level::WARN };
        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer)
            .with_ansi(false)
            .with_max_level(level)
            .finish();
        self.with_logger(subscriber)
    }

    /// Absolute manifest path.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        resolve(&self.root_dir, &self.manifest_file)
    }

    /// Absolute cache directory.
    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        resolve(&self.root_dir, &self.cache_dir)
    }

    /// The configured toolchain, or the Go default.
    #[must_use]
    pub fn toolchain(&self) -> Arc<dyn Toolchain> {
        self.toolchain
            .clone()
            .unwrap_or_else(|| Arc::new(GoToolchain::new()))
    }

    /// The diagnostics sink a repository should install, if any.
    #[must_use]
    pub fn dispatch(&self) -> Option<Dispatch> {
        match (&self.logger, self.verbose) {
            (Some(logger), _) => Some(logger.clone()),
            (None, true) => Some(Dispatch::new(
                tracing_subscriber::fmt()
                    .with_writer(std::io::stderr)
                    .with_max_level(Level::DEBUG)
                    .finish(),
            )),
            (None, false) => None,
        }
    }

    /// Initialise storage and open the repository.
    pub fn create(self) -> Result<ToolRepository> {
        ToolRepository::create(self)
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::new("/project");
        assert_eq!(config.manifest_path(), PathBuf::from("/project/bingen.toml"));
        assert_eq!(config.cache_path(), PathBuf::from("/project/.bingen/bin"));
        assert_eq!(config.max_parallel_builds, 0);
        assert!(!config.verbose);
        assert!(config.dispatch().is_none());
        assert_eq!(config.toolchain().name(), "go");
    }

    #[test]
    fn absolute_paths_are_kept() {
        let config = Config::new("/project")
            .with_manifest_file("/etc/tools.toml")
            .with_cache_dir("/var/cache/bingen");
        assert_eq!(config.manifest_path(), PathBuf::from("/etc/tools.toml"));
        assert_eq!(config.cache_path(), PathBuf::from("/var/cache/bingen"));
    }

    #[test]
    fn verbose_installs_a_sink() {
        let config = Config::new("/project").with_verbose(true);
        assert!(config.dispatch().is_some());
    }

    #[test]
    fn log_writer_becomes_the_logger() {
        let config = Config::new("/project").with_log_writer(std::io::sink);
        assert!(config.logger.is_some());
        assert!(config.dispatch().is_some());
    }
}
