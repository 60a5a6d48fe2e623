//! The tool repository façade.

use crate::build::{BuildOrchestrator, BuildOutcome};
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::manifest::{ManifestEntry, ManifestStore, ToolSpec, Upsert};
use crate::{Error, Result};
use bingen_cache::BinaryCache;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, debug, info};

/// A project's tracked tools: manifest, builds, cache and dispatch.
///
/// Cheap to clone; clones share the manifest write lock, the toolchain
/// fingerprint and the in-flight build registry.
#[derive(Debug, Clone)]
pub struct ToolRepository {
    root_dir: PathBuf,
    manifest: Arc<ManifestStore>,
    orchestrator: BuildOrchestrator,
    dispatcher: Dispatcher,
    logger: Option<Dispatch>,
}

impl ToolRepository {
    /// Initialise storage locations and open the repository.
    ///
    /// The cache directory is created; the manifest is created on the first
    /// `add`.
    pub fn create(config: Config) -> Result<Self> {
        let logger = config.dispatch();
        let open = || {
            let metadata = std::fs::metadata(&config.root_dir)
                .map_err(|e| Error::io(e, &config.root_dir, "open project root"))?;
            if !metadata.is_dir() {
                return Err(Error::io(
                    std::io::Error::new(
                        std::io::ErrorKind::NotADirectory,
                        "project root is not a directory",
                    ),
                    &config.root_dir,
                    "open project root",
                ));
            }

            let cache = BinaryCache::new(config.cache_path());
            cache.ensure_dirs()?;

            let manifest = Arc::new(ManifestStore::new(config.manifest_path()));
            let orchestrator = BuildOrchestrator::new(
                config.toolchain(),
                cache,
                config.root_dir.clone(),
                config.max_parallel_builds,
            );
            let dispatcher = Dispatcher::new(orchestrator.clone());

            debug!(
                root = %config.root_dir.display(),
                manifest = %manifest.path().display(),
                cache = %orchestrator.cache().root().display(),
                max_parallel = orchestrator.max_parallel(),
                "Opened tool repository"
            );

            Ok(Self {
                root_dir: config.root_dir.clone(),
                manifest,
                orchestrator,
                dispatcher,
                logger: logger.clone(),
            })
        };

        match &logger {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, open),
            None => open(),
        }
    }

    /// Project root.
    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Manifest location.
    #[must_use]
    pub fn manifest_path(&self) -> &Path {
        self.manifest.path()
    }

    /// Binary cache location.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        self.orchestrator.cache().root()
    }

    /// Start tracking tools. Does not build.
    ///
    /// Every import path is validated before anything is written; one bad
    /// path rejects the whole call. Re-adding a tracked path is a no-op
    /// apart from refreshing its `@version` pin.
    pub async fn add<I, S>(&self, import_paths: I, cancel: &CancellationToken) -> Result<Vec<Upsert>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let specs = import_paths
            .into_iter()
            .map(|p| ToolSpec::parse(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        self.scoped(async {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if specs.is_empty() {
                return Ok(Vec::new());
            }
            let outcomes = self.manifest.add(&specs).await?;
            for (spec, outcome) in specs.iter().zip(&outcomes) {
                info!(tool = spec.tool_name(), import_path = %spec, ?outcome, "Tracked tool");
            }
            Ok(outcomes)
        })
        .await
    }

    /// Build every tracked tool that is missing or stale.
    ///
    /// Failures of individual builds do not stop the others; they are
    /// reported together as `BuildsFailed` once every entry has finished.
    pub async fn build_all(
        &self,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, BuildOutcome>> {
        self.scoped(async {
            let manifest = self.manifest.load().await?;
            self.orchestrator
                .build_all(&manifest.tools, cancel)
                .await?
                .into_result()
        })
        .await
    }

    /// Run a tracked tool by name and return its exit code.
    ///
    /// A missing or stale binary is built first. Unknown names fail before
    /// any process is started.
    pub async fn run(
        &self,
        name: &str,
        args: &[OsString],
        cancel: &CancellationToken,
    ) -> Result<i32> {
        self.scoped(async {
            let manifest = self.manifest.load().await?;
            self.dispatcher.run(&manifest, name, args, cancel).await
        })
        .await
    }

    /// Tracked tools in manifest order.
    pub async fn list(&self) -> Result<Vec<ManifestEntry>> {
        self.scoped(async { Ok(self.manifest.load().await?.tools) })
            .await
    }

    async fn scoped<F: Future>(&self, fut: F) -> F::Output {
        match &self.logger {
            Some(dispatch) => fut.with_subscriber(dispatch.clone()).await,
            None => fut.await,
        }
    }
}
