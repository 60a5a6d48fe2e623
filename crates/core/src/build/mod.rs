//! Building tracked tools into the binary cache.
//!
//! The orchestrator decides, per manifest entry, whether the cache already
//! holds a fresh binary or the toolchain has to run. Builds for one cache key
//! are serialized through [`InflightBuilds`]; `build_all` fans out over a
//! bounded window of concurrent builds and aggregates per-entry failures.

mod inflight;

pub use inflight::InflightBuilds;

use crate::error::BuildFailure;
use crate::lock::lock_exclusive;
use crate::manifest::ManifestEntry;
use crate::process::{FAILURE_TAIL_LINES, run_captured, summarize_failure};
use crate::toolchain::{BuildRequest, Toolchain};
use crate::{Error, Result};
use bingen_cache::{BinaryCache, CacheEntry, CacheKey, ToolchainFingerprint};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, debug, info, instrument, warn};

/// Default worker count when none is configured: twice the available cores.
#[must_use]
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(1)
        .saturating_mul(2)
}

/// A binary that is ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    /// The cache entry holding the binary
    pub entry: CacheEntry,
    /// `true` if the toolchain ran, `false` on a cache hit
    pub built: bool,
}

/// Per-entry results of a `build_all` run.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Entries that are ready, keyed by import path
    pub ready: BTreeMap<String, BuildOutcome>,
    /// Entries whose build failed, ordered by import path
    pub failures: Vec<BuildFailure>,
}

impl BuildReport {
    /// Number of entries the toolchain actually built.
    #[must_use]
    pub fn built(&self) -> usize {
        self.ready.values().filter(|o| o.built).count()
    }

    /// Number of entries served from the cache.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.ready.len() - self.built()
    }

    /// `Ok` if nothing failed, otherwise the aggregate `BuildsFailed`.
    pub fn into_result(self) -> Result<BTreeMap<String, BuildOutcome>> {
        if self.failures.is_empty() {
            Ok(self.ready)
        } else {
            Err(Error::BuildsFailed {
                failures: self.failures,
            })
        }
    }
}

/// Builds manifest entries into the binary cache.
///
/// Cheap to clone; clones share the toolchain fingerprint and the in-flight
/// registry.
#[derive(Debug, Clone)]
pub struct BuildOrchestrator {
    toolchain: Arc<dyn Toolchain>,
    cache: BinaryCache,
    project_root: Arc<Path>,
    max_parallel: usize,
    inflight: Arc<InflightBuilds>,
    fingerprint: Arc<OnceCell<ToolchainFingerprint>>,
}

impl BuildOrchestrator {
    /// Create an orchestrator.
    ///
    /// `max_parallel == 0` selects [`default_parallelism`].
    #[must_use]
    pub fn new(
        toolchain: Arc<dyn Toolchain>,
        cache: BinaryCache,
        project_root: impl Into<PathBuf>,
        max_parallel: usize,
    ) -> Self {
        let max_parallel = if max_parallel == 0 {
            default_parallelism()
        } else {
            max_parallel
        };
        Self {
            toolchain,
            cache,
            project_root: Arc::from(project_root.into()),
            max_parallel,
            inflight: Arc::new(InflightBuilds::new()),
            fingerprint: Arc::new(OnceCell::new()),
        }
    }

    /// The binary cache builds are stored in.
    #[must_use]
    pub fn cache(&self) -> &BinaryCache {
        &self.cache
    }

    /// Maximum number of concurrent builds.
    #[must_use]
    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Toolchain identity, queried once per orchestrator.
    ///
    /// The first call also checks the toolchain's prerequisites.
    pub async fn fingerprint(&self, cancel: &CancellationToken) -> Result<ToolchainFingerprint> {
        self.fingerprint
            .get_or_try_init(|| async {
                self.toolchain.check_prerequisites().await?;
                let fingerprint = self.toolchain.fingerprint(cancel).await?;
                info!(
                    toolchain = self.toolchain.name(),
                    description = self.toolchain.description(),
                    %fingerprint,
                    "Resolved toolchain"
                );
                Ok::<_, Error>(fingerprint)
            })
            .await
            .cloned()
    }

    /// Cache key for an entry under a toolchain fingerprint.
    pub fn cache_key(
        &self,
        entry: &ManifestEntry,
        fingerprint: &ToolchainFingerprint,
    ) -> Result<CacheKey> {
        Ok(CacheKey::new(
            entry.tool_name(),
            &entry.import_path,
            entry.version.as_deref(),
            fingerprint,
        )?)
    }

    /// Make sure a fresh binary for `entry` is cached, building it if needed.
    ///
    /// Concurrent calls for the same key run the toolchain at most once, in
    /// this process and across processes sharing the cache; the others wait
    /// and reuse the result.
    #[instrument(skip_all, fields(import_path = %entry.import_path))]
    pub async fn ensure_built(
        &self,
        entry: &ManifestEntry,
        cancel: &CancellationToken,
    ) -> Result<BuildOutcome> {
        let fingerprint = self.fingerprint(cancel).await?;
        let key = self.cache_key(entry, &fingerprint)?;
        let source_fingerprint = self
            .toolchain
            .source_fingerprint(entry, &self.project_root)
            .await?;

        if let Some(cached) = self.lookup_fresh(&key, source_fingerprint.as_deref()).await? {
            return Ok(BuildOutcome {
                entry: cached,
                built: false,
            });
        }

        debug!(%key, active = self.inflight.active(), "Waiting for build rights");
        let _guard = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            guard = self.inflight.acquire(key.digest()) => guard,
        };
        // Other processes building the same key hold the file lock
        let lock_path = self.cache.lock_path(&key);
        let _file_lock = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            lock = lock_exclusive(&lock_path, "build lock") => lock?,
        };

        // Another build for this key may have finished while we waited
        if let Some(cached) = self.lookup_fresh(&key, source_fingerprint.as_deref()).await? {
            debug!(%key, "Built concurrently, reusing");
            return Ok(BuildOutcome {
                entry: cached,
                built: false,
            });
        }

        let built = self.build(entry, &key, source_fingerprint, cancel).await?;
        Ok(BuildOutcome {
            entry: built,
            built: true,
        })
    }

    /// Build every entry that is missing or stale.
    ///
    /// `BuildFailed` for an entry is recorded in the report and never stops
    /// the others. Any other error (cancellation, toolchain unavailable, I/O)
    /// aborts the remaining builds and is returned as is.
    #[instrument(skip_all, fields(entries = entries.len()))]
    pub async fn build_all(
        &self,
        entries: &[ManifestEntry],
        cancel: &CancellationToken,
    ) -> Result<BuildReport> {
        let mut report = BuildReport::default();
        if entries.is_empty() {
            debug!("Nothing to build");
            return Ok(report);
        }

        // Resolve once up front so a broken toolchain fails fast
        self.fingerprint(cancel).await?;

        let mut pending = entries.iter().rev().cloned().collect::<Vec<_>>();
        let mut join_set = JoinSet::new();

        while !pending.is_empty() || !join_set.is_empty() {
            while join_set.len() < self.max_parallel
                && let Some(entry) = pending.pop()
            {
                let orchestrator = self.clone();
                let cancel = cancel.clone();
                join_set.spawn(
                    async move {
                        let result = orchestrator.ensure_built(&entry, &cancel).await;
                        (entry.import_path, result)
                    }
                    .with_current_subscriber(),
                );
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };
            let (import_path, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    join_set.abort_all();
                    while join_set.join_next().await.is_some() {}
                    return Err(Error::io_no_path(
                        std::io::Error::other(e),
                        "join build task",
                    ));
                }
            };

            match result {
                Ok(outcome) => {
                    report.ready.insert(import_path, outcome);
                }
                Err(Error::BuildFailed {
                    import_path,
                    diagnostics,
                }) => {
                    warn!(%import_path, "Build failed");
                    report.failures.push(BuildFailure {
                        import_path,
                        diagnostics,
                    });
                }
                Err(e) => {
                    join_set.abort_all();
                    while join_set.join_next().await.is_some() {}
                    return Err(e);
                }
            }
        }

        report
            .failures
            .sort_by(|a, b| a.import_path.cmp(&b.import_path));
        info!(
            built = report.built(),
            cached = report.cached(),
            failed = report.failures.len(),
            "Build finished"
        );
        Ok(report)
    }

    async fn lookup_fresh(
        &self,
        key: &CacheKey,
        source_fingerprint: Option<&str>,
    ) -> Result<Option<CacheEntry>> {
        let cache = self.cache.clone();
        let lookup_key = key.clone();
        let dispatch = tracing::dispatcher::get_default(Dispatch::clone);
        let found = tokio::task::spawn_blocking(move || {
            tracing::dispatcher::with_default(&dispatch, || cache.lookup(&lookup_key))
        })
        .await
        .map_err(|e| Error::io_no_path(std::io::Error::other(e), "join cache lookup"))??;

        Ok(found.filter(|entry| {
            let fresh = entry.source_fingerprint.as_deref() == source_fingerprint;
            if !fresh {
                debug!(%key, "Source fingerprint changed, cached binary is stale");
            }
            fresh
        }))
    }

    async fn build(
        &self,
        entry: &ManifestEntry,
        key: &CacheKey,
        source_fingerprint: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<CacheEntry> {
        let staging = self.cache.staging_dir()?;
        let output = staging
            .path()
            .join(format!("{}{}", key.name(), std::env::consts::EXE_SUFFIX));

        let command = self.toolchain.build_command(&BuildRequest {
            entry,
            output: &output,
            project_root: &self.project_root,
        });

        info!(%key, toolchain = self.toolchain.name(), "Building");
        let captured = run_captured(command, cancel).await?;
        if !captured.success {
            return Err(Error::build_failed(
                &entry.import_path,
                summarize_failure(&captured, FAILURE_TAIL_LINES),
            ));
        }
        if !output.is_file() {
            return Err(Error::build_failed(
                &entry.import_path,
                format!(
                    "{} reported success but produced no executable at {}",
                    self.toolchain.name(),
                    output.display()
                ),
            ));
        }

        let cache = self.cache.clone();
        let store_key = key.clone();
        let dispatch = tracing::dispatcher::get_default(Dispatch::clone);
        let stored = tokio::task::spawn_blocking(move || {
            let stored = tracing::dispatcher::with_default(&dispatch, || {
                cache.store(&store_key, &output, source_fingerprint)
            });
            drop(staging);
            stored
        })
        .await
        .map_err(|e| Error::io_no_path(std::io::Error::other(e), "join cache store"))??;

        info!(%key, binary = %stored.binary_path.display(), "Built");
        Ok(stored)
    }
}
