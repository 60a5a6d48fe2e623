//! Durable, serialized access to the manifest file.

use super::{MANIFEST_VERSION, Manifest, ToolSpec, Upsert, validate_version};
use crate::lock::lock_exclusive;
use crate::{Error, Result};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Loads and persists the manifest.
///
/// Writers are serialized twice: an in-process mutex orders concurrent `add`
/// calls on one store, and an exclusive lock on `<manifest>.lock` orders
/// writers across processes. Every write goes to a temp file that is synced
/// and renamed over the manifest, so readers see either the old or the new
/// file and never a partial one.
#[derive(Debug)]
pub struct ManifestStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ManifestStore {
    /// Create a store for the manifest at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the manifest file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        sibling_with_suffix(&self.path, "lock")
    }

    fn temp_path(&self) -> PathBuf {
        sibling_with_suffix(&self.path, "tmp")
    }

    /// Read the persisted manifest.
    ///
    /// A missing file is an empty manifest. A file that exists but cannot be
    /// parsed is `CorruptManifest`; it is never silently reset.
    pub async fn load(&self) -> Result<Manifest> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No manifest yet, starting empty");
                return Ok(Manifest::new());
            }
            Err(e) => return Err(Error::io(e, &self.path, "read manifest")),
        };

        let manifest: Manifest = toml::from_str(&contents)
            .map_err(|e| Error::corrupt_manifest(&self.path, e.to_string()))?;

        if manifest.version > MANIFEST_VERSION {
            return Err(Error::corrupt_manifest(
                &self.path,
                format!(
                    "manifest version {} is newer than supported version {MANIFEST_VERSION}",
                    manifest.version
                ),
            ));
        }

        let mut seen = HashSet::new();
        let mut names: HashMap<&str, &str> = HashMap::new();
        for entry in &manifest.tools {
            ToolSpec::parse(&entry.import_path)
                .map_err(|e| Error::corrupt_manifest(&self.path, e.to_string()))?;
            if let Some(version) = &entry.version {
                validate_version(version).map_err(|reason| {
                    Error::corrupt_manifest(
                        &self.path,
                        format!("'{}' has an invalid version: {reason}", entry.import_path),
                    )
                })?;
            }
            if !seen.insert(entry.import_path.as_str()) {
                return Err(Error::corrupt_manifest(
                    &self.path,
                    format!("'{}' is listed more than once", entry.import_path),
                ));
            }
            if let Some(other) = names.insert(entry.tool_name(), entry.import_path.as_str()) {
                return Err(Error::corrupt_manifest(
                    &self.path,
                    format!(
                        "'{}' and '{}' both provide the tool '{}'",
                        other,
                        entry.import_path,
                        entry.tool_name()
                    ),
                ));
            }
        }

        debug!(path = %self.path.display(), tools = manifest.len(), "Loaded manifest");
        Ok(manifest)
    }

    /// Track every spec, all or nothing.
    ///
    /// Validation and tool name conflicts are checked against the current
    /// manifest before anything is written. Returns what happened to each
    /// spec, in input order.
    pub async fn add(&self, specs: &[ToolSpec]) -> Result<Vec<Upsert>> {
        let _guard = self.write_lock.lock().await;
        let lock_file = lock_exclusive(&self.lock_path(), "manifest lock").await?;

        let mut manifest = self.load().await?;
        let now = Utc::now();
        let mut outcomes = Vec::with_capacity(specs.len());
        for spec in specs {
            outcomes.push(manifest.upsert(spec.clone(), now)?);
        }

        if outcomes.iter().all(|o| *o == Upsert::Unchanged) {
            debug!("Manifest already up to date");
        } else {
            self.save(&manifest).await?;
            info!(
                path = %self.path.display(),
                tools = manifest.len(),
                "Updated manifest"
            );
        }

        // Unlock happens when the file is dropped
        drop(lock_file);
        Ok(outcomes)
    }

    async fn save(&self, manifest: &Manifest) -> Result<()> {
        let contents = toml::to_string_pretty(manifest)
            .map_err(|e| Error::corrupt_manifest(&self.path, e.to_string()))?;

        let temp_path = self.temp_path();
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .await
            .map_err(|e| Error::io(e, &temp_path, "open"))?;

        file.write_all(contents.as_bytes())
            .await
            .map_err(|e| Error::io(e, &temp_path, "write_all"))?;
        file.sync_all()
            .await
            .map_err(|e| Error::io(e, &temp_path, "sync_all"))?;
        drop(file);

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| Error::io(e, &self.path, "rename"))?;
        Ok(())
    }
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}
