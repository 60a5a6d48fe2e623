//! On-disk store mapping cache keys to built executables

use crate::key::{CacheKey, KeyEnvelope};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, trace, warn};

/// Metadata file written next to every cached binary.
pub const ENTRY_FILE_NAME: &str = "entry.json";

/// A cached, executable tool binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Tool name the entry is filed under
    pub name: String,
    /// Digest of the key envelope
    pub digest: String,
    /// Inputs the key was derived from
    pub key: KeyEnvelope,
    /// Location of the executable
    pub binary_path: PathBuf,
    /// When the binary was stored
    pub built_at: DateTime<Utc>,
    /// Hash of the build inputs, when the toolchain can provide one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_fingerprint: Option<String>,
}

/// Content-addressed store of built tool binaries.
///
/// Stores are last-write-wins per key: both the binary and `entry.json` are
/// staged in the entry directory and renamed into place, so readers never
/// observe a partially written file.
#[derive(Debug, Clone)]
pub struct BinaryCache {
    root: PathBuf,
}

impl BinaryCache {
    /// Create a cache rooted at the given directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Get the cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ensure the cache root exists.
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| Error::io(e, &self.root, "create_dir_all"))
    }

    /// Directory holding the entry for a key.
    #[must_use]
    pub fn entry_dir(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.name()).join(key.digest())
    }

    /// Path the binary for a key is stored at.
    #[must_use]
    pub fn binary_path(&self, key: &CacheKey) -> PathBuf {
        self.entry_dir(key)
            .join(format!("{}{}", key.name(), std::env::consts::EXE_SUFFIX))
    }

    /// Lock file guarding builds of a key, beside its entry directory.
    ///
    /// Kept outside the entry directory so `invalidate` never removes a
    /// lock another process holds.
    #[must_use]
    pub fn lock_path(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(key.name())
            .join(format!("{}.lock", key.digest()))
    }

    /// Look up the entry for a key.
    ///
    /// Returns `Ok(None)` when nothing usable is stored: no metadata,
    /// unreadable metadata, a digest mismatch, or a binary that is missing or
    /// not executable. A dangling entry is never returned.
    pub fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let meta_path = self.entry_dir(key).join(ENTRY_FILE_NAME);
        let Some(entry) = read_entry(&meta_path)? else {
            trace!(%key, "Cache miss");
            return Ok(None);
        };

        if entry.digest != key.digest() {
            warn!(%key, found = %entry.digest, "Cache metadata digest mismatch, ignoring entry");
            return Ok(None);
        }

        if !is_executable(&entry.binary_path) {
            debug!(
                %key,
                binary = %entry.binary_path.display(),
                "Cached binary missing or not executable, treating as miss"
            );
            return Ok(None);
        }

        trace!(%key, binary = %entry.binary_path.display(), "Cache hit");
        Ok(Some(entry))
    }

    /// Store a built binary under a key.
    ///
    /// The binary is copied into the cache; the source file is left alone.
    pub fn store(
        &self,
        key: &CacheKey,
        binary: &Path,
        source_fingerprint: Option<String>,
    ) -> Result<CacheEntry> {
        if !binary.is_file() {
            return Err(Error::missing_binary(binary));
        }

        let dir = self.entry_dir(key);
        fs::create_dir_all(&dir).map_err(|e| Error::io(e, &dir, "create_dir_all"))?;

        let dest = self.binary_path(key);
        let mut staged =
            NamedTempFile::new_in(&dir).map_err(|e| Error::io(e, &dir, "create temp file"))?;
        let mut source = fs::File::open(binary).map_err(|e| Error::io(e, binary, "open"))?;
        io::copy(&mut source, staged.as_file_mut()).map_err(|e| Error::io(e, binary, "copy"))?;
        make_executable(staged.as_file()).map_err(|e| Error::io(e, staged.path(), "chmod"))?;
        staged
            .persist(&dest)
            .map_err(|e| Error::io(e.error, &dest, "rename"))?;

        let entry = CacheEntry {
            name: key.name().to_string(),
            digest: key.digest().to_string(),
            key: key.envelope().clone(),
            binary_path: dest,
            built_at: Utc::now(),
            source_fingerprint,
        };
        write_entry(&dir, &entry)?;

        debug!(%key, binary = %entry.binary_path.display(), "Stored binary in cache");
        Ok(entry)
    }

    /// Remove the entry for a key.
    ///
    /// Returns `true` if something was removed.
    pub fn invalidate(&self, key: &CacheKey) -> Result<bool> {
        let dir = self.entry_dir(key);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                debug!(%key, "Invalidated cache entry");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::io(e, &dir, "remove_dir_all")),
        }
    }

    /// All usable entries currently in the cache.
    pub fn entries(&self) -> Result<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        for name_dir in list_dirs(&self.root)? {
            for entry_dir in list_dirs(&name_dir)? {
                if let Some(entry) = read_entry(&entry_dir.join(ENTRY_FILE_NAME))?
                    && is_executable(&entry.binary_path)
                {
                    entries.push(entry);
                }
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name).then(a.digest.cmp(&b.digest)));
        Ok(entries)
    }

    /// A scratch directory inside the cache root for build outputs.
    ///
    /// Keeping it on the same filesystem as the entries keeps stores cheap.
    /// The directory is removed when the returned handle is dropped.
    pub fn staging_dir(&self) -> Result<TempDir> {
        self.ensure_dirs()?;
        tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.root)
            .map_err(|e| Error::io(e, &self.root, "create staging dir"))
    }
}

fn read_entry(path: &Path) -> Result<Option<CacheEntry>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(e, path, "read")),
    };
    match serde_json::from_str(&content) {
        Ok(entry) => Ok(Some(entry)),
        Err(e) => {
            warn!(path = %path.display(), "Unreadable cache metadata, ignoring: {e}");
            Ok(None)
        }
    }
}

fn write_entry(dir: &Path, entry: &CacheEntry) -> Result<()> {
    let path = dir.join(ENTRY_FILE_NAME);
    let json = serde_json::to_vec_pretty(entry)
        .map_err(|e| Error::serialization(format!("Failed to serialize cache entry: {e}")))?;
    let mut staged =
        NamedTempFile::new_in(dir).map_err(|e| Error::io(e, dir, "create temp file"))?;
    staged
        .write_all(&json)
        .map_err(|e| Error::io(e, staged.path(), "write"))?;
    staged
        .persist(&path)
        .map_err(|e| Error::io(e.error, &path, "rename"))?;
    Ok(())
}

fn list_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let read = match fs::read_dir(dir) {
        Ok(read) => read,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io(e, dir, "read_dir")),
    };
    Ok(read
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(unix)]
fn make_executable(file: &fs::File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_file: &fs::File) -> io::Result<()> {
    Ok(())
}
