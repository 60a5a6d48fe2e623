//! Manifest of tracked tools.
//!
//! The manifest (`bingen.toml`) is the single source of truth for which tools
//! a project tracks. It is an ordered list of import-path records:
//!
//! ```toml
//! version = 1
//!
//! [[tools]]
//! import_path = "golang.org/x/tools/cmd/stringer"
//! added_at = "2026-10-16T09:12:44Z"
//!
//! [[tools]]
//! import_path = "github.com/golangci/golangci-lint/cmd/golangci-lint"
//! version = "v1.59.1"
//! added_at = "2026-10-16T09:13:02Z"
//! ```

mod store;

pub use store::ManifestStore;

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Current manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// Default manifest filename, relative to the project root.
pub const MANIFEST_FILE_NAME: &str = "bingen.toml";

/// Longest accepted import path.
const MAX_IMPORT_PATH_LEN: usize = 4096;

/// A tool requested on the command line: an import path and optional pin.
///
/// Parsed from `import/path` or `import/path@version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToolSpec {
    /// Source package reference
    pub import_path: String,
    /// Optional version pin
    pub version: Option<String>,
}

impl ToolSpec {
    /// Parse and validate a tool reference.
    ///
    /// # Errors
    ///
    /// Returns `InvalidImportPath` if the path or the pin is malformed.
    pub fn parse(input: &str) -> Result<Self> {
        let (path, version) = match input.split_once('@') {
            Some((path, version)) => (path, Some(version)),
            None => (input, None),
        };

        validate_import_path(path).map_err(|reason| Error::invalid_import_path(input, reason))?;
        if let Some(version) = version {
            validate_version(version)
                .map_err(|reason| Error::invalid_import_path(input, reason))?;
        }

        Ok(Self {
            import_path: path.to_string(),
            version: version.map(str::to_string),
        })
    }

    /// Tool name this spec resolves to.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        tool_name_of(&self.import_path)
    }
}

impl FromStr for ToolSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ToolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}@{}", self.import_path, version),
            None => f.write_str(&self.import_path),
        }
    }
}

/// One tracked tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Source package reference (unique within a manifest)
    pub import_path: String,
    /// Optional version pin; `None` means latest resolvable source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// When the entry was first added
    pub added_at: DateTime<Utc>,
}

impl ManifestEntry {
    /// Create an entry from a validated spec.
    #[must_use]
    pub fn new(spec: ToolSpec, added_at: DateTime<Utc>) -> Self {
        Self {
            import_path: spec.import_path,
            version: spec.version,
            added_at,
        }
    }

    /// Name the tool is invoked by.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        tool_name_of(&self.import_path)
    }
}

/// The persisted, ordered set of tracked tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Manifest format version (for future migrations).
    pub version: u32,
    /// Tracked tools in insertion order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ManifestEntry>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            tools: Vec::new(),
        }
    }
}

/// What an upsert did to the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// A new entry was appended
    Added,
    /// An existing entry had its version pin changed
    PinUpdated,
    /// The entry was already tracked exactly as requested
    Unchanged,
}

impl Manifest {
    /// Create a new empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Find an entry by import path.
    #[must_use]
    pub fn get(&self, import_path: &str) -> Option<&ManifestEntry> {
        self.tools.iter().find(|e| e.import_path == import_path)
    }

    /// Resolve a tool by name, falling back to a full import path match.
    #[must_use]
    pub fn find_tool(&self, name: &str) -> Option<&ManifestEntry> {
        self.tools
            .iter()
            .find(|e| e.tool_name() == name)
            .or_else(|| self.get(name))
    }

    /// Add a tool or refresh its version pin.
    ///
    /// Re-adding a tracked import path never duplicates it; the pin is
    /// replaced (a bare path clears it) and `added_at` is kept.
    ///
    /// # Errors
    ///
    /// Returns `ToolNameConflict` if another import path already provides
    /// the same tool name. The manifest is left untouched in that case.
    pub fn upsert(&mut self, spec: ToolSpec, now: DateTime<Utc>) -> Result<Upsert> {
        let name = spec.tool_name();
        if let Some(other) = self
            .tools
            .iter()
            .find(|e| e.import_path != spec.import_path && e.tool_name() == name)
        {
            return Err(Error::ToolNameConflict {
                name: name.to_string(),
                existing: other.import_path.clone(),
                import_path: spec.import_path,
            });
        }

        if let Some(existing) = self
            .tools
            .iter_mut()
            .find(|e| e.import_path == spec.import_path)
        {
            if existing.version == spec.version {
                return Ok(Upsert::Unchanged);
            }
            existing.version = spec.version;
            return Ok(Upsert::PinUpdated);
        }

        self.tools.push(ManifestEntry::new(spec, now));
        Ok(Upsert::Added)
    }
}

/// Derive the tool name from an import path.
///
/// The name is the last path segment, skipping a trailing major version
/// suffix: `example.org/tool/a` is `a`, `example.org/mod/v2` is `mod`.
#[must_use]
pub fn tool_name_of(import_path: &str) -> &str {
    let mut segments = import_path.rsplit('/');
    let last = segments.next().unwrap_or(import_path);
    if is_major_version_suffix(last)
        && let Some(previous) = segments.next()
    {
        return previous;
    }
    last
}

fn is_major_version_suffix(segment: &str) -> bool {
    segment
        .strip_prefix('v')
        .filter(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
        .and_then(|digits| digits.parse::<u32>().ok())
        .is_some_and(|major| major >= 2)
}

fn validate_import_path(path: &str) -> std::result::Result<(), String> {
    if path.is_empty() {
        return Err("import path is empty".to_string());
    }
    if path.len() > MAX_IMPORT_PATH_LEN {
        return Err(format!(
            "import path is longer than {MAX_IMPORT_PATH_LEN} characters"
        ));
    }
    if let Some(c) = path
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~' | '/' | '+')))
    {
        return Err(format!("character {c:?} is not allowed"));
    }
    if path.starts_with('-') {
        return Err("import path must not start with '-'".to_string());
    }
    if path.starts_with('/') || path.ends_with('/') {
        return Err("import path must not start or end with '/'".to_string());
    }
    for segment in path.split('/') {
        if segment.is_empty() {
            return Err("import path contains an empty segment".to_string());
        }
        if segment.starts_with('.') {
            return Err(format!("segment '{segment}' must not start with '.'"));
        }
    }
    Ok(())
}

fn validate_version(version: &str) -> std::result::Result<(), String> {
    if version.is_empty() {
        return Err("version after '@' is empty".to_string());
    }
    if let Some(c) = version
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '+' | '~')))
    {
        return Err(format!("character {c:?} is not allowed in a version"));
    }
    if version.starts_with('-') {
        return Err("version must not start with '-'".to_string());
    }
    Ok(())
}
