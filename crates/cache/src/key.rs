//! Deterministic cache keys for tool builds

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Version of the key envelope layout. Bumping it orphans every existing entry.
const KEY_FORMAT: u32 = 1;

/// Identity of the toolchain a binary was built with.
///
/// Two fingerprints that differ in any field never share a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolchainFingerprint {
    /// Toolchain name and version (e.g., "go1.22.4").
    pub toolchain: String,
    /// Target platform (e.g., "linux-x86_64").
    pub platform: String,
}

impl ToolchainFingerprint {
    /// Create a new fingerprint.
    #[must_use]
    pub fn new(toolchain: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            toolchain: toolchain.into(),
            platform: platform.into(),
        }
    }
}

impl fmt::Display for ToolchainFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.toolchain, self.platform)
    }
}

/// Everything that identifies a buildable unit under a specific toolchain.
///
/// The envelope is hashed as canonical JSON; it is also persisted next to
/// the binary so the digest can be traced back to its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyEnvelope {
    /// Envelope layout version
    pub format: u32,
    /// Source package reference
    pub import_path: String,
    /// Optional version pin; `None` means latest resolvable source
    #[serde(default)]
    pub version: Option<String>,
    /// Toolchain identity
    pub toolchain: ToolchainFingerprint,
}

/// A cache key: the envelope, its digest and a human-readable name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    name: String,
    digest: String,
    envelope: KeyEnvelope,
}

impl CacheKey {
    /// Compute the key for a tool build.
    ///
    /// `name` only labels the cache directory; it does not take part in the
    /// digest.
    pub fn new(
        name: &str,
        import_path: &str,
        version: Option<&str>,
        toolchain: &ToolchainFingerprint,
    ) -> Result<Self> {
        let envelope = KeyEnvelope {
            format: KEY_FORMAT,
            import_path: import_path.to_string(),
            version: version.map(str::to_string),
            toolchain: toolchain.clone(),
        };
        let digest = compute_digest(&envelope)?;
        Ok(Self {
            name: sanitize_label(name),
            digest,
            envelope,
        })
    }

    /// Hex-encoded SHA-256 of the key envelope.
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Directory label (the tool name, made path-safe).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The inputs this key was derived from.
    #[must_use]
    pub fn envelope(&self) -> &KeyEnvelope {
        &self.envelope
    }

    /// Short digest prefix for log output.
    #[must_use]
    pub fn short_digest(&self) -> &str {
        &self.digest[..12.min(self.digest.len())]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.short_digest())
    }
}

fn compute_digest(envelope: &KeyEnvelope) -> Result<String> {
    // Struct fields serialize in declaration order, so the JSON is canonical
    let bytes = serde_json::to_vec(envelope)
        .map_err(|e| Error::serialization(format!("Failed to encode key envelope: {e}")))?;
    Ok(hex::encode(Sha256::digest(bytes)))
}

fn sanitize_label(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+' | '~') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}
