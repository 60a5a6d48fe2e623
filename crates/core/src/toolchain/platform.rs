//! Target platform identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform identifier combining OS and architecture.
///
/// Displayed as `os/arch` using toolchain-neutral names (`linux/amd64`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    /// Operating system
    pub os: Os,
    /// CPU architecture
    pub arch: Arch,
}

impl Platform {
    /// Create a new platform.
    #[must_use]
    pub const fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// The platform this process runs on.
    #[must_use]
    pub fn current() -> Self {
        Self {
            os: Os::current(),
            arch: Arch::current(),
        }
    }

    /// Parse from `os/arch` or `os-arch`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let (os, arch) = s.split_once('/').or_else(|| s.split_once('-'))?;
        if os.is_empty() || arch.is_empty() {
            return None;
        }
        Some(Self {
            os: Os::parse(os),
            arch: Arch::parse(arch),
        })
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// Operating system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    /// macOS
    Darwin,
    /// Linux
    Linux,
    /// Windows
    Windows,
    /// Anything else, by its lowercase name
    Other(String),
}

impl Os {
    /// The OS this process runs on.
    #[must_use]
    pub fn current() -> Self {
        Self::parse(std::env::consts::OS)
    }

    /// Parse from string, normalising common aliases.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "darwin" | "macos" | "osx" => Self::Darwin,
            "linux" => Self::Linux,
            "windows" | "win32" => Self::Windows,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Darwin => f.write_str("darwin"),
            Self::Linux => f.write_str("linux"),
            Self::Windows => f.write_str("windows"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// CPU architecture.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// 64-bit ARM
    Arm64,
    /// 64-bit x86
    Amd64,
    /// Anything else, by its lowercase name
    Other(String),
}

impl Arch {
    /// The architecture this process runs on.
    #[must_use]
    pub fn current() -> Self {
        Self::parse(std::env::consts::ARCH)
    }

    /// Parse from string, normalising common aliases.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "arm64" | "aarch64" => Self::Arm64,
            "amd64" | "x86_64" | "x64" => Self::Amd64,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arm64 => f.write_str("arm64"),
            Self::Amd64 => f.write_str("amd64"),
            Self::Other(name) => f.write_str(name),
        }
    }
}
