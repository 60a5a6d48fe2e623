//! Content-addressed binary cache for bingen
//!
//! This crate stores the executables produced by tool builds:
//! - Deterministic cache keys derived from the import path, the version pin
//!   and the toolchain fingerprint
//! - One directory per key holding the binary and its `entry.json` metadata
//! - Self-healing lookups that never hand out a missing or non-executable file
//!
//! # Layout
//!
//! ```text
//! <cache root>/
//! └── <tool name>/
//!     └── <sha256 of the key envelope>/
//!         ├── entry.json   # CacheEntry metadata, including the key envelope
//!         └── <tool name>  # the executable
//! ```
//!
//! The tool name in the path keeps the directory browsable; `entry.json`
//! carries the full key envelope so a file can be correlated to the import
//! path and toolchain that produced it.

#![expect(
    clippy::missing_errors_doc,
    reason = "Error conditions are described on the Error variants"
)]

mod error;
mod key;
mod store;

pub use error::{Error, Result};
pub use key::{CacheKey, KeyEnvelope, ToolchainFingerprint};
pub use store::{BinaryCache, CacheEntry, ENTRY_FILE_NAME};
