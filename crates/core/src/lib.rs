//! Tool repository core for bingen
//!
//! This crate owns the lifecycle of a project's tracked command-line tools:
//! - [`manifest`]: the persisted list of tracked import paths
//! - [`build`]: building missing or stale tools into the binary cache
//! - [`dispatch`]: running a tracked tool by name
//! - [`toolchain`]: the compiler seam, with Go as the default
//!
//! [`ToolRepository`] ties them together behind four operations: `create`,
//! `add`, `build_all` and `run`.
//!
//! # Example
//!
//! ```no_run
//! use bingen_core::Config;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> bingen_core::Result<()> {
//! let cancel = CancellationToken::new();
//! let repo = Config::new(".").create()?;
//! repo.add(["golang.org/x/tools/cmd/stringer"], &cancel).await?;
//! repo.build_all(&cancel).await?;
//! let code = repo.run("stringer", &["-help".into()], &cancel).await?;
//! # let _ = code;
//! # Ok(())
//! # }
//! ```

#![expect(
    clippy::missing_errors_doc,
    reason = "Error conditions are described on the Error variants"
)]

pub mod build;
pub mod config;
pub mod dispatch;
mod error;
mod lock;
pub mod manifest;
pub mod process;
mod repository;
pub mod toolchain;

pub use build::{BuildOrchestrator, BuildOutcome, BuildReport};
pub use config::Config;
pub use dispatch::Dispatcher;
pub use error::{BuildFailure, Error, Result};
pub use manifest::{Manifest, ManifestEntry, ManifestStore, ToolSpec, Upsert};
pub use repository::ToolRepository;
pub use toolchain::{BuildRequest, GoToolchain, Platform, Toolchain};

pub use bingen_cache::{BinaryCache, CacheEntry, CacheKey, ToolchainFingerprint};
