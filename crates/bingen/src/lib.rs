//! bingen command-line interface
//!
//! A thin layer over [`bingen_core::ToolRepository`]: it parses flags,
//! picks one action, initialises logging and maps results to exit codes.
//!
//! ```text
//! bingen --add golang.org/x/tools/cmd/stringer   # track a tool
//! bingen --build                                 # build everything missing or stale
//! bingen stringer -type=Kind                     # run a tool, building it on demand
//! ```

#![expect(
    clippy::missing_errors_doc,
    reason = "Error conditions are described on the Error variants"
)]

pub mod cli;
pub mod tracing;

pub use cli::{Action, Cli, CliError, execute};
