use crate::tracing::TracingFormat;
use bingen_core::{Config, GoToolchain};
use clap::{CommandFactory, Parser};
use miette::{Diagnostic, Report};
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Exit codes for the CLI application
pub const EXIT_OK: i32 = 0;
/// Any failed operation
pub const EXIT_ERROR: i32 = 1;
/// Exit code for SIGINT (128 + signal number 2)
pub const EXIT_SIGINT: i32 = 130;

/// Track, build and run a project's command-line tools.
///
/// Everything after the tool name is passed to the tool unchanged.
#[derive(Parser, Debug)]
#[command(
    name = "bingen",
    disable_help_flag = true,
    disable_version_flag = true,
    override_usage = "bingen --add <PKG>...\n       bingen --build\n       bingen <TOOL> [ARGS]..."
)]
pub struct Cli {
    /// Track one or more import paths (`path` or `path@version`)
    #[arg(long, value_name = "PKG", num_args = 1..)]
    pub add: Vec<String>,

    /// Build every tracked tool that is missing or stale
    #[arg(long)]
    pub build: bool,

    /// Print version information
    #[arg(long)]
    pub version: bool,

    /// Log build and cache diagnostics to stderr
    #[arg(short, long)]
    pub verbose: bool,

    /// Print help
    #[arg(short, long)]
    pub help: bool,

    /// Manifest file
    #[arg(long, value_name = "FILE", env = "BINGEN_MANIFEST")]
    pub manifest: Option<PathBuf>,

    /// Directory for built binaries
    #[arg(long, value_name = "DIR", env = "BINGEN_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Maximum concurrent builds (0 = twice the available cores)
    #[arg(long, value_name = "N", env = "BINGEN_JOBS", default_value_t = 0)]
    pub jobs: usize,

    /// Go executable used for builds
    #[arg(long, value_name = "PATH", env = "BINGEN_GO")]
    pub go: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, env = "BINGEN_LOG_FORMAT", default_value = "compact")]
    pub log_format: TracingFormat,

    /// Tool to run, followed by its arguments
    #[arg(
        value_name = "TOOL",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub tool: Vec<OsString>,
}

/// What a command line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Track import paths
    Add(Vec<String>),
    /// Print the version
    Version,
    /// Print help
    Help,
    /// Build all tracked tools
    Build,
    /// Run a tool
    Run {
        /// Tool name or import path
        tool: String,
        /// Arguments passed through
        args: Vec<OsString>,
    },
}

impl Cli {
    /// Resolve the single action to perform.
    ///
    /// When several are requested the first of add, version, help, build
    /// and run wins. With nothing requested, help is shown.
    #[must_use]
    pub fn action(&self) -> Action {
        if !self.add.is_empty() {
            return Action::Add(self.add.clone());
        }
        if self.version {
            return Action::Version;
        }
        if self.help {
            return Action::Help;
        }
        if self.build {
            return Action::Build;
        }
        if let Some((tool, args)) = self.tool.split_first() {
            return Action::Run {
                tool: tool.to_string_lossy().into_owned(),
                args: args.to_vec(),
            };
        }
        Action::Help
    }

    /// Repository configuration for the current directory.
    #[must_use]
    pub fn config(&self) -> Config {
        let mut config = Config::default().with_max_parallel_builds(self.jobs);
        if let Some(manifest) = &self.manifest {
            config = config.with_manifest_file(manifest);
        }
        if let Some(cache_dir) = &self.cache_dir {
            config = config.with_cache_dir(cache_dir);
        }
        if let Some(go) = &self.go {
            config = config.with_toolchain(Arc::new(GoToolchain::with_program(go)));
        }
        config
    }
}

/// Version line printed by `--version`.
#[must_use]
pub fn version_string() -> String {
    format!("bingen {}", env!("CARGO_PKG_VERSION"))
}

/// CLI-level failures.
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// The repository reported an error
    #[error(transparent)]
    #[diagnostic(transparent)]
    Core(#[from] bingen_core::Error),

    /// Writing to stdout failed
    #[error("Failed to write output: {0}")]
    #[diagnostic(code(bingen::cli::output))]
    Output(#[from] io::Error),
}

/// Map CLI error to appropriate exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Core(bingen_core::Error::Cancelled) => EXIT_SIGINT,
        CliError::Core(_) | CliError::Output(_) => EXIT_ERROR,
    }
}

/// Print an error report to stderr.
#[allow(clippy::print_stderr)]
pub fn render_error(err: CliError) {
    let report = Report::new(err);
    eprintln!("{report:?}");
    // Ensure output is flushed before potential process exit
    let _ = io::stderr().flush();
}

/// Perform the requested action and return the process exit code.
///
/// `Run` yields the tool's own exit code.
pub async fn execute(
    cli: &Cli,
    cancel: &CancellationToken,
    stdout: &mut (dyn Write + Send),
) -> Result<i32, CliError> {
    let action = cli.action();
    tracing::debug!(?action, "Resolved action");

    match action {
        Action::Version => {
            writeln!(stdout, "{}", version_string())?;
            Ok(EXIT_OK)
        }
        Action::Help => {
            writeln!(stdout, "{}", Cli::command().render_help())?;
            Ok(EXIT_OK)
        }
        Action::Add(paths) => {
            let repo = cli.config().create()?;
            repo.add(&paths, cancel).await?;
            Ok(EXIT_OK)
        }
        Action::Build => {
            let repo = cli.config().create()?;
            repo.build_all(cancel).await?;
            Ok(EXIT_OK)
        }
        Action::Run { tool, args } => {
            let repo = cli.config().create()?;
            Ok(repo.run(&tool, &args, cancel).await?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("bingen").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn no_arguments_shows_help() {
        assert_eq!(cli(&[]).action(), Action::Help);
    }

    #[test]
    fn add_takes_several_packages() {
        assert_eq!(
            cli(&["--add", "example.org/a", "example.org/b@v1.0.0"]).action(),
            Action::Add(vec![
                "example.org/a".to_string(),
                "example.org/b@v1.0.0".to_string()
            ])
        );
    }

    #[test]
    fn tool_arguments_are_forwarded_verbatim() {
        let parsed = cli(&["lint", "--build", "-v", "x"]);
        assert!(!parsed.build);
        assert!(!parsed.verbose);
        assert_eq!(
            parsed.action(),
            Action::Run {
                tool: "lint".to_string(),
                args: vec!["--build".into(), "-v".into(), "x".into()],
            }
        );
    }

    #[test]
    fn flags_before_the_tool_belong_to_bingen() {
        let parsed = cli(&["-v", "lint", "--fix"]);
        assert!(parsed.verbose);
        assert_eq!(
            parsed.action(),
            Action::Run {
                tool: "lint".to_string(),
                args: vec!["--fix".into()],
            }
        );
    }

    #[test]
    fn precedence_follows_add_version_help_build_run() {
        assert!(matches!(
            cli(&["--version", "--add", "example.org/a"]).action(),
            Action::Add(_)
        ));
        assert_eq!(cli(&["--build", "--help", "--version"]).action(), Action::Version);
        assert_eq!(cli(&["--build", "-h"]).action(), Action::Help);
        assert_eq!(cli(&["--build", "lint"]).action(), Action::Build);
    }

    #[test]
    fn cancelled_maps_to_sigint_exit_code() {
        assert_eq!(
            exit_code_for(&CliError::Core(bingen_core::Error::Cancelled)),
            EXIT_SIGINT
        );
        assert_eq!(
            exit_code_for(&CliError::Core(bingen_core::Error::unknown_tool("x"))),
            EXIT_ERROR
        );
    }

    #[test]
    fn version_string_names_the_binary() {
        assert_eq!(version_string(), format!("bingen {}", env!("CARGO_PKG_VERSION")));
    }

    #[tokio::test]
    async fn version_is_written_to_stdout() {
        let mut out = Vec::new();
        let code = execute(&cli(&["--version"]), &CancellationToken::new(), &mut out)
            .await
            .unwrap();
        assert_eq!(code, EXIT_OK);
        assert_eq!(String::from_utf8(out).unwrap().trim(), version_string());
    }
}
