//! bingen CLI Application

// CLI binary needs to output to stdout/stderr - this is intentional
#![allow(clippy::print_stdout, clippy::print_stderr)]

use bingen::cli::{self, Cli, EXIT_ERROR, EXIT_SIGINT, exit_code_for, render_error};
use bingen::tracing::{TracingConfig, init_tracing};
use clap::Parser;
use tokio_util::sync::CancellationToken;

fn main() {
    // NOTE: Using eprintln! in panic hook is intentional - tracing infrastructure
    // may be corrupted during a panic, so we use the most reliable output method.
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(EXIT_ERROR);
        }
    };

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Fatal error: Failed to create tokio runtime: {e}");
            std::process::exit(EXIT_ERROR);
        }
    };

    let exit_code = rt.block_on(run(cli));
    // Do not wait on blocking tasks left behind by a cancelled run
    rt.shutdown_background();
    std::process::exit(exit_code);
}

/// Run the CLI and return the process exit code
async fn run(cli: Cli) -> i32 {
    if let Err(e) = init_tracing(TracingConfig::for_verbosity(cli.verbose, cli.log_format)) {
        eprintln!("{e:?}");
    }

    let cancel = CancellationToken::new();
    let mut stdout = std::io::stdout();
    let work = cli::execute(&cli, &cancel, &mut stdout);
    tokio::pin!(work);

    // Prefer the signal so a tool killed by the same Ctrl-C still reports 130
    tokio::select! {
        biased;

        _ = tokio::signal::ctrl_c() => {
            ::tracing::debug!("Interrupted, cancelling");
            cancel.cancel();
            let _ = work.await;
            EXIT_SIGINT
        }
        result = &mut work => match result {
            Ok(code) => code,
            Err(err) => {
                let code = exit_code_for(&err);
                render_error(err);
                code
            }
        }
    }
}
