use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

use cli::args::Cli;
use resultpush_core::EXIT_CONFIG_ERROR;

/// Conventional status for a process stopped by SIGINT.
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = tokio::select! {
        result = cli::run(cli) => match result {
            Ok(code) => code,
            Err(e) => {
                eprintln!("error: {e:#}");
                EXIT_CONFIG_ERROR
            }
        },
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted");
            EXIT_INTERRUPTED
        }
    };
    std::process::exit(code);
}

/// Logs go to stderr; stdout carries the progress lines only.
fn init_logging(verbose: bool) {
    let default = if verbose {
        "resultpush=debug,resultpush_core=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
