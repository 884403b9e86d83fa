//! coscmd - upload local files to Tencent Cloud COS
//!
//! Uploads a file, directory or glob pattern to every enabled bucket and
//! optionally purges or pre-warms the bound CDN.

use coscmd::cli::Cli;
use coscmd::{commands, CliError};
use console::style;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter
const LOG_ENV: &str = "COSCMD_LOG";

fn main() {
    let exit_code = run();
    std::process::exit(exit_code);
}

/// Main application entry point
fn run() -> i32 {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("{} failed to start async runtime: {err}", style("Error:").red().bold());
            return 1;
        }
    };

    match runtime.block_on(commands::execute(&cli)) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            err.downcast_ref::<CliError>().map_or(1, CliError::exit_code)
        }
    }
}

/// Log to stderr, filtered by `COSCMD_LOG`; `--verbose` turns on debug output
fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "warn,coscmd=debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
