//! Command execution
//!
//! Clients and directives run strictly one after another so that console
//! output never interleaves. Errors are handled by scope: configuration
//! errors abort the invocation, resolution errors skip one directive, and
//! storage or cache-sync errors skip the rest of that client's directives.

use crate::cli::{ClientCommand, Cli, Commands, UploadArgs};
use crate::config::{Config, UploadConfig};
use crate::error::CliError;
use crate::report::{self, ConsoleReporter};
use crate::upload::Client;
use anyhow::{Context, Result};
use console::style;

/// Run the parsed command; `Ok` carries the exit code
pub async fn execute(cli: &Cli) -> Result<i32> {
    if cli.verbose {
        eprintln!("coscmd v{}", env!("CARGO_PKG_VERSION"));
    }
    let config_file = cli.config_file.as_deref();

    match &cli.command {
        Commands::Upload(args) => {
            let config = Config::load(config_file)?;
            upload(&config, args).await
        }
        Commands::Client { command } => {
            let config = Config::load(config_file)?;
            match command.unwrap_or_default() {
                ClientCommand::List { detail } => list_clients(&config, detail),
            }
        }
    }
}

/// Directives to run: from the arguments, or configured ones with flags overlaid
pub fn build_directives(config: &Config, args: &UploadArgs) -> crate::Result<Vec<UploadConfig>> {
    if let Some(directive) = args.to_directive() {
        return Ok(vec![directive]);
    }
    let directives: Vec<UploadConfig> = config
        .uploads()
        .into_iter()
        .map(|mut directive| {
            args.overlay(&mut directive);
            directive
        })
        .collect();
    if directives.is_empty() {
        return Err(CliError::MissingUpload);
    }
    Ok(directives)
}

/// Exit code of the first failure seen
#[derive(Debug, Default)]
struct ExitStatus(i32);

impl ExitStatus {
    fn fail(&mut self, code: i32) {
        if self.0 == 0 {
            self.0 = code;
        }
    }
}

fn report_error(label: &str, err: &CliError) {
    eprintln!("{} {label}: {err}", style("✗").red());
}

async fn upload(config: &Config, args: &UploadArgs) -> Result<i32> {
    let clients = config.enabled_clients()?;
    let directives = build_directives(config, args)?;
    tracing::debug!(clients = clients.len(), directives = directives.len(), "upload plan ready");

    let mut status = ExitStatus::default();
    for client_config in &clients {
        let client = match Client::from_config(client_config) {
            Ok(client) => client,
            Err(e) => {
                report_error(&format!("client {}", client_config.bucket), &e);
                status.fail(e.exit_code());
                continue;
            }
        };
        println!(
            "{} {} {}",
            style("→").cyan(),
            style(client.name()).bold(),
            style(client.domain()).dim()
        );
        run_directives(&client, &directives, &mut status).await;
    }
    Ok(status.0)
}

/// Run every directive against one client, stopping at a client-wide error
async fn run_directives(client: &Client, directives: &[UploadConfig], status: &mut ExitStatus) {
    for directive in directives {
        let mut reporter = ConsoleReporter::new();
        let result = match client.upload(directive, &mut reporter).await {
            Ok(result) => result,
            Err(e) if e.is_directive_local() => {
                report_error(&format!("upload {:?}", directive.source), &e);
                status.fail(e.exit_code());
                continue;
            }
            Err(e) => {
                report_error(&format!("upload {:?}", directive.source), &e);
                status.fail(e.exit_code());
                break;
            }
        };

        reporter.print_result(&result);
        if result.failure_count() > 0 {
            status.fail(1);
        }
        if let Some(e) = &result.batch_error {
            report_error(&format!("client {}", client.name()), e);
            status.fail(e.exit_code());
            tracing::warn!(client = %client.name(), "skipping remaining directives after batch failure");
            break;
        }
        match &result.cache_sync {
            Some(Ok(sync)) => reporter.print_cache_sync(sync),
            Some(Err(e)) => {
                report_error("cdn", e);
                status.fail(e.exit_code());
                break;
            }
            None => {}
        }
    }
}

fn list_clients(config: &Config, detail: bool) -> Result<i32> {
    let clients = config.clients();
    if clients.is_empty() {
        println!("No client configured. Add a [[client]] section to cos.config.toml");
        return Ok(0);
    }
    if detail {
        println!("{}", report::client_details(&clients).context("failed to render clients")?);
    } else {
        println!("{}", report::client_table(&clients));
    }
    Ok(0)
}
