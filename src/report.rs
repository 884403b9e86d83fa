//! Console output for uploads and client listings

use crate::cdn::CacheSyncReport;
use crate::config::{ClientConfig, UploadConfig};
use crate::mapper::ResolvedFile;
use crate::upload::{FileOutcome, UploadListener, UploadResult};
use crate::upload_progress::{ProgressAggregator, ProgressDisplay};
use colored::Colorize;
use console::style;

const ONE_MINUTE_MS: i64 = 60 * 1000;

/// `relative/path ---> url`, with the key in red when the file failed
#[must_use]
pub fn file_line(outcome: &FileOutcome, path_width: usize) -> String {
    let path = &outcome.file.relative_path;
    let dashes = "-".repeat(path_width.saturating_sub(path.chars().count()) + 3);
    let destination = if outcome.is_success() {
        outcome.url.green().underline().to_string()
    } else {
        outcome.file.remote_key.red().to_string()
    };
    format!("{path} {} {destination}", format!("{dashes}>").dimmed())
}

/// `S.SS s` under a minute, `M m S s` above
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_duration(duration_ms: i64) -> String {
    let duration_ms = duration_ms.max(0);
    if duration_ms < ONE_MINUTE_MS {
        format!("{:.2} s", duration_ms as f64 / 1000.0)
    } else {
        let seconds = ((duration_ms % ONE_MINUTE_MS) as f64 / 1000.0).round();
        format!("{} m {seconds} s", duration_ms / ONE_MINUTE_MS)
    }
}

/// One-line summary of a finished batch
#[must_use]
pub fn summary_line(result: &UploadResult) -> String {
    let label = if result.dry_run {
        "Dry-run upload finished"
    } else {
        "Upload finished"
    };
    format!(
        "{} {} | Total {} | Succeeded {} | Failed {}",
        label.blue(),
        format_duration(result.duration_ms()).blue(),
        result.files.len().to_string().cyan(),
        result.success_count().to_string().green(),
        result.failure_count().to_string().red()
    )
}

fn path_width(files: &[ResolvedFile]) -> usize {
    files
        .iter()
        .map(|f| f.relative_path.chars().count())
        .max()
        .unwrap_or(0)
}

/// Prints upload events to the terminal
///
/// Without a progress bar each file is printed as it finishes. With one, or
/// in dry-run, the full list is printed once the batch is done.
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    show_progress: bool,
    dry_run: bool,
    path_width: usize,
    display: Option<ProgressDisplay>,
}

impl ConsoleReporter {
    /// Reporter for the next directive
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    const fn live_lines(&self) -> bool {
        !self.show_progress && !self.dry_run
    }

    /// Print the file list (when not printed live) and the summary
    pub fn print_result(&self, result: &UploadResult) {
        if !self.live_lines() {
            let width = result
                .files
                .iter()
                .map(|f| f.file.relative_path.chars().count())
                .max()
                .unwrap_or(0);
            for outcome in &result.files {
                println!("{}", file_line(outcome, width));
            }
        }
        println!("{}", summary_line(result));
    }

    /// Announce each cache operation that ran
    pub fn print_cache_sync(&self, report: &CacheSyncReport) {
        if let Some(calls) = report.purge_calls {
            println!("{} CDN cache purged ({calls} request(s))", style("✓").green());
        }
        if let Some(calls) = report.push_calls {
            println!("{} CDN cache pushed ({calls} request(s))", style("✓").green());
        }
    }
}

impl UploadListener for ConsoleReporter {
    fn batch_started(&mut self, files: &[ResolvedFile], config: &UploadConfig) {
        self.show_progress = config.show_progress;
        self.dry_run = config.dry_run;
        self.path_width = path_width(files);
        self.display = (self.show_progress && !self.dry_run && !files.is_empty()).then(ProgressDisplay::new);
    }

    fn file_finished(&mut self, outcome: &FileOutcome) {
        if self.live_lines() {
            println!("{}", file_line(outcome, self.path_width));
        }
    }

    fn progress(&mut self, progress: &ProgressAggregator) {
        if let Some(display) = &self.display {
            display.render(progress);
        }
    }

    fn batch_finished(&mut self) {
        if let Some(display) = self.display.take() {
            display.abandon();
        }
    }
}

/// Table of configured clients
#[must_use]
pub fn client_table(clients: &[ClientConfig]) -> String {
    let header = ["NAME", "ENABLE", "BUCKET", "REGION", "CDN DOMAIN"];
    let rows: Vec<[String; 5]> = clients
        .iter()
        .map(|c| {
            [
                c.name.clone(),
                c.enable.to_string(),
                c.bucket.clone(),
                c.region.clone(),
                c.cdn.as_ref().map(|cdn| cdn.domain.clone()).unwrap_or_default(),
            ]
        })
        .collect();

    let mut widths = header.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut lines = vec![table_row(&header, &widths).bold().to_string()];
    for row in &rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        lines.push(table_row(&cells, &widths));
    }
    lines.join("\n")
}

fn table_row(cells: &[&str], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

/// Every client with its secrets masked, as TOML
pub fn client_details(clients: &[ClientConfig]) -> Result<String, toml::ser::Error> {
    let mut out = Vec::with_capacity(clients.len());
    for client in clients {
        let name = if client.name.is_empty() {
            client.bucket.as_str()
        } else {
            client.name.as_str()
        };
        out.push(format!(
            "{}\n{}",
            format!("# {name}").cyan(),
            toml::to_string_pretty(&client.masked())?
        ));
    }
    Ok(out.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CdnBinding;
    use crate::error::TransferError;
    use std::path::PathBuf;

    fn outcome(path: &str, error: bool) -> FileOutcome {
        FileOutcome {
            file: ResolvedFile {
                relative_path: path.to_string(),
                full_path: PathBuf::from("/w").join(path),
                remote_key: format!("up/{path}"),
            },
            provider_result: None,
            provider_error: error.then(|| TransferError::Network("reset".to_string())),
            url: if error {
                String::new()
            } else {
                format!("https://cdn.example.com/up/{path}")
            },
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0.00 s");
        assert_eq!(format_duration(1234), "1.23 s");
        assert_eq!(format_duration(59_999), "60.00 s");
        assert_eq!(format_duration(60_000), "1 m 0 s");
        assert_eq!(format_duration(125_600), "2 m 6 s");
    }

    #[test]
    fn test_file_line_alignment() {
        colored::control::set_override(false);
        assert_eq!(
            file_line(&outcome("a.js", false), 8),
            "a.js -------> https://cdn.example.com/up/a.js"
        );
        assert_eq!(file_line(&outcome("long/b.js", true), 9), "long/b.js ---> up/long/b.js");
    }

    #[test]
    fn test_summary_counts() {
        colored::control::set_override(false);
        let result = UploadResult {
            files: vec![outcome("a.js", false), outcome("b.js", true), outcome("c.js", false)],
            start_time: 1_000,
            end_time: 3_500,
            dry_run: false,
            batch_error: None,
            cache_sync: None,
        };
        assert_eq!(
            summary_line(&result),
            "Upload finished 2.50 s | Total 3 | Succeeded 2 | Failed 1"
        );
    }

    #[test]
    fn test_client_table() {
        colored::control::set_override(false);
        let clients = vec![
            ClientConfig {
                name: "prod".to_string(),
                enable: true,
                bucket: "assets-1250000000".to_string(),
                region: "ap-guangzhou".to_string(),
                cdn: Some(CdnBinding {
                    domain: "static.example.com".to_string(),
                    config: None,
                }),
                ..Default::default()
            },
            ClientConfig {
                name: "backup".to_string(),
                bucket: "b-1".to_string(),
                region: "ap-beijing".to_string(),
                ..Default::default()
            },
        ];
        let table = client_table(&clients);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("NAME    ENABLE  BUCKET"));
        assert!(lines[1].ends_with("static.example.com"));
        assert!(lines[2].starts_with("backup  false   b-1"));
    }

    #[test]
    fn test_client_details_masks_secrets() {
        colored::control::set_override(false);
        let client = ClientConfig {
            name: "prod".to_string(),
            bucket: "assets-1250000000".to_string(),
            region: "ap-guangzhou".to_string(),
            secret_id: "AKIDabcdefghijklmnop".to_string(),
            secret_key: "supersecretvalue1234".to_string(),
            ..Default::default()
        };
        let details = client_details(&[client]).unwrap();
        assert!(details.starts_with("# prod"));
        assert!(!details.contains("supersecretvalue1234"));
    }
}
