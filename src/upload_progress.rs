#![allow(clippy::cast_precision_loss)] // Progress display - precision loss acceptable
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

//! Batch progress: the aggregated state and its terminal bar

use crate::storage::ProgressSample;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

/// Aggregated progress of one upload batch
///
/// Combines the file count known up front, per-file completions and the
/// latest byte-level sample from the provider. Observability only: nothing
/// in the orchestrator reads it back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressAggregator {
    total_files: usize,
    successes: usize,
    failures: usize,
    latest: ProgressSample,
    finished: bool,
}

impl ProgressAggregator {
    /// Start tracking a batch of `total_files`
    #[must_use]
    pub fn new(total_files: usize) -> Self {
        Self {
            total_files,
            finished: total_files == 0,
            ..Self::default()
        }
    }

    /// Take a new byte-level sample
    pub fn update(&mut self, sample: ProgressSample) {
        self.latest = sample;
    }

    /// Count a finished file
    pub fn file_finished(&mut self, success: bool) {
        if self.finished {
            return;
        }
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.finished = self.completed() >= self.total_files;
    }

    /// Files in the batch
    #[must_use]
    pub const fn total_files(&self) -> usize {
        self.total_files
    }

    /// Files stored successfully so far
    #[must_use]
    pub const fn successes(&self) -> usize {
        self.successes
    }

    /// Files that failed so far
    #[must_use]
    pub const fn failures(&self) -> usize {
        self.failures
    }

    /// Files finished either way
    #[must_use]
    pub const fn completed(&self) -> usize {
        self.successes + self.failures
    }

    /// Latest byte-level sample
    #[must_use]
    pub const fn latest(&self) -> ProgressSample {
        self.latest
    }

    /// Every file has reported
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whole percent of bytes sent, 100 once every file reported
    #[must_use]
    pub fn percent(&self) -> u64 {
        if self.finished {
            return 100;
        }
        (self.latest.fraction_complete * 100.0).floor().clamp(0.0, 100.0) as u64
    }
}

/// Human speed, `MB/s` above one MiB per second, `KB/s` below
#[must_use]
pub fn format_speed(bytes_per_second: f64) -> String {
    if bytes_per_second > 1024.0 * 1024.0 {
        format!("{:.2}MB/s", bytes_per_second / 1024.0 / 1024.0)
    } else {
        format!("{:.2}KB/s", bytes_per_second / 1024.0)
    }
}

/// Terminal bar fed from a [`ProgressAggregator`]
pub struct ProgressDisplay {
    bar: ProgressBar,
}

impl std::fmt::Debug for ProgressDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressDisplay").finish_non_exhaustive()
    }
}

impl ProgressDisplay {
    /// Bar sized in percent, drawn to stderr
    #[must_use]
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("Uploading [{bar:30.cyan/dim}] {pos}% | {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        Self { bar }
    }

    /// Redraw from the aggregated state; finishes the bar once complete
    pub fn render(&self, progress: &ProgressAggregator) {
        if self.bar.is_finished() {
            return;
        }
        let speed = if progress.latest().loaded_bytes == 0 {
            "N/A".to_string()
        } else {
            format_speed(progress.latest().bytes_per_second)
        };
        self.bar.set_position(progress.percent());
        self.bar.set_message(format!(
            "{speed} | Total {} | Succeeded {} | Failed {}",
            progress.total_files().to_string().cyan(),
            progress.successes().to_string().green(),
            progress.failures().to_string().red()
        ));
        if progress.is_finished() {
            self.bar.finish();
        }
    }

    /// Stop drawing, leaving the last state on screen
    pub fn abandon(&self) {
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
    }
}

impl Default for ProgressDisplay {
    fn default() -> Self {
        Self::new()
    }
}
