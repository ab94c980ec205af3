// src/progress.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Byte-level progress reporting for a single transfer

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

const BAR_TEMPLATE: &str =
    "{prefix}: {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, ETA: {eta})";
const SPINNER_TEMPLATE: &str = "{prefix}: {spinner:.green} [{elapsed_precise}] {bytes} ({bytes_per_sec})";

/// Progress bar for one transfer, drawn on stderr.
///
/// A hidden tracker still counts bytes, so callers never branch on verbosity.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    bar: ProgressBar,
}

impl TransferProgress {
    /// Visible tracker. Without a known total it shows a byte counter spinner.
    pub fn new(operation: &str, total_bytes: Option<u64>) -> Self {
        let bar = match total_bytes {
            Some(total) => ProgressBar::new(total),
            None => ProgressBar::new_spinner(),
        };
        bar.set_draw_target(ProgressDrawTarget::stderr());
        bar.set_prefix(operation.to_string());
        let tracker = Self { bar };
        tracker.apply_style(total_bytes.is_some());
        tracker
    }

    /// Tracker that counts but never draws.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    fn apply_style(&self, bounded: bool) {
        let style = if bounded {
            ProgressStyle::default_bar()
                .template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  ")
        } else {
            ProgressStyle::default_spinner()
                .template(SPINNER_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        };
        self.bar.set_style(style);
    }

    /// Set the total once the size is discovered (e.g. from Content-Length).
    pub fn set_total_bytes(&self, total_bytes: u64) {
        if self.bar.length().is_none() && !self.bar.is_hidden() {
            self.apply_style(true);
        }
        self.bar.set_length(total_bytes);
    }

    pub fn inc(&self, bytes: u64) {
        self.bar.inc(bytes);
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Finish the bar with a throughput summary.
    pub fn finish(&self, operation: &str, total_bytes: u64, duration: Duration) {
        let secs = duration.as_secs_f64().max(f64::EPSILON);
        let mib = total_bytes as f64 / 1_048_576.0;
        self.bar.finish_with_message(format!(
            "{} complete! {:.2} MiB in {:.2}s ({:.2} MiB/s)",
            operation,
            mib,
            duration.as_secs_f64(),
            mib / secs
        ));
    }

    /// Leave the bar where it stopped.
    pub fn abandon(&self) {
        self.bar.abandon();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_tracker_still_counts() {
        let p = TransferProgress::hidden();
        p.inc(10);
        p.inc(32);
        assert_eq!(p.position(), 42);
        p.set_total_bytes(100);
        p.finish("download", 42, Duration::from_millis(5));
    }

    #[test]
    fn zero_duration_does_not_panic() {
        let p = TransferProgress::hidden();
        p.finish("upload", 0, Duration::ZERO);
    }
}
