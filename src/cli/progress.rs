//! CLI-specific progress handling for pan-dl
//!
//! Renders tracker samples as a single self-replacing status line.

use std::sync::Arc;

use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use pan_dl::{ProgressCallback, ProgressSample};

/// Creates the status line: bytes so far, total and current speed
pub fn create_progress_bar(total_size: u64) -> ProgressBar {
    let pb = ProgressBar::new(total_size);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} downloaded, speed: {msg}",
    )
    .map(|style| style.progress_chars("#>-"))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

/// Human-readable throughput, e.g. `1.50 MiB/s`
pub fn format_speed(bytes_per_sec: u64) -> String {
    format!("{}/s", HumanBytes(bytes_per_sec))
}

/// Progress manager bridging tracker samples to the terminal
pub struct ProgressManager {
    pub pb: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(total_size: u64) -> Self {
        Self {
            pb: create_progress_bar(total_size),
        }
    }

    /// Callback to hand to the downloader
    pub fn callback(&self) -> ProgressCallback {
        let pb = self.pb.clone();
        Arc::new(move |sample: ProgressSample| {
            if pb.length() != Some(sample.total) {
                pb.set_length(sample.total);
            }
            pb.set_position(sample.downloaded);
            pb.set_message(format_speed(sample.bytes_per_sec));
            if sample.downloaded >= sample.total {
                pb.finish();
            }
        })
    }
}
