//! # pan-dl
//!
//! Downloads a single large file over HTTP(S) by splitting it into byte ranges
//! and fetching them concurrently, each range written straight to its final
//! offset in the output file.
//!
//! ```no_run
//! # async fn run() -> pan_dl::Result<()> {
//! let report = pan_dl::get("https://example.com/big.iso", pan_dl::DownloadOptions::default()).await?;
//! println!("saved {} bytes to {}", report.total_length, report.path.display());
//! # Ok(())
//! # }
//! ```

mod core;

pub use crate::core::downloader::{
    DownloadOptions, DownloadPlan, DownloadReport, Downloader, DEFAULT_BLOCK_SIZE, DEFAULT_BUFFER_SIZE,
    DEFAULT_COOKIE_NAME, DEFAULT_WORKERS,
};
pub use crate::core::error::{Error, Result};
pub use crate::core::planner::{
    balanced_block_size, effective_workers, plan_ranges, range_count, ChunkRange, RangePlan, MIN_SPLIT_SIZE,
};
pub use crate::core::probe::{
    filename_from_disposition, filename_from_url, sniff_error_payload, ErrorPayload, ProbeInfo,
    SMALL_BODY_THRESHOLD,
};
pub use crate::core::progress::{ProgressCallback, ProgressSample, PROGRESS_INTERVAL};
pub use crate::core::retry::{BoundedRetry, RetryDecision, RetryForever, RetryPolicy};
pub use crate::core::store::OutputStore;

/// Download `url` with the given options
pub async fn get(url: &str, options: DownloadOptions) -> Result<DownloadReport> {
    Downloader::new(options)?.download(url).await
}

/// Probe `url` and return the plan a download would follow
pub async fn plan(url: &str, options: DownloadOptions) -> Result<DownloadPlan> {
    Downloader::new(options)?.plan(url).await
}
