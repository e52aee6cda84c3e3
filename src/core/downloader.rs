//! Core download functionality for pan-dl
//!
//! Probes the resource, plans its ranges and drives the worker pool while the
//! progress tracker samples alongside.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use reqwest::{Client, ClientBuilder, Url};

use crate::core::error::{Error, Result};
use crate::core::fetcher::ChunkFetcher;
use crate::core::planner::{balanced_block_size, effective_workers, plan_ranges, range_count};
use crate::core::pool::WorkerPool;
use crate::core::probe::{probe, ProbeInfo};
use crate::core::progress::{
    Completion, ProgressCallback, ProgressCounter, ProgressSample, ProgressTracker, PROGRESS_INTERVAL,
};
use crate::core::queue::work_queue;
use crate::core::retry::{RetryForever, RetryPolicy};
use crate::core::store::OutputStore;

/// Default number of concurrent workers
pub const DEFAULT_WORKERS: usize = 32;

/// Default block size used to split the file (20 MiB)
pub const DEFAULT_BLOCK_SIZE: u64 = 20 * 1024 * 1024;

/// Default read buffer per fetch (1 MiB)
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Default name of the session cookie
pub const DEFAULT_COOKIE_NAME: &str = "BDUSS";

/// Options for download operations
#[derive(Clone)]
pub struct DownloadOptions {
    /// Maximum number of concurrent workers
    pub workers: usize,

    /// Target size of each range
    pub block_size: u64,

    /// Read buffer size for streaming each range
    pub buffer_size: usize,

    /// Destination directory
    pub dir: PathBuf,

    /// Output filename; overrides the probed name
    pub filename: Option<String>,

    /// Session credential sent as a cookie
    pub credential: Option<String>,

    /// Name of the session cookie
    pub cookie_name: String,

    /// Log chunk failures
    pub debug: bool,

    /// Spread small files over all workers
    pub rebalance: bool,

    /// What to do when a range fails
    pub retry: Arc<dyn RetryPolicy>,

    /// Optional progress callback
    pub progress: Option<ProgressCallback>,

    /// How often progress is sampled
    pub progress_interval: Duration,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            block_size: DEFAULT_BLOCK_SIZE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            dir: PathBuf::new(),
            filename: None,
            credential: None,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            debug: false,
            rebalance: false,
            retry: Arc::new(RetryForever),
            progress: None,
            progress_interval: PROGRESS_INTERVAL,
        }
    }
}

impl DownloadOptions {
    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::InvalidInput("worker count must be greater than zero".to_string()));
        }
        if self.block_size == 0 {
            return Err(Error::InvalidInput("block size must be greater than zero".to_string()));
        }
        if self.buffer_size == 0 {
            return Err(Error::InvalidInput("buffer size must be greater than zero".to_string()));
        }
        if self.progress_interval.is_zero() {
            return Err(Error::InvalidInput("progress interval must be greater than zero".to_string()));
        }
        Ok(())
    }

    /// `Cookie` header value, if a credential is set
    pub fn cookie_header(&self) -> Option<String> {
        self.credential
            .as_deref()
            .filter(|value| !value.is_empty())
            .map(|value| format!("{}={}", self.cookie_name, value))
    }
}

impl std::fmt::Debug for DownloadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadOptions")
            .field("workers", &self.workers)
            .field("block_size", &self.block_size)
            .field("buffer_size", &self.buffer_size)
            .field("dir", &self.dir)
            .field("filename", &self.filename)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("cookie_name", &self.cookie_name)
            .field("debug", &self.debug)
            .field("rebalance", &self.rebalance)
            .field("progress_interval", &self.progress_interval)
            .finish_non_exhaustive()
    }
}

/// Everything needed to fetch one resource; fixed once probing is done
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadPlan {
    pub url: Url,
    pub total_length: u64,
    pub filename: String,
    pub path: PathBuf,
    pub block_size: u64,
    pub buffer_size: usize,
    pub workers: usize,
}

impl DownloadPlan {
    pub fn range_count(&self) -> u64 {
        range_count(self.total_length, self.block_size)
    }
}

/// Outcome of a finished download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub path: PathBuf,
    pub total_length: u64,
    pub elapsed: Duration,
}

impl DownloadReport {
    /// Average throughput in bytes per second
    pub fn average_speed(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64().max(0.001);
        (self.total_length as f64 / secs) as u64
    }
}

/// Ranged parallel downloader
pub struct Downloader {
    client: Client,
    options: DownloadOptions,
}

impl Downloader {
    /// Create a downloader; fails on invalid options
    pub fn new(options: DownloadOptions) -> Result<Self> {
        options.validate()?;
        let client = ClientBuilder::new()
            .tcp_keepalive(Duration::from_secs(60))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(options.workers)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(format!("pan-dl/{}", env!("PAN_DL_VERSION")))
            .build()
            .map_err(|e| Error::InvalidInput(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client, options })
    }

    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    /// Probe `url` and work out the plan, without touching the filesystem
    pub async fn plan(&self, url: &str) -> Result<DownloadPlan> {
        let url = parse_url(url)?;
        let cookie = self.options.cookie_header();
        let ProbeInfo { total_length, filename } = probe(&self.client, &url, cookie.as_deref()).await?;

        let filename = self.options.filename.clone().unwrap_or(filename);
        let path = self.options.dir.join(&filename);
        let block_size = if self.options.rebalance {
            balanced_block_size(total_length, self.options.block_size, self.options.workers)
        } else {
            self.options.block_size
        };
        let workers = effective_workers(self.options.workers, range_count(total_length, block_size));

        debug!("Plan for {url}: {total_length} bytes, block {block_size}, {workers} workers");
        Ok(DownloadPlan {
            url,
            total_length,
            filename,
            path,
            block_size,
            buffer_size: self.options.buffer_size,
            workers,
        })
    }

    /// Probe, create the output file and download every range
    pub async fn download(&self, url: &str) -> Result<DownloadReport> {
        let plan = self.plan(url).await?;
        let store = OutputStore::create(&plan.path)?;
        self.execute(&plan, store).await
    }

    /// Fetch every range of `plan` into `store`
    pub async fn execute(&self, plan: &DownloadPlan, store: OutputStore) -> Result<DownloadReport> {
        let started = Instant::now();
        info!(
            "Downloading {} ({} bytes) with {} workers into {}",
            plan.url,
            plan.total_length,
            plan.workers,
            plan.path.display()
        );

        if plan.total_length == 0 {
            if let Some(ref progress) = self.options.progress {
                progress(ProgressSample {
                    downloaded: 0,
                    total: 0,
                    bytes_per_sec: 0,
                });
            }
            return Ok(self.report(plan, started));
        }

        let counter = Arc::new(ProgressCounter::new());
        let completion = Arc::new(Completion::new());

        let (producer, queue) = work_queue(plan.workers);
        let ranges = plan_ranges(plan.total_length, plan.block_size)?;
        let feeder = tokio::spawn(producer.feed(ranges));

        let tracker = ProgressTracker::new(
            Arc::clone(&counter),
            Arc::clone(&completion),
            plan.total_length,
            self.options.progress_interval,
            self.options.progress.clone(),
        );
        let tracker_handle = tokio::spawn(tracker.run());

        let fetcher = ChunkFetcher::new(
            self.client.clone(),
            plan.url.clone(),
            self.options.cookie_header(),
            plan.buffer_size,
            store.clone(),
            Arc::clone(&counter),
        );
        let pool = WorkerPool::new(queue, fetcher, Arc::clone(&self.options.retry), self.options.debug);

        if let Err(e) = pool.run(plan.workers).await {
            tracker_handle.abort();
            feeder.abort();
            return Err(e);
        }

        let enqueued = feeder
            .await
            .map_err(|e| Error::TransportError(format!("range producer failed: {e}")))?;
        debug!("{enqueued} ranges completed");

        completion.wait().await;
        tracker_handle
            .await
            .map_err(|e| Error::TransportError(format!("progress tracker failed: {e}")))?;

        store.sync()?;
        Ok(self.report(plan, started))
    }

    fn report(&self, plan: &DownloadPlan, started: Instant) -> DownloadReport {
        DownloadReport {
            path: plan.path.clone(),
            total_length: plan.total_length,
            elapsed: started.elapsed(),
        }
    }
}

fn parse_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| Error::InvalidInput(format!("invalid URL '{url}': {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(Error::InvalidInput(format!("unsupported URL scheme '{scheme}'"))),
    }
}
