//! # pan-dl CLI
//!
//! Command-line interface for the pan-dl library.
//! Downloads one large file with many concurrent ranged requests.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{HumanBytes, HumanDuration};
use log::{error, warn, LevelFilter};
use pan_dl::{Downloader, DownloadOptions};

mod cli;

use cli::{FileConfig, ProgressManager, Settings};

/// Command-line interface for pan-dl
#[derive(Parser, Debug)]
#[command(name = "pan-dl")]
#[command(about = "Parallel ranged HTTP downloader for single large files")]
#[command(long_about = "Downloads one file over HTTP(S) using many concurrent range requests:
  pan-dl https://host/big.iso                 # 32 workers, 20 MiB blocks
  pan-dl -n 8 --block 4194304 URL             # 8 workers, 4 MiB blocks
  pan-dl --cookie TOKEN -d ~/Downloads URL    # send BDUSS=TOKEN, save in ~/Downloads

Options not given on the command line are read from pan-dl.json next to the
executable (or --config PATH): {\"workers\", \"block\", \"buffer\", \"cookie\", \"dir\"}")]
#[command(version = env!("PAN_DL_VERSION"))]
struct Cli {
    /// URL to download
    url: String,

    /// Number of concurrent workers [default: 32]
    #[arg(short = 'n', long, visible_alias = "size")]
    workers: Option<usize>,

    /// Block size in bytes used to split the file [default: 20971520]
    #[arg(long)]
    block: Option<u64>,

    /// Read buffer size in bytes per request [default: 1048576]
    #[arg(long, visible_alias = "chunk")]
    buffer: Option<usize>,

    /// Output file name (defaults to the server-suggested name)
    #[arg(short = 'o', long)]
    name: Option<String>,

    /// Destination directory
    #[arg(short = 'd', long)]
    dir: Option<PathBuf>,

    /// Session credential sent as a cookie
    #[arg(long, visible_alias = "bduss")]
    cookie: Option<String>,

    /// Name of the session cookie [default: BDUSS]
    #[arg(long)]
    cookie_name: Option<String>,

    /// Give up on a range after this many retries instead of retrying forever
    #[arg(long)]
    max_retries: Option<u32>,

    /// Spread small files over all workers
    #[arg(long)]
    rebalance: bool,

    /// Config file to read instead of the one next to the executable
    #[arg(long)]
    config: Option<PathBuf>,

    /// Probe and show the plan without downloading
    #[arg(long)]
    dry_run: bool,

    /// Log failed range requests
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            workers: self.workers,
            block_size: self.block,
            buffer_size: self.buffer,
            cookie: self.cookie.clone(),
            dir: self.dir.clone(),
            cookie_name: self.cookie_name.clone(),
            filename: self.name.clone(),
            max_retries: self.max_retries,
            debug: self.debug,
            rebalance: self.rebalance,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging to stderr
    let mut logger = env_logger::Builder::from_default_env();
    logger.target(env_logger::Target::Stderr);
    if cli.debug {
        logger.filter_level(LevelFilter::Debug);
    }
    logger.init();

    let options = resolve_options(&cli)?;

    if cli.dry_run {
        let plan = Downloader::new(options)?.plan(&cli.url).await?;
        eprintln!("[DRY RUN] Would download: {}", plan.url);
        eprintln!("  file: {}", plan.path.display());
        eprintln!("  size: {} ({} bytes)", HumanBytes(plan.total_length), plan.total_length);
        eprintln!(
            "  ranges: {} x {} block, {} workers",
            plan.range_count(),
            HumanBytes(plan.block_size),
            plan.workers
        );
        return Ok(());
    }

    download(&cli.url, options).await
}

/// Merge command line, config file and defaults
fn resolve_options(cli: &Cli) -> Result<DownloadOptions> {
    let settings = cli.settings();

    let file = match &cli.config {
        Some(path) => Some(
            FileConfig::load(path)?
                .with_context(|| format!("config file {} does not exist", path.display()))?,
        ),
        None => match cli::config::default_config_path().map(|p| FileConfig::load(&p)) {
            Some(Ok(file)) => file,
            Some(Err(e)) => {
                warn!("Ignoring config file: {e:#}");
                None
            }
            None => None,
        },
    };

    let settings = match file {
        Some(ref file) => settings.with_file(file),
        None => settings,
    };
    Ok(settings.into_options())
}

/// Download with a status line and a final summary
async fn download(url: &str, options: DownloadOptions) -> Result<()> {
    let progress_manager = ProgressManager::new(0);
    let options = DownloadOptions {
        progress: Some(progress_manager.callback()),
        ..options
    };

    let downloader = Downloader::new(options)?;
    let plan = downloader.plan(url).await?;
    eprintln!("File: {}", plan.path.display());
    eprintln!("File size: {}", HumanBytes(plan.total_length));

    let store = pan_dl::OutputStore::create(&plan.path)?;
    let report = downloader.execute(&plan, store).await?;
    progress_manager.pb.finish();

    eprintln!(
        "download completed, time elapsed: {}, average speed: {}/s",
        HumanDuration(report.elapsed),
        HumanBytes(report.average_speed())
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_legacy_aliases() {
        let cli = Cli::parse_from([
            "pan-dl",
            "--size",
            "8",
            "--chunk",
            "4096",
            "--bduss",
            "abc",
            "https://host/file.bin",
        ]);
        assert_eq!(cli.workers, Some(8));
        assert_eq!(cli.buffer, Some(4096));
        assert_eq!(cli.cookie.as_deref(), Some("abc"));
        assert_eq!(cli.url, "https://host/file.bin");
    }

    #[test]
    fn test_unset_flags_stay_unset() {
        let cli = Cli::parse_from(["pan-dl", "https://host/file.bin"]);
        let settings = cli.settings();
        assert_eq!(settings.workers, None);
        assert_eq!(settings.block_size, None);
        assert_eq!(settings.cookie, None);
        assert!(!settings.debug);
    }

    #[test]
    fn test_explicit_config_file_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        std::fs::write(&path, r#"{"workers": 3, "block": 1000}"#).unwrap();

        let cli = Cli::parse_from([
            "pan-dl",
            "--config",
            path.to_str().unwrap(),
            "--block",
            "2000",
            "https://host/file.bin",
        ]);
        let options = resolve_options(&cli).unwrap();
        assert_eq!(options.workers, 3);
        assert_eq!(options.block_size, 2000);
    }

    #[test]
    fn test_missing_explicit_config_file_fails() {
        let cli = Cli::parse_from([
            "pan-dl",
            "--config",
            "/definitely/not/here.json",
            "https://host/file.bin",
        ]);
        assert!(resolve_options(&cli).is_err());
    }
}
