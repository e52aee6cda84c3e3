//! CLI-specific utilities for pan-dl
//!
//! This module contains code specific to the command-line interface,
//! separate from the core library functionality.

pub mod config;
pub mod progress;

pub use config::{FileConfig, Settings};
pub use progress::ProgressManager;
