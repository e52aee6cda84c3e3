//! Core library modules for pan-dl
//!
//! This module contains the range-planning and concurrent-fetch engine.

pub mod error;
pub mod planner;
pub mod store;
pub mod probe;
pub mod queue;
pub mod retry;
pub mod progress;
pub mod fetcher;
pub mod pool;
pub mod downloader;

