//! fetchd - Managed multi-connection download service
//!
//! fetchd wraps an external download engine (aria2c) behind a small
//! service: it spawns the engine, scrapes its streaming output into
//! structured progress, and exposes live status to observers by HTTP
//! polling or server-sent events.
//!
//! # Core Modules
//!
//! - [`download`] - Orchestration, progress parsing, and status state
//! - [`engine`] - Engine discovery and opt-in installation
//! - [`server`] - HTTP API for requests, status, and push events
//! - [`config`] - Named destination directories

pub mod config;
pub mod download;
pub mod engine;
pub mod server;

// Re-export commonly used types
pub use config::Config;
pub use download::{
    DownloadError, DownloadRequest, DownloadStatus, Orchestrator, Phase, ProgressEvent,
    StatusStore,
};
pub use server::Server;
