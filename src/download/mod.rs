//! Managed download core: orchestration, progress parsing, status state.
//!
//! One download runs at a time. The orchestrator spawns the engine,
//! scrapes its output stream for progress, and pushes every status change
//! through a single shared slot with broadcast notifications.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────┐     ┌──────────────┐
//! │ Orchestrator │────▶│ engine process   │────▶│ ProgressParser│
//! │ (blocking)   │     │ (aria2c, merged  │     │ (regex, best │
//! └──────┬───────┘     │  stdout+stderr)  │     │  effort)     │
//!        │             └──────────────────┘     └──────┬───────┘
//!        ▼                                             │
//! ┌──────────────┐     broadcast per update            │
//! │ StatusStore  │◀────────────────────────────────────┘
//! │ (one slot)   │────▶ subscribers (SSE, CLI)
//! └──────────────┘
//! ```

pub mod orchestrator;
pub mod progress;
pub mod status;
pub mod types;

// Re-export commonly used items
pub use orchestrator::Orchestrator;
pub use progress::{parse_line, ProgressEvent};
pub use status::StatusStore;
pub use types::{DownloadError, DownloadRequest, DownloadStatus, Phase, StatusPatch};
