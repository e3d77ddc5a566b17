//! Request and status types for the download subsystem.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default number of engine connections per download.
pub const DEFAULT_CONNECTIONS: u8 = 16;
/// Lowest accepted connection count.
pub const MIN_CONNECTIONS: u8 = 1;
/// Highest accepted connection count.
pub const MAX_CONNECTIONS: u8 = 32;
/// Fixed segment size passed to the engine (`-k`).
pub const SEGMENT_SIZE: &str = "1M";

/// Mirror substitution applied when a request opts in.
pub const MIRROR_FROM: &str = "huggingface.co";
pub const MIRROR_TO: &str = "hf-mirror.com";

// Sticky rate/eta sentinels used at lifecycle boundaries.
pub const RATE_STARTING: &str = "starting...";
pub const ETA_ESTIMATING: &str = "estimating...";
pub const RATE_DONE: &str = "done";
pub const ETA_DONE: &str = "0s";
pub const RATE_FAILED: &str = "failed";
pub const ETA_FAILED: &str = "n/a";

fn default_connections() -> u8 {
    DEFAULT_CONNECTIONS
}

/// A caller-supplied download request.
///
/// The destination is either a named directory key (resolved against the
/// configured destination map) or an explicit `custom_path`; when both are
/// present the explicit path wins. The output filename defaults to the final
/// path segment of the URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Source URL to download.
    pub url: String,
    /// Named destination key (see `Config::destinations`).
    #[serde(default)]
    pub destination: Option<String>,
    /// Explicit destination directory, overriding `destination`.
    #[serde(default)]
    pub custom_path: Option<PathBuf>,
    /// Optional subfolder appended to the destination directory.
    #[serde(default)]
    pub subfolder: Option<String>,
    /// Explicit output filename; derived from the URL when absent.
    #[serde(default)]
    pub filename: Option<String>,
    /// Rewrite the URL through the configured mirror.
    #[serde(default)]
    pub use_mirror: bool,
    /// Connection/segment count for the engine, clamped to 1..=32.
    #[serde(default = "default_connections")]
    pub connections: u8,
}

impl DownloadRequest {
    /// Create a request with defaults for everything but the URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            destination: None,
            custom_path: None,
            subfolder: None,
            filename: None,
            use_mirror: false,
            connections: DEFAULT_CONNECTIONS,
        }
    }

    /// The URL the engine will actually fetch, after mirror rewrite.
    pub fn effective_url(&self) -> String {
        if self.use_mirror {
            self.url.replace(MIRROR_FROM, MIRROR_TO)
        } else {
            self.url.clone()
        }
    }

    /// Connection count clamped into the accepted range.
    pub fn effective_connections(&self) -> u8 {
        self.connections.clamp(MIN_CONNECTIONS, MAX_CONNECTIONS)
    }

    /// Output filename: explicit if given, otherwise the last path segment
    /// of the URL with any query or fragment stripped.
    ///
    /// Returns `None` when no filename can be derived (e.g. the URL ends
    /// in a slash), which makes the request invalid.
    pub fn output_filename(&self) -> Option<String> {
        if let Some(name) = &self.filename {
            let name = name.trim();
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }

        let url = self.url.trim();
        let without_query = url.split(['?', '#']).next().unwrap_or(url);
        let rest = without_query
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(without_query);

        // A bare hostname has no path segment to name the file after.
        if !rest.contains('/') {
            return None;
        }
        let segment = rest.rsplit('/').next().unwrap_or("");
        if segment.is_empty() {
            return None;
        }
        Some(segment.to_string())
    }

    /// Resolve the destination directory against the configured map.
    ///
    /// A request naming neither a destination key nor a custom path falls
    /// back to `default_destination` when one is configured.
    pub fn resolve_destination(
        &self,
        destinations: &HashMap<String, PathBuf>,
        default_destination: Option<&str>,
    ) -> Result<PathBuf, DownloadError> {
        let mut dir = if let Some(path) = &self.custom_path {
            if path.as_os_str().is_empty() {
                return Err(DownloadError::InvalidRequest(
                    "custom destination path is empty".to_string(),
                ));
            }
            path.clone()
        } else if let Some(key) = self.destination.as_deref().or(default_destination) {
            destinations.get(key).cloned().ok_or_else(|| {
                DownloadError::InvalidRequest(format!("unknown destination '{}'", key))
            })?
        } else {
            return Err(DownloadError::InvalidRequest(
                "no destination directory given".to_string(),
            ));
        };

        if let Some(sub) = &self.subfolder {
            let sub = sub.trim();
            if !sub.is_empty() {
                dir = dir.join(sub);
            }
        }
        Ok(dir)
    }
}

/// Lifecycle stage of a single download attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No download has run yet.
    Idle,
    /// Request accepted, engine not yet reporting progress.
    Preparing,
    /// Engine is reporting transfer progress.
    InProgress,
    /// Engine exited with success.
    Completed,
    /// Request rejected or engine exited with failure.
    Failed,
}

impl Phase {
    /// Returns true once a download has reached Completed or Failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }

    /// Returns true while a download is underway.
    pub fn is_active(&self) -> bool {
        matches!(self, Phase::Preparing | Phase::InProgress)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Preparing => write!(f, "preparing"),
            Phase::InProgress => write!(f, "in progress"),
            Phase::Completed => write!(f, "completed"),
            Phase::Failed => write!(f, "failed"),
        }
    }
}

/// The single status slot mutated over a download's lifetime.
///
/// `rate` and `eta` are sticky free text: they keep their last known value
/// until explicitly overwritten. The slot is overwritten in place by the
/// next download; a terminal status stays queryable until then.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadStatus {
    /// True from request acceptance until a terminal phase.
    pub is_active: bool,
    /// Percent complete as last reported by the engine (0-100).
    pub percent: u8,
    /// Last known transfer rate, e.g. "2.1MiB/s".
    pub rate: String,
    /// Last known time remaining, e.g. "1m30s".
    pub eta: String,
    /// Lifecycle phase.
    pub phase: Phase,
    /// Human-readable composite snapshot; may be empty in terminal states.
    pub message: String,
    /// URL of the current or most recent request.
    pub url: String,
    /// Full destination path of the current or most recent request.
    pub target_path: String,
}

impl Default for DownloadStatus {
    fn default() -> Self {
        Self {
            is_active: false,
            percent: 0,
            rate: String::new(),
            eta: String::new(),
            phase: Phase::Idle,
            message: String::new(),
            url: String::new(),
            target_path: String::new(),
        }
    }
}

/// A partial status update; `None` fields are left unchanged (sticky).
#[derive(Debug, Clone, Default)]
pub struct StatusPatch {
    pub is_active: Option<bool>,
    pub percent: Option<u8>,
    pub rate: Option<String>,
    pub eta: Option<String>,
    pub phase: Option<Phase>,
    pub message: Option<String>,
    pub url: Option<String>,
    pub target_path: Option<String>,
}

/// Failure taxonomy for a download attempt.
///
/// Every variant is terminal for the current download and is resolved into
/// a Failed status at the orchestrator boundary; none escape as faults.
#[derive(Debug)]
pub enum DownloadError {
    /// Empty URL, underivable filename, or unresolvable destination.
    InvalidRequest(String),
    /// Engine missing from every search location.
    EngineNotFound(String),
    /// Engine process could not be created or its output read.
    SpawnFailure(String),
    /// Engine process exited nonzero.
    EngineExitFailure(Option<i32>),
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadError::InvalidRequest(msg) => write!(f, "invalid request: {}", msg),
            DownloadError::EngineNotFound(msg) => write!(f, "download engine not found: {}", msg),
            DownloadError::SpawnFailure(msg) => write!(f, "failed to run download engine: {}", msg),
            DownloadError::EngineExitFailure(Some(code)) => {
                write!(f, "download engine exited with code {}", code)
            }
            DownloadError::EngineExitFailure(None) => {
                write!(f, "download engine terminated by signal")
            }
        }
    }
}

impl std::error::Error for DownloadError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_filename_from_url() {
        let req =
            DownloadRequest::new("https://huggingface.co/org/repo/resolve/main/model.safetensors");
        assert_eq!(req.output_filename().as_deref(), Some("model.safetensors"));
    }

    #[test]
    fn test_output_filename_strips_query() {
        let req = DownloadRequest::new("https://example.com/files/data.bin?download=true#frag");
        assert_eq!(req.output_filename().as_deref(), Some("data.bin"));
    }

    #[test]
    fn test_output_filename_explicit_wins() {
        let mut req = DownloadRequest::new("https://example.com/files/data.bin");
        req.filename = Some("renamed.bin".to_string());
        assert_eq!(req.output_filename().as_deref(), Some("renamed.bin"));
    }

    #[test]
    fn test_output_filename_underivable() {
        let req = DownloadRequest::new("https://example.com/files/");
        assert_eq!(req.output_filename(), None);

        let bare = DownloadRequest::new("https://example.com");
        assert_eq!(bare.output_filename(), None);
    }

    #[test]
    fn test_mirror_rewrite() {
        let mut req = DownloadRequest::new("https://huggingface.co/org/model.bin");
        assert_eq!(req.effective_url(), "https://huggingface.co/org/model.bin");

        req.use_mirror = true;
        assert_eq!(req.effective_url(), "https://hf-mirror.com/org/model.bin");
    }

    #[test]
    fn test_connections_clamped() {
        let mut req = DownloadRequest::new("https://example.com/f.bin");
        assert_eq!(req.effective_connections(), DEFAULT_CONNECTIONS);

        req.connections = 0;
        assert_eq!(req.effective_connections(), MIN_CONNECTIONS);

        req.connections = 200;
        assert_eq!(req.effective_connections(), MAX_CONNECTIONS);
    }

    #[test]
    fn test_resolve_destination_named() {
        let mut destinations = HashMap::new();
        destinations.insert("models".to_string(), PathBuf::from("/data/models"));

        let mut req = DownloadRequest::new("https://example.com/f.bin");
        req.destination = Some("models".to_string());
        assert_eq!(
            req.resolve_destination(&destinations, None).unwrap(),
            PathBuf::from("/data/models")
        );

        req.subfolder = Some("  checkpoints ".to_string());
        assert_eq!(
            req.resolve_destination(&destinations, None).unwrap(),
            PathBuf::from("/data/models/checkpoints")
        );
    }

    #[test]
    fn test_resolve_destination_falls_back_to_default() {
        let mut destinations = HashMap::new();
        destinations.insert("downloads".to_string(), PathBuf::from("/home/u/Downloads"));

        // A bare url-only request lands in the configured default.
        let req = DownloadRequest::new("https://example.com/f.bin");
        assert_eq!(
            req.resolve_destination(&destinations, Some("downloads")).unwrap(),
            PathBuf::from("/home/u/Downloads")
        );

        // An explicit key still wins over the default.
        destinations.insert("models".to_string(), PathBuf::from("/data/models"));
        let mut named = DownloadRequest::new("https://example.com/f.bin");
        named.destination = Some("models".to_string());
        assert_eq!(
            named.resolve_destination(&destinations, Some("downloads")).unwrap(),
            PathBuf::from("/data/models")
        );
    }

    #[test]
    fn test_resolve_destination_default_key_must_be_configured() {
        let destinations = HashMap::new();
        let req = DownloadRequest::new("https://example.com/f.bin");
        assert!(matches!(
            req.resolve_destination(&destinations, Some("downloads")),
            Err(DownloadError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_resolve_destination_custom_path_wins() {
        let mut destinations = HashMap::new();
        destinations.insert("models".to_string(), PathBuf::from("/data/models"));

        let mut req = DownloadRequest::new("https://example.com/f.bin");
        req.destination = Some("models".to_string());
        req.custom_path = Some(PathBuf::from("/tmp/elsewhere"));
        assert_eq!(
            req.resolve_destination(&destinations, None).unwrap(),
            PathBuf::from("/tmp/elsewhere")
        );
    }

    #[test]
    fn test_resolve_destination_errors() {
        let destinations = HashMap::new();

        let req = DownloadRequest::new("https://example.com/f.bin");
        assert!(matches!(
            req.resolve_destination(&destinations, None),
            Err(DownloadError::InvalidRequest(_))
        ));

        let mut named = DownloadRequest::new("https://example.com/f.bin");
        named.destination = Some("nope".to_string());
        assert!(matches!(
            named.resolve_destination(&destinations, None),
            Err(DownloadError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_phase_predicates() {
        assert!(Phase::Completed.is_terminal());
        assert!(Phase::Failed.is_terminal());
        assert!(!Phase::InProgress.is_terminal());
        assert!(Phase::Preparing.is_active());
        assert!(Phase::InProgress.is_active());
        assert!(!Phase::Idle.is_active());
    }

    #[test]
    fn test_default_status_is_idle() {
        let status = DownloadStatus::default();
        assert_eq!(status.phase, Phase::Idle);
        assert!(!status.is_active);
        assert_eq!(status.percent, 0);
    }
}
