//! Download orchestration: process lifecycle and the progress read loop.
//!
//! [`Orchestrator::run`] is synchronous and returns only after the engine
//! process has fully terminated. Callers that must stay responsive (the
//! HTTP layer, the CLI) invoke it on a background task; the orchestrator
//! itself never spawns detached work and never retries.

use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{mpsc, Arc};
use std::thread;

use crate::engine;

use super::progress;
use super::status::StatusStore;
use super::types::{
    DownloadError, DownloadRequest, DownloadStatus, Phase, StatusPatch, ETA_DONE, ETA_FAILED,
    RATE_DONE, RATE_FAILED, SEGMENT_SIZE,
};

/// Coordinates one download at a time against a shared [`StatusStore`].
///
/// Owns the destination map used to resolve named destinations; the engine
/// binary is resolved per run unless a fixed path is configured.
pub struct Orchestrator {
    store: Arc<StatusStore>,
    destinations: HashMap<String, PathBuf>,
    default_destination: Option<String>,
    engine_path: Option<PathBuf>,
}

impl Orchestrator {
    /// Create an orchestrator publishing into the given store.
    pub fn new(store: Arc<StatusStore>) -> Self {
        Self {
            store,
            destinations: HashMap::new(),
            default_destination: None,
            engine_path: None,
        }
    }

    /// Set the map of named destination directories.
    pub fn with_destinations(mut self, destinations: HashMap<String, PathBuf>) -> Self {
        self.destinations = destinations;
        self
    }

    /// Set the destination key used when a request names none.
    pub fn with_default_destination(mut self, key: impl Into<String>) -> Self {
        self.default_destination = Some(key.into());
        self
    }

    /// Use a fixed engine binary instead of locating one per run.
    pub fn with_engine_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.engine_path = Some(path.into());
        self
    }

    /// The status store this orchestrator publishes into.
    pub fn store(&self) -> Arc<StatusStore> {
        Arc::clone(&self.store)
    }

    /// Names of the configured destinations, sorted.
    pub fn destination_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.destinations.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run a download to completion, blocking until the engine exits.
    ///
    /// Always returns a status in a terminal phase. Every failure kind is
    /// converted into a Failed status; nothing propagates as a fault.
    pub fn run(&self, request: &DownloadRequest) -> DownloadStatus {
        match self.try_run(request) {
            Ok(status) => status,
            Err(err) => self.fail(request, &err),
        }
    }

    fn try_run(&self, request: &DownloadRequest) -> Result<DownloadStatus, DownloadError> {
        // Validation happens before anything else; an invalid request must
        // never reach the spawn step.
        if request.url.trim().is_empty() {
            return Err(DownloadError::InvalidRequest("url is empty".to_string()));
        }
        let filename = request.output_filename().ok_or_else(|| {
            DownloadError::InvalidRequest("cannot derive a filename from the url".to_string())
        })?;
        let dir =
            request.resolve_destination(&self.destinations, self.default_destination.as_deref())?;
        let connections = request.effective_connections();

        fs::create_dir_all(&dir).map_err(|e| {
            DownloadError::InvalidRequest(format!(
                "cannot create destination directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let url = request.effective_url();
        let engine = match &self.engine_path {
            Some(path) => path.clone(),
            None => engine::locate_or_install()
                .ok_or_else(|| DownloadError::EngineNotFound(engine::install_guidance()))?,
        };

        let target = dir.join(&filename);
        let target_display = target.display().to_string();
        tracing::info!(
            "starting download: {} -> {} ({} connections)",
            url,
            target_display,
            connections
        );
        self.store.begin(&url, &target_display);

        let mut child = spawn_engine(&engine, &url, &dir, &filename, connections)?;
        self.drive_progress(&mut child, &url, &target_display);

        let exit = child
            .wait()
            .map_err(|e| DownloadError::SpawnFailure(e.to_string()))?;

        if exit.success() {
            tracing::info!("download complete: {}", target_display);
            Ok(self.store.update(StatusPatch {
                is_active: Some(false),
                percent: Some(100),
                rate: Some(RATE_DONE.to_string()),
                eta: Some(ETA_DONE.to_string()),
                phase: Some(Phase::Completed),
                message: Some(format!(
                    "download complete\nurl: {}\ntarget: {}",
                    url, target_display
                )),
                ..Default::default()
            }))
        } else {
            Err(DownloadError::EngineExitFailure(exit.code()))
        }
    }

    /// Consume the merged engine output stream, updating status per line.
    ///
    /// This is the operation's only long-lived blocking point; it returns
    /// when both output pipes close.
    fn drive_progress(&self, child: &mut Child, url: &str, target: &str) {
        let lines = merge_output_lines(child);
        let mut in_progress = false;

        // Track the last seen values locally so the composite message can
        // be built alongside the fields in a single consistent update.
        let mut last = self.store.snapshot();

        for line in lines {
            tracing::debug!(target: "fetchd::engine", "{}", line);

            let Some(event) = progress::parse_line(&line) else {
                continue;
            };

            // Any event, even an empty one, proves the transfer is live.
            let phase = if in_progress {
                None
            } else {
                in_progress = true;
                Some(Phase::InProgress)
            };

            if let Some(percent) = event.percent {
                last.percent = percent;
            }
            if let Some(rate) = &event.rate {
                last.rate = rate.clone();
            }
            if let Some(eta) = &event.eta {
                last.eta = eta.clone();
            }

            self.store.update(StatusPatch {
                percent: event.percent,
                rate: event.rate,
                eta: event.eta,
                phase,
                message: Some(format!(
                    "downloading: {}%\nrate: {}\neta: {}\nurl: {}\ntarget: {}",
                    last.percent, last.rate, last.eta, url, target
                )),
                ..Default::default()
            });
        }
    }

    /// Resolve any failure into a published Failed status.
    fn fail(&self, request: &DownloadRequest, err: &DownloadError) -> DownloadStatus {
        tracing::error!("download failed: {}", err);

        // An engine exit failure already logged its output; the status
        // message is cleared, matching the terminal-state contract.
        let message = match err {
            DownloadError::EngineExitFailure(_) => String::new(),
            other => other.to_string(),
        };

        // Failures before `begin` never resolved a target path; clear the
        // one left over from the previous download so the url and target
        // in the published status always belong to the same request.
        let target_path = match err {
            DownloadError::InvalidRequest(_) | DownloadError::EngineNotFound(_) => {
                Some(String::new())
            }
            _ => None,
        };

        self.store.update(StatusPatch {
            is_active: Some(false),
            percent: Some(0),
            rate: Some(RATE_FAILED.to_string()),
            eta: Some(ETA_FAILED.to_string()),
            phase: Some(Phase::Failed),
            message: Some(message),
            url: Some(request.url.clone()),
            target_path,
            ..Default::default()
        })
    }
}

/// Spawn the engine with both output pipes captured.
fn spawn_engine(
    engine: &Path,
    url: &str,
    dir: &Path,
    filename: &str,
    connections: u8,
) -> Result<Child, DownloadError> {
    Command::new(engine)
        .arg("-x")
        .arg(connections.to_string())
        .arg("-s")
        .arg(connections.to_string())
        .arg("-k")
        .arg(SEGMENT_SIZE)
        .arg("--dir")
        .arg(dir)
        .arg("-o")
        .arg(filename)
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| DownloadError::SpawnFailure(e.to_string()))
}

/// Merge the child's stdout and stderr into one line channel so all engine
/// diagnostics flow through a single reader loop. The channel closes when
/// both pipes reach EOF.
fn merge_output_lines(child: &mut Child) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();

    if let Some(stdout) = child.stdout.take() {
        let tx = tx.clone();
        thread::spawn(move || forward_lines(stdout, tx));
    }
    if let Some(stderr) = child.stderr.take() {
        let tx = tx.clone();
        thread::spawn(move || forward_lines(stderr, tx));
    }

    rx
}

fn forward_lines<R: Read>(reader: R, tx: mpsc::Sender<String>) {
    for line in BufReader::new(reader).lines().map_while(Result::ok) {
        if tx.send(line).is_err() {
            break;
        }
    }
}
