//! Download engine discovery and opt-in installation.
//!
//! The service delegates the actual transfer to aria2c. This module finds
//! an installed binary across a bundled distribution directory, the
//! directory next to the running executable, and the system `PATH`.
//! Locating is side-effect free; [`install`] is the explicit best-effort
//! installation step via the platform package manager.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};

/// Platform-appropriate executable name for the engine.
pub const ENGINE_NAME: &str = if cfg!(target_os = "windows") {
    "aria2c.exe"
} else {
    "aria2c"
};

/// Bundled Windows distribution directory, shipped next to the executable.
const BUNDLED_DIR: &str = "aria2-1.37.0-win-64bit";

/// Find an installed engine binary.
///
/// Search order: bundled distribution directory, the directory adjacent to
/// the running executable, then every directory on `PATH`. Returns `None`
/// when nothing is found; no side effects.
pub fn locate() -> Option<PathBuf> {
    let path_dirs: Vec<PathBuf> = env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).collect())
        .unwrap_or_default();
    locate_in(exe_dir().as_deref(), &path_dirs)
}

/// Locate against explicit search roots; seam for [`locate`] and tests.
fn locate_in(exe_dir: Option<&Path>, path_dirs: &[PathBuf]) -> Option<PathBuf> {
    if let Some(dir) = exe_dir {
        let bundled = dir.join(BUNDLED_DIR).join(ENGINE_NAME);
        if bundled.exists() {
            return Some(bundled);
        }
        let adjacent = dir.join(ENGINE_NAME);
        if adjacent.exists() {
            return Some(adjacent);
        }
    }

    for dir in path_dirs {
        let candidate = dir.join(ENGINE_NAME);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

fn exe_dir() -> Option<PathBuf> {
    env::current_exe()
        .ok()?
        .parent()
        .map(Path::to_path_buf)
}

/// Attempt to install the engine via the platform package manager.
///
/// Linux uses apt (requires sudo), macOS uses Homebrew. Windows has no
/// package-manager path here; the bundled distribution is expected instead.
/// Returns the located binary path after a successful install.
pub fn install() -> Result<PathBuf> {
    if cfg!(target_os = "windows") {
        bail!(
            "automatic install is not supported on Windows; \
             place the bundled {} distribution next to the executable",
            BUNDLED_DIR
        );
    }

    tracing::info!("aria2c not found, attempting install: {}", install_command());

    let status = if cfg!(target_os = "macos") {
        Command::new("brew")
            .args(["install", "aria2"])
            .status()
            .context("failed to run brew")?
    } else {
        // Best effort; an index refresh failure alone should not stop the
        // install attempt.
        let _ = Command::new("sudo").args(["apt", "update"]).status();
        Command::new("sudo")
            .args(["apt", "install", "-y", "aria2"])
            .status()
            .context("failed to run apt")?
    };

    if !status.success() {
        bail!("package manager exited with {}", status);
    }

    locate().context("aria2 installed but binary still not found on PATH")
}

/// Locate the engine, falling back to a one-shot install attempt on
/// non-Windows platforms. Install failure is non-fatal; the caller gets
/// `None` and must surface [`install_guidance`].
pub fn locate_or_install() -> Option<PathBuf> {
    if let Some(path) = locate() {
        return Some(path);
    }
    if cfg!(target_os = "windows") {
        return None;
    }
    match install() {
        Ok(path) => Some(path),
        Err(err) => {
            tracing::warn!("automatic aria2c install failed: {:#}", err);
            None
        }
    }
}

/// Actionable guidance shown when the engine cannot be found.
pub fn install_guidance() -> String {
    format!("aria2c is not installed. Install it with: {}", install_command())
}

fn install_command() -> &'static str {
    if cfg!(target_os = "macos") {
        "brew install aria2"
    } else if cfg!(target_os = "windows") {
        "download aria2 from https://aria2.github.io/ and place aria2c.exe next to fetchd"
    } else {
        "sudo apt install aria2"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_in_empty_dirs() {
        assert_eq!(locate_in(None, &[]), None);
    }

    #[test]
    fn test_locate_in_path_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let binary = dir.path().join(ENGINE_NAME);
        std::fs::write(&binary, b"").expect("create fake engine");

        let found = locate_in(None, &[dir.path().to_path_buf()]);
        assert_eq!(found, Some(binary));
    }

    #[test]
    fn test_bundled_dir_preferred_over_path() {
        let exe = tempfile::tempdir().expect("tempdir");
        let bundled_dir = exe.path().join(BUNDLED_DIR);
        std::fs::create_dir_all(&bundled_dir).expect("create bundled dir");
        let bundled = bundled_dir.join(ENGINE_NAME);
        std::fs::write(&bundled, b"").expect("create bundled engine");

        let path = tempfile::tempdir().expect("tempdir");
        std::fs::write(path.path().join(ENGINE_NAME), b"").expect("create path engine");

        let found = locate_in(Some(exe.path()), &[path.path().to_path_buf()]);
        assert_eq!(found, Some(bundled));
    }

    #[test]
    fn test_adjacent_preferred_over_path() {
        let exe = tempfile::tempdir().expect("tempdir");
        let adjacent = exe.path().join(ENGINE_NAME);
        std::fs::write(&adjacent, b"").expect("create adjacent engine");

        let path = tempfile::tempdir().expect("tempdir");
        std::fs::write(path.path().join(ENGINE_NAME), b"").expect("create path engine");

        let found = locate_in(Some(exe.path()), &[path.path().to_path_buf()]);
        assert_eq!(found, Some(adjacent));
    }

    #[test]
    fn test_guidance_names_a_command() {
        let guidance = install_guidance();
        assert!(guidance.contains("aria2"));
    }
}
