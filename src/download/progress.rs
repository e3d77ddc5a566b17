//! Best-effort parser for the engine's streaming progress output.
//!
//! aria2c prints human-readable progress lines such as:
//!
//! ```text
//! [#d1b2c3 SIZE:10MiB/20MiB(50%) CN:8 DL:2.1MiB/s ETA:5s]
//! ```
//!
//! Only lines carrying the active-transfer marker `[#` are considered.
//! Each field is extracted independently; a field that fails to match is
//! simply absent from the event. Lines that match nothing are informational
//! and never an error.

use once_cell::sync::Lazy;
use regex::Regex;

/// Marker identifying an active-transfer progress line.
const TRANSFER_MARKER: &str = "[#";

// First integer immediately followed by a percent sign.
static PERCENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)%").expect("valid regex"));

// Decimal number followed by a KiB/MiB/GiB per-second unit.
static RATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?\s*(?:K|M|G)iB/s)").expect("valid regex"));

// Digit-unit pairs after the ETA marker, e.g. "5s" or "1m30s".
static ETA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"ETA:(\s*(?:\d+[smh])+)").expect("valid regex"));

/// Structured progress extracted from one engine output line.
///
/// All fields are optional: a marker line with nothing extractable still
/// produces an event, which is enough for the orchestrator to know the
/// transfer is underway.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Percent complete, clamped to 100.
    pub percent: Option<u8>,
    /// Transfer rate as printed by the engine, e.g. "2.1MiB/s".
    pub rate: Option<String>,
    /// Time remaining as printed by the engine, e.g. "1m30s".
    pub eta: Option<String>,
}

impl ProgressEvent {
    /// True when no field was extracted from the line.
    pub fn is_empty(&self) -> bool {
        self.percent.is_none() && self.rate.is_none() && self.eta.is_none()
    }
}

/// Parse one line of engine output.
///
/// Returns `None` for lines without the active-transfer marker. Marker
/// lines always yield an event, possibly with every field absent.
pub fn parse_line(line: &str) -> Option<ProgressEvent> {
    if !line.contains(TRANSFER_MARKER) {
        return None;
    }

    let percent = PERCENT_RE
        .captures(line)
        .and_then(|caps| caps[1].parse::<u8>().ok())
        .map(|p| p.min(100));

    let rate = RATE_RE
        .captures(line)
        .map(|caps| caps[1].to_string());

    let eta = ETA_RE
        .captures(line)
        .map(|caps| caps[1].trim().to_string());

    Some(ProgressEvent { percent, rate, eta })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_progress_line() {
        let line = "[#d1 SIZE:10MiB/20MiB(50%) CN:8 DL:2.1MiB/s ETA:5s]";
        let event = parse_line(line).expect("marker line should yield an event");
        assert_eq!(event.percent, Some(50));
        assert_eq!(event.rate.as_deref(), Some("2.1MiB/s"));
        assert_eq!(event.eta.as_deref(), Some("5s"));
    }

    #[test]
    fn test_parse_compound_eta() {
        let line = "[#a9 SIZE:1.2GiB/4.0GiB(30%) CN:16 DL:12MiB/s ETA:1m30s]";
        let event = parse_line(line).unwrap();
        assert_eq!(event.percent, Some(30));
        assert_eq!(event.eta.as_deref(), Some("1m30s"));
    }

    #[test]
    fn test_parse_rate_units() {
        for (line, want) in [
            ("[#x SIZE:1/2(0%) DL:512KiB/s]", "512KiB/s"),
            ("[#x SIZE:1/2(0%) DL:2.1MiB/s]", "2.1MiB/s"),
            ("[#x SIZE:1/2(0%) DL:1.0GiB/s]", "1.0GiB/s"),
        ] {
            let event = parse_line(line).unwrap();
            assert_eq!(event.rate.as_deref(), Some(want), "line: {}", line);
        }
    }

    #[test]
    fn test_informational_line_ignored() {
        assert_eq!(parse_line("09/01 12:00:00 [NOTICE] Downloading 1 item(s)"), None);
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("Download complete: /tmp/model.bin"), None);
    }

    #[test]
    fn test_marker_line_with_no_fields() {
        let event = parse_line("[#d1 connecting...]").unwrap();
        assert!(event.is_empty());
    }

    #[test]
    fn test_percent_clamped_and_overflow_dropped() {
        let event = parse_line("[#d1 (150%)]").unwrap();
        assert_eq!(event.percent, Some(100));

        // Does not fit in u8 at all; extraction fails, line still yields
        // an event.
        let event = parse_line("[#d1 (999%)]").unwrap();
        assert_eq!(event.percent, None);
    }

    #[test]
    fn test_percent_takes_first_match() {
        let event = parse_line("[#d1 (25%) other:80%]").unwrap();
        assert_eq!(event.percent, Some(25));
    }

    #[test]
    fn test_eta_whitespace_trimmed() {
        let event = parse_line("[#d1 (10%) ETA: 42s]").unwrap();
        assert_eq!(event.eta.as_deref(), Some("42s"));
    }
}
