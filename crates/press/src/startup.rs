//! Startup checks for pdf-press
//!
//! Preflight checks verifying the engine binary is usable before serving:
//! - Ghostscript availability check
//! - Ghostscript version check (requires 9.50+)

use pdf_press_config::Config;
use std::process::Command;
use thiserror::Error;

/// Minimum supported Ghostscript version.
const MIN_GS_VERSION: (u32, u32) = (9, 50);

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Ghostscript not available: {0}")]
    GhostscriptUnavailable(String),

    #[error("Ghostscript version requirement not met: {0}")]
    GhostscriptVersion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Check that the configured Ghostscript binary runs by executing
/// `<bin> --version`, returning its stdout.
pub fn check_ghostscript_available(bin: &str) -> Result<String, StartupError> {
    let output = Command::new(bin).arg("--version").output().map_err(|e| {
        StartupError::GhostscriptUnavailable(format!(
            "{} --version failed; is Ghostscript installed and in PATH? Error: {}",
            bin, e
        ))
    })?;

    if !output.status.success() {
        return Err(StartupError::GhostscriptUnavailable(format!(
            "{} --version exited with {}",
            bin, output.status
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Parse a Ghostscript version string into (major, minor).
///
/// Handles the plain `--version` output ("10.02.1") as well as banner
/// lines ("GPL Ghostscript 9.56.1 ...").
pub fn parse_gs_version(version_output: &str) -> Option<(u32, u32)> {
    let token = version_output
        .split_whitespace()
        .find(|token| token.chars().next().is_some_and(|c| c.is_ascii_digit()))?;

    let mut parts = token.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().and_then(|m| m.parse().ok()).unwrap_or(0);

    Some((major, minor))
}

/// Check that a Ghostscript version output satisfies the minimum version.
pub fn check_ghostscript_version(version_output: &str) -> Result<(), StartupError> {
    match parse_gs_version(version_output) {
        Some(version) if version >= MIN_GS_VERSION => Ok(()),
        Some((major, minor)) => Err(StartupError::GhostscriptVersion(format!(
            "found {}.{}, need {}.{} or newer",
            major, minor, MIN_GS_VERSION.0, MIN_GS_VERSION.1
        ))),
        None => Err(StartupError::GhostscriptVersion(format!(
            "could not parse version from {:?}",
            version_output.trim()
        ))),
    }
}

/// Run all startup checks in order: availability, then version.
pub fn run_startup_checks(config: &Config) -> Result<(), StartupError> {
    let version_output = check_ghostscript_available(&config.engine.ghostscript_bin)?;
    check_ghostscript_version(&version_output)
}
