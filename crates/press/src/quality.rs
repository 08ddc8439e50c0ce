//! Quality level definitions for the compression pipeline.
//!
//! The cache key space is a closed enumeration: four Ghostscript pdfwrite
//! presets plus the sentinel `original` level that echoes the input without
//! invoking the engine at all.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// A compression preset controlling the output size/fidelity tradeoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    /// Sentinel level: the input is delivered unchanged, no engine involved.
    Original,
    /// Strongest compression, 72 dpi images.
    Screen,
    /// Medium compression, 150 dpi images.
    Ebook,
    /// Light compression, 300 dpi images.
    Printer,
    /// Minimal compression, color-preserving.
    Prepress,
}

/// Every level in display order, sentinel included.
pub const ALL_LEVELS: &[QualityLevel] = &[
    QualityLevel::Original,
    QualityLevel::Screen,
    QualityLevel::Ebook,
    QualityLevel::Printer,
    QualityLevel::Prepress,
];

/// Background precomputation order: strongest compression first, since the
/// smallest outputs are the most likely to be requested next.
pub const PRELOAD_ORDER: &[QualityLevel] = &[
    QualityLevel::Screen,
    QualityLevel::Ebook,
    QualityLevel::Printer,
    QualityLevel::Prepress,
];

impl QualityLevel {
    /// Whether this level skips the engine and echoes the input.
    pub fn bypasses_engine(&self) -> bool {
        matches!(self, QualityLevel::Original)
    }

    /// The Ghostscript `-dPDFSETTINGS` preset name for this level.
    ///
    /// `None` for the sentinel level, which never reaches the engine.
    pub fn gs_preset(&self) -> Option<&'static str> {
        match self {
            QualityLevel::Original => None,
            QualityLevel::Screen => Some("screen"),
            QualityLevel::Ebook => Some("ebook"),
            QualityLevel::Printer => Some("printer"),
            QualityLevel::Prepress => Some("prepress"),
        }
    }

    /// Lowercase name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLevel::Original => "original",
            QualityLevel::Screen => "screen",
            QualityLevel::Ebook => "ebook",
            QualityLevel::Printer => "printer",
            QualityLevel::Prepress => "prepress",
        }
    }
}

impl std::fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown quality level name.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown quality level: {0}")]
pub struct ParseQualityError(pub String);

impl FromStr for QualityLevel {
    type Err = ParseQualityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "original" => Ok(QualityLevel::Original),
            "screen" => Ok(QualityLevel::Screen),
            "ebook" => Ok(QualityLevel::Ebook),
            "printer" => Ok(QualityLevel::Printer),
            "prepress" => Ok(QualityLevel::Prepress),
            _ => Err(ParseQualityError(s.to_string())),
        }
    }
}
