//! Page size computation
//!
//! Fixed pages are A4. Dynamic pages keep the A4 width and grow to the
//! measured bottom of the content plus a buffer, so a long letter prints as
//! one tall page instead of breaking mid-paragraph.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// CSS pixels (96 dpi) to millimetres
pub const PX_TO_MM: f64 = 0.264583;
pub const A4_WIDTH_MM: f64 = 210.0;
pub const A4_HEIGHT_MM: f64 = 297.0;
pub const DEFAULT_BUFFER_PX: f64 = 200.0;
pub const MM_PER_INCH: f64 = 25.4;

pub fn mm_to_inches(mm: f64) -> f64 {
    mm / MM_PER_INCH
}

/// Physical page size in millimetres
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSize {
    pub width_mm: f64,
    pub height_mm: f64,
}

impl PageSize {
    pub fn a4() -> Self {
        Self {
            width_mm: A4_WIDTH_MM,
            height_mm: A4_HEIGHT_MM,
        }
    }
}

/// A4 width, height grown to `bottom_px + buffer_px`
pub fn dynamic_page_size(bottom_px: f64, buffer_px: f64) -> PageSize {
    PageSize {
        width_mm: A4_WIDTH_MM,
        height_mm: (bottom_px + buffer_px) * PX_TO_MM,
    }
}

/// Where the content of a dynamic page ends, in probe order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContentBoundary {
    /// Text of the last paragraph of the document (e.g. a letter's sign-off)
    pub terminal_text: Option<String>,
    /// Selector of a terminal image (e.g. a signature)
    pub terminal_image: Option<String>,
    /// Selector of the content container
    pub container: Option<String>,
    /// Elements scanned for the lowest visible bottom when nothing else matched
    pub fallback_selector: String,
    pub buffer_px: f64,
}

impl Default for ContentBoundary {
    fn default() -> Self {
        Self {
            terminal_text: None,
            terminal_image: None,
            container: None,
            fallback_selector: "section, .grid, .mb-20, .mb-16, .mb-8, p, img".to_string(),
            buffer_px: DEFAULT_BUFFER_PX,
        }
    }
}

/// Page sizing mode
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum PageSizing {
    /// 210×297 mm with the configured fixed-page margins
    #[default]
    FixedA4,
    /// A4 width, height fitted to the content, zero margins
    DynamicHeight(ContentBoundary),
}

impl FromStr for PageSizing {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fixed-a4" => Ok(PageSizing::FixedA4),
            "dynamic-height" => Ok(PageSizing::DynamicHeight(ContentBoundary::default())),
            other => Err(Error::ConfigError(format!(
                "unknown page sizing '{}' (expected fixed-a4 or dynamic-height)",
                other
            ))),
        }
    }
}

/// Which probe supplied the content bottom
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundarySource {
    TerminalText,
    TerminalImage,
    Container,
    Fallback,
}

/// Bottom offsets (document px) measured in the page by the boundary probe
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryProbe {
    pub terminal_text: Option<f64>,
    pub terminal_image: Option<f64>,
    pub container: Option<f64>,
    /// Maximum over visible fallback elements; 0 when none are visible
    #[serde(default)]
    pub fallback: f64,
}

impl BoundaryProbe {
    /// Pick the content bottom by priority: terminal text, terminal image,
    /// container, then the fallback scan.
    pub fn resolve(&self) -> (BoundarySource, f64) {
        if let Some(bottom) = self.terminal_text {
            return (BoundarySource::TerminalText, bottom);
        }
        if let Some(bottom) = self.terminal_image {
            return (BoundarySource::TerminalImage, bottom);
        }
        if let Some(bottom) = self.container {
            return (BoundarySource::Container, bottom);
        }
        (BoundarySource::Fallback, self.fallback)
    }
}
