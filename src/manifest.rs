//! Batch manifest: the JSON index of published PDFs

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfManifest {
    pub generated: DateTime<Utc>,
    pub base_url: String,
    pub pdfs: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub page_id: String,
    pub filename: String,
    /// Public path, e.g. `/pdfs/blake-carter-resume.pdf`
    pub path: String,
    /// Bytes on disk
    pub size: u64,
    pub title: String,
}

impl PdfManifest {
    pub fn new(base_url: impl Into<String>, pdfs: Vec<ManifestEntry>) -> Self {
        Self {
            generated: Utc::now(),
            base_url: base_url.into(),
            pdfs,
        }
    }

    /// Write pretty JSON, replacing any previous manifest
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}
