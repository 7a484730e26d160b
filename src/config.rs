//! Batch configuration files
//!
//! ```json
//! {
//!   "baseUrl": "http://localhost:3000",
//!   "outputDir": "public/pdfs",
//!   "documents": [
//!     { "pageId": "blake-carter-resume", "title": "Blake Carter - Resume",
//!       "filename": "blake-carter-resume.pdf", "path": "/c/blake#light",
//!       "coverPath": "/c/blake/cover", "theme": "from-url-hash", "compress": true }
//!   ]
//! }
//! ```
//!
//! There is no fallback base URL. `PDF_BASE_URL` overrides the file value.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::batch::BatchDocument;
use crate::readiness::PageReadinessCriteria;
use crate::renderer::RetryPolicy;
use crate::sizing::PageSizing;
use crate::{Error, Margins, RenderTarget, Result, StyleOverrides, Theme, Viewport};

/// Environment variable that overrides `baseUrl`
pub const BASE_URL_ENV: &str = "PDF_BASE_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Prefix of the manifest `path` entries
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,
    /// Manifest location; `<outputDir>/manifest.json` when absent
    #[serde(default)]
    pub manifest: Option<PathBuf>,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub viewport: Viewport,
    pub documents: Vec<DocumentConfig>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("public/pdfs")
}

fn default_public_prefix() -> String {
    "/pdfs".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentConfig {
    pub page_id: String,
    pub title: String,
    pub filename: String,
    /// Path relative to the base URL, or an absolute URL
    pub path: String,
    #[serde(default)]
    pub cover_path: Option<String>,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default)]
    pub zoom: Option<f64>,
    #[serde(default)]
    pub ats_normalize: bool,
    #[serde(default)]
    pub sizing: PageSizing,
    #[serde(default)]
    pub readiness: PageReadinessCriteria,
    #[serde(default)]
    pub cover_readiness: Option<PageReadinessCriteria>,
    #[serde(default)]
    pub compress: bool,
    #[serde(default)]
    pub compress_target_kb: Option<usize>,
    #[serde(default)]
    pub prepress: bool,
    /// Fixed-A4 margins of the content; covers always print edge to edge
    #[serde(default)]
    pub margins: Option<Margins>,
    /// Replaces the default style overrides for cover and content
    #[serde(default)]
    pub style_overrides: Option<StyleOverrides>,
}

/// A validated batch, ready to run
#[derive(Debug, Clone)]
pub struct ResolvedBatch {
    pub base_url: Url,
    pub output_dir: PathBuf,
    pub public_prefix: String,
    pub manifest_path: PathBuf,
    pub retry: RetryPolicy,
    pub documents: Vec<BatchDocument>,
}

fn validate_filename(filename: &str) -> Result<()> {
    let plain = !filename.is_empty()
        && !filename.contains(|c| c == '/' || c == '\\')
        && filename != ".."
        && filename.ends_with(".pdf");
    if plain {
        Ok(())
    } else {
        Err(Error::ConfigError(format!(
            "filename '{}' must be a plain name ending in .pdf",
            filename
        )))
    }
}

impl BatchConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::ConfigError(format!("invalid batch config: {}", e)))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("cannot read '{}': {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    /// Resolve against `PDF_BASE_URL` when it is set
    pub fn resolve(self) -> Result<ResolvedBatch> {
        self.resolve_with(std::env::var(BASE_URL_ENV).ok())
    }

    /// Resolve with an explicit base URL override
    pub fn resolve_with(self, base_override: Option<String>) -> Result<ResolvedBatch> {
        let base = base_override
            .filter(|s| !s.trim().is_empty())
            .or(self.base_url)
            .ok_or_else(|| {
                Error::ConfigError(format!("no base URL: set baseUrl or {}", BASE_URL_ENV))
            })?;
        let base_url = Url::parse(&base)
            .map_err(|e| Error::ConfigError(format!("invalid base URL '{}': {}", base, e)))?;
        info!("Using base URL {}", base_url);

        let join = |path: &str| -> Result<String> {
            base_url
                .join(path)
                .map(String::from)
                .map_err(|e| Error::ConfigError(format!("cannot join '{}' onto {}: {}", path, base_url, e)))
        };

        let mut seen = HashSet::new();
        let mut documents = Vec::with_capacity(self.documents.len());
        for doc in self.documents {
            validate_filename(&doc.filename)?;
            if !seen.insert(doc.filename.clone()) {
                warn!("Skipping duplicate entry for {}", doc.filename);
                continue;
            }

            let mut target = RenderTarget::new(join(&doc.path)?, doc.title.clone())
                .with_viewport(self.viewport)
                .with_theme(doc.theme)
                .with_ats_normalize(doc.ats_normalize);
            if let Some(zoom) = doc.zoom {
                target = target.with_zoom(zoom);
            }
            if let Some(margins) = doc.margins {
                target = target.with_margins(margins);
            }

            let cover = match &doc.cover_path {
                Some(path) => Some(
                    RenderTarget::new(join(path)?, format!("{} (cover)", doc.title))
                        .with_viewport(self.viewport)
                        .with_theme(doc.theme)
                        .with_margins(Margins::zero()),
                ),
                None => None,
            };
            let (target, cover) = match doc.style_overrides {
                Some(overrides) => (
                    target.with_style_overrides(overrides.clone()),
                    cover.map(|c| c.with_style_overrides(overrides)),
                ),
                None => (target, cover),
            };

            documents.push(BatchDocument {
                page_id: doc.page_id,
                title: doc.title,
                filename: doc.filename,
                target,
                readiness: doc.readiness,
                sizing: doc.sizing,
                cover,
                cover_readiness: doc.cover_readiness.unwrap_or_default(),
                compress: doc.compress,
                compress_target_bytes: doc.compress_target_kb.map(|kb| kb.saturating_mul(1024)),
                prepress: doc.prepress,
            });
        }

        let manifest_path = self
            .manifest
            .unwrap_or_else(|| self.output_dir.join("manifest.json"));

        Ok(ResolvedBatch {
            base_url,
            output_dir: self.output_dir,
            public_prefix: self.public_prefix,
            manifest_path,
            retry: self.retry,
            documents,
        })
    }
}
