//! Batch generation
//!
//! Documents are processed one after another, each with fresh engines. A
//! failing document is recorded and the batch moves on.

use std::path::{Path, PathBuf};

use log::{error, info, warn};

use crate::compose::{attach_cover, compress_pdf, DocumentKind, PdfDocument};
use crate::manifest::{ManifestEntry, PdfManifest};
use crate::prepress::PrepressOptimizer;
use crate::readiness::PageReadinessCriteria;
use crate::renderer::{RetryPolicy, Renderer};
use crate::sizing::PageSizing;
use crate::{EngineFactory, RenderTarget, Result};

/// One output file of a batch
#[derive(Debug, Clone)]
pub struct BatchDocument {
    pub page_id: String,
    pub title: String,
    /// File name inside the output directory
    pub filename: String,
    pub target: RenderTarget,
    pub readiness: PageReadinessCriteria,
    pub sizing: PageSizing,
    /// Optional fixed-A4 cover placed before the content
    pub cover: Option<RenderTarget>,
    pub cover_readiness: PageReadinessCriteria,
    pub compress: bool,
    pub compress_target_bytes: Option<usize>,
    pub prepress: bool,
}

impl BatchDocument {
    pub fn new(
        page_id: impl Into<String>,
        title: impl Into<String>,
        filename: impl Into<String>,
        target: RenderTarget,
    ) -> Self {
        Self {
            page_id: page_id.into(),
            title: title.into(),
            filename: filename.into(),
            target,
            readiness: PageReadinessCriteria::default(),
            sizing: PageSizing::FixedA4,
            cover: None,
            cover_readiness: PageReadinessCriteria::default(),
            compress: false,
            compress_target_bytes: None,
            prepress: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedPdf {
    pub page_id: String,
    pub title: String,
    pub filename: String,
    /// Where the file was written
    pub path: PathBuf,
    /// Public path used in the manifest
    pub public_path: String,
    pub size: u64,
    pub page_count: Option<usize>,
    pub has_cover: bool,
    pub prepress_path: Option<PathBuf>,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedPdf {
    pub page_id: String,
    pub filename: String,
    pub error: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub succeeded: Vec<GeneratedPdf>,
    pub failed: Vec<FailedPdf>,
}

impl BatchSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Manifest listing the successful documents only
    pub fn manifest(&self, base_url: &str) -> PdfManifest {
        let pdfs = self
            .succeeded
            .iter()
            .map(|pdf| ManifestEntry {
                page_id: pdf.page_id.clone(),
                filename: pdf.filename.clone(),
                path: pdf.public_path.clone(),
                size: pdf.size,
                title: pdf.title.clone(),
            })
            .collect();
        PdfManifest::new(base_url, pdfs)
    }

    pub fn log_summary(&self) {
        info!(
            "Batch finished: {} generated, {} failed",
            self.succeeded.len(),
            self.failed.len()
        );
        for pdf in &self.succeeded {
            info!("  {} ({:.2} KB)", pdf.filename, pdf.size as f64 / 1024.0);
        }
        for failed in &self.failed {
            error!(
                "  {} failed after {} attempt(s): {}",
                failed.filename, failed.attempts, failed.error
            );
        }
    }
}

/// Runs a list of [`BatchDocument`]s into an output directory
pub struct BatchRunner<L> {
    renderer: Renderer<L>,
    output_dir: PathBuf,
    public_prefix: String,
    retry: RetryPolicy,
    optimizer: PrepressOptimizer,
}

impl<L: EngineFactory> BatchRunner<L> {
    pub fn new(renderer: Renderer<L>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            renderer,
            output_dir: output_dir.into(),
            public_prefix: "/pdfs".to_string(),
            retry: RetryPolicy::default(),
            optimizer: PrepressOptimizer::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_public_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.public_prefix = prefix.into();
        self
    }

    pub fn with_optimizer(mut self, optimizer: PrepressOptimizer) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn run(&self, documents: &[BatchDocument]) -> BatchSummary {
        info!("Generating {} PDFs into {}", documents.len(), self.output_dir.display());
        let mut summary = BatchSummary::default();
        for (index, document) in documents.iter().enumerate() {
            info!("[{}/{}] {}", index + 1, documents.len(), document.title);
            match self.process(document) {
                Ok(generated) => summary.succeeded.push(generated),
                Err(failed) => summary.failed.push(failed),
            }
        }
        summary.log_summary();
        summary
    }

    fn public_path(&self, filename: &str) -> String {
        format!("{}/{}", self.public_prefix.trim_end_matches('/'), filename)
    }

    fn process(&self, document: &BatchDocument) -> std::result::Result<GeneratedPdf, FailedPdf> {
        let cover = document.cover.as_ref().and_then(|cover| {
            self.renderer
                .try_render_page_to_pdf(cover, &document.cover_readiness, &PageSizing::FixedA4)
                .map(|pdf| pdf.with_kind(DocumentKind::Cover))
        });
        if document.cover.is_some() && cover.is_none() {
            warn!("Continuing {} without its cover", document.filename);
        }

        let outcome = self.renderer.render_with_retry(
            &document.target,
            &document.readiness,
            &document.sizing,
            &self.retry,
        );
        let attempts = outcome.attempts;
        let fail = |error: String| FailedPdf {
            page_id: document.page_id.clone(),
            filename: document.filename.clone(),
            error,
            attempts,
        };

        let content = outcome.result.map_err(|e| fail(e.to_string()))?;
        let has_cover = cover.is_some();
        let mut pdf = attach_cover(cover, content);

        if document.compress {
            pdf = compress_pdf(pdf, document.compress_target_bytes);
        }

        let path = self.output_dir.join(&document.filename);
        write_pdf(&path, &pdf).map_err(|e| fail(e.to_string()))?;
        info!("Wrote {} ({:.2} KB)", path.display(), pdf.len() as f64 / 1024.0);

        let prepress_path = if document.prepress {
            match self.optimizer.optimize_for_prepress(&path) {
                Ok(out) => Some(out),
                Err(e) => {
                    warn!("Keeping {} without a prepress copy: {}", document.filename, e);
                    None
                }
            }
        } else {
            None
        };

        Ok(GeneratedPdf {
            page_id: document.page_id.clone(),
            title: document.title.clone(),
            filename: document.filename.clone(),
            public_path: self.public_path(&document.filename),
            size: pdf.len() as u64,
            page_count: pdf.page_count().ok(),
            path,
            has_cover,
            prepress_path,
            attempts,
        })
    }
}

fn write_pdf(path: &Path, pdf: &PdfDocument) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, pdf.as_bytes())?;
    Ok(())
}
