//! Page-to-PDF rendering
//!
//! One render launches a fresh engine, walks the page through the readiness
//! steps, sizes it and prints it. The engine is closed on every exit path.

use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::compose::{DocumentKind, PdfDocument};
use crate::readiness::{self, PageReadinessCriteria};
use crate::sizing::{dynamic_page_size, BoundaryProbe, PageSize, PageSizing};
use crate::{ats, scripts, Engine, EngineFactory, Error, Margins, PdfOptions, RenderConfig, RenderTarget, Result};

/// Bounded retry for renders that came back not ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    /// Also retry navigation failures and timeouts
    pub retry_load_failures: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 3000,
            retry_load_failures: false,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Final result of a retried render and how many attempts it took
#[derive(Debug)]
pub struct RenderOutcome {
    pub result: Result<PdfDocument>,
    pub attempts: u32,
}

/// Check that `url` answers before paying for a browser launch.
///
/// Only http(s) URLs are checked; anything else passes.
pub fn preflight(url: &str, timeout_ms: u64) -> Result<()> {
    let parsed = url::Url::parse(url).map_err(|e| Error::LoadError(format!("invalid URL '{}': {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Ok(());
    }

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()
        .map_err(|e| Error::NetworkError(format!("Failed to build HTTP client: {}", e)))?;

    let response = client.get(parsed).send().map_err(|e| {
        if e.is_timeout() {
            Error::Timeout(timeout_ms)
        } else {
            Error::LoadError(format!("{} is unreachable: {}", url, e))
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::LoadError(format!("{} answered HTTP {}", url, status)));
    }
    debug!("Preflight OK for {}", url);
    Ok(())
}

/// Drives engines launched by `L`
pub struct Renderer<L> {
    launcher: L,
    config: RenderConfig,
}

impl<L: EngineFactory> Renderer<L> {
    pub fn new(launcher: L, config: RenderConfig) -> Self {
        Self { launcher, config }
    }

    /// Render one page to a PDF
    pub fn render_page_to_pdf(
        &self,
        target: &RenderTarget,
        readiness: &PageReadinessCriteria,
        sizing: &PageSizing,
    ) -> Result<PdfDocument> {
        if self.config.preflight {
            preflight(&target.url, self.config.navigation_timeout_ms)?;
        }

        let mut config = self.config.clone();
        config.viewport = target.viewport;

        info!("Rendering {} ({})", target.description, target.url);
        let mut engine = self.launcher.launch(&config)?;
        let captured = capture(&mut engine, &config, target, readiness, sizing);
        if let Err(e) = engine.close() {
            warn!("Failed to close engine for {}: {}", target.description, e);
        }

        let bytes = captured?;
        info!("Generated {} ({:.2} KB)", target.description, bytes.len() as f64 / 1024.0);
        Ok(PdfDocument::new(DocumentKind::Content, bytes))
    }

    /// Like [`Renderer::render_page_to_pdf`], but a failure is logged and
    /// comes back as `None`.
    pub fn try_render_page_to_pdf(
        &self,
        target: &RenderTarget,
        readiness: &PageReadinessCriteria,
        sizing: &PageSizing,
    ) -> Option<PdfDocument> {
        match self.render_page_to_pdf(target, readiness, sizing) {
            Ok(doc) => Some(doc),
            Err(e) => {
                error!("Failed to generate {}: {}", target.description, e);
                None
            }
        }
    }

    /// Render, retrying retryable failures after a fixed backoff
    pub fn render_with_retry(
        &self,
        target: &RenderTarget,
        readiness: &PageReadinessCriteria,
        sizing: &PageSizing,
        policy: &RetryPolicy,
    ) -> RenderOutcome {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.render_page_to_pdf(target, readiness, sizing) {
                Ok(doc) => {
                    return RenderOutcome {
                        result: Ok(doc),
                        attempts: attempt,
                    }
                }
                Err(e) if attempt < max_attempts && e.is_retryable(policy.retry_load_failures) => {
                    warn!(
                        "Attempt {}/{} for {} failed: {}; retrying in {}ms",
                        attempt, max_attempts, target.description, e, policy.backoff_ms
                    );
                    thread::sleep(Duration::from_millis(policy.backoff_ms));
                }
                Err(e) => {
                    error!(
                        "Failed to generate {} after {} attempt(s): {}",
                        target.description, attempt, e
                    );
                    return RenderOutcome {
                        result: Err(e),
                        attempts: attempt,
                    };
                }
            }
        }
    }
}

fn capture<E: Engine>(
    engine: &mut E,
    config: &RenderConfig,
    target: &RenderTarget,
    readiness: &PageReadinessCriteria,
    sizing: &PageSizing,
) -> Result<Vec<u8>> {
    engine.load_url(&target.url)?;
    // CDP calls share the navigation timeout, so the in-page bound stays below it
    let idle_timeout = readiness.resource_timeout_ms.min(config.navigation_timeout_ms / 2);
    readiness::wait_for_network_idle(engine, readiness, idle_timeout)?;
    readiness::wait_for_selectors(engine, readiness, config.selector_timeout_ms)?;

    if let Some(script) = scripts::apply_theme(target.theme) {
        let mode = engine.evaluate_json(&script)?;
        debug!("Theme set to {}", mode);
    }
    if let Some(zoom) = target.zoom {
        engine.evaluate_json(&scripts::set_zoom(zoom))?;
    }

    readiness::wait_for_resources(engine, readiness)?;
    readiness::wait_for_predicates(engine, readiness)?;

    if target.ats_normalize {
        ats::normalize_document_for_ats(engine)?;
    }

    engine.emulate_media("screen")?;
    let overrides = target.style_overrides.as_ref().unwrap_or(&config.style_overrides);
    engine.add_style_tag(&overrides.stylesheet())?;
    readiness::settle_styles(engine)?;

    let check = readiness::check_content(engine, readiness)?;
    debug!("Content height {}px", check.height);

    let options = match sizing {
        PageSizing::FixedA4 => PdfOptions::new(PageSize::a4(), target.margins.unwrap_or(config.fixed_page_margins)),
        PageSizing::DynamicHeight(boundary) => {
            let probe: BoundaryProbe = serde_json::from_value(engine.evaluate_json(&scripts::probe_boundary(boundary))?)?;
            let (source, bottom) = probe.resolve();
            let size = dynamic_page_size(bottom, boundary.buffer_px);
            info!(
                "Content ends at {}px ({:?}), page height {:.1}mm",
                bottom, source, size.height_mm
            );
            PdfOptions::new(size, Margins::zero())
        }
    };

    engine.print_pdf(&options)
}
