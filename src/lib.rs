//! drksci press
//!
//! Turns live pages of the drksci site into finished PDF documents: drives a
//! headless browser to a page, waits for it to be ready, measures the content,
//! prints it, then merges cover and content documents, compresses them and
//! optionally hands them to a prepress optimizer.
//!
//! # Features
//!
//! - **CDP Backend** (default): Uses Chrome DevTools Protocol via headless Chrome
//! - **Engine seam**: the renderer drives any [`Engine`], so tests and other
//!   backends can stand in for Chrome
//! - **Fail-closed configuration**: no default base URL, no embedded secrets
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "cdp")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use drksci_press::{
//!     cdp::CdpLauncher, PageReadinessCriteria, PageSizing, RenderConfig, RenderTarget, Renderer,
//! };
//!
//! let renderer = Renderer::new(CdpLauncher, RenderConfig::default());
//! let target = RenderTarget::new("http://localhost:3000/c/blake/cover", "cover page");
//! let cover = renderer.render_page_to_pdf(
//!     &target,
//!     &PageReadinessCriteria::default(),
//!     &PageSizing::FixedA4,
//! )?;
//! std::fs::write("cover.pdf", cover.as_bytes())?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "cdp"))]
//! # fn main() {}
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use base64::Engine as Base64Engine;
use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Error, Result};

#[cfg(feature = "cdp")]
pub mod cdp;

pub mod ats;
pub mod async_api;
pub mod batch;
pub mod compose;
pub mod config;
pub mod manifest;
pub mod prepress;
pub mod readiness;
pub mod renderer;
pub mod scripts;
pub mod sizing;

pub use async_api::RenderWorker;
pub use batch::{BatchDocument, BatchRunner, BatchSummary, FailedPdf, GeneratedPdf};
pub use compose::{attach_cover, compress_pdf, merge_pdf_selections, merge_pdfs, DocumentKind, PageSelection, PdfDocument};
pub use config::BatchConfig;
pub use manifest::{ManifestEntry, PdfManifest};
pub use prepress::PrepressOptimizer;
pub use readiness::{DiagramReadiness, PageReadinessCriteria};
pub use renderer::{RenderOutcome, Renderer, RetryPolicy};
pub use sizing::{BoundaryProbe, BoundarySource, ContentBoundary, PageSize, PageSizing};

/// Configuration handed to the renderer and to every engine it launches
///
/// The defaults are conservative: sandboxed Chrome, a 60s navigation budget,
/// screen-media style overrides that hide navigation chrome. There is no
/// base URL here; batch runs must name one explicitly.
///
/// # Examples
///
/// ```
/// let cfg = drksci_press::RenderConfig::default();
/// assert_eq!(cfg.viewport.width, 1024);
/// assert!(cfg.sandbox);
/// ```
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// User agent override; `None` keeps the browser's own
    pub user_agent: Option<String>,
    /// Viewport dimensions (replaced per target by `RenderTarget::viewport`)
    pub viewport: Viewport,
    /// Budget for navigation and HTTP preflight in milliseconds
    pub navigation_timeout_ms: u64,
    /// Budget for each readiness selector in milliseconds
    pub selector_timeout_ms: u64,
    /// Run Chrome with its sandbox enabled
    pub sandbox: bool,
    /// Custom HTTP headers
    pub headers: HashMap<String, String>,
    /// Chrome binary to launch; `None` lets the backend discover one
    pub chrome_path: Option<PathBuf>,
    /// Margins used for `PageSizing::FixedA4` documents
    pub fixed_page_margins: Margins,
    /// Style sheet injected before capture
    pub style_overrides: StyleOverrides,
    /// Check that a target answers over HTTP before launching a browser
    pub preflight: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            user_agent: None,
            viewport: Viewport::default(),
            navigation_timeout_ms: 60000,
            selector_timeout_ms: 30000,
            sandbox: true,
            headers: HashMap::new(),
            chrome_path: None,
            fixed_page_margins: Margins::zero(),
            style_overrides: StyleOverrides::default(),
            preflight: true,
        }
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
        }
    }
}

/// Page margins in millimetres
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Margins {
    pub top_mm: f64,
    pub bottom_mm: f64,
    pub left_mm: f64,
    pub right_mm: f64,
}

impl Margins {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn uniform(mm: f64) -> Self {
        Self {
            top_mm: mm,
            bottom_mm: mm,
            left_mm: mm,
            right_mm: mm,
        }
    }
}

/// Style overrides injected into the page in place of `@media print` rules.
///
/// Pages are always captured with `screen` media emulated; whatever print
/// styling is wanted has to be spelled out here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StyleOverrides {
    /// Selectors hidden with `display: none !important`
    pub hide_selectors: Vec<String>,
    /// Force `print-color-adjust: exact` on every element
    pub exact_colors: bool,
    /// Extra CSS appended verbatim
    pub extra_css: Option<String>,
}

impl Default for StyleOverrides {
    fn default() -> Self {
        Self {
            hide_selectors: [
                "header",
                "footer",
                ".sticky",
                "nav",
                ".mobile-nav",
                ".desktop-nav",
                "[aria-label*=\"PDF\"]",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            exact_colors: true,
            extra_css: None,
        }
    }
}

impl StyleOverrides {
    /// Render the overrides as a style sheet
    pub fn stylesheet(&self) -> String {
        let mut css = String::new();
        if !self.hide_selectors.is_empty() {
            css.push_str(&self.hide_selectors.join(", "));
            css.push_str(" {\n  display: none !important;\n}\n");
        }
        if self.exact_colors {
            css.push_str(
                "* {\n  print-color-adjust: exact !important;\n  -webkit-print-color-adjust: exact !important;\n}\n",
            );
        }
        if let Some(extra) = &self.extra_css {
            css.push_str(extra);
            css.push('\n');
        }
        css
    }
}

/// Colour scheme forced onto the page before it is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Theme {
    /// Leave the page's own classes alone
    #[default]
    Unchanged,
    Dark,
    Light,
    /// Light when the URL fragment is `#light`, dark otherwise
    FromUrlHash,
}

impl std::str::FromStr for Theme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unchanged" | "none" => Ok(Theme::Unchanged),
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            "hash" | "from-url-hash" => Ok(Theme::FromUrlHash),
            other => Err(Error::ConfigError(format!("unknown theme '{}'", other))),
        }
    }
}

/// One page to render
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTarget {
    /// Navigable URL
    pub url: String,
    /// Human readable label used in logs
    pub description: String,
    /// Viewport the browser context is sized to
    pub viewport: Viewport,
    /// Theme side effect applied before measuring
    pub theme: Theme,
    /// Optional `document.body.style.zoom`
    pub zoom: Option<f64>,
    /// Rewrite typographic punctuation to ASCII before capture
    pub ats_normalize: bool,
    /// Fixed-A4 margins; `None` uses `RenderConfig::fixed_page_margins`
    pub margins: Option<Margins>,
    /// Replaces `RenderConfig::style_overrides` for this page
    pub style_overrides: Option<StyleOverrides>,
}

impl RenderTarget {
    pub fn new(url: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            description: description.into(),
            viewport: Viewport::default(),
            theme: Theme::Unchanged,
            zoom: None,
            ats_normalize: false,
            margins: None,
            style_overrides: None,
        }
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = theme;
        self
    }

    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = Some(zoom);
        self
    }

    pub fn with_ats_normalize(mut self, enabled: bool) -> Self {
        self.ats_normalize = enabled;
        self
    }

    pub fn with_margins(mut self, margins: Margins) -> Self {
        self.margins = Some(margins);
        self
    }

    pub fn with_style_overrides(mut self, overrides: StyleOverrides) -> Self {
        self.style_overrides = Some(overrides);
        self
    }
}

/// Result of JavaScript execution
///
/// `value` is whatever the backend handed back; scripts in this crate return
/// `JSON.stringify(..)` strings, which [`Engine::evaluate_json`] decodes.
#[derive(Debug, Clone)]
pub struct ScriptResult {
    pub value: serde_json::Value,
    /// Whether the script threw an error
    pub is_error: bool,
}

/// Print parameters handed to [`Engine::print_pdf`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfOptions {
    pub size: PageSize,
    pub margins: Margins,
    pub print_background: bool,
    pub scale: f64,
}

impl PdfOptions {
    pub fn new(size: PageSize, margins: Margins) -> Self {
        Self {
            size,
            margins,
            print_background: true,
            scale: 1.0,
        }
    }
}

/// Core trait for headless browser backends
pub trait Engine {
    /// Launch a browser context with the given configuration
    fn new(config: RenderConfig) -> Result<Self>
    where
        Self: Sized;

    /// Navigate to a URL and block until navigation completes
    fn load_url(&mut self, url: &str) -> Result<()>;

    /// Wait until `selector` matches an element
    fn wait_for_selector(&mut self, selector: &str, timeout_ms: u64) -> Result<()>;

    /// Evaluate JavaScript in the page's global context, awaiting promises
    fn evaluate_in_page(&mut self, script: &str) -> Result<ScriptResult>;

    /// Force a CSS media type (`screen` or `print`)
    fn emulate_media(&mut self, media: &str) -> Result<()>;

    /// Print the current page to PDF bytes
    fn print_pdf(&mut self, options: &PdfOptions) -> Result<Vec<u8>>;

    /// Evaluate a script that returns `JSON.stringify(..)` and decode it.
    ///
    /// Non-JSON string results come back as `Value::String`.
    fn evaluate_json(&mut self, script: &str) -> Result<serde_json::Value> {
        let result = self.evaluate_in_page(script)?;
        if result.is_error {
            return Err(Error::ScriptError(result.value.to_string()));
        }
        match result.value {
            serde_json::Value::String(s) => match serde_json::from_str::<serde_json::Value>(&s) {
                Ok(v) => Ok(v),
                Err(_) => Ok(serde_json::Value::String(s)),
            },
            other => Ok(other),
        }
    }

    /// Inject a `<style>` element carrying `css`.
    ///
    /// The sheet travels base64-encoded so it needs no escaping inside the
    /// script.
    fn add_style_tag(&mut self, css: &str) -> Result<()> {
        let b64 = Base64Engine::encode(&base64::engine::general_purpose::STANDARD, css);
        let script = scripts::ADD_STYLE_TEMPLATE.replace("{{B64_TOKEN}}", &b64);
        self.evaluate_json(&script).map(|_| ())
    }

    /// Close the engine and tear down the browser process
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// Launches a fresh engine for every render.
///
/// Any `Fn(&RenderConfig) -> Result<E>` is a factory, which is how tests
/// substitute their own engines.
pub trait EngineFactory {
    type Engine: Engine;

    fn launch(&self, config: &RenderConfig) -> Result<Self::Engine>;
}

impl<E, F> EngineFactory for F
where
    E: Engine,
    F: Fn(&RenderConfig) -> Result<E>,
{
    type Engine = E;

    fn launch(&self, config: &RenderConfig) -> Result<E> {
        self(config)
    }
}
