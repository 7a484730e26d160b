//! Chrome DevTools Protocol adapter implementation

use crate::sizing::mm_to_inches;
use crate::{Engine, EngineFactory, Error, PdfOptions, RenderConfig, Result, ScriptResult};
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Emulation;
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions};
use log::debug;
use std::sync::Arc;
use std::time::Duration;

/// CDP-based headless engine implementation (uses the `headless_chrome` crate)
///
/// This adapter launches a headless Chrome instance, manages a single tab,
/// and provides the `Engine` trait implementation over it. Dropping the
/// engine kills the browser process.
pub struct CdpEngine {
    browser: Browser,
    tab: Arc<Tab>,
    config: RenderConfig,
}

/// `headless_chrome` reports a missed wait as an error whose text mentions
/// the timeout; everything else is a plain failure.
fn is_timeout(err: &anyhow::Error) -> bool {
    let text = err.to_string().to_lowercase();
    text.contains("timed out") || text.contains("timeout") || text.contains("never came")
}

impl Engine for CdpEngine {
    fn new(config: RenderConfig) -> Result<Self>
    where
        Self: Sized,
    {
        // The idle timeout has to outlast the longest single wait of a render
        let idle = Duration::from_millis(config.navigation_timeout_ms.max(config.selector_timeout_ms) * 2);

        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(config.sandbox)
            .window_size(Some((config.viewport.width, config.viewport.height)))
            .idle_browser_timeout(idle)
            .path(config.chrome_path.clone())
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::InitializationError(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::InitializationError(format!("Failed to create tab: {}", e)))?;

        tab.set_default_timeout(Duration::from_millis(config.navigation_timeout_ms));

        if let Some(user_agent) = &config.user_agent {
            tab.set_user_agent(user_agent, None, None)
                .map_err(|e| Error::InitializationError(format!("Failed to set user agent: {}", e)))?;
        }

        if !config.headers.is_empty() {
            // headless_chrome expects a HashMap<&str, &str>
            let headers: std::collections::HashMap<&str, &str> = config
                .headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();

            tab.set_extra_http_headers(headers)
                .map_err(|e| Error::InitializationError(format!("Failed to set headers: {}", e)))?;
        }

        Ok(Self { browser, tab, config })
    }

    fn load_url(&mut self, url: &str) -> Result<()> {
        let timeout_ms = self.config.navigation_timeout_ms;

        self.tab
            .navigate_to(url)
            .map_err(|e| Error::LoadError(format!("Navigation to {} failed: {}", url, e)))?;

        self.tab.wait_until_navigated().map_err(|e| {
            if is_timeout(&e) {
                Error::Timeout(timeout_ms)
            } else {
                Error::LoadError(format!("Wait for navigation failed: {}", e))
            }
        })?;

        debug!("Navigated to {}", url);
        Ok(())
    }

    fn wait_for_selector(&mut self, selector: &str, timeout_ms: u64) -> Result<()> {
        self.tab
            .wait_for_element_with_custom_timeout(selector, Duration::from_millis(timeout_ms))
            .map(|_| ())
            .map_err(|e| {
                if is_timeout(&e) {
                    Error::Timeout(timeout_ms)
                } else {
                    Error::ScriptError(format!("Waiting for '{}' failed: {}", selector, e))
                }
            })
    }

    fn evaluate_in_page(&mut self, script: &str) -> Result<ScriptResult> {
        let result = self
            .tab
            .evaluate(script, true)
            .map_err(|e| Error::ScriptError(format!("Evaluation failed: {}", e)))?;

        Ok(ScriptResult {
            value: result.value.unwrap_or(serde_json::Value::Null),
            is_error: false,
        })
    }

    fn emulate_media(&mut self, media: &str) -> Result<()> {
        self.tab
            .call_method(Emulation::SetEmulatedMedia {
                media: Some(media.to_string()),
                features: None,
            })
            .map(|_| ())
            .map_err(|e| Error::RenderError(format!("Failed to emulate '{}' media: {}", media, e)))
    }

    fn print_pdf(&mut self, options: &PdfOptions) -> Result<Vec<u8>> {
        let print_options = PrintToPdfOptions {
            landscape: Some(false),
            display_header_footer: Some(false),
            print_background: Some(options.print_background),
            scale: Some(options.scale),
            paper_width: Some(mm_to_inches(options.size.width_mm)),
            paper_height: Some(mm_to_inches(options.size.height_mm)),
            margin_top: Some(mm_to_inches(options.margins.top_mm)),
            margin_bottom: Some(mm_to_inches(options.margins.bottom_mm)),
            margin_left: Some(mm_to_inches(options.margins.left_mm)),
            margin_right: Some(mm_to_inches(options.margins.right_mm)),
            prefer_css_page_size: Some(false),
            ..Default::default()
        };

        self.tab
            .print_to_pdf(Some(print_options))
            .map_err(|e| Error::RenderError(format!("Print to PDF failed: {}", e)))
    }

    fn close(self) -> Result<()> {
        // Drop the tab before the browser so the child process goes last
        drop(self.tab);
        drop(self.browser);
        Ok(())
    }
}

/// Launches a [`CdpEngine`] per render
#[derive(Debug, Clone, Copy, Default)]
pub struct CdpLauncher;

impl EngineFactory for CdpLauncher {
    type Engine = CdpEngine;

    fn launch(&self, config: &RenderConfig) -> Result<CdpEngine> {
        CdpEngine::new(config.clone())
    }
}
