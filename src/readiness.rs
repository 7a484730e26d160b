//! Page readiness
//!
//! Every wait here is bounded: either a promise raced against a timer inside
//! the page, or a predicate polled from Rust until it holds or a deadline
//! passes.

use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{scripts, Engine, Error, Result};

/// Conditions a page has to meet before it is measured and printed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PageReadinessCriteria {
    /// Quiet window after navigation with no new resource fetches; 0 skips
    /// the wait
    pub network_idle_ms: u64,
    /// Selectors that must be present
    pub selectors: Vec<String>,
    pub wait_for_images: bool,
    pub wait_for_fonts: bool,
    /// Client-side diagrams that render asynchronously
    pub diagrams: Option<DiagramReadiness>,
    /// Extra JS boolean expressions polled until true
    pub predicates: Vec<String>,
    /// Bodies shorter than this are treated as not yet rendered
    pub min_content_height: u64,
    /// Body text that marks a placeholder page
    pub placeholder_markers: Vec<String>,
    /// Bound for image and font waits
    pub resource_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Bound for each custom predicate
    pub predicate_timeout_ms: u64,
}

impl Default for PageReadinessCriteria {
    fn default() -> Self {
        Self {
            network_idle_ms: 500,
            selectors: vec!["body".to_string()],
            wait_for_images: true,
            wait_for_fonts: true,
            diagrams: None,
            predicates: Vec::new(),
            min_content_height: 500,
            placeholder_markers: Vec::new(),
            resource_timeout_ms: 15000,
            poll_interval_ms: 100,
            predicate_timeout_ms: 10000,
        }
    }
}

/// Diagrams that are complete once each container holds a rendered child
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DiagramReadiness {
    pub selector: String,
    pub rendered_child: String,
    pub timeout_ms: u64,
}

impl Default for DiagramReadiness {
    fn default() -> Self {
        Self {
            selector: ".mermaid".to_string(),
            rendered_child: "svg".to_string(),
            timeout_ms: 10000,
        }
    }
}

/// Poll `expression` until it is truthy.
///
/// Returns `Ok(false)` when the deadline passes; script failures propagate.
pub fn wait_until<E: Engine>(
    engine: &mut E,
    expression: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<bool> {
    let script = scripts::predicate(expression);
    let deadline = Instant::now() + timeout;
    loop {
        if engine.evaluate_json(&script)?.as_bool().unwrap_or(false) {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        thread::sleep(interval);
    }
}

#[derive(Debug, Deserialize)]
struct NetworkIdle {
    idle: bool,
    resources: i64,
}

/// Let client-side fetches finish after the load event. A page that never
/// goes quiet within `timeout_ms` is logged and carries on.
pub fn wait_for_network_idle<E: Engine>(
    engine: &mut E,
    criteria: &PageReadinessCriteria,
    timeout_ms: u64,
) -> Result<()> {
    if criteria.network_idle_ms == 0 {
        return Ok(());
    }
    let value = engine.evaluate_json(&scripts::network_idle(criteria.network_idle_ms, timeout_ms))?;
    let network: NetworkIdle = serde_json::from_value(value)?;
    if network.idle {
        debug!("Network idle after {} resources", network.resources);
    } else {
        warn!(
            "Network still busy after {}ms ({} resources), continuing",
            timeout_ms, network.resources
        );
    }
    Ok(())
}

pub fn wait_for_selectors<E: Engine>(
    engine: &mut E,
    criteria: &PageReadinessCriteria,
    timeout_ms: u64,
) -> Result<()> {
    for selector in &criteria.selectors {
        debug!("Waiting for selector '{}'", selector);
        engine.wait_for_selector(selector, timeout_ms)?;
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageWait {
    total: usize,
    pending: usize,
    #[serde(default)]
    failed: Vec<String>,
    timed_out: bool,
}

#[derive(Debug, Deserialize)]
struct FontWait {
    status: String,
}

/// Images, fonts and diagrams. None of these fail the render: a broken image
/// or a diagram that never draws is logged and printed as-is.
pub fn wait_for_resources<E: Engine>(engine: &mut E, criteria: &PageReadinessCriteria) -> Result<()> {
    if criteria.wait_for_images {
        let value = engine.evaluate_json(&scripts::wait_for_images(criteria.resource_timeout_ms))?;
        let images: ImageWait = serde_json::from_value(value)?;
        debug!("Images: {} total, {} were pending", images.total, images.pending);
        for src in &images.failed {
            warn!("Image failed to load: {}", src);
        }
        if images.timed_out {
            warn!("Images still loading after {}ms, continuing", criteria.resource_timeout_ms);
        }
    }

    if criteria.wait_for_fonts {
        let value = engine.evaluate_json(&scripts::wait_for_fonts(criteria.resource_timeout_ms))?;
        let fonts: FontWait = serde_json::from_value(value)?;
        if fonts.status == "timeout" {
            warn!("Fonts not ready after {}ms, continuing", criteria.resource_timeout_ms);
        }
    }

    if let Some(diagrams) = &criteria.diagrams {
        let expression = scripts::diagrams_rendered(&diagrams.selector, &diagrams.rendered_child);
        let rendered = wait_until(
            engine,
            &expression,
            Duration::from_millis(diagrams.timeout_ms),
            Duration::from_millis(criteria.poll_interval_ms),
        )?;
        if rendered {
            info!("Diagrams rendered");
        } else {
            warn!(
                "Diagrams ('{}') not rendered after {}ms, continuing",
                diagrams.selector, diagrams.timeout_ms
            );
        }
    }

    Ok(())
}

/// Custom predicates; expiry means the page is not ready
pub fn wait_for_predicates<E: Engine>(engine: &mut E, criteria: &PageReadinessCriteria) -> Result<()> {
    for expression in &criteria.predicates {
        let ok = wait_until(
            engine,
            expression,
            Duration::from_millis(criteria.predicate_timeout_ms),
            Duration::from_millis(criteria.poll_interval_ms),
        )?;
        if !ok {
            return Err(Error::ContentNotReady(format!(
                "predicate `{}` still false after {}ms",
                expression, criteria.predicate_timeout_ms
            )));
        }
    }
    Ok(())
}

pub fn settle_styles<E: Engine>(engine: &mut E) -> Result<()> {
    engine.evaluate_json(scripts::SETTLE_FRAMES).map(|_| ())
}

/// What the content check saw in the page
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContentCheck {
    pub height: u64,
    #[serde(default)]
    pub markers: Vec<String>,
}

impl ContentCheck {
    pub fn verdict(&self, criteria: &PageReadinessCriteria) -> Result<()> {
        if let Some(marker) = self.markers.first() {
            return Err(Error::ContentNotReady(format!("page still shows '{}'", marker)));
        }
        if self.height < criteria.min_content_height {
            return Err(Error::ContentNotReady(format!(
                "page height {}px is below {}px",
                self.height, criteria.min_content_height
            )));
        }
        Ok(())
    }
}

pub fn check_content<E: Engine>(engine: &mut E, criteria: &PageReadinessCriteria) -> Result<ContentCheck> {
    let value = engine.evaluate_json(&scripts::content_check(&criteria.placeholder_markers))?;
    let check: ContentCheck = serde_json::from_value(value)?;
    check.verdict(criteria)?;
    Ok(check)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PdfOptions, RenderConfig, ScriptResult};

    /// Predicate engine that turns true after `true_after` polls
    struct Polled {
        polls: u32,
        true_after: u32,
    }

    impl Engine for Polled {
        fn new(_config: RenderConfig) -> Result<Self> {
            Ok(Self { polls: 0, true_after: u32::MAX })
        }

        fn load_url(&mut self, _url: &str) -> Result<()> {
            Ok(())
        }

        fn wait_for_selector(&mut self, _selector: &str, _timeout_ms: u64) -> Result<()> {
            Ok(())
        }

        fn evaluate_in_page(&mut self, _script: &str) -> Result<ScriptResult> {
            self.polls += 1;
            let ready = self.polls > self.true_after;
            Ok(ScriptResult {
                value: serde_json::Value::String(ready.to_string()),
                is_error: false,
            })
        }

        fn emulate_media(&mut self, _media: &str) -> Result<()> {
            Ok(())
        }

        fn print_pdf(&mut self, _options: &PdfOptions) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }

        fn close(self) -> Result<()> {
            Ok(())
        }
    }

    /// Answers every script with the same JSON
    struct Fixed(serde_json::Value, u32);

    impl Engine for Fixed {
        fn new(_config: RenderConfig) -> Result<Self> {
            Ok(Self(serde_json::Value::Null, 0))
        }

        fn load_url(&mut self, _url: &str) -> Result<()> {
            Ok(())
        }

        fn wait_for_selector(&mut self, _selector: &str, _timeout_ms: u64) -> Result<()> {
            Ok(())
        }

        fn evaluate_in_page(&mut self, _script: &str) -> Result<ScriptResult> {
            self.1 += 1;
            Ok(ScriptResult {
                value: serde_json::Value::String(self.0.to_string()),
                is_error: false,
            })
        }

        fn emulate_media(&mut self, _media: &str) -> Result<()> {
            Ok(())
        }

        fn print_pdf(&mut self, _options: &PdfOptions) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }

        fn close(self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn busy_network_is_tolerated() {
        let mut engine = Fixed(serde_json::json!({ "idle": false, "resources": 42 }), 0);
        wait_for_network_idle(&mut engine, &PageReadinessCriteria::default(), 15000).unwrap();
        assert_eq!(engine.1, 1);
    }

    #[test]
    fn zero_quiet_window_skips_network_wait() {
        let mut engine = Fixed(serde_json::json!({ "idle": true, "resources": 0 }), 0);
        let criteria = PageReadinessCriteria {
            network_idle_ms: 0,
            ..Default::default()
        };
        wait_for_network_idle(&mut engine, &criteria, 15000).unwrap();
        assert_eq!(engine.1, 0);
    }

    #[test]
    fn wait_until_returns_once_predicate_holds() {
        let mut engine = Polled { polls: 0, true_after: 3 };
        let ok = wait_until(&mut engine, "window.ready", Duration::from_secs(5), Duration::from_millis(1)).unwrap();
        assert!(ok);
        assert_eq!(engine.polls, 4);
    }

    #[test]
    fn wait_until_gives_up_at_deadline() {
        let mut engine = Polled { polls: 0, true_after: u32::MAX };
        let started = Instant::now();
        let ok = wait_until(&mut engine, "false", Duration::from_millis(30), Duration::from_millis(5)).unwrap();
        assert!(!ok);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(engine.polls >= 2);
    }

    #[test]
    fn expired_predicate_is_content_not_ready() {
        let mut engine = Polled { polls: 0, true_after: u32::MAX };
        let criteria = PageReadinessCriteria {
            predicates: vec!["document.querySelector('.chart') !== null".into()],
            predicate_timeout_ms: 20,
            poll_interval_ms: 5,
            ..Default::default()
        };
        let err = wait_for_predicates(&mut engine, &criteria).unwrap_err();
        assert!(matches!(err, Error::ContentNotReady(_)));
    }

    #[test]
    fn expired_diagram_wait_is_tolerated() {
        let mut engine = Polled { polls: 0, true_after: u32::MAX };
        let criteria = PageReadinessCriteria {
            wait_for_images: false,
            wait_for_fonts: false,
            diagrams: Some(DiagramReadiness { timeout_ms: 20, ..Default::default() }),
            poll_interval_ms: 5,
            ..Default::default()
        };
        wait_for_resources(&mut engine, &criteria).unwrap();
    }

    #[test]
    fn short_page_is_not_ready() {
        let criteria = PageReadinessCriteria::default();
        let check = ContentCheck { height: 320, markers: vec![] };
        assert!(matches!(check.verdict(&criteria), Err(Error::ContentNotReady(_))));

        let tall = ContentCheck { height: 2400, markers: vec![] };
        assert!(tall.verdict(&criteria).is_ok());
    }

    #[test]
    fn placeholder_marker_is_not_ready_regardless_of_height() {
        let criteria = PageReadinessCriteria::default();
        let check = ContentCheck { height: 2400, markers: vec!["Loading...".into()] };
        let err = check.verdict(&criteria).unwrap_err();
        assert!(err.to_string().contains("Loading..."));
    }

    #[test]
    fn criteria_deserialize_with_defaults() {
        let criteria: PageReadinessCriteria =
            serde_json::from_str(r#"{"selectors":["main"],"diagrams":{}}"#).unwrap();
        assert_eq!(criteria.selectors, vec!["main".to_string()]);
        assert_eq!(criteria.diagrams, Some(DiagramReadiness::default()));
        assert_eq!(criteria.min_content_height, 500);
        assert_eq!(criteria.network_idle_ms, 500);
    }
}
