//! Shared test fixtures: an in-process engine standing in for Chrome, and a
//! small PDF builder.

#![allow(dead_code)]

use drksci_press::{Engine, Error, Margins, PdfOptions, RenderConfig, Result, ScriptResult};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// How a fake page behaves
#[derive(Debug, Clone)]
pub struct FakePage {
    /// Pages in the printed PDF
    pub pages: usize,
    /// Body height once rendered
    pub height: u64,
    /// Loads that still show a short placeholder body
    pub not_ready_loads: u32,
    /// Navigation fails
    pub unreachable: bool,
    /// Boundary probe answer
    pub boundary: serde_json::Value,
}

impl Default for FakePage {
    fn default() -> Self {
        Self {
            pages: 1,
            height: 2400,
            not_ready_loads: 0,
            unreachable: false,
            boundary: json!({ "terminalText": null, "terminalImage": null, "container": null, "fallback": 1800 }),
        }
    }
}

/// A set of fake pages plus a log of everything engines did to them
#[derive(Default)]
pub struct FakeSite {
    pages: Mutex<HashMap<String, FakePage>>,
    loads: Mutex<HashMap<String, u32>>,
    events: Mutex<Vec<String>>,
    launched: AtomicUsize,
    closed: AtomicUsize,
}

impl FakeSite {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, url: &str, page: FakePage) {
        self.pages.lock().unwrap().insert(url.to_string(), page);
    }

    /// Engine factory for `Renderer::new`
    pub fn launcher(self: &Arc<Self>) -> impl Fn(&RenderConfig) -> Result<FakeEngine> + Send + Sync + 'static {
        let site = Arc::clone(self);
        move |config: &RenderConfig| {
            site.launched.fetch_add(1, Ordering::SeqCst);
            site.record(format!("launch {}x{}", config.viewport.width, config.viewport.height));
            Ok(FakeEngine {
                site: Arc::clone(&site),
                config: config.clone(),
                current: None,
            })
        }
    }

    pub fn loads(&self, url: &str) -> u32 {
        self.loads.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn launched(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

pub struct FakeEngine {
    site: Arc<FakeSite>,
    pub config: RenderConfig,
    current: Option<(FakePage, u32)>,
}

fn script_tag(script: &str) -> &str {
    script
        .lines()
        .next()
        .and_then(|line| line.trim().strip_prefix("// press:"))
        .unwrap_or("?")
}

impl FakeEngine {
    fn page(&self) -> Result<&(FakePage, u32)> {
        self.current
            .as_ref()
            .ok_or_else(|| Error::ScriptError("no page loaded".into()))
    }
}

impl Engine for FakeEngine {
    fn new(_config: RenderConfig) -> Result<Self> {
        Err(Error::InitializationError("fake engines come from FakeSite::launcher".into()))
    }

    fn load_url(&mut self, url: &str) -> Result<()> {
        self.site.record(format!("load {}", url));
        let page = self
            .site
            .pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::LoadError(format!("no fake page at {}", url)))?;
        if page.unreachable {
            return Err(Error::LoadError(format!("net::ERR_CONNECTION_REFUSED at {}", url)));
        }
        let mut loads = self.site.loads.lock().unwrap();
        let count = loads.entry(url.to_string()).or_insert(0);
        *count += 1;
        self.current = Some((page, *count));
        Ok(())
    }

    fn wait_for_selector(&mut self, selector: &str, _timeout_ms: u64) -> Result<()> {
        self.site.record(format!("selector {}", selector));
        Ok(())
    }

    fn evaluate_in_page(&mut self, script: &str) -> Result<ScriptResult> {
        let tag = script_tag(script).to_string();
        self.site.record(format!("script {}", tag));
        let answer = match tag.as_str() {
            "network-idle" => json!({ "idle": true, "resources": 6 }),
            "images" => json!({ "total": 2, "pending": 0, "failed": [], "timedOut": false }),
            "fonts" => json!({ "status": "loaded" }),
            "content-check" => {
                let (page, load) = self.page()?;
                let height = if *load <= page.not_ready_loads { 120 } else { page.height };
                json!({ "height": height, "markers": [] })
            }
            "boundary" => self.page()?.0.boundary.clone(),
            "ats" => json!({ "changed": 3 }),
            "theme" => json!("dark"),
            _ => json!(true),
        };
        Ok(ScriptResult {
            value: serde_json::Value::String(answer.to_string()),
            is_error: false,
        })
    }

    fn emulate_media(&mut self, media: &str) -> Result<()> {
        self.site.record(format!("media {}", media));
        Ok(())
    }

    fn print_pdf(&mut self, options: &PdfOptions) -> Result<Vec<u8>> {
        let m = options.margins;
        let margins = if m == Margins::zero() {
            String::new()
        } else {
            format!(
                " margins {:.1}/{:.1}/{:.1}/{:.1}",
                m.top_mm, m.bottom_mm, m.left_mm, m.right_mm
            )
        };
        self.site.record(format!(
            "print {:.1}x{:.1}{}",
            options.size.width_mm, options.size.height_mm, margins
        ));
        let pages = self.page()?.0.pages;
        let width = (options.size.width_mm / 25.4 * 72.0).round() as i64;
        let height = (options.size.height_mm / 25.4 * 72.0).round() as i64;
        Ok(make_pdf(pages, width, height))
    }

    fn close(self) -> Result<()> {
        self.site.record("close".to_string());
        self.site.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A PDF with `pages` text pages of `width` x `height` points
pub fn make_pdf(pages: usize, width: i64, height: i64) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let page_tree_id = doc.new_object_id();

    let font_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica".to_vec())),
    ]));
    let resources_id = doc.add_object(Dictionary::from_iter([(
        "Font",
        Object::Dictionary(Dictionary::from_iter([("F1", Object::Reference(font_id))])),
    )]));

    let mut kids = Vec::new();
    for i in 0..pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(format!("Page {}", i + 1))]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
        let page_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(page_tree_id)),
            ("Contents", Object::Reference(content_id)),
            ("Resources", Object::Reference(resources_id)),
            ("MediaBox", Object::Array(vec![0.into(), 0.into(), width.into(), height.into()])),
        ]));
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        page_tree_id,
        Object::Dictionary(Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(kids)),
            ("Count", Object::Integer(pages as i64)),
        ])),
    );
    let catalog_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(page_tree_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));
    let info_id = doc.add_object(Dictionary::from_iter([("Producer", Object::string_literal("Skia/PDF m120"))]));
    doc.trailer.set("Info", Object::Reference(info_id));

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

/// Width (points) of every page, in page order
pub fn page_widths(bytes: &[u8]) -> Vec<i64> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .values()
        .map(|id| {
            let page = doc.get_dictionary(*id).unwrap();
            page.get(b"MediaBox").unwrap().as_array().unwrap()[2].as_i64().unwrap()
        })
        .collect()
}

/// `/Producer` from the trailer's info dictionary
pub fn producer(bytes: &[u8]) -> Option<String> {
    let doc = Document::load_mem(bytes).unwrap();
    let id = doc.trailer.get(b"Info").and_then(Object::as_reference).ok()?;
    let info = doc.get_dictionary(id).ok()?;
    let producer = info.get(b"Producer").and_then(Object::as_str).ok()?;
    Some(String::from_utf8_lossy(producer).into_owned())
}
