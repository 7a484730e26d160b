//! End-to-end renders through headless Chrome

#![cfg(feature = "cdp")]

use drksci_press::cdp::CdpLauncher;
use drksci_press::{
    merge_pdfs, ContentBoundary, DiagramReadiness, PageReadinessCriteria, PageSizing, RenderConfig, RenderTarget,
    Renderer, Theme,
};
use std::sync::Once;
use tiny_http::{Response, Server};

static INIT: Once = Once::new();

const LETTER: &str = r#"<!DOCTYPE html>
<html class="light">
<head><title>Cover letter</title></head>
<body>
<nav class="desktop-nav">Home | Research</nav>
<div class="cover-letter-content" style="width: 700px">
  <p>Dear Hiring Manager,</p>
  <p>I am writing to apply for the role.</p>
  <p>Available for discussion at your convenience.</p>
  <img alt="signature" style="height: 40px; width: 120px" src="data:image/gif;base64,R0lGODlhAQABAAAAACw=">
</div>
<div style="height: 600px"></div>
</body>
</html>"#;

const DIAGRAM: &str = r#"<!DOCTYPE html>
<html>
<body>
<div class="mermaid">graph TD; A-->B</div>
<div style="height: 900px">Research notes</div>
<script>
  setTimeout(function () {
    document.querySelector('.mermaid').innerHTML = '<svg width="100" height="50"></svg>';
  }, 300);
</script>
</body>
</html>"#;

fn start_test_server() -> String {
    INIT.call_once(|| {
        std::thread::spawn(|| {
            let server = Server::http("127.0.0.1:18091").unwrap();
            for request in server.incoming_requests() {
                let body = match request.url() {
                    "/c/blake/letter" => LETTER,
                    "/research/mining" => DIAGRAM,
                    _ => "<html><body><div style=\"height: 1200px\">Blake Carter</div></body></html>",
                };
                let response = Response::from_string(body).with_header(
                    "Content-Type: text/html; charset=utf-8"
                        .parse::<tiny_http::Header>()
                        .unwrap(),
                );
                let _ = request.respond(response);
            }
        });
        std::thread::sleep(std::time::Duration::from_millis(100));
    });

    "http://127.0.0.1:18091".to_string()
}

fn renderer() -> Renderer<CdpLauncher> {
    Renderer::new(CdpLauncher, RenderConfig::default())
}

#[test]
#[ignore] // Requires Chrome to be installed
fn cover_and_content_merge_into_one_document() {
    let base = start_test_server();
    let renderer = renderer();
    let readiness = PageReadinessCriteria::default();

    let cover = renderer
        .render_page_to_pdf(
            &RenderTarget::new(format!("{}/c/blake/cover", base), "cover"),
            &readiness,
            &PageSizing::FixedA4,
        )
        .expect("cover");
    let content = renderer
        .render_page_to_pdf(
            &RenderTarget::new(format!("{}/c/blake", base), "resume").with_theme(Theme::Dark),
            &readiness,
            &PageSizing::FixedA4,
        )
        .expect("content");

    let merged = merge_pdfs(&[Some(&cover), Some(&content)]).expect("merge");
    assert_eq!(
        merged.page_count().unwrap(),
        cover.page_count().unwrap() + content.page_count().unwrap()
    );
}

#[test]
#[ignore] // Requires Chrome to be installed
fn letter_prints_as_a_single_tall_page() {
    let base = start_test_server();
    let sizing = PageSizing::DynamicHeight(ContentBoundary {
        terminal_text: Some("Available for discussion".into()),
        terminal_image: Some("img[alt=\"signature\"]".into()),
        container: Some(".cover-letter-content".into()),
        ..ContentBoundary::default()
    });
    let readiness = PageReadinessCriteria {
        min_content_height: 0,
        ..PageReadinessCriteria::default()
    };

    let pdf = renderer()
        .render_page_to_pdf(
            &RenderTarget::new(format!("{}/c/blake/letter", base), "letter").with_ats_normalize(true),
            &readiness,
            &sizing,
        )
        .expect("letter");
    assert_eq!(pdf.page_count().unwrap(), 1);
}

#[test]
#[ignore] // Requires Chrome to be installed
fn diagrams_are_awaited() {
    let base = start_test_server();
    let readiness = PageReadinessCriteria {
        diagrams: Some(DiagramReadiness::default()),
        ..PageReadinessCriteria::default()
    };
    let pdf = renderer()
        .render_page_to_pdf(
            &RenderTarget::new(format!("{}/research/mining", base), "research"),
            &readiness,
            &PageSizing::DynamicHeight(ContentBoundary::default()),
        )
        .expect("research");
    assert!(pdf.as_bytes().starts_with(b"%PDF"));
}
