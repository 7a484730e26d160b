//! Page scripts
//!
//! Every script starts with a `// press:<name>` tag line and resolves to a
//! `JSON.stringify(..)` string, since CDP only hands back previews for
//! objects. Parameters are embedded as JSON literals.

use serde_json::json;

use crate::sizing::ContentBoundary;
use crate::Theme;

/// Style injection template; `{{B64_TOKEN}}` is replaced with the base64 sheet
pub const ADD_STYLE_TEMPLATE: &str = r#"// press:add-style
(function () {
  const bytes = Uint8Array.from(atob("{{B64_TOKEN}}"), c => c.charCodeAt(0));
  const style = document.createElement('style');
  style.setAttribute('data-press', 'overrides');
  style.textContent = new TextDecoder().decode(bytes);
  (document.head || document.documentElement).appendChild(style);
  return JSON.stringify(true);
})()"#;

/// Theme side effect; `None` when the page is left alone
pub fn apply_theme(theme: Theme) -> Option<String> {
    let light = match theme {
        Theme::Unchanged => return None,
        Theme::Dark => "false",
        Theme::Light => "true",
        Theme::FromUrlHash => "window.location.hash === '#light'",
    };
    Some(format!(
        r#"// press:theme
(function () {{
  const light = {light};
  const root = document.documentElement;
  root.classList.toggle('dark', !light);
  root.classList.toggle('light', light);
  return JSON.stringify(light ? 'light' : 'dark');
}})()"#
    ))
}

pub fn set_zoom(zoom: f64) -> String {
    format!(
        r#"// press:zoom
(function () {{
  if (document.body) document.body.style.zoom = '{zoom}';
  return JSON.stringify({zoom});
}})()"#
    )
}

/// Resolve once every image has loaded or failed, or after `timeout_ms`
pub fn wait_for_images(timeout_ms: u64) -> String {
    format!(
        r#"// press:images
(async function () {{
  const images = Array.from(document.images);
  const pending = images.filter(img => !img.complete);
  const failed = [];
  const settled = Promise.all(pending.map(img => new Promise(resolve => {{
    img.addEventListener('load', resolve, {{ once: true }});
    img.addEventListener('error', () => {{ failed.push(img.currentSrc || img.src); resolve(); }}, {{ once: true }});
  }})));
  const timer = new Promise(resolve => setTimeout(() => resolve('timeout'), {timeout_ms}));
  const outcome = await Promise.race([settled.then(() => 'loaded'), timer]);
  return JSON.stringify({{ total: images.length, pending: pending.length, failed, timedOut: outcome === 'timeout' }});
}})()"#
    )
}

pub fn wait_for_fonts(timeout_ms: u64) -> String {
    format!(
        r#"// press:fonts
(async function () {{
  if (!document.fonts || !document.fonts.ready) return JSON.stringify({{ status: 'unsupported' }});
  const timer = new Promise(resolve => setTimeout(() => resolve('timeout'), {timeout_ms}));
  const status = await Promise.race([document.fonts.ready.then(() => 'loaded'), timer]);
  return JSON.stringify({{ status }});
}})()"#
    )
}

/// Resolve once the document has finished loading and no new resource has
/// been fetched for `quiet_ms`, or after `timeout_ms`
pub fn network_idle(quiet_ms: u64, timeout_ms: u64) -> String {
    format!(
        r#"// press:network-idle
new Promise(resolve => {{
  const started = Date.now();
  let resources = -1;
  let quietSince = started;
  const tick = () => {{
    const now = Date.now();
    const count = performance.getEntriesByType('resource').length;
    if (count !== resources) {{
      resources = count;
      quietSince = now;
    }}
    if (document.readyState === 'complete' && now - quietSince >= {quiet_ms}) {{
      return resolve(JSON.stringify({{ idle: true, resources }}));
    }}
    if (now - started >= {timeout_ms}) {{
      return resolve(JSON.stringify({{ idle: false, resources }}));
    }}
    setTimeout(tick, 50);
  }};
  tick();
}})"#
    )
}

/// Wrap a boolean JS expression for polling
pub fn predicate(expression: &str) -> String {
    format!(
        r#"// press:predicate
JSON.stringify(Boolean((function () {{ return ({expression}); }})()))"#
    )
}

/// True when every element matching `selector` contains `rendered_child`
pub fn diagrams_rendered(selector: &str, rendered_child: &str) -> String {
    let selector = json!(selector);
    let child = json!(rendered_child);
    format!(
        "Array.from(document.querySelectorAll({selector})).every(el => el.querySelector({child}) !== null)"
    )
}

/// Two animation frames, so injected styles have been applied and laid out
pub const SETTLE_FRAMES: &str = r#"// press:settle
new Promise(resolve => {
  const done = () => resolve(JSON.stringify(true));
  const timer = setTimeout(done, 1000);
  requestAnimationFrame(() => requestAnimationFrame(() => { clearTimeout(timer); done(); }));
})"#;

/// Body height plus which of `markers` appear in the body text
pub fn content_check(markers: &[String]) -> String {
    let markers = json!(markers);
    format!(
        r#"// press:content-check
(function (markers) {{
  const body = document.body;
  const height = body ? Math.max(body.scrollHeight, document.documentElement.scrollHeight) : 0;
  const text = body ? body.innerText : '';
  return JSON.stringify({{ height, markers: markers.filter(m => text.includes(m)) }});
}})({markers})"#
    )
}

/// Measure every candidate content bottom; the choice is made by
/// [`crate::sizing::BoundaryProbe::resolve`].
pub fn probe_boundary(boundary: &ContentBoundary) -> String {
    let params = json!({
        "terminalText": boundary.terminal_text,
        "terminalImage": boundary.terminal_image,
        "container": boundary.container,
        "fallback": boundary.fallback_selector,
    });
    format!(
        r#"// press:boundary
(function (params) {{
  const bottomOf = el => Math.ceil(el.getBoundingClientRect().bottom + window.scrollY);
  const visible = el => {{
    const style = window.getComputedStyle(el);
    return style.display !== 'none' && style.visibility !== 'hidden' && el.offsetHeight > 0;
  }};
  let terminalText = null;
  if (params.terminalText) {{
    const el = Array.from(document.querySelectorAll('p, li')).find(p => p.textContent.includes(params.terminalText));
    if (el) terminalText = bottomOf(el);
  }}
  let terminalImage = null;
  if (params.terminalImage) {{
    const el = document.querySelector(params.terminalImage);
    if (el) terminalImage = bottomOf(el);
  }}
  let container = null;
  if (params.container) {{
    const el = document.querySelector(params.container);
    if (el) container = bottomOf(el);
  }}
  let fallback = 0;
  document.querySelectorAll(params.fallback).forEach(el => {{
    if (visible(el)) fallback = Math.max(fallback, bottomOf(el));
  }});
  return JSON.stringify({{ terminalText, terminalImage, container, fallback }});
}})({params})"#
    )
}

/// Rewrite every text node outside `script`/`style` with the replacement
/// table `[[char, replacement], ..]`, collapsing whitespace runs.
pub fn normalize_ats(table_json: &str) -> String {
    format!(
        r#"// press:ats
(function (table) {{
  const map = new Map(table);
  const normalize = s => {{
    let out = '';
    for (const ch of s) out += map.has(ch) ? map.get(ch) : ch;
    return out.replace(/\s+/g, ' ');
  }};
  const walker = document.createTreeWalker(document.body || document.documentElement, NodeFilter.SHOW_TEXT, {{
    acceptNode: node => {{
      const parent = node.parentElement;
      if (parent && ['SCRIPT', 'STYLE', 'NOSCRIPT'].includes(parent.tagName)) return NodeFilter.FILTER_REJECT;
      return NodeFilter.FILTER_ACCEPT;
    }}
  }});
  let changed = 0;
  while (walker.nextNode()) {{
    const node = walker.currentNode;
    const next = normalize(node.nodeValue);
    if (next !== node.nodeValue) {{
      node.nodeValue = next;
      changed += 1;
    }}
  }}
  return JSON.stringify({{ changed }});
}})({table_json})"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_theme_has_no_script() {
        assert!(apply_theme(Theme::Unchanged).is_none());
    }

    #[test]
    fn hash_theme_reads_fragment() {
        let script = apply_theme(Theme::FromUrlHash).unwrap();
        assert!(script.contains("window.location.hash === '#light'"));
        assert!(script.starts_with("// press:theme"));
    }

    #[test]
    fn diagram_predicate_quotes_selectors() {
        let js = diagrams_rendered(".mermaid", "svg");
        assert_eq!(
            js,
            r#"Array.from(document.querySelectorAll(".mermaid")).every(el => el.querySelector("svg") !== null)"#
        );
    }

    #[test]
    fn boundary_params_are_embedded_as_json() {
        let boundary = ContentBoundary {
            terminal_text: Some("Available for \"discussion\"".into()),
            terminal_image: Some("img[alt=\"signature\"]".into()),
            ..Default::default()
        };
        let script = probe_boundary(&boundary);
        assert!(script.contains(r#""terminalText":"Available for \"discussion\"""#));
        assert!(script.contains(r#""container":null"#));
    }

    #[test]
    fn network_idle_embeds_both_bounds() {
        let script = network_idle(500, 15000);
        assert!(script.starts_with("// press:network-idle"));
        assert!(script.contains("now - quietSince >= 500"));
        assert!(script.contains("now - started >= 15000"));
    }

    #[test]
    fn content_check_embeds_markers() {
        let script = content_check(&["Loading...".to_string()]);
        assert!(script.ends_with(r#"})(["Loading..."])"#));
    }
}
