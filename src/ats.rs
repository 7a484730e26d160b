//! ATS text normalization
//!
//! Applicant tracking systems choke on typographic punctuation. This maps
//! smart quotes, dashes, bullets and exotic spaces to ASCII and collapses
//! whitespace. The mapping is lossy and one-way.

use log::info;

use crate::{scripts, Engine, Result};

/// Replacement table shared by the Rust and in-page normalizers
pub const ATS_REPLACEMENTS: &[(char, &str)] = &[
    // single quotes and primes
    ('\u{2018}', "'"),
    ('\u{2019}', "'"),
    ('\u{201A}', "'"),
    ('\u{201B}', "'"),
    ('\u{2032}', "'"),
    // double quotes
    ('\u{201C}', "\""),
    ('\u{201D}', "\""),
    ('\u{201E}', "\""),
    ('\u{201F}', "\""),
    ('\u{2033}', "\""),
    // dashes and minus
    ('\u{2010}', "-"),
    ('\u{2011}', "-"),
    ('\u{2012}', "-"),
    ('\u{2013}', "-"),
    ('\u{2014}', "-"),
    ('\u{2015}', "-"),
    ('\u{2212}', "-"),
    // bullets
    ('\u{2022}', "-"),
    ('\u{2023}', "-"),
    ('\u{2043}', "-"),
    ('\u{2219}', "-"),
    ('\u{25E6}', "-"),
    ('\u{2026}', "..."),
    // spaces
    ('\u{00A0}', " "),
    ('\u{2007}', " "),
    ('\u{2009}', " "),
    ('\u{200A}', " "),
    ('\u{202F}', " "),
];

fn replacement(ch: char) -> Option<&'static str> {
    ATS_REPLACEMENTS
        .iter()
        .find(|(from, _)| *from == ch)
        .map(|(_, to)| *to)
}

/// Apply [`ATS_REPLACEMENTS`] and collapse whitespace runs to one space.
///
/// Idempotent: `normalize_text_for_ats(normalize_text_for_ats(s)) == normalize_text_for_ats(s)`.
pub fn normalize_text_for_ats(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    let mut push = |c: char, out: &mut String| {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    };
    for ch in text.chars() {
        match replacement(ch) {
            Some(to) => to.chars().for_each(|c| push(c, &mut out)),
            None => push(ch, &mut out),
        }
    }
    out
}

/// The table as `[[char, replacement], ..]` JSON for the page script
pub fn replacement_table_json() -> String {
    let pairs: Vec<[String; 2]> = ATS_REPLACEMENTS
        .iter()
        .map(|(from, to)| [from.to_string(), to.to_string()])
        .collect();
    serde_json::json!(pairs).to_string()
}

/// Normalize every text node in the loaded page. Returns the number of
/// nodes that changed.
pub fn normalize_document_for_ats<E: Engine>(engine: &mut E) -> Result<u64> {
    let value = engine.evaluate_json(&scripts::normalize_ats(&replacement_table_json()))?;
    let changed = value.get("changed").and_then(|v| v.as_u64()).unwrap_or(0);
    info!("ATS normalization rewrote {} text nodes", changed);
    Ok(changed)
}
