//! Pipeline stages for turning a PDF page into word annotations.
//!
//! Each submodule implements exactly one step, so each is independently
//! testable and replaceable.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ llm/gemini ──▶ extract ──▶ repair? ──▶ normalize
//! (path)    (pdfium)   (base64)   (model call)   (fences)    (truncation) (records)
//! ```
//!
//! 1. [`input`]: resolve the viewer-reported document to a local PDF
//! 2. [`render`]: rasterise one page; pdfium is blocking, so it runs in
//!    `spawn_blocking`
//! 3. [`encode`]: JPEG/PNG-encode and base64-wrap the page image
//! 4. [`llm`] / [`gemini`]: the only stages with network I/O
//! 5. [`extract`], [`repair`], [`normalize`]: the response pipeline. Pure,
//!    synchronous, no shared state. [`parse_model_text`] runs all three.

pub mod encode;
pub mod extract;
pub mod gemini;
pub mod input;
pub mod llm;
pub mod normalize;
pub mod render;
pub mod repair;

use crate::error::{excerpt, ParseError};
use crate::output::ParsedAnnotations;
use serde_json::Value;
use std::borrow::Cow;
use tracing::{debug, warn};

/// Turn raw model text into annotation records.
///
/// Extract the JSON payload, parse it, and, only when parsing fails, attempt
/// truncation repair. The result has `truncated = true` only when repair had
/// to drop an incomplete record; trailing prose after a closed array is
/// discarded silently.
pub fn parse_model_text(raw: &str) -> Result<ParsedAnnotations, ParseError> {
    let extracted = extract::extract_json(raw)?;
    let extracted = decode_escaped_structure(extracted);
    let text = extracted.as_ref();

    match serde_json::from_str::<Value>(text) {
        Ok(value) => normalize::normalize(value),
        Err(parse_err) => {
            debug!("Model JSON does not parse ({}); attempting repair", parse_err);

            let repaired = repair::repair_truncated(text)
                .ok_or_else(|| unrecoverable(&parse_err, text))?;
            let value: Value =
                serde_json::from_str(&repaired.text).map_err(|e| unrecoverable(&e, text))?;

            let mut parsed = normalize::normalize(value)?;
            if repaired.dropped_records {
                parsed.truncated = true;
                warn!(
                    "Model output was truncated; salvaged {} complete records ({} of {} bytes kept)",
                    parsed.words.len() + usize::from(parsed.page_summary.is_some()),
                    repaired.text.len(),
                    text.len()
                );
            } else {
                debug!("Dropped {} bytes after the closed array", text.len() - repaired.text.len());
            }
            Ok(parsed)
        }
    }
}

fn unrecoverable(err: &serde_json::Error, text: &str) -> ParseError {
    ParseError::UnrecoverableJson {
        reason: err.to_string(),
        excerpt: excerpt(text),
    }
}

/// Some responses entity-escape the JSON quotes themselves
/// (`[{&quot;tamil_word&quot;: …}]`). Decode the whole payload only in that
/// case; decoding well-formed JSON would turn `&quot;` inside a value into a
/// bare quote and break it.
fn decode_escaped_structure(text: &str) -> Cow<'_, str> {
    if !text.contains('"') && text.contains("&quot;") {
        normalize::decode_entities(text)
    } else {
        Cow::Borrowed(text)
    }
}
