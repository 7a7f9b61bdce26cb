//! Response extraction: isolate the JSON payload inside the model's text.
//!
//! Even when told to "return ONLY a JSON array", models wrap the answer in
//! ```` ```json ```` fences, open with "Sure! Here's the analysis:", or sign off
//! with a closing remark. Extraction assumes the payload runs from the first
//! `[`/`{` to the last `]`/`}`. That holds for any well-formed payload; it
//! only misfires when prose outside the JSON itself contains brackets, and
//! such responses are left for the parser to reject.

use crate::error::ParseError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Opening code fence with an optional language tag (```` ```json ````).
static RE_OPENING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[A-Za-z0-9_+.\-]*").unwrap());

const FENCE: &str = "```";

/// Return the best-effort JSON substring of `raw`.
///
/// 1. Trim surrounding whitespace.
/// 2. If the text opens with a code fence, keep what lies between it and the
///    next fence (or everything after it when the fence is never closed).
/// 3. Drop everything before the first `[` or `{`.
/// 4. Drop everything after the last `]` or `}`.
///
/// The result borrows from `raw`. Fails with [`ParseError::NoJsonFound`] when
/// no opening bracket exists at all.
pub fn extract_json(raw: &str) -> Result<&str, ParseError> {
    let text = strip_fence(raw.trim());

    let start = text.find(['[', '{']).ok_or(ParseError::NoJsonFound)?;
    let text = &text[start..];

    // Truncated payloads may have no closer at all; keep them whole for the
    // repairer.
    let end = text.rfind([']', '}']).map_or(text.len(), |i| i + 1);
    Ok(&text[..end])
}

fn strip_fence(text: &str) -> &str {
    match RE_OPENING_FENCE.find(text) {
        Some(open) => {
            let body = &text[open.end()..];
            let body = match body.find(FENCE) {
                Some(close) => &body[..close],
                None => body,
            };
            body.trim()
        }
        None => text,
    }
}
