//! Truncation repair for JSON arrays the model did not finish.
//!
//! The common failure is the output-token ceiling: a 60-word page produces
//! more JSON than `maxOutputTokens` allows and the text simply stops
//! mid-record. Repair salvages the records that were completed and drops the
//! rest. It never completes a half-written object or invents missing fields,
//! so every record it keeps is exactly what the model wrote.
//!
//! The scan is string-aware: brackets and braces inside JSON string values
//! (a sentence quoting "[1]", say) do not count as structure.

/// Outcome of a successful repair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repaired {
    /// The salvaged JSON array.
    pub text: String,
    /// True when an incomplete trailing element was cut off; false when only
    /// text after the closed array was dropped.
    pub dropped_records: bool,
}

/// Truncate `text` to its longest prefix of complete top-level array
/// elements and close the array.
///
/// * If the top-level array was closed but is followed by trailing junk, keep
///   the text up to and including that `]`.
/// * Otherwise keep the text up to and including the `}` that closed the last
///   complete element and append `]`.
///
/// Returns `None` when there is nothing to salvage: the text is not an array,
/// the array closes at the very end (so truncation is not the problem), or
/// no element was ever completed.
pub fn repair_truncated(text: &str) -> Option<Repaired> {
    let text = text.trim();
    if !text.starts_with('[') {
        return None;
    }

    let bounds = scan_top_level(text);

    if let Some(close) = bounds.array_close {
        if close + 1 == text.len() {
            return None;
        }
        return Some(Repaired {
            text: text[..=close].to_string(),
            dropped_records: false,
        });
    }

    bounds.last_element_close.map(|close| {
        let mut repaired = String::with_capacity(close + 2);
        repaired.push_str(&text[..=close]);
        repaired.push(']');
        Repaired {
            text: repaired,
            dropped_records: true,
        }
    })
}

#[derive(Debug, Default, PartialEq, Eq)]
struct TopLevelBounds {
    /// Byte offset of the `]` closing the outer array.
    array_close: Option<usize>,
    /// Byte offset of the `}` closing the last complete outer element.
    last_element_close: Option<usize>,
}

/// Walk `text` (which starts with `[`) tracking string state and nesting
/// depth. Depth 1 is "directly inside the outer array".
fn scan_top_level(text: &str) -> TopLevelBounds {
    let mut bounds = TopLevelBounds::default();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in text.bytes().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'[' | b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 1 {
                    bounds.last_element_close = Some(i);
                }
            }
            b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    bounds.array_close = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }

    bounds
}
