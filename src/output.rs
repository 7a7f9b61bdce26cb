//! Result types handed back to callers.
//!
//! Everything here is plain data: constructed once by the response pipeline,
//! never mutated afterwards, and serialisable so front ends can print it as
//! JSON or ship it across a channel.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One word (or phrase) the model annotated.
///
/// Every text field is present; fields the model left out are empty strings.
/// Identity is positional: the n-th record of a response, nothing more.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordAnnotation {
    /// The word in its original script.
    pub word: String,
    /// Dictionary translation.
    pub literal_translation: String,
    /// Meaning in this particular sentence.
    pub contextual_meaning: String,
    /// The sentence or phrase the word appears in.
    pub sentence_context: String,
    /// Grammar notes; only word lookups ask for these.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grammar_notes: Option<String>,
}

static RE_WIKIPEDIA_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https://[a-z\-]+\.wikipedia\.org/wiki/[^\s<>".!?,:;]+"#).unwrap()
});

impl WordAnnotation {
    /// Wikipedia links the model put in the contextual meaning, in order of
    /// appearance, without trailing sentence punctuation.
    pub fn reference_links(&self) -> Vec<&str> {
        RE_WIKIPEDIA_URL
            .find_iter(&self.contextual_meaning)
            .map(|m| m.as_str())
            .collect()
    }
}

/// Whole-page synthesis the model adds for poem or song pages.
///
/// Kept apart from the word list so it is never counted or rendered as a word.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    /// Short heading, e.g. "Poem Summary".
    pub title: String,
    /// Theme, message, and overall meaning of the page.
    pub summary: String,
    /// Full text of the poem/song as it appears on the page.
    pub full_text: String,
}

/// Raw model answer for one request. Transient.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelResponse {
    /// Concatenated text of every returned part.
    pub text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl ModelResponse {
    pub fn usage(&self) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
        }
    }
}

/// Token counts reported by the endpoint (0 when it omits them).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Output of the response pipeline, before it is attached to a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedAnnotations {
    /// Records in the order the model emitted them, summary excluded.
    pub words: Vec<WordAnnotation>,
    pub page_summary: Option<PageSummary>,
    /// The response was cut short and trailing incomplete records were
    /// dropped; the list may be missing entries.
    pub truncated: bool,
}

/// Result of analysing one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageAnalysis {
    pub document: PathBuf,
    /// 1-indexed.
    pub page_number: usize,
    pub words: Vec<WordAnnotation>,
    pub page_summary: Option<PageSummary>,
    pub truncated: bool,
    pub usage: TokenUsage,
    pub duration_ms: u64,
}

impl PageAnalysis {
    /// File name for status lines ("lesson3.pdf - Page 12").
    pub fn document_name(&self) -> String {
        self.document
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.document.display().to_string())
    }
}

/// Result of looking up a single word.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordLookup {
    /// The text that was looked up.
    pub query: String,
    /// `None` when the model answered with an empty array.
    pub annotation: Option<WordAnnotation>,
    pub truncated: bool,
    pub usage: TokenUsage,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_links_strip_trailing_punctuation() {
        let w = WordAnnotation {
            contextual_meaning: "Famous Tamil poet. Learn more: https://en.wikipedia.org/wiki/Thiruvalluvar. \
                Also https://ta.wikipedia.org/wiki/Kambar, and nothing else"
                .into(),
            ..Default::default()
        };
        assert_eq!(
            w.reference_links(),
            vec![
                "https://en.wikipedia.org/wiki/Thiruvalluvar",
                "https://ta.wikipedia.org/wiki/Kambar"
            ]
        );
    }

    #[test]
    fn no_links_in_plain_meaning() {
        let w = WordAnnotation {
            contextual_meaning: "a greeting".into(),
            ..Default::default()
        };
        assert!(w.reference_links().is_empty());
    }

    #[test]
    fn grammar_notes_omitted_when_absent() {
        let w = WordAnnotation {
            word: "நான்".into(),
            ..Default::default()
        };
        let json = serde_json::to_string(&w).unwrap();
        assert!(!json.contains("grammar_notes"));
    }

    #[test]
    fn document_name_uses_file_name() {
        let a = PageAnalysis {
            document: PathBuf::from("/home/u/books/lesson3.pdf"),
            page_number: 12,
            words: vec![],
            page_summary: None,
            truncated: false,
            usage: TokenUsage::default(),
            duration_ms: 0,
        };
        assert_eq!(a.document_name(), "lesson3.pdf");
    }
}
