//! Record normalisation: parsed JSON → [`WordAnnotation`]s.
//!
//! The top-level shape is resolved exactly once, into [`RecordSet`]. After
//! that every record is read field-by-field with an empty-string default, so
//! a model that forgets `sentence_context` on one word costs that one field,
//! not the whole page. Only a wholly wrong shape (a bare number, a string, an
//! array of strings) is an error.
//!
//! This is also where the page-summary sentinel is translated: a record whose
//! word is [`PAGE_SUMMARY_SENTINEL`] becomes [`ParsedAnnotations::page_summary`]
//! and never appears in the word list.

use crate::error::ParseError;
use crate::output::{PageSummary, ParsedAnnotations, WordAnnotation};
use crate::prompts::PAGE_SUMMARY_SENTINEL;
use serde_json::{Map, Value};
use std::borrow::Cow;
use tracing::debug;

/// JSON keys of the model output contract.
mod keys {
    pub const WORD: &str = "tamil_word";
    pub const LITERAL: &str = "literal_translation";
    pub const CONTEXTUAL: &str = "contextual_meaning";
    pub const SENTENCE: &str = "sentence_context";
    pub const GRAMMAR: &str = "grammar_notes";
}

/// The two accepted top-level shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordSet {
    /// Page analysis: an array of record objects.
    Many(Vec<Map<String, Value>>),
    /// Word lookup: a single record object.
    One(Map<String, Value>),
}

impl TryFrom<Value> for RecordSet {
    type Error = ParseError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(record) => Ok(RecordSet::One(record)),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::Object(record) => Ok(record),
                    other => Err(ParseError::UnexpectedShape {
                        found: format!("array element {i} of type {}", json_type(&other)),
                    }),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(RecordSet::Many),
            other => Err(ParseError::UnexpectedShape {
                found: json_type(&other).to_string(),
            }),
        }
    }
}

impl RecordSet {
    fn into_records(self) -> Vec<Map<String, Value>> {
        match self {
            RecordSet::Many(records) => records,
            RecordSet::One(record) => vec![record],
        }
    }
}

/// Map a parsed JSON value to annotation records, in input order.
pub fn normalize(value: Value) -> Result<ParsedAnnotations, ParseError> {
    let records = RecordSet::try_from(value)?.into_records();

    let mut words = Vec::with_capacity(records.len());
    let mut page_summary = None;

    for record in &records {
        let annotation = read_record(record);
        if annotation.word.trim() == PAGE_SUMMARY_SENTINEL {
            if page_summary.is_some() {
                debug!("Multiple page summaries in response; keeping the last");
            }
            page_summary = Some(PageSummary {
                title: annotation.literal_translation,
                summary: annotation.contextual_meaning,
                full_text: annotation.sentence_context,
            });
        } else {
            words.push(annotation);
        }
    }

    Ok(ParsedAnnotations {
        words,
        page_summary,
        truncated: false,
    })
}

fn read_record(record: &Map<String, Value>) -> WordAnnotation {
    WordAnnotation {
        word: text_field(record, keys::WORD).unwrap_or_default(),
        literal_translation: text_field(record, keys::LITERAL).unwrap_or_default(),
        contextual_meaning: text_field(record, keys::CONTEXTUAL).unwrap_or_default(),
        sentence_context: text_field(record, keys::SENTENCE).unwrap_or_default(),
        grammar_notes: text_field(record, keys::GRAMMAR),
    }
}

/// A string field with HTML entities decoded; `None` when absent or not a
/// string.
fn text_field(record: &Map<String, Value>, key: &str) -> Option<String> {
    record
        .get(key)
        .and_then(Value::as_str)
        .map(|s| decode_entities(s).into_owned())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Decode HTML entities models sometimes emit inside string values
/// (`&quot;`, `&amp;`, `&#39;`, …).
#[cfg(feature = "html-entities")]
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    html_escape::decode_html_entities(text)
}

/// Decode the four common HTML entities. `&amp;` goes last so `&amp;lt;`
/// decodes once, to `&lt;`.
#[cfg(not(feature = "html-entities"))]
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    Cow::Owned(
        text.replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&amp;", "&"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_fields_default_to_empty() {
        let out = normalize(json!({"tamil_word": "நான்"})).unwrap();
        assert_eq!(out.words.len(), 1);
        let w = &out.words[0];
        assert_eq!(w.word, "நான்");
        assert_eq!(w.literal_translation, "");
        assert_eq!(w.contextual_meaning, "");
        assert_eq!(w.sentence_context, "");
        assert_eq!(w.grammar_notes, None);
    }

    #[test]
    fn non_text_fields_default_to_empty() {
        let out = normalize(json!([{"tamil_word": 7, "literal_translation": null, "sentence_context": ["x"]}])).unwrap();
        assert_eq!(out.words[0], WordAnnotation::default());
    }

    #[test]
    fn array_preserves_order_and_length() {
        let out = normalize(json!([
            {"tamil_word": "அ"},
            {"tamil_word": "ஆ"},
            {"tamil_word": "அ"}
        ]))
        .unwrap();
        let words: Vec<_> = out.words.iter().map(|w| w.word.as_str()).collect();
        assert_eq!(words, ["அ", "ஆ", "அ"]);
    }

    #[test]
    fn empty_array_is_empty_result() {
        let out = normalize(json!([])).unwrap();
        assert!(out.words.is_empty());
        assert!(out.page_summary.is_none());
    }

    #[test]
    fn scalars_are_unexpected_shape() {
        for v in [json!(42), json!("hello"), json!(true), Value::Null] {
            assert!(matches!(normalize(v), Err(ParseError::UnexpectedShape { .. })));
        }
    }

    #[test]
    fn array_of_non_objects_is_unexpected_shape() {
        let err = normalize(json!([{"tamil_word": "அ"}, "ஆ"])).unwrap_err();
        assert_eq!(
            err,
            ParseError::UnexpectedShape {
                found: "array element 1 of type string".into()
            }
        );
    }

    #[test]
    fn sentinel_becomes_page_summary() {
        let out = normalize(json!([
            {"tamil_word": "நிலா", "literal_translation": "moon"},
            {
                "tamil_word": "POEM_SUMMARY",
                "literal_translation": "Poem Summary",
                "contextual_meaning": "A lullaby about the moon",
                "sentence_context": "நிலா நிலா ஓடி வா"
            }
        ]))
        .unwrap();
        assert_eq!(out.words.len(), 1);
        assert_eq!(out.words[0].word, "நிலா");
        let summary = out.page_summary.unwrap();
        assert_eq!(summary.title, "Poem Summary");
        assert_eq!(summary.summary, "A lullaby about the moon");
        assert_eq!(summary.full_text, "நிலா நிலா ஓடி வா");
    }

    #[test]
    fn lookup_object_keeps_grammar_notes() {
        let out = normalize(json!({
            "tamil_word": "படித்தான்",
            "literal_translation": "read",
            "grammar_notes": "past tense, masculine singular"
        }))
        .unwrap();
        assert_eq!(
            out.words[0].grammar_notes.as_deref(),
            Some("past tense, masculine singular")
        );
    }

    #[test]
    fn entities_in_values_are_decoded() {
        let out = normalize(json!({
            "tamil_word": "அம்மா",
            "contextual_meaning": "&quot;mother&quot; &amp; carer &lt;noun&gt;"
        }))
        .unwrap();
        assert_eq!(out.words[0].contextual_meaning, "\"mother\" & carer <noun>");
    }

    #[test]
    fn amp_decodes_only_once() {
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
        assert_eq!(decode_entities("plain"), "plain");
    }
}
