//! Prompt templates and the prompt builder.
//!
//! Both built-in templates tell the model to answer with nothing but JSON:
//! an array of records for a page, a single object for a word lookup. The
//! model does not always comply, which is what [`crate::pipeline`] is for.
//!
//! Callers can override either template via
//! [`crate::config::AssistantConfig`]; the constants here are used only when
//! no override is provided.

use crate::error::TemplateError;
use crate::pipeline::encode::EncodedImage;

/// Placeholder the word-lookup template must contain.
pub const WORD_PLACEHOLDER: &str = "{word}";

/// Word value the page template asks the model to use for its page summary.
pub const PAGE_SUMMARY_SENTINEL: &str = "POEM_SUMMARY";

/// Default page-analysis prompt.
pub const PAGE_ANALYSIS_PROMPT: &str = r#"Analyze this Tamil language learning page. For EVERY Tamil word visible:

Context:
1. The reader is a young learner with limited Tamil knowledge who reads English fluently.
2. The page comes from a first-grade Tamil textbook.

Extract and provide:
1. Tamil word (in Tamil script)
2. Literal/dictionary translation to English
3. Contextual meaning based on usage in the sentence
4. The sentence/phrase where it appears
5. There may be handwritten words instead of printed words. Identify them and provide the contextual meaning.

Exception:
1. Sometimes the page will be only pictures with no words (or very few words).
Gather as much information as the picture(s) convey and provide a hypothetical narration.

Return ONLY a JSON array with this exact structure:
[
  {
    "tamil_word": "தமிழ்",
    "literal_translation": "Tamil",
    "contextual_meaning": "refers to Tamil language in this context",
    "sentence_context": "the full sentence where this word appears"
  }
]

CRITICAL RULES:
- Include ALL Tamil words on the page
- Be precise with contextual meanings
- Look for a pattern across the entire page, such as a poem or a song.
- If this page contains a poem or song, add a special entry at the END of the JSON array:
  {
    "tamil_word": "POEM_SUMMARY",
    "literal_translation": "Poem Summary",
    "contextual_meaning": "Complete summary of the poem including theme, message, cultural significance, and overall meaning",
    "sentence_context": "Full text of the poem in Tamil"
  }
- For famous Tamil personalities, poets, scholars, divine entities, orators, or historical figures mentioned, add Wikipedia links in contextual_meaning like: "Famous Tamil poet. Learn more: https://en.wikipedia.org/wiki/[Name]"
- Add grammar notes in contextual_meaning if relevant
- Return ONLY the JSON array
- Do NOT wrap in markdown code blocks
- Do NOT add any text before or after the JSON
- Start directly with [ and end with ]"#;

/// Default word-lookup prompt. `{word}` is replaced with the looked-up text.
pub const WORD_LOOKUP_PROMPT: &str = r#"In this Tamil text image, focus on the word or phrase: "{word}"

Provide detailed analysis:
1. Literal/dictionary meaning
2. Contextual meaning in this specific sentence
3. Grammar notes (verb form, case, tense, etc.)
4. The full sentence where it appears
5. If this refers to a Tamil personality, poet, scholar, author, divine entity, orator, historical figure, or a person's name, include a Wikipedia link

Return ONLY a JSON object with this exact structure:
{
  "tamil_word": "{word}",
  "literal_translation": "...",
  "contextual_meaning": "...",
  "sentence_context": "...",
  "grammar_notes": "..."
}

CRITICAL RULES:
- For identified personalities, add Wikipedia links in contextual_meaning like: "Famous Tamil poet. Learn more: https://en.wikipedia.org/wiki/[Name]"
- Return ONLY the JSON object
- Do NOT wrap in markdown code blocks
- Do NOT add any text before or after
- Start directly with { and end with }"#;

/// Prompt used by the connection check. Text only, no image.
pub const CONNECTION_TEST_PROMPT: &str = "Say 'API is working!' in one sentence.";

/// What the model is being asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode<'a> {
    /// Annotate every word on the page; expects a JSON array back.
    PageAnalysis,
    /// Explain one word in the context of the page; expects a JSON object.
    WordLookup { word: &'a str },
}

/// The two templates in effect for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplates {
    pub page_analysis: String,
    pub word_lookup: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            page_analysis: PAGE_ANALYSIS_PROMPT.to_string(),
            word_lookup: WORD_LOOKUP_PROMPT.to_string(),
        }
    }
}

/// Instruction text plus the page image to attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequest {
    pub prompt: String,
    pub image: Option<EncodedImage>,
    pub max_output_tokens: u32,
}

impl PromptTemplates {
    /// Build the instruction text for `mode`.
    ///
    /// Every occurrence of [`WORD_PLACEHOLDER`] is substituted. The template
    /// is otherwise used verbatim: its JSON braces are not format directives.
    pub fn render(&self, mode: PromptMode<'_>) -> Result<String, TemplateError> {
        match mode {
            PromptMode::PageAnalysis => Ok(self.page_analysis.clone()),
            PromptMode::WordLookup { word } => {
                let word = word.trim();
                if word.is_empty() {
                    return Err(TemplateError::EmptyWord);
                }
                if !self.word_lookup.contains(WORD_PLACEHOLDER) {
                    return Err(TemplateError::MissingPlaceholder {
                        placeholder: WORD_PLACEHOLDER,
                    });
                }
                Ok(self.word_lookup.replace(WORD_PLACEHOLDER, word))
            }
        }
    }

    /// Build a complete request: rendered prompt, attached image, and the
    /// output-token ceiling for this kind of request.
    pub fn build_request(
        &self,
        mode: PromptMode<'_>,
        image: EncodedImage,
        max_output_tokens: u32,
    ) -> Result<ModelRequest, TemplateError> {
        Ok(ModelRequest {
            prompt: self.render(mode)?,
            image: Some(image),
            max_output_tokens,
        })
    }
}
