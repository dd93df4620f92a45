//! Two-pass translation stage
//!
//! Pass 1 asks for a literal, line-faithful translation. Pass 2 edits that
//! output for grammar and flow without touching its structure. Neither pass
//! is retried; a failed pass degrades the result instead of failing it.

use crate::translate::client::LlmClient;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

const LITERAL_SYSTEM_PROMPT: &str = "\
You are an expert translator of Chinese web novels into English.
Your task is to translate the provided text LINE-BY-LINE.

STRICT RULES:
1. NO summarizing: translate every single sentence. Do not combine or skip paragraphs.
2. NO retelling: do not change the perspective or tense unless grammar requires it.
3. Fidelity: adhere strictly to the original meaning. Do not add filler or creative writing.
4. Format: keep the line breaks of the source text.
5. Terms: adapt terminology to the genre of the text (modern, historical or fantasy).

Example input:
\"师父，徒儿知道做个孤魂野鬼不好受。\"

Example output:
\"Master, your disciple knows that being a wandering ghost is not easy to bear.\"

Translate the following text accurately:
/no_think";

const POLISH_SYSTEM_PROMPT: &str = "\
You are an expert English editor.
Your task is to polish the following English text, which was translated from Chinese.

STRICT RULES:
1. Grammar: fix grammatical errors, typos and awkward phrasing.
2. Flow: make the text read naturally in English.
3. Fidelity: do NOT add new content or remove existing meaning. Only polish the expression.
4. Consistency: keep terminology consistent, including capitalized terms.
5. Format: PRESERVE the paragraph structure (double newlines).

Polish the following text:
/no_think";

const LITERAL_PREFIX: &str = "Translate the following text line-by-line:";
const POLISH_PREFIX: &str = "Correct the grammar and improve the flow of this translation:";

/// Inline reasoning some local models emit despite `/no_think`
static REASONING_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());

/// How far through the pipeline a text made it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationQuality {
    /// Both passes succeeded
    Polished,
    /// Pass 2 failed; the literal translation is returned
    Literal,
    /// Pass 1 failed; the input is returned unchanged
    Untranslated,
}

impl TranslationQuality {
    /// Which pass failed, for logs and incident reports
    pub fn failed_stage(&self) -> Option<&'static str> {
        match self {
            Self::Polished => None,
            Self::Literal => Some("polish pass failed"),
            Self::Untranslated => Some("literal pass failed"),
        }
    }
}

/// Best available text plus how it was produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub text: String,
    pub quality: TranslationQuality,
}

/// Removes reasoning blocks and surrounding whitespace from model output
pub fn strip_reasoning(raw: &str) -> String {
    REASONING_BLOCK.replace_all(raw, "").trim().to_string()
}

/// Translates text through the two-pass pipeline
#[derive(Clone)]
pub struct Translator {
    client: Arc<dyn LlmClient>,
}

impl Translator {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// Translates `text`, never failing
    ///
    /// If pass 1 fails the input comes back unchanged; if pass 2 fails the
    /// pass 1 output comes back. Empty model output counts as a failure.
    pub async fn translate(&self, text: &str) -> Translation {
        debug!("Pass 1: literal translation ({} chars)", text.chars().count());
        let Some(literal) = self
            .run_pass(LITERAL_SYSTEM_PROMPT, LITERAL_PREFIX, text)
            .await
        else {
            return Translation {
                text: text.to_string(),
                quality: TranslationQuality::Untranslated,
            };
        };

        debug!("Pass 2: polish ({} chars)", literal.chars().count());
        match self
            .run_pass(POLISH_SYSTEM_PROMPT, POLISH_PREFIX, &literal)
            .await
        {
            Some(polished) => Translation {
                text: polished,
                quality: TranslationQuality::Polished,
            },
            None => Translation {
                text: literal,
                quality: TranslationQuality::Literal,
            },
        }
    }

    async fn run_pass(&self, system_prompt: &str, prefix: &str, text: &str) -> Option<String> {
        let user_text = format!("{}\n\n{}", prefix, text);
        match self.client.complete(system_prompt, &user_text).await {
            Ok(raw) => {
                let cleaned = strip_reasoning(&raw);
                if cleaned.is_empty() {
                    warn!("LLM returned no usable text");
                    None
                } else {
                    Some(cleaned)
                }
            }
            Err(e) => {
                warn!("LLM request failed: {}", e);
                None
            }
        }
    }
}
