//! Translation stage
//!
//! Chapter text goes through a local LLM in two passes. The client and the
//! pipeline are separate so tests and alternative backends can plug in their
//! own [`LlmClient`].

mod client;
mod translator;

pub use client::{completions_endpoint, LlmClient, LlmError, OpenAiCompatClient};
pub use translator::{strip_reasoning, Translation, TranslationQuality, Translator};
