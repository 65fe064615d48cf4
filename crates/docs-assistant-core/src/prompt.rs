//! Answer synthesis prompts and the low-confidence fallback text.
//!
//! The system directive restricts the model to the supplied passages and
//! requires `[n]` citation markers. Passages are numbered from 1 in the
//! order given; that numbering is what [`crate::citation`] binds back to.

use crate::citation::truncate_with_ellipsis;
use crate::generation::{ChatMessage, GenerationRequest};
use crate::models::Candidate;

/// Opening sentence of the low-confidence fallback answer.
pub const LOW_CONFIDENCE_LEAD: &str = "I found some potentially relevant sections, but I'm not confident they fully answer your question. Here are the closest matches:";

/// Closing suggestion of the low-confidence fallback answer.
pub const LOW_CONFIDENCE_CLOSING: &str =
    "Please review these sections or try rephrasing your question for better results.";

/// Maximum characters of passage text per fallback entry.
pub const FALLBACK_SNIPPET_CHARS: usize = 300;

/// Knobs for building a generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisSettings {
    /// Product named in the system directive (e.g. `"grandMA3"`).
    pub product_name: String,
    /// Code blocks included per passage.
    pub max_code_blocks: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            product_name: "grandMA3".to_string(),
            max_code_blocks: 2,
            temperature: 0.1,
            max_tokens: 1500,
        }
    }
}

pub fn system_directive(product_name: &str, version: &str) -> String {
    format!(
        "You are a precise assistant for {product} documentation version {version}.\n\
         Your task is to answer questions using ONLY the provided documentation passages.\n\
         \n\
         Rules:\n\
         1. Use only information from the provided passages\n\
         2. Include citations [1], [2], etc. for each fact\n\
         3. Quote exact command syntax in code blocks\n\
         4. If information is incomplete, say so clearly\n\
         5. Never guess or make up information",
        product = product_name,
        version = version,
    )
}

/// Render passages as the numbered context block shown to the model.
pub fn format_context(passages: &[Candidate], max_code_blocks: usize) -> String {
    passages
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let p = &c.passage;
            let mut entry = format!(
                "[{}] {} - {}\nURL: {}\n---\n{}",
                i + 1,
                p.title,
                p.section(),
                p.url,
                p.text
            );
            if max_code_blocks > 0 && !p.code_blocks.is_empty() {
                entry.push_str("\n\nCode examples:\n");
                for code in p.code_blocks.iter().take(max_code_blocks) {
                    entry.push_str(&format!("```\n{}\n```\n", code));
                }
            }
            entry
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the generation request for `query` over `passages`.
pub fn synthesis_request(
    query: &str,
    version: &str,
    passages: &[Candidate],
    settings: &SynthesisSettings,
) -> GenerationRequest {
    let context = format_context(passages, settings.max_code_blocks);
    GenerationRequest {
        system: system_directive(&settings.product_name, version),
        messages: vec![ChatMessage::user(format!(
            "Question: {}\n\nDocumentation passages:\n{}\n\nAnswer the question using only these passages. Include citations.",
            query, context
        ))],
        temperature: settings.temperature,
        max_tokens: settings.max_tokens,
    }
}

/// The deterministic answer returned when the confidence gate fails.
pub fn low_confidence_answer(passages: &[Candidate]) -> String {
    let mut answer = format!("{}\n\n", LOW_CONFIDENCE_LEAD);
    for (i, c) in passages.iter().enumerate() {
        answer.push_str(&format!(
            "[{}] {} - {}\n{}\n\n",
            i + 1,
            c.passage.title,
            c.passage.section(),
            truncate_with_ellipsis(&c.passage.text, FALLBACK_SNIPPET_CHARS)
        ));
    }
    answer.push('\n');
    answer.push_str(LOW_CONFIDENCE_CLOSING);
    answer
}
