//! Context-block rendering and prompt composition.
//!
//! Retrieved documents become a bounded, human-readable block inside the
//! system prompt: each fact under a label for its document type, annotated
//! with category/year when present, plus the similarity score. When
//! nothing was retrieved, the block says so explicitly — the engine never
//! pretends to have context it doesn't.

use std::fmt::Write as _;

use crate::models::KnowledgeDocument;

/// System prompt used when the caller supplies none.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a personal financial advisor. \
Answer using the user's stored facts when they are provided, and keep \
explanations concrete and easy to follow.";

/// Marker rendered in place of the context block when retrieval found
/// nothing relevant.
pub const NO_CONTEXT_MARKER: &str =
    "No relevant stored facts were found for this question.";

/// Grounding rules appended after the context block.
pub const GROUNDING_RULES: &str = "Rules:\n\
- Use only the stored facts provided above; never invent facts about the user.\n\
- If the stored facts do not contain what you need, say so and ask for the \
missing information instead of guessing.\n\
- When an answer depends on a specific stored fact, say which one.";

/// Render retrieved documents into a context block.
///
/// Empty input renders the explicit [`NO_CONTEXT_MARKER`].
pub fn render_context(documents: &[KnowledgeDocument]) -> String {
    if documents.is_empty() {
        return NO_CONTEXT_MARKER.to_string();
    }

    let mut out = String::from("Relevant stored facts about the user:\n");
    for doc in documents {
        let meta = &doc.metadata;
        out.push_str("\n### ");
        out.push_str(meta.doc_type.label());

        let mut notes: Vec<String> = Vec::new();
        if let Some(category) = &meta.category {
            notes.push(category.clone());
        }
        if let Some(year) = meta.year {
            notes.push(year.to_string());
        }
        if !notes.is_empty() {
            let _ = write!(out, " [{}]", notes.join(", "));
        }

        let _ = writeln!(out, " (similarity {:.0}%)", f64::from(doc.similarity) * 100.0);
        out.push_str(doc.content.trim());
        out.push('\n');
    }
    out
}

/// Compose the final system instruction: caller override (or the default
/// prompt), then the context block, then the grounding rules.
pub fn compose_system_prompt(override_prompt: Option<&str>, context_block: &str) -> String {
    format!(
        "{}\n\n{}\n\n{}",
        override_prompt.unwrap_or(DEFAULT_SYSTEM_PROMPT),
        context_block,
        GROUNDING_RULES
    )
}
