//! Trust-budgeted context assembly.
//!
//! Chunks are taken in descending similarity order and formatted into one
//! context string. The total is capped by the [`ContextBudget`] the trust
//! tier selected; when a chunk has to be cut to fit, the cut prefers a
//! sentence boundary within a small tolerance so the model never sees a
//! mid-word fragment.

use crate::guards::ContextBudget;
use crate::pipeline::RetrievedChunk;

/// Shown when retrieval produced nothing usable.
pub const EMPTY_CONTEXT: &str = "No relevant documents found.";

#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub text: String,
    /// How many chunks made it into the context, at least partially.
    pub included_chunks: usize,
    /// Set when the budget forced a cut or dropped chunks entirely.
    pub truncated: bool,
}

/// Format sanitized chunks into a single budgeted context string.
///
/// Lengths are counted in characters, not bytes, matching how the budget
/// tiers are specified.
pub fn assemble(
    chunks: &[RetrievedChunk],
    budget: ContextBudget,
    truncation_tolerance: usize,
) -> AssembledContext {
    let mut ordered: Vec<&RetrievedChunk> = chunks.iter().collect();
    ordered.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut parts: Vec<String> = Vec::new();
    let mut used_chars = 0usize;
    let mut truncated = false;

    for chunk in ordered {
        let header = format!("[Source: {}, chunk {}]\n", chunk.source_id, chunk.chunk_index);
        let separator_chars = if parts.is_empty() { 0 } else { 2 };
        let header_chars = header.chars().count();

        let Some(body_limit) = budget
            .max_chars
            .checked_sub(used_chars + separator_chars + header_chars)
        else {
            truncated = true;
            break;
        };
        if body_limit == 0 {
            truncated = true;
            break;
        }

        let (body, cut) = cut_to_chars(&chunk.text, body_limit, truncation_tolerance);
        if body.is_empty() {
            truncated = true;
            break;
        }
        if cut {
            truncated = true;
        }

        used_chars += separator_chars + header_chars + body.chars().count();
        parts.push(format!("{header}{body}"));

        if cut {
            break;
        }
    }

    if parts.is_empty() {
        return AssembledContext {
            text: EMPTY_CONTEXT.to_string(),
            included_chunks: 0,
            truncated,
        };
    }

    AssembledContext {
        text: parts.join("\n\n"),
        included_chunks: parts.len(),
        truncated,
    }
}

/// Cut `text` to at most `max_chars` characters, preferring to end just
/// after a sentence terminator within `tolerance` characters of the limit.
/// Returns the kept prefix and whether anything was cut.
fn cut_to_chars(text: &str, max_chars: usize, tolerance: usize) -> (&str, bool) {
    let Some(limit_byte) = byte_at_char(text, max_chars) else {
        return (text, false); // whole text fits
    };

    let window_start_char = max_chars.saturating_sub(tolerance);
    let window_start_byte = byte_at_char(text, window_start_char).unwrap_or(limit_byte);

    if let Some(rel) = text[window_start_byte..limit_byte].rfind(['.', '!', '?']) {
        let end = window_start_byte + rel + 1;
        return (&text[..end], true);
    }

    (&text[..limit_byte], true)
}

/// Byte offset of the `n`th character, or `None` when the text has fewer
/// than `n + 1` characters (i.e. it fits within `n`).
fn byte_at_char(text: &str, n: usize) -> Option<usize> {
    text.char_indices().nth(n).map(|(byte, _)| byte)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guards::{BudgetTier, ContextBudget};

    fn budget(max_chars: usize) -> ContextBudget {
        ContextBudget {
            tier: BudgetTier::LowTrust,
            max_chars,
        }
    }

    fn chunk(text: &str, source: &str, index: usize, similarity: f64) -> RetrievedChunk {
        RetrievedChunk {
            text: text.to_string(),
            source_id: source.to_string(),
            chunk_index: index,
            similarity,
        }
    }

    #[test]
    fn chunks_are_formatted_with_source_headers() {
        let chunks = vec![chunk("Alpha text.", "a.txt", 0, 0.9)];
        let assembled = assemble(&chunks, budget(500), 120);
        assert_eq!(assembled.text, "[Source: a.txt, chunk 0]\nAlpha text.");
        assert_eq!(assembled.included_chunks, 1);
        assert!(!assembled.truncated);
    }

    #[test]
    fn higher_similarity_comes_first_regardless_of_input_order() {
        let chunks = vec![
            chunk("Second best.", "b.txt", 1, 0.4),
            chunk("Best match.", "a.txt", 0, 0.9),
        ];
        let assembled = assemble(&chunks, budget(500), 120);
        let best = assembled.text.find("Best match.").unwrap();
        let second = assembled.text.find("Second best.").unwrap();
        assert!(best < second);
        assert!(assembled.text.contains("\n\n[Source: b.txt, chunk 1]\n"));
    }

    #[test]
    fn budget_drops_lower_ranked_chunks() {
        let chunks = vec![
            chunk(&"x".repeat(80), "a.txt", 0, 0.9),
            chunk(&"y".repeat(80), "b.txt", 0, 0.5),
        ];
        // Room for the first chunk plus its header, nothing more.
        let assembled = assemble(&chunks, budget(110), 10);
        assert_eq!(assembled.included_chunks, 1);
        assert!(assembled.truncated);
        assert!(!assembled.text.contains('y'));
    }

    #[test]
    fn cut_prefers_a_sentence_boundary_within_tolerance() {
        let text = "First sentence ends here. Second sentence runs much longer than the budget allows";
        let (kept, cut) = cut_to_chars(text, 40, 30);
        assert!(cut);
        assert_eq!(kept, "First sentence ends here.");
    }

    #[test]
    fn cut_falls_back_to_hard_limit_without_a_boundary() {
        let text = "no sentence terminators anywhere in this run of text at all";
        let (kept, cut) = cut_to_chars(text, 20, 10);
        assert!(cut);
        assert_eq!(kept.chars().count(), 20);
    }

    #[test]
    fn cut_counts_characters_not_bytes() {
        let text = "ééééé. ééééé ééééé ééééé";
        let (kept, cut) = cut_to_chars(text, 10, 6);
        assert!(cut);
        assert_eq!(kept, "ééééé.");
    }

    #[test]
    fn empty_retrieval_yields_the_placeholder() {
        let assembled = assemble(&[], budget(2000), 120);
        assert_eq!(assembled.text, EMPTY_CONTEXT);
        assert_eq!(assembled.included_chunks, 0);
    }

    #[test]
    fn everything_fits_under_a_generous_budget() {
        let chunks = vec![
            chunk("One.", "a.txt", 0, 0.9),
            chunk("Two.", "a.txt", 1, 0.8),
            chunk("Three.", "b.txt", 0, 0.7),
        ];
        let assembled = assemble(&chunks, budget(4000), 120);
        assert_eq!(assembled.included_chunks, 3);
        assert!(!assembled.truncated);
    }
}
