//! Keyword-overlap similarity used by the in-process stores.
//!
//! Texts are reduced to sparse term-frequency vectors (lowercased
//! alphanumeric tokens, common function words dropped) and compared with
//! cosine similarity. A score of zero means no shared terms.

use std::collections::HashMap;

use anemone_core::memory::MemoryEntry;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "do", "does", "for", "from", "had",
    "has", "have", "i", "if", "in", "into", "is", "it", "its", "me", "my", "of", "on", "or", "so",
    "that", "the", "their", "then", "there", "these", "they", "this", "to", "was", "we", "were",
    "what", "when", "which", "who", "will", "with", "you", "your",
];

/// Split text into normalized, non-trivial tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

fn term_frequencies(text: &str) -> HashMap<String, f64> {
    let mut tf = HashMap::new();
    for token in tokenize(text) {
        *tf.entry(token).or_insert(0.0) += 1.0;
    }
    tf
}

/// Cosine similarity between the term vectors of two texts, in [0, 1].
pub fn similarity(a: &str, b: &str) -> f32 {
    let a = term_frequencies(a);
    let b = term_frequencies(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .filter_map(|(term, x)| b.get(term).map(|y| x * y))
        .sum();
    let norm_a = a.values().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.values().map(|y| y * y).sum::<f64>().sqrt();

    let denom = norm_a * norm_b;
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// The entry most similar to `query`, if any shares at least one term.
///
/// Ties go to the most recently saved entry.
pub fn best_match<'a>(entries: &'a [MemoryEntry], query: &str) -> Option<&'a MemoryEntry> {
    entries
        .iter()
        .map(|entry| (similarity(&entry.content, query), entry))
        .filter(|(score, _)| *score > 0.0)
        .fold(None, |best: Option<(f32, &MemoryEntry)>, (score, entry)| match best {
            Some((top, _)) if top > score => best,
            _ => Some((score, entry)),
        })
        .map(|(_, entry)| entry)
}
