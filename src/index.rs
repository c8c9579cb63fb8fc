//! In-memory keyword index over ingested chunks.
//!
//! Each passage keeps its term frequencies; a query is scored per passage
//! as the sum, over distinct query terms, of a saturated term frequency
//! weighted by inverse document frequency. Passages with identical text
//! (same SHA-256) are stored once.

use std::collections::{HashMap, HashSet};

use crate::chunk::Chunk;

/// Common English words that carry no retrieval signal.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "do", "does", "for", "from", "how", "in",
    "is", "it", "its", "of", "on", "or", "that", "the", "this", "to", "was", "what", "when",
    "where", "which", "who", "why", "with", "you",
];

/// Term-frequency saturation constant.
const K1: f64 = 1.2;

/// Lowercased alphanumeric terms of `text`, without stopwords.
pub fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

struct Passage {
    text: String,
    term_counts: HashMap<String, u32>,
}

/// A passage returned from [`KeywordIndex::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub text: String,
    pub score: f64,
}

#[derive(Default)]
pub struct KeywordIndex {
    passages: Vec<Passage>,
    hashes: HashSet<String>,
    doc_freq: HashMap<String, usize>,
}

impl KeywordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index `chunks`, skipping any already present. Returns how many were added.
    pub fn add(&mut self, chunks: Vec<Chunk>) -> usize {
        let mut added = 0;
        for chunk in chunks {
            if !self.hashes.insert(chunk.hash) {
                continue;
            }
            let mut term_counts: HashMap<String, u32> = HashMap::new();
            for term in terms(&chunk.text) {
                *term_counts.entry(term).or_default() += 1;
            }
            for term in term_counts.keys() {
                *self.doc_freq.entry(term.clone()).or_default() += 1;
            }
            self.passages.push(Passage {
                text: chunk.text,
                term_counts,
            });
            added += 1;
        }
        added
    }

    /// Best-scoring passages for `query`, highest first. Passages sharing
    /// no term with the query are never returned.
    pub fn search(&self, query: &str, limit: usize) -> Vec<Hit> {
        let query_terms: HashSet<String> = terms(query).into_iter().collect();
        if query_terms.is_empty() || self.passages.is_empty() {
            return Vec::new();
        }

        let n = self.passages.len() as f64;
        let mut hits: Vec<(usize, f64)> = self
            .passages
            .iter()
            .enumerate()
            .filter_map(|(i, passage)| {
                let score: f64 = query_terms
                    .iter()
                    .filter_map(|term| {
                        let tf = *passage.term_counts.get(term)? as f64;
                        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f64;
                        let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
                        Some(idf * tf * (K1 + 1.0) / (tf + K1))
                    })
                    .sum();
                (score > 0.0).then_some((i, score))
            })
            .collect();

        // Ties keep document order.
        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        hits.truncate(limit);
        hits.into_iter()
            .map(|(i, score)| Hit {
                text: self.passages[i].text.clone(),
                score,
            })
            .collect()
    }

    /// The first `limit` passages in ingestion order, unscored.
    pub fn leading(&self, limit: usize) -> Vec<Hit> {
        self.passages
            .iter()
            .take(limit)
            .map(|p| Hit {
                text: p.text.clone(),
                score: 0.0,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn clear(&mut self) {
        self.passages.clear();
        self.hashes.clear();
        self.doc_freq.clear();
    }
}
