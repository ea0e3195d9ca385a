//! Search Engine - ranks stored notes against a query embedding
//!
//! Brute-force cosine similarity over every note with a usable embedding.
//! Holds no state of its own; notes are read from the store per call.

use std::cmp::Ordering;
use std::sync::Arc;

use super::embedding::{cosine_similarity, l2_norm, Embedder, EmbeddingError};
use super::notedb::{EmbeddedNote, NoteStore, StoreError};

/// Results below this similarity are never returned
pub const RELEVANCE_FLOOR: f64 = 0.4;

pub const DEFAULT_SEARCH_LIMIT: i64 = 5;
pub const MAX_SEARCH_LIMIT: usize = 20;

/// A ranked match. Derived per query, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub note_id: i64,
    pub content: String,
    pub category: String,
    pub similarity: f64,
}

/// Ranked results plus the match count before truncation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub total_matches: usize,
}

pub struct SearchEngine {
    store: Arc<NoteStore>,
    embedder: Arc<dyn Embedder>,
}

impl SearchEngine {
    pub fn new(store: Arc<NoteStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    /// Search for notes similar to `query`.
    ///
    /// `limit` is clamped into `1..=MAX_SEARCH_LIMIT`.
    pub fn search(&self, query: &str, limit: i64) -> Result<SearchOutcome, StoreError> {
        let limit = clamp_limit(limit);

        let candidates = self.store.embedded_notes()?;
        if candidates.is_empty() {
            return Ok(SearchOutcome::default());
        }

        let query_embedding = match self.embedder.encode_one(query) {
            Ok(embedding) => embedding,
            Err(EmbeddingError::NonFinite) => {
                tracing::warn!("Query embedding is non-finite, returning no results");
                return Ok(SearchOutcome::default());
            }
            Err(e) => return Err(e.into()),
        };

        let outcome = rank(&query_embedding, candidates, limit);
        tracing::debug!(
            returned = outcome.results.len(),
            total_matches = outcome.total_matches,
            limit,
            "Search complete"
        );
        Ok(outcome)
    }
}

/// Clamp a caller-supplied limit into the supported range
pub fn clamp_limit(limit: i64) -> usize {
    limit.clamp(1, MAX_SEARCH_LIMIT as i64) as usize
}

/// Score, filter and order candidates against a query vector.
///
/// Ties on similarity fall back to ascending note id. A query with a zero or
/// non-finite norm matches nothing.
pub fn rank(query: &[f32], candidates: Vec<EmbeddedNote>, limit: usize) -> SearchOutcome {
    let query_norm = l2_norm(query);
    if !query_norm.is_finite() || query_norm == 0.0 {
        return SearchOutcome::default();
    }

    let mut results: Vec<SearchResult> = candidates
        .into_iter()
        .filter_map(|note| {
            let similarity = cosine_similarity(query, &note.embedding);
            (similarity.is_finite() && similarity >= RELEVANCE_FLOOR).then(|| SearchResult {
                note_id: note.id,
                content: note.content,
                category: note.category,
                similarity,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.note_id.cmp(&b.note_id))
    });

    let total_matches = results.len();
    results.truncate(limit);

    SearchOutcome {
        results,
        total_matches,
    }
}
