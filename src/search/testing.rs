//! Deterministic embedders for unit tests

use std::collections::HashMap;

use super::embedding::{Embedder, EmbeddingError};

const VOCAB: &[&str] = &[
    "sky", "blue", "color", "ocean", "deep", "sea", "fox", "dog", "quick", "brown", "lazy",
    "jumps", "semantic", "search", "vector", "embeddings", "python", "programming", "machine",
    "learning", "weather", "rain",
];

/// One axis per known word; unknown words contribute nothing.
///
/// "The sky is blue" against "color of the sky" scores exactly 0.5.
pub struct KeywordEmbedder;

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; VOCAB.len()];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
        {
            if let Some(axis) = VOCAB.iter().position(|v| *v == word) {
                vector[axis] = 1.0;
            }
        }
        vector
    }
}

impl Embedder for KeywordEmbedder {
    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    fn dimension(&self) -> usize {
        VOCAB.len()
    }

    fn model_id(&self) -> &str {
        "keyword-test"
    }
}

/// Always fails, as an unreachable embedding backend would
pub struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn encode(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::Encode("backend offline".to_string()))
    }

    fn dimension(&self) -> usize {
        4
    }

    fn model_id(&self) -> &str {
        "failing-test"
    }
}

/// Returns preset vectors for known texts
pub struct ScriptedEmbedder {
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl ScriptedEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: HashMap::new(),
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }
}

impl Embedder for ScriptedEmbedder {
    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts
            .iter()
            .map(|t| {
                self.vectors
                    .get(*t)
                    .cloned()
                    .ok_or_else(|| EmbeddingError::Encode(format!("no vector scripted for '{}'", t)))
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        "scripted-test"
    }
}
