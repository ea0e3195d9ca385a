//! Local ONNX embedding backend (all-MiniLM-L6-v2, 384d)
//!
//! Only compiled with the `local-model` feature. The model is downloaded
//! into the cache directory on first load.

use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};
use parking_lot::Mutex;
use std::path::PathBuf;

use super::embedding::{Embedder, EmbeddingError};

const MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";
const DIMENSION: usize = 384;

/// `TextEmbedding::embed` needs `&mut self`, hence the mutex.
pub struct MiniLmEmbedder {
    model: Mutex<TextEmbedding>,
}

impl MiniLmEmbedder {
    pub fn new(cache_dir: Option<PathBuf>) -> Result<Self, EmbeddingError> {
        let mut options = TextInitOptions::new(EmbeddingModel::AllMiniLML6V2)
            .with_show_download_progress(false);
        if let Some(dir) = cache_dir {
            options = options.with_cache_dir(dir);
        }

        let model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::Init(e.to_string()))?;

        tracing::info!(model = MODEL_ID, dimensions = DIMENSION, "ONNX embedding model loaded");

        Ok(Self {
            model: Mutex::new(model),
        })
    }
}

impl Embedder for MiniLmEmbedder {
    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.model
            .lock()
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::Encode(e.to_string()))
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn model_id(&self) -> &str {
        MODEL_ID
    }
}
