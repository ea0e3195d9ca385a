//! Semantic search over stored notes
//!
//! Notes are embedded on write and ranked by cosine similarity on read.
//! A calibration baseline detects when the embedding model changes under
//! the stored vectors.

pub mod calibration;
pub mod embedding;
pub mod engine;
#[cfg(feature = "local-model")]
pub mod fastembed;
pub mod notedb;
pub mod provider;
#[cfg(test)]
pub(crate) mod testing;

pub use calibration::{CalibrationMonitor, Diagnostics};
pub use embedding::{Embedder, HtpEmbedder};
pub use engine::{SearchEngine, SearchResult};
pub use notedb::NoteStore;
pub use provider::{EmbeddingBackend, LazyEmbedder};
