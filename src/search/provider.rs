//! Process-wide embedding provider
//!
//! [`LazyEmbedder`] defers loading the configured backend until the first
//! encode call. Concurrent first callers block on a single initializer and
//! then share its result; a failed load is retried on the next call.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use super::embedding::{Embedder, EmbeddingError, HtpEmbedder, EMBEDDING_DIM, HTP_MODEL_ID};

/// Selectable embedding backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingBackend {
    /// Harmonic Token Projection, no model files required
    #[default]
    Htp,
    /// all-MiniLM-L6-v2 via ONNX Runtime (`local-model` feature)
    MiniLm,
}

impl EmbeddingBackend {
    pub fn model_id(&self) -> &'static str {
        match self {
            Self::Htp => HTP_MODEL_ID,
            Self::MiniLm => "sentence-transformers/all-MiniLM-L6-v2",
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            Self::Htp => EMBEDDING_DIM,
            Self::MiniLm => 384,
        }
    }

    /// Load the backend. Called at most once per successful initialization.
    pub fn load(&self, cache_dir: Option<&PathBuf>) -> Result<Box<dyn Embedder>, EmbeddingError> {
        match self {
            Self::Htp => Ok(Box::new(HtpEmbedder::new())),
            #[cfg(feature = "local-model")]
            Self::MiniLm => Ok(Box::new(super::fastembed::MiniLmEmbedder::new(
                cache_dir.cloned(),
            )?)),
            #[cfg(not(feature = "local-model"))]
            Self::MiniLm => {
                let _ = cache_dir;
                Err(EmbeddingError::Init(
                    "backend 'mini-lm' requires the `local-model` feature".to_string(),
                ))
            }
        }
    }
}

impl FromStr for EmbeddingBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "htp" => Ok(Self::Htp),
            "mini-lm" | "minilm" | "all-minilm-l6-v2" => Ok(Self::MiniLm),
            other => Err(format!("unknown embedding backend '{}'", other)),
        }
    }
}

impl fmt::Display for EmbeddingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Htp => write!(f, "htp"),
            Self::MiniLm => write!(f, "mini-lm"),
        }
    }
}

type Loader = Box<dyn Fn() -> Result<Box<dyn Embedder>, EmbeddingError> + Send + Sync>;

/// Initialize-once wrapper around an embedding backend.
///
/// Also enforces the provider contract on every call: one vector per input,
/// each of the declared dimension with finite components.
pub struct LazyEmbedder {
    model_id: String,
    dimension: usize,
    loader: Loader,
    cell: OnceCell<Box<dyn Embedder>>,
}

impl LazyEmbedder {
    pub fn new<F>(model_id: impl Into<String>, dimension: usize, loader: F) -> Self
    where
        F: Fn() -> Result<Box<dyn Embedder>, EmbeddingError> + Send + Sync + 'static,
    {
        Self {
            model_id: model_id.into(),
            dimension,
            loader: Box::new(loader),
            cell: OnceCell::new(),
        }
    }

    pub fn for_backend(backend: EmbeddingBackend, cache_dir: Option<PathBuf>) -> Self {
        Self::new(backend.model_id(), backend.dimension(), move || {
            backend.load(cache_dir.as_ref())
        })
    }

    /// Wrap as the shared handle handed to every component.
    pub fn shared(self) -> Arc<dyn Embedder> {
        Arc::new(self)
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    fn inner(&self) -> Result<&dyn Embedder, EmbeddingError> {
        self.cell
            .get_or_try_init(|| {
                tracing::info!(model = %self.model_id, "Loading embedding model");
                let model = (self.loader)()?;
                if model.dimension() != self.dimension {
                    return Err(EmbeddingError::Dimension {
                        expected: self.dimension,
                        actual: model.dimension(),
                    });
                }
                Ok(model)
            })
            .map(|model| model.as_ref())
    }
}

impl Embedder for LazyEmbedder {
    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let vectors = self.inner()?.encode(texts)?;

        if vectors.len() != texts.len() {
            return Err(EmbeddingError::Count {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        for vector in &vectors {
            if vector.len() != self.dimension {
                return Err(EmbeddingError::Dimension {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
            if !vector.iter().all(|v| v.is_finite()) {
                return Err(EmbeddingError::NonFinite);
            }
        }

        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    struct FixedEmbedder {
        vector: Vec<f32>,
    }

    impl Embedder for FixedEmbedder {
        fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|_| self.vector.clone()).collect())
        }
        fn dimension(&self) -> usize {
            self.vector.len()
        }
        fn model_id(&self) -> &str {
            "fixed"
        }
    }

    #[test]
    fn test_loads_lazily_once_under_concurrency() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let embedder = Arc::new(LazyEmbedder::new("htp", EMBEDDING_DIM, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            Ok(Box::new(HtpEmbedder::new()) as Box<dyn Embedder>)
        }));

        assert!(!embedder.is_loaded());
        assert_eq!(loads.load(Ordering::SeqCst), 0);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let embedder = embedder.clone();
                thread::spawn(move || embedder.encode_one(&format!("text {}", i)).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().len(), EMBEDDING_DIM);
        }

        assert!(embedder.is_loaded());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_load_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let embedder = LazyEmbedder::new("flaky", EMBEDDING_DIM, move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(EmbeddingError::Init("model file missing".to_string()))
            } else {
                Ok(Box::new(HtpEmbedder::new()) as Box<dyn Embedder>)
            }
        });

        assert!(matches!(embedder.encode_one("a"), Err(EmbeddingError::Init(_))));
        assert!(embedder.encode_one("a").is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_rejects_wrong_dimension() {
        let embedder = LazyEmbedder::new("fixed", 4, || {
            Ok(Box::new(FixedEmbedder {
                vector: vec![1.0, 0.0, 0.0],
            }) as Box<dyn Embedder>)
        });
        assert!(matches!(
            embedder.encode_one("a"),
            Err(EmbeddingError::Dimension {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_rejects_non_finite_vectors() {
        let embedder = LazyEmbedder::new("fixed", 2, || {
            Ok(Box::new(FixedEmbedder {
                vector: vec![f32::NAN, 1.0],
            }) as Box<dyn Embedder>)
        });
        assert!(matches!(embedder.encode_one("a"), Err(EmbeddingError::NonFinite)));
    }

    #[test]
    fn test_backend_metadata_without_loading() {
        let embedder = LazyEmbedder::for_backend(EmbeddingBackend::Htp, None);
        assert_eq!(embedder.dimension(), EMBEDDING_DIM);
        assert_eq!(embedder.model_id(), HTP_MODEL_ID);
        assert!(!embedder.is_loaded());
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("htp".parse::<EmbeddingBackend>(), Ok(EmbeddingBackend::Htp));
        assert_eq!("MiniLM".parse::<EmbeddingBackend>(), Ok(EmbeddingBackend::MiniLm));
        assert!("word2vec".parse::<EmbeddingBackend>().is_err());
        assert_eq!(EmbeddingBackend::MiniLm.to_string(), "mini-lm");
    }
}
