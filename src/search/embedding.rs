//! Embedding providers
//!
//! Everything outside this module sees text embedding only through the
//! [`Embedder`] capability: `encode(texts) -> vectors`, with a fixed
//! dimension and deterministic output for a fixed model version.
//!
//! The built-in backend is Harmonic Token Projection (HTP):
//! "Harmonic Token Projection: A Vocabulary-Free, Training-Free,
//!  Deterministic, and Reversible Embedding Methodology"
//! https://arxiv.org/html/2511.20665
//!
//! - No neural network or model download
//! - Deterministic (same input → same output)
//! - Unicode-based (multilingual support)

use lazy_static::lazy_static;
use regex::Regex;
use std::f64::consts::PI;
use thiserror::Error;

/// Embedding dimension (2 * number of coprime moduli)
pub const EMBEDDING_DIM: usize = 384;

/// Model identifier recorded alongside calibration baselines
pub const HTP_MODEL_ID: &str = "htp-384";

const NUM_MODULI: usize = EMBEDDING_DIM / 2;

/// Maximum token length (Unicode code points)
const MAX_TOKEN_LENGTH: usize = 64;

/// First NUM_MODULI primes, pairwise coprime by construction
static COPRIME_MODULI: &[u64] = &[
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71,
    73, 79, 83, 89, 97, 101, 103, 107, 109, 113, 127, 131, 137, 139, 149, 151,
    157, 163, 167, 173, 179, 181, 191, 193, 197, 199, 211, 223, 227, 229, 233,
    239, 241, 251, 257, 263, 269, 271, 277, 281, 283, 293, 307, 311, 313, 317,
    331, 337, 347, 349, 353, 359, 367, 373, 379, 383, 389, 397, 401, 409, 419,
    421, 431, 433, 439, 443, 449, 457, 461, 463, 467, 479, 487, 491, 499, 503,
    509, 521, 523, 541, 547, 557, 563, 569, 571, 577, 587, 593, 599, 601, 607,
    613, 617, 619, 631, 641, 643, 647, 653, 659, 661, 673, 677, 683, 691, 701,
    709, 719, 727, 733, 739, 743, 751, 757, 761, 769, 773, 787, 797, 809, 811,
    821, 823, 827, 829, 839, 853, 857, 859, 863, 877, 881, 883, 887, 907, 911,
    919, 929, 937, 941, 947, 953, 967, 971, 977, 983, 991, 997, 1009, 1013,
    1019, 1021, 1031, 1033, 1039, 1049, 1051, 1061, 1063, 1069, 1087, 1091,
    1093, 1097, 1103, 1109, 1117, 1123, 1129, 1151, 1153, 1163, 1171, 1181,
];

lazy_static! {
    static ref TOKEN_RE: Regex = Regex::new(r"\w+").unwrap();
}

/// Failures raised by an embedding provider
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding model failed to initialize: {0}")]
    Init(String),
    #[error("embedding computation failed: {0}")]
    Encode(String),
    #[error("provider returned {actual} embeddings for {expected} inputs")]
    Count { expected: usize, actual: usize },
    #[error("embedding has dimension {actual}, expected {expected}")]
    Dimension { expected: usize, actual: usize },
    #[error("embedding contains non-finite values")]
    NonFinite,
}

/// Text embedding capability.
///
/// Implementations are shared across threads behind `Arc<dyn Embedder>`.
pub trait Embedder: Send + Sync {
    /// Encode each text into a vector of [`dimension()`](Self::dimension)
    /// floats, in input order.
    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Fixed dimensionality of every produced vector.
    fn dimension(&self) -> usize;

    /// Identifier of the model version producing the vectors.
    fn model_id(&self) -> &str;

    fn encode_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.encode(&[text])?;
        match vectors.len() {
            1 => Ok(vectors.remove(0)),
            actual => Err(EmbeddingError::Count {
                expected: 1,
                actual,
            }),
        }
    }
}

/// Harmonic Token Projection embedder
pub struct HtpEmbedder {
    moduli: Vec<u64>,
}

impl HtpEmbedder {
    pub fn new() -> Self {
        Self {
            moduli: COPRIME_MODULI[..NUM_MODULI].to_vec(),
        }
    }

    /// Embed a single text
    ///
    /// 1. Tokenize text into lowercase words
    /// 2. Embed each token using harmonic projection
    /// 3. Mean-pool token embeddings
    /// 4. L2 normalize
    ///
    /// Text without any word token maps to the zero vector.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let tokens = tokenize(text);

        if tokens.is_empty() {
            return vec![0.0; EMBEDDING_DIM];
        }

        let mut sum_embedding = vec![0.0f64; EMBEDDING_DIM];
        for token in &tokens {
            for (slot, val) in sum_embedding.iter_mut().zip(self.embed_token(token)) {
                *slot += val;
            }
        }

        let count = tokens.len() as f64;
        for val in &mut sum_embedding {
            *val /= count;
        }

        let norm: f64 = sum_embedding.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > 0.0 {
            sum_embedding.iter().map(|x| (*x / norm) as f32).collect()
        } else {
            sum_embedding.iter().map(|x| *x as f32).collect()
        }
    }

    /// For each modulus m_i, project r_i = N mod m_i onto the unit circle:
    /// E_i = [sin(2πr_i/m_i), cos(2πr_i/m_i)]
    fn embed_token(&self, token: &str) -> Vec<f64> {
        let n = token_to_integer(token);

        let mut embedding = Vec::with_capacity(EMBEDDING_DIM);
        for &m in &self.moduli {
            let r = n % m;
            let theta = 2.0 * PI * (r as f64) / (m as f64);
            embedding.push(theta.sin());
            embedding.push(theta.cos());
        }

        embedding
    }
}

impl Default for HtpEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for HtpEmbedder {
    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    fn model_id(&self) -> &str {
        HTP_MODEL_ID
    }
}

/// N = Σ u_j * B^(L-j) where B = 2^16, wrapping on overflow
fn token_to_integer(token: &str) -> u64 {
    token
        .chars()
        .take(MAX_TOKEN_LENGTH)
        .fold(0u64, |n, c| n.wrapping_mul(65536).wrapping_add(c as u64))
}

fn tokenize(text: &str) -> Vec<String> {
    TOKEN_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Euclidean norm, accumulated in f64
pub fn l2_norm(v: &[f32]) -> f64 {
    v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt()
}

/// Cosine similarity between two embeddings.
///
/// Returns 0.0 for mismatched lengths or a zero/non-finite norm; otherwise
/// the value is clamped into [-1, 1].
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);

    if norm_a > 0.0 && norm_b > 0.0 && norm_a.is_finite() && norm_b.is_finite() {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    } else {
        0.0
    }
}
