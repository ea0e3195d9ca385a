//! Embedding consistency check
//!
//! Detects when the embedding model silently changes behavior, which would
//! make every stored vector incomparable with newly computed ones. A fixed
//! phrase set is encoded once and persisted as a baseline; later checks
//! re-encode the same phrases and compare phrase by phrase.
//!
//! Drift is advisory: it is logged and surfaced, never blocks anything.
//! Re-embedding stored notes is a separate, explicit operation.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use super::embedding::{cosine_similarity, Embedder, EmbeddingError};

/// Reference phrases. Identity and order are part of the baseline format.
pub const CALIBRATION_PHRASES: [&str; 3] = [
    "The quick brown fox jumps over the lazy dog.",
    "Semantic search uses vector embeddings.",
    "Python programming and machine learning.",
];

/// Minimum per-phrase similarity for the model to count as unchanged
pub const DRIFT_THRESHOLD: f64 = 0.99;

pub const BASELINE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error(transparent)]
    Provider(#[from] EmbeddingError),
    #[error("failed to access calibration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("calibration file is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
    #[error("failed to replace calibration file: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("calibration baseline is incompatible: {0}; run recalibrate")]
    IncompatibleBaseline(String),
}

/// Persisted reference embeddings, replaced only as a whole
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBaseline {
    #[serde(default)]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub phrases: Vec<String>,
    pub embeddings: Vec<Vec<f32>>,
}

impl CalibrationBaseline {
    fn validate(&self) -> Result<(), CalibrationError> {
        if self.phrases.len() != self.embeddings.len() {
            return Err(CalibrationError::IncompatibleBaseline(format!(
                "{} phrases but {} embeddings",
                self.phrases.len(),
                self.embeddings.len()
            )));
        }
        if !self.phrases.iter().map(String::as_str).eq(CALIBRATION_PHRASES) {
            return Err(CalibrationError::IncompatibleBaseline(
                "phrase set differs from the current calibration phrases".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyStatus {
    /// No baseline existed; one was just created
    Initialized,
    Consistent,
    DriftDetected,
}

impl ConsistencyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Consistent => "consistent",
            Self::DriftDetected => "drift_detected",
        }
    }
}

/// Outcome of one consistency check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsistencyReport {
    pub status: ConsistencyStatus,
    /// Per-phrase similarity against the baseline, in phrase order
    pub similarities: Vec<f64>,
    pub min_similarity: Option<f64>,
    pub mean_similarity: Option<f64>,
    pub threshold: f64,
}

impl ConsistencyReport {
    fn initialized() -> Self {
        Self {
            status: ConsistencyStatus::Initialized,
            similarities: Vec::new(),
            min_similarity: None,
            mean_similarity: None,
            threshold: DRIFT_THRESHOLD,
        }
    }

    pub fn is_drift(&self) -> bool {
        self.status == ConsistencyStatus::DriftDetected
    }
}

/// Compare freshly computed phrase embeddings against a baseline.
///
/// The minimum similarity decides: one drifted phrase is enough.
pub fn compare(baseline: &CalibrationBaseline, current: &[Vec<f32>]) -> ConsistencyReport {
    let similarities: Vec<f64> = baseline
        .embeddings
        .iter()
        .zip(current)
        .map(|(saved, now)| cosine_similarity(now, saved))
        .collect();

    let min_similarity = similarities.iter().copied().reduce(f64::min);
    let mean_similarity = (!similarities.is_empty())
        .then(|| similarities.iter().sum::<f64>() / similarities.len() as f64);

    let status = match min_similarity {
        Some(min) if min >= DRIFT_THRESHOLD => ConsistencyStatus::Consistent,
        _ => ConsistencyStatus::DriftDetected,
    };

    ConsistencyReport {
        status,
        similarities,
        min_similarity,
        mean_similarity,
        threshold: DRIFT_THRESHOLD,
    }
}

/// Owner of the calibration baseline file
pub struct CalibrationMonitor {
    path: PathBuf,
    embedder: Arc<dyn Embedder>,
    // check and recalibrate never interleave
    lock: Mutex<()>,
}

impl CalibrationMonitor {
    pub fn new(path: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            path: path.into(),
            embedder,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run the consistency check, creating the baseline on first run
    pub fn check(&self) -> Result<ConsistencyReport, CalibrationError> {
        let _guard = self.lock.lock();

        let Some(baseline) = self.load_baseline()? else {
            tracing::info!(path = %self.path.display(), "No calibration baseline found, creating one");
            let baseline = self.compute_baseline()?;
            self.save_baseline(&baseline)?;
            return Ok(ConsistencyReport::initialized());
        };
        baseline.validate()?;

        let current = self.embedder.encode(&CALIBRATION_PHRASES)?;
        let report = compare(&baseline, &current);

        for (i, similarity) in report.similarities.iter().enumerate() {
            tracing::debug!(phrase = i + 1, similarity, "Calibration phrase compared");
        }
        Ok(report)
    }

    /// Unconditionally recompute and overwrite the baseline.
    ///
    /// For use after an intentional model upgrade.
    pub fn recalibrate(&self) -> Result<CalibrationBaseline, CalibrationError> {
        let _guard = self.lock.lock();

        let baseline = self.compute_baseline()?;
        self.save_baseline(&baseline)?;
        tracing::info!(model = %self.embedder.model_id(), "Calibration baseline recomputed");
        Ok(baseline)
    }

    pub fn load_baseline(&self) -> Result<Option<CalibrationBaseline>, CalibrationError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn compute_baseline(&self) -> Result<CalibrationBaseline, CalibrationError> {
        let embeddings = self.embedder.encode(&CALIBRATION_PHRASES)?;
        Ok(CalibrationBaseline {
            version: BASELINE_VERSION,
            model: Some(self.embedder.model_id().to_string()),
            created_at: Some(Utc::now()),
            phrases: CALIBRATION_PHRASES.iter().map(|p| p.to_string()).collect(),
            embeddings,
        })
    }

    /// Write to a sibling temp file, then rename over the target
    fn save_baseline(&self, baseline: &CalibrationBaseline) -> Result<(), CalibrationError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut file = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut file, baseline)?;
        file.write_all(b"\n")?;
        file.as_file().sync_all()?;
        file.persist(&self.path)?;

        tracing::info!(path = %self.path.display(), "Calibration baseline saved");
        Ok(())
    }
}

/// Outcome of the startup check, shared with request handlers
#[derive(Debug, Default)]
pub struct Diagnostics {
    consistency: RwLock<Option<ConsistencyReport>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_consistency(&self, report: ConsistencyReport) {
        *self.consistency.write() = Some(report);
    }

    pub fn consistency(&self) -> Option<ConsistencyReport> {
        self.consistency.read().clone()
    }

    /// Human-readable warning when the last check found drift
    pub fn drift_warning(&self) -> Option<String> {
        let report = self.consistency.read();
        let report = report.as_ref().filter(|r| r.is_drift())?;
        Some(format!(
            "Embedding drift detected (min similarity {:.4} < {}); search results may be inaccurate until notes are re-embedded.",
            report.min_similarity.unwrap_or(0.0),
            report.threshold
        ))
    }
}

/// Startup consistency check. Never fails: problems are logged and skipped.
pub fn run_startup_check(monitor: &CalibrationMonitor, diagnostics: &Diagnostics) {
    match monitor.check() {
        Ok(report) => {
            match report.status {
                ConsistencyStatus::Initialized => {
                    tracing::info!("Embedding calibration baseline created")
                }
                ConsistencyStatus::Consistent => tracing::info!(
                    min_similarity = report.min_similarity,
                    mean_similarity = report.mean_similarity,
                    "Embedding model consistent"
                ),
                ConsistencyStatus::DriftDetected => tracing::warn!(
                    min_similarity = report.min_similarity,
                    threshold = DRIFT_THRESHOLD,
                    "Embedding model drift detected; search results may be inaccurate, re-embed notes to fix"
                ),
            }
            diagnostics.record_consistency(report);
        }
        Err(e) => tracing::warn!(error = %e, "Embedding consistency check skipped"),
    }
}
