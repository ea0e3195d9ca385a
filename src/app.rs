//! Component wiring shared by the CLI commands and both transports

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::mcp::{AuthGuard, Dispatcher, HttpState, ToolExecutor};
use crate::search::calibration::{run_startup_check, CalibrationMonitor, Diagnostics};
use crate::search::embedding::Embedder;
use crate::search::engine::SearchEngine;
use crate::search::notedb::NoteStore;

/// One embedder, one store, one monitor for the whole process
pub struct App {
    pub config: Config,
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<NoteStore>,
    pub monitor: Arc<CalibrationMonitor>,
    pub diagnostics: Arc<Diagnostics>,
}

impl App {
    pub fn open(config: Config) -> Result<Self> {
        let embedder = config.build_embedder();
        Self::with_embedder(config, embedder)
    }

    pub fn with_embedder(config: Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let store = NoteStore::open(&config.db_path, embedder.clone())
            .with_context(|| format!("failed to open note database {}", config.db_path.display()))?;
        let monitor = CalibrationMonitor::new(config.calibration_file.clone(), embedder.clone());

        tracing::debug!(
            db = %config.db_path.display(),
            calibration = %config.calibration_file.display(),
            model = embedder.model_id(),
            "Components ready"
        );

        Ok(Self {
            config,
            embedder,
            store: Arc::new(store),
            monitor: Arc::new(monitor),
            diagnostics: Arc::new(Diagnostics::new()),
        })
    }

    pub fn engine(&self) -> SearchEngine {
        SearchEngine::new(self.store.clone(), self.embedder.clone())
    }

    pub fn executor(&self) -> Arc<ToolExecutor> {
        Arc::new(ToolExecutor::new(self.store.clone(), self.diagnostics.clone()))
    }

    /// Run the consistency check off the async workers.
    ///
    /// The first check also loads the model, so it runs in the background
    /// while the transport starts accepting requests.
    pub fn spawn_startup_check(&self) -> tokio::task::JoinHandle<()> {
        let monitor = self.monitor.clone();
        let diagnostics = self.diagnostics.clone();
        tokio::task::spawn_blocking(move || run_startup_check(&monitor, &diagnostics))
    }

    /// State for the HTTP transport. Fails without a configured API key.
    pub fn http_state(&self) -> Result<HttpState> {
        let key = self.config.require_api_key()?;
        Ok(HttpState {
            dispatcher: Arc::new(Dispatcher::new(self.store.clone(), self.diagnostics.clone())),
            guard: AuthGuard::new(key),
            diagnostics: self.diagnostics.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::calibration::ConsistencyStatus;
    use crate::search::testing::KeywordEmbedder;

    fn config_in(dir: &std::path::Path) -> Config {
        Config {
            db_path: dir.join("nested/memory.db"),
            calibration_file: dir.join("nested/calibration.json"),
            ..Config::default()
        }
    }

    #[test]
    fn test_http_state_requires_key() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::with_embedder(config_in(dir.path()), Arc::new(KeywordEmbedder::new())).unwrap();
        assert!(app.http_state().is_err());

        let mut config = config_in(dir.path());
        config.api_key = Some("k".to_string());
        let app = App::with_embedder(config, Arc::new(KeywordEmbedder::new())).unwrap();
        assert!(app.http_state().is_ok());
    }

    #[tokio::test]
    async fn test_startup_check_records_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::with_embedder(config_in(dir.path()), Arc::new(KeywordEmbedder::new())).unwrap();

        app.spawn_startup_check().await.unwrap();
        assert_eq!(
            app.diagnostics.consistency().map(|r| r.status),
            Some(ConsistencyStatus::Initialized)
        );
        assert!(app.config.calibration_file.exists());
    }
}
