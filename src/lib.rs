//! neural-memory library
//!
//! A persistent note store with embedding-based semantic search, served to
//! MCP clients.
//!
//! # Modules
//!
//! - `core`: Note data model
//! - `search`: Embedding provider, note store, ranking, drift calibration
//! - `mcp`: Tool catalog, JSON-RPC dispatcher, HTTP and stdio transports
//! - `config`: Layered runtime configuration
//! - `app`: Component wiring

pub mod app;
pub mod config;
pub mod core;
pub mod mcp;
pub mod search;

// Re-exports for convenience
pub use app::App;
pub use config::Config;
pub use core::note::{DeletedNote, Note, StoreStats};
pub use search::calibration::{CalibrationMonitor, ConsistencyReport, ConsistencyStatus, Diagnostics};
pub use search::embedding::{Embedder, EmbeddingError};
pub use search::engine::{SearchEngine, SearchOutcome, SearchResult};
pub use search::notedb::{NoteStore, StoreError};
