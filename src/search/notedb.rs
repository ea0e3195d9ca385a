//! Note store on SQLite
//!
//! Notes and their embeddings live in one row, so content, category,
//! timestamp and vector are always written by a single statement. Embeddings
//! are stored as little-endian f32 BLOBs and decoded byte-exactly.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::embedding::{l2_norm, Embedder, EmbeddingError};
use crate::core::note::{normalize_category, parse_timestamp};
use crate::core::{DeletedNote, Note, StoreStats, DEFAULT_CATEGORY};

/// Embeddings recomputed per provider call during [`NoteStore::reembed_all`]
const REEMBED_BATCH: usize = 32;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),
    #[error("Note #{0} not found")]
    NotFound(i64),
    #[error(transparent)]
    Provider(#[from] EmbeddingError),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),
}

/// A note as seen by search: only rows whose embedding matches the
/// provider's dimension.
#[derive(Debug, Clone)]
pub struct EmbeddedNote {
    pub id: i64,
    pub content: String,
    pub category: String,
    pub embedding: Vec<f32>,
}

/// Durable note collection. Sole writer of the `notes` table.
pub struct NoteStore {
    conn: Mutex<Connection>,
    embedder: Arc<dyn Embedder>,
}

impl NoteStore {
    /// Open or create database at path
    pub fn open(db_path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn, embedder)
    }

    /// Open in-memory database (for testing)
    pub fn open_in_memory(embedder: Arc<dyn Embedder>) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, embedder)
    }

    fn with_connection(conn: Connection, embedder: Arc<dyn Embedder>) -> Result<Self, StoreError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            embedder,
        })
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Add a note, returning its freshly assigned id
    pub fn create(&self, content: &str, category: Option<&str>) -> Result<i64, StoreError> {
        validate_content(content)?;
        let category = normalize_category(category).unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        let embedding = self.embedder.encode_one(content)?;
        let timestamp = Utc::now().to_rfc3339();

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO notes (content, category, timestamp, embedding_vector) VALUES (?1, ?2, ?3, ?4)",
            params![content, category, timestamp, embedding_to_blob(&embedding)],
        )?;
        let id = conn.last_insert_rowid();

        tracing::debug!(note_id = id, category = %category, "Note created");
        Ok(id)
    }

    /// Replace a note's content, re-embedding it unconditionally.
    ///
    /// `category = None` keeps the stored category.
    pub fn update(&self, id: i64, content: &str, category: Option<&str>) -> Result<Note, StoreError> {
        validate_content(content)?;
        if !self.exists(id)? {
            return Err(StoreError::NotFound(id));
        }

        let category = normalize_category(category);
        let embedding = self.embedder.encode_one(content)?;
        let timestamp = Utc::now().to_rfc3339();

        let conn = self.conn.lock();
        let changed = conn.execute(
            r#"
            UPDATE notes
            SET content = ?1,
                category = COALESCE(?2, category),
                timestamp = ?3,
                embedding_vector = ?4
            WHERE id = ?5
            "#,
            params![content, category, timestamp, embedding_to_blob(&embedding), id],
        )?;
        if changed == 0 {
            // Deleted while the embedding was being computed
            return Err(StoreError::NotFound(id));
        }

        let note = fetch_note(&conn, id)?.ok_or(StoreError::NotFound(id))?;
        tracing::debug!(note_id = id, category = %note.category, "Note updated");
        Ok(note)
    }

    /// Remove a note, returning what it contained
    pub fn delete(&self, id: i64) -> Result<DeletedNote, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let existing: Option<(String, String)> = tx
            .query_row(
                "SELECT content, COALESCE(category, 'general') FROM notes WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((content, category)) = existing else {
            return Err(StoreError::NotFound(id));
        };

        tx.execute("DELETE FROM notes WHERE id = ?1", params![id])?;
        tx.commit()?;

        tracing::debug!(note_id = id, "Note deleted");
        Ok(DeletedNote {
            id,
            content,
            category,
        })
    }

    pub fn get(&self, id: i64) -> Result<Note, StoreError> {
        let conn = self.conn.lock();
        fetch_note(&conn, id)?.ok_or(StoreError::NotFound(id))
    }

    pub fn exists(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let found = conn
            .query_row("SELECT 1 FROM notes WHERE id = ?1", params![id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    /// All notes, ordered by id
    pub fn list_all(&self) -> Result<Vec<Note>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, content, COALESCE(category, 'general'), timestamp, embedding_vector FROM notes ORDER BY id",
        )?;
        let rows = stmt.query_map([], note_from_row)?;

        let mut notes = Vec::new();
        for row in rows {
            notes.push(row?);
        }
        Ok(notes)
    }

    /// Note counts per category
    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let dimension = self.embedder.dimension();
        let conn = self.conn.lock();

        let mut stats = StoreStats::default();
        let mut stmt = conn.prepare(
            "SELECT COALESCE(category, 'general'), embedding_vector FROM notes",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<Vec<u8>>>(1)?))
        })?;

        for row in rows {
            let (category, blob) = row?;
            stats.total += 1;
            *stats.by_category.entry(category).or_insert(0) += 1;

            let searchable = blob
                .as_deref()
                .and_then(blob_to_embedding)
                .is_some_and(|v| v.len() == dimension && l2_norm(&v) > 0.0);
            if !searchable {
                stats.without_embedding += 1;
            }
        }

        Ok(stats)
    }

    /// Notes eligible for ranking, ordered by id.
    ///
    /// Rows with no embedding, or with one of a different dimension than the
    /// current provider's, are left out.
    pub fn embedded_notes(&self) -> Result<Vec<EmbeddedNote>, StoreError> {
        let dimension = self.embedder.dimension();
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, content, COALESCE(category, 'general'), embedding_vector
            FROM notes
            WHERE embedding_vector IS NOT NULL
            ORDER BY id
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Vec<u8>>(3)?,
            ))
        })?;

        let mut notes = Vec::new();
        let mut stale = 0usize;
        for row in rows {
            let (id, content, category, blob) = row?;
            match blob_to_embedding(&blob) {
                Some(embedding) if embedding.len() == dimension => notes.push(EmbeddedNote {
                    id,
                    content,
                    category,
                    embedding,
                }),
                _ => stale += 1,
            }
        }

        if stale > 0 {
            tracing::warn!(stale, dimension, "Skipping notes with unusable embeddings");
        }
        Ok(notes)
    }

    /// Recompute every note's embedding with the current provider.
    ///
    /// Explicit remediation after a model change; content, category and
    /// timestamp are left untouched. Returns the number of notes rewritten.
    pub fn reembed_all(&self) -> Result<usize, StoreError> {
        let pending: Vec<(i64, String)> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare("SELECT id, content FROM notes ORDER BY id")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            let pending = rows.collect::<Result<Vec<_>, _>>()?;
            pending
        };

        let mut rewritten = 0;
        for chunk in pending.chunks(REEMBED_BATCH) {
            let texts: Vec<&str> = chunk.iter().map(|(_, content)| content.as_str()).collect();
            let embeddings = self.embedder.encode(&texts)?;

            let conn = self.conn.lock();
            for ((id, content), embedding) in chunk.iter().zip(embeddings) {
                // Skip rows edited since they were read; their embedding is already fresh
                rewritten += conn.execute(
                    "UPDATE notes SET embedding_vector = ?1 WHERE id = ?2 AND content = ?3",
                    params![embedding_to_blob(&embedding), id, content],
                )?;
            }
        }

        tracing::info!(rewritten, model = %self.embedder.model_id(), "Re-embedded notes");
        Ok(rewritten)
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS notes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT 'general',
            timestamp TEXT NOT NULL,
            embedding_vector BLOB
        );

        CREATE INDEX IF NOT EXISTS idx_notes_category ON notes(category);
        "#,
    )
}

fn validate_content(content: &str) -> Result<(), StoreError> {
    if content.trim().is_empty() {
        return Err(StoreError::Validation("Content required".to_string()));
    }
    Ok(())
}

fn fetch_note(conn: &Connection, id: i64) -> rusqlite::Result<Option<Note>> {
    conn.query_row(
        "SELECT id, content, COALESCE(category, 'general'), timestamp, embedding_vector FROM notes WHERE id = ?1",
        params![id],
        note_from_row,
    )
    .optional()
}

fn note_from_row(row: &Row<'_>) -> rusqlite::Result<Note> {
    // Older databases may hold rows without a timestamp; those read as the epoch
    let raw_timestamp: Option<String> = row.get(3)?;
    let created_at = match raw_timestamp {
        Some(raw) => parse_timestamp(&raw).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("invalid timestamp '{}'", raw).into(),
            )
        })?,
        None => DateTime::<Utc>::default(),
    };
    let blob: Option<Vec<u8>> = row.get(4)?;

    Ok(Note {
        id: row.get(0)?,
        content: row.get(1)?,
        category: row.get(2)?,
        created_at,
        embedding: blob.as_deref().and_then(blob_to_embedding),
    })
}

/// Convert f32 embedding to BLOB
pub fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for &val in embedding {
        blob.extend_from_slice(&val.to_le_bytes());
    }
    blob
}

/// Convert BLOB to f32 embedding; `None` for empty or truncated blobs
pub fn blob_to_embedding(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.is_empty() || blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::embedding::HtpEmbedder;
    use crate::search::testing::{FailingEmbedder, KeywordEmbedder};

    fn store() -> NoteStore {
        NoteStore::open_in_memory(Arc::new(KeywordEmbedder::new())).unwrap()
    }

    #[test]
    fn test_blob_conversion_is_byte_exact() {
        let embedding = vec![1.0, -0.5, f32::MIN_POSITIVE, 0.1 + 0.2, 1.0e-38, f32::MAX];
        let blob = embedding_to_blob(&embedding);
        let recovered = blob_to_embedding(&blob).unwrap();
        let bits = |v: &[f32]| v.iter().map(|f| f.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&embedding), bits(&recovered));
    }

    #[test]
    fn test_truncated_blob_is_rejected() {
        assert!(blob_to_embedding(&[0, 0, 128]).is_none());
        assert!(blob_to_embedding(&[]).is_none());
    }

    #[test]
    fn test_create_assigns_monotonic_ids() {
        let store = store();
        let first = store.create("The sky is blue", None).unwrap();
        let second = store.create("The ocean is deep", Some("nature")).unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);

        let note = store.get(first).unwrap();
        assert_eq!(note.category, DEFAULT_CATEGORY);
        assert!(note.has_embedding());
        assert_eq!(store.get(second).unwrap().category, "nature");
    }

    #[test]
    fn test_ids_not_reused_after_delete() {
        let store = store();
        let first = store.create("first", None).unwrap();
        store.delete(first).unwrap();
        assert_eq!(store.create("second", None).unwrap(), first + 1);
    }

    #[test]
    fn test_create_rejects_empty_content() {
        let store = store();
        assert!(matches!(store.create("", None), Err(StoreError::Validation(_))));
        assert!(matches!(store.create("   \n", None), Err(StoreError::Validation(_))));
        assert_eq!(store.stats().unwrap().total, 0);
    }

    #[test]
    fn test_blank_category_falls_back_to_default() {
        let store = store();
        let id = store.create("sky", Some("  ")).unwrap();
        assert_eq!(store.get(id).unwrap().category, DEFAULT_CATEGORY);
    }

    #[test]
    fn test_update_reembeds_and_keeps_category() {
        let store = store();
        let id = store.create("The sky is blue", Some("weather")).unwrap();
        let before = store.get(id).unwrap();

        let updated = store.update(id, "The ocean is deep", None).unwrap();
        assert_eq!(updated.category, "weather");
        assert_eq!(updated.content, "The ocean is deep");
        assert_ne!(updated.embedding, before.embedding);
        assert!(updated.created_at >= before.created_at);
        assert_eq!(store.get(id).unwrap(), updated);
    }

    #[test]
    fn test_update_replaces_category_when_given() {
        let store = store();
        let id = store.create("The sky is blue", None).unwrap();
        let updated = store.update(id, "The ocean is deep", Some("nature")).unwrap();
        assert_eq!(updated.category, "nature");
    }

    #[test]
    fn test_update_same_content_still_reembeds() {
        let store = store();
        let id = store.create("blue sky", None).unwrap();
        let updated = store.update(id, "blue sky", None).unwrap();
        assert!(updated.has_embedding());
        assert_eq!(updated.content, "blue sky");
    }

    #[test]
    fn test_update_missing_note() {
        let store = store();
        assert!(matches!(store.update(42, "content", None), Err(StoreError::NotFound(42))));
        assert!(matches!(store.update(1, "", None), Err(StoreError::Validation(_))));
    }

    #[test]
    fn test_create_delete_then_not_found() {
        let store = store();
        let id = store.create("The sky is blue", Some("weather")).unwrap();

        let deleted = store.delete(id).unwrap();
        assert_eq!(deleted.content, "The sky is blue");
        assert_eq!(deleted.category, "weather");

        assert!(!store.exists(id).unwrap());
        assert!(matches!(store.delete(id), Err(StoreError::NotFound(_))));
        assert!(matches!(store.update(id, "again", None), Err(StoreError::NotFound(_))));
        assert!(matches!(store.get(id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_stats_and_list() {
        let store = store();
        store.create("sky", Some("weather")).unwrap();
        store.create("ocean", Some("nature")).unwrap();
        store.create("deep ocean", Some("nature")).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_category.get("nature"), Some(&2));
        assert_eq!(stats.by_category.get("weather"), Some(&1));
        assert_eq!(stats.without_embedding, 0);

        let ids: Vec<i64> = store.list_all().unwrap().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_stats_counts_zero_vectors_as_unsearchable() {
        let store = NoteStore::open_in_memory(Arc::new(HtpEmbedder::new())).unwrap();
        store.create("The sky is blue", None).unwrap();
        store.create("!!!", None).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.without_embedding, 1);
    }

    #[test]
    fn test_embedded_notes_skip_missing_and_stale_vectors() {
        let store = store();
        let good = store.create("sky", None).unwrap();
        let missing = store.create("ocean", None).unwrap();
        let stale = store.create("deep", None).unwrap();
        {
            let conn = store.conn.lock();
            conn.execute(
                "UPDATE notes SET embedding_vector = NULL WHERE id = ?1",
                params![missing],
            )
            .unwrap();
            conn.execute(
                "UPDATE notes SET embedding_vector = ?1 WHERE id = ?2",
                params![embedding_to_blob(&[1.0, 0.0]), stale],
            )
            .unwrap();
        }

        let ids: Vec<i64> = store.embedded_notes().unwrap().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![good]);
        assert_eq!(store.stats().unwrap().without_embedding, 2);
        assert!(!store.get(missing).unwrap().has_embedding());
    }

    #[test]
    fn test_reembed_all_restores_embeddings() {
        let store = store();
        let id = store.create("sky", None).unwrap();
        let original = store.get(id).unwrap();
        store
            .conn
            .lock()
            .execute("UPDATE notes SET embedding_vector = NULL WHERE id = ?1", params![id])
            .unwrap();

        assert_eq!(store.reembed_all().unwrap(), 1);
        let restored = store.get(id).unwrap();
        assert_eq!(restored.embedding, original.embedding);
        assert_eq!(restored.created_at, original.created_at);
    }

    #[test]
    fn test_provider_failure_leaves_store_untouched() {
        let store = NoteStore::open_in_memory(Arc::new(FailingEmbedder)).unwrap();
        assert!(matches!(store.create("sky", None), Err(StoreError::Provider(_))));
        assert_eq!(store.stats().unwrap().total, 0);
    }

    #[test]
    fn test_reads_legacy_rows() {
        let store = store();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO notes (content, category, timestamp, embedding_vector) VALUES ('old', 'general', '2024-01-01T09:30:00.250000', NULL)",
                [],
            )
            .unwrap();
        let note = store.get(1).unwrap();
        assert_eq!(note.content, "old");
        assert!(!note.has_embedding());
    }

    #[test]
    fn test_writes_are_durable_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/memory.db");
        let embedder: Arc<dyn Embedder> = Arc::new(KeywordEmbedder::new());

        let id = {
            let store = NoteStore::open(&path, embedder.clone()).unwrap();
            store.create("The sky is blue", Some("weather")).unwrap()
        };

        let reopened = NoteStore::open(&path, embedder).unwrap();
        let note = reopened.get(id).unwrap();
        assert_eq!(note.content, "The sky is blue");
        assert_eq!(note.category, "weather");
        assert!(note.has_embedding());
    }

    #[test]
    fn test_concurrent_updates_never_tear() {
        let store = Arc::new(store());
        let id = store.create("sky", Some("a")).unwrap();

        let writers: Vec<_> = [("ocean", "b"), ("deep", "c"), ("blue", "d")]
            .into_iter()
            .map(|(content, category)| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        store.update(id, content, Some(category)).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let note = store.get(id).unwrap();
        let expected = KeywordEmbedder::new().encode_one(&note.content).unwrap();
        assert_eq!(note.embedding, Some(expected));
        let pair = (note.content.as_str(), note.category.as_str());
        assert!(matches!(pair, ("ocean", "b") | ("deep", "c") | ("blue", "d")));
    }
}
