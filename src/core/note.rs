use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

/// Category assigned when a caller does not provide one
pub const DEFAULT_CATEGORY: &str = "general";

/// A stored note.
///
/// `id` is assigned by the store and never changes. `content`, `category`,
/// `created_at` and `embedding` are always replaced together.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    pub id: i64,
    pub content: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

impl Note {
    pub fn has_embedding(&self) -> bool {
        self.embedding.is_some()
    }
}

/// What a delete removed, echoed back for confirmation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeletedNote {
    pub id: i64,
    pub content: String,
    pub category: String,
}

/// Read-only diagnostics over the note collection
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub by_category: BTreeMap<String, usize>,
    /// Notes search cannot match: no embedding, one from another dimension,
    /// or an all-zero vector
    pub without_embedding: usize,
}

/// Resolve a caller-supplied category, treating blank as absent
pub fn normalize_category(category: Option<&str>) -> Option<String> {
    category
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from)
}

/// First `max_chars` characters of `content` (char-aware for Unicode)
pub fn preview(content: &str, max_chars: usize) -> String {
    content.chars().take(max_chars).collect()
}

/// Parse a stored timestamp.
///
/// Rows written by this crate are RFC 3339; rows carried over from older
/// databases may be naive ISO 8601 local time, read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
