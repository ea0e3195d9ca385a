//! Tool catalog and execution
//!
//! Shared by the HTTP dispatcher and the stdio server. Every tool returns
//! plain text; transports wrap it in their own result envelope.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt::Write as _;
use std::sync::Arc;
use thiserror::Error;

use super::protocol::RpcError;
use crate::core::note::preview;
use crate::core::DEFAULT_CATEGORY;
use crate::search::calibration::Diagnostics;
use crate::search::engine::{SearchEngine, DEFAULT_SEARCH_LIMIT};
use crate::search::notedb::{NoteStore, StoreError};

/// Characters of the removed content echoed by `delete_note`
const DELETE_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Search,
    Stats,
    AddNote,
    UpdateNote,
    DeleteNote,
}

impl Tool {
    pub const ALL: [Tool; 5] = [
        Tool::Search,
        Tool::Stats,
        Tool::AddNote,
        Tool::UpdateNote,
        Tool::DeleteNote,
    ];

    /// Accepts the listed names plus the two legacy aliases
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "search" | "search_neural_memory" => Some(Self::Search),
            "stats" | "neural_stats" => Some(Self::Stats),
            "add_note" => Some(Self::AddNote),
            "update_note" => Some(Self::UpdateNote),
            "delete_note" => Some(Self::DeleteNote),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Stats => "stats",
            Self::AddNote => "add_note",
            Self::UpdateNote => "update_note",
            Self::DeleteNote => "delete_note",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Search => "Semantic search through stored notes. Returns notes whose meaning is close to the query.",
            Self::Stats => "Get memory statistics: total notes and counts by category.",
            Self::AddNote => "Add a new note to memory.",
            Self::UpdateNote => "Replace the content of an existing note. Category is kept unless given.",
            Self::DeleteNote => "Delete a note by id.",
        }
    }

    fn input_schema(&self) -> Value {
        match self {
            Self::Search => json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Natural language search query"},
                    "limit": {"type": "integer", "description": "Max results (default 5, max 20)", "minimum": 1, "maximum": 20, "default": 5}
                },
                "required": ["query"]
            }),
            Self::Stats => json!({"type": "object", "properties": {}}),
            Self::AddNote => json!({
                "type": "object",
                "properties": {
                    "content": {"type": "string", "description": "Note text"},
                    "category": {"type": "string", "description": "Category (default: general)", "default": DEFAULT_CATEGORY}
                },
                "required": ["content"]
            }),
            Self::UpdateNote => json!({
                "type": "object",
                "properties": {
                    "note_id": {"type": "integer", "description": "Id of the note to update"},
                    "content": {"type": "string", "description": "New note text"},
                    "category": {"type": "string", "description": "New category (kept when omitted)"}
                },
                "required": ["note_id", "content"]
            }),
            Self::DeleteNote => json!({
                "type": "object",
                "properties": {
                    "note_id": {"type": "integer", "description": "Id of the note to delete"}
                },
                "required": ["note_id"]
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// The fixed `tools/list` catalog
pub fn catalog() -> Vec<ToolDefinition> {
    Tool::ALL
        .iter()
        .map(|tool| ToolDefinition {
            name: tool.name(),
            description: tool.description(),
            input_schema: tool.input_schema(),
        })
        .collect()
}

/// Arguments for `search`
#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "mcp", derive(schemars::JsonSchema))]
pub struct SearchArgs {
    /// Natural language search query
    pub query: String,
    /// Maximum number of results (default 5, clamped to 1..=20)
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    DEFAULT_SEARCH_LIMIT
}

/// Arguments for `add_note`
#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "mcp", derive(schemars::JsonSchema))]
pub struct AddNoteArgs {
    /// Note text
    pub content: String,
    /// Category (default: general)
    #[serde(default)]
    pub category: Option<String>,
}

/// Arguments for `update_note`
#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "mcp", derive(schemars::JsonSchema))]
pub struct UpdateNoteArgs {
    /// Id of the note to update
    pub note_id: i64,
    /// New note text
    pub content: String,
    /// New category; the current one is kept when omitted
    #[serde(default)]
    pub category: Option<String>,
}

/// Arguments for `delete_note`
#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "mcp", derive(schemars::JsonSchema))]
pub struct DeleteNoteArgs {
    /// Id of the note to delete
    pub note_id: i64,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ToolError {
    /// True for failures the caller caused and can correct
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::UnknownTool(_) | Self::InvalidArguments(_) => true,
            Self::Store(StoreError::Validation(_) | StoreError::NotFound(_)) => true,
            Self::Store(_) => false,
        }
    }
}

impl From<ToolError> for RpcError {
    fn from(err: ToolError) -> Self {
        if err.is_client_error() {
            RpcError::invalid_params(err.to_string())
        } else {
            tracing::error!(error = %err, "Tool execution failed");
            RpcError::internal()
        }
    }
}

/// Runs tools against the store. Blocking; call from a blocking context.
pub struct ToolExecutor {
    store: Arc<NoteStore>,
    engine: SearchEngine,
    diagnostics: Arc<Diagnostics>,
}

impl ToolExecutor {
    pub fn new(store: Arc<NoteStore>, diagnostics: Arc<Diagnostics>) -> Self {
        let engine = SearchEngine::new(store.clone(), store.embedder().clone());
        Self {
            store,
            engine,
            diagnostics,
        }
    }

    /// Dispatch by tool with raw JSON arguments
    /// Resolve a wire tool name, legacy aliases included, and run it
    pub fn call_named(&self, name: &str, arguments: Value) -> Result<String, ToolError> {
        let tool = Tool::parse(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        self.call(tool, arguments)
    }

    pub fn call(&self, tool: Tool, arguments: Value) -> Result<String, ToolError> {
        tracing::debug!(tool = tool.name(), "Executing tool");
        match tool {
            Tool::Search => self.search(parse_args(arguments)?),
            Tool::Stats => self.stats(),
            Tool::AddNote => self.add_note(parse_args(arguments)?),
            Tool::UpdateNote => self.update_note(parse_args(arguments)?),
            Tool::DeleteNote => self.delete_note(parse_args(arguments)?),
        }
    }

    pub fn search(&self, args: SearchArgs) -> Result<String, ToolError> {
        let outcome = self.engine.search(&args.query, args.limit)?;

        let mut text = format!(
            "Found {} relevant notes (from {} total matches):\n\n",
            outcome.results.len(),
            outcome.total_matches
        );
        for r in &outcome.results {
            let _ = write!(
                text,
                "[ID:{}] [{}] (similarity: {:.4})\n{}\n\n",
                r.note_id, r.category, r.similarity, r.content
            );
        }
        Ok(text)
    }

    pub fn stats(&self) -> Result<String, ToolError> {
        let stats = self.store.stats()?;

        let mut text = format!(
            "Neural Memory Statistics:\n\nTotal notes: {}\n\nBy category:\n",
            stats.total
        );
        for (category, count) in &stats.by_category {
            let _ = writeln!(text, "  - {}: {}", category, count);
        }
        if stats.without_embedding > 0 {
            let _ = write!(
                text,
                "\nNotes without a searchable embedding: {}\n",
                stats.without_embedding
            );
        }
        if let Some(warning) = self.diagnostics.drift_warning() {
            let _ = write!(text, "\nWarning: {}\n", warning);
        }
        Ok(text)
    }

    pub fn add_note(&self, args: AddNoteArgs) -> Result<String, ToolError> {
        let id = self.store.create(&args.content, args.category.as_deref())?;
        let note = self.store.get(id)?;
        tracing::info!(note_id = id, category = %note.category, "Note added");
        Ok(format!(
            "Added note #{}\nCategory: {}\nContent: {}",
            note.id, note.category, note.content
        ))
    }

    pub fn update_note(&self, args: UpdateNoteArgs) -> Result<String, ToolError> {
        let note = self
            .store
            .update(args.note_id, &args.content, args.category.as_deref())?;
        tracing::info!(note_id = note.id, category = %note.category, "Note updated");
        Ok(format!(
            "Updated note #{}\nCategory: {}\nContent: {}",
            note.id, note.category, note.content
        ))
    }

    pub fn delete_note(&self, args: DeleteNoteArgs) -> Result<String, ToolError> {
        let removed = self.store.delete(args.note_id)?;
        tracing::info!(note_id = removed.id, "Note deleted");
        Ok(format!(
            "Deleted note #{}\nWas: [{}] {}...",
            removed.id,
            removed.category,
            preview(&removed.content, DELETE_PREVIEW_CHARS)
        ))
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(arguments: Value) -> Result<T, ToolError> {
    // Absent arguments behave like an empty object so defaults still apply
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Wrap tool text in the MCP content envelope
pub fn text_content(text: String) -> Value {
    json!({"content": [{"type": "text", "text": text}]})
}
