//! Neural memory MCP server over stdio

use anyhow::Result;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use std::sync::Arc;

use super::tools::{AddNoteArgs, DeleteNoteArgs, SearchArgs, ToolError, ToolExecutor, UpdateNoteArgs};

/// Neural memory MCP service
#[derive(Clone)]
pub struct MemoryService {
    executor: Arc<ToolExecutor>,
    tool_router: ToolRouter<Self>,
}

impl MemoryService {
    pub fn new(executor: Arc<ToolExecutor>) -> Self {
        Self {
            executor,
            tool_router: Self::tool_router(),
        }
    }

    /// Run a tool on the blocking pool and wrap its text
    async fn run<F>(&self, f: F) -> Result<CallToolResult, McpError>
    where
        F: FnOnce(&ToolExecutor) -> Result<String, ToolError> + Send + 'static,
    {
        let executor = self.executor.clone();
        let outcome = tokio::task::spawn_blocking(move || f(&executor))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Tool task failed");
                McpError::internal_error("Internal error", None)
            })?;

        match outcome {
            Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
            Err(e) if e.is_client_error() => Err(McpError::invalid_params(e.to_string(), None)),
            Err(e) => {
                tracing::error!(error = %e, "Tool execution failed");
                Err(McpError::internal_error("Internal error", None))
            }
        }
    }
}

#[tool_router]
impl MemoryService {
    /// Semantic search over stored notes
    #[tool(description = "Semantic search through stored notes. Returns notes whose meaning is close to the query, with similarity scores.")]
    async fn search(
        &self,
        Parameters(args): Parameters<SearchArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(move |exec| exec.search(args)).await
    }

    #[tool(description = "Get memory statistics: total notes and counts by category.")]
    async fn stats(&self) -> Result<CallToolResult, McpError> {
        self.run(|exec| exec.stats()).await
    }

    #[tool(description = "Add a new note to memory. Category defaults to 'general'.")]
    async fn add_note(
        &self,
        Parameters(args): Parameters<AddNoteArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(move |exec| exec.add_note(args)).await
    }

    #[tool(description = "Replace the content of an existing note. The category is kept unless given.")]
    async fn update_note(
        &self,
        Parameters(args): Parameters<UpdateNoteArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(move |exec| exec.update_note(args)).await
    }

    #[tool(description = "Delete a note by id.")]
    async fn delete_note(
        &self,
        Parameters(args): Parameters<DeleteNoteArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(move |exec| exec.delete_note(args)).await
    }
}

#[tool_handler]
impl ServerHandler for MemoryService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Neural memory: a persistent note store with semantic search. Add notes, then search them by meaning."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Serve the tools over stdin/stdout until the client disconnects
pub async fn run_mcp_server(executor: Arc<ToolExecutor>) -> Result<()> {
    use tokio::io::{stdin, stdout};

    let service = MemoryService::new(executor);
    let transport = (stdin(), stdout());
    tracing::info!("MCP server starting on stdio");
    let server = service.serve(transport).await?;
    server.waiting().await?;
    tracing::info!("MCP server stopped");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::calibration::Diagnostics;
    use crate::search::embedding::Embedder;
    use crate::search::notedb::NoteStore;
    use crate::search::testing::KeywordEmbedder;

    fn service() -> MemoryService {
        let embedder: Arc<dyn Embedder> = Arc::new(KeywordEmbedder::new());
        let store = Arc::new(NoteStore::open_in_memory(embedder).unwrap());
        MemoryService::new(Arc::new(ToolExecutor::new(store, Arc::new(Diagnostics::new()))))
    }

    #[test]
    fn test_router_lists_all_tools() {
        let mut names: Vec<String> = service()
            .tool_router
            .list_all()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["add_note", "delete_note", "search", "stats", "update_note"]);
    }

    #[tokio::test]
    async fn test_tool_calls_delegate_to_executor() {
        let svc = service();
        let added = svc
            .add_note(Parameters(AddNoteArgs {
                content: "blue sky".to_string(),
                category: None,
            }))
            .await
            .unwrap();
        assert_eq!(added.is_error, Some(false));

        let missing = svc
            .delete_note(Parameters(DeleteNoteArgs { note_id: 42 }))
            .await
            .unwrap_err();
        assert!(missing.message.contains("Note #42 not found"));
    }
}
