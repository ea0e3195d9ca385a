//! MCP surface for the note store
//!
//! Tools are defined once in [`tools`] and served over HTTP ([`http`],
//! JSON-RPC behind a shared secret) or over stdio via rmcp.

pub mod auth;
pub mod dispatcher;
pub mod http;
pub mod protocol;
#[cfg(feature = "mcp")]
mod server;
pub mod tools;

pub use auth::AuthGuard;
pub use dispatcher::Dispatcher;
pub use http::HttpState;
pub use protocol::{RpcError, RpcRequest, RpcResponse};
#[cfg(feature = "mcp")]
pub use server::{run_mcp_server, MemoryService};
pub use tools::{Tool, ToolExecutor};
