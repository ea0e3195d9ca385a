//! Protocol dispatcher
//!
//! Routes one authorized JSON-RPC request to a capability response or a
//! tool, and always produces exactly one response envelope.

use serde_json::{json, Value};
use std::sync::Arc;

use super::protocol::{
    Method, RpcError, RpcRequest, RpcResponse, PROTOCOL_VERSION, SERVER_NAME, SERVER_VERSION,
};
use super::tools::{catalog, text_content, ToolExecutor};
use crate::search::calibration::Diagnostics;
use crate::search::notedb::NoteStore;

pub struct Dispatcher {
    executor: ToolExecutor,
}

impl Dispatcher {
    pub fn new(store: Arc<NoteStore>, diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            executor: ToolExecutor::new(store, diagnostics),
        }
    }

    /// Handle a raw request body. An empty body means `initialize`.
    pub fn handle_body(&self, body: &[u8]) -> RpcResponse {
        if body.iter().all(u8::is_ascii_whitespace) {
            return self.handle(RpcRequest::bare());
        }
        let value = match serde_json::from_slice::<Value>(body) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(error = %e, "Unparseable request body");
                return RpcResponse::error(Value::Null, RpcError::parse_error());
            }
        };
        match RpcRequest::from_value(value) {
            Ok(request) => self.handle(request),
            Err((id, error)) => {
                tracing::debug!(error = %error, "Malformed request");
                RpcResponse::error(id, error)
            }
        }
    }

    pub fn handle(&self, request: RpcRequest) -> RpcResponse {
        let RpcRequest { method, params, id } = request;

        let Some(parsed) = Method::parse(method.as_deref()) else {
            let method = method.unwrap_or_default();
            tracing::debug!(method = %method, "Unknown method");
            return RpcResponse::error(id, RpcError::method_not_found(&method));
        };

        tracing::debug!(method = parsed.as_str(), "Dispatching request");
        match self.route(parsed, params) {
            Ok(result) => RpcResponse::success(id, result),
            Err(error) => RpcResponse::error(id, error),
        }
    }

    fn route(&self, method: Method, params: Value) -> Result<Value, RpcError> {
        match method {
            Method::Initialize => Ok(initialize_result()),
            Method::Ping => Ok(json!({})),
            Method::ToolsList => Ok(json!({ "tools": catalog() })),
            Method::ToolsCall => self.call_tool(params),
        }
    }

    fn call_tool(&self, params: Value) -> Result<Value, RpcError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("Missing tool name"))?;
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
        let text = self.executor.call_named(name, arguments)?;
        Ok(text_content(text))
    }
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": { "tools": {} },
        "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::{
        INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
    };
    use crate::search::embedding::Embedder;
    use crate::search::testing::{FailingEmbedder, KeywordEmbedder};

    fn dispatcher() -> Dispatcher {
        let embedder: Arc<dyn Embedder> = Arc::new(KeywordEmbedder::new());
        let store = Arc::new(NoteStore::open_in_memory(embedder).unwrap());
        Dispatcher::new(store, Arc::new(Diagnostics::new()))
    }

    fn call(d: &Dispatcher, id: Value, name: &str, arguments: Value) -> RpcResponse {
        d.handle(RpcRequest::new(
            "tools/call",
            json!({"name": name, "arguments": arguments}),
            id,
        ))
    }

    fn text(resp: &RpcResponse) -> &str {
        resp.result.as_ref().unwrap()["content"][0]["text"]
            .as_str()
            .unwrap()
    }

    #[test]
    fn test_initialize_descriptor() {
        let d = dispatcher();
        let resp = d.handle(RpcRequest::new("initialize", json!({}), json!(0)));
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["capabilities"], json!({"tools": {}}));
        assert_eq!(result["serverInfo"]["name"], "neural-memory");
        assert_eq!(resp.id, json!(0));
    }

    #[test]
    fn test_empty_body_is_initialize() {
        let d = dispatcher();
        let resp = d.handle_body(b"");
        assert_eq!(resp.id, json!(1));
        assert!(resp.result.unwrap().get("serverInfo").is_some());

        let resp = d.handle_body(br#"{"id": 9}"#);
        assert_eq!(resp.id, json!(9));
        assert!(resp.result.unwrap().get("protocolVersion").is_some());
    }

    #[test]
    fn test_parse_error_has_null_id() {
        let resp = dispatcher().handle_body(b"{not json");
        assert_eq!(resp.id, Value::Null);
        assert_eq!(resp.error.unwrap().code, PARSE_ERROR);
    }

    #[test]
    fn test_malformed_request_keeps_id() {
        let d = dispatcher();

        let resp = d.handle_body(br#"{"method": 5, "id": 3}"#);
        assert_eq!(resp.id, json!(3));
        assert_eq!(resp.error.unwrap().code, METHOD_NOT_FOUND);

        let resp = d.handle_body(b"[1,2]");
        assert_eq!(resp.id, Value::Null);
        assert_eq!(resp.error.unwrap().code, INVALID_REQUEST);

        let resp = d.handle_body(br#"{"method": "ping", "id": {"a": 1}}"#);
        assert_eq!(resp.id, json!({"a": 1}));
        assert!(!resp.is_error());
    }

    #[test]
    fn test_unknown_method_echoes_id() {
        let resp = dispatcher().handle(RpcRequest::new("resources/list", json!({}), json!("req-42")));
        assert_eq!(resp.id, json!("req-42"));
        assert_eq!(resp.error.unwrap().code, METHOD_NOT_FOUND);
        assert!(resp.result.is_none());
    }

    #[test]
    fn test_tools_list() {
        let resp = dispatcher().handle(RpcRequest::new("tools/list", Value::Null, json!(2)));
        let tools = resp.result.unwrap()["tools"].as_array().unwrap().len();
        assert_eq!(tools, 5);
    }

    #[test]
    fn test_ping() {
        let resp = dispatcher().handle(RpcRequest::new("ping", Value::Null, json!(3)));
        assert_eq!(resp.result, Some(json!({})));
    }

    #[test]
    fn test_sky_scenario_over_protocol() {
        let d = dispatcher();

        let resp = call(&d, json!(1), "search", json!({"query": "anything", "limit": 5}));
        assert!(text(&resp).starts_with("Found 0 relevant notes (from 0 total matches)"));

        let resp = call(&d, json!(2), "add_note", json!({"content": "The sky is blue", "category": "general"}));
        assert!(text(&resp).starts_with("Added note #1"));

        let resp = call(&d, json!(3), "search", json!({"query": "color of the sky", "limit": 5}));
        assert!(text(&resp).contains("[ID:1]"));

        let resp = call(
            &d,
            json!(4),
            "update_note",
            json!({"note_id": 1, "content": "The ocean is deep", "category": "nature"}),
        );
        assert!(text(&resp).contains("Category: nature"));

        let resp = call(&d, json!(5), "search", json!({"query": "color of the sky", "limit": 5}));
        assert!(!text(&resp).contains("[ID:1]"));
        assert_eq!(resp.id, json!(5));
    }

    #[test]
    fn test_tool_errors_map_to_codes() {
        let d = dispatcher();

        let resp = call(&d, json!(1), "drop_everything", json!({}));
        let error = resp.error.unwrap();
        assert_eq!(error.code, INVALID_PARAMS);
        assert_eq!(error.message, "Unknown tool: drop_everything");

        let resp = d.handle(RpcRequest::new("tools/call", json!({}), json!(2)));
        assert_eq!(resp.error.unwrap().code, INVALID_PARAMS);

        let resp = call(&d, json!(3), "update_note", json!({"note_id": 99, "content": "x"}));
        let error = resp.error.unwrap();
        assert_eq!(error.code, INVALID_PARAMS);
        assert_eq!(error.message, "Note #99 not found");

        let resp = call(&d, json!(4), "neural_stats", Value::Null);
        assert!(text(&resp).starts_with("Neural Memory Statistics:"));
    }

    #[test]
    fn test_provider_failure_is_internal_error() {
        let store = Arc::new(NoteStore::open_in_memory(Arc::new(FailingEmbedder)).unwrap());
        let d = Dispatcher::new(store, Arc::new(Diagnostics::new()));

        let resp = call(&d, json!(7), "add_note", json!({"content": "secret path /var/db"}));
        let error = resp.error.unwrap();
        assert_eq!(error.code, INTERNAL_ERROR);
        assert_eq!(error.message, "Internal error");
        assert_eq!(resp.id, json!(7));
    }
}
