//! MCP server that reads JSON-RPC 2.0 messages from stdin and writes
//! responses to stdout.
//!
//! The server owns the [`CodeService`] for the whole session and handles
//! one request at a time, so tool calls never overlap.

use std::collections::HashMap;
use std::time::Instant;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::service::CodeService;

use super::tools::{get_tool_definitions, handle_tool_call};
use super::transport::{ErrorCode, JsonRpcRequest, JsonRpcResponse};

/// MCP protocol revision implemented by this server.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Runtime statistics for the MCP server.
pub struct ServerStats {
    started_at: Instant,
    total_requests: u64,
    tool_calls: u64,
    tool_errors: u64,
    errors: u64,
    tool_call_counts: HashMap<String, u64>,
}

impl ServerStats {
    fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_requests: 0,
            tool_calls: 0,
            tool_errors: 0,
            errors: 0,
            tool_call_counts: HashMap::new(),
        }
    }
}

fn serialize(response: &JsonRpcResponse) -> Option<String> {
    match serde_json::to_string(response) {
        Ok(s) => Some(s),
        Err(e) => {
            error!(error = %e, "failed to serialize response");
            None
        }
    }
}

/// The MCP server wrapping a [`CodeService`].
pub struct McpServer {
    service: CodeService,
    stats: ServerStats,
}

impl McpServer {
    /// Creates a new MCP server around the given service.
    pub fn new(service: CodeService) -> Self {
        Self {
            service,
            stats: ServerStats::new(),
        }
    }

    pub fn service(&self) -> &CodeService {
        &self.service
    }

    /// Runs the server, reading JSON-RPC requests from stdin and writing
    /// responses to stdout. Runs until stdin is closed.
    pub async fn run(&mut self) -> Result<()> {
        let mut reader = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        let mut buf = Vec::new();
        info!("MCP server listening on stdio");

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "failed to read stdin");
                    break;
                }
            }

            let Some(json_line) = self.handle_bytes(&buf) else {
                continue;
            };
            let output = format!("{json_line}\n");
            if let Err(e) = stdout.write_all(output.as_bytes()).await {
                error!(error = %e, "failed to write response");
                break;
            }
            if let Err(e) = stdout.flush().await {
                error!(error = %e, "failed to flush stdout");
                break;
            }
        }

        info!(stats = %self.server_stats_json(), "stdin closed, shutting down");
        self.service.cleanup();
        Ok(())
    }

    /// Handles one raw input line, which may not be valid UTF-8. Blank lines
    /// get no response.
    pub fn handle_bytes(&mut self, raw: &[u8]) -> Option<String> {
        match std::str::from_utf8(raw) {
            Ok(text) => {
                let line = text.trim();
                if line.is_empty() {
                    return None;
                }
                self.handle_line(line)
            }
            Err(e) => {
                warn!(error = %e, "non-UTF-8 input line");
                let response = self.parse_error(format!("request is not valid UTF-8: {e}"));
                serialize(&response)
            }
        }
    }

    /// Handles one input line and returns the serialized response, if any.
    pub fn handle_line(&mut self, line: &str) -> Option<String> {
        let response = match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => self.handle_request(&request)?,
            Err(e) => self.parse_error(format!("failed to parse JSON-RPC request: {e}")),
        };
        serialize(&response)
    }

    fn parse_error(&mut self, message: String) -> JsonRpcResponse {
        self.stats.errors += 1;
        JsonRpcResponse::error(Value::Null, ErrorCode::ParseError, message)
    }

    /// Dispatches a parsed JSON-RPC request to the appropriate handler.
    ///
    /// Returns `None` for notifications.
    pub fn handle_request(&mut self, request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
        self.stats.total_requests += 1;
        let id = request.id.clone();
        debug!(method = %request.method, "request");

        if !request.has_valid_version() {
            self.stats.errors += 1;
            return Some(JsonRpcResponse::error(
                id,
                ErrorCode::InvalidRequest,
                format!("unsupported jsonrpc version: {}", request.jsonrpc),
            ));
        }

        let result = match request.method.as_str() {
            "initialize" => Some(self.handle_initialize(id)),
            "initialized" | "notifications/initialized" => None,
            "tools/list" => Some(JsonRpcResponse::success(
                id,
                json!({ "tools": get_tool_definitions() }),
            )),
            "tools/call" => Some(self.handle_tools_call(id, request.params.as_ref())),
            "ping" => Some(JsonRpcResponse::success(id, json!({}))),
            _ => Some(JsonRpcResponse::error(
                id,
                ErrorCode::MethodNotFound,
                format!("method not found: {}", request.method),
            )),
        };

        if let Some(ref resp) = result {
            if resp.error.is_some() {
                self.stats.errors += 1;
            }
        }

        result
    }

    fn handle_initialize(&self, id: Value) -> JsonRpcResponse {
        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
    }

    /// Handles `tools/call`. Tool failures are reported inside the result
    /// with `isError`; only malformed calls become JSON-RPC errors.
    fn handle_tools_call(&mut self, id: Value, params: Option<&Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::error(
                id,
                ErrorCode::InvalidParams,
                "missing params for tools/call".to_string(),
            );
        };

        let Some(tool_name) = params.get("name").and_then(|v| v.as_str()) else {
            return JsonRpcResponse::error(
                id,
                ErrorCode::InvalidParams,
                "missing 'name' in tools/call params".to_string(),
            );
        };

        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        self.stats.tool_calls += 1;
        *self
            .stats
            .tool_call_counts
            .entry(tool_name.to_string())
            .or_insert(0) += 1;

        let started = Instant::now();
        let outcome = handle_tool_call(&mut self.service, tool_name, arguments);
        if outcome.is_error() {
            self.stats.tool_errors += 1;
            warn!(tool = tool_name, outcome = ?outcome, "tool call failed");
        } else {
            debug!(tool = tool_name, elapsed_ms = started.elapsed().as_millis() as u64, "tool call done");
        }

        let max_chars = self.service.config().max_response_chars;
        JsonRpcResponse::success(id, outcome.into_content(max_chars))
    }

    /// Returns the current server runtime statistics as a JSON value.
    pub fn server_stats_json(&self) -> Value {
        json!({
            "uptime_secs": self.stats.started_at.elapsed().as_secs(),
            "total_requests": self.stats.total_requests,
            "tool_calls": self.stats.tool_calls,
            "tool_errors": self.stats.tool_errors,
            "errors": self.stats.errors,
            "tool_call_counts": self.stats.tool_call_counts,
        })
    }
}
