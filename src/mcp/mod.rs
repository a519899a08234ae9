//! MCP (Model Context Protocol) server for the code-analysis store.
//!
//! Provides a JSON-RPC 2.0 interface over stdio. Each tool validates its
//! arguments against a declared JSON Schema and answers with plain text.

/// Schema validation and typed access to tool arguments.
pub mod args;

/// Tool implementations, grouped by entity family.
pub mod handlers;

/// MCP server implementation.
pub mod server;

/// Tool definitions and dispatch.
pub mod tools;

/// JSON-RPC 2.0 transport types.
pub mod transport;

pub use args::{validate_arguments, Args};
pub use server::McpServer;
pub use tools::{get_tool_definitions, handle_tool_call, truncate_response, ToolDefinition, ToolOutcome};
pub use transport::{ErrorCode, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
