//! MCP protocol implementation for JSON-RPC 2.0 communication.
//!
//! This module provides the core MCP server implementation including:
//! - JSON-RPC 2.0 request/response handling
//! - Tool definitions and schemas
//! - Line-delimited stdio transport

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

use super::{handle_tool_call, SharedState};

#[cfg(test)]
#[path = "mcp_tests.rs"]
mod mcp_tests;

/// MCP protocol revision this server speaks.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request identifier (None for notifications).
    pub id: Option<Value>,
    /// The method name to invoke.
    pub method: String,
    /// Optional parameters for the method.
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request identifier; null when the request could not be parsed.
    pub id: Value,
    /// The result on success (mutually exclusive with error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure (mutually exclusive with result).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    /// Error code (negative for predefined errors).
    pub code: i32,
    /// Human-readable error message.
    pub message: String,
}

/// MCP server information returned during initialization.
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    /// The server name identifier.
    pub name: String,
    /// The server version string.
    pub version: String,
}

/// MCP server capabilities advertised to clients.
#[derive(Debug, Serialize)]
pub struct Capabilities {
    /// Tool-related capabilities.
    pub tools: ToolCapabilities,
}

/// Tool-specific capabilities.
#[derive(Debug, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change dynamically.
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Result of the MCP initialize handshake.
#[derive(Debug, Serialize)]
pub struct InitializeResult {
    /// The MCP protocol version supported.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Server capabilities.
    pub capabilities: Capabilities,
    /// Server identification information.
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

/// MCP tool definition with JSON Schema.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    /// Unique tool name (used in tool calls).
    pub name: String,
    /// Human-readable description of the tool.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Parameters for a tools/call request.
#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    /// The name of the tool to invoke.
    pub name: String,
    /// Optional arguments for the tool.
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Content item within a tool result.
#[derive(Debug, Serialize)]
pub struct ToolResultContent {
    /// The content type (always "text" here).
    #[serde(rename = "type")]
    pub content_type: String,
    /// The text content of the result.
    pub text: String,
}

/// Result of a tool invocation.
#[derive(Debug, Serialize)]
pub struct ToolCallResult {
    /// The result content items.
    pub content: Vec<ToolResultContent>,
    /// Whether the result represents an error.
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

impl ToolCallResult {
    fn text(text: String, is_error: bool) -> Self {
        Self {
            content: vec![ToolResultContent {
                content_type: "text".to_string(),
                text,
            }],
            is_error: is_error.then_some(true),
        }
    }
}

/// MCP server speaking line-delimited JSON-RPC 2.0.
pub struct McpServer {
    state: SharedState,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Run the server on stdin/stdout
    pub async fn run(&self) -> std::io::Result<()> {
        info!("Listening for JSON-RPC requests on stdio");
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serve requests from `reader` until EOF, writing one response line per request.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();

        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                info!("EOF received, shutting down");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            debug!(request = %trimmed, "Received request");

            let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => {
                    error!(error = %e, "Failed to parse request");
                    Some(JsonRpcResponse::error(
                        None,
                        -32700,
                        format!("Parse error: {}", e),
                    ))
                }
            };

            if let Some(response) = response {
                let response_json = serde_json::to_string(&response)?;
                debug!(response = %response_json, "Sending response");

                writer.write_all(response_json.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        Ok(())
    }

    /// Handle a single JSON-RPC request; notifications get no response
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let is_notification = request.id.is_none();

        match request.method.as_str() {
            "initialize" => Some(self.handle_initialize(request.id)),
            "initialized" | "notifications/initialized" | "notifications/cancelled" => {
                debug!(method = %request.method, "Received notification");
                None
            }
            "tools/list" => Some(JsonRpcResponse::success(
                request.id,
                serde_json::json!({ "tools": tool_definitions() }),
            )),
            "tools/call" => Some(self.handle_tool_call(request.id, request.params).await),
            "ping" => Some(JsonRpcResponse::success(
                request.id,
                Value::Object(Default::default()),
            )),
            method if is_notification => {
                debug!(method = %method, "Unknown notification, ignoring");
                None
            }
            method => {
                error!(method = %method, "Unknown method");
                Some(JsonRpcResponse::error(
                    request.id,
                    -32601,
                    format!("Method not found: {}", method),
                ))
            }
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling initialize request");

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: Capabilities {
                tools: ToolCapabilities {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        match serde_json::to_value(result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => JsonRpcResponse::error(id, -32603, format!("Internal error: {}", e)),
        }
    }

    async fn handle_tool_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match params.map(serde_json::from_value) {
            Some(Ok(p)) => p,
            Some(Err(e)) => {
                return JsonRpcResponse::error(id, -32602, format!("Invalid params: {}", e))
            }
            None => return JsonRpcResponse::error(id, -32602, "Missing params"),
        };

        info!(tool = %params.name, "Handling tool call");

        // Tool failures are reported in-band so the client model can read them
        let tool_result = match handle_tool_call(&self.state, &params.name, params.arguments).await
        {
            Ok(result) => match serde_json::to_string_pretty(&result) {
                Ok(text) => ToolCallResult::text(text, false),
                Err(e) => ToolCallResult::text(format!("Error: {}", e), true),
            },
            Err(e) => ToolCallResult::text(format!("Error: {}", e), true),
        };

        match serde_json::to_value(tool_result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => JsonRpcResponse::error(id, -32603, format!("Internal error: {}", e)),
        }
    }
}

// ============================================================================
// Tool definitions
// ============================================================================

/// Every tool this server exposes, in listing order.
pub fn tool_definitions() -> Vec<Tool> {
    vec![
        create_session_tool(),
        submit_prescreening_tool(),
        generate_questions_tool(),
        submit_answers_tool(),
        analyze_tool(),
        get_result_tool(),
        preview_questions_tool(),
    ]
}

fn session_id_schema() -> Value {
    serde_json::json!({
        "type": "string",
        "description": "Session ID returned by assessment_create_session"
    })
}

fn partner_schema() -> Value {
    serde_json::json!({
        "type": "integer",
        "enum": [1, 2],
        "description": "Which partner is submitting (1 or 2)"
    })
}

fn prescreening_schema(description: &str) -> Value {
    serde_json::json!({
        "type": "object",
        "description": description,
        "properties": {
            "relationship_length": {
                "type": "string",
                "enum": ["under_1_year", "1_3_years", "3_5_years", "5_plus_years"]
            },
            "is_married": { "type": ["boolean", "string", "integer"] },
            "has_children": { "type": ["boolean", "string", "integer"] },
            "owns_home": { "type": ["boolean", "string", "integer"] },
            "wants_children": {
                "type": "string",
                "enum": ["yes_soon", "yes_later", "maybe", "no"]
            },
            "living_situation": {
                "type": "string",
                "enum": ["together", "separate", "long_distance"]
            },
            "focusAreas": {
                "type": ["array", "string"],
                "items": { "type": "string" },
                "description": "finances, travel, home, career, family, lifestyle, communication, values"
            },
            "currentPriority": {
                "type": "string",
                "enum": [
                    "moving", "buy_home", "wedding", "baby", "financial_goal",
                    "travel_trip", "career_change", "just_exploring"
                ]
            },
            "assessment_depth": {
                "type": "string",
                "enum": ["quick", "standard", "deep"]
            }
        },
        "additionalProperties": true
    })
}

fn create_session_tool() -> Tool {
    Tool {
        name: "assessment_create_session".to_string(),
        description: "Start a compatibility assessment for two partners. Returns the session to use with every other assessment tool.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "partner1_name": { "type": "string", "description": "Display name of the first partner" },
                "partner2_name": { "type": "string", "description": "Display name of the second partner" }
            },
            "required": ["partner1_name", "partner2_name"],
            "additionalProperties": false
        }),
    }
}

fn submit_prescreening_tool() -> Tool {
    Tool {
        name: "assessment_submit_prescreening".to_string(),
        description: "Record one partner's prescreening answers. Missing fields take defaults; partner 1 wins where both partners answer the same field. Returns the derived relationship context.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": session_id_schema(),
                "partner": partner_schema(),
                "answers": prescreening_schema("Prescreening answers; snake_case and camelCase keys are both accepted")
            },
            "required": ["session_id", "partner", "answers"],
            "additionalProperties": false
        }),
    }
}

fn generate_questions_tool() -> Tool {
    Tool {
        name: "assessment_generate_questions".to_string(),
        description: "Produce the session's tailored question set. Uses the AI pipe when available and falls back to curated question pools; a stored set is returned unchanged on later calls.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": { "session_id": session_id_schema() },
            "required": ["session_id"],
            "additionalProperties": false
        }),
    }
}

fn submit_answers_tool() -> Tool {
    Tool {
        name: "assessment_submit_answers".to_string(),
        description: "Record one partner's answers. Every question id must belong to the session's question set and every value must be one of that question's options; resubmitting a question replaces the earlier answer.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": session_id_schema(),
                "partner": partner_schema(),
                "answers": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "properties": {
                            "questionId": { "type": "string" },
                            "value": { "type": "string" }
                        },
                        "required": ["questionId", "value"]
                    }
                }
            },
            "required": ["session_id", "partner", "answers"],
            "additionalProperties": false
        }),
    }
}

fn analyze_tool() -> Tool {
    Tool {
        name: "assessment_analyze".to_string(),
        description: "Score both partners' answers: overall and per-category alignment, strongest alignments, biggest differences, and a narrative with discussion prompts and goals. Each call stores a new result.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": { "session_id": session_id_schema() },
            "required": ["session_id"],
            "additionalProperties": false
        }),
    }
}

fn get_result_tool() -> Tool {
    Tool {
        name: "assessment_get_result".to_string(),
        description: "Fetch the most recent alignment result for a session, or null if it has not been analyzed.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": { "session_id": session_id_schema() },
            "required": ["session_id"],
            "additionalProperties": false
        }),
    }
}

fn preview_questions_tool() -> Tool {
    Tool {
        name: "assessment_preview_questions".to_string(),
        description: "Run question selection for a prescreening without creating a session.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "prescreening": prescreening_schema("Partner 1 prescreening answers"),
                "partner2_prescreening": prescreening_schema("Optional partner 2 prescreening answers")
            },
            "required": ["prescreening"],
            "additionalProperties": false
        }),
    }
}
