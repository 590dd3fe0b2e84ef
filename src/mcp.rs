//! MCP tool server: JSON-RPC 2.0 over stdio, one request per line.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::api::SettingsInput;
use crate::parser;
use crate::provider::{EditRequest, Provider};
use crate::xmp;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "lr-ai-settings";

const METHOD_NOT_FOUND: i64 = -32601;

// ── JSON-RPC types ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[allow(dead_code)]
    #[serde(default)]
    jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

impl JsonRpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Value, code: i64, message: String) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(id),
            result: None,
            error: Some(JsonRpcError { code, message }),
        }
    }
}

// ── Tool parameters ──────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
struct AnalyzeImageParams {
    /// Absolute path to the original image file.
    image_path: String,
    /// Absolute path to an existing XMP sidecar, when the image already has edits.
    #[serde(default)]
    xmp_path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RenderXmpParams {
    /// Settings object, or model text containing one.
    settings: Value,
    /// Existing sidecar to merge into.
    #[serde(default)]
    xmp_path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ParseResponseParams {
    /// Raw model output.
    text: String,
}

fn schema_value<T: JsonSchema>() -> Value {
    let root = schema_for!(T);
    serde_json::to_value(root).unwrap_or_else(|_| json!({ "type": "object", "properties": {} }))
}

fn de<T: serde::de::DeserializeOwned>(input: &Value) -> Result<T, String> {
    serde_json::from_value(input.clone()).map_err(|e| format!("Invalid arguments: {e}"))
}

/// The `tools/list` payload.
pub fn tool_definitions() -> Value {
    json!({
        "tools": [
            {
                "name": "analyze_image",
                "description": "Analyze an image and return suggested Lightroom Develop settings as a JSON string.",
                "inputSchema": schema_value::<AnalyzeImageParams>(),
            },
            {
                "name": "render_xmp",
                "description": "Render develop settings as an XMP sidecar, merged into an existing one when xmp_path is given.",
                "inputSchema": schema_value::<RenderXmpParams>(),
            },
            {
                "name": "parse_response",
                "description": "Extract and validate the suggestion JSON from raw model output.",
                "inputSchema": schema_value::<ParseResponseParams>(),
            },
        ]
    })
}

fn text_content(text: String) -> Value {
    json!({ "content": [{ "type": "text", "text": text }] })
}

fn pretty(value: &impl Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| e.to_string())
}

// ── Server ───────────────────────────────────────────────────────

pub struct McpServer {
    provider: Arc<dyn Provider>,
}

impl McpServer {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }

    /// Answer one request. Notifications (no id) get no response.
    pub async fn handle_request(&self, req: &JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(id) = req.id.clone() else {
            debug!(method = %req.method, "notification");
            return None;
        };

        let resp = match req.method.as_str() {
            "initialize" => JsonRpcResponse::ok(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
                }),
            ),
            "tools/list" => JsonRpcResponse::ok(id, tool_definitions()),
            "tools/call" => {
                let params = req.params.clone().unwrap_or_else(|| json!({}));
                match self.call_tool(&params).await {
                    Ok(text) => JsonRpcResponse::ok(id, text_content(text)),
                    Err(e) => JsonRpcResponse::ok(
                        id,
                        json!({ "content": [{ "type": "text", "text": e }], "isError": true }),
                    ),
                }
            }
            "ping" => JsonRpcResponse::ok(id, json!({})),
            _ => JsonRpcResponse::err(id, METHOD_NOT_FOUND, format!("Method not found: {}", req.method)),
        };
        Some(resp)
    }

    async fn call_tool(&self, params: &Value) -> Result<String, String> {
        let name = params.get("name").and_then(Value::as_str).unwrap_or("");
        let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
        info!(tool = name, "tool call");

        match name {
            "analyze_image" => self.analyze_image(de(&args)?).await,
            "render_xmp" => render_xmp(de(&args)?).await,
            "parse_response" => {
                let p: ParseResponseParams = de(&args)?;
                let response = parser::parse_response(&p.text).map_err(|e| e.to_string())?;
                pretty(&response)
            }
            other => Err(format!("Unknown tool: {other}")),
        }
    }

    async fn analyze_image(&self, p: AnalyzeImageParams) -> Result<String, String> {
        if !Path::new(&p.image_path).exists() {
            return Err(format!("Error: Image path {} does not exist.", p.image_path));
        }
        if let Some(xmp_path) = p.xmp_path.as_deref() {
            if !Path::new(xmp_path).exists() {
                return Err(format!("Error: XMP path {xmp_path} does not exist."));
            }
        }
        let request = EditRequest::new(&p.image_path).with_xmp(p.xmp_path.map(PathBuf::from));
        let response = self
            .provider
            .suggest(&request)
            .await
            .map_err(|e| format!("Error analyzing image: {e}"))?;
        pretty(&response)
    }

    /// Serve requests from stdin until it closes.
    pub async fn serve_stdio(&self) -> std::io::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();
        info!(provider = self.provider.name(), "MCP server ready on stdio");

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let request: JsonRpcRequest = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "failed to parse request");
                    continue;
                }
            };
            if let Some(response) = self.handle_request(&request).await {
                let mut out = serde_json::to_vec(&response)?;
                out.push(b'\n');
                stdout.write_all(&out).await?;
                stdout.flush().await?;
            }
        }
        Ok(())
    }
}

async fn render_xmp(p: RenderXmpParams) -> Result<String, String> {
    let input: SettingsInput = de(&p.settings)?;
    let settings = input.resolve().map_err(|e| e.to_string())?;
    let existing = match p.xmp_path.as_deref() {
        Some(path) => match tokio::fs::read_to_string(path).await {
            Ok(text) => Some(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(format!("Error: XMP path {path} does not exist."))
            }
            Err(e) => return Err(format!("Failed to read {path}: {e}")),
        },
        None => None,
    };
    Ok(xmp::render(&settings, existing.as_deref()))
}
