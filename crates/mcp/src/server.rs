// MCP server: JSON-RPC method routing on top of the capability dispatcher

use crate::capabilities::input_schema;
use crate::protocol::*;
use anyhow::Result;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use waypost_core::{
    Arguments, CapabilityKind, Dispatcher, ErrorKind, InvocationRequest, InvocationResult,
};

pub struct McpServer {
    info: ServerInfo,
    dispatcher: Dispatcher,
}

impl McpServer {
    pub fn new(info: ServerInfo, dispatcher: Dispatcher) -> Self {
        Self { info, dispatcher }
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    /// Handle one raw JSON-RPC message, returning the raw response.
    ///
    /// Notifications produce no response. Every request produces a well-formed
    /// response, including for unparseable input.
    pub async fn handle_invocation(&self, raw: &str) -> Option<String> {
        let response = match serde_json::from_str::<Value>(raw) {
            Err(e) => {
                tracing::debug!("Unparseable message: {}", e);
                Some(JsonRpcResponse::error(Value::Null, JsonRpcError::parse_error()))
            }
            Ok(value) => {
                let id = value.get("id").cloned().unwrap_or(Value::Null);
                match serde_json::from_value::<JsonRpcRequest>(value) {
                    Ok(request) if request.jsonrpc == JSONRPC_VERSION => self.handle_request(request).await,
                    Ok(_) => Some(JsonRpcResponse::error(
                        id,
                        JsonRpcError::invalid_request("jsonrpc must be \"2.0\""),
                    )),
                    Err(e) => Some(JsonRpcResponse::error(id, JsonRpcError::invalid_request(e.to_string()))),
                }
            }
        }?;

        match serde_json::to_string(&response) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::error!("Failed to serialize response: {}", e);
                None
            }
        }
    }

    /// Handle a parsed request; `None` for notifications
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(id) = request.id.clone() else {
            self.handle_notification(&request);
            return None;
        };
        let params = request.params.unwrap_or(Value::Null);

        let outcome = match request.method.as_str() {
            "initialize" => self.initialize(params),
            "ping" => Ok(serde_json::json!({})),
            "tools/list" => self.list_tools(),
            "tools/call" => self.call_tool(params).await,
            "resources/list" => self.list_resources(),
            "resources/templates/list" => self.list_resource_templates(),
            "resources/read" => self.read_resource(params).await,
            "prompts/list" => self.list_prompts(),
            "prompts/get" => self.get_prompt(params).await,
            method => {
                tracing::warn!("Unknown method: {}", method);
                Err(JsonRpcError::method_not_found(method))
            }
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        })
    }

    fn handle_notification(&self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            "notifications/initialized" => tracing::info!("Client initialized"),
            method => tracing::debug!("Ignoring notification: {}", method),
        }
    }

    fn initialize(&self, params: Value) -> Result<Value, JsonRpcError> {
        let requested = serde_json::from_value::<InitializeParams>(params).ok();
        if let Some(params) = &requested {
            tracing::info!(
                "Initializing session for {} {} (protocol {})",
                params.client_info.name,
                params.client_info.version,
                params.protocol_version
            );
        }

        let protocol_version = requested
            .map(|p| p.protocol_version)
            .filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(&v.as_str()))
            .unwrap_or_else(|| SUPPORTED_PROTOCOL_VERSIONS[0].to_string());

        to_value(InitializeResult {
            protocol_version,
            capabilities: ServerCapabilities {
                tools: Some(ListChangedCapability { list_changed: false }),
                resources: Some(ResourcesCapability {
                    subscribe: false,
                    list_changed: false,
                }),
                prompts: Some(ListChangedCapability { list_changed: false }),
            },
            server_info: self.info.clone(),
        })
    }

    fn list_tools(&self) -> Result<Value, JsonRpcError> {
        let tools = self
            .dispatcher
            .registry()
            .list(CapabilityKind::Tool)
            .iter()
            .map(|c| ToolSchema {
                name: c.name.clone(),
                description: c.description.clone(),
                input_schema: input_schema(&c.parameters),
            })
            .collect();
        to_value(ListToolsResult { tools })
    }

    async fn call_tool(&self, params: Value) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = parse_params(params)?;
        let request = InvocationRequest::tool(params.name, params.arguments.unwrap_or_default());

        let result = match self.dispatcher.dispatch(request).await {
            InvocationResult::Ok { payload } => CallToolResult {
                content: vec![ToolContent::text(payload)],
                is_error: None,
            },
            InvocationResult::Error { message, .. } => CallToolResult {
                content: vec![ToolContent::error(message)],
                is_error: Some(true),
            },
        };
        to_value(result)
    }

    fn list_resources(&self) -> Result<Value, JsonRpcError> {
        let resources = self
            .dispatcher
            .registry()
            .list(CapabilityKind::Resource)
            .iter()
            .filter(|c| c.uri_template.as_ref().is_some_and(|t| t.placeholders().is_empty()))
            .map(|c| ResourceSchema {
                uri: c.key().to_string(),
                name: c.name.clone(),
                description: c.description.clone(),
                mime_type: c.mime_type.clone(),
            })
            .collect();
        to_value(ListResourcesResult { resources })
    }

    fn list_resource_templates(&self) -> Result<Value, JsonRpcError> {
        let resource_templates = self
            .dispatcher
            .registry()
            .list(CapabilityKind::Resource)
            .iter()
            .filter(|c| c.uri_template.as_ref().is_some_and(|t| !t.placeholders().is_empty()))
            .map(|c| ResourceTemplateSchema {
                uri_template: c.key().to_string(),
                name: c.name.clone(),
                description: c.description.clone(),
                mime_type: c.mime_type.clone(),
            })
            .collect();
        to_value(ListResourceTemplatesResult { resource_templates })
    }

    async fn read_resource(&self, params: Value) -> Result<Value, JsonRpcError> {
        let params: ReadResourceParams = parse_params(params)?;
        let request = InvocationRequest::resource(params.uri.clone());

        let text = into_payload(self.dispatcher.dispatch(request).await, CapabilityKind::Resource)?;
        let mime_type = self
            .dispatcher
            .registry()
            .lookup(CapabilityKind::Resource, &params.uri)
            .ok()
            .and_then(|r| r.capability.mime_type.clone());

        to_value(ReadResourceResult {
            contents: vec![ResourceContents {
                uri: params.uri,
                mime_type,
                text,
            }],
        })
    }

    fn list_prompts(&self) -> Result<Value, JsonRpcError> {
        let prompts = self
            .dispatcher
            .registry()
            .list(CapabilityKind::Prompt)
            .iter()
            .map(|c| PromptSchema {
                name: c.name.clone(),
                description: c.description.clone(),
                arguments: c
                    .parameters
                    .iter()
                    .map(|p| PromptArgument {
                        name: p.name.clone(),
                        description: p.description.clone(),
                        required: p.required,
                    })
                    .collect(),
            })
            .collect();
        to_value(ListPromptsResult { prompts })
    }

    async fn get_prompt(&self, params: Value) -> Result<Value, JsonRpcError> {
        let params: GetPromptParams = parse_params(params)?;
        let arguments: Arguments = params
            .arguments
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        let request = InvocationRequest::prompt(params.name.clone(), arguments);

        let text = into_payload(self.dispatcher.dispatch(request).await, CapabilityKind::Prompt)?;
        let description = self
            .dispatcher
            .registry()
            .lookup(CapabilityKind::Prompt, &params.name)
            .map(|r| r.capability.description.clone())
            .unwrap_or_default();

        to_value(GetPromptResult {
            description,
            messages: vec![PromptMessage {
                role: "user".to_string(),
                content: ToolContent::text(text),
            }],
        })
    }

    /// Serve newline-delimited JSON-RPC on stdin/stdout until EOF.
    ///
    /// Each message is handled on its own task; a single writer task keeps
    /// responses from interleaving.
    pub async fn run_stdio(self: Arc<Self>) -> Result<()> {
        tracing::info!("Starting MCP server on stdio");

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let writer = tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            while let Some(response) = rx.recv().await {
                stdout.write_all(response.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
            anyhow::Ok(())
        });

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            tracing::debug!("Received: {}", line);

            let server = self.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Some(response) = server.handle_invocation(&line).await {
                    let _ = tx.send(response);
                }
            });
        }

        tracing::info!("EOF received, shutting down");
        drop(tx);
        writer.await??;
        Ok(())
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, JsonRpcError> {
    serde_json::from_value(params).map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {}", e)))
}

fn to_value(result: impl serde::Serialize) -> Result<Value, JsonRpcError> {
    serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}

/// Resources and prompts report failures as JSON-RPC errors rather than
/// error results
fn into_payload(result: InvocationResult, kind: CapabilityKind) -> Result<String, JsonRpcError> {
    match result {
        InvocationResult::Ok { payload } => Ok(payload),
        InvocationResult::Error { kind: error_kind, message } => Err(match (error_kind, kind) {
            (ErrorKind::NotFound, CapabilityKind::Resource) => JsonRpcError::resource_not_found(message),
            (ErrorKind::NotFound | ErrorKind::Validation, _) => JsonRpcError::invalid_params(message),
            _ => JsonRpcError::internal_error(message),
        }),
    }
}
