//! MCP client session and the stdio connector that produces it.

use async_trait::async_trait;
use proctor_core::TransportError;
use proctor_core::tool::ToolDescriptor;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::protocol::{
    ClientInfo, InitializeParams, InitializeResult, JsonRpcResponse, MCP_PROTOCOL_VERSION,
    McpToolCallResult, ToolCallParams, ToolsListResult,
};
use super::transport::StdioTransport;
use crate::remote::{CallOutcome, RemoteCallResult, RemoteSession, SessionConnector};

/// An initialized MCP session over stdio.
pub struct McpSession {
    host: String,
    transport: Arc<StdioTransport>,
    server_info: InitializeResult,
}

impl McpSession {
    /// Run the `initialize` handshake on `transport`.
    pub async fn initialize(
        host: impl Into<String>,
        transport: Arc<StdioTransport>,
    ) -> Result<Self, TransportError> {
        let host = host.into();
        let params = InitializeParams {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: serde_json::json!({}),
            client_info: ClientInfo {
                name: "proctor".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        let params = serde_json::to_value(&params).map_err(|e| TransportError::Protocol {
            host: host.clone(),
            reason: e.to_string(),
        })?;

        let response = transport.request("initialize", Some(params)).await?;
        let server_info: InitializeResult = decode_result(&host, "initialize", response)?;
        transport.notify("notifications/initialized", None).await?;

        info!(
            host = %host,
            server = %server_info.server_info.name,
            protocol = %server_info.protocol_version,
            "MCP session initialized"
        );

        Ok(Self {
            host,
            transport,
            server_info,
        })
    }

    pub fn server_info(&self) -> &InitializeResult {
        &self.server_info
    }
}

#[async_trait]
impl RemoteSession for McpSession {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, TransportError> {
        let response = self.transport.request("tools/list", None).await?;
        let result: ToolsListResult = decode_result(&self.host, "tools/list", response)?;
        Ok(result.tools)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallOutcome, TransportError> {
        let params = ToolCallParams {
            name: name.to_string(),
            arguments: Some(Value::Object(arguments)),
        };
        let params = serde_json::to_value(&params).map_err(|e| TransportError::Protocol {
            host: self.host.clone(),
            reason: e.to_string(),
        })?;

        let response = self.transport.request("tools/call", Some(params)).await?;

        if let Some(error) = &response.error {
            if error.is_unknown_tool() {
                debug!(host = %self.host, tool = name, "Server does not know tool");
                return Ok(CallOutcome::UnknownTool);
            }
            // A rejected call (bad params, server-side failure) is the tool's
            // problem, not the connection's.
            return Ok(CallOutcome::Completed(RemoteCallResult {
                is_error: true,
                content: vec![format!("{} (code {})", error.message, error.code)],
                structured_content: None,
            }));
        }

        let result: McpToolCallResult = decode_result(&self.host, "tools/call", response)?;
        Ok(CallOutcome::Completed(RemoteCallResult {
            is_error: result.is_error,
            content: result
                .content
                .iter()
                .filter_map(|item| item.text().map(str::to_string))
                .collect(),
            structured_content: result.structured_content,
        }))
    }

    fn is_alive(&self) -> bool {
        self.transport.is_alive()
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.transport.close().await
    }
}

fn decode_result<T: DeserializeOwned>(
    host: &str,
    method: &str,
    response: JsonRpcResponse,
) -> Result<T, TransportError> {
    if let Some(error) = response.error {
        return Err(TransportError::Protocol {
            host: host.to_string(),
            reason: format!("{method} rejected: {} (code {})", error.message, error.code),
        });
    }
    let result = response.result.ok_or_else(|| TransportError::Protocol {
        host: host.to_string(),
        reason: format!("{method} response missing result"),
    })?;
    serde_json::from_value(result).map_err(|e| TransportError::Protocol {
        host: host.to_string(),
        reason: format!("failed to parse {method} response: {e}"),
    })
}

/// Spawns an MCP server subprocess per connection.
#[derive(Debug, Clone)]
pub struct StdioConnector {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

impl StdioConnector {
    pub fn new(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args,
            env: HashMap::new(),
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }
}

#[async_trait]
impl SessionConnector for StdioConnector {
    async fn connect(&self) -> Result<Arc<dyn RemoteSession>, TransportError> {
        debug!(host = %self.name, command = %self.command, "Spawning MCP server");
        let transport = StdioTransport::spawn(&self.name, &self.command, &self.args, &self.env)?;
        let session = McpSession::initialize(self.name.clone(), transport).await?;
        Ok(Arc::new(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::{JsonRpcError, RequestId, error_codes};

    fn response(result: Option<Value>, error: Option<JsonRpcError>) -> JsonRpcResponse {
        JsonRpcResponse {
            jsonrpc: "2.0".into(),
            result,
            error,
            id: RequestId::Number(1),
        }
    }

    #[test]
    fn decode_initialize_result() {
        let info: InitializeResult = decode_result(
            "files",
            "initialize",
            response(
                Some(serde_json::json!({
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "files-server"}
                })),
                None,
            ),
        )
        .unwrap();
        assert_eq!(info.server_info.name, "files-server");
    }

    #[test]
    fn decode_rejects_error_and_missing_result() {
        let err = decode_result::<ToolsListResult>(
            "files",
            "tools/list",
            response(
                None,
                Some(JsonRpcError {
                    code: error_codes::INTERNAL_ERROR,
                    message: "boom".into(),
                    data: None,
                }),
            ),
        )
        .unwrap_err();
        assert!(err.to_string().contains("boom"));

        let err = decode_result::<ToolsListResult>("files", "tools/list", response(None, None))
            .unwrap_err();
        assert!(err.to_string().contains("missing result"));
    }

    #[tokio::test]
    async fn connector_reports_spawn_failure() {
        let connector = StdioConnector::new("ghost", "/definitely/not/a/real/mcp-server", vec![]);
        let err = connector.connect().await.err().unwrap();
        assert!(matches!(err, TransportError::Connect { .. }));
    }
}
