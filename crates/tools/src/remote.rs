//! Remote tool hosts: stateful sessions exposing many tools.
//!
//! A [`RemoteToolHost`] owns a [`SessionConnector`] and at most one live
//! [`RemoteSession`]. Sessions die when the runtime that created them is
//! dropped, so every operation first checks liveness and reconnects when the
//! handle has gone stale.

use async_trait::async_trait;
use chrono::Utc;
use proctor_core::error::{Error, Result, TransportError};
use proctor_core::event::{DomainEvent, EventBus};
use proctor_core::tool::{ToolDescriptor, ToolResult};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Output of one remote tool call, before classification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteCallResult {
    /// Transport-level error flag (`isError`)
    pub is_error: bool,

    /// Text items of the result, in order
    pub content: Vec<String>,

    /// Structured payload, if the server sent one
    pub structured_content: Option<Value>,
}

impl RemoteCallResult {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: vec![content.into()],
            ..Self::default()
        }
    }

    /// An HTTP-style status code, read from `status_code` or `statusCode`.
    pub fn status_code(&self) -> Option<u16> {
        let structured = self.structured_content.as_ref()?;
        structured
            .get("status_code")
            .or_else(|| structured.get("statusCode"))
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
    }

    /// Text items joined by blank lines.
    pub fn flattened(&self) -> String {
        self.content.join("\n\n")
    }
}

/// What a session reports back for a call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Completed(RemoteCallResult),
    /// The session does not know this tool.
    UnknownTool,
}

/// A live connection to a remote tool server.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    async fn list_tools(&self) -> std::result::Result<Vec<ToolDescriptor>, TransportError>;

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> std::result::Result<CallOutcome, TransportError>;

    /// False once the underlying connection (or its runtime) is gone.
    fn is_alive(&self) -> bool;

    async fn close(&self) -> std::result::Result<(), TransportError>;
}

/// Opens sessions for a host. Called again on every reconnect.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self) -> std::result::Result<Arc<dyn RemoteSession>, TransportError>;
}

/// Connection lifecycle of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

struct HostState {
    connection: ConnectionState,
    session: Option<Arc<dyn RemoteSession>>,
    ever_connected: bool,
    /// Names from the last successful discovery
    tool_names: Option<HashSet<String>>,
}

/// Handle to a stateful remote tool server.
///
/// Not meant to be shared by concurrently running agents; calls are
/// serialized on an internal lock only for state transitions.
pub struct RemoteToolHost {
    name: String,
    connector: Arc<dyn SessionConnector>,
    state: Mutex<HostState>,
    events: Option<Arc<EventBus>>,
}

impl RemoteToolHost {
    pub fn new(name: impl Into<String>, connector: Arc<dyn SessionConnector>) -> Self {
        Self {
            name: name.into(),
            connector,
            state: Mutex::new(HostState {
                connection: ConnectionState::Disconnected,
                session: None,
                ever_connected: false,
                tool_names: None,
            }),
            events: None,
        }
    }

    /// Publish reconnects on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.state.lock().await.connection
    }

    /// Open a session if none is live.
    pub async fn connect(&self) -> Result<()> {
        self.ensure_connected().await.map(|_| ())
    }

    /// Close the session, if any. The host reconnects on next use.
    pub async fn disconnect(&self) -> Result<()> {
        let session = {
            let mut state = self.state.lock().await;
            state.connection = ConnectionState::Disconnected;
            state.session.take()
        };
        if let Some(session) = session {
            debug!(host = %self.name, "Disconnecting remote tool host");
            session.close().await?;
        }
        Ok(())
    }

    /// Return a live session, connecting or reconnecting as needed.
    pub async fn ensure_connected(&self) -> Result<Arc<dyn RemoteSession>> {
        let mut state = self.state.lock().await;

        if !state.ever_connected {
            reset(&mut state);
            return self.connect_locked(&mut state).await;
        }

        if let Some(session) = state.session.as_ref().filter(|s| s.is_alive()) {
            return Ok(Arc::clone(session));
        }

        if state.session.is_none() {
            // Closed by `disconnect`: a plain connect, not a recovery.
            return self.connect_locked(&mut state).await;
        }

        warn!(host = %self.name, "Remote session is stale, reconnecting");
        self.reconnect_locked(&mut state).await
    }

    /// Discover the host's tools. One reconnect-and-retry on transport failure.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let session = self.ensure_connected().await?;
        let tools = match session.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                warn!(host = %self.name, error = %e, "Tool discovery failed, reconnecting once");
                let session = self.force_reconnect().await?;
                session.list_tools().await?
            }
        };

        let mut state = self.state.lock().await;
        state.tool_names = Some(tools.iter().map(|t| t.name.clone()).collect());
        debug!(host = %self.name, count = tools.len(), "Discovered remote tools");
        Ok(tools)
    }

    /// Execute `tool_name` remotely.
    ///
    /// Returns `Ok(None)` when this host does not provide the tool. Fatal
    /// application failures (5xx, 404) and authentication failures (401/403)
    /// are errors; other failures are failed results.
    pub async fn execute(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
    ) -> Result<Option<ToolResult>> {
        let known = {
            let state = self.state.lock().await;
            state
                .tool_names
                .as_ref()
                .is_none_or(|names| names.contains(tool_name))
        };
        if !known {
            return Ok(None);
        }

        let session = self.ensure_connected().await?;
        let outcome = match session.call_tool(tool_name, arguments.clone()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(host = %self.name, tool = tool_name, error = %e, "Remote call failed, reconnecting once");
                let session = self.force_reconnect().await?;
                session.call_tool(tool_name, arguments).await?
            }
        };

        match outcome {
            CallOutcome::UnknownTool => Ok(None),
            CallOutcome::Completed(result) => classify(tool_name, result).map(Some),
        }
    }

    async fn force_reconnect(&self) -> Result<Arc<dyn RemoteSession>> {
        let mut state = self.state.lock().await;
        self.reconnect_locked(&mut state).await
    }

    async fn reconnect_locked(&self, state: &mut HostState) -> Result<Arc<dyn RemoteSession>> {
        reset(state);
        let session = self.connect_locked(state).await?;
        info!(host = %self.name, "Reconnected remote tool host");
        if let Some(bus) = &self.events {
            bus.publish(DomainEvent::RemoteReconnected {
                host: self.name.clone(),
                timestamp: Utc::now(),
            });
        }
        Ok(session)
    }

    async fn connect_locked(&self, state: &mut HostState) -> Result<Arc<dyn RemoteSession>> {
        state.connection = ConnectionState::Connecting;
        match self.connector.connect().await {
            Ok(session) => {
                state.session = Some(Arc::clone(&session));
                state.connection = ConnectionState::Connected;
                state.ever_connected = true;
                debug!(host = %self.name, "Connected remote tool host");
                Ok(session)
            }
            Err(e) => {
                state.connection = ConnectionState::Disconnected;
                Err(Error::Transport(e))
            }
        }
    }
}

/// Drop a stale handle without talking to it.
fn reset(state: &mut HostState) {
    state.session = None;
    state.connection = ConnectionState::Disconnected;
}

/// Map a completed remote call onto a result or a fatal error.
fn classify(tool_name: &str, result: RemoteCallResult) -> Result<ToolResult> {
    let content = result.flattened();

    if let Some(status) = result.status_code() {
        match status {
            401 | 403 => {
                return Err(Error::Authentication {
                    tool_names: vec![tool_name.to_string()],
                    message: format!("HTTP {status}"),
                });
            }
            404 | 500..=599 => {
                return Err(Error::RemoteApplication {
                    tool_name: tool_name.to_string(),
                    status_code: status,
                    message: content,
                });
            }
            400..=499 => {
                return Ok(ToolResult::failure_with_content(
                    tool_name,
                    content,
                    format!("HTTP {status}"),
                ));
            }
            _ => {}
        }
    }

    if result.is_error {
        let error = if content.is_empty() {
            "Remote tool reported an error".to_string()
        } else {
            content.clone()
        };
        return Ok(ToolResult::failure_with_content(tool_name, content, error));
    }

    Ok(ToolResult::success(tool_name, content))
}
