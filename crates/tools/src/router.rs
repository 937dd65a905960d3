//! Tool router: one dispatch surface over local tools and remote hosts.

use chrono::Utc;
use proctor_core::error::Result;
use proctor_core::event::{DomainEvent, EventBus};
use proctor_core::tool::{DEFAULT_MAX_RESULT_CHARS, Tool, ToolCall, ToolDescriptor, ToolResult};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::remote::RemoteToolHost;

/// A place tools come from.
#[derive(Clone)]
pub enum ToolSource {
    /// In-process, stateless tool
    Local(Arc<dyn Tool>),
    /// Stateful remote server exposing many tools
    Remote(Arc<RemoteToolHost>),
}

impl ToolSource {
    /// Name for logs: the tool name or the host name.
    pub fn name(&self) -> &str {
        match self {
            Self::Local(tool) => tool.name(),
            Self::Remote(host) => host.name(),
        }
    }

    /// Descriptors this source offers.
    pub async fn describe(&self) -> Result<Vec<ToolDescriptor>> {
        match self {
            Self::Local(tool) => Ok(vec![tool.to_descriptor()]),
            Self::Remote(host) => host.list_tools().await,
        }
    }

    /// Run `call` if this source provides it; `Ok(None)` otherwise.
    pub async fn execute(&self, call: &ToolCall) -> Result<Option<ToolResult>> {
        match self {
            Self::Local(tool) if tool.name() == call.tool_name => {
                let result = match tool.execute(call.arguments.clone()).await {
                    Ok(output) => ToolResult::success(&call.tool_name, output),
                    Err(e) => ToolResult::failure(&call.tool_name, e.to_string()),
                };
                Ok(Some(result))
            }
            Self::Local(_) => Ok(None),
            Self::Remote(host) => host.execute(&call.tool_name, call.arguments.clone()).await,
        }
    }
}

/// Routes tool calls across sources in registration order.
pub struct ToolRouter {
    sources: Vec<ToolSource>,
    max_result_chars: usize,
    events: Option<Arc<EventBus>>,
}

impl ToolRouter {
    pub fn builder() -> ToolRouterBuilder {
        ToolRouterBuilder::default()
    }

    pub fn sources(&self) -> &[ToolSource] {
        &self.sources
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// All descriptors, local and remote, in registration order.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let mut descriptors = Vec::new();
        for source in &self.sources {
            descriptors.extend(source.describe().await?);
        }
        Ok(descriptors)
    }

    /// Dispatch one call to the first source that provides it.
    ///
    /// Unknown tools and local tool errors come back as failed results.
    /// Remote fatal, authentication and transport errors are returned as `Err`.
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        let start = Instant::now();
        let mut outcome = None;
        for source in &self.sources {
            if let Some(result) = source.execute(call).await? {
                debug!(tool = %call.tool_name, source = source.name(), success = result.success, "Tool executed");
                outcome = Some(result);
                break;
            }
        }

        let result = match outcome {
            Some(result) => result.compacted(self.max_result_chars),
            None => {
                warn!(tool = %call.tool_name, "No tool source provides this tool");
                ToolResult::not_found(&call.tool_name)
            }
        };

        if let Some(bus) = &self.events {
            bus.publish(DomainEvent::ToolExecuted {
                tool_name: call.tool_name.clone(),
                success: result.success,
                duration_ms: start.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
            });
        }

        Ok(result)
    }

    /// Disconnect every remote host. Failures are logged, never returned.
    pub async fn disconnect_all(&self) {
        for source in &self.sources {
            if let ToolSource::Remote(host) = source {
                if let Err(e) = host.disconnect().await {
                    warn!(host = host.name(), error = %e, "Failed to disconnect remote tool host");
                }
            }
        }
    }
}

/// Assembles a [`ToolRouter`] for one agent.
pub struct ToolRouterBuilder {
    sources: Vec<ToolSource>,
    max_result_chars: usize,
    events: Option<Arc<EventBus>>,
}

impl Default for ToolRouterBuilder {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            max_result_chars: DEFAULT_MAX_RESULT_CHARS,
            events: None,
        }
    }
}

impl ToolRouterBuilder {
    pub fn local(mut self, tool: Arc<dyn Tool>) -> Self {
        self.sources.push(ToolSource::Local(tool));
        self
    }

    pub fn locals(mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        self.sources.extend(tools.into_iter().map(ToolSource::Local));
        self
    }

    pub fn remote(mut self, host: Arc<RemoteToolHost>) -> Self {
        self.sources.push(ToolSource::Remote(host));
        self
    }

    pub fn max_result_chars(mut self, max_result_chars: usize) -> Self {
        self.max_result_chars = max_result_chars;
        self
    }

    pub fn event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn build(self) -> ToolRouter {
        ToolRouter {
            sources: self.sources,
            max_result_chars: self.max_result_chars,
            events: self.events,
        }
    }
}
