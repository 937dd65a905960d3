//! Tool sources for Proctor agents.
//!
//! - [`router`]: dispatch over local tools and remote hosts
//! - [`remote`]: stateful remote hosts with reconnect-on-stale semantics
//! - [`mcp`]: the stdio MCP session behind remote hosts
//! - built-in local tools: [`think`], [`send_message`]

pub mod mcp;
pub mod remote;
pub mod router;
pub mod send_message;
pub mod think;

use proctor_config::AppConfig;
use proctor_core::event::EventBus;
use proctor_core::tool::Tool;
use std::sync::Arc;

pub use mcp::StdioConnector;
pub use remote::{
    CallOutcome, ConnectionState, RemoteCallResult, RemoteSession, RemoteToolHost,
    SessionConnector,
};
pub use router::{ToolRouter, ToolRouterBuilder, ToolSource};

/// Build a fresh list of the built-in local tools.
///
/// `send_message` is included only when a `[target]` is configured.
pub fn default_tools(config: &AppConfig) -> Vec<Arc<dyn Tool>> {
    let mut tools: Vec<Arc<dyn Tool>> = vec![Arc::new(think::ThinkTool)];
    if let Some(target) = &config.target {
        tools.push(Arc::new(send_message::SendMessageTool::new(target)));
    }
    tools
}

/// One host per `[[remote_tools]]` entry, not yet connected.
pub fn remote_hosts(config: &AppConfig, events: Option<Arc<EventBus>>) -> Vec<Arc<RemoteToolHost>> {
    config
        .remote_tools
        .iter()
        .map(|remote| {
            let connector = StdioConnector::new(&remote.name, &remote.command, remote.args.clone())
                .with_env(remote.env.clone());
            let mut host = RemoteToolHost::new(&remote.name, Arc::new(connector));
            if let Some(bus) = &events {
                host = host.with_event_bus(Arc::clone(bus));
            }
            Arc::new(host)
        })
        .collect()
}

/// Router with the built-in tools followed by every configured remote host.
pub fn router_from_config(config: &AppConfig, events: Option<Arc<EventBus>>) -> ToolRouter {
    let mut builder = ToolRouter::builder()
        .locals(default_tools(config))
        .max_result_chars(config.agent.max_result_chars);
    for host in remote_hosts(config, events.clone()) {
        builder = builder.remote(host);
    }
    if let Some(bus) = events {
        builder = builder.event_bus(bus);
    }
    builder.build()
}
