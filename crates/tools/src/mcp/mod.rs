//! Model Context Protocol over stdio.
//!
//! [`StdioConnector`] spawns a server process and hands the host an
//! initialized [`McpSession`].

pub mod client;
pub mod protocol;
pub mod transport;

pub use client::{McpSession, StdioConnector};
pub use transport::StdioTransport;
