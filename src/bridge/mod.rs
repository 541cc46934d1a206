//! Stdio JSON-RPC bridge to the Node MCP server

pub mod process;
pub mod protocol;

pub use process::{BridgeStatus, McpBridge};
