//! JSON-RPC 2.0 wire types for the MCP stdio transport
//!
//! One JSON document per line, UTF-8. Requests carry an id derived from the
//! wall clock; responses are not matched back to ids (calls are fully
//! serialized, so one response line always belongs to the preceding
//! request).

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub const JSONRPC_VERSION: &str = "2.0";
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC request envelope
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<T> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: T,
}

impl<T: Serialize> JsonRpcRequest<T> {
    pub fn new(id: u64, method: &str, params: T) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.to_string(),
            params,
        }
    }

    /// Serialize as one newline-terminated wire line.
    pub fn to_line(&self) -> crate::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Minimal view of a response line: only the fields the bridge branches on.
#[derive(Debug, Deserialize)]
pub struct JsonRpcMessage {
    pub id: Option<u64>,
    pub result: Option<JsonValue>,
    pub error: Option<JsonValue>,
}

/// `initialize` request params
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: JsonValue,
    pub client_info: ClientInfo,
}

#[derive(Debug, Serialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl InitializeParams {
    pub fn client() -> Self {
        Self {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: serde_json::json!({}),
            client_info: ClientInfo {
                name: "craftmind".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }
}

/// `tools/call` request params
#[derive(Debug, Serialize)]
pub struct ToolCallParams {
    pub name: String,
    pub arguments: JsonValue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_line_shape() {
        let request = JsonRpcRequest::new(
            7,
            "tools/call",
            ToolCallParams {
                name: "minecraft_track_event".to_string(),
                arguments: serde_json::json!({"eventType": "block_place"}),
            },
        );
        let line = request.to_line().unwrap();
        assert!(line.ends_with('\n'));

        let parsed: JsonValue = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(parsed["jsonrpc"], "2.0");
        assert_eq!(parsed["id"], 7);
        assert_eq!(parsed["method"], "tools/call");
        assert_eq!(parsed["params"]["name"], "minecraft_track_event");
    }

    #[test]
    fn initialize_params_are_camel_case() {
        let params = InitializeParams::client();
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert_eq!(value["clientInfo"]["name"], "craftmind");
    }

    #[test]
    fn response_branches() {
        let ok: JsonRpcMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":0,"result":{"serverInfo":{"name":"X"}}}"#)
                .unwrap();
        assert!(ok.result.is_some());
        assert!(ok.error.is_none());

        let err: JsonRpcMessage =
            serde_json::from_str(r#"{"error":{"message":"bad"}}"#).unwrap();
        assert!(err.error.is_some());
        assert!(err.id.is_none());
    }
}
