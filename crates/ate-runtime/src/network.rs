//! Host side of the network bootstrap script.
//!
//! Transports (HTTP servers, websocket sessions) are the host's business.
//! These helpers hand their traffic to the script-side `network` object
//! and decode what comes back.

use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::Runtime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Protocol tag carried by every websocket envelope.
pub const PROTOCOL: &str = "EWSMP1";

const NETWORK_OBJECT: &str = "network";

/// JSON-RPC style error codes, mirrored as `E_*` globals in scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Parse,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    Internal,
    Server,
}

impl ErrorCode {
    pub fn code(self) -> i64 {
        match self {
            ErrorCode::Parse => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::Internal => -32603,
            ErrorCode::Server => -32000,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -32700 => Some(ErrorCode::Parse),
            -32600 => Some(ErrorCode::InvalidRequest),
            -32601 => Some(ErrorCode::MethodNotFound),
            -32602 => Some(ErrorCode::InvalidParams),
            -32603 => Some(ErrorCode::Internal),
            -32000 => Some(ErrorCode::Server),
            _ => None,
        }
    }

    /// Name of the matching script global.
    pub fn script_name(self) -> &'static str {
        match self {
            ErrorCode::Parse => "E_PARSE",
            ErrorCode::InvalidRequest => "E_INVALID_REQ",
            ErrorCode::MethodNotFound => "E_NO_METHOD",
            ErrorCode::InvalidParams => "E_BAD_PARAMS",
            ErrorCode::Internal => "E_INTERNAL",
            ErrorCode::Server => "E_SERVER",
        }
    }
}

/// A websocket request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Request {
    pub protocol: String,
    pub method: String,
    pub params: Value,
    pub time: Value,
    pub id: Value,
}

impl Request {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = id.into();
        self
    }
}

impl Default for Request {
    fn default() -> Self {
        Self {
            protocol: PROTOCOL.to_string(),
            method: String::new(),
            params: Value::Null,
            time: Value::Null,
            id: Value::Null,
        }
    }
}

/// A websocket response envelope.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Response {
    pub protocol: String,
    pub method: String,
    pub result: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub time: Value,
    pub id: Value,
}

impl Response {
    /// The error code, if this is an error response with a known code.
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().and_then(|e| ErrorCode::from_code(e.code))
    }
}

/// Error member of a [`Response`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    pub data: Value,
}

/// An HTTP request as handed to `network:handleIncomingHttp`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// Tell the runtime a websocket session opened.
pub fn open_ws_session(runtime: &Runtime, session_id: &str) -> RuntimeResult<()> {
    runtime.call_func_on_obj(NETWORK_OBJECT, "newWsSession", &[Value::from(session_id)])?;
    Ok(())
}

/// Tell the runtime a websocket session closed.
pub fn close_ws_session(runtime: &Runtime, session_id: &str) -> RuntimeResult<()> {
    runtime.call_func_on_obj(NETWORK_OBJECT, "deleteWsSession", &[Value::from(session_id)])?;
    Ok(())
}

/// Feed a raw websocket message to the session's handler.
///
/// Returns `None` when the handler chose not to reply.
pub fn incoming_ws_message(
    runtime: &Runtime,
    session_id: &str,
    message: &str,
) -> RuntimeResult<Option<Response>> {
    let reply = runtime.call_func_on_obj(
        NETWORK_OBJECT,
        "incomingWsMsg",
        &[Value::from(session_id), Value::from(message)],
    )?;
    match reply {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(serde_json::from_str(&text)?)),
        other => Err(RuntimeError::Export(format!(
            "incomingWsMsg returned {other}, expected a JSON string"
        ))),
    }
}

/// Hand an HTTP request to the registered callback and return its result.
pub fn incoming_http(runtime: &Runtime, request: &HttpRequest) -> RuntimeResult<Value> {
    let payload = serde_json::to_string(request)?;
    runtime.call_func_on_obj(NETWORK_OBJECT, "handleIncomingHttp", &[Value::String(payload)])
}
