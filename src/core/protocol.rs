//! Wire-level message types.
//!
//! Every frame is a single JSON object:
//!
//! - request: `{"id": <string|integer>, "method": "list_tools"|"call_tool", "params": {...}}`
//! - success: `{"id": <id>, "result": {...}}`
//! - failure: `{"id": <id|null>, "error": {"code": <int>, "message": <string>}}`
//! - notification (server to client only): `{"method": <string>, "params": {...}}`
//!
//! Decoding turns a raw frame into a [`RequestMessage`] or a
//! [`ProtocolError`]; a protocol error never reaches a tool.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Version of the message format advertised in the capability announcement.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Error codes carried in wire-level error responses.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    /// The request was still running when the server shut down.
    pub const REQUEST_CANCELLED: i32 = -32000;
}

/// Method names.
pub mod methods {
    pub const LIST_TOOLS: &str = "list_tools";
    pub const CALL_TOOL: &str = "call_tool";

    /// Server-sent capability announcement.
    pub const CAPABILITIES: &str = "capabilities";

    /// Every request method the server accepts.
    pub const ALL: &[&str] = &[LIST_TOOLS, CALL_TOOL];
}

// ============================================================================
// Request side
// ============================================================================

/// Correlation identifier chosen by the caller. Opaque to the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    /// Integers above `i64::MAX`; smaller values are always `Number`.
    Unsigned(u64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Unsigned(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<u64> for RequestId {
    fn from(n: u64) -> Self {
        match i64::try_from(n) {
            Ok(n) => Self::Number(n),
            Err(_) => Self::Unsigned(n),
        }
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

/// Parameters of a `call_tool` request.
#[derive(Debug, Clone, PartialEq)]
pub struct CallToolParams {
    pub name: String,
    pub arguments: Value,
}

/// The closed set of request methods, with their decoded parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    ListTools,
    CallTool(CallToolParams),
}

impl Method {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ListTools => methods::LIST_TOOLS,
            Self::CallTool(_) => methods::CALL_TOOL,
        }
    }
}

/// A structurally valid request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestMessage {
    pub id: RequestId,
    pub method: Method,
}

impl RequestMessage {
    pub fn new(id: impl Into<RequestId>, method: Method) -> Self {
        Self {
            id: id.into(),
            method,
        }
    }

    /// Decode one frame.
    ///
    /// The error keeps the correlation id whenever it could be read, so the
    /// caller can still be answered on the right id.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_slice(frame)
            .map_err(|e| ProtocolError::parse_error(format!("Parse error: {}", e)))?;

        let Value::Object(mut obj) = value else {
            return Err(ProtocolError::invalid_request(
                None,
                "Invalid request: expected a JSON object",
            ));
        };

        let id = match obj.remove("id") {
            Some(Value::String(s)) => RequestId::String(s),
            Some(Value::Number(n)) => match (n.as_i64(), n.as_u64()) {
                (Some(n), _) => RequestId::Number(n),
                (None, Some(n)) => RequestId::Unsigned(n),
                (None, None) => {
                    return Err(ProtocolError::invalid_request(
                        None,
                        "Invalid request: numeric id must be an integer",
                    ));
                }
            },
            Some(_) => {
                return Err(ProtocolError::invalid_request(
                    None,
                    "Invalid request: id must be a string or an integer",
                ));
            }
            None => {
                return Err(ProtocolError::invalid_request(
                    None,
                    "Invalid request: missing id",
                ));
            }
        };

        let method = match obj.remove("method") {
            Some(Value::String(m)) => m,
            Some(_) => {
                return Err(ProtocolError::invalid_request(
                    Some(id),
                    "Invalid request: method must be a string",
                ));
            }
            None => {
                return Err(ProtocolError::invalid_request(
                    Some(id),
                    "Invalid request: missing method",
                ));
            }
        };

        let params = match obj.remove("params") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(params)) => params,
            Some(_) => {
                return Err(ProtocolError::invalid_params(
                    Some(id),
                    "Invalid params: params must be an object",
                ));
            }
        };

        let method = match method.as_str() {
            methods::LIST_TOOLS => Method::ListTools,
            methods::CALL_TOOL => Method::CallTool(decode_call_tool(&id, params)?),
            other => {
                return Err(ProtocolError::method_not_found(Some(id), other));
            }
        };

        Ok(Self { id, method })
    }
}

fn decode_call_tool(id: &RequestId, mut params: Map<String, Value>) -> Result<CallToolParams, ProtocolError> {
    let name = match params.remove("name") {
        Some(Value::String(name)) => name,
        Some(_) => {
            return Err(ProtocolError::invalid_params(
                Some(id.clone()),
                "Invalid params: tool name must be a string",
            ));
        }
        None => {
            return Err(ProtocolError::invalid_params(
                Some(id.clone()),
                "Invalid params: missing tool name",
            ));
        }
    };

    let arguments = params.remove("arguments").ok_or_else(|| {
        ProtocolError::invalid_params(Some(id.clone()), "Invalid params: missing arguments")
    })?;

    Ok(CallToolParams { name, arguments })
}

// ============================================================================
// Response side
// ============================================================================

/// Error object of a wire-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
}

/// Either a result or an error, never both.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseOutcome {
    Result(Value),
    Error(ErrorObject),
}

/// A response to exactly one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseMessage {
    /// `None` only when the request id could not be read; serialized as `null`.
    pub id: Option<RequestId>,

    #[serde(flatten)]
    pub outcome: ResponseOutcome,
}

impl ResponseMessage {
    /// Create a success response.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id: Some(id),
            outcome: ResponseOutcome::Result(result),
        }
    }

    /// Create a success response from any serializable result.
    ///
    /// A result that cannot be serialized becomes an internal error response.
    pub fn from_result<T: Serialize>(id: RequestId, result: &T) -> Self {
        match serde_json::to_value(result) {
            Ok(value) => Self::success(id, value),
            Err(e) => Self::error(
                Some(id),
                error_codes::INTERNAL_ERROR,
                format!("Internal error: failed to encode result: {}", e),
            ),
        }
    }

    /// Create an error response.
    pub fn error(id: Option<RequestId>, code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            outcome: ResponseOutcome::Error(ErrorObject {
                code,
                message: message.into(),
            }),
        }
    }

    /// Response for a request abandoned at shutdown.
    pub fn cancelled(id: RequestId) -> Self {
        Self::error(
            Some(id),
            error_codes::REQUEST_CANCELLED,
            "Request cancelled: server shutting down",
        )
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            ResponseOutcome::Result(value) => Some(value),
            ResponseOutcome::Error(_) => None,
        }
    }

    pub fn error_object(&self) -> Option<&ErrorObject> {
        match &self.outcome {
            ResponseOutcome::Error(error) => Some(error),
            ResponseOutcome::Result(_) => None,
        }
    }
}

/// Server-to-client message without a correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub method: String,
    pub params: Value,
}

impl NotificationMessage {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// Anything the server writes to the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Response(ResponseMessage),
    Notification(NotificationMessage),
}

impl From<ResponseMessage> for OutboundMessage {
    fn from(response: ResponseMessage) -> Self {
        Self::Response(response)
    }
}

impl From<NotificationMessage> for OutboundMessage {
    fn from(notification: NotificationMessage) -> Self {
        Self::Notification(notification)
    }
}

// ============================================================================
// Protocol errors
// ============================================================================

/// A structural failure: malformed frame, unknown method, bad params.
///
/// Answered with a wire-level error response, never with a tool result.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} (code {code})")]
pub struct ProtocolError {
    pub id: Option<RequestId>,
    pub code: i32,
    pub message: String,
}

impl ProtocolError {
    pub fn new(id: Option<RequestId>, code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            code,
            message: message.into(),
        }
    }

    /// Frame is not valid JSON.
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(None, error_codes::PARSE_ERROR, message)
    }

    /// Frame is JSON but not a valid request.
    pub fn invalid_request(id: Option<RequestId>, message: impl Into<String>) -> Self {
        Self::new(id, error_codes::INVALID_REQUEST, message)
    }

    /// Method is not one of the supported methods.
    pub fn method_not_found(id: Option<RequestId>, method: &str) -> Self {
        Self::new(
            id,
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", method),
        )
    }

    /// Method-specific params are malformed.
    pub fn invalid_params(id: Option<RequestId>, message: impl Into<String>) -> Self {
        Self::new(id, error_codes::INVALID_PARAMS, message)
    }

    /// Convert into the response sent back to the caller.
    pub fn into_response(self) -> ResponseMessage {
        ResponseMessage::error(self.id, self.code, self.message)
    }
}
