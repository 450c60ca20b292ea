//! RPC envelope types.
//!
//! This module defines the JSON envelope carried on the RPC ingress: the
//! request with its call metadata (`method`, optional `timestamp`) and the
//! response with a gRPC-style status code.
//!
//! # Example
//!
//! ```
//! use overgate_server::protocol::{RpcRequest, RpcResponse, Status};
//! use serde_json::json;
//!
//! let request = RpcRequest::new("get_user", json!({"id": 7}))
//!     .with_timestamp("2026-08-02T10:15:30Z");
//!
//! let response = RpcResponse::success(request.id, json!({"name": "ada"}));
//! assert_eq!(response.status, Status::Ok);
//! ```

use overgate_core::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status carried on every RPC response, modeled on the gRPC status space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    InvalidArgument,
    ResourceExhausted,
    NotFound,
    Internal,
}

impl Status {
    /// Maps a controller error onto the wire status.
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::RateLimited => Status::ResourceExhausted,
            Error::MissingMethod => Status::InvalidArgument,
            Error::UnknownMethod(_) | Error::HandlerNotFound(_) => Status::NotFound,
            _ => Status::Internal,
        }
    }
}

/// An RPC request envelope.
///
/// `method` and `timestamp` are the call metadata consumed by the
/// interceptor: `method` names the logical method (distinct from any
/// transport-level identifier) and `timestamp` is the optional RFC-3339
/// client-side send time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcRequest {
    /// Caller-chosen request identifier, echoed on the response
    #[serde(default)]
    pub id: u64,
    /// Logical method name
    #[serde(default)]
    pub method: Option<String>,
    /// Method arguments
    #[serde(default)]
    pub args: Value,
    /// RFC-3339 client-side send time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl RpcRequest {
    /// Creates a request for `method` with the given arguments.
    pub fn new(method: impl Into<String>, args: Value) -> Self {
        Self {
            id: 0,
            method: Some(method.into()),
            args,
            timestamp: None,
        }
    }

    /// Sets the request identifier.
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// Attaches the client-side send timestamp.
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }
}

/// An RPC response envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcResponse {
    /// Identifier of the request this answers
    pub id: u64,
    /// Outcome status
    pub status: Status,
    /// Handler result, present on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Human-readable error message, present on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RpcResponse {
    /// Creates a success response.
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            id,
            status: Status::Ok,
            result: Some(result),
            error: None,
        }
    }

    /// Creates a failure response from a controller error.
    pub fn failure(id: u64, error: &Error) -> Self {
        Self {
            id,
            status: Status::from_error(error),
            result: None,
            error: Some(error.to_string()),
        }
    }
}
