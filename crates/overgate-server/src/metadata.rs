//! Call metadata extraction.
//!
//! The interceptor consumes two pieces of call metadata: the logical method
//! name and the optional RFC-3339 client-side send timestamp. This module
//! carries them in a transport-agnostic [`CallMetadata`] so the interceptor
//! does not depend on the envelope shape of any particular ingress.

use crate::protocol::RpcRequest;
use chrono::{DateTime, Utc};
use overgate_core::{Error, Result};

/// Call metadata for one inbound unary RPC.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallMetadata {
    /// Logical method name, used as the controller's state key
    pub method: Option<String>,
    /// RFC-3339 client-side send time
    pub timestamp: Option<String>,
}

impl CallMetadata {
    /// Creates metadata with just a method name.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            timestamp: None,
        }
    }

    /// Attaches a client-side send timestamp.
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Extracts the metadata carried on an RPC request envelope.
    pub fn from_request(request: &RpcRequest) -> Self {
        Self {
            method: request.method.clone(),
            timestamp: request.timestamp.clone(),
        }
    }

    /// The method name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingMethod`] when the metadata key is absent or
    /// empty. No method state is ever created for a missing name.
    pub fn method(&self) -> Result<&str> {
        match self.method.as_deref() {
            Some(method) if !method.is_empty() => Ok(method),
            _ => Err(Error::MissingMethod),
        }
    }

    /// The request's start time.
    ///
    /// Parses the `timestamp` metadata as RFC-3339; an absent or unparsable
    /// value is recovered locally by substituting the current time.
    pub fn start_time(&self) -> DateTime<Utc> {
        let Some(raw) = self.timestamp.as_deref() else {
            return Utc::now();
        };

        match DateTime::parse_from_rfc3339(raw) {
            Ok(parsed) => parsed.with_timezone(&Utc),
            Err(err) => {
                tracing::debug!(timestamp = raw, %err, "unparsable timestamp, substituting now");
                Utc::now()
            }
        }
    }
}
