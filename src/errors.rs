//! Error taxonomy for the crate (spec §7).
//!
//! Grounded on `pmocontrol::errors::ControlPointError`: one `thiserror` enum
//! covering every layer, rather than a per-module error type. Unlike the
//! teacher, each transport-facing variant carries the structured context
//! (`endpoint`, `attempt`, `device`) spec §7 and §4.1 require instead of a
//! single formatted string, since callers are expected to branch on it.

use thiserror::Error;

use crate::model::DeviceId;

#[derive(Clone, Debug)]
pub struct RequestContext {
    pub device: DeviceId,
    pub endpoint: String,
    pub attempt: u32,
}

#[derive(Error, Debug)]
pub enum ControlError {
    /// The host is unreachable.
    #[error("connection failed to {} ({} after {} attempt(s))", .0.device, .0.endpoint, .0.attempt)]
    Connection(RequestContext),

    /// The request deadline elapsed.
    #[error("request to {} timed out on {} after {} attempt(s))", .0.device, .0.endpoint, .0.attempt)]
    Timeout(RequestContext),

    /// TLS/HTTP failure that is not a timeout.
    #[error("transport protocol error talking to {} on {}: {1}", .0.device, .0.endpoint)]
    TransportProtocol(RequestContext, String),

    /// Device returned 4xx, or a parsed "unknown command".
    #[error("device {} rejected {}: {1}", .0.device, .0.endpoint)]
    DeviceRejected(RequestContext, String),

    /// Body could not be parsed into the expected shape.
    #[error("response from {} on {} could not be parsed: {1}", .0.device, .0.endpoint)]
    ResponseInvalid(RequestContext, String),

    /// The operation is known-impossible on this device or this source.
    #[error("{operation} is unsupported on {reason}")]
    Unsupported { operation: String, reason: String },

    /// A group or state precondition was violated.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
}

impl ControlError {
    pub fn unsupported(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        ControlError::Unsupported {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        ControlError::PreconditionFailed(message.into())
    }

    /// True for the classes Transport is allowed to retry (§7): Connection,
    /// Timeout, TransportProtocol. Never DeviceRejected/ResponseInvalid.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ControlError::Connection(_) | ControlError::Timeout(_) | ControlError::TransportProtocol(_, _)
        )
    }
}

pub type Result<T> = std::result::Result<T, ControlError>;
