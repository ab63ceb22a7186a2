// src/core/errors.rs

//! Defines the primary error type for the entire daemon.

use std::num::ParseIntError;
use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the engine.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum AegisError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Duplicate name '{0}' under the same parent")]
    DuplicateName(String),

    #[error("Event not allowed in the current state: {0}")]
    InvalidState(String),

    #[error("Value is not an integer or out of range")]
    NotAnInteger,

    #[error("Malformed distinguished name '{0}'")]
    MalformedDn(String),

    #[error("Truncated or corrupt wire data")]
    IncompleteData,

    #[error("Checksum mismatch on sync payload")]
    ChecksumMismatch,

    #[error("Unsupported protocol version {0}")]
    ProtocolVersion(u8),

    #[error("Unknown message tag {0}")]
    UnknownMessage(u8),

    #[error("Unknown invocation {0}")]
    UnknownInvocation(u64),

    #[error("Healthcheck key '{0}' is not configured")]
    HealthcheckNotConfigured(String),

    #[error("Transport Error: {0}")]
    TransportError(String),

    #[error("Admin Error: {0}")]
    AdminError(String),

    #[error("Internal Error: {0}")]
    Internal(String),
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
// We wrap it in an Arc to allow for cheap, shared cloning.
impl Clone for AegisError {
    fn clone(&self) -> Self {
        match self {
            AegisError::Io(e) => AegisError::Io(Arc::clone(e)),
            AegisError::Config(s) => AegisError::Config(s.clone()),
            AegisError::NotFound(s) => AegisError::NotFound(s.clone()),
            AegisError::DuplicateName(s) => AegisError::DuplicateName(s.clone()),
            AegisError::InvalidState(s) => AegisError::InvalidState(s.clone()),
            AegisError::NotAnInteger => AegisError::NotAnInteger,
            AegisError::MalformedDn(s) => AegisError::MalformedDn(s.clone()),
            AegisError::IncompleteData => AegisError::IncompleteData,
            AegisError::ChecksumMismatch => AegisError::ChecksumMismatch,
            AegisError::ProtocolVersion(v) => AegisError::ProtocolVersion(*v),
            AegisError::UnknownMessage(t) => AegisError::UnknownMessage(*t),
            AegisError::UnknownInvocation(i) => AegisError::UnknownInvocation(*i),
            AegisError::HealthcheckNotConfigured(k) => {
                AegisError::HealthcheckNotConfigured(k.clone())
            }
            AegisError::TransportError(s) => AegisError::TransportError(s.clone()),
            AegisError::AdminError(s) => AegisError::AdminError(s.clone()),
            AegisError::Internal(s) => AegisError::Internal(s.clone()),
        }
    }
}

impl PartialEq for AegisError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AegisError::Io(e1), AegisError::Io(e2)) => e1.to_string() == e2.to_string(),
            (AegisError::Config(s1), AegisError::Config(s2)) => s1 == s2,
            (AegisError::NotFound(s1), AegisError::NotFound(s2)) => s1 == s2,
            (AegisError::DuplicateName(s1), AegisError::DuplicateName(s2)) => s1 == s2,
            (AegisError::InvalidState(s1), AegisError::InvalidState(s2)) => s1 == s2,
            (AegisError::MalformedDn(s1), AegisError::MalformedDn(s2)) => s1 == s2,
            (AegisError::ProtocolVersion(v1), AegisError::ProtocolVersion(v2)) => v1 == v2,
            (AegisError::UnknownMessage(t1), AegisError::UnknownMessage(t2)) => t1 == t2,
            (AegisError::UnknownInvocation(i1), AegisError::UnknownInvocation(i2)) => i1 == i2,
            (AegisError::HealthcheckNotConfigured(k1), AegisError::HealthcheckNotConfigured(k2)) => {
                k1 == k2
            }
            (AegisError::TransportError(s1), AegisError::TransportError(s2)) => s1 == s2,
            (AegisError::AdminError(s1), AegisError::AdminError(s2)) => s1 == s2,
            (AegisError::Internal(s1), AegisError::Internal(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for AegisError {
    fn from(e: std::io::Error) -> Self {
        AegisError::Io(Arc::new(e))
    }
}

impl From<ParseIntError> for AegisError {
    fn from(_: ParseIntError) -> Self {
        AegisError::NotAnInteger
    }
}

impl From<serde_json::Error> for AegisError {
    fn from(e: serde_json::Error) -> Self {
        AegisError::AdminError(format!("JSON serialization/deserialization error: {e}"))
    }
}
