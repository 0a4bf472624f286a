//! Structured error types for gpuscope
//!
//! Using thiserror for automatic Display implementation and error chaining.
//!
//! Two families with different policies:
//! - [`RecordError`]: one malformed record must never abort a drain, so these
//!   are collected into the session's error list and processing continues.
//! - [`ProfilerError`]: structural misuse or backend failure, returned to the
//!   caller immediately.

use super::types::{ActivityKind, CorrelationId, DeviceUuid, Timestamp};
use thiserror::Error;

/// Per-record diagnostics accumulated during `process_trace`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Malformed {kind} record ({correlation_id}): start {start} is after end {end}")]
    MalformedTimestamps {
        kind: &'static str,
        correlation_id: CorrelationId,
        start: Timestamp,
        end: Timestamp,
    },

    #[error("No enumerated device matches UUID {0}; records on it use device index 0")]
    UnresolvableDevice(DeviceUuid),
}

/// Failures reported by an activity backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Backend rejected buffer size of {0} bytes")]
    BufferSize(usize),

    #[error("Backend failed to enable {0} activities")]
    Enable(ActivityKind),

    #[error("Backend error: {0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("{0} is a legacy method and must not be called")]
    Unsupported(&'static str),

    #[error("Activity kind {0} is not supported by this profiler")]
    UnsupportedKind(ActivityKind),

    #[error("Cannot {operation} a session in state {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
