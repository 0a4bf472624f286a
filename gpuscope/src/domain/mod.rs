//! Domain model: identifier newtypes, activity kinds and error enums
//!
//! Backend ids are all plain integers on the wire. Wrapping each in its own
//! type keeps a correlation id from being passed where an external id or a
//! queue handle is expected.

pub mod errors;
pub mod types;

pub use types::{
    ActivityKind, CorrelationId, DeviceIndex, DeviceUuid, ExternalId, Pid, QueueIndex, Tid,
    Timestamp,
};

pub use errors::{BackendError, ExportError, ProfilerError, RecordError};
