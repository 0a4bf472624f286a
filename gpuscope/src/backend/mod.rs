//! Device-profiling backend seam
//!
//! The correlation engine never talks to a tracing library directly; it
//! consumes the [`ActivityBackend`] surface below. A backend is a process-wide
//! service shared by every session, so all methods take `&self`.
//!
//! - [`RecordedBackend`]: in-memory implementation that replays a recorded
//!   buffer, used by the replay binary and by tests

pub mod recorded;

pub use recorded::{RecordedBackend, RecordedTrace};

use std::collections::BTreeSet;

use gpuscope_common::{CorrelationFlow, Platform, RawRecord};

use crate::domain::{ActivityKind, BackendError};

pub trait ActivityBackend: Send + Sync {
    /// Cap the size of device activity buffers
    ///
    /// # Errors
    /// Returns an error if the backend rejects the limit
    fn set_max_buffer_size(&self, bytes: usize) -> Result<(), BackendError>;

    /// Start collecting the given kinds
    ///
    /// # Errors
    /// Returns an error if any kind cannot be enabled
    fn enable(&self, kinds: &BTreeSet<ActivityKind>) -> Result<(), BackendError>;

    /// Stop collecting the given kinds
    fn disable(&self, kinds: &BTreeSet<ActivityKind>);

    /// Take the completed activity buffer, if any records were collected
    fn activity_buffer(&self) -> Option<Vec<RawRecord>>;

    fn push_correlation_id(&self, id: u64, flow: CorrelationFlow);

    fn pop_correlation_id(&self, flow: CorrelationFlow);

    /// Discard any buffered activities that were never drained
    fn clear_activities(&self);

    /// Platforms and their devices, in backend order
    fn platforms(&self) -> Vec<Platform>;
}
