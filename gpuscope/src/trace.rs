//! Normalized trace model and emission sink
//!
//! This is what leaves the correlation engine: kind-agnostic activities in
//! arrival order, grouped under one [`TraceSpan`], owned by a [`TraceBuffer`]
//! that is moved (never copied) to the host.

use gpuscope_common::MemCopyKind;
use std::sync::Arc;

use crate::domain::{
    ActivityKind, CorrelationId, DeviceIndex, ExternalId, Pid, QueueIndex, Tid, Timestamp,
};

/// Where an activity ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placement {
    /// Host thread (runtime calls)
    Host { pid: Pid, tid: Tid },
    /// Device queue (kernels, copies, fills)
    Device { device: DeviceIndex, queue: QueueIndex },
    /// Not attributable to a thread or queue (profiler overhead)
    Unplaced,
}

/// Kind-specific payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityDetails {
    Runtime,
    Kernel,
    MemCopy {
        copy_kind: MemCopyKind,
        bytes: u64,
        /// Peer device, `None` when the other side is host memory
        peer: Option<DeviceIndex>,
    },
    MemFill {
        bytes: u64,
        value: u64,
    },
    Overhead {
        count: u64,
    },
}

/// Host-side activity owned by the aggregator (e.g. a framework operator)
///
/// Only ever read by this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostActivity {
    pub id: ExternalId,
    pub name: String,
    pub start: Timestamp,
    pub end: Timestamp,
}

/// Resolves the host activity recorded under an external correlation id
pub type LinkedActivityResolver = Box<dyn Fn(ExternalId) -> Option<Arc<HostActivity>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedActivity {
    pub kind: ActivityKind,
    pub name: String,
    pub placement: Placement,
    pub start: Timestamp,
    pub end: Timestamp,
    /// `None` for overhead records
    pub correlation_id: Option<CorrelationId>,
    pub external_id: Option<ExternalId>,
    pub user_id: Option<ExternalId>,
    /// Runtime call that issued this device activity
    pub linked: Option<Arc<NormalizedActivity>>,
    /// Host activity the runtime call was made under
    pub host_activity: Option<Arc<HostActivity>>,
    pub details: ActivityDetails,
}

impl NormalizedActivity {
    pub fn duration_ns(&self) -> u64 {
        self.end.0.saturating_sub(self.start.0)
    }
}

/// Time range and identity of one processed capture
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TraceSpan {
    pub start: Timestamp,
    /// `None` while the session has not been stopped
    pub end: Option<Timestamp>,
    pub name: String,
    /// Process-wide iteration number, 0 until the span is processed
    pub iteration: u32,
}

/// Finished trace handed to the host
#[derive(Debug, Clone, Default)]
pub struct TraceBuffer {
    pub span: TraceSpan,
    pub activities: Vec<Arc<NormalizedActivity>>,
}

impl TraceBuffer {
    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NormalizedActivity> {
        self.activities.iter().map(AsRef::as_ref)
    }
}

/// Receives activities as they are normalized
///
/// Implemented by exporters; see [`crate::export::ChromeTraceExporter`].
pub trait ActivityLogger {
    /// Called once per `process_trace`, before any activity
    fn handle_span(&mut self, _span: &TraceSpan) {}

    fn handle_activity(&mut self, activity: &NormalizedActivity);
}

/// Logger that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl ActivityLogger for NullLogger {
    fn handle_activity(&mut self, _activity: &NormalizedActivity) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overhead(start: u64, end: u64) -> NormalizedActivity {
        NormalizedActivity {
            kind: ActivityKind::Overhead,
            name: "Buffer Flush".to_string(),
            placement: Placement::Unplaced,
            start: Timestamp(start),
            end: Timestamp(end),
            correlation_id: None,
            external_id: None,
            user_id: None,
            linked: None,
            host_activity: None,
            details: ActivityDetails::Overhead { count: 1 },
        }
    }

    #[test]
    fn test_duration() {
        assert_eq!(overhead(100, 250).duration_ns(), 150);
    }

    #[test]
    fn test_buffer_iter_preserves_order() {
        let buffer = TraceBuffer {
            span: TraceSpan::default(),
            activities: vec![Arc::new(overhead(1, 2)), Arc::new(overhead(3, 4))],
        };
        let starts: Vec<_> = buffer.iter().map(|a| a.start).collect();
        assert_eq!(starts, vec![Timestamp(1), Timestamp(3)]);
        assert_eq!(buffer.len(), 2);
    }
}
