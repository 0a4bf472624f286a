//! Correlation bookkeeping for one capture
//!
//! - [`CorrelationMap`]: backend correlation id → host ids, fed by
//!   `ExternalCorrelation` records
//! - [`PendingLinks`]: runtime calls waiting for the device work they issued
//! - [`QueuePool`]: raw queue handles → small per-session ordinals

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{CorrelationId, DeviceIndex, ExternalId, QueueIndex};
use crate::trace::NormalizedActivity;

/// Host ids attached to backend correlation ids
///
/// Last write wins: the host pushes and pops ids in stack order, so the most
/// recent association is the innermost one.
#[derive(Debug, Default)]
pub struct CorrelationMap {
    external: HashMap<CorrelationId, ExternalId>,
    user: HashMap<CorrelationId, ExternalId>,
}

impl CorrelationMap {
    pub fn record_external(&mut self, correlation_id: CorrelationId, external_id: ExternalId) {
        self.external.insert(correlation_id, external_id);
    }

    pub fn record_user(&mut self, correlation_id: CorrelationId, user_id: ExternalId) {
        self.user.insert(correlation_id, user_id);
    }

    pub fn external_id(&self, correlation_id: CorrelationId) -> Option<ExternalId> {
        self.external.get(&correlation_id).copied()
    }

    pub fn user_id(&self, correlation_id: CorrelationId) -> Option<ExternalId> {
        self.user.get(&correlation_id).copied()
    }

    pub fn len(&self) -> usize {
        self.external.len() + self.user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.external.is_empty() && self.user.is_empty()
    }

    pub fn clear(&mut self) {
        self.external.clear();
        self.user.clear();
    }
}

/// Runtime calls keyed by correlation id, each consumable once
#[derive(Debug, Default)]
pub struct PendingLinks {
    runtime: HashMap<CorrelationId, Arc<NormalizedActivity>>,
}

impl PendingLinks {
    /// Make a runtime call available for linkage, replacing any earlier one
    pub fn register(&mut self, correlation_id: CorrelationId, activity: Arc<NormalizedActivity>) {
        self.runtime.insert(correlation_id, activity);
    }

    /// Take the runtime call for `correlation_id`; a second take returns `None`
    pub fn take(&mut self, correlation_id: CorrelationId) -> Option<Arc<NormalizedActivity>> {
        self.runtime.remove(&correlation_id)
    }

    pub fn len(&self) -> usize {
        self.runtime.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runtime.is_empty()
    }

    pub fn clear(&mut self) {
        self.runtime.clear();
    }
}

/// A raw queue handle and the device it was first seen on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedQueue {
    pub raw_id: u64,
    pub device: DeviceIndex,
}

/// Assigns ordinals to raw queue handles in first-seen order
#[derive(Debug, Default)]
pub struct QueuePool {
    queues: Vec<MappedQueue>,
}

impl QueuePool {
    /// Ordinal of `raw_id`, assigning the next one on first sight
    pub fn index_of(&mut self, raw_id: u64, device: DeviceIndex) -> QueueIndex {
        let position = self.queues.iter().position(|q| q.raw_id == raw_id).unwrap_or_else(|| {
            self.queues.push(MappedQueue { raw_id, device });
            self.queues.len() - 1
        });
        QueueIndex(u32::try_from(position).unwrap_or(u32::MAX))
    }

    pub fn queues(&self) -> &[MappedQueue] {
        &self.queues
    }

    pub fn clear(&mut self) {
        self.queues.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Pid, Tid, Timestamp};
    use crate::trace::{ActivityDetails, Placement};
    use crate::ActivityKind;

    fn runtime_call(correlation: u64) -> Arc<NormalizedActivity> {
        Arc::new(NormalizedActivity {
            kind: ActivityKind::Runtime,
            name: "zeCommandListAppendLaunchKernel".to_string(),
            placement: Placement::Host { pid: Pid(1), tid: Tid(2) },
            start: Timestamp(100),
            end: Timestamp(110),
            correlation_id: Some(CorrelationId(correlation)),
            external_id: None,
            user_id: None,
            linked: None,
            host_activity: None,
            details: ActivityDetails::Runtime,
        })
    }

    #[test]
    fn test_last_write_wins() {
        let mut map = CorrelationMap::default();
        map.record_external(CorrelationId(7), ExternalId(1));
        map.record_external(CorrelationId(7), ExternalId(2));
        map.record_user(CorrelationId(7), ExternalId(50));

        assert_eq!(map.external_id(CorrelationId(7)), Some(ExternalId(2)));
        assert_eq!(map.user_id(CorrelationId(7)), Some(ExternalId(50)));
        assert_eq!(map.external_id(CorrelationId(8)), None);
    }

    #[test]
    fn test_flows_are_independent() {
        let mut map = CorrelationMap::default();
        map.record_user(CorrelationId(3), ExternalId(9));
        assert_eq!(map.external_id(CorrelationId(3)), None);
        map.clear();
        assert!(map.is_empty());
    }

    #[test]
    fn test_pending_link_consumed_once() {
        let mut links = PendingLinks::default();
        links.register(CorrelationId(7), runtime_call(7));

        assert!(links.take(CorrelationId(7)).is_some());
        assert!(links.take(CorrelationId(7)).is_none());
        assert!(links.is_empty());
    }

    #[test]
    fn test_queue_pool_first_seen_order() {
        let mut pool = QueuePool::default();
        assert_eq!(pool.index_of(0xffff_0000, DeviceIndex(0)), QueueIndex(0));
        assert_eq!(pool.index_of(0xaaaa_0000, DeviceIndex(1)), QueueIndex(1));
        assert_eq!(pool.index_of(0xffff_0000, DeviceIndex(1)), QueueIndex(0));
        assert_eq!(pool.queues()[0].device, DeviceIndex(0));
        assert_eq!(pool.queues().len(), 2);
    }
}
