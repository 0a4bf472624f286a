//! # Activity Normalization
//!
//! Converts raw backend records into [`NormalizedActivity`] values and routes
//! them into the session's trace buffer.
//!
//! ## Record Routing
//!
//! - `Runtime` → registered for linkage, emitted if runtime calls were requested
//! - `Kernel` / `MemCopy` / `MemFill` → device + queue resolution, linked to
//!   the runtime call sharing their correlation id, emitted
//! - `Overhead` → emitted as-is
//! - `ExternalCorrelation` → updates the correlation map, never emitted
//!
//! ## Admission
//!
//! Every timed record passes two checks before it is looked at further, in
//! this order:
//!
//! 1. **Timestamp order**: `start > end` is malformed. The record is dropped
//!    and exactly one [`RecordError::MalformedTimestamps`] is collected.
//! 2. **Capture window**: a record not lying inside the window is dropped
//!    without a diagnostic. Dropped records never take part in linkage.
//!
//! Linkage is consumed at most once and depends on arrival order, so records
//! must be fed in the order the backend produced them.

use gpuscope_common::{
    CorrelationFlow, ExternalCorrelationRecord, KernelRecord, MemCopyRecord, MemFillRecord,
    OverheadRecord, RawRecord, RuntimeRecord,
};
use log::{debug, warn};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use crate::correlation::{CorrelationMap, PendingLinks, QueuePool};
use crate::device::DeviceSnapshot;
use crate::domain::{
    ActivityKind, CorrelationId, DeviceIndex, DeviceUuid, ExternalId, Pid, RecordError, Tid,
    Timestamp,
};
use crate::trace::{
    ActivityDetails, ActivityLogger, HostActivity, LinkedActivityResolver, NormalizedActivity,
    Placement, TraceBuffer,
};

/// Time range records must fall into to be kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureWindow {
    pub start: Timestamp,
    /// `None` means no upper bound
    pub end: Option<Timestamp>,
}

impl CaptureWindow {
    pub fn new(start: Timestamp, end: Option<Timestamp>) -> Self {
        Self { start, end }
    }

    /// Whether `[start, end]` lies entirely inside the window
    pub fn contains(&self, start: Timestamp, end: Timestamp) -> bool {
        start >= self.start && self.end.map_or(true, |window_end| end <= window_end)
    }
}

/// Per-drain counters for diagnostics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NormalizerStats {
    pub records: usize,
    pub emitted: usize,
    pub malformed: usize,
    pub out_of_window: usize,
    /// Records of kinds the session did not request
    pub not_requested: usize,
    /// Device activities that found their runtime call
    pub linked: usize,
    /// Linked device activities that start before their runtime call
    pub skewed: usize,
    pub correlations: usize,
}

/// Shared fields of the three device-side record kinds
struct DeviceWork<'r> {
    kind: ActivityKind,
    name: String,
    start: Timestamp,
    end: Timestamp,
    correlation_id: CorrelationId,
    device_uuid: &'r [u8; 16],
    queue_id: u64,
    details: ActivityDetails,
}

/// Encapsulates normalization logic and per-session correlation state
pub struct ActivityNormalizer {
    // Configuration
    requested: BTreeSet<ActivityKind>,
    window: CaptureWindow,

    // Mutable state
    pub stats: NormalizerStats,
    correlations: CorrelationMap,
    pending: PendingLinks,
    queues: QueuePool,
    errors: Vec<RecordError>,
    /// Unknown UUIDs already reported this session
    unresolved: HashSet<DeviceUuid>,

    // Dependencies (readonly)
    devices: DeviceSnapshot,
    resolver: Option<LinkedActivityResolver>,
}

impl ActivityNormalizer {
    #[must_use]
    pub fn new(devices: DeviceSnapshot, requested: BTreeSet<ActivityKind>) -> Self {
        Self {
            requested,
            window: CaptureWindow::default(),
            stats: NormalizerStats::default(),
            correlations: CorrelationMap::default(),
            pending: PendingLinks::default(),
            queues: QueuePool::default(),
            errors: Vec::new(),
            unresolved: HashSet::new(),
            devices,
            resolver: None,
        }
    }

    pub fn set_window(&mut self, window: CaptureWindow) {
        self.window = window;
    }

    pub fn window(&self) -> CaptureWindow {
        self.window
    }

    pub fn set_resolver(&mut self, resolver: Option<LinkedActivityResolver>) {
        self.resolver = resolver;
    }

    pub fn errors(&self) -> &[RecordError] {
        &self.errors
    }

    pub fn correlations(&self) -> &CorrelationMap {
        &self.correlations
    }

    pub fn queues(&self) -> &QueuePool {
        &self.queues
    }

    /// Drop all correlation state (end of session)
    pub fn clear(&mut self) {
        self.correlations.clear();
        self.pending.clear();
        self.queues.clear();
        self.unresolved.clear();
        self.resolver = None;
    }

    /// Process a single raw record
    pub fn process_record(
        &mut self,
        record: &RawRecord,
        buffer: &mut TraceBuffer,
        logger: &mut dyn ActivityLogger,
    ) {
        self.stats.records += 1;

        if let Some((start, end)) = record.interval() {
            let correlation_id = CorrelationId(record.correlation_id().unwrap_or(0));
            if !self.admit(record.kind_name(), correlation_id, Timestamp(start), Timestamp(end)) {
                return;
            }
        }

        match record {
            RawRecord::Runtime(runtime) => self.handle_runtime(runtime, buffer, logger),
            RawRecord::Kernel(kernel) => self.handle_kernel(kernel, buffer, logger),
            RawRecord::MemCopy(copy) => self.handle_memcpy(copy, buffer, logger),
            RawRecord::MemFill(fill) => self.handle_memset(fill, buffer, logger),
            RawRecord::Overhead(overhead) => self.handle_overhead(overhead, buffer, logger),
            RawRecord::ExternalCorrelation(correlation) => self.handle_correlation(correlation),
        }
    }

    // Private record handlers

    fn admit(
        &mut self,
        kind: &'static str,
        correlation_id: CorrelationId,
        start: Timestamp,
        end: Timestamp,
    ) -> bool {
        if start > end {
            self.stats.malformed += 1;
            self.errors.push(RecordError::MalformedTimestamps { kind, correlation_id, start, end });
            return false;
        }
        if !self.window.contains(start, end) {
            self.stats.out_of_window += 1;
            debug!("Dropping {kind} record ({correlation_id}) outside capture window: [{start}, {end}]");
            return false;
        }
        true
    }

    fn handle_correlation(&mut self, record: &ExternalCorrelationRecord) {
        self.stats.correlations += 1;
        let correlation_id = CorrelationId(record.correlation_id);
        let id = ExternalId(record.external_id);
        match record.flow {
            CorrelationFlow::Default => self.correlations.record_external(correlation_id, id),
            CorrelationFlow::User => self.correlations.record_user(correlation_id, id),
        }
    }

    fn handle_runtime(
        &mut self,
        record: &RuntimeRecord,
        buffer: &mut TraceBuffer,
        logger: &mut dyn ActivityLogger,
    ) {
        let correlation_id = CorrelationId(record.correlation_id);
        let external_id = self.correlations.external_id(correlation_id);

        let activity = Arc::new(NormalizedActivity {
            kind: ActivityKind::Runtime,
            name: record.name.clone(),
            placement: Placement::Host { pid: Pid(record.pid), tid: Tid(record.tid) },
            start: Timestamp(record.start_ns),
            end: Timestamp(record.end_ns),
            correlation_id: Some(correlation_id),
            external_id,
            user_id: self.correlations.user_id(correlation_id),
            linked: None,
            host_activity: external_id.and_then(|id| self.host_activity(id)),
            details: ActivityDetails::Runtime,
        });

        // Runtime calls are kept for linkage even when not emitted
        self.pending.register(correlation_id, Arc::clone(&activity));
        self.emit(activity, buffer, logger);
    }

    fn handle_kernel(
        &mut self,
        record: &KernelRecord,
        buffer: &mut TraceBuffer,
        logger: &mut dyn ActivityLogger,
    ) {
        self.handle_device_work(
            DeviceWork {
                kind: ActivityKind::Kernel,
                name: record.name.clone(),
                start: Timestamp(record.start_ns),
                end: Timestamp(record.end_ns),
                correlation_id: CorrelationId(record.correlation_id),
                device_uuid: &record.device_uuid,
                queue_id: record.queue_id,
                details: ActivityDetails::Kernel,
            },
            buffer,
            logger,
        );
    }

    fn handle_memcpy(
        &mut self,
        record: &MemCopyRecord,
        buffer: &mut TraceBuffer,
        logger: &mut dyn ActivityLogger,
    ) {
        let peer_uuid = DeviceUuid(record.peer_device_uuid);
        let peer = if peer_uuid.is_unknown() { None } else { self.devices.lookup(peer_uuid) };

        self.handle_device_work(
            DeviceWork {
                kind: ActivityKind::MemCopy,
                name: format!("Memcpy {}", record.copy_kind.label()),
                start: Timestamp(record.start_ns),
                end: Timestamp(record.end_ns),
                correlation_id: CorrelationId(record.correlation_id),
                device_uuid: &record.device_uuid,
                queue_id: record.queue_id,
                details: ActivityDetails::MemCopy {
                    copy_kind: record.copy_kind,
                    bytes: record.bytes,
                    peer,
                },
            },
            buffer,
            logger,
        );
    }

    fn handle_memset(
        &mut self,
        record: &MemFillRecord,
        buffer: &mut TraceBuffer,
        logger: &mut dyn ActivityLogger,
    ) {
        self.handle_device_work(
            DeviceWork {
                kind: ActivityKind::MemFill,
                name: "Memset".to_string(),
                start: Timestamp(record.start_ns),
                end: Timestamp(record.end_ns),
                correlation_id: CorrelationId(record.correlation_id),
                device_uuid: &record.device_uuid,
                queue_id: record.queue_id,
                details: ActivityDetails::MemFill { bytes: record.bytes, value: record.value },
            },
            buffer,
            logger,
        );
    }

    fn handle_overhead(
        &mut self,
        record: &OverheadRecord,
        buffer: &mut TraceBuffer,
        logger: &mut dyn ActivityLogger,
    ) {
        let activity = NormalizedActivity {
            kind: ActivityKind::Overhead,
            name: record.overhead_kind.name().to_string(),
            placement: Placement::Unplaced,
            start: Timestamp(record.start_ns),
            end: Timestamp(record.end_ns),
            correlation_id: None,
            external_id: None,
            user_id: None,
            linked: None,
            host_activity: None,
            details: ActivityDetails::Overhead { count: record.count },
        };
        self.emit(Arc::new(activity), buffer, logger);
    }

    fn handle_device_work(
        &mut self,
        work: DeviceWork<'_>,
        buffer: &mut TraceBuffer,
        logger: &mut dyn ActivityLogger,
    ) {
        // Unrequested device work must not consume a runtime call's link
        if !self.requested.contains(&work.kind) {
            self.stats.not_requested += 1;
            return;
        }

        let device = self.resolve_device(DeviceUuid(*work.device_uuid));
        let queue = self.queues.index_of(work.queue_id, device);
        let linked = self.pending.take(work.correlation_id);

        if let Some(runtime) = &linked {
            self.stats.linked += 1;
            // Host and device clocks may drift; the activity is kept either way
            if runtime.start > work.start {
                self.stats.skewed += 1;
                warn!(
                    "{} record ({}) starts at {}, before its runtime call at {}",
                    work.kind, work.correlation_id, work.start, runtime.start
                );
            }
        }

        let activity = NormalizedActivity {
            kind: work.kind,
            name: work.name,
            placement: Placement::Device { device, queue },
            start: work.start,
            end: work.end,
            correlation_id: Some(work.correlation_id),
            external_id: self.correlations.external_id(work.correlation_id),
            user_id: self.correlations.user_id(work.correlation_id),
            linked,
            host_activity: None,
            details: work.details,
        };
        self.emit(Arc::new(activity), buffer, logger);
    }

    fn emit(
        &mut self,
        activity: Arc<NormalizedActivity>,
        buffer: &mut TraceBuffer,
        logger: &mut dyn ActivityLogger,
    ) {
        if !self.requested.contains(&activity.kind) {
            self.stats.not_requested += 1;
            return;
        }
        logger.handle_activity(&activity);
        buffer.activities.push(activity);
        self.stats.emitted += 1;
    }

    /// Device index for `uuid`, reporting each unknown UUID once per session
    fn resolve_device(&mut self, uuid: DeviceUuid) -> DeviceIndex {
        if let Some(index) = self.devices.lookup(uuid) {
            return index;
        }
        if self.unresolved.insert(uuid) {
            self.errors.push(RecordError::UnresolvableDevice(uuid));
            return self.devices.resolve_index(uuid);
        }
        DeviceIndex(0)
    }

    fn host_activity(&self, external_id: ExternalId) -> Option<Arc<HostActivity>> {
        self.resolver.as_ref().and_then(|resolve| resolve(external_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordedBackend;
    use crate::device::DeviceTable;
    use crate::domain::QueueIndex;
    use crate::trace::NullLogger;
    use gpuscope_common::{DeviceDescriptor, MemCopyKind, Platform, PlatformKind};

    const GPU0: [u8; 16] = [1; 16];

    fn normalizer(requested: &[ActivityKind]) -> ActivityNormalizer {
        let backend = RecordedBackend::new(vec![Platform {
            kind: PlatformKind::LevelZero,
            devices: vec![DeviceDescriptor {
                name: "gpu0".to_string(),
                is_gpu: true,
                uuid: Some(GPU0),
            }],
        }]);
        let devices = DeviceTable::new().ensure_enumerated(&backend);
        let mut normalizer =
            ActivityNormalizer::new(devices, requested.iter().copied().collect());
        normalizer.set_window(CaptureWindow::new(Timestamp(0), Some(Timestamp(1000))));
        normalizer
    }

    fn runtime(correlation_id: u64, start_ns: u64, end_ns: u64) -> RawRecord {
        RawRecord::Runtime(RuntimeRecord {
            name: "zeCommandListAppendLaunchKernel".to_string(),
            start_ns,
            end_ns,
            correlation_id,
            pid: 10,
            tid: 11,
        })
    }

    fn kernel(correlation_id: u64, start_ns: u64, end_ns: u64) -> RawRecord {
        RawRecord::Kernel(KernelRecord {
            name: "gemm".to_string(),
            start_ns,
            end_ns,
            correlation_id,
            device_uuid: GPU0,
            queue_id: 0x5555,
            tid: 11,
        })
    }

    fn run(normalizer: &mut ActivityNormalizer, records: &[RawRecord]) -> TraceBuffer {
        let mut buffer = TraceBuffer::default();
        for record in records {
            normalizer.process_record(record, &mut buffer, &mut NullLogger);
        }
        buffer
    }

    #[test]
    fn test_window_contains() {
        let window = CaptureWindow::new(Timestamp(100), Some(Timestamp(200)));
        assert!(window.contains(Timestamp(100), Timestamp(200)));
        assert!(!window.contains(Timestamp(50), Timestamp(150)));
        assert!(!window.contains(Timestamp(150), Timestamp(250)));
        assert!(!window.contains(Timestamp(300), Timestamp(400)));

        let open = CaptureWindow::new(Timestamp(100), None);
        assert!(open.contains(Timestamp(100), Timestamp(u64::MAX)));
    }

    #[test]
    fn test_kernel_links_to_runtime() {
        let mut normalizer = normalizer(&[ActivityKind::Runtime, ActivityKind::Kernel]);
        let buffer = run(&mut normalizer, &[runtime(7, 100, 110), kernel(7, 120, 200)]);

        assert_eq!(buffer.len(), 2);
        let kernel = &buffer.activities[1];
        let linked = kernel.linked.as_ref().expect("kernel should be linked");
        assert!(Arc::ptr_eq(linked, &buffer.activities[0]));
        assert_eq!(
            kernel.placement,
            Placement::Device { device: DeviceIndex(0), queue: QueueIndex(0) }
        );
        assert_eq!(normalizer.stats.linked, 1);
    }

    #[test]
    fn test_link_is_consumed_once() {
        let mut normalizer = normalizer(&[ActivityKind::Kernel]);
        let buffer =
            run(&mut normalizer, &[runtime(7, 100, 110), kernel(7, 120, 200), kernel(7, 210, 300)]);

        assert_eq!(buffer.len(), 2);
        assert!(buffer.activities[0].linked.is_some());
        assert!(buffer.activities[1].linked.is_none());
    }

    #[test]
    fn test_inverted_record_is_an_error() {
        let mut normalizer = normalizer(&[ActivityKind::Kernel]);
        let buffer = run(&mut normalizer, &[kernel(1, 500, 100)]);

        assert!(buffer.is_empty());
        assert_eq!(normalizer.errors().len(), 1);
        assert!(matches!(normalizer.errors()[0], RecordError::MalformedTimestamps { .. }));
    }

    #[test]
    fn test_out_of_window_is_silent() {
        let mut normalizer = normalizer(&[ActivityKind::Kernel, ActivityKind::Runtime]);
        let buffer = run(&mut normalizer, &[runtime(3, 2000, 2100), kernel(3, 900, 1100)]);

        assert!(buffer.is_empty());
        assert!(normalizer.errors().is_empty());
        assert_eq!(normalizer.stats.out_of_window, 2);
    }

    #[test]
    fn test_dropped_runtime_does_not_link() {
        let mut normalizer = normalizer(&[ActivityKind::Kernel]);
        let buffer = run(&mut normalizer, &[runtime(4, 500, 100), kernel(4, 600, 700)]);

        assert_eq!(buffer.len(), 1);
        assert!(buffer.activities[0].linked.is_none());
    }

    #[test]
    fn test_unknown_device_reported_once() {
        let mut normalizer = normalizer(&[ActivityKind::Kernel]);
        let stray = |correlation_id| {
            RawRecord::Kernel(KernelRecord {
                name: "stray".to_string(),
                start_ns: 10,
                end_ns: 20,
                correlation_id,
                device_uuid: [0xee; 16],
                queue_id: 1,
                tid: 1,
            })
        };
        let buffer = run(&mut normalizer, &[stray(1), stray(2)]);

        assert_eq!(buffer.len(), 2);
        assert_eq!(normalizer.errors(), &[RecordError::UnresolvableDevice(DeviceUuid([0xee; 16]))]);
        for activity in buffer.iter() {
            assert!(matches!(activity.placement, Placement::Device { device: DeviceIndex(0), .. }));
        }
    }

    #[test]
    fn test_external_correlation_attaches_ids() {
        let mut normalizer = normalizer(&[ActivityKind::Kernel]);
        let buffer = run(
            &mut normalizer,
            &[
                RawRecord::ExternalCorrelation(ExternalCorrelationRecord {
                    flow: CorrelationFlow::Default,
                    correlation_id: 7,
                    external_id: 42,
                }),
                RawRecord::ExternalCorrelation(ExternalCorrelationRecord {
                    flow: CorrelationFlow::User,
                    correlation_id: 7,
                    external_id: 5,
                }),
                kernel(7, 120, 200),
            ],
        );

        assert_eq!(buffer.activities[0].external_id, Some(ExternalId(42)));
        assert_eq!(buffer.activities[0].user_id, Some(ExternalId(5)));
        assert_eq!(normalizer.correlations().external_id(CorrelationId(7)), Some(ExternalId(42)));
    }

    #[test]
    fn test_resolver_links_host_activity() {
        let mut normalizer = normalizer(&[ActivityKind::Runtime]);
        let resolver: LinkedActivityResolver = Box::new(|id: ExternalId| {
            Some(Arc::new(HostActivity {
                id,
                name: "aten::matmul".to_string(),
                start: Timestamp(90),
                end: Timestamp(150),
            }))
        });
        normalizer.set_resolver(Some(resolver));
        let buffer = run(
            &mut normalizer,
            &[
                RawRecord::ExternalCorrelation(ExternalCorrelationRecord {
                    flow: CorrelationFlow::Default,
                    correlation_id: 7,
                    external_id: 42,
                }),
                runtime(7, 100, 110),
                runtime(8, 100, 110),
            ],
        );

        let host = buffer.activities[0].host_activity.as_ref().unwrap();
        assert_eq!(host.id, ExternalId(42));
        assert_eq!(host.name, "aten::matmul");
        assert!(buffer.activities[1].host_activity.is_none());
    }

    #[test]
    fn test_device_work_before_runtime_is_kept_and_counted() {
        let mut normalizer = normalizer(&[ActivityKind::Kernel]);
        let buffer = run(&mut normalizer, &[runtime(9, 300, 310), kernel(9, 200, 400)]);

        assert_eq!(buffer.len(), 1);
        assert!(buffer.activities[0].linked.is_some());
        assert_eq!(normalizer.stats.skewed, 1);
        assert!(normalizer.errors().is_empty());
    }

    #[test]
    fn test_memcpy_and_memset() {
        let mut normalizer = normalizer(&[ActivityKind::MemCopy, ActivityKind::MemFill]);
        let buffer = run(
            &mut normalizer,
            &[
                RawRecord::MemCopy(MemCopyRecord {
                    copy_kind: MemCopyKind::HostToDevice,
                    bytes: 4096,
                    start_ns: 10,
                    end_ns: 20,
                    correlation_id: 1,
                    device_uuid: GPU0,
                    peer_device_uuid: [0; 16],
                    queue_id: 0x10,
                    tid: 1,
                }),
                RawRecord::MemFill(MemFillRecord {
                    bytes: 64,
                    value: 0,
                    start_ns: 30,
                    end_ns: 40,
                    correlation_id: 2,
                    device_uuid: GPU0,
                    queue_id: 0x20,
                    tid: 1,
                }),
            ],
        );

        assert_eq!(buffer.activities[0].name, "Memcpy M2D");
        assert_eq!(
            buffer.activities[0].details,
            ActivityDetails::MemCopy {
                copy_kind: MemCopyKind::HostToDevice,
                bytes: 4096,
                peer: None,
            }
        );
        assert_eq!(buffer.activities[1].name, "Memset");
        assert_eq!(
            buffer.activities[1].placement,
            Placement::Device { device: DeviceIndex(0), queue: QueueIndex(1) }
        );
    }

    #[test]
    fn test_overhead_and_unrequested_kinds() {
        let mut normalizer = normalizer(&[ActivityKind::Overhead]);
        let buffer = run(
            &mut normalizer,
            &[
                RawRecord::Overhead(OverheadRecord {
                    overhead_kind: gpuscope_common::OverheadKind::BufferFlush,
                    start_ns: 5,
                    end_ns: 9,
                    count: 2,
                }),
                kernel(1, 10, 20),
            ],
        );

        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.activities[0].placement, Placement::Unplaced);
        assert_eq!(buffer.activities[0].details, ActivityDetails::Overhead { count: 2 });
        assert_eq!(normalizer.stats.not_requested, 1);
    }
}
