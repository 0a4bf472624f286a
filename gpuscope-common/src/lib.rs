//! # Raw Activity Records (Backend ↔ Correlation Engine)
//!
//! Defines the records a device-profiling backend hands to the correlation
//! engine. These types describe the backend's buffer entries as they arrive:
//! nothing here is validated, normalized, or linked. That is the job of the
//! `gpuscope` crate.
//!
//! ## Record Kinds
//!
//! The backend emits a closed set of kinds (see [`RawRecord`]):
//!
//! 1. **Runtime** - a host-side runtime API call (e.g. a kernel submit)
//! 2. **Kernel** - a compute kernel executed on a device queue
//! 3. **`MemCopy`** - a memory copy executed on a device queue
//! 4. **`MemFill`** - a memory fill executed on a device queue
//! 5. **Overhead** - time the profiler itself spent on bookkeeping
//! 6. **`ExternalCorrelation`** - associates a backend correlation id with a
//!    host-supplied id; carries no timing
//!
//! ## Enumeration Types
//!
//! - [`Platform`] / [`DeviceDescriptor`] - the backend's device list, used to
//!   build the process-wide device index table

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Size of a device UUID in bytes
pub const DEVICE_UUID_LEN: usize = 16;

/// Raw device UUID as reported by the backend
pub type RawDeviceUuid = [u8; DEVICE_UUID_LEN];

// ============================================================================
// Correlation
// ============================================================================

/// Which correlation stack an id was pushed onto
///
/// The instrumented runtime pushes ids onto two independent stacks. `Default`
/// carries ids from the host framework (operator ids), `User` carries ids from
/// user-level annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CorrelationFlow {
    Default,
    User,
}

// ============================================================================
// Record Payloads
// ============================================================================

/// Host-side runtime API call
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RuntimeRecord {
    /// API function name (e.g. "zeCommandListAppendLaunchKernel")
    pub name: String,

    /// Start timestamp in nanoseconds since the Unix epoch
    pub start_ns: u64,

    /// End timestamp in nanoseconds since the Unix epoch
    pub end_ns: u64,

    /// Backend correlation id, shared with the device work this call issued
    pub correlation_id: u64,

    /// Calling process
    pub pid: u32,

    /// Calling thread
    pub tid: u32,
}

/// Compute kernel executed on a device queue
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KernelRecord {
    /// Demangled kernel name
    pub name: String,

    /// Start timestamp in nanoseconds since the Unix epoch
    pub start_ns: u64,

    /// End timestamp in nanoseconds since the Unix epoch
    pub end_ns: u64,

    /// Backend correlation id of the runtime call that launched this kernel
    pub correlation_id: u64,

    /// UUID of the executing device
    pub device_uuid: RawDeviceUuid,

    /// Backend queue handle (opaque, large; mapped to a small index downstream)
    pub queue_id: u64,

    /// Thread that submitted the kernel
    pub tid: u32,
}

/// Direction of a memory copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MemCopyKind {
    HostToDevice,
    DeviceToHost,
    DeviceToDevice,
    HostToHost,
    SharedToDevice,
    DeviceToShared,
    Unknown,
}

impl MemCopyKind {
    /// Short label used in activity names ("M2D", "D2M", ...)
    pub fn label(self) -> &'static str {
        match self {
            MemCopyKind::HostToDevice => "M2D",
            MemCopyKind::DeviceToHost => "D2M",
            MemCopyKind::DeviceToDevice => "D2D",
            MemCopyKind::HostToHost => "M2M",
            MemCopyKind::SharedToDevice => "S2D",
            MemCopyKind::DeviceToShared => "D2S",
            MemCopyKind::Unknown => "Unknown",
        }
    }
}

/// Memory copy executed on a device queue
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MemCopyRecord {
    /// Copy direction
    pub copy_kind: MemCopyKind,

    /// Number of bytes copied
    pub bytes: u64,

    pub start_ns: u64,
    pub end_ns: u64,
    pub correlation_id: u64,

    /// UUID of the device whose queue executed the copy
    pub device_uuid: RawDeviceUuid,

    /// UUID of the peer device (zeroed when the peer is host memory)
    pub peer_device_uuid: RawDeviceUuid,

    pub queue_id: u64,
    pub tid: u32,
}

/// Memory fill (memset) executed on a device queue
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MemFillRecord {
    /// Number of bytes written
    pub bytes: u64,

    /// Fill value
    pub value: u64,

    pub start_ns: u64,
    pub end_ns: u64,
    pub correlation_id: u64,
    pub device_uuid: RawDeviceUuid,
    pub queue_id: u64,
    pub tid: u32,
}

/// What the profiler was doing during an overhead interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum OverheadKind {
    BufferFlush,
    DriverSync,
    Resource,
    Unknown,
}

impl OverheadKind {
    pub fn name(self) -> &'static str {
        match self {
            OverheadKind::BufferFlush => "Buffer Flush",
            OverheadKind::DriverSync => "Driver Synchronization",
            OverheadKind::Resource => "Resource Overhead",
            OverheadKind::Unknown => "Unknown Overhead",
        }
    }
}

/// Profiler-induced overhead interval
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OverheadRecord {
    pub overhead_kind: OverheadKind,
    pub start_ns: u64,
    pub end_ns: u64,

    /// How many times this overhead occurred within the interval
    pub count: u64,
}

/// Association between a backend correlation id and a host-supplied id
///
/// Emitted by the backend right before the runtime record it refers to, once
/// per non-empty correlation stack.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExternalCorrelationRecord {
    /// Stack the host id was pushed onto
    pub flow: CorrelationFlow,

    /// Backend correlation id
    pub correlation_id: u64,

    /// Host-supplied id at the top of the stack when the call was made
    pub external_id: u64,
}

// ============================================================================
// Record Union
// ============================================================================

/// One entry of a backend activity buffer
///
/// The set of kinds is closed; consumers dispatch with an exhaustive `match`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum RawRecord {
    Runtime(RuntimeRecord),
    Kernel(KernelRecord),
    MemCopy(MemCopyRecord),
    MemFill(MemFillRecord),
    Overhead(OverheadRecord),
    ExternalCorrelation(ExternalCorrelationRecord),
}

impl RawRecord {
    /// Timed interval `(start_ns, end_ns)` of this record, if it has one
    pub fn interval(&self) -> Option<(u64, u64)> {
        match self {
            RawRecord::Runtime(r) => Some((r.start_ns, r.end_ns)),
            RawRecord::Kernel(r) => Some((r.start_ns, r.end_ns)),
            RawRecord::MemCopy(r) => Some((r.start_ns, r.end_ns)),
            RawRecord::MemFill(r) => Some((r.start_ns, r.end_ns)),
            RawRecord::Overhead(r) => Some((r.start_ns, r.end_ns)),
            RawRecord::ExternalCorrelation(_) => None,
        }
    }

    /// Backend correlation id, if the record carries one
    pub fn correlation_id(&self) -> Option<u64> {
        match self {
            RawRecord::Runtime(r) => Some(r.correlation_id),
            RawRecord::Kernel(r) => Some(r.correlation_id),
            RawRecord::MemCopy(r) => Some(r.correlation_id),
            RawRecord::MemFill(r) => Some(r.correlation_id),
            RawRecord::ExternalCorrelation(r) => Some(r.correlation_id),
            RawRecord::Overhead(_) => None,
        }
    }

    /// Short kind name for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            RawRecord::Runtime(_) => "runtime",
            RawRecord::Kernel(_) => "kernel",
            RawRecord::MemCopy(_) => "mem_copy",
            RawRecord::MemFill(_) => "mem_fill",
            RawRecord::Overhead(_) => "overhead",
            RawRecord::ExternalCorrelation(_) => "external_correlation",
        }
    }
}

// ============================================================================
// Device Enumeration
// ============================================================================

/// Driver stack a platform is exposed through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PlatformKind {
    /// Level Zero, the platform activity records are reported against
    LevelZero,
    OpenCl,
    Other,
}

/// A device as listed by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceDescriptor {
    pub name: String,

    /// Whether this is a GPU-class device
    pub is_gpu: bool,

    /// Device UUID, `None` when the device lacks the UUID capability
    #[cfg_attr(feature = "serde", serde(default))]
    pub uuid: Option<RawDeviceUuid>,
}

/// A platform and the devices it exposes, in backend order
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Platform {
    pub kind: PlatformKind,
    pub devices: Vec<DeviceDescriptor>,
}
