//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers prevent common bugs like passing a raw queue handle
//! where a queue index is expected, or a host id where a backend correlation
//! id is expected.

use std::fmt;
use std::str::FromStr;

use gpuscope_common::{RawDeviceUuid, DEVICE_UUID_LEN};

/// Backend-issued correlation id
///
/// Links a runtime call to the device work it caused. Only unique within one
/// capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(pub u64);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "corr:{}", self.0)
    }
}

/// Host-supplied correlation id
///
/// Used for both flows: the host framework's operator ids (external) and
/// user annotation ids (user).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExternalId(pub u64);

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ext:{}", self.0)
    }
}

/// Small, stable, process-wide logical device index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DeviceIndex(pub u8);

impl fmt::Display for DeviceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "XPU:{}", self.0)
    }
}

/// Per-session ordinal assigned to a raw backend queue handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueIndex(pub u32);

impl fmt::Display for QueueIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Queue#{}", self.0)
    }
}

/// Process ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

/// Thread ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tid(pub u32);

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TID:{}", self.0)
    }
}

/// 16-byte device UUID
///
/// The all-zero UUID is the placeholder for devices that cannot report one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceUuid(pub RawDeviceUuid);

impl DeviceUuid {
    /// Placeholder for devices lacking the UUID capability
    pub const UNKNOWN: DeviceUuid = DeviceUuid([0; DEVICE_UUID_LEN]);

    pub fn is_unknown(self) -> bool {
        self == Self::UNKNOWN
    }
}

impl From<RawDeviceUuid> for DeviceUuid {
    fn from(raw: RawDeviceUuid) -> Self {
        DeviceUuid(raw)
    }
}

impl fmt::Display for DeviceUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                write!(f, "-")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for DeviceUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceUuid({self})")
    }
}

/// Timestamp in nanoseconds
///
/// Represents an absolute point in time as nanoseconds since the Unix epoch,
/// the clock the backend reports activity timestamps in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Convert to seconds (f64)
    #[allow(clippy::cast_precision_loss)]
    pub fn as_seconds(self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }

    /// Convert to microseconds (f64), the Chrome trace time unit
    #[allow(clippy::cast_precision_loss)]
    pub fn as_micros(self) -> f64 {
        self.0 as f64 / 1_000.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// Activity kinds a session can request
///
/// `ExternalCorrelation` never produces an activity of its own; requesting it
/// enables the backend records that feed the correlation map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActivityKind {
    Runtime,
    Kernel,
    MemCopy,
    MemFill,
    Overhead,
    ExternalCorrelation,
}

impl ActivityKind {
    /// Every kind, in declaration order
    pub const ALL: [ActivityKind; 6] = [
        ActivityKind::Runtime,
        ActivityKind::Kernel,
        ActivityKind::MemCopy,
        ActivityKind::MemFill,
        ActivityKind::Overhead,
        ActivityKind::ExternalCorrelation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::Runtime => "xpu_runtime",
            ActivityKind::Kernel => "kernel",
            ActivityKind::MemCopy => "gpu_memcpy",
            ActivityKind::MemFill => "gpu_memset",
            ActivityKind::Overhead => "overhead",
            ActivityKind::ExternalCorrelation => "external_correlation",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        ActivityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .or(match normalized.as_str() {
                "runtime" => Some(ActivityKind::Runtime),
                "memcpy" | "mem_copy" => Some(ActivityKind::MemCopy),
                "memset" | "mem_fill" => Some(ActivityKind::MemFill),
                _ => None,
            })
            .ok_or_else(|| format!("unknown activity kind: {s}"))
    }
}
