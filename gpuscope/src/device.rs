//! Device index resolution
//!
//! Activity records name their device by a 16-byte UUID. Traces want a small
//! index instead, stable for the whole process. The table is built once from
//! the backend's platform list and handed out as an immutable snapshot, so
//! sessions resolve indices without taking a lock.

use gpuscope_common::{Platform, PlatformKind};
use log::{info, warn};
use std::sync::{Arc, Mutex, PoisonError};

use crate::backend::ActivityBackend;
use crate::domain::{DeviceIndex, DeviceUuid};

/// Platform whose GPU devices are indexed
const PREFERRED_PLATFORM: PlatformKind = PlatformKind::LevelZero;

/// Process-scoped UUID → index table
#[derive(Debug, Default)]
pub struct DeviceTable {
    uuids: Mutex<Option<Arc<[DeviceUuid]>>>,
}

impl DeviceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate the table from the backend, once per process
    ///
    /// Later calls return the existing snapshot without querying the backend.
    /// The mutex makes concurrent first calls from different sessions safe.
    pub fn ensure_enumerated(&self, backend: &dyn ActivityBackend) -> DeviceSnapshot {
        let mut guard = self.uuids.lock().unwrap_or_else(PoisonError::into_inner);
        let uuids = guard.get_or_insert_with(|| {
            let uuids: Arc<[DeviceUuid]> = enumerate_devices(&backend.platforms()).into();
            info!("Enumerated {} XPU device(s)", uuids.len());
            uuids
        });
        DeviceSnapshot { uuids: Arc::clone(uuids) }
    }

    /// Current snapshot, empty if enumeration has not run yet
    pub fn snapshot(&self) -> DeviceSnapshot {
        let guard = self.uuids.lock().unwrap_or_else(PoisonError::into_inner);
        DeviceSnapshot { uuids: guard.clone().unwrap_or_else(|| Vec::new().into()) }
    }

    /// Forget the table so the next `ensure_enumerated` queries the backend again
    pub fn reset(&self) {
        *self.uuids.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Collect the UUIDs of GPU devices on the preferred platform, in backend order
fn enumerate_devices(platforms: &[Platform]) -> Vec<DeviceUuid> {
    platforms
        .iter()
        .filter(|platform| platform.kind == PREFERRED_PLATFORM)
        .flat_map(|platform| platform.devices.iter())
        .filter(|device| device.is_gpu)
        .map(|device| match device.uuid {
            Some(uuid) => DeviceUuid(uuid),
            None => {
                warn!(
                    "UUID is not supported for XPU device \"{}\"; its records will use device index 0",
                    device.name
                );
                DeviceUuid::UNKNOWN
            }
        })
        .collect()
}

/// Immutable view of the device table
#[derive(Debug, Clone)]
pub struct DeviceSnapshot {
    uuids: Arc<[DeviceUuid]>,
}

impl DeviceSnapshot {
    /// Logical index of a device, `None` if the UUID was never enumerated
    pub fn lookup(&self, uuid: DeviceUuid) -> Option<DeviceIndex> {
        let position = self.uuids.iter().position(|known| *known == uuid)?;
        Some(DeviceIndex(u8::try_from(position).unwrap_or(u8::MAX)))
    }

    /// Logical index of a device, degrading to index 0 with a warning
    pub fn resolve_index(&self, uuid: DeviceUuid) -> DeviceIndex {
        self.lookup(uuid).unwrap_or_else(|| {
            warn!("Can't find a legal XPU device for UUID {uuid}; using device index 0");
            DeviceIndex(0)
        })
    }

    pub fn len(&self) -> usize {
        self.uuids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uuids.is_empty()
    }

    pub fn uuids(&self) -> &[DeviceUuid] {
        &self.uuids
    }
}
