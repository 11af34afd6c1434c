//! GPU device selection.
//!
//! The transform element re-selects its device at the start of every frame,
//! since another user in the same process may have switched the calling
//! thread to a different device in between.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

/// Access to the GPU runtime's device management.
pub trait DeviceContext: Send + Sync {
    /// Make `gpu_id` the current device of the calling thread.
    fn set_device(&self, gpu_id: u32) -> Result<()>;

    /// Number of devices visible to the process.
    fn device_count(&self) -> u32;

    /// Whether `gpu_id` shares physical memory with the host (e.g. Jetson).
    fn is_integrated(&self, gpu_id: u32) -> bool;
}

/// Device context for hosts without a GPU runtime.
///
/// Presents a configurable number of devices. A device can be marked
/// unavailable to exercise selection failures.
#[derive(Debug)]
pub struct HostDevice {
    count: u32,
    integrated: bool,
    unavailable: Mutex<Vec<u32>>,
    current: AtomicU32,
    selections: AtomicU64,
}

impl HostDevice {
    /// A single device, integrated when running on an aarch64 host.
    pub fn new() -> Self {
        Self::with_devices(1)
    }

    /// `count` devices.
    pub fn with_devices(count: u32) -> Self {
        Self {
            count,
            integrated: std::env::consts::ARCH == "aarch64",
            unavailable: Mutex::new(Vec::new()),
            current: AtomicU32::new(0),
            selections: AtomicU64::new(0),
        }
    }

    /// Override integrated-memory detection.
    pub fn integrated(mut self, integrated: bool) -> Self {
        self.integrated = integrated;
        self
    }

    /// Mark a device as (un)available for selection.
    pub fn set_available(&self, gpu_id: u32, available: bool) {
        let mut unavailable = self
            .unavailable
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        unavailable.retain(|&id| id != gpu_id);
        if !available {
            unavailable.push(gpu_id);
        }
    }

    /// Device most recently selected.
    pub fn current_device(&self) -> u32 {
        self.current.load(Ordering::Relaxed)
    }

    /// Number of successful `set_device` calls.
    pub fn selections(&self) -> u64 {
        self.selections.load(Ordering::Relaxed)
    }
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceContext for HostDevice {
    fn set_device(&self, gpu_id: u32) -> Result<()> {
        if gpu_id >= self.count {
            return Err(Error::Device {
                gpu_id,
                reason: format!("invalid device ordinal ({} devices)", self.count),
            });
        }
        let unavailable = self
            .unavailable
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if unavailable.contains(&gpu_id) {
            return Err(Error::Device {
                gpu_id,
                reason: "device unavailable".into(),
            });
        }
        self.current.store(gpu_id, Ordering::Relaxed);
        self.selections.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn device_count(&self) -> u32 {
        self.count
    }

    fn is_integrated(&self, _gpu_id: u32) -> bool {
        self.integrated
    }
}
