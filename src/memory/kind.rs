//! GPU memory allocation strategies.

use crate::device::DeviceContext;

/// How surface memory is allocated on the device.
///
/// Discriminants match the surface allocator's memory type codes, which the
/// pool forwards to the allocator as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum MemoryKind {
    /// Platform default: surface arrays on integrated GPUs, device memory otherwise.
    #[default]
    Default = 0,
    /// Page-locked host memory.
    CudaPinned = 1,
    /// Device-local memory.
    CudaDevice = 2,
    /// Unified (managed) memory addressable from host and device.
    CudaUnified = 3,
    /// Surface array memory (integrated GPUs).
    SurfaceArray = 4,
    /// Opaque allocator handle.
    Handle = 5,
    /// Plain host memory.
    System = 6,
}

impl MemoryKind {
    /// Pick the allocation strategy for a device.
    ///
    /// Integrated GPUs use the platform default; discrete GPUs use unified
    /// memory so surfaces stay reachable from host code.
    pub fn detect(device: &dyn DeviceContext, gpu_id: u32) -> Self {
        if device.is_integrated(gpu_id) {
            Self::Default
        } else {
            Self::CudaUnified
        }
    }

    /// Allocator memory type code.
    #[inline]
    pub fn code(self) -> u32 {
        self as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HostDevice;

    #[test]
    fn test_detect_integrated() {
        let dev = HostDevice::new().integrated(true);
        assert_eq!(MemoryKind::detect(&dev, 0), MemoryKind::Default);
    }

    #[test]
    fn test_detect_discrete() {
        let dev = HostDevice::new().integrated(false);
        assert_eq!(MemoryKind::detect(&dev, 0), MemoryKind::CudaUnified);
        assert_eq!(MemoryKind::CudaUnified.code(), 3);
    }
}
