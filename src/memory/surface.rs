//! Surface descriptors and the allocator that backs them.
//!
//! A pipeline buffer in GPU memory does not carry pixels. Its payload is a
//! [`SurfaceDescriptor`]: a small record listing one entry per batched
//! frame, each naming the device buffer that holds the pixels.

use super::MemoryKind;
use crate::error::{Error, Result};
use crate::format::{PixelFormat, VideoInfo};
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Byte size of a surface descriptor record.
///
/// This is the payload size of every buffer in the output pool.
pub const SURFACE_DESCRIPTOR_SIZE: usize = std::mem::size_of::<SurfaceDescriptor>();

/// Memory layout of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceLayout {
    /// Linear rows separated by `pitch` bytes.
    #[default]
    Pitch,
    /// Tiled layout used by hardware engines.
    BlockLinear,
}

/// One GPU-resident image within a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceParams {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Row pitch of the first plane in bytes.
    pub pitch: usize,
    /// Pixel format.
    pub color_format: PixelFormat,
    /// Memory layout.
    pub layout: SurfaceLayout,
    /// Bytes of device memory behind `buffer_desc`.
    pub data_size: usize,
    /// Opaque device buffer handle (dmabuf fd or allocator handle).
    pub buffer_desc: u64,
}

/// Describes a batch of GPU surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SurfaceDescriptor {
    /// Device the surfaces were allocated on.
    pub gpu_id: u32,
    /// Number of allocated entries.
    pub batch_size: u32,
    /// Number of entries holding valid frames.
    pub num_filled: u32,
    /// Allocation strategy.
    pub memory_kind: MemoryKind,
    /// Whether all entries share one contiguous allocation.
    pub is_contiguous: bool,
    /// Per-frame surfaces, in batch order.
    pub surface_list: SmallVec<[SurfaceParams; 1]>,
}

impl SurfaceDescriptor {
    /// First surface, if any.
    pub fn primary(&self) -> Option<&SurfaceParams> {
        self.surface_list.first()
    }

    /// Device handle of the first surface.
    pub fn buffer_handle(&self) -> Option<u64> {
        self.primary().map(|s| s.buffer_desc)
    }
}

/// Parameters for allocating one descriptor.
#[derive(Debug, Clone, Copy)]
pub struct AllocParams {
    /// Frame layout of every entry.
    pub info: VideoInfo,
    /// Entries to allocate.
    pub batch_size: u32,
    /// Target device.
    pub gpu_id: u32,
    /// Allocation strategy.
    pub memory_kind: MemoryKind,
}

/// Allocates and frees the device memory behind descriptors.
pub trait SurfaceAllocator: Send + Sync {
    /// Allocate a descriptor with `params.batch_size` entries.
    fn allocate(&self, params: &AllocParams) -> Result<SurfaceDescriptor>;

    /// Free the device memory of a descriptor.
    fn free(&self, surface: SurfaceDescriptor);
}

/// Allocator that hands out unique handles without touching a GPU.
///
/// Tracks live allocations so tests can check that every surface is freed.
#[derive(Debug)]
pub struct HostSurfaceAllocator {
    next_handle: AtomicU64,
    live: AtomicUsize,
    limit: Option<usize>,
}

impl HostSurfaceAllocator {
    /// Unlimited allocator.
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            live: AtomicUsize::new(0),
            limit: None,
        }
    }

    /// Allocator that fails once `limit` descriptors are live.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new()
        }
    }

    /// Start handing out handles at `base`, keeping them apart from other allocators.
    pub fn with_handle_base(self, base: u64) -> Self {
        self.next_handle.store(base.max(1), Ordering::Relaxed);
        self
    }

    /// Descriptors allocated and not yet freed.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

impl Default for HostSurfaceAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfaceAllocator for HostSurfaceAllocator {
    fn allocate(&self, params: &AllocParams) -> Result<SurfaceDescriptor> {
        if params.batch_size == 0 {
            return Err(Error::Negotiation("cannot allocate an empty batch".into()));
        }
        let reserved = self.live.fetch_add(1, Ordering::AcqRel);
        if self.limit.is_some_and(|limit| reserved >= limit) {
            self.live.fetch_sub(1, Ordering::AcqRel);
            return Err(Error::Negotiation(format!(
                "surface allocation failed: {reserved} descriptors already live"
            )));
        }

        let info = &params.info;
        let surface_list = (0..params.batch_size)
            .map(|_| SurfaceParams {
                width: info.width,
                height: info.height,
                pitch: info.stride[0],
                color_format: info.format,
                layout: SurfaceLayout::Pitch,
                data_size: info.size,
                buffer_desc: self.next_handle.fetch_add(1, Ordering::Relaxed),
            })
            .collect();

        Ok(SurfaceDescriptor {
            gpu_id: params.gpu_id,
            batch_size: params.batch_size,
            num_filled: 0,
            memory_kind: params.memory_kind,
            is_contiguous: false,
            surface_list,
        })
    }

    fn free(&self, surface: SurfaceDescriptor) {
        tracing::trace!(handle = ?surface.buffer_handle(), "freeing host surface");
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(batch_size: u32) -> AllocParams {
        AllocParams {
            info: VideoInfo::new(PixelFormat::Rgba, 64, 32).unwrap(),
            batch_size,
            gpu_id: 0,
            memory_kind: MemoryKind::CudaUnified,
        }
    }

    #[test]
    fn test_allocate_batch() {
        let alloc = HostSurfaceAllocator::new();
        let surface = alloc.allocate(&params(3)).unwrap();
        assert_eq!(surface.surface_list.len(), 3);
        assert_eq!(surface.num_filled, 0);
        assert_eq!(surface.primary().unwrap().data_size, 64 * 32 * 4);
        assert_eq!(surface.primary().unwrap().pitch, 256);

        let handles: Vec<u64> = surface.surface_list.iter().map(|s| s.buffer_desc).collect();
        assert_eq!(handles.len(), 3);
        assert!(handles.windows(2).all(|w| w[0] != w[1]));
        assert_eq!(alloc.live(), 1);

        alloc.free(surface);
        assert_eq!(alloc.live(), 0);
    }

    #[test]
    fn test_limit() {
        let alloc = HostSurfaceAllocator::with_limit(1);
        let first = alloc.allocate(&params(1)).unwrap();
        assert!(alloc.allocate(&params(1)).is_err());
        assert_eq!(alloc.live(), 1);
        alloc.free(first);
        assert!(alloc.allocate(&params(1)).is_ok());
    }

    #[test]
    fn test_handle_base() {
        let alloc = HostSurfaceAllocator::new().with_handle_base(1000);
        let surface = alloc.allocate(&params(1)).unwrap();
        assert_eq!(surface.buffer_handle(), Some(1000));
    }

    #[test]
    fn test_descriptor_size_is_record_size() {
        assert_eq!(SURFACE_DESCRIPTOR_SIZE, std::mem::size_of::<SurfaceDescriptor>());
        assert!(SURFACE_DESCRIPTOR_SIZE < VideoInfo::new(PixelFormat::I420, 16, 16).unwrap().size);
    }
}
