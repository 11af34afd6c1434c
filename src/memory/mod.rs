//! GPU surface memory for pipeline buffers.
//!
//! # Architecture
//!
//! - [`MemoryKind`]: allocation strategy forwarded to the surface allocator
//! - [`SurfaceDescriptor`]: the payload of a GPU buffer, one entry per frame
//! - [`SurfaceAllocator`]: allocates and frees the device memory behind descriptors
//! - [`SurfacePool`]: fixed-capacity pool of descriptors handed out as [`Buffer`]s
//!
//! [`Buffer`]: crate::buffer::Buffer

mod kind;
mod pool;
mod surface;

pub use kind::MemoryKind;
pub use pool::{
    BufferPool, DEFAULT_POOL_SIZE, PoolConfig, PoolFactory, PoolStats, SurfacePool,
    SurfacePoolFactory,
};
pub use surface::{
    AllocParams, HostSurfaceAllocator, SURFACE_DESCRIPTOR_SIZE, SurfaceAllocator,
    SurfaceDescriptor, SurfaceLayout, SurfaceParams,
};
