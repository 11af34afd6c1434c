//! Pipeline buffers holding GPU surface descriptors.
//!
//! A [`Buffer`] is a cheap, clonable reference to [`SurfaceMemory`] plus its
//! own [`Metadata`]. The payload is only reachable through [`Buffer::map`],
//! which returns a [`BufferMap`] guard; dropping the guard unmaps.
//!
//! Buffers acquired from a pool return their surface to the pool when the
//! last clone is dropped.

use crate::error::{Error, Result};
use crate::memory::{SurfaceDescriptor, SURFACE_DESCRIPTOR_SIZE};
use crate::metadata::Metadata;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

/// Requested access for [`Buffer::map`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapAccess {
    /// Read the descriptor.
    Read,
    /// Read and modify the descriptor.
    ReadWrite,
}

/// Receives surfaces back when their memory is dropped.
pub(crate) trait MemoryOrigin: Send + Sync {
    fn reclaim(&self, surface: SurfaceDescriptor);
}

/// Memory block holding one surface descriptor.
pub struct SurfaceMemory {
    surface: Mutex<SurfaceDescriptor>,
    size: usize,
    mappable: bool,
    origin: Option<Arc<dyn MemoryOrigin>>,
}

impl SurfaceMemory {
    /// Standalone memory owning `surface`.
    pub fn new(surface: SurfaceDescriptor) -> Self {
        Self {
            surface: Mutex::new(surface),
            size: SURFACE_DESCRIPTOR_SIZE,
            mappable: true,
            origin: None,
        }
    }

    /// Memory that refuses every map request.
    pub fn unmappable(surface: SurfaceDescriptor) -> Self {
        let mut memory = Self::new(surface);
        memory.mappable = false;
        memory
    }

    pub(crate) fn pooled(
        surface: SurfaceDescriptor,
        size: usize,
        origin: Arc<dyn MemoryOrigin>,
    ) -> Self {
        Self {
            surface: Mutex::new(surface),
            size,
            mappable: true,
            origin: Some(origin),
        }
    }
}

impl Drop for SurfaceMemory {
    fn drop(&mut self) {
        if let Some(origin) = self.origin.take() {
            let surface = match self.surface.get_mut() {
                Ok(surface) => std::mem::take(surface),
                Err(poisoned) => std::mem::take(poisoned.into_inner()),
            };
            origin.reclaim(surface);
        }
    }
}

impl std::fmt::Debug for SurfaceMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceMemory")
            .field("size", &self.size)
            .field("mappable", &self.mappable)
            .field("pooled", &self.origin.is_some())
            .finish()
    }
}

/// A buffer flowing through the pipeline.
#[derive(Clone)]
pub struct Buffer {
    memory: Arc<SurfaceMemory>,
    metadata: Metadata,
}

impl Buffer {
    /// Create a buffer over `memory`.
    pub fn new(memory: SurfaceMemory, metadata: Metadata) -> Self {
        Self {
            memory: Arc::new(memory),
            metadata,
        }
    }

    /// Standalone buffer holding `surface`.
    pub fn from_surface(surface: SurfaceDescriptor) -> Self {
        Self::new(SurfaceMemory::new(surface), Metadata::new())
    }

    /// Payload size in bytes (the descriptor record, not the pixels).
    pub fn size(&self) -> usize {
        self.memory.size
    }

    /// Get a reference to the buffer's metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Get a mutable reference to the buffer's metadata.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// True when no other buffer shares this memory.
    pub fn is_writable(&self) -> bool {
        Arc::strong_count(&self.memory) == 1
    }

    /// Whether this buffer came from a pool.
    pub fn is_pooled(&self) -> bool {
        self.memory.origin.is_some()
    }

    /// Map the descriptor for access.
    ///
    /// Fails if the memory is not mappable, already mapped, or if write
    /// access is requested on shared memory.
    pub fn map(&self, access: MapAccess) -> Result<BufferMap<'_>> {
        if !self.memory.mappable {
            return Err(Error::Mapping("memory is not mappable".into()));
        }
        if access == MapAccess::ReadWrite && !self.is_writable() {
            return Err(Error::Mapping(
                "write access requested on shared memory".into(),
            ));
        }
        let guard = match self.memory.surface.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                return Err(Error::Mapping("buffer is already mapped".into()));
            }
            Err(TryLockError::Poisoned(_)) => {
                return Err(Error::Mapping("buffer memory is poisoned".into()));
            }
        };
        tracing::trace!(?access, "mapped buffer");
        Ok(BufferMap { guard, access })
    }

    /// Copy timing, flags and extra fields from `src`.
    ///
    /// Requires the buffer to be writable.
    pub fn copy_metadata_from(&mut self, src: &Buffer) -> Result<()> {
        if !self.is_writable() {
            return Err(Error::InvalidState(
                "cannot copy metadata into a shared buffer".into(),
            ));
        }
        self.metadata.copy_from(&src.metadata);
        Ok(())
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("memory", &self.memory)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Scoped mapping of a buffer's descriptor. Unmaps on drop.
pub struct BufferMap<'a> {
    guard: MutexGuard<'a, SurfaceDescriptor>,
    access: MapAccess,
}

impl BufferMap<'_> {
    /// The mapped descriptor.
    pub fn surface(&self) -> &SurfaceDescriptor {
        &self.guard
    }

    /// Mutable access, only for `ReadWrite` mappings.
    pub fn surface_mut(&mut self) -> Result<&mut SurfaceDescriptor> {
        match self.access {
            MapAccess::ReadWrite => Ok(&mut self.guard),
            MapAccess::Read => Err(Error::Mapping("buffer is mapped read-only".into())),
        }
    }
}

impl Drop for BufferMap<'_> {
    fn drop(&mut self) {
        tracing::trace!(access = ?self.access, "unmapped buffer");
    }
}
