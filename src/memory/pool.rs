//! Output buffer pool of preallocated GPU surfaces.
//!
//! The pool follows the usual configure → activate → acquire → deactivate
//! lifecycle:
//!
//! - [`BufferPool::set_config`] stores a [`PoolConfig`] while inactive
//! - [`BufferPool::set_active`]`(true)` preallocates `min_buffers` surfaces
//! - [`BufferPool::acquire_buffer`] hands out a [`Buffer`]; the surface comes
//!   back when the last clone of that buffer is dropped
//! - [`BufferPool::set_active`]`(false)` frees idle surfaces; surfaces still
//!   downstream are freed as they come back
//!
//! # Example
//!
//! ```rust
//! use parallax_vision::format::{Caps, CapsStructure, Framerate, PixelFormat};
//! use parallax_vision::memory::{
//!     BufferPool, HostSurfaceAllocator, PoolConfig, SurfacePool, SURFACE_DESCRIPTOR_SIZE,
//! };
//! use std::sync::Arc;
//!
//! let caps = Caps::new(CapsStructure::video_raw_fixed(
//!     640, 480, PixelFormat::Rgba, Framerate::FPS_30,
//! ));
//! let pool = SurfacePool::new(Arc::new(HostSurfaceAllocator::new()));
//! pool.set_config(PoolConfig::new(caps, SURFACE_DESCRIPTOR_SIZE, 2, 2)).unwrap();
//! pool.set_active(true).unwrap();
//!
//! let buffer = pool.acquire_buffer().unwrap();
//! assert_eq!(pool.stats().in_use, 1);
//! drop(buffer);
//! assert_eq!(pool.stats().in_use, 0);
//! ```

use super::{AllocParams, MemoryKind, SurfaceAllocator, SurfaceDescriptor};
use crate::buffer::{Buffer, MemoryOrigin, SurfaceMemory};
use crate::error::{Error, Result};
use crate::format::{Caps, VideoInfo};
use crate::metadata::Metadata;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Buffers preallocated by the transform element's output pool.
pub const DEFAULT_POOL_SIZE: u32 = 4;

/// Pool configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Caps of the frames the surfaces hold.
    pub caps: Caps,
    /// Payload size of each buffer in bytes.
    pub size: usize,
    /// Buffers allocated on activation.
    pub min_buffers: u32,
    /// Upper bound of buffers alive at once.
    pub max_buffers: u32,
    /// Allocation strategy.
    pub memory_kind: MemoryKind,
    /// Target device.
    pub gpu_id: u32,
    /// Surfaces per descriptor.
    pub batch_size: u32,
}

impl PoolConfig {
    /// Configuration with default memory kind, device 0 and batch size 1.
    pub fn new(caps: Caps, size: usize, min_buffers: u32, max_buffers: u32) -> Self {
        Self {
            caps,
            size,
            min_buffers,
            max_buffers,
            memory_kind: MemoryKind::Default,
            gpu_id: 0,
            batch_size: 1,
        }
    }

    /// Set the allocation strategy.
    pub fn with_memory_kind(mut self, memory_kind: MemoryKind) -> Self {
        self.memory_kind = memory_kind;
        self
    }

    /// Set the target device.
    pub fn with_gpu_id(mut self, gpu_id: u32) -> Self {
        self.gpu_id = gpu_id;
        self
    }

    /// Set the number of surfaces per descriptor.
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Reject configurations no pool can satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::Negotiation("pool buffer size must be > 0".into()));
        }
        if self.max_buffers == 0 {
            return Err(Error::Negotiation("pool max_buffers must be > 0".into()));
        }
        if self.min_buffers > self.max_buffers {
            return Err(Error::Negotiation(format!(
                "pool min_buffers {} exceeds max_buffers {}",
                self.min_buffers, self.max_buffers
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::Negotiation("pool batch_size must be > 0".into()));
        }
        Ok(())
    }
}

/// Statistics about pool usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Maximum buffers alive at once.
    pub capacity: usize,
    /// Surfaces currently allocated (idle + in use).
    pub allocated: usize,
    /// Buffers ready to hand out without allocating.
    pub available: usize,
    /// Buffers handed out and not yet returned.
    pub in_use: usize,
    /// Successful acquisitions.
    pub acquisitions: u64,
    /// Acquisitions that failed because the pool was exhausted.
    pub exhausted: u64,
}

/// A pool of reusable output buffers.
pub trait BufferPool: Send + Sync {
    /// Store a configuration. Only allowed while inactive.
    fn set_config(&self, config: PoolConfig) -> Result<()>;

    /// Current configuration, if any.
    fn config(&self) -> Option<PoolConfig>;

    /// Activate (preallocate) or deactivate (free idle buffers).
    fn set_active(&self, active: bool) -> Result<()>;

    /// Whether the pool is active.
    fn is_active(&self) -> bool;

    /// Acquire a buffer without blocking.
    ///
    /// Fails with [`Error::PoolExhausted`] when every buffer is in use and
    /// with [`Error::Flushing`] when the pool is inactive.
    fn acquire_buffer(&self) -> Result<Buffer>;

    /// Acquire a buffer, waiting up to `timeout` for one to come back.
    fn acquire_buffer_timeout(&self, timeout: Duration) -> Result<Buffer>;

    /// Get pool statistics.
    fn stats(&self) -> PoolStats;
}

/// Creates configured pools.
pub trait PoolFactory: Send + Sync {
    /// Create a pool and apply `config` to it.
    fn create(&self, config: PoolConfig) -> Result<Arc<dyn BufferPool>>;
}

// ============================================================================
// SurfacePool
// ============================================================================

/// Pool of surface-descriptor buffers backed by a [`SurfaceAllocator`].
pub struct SurfacePool {
    shared: Arc<PoolShared>,
}

struct PoolShared {
    allocator: Arc<dyn SurfaceAllocator>,
    state: Mutex<PoolState>,
    returned: Condvar,
    acquisitions: AtomicU64,
    exhausted: AtomicU64,
}

#[derive(Default)]
struct PoolState {
    config: Option<PoolConfig>,
    alloc: Option<AllocParams>,
    active: bool,
    free: Vec<SurfaceDescriptor>,
    /// Surfaces alive, idle or in use.
    allocated: usize,
}

impl PoolState {
    fn in_use(&self) -> usize {
        self.allocated - self.free.len()
    }
}

impl SurfacePool {
    /// Create an unconfigured, inactive pool.
    pub fn new(allocator: Arc<dyn SurfaceAllocator>) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                allocator,
                state: Mutex::new(PoolState::default()),
                returned: Condvar::new(),
                acquisitions: AtomicU64::new(0),
                exhausted: AtomicU64::new(0),
            }),
        }
    }
}

impl PoolShared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take an idle surface or allocate a new one within capacity.
    fn try_take(self: &Arc<Self>, state: &mut PoolState) -> Result<Option<Buffer>> {
        if !state.active {
            return Err(Error::Flushing);
        }
        let (Some(config), Some(params)) = (&state.config, state.alloc) else {
            return Err(Error::Flushing);
        };
        let (max_buffers, size) = (config.max_buffers as usize, config.size);

        let surface = match state.free.pop() {
            Some(surface) => surface,
            None if state.allocated < max_buffers => {
                let surface = self.allocator.allocate(&params)?;
                state.allocated += 1;
                surface
            }
            None => return Ok(None),
        };

        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        let origin: Arc<dyn MemoryOrigin> = self.clone();
        let memory = SurfaceMemory::pooled(surface, size, origin);
        Ok(Some(Buffer::new(memory, Metadata::new())))
    }

    fn free_idle(&self, state: &mut PoolState) {
        for surface in state.free.drain(..) {
            self.allocator.free(surface);
            state.allocated -= 1;
        }
    }
}

impl MemoryOrigin for PoolShared {
    fn reclaim(&self, mut surface: SurfaceDescriptor) {
        let mut state = self.lock();
        if state.active {
            surface.num_filled = 0;
            state.free.push(surface);
        } else {
            self.allocator.free(surface);
            state.allocated -= 1;
        }
        drop(state);
        self.returned.notify_one();
    }
}

impl BufferPool for SurfacePool {
    fn set_config(&self, config: PoolConfig) -> Result<()> {
        config.validate()?;
        let mut state = self.shared.lock();
        if state.active {
            return Err(Error::InvalidState(
                "cannot configure an active pool".into(),
            ));
        }
        state.config = Some(config);
        Ok(())
    }

    fn config(&self) -> Option<PoolConfig> {
        self.shared.lock().config.clone()
    }

    fn set_active(&self, active: bool) -> Result<()> {
        let mut state = self.shared.lock();
        if state.active == active {
            return Ok(());
        }

        if !active {
            state.active = false;
            self.shared.free_idle(&mut state);
            drop(state);
            self.shared.returned.notify_all();
            tracing::debug!("surface pool deactivated");
            return Ok(());
        }

        let config = state
            .config
            .clone()
            .ok_or_else(|| Error::Negotiation("pool has no configuration".into()))?;
        let info = VideoInfo::from_caps(&config.caps)?;
        let params = AllocParams {
            info,
            batch_size: config.batch_size,
            gpu_id: config.gpu_id,
            memory_kind: config.memory_kind,
        };

        for _ in 0..config.min_buffers {
            match self.shared.allocator.allocate(&params) {
                Ok(surface) => {
                    state.free.push(surface);
                    state.allocated += 1;
                }
                Err(e) => {
                    self.shared.free_idle(&mut state);
                    return Err(Error::Negotiation(format!(
                        "failed to preallocate pool buffers: {e}"
                    )));
                }
            }
        }

        state.alloc = Some(params);
        state.active = true;
        tracing::debug!(
            buffers = config.min_buffers,
            max = config.max_buffers,
            size = config.size,
            "surface pool activated"
        );
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.shared.lock().active
    }

    fn acquire_buffer(&self) -> Result<Buffer> {
        let mut state = self.shared.lock();
        match self.shared.try_take(&mut state)? {
            Some(buffer) => Ok(buffer),
            None => {
                self.shared.exhausted.fetch_add(1, Ordering::Relaxed);
                Err(Error::PoolExhausted)
            }
        }
    }

    fn acquire_buffer_timeout(&self, timeout: Duration) -> Result<Buffer> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        loop {
            if let Some(buffer) = self.shared.try_take(&mut state)? {
                return Ok(buffer);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.shared.exhausted.fetch_add(1, Ordering::Relaxed);
                return Err(Error::PoolExhausted);
            }
            state = self
                .shared
                .returned
                .wait_timeout(state, remaining)
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .0;
        }
    }

    fn stats(&self) -> PoolStats {
        let state = self.shared.lock();
        PoolStats {
            capacity: state.config.as_ref().map_or(0, |c| c.max_buffers as usize),
            allocated: state.allocated,
            available: state.free.len(),
            in_use: state.in_use(),
            acquisitions: self.shared.acquisitions.load(Ordering::Relaxed),
            exhausted: self.shared.exhausted.load(Ordering::Relaxed),
        }
    }
}

impl Drop for SurfacePool {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.active = false;
        self.shared.free_idle(&mut state);
        drop(state);
        self.shared.returned.notify_all();
    }
}

/// Factory producing [`SurfacePool`]s over one allocator.
#[derive(Clone)]
pub struct SurfacePoolFactory {
    allocator: Arc<dyn SurfaceAllocator>,
}

impl SurfacePoolFactory {
    /// Create a factory.
    pub fn new(allocator: Arc<dyn SurfaceAllocator>) -> Self {
        Self { allocator }
    }
}

impl PoolFactory for SurfacePoolFactory {
    fn create(&self, config: PoolConfig) -> Result<Arc<dyn BufferPool>> {
        let pool = SurfacePool::new(Arc::clone(&self.allocator));
        pool.set_config(config)?;
        Ok(Arc::new(pool))
    }
}
