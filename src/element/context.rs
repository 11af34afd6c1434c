//! Configuration and per-instance state of the transform element.

use crate::device::DeviceContext;
use crate::error::{Error, Result};
use crate::format::VideoInfo;
use crate::memory::{BufferPool, DEFAULT_POOL_SIZE, MemoryKind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

static NEXT_UNIQUE_ID: AtomicU32 = AtomicU32::new(1);

/// Construction-time configuration of a transform element.
///
/// ```rust
/// use parallax_vision::element::TransformConfig;
/// use std::time::Duration;
///
/// let config = TransformConfig::default()
///     .with_gpu_id(0)
///     .with_batch_size(4)
///     .with_acquire_timeout(Duration::from_millis(20));
/// assert_eq!(config.pool_size, 4);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TransformConfig {
    /// Instance id; allocated from a process-wide counter when `None`.
    pub unique_id: Option<u32>,
    /// Device the element runs on.
    pub gpu_id: u32,
    /// Frames processed together per invocation. Must be nonzero by the
    /// time caps are set.
    pub batch_size: u32,
    /// Batched buffers in flight.
    pub num_batch_buffers: u32,
    /// Buffers in the output pool.
    pub pool_size: u32,
    /// How long to wait for an output buffer. `None` fails immediately.
    pub acquire_timeout: Option<Duration>,
    /// Output memory kind. Detected from the device when `None`.
    pub memory_kind: Option<MemoryKind>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            unique_id: None,
            gpu_id: 0,
            batch_size: 1,
            num_batch_buffers: 1,
            pool_size: DEFAULT_POOL_SIZE,
            acquire_timeout: None,
            memory_kind: None,
        }
    }
}

impl TransformConfig {
    /// Set an explicit instance id.
    pub fn with_unique_id(mut self, unique_id: u32) -> Self {
        self.unique_id = Some(unique_id);
        self
    }

    /// Set the device.
    pub fn with_gpu_id(mut self, gpu_id: u32) -> Self {
        self.gpu_id = gpu_id;
        self
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the number of batched buffers.
    pub fn with_num_batch_buffers(mut self, num_batch_buffers: u32) -> Self {
        self.num_batch_buffers = num_batch_buffers;
        self
    }

    /// Set the output pool size.
    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Wait up to `timeout` for an output buffer.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Force the output memory kind.
    pub fn with_memory_kind(mut self, memory_kind: MemoryKind) -> Self {
        self.memory_kind = Some(memory_kind);
        self
    }

    /// Check the configuration against the available devices.
    pub fn validate(&self, device: &dyn DeviceContext) -> Result<()> {
        if self.pool_size == 0 {
            return Err(Error::InvalidConfig("pool_size must be > 0".into()));
        }
        let count = device.device_count();
        if self.gpu_id >= count {
            return Err(Error::InvalidConfig(format!(
                "gpu_id {} out of range ({count} devices)",
                self.gpu_id
            )));
        }
        Ok(())
    }
}

/// Lifecycle state of a transform element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransformState {
    /// Not started, or stopped.
    #[default]
    Stopped,
    /// Started, waiting for caps.
    Negotiating,
    /// Caps set and output pool active.
    Running,
}

/// Mutable per-instance state, private to the element.
#[derive(Default)]
pub(crate) struct TransformContext {
    pub(crate) unique_id: u32,
    pub(crate) frame_num: u64,
    pub(crate) gpu_id: u32,
    pub(crate) batch_size: u32,
    pub(crate) num_batch_buffers: u32,
    pub(crate) pool_size: u32,
    pub(crate) acquire_timeout: Option<Duration>,
    pub(crate) input_info: Option<VideoInfo>,
    pub(crate) output_info: Option<VideoInfo>,
    pub(crate) memory_kind: MemoryKind,
    pub(crate) pool: Option<Arc<dyn BufferPool>>,
    pub(crate) state: TransformState,
}

impl TransformContext {
    /// Build the context from a validated config.
    pub(crate) fn new(config: &TransformConfig, device: &dyn DeviceContext) -> Self {
        let unique_id = config
            .unique_id
            .unwrap_or_else(|| NEXT_UNIQUE_ID.fetch_add(1, Ordering::Relaxed));
        let memory_kind = config
            .memory_kind
            .unwrap_or_else(|| MemoryKind::detect(device, config.gpu_id));

        Self {
            unique_id,
            gpu_id: config.gpu_id,
            batch_size: config.batch_size,
            num_batch_buffers: config.num_batch_buffers,
            pool_size: config.pool_size,
            acquire_timeout: config.acquire_timeout,
            memory_kind,
            ..Self::default()
        }
    }
}

impl std::fmt::Debug for TransformContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformContext")
            .field("unique_id", &self.unique_id)
            .field("frame_num", &self.frame_num)
            .field("gpu_id", &self.gpu_id)
            .field("batch_size", &self.batch_size)
            .field("memory_kind", &self.memory_kind)
            .field("has_pool", &self.pool.is_some())
            .field("state", &self.state)
            .finish()
    }
}
