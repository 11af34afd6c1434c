//! The vision base transform element.
//!
//! [`VisionBaseTransform`] owns everything between the pipeline and a
//! [`VisionTransform`] implementation: caps negotiation, the output buffer
//! pool, device selection and zero-copy wrapping of each frame.
//!
//! # Lifecycle
//!
//! ```text
//! Stopped ──start──▶ Negotiating ──set_caps──▶ Running
//!    ▲                    │                       │
//!    └────────stop────────┴───────────stop────────┘
//! ```

use super::context::{TransformConfig, TransformContext, TransformState};
use super::hooks::VisionTransform;
use super::BaseTransform;
use crate::backend::{ColorSpec, HostBackend, SurfaceWrapper, VisionBackend};
use crate::buffer::{Buffer, MapAccess};
use crate::device::{DeviceContext, HostDevice};
use crate::error::{Error, Result};
use crate::format::{Caps, VideoInfo};
use crate::memory::{
    BufferPool, HostSurfaceAllocator, MemoryKind, PoolConfig, PoolFactory, SURFACE_DESCRIPTOR_SIZE,
    SurfacePoolFactory,
};
use crate::negotiation::{self, PadDirection};
use crate::observability::{self, TransformMetrics};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Base transform handing GPU frames to a [`VisionTransform`].
///
/// # Example
///
/// ```rust
/// use parallax_vision::prelude::*;
///
/// let mut element =
///     VisionBaseTransform::with_host_runtime(PassThrough, TransformConfig::default()).unwrap();
/// let caps = Caps::new(
///     CapsStructure::video_raw_fixed(1280, 720, PixelFormat::Nv12, Framerate::FPS_30)
///         .with_feature(MemoryFeature::Nvmm),
/// );
///
/// element.start().unwrap();
/// element.set_caps(&caps, &caps).unwrap();
///
/// let input = element.prepare_output_buffer(&Buffer::from_surface(Default::default())).unwrap();
/// let mut output = element.prepare_output_buffer(&input).unwrap();
/// element.transform(&input, &mut output).unwrap();
/// assert_eq!(element.frame_num(), 1);
///
/// element.stop().unwrap();
/// ```
pub struct VisionBaseTransform<T: VisionTransform> {
    ctx: TransformContext,
    hooks: T,
    device: Arc<dyn DeviceContext>,
    wrapper: SurfaceWrapper,
    pools: Arc<dyn PoolFactory>,
    metrics: TransformMetrics,
}

impl<T: VisionTransform> VisionBaseTransform<T> {
    /// Create an element over the given runtime collaborators.
    ///
    /// Fails with [`Error::InvalidConfig`] if `config` does not fit `device`.
    pub fn new(
        hooks: T,
        config: TransformConfig,
        device: Arc<dyn DeviceContext>,
        backend: Arc<dyn VisionBackend>,
        pools: Arc<dyn PoolFactory>,
    ) -> Result<Self> {
        config.validate(device.as_ref())?;
        observability::init_metrics();

        let ctx = TransformContext::new(&config, device.as_ref());
        let metrics = TransformMetrics::new(hooks.name(), ctx.unique_id);
        debug!(
            element = hooks.name(),
            unique_id = ctx.unique_id,
            gpu_id = ctx.gpu_id,
            memory_kind = ?ctx.memory_kind,
            "created vision transform"
        );

        Ok(Self {
            ctx,
            hooks,
            device,
            wrapper: SurfaceWrapper::new(backend),
            pools,
            metrics,
        })
    }

    /// Create an element over the host reference runtime.
    pub fn with_host_runtime(hooks: T, config: TransformConfig) -> Result<Self> {
        let allocator = Arc::new(HostSurfaceAllocator::new());
        Self::new(
            hooks,
            config,
            Arc::new(HostDevice::new()),
            Arc::new(HostBackend::new()),
            Arc::new(SurfacePoolFactory::new(allocator)),
        )
    }

    /// Instance id.
    pub fn unique_id(&self) -> u32 {
        self.ctx.unique_id
    }

    /// Frames transformed successfully.
    pub fn frame_num(&self) -> u64 {
        self.ctx.frame_num
    }

    /// Target device.
    pub fn gpu_id(&self) -> u32 {
        self.ctx.gpu_id
    }

    /// Frames per batch.
    pub fn batch_size(&self) -> u32 {
        self.ctx.batch_size
    }

    /// Change the batch size. Not allowed while running.
    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<()> {
        if self.ctx.state == TransformState::Running {
            return Err(Error::InvalidState(
                "cannot change batch size while running".into(),
            ));
        }
        self.ctx.batch_size = batch_size;
        Ok(())
    }

    /// Batched buffers in flight.
    pub fn num_batch_buffers(&self) -> u32 {
        self.ctx.num_batch_buffers
    }

    /// Memory kind of the output pool.
    pub fn memory_kind(&self) -> MemoryKind {
        self.ctx.memory_kind
    }

    /// Lifecycle state.
    pub fn state(&self) -> TransformState {
        self.ctx.state
    }

    /// Negotiated input layout.
    pub fn input_info(&self) -> Option<&VideoInfo> {
        self.ctx.input_info.as_ref()
    }

    /// Negotiated output layout.
    pub fn output_info(&self) -> Option<&VideoInfo> {
        self.ctx.output_info.as_ref()
    }

    /// The output pool, present from the first successful negotiation until stop.
    pub fn pool(&self) -> Option<&Arc<dyn BufferPool>> {
        self.ctx.pool.as_ref()
    }

    /// Payload size of output buffers, once the pool exists.
    pub fn output_size(&self) -> Option<usize> {
        self.ctx.pool.as_ref().and_then(|pool| pool.config()).map(|c| c.size)
    }

    /// The algorithm.
    pub fn hooks(&self) -> &T {
        &self.hooks
    }

    /// The algorithm, mutably.
    pub fn hooks_mut(&mut self) -> &mut T {
        &mut self.hooks
    }

    fn create_pool(&self, outcaps: &Caps) -> Result<Arc<dyn BufferPool>> {
        let ctx = &self.ctx;
        let config = PoolConfig::new(
            outcaps.clone(),
            SURFACE_DESCRIPTOR_SIZE,
            ctx.pool_size,
            ctx.pool_size,
        )
        .with_memory_kind(ctx.memory_kind)
        .with_gpu_id(ctx.gpu_id)
        .with_batch_size(ctx.batch_size);

        let pool = self.pools.create(config).map_err(|e| {
            warn!(error = %e, "failed to set output pool config");
            Error::Negotiation(format!("failed to configure output pool: {e}"))
        })?;

        if let Err(e) = pool.set_active(true) {
            warn!(error = %e, "failed to activate output pool");
            return Err(Error::Negotiation(format!(
                "failed to activate output pool: {e}"
            )));
        }

        info!(
            buffers = ctx.pool_size,
            size = SURFACE_DESCRIPTOR_SIZE,
            memory_kind = ?ctx.memory_kind,
            gpu_id = ctx.gpu_id,
            batch_size = ctx.batch_size,
            "allocated output buffer pool"
        );
        self.metrics.record_pool_available(pool.stats().available);
        Ok(pool)
    }

    /// Wrap both frames and run the algorithm.
    ///
    /// Every guard is released in reverse order on all paths.
    fn dispatch(&mut self, inbuf: &Buffer, outbuf: &Buffer) -> Result<()> {
        self.device.set_device(self.ctx.gpu_id)?;

        let in_map = inbuf.map(MapAccess::Read)?;
        let input = self.wrapper.wrap(&in_map, Some(ColorSpec::Default))?;
        if let Ok(format) = input.format() {
            debug!(?format, "input image format");
        }

        let mut out_map = outbuf.map(MapAccess::ReadWrite)?;
        out_map.surface_mut()?.num_filled = 1;
        let output = self.wrapper.wrap(&out_map, None)?;

        let result = self.hooks.transform(&input, &output);

        drop(output);
        drop(input);
        drop(out_map);
        drop(in_map);
        result
    }
}

impl<T: VisionTransform> BaseTransform for VisionBaseTransform<T> {
    fn start(&mut self) -> Result<()> {
        if self.ctx.state != TransformState::Stopped {
            return Err(Error::InvalidState("element already started".into()));
        }
        self.hooks.start()?;
        self.ctx.state = TransformState::Negotiating;
        debug!(element = self.hooks.name(), unique_id = self.ctx.unique_id, "started");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.ctx.state == TransformState::Stopped {
            return Ok(());
        }

        let released = self.hooks.release();
        if let Err(e) = &released {
            error!(error = %e, "release hook failed");
        }

        if let Some(pool) = self.ctx.pool.take() {
            if let Err(e) = pool.set_active(false) {
                warn!(error = %e, "failed to deactivate output pool");
            }
            debug!("released output buffer pool");
        }

        self.ctx.input_info = None;
        self.ctx.output_info = None;
        self.ctx.state = TransformState::Stopped;
        debug!(
            element = self.hooks.name(),
            unique_id = self.ctx.unique_id,
            frames = self.ctx.frame_num,
            "stopped"
        );
        released
    }

    fn transform_caps(&self, direction: PadDirection, caps: &Caps, filter: Option<&Caps>) -> Caps {
        negotiation::transform_caps(direction, caps, filter)
    }

    fn transform_size(
        &self,
        direction: PadDirection,
        caps: &Caps,
        size: usize,
        other_caps: &Caps,
    ) -> Result<usize> {
        negotiation::transform_size(direction, caps, size, other_caps)
    }

    fn set_caps(&mut self, incaps: &Caps, outcaps: &Caps) -> Result<()> {
        if self.ctx.state == TransformState::Stopped {
            return Err(Error::InvalidState("set_caps before start".into()));
        }
        self.ctx.state = TransformState::Negotiating;
        let span = observability::span_negotiation(self.hooks.name(), self.ctx.unique_id);
        let _guard = span.enter();

        let in_info = VideoInfo::from_caps(incaps).inspect_err(|e| {
            warn!(error = %e, caps = %incaps, "failed to parse input caps");
        })?;
        info!(caps = %incaps, "input caps");

        if self.ctx.batch_size == 0 {
            error!("batch size can't be 0");
            return Err(Error::InvalidConfig("batch_size must be > 0".into()));
        }

        let out_info = VideoInfo::from_caps(outcaps).inspect_err(|e| {
            warn!(error = %e, caps = %outcaps, "failed to parse output caps");
        })?;
        info!(caps = %outcaps, "output caps");

        if self.ctx.pool.is_none() {
            self.ctx.pool = Some(self.create_pool(outcaps)?);
        } else {
            debug!("output pool already active, keeping it");
        }

        self.hooks.prepare(&in_info, &out_info)?;
        self.ctx.input_info = Some(in_info);
        self.ctx.output_info = Some(out_info);
        self.ctx.state = TransformState::Running;
        Ok(())
    }

    fn prepare_output_buffer(&mut self, _inbuf: &Buffer) -> Result<Buffer> {
        let Some(pool) = &self.ctx.pool else {
            error!("no output pool, caps not negotiated");
            return Err(Error::NotNegotiated);
        };

        let acquired = match self.ctx.acquire_timeout {
            Some(timeout) => pool.acquire_buffer_timeout(timeout),
            None => pool.acquire_buffer(),
        };
        match acquired {
            Ok(buffer) => {
                debug!(frame_num = self.ctx.frame_num, "acquired output buffer");
                self.metrics.record_pool_available(pool.stats().available);
                Ok(buffer)
            }
            Err(e) => {
                error!(error = %e, "failed to acquire output buffer");
                self.metrics.record_error(e.kind());
                Err(e)
            }
        }
    }

    fn transform(&mut self, inbuf: &Buffer, outbuf: &mut Buffer) -> Result<()> {
        if self.ctx.state != TransformState::Running {
            return Err(Error::NotNegotiated);
        }

        let span =
            observability::span_transform(self.hooks.name(), self.ctx.unique_id, self.ctx.frame_num);
        let _guard = span.enter();
        let started = Instant::now();

        let result = self.dispatch(inbuf, outbuf);
        self.metrics.record_time(started.elapsed());
        match result {
            Ok(()) => {
                if let Err(e) = outbuf.copy_metadata_from(inbuf) {
                    debug!(error = %e, "could not copy metadata to output buffer");
                }
                self.ctx.frame_num += 1;
                self.metrics.record_frame();
                Ok(())
            }
            Err(e) => {
                error!(frame_num = self.ctx.frame_num, error = %e, "transform failed");
                self.metrics.record_error(e.kind());
                Err(e)
            }
        }
    }
}

impl<T: VisionTransform> Drop for VisionBaseTransform<T> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "error while stopping dropped element");
        }
    }
}

impl<T: VisionTransform> std::fmt::Debug for VisionBaseTransform<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionBaseTransform")
            .field("name", &self.hooks.name())
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}
