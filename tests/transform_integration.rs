//! Integration tests for the vision base transform element.

use parallax_vision::backend::{HostBackend, ImageHandle};
use parallax_vision::buffer::{Buffer, MapAccess, SurfaceMemory};
use parallax_vision::device::HostDevice;
use parallax_vision::element::{
    BaseTransform, FlowReturn, PassThrough, TransformConfig, TransformState, VisionBaseTransform,
    VisionTransform,
};
use parallax_vision::error::{Error, Result};
use parallax_vision::format::{
    Caps, CapsStructure, CapsValue, Framerate, MemoryFeature, PixelFormat, VideoInfo,
};
use parallax_vision::memory::{
    AllocParams, BufferPool, HostSurfaceAllocator, MemoryKind, PoolConfig, PoolFactory, PoolStats,
    SURFACE_DESCRIPTOR_SIZE, SurfaceAllocator, SurfacePool,
};
use parallax_vision::metadata::{Metadata, MetadataValue};
use parallax_vision::negotiation::PadDirection;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

// ============================================================================
// Harness
// ============================================================================

/// Pool that counts `set_active` calls.
struct CountingPool {
    inner: SurfacePool,
    set_active_calls: AtomicUsize,
}

impl BufferPool for CountingPool {
    fn set_config(&self, config: PoolConfig) -> Result<()> {
        self.inner.set_config(config)
    }

    fn config(&self) -> Option<PoolConfig> {
        self.inner.config()
    }

    fn set_active(&self, active: bool) -> Result<()> {
        self.set_active_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.set_active(active)
    }

    fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    fn acquire_buffer(&self) -> Result<Buffer> {
        self.inner.acquire_buffer()
    }

    fn acquire_buffer_timeout(&self, timeout: Duration) -> Result<Buffer> {
        self.inner.acquire_buffer_timeout(timeout)
    }

    fn stats(&self) -> PoolStats {
        self.inner.stats()
    }
}

struct CountingFactory {
    allocator: Arc<HostSurfaceAllocator>,
    created: Mutex<Vec<Arc<CountingPool>>>,
}

impl CountingFactory {
    fn last(&self) -> Option<Arc<CountingPool>> {
        self.created.lock().unwrap().last().cloned()
    }

    fn count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

impl PoolFactory for CountingFactory {
    fn create(&self, config: PoolConfig) -> Result<Arc<dyn BufferPool>> {
        let pool = Arc::new(CountingPool {
            inner: SurfacePool::new(self.allocator.clone()),
            set_active_calls: AtomicUsize::new(0),
        });
        pool.set_config(config)?;
        self.created.lock().unwrap().push(pool.clone());
        Ok(pool)
    }
}

struct Harness {
    device: Arc<HostDevice>,
    backend: Arc<HostBackend>,
    allocator: Arc<HostSurfaceAllocator>,
    factory: Arc<CountingFactory>,
    upstream: HostSurfaceAllocator,
}

impl Harness {
    fn new() -> Self {
        Self::with_allocator(HostSurfaceAllocator::new())
    }

    fn with_allocator(allocator: HostSurfaceAllocator) -> Self {
        let allocator = Arc::new(allocator);
        Self {
            device: Arc::new(HostDevice::new().integrated(false)),
            backend: Arc::new(HostBackend::new()),
            factory: Arc::new(CountingFactory {
                allocator: allocator.clone(),
                created: Mutex::new(Vec::new()),
            }),
            allocator,
            upstream: HostSurfaceAllocator::new().with_handle_base(1 << 32),
        }
    }

    fn element<T: VisionTransform>(&self, hooks: T, config: TransformConfig) -> VisionBaseTransform<T> {
        VisionBaseTransform::new(
            hooks,
            config,
            self.device.clone(),
            self.backend.clone(),
            self.factory.clone(),
        )
        .unwrap()
    }

    /// A frame produced by an upstream element.
    fn input(&self, info: VideoInfo) -> Buffer {
        let surface = self
            .upstream
            .allocate(&AllocParams {
                info,
                batch_size: 1,
                gpu_id: 0,
                memory_kind: MemoryKind::CudaDevice,
            })
            .unwrap();
        Buffer::from_surface(surface)
    }
}

fn nvmm_caps(width: u32, height: u32, format: PixelFormat, framerate: Framerate) -> Caps {
    Caps::new(
        CapsStructure::video_raw_fixed(width, height, format, framerate)
            .with_feature(MemoryFeature::Nvmm),
    )
}

fn caps_1080p() -> Caps {
    nvmm_caps(1920, 1080, PixelFormat::I420, Framerate::FPS_30)
}

fn info_1080p() -> VideoInfo {
    VideoInfo::from_caps(&caps_1080p()).unwrap()
}

fn negotiated<T: VisionTransform>(
    harness: &Harness,
    hooks: T,
    config: TransformConfig,
) -> VisionBaseTransform<T> {
    let mut element = harness.element(hooks, config);
    element.start().unwrap();
    element.set_caps(&caps_1080p(), &caps_1080p()).unwrap();
    element
}

/// Fails the next frame when asked to.
#[derive(Default)]
struct Flaky {
    fail_next: bool,
    frames: u32,
}

impl VisionTransform for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    fn transform(&mut self, _input: &ImageHandle<'_>, _output: &ImageHandle<'_>) -> Result<()> {
        if std::mem::take(&mut self.fail_next) {
            return Err(Error::Hook("injected failure".into()));
        }
        self.frames += 1;
        Ok(())
    }
}

/// Accepts only one output width.
struct FixedWidth(u32);

impl VisionTransform for FixedWidth {
    fn name(&self) -> &str {
        "fixed-width"
    }

    fn prepare(&mut self, _input: &VideoInfo, output: &VideoInfo) -> Result<()> {
        if output.width != self.0 {
            return Err(Error::Hook("unsupported caps".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Negotiation
// ============================================================================

#[test]
fn test_fixed_framerate_carried_into_every_candidate() {
    let harness = Harness::new();
    let element = harness.element(PassThrough, TransformConfig::default());

    let formats = [PixelFormat::I420, PixelFormat::Nv12, PixelFormat::Rgba];
    let rates = [Framerate::FPS_25, Framerate::FPS_29_97, Framerate::new(120, 1)];
    for format in formats {
        for rate in rates {
            let caps = nvmm_caps(1280, 720, format, rate);
            for direction in [PadDirection::Input, PadDirection::Output] {
                let candidates = element.transform_caps(direction, &caps, None);
                assert!(!candidates.is_empty());
                for s in candidates.structures() {
                    assert_eq!(s.framerate, CapsValue::Fixed(rate));
                    assert_eq!(s.feature, MemoryFeature::Nvmm);
                }
            }
        }
    }
}

#[test]
fn test_transform_size_uses_other_caps() {
    let harness = Harness::new();
    let element = harness.element(PassThrough, TransformConfig::default());
    let small = nvmm_caps(320, 240, PixelFormat::Rgba, Framerate::FPS_30);
    let size = element
        .transform_size(PadDirection::Input, &caps_1080p(), 3_110_400, &small)
        .unwrap();
    assert_eq!(size, 320 * 240 * 4);
}

// ============================================================================
// Lifecycle and pool
// ============================================================================

#[test]
fn test_zero_batch_size_fails_without_pool() {
    let harness = Harness::new();
    let mut element = harness.element(PassThrough, TransformConfig::default().with_batch_size(0));
    element.start().unwrap();

    let result = element.set_caps(&caps_1080p(), &caps_1080p());
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
    assert!(element.pool().is_none());
    assert_eq!(harness.factory.count(), 0);
    assert_eq!(harness.allocator.live(), 0);
    assert_eq!(element.state(), TransformState::Negotiating);
}

#[test]
fn test_negotiated_pool_serves_descriptor_sized_buffers_until_stop() {
    let harness = Harness::new();
    let mut element = negotiated(&harness, PassThrough, TransformConfig::default());
    let pool = element.pool().cloned().unwrap();
    assert!(pool.is_active());

    let inbuf = harness.input(info_1080p());
    for _ in 0..10 {
        let outbuf = element.prepare_output_buffer(&inbuf).unwrap();
        assert_eq!(outbuf.size(), SURFACE_DESCRIPTOR_SIZE);
        assert!(outbuf.is_pooled());
    }

    element.stop().unwrap();
    assert!(!pool.is_active());
    assert!(matches!(
        element.prepare_output_buffer(&inbuf),
        Err(Error::NotNegotiated)
    ));
    assert_eq!(harness.allocator.live(), 0);
}

#[test]
fn test_stop_twice_is_idempotent() {
    let harness = Harness::new();
    let mut element = negotiated(&harness, PassThrough, TransformConfig::default());
    let pool = harness.factory.last().unwrap();
    assert_eq!(pool.set_active_calls.load(Ordering::SeqCst), 1);

    element.stop().unwrap();
    assert_eq!(pool.set_active_calls.load(Ordering::SeqCst), 2);

    element.stop().unwrap();
    assert_eq!(pool.set_active_calls.load(Ordering::SeqCst), 2);
    assert_eq!(element.state(), TransformState::Stopped);
}

#[test]
fn test_pool_capacity_independent_of_batch_size() {
    let harness = Harness::new();
    let element = negotiated(&harness, PassThrough, TransformConfig::default().with_batch_size(8));

    let pool = element.pool().cloned().unwrap();
    let config = pool.config().unwrap();
    assert_eq!((config.min_buffers, config.max_buffers), (4, 4));
    assert_eq!(config.size, SURFACE_DESCRIPTOR_SIZE);
    assert_eq!(config.batch_size, 8);
    assert_eq!(config.memory_kind, MemoryKind::CudaUnified);

    let barrier = Arc::new(std::sync::Barrier::new(4));
    let held: Vec<Buffer> = (0..4)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                pool.acquire_buffer()
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();

    assert_eq!(held.len(), 4);
    assert!(matches!(pool.acquire_buffer(), Err(Error::PoolExhausted)));

    drop(held);
    assert!(pool.acquire_buffer().is_ok());
}

#[test]
fn test_pool_activation_failure_leaves_no_pool() {
    let harness = Harness::with_allocator(HostSurfaceAllocator::with_limit(2));
    let mut element = harness.element(PassThrough, TransformConfig::default());
    element.start().unwrap();

    let result = element.set_caps(&caps_1080p(), &caps_1080p());
    assert!(matches!(result, Err(Error::Negotiation(_))));
    assert!(element.pool().is_none());
    assert_eq!(harness.allocator.live(), 0);
}

#[test]
fn test_drop_stops_element() {
    let harness = Harness::new();
    let element = negotiated(&harness, PassThrough, TransformConfig::default());
    let pool = element.pool().cloned().unwrap();
    drop(element);
    assert!(!pool.is_active());
    assert_eq!(harness.allocator.live(), 0);
}

#[test]
fn test_rejected_renegotiation_blocks_frames() {
    let harness = Harness::new();
    let mut element = negotiated(&harness, FixedWidth(1920), TransformConfig::default());
    let inbuf = harness.input(info_1080p());
    let mut outbuf = element.prepare_output_buffer(&inbuf).unwrap();
    element.transform(&inbuf, &mut outbuf).unwrap();

    let caps_720p = nvmm_caps(1280, 720, PixelFormat::I420, Framerate::FPS_30);
    assert!(matches!(
        element.set_caps(&caps_720p, &caps_720p),
        Err(Error::Hook(_))
    ));
    assert_eq!(element.state(), TransformState::Negotiating);
    assert!(matches!(
        element.transform(&inbuf, &mut outbuf),
        Err(Error::NotNegotiated)
    ));
    assert_eq!(element.frame_num(), 1);

    // The last accepted layouts are kept together.
    assert_eq!(element.input_info().unwrap().width, 1920);
    assert_eq!(element.output_info().unwrap().width, 1920);

    element.set_caps(&caps_1080p(), &caps_1080p()).unwrap();
    assert_eq!(element.state(), TransformState::Running);
    element.transform(&inbuf, &mut outbuf).unwrap();
    assert_eq!(element.frame_num(), 2);
}

#[test]
fn test_unfixed_output_caps_keep_previous_layouts() {
    let harness = Harness::new();
    let mut element = negotiated(&harness, PassThrough, TransformConfig::default());

    let caps_320 = nvmm_caps(320, 240, PixelFormat::I420, Framerate::FPS_30);
    let open = Caps::new(CapsStructure {
        width: CapsValue::Range { min: 1, max: 4096 },
        ..CapsStructure::video_raw_fixed(1280, 720, PixelFormat::I420, Framerate::FPS_30)
            .with_feature(MemoryFeature::Nvmm)
    });
    assert!(element.set_caps(&caps_320, &open).is_err());
    assert_eq!(element.state(), TransformState::Negotiating);
    assert_eq!(element.input_info().unwrap().width, 1920);
    assert_eq!(element.output_info().unwrap().width, 1920);
}

// ============================================================================
// Per-frame dispatch
// ============================================================================

#[test]
fn test_frame_num_counts_only_successes() {
    let harness = Harness::new();
    let mut element = negotiated(&harness, Flaky::default(), TransformConfig::default());
    let inbuf = harness.input(info_1080p());

    for expected in 1..=3 {
        let mut outbuf = element.prepare_output_buffer(&inbuf).unwrap();
        element.transform(&inbuf, &mut outbuf).unwrap();
        assert_eq!(element.frame_num(), expected);
    }

    element.hooks_mut().fail_next = true;
    let mut outbuf = element.prepare_output_buffer(&inbuf).unwrap();
    assert!(matches!(
        element.transform(&inbuf, &mut outbuf),
        Err(Error::Hook(_))
    ));
    assert_eq!(element.frame_num(), 3);
    assert_eq!(outbuf.metadata(), &Metadata::new());

    element.transform(&inbuf, &mut outbuf).unwrap();
    assert_eq!(element.frame_num(), 4);
    assert_eq!(element.hooks().frames, 4);
    assert_eq!(harness.backend.live(), 0);
}

#[test]
fn test_unmappable_input() {
    let harness = Harness::new();
    let mut element = negotiated(&harness, PassThrough, TransformConfig::default());

    let surface = harness
        .upstream
        .allocate(&AllocParams {
            info: info_1080p(),
            batch_size: 1,
            gpu_id: 0,
            memory_kind: MemoryKind::CudaDevice,
        })
        .unwrap();
    let inbuf = Buffer::new(SurfaceMemory::unmappable(surface), Metadata::new());
    let mut outbuf = element.prepare_output_buffer(&inbuf).unwrap();

    assert!(matches!(
        element.transform(&inbuf, &mut outbuf),
        Err(Error::Mapping(_))
    ));
    assert_eq!(element.frame_num(), 0);
    assert_eq!(harness.backend.live(), 0);
    assert_eq!(harness.backend.created(), 0);
}

#[test]
fn test_input_wrap_failure_releases_input_map() {
    let harness = Harness::new();
    let mut element = negotiated(&harness, PassThrough, TransformConfig::default());
    let inbuf = harness.input(info_1080p());
    let mut outbuf = element.prepare_output_buffer(&inbuf).unwrap();

    let handle = inbuf.map(MapAccess::Read).unwrap().surface().buffer_handle().unwrap();
    harness.backend.reject_handle(handle);

    let err = element.transform(&inbuf, &mut outbuf).unwrap_err();
    assert!(matches!(err, Error::Wrap { .. }));
    assert_eq!(harness.backend.created(), 0);
    assert_eq!(harness.backend.live(), 0);
    assert_eq!(element.frame_num(), 0);
    assert!(inbuf.map(MapAccess::Read).is_ok());
}

#[test]
fn test_output_wrap_failure_releases_input_image() {
    let harness = Harness::new();
    let mut element = negotiated(&harness, PassThrough, TransformConfig::default());
    let inbuf = harness.input(info_1080p());
    let mut outbuf = element.prepare_output_buffer(&inbuf).unwrap();

    let handle = outbuf.map(MapAccess::Read).unwrap().surface().buffer_handle().unwrap();
    harness.backend.reject_handle(handle);

    let err = element.transform(&inbuf, &mut outbuf).unwrap_err();
    assert!(matches!(err, Error::Wrap { .. }));
    assert_eq!(harness.backend.created(), 1);
    assert_eq!(harness.backend.live(), 0);
    assert_eq!(element.frame_num(), 0);

    // Both buffers are unmapped again.
    assert!(inbuf.map(MapAccess::Read).is_ok());
    assert!(outbuf.map(MapAccess::ReadWrite).is_ok());
}

#[test]
fn test_shared_output_cannot_be_written() {
    let harness = Harness::new();
    let mut element = negotiated(&harness, PassThrough, TransformConfig::default());
    let inbuf = harness.input(info_1080p());
    let mut outbuf = element.prepare_output_buffer(&inbuf).unwrap();
    let _downstream = outbuf.clone();

    assert!(matches!(
        element.transform(&inbuf, &mut outbuf),
        Err(Error::Mapping(_))
    ));
    assert_eq!(harness.backend.live(), 0);
    assert_eq!(element.frame_num(), 0);
}

#[test]
fn test_device_failure() {
    let harness = Harness::new();
    let mut element = negotiated(&harness, PassThrough, TransformConfig::default());
    let inbuf = harness.input(info_1080p());
    let mut outbuf = element.prepare_output_buffer(&inbuf).unwrap();

    harness.device.set_available(0, false);
    assert!(matches!(
        element.transform(&inbuf, &mut outbuf),
        Err(Error::Device { gpu_id: 0, .. })
    ));
    harness.device.set_available(0, true);
    element.transform(&inbuf, &mut outbuf).unwrap();
    assert_eq!(harness.device.selections(), 1);
}

#[test]
fn test_passthrough_copies_metadata() {
    let harness = Harness::new();
    let mut element = negotiated(&harness, PassThrough, TransformConfig::default());

    let mut inbuf = harness.input(info_1080p());
    *inbuf.metadata_mut() = Metadata::new()
        .with_pts(Duration::from_millis(40))
        .with_duration(Duration::from_millis(33))
        .with_offset(7)
        .with_extra("source_id", MetadataValue::Int(2));
    inbuf.metadata_mut().flags.sync_point = true;

    let mut outbuf = element.prepare_output_buffer(&inbuf).unwrap();
    element.transform(&inbuf, &mut outbuf).unwrap();

    assert_eq!(element.frame_num(), 1);
    let meta = outbuf.metadata();
    assert_eq!(meta.pts, Some(Duration::from_millis(40)));
    assert_eq!(meta.duration, Some(Duration::from_millis(33)));
    assert_eq!(meta.offset, Some(7));
    assert!(meta.flags.sync_point);
    assert_eq!(meta.get_extra("source_id"), Some(&MetadataValue::Int(2)));
    assert_eq!(outbuf.map(MapAccess::Read).unwrap().surface().num_filled, 1);
}

#[test]
fn test_process_and_flow_return() {
    let harness = Harness::new();
    let mut element = harness.element(PassThrough, TransformConfig::default());
    let inbuf = harness.input(info_1080p());

    element.start().unwrap();
    assert_eq!(FlowReturn::from(element.process(&inbuf)), FlowReturn::NotNegotiated);

    element.set_caps(&caps_1080p(), &caps_1080p()).unwrap();
    let result = element.process(&inbuf);
    assert_eq!(FlowReturn::from(&result), FlowReturn::Ok);
    drop(result);

    let held: Vec<_> = (0..4)
        .map(|_| element.prepare_output_buffer(&inbuf).unwrap())
        .collect();
    assert_eq!(FlowReturn::from(element.process(&inbuf)), FlowReturn::Error);
    drop(held);
    assert_eq!(element.frame_num(), 1);
}

#[test]
fn test_logs_with_subscriber() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("parallax_vision=trace"))
        .with_test_writer()
        .finish();
    let _default = tracing::subscriber::set_default(subscriber);

    let harness = Harness::new();
    let mut element = negotiated(&harness, PassThrough, TransformConfig::default());
    let inbuf = harness.input(info_1080p());
    let out = element.process(&inbuf).unwrap();
    assert_eq!(out.size(), SURFACE_DESCRIPTOR_SIZE);
    element.stop().unwrap();
}
