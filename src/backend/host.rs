//! Backend that tracks wrappers in host memory.

use super::{BackendStatus, BackendTarget, ColorSpec, ImageFormat, RawImage, VisionBackend};
use crate::memory::SurfaceParams;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Backend for hosts without a vision accelerator.
///
/// Wrapping records the surface's format and hands back a fresh id. Handles
/// can be marked as rejected to make wrapping fail, and the live wrapper
/// count shows whether every wrapper was destroyed.
#[derive(Debug, Default)]
pub struct HostBackend {
    state: Mutex<HostState>,
    next_id: AtomicU64,
    created: AtomicU64,
    destroyed: AtomicU64,
}

#[derive(Debug, Default)]
struct HostState {
    images: HashMap<u64, ImageFormat>,
    rejected: HashSet<u64>,
    last_message: String,
}

impl HostBackend {
    /// Create a backend with no live wrappers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make wrapping of `handle` fail with [`BackendStatus::InvalidArgument`].
    pub fn reject_handle(&self, handle: u64) {
        self.lock().rejected.insert(handle);
    }

    /// Wrappers created and not yet destroyed.
    pub fn live(&self) -> usize {
        self.lock().images.len()
    }

    /// Total wrappers created.
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Total wrappers destroyed.
    pub fn destroyed(&self) -> u64 {
        self.destroyed.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn fail(state: &mut HostState, status: BackendStatus, message: String) -> BackendStatus {
        state.last_message = message;
        status
    }
}

impl VisionBackend for HostBackend {
    fn create_wrapper(
        &self,
        surface: &SurfaceParams,
        color_spec: Option<ColorSpec>,
        target: BackendTarget,
    ) -> Result<RawImage, BackendStatus> {
        let mut state = self.lock();
        if !matches!(target, BackendTarget::Cpu | BackendTarget::Cuda) {
            return Err(Self::fail(
                &mut state,
                BackendStatus::NotReady,
                format!("{target:?} backend is not available on this host"),
            ));
        }
        if surface.buffer_desc == 0 || state.rejected.contains(&surface.buffer_desc) {
            return Err(Self::fail(
                &mut state,
                BackendStatus::InvalidArgument,
                format!("invalid buffer descriptor {}", surface.buffer_desc),
            ));
        }
        if surface.width == 0 || surface.height == 0 {
            return Err(Self::fail(
                &mut state,
                BackendStatus::InvalidArgument,
                format!("invalid image size {}x{}", surface.width, surface.height),
            ));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        state.images.insert(
            id,
            ImageFormat {
                pixel_format: surface.color_format,
                color_spec,
            },
        );
        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(RawImage(id))
    }

    fn image_format(&self, image: RawImage) -> Result<ImageFormat, BackendStatus> {
        let mut state = self.lock();
        match state.images.get(&image.0) {
            Some(format) => Ok(*format),
            None => Err(Self::fail(
                &mut state,
                BackendStatus::InvalidArgument,
                format!("unknown image {}", image.0),
            )),
        }
    }

    fn destroy(&self, image: RawImage) {
        if self.lock().images.remove(&image.0).is_some() {
            self.destroyed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn last_status_message(&self) -> String {
        self.lock().last_message.clone()
    }
}
