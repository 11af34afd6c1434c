//! Zero-copy wrapping of mapped surfaces into backend images.

use super::{BackendStatus, BackendTarget, ColorSpec, ImageFormat, RawImage, VisionBackend};
use crate::buffer::BufferMap;
use crate::error::{Error, Result};
use crate::memory::SurfaceParams;
use std::marker::PhantomData;
use std::sync::Arc;

/// Creates backend images over mapped buffers.
#[derive(Clone)]
pub struct SurfaceWrapper {
    backend: Arc<dyn VisionBackend>,
    target: BackendTarget,
}

impl SurfaceWrapper {
    /// Wrap for the GPU compute target.
    pub fn new(backend: Arc<dyn VisionBackend>) -> Self {
        Self::with_target(backend, BackendTarget::Cuda)
    }

    /// Wrap for an explicit target.
    pub fn with_target(backend: Arc<dyn VisionBackend>, target: BackendTarget) -> Self {
        Self { backend, target }
    }

    /// Wrap the first surface of a mapped descriptor.
    ///
    /// The handle borrows `map`, so the buffer stays mapped for as long as
    /// the image exists.
    pub fn wrap<'m>(
        &self,
        map: &'m BufferMap<'_>,
        color_spec: Option<ColorSpec>,
    ) -> Result<ImageHandle<'m>> {
        let Some(surface) = map.surface().primary() else {
            return Err(Error::wrap(
                BackendStatus::InvalidArgument,
                "surface descriptor has no surfaces",
            ));
        };

        match self.backend.create_wrapper(surface, color_spec, self.target) {
            Ok(image) => {
                tracing::trace!(handle = surface.buffer_desc, image = image.0, "wrapped surface");
                Ok(ImageHandle {
                    image,
                    surface: *surface,
                    backend: Arc::clone(&self.backend),
                    _map: PhantomData,
                })
            }
            Err(status) => {
                let message = self.backend.last_status_message();
                tracing::error!(
                    status = status.name(),
                    %message,
                    handle = surface.buffer_desc,
                    "error wrapping surface"
                );
                Err(Error::wrap(status, message))
            }
        }
    }
}

impl std::fmt::Debug for SurfaceWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceWrapper")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// A backend image over a mapped surface. Destroyed on drop.
pub struct ImageHandle<'m> {
    image: RawImage,
    surface: SurfaceParams,
    backend: Arc<dyn VisionBackend>,
    _map: PhantomData<&'m ()>,
}

impl ImageHandle<'_> {
    /// Backend image reference.
    pub fn raw(&self) -> RawImage {
        self.image
    }

    /// The wrapped surface.
    pub fn surface(&self) -> &SurfaceParams {
        &self.surface
    }

    /// Query the image format from the backend.
    pub fn format(&self) -> Result<ImageFormat> {
        self.backend
            .image_format(self.image)
            .map_err(|status| Error::wrap(status, self.backend.last_status_message()))
    }
}

impl std::fmt::Debug for ImageHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageHandle")
            .field("image", &self.image)
            .field("surface", &self.surface)
            .finish()
    }
}

impl Drop for ImageHandle<'_> {
    fn drop(&mut self) {
        self.backend.destroy(self.image);
    }
}
