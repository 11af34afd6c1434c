//! Vision backend boundary.
//!
//! A backend turns device buffers into images its algorithms can run on.
//! Wrapping is zero-copy: the backend image references the surface's device
//! memory and destroying it never frees that memory.

mod host;
mod wrapper;

pub use host::HostBackend;
pub use wrapper::{ImageHandle, SurfaceWrapper};

use crate::format::PixelFormat;
use crate::memory::SurfaceParams;
use std::fmt;

/// Failure codes reported by a vision backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendStatus {
    /// The operation is not implemented by the backend.
    NotImplemented,
    /// An argument was rejected.
    InvalidArgument,
    /// The image format is not supported.
    InvalidImageFormat,
    /// The operation is invalid in the current state.
    InvalidOperation,
    /// The requested backend target is unavailable.
    NotReady,
    /// The backend ran out of memory.
    OutOfMemory,
    /// Internal backend failure.
    Internal,
}

impl BackendStatus {
    /// Stable name of the status code.
    pub fn name(self) -> &'static str {
        match self {
            Self::NotImplemented => "ERROR_NOT_IMPLEMENTED",
            Self::InvalidArgument => "ERROR_INVALID_ARGUMENT",
            Self::InvalidImageFormat => "ERROR_INVALID_IMAGE_FORMAT",
            Self::InvalidOperation => "ERROR_INVALID_OPERATION",
            Self::NotReady => "ERROR_NOT_READY",
            Self::OutOfMemory => "ERROR_OUT_OF_MEMORY",
            Self::Internal => "ERROR_INTERNAL",
        }
    }
}

impl fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Color specification attached to a wrapped image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorSpec {
    /// Let the backend infer it from the surface.
    #[default]
    Default,
    /// ITU-R BT.601.
    Bt601,
    /// ITU-R BT.709.
    Bt709,
    /// ITU-R BT.2020.
    Bt2020,
}

/// Hardware engine the wrapped image is made available to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendTarget {
    /// Host CPU.
    Cpu,
    /// GPU compute.
    #[default]
    Cuda,
    /// Programmable vision accelerator.
    Pva,
    /// Video image compositor.
    Vic,
}

/// Format of a backend image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageFormat {
    /// Pixel layout.
    pub pixel_format: PixelFormat,
    /// Color specification, `None` when the backend was not told one.
    pub color_spec: Option<ColorSpec>,
}

/// Opaque backend image reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawImage(pub u64);

/// A vision-processing backend.
pub trait VisionBackend: Send + Sync {
    /// Wrap the device memory of `surface` without copying.
    fn create_wrapper(
        &self,
        surface: &SurfaceParams,
        color_spec: Option<ColorSpec>,
        target: BackendTarget,
    ) -> std::result::Result<RawImage, BackendStatus>;

    /// Query the format of a wrapped image.
    fn image_format(&self, image: RawImage) -> std::result::Result<ImageFormat, BackendStatus>;

    /// Destroy a wrapper. The underlying device memory is untouched.
    fn destroy(&self, image: RawImage);

    /// Human-readable detail of the most recent failure.
    fn last_status_message(&self) -> String;
}
