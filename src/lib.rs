//! # Parallax Vision
//!
//! Base transform element that hands GPU-resident video frames to a
//! pluggable vision backend and writes results into GPU-resident output
//! frames, without copying pixels.
//!
//! ## Features
//!
//! - **Caps negotiation**: device-memory raw video at any size, frame rate carried through
//! - **Output pool**: fixed set of preallocated surface descriptors, returned on drop
//! - **Zero-copy wrapping**: mapped surfaces become backend images for the frame's duration
//! - **Pluggable algorithms**: implement [`VisionTransform`](element::VisionTransform) hooks
//! - **Host runtime**: reference device, allocator and backend for machines without a GPU
//!
//! ## Quick Start
//!
//! ```rust
//! use parallax_vision::prelude::*;
//!
//! let mut element =
//!     VisionBaseTransform::with_host_runtime(PassThrough, TransformConfig::default())?;
//! let caps = Caps::new(
//!     CapsStructure::video_raw_fixed(1920, 1080, PixelFormat::I420, Framerate::FPS_30)
//!         .with_feature(MemoryFeature::Nvmm),
//! );
//!
//! element.start()?;
//! let out = element.transform_caps(PadDirection::Input, &caps, None);
//! assert!(out.can_intersect(&caps));
//! element.set_caps(&caps, &caps)?;
//!
//! let input = element.prepare_output_buffer(&Buffer::from_surface(Default::default()))?;
//! let output = element.process(&input)?;
//! assert_eq!(output.size(), SURFACE_DESCRIPTOR_SIZE);
//! element.stop()?;
//! # Ok::<(), parallax_vision::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod buffer;
pub mod device;
pub mod element;
pub mod error;
pub mod format;
pub mod memory;
pub mod metadata;
pub mod negotiation;
pub mod observability;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::backend::{HostBackend, ImageHandle, VisionBackend};
    pub use crate::buffer::{Buffer, MapAccess};
    pub use crate::device::{DeviceContext, HostDevice};
    pub use crate::element::{
        BaseTransform, FlowReturn, PassThrough, TransformConfig, TransformState,
        VisionBaseTransform, VisionTransform,
    };
    pub use crate::error::{Error, Result};
    pub use crate::format::{
        Caps, CapsStructure, CapsValue, Framerate, MemoryFeature, PixelFormat, VideoInfo,
    };
    pub use crate::memory::{BufferPool, MemoryKind, SURFACE_DESCRIPTOR_SIZE};
    pub use crate::metadata::Metadata;
    pub use crate::negotiation::PadDirection;
}

pub use error::{Error, Result};
