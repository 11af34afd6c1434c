//! Transform element for GPU-resident video.
//!
//! This module defines:
//!
//! - [`BaseTransform`]: the contract a pipeline drives a 1-in/1-out element through
//! - [`VisionTransform`]: hooks a concrete vision algorithm implements
//! - [`VisionBaseTransform`]: the element bridging the two
//!
//! # Design
//!
//! The pipeline calls `start`, negotiates caps through `transform_caps` and
//! `transform_size`, commits them with `set_caps`, then for each frame calls
//! `prepare_output_buffer` followed by `transform`. All lifecycle and
//! per-frame methods take `&mut self`, so at most one call is active at a
//! time.

mod base;
mod context;
mod hooks;

pub use base::VisionBaseTransform;
pub use context::{TransformConfig, TransformState};
pub use hooks::{PassThrough, VisionTransform};

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::format::Caps;
use crate::negotiation::PadDirection;

/// Pipeline-facing contract of a 1-in/1-out transform element.
pub trait BaseTransform {
    /// Prepare for streaming.
    fn start(&mut self) -> Result<()>;

    /// Stop streaming and release resources. Idempotent.
    fn stop(&mut self) -> Result<()>;

    /// Caps the opposite pad can handle given `caps` on `direction`.
    fn transform_caps(&self, direction: PadDirection, caps: &Caps, filter: Option<&Caps>) -> Caps;

    /// Buffer size on the opposite pad.
    fn transform_size(
        &self,
        direction: PadDirection,
        caps: &Caps,
        size: usize,
        other_caps: &Caps,
    ) -> Result<usize>;

    /// Commit negotiated caps.
    fn set_caps(&mut self, incaps: &Caps, outcaps: &Caps) -> Result<()>;

    /// Get an output buffer for `inbuf`.
    fn prepare_output_buffer(&mut self, inbuf: &Buffer) -> Result<Buffer>;

    /// Process `inbuf` into `outbuf`.
    fn transform(&mut self, inbuf: &Buffer, outbuf: &mut Buffer) -> Result<()>;

    /// Run one frame through the element.
    fn process(&mut self, inbuf: &Buffer) -> Result<Buffer> {
        let mut outbuf = self.prepare_output_buffer(inbuf)?;
        self.transform(inbuf, &mut outbuf)?;
        Ok(outbuf)
    }
}

/// Status reported back to the pipeline for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowReturn {
    /// The frame was processed.
    Ok,
    /// The pool is shutting down.
    Flushing,
    /// Caps were never negotiated.
    NotNegotiated,
    /// The frame failed.
    Error,
}

impl FlowReturn {
    /// Whether streaming can continue.
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl<T> From<&Result<T>> for FlowReturn {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(Error::Flushing) => Self::Flushing,
            Err(Error::NotNegotiated) => Self::NotNegotiated,
            Err(_) => Self::Error,
        }
    }
}

impl<T> From<Result<T>> for FlowReturn {
    fn from(result: Result<T>) -> Self {
        Self::from(&result)
    }
}
