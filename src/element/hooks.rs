//! Extension points for concrete vision algorithms.

use crate::backend::ImageHandle;
use crate::error::Result;
use crate::format::VideoInfo;

/// A vision algorithm run by [`VisionBaseTransform`].
///
/// Every hook has a no-op default, so an implementation only overrides
/// what it needs. Hooks report failure through [`Error::Hook`] or any
/// other error variant.
///
/// [`VisionBaseTransform`]: super::VisionBaseTransform
/// [`Error::Hook`]: crate::error::Error::Hook
///
/// # Example
///
/// ```rust
/// use parallax_vision::backend::ImageHandle;
/// use parallax_vision::element::VisionTransform;
/// use parallax_vision::error::Result;
///
/// #[derive(Default)]
/// struct CountFrames(u64);
///
/// impl VisionTransform for CountFrames {
///     fn name(&self) -> &str {
///         "count-frames"
///     }
///
///     fn transform(&mut self, _input: &ImageHandle<'_>, _output: &ImageHandle<'_>) -> Result<()> {
///         self.0 += 1;
///         Ok(())
///     }
/// }
/// ```
pub trait VisionTransform: Send {
    /// Name used in logs, spans and metric labels.
    fn name(&self) -> &str {
        "vision-transform"
    }

    /// Called when the element starts.
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once caps are set and the output pool is active.
    fn prepare(&mut self, _input: &VideoInfo, _output: &VideoInfo) -> Result<()> {
        Ok(())
    }

    /// Process one frame from `input` into `output`.
    fn transform(&mut self, _input: &ImageHandle<'_>, _output: &ImageHandle<'_>) -> Result<()> {
        Ok(())
    }

    /// Called when the element stops, before the output pool is released.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T: VisionTransform + ?Sized> VisionTransform for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn start(&mut self) -> Result<()> {
        (**self).start()
    }

    fn prepare(&mut self, input: &VideoInfo, output: &VideoInfo) -> Result<()> {
        (**self).prepare(input, output)
    }

    fn transform(&mut self, input: &ImageHandle<'_>, output: &ImageHandle<'_>) -> Result<()> {
        (**self).transform(input, output)
    }

    fn release(&mut self) -> Result<()> {
        (**self).release()
    }
}

/// Leaves the output untouched. Frames still flow and metadata is copied.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl VisionTransform for PassThrough {
    fn name(&self) -> &str {
        "passthrough"
    }
}
