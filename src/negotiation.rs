//! Caps negotiation for the transform element.
//!
//! The element accepts and produces raw video in device memory at any
//! resolution. The only constraint carried across is the frame rate: when
//! the peer's caps are fully fixed, its frame rate passes through unchanged.
//!
//! ```rust
//! use parallax_vision::format::{Caps, CapsStructure, CapsValue, Framerate, MemoryFeature, PixelFormat};
//! use parallax_vision::negotiation::{PadDirection, transform_caps};
//!
//! let input = Caps::new(
//!     CapsStructure::video_raw_fixed(1920, 1080, PixelFormat::I420, Framerate::FPS_30)
//!         .with_feature(MemoryFeature::Nvmm),
//! );
//! let output = transform_caps(PadDirection::Input, &input, None);
//! assert_eq!(output.structures()[0].framerate, CapsValue::Fixed(Framerate::FPS_30));
//! ```

use crate::error::Result;
use crate::format::{Caps, CapsStructure, MAX_DIMENSION, MemoryFeature, VideoInfo};
use std::fmt;

/// Side of the element a set of caps belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadDirection {
    /// The input pad (receives buffers from upstream).
    Input,
    /// The output pad (sends buffers downstream).
    Output,
}

impl PadDirection {
    /// The other side.
    pub fn opposite(self) -> Self {
        match self {
            Self::Input => Self::Output,
            Self::Output => Self::Input,
        }
    }
}

impl fmt::Display for PadDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "input",
            Self::Output => "output",
        })
    }
}

/// Device-memory raw video at any resolution.
pub fn template_caps() -> Caps {
    let mut structure = CapsStructure::video_raw().with_feature(MemoryFeature::Nvmm);
    structure.width = (1..=MAX_DIMENSION).into();
    structure.height = (1..=MAX_DIMENSION).into();
    Caps::new(structure)
}

/// Caps the pad opposite `direction` can handle, given `caps` on `direction`.
///
/// Both directions produce the same candidates. If `caps` is fixed its frame
/// rate is copied into every candidate. The result is intersected with
/// `filter` when given, keeping the filter's order. Empty `caps` yield
/// empty caps.
pub fn transform_caps(direction: PadDirection, caps: &Caps, filter: Option<&Caps>) -> Caps {
    if caps.is_empty() {
        tracing::debug!(%direction, "peer caps are empty");
        return Caps::new_empty();
    }

    let mut result = template_caps();
    if caps.is_fixed() {
        let framerate = caps.structures()[0].framerate.clone();
        for structure in result.structures_mut() {
            structure.framerate = framerate.clone();
        }
    }

    if let Some(filter) = filter {
        result = filter.intersect(&result);
    }

    tracing::debug!(%direction, from = %caps, to = %result, "transformed caps");
    result
}

/// Byte size of a buffer on the other pad.
///
/// Resolves the fixed `other_caps` into a frame layout and returns its size.
pub fn transform_size(
    direction: PadDirection,
    caps: &Caps,
    size: usize,
    other_caps: &Caps,
) -> Result<usize> {
    let info = VideoInfo::from_caps(other_caps)?;
    tracing::debug!(
        %direction,
        %caps,
        size,
        othersize = info.size,
        "transformed size"
    );
    Ok(info.size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::format::{CapsValue, Framerate, PixelFormat};

    fn fixed(framerate: Framerate) -> Caps {
        Caps::new(
            CapsStructure::video_raw_fixed(1920, 1080, PixelFormat::I420, framerate)
                .with_feature(MemoryFeature::Nvmm),
        )
    }

    #[test]
    fn test_template_caps() {
        let caps = template_caps();
        assert_eq!(caps.len(), 1);
        let s = &caps.structures()[0];
        assert_eq!(s.feature, MemoryFeature::Nvmm);
        assert_eq!(s.width, CapsValue::Range { min: 1, max: MAX_DIMENSION });
        assert!(s.format.is_any());
        assert!(s.framerate.is_any());
    }

    #[test]
    fn test_fixed_framerate_propagates_both_directions() {
        let rates = [
            Framerate::FPS_25,
            Framerate::FPS_29_97,
            Framerate::FPS_60,
            Framerate::VARIABLE,
        ];
        for rate in rates {
            for dir in [PadDirection::Input, PadDirection::Output] {
                let out = transform_caps(dir, &fixed(rate), None);
                assert!(!out.is_empty());
                for s in out.structures() {
                    assert_eq!(s.framerate, CapsValue::Fixed(rate), "{dir} {rate}");
                }
            }
        }
    }

    #[test]
    fn test_unfixed_caps_leave_framerate_open() {
        let mut s = CapsStructure::video_raw().with_feature(MemoryFeature::Nvmm);
        s.framerate = CapsValue::Fixed(Framerate::FPS_30);
        let out = transform_caps(PadDirection::Input, &Caps::new(s), None);
        assert!(out.structures()[0].framerate.is_any());

        let any = transform_caps(PadDirection::Output, &Caps::new_any(), None);
        assert_eq!(any, template_caps());
    }

    #[test]
    fn test_empty_caps() {
        let out = transform_caps(PadDirection::Input, &Caps::new_empty(), None);
        assert!(out.is_empty());
    }

    #[test]
    fn test_filter_intersection() {
        let filter = fixed(Framerate::FPS_30);
        let out = transform_caps(PadDirection::Input, &fixed(Framerate::FPS_30), Some(&filter));
        assert_eq!(out, filter);

        let other_rate = fixed(Framerate::FPS_60);
        let out = transform_caps(PadDirection::Input, &fixed(Framerate::FPS_30), Some(&other_rate));
        assert!(out.is_empty());

        let system = Caps::new(CapsStructure::video_raw());
        assert!(transform_caps(PadDirection::Output, &Caps::new_any(), Some(&system)).is_empty());
    }

    #[test]
    fn test_transform_size() {
        let size = transform_size(PadDirection::Input, &fixed(Framerate::FPS_30), 0, &fixed(Framerate::FPS_30))
            .unwrap();
        assert_eq!(size, 3_110_400);

        let err = transform_size(PadDirection::Input, &template_caps(), 0, &template_caps());
        assert!(matches!(err, Err(Error::Negotiation(_))));
    }

    #[test]
    fn test_direction_opposite() {
        assert_eq!(PadDirection::Input.opposite(), PadDirection::Output);
        assert_eq!(PadDirection::Output.to_string(), "output");
    }
}
