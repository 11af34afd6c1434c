//! Video caps and negotiated video layouts.
//!
//! Caps describe the set of formats a pad can handle. A [`Caps`] value is an
//! ordered list of [`CapsStructure`]s (first is preferred), each carrying a
//! media type, a memory feature and constrained video fields.
//!
//! Once negotiation settles, fixed caps are resolved into a [`VideoInfo`]
//! which knows the exact plane layout and byte size of one frame.
//!
//! ```rust
//! use parallax_vision::format::{Caps, CapsStructure, Framerate, PixelFormat, VideoInfo};
//!
//! let caps = Caps::new(CapsStructure::video_raw_fixed(
//!     1920,
//!     1080,
//!     PixelFormat::I420,
//!     Framerate::FPS_30,
//! ));
//! let info = VideoInfo::from_caps(&caps).unwrap();
//! assert_eq!(info.size, 1920 * 1080 * 3 / 2);
//! ```

use crate::error::{Error, Result};
use smallvec::SmallVec;
use std::fmt;

/// Media type of raw, uncompressed video.
pub const VIDEO_RAW: &str = "video/x-raw";

/// Largest width/height a caps range may advertise.
pub const MAX_DIMENSION: u32 = i32::MAX as u32;

// ============================================================================
// CapsValue
// ============================================================================

/// A caps field: fixed, range, list, or unconstrained.
///
/// ```rust
/// use parallax_vision::format::CapsValue;
///
/// let range: CapsValue<u32> = (1..=4096).into();
/// assert_eq!(range.intersect(&CapsValue::Fixed(1920)), Some(CapsValue::Fixed(1920)));
/// assert_eq!(range.intersect(&CapsValue::Fixed(8192)), None);
/// ```
#[derive(Clone, Debug, PartialEq, Default)]
pub enum CapsValue<T> {
    /// Exact value.
    Fixed(T),
    /// Inclusive range.
    Range {
        /// Minimum acceptable value.
        min: T,
        /// Maximum acceptable value.
        max: T,
    },
    /// Acceptable values, first is preferred.
    List(Vec<T>),
    /// Unconstrained.
    #[default]
    Any,
}

impl<T: Clone + Ord> CapsValue<T> {
    /// Check if a value is accepted by this constraint.
    pub fn accepts(&self, value: &T) -> bool {
        match self {
            Self::Fixed(v) => v == value,
            Self::Range { min, max } => value >= min && value <= max,
            Self::List(values) => values.contains(value),
            Self::Any => true,
        }
    }

    /// Intersect two constraints. Returns `None` when they share no value.
    ///
    /// Lists keep the order of `self`.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Any, v) | (v, Self::Any) => Some(v.clone()),
            (Self::Fixed(v), c) | (c, Self::Fixed(v)) => {
                c.accepts(v).then(|| Self::Fixed(v.clone()))
            }
            (Self::Range { min: a, max: b }, Self::Range { min: c, max: d }) => {
                let lo = a.max(c).clone();
                let hi = b.min(d).clone();
                match lo.cmp(&hi) {
                    std::cmp::Ordering::Greater => None,
                    std::cmp::Ordering::Equal => Some(Self::Fixed(lo)),
                    std::cmp::Ordering::Less => Some(Self::Range { min: lo, max: hi }),
                }
            }
            (Self::List(list), c @ Self::Range { .. }) | (c @ Self::Range { .. }, Self::List(list)) => {
                Self::from_matches(list.iter().filter(|v| c.accepts(v)).cloned().collect())
            }
            (Self::List(a), Self::List(b)) => {
                Self::from_matches(a.iter().filter(|v| b.contains(v)).cloned().collect())
            }
        }
    }

    fn from_matches(mut values: Vec<T>) -> Option<Self> {
        match values.len() {
            0 => None,
            1 => values.pop().map(Self::Fixed),
            _ => Some(Self::List(values)),
        }
    }

    /// Check if this is a fixed value.
    #[inline]
    pub fn is_fixed(&self) -> bool {
        matches!(self, Self::Fixed(_))
    }

    /// Check if this accepts any value.
    #[inline]
    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }

    /// Get the fixed value if this is fixed.
    #[inline]
    pub fn as_fixed(&self) -> Option<&T> {
        match self {
            Self::Fixed(v) => Some(v),
            _ => None,
        }
    }
}

impl<T: Clone + Ord> From<T> for CapsValue<T> {
    fn from(value: T) -> Self {
        Self::Fixed(value)
    }
}

impl<T: Clone + Ord> From<std::ops::RangeInclusive<T>> for CapsValue<T> {
    fn from(range: std::ops::RangeInclusive<T>) -> Self {
        let (min, max) = range.into_inner();
        Self::Range { min, max }
    }
}

impl<T: fmt::Display> CapsValue<T> {
    fn write_field(&self, f: &mut fmt::Formatter<'_>, name: &str, ty: &str) -> fmt::Result {
        match self {
            Self::Fixed(v) => write!(f, ", {name}=({ty}){v}"),
            Self::Range { min, max } => write!(f, ", {name}=({ty})[ {min}, {max} ]"),
            Self::List(values) => {
                write!(f, ", {name}=({ty}){{ ")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, " }}")
            }
            Self::Any => Ok(()),
        }
    }
}

// ============================================================================
// Pixel formats and framerate
// ============================================================================

/// Raw video pixel layouts understood by the size resolver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub enum PixelFormat {
    /// YUV 4:2:0 planar (Y, U, V planes).
    #[default]
    I420,
    /// YUV 4:2:0 semi-planar (Y plane, interleaved UV plane).
    Nv12,
    /// RGBA 8-bit packed.
    Rgba,
    /// BGRA 8-bit packed.
    Bgra,
    /// RGB with padding byte.
    Rgbx,
    /// BGR with padding byte.
    Bgrx,
    /// RGB 24-bit packed.
    Rgb,
    /// BGR 24-bit packed.
    Bgr,
    /// 8-bit grayscale.
    Gray8,
}

impl PixelFormat {
    /// Canonical caps name of the format.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::I420 => "I420",
            Self::Nv12 => "NV12",
            Self::Rgba => "RGBA",
            Self::Bgra => "BGRA",
            Self::Rgbx => "RGBx",
            Self::Bgrx => "BGRx",
            Self::Rgb => "RGB",
            Self::Bgr => "BGR",
            Self::Gray8 => "GRAY8",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for PixelFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        [
            Self::I420,
            Self::Nv12,
            Self::Rgba,
            Self::Bgra,
            Self::Rgbx,
            Self::Bgrx,
            Self::Rgb,
            Self::Bgr,
            Self::Gray8,
        ]
        .into_iter()
        .find(|fmt| fmt.name() == s)
        .ok_or_else(|| Error::Negotiation(format!("unknown pixel format {s:?}")))
    }
}

/// Frame rate as numerator/denominator.
///
/// `0/1` denotes a variable frame rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Framerate {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (time units).
    pub den: u32,
}

impl Framerate {
    /// Create a new framerate.
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// 25 fps (PAL).
    pub const FPS_25: Self = Self::new(25, 1);
    /// 30 fps.
    pub const FPS_30: Self = Self::new(30, 1);
    /// 60 fps.
    pub const FPS_60: Self = Self::new(60, 1);
    /// 29.97 fps (NTSC).
    pub const FPS_29_97: Self = Self::new(30000, 1001);
    /// Variable frame rate.
    pub const VARIABLE: Self = Self::new(0, 1);
}

impl PartialOrd for Framerate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Framerate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let lhs = self.num as u64 * other.den as u64;
        let rhs = other.num as u64 * self.den as u64;
        lhs.cmp(&rhs).then(self.den.cmp(&other.den))
    }
}

impl fmt::Display for Framerate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

// ============================================================================
// Caps structures
// ============================================================================

/// Memory feature attached to a caps structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum MemoryFeature {
    /// Plain host memory.
    #[default]
    SystemMemory,
    /// GPU-resident surfaces described by a surface descriptor.
    Nvmm,
}

impl MemoryFeature {
    /// Caps feature string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SystemMemory => "memory:SystemMemory",
            Self::Nvmm => "memory:NVMM",
        }
    }
}

/// One alternative within a [`Caps`] set.
#[derive(Clone, Debug, PartialEq)]
pub struct CapsStructure {
    /// Media type, e.g. `video/x-raw`.
    pub media_type: String,
    /// Memory feature.
    pub feature: MemoryFeature,
    /// Width constraint.
    pub width: CapsValue<u32>,
    /// Height constraint.
    pub height: CapsValue<u32>,
    /// Pixel format constraint.
    pub format: CapsValue<PixelFormat>,
    /// Framerate constraint.
    pub framerate: CapsValue<Framerate>,
}

impl CapsStructure {
    /// Raw video structure with every field unconstrained.
    pub fn video_raw() -> Self {
        Self {
            media_type: VIDEO_RAW.to_string(),
            feature: MemoryFeature::SystemMemory,
            width: CapsValue::Any,
            height: CapsValue::Any,
            format: CapsValue::Any,
            framerate: CapsValue::Any,
        }
    }

    /// Fully fixed raw video structure.
    pub fn video_raw_fixed(
        width: u32,
        height: u32,
        format: PixelFormat,
        framerate: Framerate,
    ) -> Self {
        Self {
            width: CapsValue::Fixed(width),
            height: CapsValue::Fixed(height),
            format: CapsValue::Fixed(format),
            framerate: CapsValue::Fixed(framerate),
            ..Self::video_raw()
        }
    }

    /// Set the memory feature.
    pub fn with_feature(mut self, feature: MemoryFeature) -> Self {
        self.feature = feature;
        self
    }

    /// Check if every field holds a single value.
    pub fn is_fixed(&self) -> bool {
        self.width.is_fixed()
            && self.height.is_fixed()
            && self.format.is_fixed()
            && self.framerate.is_fixed()
    }

    /// Intersect with another structure.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        if self.media_type != other.media_type || self.feature != other.feature {
            return None;
        }
        Some(Self {
            media_type: self.media_type.clone(),
            feature: self.feature,
            width: self.width.intersect(&other.width)?,
            height: self.height.intersect(&other.height)?,
            format: self.format.intersect(&other.format)?,
            framerate: self.framerate.intersect(&other.framerate)?,
        })
    }
}

impl fmt::Display for CapsStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.media_type)?;
        if self.feature != MemoryFeature::SystemMemory {
            write!(f, "({})", self.feature.as_str())?;
        }
        self.width.write_field(f, "width", "int")?;
        self.height.write_field(f, "height", "int")?;
        self.format.write_field(f, "format", "string")?;
        self.framerate.write_field(f, "framerate", "fraction")
    }
}

// ============================================================================
// Caps
// ============================================================================

/// An ordered set of acceptable formats.
///
/// `Caps::new_any()` accepts everything; `Caps::new_empty()` accepts nothing.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Caps {
    structures: SmallVec<[CapsStructure; 2]>,
    any: bool,
}

impl Caps {
    /// Caps with a single structure.
    pub fn new(structure: CapsStructure) -> Self {
        let mut structures = SmallVec::new();
        structures.push(structure);
        Self {
            structures,
            any: false,
        }
    }

    /// Caps from several structures, first preferred.
    pub fn many(structures: impl IntoIterator<Item = CapsStructure>) -> Self {
        Self {
            structures: structures.into_iter().collect(),
            any: false,
        }
    }

    /// Caps that match nothing.
    pub fn new_empty() -> Self {
        Self::default()
    }

    /// Caps that match anything.
    pub fn new_any() -> Self {
        Self {
            structures: SmallVec::new(),
            any: true,
        }
    }

    /// Is this "any format"?
    #[inline]
    pub fn is_any(&self) -> bool {
        self.any
    }

    /// Does this match nothing?
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.any && self.structures.is_empty()
    }

    /// Exactly one structure with every field fixed.
    pub fn is_fixed(&self) -> bool {
        !self.any && self.structures.len() == 1 && self.structures[0].is_fixed()
    }

    /// Number of structures.
    #[inline]
    pub fn len(&self) -> usize {
        self.structures.len()
    }

    /// Get the structures.
    #[inline]
    pub fn structures(&self) -> &[CapsStructure] {
        &self.structures
    }

    /// Mutable access to the structures.
    #[inline]
    pub fn structures_mut(&mut self) -> &mut [CapsStructure] {
        &mut self.structures
    }

    /// Append a structure.
    pub fn push(&mut self, structure: CapsStructure) {
        self.any = false;
        self.structures.push(structure);
    }

    /// Intersect, keeping the order of `self`.
    pub fn intersect(&self, other: &Caps) -> Caps {
        if self.any {
            return other.clone();
        }
        if other.any {
            return self.clone();
        }
        let mut out = Caps::new_empty();
        for a in &self.structures {
            for b in &other.structures {
                if let Some(s) = a.intersect(b) {
                    if !out.structures.contains(&s) {
                        out.structures.push(s);
                    }
                }
            }
        }
        out
    }

    /// Check if the two caps share at least one format.
    pub fn can_intersect(&self, other: &Caps) -> bool {
        !self.intersect(other).is_empty()
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.any {
            return f.write_str("ANY");
        }
        if self.structures.is_empty() {
            return f.write_str("EMPTY");
        }
        for (i, s) in self.structures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{s}")?;
        }
        Ok(())
    }
}

// ============================================================================
// VideoInfo
// ============================================================================

#[inline]
const fn round_up_2(v: usize) -> usize {
    (v + 1) & !1
}

#[inline]
const fn round_up_4(v: usize) -> usize {
    (v + 3) & !3
}

/// Layout of one negotiated raw video frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoInfo {
    /// Pixel format.
    pub format: PixelFormat,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Frame rate, `0/1` when variable.
    pub framerate: Framerate,
    /// Memory feature the frames live in.
    pub feature: MemoryFeature,
    /// Row stride of each plane in bytes.
    pub stride: [usize; 4],
    /// Offset of each plane in bytes.
    pub offset: [usize; 4],
    /// Total frame size in bytes.
    pub size: usize,
}

impl VideoInfo {
    /// Compute the layout for a format and size.
    pub fn new(format: PixelFormat, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::Negotiation(format!(
                "invalid frame dimensions {width}x{height}"
            )));
        }
        let w = width as usize;
        let h = height as usize;
        let mut stride = [0usize; 4];
        let mut offset = [0usize; 4];

        let size = match format {
            PixelFormat::I420 => {
                stride[0] = round_up_4(w);
                stride[1] = round_up_4(round_up_2(w) / 2);
                stride[2] = stride[1];
                offset[1] = stride[0] * round_up_2(h);
                offset[2] = offset[1] + stride[1] * (round_up_2(h) / 2);
                offset[2] + stride[2] * (round_up_2(h) / 2)
            }
            PixelFormat::Nv12 => {
                stride[0] = round_up_4(w);
                stride[1] = stride[0];
                offset[1] = stride[0] * round_up_2(h);
                offset[1] + stride[0] * round_up_2(h) / 2
            }
            PixelFormat::Rgba | PixelFormat::Bgra | PixelFormat::Rgbx | PixelFormat::Bgrx => {
                stride[0] = w * 4;
                stride[0] * h
            }
            PixelFormat::Rgb | PixelFormat::Bgr => {
                stride[0] = round_up_4(w * 3);
                stride[0] * h
            }
            PixelFormat::Gray8 => {
                stride[0] = round_up_4(w);
                stride[0] * h
            }
        };

        Ok(Self {
            format,
            width,
            height,
            framerate: Framerate::VARIABLE,
            feature: MemoryFeature::SystemMemory,
            stride,
            offset,
            size,
        })
    }

    /// Resolve fixed caps into a frame layout.
    pub fn from_caps(caps: &Caps) -> Result<Self> {
        if !caps.is_fixed() {
            return Err(Error::Negotiation(format!("caps are not fixed: {caps}")));
        }
        let s = &caps.structures()[0];
        if s.media_type != VIDEO_RAW {
            return Err(Error::Negotiation(format!(
                "unsupported media type {}",
                s.media_type
            )));
        }
        let (Some(&width), Some(&height), Some(&format), Some(&framerate)) = (
            s.width.as_fixed(),
            s.height.as_fixed(),
            s.format.as_fixed(),
            s.framerate.as_fixed(),
        ) else {
            return Err(Error::Negotiation(format!("caps are not fixed: {caps}")));
        };

        let mut info = Self::new(format, width, height)?;
        info.framerate = framerate;
        info.feature = s.feature;
        Ok(info)
    }
}
