//! Buffer metadata carried alongside pixel data.
//!
//! Everything here is non-pixel information: timing, stream offsets, flags
//! and free-form extra fields. The transform element copies it from each
//! input buffer onto the matching output buffer.

use std::time::Duration;

/// Flags indicating buffer properties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferFlags {
    /// Buffer is a point where decoding can start.
    pub sync_point: bool,
    /// Buffer follows a discontinuity in the stream.
    pub discont: bool,
    /// Buffer should be decoded but not displayed.
    pub decode_only: bool,
    /// Buffer is corrupted or incomplete.
    pub corrupted: bool,
    /// Buffer marks a gap in the stream.
    pub gap: bool,
}

/// Possible values for extra metadata fields.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    /// String value.
    String(String),
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Boolean value.
    Bool(bool),
}

/// A key-value pair for extra metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtraField {
    /// Field name.
    pub key: String,
    /// Field value.
    pub value: MetadataValue,
}

/// Metadata associated with a buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    /// Presentation timestamp.
    pub pts: Option<Duration>,
    /// Decode timestamp.
    pub dts: Option<Duration>,
    /// Duration of this buffer's content.
    pub duration: Option<Duration>,
    /// Media-specific offset (frame number for video).
    pub offset: Option<u64>,
    /// Media-specific end offset.
    pub offset_end: Option<u64>,
    /// Buffer flags.
    pub flags: BufferFlags,
    /// Extra key-value fields.
    pub extra: Vec<ExtraField>,
}

impl Metadata {
    /// Create new metadata with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the presentation timestamp.
    pub fn with_pts(mut self, pts: Duration) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Set the duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Set the frame offset.
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self.offset_end = offset.checked_add(1);
        self
    }

    /// Add an extra field.
    pub fn with_extra(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.set_extra(key, value);
        self
    }

    /// Insert or replace an extra field.
    pub fn set_extra(&mut self, key: impl Into<String>, value: MetadataValue) {
        let key = key.into();
        match self.extra.iter_mut().find(|f| f.key == key) {
            Some(field) => field.value = value,
            None => self.extra.push(ExtraField { key, value }),
        }
    }

    /// Get an extra field by key.
    pub fn get_extra(&self, key: &str) -> Option<&MetadataValue> {
        self.extra.iter().find(|f| f.key == key).map(|f| &f.value)
    }

    /// Overwrite timing, offsets and flags from `src` and merge its extra fields.
    pub fn copy_from(&mut self, src: &Metadata) {
        self.pts = src.pts;
        self.dts = src.dts;
        self.duration = src.duration;
        self.offset = src.offset;
        self.offset_end = src.offset_end;
        self.flags = src.flags;
        for field in &src.extra {
            self.set_extra(field.key.clone(), field.value.clone());
        }
    }
}
