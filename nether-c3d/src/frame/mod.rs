//! Frame data: per-frame point and analog samples
//!
//! A frame on disk is `4 * point_used` point words followed by
//! `analog_used * analog_per_frame` analog words. Words are 16-bit integers
//! when the point scale is positive and 32-bit floats when it is negative.

mod decode;
mod encode;


use std::fmt;

use crate::processor::Processor;

/// Packed fourth word of an invalid point
pub const INVALID_POINT_WORD: i16 = i16::MIN;

/// Columns of a decoded point row
pub const POINT_COLUMNS: usize = 5;

/// Column holding the residual, `-1` marks an invalid sample
pub const RESIDUAL_COLUMN: usize = 3;

/// Column holding the camera mask (or its popcount)
pub const CAMERA_COLUMN: usize = 4;

/// One decoded frame
///
/// `points` has one `[x, y, z, residual, camera]` row per point.
/// `analog` is channel-major: `analog[channel][sample]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub points: Vec<[f32; POINT_COLUMNS]>,
    pub analog: Vec<Vec<f32>>,
}

impl Frame {
    /// Zero-filled frame of the given shape
    pub fn new(point_count: usize, analog_channels: usize, analog_samples: usize) -> Self {
        Self {
            points: vec![[0.0; POINT_COLUMNS]; point_count],
            analog: vec![vec![0.0; analog_samples]; analog_channels],
        }
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn analog_channels(&self) -> usize {
        self.analog.len()
    }

    /// Samples per channel (0 without analog data)
    pub fn analog_samples(&self) -> usize {
        self.analog.first().map_or(0, Vec::len)
    }

    /// Whether point `index` carries a valid sample
    pub fn is_point_valid(&self, index: usize) -> bool {
        self.points
            .get(index)
            .is_some_and(|p| p[RESIDUAL_COLUMN] >= 0.0)
    }
}

/// Storage type of analog samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalogFormat {
    #[default]
    Signed,
    Unsigned,
    /// 32-bit floats, used whenever points are stored as floats
    Float,
}

impl AnalogFormat {
    pub fn word_size(self) -> usize {
        match self {
            AnalogFormat::Float => 4,
            _ => 2,
        }
    }
}

impl fmt::Display for AnalogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalogFormat::Signed => write!(f, "SIGNED"),
            AnalogFormat::Unsigned => write!(f, "UNSIGNED"),
            AnalogFormat::Float => write!(f, "FLOAT"),
        }
    }
}

/// Per-channel `value = (raw - offset) * scale`
///
/// Missing entries default to scale 1 and offset 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalogTransform {
    pub scales: Vec<f32>,
    pub offsets: Vec<f32>,
}

impl AnalogTransform {
    pub fn new(scales: Vec<f32>, offsets: Vec<f32>) -> Self {
        Self { scales, offsets }
    }

    pub fn scale(&self, channel: usize) -> f32 {
        self.scales.get(channel).copied().unwrap_or(1.0)
    }

    pub fn offset(&self, channel: usize) -> f32 {
        self.offsets.get(channel).copied().unwrap_or(0.0)
    }
}

/// Decoding switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Treat points with non-finite float words as invalid
    pub check_nan: bool,
    /// Report the number of contributing cameras instead of the bit mask
    pub camera_sum: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            check_nan: true,
            camera_sum: false,
        }
    }
}

/// Shape and encoding of one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameLayout {
    pub point_used: usize,
    pub analog_used: usize,
    pub analog_per_frame: usize,
    pub point_scale: f32,
    pub analog_format: AnalogFormat,
    pub processor: Processor,
}

impl FrameLayout {
    /// Negative scale selects 32-bit float storage
    pub fn is_float(&self) -> bool {
        self.point_scale < 0.0
    }

    pub fn point_word_size(&self) -> usize {
        if self.is_float() { 4 } else { 2 }
    }

    /// Coordinate multiplier; a zero scale is treated as 1
    pub fn abs_scale(&self) -> f32 {
        let scale = self.point_scale.abs();
        if scale == 0.0 { 1.0 } else { scale }
    }

    pub fn point_bytes(&self) -> usize {
        4 * self.point_used * self.point_word_size()
    }

    pub fn analog_words(&self) -> usize {
        self.analog_used * self.analog_per_frame
    }

    pub fn analog_bytes(&self) -> usize {
        self.analog_words() * self.analog_format.word_size()
    }

    /// Bytes per frame on disk
    pub fn frame_bytes(&self) -> usize {
        self.point_bytes() + self.analog_bytes()
    }
}

/// Converts frames between their on-disk words and [`Frame`] values
#[derive(Debug, Clone)]
pub struct FrameCodec {
    layout: FrameLayout,
    transform: AnalogTransform,
    options: ReadOptions,
}

impl FrameCodec {
    pub fn new(layout: FrameLayout, transform: AnalogTransform, options: ReadOptions) -> Self {
        Self {
            layout,
            transform,
            options,
        }
    }

    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    pub fn transform(&self) -> &AnalogTransform {
        &self.transform
    }

    pub fn options(&self) -> ReadOptions {
        self.options
    }
}
