//! Derived accessors shared by [`Reader`](crate::Reader) and [`Writer`](crate::Writer)
//!
//! Most values live in two places: a 16-bit header field and a parameter.
//! Parameters win when present since they are not limited to 16 bits.

use std::fmt;

use crate::U16_OVERFLOW;
use crate::error::{C3dError, Result};
use crate::frame::{AnalogFormat, AnalogTransform, FrameLayout};
use crate::header::Header;
use crate::metadata::{Group, GroupKey, MetadataStore, Param};

/// Widest analog sample this crate decodes in integer mode
const MAX_ANALOG_BITS: u16 = 16;

/// Non-fatal conditions found while reading
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// The file ended inside a frame; iteration stopped before it
    TruncatedFrame { frame_index: usize, position: u64 },
    /// At least one whole block was left unread after the last frame
    TrailingData { bytes: u64 },
    /// Header and parameter section disagree
    MetadataMismatch(String),
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::TruncatedFrame {
                frame_index,
                position,
            } => write!(
                f,
                "reached end of file while reading frame index {frame_index} at byte {position}"
            ),
            Diagnostic::TrailingData { bytes } => {
                write!(f, "{bytes} bytes remained after all data blocks were read")
            }
            Diagnostic::MetadataMismatch(details) => write!(f, "metadata mismatch: {details}"),
        }
    }
}

/// Accessors over a header plus parameter section
pub trait Manager {
    fn header(&self) -> &Header;

    fn metadata(&self) -> &MetadataStore;

    fn group<'a>(&self, key: impl Into<GroupKey<'a>>) -> Option<&Group> {
        self.metadata().group(key)
    }

    /// Parameter by `"GROUP:PARAM"` key
    fn param(&self, key: &str) -> Option<&Param> {
        self.metadata().param(key)
    }

    fn point_used(&self) -> usize {
        uint_param(self.param("POINT:USED")).map_or(self.header().point_count as usize, |v| v as usize)
    }

    fn point_rate(&self) -> f32 {
        float_param(self.param("POINT:RATE")).unwrap_or(self.header().frame_rate)
    }

    /// Negative values select 32-bit float frame storage
    fn point_scale(&self) -> f32 {
        float_param(self.param("POINT:SCALE")).unwrap_or(self.header().scale_factor)
    }

    fn analog_per_frame(&self) -> usize {
        self.header().analog_per_frame as usize
    }

    fn analog_used(&self) -> usize {
        if let Some(used) = uint_param(self.param("ANALOG:USED")) {
            return used as usize;
        }
        let header = self.header();
        match header.analog_per_frame {
            0 => 0,
            per_frame => (header.analog_count / per_frame) as usize,
        }
    }

    fn analog_rate(&self) -> f32 {
        float_param(self.param("ANALOG:RATE"))
            .unwrap_or(self.point_rate() * self.analog_per_frame() as f32)
    }

    /// Analog samples per channel over the whole file
    fn analog_sample_count(&self) -> usize {
        self.frame_count() * self.analog_per_frame()
    }

    /// First frame number, from TRIAL:ACTUAL_START_FIELD when set
    fn first_frame(&self) -> u32 {
        match trial_field(self.param("TRIAL:ACTUAL_START_FIELD")) {
            Some(frame) if frame > 0 => frame,
            _ => self.header().first_frame as u32,
        }
    }

    /// Last frame number
    ///
    /// The header field is trusted unless it overflowed 16 bits or precedes
    /// the first frame; then the largest of the header, TRIAL:ACTUAL_END_FIELD,
    /// POINT:LONG_FRAMES and POINT:FRAMES is used.
    fn last_frame(&self) -> u32 {
        let first = self.first_frame();
        let header_last = self.header().last_frame;
        if first <= header_last as u32 && header_last != U16_OVERFLOW {
            return header_last as u32;
        }

        let from_count = |count: u32| first.saturating_add(count).saturating_sub(1);
        let mut last = header_last as u32;
        if let Some(end) = trial_field(self.param("TRIAL:ACTUAL_END_FIELD")) {
            last = last.max(end);
        }
        if let Some(long) = float_param(self.param("POINT:LONG_FRAMES"))
            && long.is_finite()
            && long > 0.0
        {
            last = last.max(from_count(long as u32));
        }
        if let Some(frames) = uint_param(self.param("POINT:FRAMES")) {
            last = last.max(from_count(frames));
        }
        last
    }

    fn frame_count(&self) -> usize {
        let first = self.first_frame();
        let last = self.last_frame();
        if last < first {
            0
        } else {
            (last - first) as usize + 1
        }
    }

    fn point_labels(&self) -> Vec<String> {
        string_list(self.param("POINT:LABELS"))
    }

    fn analog_labels(&self) -> Vec<String> {
        string_list(self.param("ANALOG:LABELS"))
    }

    fn point_units(&self) -> Option<String> {
        self.param("POINT:UNITS")?.string_value().ok()
    }

    /// `(X_SCREEN, Y_SCREEN)` axis strings such as `("+X", "+Y")`
    fn screen_axis(&self) -> Option<(String, String)> {
        let x = self.param("POINT:X_SCREEN")?.string_value().ok()?;
        let y = self.param("POINT:Y_SCREEN")?.string_value().ok()?;
        Some((x, y))
    }

    /// Storage type of analog samples
    ///
    /// Float whenever points are floats, otherwise ANALOG:FORMAT decides.
    /// ANALOG:BITS above 16 cannot be decoded from 16-bit words.
    fn analog_format(&self) -> Result<AnalogFormat> {
        if self.point_scale() < 0.0 {
            return Ok(AnalogFormat::Float);
        }
        if let Some(bits) = uint_param(self.param("ANALOG:BITS"))
            && bits > MAX_ANALOG_BITS as u32
        {
            return Err(C3dError::AnalogBitWidthUnsupported(
                u16::try_from(bits).unwrap_or(u16::MAX),
            ));
        }

        let unsigned = self
            .param("ANALOG:FORMAT")
            .and_then(|p| p.string_value().ok())
            .is_some_and(|f| f.trim().eq_ignore_ascii_case("UNSIGNED"));
        Ok(if unsigned {
            AnalogFormat::Unsigned
        } else {
            AnalogFormat::Signed
        })
    }

    /// `(ANALOG:GEN_SCALE, ANALOG:SCALE, ANALOG:OFFSET)` as stored
    fn analog_transform_parameters(&self) -> (f32, Vec<f32>, Vec<f32>) {
        let gen_scale = float_param(self.param("ANALOG:GEN_SCALE")).unwrap_or(1.0);
        let scales = float_list(self.param("ANALOG:SCALE"), false);
        let unsigned = matches!(self.analog_format(), Ok(AnalogFormat::Unsigned));
        let offsets = float_list(self.param("ANALOG:OFFSET"), unsigned);
        (gen_scale, scales, offsets)
    }

    /// Per-channel scale (general scale folded in) and offset
    fn analog_transform(&self) -> AnalogTransform {
        let (gen_scale, scales, offsets) = self.analog_transform_parameters();
        let channels = self.analog_used();
        AnalogTransform::new(
            (0..channels)
                .map(|c| gen_scale * scales.get(c).copied().unwrap_or(1.0))
                .collect(),
            (0..channels)
                .map(|c| offsets.get(c).copied().unwrap_or(0.0))
                .collect(),
        )
    }

    fn frame_layout(&self) -> Result<FrameLayout> {
        Ok(FrameLayout {
            point_used: self.point_used(),
            analog_used: self.analog_used(),
            analog_per_frame: self.analog_per_frame(),
            point_scale: self.point_scale(),
            analog_format: self.analog_format()?,
            processor: self.metadata().processor(),
        })
    }

    /// Compare header fields against their parameter counterparts
    fn check_metadata(&self) -> Vec<Diagnostic> {
        let header = self.header();
        let mut found = Vec::new();
        let mut mismatch = |what: &str, header_value: String, param_value: String| {
            found.push(Diagnostic::MetadataMismatch(format!(
                "header {what} is {header_value}, parameter is {param_value}"
            )));
        };

        if let Some(used) = uint_param(self.param("POINT:USED"))
            && used != header.point_count as u32
        {
            mismatch("point count", header.point_count.to_string(), used.to_string());
        }
        if let Some(rate) = float_param(self.param("POINT:RATE"))
            && rate != header.frame_rate
        {
            mismatch("frame rate", header.frame_rate.to_string(), rate.to_string());
        }
        if let Some(scale) = float_param(self.param("POINT:SCALE"))
            && scale != header.scale_factor
        {
            mismatch("point scale", header.scale_factor.to_string(), scale.to_string());
        }
        if let Some(start) = uint_param(self.param("POINT:DATA_START"))
            && start != header.data_block as u32
        {
            mismatch("data block", header.data_block.to_string(), start.to_string());
        }
        if let Some(used) = uint_param(self.param("ANALOG:USED")) {
            let expected = used as usize * header.analog_per_frame as usize;
            if expected != header.analog_count as usize {
                mismatch(
                    "analog count",
                    header.analog_count.to_string(),
                    format!("{used} channels x {} samples", header.analog_per_frame),
                );
            }
        }

        found
    }
}

/// Non-negative integer from a 1, 2 or 4 byte numeric parameter
fn uint_param(param: Option<&Param>) -> Option<u32> {
    let param = param?;
    match param.bytes_per_element() {
        1 => param.uint8_value().ok().map(u32::from),
        2 => param.uint16_value().ok().map(u32::from),
        4 => param
            .float_value()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v as u32),
        _ => None,
    }
}

/// Float from a 1, 2 or 4 byte numeric parameter
fn float_param(param: Option<&Param>) -> Option<f32> {
    let param = param?;
    match param.bytes_per_element() {
        1 => param.int8_value().ok().map(f32::from),
        2 => param.int16_value().ok().map(f32::from),
        4 => param.float_value().ok(),
        _ => None,
    }
}

fn float_list(param: Option<&Param>, unsigned: bool) -> Vec<f32> {
    let Some(param) = param else {
        return Vec::new();
    };
    let values = match param.bytes_per_element() {
        2 if unsigned => param
            .uint16_array()
            .map(|v| v.into_iter().map(f32::from).collect()),
        2 => param
            .int16_array()
            .map(|v| v.into_iter().map(f32::from).collect()),
        4 => param.float_array(),
        _ => return Vec::new(),
    };
    values.unwrap_or_default()
}

fn string_list(param: Option<&Param>) -> Vec<String> {
    param
        .and_then(|p| p.string_array().ok())
        .unwrap_or_default()
}

/// Two 16-bit words holding a 32-bit frame number, low word first
fn trial_field(param: Option<&Param>) -> Option<u32> {
    let words = param?.uint16_array().ok()?;
    match words.as_slice() {
        [lo, hi, ..] => Some(u32::from(*lo) | (u32::from(*hi) << 16)),
        [lo] => Some(u32::from(*lo)),
        [] => None,
    }
}
