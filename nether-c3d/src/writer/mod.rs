//! Writing C3D files
//!
//! A [`Writer`] buffers frames in memory. [`Writer::write`] derives the
//! frame-dependent header fields and parameters, then emits the header
//! block, the parameter section and the data section, each padded to 512
//! bytes. Files are always written in the Intel profile.

mod convert;
mod sync;


use std::fmt;
use std::io::Write;
use std::str::FromStr;

use crate::BLOCK_SIZE;
use crate::error::{C3dError, Result};
use crate::frame::{AnalogFormat, Frame, FrameCodec, ReadOptions};
use crate::header::{Event, Header};
use crate::manager::Manager;
use crate::metadata::{Group, GroupKey, MetadataStore};
use crate::processor::Processor;

/// How [`Writer::from_source`] takes over a reader's contents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversionMode {
    /// Move header and parameters out of the reader and copy all frames
    #[default]
    Consume,
    /// Deep copy header, parameters and frames
    Copy,
    /// Deep copy header and parameters, no frames
    CopyMetadata,
    /// Copy the header and a minimal parameter set, plus all frames
    ShallowCopy,
    /// Like `ShallowCopy` without frames
    CopyHeader,
}

impl ConversionMode {
    pub fn name(self) -> &'static str {
        match self {
            ConversionMode::Consume => "consume",
            ConversionMode::Copy => "copy",
            ConversionMode::CopyMetadata => "copy_metadata",
            ConversionMode::ShallowCopy => "shallow_copy",
            ConversionMode::CopyHeader => "copy_header",
        }
    }

    /// Whether frames are transferred along with the metadata
    pub fn copies_frames(self) -> bool {
        matches!(
            self,
            ConversionMode::Consume | ConversionMode::Copy | ConversionMode::ShallowCopy
        )
    }

    /// Only the shallow modes rebuild parameters, so only they accept
    /// non-Intel sources
    pub fn supports(self, processor: Processor) -> bool {
        processor == Processor::Intel
            || matches!(self, ConversionMode::ShallowCopy | ConversionMode::CopyHeader)
    }
}

impl fmt::Display for ConversionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConversionMode {
    type Err = C3dError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "consume" => Ok(ConversionMode::Consume),
            "copy" => Ok(ConversionMode::Copy),
            "copy_metadata" => Ok(ConversionMode::CopyMetadata),
            "shallow_copy" => Ok(ConversionMode::ShallowCopy),
            "copy_header" => Ok(ConversionMode::CopyHeader),
            other => Err(C3dError::invalid_value(format!(
                "unknown conversion mode '{other}'"
            ))),
        }
    }
}

/// Settings for a fresh [`Writer`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriterConfig {
    /// Point frames per second
    pub point_rate: f32,
    /// Analog samples per second, a whole multiple of `point_rate`
    pub analog_rate: f32,
    /// Negative for float storage; the magnitude scales integer samples
    pub point_scale: f32,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            point_rate: 480.0,
            analog_rate: 0.0,
            point_scale: -1.0,
        }
    }
}

/// Builds a C3D file from buffered frames
#[derive(Debug, Clone)]
pub struct Writer {
    header: Header,
    metadata: MetadataStore,
    frames: Vec<Frame>,
}

impl Default for Writer {
    fn default() -> Self {
        Self {
            header: Header {
                frame_rate: 480.0,
                ..Header::default()
            },
            metadata: MetadataStore::new(Processor::Intel),
            frames: Vec::new(),
        }
    }
}

impl Writer {
    pub fn new(config: WriterConfig) -> Result<Self> {
        let mut writer = Self::default();
        writer.header.frame_rate = config.point_rate;
        writer.header.scale_factor = config.point_scale;
        writer.set_analog_rate(config.analog_rate)?;
        Ok(writer)
    }

    pub(crate) fn from_parts(header: Header, metadata: MetadataStore) -> Self {
        Self {
            header,
            metadata,
            frames: Vec::new(),
        }
    }

    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    // ========== Frames ==========

    pub fn add_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn add_frames(&mut self, frames: impl IntoIterator<Item = Frame>) {
        self.frames.extend(frames);
    }

    /// Insert before the frame at `index` (0-based, clamped to the buffer)
    pub fn insert_frames(&mut self, index: usize, frames: impl IntoIterator<Item = Frame>) {
        let index = index.min(self.frames.len());
        self.frames.splice(index..index, frames);
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Number of buffered frames
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    // ========== Groups ==========

    pub fn group_mut<'a>(&mut self, key: impl Into<GroupKey<'a>>) -> Option<&mut Group> {
        self.metadata.group_mut(key)
    }

    pub fn add_group(&mut self, id: u8, name: &str, desc: &str) -> Result<&mut Group> {
        self.metadata.add_group(id, name, desc)
    }

    pub fn rename_group<'a>(&mut self, key: impl Into<GroupKey<'a>>, new_name: &str) -> Result<()> {
        self.metadata.rename_group(key, new_name)
    }

    pub fn remove_group<'a>(&mut self, key: impl Into<GroupKey<'a>>) -> Option<Group> {
        self.metadata.remove_group(key)
    }

    /// Existing group, or a new one described as "`NAME` group"
    pub fn get_or_create_group(&mut self, name: &str) -> Result<&mut Group> {
        if !self.metadata.contains_group(name) {
            let id = self.metadata.next_group_id()?;
            let name = name.trim().to_ascii_uppercase();
            return self.metadata.add_group(id, &name, &format!("{name} group"));
        }
        self.metadata.get_or_create_group(name)
    }

    pub fn point_group(&mut self) -> Result<&mut Group> {
        self.get_or_create_group("POINT")
    }

    pub fn analog_group(&mut self) -> Result<&mut Group> {
        self.get_or_create_group("ANALOG")
    }

    pub fn trial_group(&mut self) -> Result<&mut Group> {
        self.get_or_create_group("TRIAL")
    }

    // ========== Parameters ==========

    /// Analog rate in samples per second, a whole multiple of the point rate
    pub fn set_analog_rate(&mut self, rate: f32) -> Result<()> {
        let point_rate = self.point_rate();
        let per_frame = if rate == 0.0 {
            0.0
        } else if point_rate > 0.0 {
            rate / point_rate
        } else {
            f32::NAN
        };
        if !per_frame.is_finite()
            || per_frame < 0.0
            || per_frame.fract() != 0.0
            || per_frame > f32::from(u16::MAX)
        {
            return Err(C3dError::invalid_value(format!(
                "analog rate {rate} is not a multiple of the point rate {point_rate}"
            )));
        }

        self.header.analog_per_frame = per_frame as u16;
        if let Some(group) = self.metadata.group_mut("ANALOG")
            && group.contains("RATE")
        {
            group.set("RATE", "Analog samples per second", rate)?;
        }
        Ok(())
    }

    pub fn set_point_labels<S: AsRef<str>>(&mut self, labels: &[S]) -> Result<()> {
        self.point_group()?.set_str_array("LABELS", "Point labels.", labels)
    }

    pub fn set_analog_labels<S: AsRef<str>>(&mut self, labels: &[S]) -> Result<()> {
        self.analog_group()?.set_str_array("LABELS", "Analog labels.", labels)
    }

    /// ANALOG:GEN_SCALE, applied to every channel
    pub fn set_analog_general_scale(&mut self, value: f32) -> Result<()> {
        self.analog_group()?
            .set("GEN_SCALE", "Analog general scale factor", value)
    }

    /// ANALOG:SCALE per channel; `None` stores an empty array
    pub fn set_analog_scales(&mut self, values: Option<&[f32]>) -> Result<()> {
        let group = self.analog_group()?;
        match values {
            Some(values) => group.set_array("SCALE", "Analog channel scale factors", values),
            None => group.set_empty_array("SCALE", "Analog channel scale factors", 4),
        }
    }

    /// ANALOG:OFFSET per channel; `None` stores an empty array
    pub fn set_analog_offsets(&mut self, values: Option<&[i16]>) -> Result<()> {
        let group = self.analog_group()?;
        match values {
            Some(values) => group.set_array("OFFSET", "Analog channel offsets", values),
            None => group.set_empty_array("OFFSET", "Analog channel offsets", 2),
        }
    }

    /// ANALOG:FORMAT for integer files
    ///
    /// Float storage follows the point scale, so [`AnalogFormat::Float`]
    /// removes the parameter.
    pub fn set_analog_format(&mut self, format: AnalogFormat) -> Result<()> {
        let group = self.analog_group()?;
        match format {
            AnalogFormat::Float => {
                group.remove_param("FORMAT");
                Ok(())
            }
            format => group.set_str("FORMAT", "Analog sample format", &format.to_string()),
        }
    }

    /// ANALOG:OFFSET per channel for [`AnalogFormat::Unsigned`] data
    pub fn set_analog_unsigned_offsets(&mut self, values: &[u16]) -> Result<()> {
        self.analog_group()?
            .set_array("OFFSET", "Analog channel offsets", values)
    }

    /// TRIAL:ACTUAL_START_FIELD plus the (16-bit clamped) header field
    pub fn set_start_frame(&mut self, frame: u32) -> Result<()> {
        self.trial_group()?
            .set_array("ACTUAL_START_FIELD", "Actual start frame", &split_frame(frame))?;
        self.header.first_frame = clamp_u16(frame);
        Ok(())
    }

    pub(crate) fn set_last_frame(&mut self, frame: u32) -> Result<()> {
        self.trial_group()?
            .set_array("ACTUAL_END_FIELD", "Actual end frame", &split_frame(frame))?;
        self.header.last_frame = clamp_u16(frame);
        Ok(())
    }

    /// POINT:X_SCREEN and POINT:Y_SCREEN, e.g. `("+X", "+Y")`
    pub fn set_screen_axis(&mut self, x: &str, y: &str) -> Result<()> {
        check_axis(x, "X_SCREEN")?;
        check_axis(y, "Y_SCREEN")?;
        let group = self.point_group()?;
        group.set_str("X_SCREEN", "X_SCREEN parameter", x)?;
        group.set_str("Y_SCREEN", "Y_SCREEN parameter", y)
    }

    pub fn set_events(&mut self, events: Vec<Event>) -> Result<()> {
        self.header.set_events(events)
    }

    // ========== Output ==========

    /// Serialize the whole file and write it to `out`
    pub fn write<W: Write>(&mut self, mut out: W) -> Result<()> {
        let bytes = self.to_bytes()?;
        out.write_all(&bytes)?;
        out.flush()?;
        Ok(())
    }

    /// Serialize the whole file
    ///
    /// Header and parameters are synchronized on a scratch copy and only
    /// committed once serialization succeeded.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        if self.frames.is_empty() {
            return Err(C3dError::EmptyWrite);
        }

        let mut scratch = Self::from_parts(self.header.clone(), self.metadata.clone());
        scratch.synchronize(&self.frames)?;
        let bytes = scratch.serialize(&self.frames)?;

        self.header = scratch.header;
        self.metadata = scratch.metadata;
        Ok(bytes)
    }

    fn serialize(&self, frames: &[Frame]) -> Result<Vec<u8>> {
        let mut out = self.header.serialize()?;
        out.extend_from_slice(&self.metadata.serialize()?);

        let data_start = (self.header.data_block as usize).saturating_sub(1) * BLOCK_SIZE;
        if out.len() != data_start {
            return Err(C3dError::metadata(format!(
                "data section would start at byte {}, header says {data_start}",
                out.len()
            )));
        }

        let layout = self.frame_layout()?;
        let codec = FrameCodec::new(layout, self.analog_transform(), ReadOptions::default());
        out.reserve(layout.frame_bytes() * frames.len() + BLOCK_SIZE);
        for frame in frames {
            codec.encode(frame, &mut out)?;
        }
        out.resize(out.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE, 0);

        log::debug!(
            "Serialized {} frames into {} bytes ({} parameter blocks)",
            frames.len(),
            out.len(),
            self.metadata.parameter_blocks()
        );
        Ok(out)
    }
}

impl Manager for Writer {
    fn header(&self) -> &Header {
        &self.header
    }

    fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }
}

/// Low word first
fn split_frame(frame: u32) -> [u16; 2] {
    [(frame & 0xFFFF) as u16, (frame >> 16) as u16]
}

fn clamp_u16(value: u32) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

fn check_axis(axis: &str, name: &str) -> Result<()> {
    let bytes = axis.as_bytes();
    let valid = bytes.len() == 2
        && matches!(bytes[0], b'+' | b'-')
        && matches!(bytes[1].to_ascii_uppercase(), b'X' | b'Y' | b'Z');
    if !valid {
        return Err(C3dError::invalid_value(format!(
            "{name} must be a sign followed by an axis, e.g. '+X', got '{axis}'"
        )));
    }
    Ok(())
}
