//! Building a writer from an opened reader

use std::io::{Read, Seek};

use super::{ConversionMode, Writer};
use crate::error::{C3dError, Result};
use crate::frame::{AnalogFormat, Frame, ReadOptions};
use crate::manager::Manager;
use crate::metadata::MetadataStore;
use crate::processor::Processor;
use crate::reader::Reader;

impl Writer {
    /// Build a writer from `reader` according to `mode`
    ///
    /// Parameters of DEC and MIPS files cannot be reused as Intel bytes, so
    /// those sources only accept the shallow modes. All checks and frame
    /// reads happen before the reader is touched; with
    /// [`ConversionMode::Consume`] the reader refuses further frame reads.
    pub fn from_source<R: Read + Seek>(reader: &mut Reader<R>, mode: ConversionMode) -> Result<Self> {
        if reader.is_consumed() {
            return Err(C3dError::SourceConsumed);
        }
        let processor = reader.processor();
        if !mode.supports(processor) {
            return Err(C3dError::UnsupportedConversion { processor, mode });
        }

        let frames = if mode.copies_frames() {
            read_all_frames(reader)?
        } else {
            Vec::new()
        };

        let mut writer = match mode {
            ConversionMode::Consume => {
                let (header, metadata) = reader.take_contents()?;
                Self::from_parts(header, metadata)
            }
            ConversionMode::Copy | ConversionMode::CopyMetadata => {
                Self::from_parts(reader.header().clone(), reader.metadata().clone())
            }
            ConversionMode::ShallowCopy | ConversionMode::CopyHeader => shallow_copy(reader)?,
        };
        writer.frames = frames;

        log::debug!(
            "Converted {processor} reader with mode {mode}: {} frames",
            writer.frames.len()
        );
        Ok(writer)
    }
}

fn read_all_frames<R: Read + Seek>(reader: &mut Reader<R>) -> Result<Vec<Frame>> {
    let options = ReadOptions {
        check_nan: true,
        camera_sum: false,
    };
    reader
        .frames_with(options)?
        .map(|frame| frame.map(|(_, frame)| frame))
        .collect()
}

/// Header plus start frame, labels, analog format and scaling, re-encoded as Intel
fn shallow_copy<R>(reader: &Reader<R>) -> Result<Writer> {
    let mut header = reader.header().clone();
    let events = std::mem::take(&mut header.events);
    header.set_events(events)?;

    let mut writer = Writer::from_parts(header, MetadataStore::new(Processor::Intel));
    writer.set_start_frame(reader.first_frame())?;

    let point_labels = reader.point_labels();
    if !point_labels.is_empty() {
        writer.set_point_labels(&point_labels)?;
    }
    let analog_labels = reader.analog_labels();
    if !analog_labels.is_empty() {
        writer.set_analog_labels(&analog_labels)?;
    }

    let format = reader.analog_format().unwrap_or_default();
    writer.set_analog_format(format)?;

    let (gen_scale, scales, offsets) = reader.analog_transform_parameters();
    writer.set_analog_general_scale(gen_scale)?;
    writer.set_analog_scales(Some(&scales))?;
    if format == AnalogFormat::Unsigned {
        let offsets: Vec<u16> = offsets
            .iter()
            .map(|&o| o.round().clamp(0.0, f32::from(u16::MAX)) as u16)
            .collect();
        writer.set_analog_unsigned_offsets(&offsets)?;
    } else {
        let offsets: Vec<i16> = offsets
            .iter()
            .map(|&o| o.round().clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16)
            .collect();
        writer.set_analog_offsets(Some(&offsets))?;
    }

    Ok(writer)
}
