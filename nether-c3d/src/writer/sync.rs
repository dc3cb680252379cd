//! Deriving header fields and parameters from the buffered frames

use super::{Writer, clamp_u16};
use crate::error::{C3dError, Result};
use crate::frame::Frame;
use crate::manager::Manager;

/// POINT:FRAMES saturates here; POINT:LONG_FRAMES takes over above it
const MAX_SHORT_FRAMES: usize = u16::MAX as usize;

/// Parameter section starts right after the header block
const PARAMETER_BLOCK: u8 = 2;

impl Writer {
    /// Bring header and parameters in line with `frames`
    pub(super) fn synchronize(&mut self, frames: &[Frame]) -> Result<()> {
        let Some(first) = frames.first() else {
            return Err(C3dError::EmptyWrite);
        };
        let point_used = first.point_count();
        let analog_used = first.analog_channels();
        let samples = first.analog_samples();

        if analog_used > 0 && self.header.analog_per_frame == 0 {
            self.header.analog_per_frame = to_u16(samples, "analog samples per frame")?;
        }
        if analog_used > 0 && samples != self.analog_per_frame() {
            return Err(C3dError::InvalidFrame(format!(
                "frames carry {samples} analog samples per channel, the analog rate implies {}",
                self.analog_per_frame()
            )));
        }

        let first_frame = self.first_frame().max(1);
        let count = frames.len();
        let last_frame = (first_frame as u64 + count as u64 - 1).min(u32::MAX as u64) as u32;
        let point_scale = self.point_scale();
        let point_rate = self.point_rate();
        let analog_rate = self.analog_rate();

        // ========== POINT ==========
        let group = self.point_group()?;
        group.set("USED", "Number of point samples", to_u16(point_used, "point count")?)?;
        group.set(
            "FRAMES",
            "Total frame count",
            count.min(MAX_SHORT_FRAMES) as u16,
        )?;
        if count > MAX_SHORT_FRAMES {
            group.set("LONG_FRAMES", "Total frame count", count as f32)?;
        } else {
            group.remove_param("LONG_FRAMES");
        }
        group.set("DATA_START", "First data block containing frame samples.", 0u16)?;
        group.set("SCALE", "Point data scaling factor", point_scale)?;
        group.set("RATE", "Point data sample rate", point_rate)?;
        if !group.contains("UNITS") {
            group.set_str("UNITS", "Units used for point data measurements.", "mm")?;
        }
        if !group.contains("DESCRIPTIONS") {
            group.set_str_array("DESCRIPTIONS", "Channel descriptions.", &vec![" "; point_used])?;
        }

        // ========== ANALOG ==========
        let group = self.analog_group()?;
        group.set("USED", "Analog channel count", to_u16(analog_used, "analog channel count")?)?;
        group.set("RATE", "Analog samples per second", analog_rate)?;
        let has_gen_scale = group.contains("GEN_SCALE");
        let has_scale = group.contains("SCALE");
        let has_offset = group.contains("OFFSET");
        if !group.contains("DESCRIPTIONS") {
            group.set_str_array("DESCRIPTIONS", "Channel descriptions.", &vec![" "; analog_used])?;
        }
        if !has_gen_scale {
            self.set_analog_general_scale(1.0)?;
        }
        if !has_scale {
            self.set_analog_scales(None)?;
        }
        if !has_offset {
            self.set_analog_offsets(None)?;
        }

        // ========== TRIAL ==========
        self.set_start_frame(first_frame)?;
        self.set_last_frame(last_frame)?;

        // ========== Header ==========
        let data_block = self.metadata.parameter_blocks() + PARAMETER_BLOCK as usize;
        let data_block = to_u16(data_block, "data block")?;
        self.point_group()?
            .set("DATA_START", "First data block containing frame samples.", data_block)?;

        self.header.parameter_block = PARAMETER_BLOCK;
        self.header.data_block = data_block;
        self.header.point_count = to_u16(point_used, "point count")?;
        self.header.analog_count = to_u16(analog_used * samples, "analog samples per frame")?;
        self.header.scale_factor = point_scale;
        self.header.frame_rate = point_rate;

        log::debug!(
            "Synchronized {count} frames: {point_used} points, {analog_used} analog channels, frames {first_frame}..={last_frame}"
        );
        Ok(())
    }
}

fn to_u16(value: usize, what: &str) -> Result<u16> {
    let clamped = clamp_u16(u32::try_from(value).unwrap_or(u32::MAX));
    if clamped as usize != value {
        return Err(C3dError::invalid_value(format!(
            "{what} {value} does not fit in 16 bits"
        )));
    }
    Ok(clamped)
}
