//! Frames to on-disk words

use super::{AnalogFormat, CAMERA_COLUMN, Frame, FrameCodec, INVALID_POINT_WORD, RESIDUAL_COLUMN};
use crate::error::{C3dError, Result};

impl FrameCodec {
    /// Append one encoded frame to `out`
    pub fn encode(&self, frame: &Frame, out: &mut Vec<u8>) -> Result<()> {
        self.check_shape(frame)?;
        out.reserve(self.layout.frame_bytes());
        self.encode_points(frame, out);
        self.encode_analog(frame, out);
        Ok(())
    }

    fn check_shape(&self, frame: &Frame) -> Result<()> {
        let layout = &self.layout;
        if frame.points.len() != layout.point_used {
            return Err(C3dError::InvalidFrame(format!(
                "frame has {} points, layout expects {}",
                frame.points.len(),
                layout.point_used
            )));
        }
        if frame.analog.len() != layout.analog_used {
            return Err(C3dError::InvalidFrame(format!(
                "frame has {} analog channels, layout expects {}",
                frame.analog.len(),
                layout.analog_used
            )));
        }
        if let Some(channel) = frame
            .analog
            .iter()
            .position(|samples| samples.len() != layout.analog_per_frame)
        {
            return Err(C3dError::InvalidFrame(format!(
                "analog channel {channel} has {} samples, layout expects {}",
                frame.analog[channel].len(),
                layout.analog_per_frame
            )));
        }
        Ok(())
    }

    fn encode_points(&self, frame: &Frame, out: &mut Vec<u8>) {
        let layout = &self.layout;
        let processor = layout.processor;
        let scale = layout.abs_scale();

        for row in &frame.points {
            let packed = if row[RESIDUAL_COLUMN] < 0.0 {
                INVALID_POINT_WORD
            } else {
                let residual = (row[RESIDUAL_COLUMN] / scale).round().clamp(0.0, 255.0) as u16;
                let camera = (row[CAMERA_COLUMN] as u16) & 0x7F;
                (residual | (camera << 8)) as i16
            };

            if layout.is_float() {
                for &coord in &row[..3] {
                    out.extend_from_slice(&processor.f32_bytes(coord));
                }
                out.extend_from_slice(&processor.f32_bytes(f32::from(packed)));
            } else {
                for &coord in &row[..3] {
                    out.extend_from_slice(&processor.i16_bytes(to_i16(coord / scale)));
                }
                out.extend_from_slice(&processor.i16_bytes(packed));
            }
        }
    }

    fn encode_analog(&self, frame: &Frame, out: &mut Vec<u8>) {
        let layout = &self.layout;
        let processor = layout.processor;

        for s in 0..layout.analog_per_frame {
            for (c, samples) in frame.analog.iter().enumerate() {
                let scale = self.transform.scale(c);
                let offset = self.transform.offset(c);
                let raw = if scale == 0.0 {
                    offset
                } else {
                    samples[s] / scale + offset
                };

                match layout.analog_format {
                    AnalogFormat::Float => out.extend_from_slice(&processor.f32_bytes(raw)),
                    AnalogFormat::Signed => out.extend_from_slice(&processor.i16_bytes(to_i16(raw))),
                    AnalogFormat::Unsigned => {
                        let value = raw.round().clamp(0.0, f32::from(u16::MAX)) as u16;
                        out.extend_from_slice(&processor.u16_bytes(value));
                    }
                }
            }
        }
    }
}

fn to_i16(value: f32) -> i16 {
    value
        .round()
        .clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}
