//! On-disk words to frames

use super::{
    AnalogFormat, CAMERA_COLUMN, Frame, FrameCodec, POINT_COLUMNS, RESIDUAL_COLUMN,
};
use crate::error::{C3dError, Result};

impl FrameCodec {
    /// Decode exactly one frame's bytes
    pub fn decode(&self, bytes: &[u8]) -> Result<Frame> {
        let layout = &self.layout;
        if bytes.len() != layout.frame_bytes() {
            return Err(C3dError::InvalidFrame(format!(
                "expected {} bytes per frame, got {}",
                layout.frame_bytes(),
                bytes.len()
            )));
        }
        let (point_bytes, analog_bytes) = bytes.split_at(layout.point_bytes());

        Ok(Frame {
            points: self.decode_points(point_bytes),
            analog: self.decode_analog(analog_bytes),
        })
    }

    fn decode_points(&self, bytes: &[u8]) -> Vec<[f32; POINT_COLUMNS]> {
        let layout = &self.layout;
        let processor = layout.processor;
        let scale = layout.abs_scale();

        // Integer words carry the packed residual/camera word exactly
        let words: Vec<f32> = if layout.is_float() {
            let mut words = Vec::with_capacity(bytes.len() / 4);
            processor.decode_f32_slice(bytes, &mut words);
            words
        } else {
            let mut words = Vec::with_capacity(bytes.len() / 2);
            processor.decode_i16_slice(bytes, &mut words);
            words.into_iter().map(f32::from).collect()
        };

        words
            .chunks_exact(4)
            .map(|w| {
                let packed = w[3] as i32;
                let non_finite = self.options.check_nan && w.iter().any(|v| !v.is_finite());
                if packed < 0 || non_finite {
                    let mut row = [0.0; POINT_COLUMNS];
                    row[RESIDUAL_COLUMN] = -1.0;
                    return row;
                }

                let (x, y, z) = if layout.is_float() {
                    (w[0], w[1], w[2])
                } else {
                    (w[0] * scale, w[1] * scale, w[2] * scale)
                };
                let mask = (packed & 0x7F00) >> 8;
                let camera = if self.options.camera_sum {
                    mask.count_ones() as f32
                } else {
                    mask as f32
                };

                let mut row = [0.0; POINT_COLUMNS];
                row[0] = x;
                row[1] = y;
                row[2] = z;
                row[RESIDUAL_COLUMN] = (packed & 0xFF) as f32 * scale;
                row[CAMERA_COLUMN] = camera;
                row
            })
            .collect()
    }

    fn decode_analog(&self, bytes: &[u8]) -> Vec<Vec<f32>> {
        let layout = &self.layout;
        let processor = layout.processor;
        let channels = layout.analog_used;
        let samples = layout.analog_per_frame;

        let raw: Vec<f32> = match layout.analog_format {
            AnalogFormat::Float => {
                let mut words = Vec::with_capacity(layout.analog_words());
                processor.decode_f32_slice(bytes, &mut words);
                words
            }
            AnalogFormat::Unsigned => {
                let mut words = Vec::with_capacity(layout.analog_words());
                processor.decode_u16_slice(bytes, &mut words);
                words.into_iter().map(f32::from).collect()
            }
            AnalogFormat::Signed => {
                let mut words = Vec::with_capacity(layout.analog_words());
                processor.decode_i16_slice(bytes, &mut words);
                words.into_iter().map(f32::from).collect()
            }
        };

        // File order is sample-major: word s * channels + c
        (0..channels)
            .map(|c| {
                let scale = self.transform.scale(c);
                let offset = self.transform.offset(c);
                (0..samples)
                    .map(|s| (raw[s * channels + c] - offset) * scale)
                    .collect()
            })
            .collect()
    }
}
