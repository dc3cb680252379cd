//! The fixed 512-byte header block
//!
//! Field offsets (bytes):
//!
//! | Offset | Size | Field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 1    | first parameter block                   |
//! | 1      | 1    | key (0x50)                              |
//! | 2      | 2    | point count                             |
//! | 4      | 2    | analog samples per frame (all channels) |
//! | 6      | 2    | first frame                             |
//! | 8      | 2    | last frame                              |
//! | 10     | 2    | maximum interpolation gap               |
//! | 12     | 4    | point scale (negative: float samples)   |
//! | 16     | 2    | first data block                        |
//! | 18     | 2    | analog samples per point frame          |
//! | 20     | 4    | point frame rate                        |
//! | 298    | 2    | long event label key (0x3039)           |
//! | 300    | 2    | event count                             |
//! | 304    | 72   | event times (18 floats)                 |
//! | 376    | 18   | event display flags                     |
//! | 396    | 72   | event labels (18 x 4 chars)             |

use crate::BLOCK_SIZE;
use crate::error::{C3dError, Result};
use crate::processor::Processor;

/// Key byte stored at offset 1 of every header
pub const HEADER_KEY: u8 = 0x50;

/// Maximum number of events in the header event table
pub const MAX_EVENTS: usize = 18;

/// Marker stored at offset 298 when 4-character event labels are present
const LONG_EVENT_LABELS_KEY: u16 = 0x3039;

const EVENT_LABEL_CHARS: usize = 4;

const OFFSET_POINT_COUNT: usize = 2;
const OFFSET_ANALOG_COUNT: usize = 4;
const OFFSET_FIRST_FRAME: usize = 6;
const OFFSET_LAST_FRAME: usize = 8;
const OFFSET_MAX_GAP: usize = 10;
const OFFSET_SCALE: usize = 12;
const OFFSET_DATA_BLOCK: usize = 16;
const OFFSET_ANALOG_PER_FRAME: usize = 18;
const OFFSET_FRAME_RATE: usize = 20;
const OFFSET_LONG_EVENT_LABELS: usize = 298;
const OFFSET_EVENT_COUNT: usize = 300;
const OFFSET_EVENT_TIMES: usize = 304;
const OFFSET_EVENT_FLAGS: usize = 376;
const OFFSET_EVENT_LABELS: usize = 396;

/// A single entry of the header event table
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Label, at most 4 characters
    pub label: String,
    /// Event time in seconds
    pub time: f32,
    /// Display flag
    pub display: bool,
}

impl Event {
    pub fn new(label: &str, time: f32) -> Self {
        Self {
            label: label.to_string(),
            time,
            display: true,
        }
    }
}

/// Scalar fields of the header block
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    /// 1-based block index of the parameter section
    pub parameter_block: u8,
    /// Key byte, normally 0x50
    pub key: u8,
    /// Number of 3D points per frame
    pub point_count: u16,
    /// Analog samples per frame across all channels
    pub analog_count: u16,
    /// First frame number (saturates at 65535)
    pub first_frame: u16,
    /// Last frame number (saturates at 65535)
    pub last_frame: u16,
    /// Maximum interpolation gap
    pub max_gap: u16,
    /// Point scale factor; negative means floating-point frame data
    pub scale_factor: f32,
    /// 1-based block index of the data section
    pub data_block: u16,
    /// Analog samples per channel per point frame
    pub analog_per_frame: u16,
    /// Point frame rate in Hz
    pub frame_rate: f32,
    /// Whether 4-character event labels are in use
    pub long_event_labels: bool,
    /// Event table (at most 18 entries)
    pub events: Vec<Event>,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            parameter_block: 2,
            key: HEADER_KEY,
            point_count: 0,
            analog_count: 0,
            first_frame: 1,
            last_frame: 0,
            max_gap: 0,
            scale_factor: -1.0,
            data_block: 0,
            analog_per_frame: 0,
            frame_rate: 0.0,
            long_event_labels: true,
            events: Vec::new(),
        }
    }
}

impl Header {
    /// Parse a header block assuming the Intel profile
    ///
    /// The processor is only known once the parameter section prologue has
    /// been read, so the first pass always decodes little-endian IEEE values.
    /// Call [`Header::reinterpret_for_processor`] once the profile is known.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Self::parse_for(bytes, Processor::Intel)
    }

    /// Parse a header block with the given processor profile
    pub fn parse_for(bytes: &[u8], processor: Processor) -> Result<Self> {
        if bytes.len() < BLOCK_SIZE {
            return Err(C3dError::TruncatedHeader {
                expected: BLOCK_SIZE,
                actual: bytes.len(),
            });
        }

        let u16_at = |offset: usize| processor.read_u16([bytes[offset], bytes[offset + 1]]);
        let f32_at = |offset: usize| {
            processor.read_f32([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ])
        };

        let event_count = (u16_at(OFFSET_EVENT_COUNT) as usize).min(MAX_EVENTS);
        let mut events = Vec::with_capacity(event_count);
        for i in 0..event_count {
            let label_start = OFFSET_EVENT_LABELS + i * EVENT_LABEL_CHARS;
            let label = processor
                .decode_string(&bytes[label_start..label_start + EVENT_LABEL_CHARS])
                .trim_end_matches(&['\0', ' '][..])
                .to_string();
            events.push(Event {
                label,
                time: f32_at(OFFSET_EVENT_TIMES + i * 4),
                display: bytes[OFFSET_EVENT_FLAGS + i] != 0,
            });
        }

        Ok(Self {
            parameter_block: bytes[0],
            key: bytes[1],
            point_count: u16_at(OFFSET_POINT_COUNT),
            analog_count: u16_at(OFFSET_ANALOG_COUNT),
            first_frame: u16_at(OFFSET_FIRST_FRAME),
            last_frame: u16_at(OFFSET_LAST_FRAME),
            max_gap: u16_at(OFFSET_MAX_GAP),
            scale_factor: f32_at(OFFSET_SCALE),
            data_block: u16_at(OFFSET_DATA_BLOCK),
            analog_per_frame: u16_at(OFFSET_ANALOG_PER_FRAME),
            frame_rate: f32_at(OFFSET_FRAME_RATE),
            long_event_labels: u16_at(OFFSET_LONG_EVENT_LABELS) == LONG_EVENT_LABELS_KEY,
            events,
        })
    }

    /// Re-read the header once the real processor profile is known
    ///
    /// MIPS files store every header word big-endian and DEC files store the
    /// float fields as DEC F-floats; Intel needs no second pass.
    pub fn reinterpret_for_processor(&mut self, bytes: &[u8], processor: Processor) -> Result<()> {
        if processor != Processor::Intel {
            *self = Self::parse_for(bytes, processor)?;
        }
        Ok(())
    }

    /// Serialize to exactly 512 bytes in the Intel profile
    pub fn serialize(&self) -> Result<Vec<u8>> {
        self.serialize_for(Processor::Intel)
    }

    /// Serialize to exactly 512 bytes in the given profile
    pub fn serialize_for(&self, processor: Processor) -> Result<Vec<u8>> {
        if self.events.len() > MAX_EVENTS {
            return Err(C3dError::invalid_value(format!(
                "{} events exceed the header table size of {}",
                self.events.len(),
                MAX_EVENTS
            )));
        }

        let mut output = vec![0u8; BLOCK_SIZE];
        let mut put = |offset: usize, bytes: &[u8]| {
            output[offset..offset + bytes.len()].copy_from_slice(bytes);
        };

        put(0, &[self.parameter_block, self.key]);
        put(OFFSET_POINT_COUNT, &processor.u16_bytes(self.point_count));
        put(OFFSET_ANALOG_COUNT, &processor.u16_bytes(self.analog_count));
        put(OFFSET_FIRST_FRAME, &processor.u16_bytes(self.first_frame));
        put(OFFSET_LAST_FRAME, &processor.u16_bytes(self.last_frame));
        put(OFFSET_MAX_GAP, &processor.u16_bytes(self.max_gap));
        put(OFFSET_SCALE, &processor.f32_bytes(self.scale_factor));
        put(OFFSET_DATA_BLOCK, &processor.u16_bytes(self.data_block));
        put(
            OFFSET_ANALOG_PER_FRAME,
            &processor.u16_bytes(self.analog_per_frame),
        );
        put(OFFSET_FRAME_RATE, &processor.f32_bytes(self.frame_rate));

        if self.long_event_labels {
            put(
                OFFSET_LONG_EVENT_LABELS,
                &processor.u16_bytes(LONG_EVENT_LABELS_KEY),
            );
        }
        put(
            OFFSET_EVENT_COUNT,
            &processor.u16_bytes(self.events.len() as u16),
        );

        for (i, event) in self.events.iter().enumerate() {
            put(OFFSET_EVENT_TIMES + i * 4, &processor.f32_bytes(event.time));
            put(OFFSET_EVENT_FLAGS + i, &[event.display as u8]);

            let mut label = processor.encode_string(&event.label);
            label.resize(EVENT_LABEL_CHARS, b' ');
            put(OFFSET_EVENT_LABELS + i * EVENT_LABEL_CHARS, &label);
        }

        Ok(output)
    }

    /// Replace the event table after validating it
    pub fn set_events(&mut self, events: Vec<Event>) -> Result<()> {
        if events.len() > MAX_EVENTS {
            return Err(C3dError::invalid_value(format!(
                "at most {MAX_EVENTS} events fit in the header, got {}",
                events.len()
            )));
        }
        for event in &events {
            if event.time.is_nan() || event.time < 0.0 {
                return Err(C3dError::invalid_value(format!(
                    "event '{}' has a negative time",
                    event.label
                )));
            }
            if event.label.trim().chars().count() > EVENT_LABEL_CHARS {
                return Err(C3dError::invalid_value(format!(
                    "event label '{}' is longer than {EVENT_LABEL_CHARS} characters",
                    event.label
                )));
            }
        }

        self.events = events
            .into_iter()
            .map(|e| Event {
                label: e.label.trim().to_string(),
                ..e
            })
            .collect();
        self.long_event_labels = true;
        Ok(())
    }
}
