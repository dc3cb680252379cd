//! Processor profiles: byte order, float encoding and text decoding
//!
//! A C3D file declares the processor that wrote it in the fourth byte of the
//! parameter section. Every multi-byte value after that point (header fields,
//! parameter payloads, frame words) is interpreted through the resolved
//! [`Processor`]:
//!
//! | Tag | Processor | Integers      | Floats                 |
//! |-----|-----------|---------------|------------------------|
//! | 84  | Intel     | little-endian | IEEE-754 little-endian |
//! | 85  | DEC       | little-endian | DEC F-float            |
//! | 86  | MIPS      | big-endian    | IEEE-754 big-endian    |
//!
//! The DEC transforms are free functions over whole buffers so frame blocks can
//! be converted in one pass.

use std::fmt;

use crate::error::{C3dError, Result};

/// Processor tag for Intel (IEEE little-endian)
pub const PROCESSOR_INTEL: u8 = 84;

/// Processor tag for DEC (VAX F-float)
pub const PROCESSOR_DEC: u8 = 85;

/// Processor tag for MIPS (IEEE big-endian)
pub const PROCESSOR_MIPS: u8 = 86;

/// Exponent field of an IEEE single, in place
const EXPONENT_MASK: u32 = 0x7F80_0000;

/// DEC exponents are biased by 128 against a 0.1m mantissa; IEEE uses 127
/// against 1.m. Together that is a difference of two in the exponent field.
const DEC_EXPONENT_SHIFT: u32 = 2 << 23;

/// Numeric convention declared by a C3D file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Processor {
    /// IEEE-754, little-endian
    #[default]
    Intel,
    /// DEC F-float, little-endian 16-bit words
    Dec,
    /// IEEE-754, big-endian
    Mips,
}

impl Processor {
    /// Resolve a processor tag read from the parameter section prologue
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            PROCESSOR_INTEL => Ok(Self::Intel),
            PROCESSOR_DEC => Ok(Self::Dec),
            PROCESSOR_MIPS => Ok(Self::Mips),
            other => Err(C3dError::UnsupportedProcessor(other)),
        }
    }

    /// Tag written to the parameter section prologue
    pub const fn tag(self) -> u8 {
        match self {
            Self::Intel => PROCESSOR_INTEL,
            Self::Dec => PROCESSOR_DEC,
            Self::Mips => PROCESSOR_MIPS,
        }
    }

    /// True for the IEEE big-endian profile
    pub const fn is_big_endian(self) -> bool {
        matches!(self, Self::Mips)
    }

    /// True for the two IEEE profiles
    pub const fn is_ieee(self) -> bool {
        !matches!(self, Self::Dec)
    }

    pub fn read_u16(self, bytes: [u8; 2]) -> u16 {
        if self.is_big_endian() {
            u16::from_be_bytes(bytes)
        } else {
            u16::from_le_bytes(bytes)
        }
    }

    pub fn read_i16(self, bytes: [u8; 2]) -> i16 {
        self.read_u16(bytes) as i16
    }

    pub fn read_u32(self, bytes: [u8; 4]) -> u32 {
        if self.is_big_endian() {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        }
    }

    pub fn read_i32(self, bytes: [u8; 4]) -> i32 {
        self.read_u32(bytes) as i32
    }

    /// Decode one 32-bit float, applying the DEC conversion when needed
    pub fn read_f32(self, bytes: [u8; 4]) -> f32 {
        match self {
            Self::Intel => f32::from_le_bytes(bytes),
            Self::Mips => f32::from_be_bytes(bytes),
            Self::Dec => dec_to_ieee(bytes),
        }
    }

    pub fn u16_bytes(self, value: u16) -> [u8; 2] {
        if self.is_big_endian() {
            value.to_be_bytes()
        } else {
            value.to_le_bytes()
        }
    }

    pub fn i16_bytes(self, value: i16) -> [u8; 2] {
        self.u16_bytes(value as u16)
    }

    pub fn u32_bytes(self, value: u32) -> [u8; 4] {
        if self.is_big_endian() {
            value.to_be_bytes()
        } else {
            value.to_le_bytes()
        }
    }

    pub fn i32_bytes(self, value: i32) -> [u8; 4] {
        self.u32_bytes(value as u32)
    }

    /// Encode one 32-bit float in this profile's layout
    pub fn f32_bytes(self, value: f32) -> [u8; 4] {
        match self {
            Self::Intel => value.to_le_bytes(),
            Self::Mips => value.to_be_bytes(),
            Self::Dec => ieee_to_dec(value),
        }
    }

    /// Decode a buffer of 32-bit floats (trailing partial words are ignored)
    pub fn decode_f32_slice(self, bytes: &[u8], out: &mut Vec<f32>) {
        match self {
            Self::Dec => dec_to_ieee_slice(bytes, out),
            _ => out.extend(
                bytes
                    .chunks_exact(4)
                    .map(|c| self.read_f32([c[0], c[1], c[2], c[3]])),
            ),
        }
    }

    /// Decode a buffer of signed 16-bit words
    pub fn decode_i16_slice(self, bytes: &[u8], out: &mut Vec<i16>) {
        out.extend(bytes.chunks_exact(2).map(|c| self.read_i16([c[0], c[1]])));
    }

    /// Decode a buffer of unsigned 16-bit words
    pub fn decode_u16_slice(self, bytes: &[u8], out: &mut Vec<u16>) {
        out.extend(bytes.chunks_exact(2).map(|c| self.read_u16([c[0], c[1]])));
    }

    /// Decode character data: Latin-1 for DEC, UTF-8 otherwise
    pub fn decode_string(self, bytes: &[u8]) -> String {
        match self {
            Self::Dec => bytes.iter().map(|&b| b as char).collect(),
            _ => String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    /// Encode character data, inverse of [`Processor::decode_string`]
    pub fn encode_string(self, text: &str) -> Vec<u8> {
        match self {
            Self::Dec => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
            _ => text.as_bytes().to_vec(),
        }
    }
}

impl fmt::Display for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Intel => write!(f, "Intel"),
            Self::Dec => write!(f, "DEC"),
            Self::Mips => write!(f, "MIPS"),
        }
    }
}

/// Convert a DEC F-float (as stored on disk) to an IEEE single
///
/// The four bytes are two little-endian 16-bit words with the sign, exponent
/// and high mantissa bits in the first word. Swapping the words yields the
/// IEEE bit layout with an exponent that is two too large.
pub fn dec_to_ieee(bytes: [u8; 4]) -> f32 {
    let high = u16::from_le_bytes([bytes[0], bytes[1]]) as u32;
    let low = u16::from_le_bytes([bytes[2], bytes[3]]) as u32;
    let bits = (high << 16) | low;
    let exponent = bits & EXPONENT_MASK;

    if exponent == 0 {
        // DEC zero (the sign bit alone is a reserved operand)
        0.0
    } else if exponent > DEC_EXPONENT_SHIFT {
        f32::from_bits(bits - DEC_EXPONENT_SHIFT)
    } else {
        // Exponent 1 or 2 lands in the IEEE subnormal range
        f32::from_bits(bits) * 0.25
    }
}

/// Convert an IEEE single to DEC F-float bytes
///
/// Values too small for DEC flush to zero, values too large (and non-finite
/// inputs) saturate to the largest DEC magnitude with the input's sign.
pub fn ieee_to_dec(value: f32) -> [u8; 4] {
    let bits = value.to_bits();
    let sign = bits & 0x8000_0000;
    let exponent = bits & EXPONENT_MASK;

    let dec_bits = if value == 0.0 || exponent == 0 {
        0
    } else if value.is_nan() || exponent > EXPONENT_MASK - DEC_EXPONENT_SHIFT {
        sign | 0x7FFF_FFFF
    } else {
        bits + DEC_EXPONENT_SHIFT
    };

    let high = ((dec_bits >> 16) as u16).to_le_bytes();
    let low = (dec_bits as u16).to_le_bytes();
    [high[0], high[1], low[0], low[1]]
}

/// Batch DEC to IEEE conversion over a whole buffer
pub fn dec_to_ieee_slice(bytes: &[u8], out: &mut Vec<f32>) {
    out.extend(
        bytes
            .chunks_exact(4)
            .map(|c| dec_to_ieee([c[0], c[1], c[2], c[3]])),
    );
}
