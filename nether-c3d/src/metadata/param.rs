//! Parameters: typed, dimensioned byte runs

use crate::error::{C3dError, Result};
use crate::processor::Processor;

/// Element width code for character data
pub const CHAR_WIDTH: i8 = -1;

/// Scalar types that can be stored in a numeric parameter
pub trait ParamValue: Copy {
    /// Element width in bytes as stored in the parameter record
    const WIDTH: i8;

    /// Decode one element from exactly `WIDTH` bytes
    fn decode(processor: Processor, bytes: &[u8]) -> Self;

    /// Append the encoded element
    fn encode(self, processor: Processor, out: &mut Vec<u8>);
}

impl ParamValue for i8 {
    const WIDTH: i8 = 1;

    fn decode(_: Processor, bytes: &[u8]) -> Self {
        bytes[0] as i8
    }

    fn encode(self, _: Processor, out: &mut Vec<u8>) {
        out.push(self as u8);
    }
}

impl ParamValue for u8 {
    const WIDTH: i8 = 1;

    fn decode(_: Processor, bytes: &[u8]) -> Self {
        bytes[0]
    }

    fn encode(self, _: Processor, out: &mut Vec<u8>) {
        out.push(self);
    }
}

impl ParamValue for i16 {
    const WIDTH: i8 = 2;

    fn decode(processor: Processor, bytes: &[u8]) -> Self {
        processor.read_i16([bytes[0], bytes[1]])
    }

    fn encode(self, processor: Processor, out: &mut Vec<u8>) {
        out.extend_from_slice(&processor.i16_bytes(self));
    }
}

impl ParamValue for u16 {
    const WIDTH: i8 = 2;

    fn decode(processor: Processor, bytes: &[u8]) -> Self {
        processor.read_u16([bytes[0], bytes[1]])
    }

    fn encode(self, processor: Processor, out: &mut Vec<u8>) {
        out.extend_from_slice(&processor.u16_bytes(self));
    }
}

impl ParamValue for i32 {
    const WIDTH: i8 = 4;

    fn decode(processor: Processor, bytes: &[u8]) -> Self {
        processor.read_i32([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    fn encode(self, processor: Processor, out: &mut Vec<u8>) {
        out.extend_from_slice(&processor.i32_bytes(self));
    }
}

impl ParamValue for u32 {
    const WIDTH: i8 = 4;

    fn decode(processor: Processor, bytes: &[u8]) -> Self {
        processor.read_u32([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    fn encode(self, processor: Processor, out: &mut Vec<u8>) {
        out.extend_from_slice(&processor.u32_bytes(self));
    }
}

impl ParamValue for f32 {
    const WIDTH: i8 = 4;

    // DEC files route through the F-float conversion
    fn decode(processor: Processor, bytes: &[u8]) -> Self {
        processor.read_f32([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    fn encode(self, processor: Processor, out: &mut Vec<u8>) {
        out.extend_from_slice(&processor.f32_bytes(self));
    }
}

/// A named parameter inside a group
///
/// The payload is kept as raw bytes and only interpreted when a typed
/// accessor is called. Invariant: `bytes.len() == product(dimensions) *
/// abs(bytes_per_element)`, with an empty dimension list counting as one
/// element.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    name: String,
    /// Description bytes in the file's text encoding
    desc: Vec<u8>,
    bytes_per_element: i8,
    dimensions: Vec<u8>,
    bytes: Vec<u8>,
    processor: Processor,
}

impl Param {
    /// Build a parameter, validating the payload length
    pub fn new(
        name: &str,
        desc: &str,
        bytes_per_element: i8,
        dimensions: Vec<u8>,
        bytes: Vec<u8>,
        processor: Processor,
    ) -> Result<Self> {
        let name = super::normalize_name(name)?;
        let expected = element_count(&dimensions) * bytes_per_element.unsigned_abs() as usize;
        if bytes.len() != expected {
            return Err(C3dError::invalid_value(format!(
                "parameter {name} holds {} bytes, dimensions {:?} x width {} require {expected}",
                bytes.len(),
                dimensions,
                bytes_per_element
            )));
        }
        let desc = encode_desc(desc, processor, &name)?;

        Ok(Self {
            name,
            desc,
            bytes_per_element,
            dimensions,
            bytes,
            processor,
        })
    }

    /// Numeric scalar parameter
    pub fn scalar<T: ParamValue>(
        name: &str,
        desc: &str,
        value: T,
        processor: Processor,
    ) -> Result<Self> {
        let mut bytes = Vec::with_capacity(T::WIDTH as usize);
        value.encode(processor, &mut bytes);
        Self::new(name, desc, T::WIDTH, Vec::new(), bytes, processor)
    }

    /// One-dimensional numeric parameter
    pub fn array<T: ParamValue>(
        name: &str,
        desc: &str,
        values: &[T],
        processor: Processor,
    ) -> Result<Self> {
        let len = dimension(values.len(), name)?;
        let mut bytes = Vec::with_capacity(values.len() * T::WIDTH as usize);
        for &value in values {
            value.encode(processor, &mut bytes);
        }
        Self::new(name, desc, T::WIDTH, vec![len], bytes, processor)
    }

    /// Single string parameter, dimensions `[len]`
    pub fn string(name: &str, desc: &str, value: &str, processor: Processor) -> Result<Self> {
        let bytes = processor.encode_string(value);
        let len = dimension(bytes.len(), name)?;
        Self::new(name, desc, CHAR_WIDTH, vec![len], bytes, processor)
    }

    /// Fixed-width string array, dimensions `[longest, count]`
    ///
    /// Shorter entries are padded with blanks.
    pub fn strings<S: AsRef<str>>(
        name: &str,
        desc: &str,
        values: &[S],
        processor: Processor,
    ) -> Result<Self> {
        let encoded: Vec<Vec<u8>> = values
            .iter()
            .map(|v| processor.encode_string(v.as_ref()))
            .collect();
        let width = encoded.iter().map(Vec::len).max().unwrap_or(0);
        let dims = vec![dimension(width, name)?, dimension(encoded.len(), name)?];

        let mut bytes = Vec::with_capacity(width * encoded.len());
        for mut entry in encoded {
            entry.resize(width, b' ');
            bytes.extend_from_slice(&entry);
        }
        Self::new(name, desc, CHAR_WIDTH, dims, bytes, processor)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desc(&self) -> String {
        self.processor.decode_string(&self.desc)
    }

    /// Description exactly as stored in the record
    pub fn desc_bytes(&self) -> &[u8] {
        &self.desc
    }

    pub fn set_desc(&mut self, desc: &str) -> Result<()> {
        self.desc = encode_desc(desc, self.processor, &self.name)?;
        Ok(())
    }

    /// Keep a description read from a record without re-encoding it
    pub(crate) fn set_desc_bytes(&mut self, desc: Vec<u8>) {
        self.desc = desc;
    }

    /// Signed element width: negative for character data
    pub fn bytes_per_element(&self) -> i8 {
        self.bytes_per_element
    }

    pub fn dimensions(&self) -> &[u8] {
        &self.dimensions
    }

    /// Raw payload in the file's processor format
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn processor(&self) -> Processor {
        self.processor
    }

    pub fn is_char(&self) -> bool {
        self.bytes_per_element < 0
    }

    /// Number of elements (1 for scalars)
    pub fn num_elements(&self) -> usize {
        element_count(&self.dimensions)
    }

    pub fn total_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// Replace the payload without changing width or dimensions
    pub fn set_bytes(&mut self, bytes: Vec<u8>) -> Result<()> {
        if bytes.len() != self.bytes.len() {
            return Err(C3dError::invalid_value(format!(
                "parameter {} expects {} bytes, got {}",
                self.name,
                self.bytes.len(),
                bytes.len()
            )));
        }
        self.bytes = bytes;
        Ok(())
    }

    /// First element decoded as `T`
    pub fn value<T: ParamValue>(&self) -> Result<T> {
        self.check_width(T::WIDTH)?;
        match self.bytes.get(..T::WIDTH as usize) {
            Some(bytes) => Ok(T::decode(self.processor, bytes)),
            None => Err(C3dError::invalid_value(format!(
                "parameter {} holds no elements",
                self.name
            ))),
        }
    }

    /// All elements decoded as `T`, in file order
    pub fn array_values<T: ParamValue>(&self) -> Result<Vec<T>> {
        self.check_width(T::WIDTH)?;
        Ok(self
            .bytes
            .chunks_exact(T::WIDTH as usize)
            .map(|c| T::decode(self.processor, c))
            .collect())
    }

    /// Whole payload decoded as text, trailing blanks removed
    pub fn string_value(&self) -> Result<String> {
        self.check_width(CHAR_WIDTH)?;
        Ok(trim_padding(&self.processor.decode_string(&self.bytes)))
    }

    /// Fixed-width strings split along the first dimension
    pub fn string_array(&self) -> Result<Vec<String>> {
        self.check_width(CHAR_WIDTH)?;
        let width = match self.dimensions.first() {
            Some(&w) if self.dimensions.len() > 1 => w as usize,
            _ => return Ok(vec![self.string_value()?]),
        };
        if width == 0 {
            return Ok(vec![String::new(); self.dimensions[1..].iter().map(|&d| d as usize).product()]);
        }

        Ok(self
            .bytes
            .chunks_exact(width)
            .map(|chunk| trim_padding(&self.processor.decode_string(chunk)))
            .collect())
    }

    pub fn int8_value(&self) -> Result<i8> {
        self.value()
    }

    pub fn uint8_value(&self) -> Result<u8> {
        self.value()
    }

    pub fn int16_value(&self) -> Result<i16> {
        self.value()
    }

    pub fn uint16_value(&self) -> Result<u16> {
        self.value()
    }

    pub fn int32_value(&self) -> Result<i32> {
        self.value()
    }

    pub fn uint32_value(&self) -> Result<u32> {
        self.value()
    }

    pub fn float_value(&self) -> Result<f32> {
        self.value()
    }

    pub fn int16_array(&self) -> Result<Vec<i16>> {
        self.array_values()
    }

    pub fn uint16_array(&self) -> Result<Vec<u16>> {
        self.array_values()
    }

    pub fn float_array(&self) -> Result<Vec<f32>> {
        self.array_values()
    }

    /// Bytes this parameter occupies as a record in the parameter section
    pub(crate) fn binary_size(&self) -> usize {
        // name_len + group_id + name + offset + width + ndims + dims + data + desc_len + desc
        2 + self.name.len() + 2 + 2 + self.dimensions.len() + self.bytes.len() + 1 + self.desc.len()
    }

    fn check_width(&self, requested: i8) -> Result<()> {
        if requested != self.bytes_per_element {
            return Err(C3dError::TypeMismatch {
                param: self.name.clone(),
                expected: requested,
                actual: self.bytes_per_element,
            });
        }
        Ok(())
    }
}

/// Encode a description, which must fit its one-byte length prefix
pub(crate) fn encode_desc(desc: &str, processor: Processor, owner: &str) -> Result<Vec<u8>> {
    let bytes = processor.encode_string(desc);
    if bytes.len() > u8::MAX as usize {
        return Err(C3dError::invalid_value(format!(
            "description of {owner} is longer than 255 bytes"
        )));
    }
    Ok(bytes)
}

fn element_count(dimensions: &[u8]) -> usize {
    dimensions.iter().map(|&d| d as usize).product()
}

fn dimension(len: usize, name: &str) -> Result<u8> {
    u8::try_from(len).map_err(|_| {
        C3dError::invalid_value(format!(
            "parameter {name} dimension {len} exceeds 255"
        ))
    })
}

fn trim_padding(text: &str) -> String {
    text.trim_end_matches(&[' ', '\0'][..]).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_round_trip() {
        let p = Param::scalar("used", "Point count", 26u16, Processor::Intel).unwrap();
        assert_eq!(p.name(), "USED");
        assert_eq!(p.bytes_per_element(), 2);
        assert!(p.dimensions().is_empty());
        assert_eq!(p.total_bytes(), 2);
        assert_eq!(p.uint16_value().unwrap(), 26);
    }

    #[test]
    fn test_width_mismatch() {
        let p = Param::scalar("RATE", "", 50.0f32, Processor::Intel).unwrap();
        let err = p.int16_value().unwrap_err();
        assert!(matches!(
            err,
            C3dError::TypeMismatch {
                expected: 2,
                actual: 4,
                ..
            }
        ));
        assert!(p.string_value().is_err());
    }

    #[test]
    fn test_payload_length_invariant() {
        assert!(Param::new("X", "", 2, vec![3], vec![0; 5], Processor::Intel).is_err());
        let p = Param::new("X", "", 2, vec![3, 2], vec![0; 12], Processor::Intel).unwrap();
        assert_eq!(p.num_elements(), 6);
        assert_eq!(p.total_bytes(), p.num_elements() * 2);
    }

    #[test]
    fn test_dec_float_array() {
        let p = Param::array("SCALE", "", &[0.5f32, -2.0], Processor::Dec).unwrap();
        assert_eq!(p.float_array().unwrap(), vec![0.5, -2.0]);
        // Stored bytes are DEC, not IEEE
        assert_ne!(&p.bytes()[..4], &0.5f32.to_le_bytes());
    }

    #[test]
    fn test_mips_integers() {
        let p = Param::array("OFFSET", "", &[1i16, -1], Processor::Mips).unwrap();
        assert_eq!(p.bytes(), &[0, 1, 0xFF, 0xFF]);
        assert_eq!(p.int16_array().unwrap(), vec![1, -1]);
    }

    #[test]
    fn test_string_array() {
        let p = Param::strings("LABELS", "", &["LASI", "RASI", "LKNEE"], Processor::Intel).unwrap();
        assert_eq!(p.dimensions(), &[5, 3]);
        assert_eq!(p.total_bytes(), 15);
        assert_eq!(p.string_array().unwrap(), vec!["LASI", "RASI", "LKNEE"]);
    }

    #[test]
    fn test_string_value() {
        let p = Param::string("X_SCREEN", "", "-Y", Processor::Intel).unwrap();
        assert_eq!(p.dimensions(), &[2]);
        assert_eq!(p.string_value().unwrap(), "-Y");
        assert_eq!(p.string_array().unwrap(), vec!["-Y"]);
    }

    #[test]
    fn test_empty_array_has_no_value() {
        let p = Param::new("SCALE", "", 4, vec![0], Vec::new(), Processor::Intel).unwrap();
        assert!(p.float_array().unwrap().is_empty());
        assert!(matches!(p.float_value(), Err(C3dError::InvalidValue(_))));
    }

    #[test]
    fn test_set_bytes_keeps_length() {
        let mut p = Param::scalar("DATA_START", "", 0u16, Processor::Intel).unwrap();
        p.set_bytes(11u16.to_le_bytes().to_vec()).unwrap();
        assert_eq!(p.uint16_value().unwrap(), 11);
        assert!(p.set_bytes(vec![0; 4]).is_err());
    }
}
