//! End-to-end tests: files written, read back and converted

use std::io::{Cursor, Seek, SeekFrom};

use nether_c3d::{
    AnalogFormat, AnalogTransform, BLOCK_SIZE, C3dError, CAMERA_COLUMN, ConversionMode, Frame,
    FrameCodec, FrameLayout, Header, Manager, MetadataStore, Processor, RESIDUAL_COLUMN,
    ReadOptions, Reader, Result, Writer, WriterConfig,
};

// =============================================================================
// Fixtures
// =============================================================================

/// Builds a complete file in any processor profile without going through Writer
struct Fixture {
    processor: Processor,
    point_scale: f32,
    point_rate: f32,
    analog_per_frame: usize,
    format: AnalogFormat,
    transform: AnalogTransform,
    analog_bits: Option<u16>,
}

impl Fixture {
    fn new(processor: Processor, point_scale: f32) -> Self {
        Self {
            processor,
            point_scale,
            point_rate: 50.0,
            analog_per_frame: 4,
            format: if point_scale < 0.0 {
                AnalogFormat::Float
            } else {
                AnalogFormat::Signed
            },
            transform: AnalogTransform::default(),
            analog_bits: None,
        }
    }

    fn build(&self, frames: &[Frame]) -> Vec<u8> {
        let processor = self.processor;
        let first = &frames[0];
        let points = first.point_count();
        let channels = first.analog_channels();

        let mut store = MetadataStore::new(processor);
        let point = store.add_group(1, "POINT", "3-D point parameters").unwrap();
        point.set("USED", "", points as u16).unwrap();
        point.set("FRAMES", "", frames.len() as u16).unwrap();
        point.set("DATA_START", "", 0u16).unwrap();
        point.set("SCALE", "", self.point_scale).unwrap();
        point.set("RATE", "", self.point_rate).unwrap();
        let labels: Vec<String> = (0..points).map(|p| format!("M{p:02}")).collect();
        point.set_str_array("LABELS", "", &labels).unwrap();

        let analog = store.add_group(2, "ANALOG", "Analog parameters").unwrap();
        analog.set("USED", "", channels as u16).unwrap();
        analog
            .set("RATE", "", self.point_rate * self.analog_per_frame as f32)
            .unwrap();
        analog.set("GEN_SCALE", "", 1.0f32).unwrap();
        if !self.transform.scales.is_empty() {
            analog.set_array("SCALE", "", &self.transform.scales).unwrap();
        }
        if !self.transform.offsets.is_empty() {
            let offsets: Vec<i16> = self.transform.offsets.iter().map(|&o| o as i16).collect();
            analog.set_array("OFFSET", "", &offsets).unwrap();
        }
        if self.format == AnalogFormat::Unsigned {
            analog.set_str("FORMAT", "", "UNSIGNED").unwrap();
        }
        if let Some(bits) = self.analog_bits {
            analog.set("BITS", "", bits).unwrap();
        }
        let channel_labels: Vec<String> = (0..channels).map(|c| format!("CH{c}")).collect();
        analog.set_str_array("LABELS", "", &channel_labels).unwrap();

        let data_block = (store.parameter_blocks() + 2) as u16;
        store
            .param_mut("POINT:DATA_START")
            .unwrap()
            .set_bytes(processor.u16_bytes(data_block).to_vec())
            .unwrap();

        let header = Header {
            parameter_block: 2,
            point_count: points as u16,
            analog_count: (channels * self.analog_per_frame) as u16,
            first_frame: 1,
            last_frame: frames.len() as u16,
            scale_factor: self.point_scale,
            data_block,
            analog_per_frame: self.analog_per_frame as u16,
            frame_rate: self.point_rate,
            ..Header::default()
        };

        let mut bytes = header.serialize_for(processor).unwrap();
        bytes.extend_from_slice(&store.serialize().unwrap());
        assert_eq!(bytes.len(), (data_block as usize - 1) * BLOCK_SIZE);

        let layout = FrameLayout {
            point_used: points,
            analog_used: channels,
            analog_per_frame: self.analog_per_frame,
            point_scale: self.point_scale,
            analog_format: self.format,
            processor,
        };
        let codec = FrameCodec::new(layout, self.transform.clone(), ReadOptions::default());
        for frame in frames {
            codec.encode(frame, &mut bytes).unwrap();
        }
        bytes.resize(bytes.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE, 0);
        bytes
    }
}

/// Deterministic frames with some invalid samples; coordinates are exact
/// multiples of `abs(scale)` and analog values are whole numbers
fn make_frames(count: usize, points: usize, channels: usize, samples: usize, scale: f32) -> Vec<Frame> {
    let step = scale.abs();
    (0..count)
        .map(|f| {
            let mut frame = Frame::new(points, channels, samples);
            for (p, row) in frame.points.iter_mut().enumerate() {
                if (f + p) % 5 == 0 {
                    *row = [0.0, 0.0, 0.0, -1.0, 0.0];
                } else {
                    let base = (f * 7 + p) as f32;
                    *row = [
                        base * 5.0 * step,
                        -base * 3.0 * step,
                        (p as f32 + 1.0) * 10.0 * step,
                        ((f + p) % 20) as f32 * step,
                        ((f * 3 + p) % 128) as f32,
                    ];
                }
            }
            for (c, channel) in frame.analog.iter_mut().enumerate() {
                for (s, value) in channel.iter_mut().enumerate() {
                    *value = ((f + c * samples + s) % 41) as f32 - 20.0;
                }
            }
            frame
        })
        .collect()
}

fn read_frames<R: std::io::Read + Seek>(reader: &mut Reader<R>) -> Vec<Frame> {
    reader
        .frames()
        .unwrap()
        .map(|frame| frame.map(|(_, frame)| frame))
        .collect::<Result<Vec<_>>>()
        .unwrap()
}

fn assert_frames_close(actual: &[Frame], expected: &[Frame], point_tol: f32, analog_tol: f32) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert_eq!(a.points.len(), e.points.len(), "frame {i}");
        for (p, (ar, er)) in a.points.iter().zip(&e.points).enumerate() {
            for col in 0..5 {
                assert!(
                    (ar[col] - er[col]).abs() <= point_tol,
                    "frame {i} point {p} column {col}: {} vs {}",
                    ar[col],
                    er[col]
                );
            }
        }
        assert_eq!(a.analog.len(), e.analog.len(), "frame {i}");
        for (ac, ec) in a.analog.iter().zip(&e.analog) {
            assert_eq!(ac.len(), ec.len());
            for (av, ev) in ac.iter().zip(ec) {
                assert!((av - ev).abs() <= analog_tol, "frame {i}: {av} vs {ev}");
            }
        }
    }
}

fn writer_with(config: WriterConfig, frames: &[Frame]) -> Writer {
    let mut writer = Writer::new(config).unwrap();
    writer.add_frames(frames.iter().cloned());
    writer
}

// =============================================================================
// Intel round trips
// =============================================================================

#[test]
fn test_integer_round_trip_through_file() {
    let scale = 0.1;
    let frames = make_frames(12, 6, 3, 4, scale);
    let config = WriterConfig {
        point_rate: 50.0,
        analog_rate: 200.0,
        point_scale: scale,
    };
    let mut writer = writer_with(config, &frames);

    let mut file = tempfile::tempfile().unwrap();
    writer.write(&mut file).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();

    let mut reader = Reader::open(file).unwrap();
    assert_eq!(reader.processor(), Processor::Intel);
    assert_eq!(reader.frame_count(), 12);
    let decoded = read_frames(&mut reader);
    assert_frames_close(&decoded, &frames, scale, 1.0);
    assert!(reader.diagnostics().is_empty());
}

#[test]
fn test_float_round_trip_is_exact() {
    let frames = make_frames(8, 4, 2, 2, -0.25);
    let config = WriterConfig {
        point_rate: 100.0,
        analog_rate: 200.0,
        point_scale: -0.25,
    };
    let mut writer = writer_with(config, &frames);

    let mut file = tempfile::tempfile().unwrap();
    writer.write(&mut file).unwrap();
    let mut reader = Reader::open(file).unwrap();
    assert_eq!(read_frames(&mut reader), frames);
}

#[test]
fn test_reader_frames_rewrite_identically() {
    let frames = make_frames(5, 3, 1, 2, 0.5);
    let config = WriterConfig {
        point_rate: 60.0,
        analog_rate: 120.0,
        point_scale: 0.5,
    };
    let original = writer_with(config, &frames).to_bytes().unwrap();

    let mut reader = Reader::open(Cursor::new(original.clone())).unwrap();
    let mut copy = Writer::from_source(&mut reader, ConversionMode::Copy).unwrap();
    assert_eq!(copy.num_frames(), 5);
    assert_eq!(copy.to_bytes().unwrap(), original);
}

// =============================================================================
// Scenario across processors
// =============================================================================

#[test]
fn test_scenario_layout_all_processors() {
    for processor in [Processor::Intel, Processor::Dec, Processor::Mips] {
        for scale in [0.1f32, -0.1] {
            let frames = make_frames(6, 26, 16, 4, scale);
            let bytes = Fixture::new(processor, scale).build(&frames);

            let mut reader = Reader::open(Cursor::new(bytes)).unwrap();
            assert_eq!(reader.processor(), processor);
            assert_eq!(reader.header().point_count, 26, "{processor}");
            assert_eq!(reader.point_used(), 26);
            assert_eq!(reader.analog_used(), 16);
            assert_eq!(reader.point_rate(), 50.0);
            assert_eq!(reader.analog_rate(), 200.0);
            assert_eq!(reader.point_scale(), scale);
            assert_eq!(reader.point_labels()[25], "M25");
            assert!(reader.diagnostics().is_empty(), "{processor}");

            let decoded = read_frames(&mut reader);
            assert_eq!(decoded.len(), 6);
            for frame in &decoded {
                assert_eq!(frame.points.len(), 26);
                assert_eq!(frame.analog_channels(), 16);
                assert_eq!(frame.analog_samples(), 4);
            }
            assert_frames_close(&decoded, &frames, scale.abs(), 1e-3);
        }
    }
}

#[test]
fn test_invalid_and_camera_invariants() {
    let frames = make_frames(10, 8, 0, 0, 1.0);
    let mut fixture = Fixture::new(Processor::Intel, 1.0);
    fixture.analog_per_frame = 0;
    let bytes = fixture.build(&frames);

    let mut reader = Reader::open(Cursor::new(bytes)).unwrap();
    let decoded = read_frames(&mut reader);
    for (frame, source) in decoded.iter().zip(&frames) {
        for (row, source_row) in frame.points.iter().zip(&source.points) {
            let invalid = source_row[RESIDUAL_COLUMN] < 0.0;
            assert_eq!(row[RESIDUAL_COLUMN] == -1.0, invalid);
            if invalid {
                assert_eq!(&row[..3], &[0.0, 0.0, 0.0]);
            }
            let mask = row[CAMERA_COLUMN] as u32;
            assert_eq!(mask & !0x7F, 0);
        }
    }
}

#[test]
fn test_camera_sum_option() {
    let frames = make_frames(3, 4, 0, 0, 1.0);
    let mut fixture = Fixture::new(Processor::Intel, 1.0);
    fixture.analog_per_frame = 0;
    let mut reader = Reader::open(Cursor::new(fixture.build(&frames))).unwrap();

    let options = ReadOptions {
        check_nan: true,
        camera_sum: true,
    };
    let summed: Vec<Frame> = reader
        .frames_with(options)
        .unwrap()
        .map(|f| f.map(|(_, f)| f))
        .collect::<Result<_>>()
        .unwrap();
    for (frame, source) in summed.iter().zip(&frames) {
        for (row, source_row) in frame.points.iter().zip(&source.points) {
            if source_row[RESIDUAL_COLUMN] >= 0.0 {
                let expected = (source_row[CAMERA_COLUMN] as u32).count_ones() as f32;
                assert_eq!(row[CAMERA_COLUMN], expected);
            }
        }
    }
}

// =============================================================================
// Analog formats
// =============================================================================

#[test]
fn test_unsigned_analog_with_offsets() {
    let frames = make_frames(4, 2, 2, 4, 1.0);
    let mut fixture = Fixture::new(Processor::Intel, 1.0);
    fixture.format = AnalogFormat::Unsigned;
    fixture.transform = AnalogTransform::new(vec![0.5, 2.0], vec![2048.0, 1000.0]);
    let bytes = fixture.build(&frames);

    let mut reader = Reader::open(Cursor::new(bytes)).unwrap();
    assert_eq!(reader.analog_format().unwrap(), AnalogFormat::Unsigned);
    let decoded = read_frames(&mut reader);
    // One LSB of the widest channel scale
    assert_frames_close(&decoded, &frames, 1.0, 2.0);
}

#[test]
fn test_analog_bits_above_16_rejected() {
    let frames = make_frames(2, 1, 1, 4, 1.0);
    let mut fixture = Fixture::new(Processor::Intel, 1.0);
    fixture.analog_bits = Some(24);
    let mut reader = Reader::open(Cursor::new(fixture.build(&frames))).unwrap();
    assert!(matches!(
        reader.frames(),
        Err(C3dError::AnalogBitWidthUnsupported(24))
    ));

    fixture.analog_bits = Some(12);
    let mut reader = Reader::open(Cursor::new(fixture.build(&frames))).unwrap();
    assert_eq!(read_frames(&mut reader).len(), 2);
}

// =============================================================================
// Conversions
// =============================================================================

#[test]
fn test_non_intel_requires_shallow_modes() {
    for processor in [Processor::Dec, Processor::Mips] {
        let frames = make_frames(3, 5, 2, 4, -0.1);
        let bytes = Fixture::new(processor, -0.1).build(&frames);
        let mut reader = Reader::open(Cursor::new(bytes)).unwrap();

        for mode in [
            ConversionMode::Consume,
            ConversionMode::Copy,
            ConversionMode::CopyMetadata,
        ] {
            match Writer::from_source(&mut reader, mode) {
                Err(C3dError::UnsupportedConversion { processor: p, mode: m }) => {
                    assert_eq!(p, processor);
                    assert_eq!(m, mode);
                }
                other => panic!("{processor} {mode}: expected rejection, got {:?}", other.err()),
            }
        }
        assert!(!reader.is_consumed());

        let mut writer = Writer::from_source(&mut reader, ConversionMode::ShallowCopy).unwrap();
        assert_eq!(writer.num_frames(), 3);
        assert_eq!(writer.point_labels(), reader.point_labels());
        assert_eq!(writer.analog_labels(), vec!["CH0", "CH1"]);

        let mut converted = Reader::open(Cursor::new(writer.to_bytes().unwrap())).unwrap();
        assert_eq!(converted.processor(), Processor::Intel);
        assert_eq!(converted.point_rate(), 50.0);
        assert_eq!(converted.analog_rate(), 200.0);
        assert_eq!(read_frames(&mut converted), read_frames(&mut reader));
    }
}

#[test]
fn test_shallow_copy_keeps_unsigned_analog() {
    for processor in [Processor::Dec, Processor::Mips] {
        let mut frames = make_frames(3, 2, 2, 4, 1.0);
        for (f, frame) in frames.iter_mut().enumerate() {
            for channel in frame.analog.iter_mut() {
                for (s, value) in channel.iter_mut().enumerate() {
                    *value = 40_000.0 + (f * 10 + s) as f32;
                }
            }
        }
        let mut fixture = Fixture::new(processor, 1.0);
        fixture.format = AnalogFormat::Unsigned;
        let mut reader = Reader::open(Cursor::new(fixture.build(&frames))).unwrap();

        let mut writer = Writer::from_source(&mut reader, ConversionMode::ShallowCopy).unwrap();
        assert_eq!(writer.analog_format().unwrap(), AnalogFormat::Unsigned);

        let mut converted = Reader::open(Cursor::new(writer.to_bytes().unwrap())).unwrap();
        assert_eq!(converted.analog_format().unwrap(), AnalogFormat::Unsigned);
        let decoded = read_frames(&mut converted);
        assert_eq!(decoded[2].analog[1][3], 40_023.0);
        assert_eq!(decoded, read_frames(&mut reader));
    }
}

#[test]
fn test_copy_header_carries_no_frames() {
    let frames = make_frames(3, 2, 1, 4, -1.0);
    let bytes = Fixture::new(Processor::Dec, -1.0).build(&frames);
    let reader = Reader::open(Cursor::new(bytes)).unwrap();

    let mut writer = reader.into_writer(ConversionMode::CopyHeader).unwrap();
    assert_eq!(writer.num_frames(), 0);
    assert_eq!(writer.first_frame(), 1);
    assert!(matches!(writer.to_bytes(), Err(C3dError::EmptyWrite)));
}

#[test]
fn test_consume_moves_metadata() {
    let frames = make_frames(4, 3, 0, 0, -1.0);
    let config = WriterConfig {
        point_rate: 30.0,
        ..WriterConfig::default()
    };
    let mut source = writer_with(config, &frames);
    source
        .add_group(20, "CUSTOM", "Vendor data")
        .unwrap()
        .set_array("VALUES", "", &[1i32, -2, 3])
        .unwrap();
    let bytes = source.to_bytes().unwrap();

    let mut reader = Reader::open(Cursor::new(bytes)).unwrap();
    let mut writer = Writer::from_source(&mut reader, ConversionMode::Consume).unwrap();
    assert!(reader.is_consumed());
    assert!(reader.metadata().is_empty());
    assert!(matches!(reader.frames(), Err(C3dError::SourceConsumed)));
    assert!(matches!(
        Writer::from_source(&mut reader, ConversionMode::Copy),
        Err(C3dError::SourceConsumed)
    ));

    assert_eq!(writer.num_frames(), 4);
    let mut reread = Reader::open(Cursor::new(writer.to_bytes().unwrap())).unwrap();
    let custom = reread.param("custom.values").unwrap();
    assert_eq!(custom.array_values::<i32>().unwrap(), vec![1, -2, 3]);
    assert_eq!(reread.group(20u8).unwrap().desc(), "Vendor data");
    assert_eq!(read_frames(&mut reread), frames);
}

#[test]
fn test_copy_keeps_latin1_descriptions() {
    let frames = make_frames(3, 2, 0, 0, -1.0);
    let mut source = writer_with(WriterConfig::default(), &frames);
    source
        .add_group(20, "CUSTOM", "")
        .unwrap()
        .set("ANGLE", &"#".repeat(200), 1.5f32)
        .unwrap();
    let mut bytes = source.to_bytes().unwrap();

    // Swap the placeholder for 0xB0 ('°' in Latin-1), which is not UTF-8
    let marker = vec![b'#'; 200];
    let latin1 = vec![0xB0u8; 200];
    let at = find(&bytes, &marker).unwrap();
    bytes[at..at + 200].copy_from_slice(&latin1);

    let mut reader = Reader::open(Cursor::new(bytes)).unwrap();
    let angle = reader.param("CUSTOM:ANGLE").unwrap();
    assert_eq!(angle.desc_bytes(), latin1.as_slice());

    let mut writer = Writer::from_source(&mut reader, ConversionMode::Copy).unwrap();
    let copied = writer.to_bytes().unwrap();
    assert!(find(&copied, &latin1).is_some());

    let reread = Reader::open(Cursor::new(copied)).unwrap();
    assert_eq!(
        reread.param("CUSTOM:ANGLE").unwrap().desc_bytes(),
        latin1.as_slice()
    );
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[test]
fn test_copy_metadata_keeps_reader_usable() {
    let frames = make_frames(2, 2, 0, 0, -1.0);
    let bytes = writer_with(WriterConfig::default(), &frames).to_bytes().unwrap();
    let mut reader = Reader::open(Cursor::new(bytes)).unwrap();

    let writer = Writer::from_source(&mut reader, ConversionMode::CopyMetadata).unwrap();
    assert_eq!(writer.num_frames(), 0);
    assert_eq!(writer.metadata(), reader.metadata());
    assert_eq!(read_frames(&mut reader).len(), 2);
}

// =============================================================================
// Damaged files
// =============================================================================

#[test]
fn test_truncated_data_keeps_yielded_frames() {
    let frames = make_frames(6, 4, 2, 4, 0.1);
    let bytes = Fixture::new(Processor::Mips, 0.1).build(&frames);
    let reader = Reader::open(Cursor::new(bytes.clone())).unwrap();
    let data_start = (reader.header().data_block as usize - 1) * BLOCK_SIZE;
    let stride = reader.frame_layout().unwrap().frame_bytes();

    let mut damaged = bytes;
    damaged.truncate(data_start + stride * 4 + 3);
    let mut reader = Reader::open(Cursor::new(damaged)).unwrap();
    let decoded = read_frames(&mut reader);

    assert_eq!(decoded.len(), 4);
    assert_frames_close(&decoded, &frames[..4], 0.1, 1.0);
    assert_eq!(reader.diagnostics().len(), 1);
}

#[test]
fn test_metadata_mismatch_reported() {
    let frames = make_frames(2, 3, 0, 0, 1.0);
    let mut fixture = Fixture::new(Processor::Intel, 1.0);
    fixture.analog_per_frame = 0;
    let mut bytes = fixture.build(&frames);
    // Header point count (offset 2) disagrees with POINT:USED
    bytes[2] = 9;

    let reader = Reader::open(Cursor::new(bytes)).unwrap();
    assert_eq!(reader.diagnostics().len(), 1);
    assert_eq!(reader.point_used(), 3);
}
