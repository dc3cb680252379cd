//! Reading C3D files
//!
//! [`Reader::open`] parses the header and the parameter section up front.
//! Frames are decoded lazily by [`Reader::frames`], one read per frame.

use std::io::{self, Read, Seek, SeekFrom};

use crate::BLOCK_SIZE;
use crate::error::{C3dError, Result};
use crate::frame::{Frame, FrameCodec, ReadOptions};
use crate::header::Header;
use crate::manager::{Diagnostic, Manager};
use crate::metadata::{MetadataStore, SECTION_PROLOGUE};
use crate::processor::Processor;
use crate::writer::{ConversionMode, Writer};

type DiagnosticHandler = Box<dyn FnMut(&Diagnostic)>;

/// A C3D file opened for reading
///
/// The reader owns the handle and its cursor. Each call to [`Reader::frames`]
/// seeks back to the data section, so iterations never overlap.
pub struct Reader<R> {
    handle: R,
    processor: Processor,
    header: Header,
    metadata: MetadataStore,
    consumed: bool,
    diagnostics: Vec<Diagnostic>,
    handler: Option<DiagnosticHandler>,
}

impl<R: Read + Seek> Reader<R> {
    /// Parse the header and parameter section
    pub fn open(mut handle: R) -> Result<Self> {
        handle.seek(SeekFrom::Start(0))?;
        let mut block = [0u8; BLOCK_SIZE];
        let read = read_full(&mut handle, &mut block)?;
        if read < BLOCK_SIZE {
            return Err(C3dError::TruncatedHeader {
                expected: BLOCK_SIZE,
                actual: read,
            });
        }
        let mut header = Header::parse(&block)?;

        if header.parameter_block == 0 {
            return Err(C3dError::metadata("header points at parameter block 0"));
        }
        let section_start = (header.parameter_block as u64 - 1) * BLOCK_SIZE as u64;
        handle.seek(SeekFrom::Start(section_start))?;
        let mut prologue = [0u8; SECTION_PROLOGUE];
        if read_full(&mut handle, &mut prologue)? < SECTION_PROLOGUE {
            return Err(C3dError::metadata("file ends before the parameter section"));
        }

        let processor = Processor::from_tag(prologue[3])?;
        header.reinterpret_for_processor(&block, processor)?;

        let section_len = (prologue[2] as usize * BLOCK_SIZE).saturating_sub(SECTION_PROLOGUE);
        let mut records = Vec::with_capacity(section_len);
        (&mut handle)
            .take(section_len as u64)
            .read_to_end(&mut records)?;
        let metadata = MetadataStore::parse(&records, processor)?;

        log::debug!(
            "Opened {} C3D file: {} parameter blocks, {} groups",
            processor,
            prologue[2],
            metadata.len()
        );

        let mut reader = Self {
            handle,
            processor,
            header,
            metadata,
            consumed: false,
            diagnostics: Vec::new(),
            handler: None,
        };
        for diagnostic in reader.check_metadata() {
            reader.report(diagnostic);
        }
        Ok(reader)
    }

    /// Lazily decode every frame with default [`ReadOptions`]
    pub fn frames(&mut self) -> Result<Frames<'_, R>> {
        self.frames_with(ReadOptions::default())
    }

    /// Lazily decode every frame
    ///
    /// The sequence is single-pass. It ends after the declared frame count
    /// or early, with a [`Diagnostic::TruncatedFrame`], on a short read.
    pub fn frames_with(&mut self, options: ReadOptions) -> Result<Frames<'_, R>> {
        if self.consumed {
            return Err(C3dError::SourceConsumed);
        }
        let layout = self.frame_layout()?;
        let codec = FrameCodec::new(layout, self.analog_transform(), options);

        if self.header.data_block == 0 {
            return Err(C3dError::metadata("header points at data block 0"));
        }
        let data_start = (self.header.data_block as u64 - 1) * BLOCK_SIZE as u64;
        self.handle.seek(SeekFrom::Start(data_start))?;

        log::debug!(
            "Reading {} frames of {} bytes from byte {}",
            self.frame_count(),
            layout.frame_bytes(),
            data_start
        );

        Ok(Frames {
            buffer: vec![0; layout.frame_bytes()],
            codec,
            first_frame: self.first_frame(),
            count: self.frame_count(),
            next_index: 0,
            done: false,
            reader: self,
        })
    }

    /// Convert into a [`Writer`]
    pub fn into_writer(mut self, mode: ConversionMode) -> Result<Writer> {
        Writer::from_source(&mut self, mode)
    }

    fn check_trailing_data(&mut self) -> Result<()> {
        let position = self.handle.stream_position()?;
        let end = self.handle.seek(SeekFrom::End(0))?;
        self.handle.seek(SeekFrom::Start(position))?;

        let remaining = end.saturating_sub(position);
        if remaining >= BLOCK_SIZE as u64 {
            self.report(Diagnostic::TrailingData { bytes: remaining });
        }
        Ok(())
    }
}

impl<R> Reader<R> {
    /// Processor profile declared by the file
    pub fn processor(&self) -> Processor {
        self.processor
    }

    /// Non-fatal conditions seen so far, oldest first
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Call `handler` for every diagnostic reported from now on
    pub fn set_diagnostic_handler(&mut self, handler: impl FnMut(&Diagnostic) + 'static) {
        self.handler = Some(Box::new(handler));
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Give back the underlying handle
    pub fn into_inner(self) -> R {
        self.handle
    }

    /// Move header and metadata out, leaving the reader unusable for frames
    pub(crate) fn take_contents(&mut self) -> Result<(Header, MetadataStore)> {
        if self.consumed {
            return Err(C3dError::SourceConsumed);
        }
        self.consumed = true;
        Ok((
            std::mem::take(&mut self.header),
            std::mem::replace(&mut self.metadata, MetadataStore::new(self.processor)),
        ))
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        log::warn!("{diagnostic}");
        if let Some(handler) = self.handler.as_mut() {
            handler(&diagnostic);
        }
        self.diagnostics.push(diagnostic);
    }
}

impl<R> Manager for Reader<R> {
    fn header(&self) -> &Header {
        &self.header
    }

    fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }
}

/// Lazy frame sequence borrowed from a [`Reader`]
///
/// Yields `(frame_number, frame)` with numbers counting up from the first
/// frame. Not restartable; call [`Reader::frames`] again to start over.
pub struct Frames<'r, R> {
    reader: &'r mut Reader<R>,
    codec: FrameCodec,
    buffer: Vec<u8>,
    first_frame: u32,
    count: usize,
    next_index: usize,
    done: bool,
}

impl<R: Read + Seek> Frames<'_, R> {
    /// Frames the header and parameters declare
    pub fn declared_count(&self) -> usize {
        self.count
    }

    fn next_frame(&mut self) -> Result<Option<(u32, Frame)>> {
        if self.next_index >= self.count {
            self.done = true;
            self.reader.check_trailing_data()?;
            return Ok(None);
        }

        let read = read_full(&mut self.reader.handle, &mut self.buffer)?;
        if read < self.buffer.len() {
            self.done = true;
            let position = self.reader.handle.stream_position()?;
            self.reader.report(Diagnostic::TruncatedFrame {
                frame_index: self.next_index,
                position,
            });
            return Ok(None);
        }

        let frame = self.codec.decode(&self.buffer)?;
        let number = self.first_frame + self.next_index as u32;
        self.next_index += 1;
        Ok(Some((number, frame)))
    }
}

impl<R: Read + Seek> Iterator for Frames<'_, R> {
    type Item = Result<(u32, Frame)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_frame() {
            Ok(frame) => frame.map(Ok),
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Read until `buf` is full or the stream ends, returning the bytes read
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
