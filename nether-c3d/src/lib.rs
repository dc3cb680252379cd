//! Nether-C3D: C3D motion capture file reader and writer for Nethercore
//!
//! This crate provides a pure Rust reader and writer for the C3D format used
//! by optical motion capture systems to store marker trajectories and analog
//! channels (force plates, EMG) together with self-describing metadata.
//!
//! # Key Features
//!
//! - **All three processor profiles**: Intel (IEEE little-endian), DEC
//!   (VAX F-float) and MIPS (IEEE big-endian) files are read transparently
//! - **Lazy frames**: frames are decoded one read at a time
//! - **Lossless metadata**: unknown groups and parameters round-trip as raw bytes
//! - **Writer**: build files from scratch or convert an opened file
//!
//! # C3D Format Overview
//!
//! C3D files are laid out in 512-byte blocks:
//! - Block 1: header with counts, rates, the point scale and an event table
//! - Parameter section: groups of typed, dimensioned parameters
//! - Data section: fixed-stride frames of point and analog samples
//!
//! # Usage
//!
//! ```ignore
//! use nether_c3d::{Manager, Reader};
//!
//! let file = std::fs::File::open("walk.c3d").unwrap();
//! let mut reader = Reader::open(file).unwrap();
//!
//! println!("Points: {} at {} Hz", reader.point_used(), reader.point_rate());
//! for frame in reader.frames().unwrap() {
//!     let (number, frame) = frame.unwrap();
//!     println!("frame {number}: {:?}", frame.points[0]);
//! }
//! ```
//!
//! # Format Reference
//!
//! - The C3D File Format User Guide, Motion Lab Systems
//! - <https://www.c3d.org>

mod error;
mod frame;
mod header;
mod manager;
mod metadata;
mod processor;
mod reader;
mod writer;

pub use error::{C3dError, Result};
pub use frame::{
    AnalogFormat, AnalogTransform, Frame, FrameCodec, FrameLayout, ReadOptions, CAMERA_COLUMN,
    INVALID_POINT_WORD, POINT_COLUMNS, RESIDUAL_COLUMN,
};
pub use header::{Event, Header, HEADER_KEY, MAX_EVENTS};
pub use manager::{Diagnostic, Manager};
pub use metadata::{
    CHAR_WIDTH, Group, GroupKey, MAX_GROUP_ID, MetadataStore, Param, ParamValue, SECTION_PROLOGUE,
};
pub use processor::{
    PROCESSOR_DEC, PROCESSOR_INTEL, PROCESSOR_MIPS, Processor, dec_to_ieee, dec_to_ieee_slice,
    ieee_to_dec,
};
pub use reader::{Frames, Reader};
pub use writer::{ConversionMode, Writer, WriterConfig};

// =============================================================================
// Constants
// =============================================================================

/// Size of every header, parameter and data block
pub const BLOCK_SIZE: usize = 512;

/// Header value marking a 16-bit field that overflowed
pub const U16_OVERFLOW: u16 = u16::MAX;
