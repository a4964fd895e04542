//! Encode raw, headerless RGB pixel buffers into minimal PNG files.
//!
//! The encoder targets one fixed configuration: 8-bit depth, RGB color
//! type, no interlacing, filter type 0 ("none") on every scanline, and an
//! advisory 3-entry palette. Pixels go in row-major, 3 bytes per pixel,
//! no padding.

extern crate byteorder;
extern crate flate2;
#[macro_use]
extern crate log;
#[cfg(test)]
extern crate inflate;

mod png;

pub use png::{crc32, encode, encode_file, Error, PNG_FILE_HEADER};
