// png.rs -- rgb2png
// Raw RGB buffer to PNG container encoder.

use std;
use std::io::{self, Read, Write};
use std::path::Path;
use std::{fmt, fs};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use flate2::read::ZlibEncoder;
use flate2::Compression;

/// The fixed 8-byte signature every PNG file starts with.
pub static PNG_FILE_HEADER: [u8; 8] = [0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a];

const BIT_DEPTH: u8 = 8;
const COLOR_TYPE_RGB: u8 = 2;
const CHANNELS: usize = 3;

// Advisory palette; readers ignore PLTE when the color type is RGB.
const PALETTE: [u8; 9] = [
	0xff, 0x00, 0x00, // red
	0x00, 0xff, 0x00, // green
	0x00, 0x00, 0xff, // blue
];

/// The errors that can be returned if `encode()` or `encode_file()` fails.
#[derive(Debug)]
pub enum Error {
	/// Raw buffer size doesn't equal `width * height * 3`
	BadGeometry { expected: u64, actual: u64 },
	/// Zero dimension, or a chunk payload too long for its length field
	InvalidArg(&'static str),
	/// The zlib stream reported a failure mid-compression
	Zlib(io::Error),
	/// Reading the raw buffer or writing the image failed
	Io(io::Error),
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error::Io(e)
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			Error::BadGeometry { expected, actual } => write!(
				f,
				"raw buffer is {} bytes but width * height * 3 = {}",
				actual, expected
			),
			Error::InvalidArg(msg) => write!(f, "invalid argument: {}", msg),
			Error::Zlib(ref e) => write!(f, "zlib stream error: {}", e),
			Error::Io(ref e) => write!(f, "io error: {}", e),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match *self {
			Error::Zlib(ref e) | Error::Io(ref e) => Some(e),
			_ => None,
		}
	}
}

struct Crc32 {
	r: u32,
}

impl Crc32 {
	fn new() -> Crc32 {
		Crc32 { r: 0xffff_ffff }
	}

	fn put(&mut self, bytes: &[u8]) {
		for &byte in bytes {
			self.r ^= byte as u32;
			for _ in 0..8 {
				self.r = if self.r & 1 != 0 {
					(self.r >> 1) ^ 0xedb8_8320
				} else {
					self.r >> 1
				};
			}
		}
	}

	fn finish(self) -> u32 {
		self.r ^ 0xffff_ffff
	}
}

/// Computes the CRC-32 of `bytes` (reversed polynomial `0xEDB88320`, the
/// PNG/zip variant).
pub fn crc32(bytes: &[u8]) -> u32 {
	let mut crc = Crc32::new();
	crc.put(bytes);
	crc.finish()
}

// Zlib-wraps `data` at maximum compression. The compressed size isn't
// knowable up front, so bytes are pulled out through a fixed scratch
// buffer until the encoder has flushed its trailer and reports EOF.
fn compress(data: &[u8]) -> Result<Vec<u8>, Error> {
	let mut encoder = ZlibEncoder::new(data, Compression::best());
	let mut compressed = Vec::new();
	let mut buf = [0u8; 4096];

	loop {
		let n = encoder.read(&mut buf).map_err(Error::Zlib)?;
		if n == 0 {
			break;
		}
		compressed.extend_from_slice(&buf[..n]);
	}

	Ok(compressed)
}

// Prepends the filter-type byte 0 ("none") to every scanline. `data` must
// already be validated to hold exactly `height` rows of `width * 3` bytes.
fn add_filter_bytes(data: &[u8], width: u32, height: u32) -> Vec<u8> {
	let row_size = width as usize * CHANNELS;
	let mut filtered = Vec::with_capacity(data.len() + height as usize);

	for row in data.chunks(row_size) {
		filtered.push(0x00);
		filtered.extend_from_slice(row);
	}

	filtered
}

// The one framing routine every chunk goes through: length is always taken
// from the payload itself and the CRC always covers type ++ payload.
fn write_chunk<W: Write>(writer: &mut W, kind: &[u8; 4], data: &[u8]) -> Result<(), Error> {
	if 0x7fff_ffff < data.len() {
		return Err(Error::InvalidArg("chunk too long"));
	}

	writer.write_u32::<BigEndian>(data.len() as u32)?;
	writer.write_all(kind)?;
	writer.write_all(data)?;

	let mut crc = Crc32::new();
	crc.put(kind);
	crc.put(data);
	writer.write_u32::<BigEndian>(crc.finish())?;

	Ok(())
}

fn ihdr_payload(width: u32, height: u32) -> [u8; 13] {
	let mut payload = [0u8; 13];
	BigEndian::write_u32(&mut payload[0..4], width);
	BigEndian::write_u32(&mut payload[4..8], height);
	payload[8] = BIT_DEPTH;
	payload[9] = COLOR_TYPE_RGB;
	// compression method, filter method, interlace method stay 0
	payload
}

/// Encodes a raw RGB buffer as a PNG and writes it to `writer`.
///
/// `data` is row-major, 3 bytes per pixel, and must be exactly
/// `width * height * 3` bytes long. The chunk sequence is always
/// IHDR, PLTE, IDAT, IEND; any failure aborts mid-stream and leaves
/// whatever was already written.
pub fn encode<W: Write>(writer: &mut W, width: u32, height: u32, data: &[u8]) -> Result<(), Error> {
	if width < 1 || height < 1 {
		return Err(Error::InvalidArg("width and height must be at least 1"));
	}
	let expected = width as u64 * height as u64 * CHANNELS as u64;
	if data.len() as u64 != expected {
		return Err(Error::BadGeometry {
			expected,
			actual: data.len() as u64,
		});
	}

	writer.write_all(&PNG_FILE_HEADER)?;
	write_chunk(writer, b"IHDR", &ihdr_payload(width, height))?;
	write_chunk(writer, b"PLTE", &PALETTE)?;

	let filtered = add_filter_bytes(data, width, height);
	let compressed = compress(&filtered)?;
	debug!(
		"compressed {} filtered bytes into {}",
		filtered.len(),
		compressed.len()
	);
	write_chunk(writer, b"IDAT", &compressed)?;

	write_chunk(writer, b"IEND", &[])?;
	writer.flush()?;
	Ok(())
}

/// Reads a raw RGB buffer from `raw_path` and writes the encoded PNG to
/// `out_path`.
///
/// The raw file's size is checked against `width * height * 3` before the
/// output file is created. On failure the output file may be left
/// truncated; both handles are released on every exit path.
pub fn encode_file<P, Q>(raw_path: P, width: u32, height: u32, out_path: Q) -> Result<(), Error>
where
	P: AsRef<Path>,
	Q: AsRef<Path>,
{
	let expected = width as u64 * height as u64 * CHANNELS as u64;
	let meta = fs::metadata(&raw_path)?;
	if meta.len() != expected {
		return Err(Error::BadGeometry {
			expected,
			actual: meta.len(),
		});
	}

	let data = fs::read(&raw_path)?;
	debug!(
		"read {} raw bytes from {}",
		data.len(),
		raw_path.as_ref().display()
	);

	let mut file = io::BufWriter::new(fs::File::create(&out_path)?);
	encode(&mut file, width, height, &data)?;
	debug!("wrote {}", out_path.as_ref().display());
	Ok(())
}
