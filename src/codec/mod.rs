//! Zlib segment codec and the store-raw policy.
//!
//! Both the data segments and the serialized index use plain zlib streams.
//! The write-time policy is "strictly smaller or store raw": compression
//! overhead is never paid for incompressible content, and a raw segment
//! always has `compressed_size == uncompressed_size`.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};

use crate::error::Xp3Error;

/// Deflate at maximum compression level.
pub fn deflate(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Inflate a whole zlib stream.
pub fn inflate(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

/// Inflate a segment and verify the declared plaintext size.
pub fn inflate_segment(data: &[u8], expected: u64) -> Result<Vec<u8>, Xp3Error> {
    let out = inflate(data)?;
    if out.len() as u64 != expected {
        return Err(Xp3Error::CorruptSegment {
            expected,
            actual: out.len() as u64,
        });
    }
    Ok(out)
}

/// Compress one segment, storing raw unless deflate is strictly smaller.
///
/// Returns the bytes to write plus the `is_compressed` flag for the
/// segment record.
pub fn pack(data: &[u8]) -> io::Result<(Vec<u8>, bool)> {
    let compressed = deflate(data)?;
    if compressed.len() < data.len() {
        Ok((compressed, true))
    } else {
        Ok((data.to_vec(), false))
    }
}
