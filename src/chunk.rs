//! Tag/length/payload chunk grammar shared by every index record.
//!
//! A chunk is a 4-byte ASCII tag, a u64 little-endian payload length, and
//! exactly that many payload bytes.  Declared lengths come from the archive
//! and are never trusted: [`ChunkBody`] records where the payload must end
//! and `finish()` fails unless the cursor lands exactly there, which catches
//! both truncated payloads and lying length fields.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Seek, Write};

use crate::error::Xp3Error;

// ── Chunk tags ───────────────────────────────────────────────────────────────

/// Entry record container.
pub const TAG_FILE: [u8; 4] = *b"File";
/// Optional creation timestamp.
pub const TAG_TIME: [u8; 4] = *b"time";
/// Adler-32 checksum of the plaintext content.
pub const TAG_ADLR: [u8; 4] = *b"adlr";
/// Segment list.
pub const TAG_SEGM: [u8; 4] = *b"segm";
/// Entry metadata (flags, sizes, stored path).
pub const TAG_INFO: [u8; 4] = *b"info";
/// Encryption header, standard flavor.
pub const TAG_ELIF: [u8; 4] = *b"eliF";
/// Encryption header, `neko` flavor.
pub const TAG_NEKO: [u8; 4] = *b"neko";

// ── Reading ──────────────────────────────────────────────────────────────────

/// Read the next 4-byte chunk tag.
pub fn read_tag<R: Read>(r: &mut R) -> io::Result<[u8; 4]> {
    let mut tag = [0u8; 4];
    r.read_exact(&mut tag)?;
    Ok(tag)
}

/// Bounds of a chunk payload whose length field has been consumed.
#[derive(Debug, Clone, Copy)]
pub struct ChunkBody {
    pub len: u64,
    pub end: u64,
}

impl ChunkBody {
    /// Read the u64 length field and record where the payload must end.
    pub fn begin<R: Read + Seek>(r: &mut R) -> Result<Self, Xp3Error> {
        let len = r.read_u64::<LittleEndian>()?;
        let start = r.stream_position()?;
        let end = start
            .checked_add(len)
            .ok_or_else(|| Xp3Error::format(format!("chunk length {len} overflows cursor")))?;
        Ok(Self { len, end })
    }

    /// Verify the cursor sits exactly at the declared payload end.
    pub fn finish<R: Seek>(&self, r: &mut R) -> Result<(), Xp3Error> {
        let pos = r.stream_position()?;
        if pos != self.end {
            return Err(Xp3Error::format(format!(
                "chunk cursor at {pos}, expected {} (declared length {})",
                self.end, self.len
            )));
        }
        Ok(())
    }
}

// ── Writing ──────────────────────────────────────────────────────────────────

/// Emit tag + u64 length + payload with no padding.
pub fn write_chunk<W: Write>(w: &mut W, tag: [u8; 4], payload: &[u8]) -> io::Result<()> {
    w.write_all(&tag)?;
    w.write_u64::<LittleEndian>(payload.len() as u64)?;
    w.write_all(payload)
}

// ── UTF-16LE path strings ────────────────────────────────────────────────────

/// Read `code_units` UTF-16LE code units plus the 2-byte null terminator.
pub fn read_utf16_path<R: Read>(r: &mut R, code_units: usize) -> Result<String, Xp3Error> {
    let mut units = Vec::with_capacity(code_units);
    for _ in 0..code_units {
        units.push(r.read_u16::<LittleEndian>()?);
    }
    let terminator = r.read_u16::<LittleEndian>()?;
    if terminator != 0 {
        return Err(Xp3Error::format("path string is not null-terminated"));
    }
    String::from_utf16(&units).map_err(|_| Xp3Error::format("path is not valid UTF-16"))
}

/// Write a path as UTF-16LE code units plus a 2-byte null terminator.
pub fn write_utf16_path<W: Write>(w: &mut W, path: &str) -> io::Result<()> {
    for unit in path.encode_utf16() {
        w.write_u16::<LittleEndian>(unit)?;
    }
    w.write_u16::<LittleEndian>(0)
}

/// Number of UTF-16 code units in a path (the on-disk length field).
pub fn utf16_len(path: &str) -> usize {
    path.encode_utf16().count()
}
