//! File entry records: the `File` chunk and its sub-chunks.
//!
//! On disk an entry is an optional encryption chunk (`eliF` or `neko`)
//! followed by a `File` chunk whose payload is a sequence of sub-chunks:
//! `time` (optional), `adlr`, `segm`, `info`.  Encrypted entries store the
//! path hash in `info` and carry the real path only in the encryption chunk.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Seek, Write};

use crate::chunk::{
    self, ChunkBody, TAG_ADLR, TAG_ELIF, TAG_FILE, TAG_INFO, TAG_NEKO, TAG_SEGM, TAG_TIME,
};
use crate::error::Xp3Error;

/// `info` flag bit marking an encrypted (protected) entry.
pub const FLAG_ENCRYPTED: u32 = 0x8000_0000;

/// On-disk size of one segment record.
pub const SEGMENT_RECORD_SIZE: u64 = 28;

// ── time ─────────────────────────────────────────────────────────────────────

/// Optional creation timestamp, milliseconds since the Unix epoch.
/// Zero means "not recorded".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileTime {
    pub timestamp_ms: u64,
}

impl FileTime {
    pub fn seconds(&self) -> u64 {
        self.timestamp_ms / 1000
    }

    fn read_from<R: Read + Seek>(r: &mut R) -> Result<Self, Xp3Error> {
        let body = ChunkBody::begin(r)?;
        if body.len != 8 {
            return Err(Xp3Error::format(format!(
                "time chunk length {} (expected 8)",
                body.len
            )));
        }
        let timestamp_ms = r.read_u64::<LittleEndian>()?;
        body.finish(r)?;
        Ok(Self { timestamp_ms })
    }

    fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        chunk::write_chunk(w, TAG_TIME, &self.timestamp_ms.to_le_bytes())
    }
}

// ── segm ─────────────────────────────────────────────────────────────────────

/// One contiguous byte range in the data region.
///
/// `offset` is relative to the archive signature, not to the start of the
/// underlying file (the two differ for executable-bundled archives).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub is_compressed: bool,
    pub offset: u64,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
}

fn read_segments<R: Read + Seek>(r: &mut R) -> Result<Vec<Segment>, Xp3Error> {
    let body = ChunkBody::begin(r)?;
    if body.len == 0 || body.len % SEGMENT_RECORD_SIZE != 0 {
        return Err(Xp3Error::format(format!(
            "segm chunk length {} is not a positive multiple of {SEGMENT_RECORD_SIZE}",
            body.len
        )));
    }
    let count = body.len / SEGMENT_RECORD_SIZE;
    let mut segments = Vec::with_capacity(count as usize);
    for _ in 0..count {
        segments.push(Segment {
            is_compressed: r.read_u32::<LittleEndian>()? != 0,
            offset: r.read_u64::<LittleEndian>()?,
            uncompressed_size: r.read_u64::<LittleEndian>()?,
            compressed_size: r.read_u64::<LittleEndian>()?,
        });
    }
    body.finish(r)?;
    Ok(segments)
}

fn write_segments<W: Write>(w: &mut W, segments: &[Segment]) -> std::io::Result<()> {
    let mut payload = Vec::with_capacity(segments.len() * SEGMENT_RECORD_SIZE as usize);
    for seg in segments {
        payload.write_u32::<LittleEndian>(seg.is_compressed as u32)?;
        payload.write_u64::<LittleEndian>(seg.offset)?;
        payload.write_u64::<LittleEndian>(seg.uncompressed_size)?;
        payload.write_u64::<LittleEndian>(seg.compressed_size)?;
    }
    chunk::write_chunk(w, TAG_SEGM, &payload)
}

// ── adlr ─────────────────────────────────────────────────────────────────────

fn read_adler<R: Read + Seek>(r: &mut R) -> Result<u32, Xp3Error> {
    let body = ChunkBody::begin(r)?;
    if body.len != 4 {
        return Err(Xp3Error::format(format!(
            "adlr chunk length {} (expected 4)",
            body.len
        )));
    }
    let value = r.read_u32::<LittleEndian>()?;
    body.finish(r)?;
    Ok(value)
}

// ── info ─────────────────────────────────────────────────────────────────────

/// Entry metadata: flags, plaintext sizes, and the stored path.
///
/// For encrypted entries `file_path` holds the path hash, not the real path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub is_encrypted: bool,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub file_path: String,
}

impl FileInfo {
    fn read_from<R: Read + Seek>(r: &mut R) -> Result<Self, Xp3Error> {
        let body = ChunkBody::begin(r)?;
        let flags = r.read_u32::<LittleEndian>()?;
        let uncompressed_size = r.read_u64::<LittleEndian>()?;
        let compressed_size = r.read_u64::<LittleEndian>()?;
        let path_len = r.read_u16::<LittleEndian>()? as usize;
        let file_path = chunk::read_utf16_path(r, path_len)?;
        body.finish(r)?;
        Ok(Self {
            is_encrypted: flags & FLAG_ENCRYPTED != 0,
            uncompressed_size,
            compressed_size,
            file_path,
        })
    }

    fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        let mut payload = Vec::new();
        let flags = if self.is_encrypted { FLAG_ENCRYPTED } else { 0 };
        payload.write_u32::<LittleEndian>(flags)?;
        payload.write_u64::<LittleEndian>(self.uncompressed_size)?;
        payload.write_u64::<LittleEndian>(self.compressed_size)?;
        payload.write_u16::<LittleEndian>(chunk::utf16_len(&self.file_path) as u16)?;
        chunk::write_utf16_path(&mut payload, &self.file_path)?;
        chunk::write_chunk(w, TAG_INFO, &payload)
    }
}

// ── encryption chunk ─────────────────────────────────────────────────────────

/// Encryption header preceding the `File` chunk of a protected entry.
///
/// Restates the checksum and carries the real path; the chunk tag
/// distinguishes the archive flavor (`eliF` vs `neko`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEncryption {
    pub chunk_tag: [u8; 4],
    pub checksum: u32,
    pub file_path: String,
}

impl FileEncryption {
    fn read_from<R: Read + Seek>(r: &mut R, chunk_tag: [u8; 4]) -> Result<Self, Xp3Error> {
        let body = ChunkBody::begin(r)?;
        let checksum = r.read_u32::<LittleEndian>()?;
        let path_len = r.read_u16::<LittleEndian>()? as usize;
        let file_path = chunk::read_utf16_path(r, path_len)?;
        body.finish(r)?;
        Ok(Self {
            chunk_tag,
            checksum,
            file_path,
        })
    }

    fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        let mut payload = Vec::new();
        payload.write_u32::<LittleEndian>(self.checksum)?;
        payload.write_u16::<LittleEndian>(chunk::utf16_len(&self.file_path) as u16)?;
        chunk::write_utf16_path(&mut payload, &self.file_path)?;
        chunk::write_chunk(w, self.chunk_tag, &payload)
    }
}

// ── FileEntry ────────────────────────────────────────────────────────────────

/// One archived file: the parsed form of an index entry record.
///
/// Constructed once (at parse time on the read path, at add time on the
/// write path) and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub time: FileTime,
    /// Adler-32 of the plaintext, uncompressed content.
    pub checksum: u32,
    pub segments: Vec<Segment>,
    pub info: FileInfo,
    pub encryption: Option<FileEncryption>,
}

impl FileEntry {
    /// The logical path: the encryption chunk's path when the entry is
    /// encrypted, otherwise `info.file_path`.
    pub fn path(&self) -> &str {
        match &self.encryption {
            Some(enc) => &enc.file_path,
            None => &self.info.file_path,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption.is_some()
    }

    pub fn uncompressed_size(&self) -> u64 {
        self.info.uncompressed_size
    }

    pub fn compressed_size(&self) -> u64 {
        self.info.compressed_size
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.time.timestamp_ms
    }

    /// Parse one entry record starting at the cursor.
    ///
    /// The first tag selects between a plain entry (`File`) and an
    /// encrypted one (`eliF`/`neko` header, then `File`); any other tag is
    /// a format error.  `adlr`, `segm` and `info` sub-chunks are mandatory,
    /// `time` defaults to the zero timestamp.
    pub fn read_from<R: Read + Seek>(r: &mut R) -> Result<Self, Xp3Error> {
        let tag = chunk::read_tag(r)?;
        let encryption = if tag == TAG_FILE {
            None
        } else if tag == TAG_ELIF || tag == TAG_NEKO {
            let enc = FileEncryption::read_from(r, tag)?;
            if chunk::read_tag(r)? != TAG_FILE {
                return Err(Xp3Error::format(
                    "encryption chunk is not followed by a File record",
                ));
            }
            Some(enc)
        } else {
            return Err(Xp3Error::format(format!(
                "unknown entry tag {:?}",
                String::from_utf8_lossy(&tag)
            )));
        };

        let body = ChunkBody::begin(r)?;
        let mut time = None;
        let mut checksum = None;
        let mut segments = None;
        let mut info = None;

        while r.stream_position()? < body.end {
            let tag = chunk::read_tag(r)?;
            match tag {
                TAG_TIME => time = Some(FileTime::read_from(r)?),
                TAG_ADLR => checksum = Some(read_adler(r)?),
                TAG_SEGM => segments = Some(read_segments(r)?),
                TAG_INFO => info = Some(FileInfo::read_from(r)?),
                _ => {
                    return Err(Xp3Error::format(format!(
                        "unknown sub-chunk tag {:?} in File record",
                        String::from_utf8_lossy(&tag)
                    )))
                }
            }
        }
        body.finish(r)?;

        let checksum = checksum.ok_or_else(|| Xp3Error::format("File record missing adlr chunk"))?;
        let segments = segments.ok_or_else(|| Xp3Error::format("File record missing segm chunk"))?;
        let info = info.ok_or_else(|| Xp3Error::format("File record missing info chunk"))?;

        if let Some(enc) = &encryption {
            if enc.checksum != checksum {
                return Err(Xp3Error::format(
                    "checksum values in adlr and encryption chunks do not match",
                ));
            }
        }

        Ok(Self {
            time: time.unwrap_or_default(),
            checksum,
            segments,
            info,
            encryption,
        })
    }

    /// Serialize the entry: encryption chunk (if any), then the `File`
    /// chunk wrapping `time` + `adlr` + `segm` + `info`.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<(), Xp3Error> {
        self.validate()?;

        if let Some(enc) = &self.encryption {
            enc.write_to(w)?;
        }

        let mut body = Vec::new();
        self.time.write_to(&mut body)?;
        chunk::write_chunk(&mut body, TAG_ADLR, &self.checksum.to_le_bytes())?;
        write_segments(&mut body, &self.segments)?;
        self.info.write_to(&mut body)?;

        chunk::write_chunk(w, TAG_FILE, &body)?;
        Ok(())
    }

    /// Cross-chunk invariants enforced before serialization.
    fn validate(&self) -> Result<(), Xp3Error> {
        if self.segments.is_empty() {
            return Err(Xp3Error::format("entry has no segments"));
        }
        let total: u64 = self.segments.iter().map(|s| s.uncompressed_size).sum();
        if total != self.info.uncompressed_size {
            return Err(Xp3Error::format(format!(
                "segment sizes sum to {total}, info declares {}",
                self.info.uncompressed_size
            )));
        }
        if let Some(enc) = &self.encryption {
            if enc.checksum != self.checksum {
                return Err(Xp3Error::format(
                    "checksum values in adlr and encryption chunks do not match",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk;
    use std::io::Cursor;

    fn plain_entry() -> FileEntry {
        FileEntry {
            time: FileTime { timestamp_ms: 1234567000 },
            checksum: 0xCAFE_F00D,
            segments: vec![Segment {
                is_compressed: true,
                offset: 19,
                uncompressed_size: 100,
                compressed_size: 42,
            }],
            info: FileInfo {
                is_encrypted: false,
                uncompressed_size: 100,
                compressed_size: 42,
                file_path: "data/script.ks".into(),
            },
            encryption: None,
        }
    }

    #[test]
    fn plain_entry_roundtrip() {
        let entry = plain_entry();
        let mut buf = Vec::new();
        entry.write_to(&mut buf).unwrap();

        let parsed = FileEntry::read_from(&mut Cursor::new(&buf[..])).unwrap();
        assert_eq!(parsed, entry);
        assert_eq!(parsed.path(), "data/script.ks");
        assert!(!parsed.is_encrypted());
    }

    #[test]
    fn encrypted_entry_roundtrip() {
        let mut entry = plain_entry();
        entry.info.is_encrypted = true;
        entry.info.file_path = "0123456789abcdef0123456789abcdef".into();
        entry.encryption = Some(FileEncryption {
            chunk_tag: *b"neko",
            checksum: entry.checksum,
            file_path: "data/script.ks".into(),
        });

        let mut buf = Vec::new();
        entry.write_to(&mut buf).unwrap();

        let parsed = FileEntry::read_from(&mut Cursor::new(&buf[..])).unwrap();
        assert_eq!(parsed, entry);
        assert_eq!(parsed.path(), "data/script.ks");
        assert!(parsed.is_encrypted());
    }

    #[test]
    fn missing_time_defaults_to_zero() {
        let entry = plain_entry();
        let mut body = Vec::new();
        chunk::write_chunk(&mut body, chunk::TAG_ADLR, &entry.checksum.to_le_bytes()).unwrap();
        super::write_segments(&mut body, &entry.segments).unwrap();
        entry.info.write_to(&mut body).unwrap();
        let mut buf = Vec::new();
        chunk::write_chunk(&mut buf, chunk::TAG_FILE, &body).unwrap();

        let parsed = FileEntry::read_from(&mut Cursor::new(&buf[..])).unwrap();
        assert_eq!(parsed.timestamp_ms(), 0);
    }

    #[test]
    fn missing_adlr_is_rejected() {
        let entry = plain_entry();
        let mut body = Vec::new();
        super::write_segments(&mut body, &entry.segments).unwrap();
        entry.info.write_to(&mut body).unwrap();
        let mut buf = Vec::new();
        chunk::write_chunk(&mut buf, chunk::TAG_FILE, &body).unwrap();

        let err = FileEntry::read_from(&mut Cursor::new(&buf[..])).unwrap_err();
        assert!(matches!(err, Xp3Error::Format(_)));
    }

    #[test]
    fn unknown_entry_tag_is_rejected() {
        let mut buf = Vec::new();
        chunk::write_chunk(&mut buf, *b"Junk", &[0; 16]).unwrap();
        let err = FileEntry::read_from(&mut Cursor::new(&buf[..])).unwrap_err();
        assert!(matches!(err, Xp3Error::Format(_)));
    }

    #[test]
    fn mismatched_encryption_checksum_is_rejected() {
        let mut entry = plain_entry();
        entry.info.is_encrypted = true;
        entry.encryption = Some(FileEncryption {
            chunk_tag: *b"eliF",
            checksum: entry.checksum,
            file_path: "data/script.ks".into(),
        });
        let mut buf = Vec::new();
        entry.write_to(&mut buf).unwrap();
        // Corrupt the adlr value inside the File record.
        let pos = buf
            .windows(4)
            .rposition(|w| w == b"adlr")
            .unwrap();
        buf[pos + 12] ^= 0xFF;

        let err = FileEntry::read_from(&mut Cursor::new(&buf[..])).unwrap_err();
        assert!(matches!(err, Xp3Error::Format(_)));
    }

    #[test]
    fn segment_sum_invariant_enforced_on_write() {
        let mut entry = plain_entry();
        entry.info.uncompressed_size = 7;
        let err = entry.write_to(&mut Vec::new()).unwrap_err();
        assert!(matches!(err, Xp3Error::Format(_)));
    }
}
