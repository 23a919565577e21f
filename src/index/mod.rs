//! Archive-wide file index: location protocol, parsing, serialization.
//!
//! The header's 8-byte offset points at a flag byte.  `0x80` is the legacy
//! continuation sentinel (the real location is behind one more redirect),
//! `0x01` introduces a compressed index, `0x00` a raw one.  The redirect is
//! resolved with a bounded step, not recursion, so a corrupt redirect loop
//! cannot hang the reader.

use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

use crate::codec;
use crate::entry::FileEntry;
use crate::error::Xp3Error;
use crate::XP3_SIGNATURE;

/// Legacy continuation sentinel (KiriKiriZ compatibility).
pub const INDEX_FLAG_CONTINUE: u8 = 0x80;
/// Compressed index follows: u64 compressed size, u64 uncompressed size.
pub const INDEX_FLAG_COMPRESSED: u8 = 0x01;
/// Raw index follows: u64 size.
pub const INDEX_FLAG_RAW: u8 = 0x00;

/// Ordered collection of file entries plus a path → position map.
///
/// Owned exclusively by one reader or writer; insertion order defines the
/// on-disk entry order.
#[derive(Debug, Default)]
pub struct FileIndex {
    entries: Vec<FileEntry>,
    by_path: HashMap<String, usize>,
}

impl FileIndex {
    pub fn from_entries(entries: Vec<FileEntry>) -> Self {
        let by_path = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.path().to_owned(), i))
            .collect();
        Self { entries, by_path }
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn position(&self, path: &str) -> Option<usize> {
        self.by_path.get(path).copied()
    }

    pub fn get(&self, path: &str) -> Option<&FileEntry> {
        self.position(path).map(|i| &self.entries[i])
    }

    pub fn get_at(&self, position: usize) -> Option<&FileEntry> {
        self.entries.get(position)
    }

    // ── Reading ──────────────────────────────────────────────────────────────

    /// Resolve the index location and return its decompressed bytes.
    ///
    /// `base` is the position of the archive signature; all stored offsets
    /// are relative to it.
    pub fn read_raw<R: Read + Seek>(r: &mut R, base: u64) -> Result<Vec<u8>, Xp3Error> {
        let stream_len = r.seek(SeekFrom::End(0))?;

        r.seek(SeekFrom::Start(base + XP3_SIGNATURE.len() as u64))?;
        let offset = r.read_u64::<LittleEndian>()?;
        if offset == 0 {
            return Err(Xp3Error::format("file index offset is missing"));
        }

        seek_checked(r, base, offset)?;
        let mut flag = r.read_u8()?;
        if flag == INDEX_FLAG_CONTINUE {
            // Index is in another castle: skip the reserved field, follow
            // the redirect, re-read the flag.  One level at most.
            r.seek(SeekFrom::Current(8))?;
            let redirect = r.read_u64::<LittleEndian>()?;
            seek_checked(r, base, redirect)?;
            flag = r.read_u8()?;
        }

        match flag {
            INDEX_FLAG_COMPRESSED => {
                let compressed_size = r.read_u64::<LittleEndian>()?;
                let uncompressed_size = r.read_u64::<LittleEndian>()?;
                let pos = r.stream_position()?;
                if compressed_size > stream_len.saturating_sub(pos) {
                    return Err(Xp3Error::format(format!(
                        "index declares {compressed_size} compressed bytes, only {} remain",
                        stream_len.saturating_sub(pos)
                    )));
                }
                let mut compressed = vec![0u8; compressed_size as usize];
                r.read_exact(&mut compressed)?;
                let index = codec::inflate(&compressed)?;
                if index.len() as u64 != uncompressed_size {
                    return Err(Xp3Error::format(format!(
                        "index inflated to {} bytes, declared {uncompressed_size}",
                        index.len()
                    )));
                }
                Ok(index)
            }
            INDEX_FLAG_RAW => {
                let size = r.read_u64::<LittleEndian>()?;
                let pos = r.stream_position()?;
                if size > stream_len.saturating_sub(pos) {
                    return Err(Xp3Error::format(format!(
                        "index declares {size} bytes, only {} remain",
                        stream_len.saturating_sub(pos)
                    )));
                }
                let mut index = vec![0u8; size as usize];
                r.read_exact(&mut index)?;
                Ok(index)
            }
            other => Err(Xp3Error::UnsupportedIndexFormat(other)),
        }
    }

    /// Resolve, decompress and parse the whole index.
    pub fn read_from<R: Read + Seek>(r: &mut R, base: u64) -> Result<Self, Xp3Error> {
        let raw = Self::read_raw(r, base)?;
        Self::parse(&raw)
    }

    /// Parse concatenated entry records.
    pub fn parse(bytes: &[u8]) -> Result<Self, Xp3Error> {
        let mut cursor = std::io::Cursor::new(bytes);
        let mut entries = Vec::new();
        while (cursor.position() as usize) < bytes.len() {
            entries.push(FileEntry::read_from(&mut cursor)?);
        }
        Ok(Self::from_entries(entries))
    }

    // ── Writing ──────────────────────────────────────────────────────────────

    /// Serialize entries with the compress-vs-raw heuristic.
    ///
    /// The compressed header carries two sizes, the raw one a single size,
    /// so the compressed form is only emitted when it wins including that
    /// 8-byte difference.
    pub fn serialize(entries: &[FileEntry]) -> Result<Vec<u8>, Xp3Error> {
        let mut raw = Vec::new();
        for entry in entries {
            entry.write_to(&mut raw)?;
        }
        let compressed = codec::deflate(&raw)?;

        let mut out = Vec::new();
        if compressed.len() + 1 + 8 + 8 < raw.len() + 1 + 8 {
            out.push(INDEX_FLAG_COMPRESSED);
            out.extend_from_slice(&(compressed.len() as u64).to_le_bytes());
            out.extend_from_slice(&(raw.len() as u64).to_le_bytes());
            out.extend_from_slice(&compressed);
        } else {
            out.push(INDEX_FLAG_RAW);
            out.extend_from_slice(&(raw.len() as u64).to_le_bytes());
            out.extend_from_slice(&raw);
        }
        Ok(out)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Xp3Error> {
        Self::serialize(&self.entries)
    }
}

fn seek_checked<R: Seek>(r: &mut R, base: u64, offset: u64) -> Result<u64, Xp3Error> {
    let target = base
        .checked_add(offset)
        .ok_or_else(|| Xp3Error::format(format!("index offset {offset} overflows")))?;
    Ok(r.seek(SeekFrom::Start(target))?)
}
