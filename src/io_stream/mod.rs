//! Archive engine — writer and reader.
//!
//! # Writer
//! [`Xp3Writer`] accepts files one at a time: the plaintext is checksummed,
//! optionally XOR-encrypted, compressed when that is strictly smaller, and
//! appended as one segment.  Entry records accumulate in memory; `finalize()`
//! serializes the index, appends it, and patches the header offset.
//! Finalize is idempotent and adding after it fails.
//!
//! # Reader
//! [`Xp3Reader`] locates the signature with a bounded backward scan (archives
//! may sit behind an executable stub), resolves the index location protocol
//! (including the legacy one-level redirect), and parses the entry list.
//! Content access goes through [`ArchiveFile`] handles: segments are read in
//! declared order, inflated, un-XORed, and the checksum is recomputed.  A
//! mismatch is reported as a warning by default; `read_verified` escalates
//! it, `read_raw` skips decryption entirely.
//!
//! # Endianness
//! All binary I/O is strictly little-endian; see `chunk.rs` and `entry.rs`
//! for field-level documentation.

use byteorder::{LittleEndian, WriteBytesExt};
use log::{debug, warn};
use std::collections::HashSet;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::codec;
use crate::crypto::{self, EncryptionProfile};
use crate::entry::{FileEncryption, FileEntry, FileInfo, FileTime, Segment};
use crate::error::Xp3Error;
use crate::index::FileIndex;
use crate::XP3_SIGNATURE;

/// How far into the stream the signature scan looks.
pub const SIGNATURE_SCAN_WINDOW: usize = 4096;

/// Find the signature within the scan window, returning its position.
///
/// The *last* occurrence wins: executable stubs can embed the magic bytes
/// by accident, the real archive always starts at the final one.
fn locate_signature<R: Read + Seek>(r: &mut R) -> Result<u64, Xp3Error> {
    r.seek(SeekFrom::Start(0))?;
    let mut window = Vec::with_capacity(SIGNATURE_SCAN_WINDOW);
    r.by_ref()
        .take(SIGNATURE_SCAN_WINDOW as u64)
        .read_to_end(&mut window)?;
    window
        .windows(XP3_SIGNATURE.len())
        .rposition(|w| w == XP3_SIGNATURE)
        .map(|pos| pos as u64)
        .ok_or_else(|| Xp3Error::format("XP3 signature not found"))
}

// ── Reader ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Xp3Reader<R: Read + Seek> {
    reader: R,
    /// Position of the signature; every stored offset is relative to it.
    base: u64,
    index: FileIndex,
}

impl<R: Read + Seek> Xp3Reader<R> {
    /// Open an archive: locate the signature, resolve and parse the index.
    pub fn new(mut reader: R) -> Result<Self, Xp3Error> {
        let base = locate_signature(&mut reader)?;
        let index = FileIndex::read_from(&mut reader, base)?;
        Ok(Self { reader, base, index })
    }

    /// Entries in on-disk index order.
    pub fn entries(&self) -> impl Iterator<Item = &FileEntry> {
        self.index.entries().iter()
    }

    pub fn index(&self) -> &FileIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Whether any entry is encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.index.entries().iter().any(|e| e.is_encrypted())
    }

    /// Raw decompressed index bytes (for diagnostics and index dumps).
    pub fn dump_index(&mut self) -> Result<Vec<u8>, Xp3Error> {
        FileIndex::read_raw(&mut self.reader, self.base)
    }

    /// Open an entry by logical path.
    pub fn open(&mut self, path: &str) -> Result<ArchiveFile<'_, R>, Xp3Error> {
        let position = self
            .index
            .position(path)
            .ok_or_else(|| Xp3Error::KeyNotFound(path.to_owned()))?;
        self.open_at(position)
    }

    /// Open an entry by index position.
    pub fn open_at(&mut self, position: usize) -> Result<ArchiveFile<'_, R>, Xp3Error> {
        let entry = self
            .index
            .get_at(position)
            .ok_or_else(|| Xp3Error::KeyNotFound(format!("#{position}")))?;
        Ok(ArchiveFile {
            reader: &mut self.reader,
            base: self.base,
            entry,
        })
    }

    /// Convenience: open + read in one call.
    pub fn read_file(&mut self, path: &str, profile: &EncryptionProfile) -> Result<Vec<u8>, Xp3Error> {
        self.open(path)?.read(profile)
    }

    /// Give the underlying stream back.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

// ── Entry handle ─────────────────────────────────────────────────────────────

/// Handle onto one entry with access to the archive bytes.
pub struct ArchiveFile<'a, R: Read + Seek> {
    reader: &'a mut R,
    base: u64,
    entry: &'a FileEntry,
}

impl<'a, R: Read + Seek> ArchiveFile<'a, R> {
    pub fn entry(&self) -> &FileEntry {
        self.entry
    }

    pub fn path(&self) -> &str {
        self.entry.path()
    }

    /// Read and decrypt the content.
    ///
    /// Fails with [`Xp3Error::DecryptionRequired`] when the entry is
    /// encrypted and `profile` is the `none` profile.  A checksum mismatch
    /// after decryption (wrong profile, or a damaged archive) is logged as
    /// a warning and the bytes are returned anyway.
    pub fn read(&mut self, profile: &EncryptionProfile) -> Result<Vec<u8>, Xp3Error> {
        let (data, computed) = self.read_checked(profile)?;
        if computed != self.entry.checksum {
            warn!(
                "checksum error in {:?} (stored {:#010x}, computed {computed:#010x}), continuing",
                self.entry.path(),
                self.entry.checksum,
            );
        }
        Ok(data)
    }

    /// Like [`read`](Self::read), but a checksum mismatch is an error.
    pub fn read_verified(&mut self, profile: &EncryptionProfile) -> Result<Vec<u8>, Xp3Error> {
        let (data, computed) = self.read_checked(profile)?;
        if computed != self.entry.checksum {
            return Err(Xp3Error::ChecksumMismatch {
                stored: self.entry.checksum,
                computed,
            });
        }
        Ok(data)
    }

    /// Decompressed but still-encrypted bytes, no checksum verification.
    pub fn read_raw(&mut self) -> Result<Vec<u8>, Xp3Error> {
        self.read_segments()
    }

    fn read_checked(&mut self, profile: &EncryptionProfile) -> Result<(Vec<u8>, u32), Xp3Error> {
        let mut data = self.read_segments()?;
        if self.entry.is_encrypted() {
            if profile.is_none() {
                return Err(Xp3Error::DecryptionRequired);
            }
            crypto::apply_keystream(&mut data, self.entry.checksum, profile);
        }
        let computed = adler::adler32_slice(&data);
        Ok((data, computed))
    }

    /// Concatenate the decoded bytes of every segment in list order.
    fn read_segments(&mut self) -> Result<Vec<u8>, Xp3Error> {
        let mut out = Vec::new();
        for seg in &self.entry.segments {
            let target = self
                .base
                .checked_add(seg.offset)
                .ok_or_else(|| Xp3Error::format(format!("segment offset {} overflows", seg.offset)))?;
            self.reader.seek(SeekFrom::Start(target))?;
            let mut stored = vec![0u8; seg.compressed_size as usize];
            self.reader.read_exact(&mut stored)?;

            if seg.is_compressed {
                out.extend_from_slice(&codec::inflate_segment(&stored, seg.uncompressed_size)?);
            } else {
                if seg.compressed_size != seg.uncompressed_size {
                    return Err(Xp3Error::CorruptSegment {
                        expected: seg.uncompressed_size,
                        actual: seg.compressed_size,
                    });
                }
                out.extend_from_slice(&stored);
            }
        }
        Ok(out)
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct Xp3Writer<W: Write + Seek> {
    writer: W,
    entries: Vec<FileEntry>,
    paths: HashSet<String>,
    index_offset: Option<u64>,
}

impl<W: Write + Seek> Xp3Writer<W> {
    /// Start a new archive: signature plus a zero index-offset placeholder.
    pub fn new(mut writer: W) -> Result<Self, Xp3Error> {
        writer.seek(SeekFrom::Start(0))?;
        writer.write_all(XP3_SIGNATURE)?;
        writer.write_u64::<LittleEndian>(0)?;
        Ok(Self {
            writer,
            entries: Vec::new(),
            paths: HashSet::new(),
            index_offset: None,
        })
    }

    /// Add one file from plaintext bytes.
    ///
    /// `timestamp_ms` is milliseconds since the Unix epoch, zero when not
    /// recorded.  Duplicate paths are rejected before any encoding work, so
    /// a failed add leaves the entry list and the sink untouched.
    pub fn add(
        &mut self,
        path: &str,
        data: &[u8],
        profile: &EncryptionProfile,
        timestamp_ms: u64,
    ) -> Result<(), Xp3Error> {
        if self.index_offset.is_some() {
            return Err(Xp3Error::ArchiveFinalized);
        }
        if self.paths.contains(path) {
            return Err(Xp3Error::DuplicatePath(path.to_owned()));
        }

        let checksum = adler::adler32_slice(data);
        let encrypted = !profile.is_none();

        // Encrypt first, then compress: the read path inflates before it
        // un-XORs, and the two do not commute.
        let (stored, is_compressed) = if encrypted {
            let mut ciphertext = data.to_vec();
            crypto::apply_keystream(&mut ciphertext, checksum, profile);
            codec::pack(&ciphertext)?
        } else {
            codec::pack(data)?
        };

        let offset = self.writer.stream_position()?;
        self.writer.write_all(&stored)?;
        debug!("packing {path} ({} -> {} bytes)", data.len(), stored.len());

        let (info_path, encryption) = if encrypted {
            (
                crypto::path_hash(path),
                Some(FileEncryption {
                    chunk_tag: profile.chunk_tag,
                    checksum,
                    file_path: path.to_owned(),
                }),
            )
        } else {
            (path.to_owned(), None)
        };

        self.entries.push(FileEntry {
            time: FileTime { timestamp_ms },
            checksum,
            segments: vec![Segment {
                is_compressed,
                offset,
                uncompressed_size: data.len() as u64,
                compressed_size: stored.len() as u64,
            }],
            info: FileInfo {
                is_encrypted: encrypted,
                uncompressed_size: data.len() as u64,
                compressed_size: stored.len() as u64,
                file_path: info_path,
            },
            encryption,
        });
        self.paths.insert(path.to_owned());
        Ok(())
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

    pub fn is_finalized(&self) -> bool {
        self.index_offset.is_some()
    }

    /// Serialize the index, append it, patch the header offset.
    ///
    /// Idempotent: repeat calls return the committed index offset without
    /// touching the sink again.
    pub fn finalize(&mut self) -> Result<u64, Xp3Error> {
        if let Some(offset) = self.index_offset {
            return Ok(offset);
        }
        let index = FileIndex::serialize(&self.entries)?;
        let offset = self.writer.stream_position()?;
        self.writer.write_all(&index)?;

        self.writer.seek(SeekFrom::Start(XP3_SIGNATURE.len() as u64))?;
        self.writer.write_u64::<LittleEndian>(offset)?;
        self.writer.seek(SeekFrom::End(0))?;
        self.writer.flush()?;

        self.index_offset = Some(offset);
        Ok(offset)
    }

    /// Finalize (if not already done) and give the sink back.
    pub fn into_inner(mut self) -> Result<W, Xp3Error> {
        self.finalize()?;
        Ok(self.writer)
    }
}
