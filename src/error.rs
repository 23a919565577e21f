use std::io;
use thiserror::Error;

/// Crate-wide error type.
///
/// Structural errors (`Format`, `UnsupportedIndexFormat`, `CorruptSegment`)
/// mean the on-disk bytes are inconsistent and always surface to the caller.
/// `ChecksumMismatch` and `DecryptionRequired` are content-level and
/// recoverable: the default read path downgrades the former to a warning,
/// and the latter can be retried with a profile or bypassed with a raw read.
#[derive(Error, Debug)]
pub enum Xp3Error {
    #[error("malformed archive: {0}")]
    Format(String),
    #[error("unsupported index flag {0:#04x}")]
    UnsupportedIndexFormat(u8),
    #[error("corrupt segment: inflated to {actual} bytes, expected {expected}")]
    CorruptSegment { expected: u64, actual: u64 },
    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },
    #[error("file is encrypted and no encryption profile was given")]
    DecryptionRequired,
    #[error("duplicate path in archive: {0}")]
    DuplicatePath(String),
    #[error("no such file in archive: {0}")]
    KeyNotFound(String),
    #[error("archive is already finalized")]
    ArchiveFinalized,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Xp3Error {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Xp3Error::Format(msg.into())
    }
}
