//! Reader and writer for the KiriKiri .XP3 archive container format.
//!
//! ```no_run
//! use std::io::Cursor;
//! use xp3arc::{Xp3Reader, Xp3Writer};
//! use xp3arc::crypto::PROFILE_NONE;
//!
//! // Write
//! let mut writer = Xp3Writer::new(Cursor::new(Vec::new()))?;
//! writer.add("readme.txt", b"Hello, world!", &PROFILE_NONE, 0)?;
//! writer.finalize()?;
//!
//! // Read
//! let mut reader = Xp3Reader::new(writer.into_inner()?)?;
//! let data = reader.read_file("readme.txt", &PROFILE_NONE)?;
//! assert_eq!(data, b"Hello, world!");
//! # Ok::<(), xp3arc::Xp3Error>(())
//! ```

pub mod archive;
pub mod chunk;
pub mod codec;
pub mod crypto;
pub mod entry;
pub mod error;
pub mod index;
pub mod io_stream;

pub use crypto::EncryptionProfile;
pub use entry::{FileEntry, Segment};
pub use error::Xp3Error;
pub use index::FileIndex;
pub use io_stream::{ArchiveFile, Xp3Reader, Xp3Writer};

/// Fixed 11-byte magic at the start of every archive.
pub const XP3_SIGNATURE: &[u8; 11] = b"XP3\x0D\x0A\x20\x0A\x1A\x8B\x67\x01";
