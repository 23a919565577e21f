//! Bulk packing and extraction on top of the core reader/writer surface.
//!
//! Everything here is a collaborator: it walks directories, builds output
//! paths, and logs progress, but all archive bytes flow through
//! [`Xp3Reader`]/[`Xp3Writer`].  Extraction is best-effort — one bad entry
//! is logged and skipped, it never aborts the batch.

use log::{error, info, warn};
use std::fs::{self, File};
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::crypto::EncryptionProfile;
use crate::error::Xp3Error;
use crate::io_stream::{Xp3Reader, Xp3Writer};

/// Paths longer than this are copyright-notice stubs in the wild; they are
/// extracted under their path hash instead.
const MAX_EXTRACT_PATH_CHARS: usize = 256;

/// Configuration for [`pack_dir`].
#[derive(Debug, Clone, Copy)]
pub struct PackOptions {
    pub profile: &'static EncryptionProfile,
    /// Ignore subdirectories and pack as if every file sat in the root.
    pub flatten: bool,
    /// Record file modification times in the archive.
    pub timestamps: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            profile: &crate::crypto::PROFILE_NONE,
            flatten: false,
            timestamps: true,
        }
    }
}

/// Open an archive file for reading.
pub fn open<P: AsRef<Path>>(path: P) -> Result<Xp3Reader<File>, Xp3Error> {
    Xp3Reader::new(File::open(path)?)
}

/// Create an archive file for writing.
pub fn create<P: AsRef<Path>>(path: P) -> Result<Xp3Writer<File>, Xp3Error> {
    Xp3Writer::new(File::create(path)?)
}

/// Pack a directory tree into a new archive.
///
/// Archive paths use forward slashes regardless of host separator.  With
/// `flatten`, basename collisions surface as [`Xp3Error::DuplicatePath`].
pub fn pack_dir(input: &Path, output: &Path, opts: &PackOptions) -> Result<(), Xp3Error> {
    let mut writer = create(output)?;

    for walked in WalkDir::new(input).sort_by_file_name() {
        let walked = walked.map_err(|e| Xp3Error::format(e.to_string()))?;
        if !walked.file_type().is_file() {
            continue;
        }
        let path = walked.path();
        let archive_path = if opts.flatten {
            walked.file_name().to_string_lossy().into_owned()
        } else {
            let rel = path
                .strip_prefix(input)
                .map_err(|e| Xp3Error::format(e.to_string()))?;
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        };

        let timestamp_ms = if opts.timestamps {
            modified_ms(path).unwrap_or(0)
        } else {
            0
        };

        let data = fs::read(path)?;
        writer.add(&archive_path, &data, opts.profile, timestamp_ms)?;
        info!("packed {archive_path} ({} bytes)", data.len());
    }

    writer.finalize()?;
    Ok(())
}

fn modified_ms(path: &Path) -> Option<u64> {
    let mtime = fs::metadata(path).ok()?.modified().ok()?;
    let ts = chrono::DateTime::<chrono::Utc>::from(mtime).timestamp_millis();
    u64::try_from(ts).ok()
}

/// Extract every entry into `dest`, best-effort.
///
/// Encrypted entries are dumped raw (with a warning) when `profile` is the
/// `none` profile, matching how third-party tools behave.  Returns the
/// number of files written.
pub fn extract_all<R: Read + Seek>(
    reader: &mut Xp3Reader<R>,
    dest: &Path,
    profile: &EncryptionProfile,
) -> Result<usize, Xp3Error> {
    let mut written = 0;
    for position in 0..reader.len() {
        let mut file = reader.open_at(position)?;
        let encrypted = file.entry().is_encrypted();

        let mut name = file.path().to_owned();
        if name.chars().count() > MAX_EXTRACT_PATH_CHARS {
            if encrypted {
                // Fall back to the stored path hash as the output name.
                name = file.entry().info.file_path.clone();
                warn!("path too long, extracting as {name}");
            } else {
                warn!("skipping entry with over-long path");
                continue;
            }
        }

        let data = if encrypted && profile.is_none() {
            warn!("{name} is encrypted and no profile was given, dumping raw");
            file.read_raw()
        } else {
            file.read(profile)
        };
        let data = match data {
            Ok(data) => data,
            Err(e) => {
                error!("failed to read {name}: {e}, continuing");
                continue;
            }
        };

        let out_path = match sanitized_output_path(dest, &name) {
            Some(p) => p,
            None => {
                warn!("skipping {name}: unsafe output path");
                continue;
            }
        };
        if let Err(e) = write_output(&out_path, &data) {
            error!("problem writing {name}: {e}, continuing");
            continue;
        }
        info!("extracted {name} ({} bytes)", data.len());
        written += 1;
    }
    Ok(written)
}

/// Join archive path components under `dest`, refusing traversal escapes.
fn sanitized_output_path(dest: &Path, archive_path: &str) -> Option<PathBuf> {
    let mut out = dest.to_path_buf();
    for component in archive_path.split('/') {
        if component.is_empty() || component == "." || component == ".." {
            return None;
        }
        if component.contains('\\') || component.contains(':') {
            return None;
        }
        out.push(component);
    }
    Some(out)
}

fn write_output(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    File::create(path)?.write_all(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_paths_are_rejected() {
        let dest = Path::new("/tmp/out");
        assert!(sanitized_output_path(dest, "../evil").is_none());
        assert!(sanitized_output_path(dest, "a/../../b").is_none());
        assert!(sanitized_output_path(dest, "a//b").is_none());
        assert!(sanitized_output_path(dest, "C:\\evil").is_none());
        assert_eq!(
            sanitized_output_path(dest, "a/b.txt"),
            Some(PathBuf::from("/tmp/out/a/b.txt"))
        );
    }
}
