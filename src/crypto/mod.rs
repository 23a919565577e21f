//! Checksum-keyed XOR keystream and the encryption profile table.
//!
//! Key material is derived from the Adler-32 checksum of the *plaintext*
//! content, so the same checksum must be used for both directions.  The
//! transform is its own inverse.
//!
//! Derivation: `adler_key = checksum ^ master_key`, folded to one byte as
//! `(adler_key>>24 ^ adler_key>>16 ^ adler_key>>8 ^ adler_key) & 0xFF`,
//! substituting `secondary_key` when the fold is zero.  Profiles with
//! `xor_first_byte` additionally XOR byte 0 with `adler_key & 0xFF`
//! (`master_key & 0xFF` when zero) *before* the bulk pass; the bulk pass
//! then covers every byte including byte 0.  The ordering is load-bearing:
//! swapping the two steps changes byte 0 and breaks interop.

use crate::chunk::{TAG_ELIF, TAG_NEKO};

// ── Profile table ────────────────────────────────────────────────────────────

/// Named keystream parameter set.
///
/// Passed explicitly into the reader and writer rather than living in
/// process-global state, so differently-keyed archives can coexist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionProfile {
    pub name: &'static str,
    pub master_key: u32,
    pub secondary_key: u8,
    pub xor_first_byte: bool,
    /// Tag of the encryption chunk written for this flavor.
    pub chunk_tag: [u8; 4],
}

pub const PROFILE_NONE: EncryptionProfile = EncryptionProfile {
    name: "none",
    master_key: 0x0000_0000,
    secondary_key: 0x00,
    xor_first_byte: false,
    chunk_tag: TAG_ELIF,
};

pub const PROFILE_NEKO_VOL1: EncryptionProfile = EncryptionProfile {
    name: "neko_vol1",
    master_key: 0x1548_E29C,
    secondary_key: 0xD7,
    xor_first_byte: false,
    chunk_tag: TAG_ELIF,
};

pub const PROFILE_NEKO_VOL1_STEAM: EncryptionProfile = EncryptionProfile {
    name: "neko_vol1_steam",
    master_key: 0x4452_8B87,
    secondary_key: 0x23,
    xor_first_byte: false,
    chunk_tag: TAG_ELIF,
};

pub const PROFILE_NEKO_VOL0: EncryptionProfile = EncryptionProfile {
    name: "neko_vol0",
    master_key: 0x1548_E29C,
    secondary_key: 0xD7,
    xor_first_byte: true,
    chunk_tag: TAG_NEKO,
};

pub const PROFILE_NEKO_VOL0_STEAM: EncryptionProfile = EncryptionProfile {
    name: "neko_vol0_steam",
    master_key: 0x4452_8B87,
    secondary_key: 0x23,
    xor_first_byte: true,
    chunk_tag: TAG_NEKO,
};

/// Every built-in profile, `none` first.
pub const PROFILES: [EncryptionProfile; 5] = [
    PROFILE_NONE,
    PROFILE_NEKO_VOL1,
    PROFILE_NEKO_VOL1_STEAM,
    PROFILE_NEKO_VOL0,
    PROFILE_NEKO_VOL0_STEAM,
];

impl EncryptionProfile {
    /// Whether this is the no-op profile.
    #[inline]
    pub fn is_none(&self) -> bool {
        self.name == "none"
    }

    /// Resolve a profile by its CLI name.
    pub fn from_name(s: &str) -> Option<&'static EncryptionProfile> {
        PROFILES.iter().find(|p| p.name == s)
    }
}

// ── Keystream ────────────────────────────────────────────────────────────────

/// Fold the 32-bit key material into the single bulk XOR byte.
fn fold_key(adler_key: u32, secondary_key: u8) -> u8 {
    let folded = (adler_key >> 24 ^ adler_key >> 16 ^ adler_key >> 8 ^ adler_key) as u8;
    if folded == 0 {
        secondary_key
    } else {
        folded
    }
}

/// Apply the keystream in place.  Self-inverse; `checksum` is always the
/// Adler-32 of the plaintext.
///
/// The bulk pass runs word-at-a-time (and, with the `parallel` feature, in
/// rayon chunks for large buffers); output is byte-identical to
/// [`apply_keystream_scalar`] for all inputs.
pub fn apply_keystream(data: &mut [u8], checksum: u32, profile: &EncryptionProfile) {
    if profile.is_none() {
        return;
    }
    let adler_key = checksum ^ profile.master_key;
    let xor_key = fold_key(adler_key, profile.secondary_key);

    if profile.xor_first_byte {
        if let Some(first) = data.first_mut() {
            let mut first_key = (adler_key & 0xFF) as u8;
            if first_key == 0 {
                first_key = (profile.master_key & 0xFF) as u8;
            }
            *first ^= first_key;
        }
    }

    bulk_xor(data, xor_key);
}

/// Byte-at-a-time reference implementation of [`apply_keystream`].
pub fn apply_keystream_scalar(data: &mut [u8], checksum: u32, profile: &EncryptionProfile) {
    if profile.is_none() {
        return;
    }
    let adler_key = checksum ^ profile.master_key;
    let xor_key = fold_key(adler_key, profile.secondary_key);

    if profile.xor_first_byte {
        if let Some(first) = data.first_mut() {
            let mut first_key = (adler_key & 0xFF) as u8;
            if first_key == 0 {
                first_key = (profile.master_key & 0xFF) as u8;
            }
            *first ^= first_key;
        }
    }

    for byte in data.iter_mut() {
        *byte ^= xor_key;
    }
}

#[cfg(feature = "parallel")]
const PARALLEL_THRESHOLD: usize = 1 << 20;

fn bulk_xor(data: &mut [u8], key: u8) {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        if data.len() >= PARALLEL_THRESHOLD {
            data.par_chunks_mut(64 * 1024)
                .for_each(|chunk| bulk_xor_words(chunk, key));
            return;
        }
    }
    bulk_xor_words(data, key);
}

fn bulk_xor_words(data: &mut [u8], key: u8) {
    let pattern = u64::from_ne_bytes([key; 8]);
    let mut chunks = data.chunks_exact_mut(8);
    for chunk in &mut chunks {
        let word = u64::from_ne_bytes(chunk.try_into().unwrap()) ^ pattern;
        chunk.copy_from_slice(&word.to_ne_bytes());
    }
    for byte in chunks.into_remainder() {
        *byte ^= key;
    }
}

// ── Path hashing ─────────────────────────────────────────────────────────────

/// Hash stored in `info.file_path` for encrypted entries: hex MD5 of the
/// lower-cased, UTF-16LE-encoded logical path.
pub fn path_hash(path: &str) -> String {
    let lowered = path.to_lowercase();
    let mut wide = Vec::with_capacity(lowered.len() * 2);
    for unit in lowered.encode_utf16() {
        wide.extend_from_slice(&unit.to_le_bytes());
    }
    hex::encode(md5::compute(&wide).0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn keystream_is_involution() {
        for profile in &PROFILES {
            for len in 0..=64usize {
                let original: Vec<u8> = (0..len as u8).collect();
                let mut data = original.clone();
                apply_keystream(&mut data, 0xDEAD_BEEF, profile);
                apply_keystream(&mut data, 0xDEAD_BEEF, profile);
                assert_eq!(data, original, "profile {}, len {}", profile.name, len);
            }
        }
    }

    #[test]
    fn first_byte_step_applies_before_bulk_pass() {
        // With xor_first_byte, byte 0 must carry both keys.
        let checksum = 0x0102_0304;
        let profile = &PROFILE_NEKO_VOL0;
        let adler_key = checksum ^ profile.master_key;
        let xor_key = super::fold_key(adler_key, profile.secondary_key);
        let first_key = (adler_key & 0xFF) as u8;

        let mut data = vec![0xAAu8, 0xBB];
        apply_keystream(&mut data, checksum, profile);
        assert_eq!(data[0], 0xAA ^ first_key ^ xor_key);
        assert_eq!(data[1], 0xBB ^ xor_key);
    }

    #[test]
    fn zero_fold_falls_back_to_secondary_key() {
        // checksum == master_key makes adler_key zero everywhere.
        let profile = &PROFILE_NEKO_VOL0;
        let checksum = profile.master_key;

        let mut data = vec![0u8, 0, 0];
        apply_keystream(&mut data, checksum, profile);
        let first_key = (profile.master_key & 0xFF) as u8;
        assert_eq!(data[0], first_key ^ profile.secondary_key);
        assert_eq!(data[1], profile.secondary_key);
    }

    #[test]
    fn none_profile_is_identity() {
        let mut data = vec![1u8, 2, 3];
        apply_keystream(&mut data, 0x1234_5678, &PROFILE_NONE);
        assert_eq!(data, [1, 2, 3]);
    }

    #[test]
    fn profile_lookup() {
        assert_eq!(
            EncryptionProfile::from_name("neko_vol0").map(|p| p.chunk_tag),
            Some(*b"neko")
        );
        assert!(EncryptionProfile::from_name("bogus").is_none());
    }

    #[test]
    fn path_hash_is_case_insensitive() {
        assert_eq!(path_hash("Data/Script.KS"), path_hash("data/script.ks"));
        // MD5("dummy_file" as UTF-16LE), hex-encoded.
        assert_eq!(path_hash("dummy_file").len(), 32);
    }

    proptest! {
        #[test]
        fn vectorized_matches_scalar(
            data in proptest::collection::vec(any::<u8>(), 0..4096),
            checksum in any::<u32>(),
            profile_idx in 0usize..PROFILES.len(),
        ) {
            let profile = &PROFILES[profile_idx];
            let mut vectorized = data.clone();
            let mut scalar = data;
            apply_keystream(&mut vectorized, checksum, profile);
            apply_keystream_scalar(&mut scalar, checksum, profile);
            prop_assert_eq!(vectorized, scalar);
        }

        #[test]
        fn involution_for_arbitrary_input(
            data in proptest::collection::vec(any::<u8>(), 0..512),
            checksum in any::<u32>(),
            profile_idx in 0usize..PROFILES.len(),
        ) {
            let profile = &PROFILES[profile_idx];
            let mut roundtrip = data.clone();
            apply_keystream(&mut roundtrip, checksum, profile);
            apply_keystream(&mut roundtrip, checksum, profile);
            prop_assert_eq!(roundtrip, data);
        }
    }
}
