//! Resource identifier - the stable cross-file key of a material object.
//!
//! A resource id is three 32-bit words derived from a file path:
//! the hash of the directory, the hash of the base name, and up to four
//! lower-cased extension bytes packed little-endian into a word.

use std::fmt;
use std::str::FromStr;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::crc::{hash_bytes, hash_path};
use crate::Error;

/// Length of the canonical text form `res:XXXXXXXX:XXXXXXXX:XXXXXXXX`.
pub const TEXT_LEN: usize = 30;

/// A hashed resource path.
///
/// Two ids are equal iff all three words match. The in-file layout is
/// `dir`, `file`, `ext`, each a little-endian `u32`.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
#[repr(C)]
pub struct ResourceId {
    /// Hash of the lower-cased directory path.
    pub dir: u32,
    /// Hash of the lower-cased base name, without extension.
    pub file: u32,
    /// Lower-cased extension bytes packed into a word.
    pub ext: u32,
}

impl ResourceId {
    /// The all-zero id.
    pub const NULL: Self = Self::new(0, 0, 0);

    /// Packed extension of `.mat` files.
    pub const EXT_MAT: u32 = Self::pack_extension(b"mat");

    #[inline]
    pub const fn new(dir: u32, file: u32, ext: u32) -> Self {
        Self { dir, file, ext }
    }

    /// Check if every word is zero.
    #[inline]
    pub const fn is_null(&self) -> bool {
        self.dir == 0 && self.file == 0 && self.ext == 0
    }

    /// Pack up to four extension bytes, lower-cased, little-endian.
    pub const fn pack_extension(ext: &[u8]) -> u32 {
        let mut packed = 0u32;
        let mut i = 0;
        while i < ext.len() && i < 4 {
            packed |= (ext[i].to_ascii_lowercase() as u32) << (i * 8);
            i += 1;
        }
        packed
    }

    /// Build an id from a path such as `materials/foo/bar.mat`.
    ///
    /// A canonical `res:` string is parsed instead of hashed. A leading
    /// `data/` (or `data\`) is stripped. Case and separator style do not
    /// affect the result.
    pub fn from_path(path: &str) -> Self {
        if let Ok(id) = path.parse() {
            return id;
        }

        let mut bytes = path.as_bytes();
        if bytes.len() >= 5
            && bytes[..4].eq_ignore_ascii_case(b"data")
            && matches!(bytes[4], b'/' | b'\\')
        {
            bytes = &bytes[5..];
        }

        let base_start = bytes
            .iter()
            .rposition(|&b| b == b'/' || b == b'\\')
            .map_or(0, |p| p + 1);
        let ext_pos = bytes[base_start..]
            .iter()
            .rposition(|&b| b == b'.')
            .map_or(bytes.len(), |p| base_start + p);

        let dir = hash_path(&bytes[..base_start.saturating_sub(1)]);
        let file = hash_path(&bytes[base_start..ext_pos]);
        let ext = if ext_pos < bytes.len() {
            Self::pack_extension(&bytes[ext_pos + 1..])
        } else {
            0
        };

        Self { dir, file, ext }
    }

    /// Hash used to place this id in open-addressing tables.
    #[inline]
    pub fn table_hash(&self) -> u32 {
        hash_bytes(self.as_bytes())
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({})", self)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "res:{:08X}:{:08X}:{:08X}", self.dir, self.file, self.ext)
    }
}

impl FromStr for ResourceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != TEXT_LEN {
            return Err(Error::InvalidResourceId(format!(
                "expected {} characters, got {}",
                TEXT_LEN,
                bytes.len()
            )));
        }
        if !bytes[..4].eq_ignore_ascii_case(b"res:") || bytes[12] != b':' || bytes[21] != b':' {
            return Err(Error::InvalidResourceId(s.to_string()));
        }

        // The three words form one 96-bit number; each digit shifts in at
        // the low end of `ext` and carries out of the top of each word.
        let (mut dir, mut file, mut ext) = (0u32, 0u32, 0u32);
        for (i, &c) in bytes.iter().enumerate().skip(4) {
            if i == 12 || i == 21 {
                continue;
            }
            let digit = (c as char).to_digit(16).ok_or_else(|| {
                Error::InvalidResourceId(format!("invalid hex digit at position {}", i))
            })?;
            dir = (dir << 4) | (file >> 28);
            file = (file << 4) | (ext >> 28);
            ext = (ext << 4) | digit;
        }

        Ok(Self { dir, file, ext })
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ResourceId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for ResourceId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
