//! CRC hashing utilities.
//!
//! Two flavours are used by the material database:
//!
//! - CRC32C (Castagnoli) keys the in-memory open-addressing tables.
//! - A raw CRC32 (IEEE polynomial, zero seed, no final inversion) hashes the
//!   lower-cased directory and base-name segments of resource paths.

/// Compute CRC32C hash of a byte slice.
///
/// Uses hardware acceleration when available (SSE4.2 on x86).
#[inline]
pub fn hash_bytes(data: &[u8]) -> u32 {
    crc32c::crc32c(data)
}

/// Compute CRC32C hash of a little-endian `u32`.
#[inline]
pub fn hash_u32(value: u32) -> u32 {
    crc32c::crc32c(&value.to_le_bytes())
}

/// Raw CRC32 of a path segment.
///
/// Bytes are lower-cased and `/` is folded to `\` before hashing, so
/// `Materials/Foo` and `materials\foo` hash identically.
pub fn hash_path(segment: &[u8]) -> u32 {
    let normalized: Vec<u8> = segment.iter().map(|&b| normalize_path_byte(b)).collect();

    // crc32fast inverts the state on entry and exit; seeding with !0 and
    // inverting the result yields the zero-seeded, uninverted register.
    let mut hasher = crc32fast::Hasher::new_with_initial(u32::MAX);
    hasher.update(&normalized);
    !hasher.finalize()
}

/// Lower-case ASCII and map forward slashes to backslashes.
#[inline]
pub fn normalize_path_byte(b: u8) -> u8 {
    match b {
        b'/' => b'\\',
        _ => b.to_ascii_lowercase(),
    }
}
