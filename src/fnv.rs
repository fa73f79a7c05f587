//! 64-bit FNV-1a hashing.
//!
//! [`hash_key`] is the function the table uses to pick a starting slot for
//! every key. [`FnvHasher`] and [`FnvBuildHasher`] run the same algorithm
//! behind the standard [`Hasher`]/[`BuildHasher`] traits so that other maps
//! can be driven by identical hashes.
//!
//! FNV-1a is chosen for speed and distribution on short strings. It is not
//! seeded and offers no protection against adversarial collisions.

use core::hash::BuildHasher;
use core::hash::Hasher;

/// FNV-1a 64-bit offset basis.
pub const FNV_OFFSET: u64 = 14_695_981_039_346_656_037;

/// FNV-1a 64-bit prime.
pub const FNV_PRIME: u64 = 1_099_511_628_211;

/// Computes the FNV-1a hash of `bytes`.
///
/// The result depends only on the input bytes: it is stable across calls,
/// processes, and platforms.
///
/// # Examples
///
/// ```rust
/// use fnv_table::fnv::FNV_OFFSET;
/// use fnv_table::fnv::hash_key;
///
/// assert_eq!(hash_key(b""), FNV_OFFSET);
/// assert_eq!(hash_key(b"a"), 0xaf63dc4c8601ec8c);
/// ```
#[inline]
pub const fn hash_key(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}

/// A [`Hasher`] running FNV-1a over every byte written to it.
///
/// Writing a byte slice and calling [`finish`](Hasher::finish) yields the
/// same value as [`hash_key`] on that slice. Note that `str::hash` appends a
/// `0xff` terminator byte, so hashing a `&str` through the [`Hash`] trait
/// differs from `hash_key(s.as_bytes())`.
///
/// [`Hash`]: core::hash::Hash
#[derive(Debug, Clone, Copy)]
pub struct FnvHasher {
    state: u64,
}

impl Default for FnvHasher {
    #[inline]
    fn default() -> Self {
        Self { state: FNV_OFFSET }
    }
}

impl Hasher for FnvHasher {
    #[inline]
    fn finish(&self) -> u64 {
        self.state
    }

    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= byte as u64;
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
    }
}

/// Builds unseeded [`FnvHasher`]s.
///
/// # Examples
///
/// ```rust
/// use core::hash::BuildHasher;
///
/// use fnv_table::fnv::FnvBuildHasher;
///
/// let a = FnvBuildHasher.hash_one("key");
/// let b = FnvBuildHasher.hash_one("key");
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FnvBuildHasher;

impl BuildHasher for FnvBuildHasher {
    type Hasher = FnvHasher;

    #[inline]
    fn build_hasher(&self) -> FnvHasher {
        FnvHasher::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_offset_basis() {
        assert_eq!(hash_key(b""), FNV_OFFSET);
    }

    #[test]
    fn published_vectors() {
        assert_eq!(hash_key(b"a"), 0xaf63dc4c8601ec8c);
        assert_eq!(hash_key(b"foobar"), 0x85944171f73967e8);
    }

    #[test]
    fn single_byte_matches_definition() {
        let expected = (FNV_OFFSET ^ b'z' as u64).wrapping_mul(FNV_PRIME);
        assert_eq!(hash_key(b"z"), expected);
    }

    #[test]
    fn deterministic_across_calls() {
        let key = "the quick brown fox";
        assert_eq!(hash_key(key.as_bytes()), hash_key(key.as_bytes()));
        assert_ne!(hash_key(b"ab"), hash_key(b"ba"));
    }

    #[test]
    fn hasher_matches_hash_key() {
        let mut hasher = FnvBuildHasher.build_hasher();
        hasher.write(b"split ");
        hasher.write(b"writes");
        assert_eq!(hasher.finish(), hash_key(b"split writes"));
    }

    #[test]
    fn hash_key_is_const() {
        const H: u64 = hash_key(b"const");
        assert_eq!(H, hash_key(b"const"));
    }
}
