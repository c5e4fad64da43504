//! 32-bit MurmurHash2.
//!
//! The content checksum of the cache: 4-byte little-endian words folded
//! with the multiplier `0x5bd1e995` and the 24-bit shift, a byte-wise tail
//! for the last 0 to 3 bytes, then a final avalanche.

const M: u32 = 0x5bd1_e995;
const R: u32 = 24;

/// Seed used for content hashes.
pub const HASH_SEED: u32 = 0;

/// Hash `data` with the given seed.
#[must_use]
pub fn murmur2(data: &[u8], seed: u32) -> u32 {
    // The length is mixed in as 32 bits; inputs are capped well below 4 GiB.
    let mut h = seed ^ (data.len() as u32);

    let mut words = data.chunks_exact(4);
    for word in &mut words {
        let mut k = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);

        h = h.wrapping_mul(M);
        h ^= k;
    }

    let tail = words.remainder();
    if tail.len() >= 3 {
        h ^= u32::from(tail[2]) << 16;
    }
    if tail.len() >= 2 {
        h ^= u32::from(tail[1]) << 8;
    }
    if !tail.is_empty() {
        h ^= u32::from(tail[0]);
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;
    h
}
