//! Content hashing used for cache keys
//!
//! Every cache key in the crate (structure chains, pipeline state, shader
//! bytecode) is a 64-bit content hash. Hashes are computed with `XxHash64`
//! under a fixed seed so they are stable across runs and processes, and
//! sequences are folded with [`hash_combine`].

use std::hash::{Hash, Hasher};

use twox_hash::XxHash64;

const SEED: u64 = 0x6d61_676d_615f_6831;

/// Create a hasher with the crate-wide seed
pub fn hasher() -> XxHash64 {
    XxHash64::with_seed(SEED)
}

/// Hash any `Hash` value with the crate-wide hasher
pub fn content_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut state = hasher();
    value.hash(&mut state);
    state.finish()
}

/// Hash a byte slice
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut state = hasher();
    state.write(bytes);
    state.finish()
}

/// Fold `value` into `seed`, boost style
pub const fn hash_combine(seed: u64, value: u64) -> u64 {
    seed ^ value
        .wrapping_add(0x9e37_79b9_7f4a_7c15)
        .wrapping_add(seed << 6)
        .wrapping_add(seed >> 2)
}

/// Fold an ordered sequence of hashes into one
pub fn hash_sequence<I: IntoIterator<Item = u64>>(hashes: I) -> u64 {
    hashes.into_iter().fold(0, hash_combine)
}

/// Bit pattern of a float, so floating point state can be hashed and
/// compared exactly
pub fn f32_bits(value: f32) -> u32 {
    value.to_bits()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash(&42u32), content_hash(&42u32));
        assert_ne!(content_hash(&42u32), content_hash(&43u32));
    }

    #[test]
    fn test_sequence_order_matters() {
        let a = hash_sequence([1, 2, 3]);
        let b = hash_sequence([3, 2, 1]);
        assert_ne!(a, b);
        assert_eq!(a, hash_sequence(vec![1, 2, 3]));
    }

    #[test]
    fn test_empty_sequence() {
        assert_eq!(hash_sequence(std::iter::empty()), 0);
    }
}
