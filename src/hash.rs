use std::hash::{Hash, Hasher};

use xxhash_rust::xxh3::{xxh3_64, Xxh3};

/// Hash value of a shader stage that has nothing bound.
///
/// All bits set, i.e. `-1` when read as a signed integer.
pub const UNBOUND_HASH: u64 = u64::MAX;

/// Hashes the canonical field layout of `value` with xxh3.
///
/// Two values that compare equal always produce the same hash, no matter how
/// they were built.
#[inline]
pub fn structural_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = Xxh3::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Hashes raw bytes, reserving [`UNBOUND_HASH`] for "nothing bound".
#[inline]
pub fn content_hash(parts: &[&[u8]]) -> u64 {
    let hash = match parts {
        [single] => xxh3_64(single),
        _ => {
            let mut hasher = Xxh3::new();

            for part in parts {
                hasher.update(&(part.len() as u64).to_le_bytes());
                hasher.update(part);
            }

            hasher.digest()
        }
    };

    hash.min(UNBOUND_HASH - 1)
}
