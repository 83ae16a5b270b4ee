//! FNV-1a name hashing for asset de-duplication.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a hash of `name`.
#[must_use]
pub const fn fnv1a_32(name: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    let mut i = 0;
    while i < name.len() {
        hash ^= name[i] as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}

/// Hash used to identify a model by its asset name.
#[must_use]
pub fn name_hash(name: &str) -> u32 {
    fnv1a_32(name.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        assert_eq!(fnv1a_32(b""), 0x811c_9dc5);
        assert_eq!(fnv1a_32(b"a"), 0xe40c_292c);
        assert_eq!(fnv1a_32(b"foobar"), 0xbf9c_f968);
    }

    #[test]
    fn test_name_hash_distinguishes_paths() {
        assert_ne!(name_hash("world/tree01"), name_hash("world/tree02"));
        assert_eq!(name_hash("world/tree01"), name_hash("world/tree01"));
    }
}
