use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

type Blake2b256 = Blake2b<U32>;

/// A 32-byte BLAKE2b-256 digest. Keys chunks, objects, tree nodes and packfiles.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Checksum(pub [u8; 32]);

impl Checksum {
    pub const SIZE: usize = 32;

    /// Hash `data` in one shot.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = ChecksumHasher::new();
        hasher.update(data);
        hasher.finalize()
    }

    /// Random identifier, used for snapshot and state ids.
    pub fn random() -> Self {
        let mut out = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut out);
        Checksum(out)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Checksum(arr))
    }

    /// Parse a full 64-char hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        Self::from_slice(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First byte as a two-char hex string, used for shard directories.
    pub fn shard_prefix(&self) -> String {
        hex::encode(&self.0[..1])
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// Incremental hasher producing a [`Checksum`].
///
/// Feeding the same bytes in any split yields the same digest as
/// [`Checksum::compute`] over their concatenation.
#[derive(Clone, Default)]
pub struct ChecksumHasher {
    inner: Blake2b256,
}

impl ChecksumHasher {
    pub fn new() -> Self {
        Self {
            inner: Blake2b256::new(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.inner, data);
    }

    pub fn finalize(self) -> Checksum {
        let digest = self.inner.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Checksum(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_deterministic() {
        let a = Checksum::compute(b"hello world");
        let b = Checksum::compute(b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn different_data_different_checksum() {
        assert_ne!(Checksum::compute(b"hello"), Checksum::compute(b"world"));
    }

    #[test]
    fn incremental_matches_one_shot() {
        let data = b"abcdefghijklmnopqrstuvwxyz";
        let mut hasher = ChecksumHasher::new();
        hasher.update(&data[..3]);
        hasher.update(&data[3..17]);
        hasher.update(&data[17..]);
        assert_eq!(hasher.finalize(), Checksum::compute(data));
    }

    #[test]
    fn empty_data_produces_nonzero_checksum() {
        let id = Checksum::compute(b"");
        assert_ne!(id.0, [0u8; 32]);
    }

    #[test]
    fn hex_roundtrip() {
        let id = Checksum::compute(b"hex");
        assert_eq!(id.to_hex().len(), 64);
        assert_eq!(Checksum::from_hex(&id.to_hex()), Some(id));
        assert_eq!(Checksum::from_hex("zz"), None);
        assert_eq!(Checksum::from_hex("abcd"), None);
    }

    #[test]
    fn shard_prefix_is_first_byte() {
        let id = Checksum([0xAB; 32]);
        assert_eq!(id.shard_prefix(), "ab");
    }

    #[test]
    fn random_ids_differ() {
        assert_ne!(Checksum::random(), Checksum::random());
    }

    #[test]
    fn serde_roundtrip() {
        let id = Checksum::compute(b"roundtrip test");
        let serialized = rmp_serde::to_vec(&id).unwrap();
        let deserialized: Checksum = rmp_serde::from_slice(&serialized).unwrap();
        assert_eq!(id, deserialized);
    }
}
