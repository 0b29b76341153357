// src/core/checksum.rs

//! The streaming 64-bit content checksum used to seal every stored object.
//! CRC-64/XZ, reusing the same `crc` dependency already carried for the
//! cluster hash rather than adding a second hashing dependency.

use crc::{CRC_64_XZ, Crc};

const ALGO: Crc<u64> = Crc::<u64>::new(&CRC_64_XZ);

/// An incremental hasher fed chunks as bytes stream through a transfer.
pub struct Hasher(crc::Digest<'static, u64>);

impl Hasher {
    pub fn new() -> Self {
        Self(ALGO.digest())
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    /// Consumes the hasher, returning the ASCII hex checksum written
    /// alongside sealed objects.
    pub fn finalize_hex(self) -> String {
        hex::encode(self.0.finalize().to_be_bytes())
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes the checksum of an in-memory buffer in one pass.
pub fn of_bytes(bytes: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize_hex()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incremental_matches_one_shot() {
        let mut incremental = Hasher::new();
        incremental.update(b"hello ");
        incremental.update(b"world");
        assert_eq!(incremental.finalize_hex(), of_bytes(b"hello world"));
    }

    #[test]
    fn empty_input_is_stable() {
        assert_eq!(of_bytes(b""), of_bytes(b""));
    }
}
