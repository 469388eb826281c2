//! 32-bit MurmurHash2 as a streaming [`Hasher`].
//!
//! The seed is fixed, so the hash of a byte string does not depend on how it is split
//! across `write` calls.

use std::hash::{BuildHasher, Hasher};

const MULTIPLIER: u32 = 0x5bd1_e995;
const ROTATE: u32 = 24;
const SEED: u32 = 0x4d4d_4832 ^ u32::MAX;

/// Builds [`Murmur2`] hashers, the default hasher of a [`Context`](crate::Context).
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct DefaultHashBuilder;

impl BuildHasher for DefaultHashBuilder {
    type Hasher = Murmur2;

    fn build_hasher(&self) -> Self::Hasher {
        Murmur2::default()
    }
}

#[derive(Clone, Debug)]
pub struct Murmur2 {
    hash: u32,
    tail: [u8; 4],
    tail_len: usize,
}

impl Default for Murmur2 {
    fn default() -> Self {
        Murmur2 {
            hash: SEED,
            tail: [0; 4],
            tail_len: 0,
        }
    }
}

impl Murmur2 {
    fn mix(&mut self, block: [u8; 4]) {
        let mut value = u32::from_le_bytes(block).wrapping_mul(MULTIPLIER);
        value ^= value >> ROTATE;
        value = value.wrapping_mul(MULTIPLIER);

        self.hash = self.hash.wrapping_mul(MULTIPLIER) ^ value;
    }
}

impl Hasher for Murmur2 {
    fn write(&mut self, mut bytes: &[u8]) {
        if self.tail_len > 0 {
            let take = (4 - self.tail_len).min(bytes.len());
            self.tail[self.tail_len..self.tail_len + take].copy_from_slice(&bytes[..take]);
            self.tail_len += take;
            bytes = &bytes[take..];

            if self.tail_len < 4 {
                return;
            }
            self.mix(self.tail);
            self.tail_len = 0;
        }

        let mut blocks = bytes.chunks_exact(4);
        for block in &mut blocks {
            self.mix([block[0], block[1], block[2], block[3]]);
        }

        let rest = blocks.remainder();
        self.tail[..rest.len()].copy_from_slice(rest);
        self.tail_len = rest.len();
    }

    fn finish(&self) -> u64 {
        let mut hash = self.hash;
        let tail = &self.tail[..self.tail_len];

        if tail.len() == 3 {
            hash ^= u32::from(tail[2]) << 16;
        }
        if tail.len() >= 2 {
            hash ^= u32::from(tail[1]) << 8;
        }
        if let Some(first) = tail.first() {
            hash ^= u32::from(*first);
            hash = hash.wrapping_mul(MULTIPLIER);
        }

        hash ^= hash >> 13;
        hash = hash.wrapping_mul(MULTIPLIER);
        hash ^= hash >> 15;

        u64::from(hash)
    }
}
