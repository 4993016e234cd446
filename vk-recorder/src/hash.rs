//! Structural hashing of state records.
//!
//! Every cache in the crate is keyed by a 64-bit hash built by feeding fields into a [`Hasher`]
//! in a fixed order. The hasher is seeded with a constant so that the same fields always give
//! the same key, on every thread and in every process.

use foldhash::fast::{FixedState, FoldHasher};
use std::hash::{BuildHasher, Hasher as _};

const SEED: u64 = 0xcbf2_9ce4_8422_2325;

/// A 64-bit structural hash.
pub type Hash = u64;

/// Accumulates fields into a deterministic 64-bit hash.
#[derive(Clone)]
pub struct Hasher {
    inner: FoldHasher,
}

impl Default for Hasher {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    /// Creates a new `Hasher` with the fixed seed.
    #[inline]
    pub fn new() -> Self {
        Hasher {
            inner: FixedState::with_seed(SEED).build_hasher(),
        }
    }

    #[inline]
    pub fn u32(&mut self, value: u32) {
        self.inner.write_u32(value);
    }

    #[inline]
    pub fn s32(&mut self, value: i32) {
        self.inner.write_i32(value);
    }

    #[inline]
    pub fn u64(&mut self, value: u64) {
        self.inner.write_u64(value);
    }

    /// Hashes the bit pattern of `value`, so that `-0.0` and `0.0` hash differently.
    #[inline]
    pub fn f32(&mut self, value: f32) {
        self.inner.write_u32(value.to_bits());
    }

    /// Hashes a slice of plain data by its raw bytes.
    #[inline]
    pub fn data<T: bytemuck::NoUninit>(&mut self, data: &[T]) {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        self.inner.write_usize(bytes.len());
        self.inner.write(bytes);
    }

    #[inline]
    pub fn get(&self) -> Hash {
        self.inner.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Hasher;

    #[test]
    fn deterministic() {
        let build = || {
            let mut h = Hasher::new();
            h.u32(1);
            h.u64(2);
            h.data(&[3u32, 4, 5]);
            h.get()
        };

        assert_eq!(build(), build());
        assert_eq!(build(), std::thread::spawn(build).join().unwrap());
    }

    #[test]
    fn order_matters() {
        let mut a = Hasher::new();
        a.u32(1);
        a.u32(2);

        let mut b = Hasher::new();
        b.u32(2);
        b.u32(1);

        assert_ne!(a.get(), b.get());
    }

    #[test]
    fn float_bits() {
        let mut a = Hasher::new();
        a.f32(0.0);

        let mut b = Hasher::new();
        b.f32(-0.0);

        assert_ne!(a.get(), b.get());
    }
}
