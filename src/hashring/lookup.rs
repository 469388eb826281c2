use std::hash::BuildHasher;

use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::trace;

use crate::error::{Error, Result};

use super::{Context, Ring, hash32};

impl<S> Ring<S>
where
    S: BuildHasher,
{
    /// Hash `key` into the 32-bit space of the continuum.
    pub fn get_hash(&self, key: impl AsRef<[u8]>) -> u32 {
        hash32(&self.hash_builder, key.as_ref())
    }

    // Index of the point owning `key`: the last point hashed below the key. Keys hashing at or
    // below the first point, or above the last one, belong to the first point.
    fn seek(&self, key: &[u8]) -> Result<usize> {
        if key.is_empty() {
            return Err(Error::InvalidParameter("empty key"));
        }
        if self.points.is_empty() {
            return Err(Error::NotFound("target"));
        }

        let hash = self.get_hash(key);
        let index = match self.points.partition_point(|point| point.hash < hash) {
            0 => 0,
            index if index == self.points.len() => 0,
            index => index - 1,
        };

        trace!(hash, index, "located key on continuum");
        Ok(index)
    }

    /// Return the name of the target responsible for `key`.
    pub fn lookup_one(&self, key: impl AsRef<[u8]>) -> Result<&[u8]> {
        let index = self.seek(key.as_ref())?;
        Ok(self.name(self.points[index].target))
    }

    /// Return up to `count` distinct targets for `key`, most preferred first.
    ///
    /// Fewer than `count` names are returned only if the ring has fewer targets. The first
    /// name is always the one returned by [`Ring::lookup_one`].
    pub fn lookup_ranked(&self, key: impl AsRef<[u8]>, count: usize) -> Result<Vec<&[u8]>> {
        if count == 0 {
            return Err(Error::InvalidParameter("count must be positive"));
        }

        let index = self.seek(key.as_ref())?;
        let width = self.targets.len();
        let row = &self.ranks[index * width..(index + 1) * width];

        Ok(row
            .iter()
            .take(count)
            .map(|rank| self.name(rank.target))
            .collect())
    }

    /// Pick one of the first `count` targets for `key` at random, using `rng`.
    pub fn lookup_balance_with<R>(
        &self,
        key: impl AsRef<[u8]>,
        count: usize,
        rng: &mut R,
    ) -> Result<&[u8]>
    where
        R: Rng + ?Sized,
    {
        let candidates = self.lookup_ranked(key, count)?;
        candidates
            .choose(rng)
            .copied()
            .ok_or(Error::NotFound("target"))
    }
}

impl<S> Context<S>
where
    S: BuildHasher,
{
    /// Return the name of the target responsible for `key`, rebuilding the ring if needed.
    pub fn lookup_one(&mut self, key: impl AsRef<[u8]>) -> Result<&[u8]> {
        self.ring()?.lookup_one(key)
    }

    /// Return up to `count` distinct targets for `key`, most preferred first, rebuilding the
    /// ring if needed.
    pub fn lookup_ranked(&mut self, key: impl AsRef<[u8]>, count: usize) -> Result<Vec<&[u8]>> {
        self.ring()?.lookup_ranked(key, count)
    }

    /// Spread `key` over its first `count` targets: return one of them chosen at random.
    ///
    /// With `count == 1` this is the same as [`Context::lookup_one`].
    pub fn lookup_balance(&mut self, key: impl AsRef<[u8]>, count: usize) -> Result<&[u8]> {
        self.ring()?
            .lookup_balance_with(key, count, &mut rand::rng())
    }
}
