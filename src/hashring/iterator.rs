use std::iter::FusedIterator;

use super::Context;

/// Iterator over the `(name, weight)` pairs of a context's targets, in index order.
pub struct Targets<'a> {
    inner: indexmap::map::Iter<'a, Vec<u8>, u8>,
}

impl<'a> Iterator for Targets<'a> {
    type Item = (&'a [u8], u8);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|(name, weight)| (name.as_slice(), *weight))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Targets<'_> {}

impl FusedIterator for Targets<'_> {}

impl<S> Context<S> {
    /// Iterate over the current targets, including changes not yet built into the ring.
    pub fn targets(&self) -> Targets<'_> {
        Targets {
            inner: self.registry.iter(),
        }
    }
}

impl<'a, S> IntoIterator for &'a Context<S> {
    type Item = (&'a [u8], u8);

    type IntoIter = Targets<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.targets()
    }
}
