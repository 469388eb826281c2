use std::hash::BuildHasher;
use std::io::Write;

use crate::error::{Error, Result};

use super::hash32;
use super::registry::{Registry, Target};

/// Point is one hash position on the continuum, owned by the target at `target`.
///
/// Points order by hash first and target index second, which is the order of the continuum.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Point {
    pub hash: u32,
    pub target: u16,
}

/// One entry of a point's ranking row; `rank` 0 is the most preferred target.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Rank {
    pub rank: u16,
    pub target: u16,
}

/// Ring is a built continuum together with its ranking table.
///
/// Every point owns the arc of the hash space that follows it, up to and including the hash
/// of the next point. The first point also owns the wrap-around gap: every hash at or below
/// its own, and every hash above the last point.
/// For every point the ranking table holds all targets ordered by how soon they are met when
/// walking the ring clockwise from that point, so the point's own target is always first.
///
/// A Ring never changes once built. It is shared read-only by lookups, which can run on any
/// number of threads at once.
#[derive(Clone, PartialEq, Debug)]
pub struct Ring<S> {
    pub(crate) hash_builder: S,
    pub(crate) targets: Vec<Target>,
    pub(crate) points: Vec<Point>,
    pub(crate) ranks: Vec<Rank>,
}

impl<S> Ring<S> {
    pub(crate) fn new(hash_builder: S) -> Ring<S> {
        Ring {
            hash_builder,
            targets: Vec::new(),
            points: Vec::new(),
            ranks: Vec::new(),
        }
    }

    /// Get the number of targets the ring was built from.
    pub fn targets_count(&self) -> usize {
        self.targets.len()
    }

    /// Get the number of points on the continuum.
    pub fn items_count(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the ring has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The targets the ring was built from, ordered by index.
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// The continuum, sorted by `(hash, target)`.
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// The ranking row of the point at `index` on the continuum.
    pub fn ranking(&self, index: usize) -> Option<&[Rank]> {
        if index >= self.points.len() {
            return None;
        }
        let width = self.targets.len();
        self.ranks.get(index * width..(index + 1) * width)
    }

    pub(crate) fn name(&self, target: u16) -> &[u8] {
        &self.targets[usize::from(target)].name
    }
}

impl<S> Ring<S>
where
    S: BuildHasher,
{
    /// Replace the continuum and ranking table with ones built from `registry`.
    ///
    /// Nothing is replaced if building fails.
    pub(crate) fn rebuild(&mut self, registry: &Registry, replicas: u16) -> Result<usize> {
        let targets = registry.snapshot()?;
        let points = build_points(&targets, replicas, &self.hash_builder)?;
        let ranks = build_ranks(&points, targets.len())?;

        self.targets = targets;
        self.points = points;
        self.ranks = ranks;

        Ok(self.points.len())
    }
}

// Each unit of weight contributes `replicas` points, hashed from the target name followed by
// the decimal weight slot and replica number. Identical (hash, target) pairs collapse into one.
fn build_points<S: BuildHasher>(
    targets: &[Target],
    replicas: u16,
    hash_builder: &S,
) -> Result<Vec<Point>> {
    let total = targets
        .iter()
        .try_fold(0u32, |total, target| {
            u32::from(target.weight)
                .checked_mul(u32::from(replicas))
                .and_then(|count| total.checked_add(count))
        })
        .ok_or(Error::OutOfMemory)?;

    let mut points = Vec::new();
    points.try_reserve_exact(total as usize)?;

    let mut input = Vec::new();
    for target in targets {
        for slot in 0..target.weight {
            for replica in 0..replicas {
                input.clear();
                input.extend_from_slice(&target.name);
                let _ = write!(input, "{slot}{replica}");

                points.push(Point {
                    hash: hash32(hash_builder, &input),
                    target: target.index,
                });
            }
        }
    }

    points.sort_unstable();
    points.dedup();

    Ok(points)
}

// Sweep the ring backwards keeping the targets ordered by their next point. Stepping back onto
// a point moves its target to the front and leaves the others in place. The first turn only
// warms up the order so that next points past the end of the ring are known.
fn build_ranks(points: &[Point], targets_count: usize) -> Result<Vec<Rank>> {
    if points.is_empty() {
        return Ok(Vec::new());
    }

    let len = points
        .len()
        .checked_mul(targets_count)
        .ok_or(Error::OutOfMemory)?;
    let mut ranks = Vec::new();
    ranks.try_reserve_exact(len)?;
    ranks.resize(len, Rank { rank: 0, target: 0 });

    let mut order: Vec<u16> = (0..targets_count).map(|index| index as u16).collect();

    for point in points.iter().rev() {
        promote(&mut order, point.target);
    }

    for (index, point) in points.iter().enumerate().rev() {
        promote(&mut order, point.target);

        let row = &mut ranks[index * targets_count..(index + 1) * targets_count];
        for (rank, (entry, target)) in row.iter_mut().zip(&order).enumerate() {
            *entry = Rank {
                rank: rank as u16,
                target: *target,
            };
        }
    }

    Ok(ranks)
}

fn promote(order: &mut [u16], target: u16) {
    if let Some(position) = order.iter().position(|current| *current == target) {
        order[..=position].rotate_right(1);
    }
}
