//! Binary snapshot of a [`Context`].
//!
//! All integers are little-endian:
//!
//! ```text
//! magic:u32 version:u8 flags:u8 replicas:u16 targets_count:u16
//! targets_count * (index:u16 weight:u8 name_len:u16 name:[u8; name_len])
//! items_count:u32
//! items_count * (hash:u32 target:u16)
//! items_count * targets_count * (rank:u16 target:u16)
//! ```

use std::collections::HashSet;
use std::fs;
use std::hash::BuildHasher;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::registry::{Registry, Target, validate};
use super::{Context, Point, Rank};

const MAGIC: u32 = 0x4841_4843;
const VERSION: u8 = 1;
const FLAG_FROZEN: u8 = 0x01;

const HEADER_LEN: usize = 4 + 1 + 1 + 2 + 2;
const TARGET_LEN: usize = 2 + 1 + 2;
const POINT_LEN: usize = 4 + 2;
const RANK_LEN: usize = 2 + 2;

impl<S> Context<S>
where
    S: BuildHasher,
{
    /// Encode the whole context, rebuilding the ring first if the targets changed.
    ///
    /// The snapshot is deterministic: equal contexts serialize to equal bytes.
    pub fn serialize(&mut self) -> Result<Vec<u8>> {
        if self.dirty {
            self.rebuild()?;
        }

        let ring = &self.ring;
        let size = HEADER_LEN
            + ring
                .targets
                .iter()
                .map(|target| TARGET_LEN + target.name.len())
                .sum::<usize>()
            + 4
            + ring.points.len() * POINT_LEN
            + ring.ranks.len() * RANK_LEN;

        let mut blob = Vec::new();
        blob.try_reserve_exact(size)?;

        blob.extend_from_slice(&MAGIC.to_le_bytes());
        blob.push(VERSION);
        blob.push(if self.frozen { FLAG_FROZEN } else { 0 });
        blob.extend_from_slice(&self.config.replicas.to_le_bytes());
        // the registry never holds more than u16::MAX targets or names longer than u16::MAX
        blob.extend_from_slice(&(ring.targets.len() as u16).to_le_bytes());
        for target in &ring.targets {
            blob.extend_from_slice(&target.index.to_le_bytes());
            blob.push(target.weight);
            blob.extend_from_slice(&(target.name.len() as u16).to_le_bytes());
            blob.extend_from_slice(&target.name);
        }

        blob.extend_from_slice(&(ring.points.len() as u32).to_le_bytes());
        for point in &ring.points {
            blob.extend_from_slice(&point.hash.to_le_bytes());
            blob.extend_from_slice(&point.target.to_le_bytes());
        }
        for rank in &ring.ranks {
            blob.extend_from_slice(&rank.rank.to_le_bytes());
            blob.extend_from_slice(&rank.target.to_le_bytes());
        }

        debug!(
            bytes = blob.len(),
            targets = ring.targets.len(),
            items = ring.points.len(),
            "serialized context"
        );
        Ok(blob)
    }

    /// Replace the whole context with a snapshot taken by [`Context::serialize`].
    ///
    /// The targets, continuum, ranking table, replicas and frozen flag are all restored and the
    /// context is no longer dirty. A malformed snapshot fails with
    /// [`Error::InvalidParameter`] and leaves the context untouched. The snapshot must have
    /// been taken with the same hasher as this context uses.
    pub fn unserialize(&mut self, blob: &[u8]) -> Result<()> {
        let snapshot = match Snapshot::decode(blob) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(bytes = blob.len(), %err, "rejected snapshot");
                return Err(err);
            }
        };
        let registry = Registry::from_targets(&snapshot.targets)?;

        self.registry = registry;
        self.config.replicas = snapshot.replicas;
        self.ring.targets = snapshot.targets;
        self.ring.points = snapshot.points;
        self.ring.ranks = snapshot.ranks;
        self.frozen = snapshot.frozen;
        self.dirty = false;

        debug!(
            bytes = blob.len(),
            targets = self.ring.targets.len(),
            items = self.ring.points.len(),
            "unserialized context"
        );
        Ok(())
    }

    /// Serialize the context into the file at `path`, replacing its contents.
    ///
    /// Returns the number of bytes written.
    pub fn serialize_to_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::InvalidParameter("empty path"));
        }

        let blob = self.serialize()?;
        fs::write(path, &blob)?;

        debug!(path = %path.display(), bytes = blob.len(), "wrote snapshot");
        Ok(blob.len())
    }

    /// Replace the whole context with the snapshot stored in the file at `path`.
    pub fn unserialize_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::InvalidParameter("empty path"));
        }

        let blob = fs::read(path)?;
        debug!(path = %path.display(), bytes = blob.len(), "read snapshot");
        self.unserialize(&blob)
    }
}

struct Snapshot {
    frozen: bool,
    replicas: u16,
    targets: Vec<Target>,
    points: Vec<Point>,
    ranks: Vec<Rank>,
}

impl Snapshot {
    fn decode(blob: &[u8]) -> Result<Snapshot> {
        let mut reader = Reader { buf: blob };

        if reader.u32()? != MAGIC {
            return Err(Error::InvalidParameter("bad snapshot magic"));
        }
        if reader.u8()? != VERSION {
            return Err(Error::InvalidParameter("unsupported snapshot version"));
        }
        let flags = reader.u8()?;
        if flags & !FLAG_FROZEN != 0 {
            return Err(Error::InvalidParameter("unknown snapshot flags"));
        }
        let replicas = reader.u16()?;
        if replicas == 0 {
            return Err(Error::InvalidParameter("snapshot replicas must be positive"));
        }

        let targets_count = usize::from(reader.u16()?);
        reader.ensure(targets_count * TARGET_LEN)?;
        let mut targets = Vec::new();
        targets.try_reserve_exact(targets_count)?;

        let mut names = HashSet::new();
        for position in 0..targets_count {
            let index = reader.u16()?;
            let weight = reader.u8()?;
            let name_len = usize::from(reader.u16()?);
            let name = reader.take(name_len)?;

            if usize::from(index) != position {
                return Err(Error::InvalidParameter("snapshot target out of order"));
            }
            validate(name, weight)?;
            if !names.insert(name) {
                return Err(Error::InvalidParameter("duplicate target name"));
            }

            targets.push(Target {
                index,
                name: name.to_vec(),
                weight,
            });
        }

        let items_count = reader.u32()? as usize;
        if targets_count == 0 && items_count != 0 {
            return Err(Error::InvalidParameter("snapshot points without targets"));
        }
        if targets_count != 0 && items_count == 0 {
            return Err(Error::InvalidParameter("snapshot targets without points"));
        }
        let ranks_count = items_count
            .checked_mul(targets_count)
            .ok_or(Error::InvalidParameter("truncated snapshot"))?;
        let body_len = items_count
            .checked_mul(POINT_LEN)
            .zip(ranks_count.checked_mul(RANK_LEN))
            .and_then(|(points, ranks)| points.checked_add(ranks))
            .ok_or(Error::InvalidParameter("truncated snapshot"))?;
        if reader.buf.len() != body_len {
            return Err(Error::InvalidParameter("snapshot length mismatch"));
        }

        let mut points: Vec<Point> = Vec::new();
        points.try_reserve_exact(items_count)?;
        let mut owned = vec![0u32; targets_count];
        for _ in 0..items_count {
            let point = Point {
                hash: reader.u32()?,
                target: reader.u16()?,
            };
            if usize::from(point.target) >= targets_count {
                return Err(Error::InvalidParameter("snapshot point target out of range"));
            }
            if points.last().is_some_and(|last| *last >= point) {
                return Err(Error::InvalidParameter("snapshot continuum not sorted"));
            }
            owned[usize::from(point.target)] += 1;
            points.push(point);
        }
        // deduplicated points may fall short of weight * replicas, never exceed it
        for (target, count) in targets.iter().zip(&owned) {
            if *count == 0 || *count > u32::from(target.weight) * u32::from(replicas) {
                return Err(Error::InvalidParameter(
                    "snapshot point count does not match target weight",
                ));
            }
        }

        let mut ranks = Vec::new();
        ranks.try_reserve_exact(ranks_count)?;
        // generation stamp per target, bumped for every row
        let mut seen = vec![0usize; targets_count];
        for (row, point) in points.iter().enumerate() {
            for position in 0..targets_count {
                let rank = Rank {
                    rank: reader.u16()?,
                    target: reader.u16()?,
                };
                let target = usize::from(rank.target);

                if usize::from(rank.rank) != position || target >= targets_count {
                    return Err(Error::InvalidParameter("snapshot ranking out of range"));
                }
                if seen[target] == row + 1 {
                    return Err(Error::InvalidParameter("snapshot ranking repeats a target"));
                }
                if position == 0 && rank.target != point.target {
                    return Err(Error::InvalidParameter(
                        "snapshot ranking does not start at its point",
                    ));
                }

                seen[target] = row + 1;
                ranks.push(rank);
            }
        }

        Ok(Snapshot {
            frozen: flags & FLAG_FROZEN != 0,
            replicas,
            targets,
            points,
            ranks,
        })
    }
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn ensure(&self, len: usize) -> Result<()> {
        if self.buf.len() < len {
            return Err(Error::InvalidParameter("truncated snapshot"));
        }
        Ok(())
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{HEADER_LEN, MAGIC};
    use crate::{Config, Context, Error};

    fn four_targets() -> Context {
        let mut context = Context::new();
        for index in 1..=4 {
            context.add_target(format!("192.168.0.{index}"), 1).unwrap();
        }
        context
    }

    fn small() -> Context {
        let mut context = Context::with_config(Config { replicas: 2 });
        context.add_target("a", 1).unwrap();
        context.add_target("bc", 2).unwrap();
        context
    }

    #[test]
    fn layout() {
        let mut context = small();
        let blob = context.serialize().unwrap();

        let items = context.ring().unwrap().items_count();
        assert_eq!(items, 6);
        assert_eq!(blob.len(), HEADER_LEN + (5 + 1) + (5 + 2) + 4 + 6 * 6 + 6 * 2 * 4);

        assert_eq!(&blob[0..4], &MAGIC.to_le_bytes());
        assert_eq!(&blob[0..4], b"CHAH");
        assert_eq!(blob[4], 1);
        assert_eq!(blob[5], 0);
        assert_eq!(&blob[6..8], &[2, 0]);
        assert_eq!(&blob[8..10], &[2, 0]);
        assert_eq!(&blob[10..16], &[0, 0, 1, 1, 0, b'a']);
        assert_eq!(&blob[16..23], &[1, 0, 2, 2, 0, b'b', b'c']);
        assert_eq!(&blob[23..27], &[6, 0, 0, 0]);
    }

    #[test]
    fn serialize_is_deterministic() {
        let first = four_targets().serialize().unwrap();
        let second = four_targets().serialize().unwrap();
        assert_eq!(first, second);

        let mut restored = Context::new();
        restored.unserialize(&first).unwrap();
        assert_eq!(restored.serialize().unwrap(), first);
    }

    #[test]
    fn unserialize_restores_lookups() {
        let mut context = four_targets();
        let blob = context.serialize().unwrap();

        let mut restored = Context::new();
        restored.unserialize(&blob).unwrap();

        assert!(!restored.is_dirty());
        assert_eq!(restored.count_targets(), 4);
        for key in ["1", "2", "3", "4"] {
            assert_eq!(
                restored.lookup_ranked(key, 4).unwrap(),
                context.lookup_ranked(key, 4).unwrap()
            );
        }
        assert_eq!(restored.lookup_one("1").unwrap(), b"192.168.0.1");
        assert_eq!(restored.lookup_one("3").unwrap(), b"192.168.0.4");
        assert_eq!(restored, context);
    }

    #[test]
    fn unserialize_restores_frozen_flag_and_replicas() {
        let mut context = small();
        context.freeze();
        let blob = context.serialize().unwrap();

        let mut restored = Context::new();
        restored.unserialize(&blob).unwrap();

        assert!(restored.is_frozen());
        assert_eq!(restored.config().replicas, 2);
        assert!(matches!(
            restored.add_target("d", 1),
            Err(Error::AlreadyFrozen)
        ));

        restored.unfreeze();
        restored.remove_target("bc").unwrap();
        assert_eq!(restored.rebuild().unwrap(), 2);
    }

    #[test]
    fn empty_context_round_trips() {
        let mut context = Context::new();
        let blob = context.serialize().unwrap();
        assert_eq!(blob.len(), HEADER_LEN + 4);

        let mut restored = four_targets();
        restored.unserialize(&blob).unwrap();
        assert_eq!(restored.count_targets(), 0);
        assert!(matches!(restored.lookup_one("1"), Err(Error::NotFound(_))));
    }

    #[test]
    fn malformed_blobs_leave_context_untouched() {
        let mut context = small();
        let blob = context.serialize().unwrap();

        let mut target = four_targets();
        target.rebuild().unwrap();
        let before = target.clone();

        let mut bad_magic = blob.clone();
        bad_magic[0] ^= 0xff;
        let mut bad_version = blob.clone();
        bad_version[4] = 9;
        let mut bad_flags = blob.clone();
        bad_flags[5] = 0x80;
        let mut trailing = blob.clone();
        trailing.push(0);
        let mut unsorted = blob.clone();
        unsorted[27..33].copy_from_slice(&[0xff, 0xff, 0xff, 0xff, 0, 0]);
        let mut bad_target = blob.clone();
        bad_target[31] = 9;
        let mut zero_weight = blob.clone();
        zero_weight[12] = 0;
        let mut repeated_rank = blob.clone();
        let ranks = 27 + 6 * 6;
        repeated_rank[ranks + 6] = repeated_rank[ranks + 2];
        let mut too_many_points = blob.clone();
        too_many_points[6] = 1;
        let mut no_points = blob[..23].to_vec();
        no_points.extend_from_slice(&[0, 0, 0, 0]);
        let idle_target: [&[u8]; 7] = [
            &MAGIC.to_le_bytes(),
            &[1, 0, 2, 0, 2, 0],
            &[0, 0, 1, 1, 0, b'a'],
            &[1, 0, 1, 1, 0, b'b'],
            &[1, 0, 0, 0],
            &[5, 0, 0, 0, 0, 0],
            &[0, 0, 0, 0, 1, 0, 1, 0],
        ];
        let idle_target = idle_target.concat();

        let cases: [(&str, &[u8]); 14] = [
            ("empty", &[]),
            ("header only", &blob[..HEADER_LEN]),
            ("truncated", &blob[..blob.len() - 1]),
            ("bad magic", &bad_magic),
            ("bad version", &bad_version),
            ("bad flags", &bad_flags),
            ("trailing", &trailing),
            ("unsorted", &unsorted),
            ("bad target", &bad_target),
            ("zero weight", &zero_weight),
            ("repeated rank", &repeated_rank),
            ("too many points", &too_many_points),
            ("targets without points", &no_points),
            ("target without points", &idle_target),
        ];

        for (case, blob) in cases {
            assert!(
                matches!(target.unserialize(blob), Err(Error::InvalidParameter(_))),
                "{case} accepted"
            );
            assert_eq!(target, before, "{case} changed the context");
        }
    }

    #[test]
    fn hand_built_snapshot_is_accepted() {
        let parts: [&[u8]; 8] = [
            &MAGIC.to_le_bytes(),
            &[1, 0, 2, 0, 2, 0],
            &[0, 0, 1, 1, 0, b'a'],
            &[1, 0, 1, 1, 0, b'b'],
            &[2, 0, 0, 0],
            &[5, 0, 0, 0, 0, 0, 9, 0, 0, 0, 1, 0],
            &[0, 0, 0, 0, 1, 0, 1, 0],
            &[0, 0, 1, 0, 1, 0, 0, 0],
        ];

        let mut context = Context::new();
        context.unserialize(&parts.concat()).unwrap();

        assert_eq!(context.count_targets(), 2);
        assert_eq!(context.config().replicas, 2);
        let ring = context.ring().unwrap();
        assert_eq!(ring.items_count(), 2);
        assert_eq!(ring.ranking(1).unwrap()[0].target, 1);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chash.serialize");

        let mut context = four_targets();
        let written = context.serialize_to_file(&path).unwrap();
        assert_eq!(written, context.serialize().unwrap().len());

        let mut restored = Context::new();
        restored.unserialize_from_file(&path).unwrap();
        assert_eq!(restored.serialize().unwrap(), context.serialize().unwrap());
    }

    #[test]
    fn file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut context = four_targets();

        assert!(matches!(
            context.unserialize_from_file(dir.path().join("missing")),
            Err(Error::Io(_))
        ));
        assert!(matches!(
            context.serialize_to_file(dir.path().join("missing").join("file")),
            Err(Error::Io(_))
        ));
        assert!(matches!(
            context.serialize_to_file(""),
            Err(Error::InvalidParameter(_))
        ));

        let garbage = dir.path().join("garbage");
        std::fs::write(&garbage, b"not a snapshot").unwrap();
        assert!(matches!(
            context.unserialize_from_file(&garbage),
            Err(Error::InvalidParameter(_))
        ));
    }
}
