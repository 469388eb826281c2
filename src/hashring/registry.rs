use std::collections::HashSet;

use indexmap::IndexMap;

#[cfg(feature = "derive")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Maximum number of targets a context can hold; indices must fit a `u16`.
pub const MAX_TARGETS: usize = u16::MAX as usize;

const MAX_NAME_LEN: usize = u16::MAX as usize;

/// Target is a named, weighted destination on the ring
///
/// * `index` - position of the target in insertion order at the time the ring was built
/// * `name` - unique, non-empty name
/// * `weight` - relative share of the ring, 1..=255
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "derive", derive(Serialize, Deserialize))]
pub struct Target {
    pub index: u16,
    pub name: Vec<u8>,
    pub weight: u8,
}

// Insertion-ordered targets. The index of a target is its position, so removing a target
// shifts the indices of all later ones; every removal marks the ring dirty.
#[derive(Clone, Default, PartialEq, Debug)]
pub(crate) struct Registry {
    targets: IndexMap<Vec<u8>, u8>,
}

pub(crate) fn validate(name: &[u8], weight: u8) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidParameter("empty target name"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::InvalidParameter("target name too long"));
    }
    if weight == 0 {
        return Err(Error::InvalidParameter("target weight must be positive"));
    }
    Ok(())
}

impl Registry {
    pub(crate) fn len(&self) -> usize {
        self.targets.len()
    }

    pub(crate) fn weight(&self, name: &[u8]) -> Option<u8> {
        self.targets.get(name).copied()
    }

    /// Insert `name` or update its weight in place, keeping its index.
    pub(crate) fn upsert(&mut self, name: &[u8], weight: u8) -> Result<()> {
        validate(name, weight)?;

        if let Some(current) = self.targets.get_mut(name) {
            *current = weight;
            return Ok(());
        }
        if self.targets.len() >= MAX_TARGETS {
            return Err(Error::InvalidParameter("too many targets"));
        }

        self.targets.try_reserve(1)?;
        self.targets.insert(name.to_vec(), weight);
        Ok(())
    }

    /// Upsert every entry, or none of them if any entry is invalid.
    pub(crate) fn set(&mut self, entries: &[(&[u8], u8)]) -> Result<usize> {
        let mut added = HashSet::new();
        for (name, weight) in entries {
            validate(name, *weight)?;
            if !self.targets.contains_key(*name) {
                added.insert(*name);
            }
        }
        if self.targets.len() + added.len() > MAX_TARGETS {
            return Err(Error::InvalidParameter("too many targets"));
        }

        self.targets.try_reserve(added.len())?;
        for (name, weight) in entries {
            match self.targets.get_mut(*name) {
                Some(current) => *current = *weight,
                None => {
                    self.targets.insert(name.to_vec(), *weight);
                }
            }
        }

        Ok(self.targets.len())
    }

    pub(crate) fn remove(&mut self, name: &[u8]) -> Result<()> {
        self.targets
            .shift_remove(name)
            .map(|_| ())
            .ok_or(Error::NotFound("target"))
    }

    pub(crate) fn clear(&mut self) {
        self.targets.clear();
    }

    pub(crate) fn iter(&self) -> indexmap::map::Iter<'_, Vec<u8>, u8> {
        self.targets.iter()
    }

    /// Copy the targets with their current indices.
    pub(crate) fn snapshot(&self) -> Result<Vec<Target>> {
        let mut snapshot = Vec::new();
        snapshot.try_reserve_exact(self.targets.len())?;

        for (index, (name, weight)) in self.targets.iter().enumerate() {
            snapshot.push(Target {
                index: index as u16,
                name: name.clone(),
                weight: *weight,
            });
        }

        Ok(snapshot)
    }

    /// Rebuild a registry from targets ordered by index, as decoded from a snapshot.
    pub(crate) fn from_targets(targets: &[Target]) -> Result<Registry> {
        let mut map = IndexMap::new();
        map.try_reserve(targets.len())?;

        for target in targets {
            if map.insert(target.name.clone(), target.weight).is_some() {
                return Err(Error::InvalidParameter("duplicate target name"));
            }
        }

        Ok(Registry { targets: map })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{Registry, Target};
    use crate::Error;

    fn names(registry: &Registry) -> Vec<&[u8]> {
        registry.iter().map(|(name, _)| name.as_slice()).collect()
    }

    #[test]
    fn upsert_keeps_index_and_updates_weight() {
        let mut registry = Registry::default();
        registry.upsert(b"a", 1).unwrap();
        registry.upsert(b"b", 1).unwrap();
        registry.upsert(b"a", 7).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.weight(b"a"), Some(7));
        assert_eq!(names(&registry), vec![b"a".as_slice(), b"b".as_slice()]);
    }

    #[test]
    fn invalid_targets_are_rejected() {
        let mut registry = Registry::default();

        assert!(matches!(
            registry.upsert(b"", 1),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            registry.upsert(b"a", 0),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            registry.upsert(&vec![b'x'; 70_000], 1),
            Err(Error::InvalidParameter(_))
        ));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn remove_compacts_indices() {
        let mut registry = Registry::default();
        registry.upsert(b"a", 1).unwrap();
        registry.upsert(b"b", 2).unwrap();
        registry.upsert(b"c", 3).unwrap();

        registry.remove(b"a").unwrap();
        assert!(matches!(registry.remove(b"a"), Err(Error::NotFound(_))));

        let snapshot = registry.snapshot().unwrap();
        assert_eq!(
            snapshot,
            vec![
                Target {
                    index: 0,
                    name: b"b".to_vec(),
                    weight: 2
                },
                Target {
                    index: 1,
                    name: b"c".to_vec(),
                    weight: 3
                },
            ]
        );
    }

    #[test]
    fn set_is_all_or_nothing() {
        let mut registry = Registry::default();
        registry.upsert(b"a", 1).unwrap();

        let invalid: [(&[u8], u8); 3] = [(b"b", 1), (b"c", 0), (b"d", 1)];
        assert!(matches!(
            registry.set(&invalid),
            Err(Error::InvalidParameter(_))
        ));
        assert_eq!(names(&registry), vec![b"a".as_slice()]);

        let valid: [(&[u8], u8); 3] = [(b"b", 1), (b"a", 4), (b"b", 2)];
        assert_eq!(registry.set(&valid).unwrap(), 2);
        assert_eq!(registry.weight(b"a"), Some(4));
        assert_eq!(registry.weight(b"b"), Some(2));
    }

    #[test]
    fn from_targets_rejects_duplicates() {
        let target = Target {
            index: 0,
            name: b"a".to_vec(),
            weight: 1,
        };

        assert!(matches!(
            Registry::from_targets(&[target.clone(), target]),
            Err(Error::InvalidParameter(_))
        ));
    }
}
