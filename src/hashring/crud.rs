use tracing::debug;

use crate::error::{Error, Result};

use super::Context;

impl<S> Context<S> {
    /// Add `name` to the ring with the given weight, or update the weight of an existing target.
    ///
    /// # Arguments
    ///
    /// * `name` - unique, non-empty target name of at most 65535 bytes
    /// * `weight` - share of the ring relative to other targets, must be positive
    pub fn add_target(&mut self, name: impl AsRef<[u8]>, weight: u8) -> Result<()> {
        self.ensure_unfrozen()?;

        let name = name.as_ref();
        self.registry.upsert(name, weight)?;
        self.dirty = true;

        debug!(name = %String::from_utf8_lossy(name), weight, "added target");
        Ok(())
    }

    /// Add or update every target in `targets` and return the resulting number of targets.
    ///
    /// The whole batch is validated before it is applied: if any name or weight is invalid,
    /// no target is added or updated. Later entries win over earlier ones with the same name.
    pub fn set_targets<I, N>(&mut self, targets: I) -> Result<usize>
    where
        I: IntoIterator<Item = (N, u8)>,
        N: AsRef<[u8]>,
    {
        self.ensure_unfrozen()?;

        let targets: Vec<(N, u8)> = targets.into_iter().collect();
        let entries: Vec<(&[u8], u8)> = targets
            .iter()
            .map(|(name, weight)| (name.as_ref(), *weight))
            .collect();

        let count = self.registry.set(&entries)?;
        self.dirty = true;

        debug!(entries = entries.len(), targets = count, "set targets");
        Ok(count)
    }

    /// Remove `name` from the ring.
    pub fn remove_target(&mut self, name: impl AsRef<[u8]>) -> Result<()> {
        self.ensure_unfrozen()?;

        let name = name.as_ref();
        self.registry.remove(name)?;
        self.dirty = true;

        debug!(name = %String::from_utf8_lossy(name), "removed target");
        Ok(())
    }

    /// Remove all targets from the ring.
    pub fn clear_targets(&mut self) -> Result<()> {
        self.ensure_unfrozen()?;

        self.registry.clear();
        self.dirty = true;

        debug!("cleared targets");
        Ok(())
    }

    /// Get the number of targets, whether or not the ring has been built from them.
    pub fn count_targets(&self) -> usize {
        self.registry.len()
    }

    /// Get the weight of `name`, if it is a target.
    pub fn target_weight(&self, name: impl AsRef<[u8]>) -> Option<u8> {
        self.registry.weight(name.as_ref())
    }

    /// Reject all target mutations until [`Context::unfreeze`] is called.
    ///
    /// Lookups keep working and still rebuild the ring if it is dirty.
    pub fn freeze(&mut self) {
        self.frozen = true;
        debug!("froze targets");
    }

    /// Allow target mutations again.
    pub fn unfreeze(&mut self) {
        self.frozen = false;
        debug!("unfroze targets");
    }

    fn ensure_unfrozen(&self) -> Result<()> {
        if self.frozen {
            return Err(Error::AlreadyFrozen);
        }
        Ok(())
    }
}
