use siphasher::sip::SipHasher;
use std::hash::{BuildHasher, Hasher};

#[cfg(feature = "derive")]
use serde::{Deserialize, Serialize};

use tracing::debug;

use crate::error::Result;

mod codec;
mod continuum;
mod crud;
mod iterator;
mod lookup;
mod murmur;
mod registry;

pub use continuum::{Point, Rank, Ring};
pub use iterator::Targets;
pub use murmur::{DefaultHashBuilder, Murmur2};
pub use registry::{MAX_TARGETS, Target};

use registry::Registry;

/// Number of ring points generated per unit of target weight.
pub const DEFAULT_REPLICAS: u16 = 128;

/// SipHash-1-3 with a zero key, truncated to 32 bits on the ring.
///
/// Rings built with this hasher are not interchangeable with rings built with
/// [`DefaultHashBuilder`]: a snapshot must be restored into a context using the
/// same hasher it was taken with.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct SipHashBuilder;

impl BuildHasher for SipHashBuilder {
    type Hasher = SipHasher;

    fn build_hasher(&self) -> Self::Hasher {
        SipHasher::new()
    }
}

/// Ring configuration
///
/// * `replicas` - number of ring points per unit of weight (higher number means a more even
///   distribution of keys across all targets, but a larger continuum and ranking table)
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "derive", derive(Serialize, Deserialize))]
pub struct Config {
    pub replicas: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            replicas: DEFAULT_REPLICAS,
        }
    }
}

/// Context owns one weighted consistent hashing ring: its targets, the continuum and the
/// ranking table built from them, and the frozen guard.
///
/// Mutations mark the context dirty; the next lookup, [`Context::ring`] or
/// [`Context::serialize`] rebuilds the continuum and ranking table before using them.
/// Freezing only forbids mutations, it never triggers or prevents a rebuild.
#[derive(Clone, PartialEq, Debug)]
pub struct Context<S = DefaultHashBuilder> {
    config: Config,
    registry: Registry,
    ring: Ring<S>,
    frozen: bool,
    dirty: bool,
}

impl Default for Context {
    fn default() -> Self {
        Context::with_hasher(Config::default(), DefaultHashBuilder)
    }
}

impl Context {
    /// Create an empty `Context` with [`DEFAULT_REPLICAS`] points per unit of weight.
    pub fn new() -> Context {
        Context::default()
    }

    /// Create an empty `Context` with the given configuration.
    pub fn with_config(config: Config) -> Context {
        Context::with_hasher(config, DefaultHashBuilder)
    }
}

impl<S> Context<S> {
    /// Creates an empty `Context` which will use the given hash builder for ring points and keys.
    ///
    /// # Arguments
    ///
    /// * `config` - ring configuration, `replicas` is raised to at least 1
    /// * `hash_builder` - implementation of BuildHasher; only the low 32 bits of each hash are used
    ///
    /// # Examples
    ///
    /// ```
    /// use chashring::{Config, Context, SipHashBuilder};
    ///
    /// let mut context = Context::with_hasher(Config { replicas: 64 }, SipHashBuilder);
    /// context.add_target("10.0.0.1:11211", 1).unwrap();
    ///
    /// assert_eq!(context.lookup_one("foo").unwrap(), b"10.0.0.1:11211");
    /// ```
    pub fn with_hasher(config: Config, hash_builder: S) -> Context<S> {
        Context {
            config: Config {
                replicas: config.replicas.max(1),
            },
            registry: Registry::default(),
            ring: Ring::new(hash_builder),
            frozen: false,
            dirty: true,
        }
    }

    pub fn config(&self) -> Config {
        self.config
    }

    /// Returns true if mutations are currently rejected.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Returns true if the targets changed since the ring was last built.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl<S> Context<S>
where
    S: BuildHasher,
{
    /// Build the continuum and ranking table from the current targets.
    ///
    /// Returns the number of points on the ring. An empty registry produces an empty ring,
    /// lookups against it fail with [`Error::NotFound`](crate::Error::NotFound).
    /// On failure the previous ring is kept and the context stays dirty.
    pub fn rebuild(&mut self) -> Result<usize> {
        let items = self.ring.rebuild(&self.registry, self.config.replicas)?;
        self.dirty = false;

        debug!(
            targets = self.registry.len(),
            items,
            replicas = self.config.replicas,
            "rebuilt continuum"
        );

        Ok(items)
    }

    /// Return the built ring, rebuilding it first if the targets changed.
    ///
    /// The returned ring is immutable and can be shared between threads for lookups.
    pub fn ring(&mut self) -> Result<&Ring<S>> {
        if self.dirty {
            self.rebuild()?;
        }
        Ok(&self.ring)
    }
}

// Hash `bytes` with a fresh hasher and keep the low 32 bits.
pub(crate) fn hash32<S: BuildHasher>(hash_builder: &S, bytes: &[u8]) -> u32 {
    let mut hasher = hash_builder.build_hasher();
    hasher.write(bytes);
    hasher.finish() as u32
}
