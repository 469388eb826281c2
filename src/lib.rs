//! Weighted consistent hashing with ranked lookups
//!
//! A [`Context`] holds a set of named targets (backend servers for example), each with a weight.
//! Keys are mapped onto one target for load distribution, or onto an ordered list of distinct
//! targets for failover and replication. Adding or removing a target only moves the keys of the
//! targets involved.
//!
//! The targets are placed on a continuum of 32-bit hash points, `weight * replicas` points per
//! target. For every point a ranking table stores all targets in the order they are met when
//! walking the ring from that point, so a ranked lookup costs one binary search plus a slice.
//!
//! - Mutations: targets may be added, updated, removed or cleared while the context is not
//!   frozen. Each mutation marks the context dirty.
//! - Lookups: a dirty context rebuilds the continuum and ranking table on the next lookup.
//!   Once built, the immutable [`Ring`] can be shared between threads.
//! - Snapshots: the whole context is serialized to a compact binary blob or file, and restored
//!   without rebuilding.
//!
//! ```
//! use chashring::Context;
//!
//! let mut context = Context::new();
//! context.add_target("192.168.0.1", 1).unwrap();
//! context.add_target("192.168.0.2", 1).unwrap();
//! context.add_target("192.168.0.3", 1).unwrap();
//! context.add_target("192.168.0.4", 1).unwrap();
//!
//! assert_eq!(context.lookup_one("1").unwrap(), b"192.168.0.1");
//! assert_eq!(
//!     context.lookup_ranked("1", 3).unwrap(),
//!     vec![&b"192.168.0.1"[..], &b"192.168.0.3"[..], &b"192.168.0.2"[..]]
//! );
//!
//! let snapshot = context.serialize().unwrap();
//! let mut restored = Context::new();
//! restored.unserialize(&snapshot).unwrap();
//! assert_eq!(restored.lookup_one("1").unwrap(), b"192.168.0.1");
//! ```

mod error;
mod hashring;

pub use error::{Error, Result};
pub use hashring::{
    Config, Context, DEFAULT_REPLICAS, DefaultHashBuilder, MAX_TARGETS, Murmur2, Point, Rank,
    Ring, SipHashBuilder, Target, Targets,
};
