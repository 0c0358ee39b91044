//! # Scopes
//!
//! A scope partitions brokers: the same message type published under two
//! different scopes reaches two disjoint sets of subscribers.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display};
use std::hash::Hash;

/// Key under which brokers are partitioned.
///
/// Implemented automatically for every hashable, comparable, cloneable value.
pub trait ScopeKey: Hash + Eq + Clone + Debug + Send + Sync + 'static {}

impl<T> ScopeKey for T where T: Hash + Eq + Clone + Debug + Send + Sync + 'static {}

/// The process-wide default scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlobalScope;

impl Display for GlobalScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("global")
    }
}

/// Opaque per-object scope identifier.
///
/// Typically the identity of whatever owns a group of subscribers (a view,
/// an entity, a session). The value carries no meaning beyond equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub u64);

impl InstanceId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for InstanceId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance#{}", self.0)
    }
}
