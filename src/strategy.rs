//! Read strategies.

use std::fmt;

/// How a read decides between the cache and the repository.
///
/// All strategies share the same key namespace, but pass-through and mutex
/// store plain entries while logical expiration stores wrapped ones; pick
/// one strategy per entity kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CacheStrategy {
    /// Cache, then repository on a miss; absent entities are remembered with
    /// a short-lived null marker. Protects against penetration only.
    #[default]
    PassThrough,

    /// Pass-through plus a per-key lock so only one caller rebuilds a missing
    /// entry; everyone else waits and re-reads. Protects against breakdown.
    Mutex,

    /// Entries never expire physically; a stale entry is served immediately
    /// while a single background task refreshes it. Keys must be warmed up
    /// first: a cold key reads as not found.
    LogicalExpiration,
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheStrategy::PassThrough => write!(f, "PassThrough"),
            CacheStrategy::Mutex => write!(f, "Mutex"),
            CacheStrategy::LogicalExpiration => write!(f, "LogicalExpiration"),
        }
    }
}
