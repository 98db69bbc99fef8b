use crate::Lookup;
use rpt_core::{Result, RiptideError};
use std::sync::Arc;

pub type PoolId = u16;

/// Snapshot of the pool registry as seen by one insert job.
///
/// A job clones the `Arc` at creation time and keeps routing against that
/// snapshot even if the live registry is swapped under a concurrent
/// re-index; the job's per-pool buffer count is frozen the same way.
#[derive(Debug, Clone)]
pub struct PoolMap {
    pool_count: u16,
    own_pool_id: PoolId,
    own_server_id: u16,
    lookup: Arc<Lookup>,
    prev_lookup: Option<Arc<Lookup>>,
}

impl PoolMap {
    /// Registry snapshot for a settled cluster (no re-index in flight).
    #[must_use]
    pub fn new(pool_count: u16, own_pool_id: PoolId, own_server_id: u16) -> Self {
        debug_assert!(own_pool_id < pool_count);
        Self {
            pool_count,
            own_pool_id,
            own_server_id,
            lookup: Arc::new(Lookup::new(pool_count)),
            prev_lookup: None,
        }
    }

    /// Registry snapshot while re-indexing from `prev_pool_count` pools.
    ///
    /// # Errors
    /// Returns a config error if the previous pool count is not smaller
    /// than the current one.
    pub fn reindexing(
        pool_count: u16,
        prev_pool_count: u16,
        own_pool_id: PoolId,
        own_server_id: u16,
    ) -> Result<Self> {
        if prev_pool_count == 0 || prev_pool_count >= pool_count {
            return Err(RiptideError::Config(format!(
                "re-index requires growing the pool count, got {prev_pool_count} -> {pool_count}"
            )));
        }
        Ok(Self {
            pool_count,
            own_pool_id,
            own_server_id,
            lookup: Arc::new(Lookup::new(pool_count)),
            prev_lookup: Some(Arc::new(Lookup::new(prev_pool_count))),
        })
    }

    #[inline]
    #[must_use]
    pub const fn pool_count(&self) -> u16 {
        self.pool_count
    }

    #[inline]
    #[must_use]
    pub const fn own_pool_id(&self) -> PoolId {
        self.own_pool_id
    }

    #[inline]
    #[must_use]
    pub const fn own_server_id(&self) -> u16 {
        self.own_server_id
    }

    /// `prev_lookup` is present exactly while a re-index is in flight.
    #[inline]
    #[must_use]
    pub const fn is_reindexing(&self) -> bool {
        self.prev_lookup.is_some()
    }

    #[inline]
    #[must_use]
    pub fn lookup(&self, name: &[u8]) -> PoolId {
        self.lookup.pool(name)
    }

    /// Pool owning `name` under the hash function that preceded the
    /// current re-index. `None` when the cluster is settled.
    #[inline]
    #[must_use]
    pub fn prev_lookup(&self, name: &[u8]) -> Option<PoolId> {
        self.prev_lookup.as_ref().map(|l| l.pool(name))
    }
}
