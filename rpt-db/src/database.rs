use crate::{DbConfig, Replica, SeriesIndex, ShardStore, Storage};
use rpt_cluster::PoolMap;
use rpt_core::FaultSignal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

/// One database on this server: the series index, the shard store, the
/// pool registry, the replica hook and the critical-fault signal.
pub struct Database {
    config: DbConfig,
    pools: RwLock<Arc<PoolMap>>,
    series: Mutex<SeriesIndex>,
    shards: Mutex<Box<dyn Storage>>,
    replica: RwLock<Option<Arc<Replica>>>,
    fault: FaultSignal,
    received_points: AtomicU64,
}

/// Both write-path locks, acquired together. Holding this guard is the
/// only way to touch the series index or the shard store; the acquisition
/// order (series, then shards) lives in exactly one place.
pub struct WriteGuard<'a> {
    pub series: MutexGuard<'a, SeriesIndex>,
    pub shards: MutexGuard<'a, Box<dyn Storage>>,
}

impl Database {
    #[must_use]
    pub fn new(config: DbConfig, pools: PoolMap) -> Self {
        Self::with_storage(config, pools, Box::new(ShardStore::new()))
    }

    #[must_use]
    pub fn with_storage(config: DbConfig, pools: PoolMap, storage: Box<dyn Storage>) -> Self {
        Self {
            config,
            pools: RwLock::new(Arc::new(pools)),
            series: Mutex::new(SeriesIndex::new()),
            shards: Mutex::new(storage),
            replica: RwLock::new(None),
            fault: FaultSignal::new(),
            received_points: AtomicU64::new(0),
        }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn server_name(&self) -> &str {
        &self.config.server_name
    }

    #[inline]
    #[must_use]
    pub fn valid_ts(&self, ts: i64) -> bool {
        self.config.valid_ts(ts)
    }

    #[inline]
    #[must_use]
    pub fn peer_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.config.peer_ack_timeout_ms)
    }

    /// Current pool registry snapshot. Jobs clone the `Arc` once at
    /// creation and keep it for their lifetime.
    #[must_use]
    pub fn pools(&self) -> Arc<PoolMap> {
        Arc::clone(&self.pools.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Swap the registry; in-flight jobs keep their old snapshot.
    pub fn swap_pools(&self, pools: PoolMap) {
        *self.pools.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(pools);
    }

    #[must_use]
    pub fn replica(&self) -> Option<Arc<Replica>> {
        self.replica
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_replica(&self, replica: Option<Arc<Replica>>) {
        *self
            .replica
            .write()
            .unwrap_or_else(PoisonError::into_inner) = replica;
    }

    #[inline]
    #[must_use]
    pub fn fault(&self) -> &FaultSignal {
        &self.fault
    }

    /// Acquire the series mutex, then the shards mutex.
    #[must_use]
    pub fn write_lock(&self) -> WriteGuard<'_> {
        let series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        let shards = self.shards.lock().unwrap_or_else(PoisonError::into_inner);
        WriteGuard { series, shards }
    }

    #[inline]
    #[must_use]
    pub fn received_points(&self) -> u64 {
        self.received_points.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn add_received_points(&self, n: u64) {
        self.received_points.fetch_add(n, Ordering::Relaxed);
    }
}
