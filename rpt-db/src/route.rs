//! Series-to-pool routing.
//!
//! With a settled cluster this is a pure lookup. During a re-index the
//! authority over a name is split between the previous and the current
//! hash function, and whether *this* node still holds the series decides
//! which one wins. The containment check runs under the same lock pair
//! the local apply holds, so a series cannot be routed one way while a
//! concurrent apply is creating it.

use crate::Database;
use rpt_cluster::{PoolId, PoolMap};

#[must_use]
pub fn route_series(db: &Database, pools: &PoolMap, name: &[u8]) -> PoolId {
    if !pools.is_reindexing() {
        return pools.lookup(name);
    }

    {
        let guard = db.write_lock();
        if guard.series.contains(name) {
            // Still ours, at least at this moment.
            return pools.own_pool_id();
        }
    }

    // We do not have the series, so the pool that owned it before the
    // re-index started is authoritative, unless that was us: then the new
    // owner is.
    let prev = pools
        .prev_lookup(name)
        .unwrap_or_else(|| pools.lookup(name));
    if prev == pools.own_pool_id() {
        pools.lookup(name)
    } else {
        prev
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::DbConfig;
    use rpt_core::ValueType;

    #[test]
    fn test_settled_routing_is_pure_lookup() {
        let pools = PoolMap::new(4, 0, 0);
        let db = Database::new(DbConfig::new("tsdb"), pools.clone());
        for name in [&b"cpu"[..], b"mem", b"net.rx"] {
            assert_eq!(route_series(&db, &pools, name), pools.lookup(name));
        }
    }

    #[test]
    fn test_reindex_local_series_stays_local() {
        // Growing 1 -> 2 pools: every name previously belonged to pool 0.
        let pools = PoolMap::reindexing(2, 1, 0, 0).unwrap();
        let db = Database::new(DbConfig::new("tsdb"), pools.clone());

        // Find a name the new lookup moves away from pool 0.
        let name = (0u32..)
            .map(|i| format!("series-{i}").into_bytes())
            .find(|n| pools.lookup(n) == 1)
            .unwrap();

        // Absent locally: previous owner was us, so the new owner wins.
        assert_eq!(route_series(&db, &pools, &name), 1);

        // Present locally: we keep it for now.
        db.write_lock()
            .series
            .get_or_create(&name, ValueType::Int);
        assert_eq!(route_series(&db, &pools, &name), 0);
    }

    #[test]
    fn test_reindex_routing_is_total() {
        let pools = PoolMap::reindexing(3, 2, 1, 0).unwrap();
        let db = Database::new(DbConfig::new("tsdb"), pools.clone());
        for i in 0..64u32 {
            let name = format!("s{i}").into_bytes();
            assert!(route_series(&db, &pools, &name) < pools.pool_count());
        }
    }
}
