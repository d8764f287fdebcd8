//! Statistics and diagnostics for flow pools

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use serde::Serialize;

use super::pool::PoolSnapshot;

/// Device-wide flow pool counters
#[derive(Debug, Default)]
pub struct FlowPoolStats {
    /// Pool map events received
    pub pool_map_count: AtomicU64,
    /// Pool unmap events received
    pub pool_unmap_count: AtomicU64,
    /// Packets dropped because their flow had no pool
    pub pkt_drop_no_pool: AtomicU64,
    /// Pools created
    pub pools_created: AtomicU64,
    /// Pools that reached the inactive state
    pub pools_destroyed: AtomicU64,
    /// Pools parked as invalid
    pub pools_invalidated: AtomicU64,
}

impl FlowPoolStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current statistics snapshot
    pub fn snapshot(&self) -> FlowPoolStatsSnapshot {
        FlowPoolStatsSnapshot {
            pool_map_count: self.pool_map_count.load(Ordering::Relaxed),
            pool_unmap_count: self.pool_unmap_count.load(Ordering::Relaxed),
            pkt_drop_no_pool: self.pkt_drop_no_pool.load(Ordering::Relaxed),
            pools_created: self.pools_created.load(Ordering::Relaxed),
            pools_destroyed: self.pools_destroyed.load(Ordering::Relaxed),
            pools_invalidated: self.pools_invalidated.load(Ordering::Relaxed),
        }
    }

    /// Zero the event counters. Lifecycle counters keep tracking live pools.
    pub fn clear(&self) {
        self.pool_map_count.store(0, Ordering::Relaxed);
        self.pool_unmap_count.store(0, Ordering::Relaxed);
        self.pkt_drop_no_pool.store(0, Ordering::Relaxed);
    }
}

/// Plain copy of [`FlowPoolStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FlowPoolStatsSnapshot {
    pub pool_map_count: u64,
    pub pool_unmap_count: u64,
    pub pkt_drop_no_pool: u64,
    pub pools_created: u64,
    pub pools_destroyed: u64,
    pub pools_invalidated: u64,
}

impl FlowPoolStatsSnapshot {
    /// Pools created and not yet destroyed
    pub fn live_pools(&self) -> u64 {
        self.pools_created.saturating_sub(self.pools_destroyed)
    }
}

/// Read-only picture of the whole device for operator tooling
#[derive(Debug, Clone, Serialize)]
pub struct FlowPoolDiagnostics {
    /// Descriptors minted by the slab
    pub slab_total: usize,
    /// Descriptors free in the slab
    pub slab_free: usize,
    /// Pools waiting on outstanding descriptors
    pub invalid_pools: usize,
    pub stats: FlowPoolStatsSnapshot,
    /// Registered pools in registry order
    pub pools: Vec<PoolSnapshot>,
}

impl FlowPoolDiagnostics {
    /// Descriptors held by pools, free or leased
    pub fn descriptors_in_pools(&self) -> usize {
        self.pools
            .iter()
            .map(|pool| pool.available as usize + pool.in_flight as usize)
            .sum()
    }

    pub fn pool(&self, pool_id: u8) -> Option<&PoolSnapshot> {
        self.pools.iter().find(|pool| pool.pool_id == Some(pool_id))
    }
}

impl fmt::Display for FlowPoolDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Global Pool")?;
        writeln!(f, "Total {} :: Available {}", self.slab_total, self.slab_free)?;
        writeln!(f, "Invalid flow_pool {}", self.invalid_pools)?;
        writeln!(f, "No of pool map received {}", self.stats.pool_map_count)?;
        writeln!(f, "No of pool unmap received {}", self.stats.pool_unmap_count)?;
        writeln!(f, "Pkt dropped due to unavailability of pool {}", self.stats.pkt_drop_no_pool)?;
        for pool in &self.pools {
            writeln!(f, "{}", pool)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_clear() {
        let stats = FlowPoolStats::new();
        FlowPoolStats::bump(&stats.pool_map_count);
        FlowPoolStats::bump(&stats.pools_created);
        FlowPoolStats::bump(&stats.pools_created);
        FlowPoolStats::bump(&stats.pools_destroyed);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.pool_map_count, 1);
        assert_eq!(snapshot.live_pools(), 1);

        stats.clear();
        let cleared = stats.snapshot();
        assert_eq!(cleared.pool_map_count, 0);
        assert_eq!(cleared.live_pools(), 1);
    }
}
