//! Reference counting and staged deletion of flow pools

use std::sync::atomic::Ordering;

use crate::error::{FlowPoolError, Result};

use super::{
    config::InvalidPoolOverflow,
    manager::FlowPoolManager,
    pool::{PoolHandle, PoolStatus},
    redistribute,
    stats::FlowPoolStats,
};

impl FlowPoolManager {
    /// Take an extra reference on a live pool
    pub fn increment_reference(&self, pool: &PoolHandle) -> Result<()> {
        let count = pool.retain()?;
        log::debug!("{} ref_cnt {}", pool, count);
        Ok(())
    }

    /// Drop a reference. The caller that drops the last one unlinks the pool
    /// and deletes it; with `force`, even if descriptors are still out.
    pub fn decrement_reference(&self, pool: &PoolHandle, force: bool) -> Result<()> {
        let released = {
            let mut registry = self.registry().lock();
            let released = pool.drop_ref()?;
            if released {
                registry.remove(pool);
            }
            released
        };

        if released {
            log::debug!("deleting {}", pool);
            self.delete_pool(pool, force)
        } else {
            log::debug!("{} ref_cnt {}", pool, pool.reference_count());
            Ok(())
        }
    }

    /// Delete an unlinked pool whose count just reached zero.
    ///
    /// With nothing outstanding (or `force`) the pool goes inactive. Otherwise
    /// it is parked as invalid: its id is dropped, it regains one reference and
    /// goes back on the registry tail so the last completion can reclaim it.
    /// Free descriptors go to deficient pools first and the slab after.
    fn delete_pool(&self, pool: &PoolHandle, force: bool) -> Result<()> {
        let outcome = {
            let mut registry = self.registry().lock();
            let outcome = {
                let mut state = registry.lock_pool(pool);
                let outcome = state.begin_delete(force);
                if outcome.status == PoolStatus::Invalid {
                    // Armed before the pool lock drops so a racing completion
                    // cannot see an invalid pool with no reference.
                    let revived = pool.revive();
                    debug_assert!(revived);
                    self.invalid_counter().fetch_add(1, Ordering::AcqRel);
                }
                outcome
            };
            if outcome.status == PoolStatus::Invalid {
                registry.push(pool.clone());
            }
            outcome
        };

        if outcome.was_invalid {
            self.invalid_counter().fetch_sub(1, Ordering::AcqRel);
        }
        self.donate(outcome.drained);

        match outcome.status {
            PoolStatus::Invalid => {
                FlowPoolStats::bump(&self.pool_stats().pools_invalidated);
                let count = self.invalid_pool_count();
                log::info!("invalid pool created {} ({} outstanding)", count, pool.in_flight());
                self.check_invalid_bound(count)
            }
            _ => {
                self.forget_flows(pool);
                FlowPoolStats::bump(&self.pool_stats().pools_destroyed);
                log::debug!("{} inactive", pool);
                Ok(())
            }
        }
    }

    /// Last outstanding descriptor of an invalid pool came back: spread its
    /// free descriptors over deficient pools and let it go.
    pub(crate) fn reclaim_invalid_pool(&self, pool: &PoolHandle) -> Result<()> {
        if pool.status() != PoolStatus::Invalid {
            return Err(FlowPoolError::invalid_parameter(
                "pool",
                format!("{} is not invalid", pool),
            ));
        }

        let transfer = {
            let registry = self.registry().lock();
            redistribute::distribute_to_deficient(&registry, pool)
        };
        self.deliver(transfer.signals);

        {
            let mut state = pool.lock();
            state.capacity = state.available();
        }

        // The final delete sees an invalid pool with nothing outstanding,
        // sends it inactive and drops it from the invalid count
        self.decrement_reference(pool, false)?;
        log::info!(
            "invalid pool deleted {} ({} descriptors redistributed)",
            self.invalid_pool_count(),
            transfer.moved
        );
        Ok(())
    }

    fn check_invalid_bound(&self, count: usize) -> Result<()> {
        let limit = self.config().max_invalid_pools;
        if count <= limit {
            return Ok(());
        }

        log::error!(
            "{} flow pools are waiting on outstanding descriptors (limit {}); descriptors are leaking",
            count,
            limit
        );
        match self.config().invalid_overflow {
            InvalidPoolOverflow::Panic => {
                panic!("invalid flow pool limit exceeded: {} > {}", count, limit)
            }
            InvalidPoolOverflow::Report => Err(FlowPoolError::invalid_pool_limit(count, limit)),
        }
    }

    fn forget_flows(&self, pool: &PoolHandle) {
        self.flows()
            .write()
            .retain(|_, mapped| !std::sync::Arc::ptr_eq(mapped, pool));
    }
}
