//! Firmware pool map, unmap and resize events

use std::convert::TryFrom;

use crate::error::{FlowPoolError, Result};

use super::{
    control::FlowSignal,
    manager::FlowPoolManager,
    pool::{FlowId, PoolId, PoolStatus},
    stats::FlowPoolStats,
    INVALID_POOL_ID,
};

/// Scope of a mapped flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FlowType {
    /// One interface sends from the pool
    Vdev = 0,
}

impl TryFrom<u8> for FlowType {
    type Error = FlowPoolError;

    fn try_from(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(Self::Vdev),
            other => Err(FlowPoolError::unsupported_flow_type(other)),
        }
    }
}

impl FlowPoolManager {
    /// Firmware assigned `pool_id` to `flow_id`.
    ///
    /// Creates the pool on first sight, binds the flow to it and wakes the
    /// flow's queues. A pool that is already at its stop threshold pauses the
    /// flow again right after.
    pub fn on_flow_map(&self, flow_id: FlowId, flow_type: u8, pool_id: PoolId, pool_size: u16) -> Result<()> {
        FlowPoolStats::bump(&self.pool_stats().pool_map_count);
        log::debug!(
            "flow map: flow_id {} flow_type {} pool_id {} pool_size {}",
            flow_id,
            flow_type,
            pool_id,
            pool_size
        );
        self.ensure_running()?;
        if pool_id == INVALID_POOL_ID {
            return Err(FlowPoolError::invalid_parameter(
                "pool_id",
                "Pool id is reserved for invalidated pools",
            ));
        }

        let (pool, created) = match self.lookup(pool_id) {
            Some(pool) => (pool, false),
            None => (self.create_pool(pool_id, pool_size)?, true),
        };

        match FlowType::try_from(flow_type) {
            Ok(FlowType::Vdev) => {
                // A mapped flow starts awake, so the pool restarts unpaused and
                // pauses again straight away if it is already at its stop mark
                let pause = {
                    let mut state = pool.lock();
                    state.member_flow = Some(flow_id);
                    if state.status == PoolStatus::ActivePaused {
                        state.status = PoolStatus::ActiveUnpaused;
                    }
                    state.after_draw()
                };
                self.flows().write().insert(flow_id, pool);
                self.dispatcher().emit(FlowSignal::resume(flow_id));
                self.dispatcher().dispatch(pause);
                Ok(())
            }
            Err(err) => {
                if created {
                    self.decrement_reference(&pool, false)?;
                }
                log::error!("flow type {} not supported", flow_type);
                Err(err)
            }
        }
    }

    /// Firmware took `pool_id` away from `flow_id`.
    ///
    /// Unknown pools are a no-op. Otherwise the flow is unbound and the
    /// pool loses a reference, which deletes it when it was the last.
    pub fn on_flow_unmap(&self, flow_id: FlowId, flow_type: u8, pool_id: PoolId) -> Result<()> {
        FlowPoolStats::bump(&self.pool_stats().pool_unmap_count);
        log::debug!(
            "flow unmap: flow_id {} flow_type {} pool_id {}",
            flow_id,
            flow_type,
            pool_id
        );

        let pool = match self.lookup(pool_id) {
            Some(pool) => pool,
            None => {
                log::info!("flow pool {} not available", pool_id);
                return Ok(());
            }
        };

        if let Err(err) = FlowType::try_from(flow_type) {
            log::info!("flow type {} not supported", flow_type);
            return Err(err);
        }

        pool.lock().member_flow = None;
        {
            let mut flows = self.flows().write();
            if flows
                .get(&flow_id)
                .map_or(false, |mapped| std::sync::Arc::ptr_eq(mapped, &pool))
            {
                flows.remove(&flow_id);
            }
        }

        self.decrement_reference(&pool, false)
    }

    /// Change the size of a live pool.
    ///
    /// Growth is drawn from the slab, with any shortfall left deficient.
    /// Shrinking cancels deficiency first, then sheds free descriptors, and
    /// whatever is still leased is shed as it comes back.
    pub fn on_flow_resize(&self, pool_id: PoolId, new_size: u16) -> Result<()> {
        self.ensure_running()?;
        if new_size == 0 {
            return Err(FlowPoolError::invalid_parameter(
                "pool_size",
                "Pool size cannot be zero",
            ));
        }
        let pool = self
            .lookup(pool_id)
            .ok_or_else(|| FlowPoolError::pool_not_found(pool_id))?;
        let thresholds = self.thresholds_for(new_size);

        let (wanted, shed, signal) = {
            let mut state = pool.lock();
            if !state.status.is_active() {
                return Err(FlowPoolError::invalid_parameter(
                    "pool_id",
                    format!("{} is {}", pool, state.status),
                ));
            }

            let old_size = state.capacity;
            state.capacity = new_size;
            state.thresholds = thresholds;

            let mut wanted = 0usize;
            let mut shed = Vec::new();
            if new_size > old_size {
                let mut grow = new_size - old_size;
                let cancelled = grow.min(state.surplus);
                state.surplus -= cancelled;
                grow -= cancelled;
                state.deficient += grow;
                wanted = grow as usize;
            } else {
                let mut cut = old_size - new_size;
                let forgiven = cut.min(state.deficient);
                state.deficient -= forgiven;
                cut -= forgiven;
                shed = state.drain_free(cut as usize);
                cut -= shed.len() as u16;
                state.surplus += cut;
            }

            (wanted, shed, state.reevaluate())
        };
        self.dispatcher().dispatch(signal);
        self.donate(shed);

        if wanted > 0 {
            let mut batch = self.slab().take(wanted);
            let (moved, signal) = pool.lock().absorb(&mut batch);
            self.slab().give_all(batch);
            self.dispatcher().dispatch(signal);
            log::debug!("{} grew by {} of {} wanted", pool, moved, wanted);
        }

        log::debug!(
            "resized {} to {} (start {} stop {})",
            pool,
            new_size,
            thresholds.start,
            thresholds.stop
        );
        Ok(())
    }
}
