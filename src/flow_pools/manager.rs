//! Device-scoped flow pool manager
//!
//! One manager exists per device. It owns the registry, borrows the global
//! descriptor slab, and is the entry point for firmware events, the send path
//! and teardown.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use spin::{Mutex, RwLock};

use crate::{
    descriptors::{DescriptorSource, TxDescriptor},
    error::{FlowPoolError, Result},
};

use super::{
    config::FlowControlConfig,
    control::{FlowControlSink, FlowSignal, SignalDispatcher},
    pool::{FlowId, FlowPool, PoolHandle, PoolId, PoolSnapshot, Thresholds},
    registry::PoolRegistry,
    stats::{FlowPoolDiagnostics, FlowPoolStats, FlowPoolStatsSnapshot},
    INVALID_POOL_ID, MGMT_POOL_ID, MGMT_POOL_SIZE,
};

/// Flow pool manager for one device
pub struct FlowPoolManager {
    config: FlowControlConfig,
    slab: Arc<dyn DescriptorSource>,
    registry: PoolRegistry,
    dispatcher: SignalDispatcher,
    /// Which pool each mapped flow sends from. Written only by firmware
    /// events; never held with another lock.
    flows: RwLock<HashMap<FlowId, PoolHandle>>,
    mgmt_pool: Mutex<Option<PoolHandle>>,
    invalid_pools: AtomicUsize,
    next_serial: AtomicU64,
    shut_down: AtomicBool,
    stats: FlowPoolStats,
}

impl FlowPoolManager {
    /// Bring up flow control for a device
    pub fn new(
        config: FlowControlConfig,
        slab: Arc<dyn DescriptorSource>,
        sink: Arc<dyn FlowControlSink>,
    ) -> Result<Self> {
        config.validate()?;

        let manager = Self {
            config,
            slab,
            registry: PoolRegistry::new(),
            dispatcher: SignalDispatcher::new(sink),
            flows: RwLock::new(HashMap::new()),
            mgmt_pool: Mutex::new(None),
            invalid_pools: AtomicUsize::new(0),
            next_serial: AtomicU64::new(1),
            shut_down: AtomicBool::new(false),
            stats: FlowPoolStats::new(),
        };

        if manager.config.global_mgmt_pool {
            match manager.create_pool(MGMT_POOL_ID, MGMT_POOL_SIZE) {
                Ok(pool) => *manager.mgmt_pool.lock() = Some(pool),
                Err(err) => log::error!("management pool creation failed: {}", err),
            }
        }

        Ok(manager)
    }

    /// Create a pool and draw its descriptors from the slab.
    ///
    /// The returned handle carries the pool's first reference. If the slab
    /// cannot cover `size`, the pool starts deficient and is topped up later
    /// when other pools give descriptors back.
    pub fn create_pool(&self, pool_id: PoolId, size: u16) -> Result<PoolHandle> {
        self.ensure_running()?;
        if pool_id == INVALID_POOL_ID {
            return Err(FlowPoolError::invalid_parameter(
                "pool_id",
                "Pool id is reserved for invalidated pools",
            ));
        }
        if size == 0 {
            return Err(FlowPoolError::invalid_parameter(
                "pool_size",
                "Pool size cannot be zero",
            ));
        }

        let thresholds = self.thresholds_for(size);
        let descriptors = self.slab.take(size as usize);
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let pool = Arc::new(FlowPool::new(serial, pool_id, size, thresholds, descriptors));

        self.registry.insert(pool.clone());
        FlowPoolStats::bump(&self.stats.pools_created);
        log::debug!(
            "created {} id {} size {} available {} (start {} stop {})",
            pool,
            pool_id,
            size,
            pool.available(),
            thresholds.start,
            thresholds.stop
        );

        Ok(pool)
    }

    /// Find a live pool by firmware id
    pub fn lookup(&self, pool_id: PoolId) -> Option<PoolHandle> {
        self.registry.lookup(pool_id)
    }

    /// Pool currently serving `flow_id`
    pub fn pool_for_flow(&self, flow_id: FlowId) -> Option<PoolHandle> {
        self.flows.read().get(&flow_id).cloned()
    }

    /// The shared management-frame pool, when enabled
    pub fn mgmt_pool(&self) -> Option<PoolHandle> {
        self.mgmt_pool.lock().clone()
    }

    /// Draw a descriptor from `pool`.
    ///
    /// Only the pool's own lock is taken, so a send path that caches the
    /// handle from [`pool_for_flow`](Self::pool_for_flow) stays off every
    /// device-wide lock. `None` is backpressure: the caller defers or drops
    /// the packet.
    pub fn acquire_descriptor(&self, pool: &PoolHandle) -> Option<TxDescriptor> {
        let (descriptor, signal) = pool.acquire();
        self.dispatcher.dispatch(signal);
        descriptor.map(|id| TxDescriptor::new(id, pool.clone()))
    }

    /// Draw a descriptor from whichever pool serves `flow_id`.
    ///
    /// Resolves the pool through the shared read side of the flow map, which
    /// only firmware events write.
    pub fn acquire_for_flow(&self, flow_id: FlowId) -> Option<TxDescriptor> {
        match self.pool_for_flow(flow_id) {
            Some(pool) => self.acquire_descriptor(&pool),
            None => {
                FlowPoolStats::bump(&self.stats.pkt_drop_no_pool);
                None
            }
        }
    }

    /// Hand a descriptor back to the pool it was leased from
    pub fn release_descriptor(&self, descriptor: TxDescriptor) -> Result<()> {
        let (id, pool) = descriptor.into_parts();
        let outcome = pool.release(id)?;
        self.dispatcher.dispatch(outcome.signal);

        if let Some(shed) = outcome.shed {
            self.donate(vec![shed]);
        }
        if outcome.reclaim {
            self.reclaim_invalid_pool(&pool)?;
        }
        Ok(())
    }

    /// Visit a copy of every registered pool.
    ///
    /// Each pool is pinned with a temporary reference while its copy is
    /// visited, and no lock is held while `visit` runs, so the visitor may log
    /// or call back into the manager.
    pub fn for_each_snapshot<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&PoolSnapshot),
    {
        let mut previous: Option<PoolHandle> = None;
        let mut cursor = self.registry.next_referenced(None);

        while let Some(pool) = cursor {
            let snapshot = pool.snapshot();
            if let Some(done) = previous.take() {
                self.decrement_reference(&done, false)?;
            }
            visit(&snapshot);
            cursor = self.registry.next_referenced(Some(&*pool));
            previous = Some(pool);
        }

        if let Some(done) = previous {
            self.decrement_reference(&done, false)?;
        }
        Ok(())
    }

    /// Collect, log and return the state of the slab and every pool
    pub fn dump_diagnostics(&self) -> FlowPoolDiagnostics {
        let mut pools = Vec::new();
        if let Err(err) = self.for_each_snapshot(|snapshot| pools.push(snapshot.clone())) {
            log::error!("pool walk aborted: {}", err);
        }

        let diagnostics = FlowPoolDiagnostics {
            slab_total: self.slab.total(),
            slab_free: self.slab.free_count(),
            invalid_pools: self.invalid_pool_count(),
            stats: self.stats.snapshot(),
            pools,
        };
        for line in diagnostics.to_string().lines() {
            log::info!("{}", line);
        }
        diagnostics
    }

    /// Zero the map/unmap/drop counters
    pub fn clear_stats(&self) {
        self.stats.clear();
    }

    pub fn stats(&self) -> FlowPoolStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn config(&self) -> &FlowControlConfig {
        &self.config
    }

    /// Pools currently parked as invalid
    pub fn invalid_pool_count(&self) -> usize {
        self.invalid_pools.load(Ordering::Acquire)
    }

    /// Number of pools linked into the registry
    pub fn pool_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Bring down flow control.
    ///
    /// New pools are refused from here on. Every pool still registered is
    /// force-released; descriptors still in flight go straight to the slab
    /// when they complete.
    pub fn shutdown(&self) -> Result<()> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mgmt = self.mgmt_pool.lock().take();
        if let Some(pool) = mgmt {
            self.decrement_reference(&pool, false)?;
        }

        let mut lingering = 0usize;
        while let Some(pool) = self.registry.first() {
            lingering += 1;
            log::warn!("flow pool list is not empty {}", lingering);
            if lingering == 1 {
                self.dump_diagnostics();
            }
            self.decrement_reference(&pool, true)?;
        }

        self.flows.write().clear();
        Ok(())
    }

    pub(crate) fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(FlowPoolError::ContextShutdown);
        }
        Ok(())
    }

    pub(crate) fn thresholds_for(&self, size: u16) -> Thresholds {
        Thresholds {
            start: self.config.start_threshold(size),
            stop: self.config.stop_threshold(size),
        }
    }

    pub(crate) fn registry(&self) -> &PoolRegistry {
        &self.registry
    }

    pub(crate) fn slab(&self) -> &Arc<dyn DescriptorSource> {
        &self.slab
    }

    pub(crate) fn dispatcher(&self) -> &SignalDispatcher {
        &self.dispatcher
    }

    pub(crate) fn invalid_counter(&self) -> &AtomicUsize {
        &self.invalid_pools
    }

    pub(crate) fn pool_stats(&self) -> &FlowPoolStats {
        &self.stats
    }

    pub(crate) fn flows(&self) -> &RwLock<HashMap<FlowId, PoolHandle>> {
        &self.flows
    }

    /// Deliver signals decided under locks that are now released
    pub(crate) fn deliver(&self, signals: Vec<FlowSignal>) {
        for signal in signals {
            self.dispatcher.emit(signal);
        }
    }
}

impl std::fmt::Debug for FlowPoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowPoolManager")
            .field("config", &self.config)
            .field("pools", &self.registry.len())
            .field("invalid_pools", &self.invalid_pool_count())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
