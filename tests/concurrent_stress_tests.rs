//! Concurrent stress tests for high-contention scenarios
//! Send-path threads racing each other, firmware events and teardown

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Barrier,
    },
    thread,
};

use txflow::{
    DescriptorSlab, DescriptorSource, FlowAction, FlowControlConfig, FlowPoolManager,
    InvalidPoolOverflow, PoolStatus, RecordingSink,
};

const VDEV: u8 = 0;

fn setup(slab_size: usize) -> (Arc<FlowPoolManager>, Arc<DescriptorSlab>, Arc<RecordingSink>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let slab = Arc::new(DescriptorSlab::new(slab_size));
    let sink = Arc::new(RecordingSink::new());
    let config = FlowControlConfig::default()
        .with_max_invalid_pools(16)
        .with_invalid_overflow(InvalidPoolOverflow::Report);
    let manager = Arc::new(FlowPoolManager::new(config, slab.clone(), sink.clone()).unwrap());
    (manager, slab, sink)
}

#[cfg(test)]
mod concurrent_stress_tests {
    use super::*;

    /// Test: one sender per flow hammering its own pool
    #[test]
    fn stress_parallel_send_paths() {
        let (manager, slab, sink) = setup(256);
        let flows = 4u8;
        for flow in 0..flows {
            manager.on_flow_map(flow, VDEV, flow, 64).unwrap();
        }

        let rounds = 200;
        let barrier = Arc::new(Barrier::new(flows as usize));
        let sent = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for flow in 0..flows {
            let manager = manager.clone();
            let barrier = barrier.clone();
            let sent = sent.clone();
            handles.push(thread::spawn(move || {
                barrier.wait();
                for round in 0..rounds {
                    let burst = 1 + (round % 64);
                    let mut leased = Vec::with_capacity(burst);
                    for _ in 0..burst {
                        if let Some(descriptor) = manager.acquire_for_flow(flow) {
                            leased.push(descriptor);
                        }
                    }
                    sent.fetch_add(leased.len(), Ordering::Relaxed);
                    for descriptor in leased {
                        manager.release_descriptor(descriptor).unwrap();
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(sent.load(Ordering::Relaxed) > 0);
        manager
            .for_each_snapshot(|snapshot| {
                assert!(snapshot.is_consistent());
                assert_eq!(snapshot.available, 64);
                assert_eq!(snapshot.status, PoolStatus::ActiveUnpaused);
            })
            .unwrap();
        assert_eq!(slab.free_count(), 0);
        for flow in 0..flows {
            // Every pause was followed by exactly one resume
            let actions = sink.signals_for(flow);
            let pauses = actions.iter().filter(|a| **a == FlowAction::Pause).count();
            let resumes = actions.iter().filter(|a| **a == FlowAction::Resume).count();
            assert_eq!(resumes, pauses + 1);
        }
    }

    /// Test: firmware unmaps every pool while completions are pending
    #[test]
    fn stress_unmap_during_completions() {
        let (manager, slab, _sink) = setup(256);
        let flows = 4u8;
        for flow in 0..flows {
            manager.on_flow_map(flow, VDEV, flow, 64).unwrap();
        }

        let leased_barrier = Arc::new(Barrier::new(flows as usize + 1));
        let unmapped_barrier = Arc::new(Barrier::new(flows as usize + 1));
        let mut handles = Vec::new();

        for flow in 0..flows {
            let manager = manager.clone();
            let leased_barrier = leased_barrier.clone();
            let unmapped_barrier = unmapped_barrier.clone();
            handles.push(thread::spawn(move || {
                let leased: Vec<_> = (0..40).filter_map(|_| manager.acquire_for_flow(flow)).collect();
                assert_eq!(leased.len(), 40);
                leased_barrier.wait();
                unmapped_barrier.wait();
                for descriptor in leased {
                    manager.release_descriptor(descriptor).unwrap();
                }
            }));
        }

        leased_barrier.wait();
        for flow in 0..flows {
            manager.on_flow_unmap(flow, VDEV, flow).unwrap();
        }
        assert_eq!(manager.invalid_pool_count(), flows as usize);
        unmapped_barrier.wait();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(manager.invalid_pool_count(), 0);
        assert_eq!(manager.pool_count(), 0);
        assert_eq!(slab.free_count(), 256);
        let stats = manager.stats();
        assert_eq!(stats.pools_invalidated, flows as u64);
        assert_eq!(stats.pools_destroyed, flows as u64);
    }

    /// Test: reference traffic racing a diagnostics walk deletes exactly once
    #[test]
    fn stress_reference_counting_deletes_once() {
        let (manager, slab, _sink) = setup(32);
        let pool = manager.create_pool(7, 32).unwrap();

        let thread_count = 8;
        let barrier = Arc::new(Barrier::new(thread_count + 1));
        let mut handles = Vec::new();

        for _ in 0..thread_count {
            let manager = manager.clone();
            let pool = pool.clone();
            let barrier = barrier.clone();
            handles.push(thread::spawn(move || {
                barrier.wait();
                for _ in 0..500 {
                    manager.increment_reference(&pool).unwrap();
                    manager.decrement_reference(&pool, false).unwrap();
                }
            }));
        }

        barrier.wait();
        for _ in 0..50 {
            let diagnostics = manager.dump_diagnostics();
            assert!(diagnostics.pools.len() <= 1);
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(pool.reference_count(), 1);
        manager.decrement_reference(&pool, false).unwrap();
        assert_eq!(pool.status(), PoolStatus::Inactive);
        assert_eq!(manager.stats().pools_destroyed, 1);
        assert_eq!(slab.free_count(), 32);
    }

    /// Test: pools created short are topped up while others tear down
    #[test]
    fn stress_redistribution_under_traffic() {
        let (manager, slab, _sink) = setup(128);
        manager.on_flow_map(0, VDEV, 0, 96).unwrap();
        manager.on_flow_map(1, VDEV, 1, 64).unwrap();
        let short = manager.lookup(1).unwrap();
        assert_eq!(short.deficient(), 32);

        let sender = {
            let manager = manager.clone();
            thread::spawn(move || {
                for _ in 0..2_000 {
                    if let Some(descriptor) = manager.acquire_for_flow(1) {
                        manager.release_descriptor(descriptor).unwrap();
                    }
                }
            })
        };

        manager.on_flow_unmap(0, VDEV, 0).unwrap();
        sender.join().unwrap();

        assert_eq!(short.deficient(), 0);
        assert_eq!(short.available(), 64);
        assert_eq!(slab.free_count(), 64);
        assert!(short.snapshot().is_consistent());
    }

    /// Test: senders holding a cached pool handle and senders resolving the
    /// flow on every packet, while firmware keeps re-mapping the flows
    #[test]
    fn stress_cached_and_resolved_senders_during_remaps() {
        let (manager, slab, _sink) = setup(128);
        let flows = 2u8;
        for flow in 0..flows {
            manager.on_flow_map(flow, VDEV, flow, 64).unwrap();
        }

        let rounds = 300;
        let barrier = Arc::new(Barrier::new(flows as usize * 2 + 1));
        let mut handles = Vec::new();

        for flow in 0..flows {
            for cached in [true, false] {
                let manager = manager.clone();
                let barrier = barrier.clone();
                handles.push(thread::spawn(move || {
                    let pool = manager.pool_for_flow(flow).unwrap();
                    barrier.wait();
                    for round in 0..rounds {
                        let mut leased = Vec::new();
                        for _ in 0..(1 + round % 16) {
                            let descriptor = if cached {
                                manager.acquire_descriptor(&pool)
                            } else {
                                manager.acquire_for_flow(flow)
                            };
                            leased.extend(descriptor);
                        }
                        for descriptor in leased {
                            manager.release_descriptor(descriptor).unwrap();
                        }
                    }
                }));
            }
        }

        barrier.wait();
        for round in 0..rounds {
            let flow = (round % flows as usize) as u8;
            manager.on_flow_map(flow, VDEV, flow, 64).unwrap();
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(manager.pool_count(), flows as usize);
        for flow in 0..flows {
            let pool = manager.pool_for_flow(flow).unwrap();
            let snapshot = pool.snapshot();
            assert!(snapshot.is_consistent());
            assert_eq!(snapshot.in_flight, 0);
            assert_eq!(snapshot.available, 64);
            assert_eq!(snapshot.status, PoolStatus::ActiveUnpaused);
        }
        for flow in 0..flows {
            manager.on_flow_unmap(flow, VDEV, flow).unwrap();
        }
        assert_eq!(slab.free_count(), 128);
    }
}
