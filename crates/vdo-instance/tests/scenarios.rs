//! Integration exercises that need a full `Instance` rather than just
//! `AdmissionController` or `Config` in isolation: suspend draining real
//! outstanding permits, and the modify/grow admin paths end to end.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use vdo_core::{Operation, Request, RequestFlags};
use vdo_instance::engine::{completion_channel, Completion, CompletionSender, MockEngineFacade, PermitBundle};
use vdo_instance::error::ErrorKind;
use vdo_instance::{ConfigBuilder, LifecycleState, ModifyRequest, ThreadCounts};
use vdo_instance::geometry::{self, GeometryState, IndexConfig, RegionEntry};
use vdo_instance::Instance;

fn sample_geometry() -> GeometryState {
    GeometryState {
        release_version: 1,
        nonce: 99,
        uuid: [3; 16],
        region_index: RegionEntry { id: 0, offset_blocks: 1 },
        region_data: RegionEntry { id: 1, offset_blocks: 50 },
        index_config: IndexConfig { mem_gb: 1, checkpoint_frequency: 500, sparse: false },
    }
}

/// Holds every request it receives until told to complete it; lets a test
/// drive "N outstanding requests" precisely instead of racing a mock's
/// synchronous-completion default.
struct HoldingEngine {
    held: Mutex<Vec<PermitBundle>>,
    completions: CompletionSender,
    compress_toggled: AtomicU64,
    was_compressing: AtomicBool,
    synchronous_flush_count: AtomicU64,
}

impl HoldingEngine {
    fn new(completions: CompletionSender) -> Self {
        HoldingEngine {
            held: Mutex::new(Vec::new()),
            completions,
            compress_toggled: AtomicU64::new(0),
            was_compressing: AtomicBool::new(true),
            synchronous_flush_count: AtomicU64::new(0),
        }
    }

    fn complete_all(&self) {
        let mut held = self.held.lock().unwrap();
        let n = held.len();
        held.clear();
        drop(held);
        self.completions.send(Completion { request_id: 0, count: n, discard_permits: 0 }).unwrap();
    }
}

impl vdo_instance::EngineFacade for HoldingEngine {
    fn submit(&self, _request: Request, permits: PermitBundle) -> Result<(), ErrorKind> {
        self.held.lock().unwrap().push(permits);
        Ok(())
    }
    fn submit_flush(&self, _request: Request) -> Result<(), ErrorKind> {
        Ok(())
    }
    fn set_compressing(&self, enabled: bool) -> bool {
        self.compress_toggled.fetch_add(1, Ordering::SeqCst);
        self.was_compressing.swap(enabled, Ordering::SeqCst)
    }
    fn suspend(&self, _no_flush: bool) -> Result<(), ErrorKind> {
        Ok(())
    }
    fn resume(&self) -> Result<(), ErrorKind> {
        Ok(())
    }
    fn stop(&self) -> Result<(), ErrorKind> {
        Ok(())
    }
    fn destroy(&self) {}
    fn suspend_dedupe(&self, _save: bool) -> Result<(), ErrorKind> {
        Ok(())
    }
    fn resume_dedupe(&self) -> Result<(), ErrorKind> {
        Ok(())
    }
    fn set_read_only(&self, _error_code: i32) {}
    fn prepare_grow_logical(&self, _logical_bytes: u64) -> Result<(), ErrorKind> {
        Ok(())
    }
    fn grow_logical(&self, _logical_bytes: u64) -> Result<(), ErrorKind> {
        Ok(())
    }
    fn prepare_grow_physical(&self, _physical_blocks: u64) -> Result<(), ErrorKind> {
        Ok(())
    }
    fn grow_physical(&self, _physical_blocks: u64) -> Result<(), ErrorKind> {
        Ok(())
    }
    fn worker_pool_contains(&self) -> bool {
        false
    }
    fn flush_delegated(&self) -> bool {
        false
    }
    fn synchronous_flush(&self) -> Result<(), ErrorKind> {
        self.synchronous_flush_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    fn read_geometry_block(&self) -> Result<[u8; geometry::GEOMETRY_BLOCK_SIZE], ErrorKind> {
        Ok(geometry::encode(&sample_geometry()))
    }
}

fn config(pool: &str, device: &str) -> vdo_instance::Config {
    ConfigBuilder::new(pool, device)
        .logical_block_size(4096)
        .logical_bytes(4096 * 1024)
        .unwrap()
        .build()
}

/// With 3 writes outstanding, suspend disables compression on entry,
/// waits for the three to drain, issues exactly one synchronous flush,
/// and lands in SUSPENDED; resume restores RUNNING.
#[test]
fn suspend_drains_outstanding_writes_and_toggles_compression_once_each_way() {
    let (tx, rx) = completion_channel();
    let engine = Arc::new(HoldingEngine::new(tx));
    let instance = Instance::new(config("suspend-pool", "/dev/suspend-test"), engine.clone(), rx);
    instance.preload().unwrap();
    instance.start().unwrap();
    assert_eq!(instance.state(), LifecycleState::Running);

    for tick in 0..3 {
        let write = Request::new(Operation::Write, 4096, RequestFlags::empty(), tick);
        instance.submit(write);
    }
    assert_eq!(instance.admission().request_limiter().outstanding(), 3);

    let suspend_instance = Arc::clone(&instance);
    let handle = thread::spawn(move || suspend_instance.suspend(false));

    thread::sleep(Duration::from_millis(50));
    assert_eq!(instance.state(), LifecycleState::Running, "suspend must wait for the drain");

    engine.complete_all();
    instance.process_completions_blocking();

    handle.join().unwrap().unwrap();
    assert_eq!(instance.state(), LifecycleState::Suspended);
    assert_eq!(engine.compress_toggled.load(Ordering::SeqCst), 2, "disabled on entry, restored on exit");
    assert_eq!(engine.synchronous_flush_count.load(Ordering::SeqCst), 1);

    instance.resume().unwrap();
    assert_eq!(instance.state(), LifecycleState::Running);
}

fn running_instance_with_mock(pool: &str, device: &str) -> Arc<Instance> {
    let mut mock = MockEngineFacade::new();
    mock.expect_flush_delegated().returning(|| false);
    mock.expect_worker_pool_contains().returning(|| false);
    mock.expect_read_geometry_block().returning(|| Ok(geometry::encode(&sample_geometry())));
    mock.expect_set_compressing().returning(|_| true);
    mock.expect_synchronous_flush().returning(|| Ok(()));
    mock.expect_suspend().returning(|_| Ok(()));
    mock.expect_suspend_dedupe().returning(|_| Ok(()));
    mock.expect_prepare_grow_logical().returning(|_| Ok(()));
    mock.expect_grow_logical().returning(|_| Ok(()));
    let (_tx, rx) = completion_channel();
    let instance = Instance::new(config(pool, device), Arc::new(mock), rx);
    instance.preload().unwrap();
    instance.start().unwrap();
    instance
}

/// Modifying any immutable field is rejected and the configuration
/// snapshot is left untouched.
#[test]
fn modify_rejects_a_changed_immutable_field() {
    let instance = running_instance_with_mock("modify-pool", "/dev/modify-test");
    let before = instance.config_snapshot();

    let mut request = ModifyRequest {
        pool_name: before.pool_name().to_string(),
        parent_device_name: before.parent_device_name().to_string(),
        logical_block_size: before.logical_block_size(),
        cache_size: before.cache_size(),
        block_map_maximum_age: before.block_map_maximum_age(),
        md_raid5_mode_enabled: before.md_raid5_mode_enabled(),
        thread_counts: before.thread_counts(),
        write_policy: before.write_policy(),
    };
    request.logical_block_size = 512;

    let err = instance.modify(&request).unwrap_err();
    assert!(matches!(err, ErrorKind::ParameterMismatch("logical_block_size")));
    assert_eq!(instance.config_snapshot(), before);
}

/// `grow_logical` requires block alignment, and is only valid while
/// SUSPENDED even once a prepare call has already succeeded.
#[test]
fn grow_logical_requires_alignment_and_suspended_state() {
    let instance = running_instance_with_mock("grow-pool", "/dev/grow-test");

    let misaligned = instance.config_snapshot().logical_bytes() + 1;
    instance.prepare_grow_logical(misaligned).unwrap();
    let err = instance.grow_logical(misaligned).unwrap_err();
    assert!(matches!(err, ErrorKind::BadState(_)), "grow is rejected outside SUSPENDED before alignment is even checked");

    let aligned = instance.config_snapshot().logical_bytes() + 4096 * 10;
    let err = instance.grow_logical(aligned).unwrap_err();
    assert!(matches!(err, ErrorKind::BadState(_)));

    instance.suspend(false).unwrap();
    instance.grow_logical(aligned).unwrap();
    assert_eq!(instance.config_snapshot().logical_bytes(), aligned);
}

#[test]
fn ack_queue_disabled_thread_counts_skip_straight_to_cpu_queue_init_phase() {
    let mut mock = MockEngineFacade::new();
    mock.expect_flush_delegated().returning(|| false);
    mock.expect_worker_pool_contains().returning(|| false);
    let (_tx, rx) = completion_channel();
    let counts = ThreadCounts { bio_ack_threads: 0, ..ThreadCounts::default() };
    let config = ConfigBuilder::new("scenario-ack", "/dev/scenario-ack").thread_counts(counts).build();
    let instance = Instance::new(config, Arc::new(mock), rx);
    assert_eq!(instance.state(), LifecycleState::CpuQueueInit);
}
