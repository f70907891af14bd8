//! Walks an `Instance` through its full lifecycle against a toy Engine that
//! completes every submission immediately: construction, geometry preload,
//! start, a data write, an owned flush, suspend (with the compression
//! toggle the suspend contract requires), resume, stop, and teardown.
//!
//! Run with `cargo run -p vdo --example lifecycle_suspend_resume`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;
use vdo::{
    completion_channel, create_instance, encode_geometry, ConfigBuilder, Completion, CompletionSender,
    DispatchOutcome, EngineFacade, ErrorKind, GeometryState, IndexConfig, LifecycleState, Operation, PermitBundle,
    RegionEntry, Request, RequestFlags, GEOMETRY_BLOCK_SIZE,
};

struct DemoEngine {
    completions: CompletionSender,
    compressing: AtomicBool,
}

impl DemoEngine {
    fn new(completions: CompletionSender) -> Self {
        DemoEngine { completions, compressing: AtomicBool::new(true) }
    }
}

impl EngineFacade for DemoEngine {
    fn submit(&self, _request: Request, permits: PermitBundle) -> Result<(), ErrorKind> {
        drop(permits);
        self.completions.send(Completion { request_id: 0, count: 1, discard_permits: 0 }).unwrap();
        Ok(())
    }
    fn submit_flush(&self, _request: Request) -> Result<(), ErrorKind> {
        Ok(())
    }
    fn set_compressing(&self, enabled: bool) -> bool {
        self.compressing.swap(enabled, Ordering::SeqCst)
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
        Ok(())
    }
    fn read_geometry_block(&self) -> Result<[u8; GEOMETRY_BLOCK_SIZE], ErrorKind> {
        Ok(encode_geometry(&GeometryState {
            release_version: 1,
            nonce: 0x1234_5678_9abc_def0,
            uuid: [7; 16],
            region_index: RegionEntry { id: 0, offset_blocks: 1 },
            region_data: RegionEntry { id: 1, offset_blocks: 64 },
            index_config: IndexConfig { mem_gb: 1, checkpoint_frequency: 1000, sparse: false },
        }))
    }
}

fn main() {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let (tx, rx) = completion_channel();
    let engine: Arc<dyn EngineFacade> = Arc::new(DemoEngine::new(tx));
    let config = ConfigBuilder::new("demo-pool", "/dev/demo0").build();
    let instance = create_instance(config, engine, rx).expect("no other instance on /dev/demo0");
    info!(state = ?instance.state(), "constructed through the init prefix");

    instance.preload().unwrap();
    instance.start().unwrap();
    assert_eq!(instance.state(), LifecycleState::Running);
    info!("RUNNING");

    let write = Request::new(Operation::Write, 4096, RequestFlags::empty(), 1);
    let outcome = instance.submit(write);
    assert!(matches!(outcome, DispatchOutcome::Submitted));
    instance.process_completions_blocking();

    let preflush = Request::new(Operation::Flush, 0, RequestFlags::empty(), 2);
    let outcome = instance.submit(preflush);
    assert!(matches!(outcome, DispatchOutcome::Submitted));
    info!("write acknowledged, then a flush submitted through the owned flush pipeline");

    instance.suspend(false).unwrap();
    assert_eq!(instance.state(), LifecycleState::Suspended);
    info!("SUSPENDED (compression was disabled across the idle wait, then restored)");

    instance.resume().unwrap();
    assert_eq!(instance.state(), LifecycleState::Running);
    info!("RUNNING again after resume");

    instance.stop().unwrap();
    assert_eq!(instance.state(), LifecycleState::Stopped);
    instance.destroy();
    info!("STOPPED and torn down");
}
