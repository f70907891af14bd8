//! Walks blocking backpressure and reentrant deferral against a toy
//! in-memory Engine that holds submitted requests until the demo
//! explicitly completes them.
//!
//! Run with `cargo run -p vdo --example admission_backpressure`.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::info;
use vdo::{
    completion_channel, AdmissionController, Completion, CompletionSender, DispatchOutcome, EngineFacade,
    ErrorKind, LifecycleEvent, LifecycleMachine, Operation, PermitBundle, Request, RequestFlags,
};

/// Holds every request handed to it until [`DemoEngine::complete_oldest`] is
/// called; `submit` never completes work on its own. `in_worker_thread` lets
/// the demo flip the reentrancy test on and off without a real worker pool.
struct DemoEngine {
    held: Mutex<Vec<(u64, PermitBundle)>>,
    next_id: std::sync::atomic::AtomicU64,
    completions: CompletionSender,
    in_worker_thread: std::sync::atomic::AtomicBool,
}

impl DemoEngine {
    fn new(completions: CompletionSender) -> Self {
        DemoEngine {
            held: Mutex::new(Vec::new()),
            next_id: std::sync::atomic::AtomicU64::new(0),
            completions,
            in_worker_thread: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn complete_oldest(&self) {
        let (id, _permits) = self.held.lock().unwrap().remove(0);
        self.completions.send(Completion { request_id: id, count: 1, discard_permits: 0 }).unwrap();
    }
}

impl EngineFacade for DemoEngine {
    fn submit(&self, _request: Request, permits: PermitBundle) -> Result<(), ErrorKind> {
        let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.held.lock().unwrap().push((id, permits));
        Ok(())
    }
    fn submit_flush(&self, _request: Request) -> Result<(), ErrorKind> {
        Ok(())
    }
    fn set_compressing(&self, _enabled: bool) -> bool {
        true
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
        self.in_worker_thread.load(std::sync::atomic::Ordering::SeqCst)
    }
    fn flush_delegated(&self) -> bool {
        false
    }
    fn synchronous_flush(&self) -> Result<(), ErrorKind> {
        Ok(())
    }
    fn read_geometry_block(&self) -> Result<[u8; vdo::GEOMETRY_BLOCK_SIZE], ErrorKind> {
        unreachable!("this demo never calls Instance::preload")
    }
}

fn running_lifecycle() -> Arc<LifecycleMachine> {
    let m = LifecycleMachine::new();
    m.fire(LifecycleEvent::Create).unwrap();
    m.fire(LifecycleEvent::AllocBufferPools).unwrap();
    m.fire(LifecycleEvent::StartKvdoThreads).unwrap();
    m.fire(LifecycleEvent::StartBioThreads).unwrap();
    m.fire(LifecycleEvent::StartAckThreads { ack_queue_enabled: false }).unwrap();
    m.fire(LifecycleEvent::Preload).unwrap();
    m.fire(LifecycleEvent::Start).unwrap();
    Arc::new(m)
}

fn write(tick: u64) -> Request {
    Request::new(Operation::Write, 4096, RequestFlags::empty(), tick)
}

fn main() {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let (tx, rx) = completion_channel();
    let engine = Arc::new(DemoEngine::new(tx));
    let lifecycle = running_lifecycle();
    let flush = Arc::new(vdo::FlushPipeline::new(engine.clone()));
    let controller = Arc::new(AdmissionController::new(4, engine.clone(), lifecycle, flush));

    info!("blocking backpressure, limit=4");
    for tick in 0..4 {
        let outcome = controller.submit(write(tick));
        assert!(matches!(outcome, DispatchOutcome::Submitted));
    }
    info!(outstanding = controller.request_limiter().outstanding(), "four writes admitted, none completed yet");

    let blocked_controller = Arc::clone(&controller);
    let unblocked = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let unblocked2 = Arc::clone(&unblocked);
    let handle = thread::spawn(move || {
        blocked_controller.submit(write(4));
        unblocked2.store(true, std::sync::atomic::Ordering::SeqCst);
    });

    thread::sleep(Duration::from_millis(50));
    assert!(!unblocked.load(std::sync::atomic::Ordering::SeqCst));
    info!("fifth submit is parked as expected");

    engine.complete_oldest();
    controller.on_completion(rx.recv().unwrap());
    handle.join().unwrap();
    assert!(unblocked.load(std::sync::atomic::Ordering::SeqCst));
    info!("fifth submit unblocked once a permit was released");

    info!("reentrancy deferral");
    assert_eq!(controller.request_limiter().outstanding(), 4, "limiter is exhausted again after the 5th admit");
    engine.in_worker_thread.store(true, std::sync::atomic::Ordering::SeqCst);
    let outcome = controller.submit(write(5));
    assert!(matches!(outcome, DispatchOutcome::Submitted));
    info!(
        deadlock_queue_len = controller.deadlock_queue_len(),
        "submit from an engine worker thread deferred instead of blocking"
    );
}
