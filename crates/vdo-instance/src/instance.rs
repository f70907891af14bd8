//! instance.rs — the Instance aggregate
//!
//! Ties together the configuration snapshot, the lifecycle machine, the
//! admission controller, and the flush pipeline around one Engine. The
//! Engine never holds a pointer back to its Instance: completions arrive
//! as messages on a channel the Instance drains, so the usual
//! Instance-owns-Engine reference never needs a cyclic partner.

use std::sync::Arc;

use parking_lot::Mutex;
use vdo_core::Request;

use crate::admission::{AdmissionController, DispatchOutcome, DEFAULT_REQUEST_LIMIT};
use crate::config::{Config, ModifyRequest};
use crate::engine::{CompletionReceiver, EngineFacade};
use crate::error::ErrorKind;
use crate::flush::FlushPipeline;
use crate::geometry::{self, GeometryState};
use crate::lifecycle::{LifecycleEvent, LifecycleMachine, LifecycleState, PhaseResources};
use crate::registry;

pub struct Instance {
    config: Mutex<Config>,
    lifecycle: Arc<LifecycleMachine>,
    admission: AdmissionController,
    flush: Arc<FlushPipeline>,
    engine: Arc<dyn EngineFacade>,
    completion_receiver: CompletionReceiver,
    geometry: Mutex<Option<GeometryState>>,
}

impl Instance {
    /// Walk the init prefix (`UNINITIALIZED` through `CPU_QUEUE_INIT`) and
    /// return the constructed Instance. `preload`/`start` remain separate,
    /// host-driven administrative calls.
    pub fn new(config: Config, engine: Arc<dyn EngineFacade>, completion_receiver: CompletionReceiver) -> Arc<Self> {
        let lifecycle = Arc::new(LifecycleMachine::new());
        let counts = config.thread_counts();

        lifecycle.fire(LifecycleEvent::Create).expect("UNINITIALIZED -> SIMPLE_INIT is always valid");

        lifecycle
            .fire(LifecycleEvent::AllocBufferPools)
            .expect("SIMPLE_INIT -> BUFFER_POOLS_INIT is always valid");
        lifecycle.set_phase_resources(PhaseResources::BufferPools { pool_count: 1 });

        lifecycle
            .fire(LifecycleEvent::StartKvdoThreads)
            .expect("BUFFER_POOLS_INIT -> REQUEST_QUEUE_INIT is always valid");
        lifecycle.set_phase_resources(PhaseResources::RequestQueues { zone_count: counts.logical_zones });

        lifecycle
            .fire(LifecycleEvent::StartBioThreads)
            .expect("REQUEST_QUEUE_INIT -> BIO_DATA_INIT is always valid");
        lifecycle.set_phase_resources(PhaseResources::BioQueues { thread_count: counts.bio_threads });

        let ack_queue_enabled = counts.bio_ack_threads > 0;
        lifecycle
            .fire(LifecycleEvent::StartAckThreads { ack_queue_enabled })
            .expect("BIO_DATA_INIT -> {BIO_ACK_QUEUE_INIT, CPU_QUEUE_INIT} is always valid");
        if ack_queue_enabled {
            lifecycle.set_phase_resources(PhaseResources::BioAckQueue { thread_count: counts.bio_ack_threads });
            lifecycle
                .fire(LifecycleEvent::StartCpuThreads)
                .expect("BIO_ACK_QUEUE_INIT -> CPU_QUEUE_INIT is always valid");
        }
        lifecycle.set_phase_resources(PhaseResources::CpuQueues { thread_count: counts.cpu_threads });

        let flush = Arc::new(FlushPipeline::new(Arc::clone(&engine)));
        let admission = AdmissionController::new(
            DEFAULT_REQUEST_LIMIT,
            Arc::clone(&engine),
            Arc::clone(&lifecycle),
            Arc::clone(&flush),
        );

        Arc::new(Instance {
            config: Mutex::new(config),
            lifecycle,
            admission,
            flush,
            engine,
            completion_receiver,
            geometry: Mutex::new(None),
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn flush_pipeline(&self) -> &FlushPipeline {
        &self.flush
    }

    pub fn geometry(&self) -> Option<GeometryState> {
        *self.geometry.lock()
    }

    pub fn submit(&self, request: Request) -> DispatchOutcome {
        self.admission.submit(request)
    }

    /// Drain every completion currently queued, releasing and relaunching
    /// permits as appropriate. Never blocks.
    pub fn process_completions(&self) {
        while let Ok(completion) = self.completion_receiver.try_recv() {
            self.admission.on_completion(completion);
        }
    }

    /// Block for at least one completion, then drain the rest that have
    /// since queued up.
    pub fn process_completions_blocking(&self) {
        if let Ok(completion) = self.completion_receiver.recv() {
            self.admission.on_completion(completion);
            self.process_completions();
        }
    }

    /// Read and validate the geometry block, then advance to `STARTING`.
    pub fn preload(&self) -> Result<(), ErrorKind> {
        let block = self.engine.read_geometry_block()?;
        let decoded = geometry::decode(&block)?;
        *self.geometry.lock() = Some(decoded);
        self.lifecycle.fire(LifecycleEvent::Preload)?;
        Ok(())
    }

    pub fn start(&self) -> Result<(), ErrorKind> {
        self.lifecycle.fire(LifecycleEvent::Start)?;
        Ok(())
    }

    /// The suspend ordering contract: disable compression across the idle
    /// wait, synchronous-flush, suspend the Engine, suspend dedupe, then
    /// commit the lifecycle transition.
    pub fn suspend(&self, no_flush: bool) -> Result<(), ErrorKind> {
        if self.lifecycle.state() != LifecycleState::Running {
            return Err(ErrorKind::BadState("suspend is only valid from RUNNING".into()));
        }

        let was_compressing = self.engine.set_compressing(false);
        self.admission.request_limiter().wait_for_idle();
        if was_compressing {
            self.engine.set_compressing(true);
        }

        self.flush.synchronous_flush()?;
        self.engine.suspend(no_flush)?;
        self.engine.suspend_dedupe(!no_flush)?;

        self.lifecycle.fire(LifecycleEvent::Suspend)?;
        Ok(())
    }

    pub fn resume(&self) -> Result<(), ErrorKind> {
        if self.lifecycle.state() != LifecycleState::Suspended {
            return Err(ErrorKind::BadState("resume is only valid from SUSPENDED".into()));
        }
        self.engine.resume_dedupe()?;
        self.engine.resume()?;
        self.lifecycle.fire(LifecycleEvent::Resume)?;
        Ok(())
    }

    /// `stop` from `RUNNING` always goes through a forced suspend first,
    /// so the only path that ever reaches `STOPPING` is the one that
    /// already drained and flushed.
    pub fn stop(&self) -> Result<(), ErrorKind> {
        match self.lifecycle.state() {
            LifecycleState::Running => self.suspend(false)?,
            LifecycleState::Suspended => {}
            _ => return Err(ErrorKind::BadState("stop is only valid from RUNNING or SUSPENDED".into())),
        }
        self.lifecycle.fire(LifecycleEvent::Stop)?;
        self.engine.stop()?;
        self.lifecycle.fire(LifecycleEvent::Final)?;
        Ok(())
    }

    /// Tear down from `STOPPED`, walking the init prefix back to
    /// `UNINITIALIZED` and removing this Instance from the registry.
    /// A no-op outside `STOPPED`.
    pub fn destroy(&self) {
        if self.lifecycle.state() != LifecycleState::Stopped {
            return;
        }
        self.engine.destroy();
        self.lifecycle.begin_teardown();
        while self.lifecycle.teardown_step().is_some() {}

        let cfg = self.config.lock();
        registry::remove(cfg.pool_name(), cfg.parent_device_name());
    }

    pub fn modify(&self, request: &ModifyRequest) -> Result<(), ErrorKind> {
        self.config.lock().apply_modify(request)
    }

    pub fn prepare_grow_logical(&self, logical_bytes: u64) -> Result<(), ErrorKind> {
        self.engine.prepare_grow_logical(logical_bytes)
    }

    /// Grow is only valid while SUSPENDED and only after a matching
    /// `prepare_grow_logical`.
    pub fn grow_logical(&self, logical_bytes: u64) -> Result<(), ErrorKind> {
        if self.lifecycle.state() != LifecycleState::Suspended {
            return Err(ErrorKind::BadState("grow_logical is only valid while SUSPENDED".into()));
        }
        self.config.lock().set_logical_bytes(logical_bytes)?;
        self.engine.grow_logical(logical_bytes)
    }

    pub fn prepare_grow_physical(&self, physical_blocks: u64) -> Result<(), ErrorKind> {
        self.engine.prepare_grow_physical(physical_blocks)
    }

    pub fn grow_physical(&self, physical_blocks: u64) -> Result<(), ErrorKind> {
        if self.lifecycle.state() != LifecycleState::Suspended {
            return Err(ErrorKind::BadState("grow_physical is only valid while SUSPENDED".into()));
        }
        self.config.lock().set_physical_blocks(physical_blocks)?;
        self.engine.grow_physical(physical_blocks)
    }

    pub fn config_snapshot(&self) -> Config {
        self.config.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::engine::{completion_channel, Completion, MockEngineFacade};
    use vdo_core::{Operation, RequestFlags};

    fn config() -> Config {
        ConfigBuilder::new("instance-pool", "/dev/instancetest").build()
    }

    fn basic_mock() -> MockEngineFacade {
        let mut mock = MockEngineFacade::new();
        mock.expect_flush_delegated().returning(|| false);
        mock.expect_worker_pool_contains().returning(|| false);
        mock
    }

    #[test]
    fn construction_reaches_cpu_queue_init_with_ack_queue_enabled() {
        let (_tx, rx) = completion_channel();
        let instance = Instance::new(config(), Arc::new(basic_mock()), rx);
        assert_eq!(instance.state(), LifecycleState::CpuQueueInit);
    }

    #[test]
    fn preload_then_start_reaches_running() {
        let mut mock = basic_mock();
        mock.expect_read_geometry_block()
            .returning(|| Ok(geometry::encode(&sample_geometry())));
        let (_tx, rx) = completion_channel();
        let instance = Instance::new(config(), Arc::new(mock), rx);
        instance.preload().unwrap();
        assert_eq!(instance.state(), LifecycleState::Starting);
        instance.start().unwrap();
        assert_eq!(instance.state(), LifecycleState::Running);
        assert_eq!(instance.geometry().unwrap().nonce, sample_geometry().nonce);
    }

    fn sample_geometry() -> GeometryState {
        GeometryState {
            release_version: 1,
            nonce: 42,
            uuid: [9; 16],
            region_index: crate::geometry::RegionEntry { id: 0, offset_blocks: 1 },
            region_data: crate::geometry::RegionEntry { id: 1, offset_blocks: 10 },
            index_config: crate::geometry::IndexConfig {
                mem_gb: 1,
                checkpoint_frequency: 100,
                sparse: false,
            },
        }
    }

    #[test]
    fn suspend_disables_then_restores_compression_and_resume_round_trips() {
        let mut mock = basic_mock();
        mock.expect_read_geometry_block()
            .returning(|| Ok(geometry::encode(&sample_geometry())));
        mock.expect_set_compressing().times(2).returning(|_| true);
        mock.expect_synchronous_flush().returning(|| Ok(()));
        mock.expect_suspend().returning(|_| Ok(()));
        mock.expect_suspend_dedupe().returning(|_| Ok(()));
        mock.expect_resume_dedupe().returning(|| Ok(()));
        mock.expect_resume().returning(|| Ok(()));

        let (_tx, rx) = completion_channel();
        let instance = Instance::new(config(), Arc::new(mock), rx);
        instance.preload().unwrap();
        instance.start().unwrap();

        instance.suspend(false).unwrap();
        assert_eq!(instance.state(), LifecycleState::Suspended);

        instance.resume().unwrap();
        assert_eq!(instance.state(), LifecycleState::Running);
    }

    #[test]
    fn process_completions_drains_relaunches_deferred_requests() {
        let mut mock = basic_mock();
        mock.expect_read_geometry_block()
            .returning(|| Ok(geometry::encode(&sample_geometry())));
        mock.expect_submit().returning(|_, _| Ok(()));

        let (tx, rx) = completion_channel();
        let instance = Instance::new(config(), Arc::new(mock), rx);
        instance.preload().unwrap();
        instance.start().unwrap();

        let permit = instance.admission().request_limiter().acquire_poll();
        assert!(permit.is_some());

        let write = Request::new(Operation::Write, 4096, RequestFlags::empty(), 1);
        instance.submit(write);
        assert_eq!(instance.admission().request_limiter().outstanding(), 2);

        tx.send(Completion { request_id: 1, count: 1, discard_permits: 0 }).unwrap();
        instance.process_completions();
        assert_eq!(instance.admission().request_limiter().outstanding(), 1);
    }
}
