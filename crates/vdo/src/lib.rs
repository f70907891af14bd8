//! `vdo` — the public facade over the admission front-end.
//!
//! Wires [`vdo_core`]'s leaf primitives and [`vdo_instance`]'s `Instance`
//! aggregate together behind one entry point: [`create_instance`]
//! constructs an `Instance` and registers it in the process-wide registry
//! in one step, so a caller can never end up with a live `Instance` that
//! the registry doesn't know about.
//!
//! Everything else is a re-export; this crate adds no behavior of its own
//! beyond that one invariant.

pub use vdo_core::{classify, ClassifyError, DeadlockQueue, Limiter, Operation, Permit, Request, RequestFlags, Route};

pub use vdo_instance::{
    completion_channel, AdmissionController, Completion, CompletionReceiver, CompletionSender, Config,
    ConfigBuilder, DispatchOutcome, EngineFacade, ErrorKind, FlushPipeline, GeometryState, HostCode, IndexConfig,
    Instance, LifecycleEvent, LifecycleMachine, LifecycleState, ModifyRequest, PermitBundle, RegionEntry, Stats,
    ThreadCounts, VdoResult, WritePolicy,
};
pub use vdo_instance::geometry::{decode as decode_geometry, encode as encode_geometry, GEOMETRY_BLOCK_SIZE};

use std::sync::Arc;

/// Construct an `Instance` and register it under its pool identity in one
/// step.
///
/// Fails with [`ErrorKind::ComponentBusy`] if another live `Instance`
/// already occupies the same `(pool_name, parent_device_name)` pair,
/// mirroring the "insert-or-error" contract of the registry design note;
/// on that path the freshly built `Instance` is simply dropped; it never
/// touched the registry or the Engine's lifecycle hooks beyond its own
/// construction.
pub fn create_instance(
    config: Config,
    engine: Arc<dyn EngineFacade>,
    completions: CompletionReceiver,
) -> VdoResult<Arc<Instance>> {
    let pool_name = config.pool_name().to_string();
    let parent_device_name = config.parent_device_name().to_string();
    let instance = Instance::new(config, engine, completions);
    vdo_instance::registry::insert(&pool_name, &parent_device_name, &instance)?;
    Ok(instance)
}

/// Look up a live `Instance` previously registered by [`create_instance`].
pub fn lookup_instance(pool_name: &str, parent_device_name: &str) -> Option<Arc<Instance>> {
    vdo_instance::registry::lookup(pool_name, parent_device_name)
}
