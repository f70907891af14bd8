//! The Instance aggregate: admission controller, lifecycle machine, flush
//! pipeline, engine facade, geometry codec, configuration, and the
//! process-wide registry that ties them to one backing device.
//!
//! Built on top of the leaf primitives in [`vdo_core`]; nothing here
//! blocks except through [`vdo_core::Limiter::acquire_blocking`] and
//! [`vdo_core::Limiter::wait_for_idle`], reached only from a thread that
//! is not one of the Engine's own workers.

pub mod admission;
pub mod config;
pub mod engine;
pub mod error;
pub mod flush;
pub mod geometry;
pub mod instance;
pub mod lifecycle;
pub mod registry;
pub mod stats;

pub use admission::{AdmissionController, DispatchOutcome};
pub use config::{Config, ConfigBuilder, ModifyRequest, ThreadCounts, WritePolicy};
pub use engine::{completion_channel, Completion, CompletionReceiver, CompletionSender, EngineFacade, PermitBundle};
pub use error::{ErrorKind, HostCode, VdoResult};
pub use flush::FlushPipeline;
pub use geometry::{GeometryState, IndexConfig, RegionEntry};
pub use instance::Instance;
pub use lifecycle::{LifecycleEvent, LifecycleMachine, LifecycleState};
pub use stats::Stats;
