//! Background generation: the worker pipeline and the supervisor that runs it detached.

pub mod supervisor;
pub mod worker;

pub use supervisor::{InFlightSlot, JobHandle, JobSupervisor, SupervisorStats};
pub use worker::GenerationWorker;
