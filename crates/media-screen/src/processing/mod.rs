//! Job orchestration: engine loading, job state, the staged pipeline,
//! expiry sweeps and admission

mod dispatcher;
mod engine_loader;
mod janitor;
mod job_store;
mod pipeline;

pub use dispatcher::Dispatcher;
pub use engine_loader::{EngineLoader, EngineState};
pub use janitor::Janitor;
pub use job_store::JobStore;
pub use pipeline::{scan_segments, Deadline, JobInput, ProcessingPipeline};
