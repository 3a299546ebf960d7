//! Dispatch: decision making, job lifecycle, queueing, and the dispatcher
//! that ties ingestion to execution.

pub mod decision;
pub mod dispatcher;
pub mod job;
pub mod queue;

pub use decision::{DispatchDecision, ExecutionMode, ExecutorKind, decide};
pub use dispatcher::Dispatcher;
pub use job::{Job, JobStatus};
pub use queue::JobQueue;
