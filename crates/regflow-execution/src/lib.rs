//! Batch execution: many identities, bounded concurrency, whole-flow retry.

pub mod attempt_tracker;
pub mod batch_executor;
pub mod logging;
pub mod summary;

pub use attempt_tracker::AttemptTracker;
pub use batch_executor::{BatchExecutor, FlowRunner};
pub use logging::init_tracing;
pub use summary::BatchSummary;
