//! Run orchestration for FeedScout.
//!
//! [`Coordinator::run`] drives one discovery/validation run end to end over
//! injected capabilities (fetch, store, seeds). The [`sources`] module holds
//! the store maintenance and reporting operations exposed by the CLI.

mod coordinator;
mod pool;
pub mod sources;

pub use coordinator::{Coordinator, ProgressReporter, RunAborted, RunStage, SilentProgress};
pub use feedscout_learning::{Convergence, LearningReport};
