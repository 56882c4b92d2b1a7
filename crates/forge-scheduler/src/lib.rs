//! Forge scheduler
//!
//! Cooperative, per-resource serialization of asset pipelines.
//!
//! - Operations on the same resource run strictly one after another, FIFO.
//! - Operations on different resources run independently.
//! - An operation may suspend on another resource with
//!   [`TaskContext::wait_for`]; it resumes once that resource drains.
//! - Waits that would deadlock are refused with
//!   [`SchedulerError::DependencyCycle`].
//!
//! # Example
//!
//! ```rust,ignore
//! let scheduler = Scheduler::<String>::new();
//! let handle = scheduler.enqueue("scene".to_string(), |ctx| async move {
//!     ctx.wait_for(&"prefab".to_string()).await?;
//!     Ok(())
//! });
//! handle.join().await?;
//! ```

mod error;
mod graph;
mod scheduler;
mod state;

pub use error::SchedulerError;
pub use scheduler::{Resource, Scheduler, TaskContext, TaskHandle, TaskId};
pub use state::{allowed_transitions, validate_transition, TaskState};
