//! Pipeline scheduling and run coordination for Gantry CI.

pub mod coordinator;
pub mod dag;
pub mod triggers;

pub use coordinator::RunCoordinator;
pub use dag::{DagBuilder, DagError, ExecutionPlan, JobDag, JobNode};
pub use triggers::{TriggerEvent, TriggerMatcher};
