// src/policy/mod.rs

//! Workflow policy: decides which tasks exist.
//!
//! The scheduler never creates tasks itself. It asks the policy for the seed
//! task of every thread, and each time a task is done it hands the task back
//! to the policy, which returns the follow-on tasks (possibly none).
//!
//! - [`StaticPolicy`] builds tasks from the `[task.*]` templates of the run
//!   configuration.
//! - [`template`] holds the placeholder expansion used for commands and paths.

pub mod static_policy;
pub mod template;

use crate::context::RunContext;
use crate::errors::Result;
use crate::task::Task;

pub use static_policy::StaticPolicy;

pub trait WorkflowPolicy: Send {
    /// Initial tasks, normally one root task per thread.
    fn seed(&mut self, ctx: &mut RunContext) -> Result<Vec<Task>>;

    /// Follow-on tasks for a task that just finished. Called exactly once per
    /// finished task.
    fn process_task(&mut self, ctx: &mut RunContext, task: &Task, target: &str)
    -> Result<Vec<Task>>;
}
