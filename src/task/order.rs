// src/task/order.rs

//! Check order for pending tasks.
//!
//! Tasks are refreshed (and their ready jobs submitted) in this order:
//! 1. kind priority (tree merging before tree building before model selection
//!    before alignment, ...),
//! 2. larger problem size first,
//! 3. thread id, then task id, for a deterministic result.
//!
//! The order is a submission hint only: the launcher's core budget and any
//! remote batch system decide when jobs actually start.

use std::cmp::{Ordering, Reverse};

use super::Task;

/// Compare two tasks by check priority.
pub fn check_order(a: &Task, b: &Task) -> Ordering {
    key(a).cmp(&key(b))
}

fn key(task: &Task) -> (u32, Reverse<u64>, &str, &str) {
    (
        task.kind.priority(),
        Reverse(task.size),
        task.thread.as_str(),
        task.id.as_str(),
    )
}

/// Sort task references into check order.
pub fn sort_for_check<'a, I>(tasks: I) -> Vec<&'a Task>
where
    I: IntoIterator<Item = &'a Task>,
{
    let mut sorted: Vec<&Task> = tasks.into_iter().collect();
    sorted.sort_by(|a, b| check_order(a, b));
    sorted
}
