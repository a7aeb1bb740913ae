// src/engine/report.rs

//! Human-readable progress and error lines.

use std::collections::BTreeMap;

use crate::context::RunContext;
use crate::engine::core::SchedulerCore;
use crate::task::Task;

/// One line per thread with pending work, e.g.
/// `Thread t1: pending tasks: 2 of sizes: 120, 40`.
pub fn thread_summary(core: &SchedulerCore, ctx: &RunContext) -> Vec<String> {
    let mut by_thread: BTreeMap<&str, Vec<&Task>> = BTreeMap::new();
    for task in core.pending_tasks() {
        by_thread.entry(task.thread.as_str()).or_default().push(task);
    }
    by_thread
        .into_iter()
        .map(|(thread, tasks)| {
            let sizes = tasks
                .iter()
                .map(|t| t.size.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "Thread {}: pending tasks: {} of sizes: {}",
                ctx.thread_name(thread),
                tasks.len(),
                sizes
            )
        })
        .collect()
}

/// One line per pending task with its job states.
pub fn task_lines(core: &SchedulerCore) -> Vec<String> {
    core.pending_tasks()
        .map(|t| format!("{} ({}) jobs: {}", t, t.status(), t.job_summary()))
        .collect()
}

/// Every recorded error, grouped by thread.
pub fn error_lines(ctx: &RunContext) -> Vec<String> {
    let mut lines = Vec::new();
    for (thread, errors) in ctx.errors() {
        lines.push(format!(
            "Thread {} has {} error(s):",
            ctx.thread_name(&thread),
            errors.len()
        ));
        for err in errors {
            match &err.location {
                Some(loc) => lines.push(format!("  {err} (in {loc})")),
                None => lines.push(format!("  {err}")),
            }
        }
    }
    lines
}
