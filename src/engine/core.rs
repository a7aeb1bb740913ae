// src/engine/core.rs

//! Pure scheduling core.
//!
//! [`SchedulerCore`] owns the pending task set and performs one scheduling
//! cycle at a time: job reports go in through [`SchedulerCore::apply_report`],
//! and [`SchedulerCore::cycle`] walks the pending tasks in check order and
//! returns a [`CycleStep`] describing what the async shell should do next
//! (submit jobs, finalize threads).
//!
//! There are no channels, no Tokio types and no process handling in here.
//! The only IO is whatever the task finishers and the workflow policy do.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::context::{RunContext, ThreadError};
use crate::errors::{Result, SchedError};
use crate::job::{InputArtifact, JobId, JobReport, JobStatus, JobSubmission};
use crate::policy::WorkflowPolicy;
use crate::task::{Task, TaskId, TaskStatus, ThreadId, sort_for_check};

/// A job the core moved to `Queued`, with what the shell needs to submit it.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub submission: JobSubmission,
    pub thread: ThreadId,
    pub task_id: TaskId,
    pub template: String,
    pub job_name: String,
    pub workdir: PathBuf,
    pub inputs: Vec<InputArtifact>,
}

/// Result of one scheduling cycle.
#[derive(Debug, Default)]
pub struct CycleStep {
    pub queued: Vec<QueuedJob>,
    /// Tasks that completed successfully this cycle.
    pub done_tasks: Vec<TaskId>,
    /// Errors recorded this cycle.
    pub new_errors: Vec<(ThreadId, ThreadError)>,
    /// Threads left without pending tasks; each is reported exactly once.
    pub finished_threads: Vec<ThreadId>,
    pub keep_running: bool,
}

#[derive(Debug)]
pub struct SchedulerCore {
    pending: BTreeMap<TaskId, Task>,
    job_index: HashMap<JobId, TaskId>,
    submitted: HashSet<JobId>,
    total_cores: u32,
}

impl SchedulerCore {
    pub fn new(total_cores: u32) -> Self {
        Self {
            pending: BTreeMap::new(),
            job_index: HashMap::new(),
            submitted: HashSet::new(),
            total_cores,
        }
    }

    pub fn add_tasks(&mut self, tasks: impl IntoIterator<Item = Task>) {
        for task in tasks {
            if self.pending.contains_key(&task.id) {
                warn!(task = %task.id, "task already pending; ignoring duplicate");
                continue;
            }
            debug!(task = %task, jobs = task.jobs.len(), "task registered");
            for id in task.job_ids() {
                self.job_index.insert(id.clone(), task.id.clone());
            }
            self.pending.insert(task.id.clone(), task);
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_tasks(&self) -> impl Iterator<Item = &Task> {
        self.pending.values()
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.pending.get(id)
    }

    pub fn was_submitted(&self, job_id: &str) -> bool {
        self.submitted.contains(job_id)
    }

    /// Pending task ids in the order the next cycle will visit them.
    pub fn check_order(&self) -> Vec<TaskId> {
        sort_for_check(self.pending.values())
            .into_iter()
            .map(|t| t.id.clone())
            .collect()
    }

    /// Apply a status report from the launcher. Returns whether the job
    /// changed state.
    pub fn apply_report(&mut self, report: JobReport) -> bool {
        let Some(task_id) = self.job_index.get(&report.job_id) else {
            debug!(job = %report.job_id, status = %report.status, "report for unknown job");
            return false;
        };
        let Some(job) = self
            .pending
            .get_mut(task_id)
            .and_then(|t| t.job_mut(&report.job_id))
        else {
            return false;
        };

        if report.remote_id.is_some() {
            job.remote_id = report.remote_id;
        }
        if report.message.is_some() {
            job.message = report.message;
        }
        let changed = job.advance(report.status);
        if changed {
            debug!(job = %job.id, status = %job.status, "job status updated");
        }
        changed
    }

    /// One scheduling cycle.
    ///
    /// Every pending task is visited in check order. Failed tasks are
    /// recorded against their thread and dropped, completed ones are
    /// finished and handed to the policy, and the remaining ones get their
    /// ready jobs queued. Fatal errors (a job asking for more cores than the
    /// run has, fatal policy errors) abort the cycle.
    pub fn cycle(&mut self, ctx: &mut RunContext, policy: &mut dyn WorkflowPolicy) -> Result<CycleStep> {
        let mut step = CycleStep::default();
        let mut spawned: Vec<Task> = Vec::new();

        for task_id in self.check_order() {
            let Some(status) = self.pending.get(&task_id).map(Task::status) else {
                continue;
            };
            match status {
                TaskStatus::Error => {
                    let Some(task) = self.remove_task(&task_id) else {
                        continue;
                    };
                    let err = failure_of(&task);
                    error!(task = %task, error = %err.message, "task failed");
                    record(ctx, &mut step, &task.thread, err);
                }
                TaskStatus::Done => {
                    let Some(task) = self.remove_task(&task_id) else {
                        continue;
                    };
                    step.done_tasks.push(task.id.clone());
                    spawned.extend(complete(ctx, policy, &task, &mut step)?);
                }
                TaskStatus::Pending | TaskStatus::Running => {
                    self.queue_ready(&task_id, &mut step)?;
                }
            }
        }

        self.add_tasks(spawned);
        step.finished_threads = self.collect_finished(ctx);
        step.keep_running = self.has_pending();
        Ok(step)
    }

    fn remove_task(&mut self, task_id: &str) -> Option<Task> {
        let task = self.pending.remove(task_id)?;
        for id in task.job_ids() {
            self.job_index.remove(id);
        }
        Some(task)
    }

    fn queue_ready(&mut self, task_id: &str, step: &mut CycleStep) -> Result<()> {
        let Some(task) = self.pending.get_mut(task_id) else {
            return Ok(());
        };
        for idx in task.ready_jobs() {
            let job = &mut task.jobs[idx];
            if job.cores > self.total_cores {
                return Err(SchedError::InsufficientCores {
                    job: job.id.clone(),
                    requested: job.cores,
                    total: self.total_cores,
                });
            }
            job.advance(JobStatus::Queued);
            if !self.submitted.insert(job.id.clone()) {
                warn!(job = %job.id, "job already submitted; not queueing it again");
                continue;
            }
            step.queued.push(QueuedJob {
                submission: job.submission(),
                thread: task.thread.clone(),
                task_id: task.id.clone(),
                template: task.template.clone(),
                job_name: job.name.clone(),
                workdir: job.workdir.clone(),
                inputs: job.inputs.clone(),
            });
        }
        Ok(())
    }

    fn collect_finished(&self, ctx: &mut RunContext) -> Vec<ThreadId> {
        let busy: BTreeSet<&str> = self.pending.values().map(|t| t.thread.as_str()).collect();
        let done: Vec<ThreadId> = ctx
            .threads()
            .filter(|t| !t.finalized && !busy.contains(t.id.as_str()))
            .map(|t| t.id.clone())
            .collect();
        for id in &done {
            if let Some(thread) = ctx.thread_mut(id) {
                thread.finalized = true;
            }
        }
        done
    }
}

/// Finish a completed task, record its artifacts and ask the policy for
/// follow-on work.
fn complete(
    ctx: &mut RunContext,
    policy: &mut dyn WorkflowPolicy,
    task: &Task,
    step: &mut CycleStep,
) -> Result<Vec<Task>> {
    let artifacts = match task.kind.finish(task) {
        Ok(artifacts) => artifacts,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            error!(task = %task, error = %e, "task output rejected");
            let err = ThreadError {
                task: Some(task.id.clone()),
                job: None,
                location: Some(task.dir.display().to_string()),
                message: e.to_string(),
            };
            record(ctx, step, &task.thread, err);
            return Ok(Vec::new());
        }
    };

    ctx.record_artifacts(&task.thread, &artifacts);
    if let Some(thread) = ctx.thread_mut(&task.thread) {
        thread.finished_tasks += 1;
    }
    info!(task = %task, artifacts = artifacts.len(), "task done");

    match policy.process_task(ctx, task, &task.target) {
        Ok(next) => {
            if !next.is_empty() {
                debug!(task = %task, spawned = next.len(), "policy spawned follow-on tasks");
            }
            Ok(next)
        }
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            error!(task = %task, error = %e, "policy failed to process task");
            let err = ThreadError {
                task: Some(task.id.clone()),
                job: None,
                location: Some(task.dir.display().to_string()),
                message: e.to_string(),
            };
            record(ctx, step, &task.thread, err);
            Ok(Vec::new())
        }
    }
}

fn failure_of(task: &Task) -> ThreadError {
    match task.first_failure() {
        Some(job) => ThreadError {
            task: Some(task.id.clone()),
            job: Some(job.id.clone()),
            location: Some(job.workdir.display().to_string()),
            message: job
                .message
                .clone()
                .unwrap_or_else(|| format!("job {} ended with status {}", job.name, job.status)),
        },
        None => ThreadError {
            task: Some(task.id.clone()),
            job: None,
            location: Some(task.dir.display().to_string()),
            message: "task failed".to_string(),
        },
    }
}

fn record(ctx: &mut RunContext, step: &mut CycleStep, thread: &str, err: ThreadError) {
    step.new_errors.push((thread.to_string(), err.clone()));
    ctx.record_error(thread, err);
}
