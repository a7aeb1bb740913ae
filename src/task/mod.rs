// src/task/mod.rs

//! Tasks: pipeline stages owning one or more jobs.
//!
//! - [`kind`] is the closed set of stage kinds and their priority table.
//! - [`finish`] holds the per-kind finish logic run once a task is done.
//! - [`order`] sorts pending tasks into check order.

pub mod finish;
pub mod kind;
pub mod order;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use tracing::warn;

use crate::job::{Job, JobId, JobStatus};

pub use finish::{Artifacts, TaskFinisher};
pub use kind::TaskKind;
pub use order::{check_order, sort_for_check};

pub type TaskId = String;
pub type ThreadId = String;

/// Task status, derived from the statuses of its jobs on every check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// No job has been handed to the launcher yet.
    Pending,
    /// Some jobs are queued or running.
    Running,
    Done,
    Error,
}

impl TaskStatus {
    pub fn code(&self) -> char {
        match self {
            TaskStatus::Pending => 'W',
            TaskStatus::Running => 'R',
            TaskStatus::Done => 'D',
            TaskStatus::Error => 'E',
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub thread: ThreadId,
    pub kind: TaskKind,
    /// Name of the template / stage definition this task was built from.
    pub template: String,
    /// Workflow target name handed back to the policy on completion.
    pub target: String,
    /// Problem size, used as a check-order tie-break.
    pub size: u64,
    pub dir: PathBuf,
    pub jobs: Vec<Job>,
    /// Declared output artifacts (artifact name -> path).
    pub outputs: BTreeMap<String, PathBuf>,
}

impl Task {
    pub fn new(
        id: impl Into<TaskId>,
        thread: impl Into<ThreadId>,
        kind: TaskKind,
        dir: impl Into<PathBuf>,
    ) -> Self {
        let thread = thread.into();
        Self {
            id: id.into(),
            target: thread.clone(),
            thread,
            kind,
            template: kind.as_str().to_string(),
            size: 0,
            dir: dir.into(),
            jobs: Vec::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_job(mut self, job: Job) -> Self {
        self.jobs.push(job);
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.outputs.insert(name.into(), path.into());
        self
    }

    /// Done iff every job is done; Error as soon as any job failed or was
    /// lost; otherwise in progress.
    pub fn status(&self) -> TaskStatus {
        if self.jobs.iter().any(|j| j.status.is_failure()) {
            return TaskStatus::Error;
        }
        if self.jobs.iter().all(|j| j.status == JobStatus::Done) {
            return TaskStatus::Done;
        }
        if self
            .jobs
            .iter()
            .any(|j| matches!(j.status, JobStatus::Queued | JobStatus::Running | JobStatus::Done))
        {
            TaskStatus::Running
        } else {
            TaskStatus::Pending
        }
    }

    /// First failed or lost job, if any.
    pub fn first_failure(&self) -> Option<&Job> {
        self.jobs.iter().find(|j| j.status.is_failure())
    }

    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn job_mut(&mut self, id: &str) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    /// Indices of waiting jobs whose dependencies are all done.
    pub fn ready_jobs(&self) -> Vec<usize> {
        self.jobs
            .iter()
            .enumerate()
            .filter(|(_, job)| job.status == JobStatus::Waiting && self.deps_done(job))
            .map(|(idx, _)| idx)
            .collect()
    }

    fn deps_done(&self, job: &Job) -> bool {
        job.deps.iter().all(|dep| match self.job(dep) {
            Some(d) => d.status == JobStatus::Done,
            None => {
                warn!(
                    task = %self.id,
                    job = %job.id,
                    dep = %dep,
                    "job depends on a job outside its task; it will never become ready"
                );
                false
            }
        })
    }

    /// Ids of all jobs owned by this task.
    pub fn job_ids(&self) -> impl Iterator<Item = &JobId> {
        self.jobs.iter().map(|j| &j.id)
    }

    /// Summary like `2(D), 1(R)` for log lines.
    pub fn job_summary(&self) -> String {
        let mut counts: BTreeMap<char, usize> = BTreeMap::new();
        for job in &self.jobs {
            *counts.entry(job.status.code()).or_default() += 1;
        }
        counts
            .iter()
            .map(|(code, n)| format!("{n}({code})"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} [{}]", self.kind, self.id, self.thread)
    }
}
