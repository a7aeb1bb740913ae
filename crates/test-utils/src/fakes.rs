use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use nprsched::backend::{ExecutionBackend, LaunchOutcome, Launched};
use nprsched::context::RunContext;
use nprsched::errors::{Result, SchedError};
use nprsched::job::{JobId, JobStatus, JobSubmission, write_marker};
use nprsched::notify::Notifier;
use nprsched::policy::WorkflowPolicy;
use nprsched::task::{Task, TaskId};

/// What the scripted backend does with a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    /// Write this final marker right away.
    Finish(JobStatus),
    /// Leave the `R` marker alone.
    Hang,
    /// Report a launch failure.
    FailLaunch(String),
}

/// A fake execution backend that:
/// - records every launched submission, batch by batch
/// - writes the scripted final marker instead of running anything.
///
/// Jobs without a script finish with `D`. Scripts match a job id exactly or
/// by suffix.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    scripts: Vec<(String, Scripted)>,
    batches: Arc<Mutex<Vec<Vec<JobSubmission>>>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, job_suffix: &str, outcome: Scripted) -> Self {
        self.scripts.push((job_suffix.to_string(), outcome));
        self
    }

    /// Shared view of the launched batches.
    pub fn batches(&self) -> Arc<Mutex<Vec<Vec<JobSubmission>>>> {
        Arc::clone(&self.batches)
    }

    fn script_for(&self, job_id: &str) -> Scripted {
        self.scripts
            .iter()
            .find(|(pattern, _)| job_id == pattern || job_id.ends_with(pattern.as_str()))
            .map(|(_, s)| s.clone())
            .unwrap_or(Scripted::Finish(JobStatus::Done))
    }
}

impl ExecutionBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn launch(
        &mut self,
        jobs: Vec<JobSubmission>,
    ) -> Pin<Box<dyn Future<Output = Vec<LaunchOutcome>> + Send + '_>> {
        Box::pin(async move {
            self.batches.lock().unwrap().push(jobs.clone());
            jobs.into_iter()
                .map(|job| {
                    let result = match self.script_for(&job.job_id) {
                        Scripted::Finish(status) => write_marker(&job.status_file, status)
                            .map(|_| Launched::Detached)
                            .map_err(SchedError::from),
                        Scripted::Hang => Ok(Launched::Detached),
                        Scripted::FailLaunch(msg) => Err(SchedError::Submission(msg)),
                    };
                    LaunchOutcome::new(job.job_id, result)
                })
                .collect()
        })
    }
}

/// Collects every notification sent.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(String, Vec<String>)>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subjects in the order they were sent.
    pub fn subjects(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
    }

    pub fn messages(&self) -> Vec<(String, Vec<String>)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify<'a>(
        &'a mut self,
        _recipient: &'a str,
        subject: &'a str,
        body: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.sent
                .lock()
                .unwrap()
                .push((subject.to_string(), body.to_vec()));
            Ok(())
        })
    }
}

/// A policy with fixed seeds and fixed follow-ons, counting how often each
/// task was processed.
#[derive(Default)]
pub struct CountingPolicy {
    seeds: Vec<Task>,
    follow_ons: BTreeMap<TaskId, Vec<Task>>,
    processed: Arc<Mutex<Vec<TaskId>>>,
}

impl CountingPolicy {
    pub fn new(seeds: Vec<Task>) -> Self {
        Self {
            seeds,
            ..Self::default()
        }
    }

    /// Tasks returned once `parent` is processed.
    pub fn then(mut self, parent: &str, tasks: Vec<Task>) -> Self {
        self.follow_ons.insert(parent.to_string(), tasks);
        self
    }

    pub fn processed(&self) -> Arc<Mutex<Vec<TaskId>>> {
        Arc::clone(&self.processed)
    }
}

impl WorkflowPolicy for CountingPolicy {
    fn seed(&mut self, _ctx: &mut RunContext) -> Result<Vec<Task>> {
        Ok(std::mem::take(&mut self.seeds))
    }

    fn process_task(
        &mut self,
        _ctx: &mut RunContext,
        task: &Task,
        _target: &str,
    ) -> Result<Vec<Task>> {
        self.processed.lock().unwrap().push(task.id.clone());
        Ok(self.follow_ons.remove(&task.id).unwrap_or_default())
    }
}

/// Ids of every job in the launched batches, in launch order.
pub fn launched_ids(batches: &Arc<Mutex<Vec<Vec<JobSubmission>>>>) -> Vec<JobId> {
    batches
        .lock()
        .unwrap()
        .iter()
        .flatten()
        .map(|j| j.job_id.clone())
        .collect()
}
