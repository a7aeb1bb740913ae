// src/launcher/admission.rs

//! Pure core-budget bookkeeping of the background launcher.
//!
//! No IO happens here: the async loop in [`super`] probes processes and
//! markers and feeds the results in, which keeps the admission rules easy to
//! test on their own.

use std::collections::{BTreeMap, HashSet, VecDeque};

use tracing::{error, warn};

use crate::errors::{Result, SchedError};
use crate::job::{JobId, JobReport, JobStatus, JobSubmission};

/// A job that has been admitted and counts against the budget.
#[derive(Debug, Clone)]
pub struct RunningJob {
    pub submission: JobSubmission,
    pub remote_id: Option<String>,
}

/// What the launcher observed about a running job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Probe {
    /// Current status marker, if readable.
    pub marker: Option<JobStatus>,
    /// The owned process has exited. Always false for jobs without a handle.
    pub process_exited: bool,
}

#[derive(Debug)]
pub struct Admission {
    total_cores: u32,
    pending: VecDeque<JobSubmission>,
    running: BTreeMap<JobId, RunningJob>,
    seen: HashSet<JobId>,
}

impl Admission {
    pub fn new(total_cores: u32) -> Self {
        Self {
            total_cores,
            pending: VecDeque::new(),
            running: BTreeMap::new(),
            seen: HashSet::new(),
        }
    }

    pub fn total_cores(&self) -> u32 {
        self.total_cores
    }

    pub fn cores_used(&self) -> u32 {
        self.running.values().map(|r| r.submission.cores).sum()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn running_len(&self) -> usize {
        self.running.len()
    }

    pub fn is_running(&self, job_id: &str) -> bool {
        self.running.contains_key(job_id)
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.running.is_empty()
    }

    /// Queue a submission. A job id is accepted at most once per run.
    pub fn enqueue(&mut self, submission: JobSubmission) -> Result<()> {
        if self.seen.contains(&submission.job_id) {
            error!(job = %submission.job_id, "job submitted twice; dropping the duplicate");
            return Err(SchedError::DuplicateJob(submission.job_id));
        }
        if submission.cores > self.total_cores {
            return Err(SchedError::InsufficientCores {
                job: submission.job_id,
                requested: submission.cores,
                total: self.total_cores,
            });
        }
        self.seen.insert(submission.job_id.clone());
        self.pending.push_back(submission);
        Ok(())
    }

    /// Release finished jobs.
    ///
    /// A job leaves the running set once its marker says `D`, `E` or `L`,
    /// or when its process exited while the marker was never finalized, in
    /// which case it is reported `Lost`. Each report comes with the entry
    /// that was removed.
    pub fn reap<F>(&mut self, mut probe: F) -> Vec<(JobReport, RunningJob)>
    where
        F: FnMut(&JobId, &RunningJob) -> Probe,
    {
        let mut reports = Vec::new();
        let mut finished = Vec::new();

        for (id, job) in self.running.iter() {
            let p = probe(id, job);
            let status = match p.marker {
                Some(st) if st.is_terminal() => Some(st),
                _ if p.process_exited => {
                    warn!(job = %id, marker = ?p.marker, "job process exited without a final status");
                    Some(JobStatus::Lost)
                }
                _ => None,
            };
            if let Some(status) = status {
                finished.push((id.clone(), status));
            }
        }

        for (id, status) in finished {
            if let Some(job) = self.running.remove(&id) {
                let report = JobReport::new(id, status).with_remote_id(job.remote_id.clone());
                reports.push((report, job));
            }
        }
        reports
    }

    /// Admit queued jobs in FIFO order while the head fits the free cores.
    ///
    /// A head that doesn't fit blocks everything behind it, so jobs start in
    /// the order they were submitted.
    pub fn admit(&mut self) -> Vec<JobSubmission> {
        let mut admitted = Vec::new();
        let mut used = self.cores_used();
        while let Some(head) = self.pending.front() {
            if used + head.cores > self.total_cores {
                break;
            }
            let Some(sub) = self.pending.pop_front() else {
                break;
            };
            used += sub.cores;
            self.running.insert(
                sub.job_id.clone(),
                RunningJob {
                    submission: sub.clone(),
                    remote_id: None,
                },
            );
            admitted.push(sub);
        }
        admitted
    }

    /// Give back the cores of a job that failed to launch.
    pub fn release(&mut self, job_id: &str) -> Option<RunningJob> {
        self.running.remove(job_id)
    }

    pub fn set_remote_id(&mut self, job_id: &str, remote_id: impl Into<String>) {
        if let Some(job) = self.running.get_mut(job_id) {
            job.remote_id = Some(remote_id.into());
        }
    }

    /// Take everything out, for shutdown.
    pub fn drain(&mut self) -> (Vec<JobSubmission>, Vec<RunningJob>) {
        let pending = self.pending.drain(..).collect();
        let running = std::mem::take(&mut self.running).into_values().collect();
        (pending, running)
    }
}
