// src/launcher/mod.rs

//! Background launcher: admits submitted jobs under the core budget, starts
//! them through an [`ExecutionBackend`] and reports status changes back.
//!
//! The launcher runs as its own tokio task. The scheduler talks to it over
//! two channels: submissions go in, [`JobReport`]s come out. Once per poll
//! interval it
//! 1. reaps finished jobs (process first, then marker),
//! 2. drains new submissions,
//! 3. admits what fits and launches it.
//!
//! Cancelling its token kills every owned job and marks all unfinished jobs
//! as errors.

pub mod admission;

use std::collections::HashMap;
use std::time::Duration;

use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::{ExecutionBackend, Launched};
use crate::errors::{Result, SchedError};
use crate::job::{JobId, JobReport, JobStatus, JobSubmission, read_marker, write_marker};

pub use admission::{Admission, Probe, RunningJob};

const SUBMIT_CHANNEL_CAPACITY: usize = 64;

/// Scheduler-side handle of a running launcher.
pub struct LauncherHandle {
    submit_tx: Option<mpsc::Sender<JobSubmission>>,
    reports_rx: mpsc::UnboundedReceiver<JobReport>,
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl LauncherHandle {
    pub async fn submit(&self, submission: JobSubmission) -> Result<()> {
        let tx = self
            .submit_tx
            .as_ref()
            .ok_or_else(|| SchedError::Other(anyhow::anyhow!("launcher already shut down")))?;
        tx.send(submission)
            .await
            .map_err(|e| SchedError::Other(anyhow::anyhow!("launcher stopped: {e}")))
    }

    /// Every report received so far, without waiting.
    pub fn drain_reports(&mut self) -> Vec<JobReport> {
        let mut out = Vec::new();
        while let Ok(report) = self.reports_rx.try_recv() {
            out.push(report);
        }
        out
    }

    /// Wait for the next report. `None` once the launcher has exited.
    pub async fn next_report(&mut self) -> Option<JobReport> {
        self.reports_rx.recv().await
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop accepting submissions and let the launcher finish what it has.
    pub async fn close(&mut self) -> Vec<JobReport> {
        self.submit_tx = None;
        self.join_and_drain().await
    }

    /// Kill running jobs and stop the launcher. Returns the final reports.
    pub async fn shutdown(&mut self) -> Vec<JobReport> {
        self.submit_tx = None;
        self.cancel.cancel();
        self.join_and_drain().await
    }

    async fn join_and_drain(&mut self) -> Vec<JobReport> {
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                error!(error = %e, "launcher task failed");
            }
        }
        self.drain_reports()
    }
}

/// Spawn the launcher loop.
pub fn spawn_launcher(
    backend: Box<dyn ExecutionBackend>,
    total_cores: u32,
    poll_interval: Duration,
    cancel: CancellationToken,
) -> LauncherHandle {
    let (submit_tx, submit_rx) = mpsc::channel::<JobSubmission>(SUBMIT_CHANNEL_CAPACITY);
    let (report_tx, reports_rx) = mpsc::unbounded_channel::<JobReport>();

    let launcher = Launcher {
        admission: Admission::new(total_cores),
        backend,
        children: HashMap::new(),
        submit_rx,
        report_tx,
        channel_open: true,
    };
    let join = tokio::spawn(launcher.run(poll_interval, cancel.clone()));

    LauncherHandle {
        submit_tx: Some(submit_tx),
        reports_rx,
        cancel,
        join: Some(join),
    }
}

struct Launcher {
    admission: Admission,
    backend: Box<dyn ExecutionBackend>,
    children: HashMap<JobId, Child>,
    submit_rx: mpsc::Receiver<JobSubmission>,
    report_tx: mpsc::UnboundedSender<JobReport>,
    channel_open: bool,
}

impl Launcher {
    async fn run(mut self, poll_interval: Duration, cancel: CancellationToken) {
        info!(
            backend = self.backend.name(),
            total_cores = self.admission.total_cores(),
            "background launcher started"
        );

        loop {
            if cancel.is_cancelled() {
                self.shutdown();
                break;
            }

            self.poll().await;

            if !self.channel_open && self.admission.is_idle() {
                debug!("submission channel closed and no jobs left");
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.shutdown();
                    break;
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        info!("background launcher finished");
    }

    async fn poll(&mut self) {
        self.reap();
        self.drain_submissions();
        self.launch_admitted().await;
    }

    fn send(&self, report: JobReport) {
        if self.report_tx.send(report).is_err() {
            debug!("scheduler dropped the report channel");
        }
    }

    fn reap(&mut self) {
        let children = &mut self.children;
        let reports = self.admission.reap(|id, job| {
            // Check the process before the marker: a job that writes its
            // final marker and exits between the two reads is then never
            // mistaken for a lost one.
            let process_exited = match children.get_mut(id) {
                Some(child) => match child.try_wait() {
                    Ok(Some(_)) => true,
                    Ok(None) => false,
                    Err(e) => {
                        warn!(job = %id, error = %e, "could not poll job process");
                        false
                    }
                },
                None => false,
            };
            Probe {
                marker: read_marker(&job.submission.status_file),
                process_exited,
            }
        });

        for (report, job) in reports {
            self.children.remove(&report.job_id);
            if report.status == JobStatus::Lost {
                if let Err(e) = write_marker(&job.submission.status_file, JobStatus::Lost) {
                    warn!(job = %report.job_id, error = %e, "could not write lost marker");
                }
            }
            debug!(job = %report.job_id, status = %report.status, "job finished");
            self.send(report);
        }
    }

    fn drain_submissions(&mut self) {
        while self.channel_open {
            match self.submit_rx.try_recv() {
                Ok(submission) => {
                    let job_id = submission.job_id.clone();
                    let status_file = submission.status_file.clone();
                    match self.admission.enqueue(submission) {
                        Ok(()) => {}
                        Err(SchedError::DuplicateJob(_)) => {}
                        Err(e) => {
                            error!(job = %job_id, error = %e, "rejecting submission");
                            if let Err(we) = write_marker(&status_file, JobStatus::Error) {
                                warn!(job = %job_id, error = %we, "could not write error marker");
                            }
                            self.send(
                                JobReport::new(job_id, JobStatus::Error).with_message(e.to_string()),
                            );
                        }
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.channel_open = false;
                }
            }
        }
    }

    async fn launch_admitted(&mut self) {
        let batch = self.admission.admit();
        if batch.is_empty() {
            if self.admission.pending_len() > 0 {
                debug!(
                    waiting = self.admission.pending_len(),
                    cores_used = self.admission.cores_used(),
                    "no free cores for the next queued job"
                );
            }
            return;
        }

        let mut to_launch = Vec::with_capacity(batch.len());
        for sub in batch {
            match write_marker(&sub.status_file, JobStatus::Running) {
                Ok(()) => to_launch.push(sub),
                Err(e) => {
                    error!(job = %sub.job_id, error = %e, "could not write running marker");
                    self.admission.release(&sub.job_id);
                    self.send(
                        JobReport::new(sub.job_id, JobStatus::Error)
                            .with_message(format!("cannot write status marker: {e}")),
                    );
                }
            }
        }
        if to_launch.is_empty() {
            return;
        }

        let n = to_launch.len();
        let outcomes = self.backend.launch(to_launch).await;
        for outcome in outcomes {
            let job_id = outcome.job_id;
            match outcome.result {
                Ok(launched) => {
                    let remote_id = match launched {
                        Launched::Owned(child) => {
                            self.children.insert(job_id.clone(), child);
                            None
                        }
                        Launched::Detached => None,
                        Launched::Remote { remote_id } => {
                            self.admission.set_remote_id(&job_id, remote_id.clone());
                            Some(remote_id)
                        }
                    };
                    self.send(JobReport::new(job_id, JobStatus::Running).with_remote_id(remote_id));
                }
                Err(e) => {
                    if let Some(job) = self.admission.release(&job_id) {
                        if let Err(we) = write_marker(&job.submission.status_file, JobStatus::Error) {
                            warn!(job = %job_id, error = %we, "could not write error marker");
                        }
                    }
                    self.send(JobReport::new(job_id, JobStatus::Error).with_message(e.to_string()));
                }
            }
        }

        info!(
            launched = n,
            running = self.admission.running_len(),
            waiting = self.admission.pending_len(),
            "cores usage: {}/{}",
            self.admission.cores_used(),
            self.admission.total_cores()
        );
    }

    fn shutdown(&mut self) {
        let (pending, running) = self.admission.drain();
        if !running.is_empty() {
            warn!(jobs = running.len(), "terminating running jobs");
        }

        for job in running {
            let id = &job.submission.job_id;
            if let Some(child) = self.children.remove(id) {
                if let Some(pid) = child.id() {
                    if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                        debug!(job = %id, pid, error = %e, "could not signal job process group");
                    }
                }
            }
            let path = &job.submission.status_file;
            if let Some(status) = read_marker(path).filter(|st| st.is_terminal()) {
                debug!(job = %id, %status, "job finished before shutdown");
                self.send(JobReport::new(id.clone(), status).with_remote_id(job.remote_id));
                continue;
            }
            if let Err(e) = write_marker(path, JobStatus::Error) {
                warn!(job = %id, error = %e, "could not write error marker");
            }
            self.send(
                JobReport::new(id.clone(), JobStatus::Error)
                    .with_remote_id(job.remote_id)
                    .with_message("terminated on shutdown"),
            );
        }

        for sub in pending {
            self.send(
                JobReport::new(sub.job_id, JobStatus::Error).with_message("never started before shutdown"),
            );
        }
        self.channel_open = false;
    }
}
