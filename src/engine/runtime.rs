// src/engine/runtime.rs

use std::collections::BTreeMap;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ConfigFile;
use crate::context::{RunContext, ThreadError};
use crate::errors::{Result, SchedError};
use crate::job::{JobReport, JobStatus};
use crate::launcher::LauncherHandle;
use crate::logging::LogControl;
use crate::notify::{NotifyEvent, Reporter};
use crate::policy::WorkflowPolicy;
use crate::task::ThreadId;

use super::core::{QueuedJob, SchedulerCore};
use super::finalize::Finalizer;
use super::report;

/// Name of the per-thread command log.
pub const COMMAND_LOG: &str = "commands.log";

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Sleep between cycles.
    pub schedule_time: Duration,
    /// Shorter sleep after a cycle that submitted jobs.
    pub submit_time: Duration,
    pub report_interval: Option<Duration>,
    /// Raise verbosity when a task with this id prefix is first seen.
    pub debug_task: Option<String>,
}

impl SchedulerOptions {
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self {
            schedule_time: cfg.timing.schedule_time,
            submit_time: cfg.timing.submit_time,
            report_interval: cfg.report_interval,
            debug_task: None,
        }
    }
}

/// Outcome of a completed scheduling run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub cycles: u64,
    /// Threads finalized, in the order they finished.
    pub finished_threads: Vec<ThreadId>,
    pub errors: BTreeMap<ThreadId, Vec<ThreadError>>,
}

impl RunSummary {
    /// No thread recorded an error.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Drives the scheduling cycle and talks to the background launcher.
///
/// This is the async IO shell around [`SchedulerCore`]: it drains launcher
/// reports, runs one core cycle, submits the queued jobs, finalizes finished
/// threads and sleeps until the next cycle.
pub struct Scheduler<P: WorkflowPolicy> {
    core: SchedulerCore,
    ctx: RunContext,
    policy: P,
    launcher: LauncherHandle,
    finalizer: Finalizer,
    reporter: Reporter,
    options: SchedulerOptions,
    cancel: CancellationToken,
    log_control: Option<LogControl>,
    debug_enabled: bool,
}

impl<P: WorkflowPolicy> fmt::Debug for Scheduler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("core", &self.core)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<P: WorkflowPolicy> Scheduler<P> {
    pub fn new(
        core: SchedulerCore,
        ctx: RunContext,
        policy: P,
        launcher: LauncherHandle,
        finalizer: Finalizer,
        options: SchedulerOptions,
    ) -> Self {
        let cancel = launcher.cancel_token();
        Self {
            core,
            ctx,
            policy,
            launcher,
            finalizer,
            reporter: Reporter::disabled(),
            options,
            cancel,
            log_control: None,
            debug_enabled: false,
        }
    }

    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Token that stops the run when cancelled. Defaults to the launcher's.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_log_control(mut self, log_control: Option<LogControl>) -> Self {
        self.log_control = log_control;
        self
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Main loop. Runs until no task is pending, a fatal error occurs or the
    /// run is cancelled. The launcher is shut down on every exit path.
    pub async fn run(mut self) -> Result<RunSummary> {
        info!(pending = self.core.pending_len(), "scheduler started");

        let mut summary = RunSummary::default();
        let mut last_report: Option<Instant> = None;

        let outcome = loop {
            for report in self.launcher.drain_reports() {
                self.core.apply_report(report);
            }

            let info_lines = report::thread_summary(&self.core, &self.ctx);
            for line in &info_lines {
                info!("{line}");
            }
            for line in report::task_lines(&self.core) {
                debug!("{line}");
            }
            if last_report.is_none() {
                self.reporter.send(NotifyEvent::RunStarted, &info_lines).await;
                last_report = Some(Instant::now());
            }
            self.maybe_enable_debug();

            let step = match self.core.cycle(&mut self.ctx, &mut self.policy) {
                Ok(step) => step,
                Err(e) => break Err(e),
            };
            summary.cycles += 1;

            let submitted = !step.queued.is_empty();
            if let Err(e) = self.submit(step.queued).await {
                break Err(e);
            }

            if !step.new_errors.is_empty() {
                let lines = report::error_lines(&self.ctx);
                for line in &lines {
                    error!("{line}");
                }
                self.reporter.send(NotifyEvent::ErrorsFound, &lines).await;
            }

            let mut finished_lines = Vec::new();
            for thread in step.finished_threads {
                finished_lines.push(self.finalize_thread(&thread).await);
                summary.finished_threads.push(thread);
            }

            if !step.keep_running {
                let mut body = finished_lines;
                body.extend(report::error_lines(&self.ctx));
                self.reporter.send(NotifyEvent::RunFinished, &body).await;
                break Ok(());
            }

            let report_due = match (self.options.report_interval, last_report) {
                (Some(interval), Some(at)) => at.elapsed() >= interval,
                _ => false,
            };
            if report_due {
                let mut body = info_lines;
                body.extend(report::error_lines(&self.ctx));
                body.extend(finished_lines);
                self.reporter.send(NotifyEvent::PeriodicReport, &body).await;
                last_report = Some(Instant::now());
            } else if !finished_lines.is_empty() {
                self.reporter.send(NotifyEvent::ThreadFinished, &finished_lines).await;
            }

            let wait = if submitted {
                self.options.submit_time
            } else {
                self.options.schedule_time
            };
            tokio::select! {
                _ = self.cancel.cancelled() => break Err(SchedError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        };

        let leftover = self.launcher.shutdown().await;
        if !leftover.is_empty() {
            debug!(reports = leftover.len(), "launcher reports after shutdown");
        }

        if matches!(outcome, Err(SchedError::Cancelled)) {
            let errors = report::error_lines(&self.ctx);
            for line in &errors {
                warn!("{line}");
            }
            let mut body = vec!["Run cancelled".to_string()];
            body.extend(report::thread_summary(&self.core, &self.ctx));
            body.extend(errors);
            self.reporter.send(NotifyEvent::RunFinished, &body).await;
        }

        outcome?;
        summary.errors = self.ctx.errors();
        info!(
            cycles = summary.cycles,
            threads = summary.finished_threads.len(),
            failed_threads = summary.errors.len(),
            "scheduler finished"
        );
        Ok(summary)
    }

    async fn submit(&mut self, queued: Vec<QueuedJob>) -> Result<()> {
        for job in queued {
            if let Err(e) = prepare_workdir(&job) {
                error!(job = %job.submission.job_id, error = %e, "cannot prepare job directory");
                self.core.apply_report(
                    JobReport::new(job.submission.job_id.clone(), JobStatus::Error)
                        .with_message(format!("cannot prepare job directory: {e}")),
                );
                continue;
            }
            self.log_command(&job);
            debug!(job = %job.submission.job_id, cores = job.submission.cores, "submitting job");
            self.launcher.submit(job.submission).await?;
        }
        Ok(())
    }

    fn log_command(&self, job: &QueuedJob) {
        let Some(thread) = self.ctx.thread(&job.thread) else {
            return;
        };
        let line = format!(
            "{}\t{}\t{}\t{}\t{}\n",
            job.template, job.task_id, job.job_name, job.submission.job_id, job.submission.command
        );
        let path = thread.outpath.join(COMMAND_LOG);
        let result = std::fs::create_dir_all(&thread.outpath).and_then(|_| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?
                .write_all(line.as_bytes())
        });
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "cannot append to command log");
        }
    }

    async fn finalize_thread(&mut self, id: &str) -> String {
        let Some(thread) = self.ctx.thread(id) else {
            return format!("Thread {id} finished");
        };
        let name = thread.name.clone();
        let iterations = thread.iteration;
        let outpath = thread.outpath.display().to_string();
        let had_errors = !thread.errors.is_empty();

        let message = match self.finalizer.finalize(thread).await {
            Ok(Some(artifacts)) => {
                info!(thread = %id, "thread finished");
                return format!(
                    "Thread {name} finished after {iterations} iteration(s): {}",
                    artifacts.tree.display()
                );
            }
            // Its failures are already recorded.
            Ok(None) if had_errors => {
                warn!(thread = %id, "thread ended with errors and without a final tree");
                return format!("Thread {name} finished with errors and without a final tree");
            }
            Ok(None) => format!("thread {name} produced no tree to finalize"),
            Err(e) => e.to_string(),
        };

        error!(thread = %id, error = %message, "thread finalization failed");
        self.ctx.record_error(
            id,
            ThreadError {
                task: None,
                job: None,
                location: Some(outpath),
                message,
            },
        );
        format!("Thread {name} finished without a final tree")
    }

    fn maybe_enable_debug(&mut self) {
        if self.debug_enabled {
            return;
        }
        let Some(prefix) = self.options.debug_task.as_deref() else {
            return;
        };
        let Some(task) = self.core.pending_tasks().find(|t| t.id.starts_with(prefix)) else {
            return;
        };
        self.debug_enabled = true;
        info!(task = %task.id, "debug task reached; raising log level");
        if let Some(control) = &self.log_control {
            if let Err(e) = control.set_level(tracing::Level::DEBUG) {
                warn!(error = %e, "cannot raise log level");
            }
        }
    }
}

fn prepare_workdir(job: &QueuedJob) -> std::io::Result<()> {
    std::fs::create_dir_all(&job.workdir)?;
    for input in &job.inputs {
        if input.materialize(&job.workdir)? {
            debug!(job = %job.submission.job_id, input = %input.name, "input written");
        }
    }
    Ok(())
}
