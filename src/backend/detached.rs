// src/backend/detached.rs

use std::future::Future;
use std::pin::Pin;

use tracing::{debug, error};

use crate::backend::{ExecutionBackend, LaunchOutcome, Launched, shell_command};
use crate::errors::SchedError;
use crate::job::JobSubmission;

/// Starts each job in the background of a short-lived shell, so the job keeps
/// running if the launcher goes away. No handle is kept.
#[derive(Debug, Default)]
pub struct DetachedBackend;

impl DetachedBackend {
    pub fn new() -> Self {
        Self
    }
}

/// Shell line that starts `cmd` in the background and returns immediately.
pub fn detached_command(cmd: &str) -> String {
    format!("( {cmd} ) >/dev/null 2>&1 &")
}

impl ExecutionBackend for DetachedBackend {
    fn name(&self) -> &'static str {
        "detached"
    }

    fn launch(
        &mut self,
        jobs: Vec<JobSubmission>,
    ) -> Pin<Box<dyn Future<Output = Vec<LaunchOutcome>> + Send + '_>> {
        Box::pin(async move {
            let mut outcomes = Vec::with_capacity(jobs.len());
            for job in jobs {
                let result = match shell_command(&detached_command(&job.command))
                    .status()
                    .await
                {
                    Ok(status) if status.success() => {
                        debug!(job = %job.job_id, "detached job started");
                        Ok(Launched::Detached)
                    }
                    Ok(status) => Err(SchedError::Other(anyhow::anyhow!(
                        "detaching shell exited with {status}"
                    ))),
                    Err(e) => Err(SchedError::from(e)),
                };
                if let Err(e) = &result {
                    error!(job = %job.job_id, error = %e, "failed to start detached job");
                }
                outcomes.push(LaunchOutcome::new(job.job_id, result));
            }
            outcomes
        })
    }
}
