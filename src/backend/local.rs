// src/backend/local.rs

use std::future::Future;
use std::pin::Pin;

use tracing::{debug, error};

use crate::backend::{ExecutionBackend, LaunchOutcome, Launched, shell_command};
use crate::errors::SchedError;
use crate::job::JobSubmission;

/// Runs each job as a child process of the launcher.
#[derive(Debug, Default)]
pub struct LocalBackend;

impl LocalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ExecutionBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn launch(
        &mut self,
        jobs: Vec<JobSubmission>,
    ) -> Pin<Box<dyn Future<Output = Vec<LaunchOutcome>> + Send + '_>> {
        Box::pin(async move {
            jobs.into_iter()
                .map(|job| {
                    let result = shell_command(&job.command)
                        .spawn()
                        .map(Launched::Owned)
                        .map_err(SchedError::from);
                    match &result {
                        Ok(Launched::Owned(child)) => {
                            debug!(job = %job.job_id, pid = ?child.id(), "job process started");
                        }
                        Err(e) => {
                            error!(job = %job.job_id, error = %e, "failed to start job process");
                        }
                        Ok(_) => {}
                    }
                    LaunchOutcome::new(job.job_id, result)
                })
                .collect()
        })
    }
}
