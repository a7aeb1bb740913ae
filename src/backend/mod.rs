// src/backend/mod.rs

//! Execution backends: how an admitted job becomes a running process.
//!
//! The background launcher decides *when* a job may start; a backend decides
//! *how*. Every backend honours the same contract: the launcher has already
//! written `R` into the job's status marker, and the launch wrapper (or the
//! batch system running it) eventually overwrites it with `D` or `E`.
//!
//! - [`LocalBackend`] starts a child process and hands the handle back, so
//!   the launcher can detect lost jobs and kill them on shutdown.
//! - [`DetachedBackend`] starts a process that outlives the launcher; only
//!   the marker tells what happened to it.
//! - [`SgeBackend`] groups jobs with identical resource needs into one
//!   batch-array submission.

pub mod detached;
pub mod local;
pub mod sge;

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::config::ConfigFile;
use crate::errors::Result;
use crate::job::{JobId, JobSubmission};
use crate::types::ExecutionMode;

pub use detached::DetachedBackend;
pub use local::LocalBackend;
pub use sge::SgeBackend;

/// What a successful launch left behind.
#[derive(Debug)]
pub enum Launched {
    /// A child process owned by the launcher.
    Owned(Child),
    /// A process nobody holds a handle to.
    Detached,
    /// A job accepted by a remote batch system.
    Remote { remote_id: String },
}

/// Result of launching one job.
#[derive(Debug)]
pub struct LaunchOutcome {
    pub job_id: JobId,
    pub result: Result<Launched>,
}

impl LaunchOutcome {
    pub fn new(job_id: impl Into<JobId>, result: Result<Launched>) -> Self {
        Self {
            job_id: job_id.into(),
            result,
        }
    }
}

/// Trait abstracting how admitted jobs are executed.
///
/// Production code picks one of the three backends in this module; tests can
/// provide their own implementation that doesn't spawn real processes.
pub trait ExecutionBackend: Send {
    fn name(&self) -> &'static str;

    /// Start every job in `jobs`, returning one outcome per job.
    fn launch(
        &mut self,
        jobs: Vec<JobSubmission>,
    ) -> Pin<Box<dyn Future<Output = Vec<LaunchOutcome>> + Send + '_>>;
}

/// Backend selected by `[config].execution`.
pub fn from_config(cfg: &ConfigFile) -> Result<Box<dyn ExecutionBackend>> {
    Ok(match cfg.config.execution {
        ExecutionMode::Local => Box::new(LocalBackend::new()),
        ExecutionMode::Detached => Box::new(DetachedBackend::new()),
        ExecutionMode::Sge => Box::new(SgeBackend::new(cfg.sge.clone())?),
    })
}

/// `sh -c <cmd>` in a fresh process group, with stdio detached from ours.
///
/// The process group lets the launcher signal the whole job (the shell and
/// everything it started) at once.
pub fn shell_command(cmd: &str) -> Command {
    let mut c = Command::new("sh");
    c.arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0);
    c
}
