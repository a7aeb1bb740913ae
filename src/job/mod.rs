// src/job/mod.rs

//! Jobs: single external-process invocations owned by a task.
//!
//! - [`status`] holds the job state machine and the status marker codec.
//! - [`Job`] is the value type the scheduler mutates.
//! - [`JobSubmission`] / [`JobReport`] are the records exchanged with the
//!   background launcher.

pub mod status;

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

pub use status::{JobStatus, STATUS_FILE_NAME, parse_marker, read_marker, write_marker};

pub type JobId = String;

/// Where the content of an input artifact comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
    /// Copy an existing file.
    File(PathBuf),
    /// Literal content.
    Inline(String),
}

/// A file a job expects to find in its working directory before it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputArtifact {
    pub name: String,
    pub source: ArtifactSource,
}

impl InputArtifact {
    pub fn new(name: impl Into<String>, source: ArtifactSource) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }

    /// Write the artifact into `dir` unless a file with that name already
    /// exists. Returns whether anything was written.
    pub fn materialize(&self, dir: &Path) -> io::Result<bool> {
        let target = dir.join(&self.name);
        if target.exists() {
            return Ok(false);
        }
        fs::create_dir_all(dir)?;
        match &self.source {
            ArtifactSource::File(src) => {
                fs::copy(src, &target)?;
            }
            ArtifactSource::Inline(text) => {
                fs::write(&target, text)?;
            }
        }
        Ok(true)
    }
}

/// Record sent over the submission channel to the background launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSubmission {
    pub job_id: JobId,
    pub cores: u32,
    pub command: String,
    pub status_file: PathBuf,
}

/// Status record sent back from the launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub job_id: JobId,
    pub status: JobStatus,
    pub message: Option<String>,
    /// Batch-system job id, for remote submissions.
    pub remote_id: Option<String>,
}

impl JobReport {
    pub fn new(job_id: impl Into<JobId>, status: JobStatus) -> Self {
        Self {
            job_id: job_id.into(),
            status,
            message: None,
            remote_id: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_remote_id(mut self, remote_id: Option<String>) -> Self {
        self.remote_id = remote_id;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    /// Fully resolved shell command.
    pub command: String,
    pub cores: u32,
    pub status: JobStatus,
    pub workdir: PathBuf,
    pub inputs: Vec<InputArtifact>,
    /// Ids of sibling jobs that must be `Done` first.
    pub deps: BTreeSet<JobId>,
    pub remote_id: Option<String>,
    /// Last failure message reported for this job.
    pub message: Option<String>,
}

impl Job {
    pub fn new(
        id: impl Into<JobId>,
        name: impl Into<String>,
        command: impl Into<String>,
        cores: u32,
        workdir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            command: command.into(),
            cores,
            status: JobStatus::Waiting,
            workdir: workdir.into(),
            inputs: Vec::new(),
            deps: BTreeSet::new(),
            remote_id: None,
            message: None,
        }
    }

    pub fn with_dep(mut self, dep: impl Into<JobId>) -> Self {
        self.deps.insert(dep.into());
        self
    }

    pub fn with_input(mut self, input: InputArtifact) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn status_file(&self) -> PathBuf {
        self.workdir.join(STATUS_FILE_NAME)
    }

    /// Move to `next` if the transition is legal. Illegal transitions are
    /// logged and ignored so a late or duplicated report cannot make a job
    /// regress.
    pub fn advance(&mut self, next: JobStatus) -> bool {
        if self.status == next {
            return false;
        }
        if !self.status.can_advance_to(next) {
            warn!(
                job = %self.id,
                from = %self.status,
                to = %next,
                "ignoring illegal job status transition"
            );
            return false;
        }
        self.status = next;
        true
    }

    /// The command actually handed to a backend: runs the job inside its
    /// working directory, captures output and records the exit in the
    /// status marker. The marker is written next to the status file and
    /// moved over it, so pollers only ever see a whole marker.
    pub fn launch_command(&self) -> String {
        let dir = shell_quote(&self.workdir.to_string_lossy());
        let status_file = self.status_file();
        let status = shell_quote(&status_file.to_string_lossy());
        let exit_file = shell_quote(&format!("{}.exit", status_file.to_string_lossy()));
        format!(
            "cd {dir} && ( {cmd} ) >stdout.log 2>stderr.log && code=D || code=E; \
             printf $code > {exit_file} && mv -f {exit_file} {status}",
            cmd = self.command,
        )
    }

    pub fn submission(&self) -> JobSubmission {
        JobSubmission {
            job_id: self.id.clone(),
            cores: self.cores,
            command: self.launch_command(),
            status_file: self.status_file(),
        }
    }
}

/// Single-quote a string for `sh`.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
