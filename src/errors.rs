// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Cycle detected in task spawn graph: {0}")]
    SpawnCycle(String),

    /// A job asks for more cores than the launcher will ever have.
    #[error(
        "job [{job}] requests {requested} core(s) but the run is limited to {total} core(s); \
         raise max_cores to enable more cores"
    )]
    InsufficientCores {
        job: String,
        requested: u32,
        total: u32,
    },

    #[error("Batch submission failed: {0}")]
    Submission(String),

    #[error("Job submitted twice: {0}")]
    DuplicateJob(String),

    #[error("Task {task} failed: {message}")]
    Task { task: String, message: String },

    #[error("Run cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SchedError {
    pub fn task(task: impl Into<String>, message: impl Into<String>) -> Self {
        SchedError::Task {
            task: task.into(),
            message: message.into(),
        }
    }

    /// Errors that abort the whole scheduling run rather than one thread.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SchedError::Task { .. } | SchedError::Submission(_))
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SchedError>;
