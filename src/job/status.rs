// src/job/status.rs

//! Job state machine and the one-byte status marker file.
//!
//! The marker is the interop format between the launcher and the processes it
//! starts: the launcher writes `R` on admission, the launch wrapper overwrites
//! it with `D` or `E` when the command exits, and the launcher itself writes
//! `L` (lost) or `E` (killed on shutdown). Readers only look at the first
//! byte.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File name of the status marker inside each job directory.
pub const STATUS_FILE_NAME: &str = "__status__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    /// Created, dependencies not yet satisfied or not yet checked.
    Waiting,
    /// Handed to the submission channel, not yet admitted.
    Queued,
    /// Admitted by the launcher and started.
    Running,
    Done,
    Error,
    /// The process died without writing a terminal marker.
    Lost,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error | JobStatus::Lost)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, JobStatus::Error | JobStatus::Lost)
    }

    /// Single-character code, as used in marker files and log lines.
    pub fn code(&self) -> char {
        match self {
            JobStatus::Waiting => 'W',
            JobStatus::Queued => 'Q',
            JobStatus::Running => 'R',
            JobStatus::Done => 'D',
            JobStatus::Error => 'E',
            JobStatus::Lost => 'L',
        }
    }

    /// Decode a marker byte. `W` never appears in marker files.
    pub fn from_marker(byte: u8) -> Option<JobStatus> {
        match byte {
            b'Q' => Some(JobStatus::Queued),
            b'R' => Some(JobStatus::Running),
            b'D' => Some(JobStatus::Done),
            b'E' => Some(JobStatus::Error),
            b'L' => Some(JobStatus::Lost),
            _ => None,
        }
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// Legal: `Waiting -> Queued -> Running -> {Done, Error, Lost}`, plus
    /// `Queued -> Error` for jobs the launcher refuses or fails to start.
    pub fn can_advance_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Waiting, Queued)
                | (Queued, Running)
                | (Queued, Error)
                | (Running, Done)
                | (Running, Error)
                | (Running, Lost)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Decode the authoritative first byte of a marker file's contents.
pub fn parse_marker(contents: &[u8]) -> Option<JobStatus> {
    contents.first().and_then(|b| JobStatus::from_marker(*b))
}

/// Read a marker file. Missing, empty or garbled files yield `None`.
pub fn read_marker(path: &Path) -> Option<JobStatus> {
    let contents = fs::read(path).ok()?;
    parse_marker(&contents)
}

/// Overwrite a marker file as a whole (write a sibling temp file, then
/// rename over the target) so pollers never observe a partial write.
pub fn write_marker(path: &Path, status: JobStatus) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = temp_sibling(path);
    fs::write(&tmp, [status.code() as u8])?;
    fs::rename(&tmp, path)
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
