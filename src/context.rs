// src/context.rs

//! Explicit run state shared by the scheduler loop, task construction and the
//! workflow policy.
//!
//! One [`RunContext`] exists per scheduling run. It owns the per-thread
//! bookkeeping (iteration counter, recorded artifacts, error list) that the
//! loop and the policy both need, and is passed by reference wherever it is
//! used.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::ConfigFile;
use crate::job::JobId;
use crate::task::{Artifacts, TaskId, ThreadId};

/// Run-wide settings the policy and finalization need.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub max_iters: u32,
    /// Base name of the final artifacts written per thread.
    pub base_name: String,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_iters: 1,
            base_name: "result".to_string(),
        }
    }
}

/// One recorded failure inside a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadError {
    pub task: Option<TaskId>,
    pub job: Option<JobId>,
    /// Job directory or task id, whichever locates the failure best.
    pub location: Option<String>,
    pub message: String,
}

impl fmt::Display for ThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.task, &self.job) {
            (Some(task), Some(job)) => write!(f, "{task} / {job}: {}", self.message),
            (Some(task), None) => write!(f, "{task}: {}", self.message),
            _ => f.write_str(&self.message),
        }
    }
}

/// Bookkeeping for one top-level pipeline run.
#[derive(Debug, Clone)]
pub struct ThreadState {
    pub id: ThreadId,
    pub name: String,
    pub outpath: PathBuf,
    /// Completed NPR iterations.
    pub iteration: u32,
    /// Latest recorded artifact per name.
    pub artifacts: Artifacts,
    /// Every tree recorded, oldest first.
    pub trees: Vec<PathBuf>,
    pub finished_tasks: u64,
    pub errors: Vec<ThreadError>,
    pub finalized: bool,
}

impl ThreadState {
    pub fn new(id: impl Into<ThreadId>, outpath: impl Into<PathBuf>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            outpath: outpath.into(),
            iteration: 0,
            artifacts: Artifacts::new(),
            trees: Vec::new(),
            finished_tasks: 0,
            errors: Vec::new(),
            finalized: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn artifact(&self, name: &str) -> Option<&Path> {
        self.artifacts.get(name).map(PathBuf::as_path)
    }
}

#[derive(Debug, Default)]
pub struct RunContext {
    pub settings: RunSettings,
    threads: BTreeMap<ThreadId, ThreadState>,
    task_seq: u64,
}

impl RunContext {
    pub fn new(settings: RunSettings) -> Self {
        Self {
            settings,
            threads: BTreeMap::new(),
            task_seq: 0,
        }
    }

    /// Context with one thread per `[thread.*]` section.
    ///
    /// Output paths are made absolute: job commands run inside their job
    /// directory, so relative paths in them would resolve differently.
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let mut ctx = RunContext::new(RunSettings {
            max_iters: cfg.config.max_iters,
            base_name: cfg.config.base_name.clone(),
        });
        for (id, thread) in cfg.thread.iter() {
            let outpath = cfg.thread_outpath(id);
            let outpath = std::path::absolute(&outpath).unwrap_or(outpath);
            let state = ThreadState::new(id.clone(), outpath)
                .with_name(thread.name.clone().unwrap_or_else(|| id.clone()));
            ctx.add_thread(state);
        }
        ctx
    }

    pub fn add_thread(&mut self, thread: ThreadState) {
        self.threads.insert(thread.id.clone(), thread);
    }

    pub fn thread(&self, id: &str) -> Option<&ThreadState> {
        self.threads.get(id)
    }

    pub fn thread_mut(&mut self, id: &str) -> Option<&mut ThreadState> {
        self.threads.get_mut(id)
    }

    pub fn threads(&self) -> impl Iterator<Item = &ThreadState> {
        self.threads.values()
    }

    pub fn thread_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.threads.get(id).map(|t| t.name.as_str()).unwrap_or(id)
    }

    /// Next value of the run-wide task counter, used to build unique task ids.
    pub fn next_task_seq(&mut self) -> u64 {
        self.task_seq += 1;
        self.task_seq
    }

    /// Whether the thread may start another NPR iteration.
    pub fn can_iterate(&self, id: &str) -> bool {
        self.threads
            .get(id)
            .map(|t| t.iteration < self.settings.max_iters)
            .unwrap_or(false)
    }

    pub fn record_artifacts(&mut self, id: &str, artifacts: &Artifacts) {
        if let Some(thread) = self.threads.get_mut(id) {
            for (name, path) in artifacts {
                if name == crate::task::finish::TREE {
                    thread.trees.push(path.clone());
                }
                thread.artifacts.insert(name.clone(), path.clone());
            }
        }
    }

    /// Record a failure. Errors for unknown threads are kept under a
    /// placeholder thread (never finalized) so nothing is dropped.
    pub fn record_error(&mut self, id: &str, error: ThreadError) {
        let thread = self
            .threads
            .entry(id.to_string())
            .or_insert_with(|| {
                let mut orphan = ThreadState::new(id, PathBuf::from(id));
                orphan.finalized = true;
                orphan
            });
        thread.errors.push(error);
    }

    /// Per-thread error lists, only for threads that recorded errors.
    pub fn errors(&self) -> BTreeMap<ThreadId, Vec<ThreadError>> {
        self.threads
            .values()
            .filter(|t| !t.errors.is_empty())
            .map(|t| (t.id.clone(), t.errors.clone()))
            .collect()
    }
}
