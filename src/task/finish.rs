// src/task/finish.rs

//! Per-kind finish logic.
//!
//! Finishing a task validates the outputs its jobs produced and returns the
//! artifacts the thread should remember (alignments, trees, the selected
//! model). It runs exactly once, when the scheduler first sees the task done.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::errors::{Result, SchedError};

use super::{Task, TaskKind};

/// Artifact name -> file path.
pub type Artifacts = BTreeMap<String, PathBuf>;

pub const ALIGNMENT: &str = "alignment";
pub const CLEAN_ALIGNMENT: &str = "clean_alignment";
pub const TREE: &str = "tree";
pub const MODEL: &str = "model";

/// Common interface for kind-specific finish logic.
pub trait TaskFinisher: Send + Sync {
    fn finish(&self, task: &Task) -> Result<Artifacts>;
}

impl TaskKind {
    pub fn finisher(&self) -> &'static dyn TaskFinisher {
        match self {
            TaskKind::Alg | TaskKind::ConcatAlg => &AlignmentFinisher {
                record_as: ALIGNMENT,
            },
            TaskKind::AlgCleaner => &AlignmentFinisher {
                record_as: CLEAN_ALIGNMENT,
            },
            TaskKind::Tree | TaskKind::TreeMerger => &TreeFinisher,
            TaskKind::ModelChooser => &ModelFinisher,
            TaskKind::Msf | TaskKind::CogSelector | TaskKind::Other => &DeclaredOutputs,
        }
    }

    /// Run the finish logic of this task's kind.
    pub fn finish(&self, task: &Task) -> Result<Artifacts> {
        self.finisher().finish(task)
    }
}

/// Alignment stages: the output must be a FASTA file with at least one
/// non-empty record.
struct AlignmentFinisher {
    record_as: &'static str,
}

impl TaskFinisher for AlignmentFinisher {
    fn finish(&self, task: &Task) -> Result<Artifacts> {
        let path = declared_output(task, self.record_as)
            .or_else(|_| declared_output(task, ALIGNMENT))?;
        let text = read_output(task, &path)?;
        let records = count_fasta_records(&text)
            .map_err(|msg| SchedError::task(&task.id, format!("{}: {msg}", path.display())))?;
        info!(task = %task.id, records, "alignment stored");

        let mut artifacts = Artifacts::new();
        artifacts.insert(self.record_as.to_string(), path);
        Ok(artifacts)
    }
}

/// Tree stages: the output must look like a Newick tree.
struct TreeFinisher;

impl TaskFinisher for TreeFinisher {
    fn finish(&self, task: &Task) -> Result<Artifacts> {
        let path = declared_output(task, TREE)?;
        let text = read_output(task, &path)?;
        if !looks_like_newick(&text) {
            return Err(SchedError::task(
                &task.id,
                format!("{} does not contain a newick tree", path.display()),
            ));
        }
        debug!(task = %task.id, path = %path.display(), "tree stored");

        let mut artifacts = Artifacts::new();
        artifacts.insert(TREE.to_string(), path);
        Ok(artifacts)
    }
}

/// Model selection: the first non-empty line of the output names the model.
struct ModelFinisher;

impl TaskFinisher for ModelFinisher {
    fn finish(&self, task: &Task) -> Result<Artifacts> {
        let path = declared_output(task, MODEL)?;
        let text = read_output(task, &path)?;
        let model = text
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| {
                SchedError::task(&task.id, format!("{} names no model", path.display()))
            })?;
        info!(task = %task.id, model, "model selected");

        let mut artifacts = Artifacts::new();
        artifacts.insert(MODEL.to_string(), path);
        Ok(artifacts)
    }
}

/// Everything else: keep whichever declared outputs were produced.
struct DeclaredOutputs;

impl TaskFinisher for DeclaredOutputs {
    fn finish(&self, task: &Task) -> Result<Artifacts> {
        Ok(task
            .outputs
            .iter()
            .filter(|(_, path)| path.is_file())
            .map(|(name, path)| (name.clone(), path.clone()))
            .collect())
    }
}

fn declared_output(task: &Task, name: &str) -> Result<PathBuf> {
    task.outputs.get(name).cloned().ok_or_else(|| {
        SchedError::task(
            &task.id,
            format!("{} task declares no '{name}' output", task.kind),
        )
    })
}

fn read_output(task: &Task, path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        SchedError::task(&task.id, format!("reading output {}: {e}", path.display()))
    })
}

/// Count FASTA records, rejecting empty files and empty sequences.
pub fn count_fasta_records(text: &str) -> std::result::Result<usize, String> {
    let mut records = 0usize;
    let mut current: Option<(String, usize)> = None;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(name) = line.strip_prefix('>') {
            if let Some((prev, 0)) = current.take() {
                return Err(format!("record '{prev}' has no sequence"));
            }
            records += 1;
            current = Some((name.trim().to_string(), 0));
        } else {
            match current.as_mut() {
                Some((_, len)) => *len += line.len(),
                None => return Err("sequence data before the first header".to_string()),
            }
        }
    }

    match current {
        None => Err("no FASTA records".to_string()),
        Some((name, 0)) => Err(format!("record '{name}' has no sequence")),
        Some(_) => Ok(records),
    }
}

pub fn looks_like_newick(text: &str) -> bool {
    let t = text.trim();
    t.starts_with('(') && t.ends_with(';')
}
