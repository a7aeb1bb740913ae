// src/task/kind.rs

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Closed set of pipeline stage kinds.
///
/// The kind decides the check priority of a task and which finish logic runs
/// when it is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    #[serde(rename = "treemerger")]
    TreeMerger,
    Tree,
    #[serde(rename = "mchooser")]
    ModelChooser,
    Alg,
    ConcatAlg,
    #[serde(rename = "acleaner")]
    AlgCleaner,
    Msf,
    CogSelector,
    Other,
}

/// Check priority per kind; lower is checked first.
const PRIORITY: &[(TaskKind, u32)] = &[
    (TaskKind::TreeMerger, 1),
    (TaskKind::Tree, 2),
    (TaskKind::ModelChooser, 3),
    (TaskKind::Alg, 4),
    (TaskKind::ConcatAlg, 5),
    (TaskKind::AlgCleaner, 6),
    (TaskKind::Msf, 7),
    (TaskKind::CogSelector, 8),
];

const UNRANKED_PRIORITY: u32 = 100;

impl TaskKind {
    pub const ALL: [TaskKind; 9] = [
        TaskKind::TreeMerger,
        TaskKind::Tree,
        TaskKind::ModelChooser,
        TaskKind::Alg,
        TaskKind::ConcatAlg,
        TaskKind::AlgCleaner,
        TaskKind::Msf,
        TaskKind::CogSelector,
        TaskKind::Other,
    ];

    pub fn priority(&self) -> u32 {
        PRIORITY
            .iter()
            .find(|(kind, _)| kind == self)
            .map(|(_, prio)| *prio)
            .unwrap_or(UNRANKED_PRIORITY)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::TreeMerger => "treemerger",
            TaskKind::Tree => "tree",
            TaskKind::ModelChooser => "mchooser",
            TaskKind::Alg => "alg",
            TaskKind::ConcatAlg => "concat_alg",
            TaskKind::AlgCleaner => "acleaner",
            TaskKind::Msf => "msf",
            TaskKind::CogSelector => "cog_selector",
            TaskKind::Other => "other",
        }
    }

    /// Whether finishing a task of this kind counts as one NPR iteration.
    pub fn ends_iteration(&self) -> bool {
        matches!(self, TaskKind::TreeMerger)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        TaskKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| format!("unknown task kind: {s}"))
    }
}
