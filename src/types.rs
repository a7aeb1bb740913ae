// src/types.rs

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// How admitted jobs are turned into running processes.
///
/// Selected once per run from `[config].execution` (or `--execution`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Child process of the launcher; the launcher keeps a handle for
    /// liveness checks.
    #[default]
    Local,
    /// Fire-and-forget process that outlives the launcher. Liveness is only
    /// known through the status marker.
    Detached,
    /// Grouped batch-array submission to an SGE queue.
    Sge,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Local => "local",
            ExecutionMode::Detached => "detached",
            ExecutionMode::Sge => "sge",
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "insitu" => Ok(ExecutionMode::Local),
            "detached" => Ok(ExecutionMode::Detached),
            "sge" => Ok(ExecutionMode::Sge),
            other => Err(format!(
                "invalid execution mode: {other} (expected \"local\", \"detached\" or \"sge\")"
            )),
        }
    }
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
