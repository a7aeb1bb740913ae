// src/config/validate.rs

use std::collections::HashSet;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use regex::Regex;

use crate::config::model::{ConfigFile, InputSpec, RawConfigFile, TaskTemplate, Timing};
use crate::errors::{Result, SchedError};
use crate::task::TaskKind;
use crate::types::parse_duration;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = SchedError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let (timing, report_interval) = validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw, timing, report_interval))
    }
}

fn validate_raw_config(
    cfg: &RawConfigFile,
) -> Result<(Timing, Option<std::time::Duration>)> {
    ensure_has_threads_and_tasks(cfg)?;
    let timing = validate_global_config(cfg)?;
    let report_interval = validate_notify(cfg)?;
    validate_sge(cfg)?;
    validate_threads(cfg)?;
    for (name, template) in cfg.task.iter() {
        validate_template(cfg, name, template)?;
    }
    validate_spawn_graph(cfg)?;
    Ok((timing, report_interval))
}

fn config_err(msg: impl Into<String>) -> SchedError {
    SchedError::Config(msg.into())
}

fn ensure_has_threads_and_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.thread.is_empty() {
        return Err(config_err(
            "config must contain at least one [thread.<id>] section",
        ));
    }
    if cfg.task.is_empty() {
        return Err(config_err(
            "config must contain at least one [task.<name>] section",
        ));
    }
    Ok(())
}

fn duration_field(section: &str, field: &str, value: &str) -> Result<std::time::Duration> {
    parse_duration(value).map_err(|e| config_err(format!("[{section}].{field}: {e}")))
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<Timing> {
    let c = &cfg.config;
    if c.max_cores == 0 {
        return Err(config_err("[config].max_cores must be >= 1 (got 0)"));
    }
    if c.max_iters == 0 {
        return Err(config_err("[config].max_iters must be >= 1 (got 0)"));
    }
    if c.base_name.trim().is_empty() {
        return Err(config_err("[config].base_name must not be empty"));
    }

    Ok(Timing {
        schedule_time: duration_field("config", "schedule_time", &c.schedule_time)?,
        submit_time: duration_field("config", "submit_time", &c.submit_time)?,
        launch_time: duration_field("config", "launch_time", &c.launch_time)?,
    })
}

fn validate_notify(cfg: &RawConfigFile) -> Result<Option<std::time::Duration>> {
    cfg.notify
        .report_interval
        .as_deref()
        .map(|v| duration_field("notify", "report_interval", v))
        .transpose()
}

fn validate_sge(cfg: &RawConfigFile) -> Result<()> {
    if let Some(pattern) = &cfg.sge.ack_pattern {
        let re = Regex::new(pattern)
            .map_err(|e| config_err(format!("[sge].ack_pattern is not a valid regex: {e}")))?;
        if re.captures_len() < 2 {
            return Err(config_err(
                "[sge].ack_pattern needs a capture group for the job id",
            ));
        }
    }
    Ok(())
}

fn validate_threads(cfg: &RawConfigFile) -> Result<()> {
    for (id, thread) in cfg.thread.iter() {
        if !cfg.task.contains_key(&thread.root) {
            return Err(config_err(format!(
                "thread '{}' has unknown root task '{}'",
                id, thread.root
            )));
        }
    }
    Ok(())
}

fn validate_template(cfg: &RawConfigFile, name: &str, template: &TaskTemplate) -> Result<()> {
    for spawned in template.spawns.iter() {
        if !cfg.task.contains_key(spawned) {
            return Err(config_err(format!(
                "task '{}' spawns unknown task '{}'",
                name, spawned
            )));
        }
    }

    if template.jobs.is_empty() {
        return Err(config_err(format!(
            "task '{}' must define at least one [[task.{}.job]]",
            name, name
        )));
    }

    let mut seen = HashSet::new();
    for job in template.jobs.iter() {
        if !seen.insert(job.name.as_str()) {
            return Err(config_err(format!(
                "task '{}' defines job '{}' twice",
                name, job.name
            )));
        }
    }

    let max_cores = cfg.config.max_cores;
    for job in template.jobs.iter() {
        if job.cores == 0 {
            return Err(config_err(format!(
                "job '{}' of task '{}' must request at least one core",
                job.name, name
            )));
        }
        if job.cores > max_cores {
            return Err(SchedError::InsufficientCores {
                job: format!("{}.{}", name, job.name),
                requested: job.cores,
                total: max_cores,
            });
        }
        for dep in job.after.iter() {
            if dep == &job.name {
                return Err(config_err(format!(
                    "job '{}' of task '{}' cannot depend on itself",
                    job.name, name
                )));
            }
            if !seen.contains(dep.as_str()) {
                return Err(config_err(format!(
                    "job '{}' of task '{}' has unknown dependency '{}' in `after`",
                    job.name, name, dep
                )));
            }
        }
        for (file, descriptor) in job.inputs.iter() {
            InputSpec::parse(descriptor).map_err(|e| {
                config_err(format!(
                    "job '{}' of task '{}', input '{}': {}",
                    job.name, name, file, e
                ))
            })?;
        }
    }

    validate_job_graph(name, template)
}

fn validate_job_graph(name: &str, template: &TaskTemplate) -> Result<()> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for job in template.jobs.iter() {
        graph.add_node(job.name.as_str());
    }
    for job in template.jobs.iter() {
        for dep in job.after.iter() {
            graph.add_edge(dep.as_str(), job.name.as_str(), ());
        }
    }

    toposort(&graph, None).map(|_| ()).map_err(|cycle| {
        config_err(format!(
            "job dependencies of task '{}' form a cycle involving job '{}'",
            name,
            cycle.node_id()
        ))
    })
}

/// Spawn edges must be acyclic once tree-merge edges are ignored: only NPR
/// iterations may loop, and those are bounded by `max_iters`.
fn validate_spawn_graph(cfg: &RawConfigFile) -> Result<()> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }

    for (name, template) in cfg.task.iter() {
        if template.kind == TaskKind::TreeMerger {
            continue;
        }
        for spawned in template.spawns.iter() {
            graph.add_edge(name.as_str(), spawned.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(SchedError::SpawnCycle(format!(
            "cycle detected in spawn graph involving task '{}'",
            cycle.node_id()
        ))),
    }
}
