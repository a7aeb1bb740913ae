// src/backend/sge.rs

//! Grid Engine batch-array submission.
//!
//! Jobs that need the same resources are grouped, their commands written one
//! per line into a command list, and a single array job is submitted whose
//! task `i` runs line `i`. The submission is acknowledged on stdout; the
//! numeric job id is parsed out of that acknowledgement.

use std::collections::BTreeMap;
use std::fs;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;

use regex::Regex;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::backend::{ExecutionBackend, LaunchOutcome, Launched};
use crate::config::SgeSection;
use crate::errors::{Result, SchedError};
use crate::job::{JobSubmission, shell_quote};

/// Acknowledgement printed by `qsub` for an array job.
pub const DEFAULT_ACK_PATTERN: &str =
    r#"Your job-array (\d+)\.\d+-\d+:\d+ \("[^"]*"\) has been submitted"#;

/// Directives shared by every job of one submission.
pub type Directives = BTreeMap<String, String>;

pub struct SgeBackend {
    cfg: SgeSection,
    ack: Regex,
    batch_seq: u64,
}

impl SgeBackend {
    pub fn new(cfg: SgeSection) -> Result<Self> {
        let pattern = cfg.ack_pattern.as_deref().unwrap_or(DEFAULT_ACK_PATTERN);
        let ack = Regex::new(pattern)
            .map_err(|e| SchedError::Config(format!("[sge].ack_pattern: {e}")))?;
        Ok(Self {
            cfg,
            ack,
            batch_seq: 0,
        })
    }

    /// Directives for a job: the configured ones plus its core request.
    fn directives_for(&self, job: &JobSubmission) -> Directives {
        let mut d = self.cfg.directives.clone();
        d.insert("-pe".to_string(), format!("smp {}", job.cores));
        d
    }

    async fn submit_group(&mut self, directives: &Directives, jobs: &[JobSubmission]) -> Result<String> {
        self.batch_seq += 1;
        let stem = format!(
            "npr_{}_{}_{}_jobs",
            std::process::id(),
            self.batch_seq,
            jobs.len()
        );
        fs::create_dir_all(&self.cfg.work_dir)?;
        let cmds_file = self.cfg.work_dir.join(format!("{stem}.cmds"));
        let script_file = self.cfg.work_dir.join(format!("{stem}.qsub"));

        let mut lines = String::new();
        for job in jobs {
            lines.push_str(&single_line(&job.command));
            lines.push('\n');
        }
        fs::write(&cmds_file, lines)?;

        let script = render_array_script(
            directives,
            &self.cfg.work_dir,
            &cmds_file,
            jobs.len(),
            &self.cfg.task_index_var,
        );
        fs::write(&script_file, script)?;

        let submit = format!(
            "{} {}",
            self.cfg.submit_cmd,
            shell_quote(&script_file.to_string_lossy())
        );
        debug!(cmd = %submit, cell = %self.cfg.cell, "submitting batch array");

        let output = Command::new("sh")
            .arg("-c")
            .arg(&submit)
            .env("SGE_CELL", &self.cfg.cell)
            .stdin(Stdio::null())
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(SchedError::Submission(format!(
                "`{submit}` exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        parse_submit_ack(&self.ack, &stdout)
    }
}

/// Collapse a command onto one line so it fits the command list format.
fn single_line(cmd: &str) -> String {
    cmd.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Render the array job script for `n` commands stored in `cmds_file`.
pub fn render_array_script(
    directives: &Directives,
    log_dir: &Path,
    cmds_file: &Path,
    n: usize,
    task_index_var: &str,
) -> String {
    let mut script = String::from("#!/bin/sh\n");
    for (key, value) in directives {
        script.push_str(&format!("#$ {key} {value}\n"));
    }
    script.push_str(&format!("#$ -o {}\n", log_dir.display()));
    script.push_str(&format!("#$ -e {}\n", log_dir.display()));
    script.push_str(&format!("#$ -N NPR{n}jobs\n"));
    script.push_str(&format!("#$ -t 1-{n}\n"));
    script.push_str(&format!("SEEDFILE={}\n", cmds_file.display()));
    script.push_str(&format!(
        "sh -c \"`cat $SEEDFILE | head -n ${task_index_var} | tail -n 1`\"\n"
    ));
    script
}

/// Extract the batch job id from a submission acknowledgement.
pub fn parse_submit_ack(ack: &Regex, stdout: &str) -> Result<String> {
    ack.captures(stdout)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            SchedError::Submission(format!(
                "unrecognised submission acknowledgement: {:?}",
                stdout.trim()
            ))
        })
}

impl ExecutionBackend for SgeBackend {
    fn name(&self) -> &'static str {
        "sge"
    }

    fn launch(
        &mut self,
        jobs: Vec<JobSubmission>,
    ) -> Pin<Box<dyn Future<Output = Vec<LaunchOutcome>> + Send + '_>> {
        Box::pin(async move {
            let mut groups: BTreeMap<Directives, Vec<JobSubmission>> = BTreeMap::new();
            for job in jobs {
                groups.entry(self.directives_for(&job)).or_default().push(job);
            }

            let mut outcomes = Vec::new();
            for (directives, group) in groups {
                match self.submit_group(&directives, &group).await {
                    Ok(remote_id) => {
                        info!(remote_id = %remote_id, jobs = group.len(), "batch array submitted");
                        outcomes.extend(group.into_iter().map(|job| {
                            LaunchOutcome::new(
                                job.job_id,
                                Ok(Launched::Remote {
                                    remote_id: remote_id.clone(),
                                }),
                            )
                        }));
                    }
                    Err(e) => {
                        error!(error = %e, jobs = group.len(), "batch array submission failed");
                        let message = e.to_string();
                        outcomes.extend(group.into_iter().map(|job| {
                            LaunchOutcome::new(job.job_id, Err(SchedError::Submission(message.clone())))
                        }));
                    }
                }
            }
            outcomes
        })
    }
}

