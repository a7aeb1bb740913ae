// src/policy/static_policy.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::config::model::{ConfigFile, InputSpec, TaskTemplate, ThreadConfig};
use crate::context::RunContext;
use crate::errors::{Result, SchedError};
use crate::job::{ArtifactSource, InputArtifact, Job};
use crate::policy::WorkflowPolicy;
use crate::policy::template::expand;
use crate::task::Task;

/// Policy driven by the `[thread.*]` and `[task.*]` sections of the config.
///
/// A finished task spawns one task per entry of its template's `spawns`.
/// Finishing a tree-merge task completes one NPR iteration; once a thread has
/// used up `max_iters` iterations its merges spawn nothing.
#[derive(Debug, Clone)]
pub struct StaticPolicy {
    templates: BTreeMap<String, TaskTemplate>,
    threads: BTreeMap<String, ThreadConfig>,
}

impl StaticPolicy {
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self {
            templates: cfg.task.clone(),
            threads: cfg.thread.clone(),
        }
    }

    /// Build a new task of `template_name` for a thread.
    pub fn instantiate(
        &self,
        ctx: &mut RunContext,
        thread_id: &str,
        template_name: &str,
    ) -> Result<Task> {
        let template = self.templates.get(template_name).ok_or_else(|| {
            SchedError::Config(format!("unknown task template '{template_name}'"))
        })?;
        let seq = ctx.next_task_seq();
        let thread = ctx.thread(thread_id).ok_or_else(|| {
            SchedError::Config(format!("unknown thread '{thread_id}'"))
        })?;

        let task_id = format!("{thread_id}.{template_name}.{seq}");
        let taskdir = thread.outpath.join("tasks").join(&task_id);
        let target = self
            .threads
            .get(thread_id)
            .and_then(|t| t.target.clone())
            .unwrap_or_else(|| thread_id.to_string());

        let mut vars: BTreeMap<&str, String> = BTreeMap::new();
        vars.insert("thread", thread_id.to_string());
        vars.insert("taskdir", taskdir.display().to_string());
        vars.insert("outpath", thread.outpath.display().to_string());
        vars.insert("iter", thread.iteration.to_string());

        let mut task = Task::new(task_id.clone(), thread_id, template.kind, taskdir.clone())
            .with_template(template_name)
            .with_target(target)
            .with_size(template.size);

        for (name, path) in template.outputs.iter() {
            task.outputs
                .insert(name.clone(), PathBuf::from(expand(path, &vars)));
        }

        for jt in template.jobs.iter() {
            let jobdir = taskdir.join(&jt.name);
            let mut job_vars = vars.clone();
            job_vars.insert("jobdir", jobdir.display().to_string());
            job_vars.insert("cores", jt.cores.to_string());

            let mut job = Job::new(
                format!("{task_id}.{}", jt.name),
                jt.name.clone(),
                expand(&jt.cmd, &job_vars),
                jt.cores,
                jobdir,
            );
            for dep in jt.after.iter() {
                job = job.with_dep(format!("{task_id}.{dep}"));
            }
            for (file, descriptor) in jt.inputs.iter() {
                let spec = InputSpec::parse(descriptor)
                    .map_err(|e| SchedError::task(&task_id, format!("input '{file}': {e}")))?;
                let source = match spec {
                    InputSpec::File(path) => {
                        ArtifactSource::File(PathBuf::from(expand(&path.to_string_lossy(), &job_vars)))
                    }
                    InputSpec::Inline(text) => ArtifactSource::Inline(text),
                    InputSpec::Artifact(name) => match thread.artifact(&name) {
                        Some(path) => ArtifactSource::File(path.to_path_buf()),
                        None => {
                            return Err(SchedError::task(
                                &task_id,
                                format!("input '{file}' needs artifact '{name}', which thread '{thread_id}' has not produced"),
                            ));
                        }
                    },
                };
                job = job.with_input(InputArtifact::new(file.clone(), source));
            }
            task.jobs.push(job);
        }

        debug!(task = %task, jobs = task.jobs.len(), "task created");
        Ok(task)
    }
}

impl WorkflowPolicy for StaticPolicy {
    fn seed(&mut self, ctx: &mut RunContext) -> Result<Vec<Task>> {
        let roots: Vec<(String, String)> = self
            .threads
            .iter()
            .map(|(id, t)| (id.clone(), t.root.clone()))
            .collect();

        roots
            .iter()
            .map(|(thread, root)| self.instantiate(ctx, thread, root))
            .collect()
    }

    fn process_task(
        &mut self,
        ctx: &mut RunContext,
        task: &Task,
        target: &str,
    ) -> Result<Vec<Task>> {
        if task.kind.ends_iteration() {
            let iteration = match ctx.thread_mut(&task.thread) {
                Some(thread) => {
                    thread.iteration += 1;
                    thread.iteration
                }
                None => 0,
            };
            if !ctx.can_iterate(&task.thread) {
                info!(
                    thread = %task.thread,
                    target,
                    iteration,
                    "maximum number of iterations reached; no further refinement"
                );
                return Ok(Vec::new());
            }
            debug!(thread = %task.thread, iteration, "starting next NPR iteration");
        }

        let spawns = match self.templates.get(&task.template) {
            Some(template) => template.spawns.clone(),
            None => return Ok(Vec::new()),
        };

        spawns
            .iter()
            .map(|name| self.instantiate(ctx, &task.thread, name))
            .collect()
    }
}
