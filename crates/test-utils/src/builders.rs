#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use nprsched::config::{
    ConfigFile, ConfigSection, JobTemplate, NotifySection, RawConfigFile, SgeSection, TaskTemplate,
    ThreadConfig,
};
use nprsched::errors::Result;
use nprsched::job::Job;
use nprsched::task::{Task, TaskKind};

/// Builder for `ConfigFile` to simplify test setup.
///
/// Timings default to a few milliseconds so runs finish quickly.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        let mut section = ConfigSection::default();
        section.schedule_time = "20ms".to_string();
        section.submit_time = "10ms".to_string();
        section.launch_time = "10ms".to_string();
        Self {
            config: RawConfigFile {
                config: section,
                notify: NotifySection::default(),
                sge: SgeSection::default(),
                thread: BTreeMap::new(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn max_cores(mut self, n: u32) -> Self {
        self.config.config.max_cores = n;
        self
    }

    pub fn max_iters(mut self, n: u32) -> Self {
        self.config.config.max_iters = n;
        self
    }

    pub fn output_dir(mut self, dir: &Path) -> Self {
        self.config.config.output_dir = dir.to_path_buf();
        self
    }

    pub fn render_cmd(mut self, cmd: &str) -> Self {
        self.config.config.render_cmd = Some(cmd.to_string());
        self
    }

    pub fn with_thread(mut self, id: &str, root: &str) -> Self {
        self.config.thread.insert(
            id.to_string(),
            ThreadConfig {
                root: root.to_string(),
                name: None,
                outpath: None,
                target: None,
            },
        );
        self
    }

    pub fn with_task(mut self, name: &str, task: TaskTemplate) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskTemplate`.
pub struct TaskTemplateBuilder {
    task: TaskTemplate,
}

impl TaskTemplateBuilder {
    pub fn new(kind: TaskKind) -> Self {
        Self {
            task: TaskTemplate {
                kind,
                size: 0,
                spawns: vec![],
                outputs: BTreeMap::new(),
                jobs: vec![],
            },
        }
    }

    pub fn size(mut self, size: u64) -> Self {
        self.task.size = size;
        self
    }

    pub fn spawns(mut self, template: &str) -> Self {
        self.task.spawns.push(template.to_string());
        self
    }

    pub fn output(mut self, name: &str, path: &str) -> Self {
        self.task.outputs.insert(name.to_string(), path.to_string());
        self
    }

    pub fn job(mut self, job: JobTemplate) -> Self {
        self.task.jobs.push(job);
        self
    }

    pub fn build(self) -> TaskTemplate {
        self.task
    }
}

/// Builder for `JobTemplate`.
pub struct JobTemplateBuilder {
    job: JobTemplate,
}

impl JobTemplateBuilder {
    pub fn new(name: &str, cmd: &str) -> Self {
        Self {
            job: JobTemplate {
                name: name.to_string(),
                cmd: cmd.to_string(),
                cores: 1,
                after: vec![],
                inputs: BTreeMap::new(),
            },
        }
    }

    pub fn cores(mut self, n: u32) -> Self {
        self.job.cores = n;
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.job.after.push(dep.to_string());
        self
    }

    pub fn input(mut self, file: &str, descriptor: &str) -> Self {
        self.job.inputs.insert(file.to_string(), descriptor.to_string());
        self
    }

    pub fn build(self) -> JobTemplate {
        self.job
    }
}

/// A task with one job per `(name, cores)` pair, ids `<task>.<name>`.
pub fn task_with_jobs(
    id: &str,
    thread: &str,
    kind: TaskKind,
    dir: &Path,
    jobs: &[(&str, u32)],
) -> Task {
    let mut task = Task::new(id, thread, kind, dir);
    for (name, cores) in jobs {
        task = task.with_job(job(&format!("{id}.{name}"), name, *cores, &dir.join(name)));
    }
    task
}

pub fn job(id: &str, name: &str, cores: u32, workdir: &Path) -> Job {
    Job::new(id, name, "true", cores, PathBuf::from(workdir))
}
