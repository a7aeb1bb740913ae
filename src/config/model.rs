// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::task::TaskKind;
use crate::types::ExecutionMode;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// max_cores = 4
/// execution = "local"
///
/// [thread.orthogroup1]
/// root = "align"
///
/// [task.align]
/// kind = "alg"
/// spawns = ["tree"]
/// outputs = { alignment = "{taskdir}/alg.fa" }
///
/// [[task.align.job]]
/// name = "clustalo"
/// cmd = "clustalo -i seqs.fa -o {taskdir}/alg.fa"
/// inputs = { "seqs.fa" = "file:data/seqs.fa" }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub notify: NotifySection,

    #[serde(default)]
    pub sge: SgeSection,

    /// Top-level runs, keyed by thread id.
    #[serde(default)]
    pub thread: BTreeMap<String, ThreadConfig>,

    /// Stage templates, keyed by template name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskTemplate>,
}

/// Validated configuration. Only obtainable through
/// `ConfigFile::try_from(RawConfigFile)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub timing: Timing,
    pub notify: NotifySection,
    pub report_interval: Option<Duration>,
    pub sge: SgeSection,
    pub thread: BTreeMap<String, ThreadConfig>,
    pub task: BTreeMap<String, TaskTemplate>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        raw: RawConfigFile,
        timing: Timing,
        report_interval: Option<Duration>,
    ) -> Self {
        Self {
            config: raw.config,
            timing,
            notify: raw.notify,
            report_interval,
            sge: raw.sge,
            thread: raw.thread,
            task: raw.task,
        }
    }

    /// Output directory of a thread.
    pub fn thread_outpath(&self, id: &str) -> PathBuf {
        self.thread
            .get(id)
            .and_then(|t| t.outpath.clone())
            .unwrap_or_else(|| self.config.output_dir.join(id))
    }
}

/// Parsed durations from `[config]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub schedule_time: Duration,
    pub submit_time: Duration,
    pub launch_time: Duration,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Total core budget of the background launcher.
    #[serde(default = "default_max_cores")]
    pub max_cores: u32,

    /// Sleep between scheduler cycles.
    #[serde(default = "default_schedule_time")]
    pub schedule_time: String,

    /// Shorter sleep used after a cycle that submitted jobs.
    #[serde(default = "default_submit_time")]
    pub submit_time: String,

    /// Launcher poll interval.
    #[serde(default = "default_launch_time")]
    pub launch_time: String,

    #[serde(default)]
    pub execution: ExecutionMode,

    /// Maximum NPR iterations per thread.
    #[serde(default = "default_max_iters")]
    pub max_iters: u32,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_base_name")]
    pub base_name: String,

    /// Optional command rendering the final tree; `{tree}` and `{image}`
    /// are substituted.
    #[serde(default)]
    pub render_cmd: Option<String>,
}

fn default_max_cores() -> u32 {
    1
}

fn default_schedule_time() -> String {
    "2s".to_string()
}

fn default_submit_time() -> String {
    "200ms".to_string()
}

fn default_launch_time() -> String {
    "500ms".to_string()
}

fn default_max_iters() -> u32 {
    1
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("npr_out")
}

fn default_base_name() -> String {
    "result".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            max_cores: default_max_cores(),
            schedule_time: default_schedule_time(),
            submit_time: default_submit_time(),
            launch_time: default_launch_time(),
            execution: ExecutionMode::default(),
            max_iters: default_max_iters(),
            output_dir: default_output_dir(),
            base_name: default_base_name(),
            render_cmd: None,
        }
    }
}

/// `[notify]` section. Without a recipient no notifications are sent.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct NotifySection {
    #[serde(default)]
    pub recipient: Option<String>,

    /// Command used to deliver a message; `{recipient}` and `{subject}` are
    /// substituted and the body is written to its stdin. Without a command
    /// messages are only logged.
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub report_interval: Option<String>,
}

/// `[sge]` section, used with `execution = "sge"`.
#[derive(Debug, Clone, Deserialize)]
pub struct SgeSection {
    #[serde(default = "default_sge_cell")]
    pub cell: String,

    #[serde(default = "default_submit_cmd")]
    pub submit_cmd: String,

    /// Where submission scripts, command lists and batch logs are written.
    #[serde(default = "default_sge_work_dir")]
    pub work_dir: PathBuf,

    /// Environment variable carrying the array task index.
    #[serde(default = "default_task_index_var")]
    pub task_index_var: String,

    /// Override for the acknowledgement regex; its first capture group must
    /// be the numeric job id.
    #[serde(default)]
    pub ack_pattern: Option<String>,

    /// Extra `#$ key value` directives.
    #[serde(default)]
    pub directives: BTreeMap<String, String>,
}

fn default_sge_cell() -> String {
    "default".to_string()
}

fn default_submit_cmd() -> String {
    "qsub".to_string()
}

fn default_sge_work_dir() -> PathBuf {
    PathBuf::from("sge")
}

fn default_task_index_var() -> String {
    "SGE_TASK_ID".to_string()
}

impl Default for SgeSection {
    fn default() -> Self {
        Self {
            cell: default_sge_cell(),
            submit_cmd: default_submit_cmd(),
            work_dir: default_sge_work_dir(),
            task_index_var: default_task_index_var(),
            ack_pattern: None,
            directives: BTreeMap::new(),
        }
    }
}

/// `[thread.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadConfig {
    /// Template of the seed task.
    pub root: String,

    /// Display name; defaults to the thread id.
    #[serde(default)]
    pub name: Option<String>,

    /// Output directory; defaults to `<output_dir>/<thread id>`.
    #[serde(default)]
    pub outpath: Option<PathBuf>,

    /// Workflow target name handed to the policy; defaults to the thread id.
    #[serde(default)]
    pub target: Option<String>,
}

/// `[task.<template>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskTemplate {
    pub kind: TaskKind,

    /// Problem size used as a check-order tie-break.
    #[serde(default)]
    pub size: u64,

    /// Templates instantiated when a task of this template is done.
    #[serde(default)]
    pub spawns: Vec<String>,

    /// Declared outputs (artifact name -> path template).
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,

    #[serde(default, rename = "job")]
    pub jobs: Vec<JobTemplate>,
}

/// `[[task.<template>.job]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct JobTemplate {
    pub name: String,

    /// Command template; `{taskdir}`, `{jobdir}`, `{thread}`, `{iter}`,
    /// `{outpath}`, `{cores}` are substituted.
    pub cmd: String,

    #[serde(default = "default_job_cores")]
    pub cores: u32,

    /// Sibling jobs that must be done first.
    #[serde(default)]
    pub after: Vec<String>,

    /// Input files (file name -> `file:<path>`, `artifact:<name>` or
    /// `inline:<text>`).
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
}

fn default_job_cores() -> u32 {
    1
}

/// Parsed form of an input descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSpec {
    File(PathBuf),
    /// Latest artifact of that name recorded in the thread.
    Artifact(String),
    Inline(String),
}

impl InputSpec {
    /// Parse `file:<path>`, `artifact:<name>` or `inline:<text>`. A value
    /// without a known prefix is a file path.
    pub fn parse(descriptor: &str) -> Result<InputSpec, String> {
        if let Some(path) = descriptor.strip_prefix("file:") {
            if path.is_empty() {
                return Err("empty path in 'file:' input".to_string());
            }
            Ok(InputSpec::File(PathBuf::from(path)))
        } else if let Some(name) = descriptor.strip_prefix("artifact:") {
            if name.is_empty() {
                return Err("empty name in 'artifact:' input".to_string());
            }
            Ok(InputSpec::Artifact(name.to_string()))
        } else if let Some(text) = descriptor.strip_prefix("inline:") {
            Ok(InputSpec::Inline(text.to_string()))
        } else if descriptor.is_empty() {
            Err("empty input descriptor".to_string())
        } else {
            Ok(InputSpec::File(PathBuf::from(descriptor)))
        }
    }
}
