// tests/config_validation.rs

use std::error::Error;
use std::io::Write;
use std::time::Duration;

use nprsched::config::{ConfigOverrides, InputSpec, load_and_validate};
use nprsched::errors::SchedError;
use nprsched::task::TaskKind;
use nprsched::types::ExecutionMode;
use nprsched_test_utils::builders::{ConfigFileBuilder, JobTemplateBuilder, TaskTemplateBuilder};
use tempfile::NamedTempFile;

type TestResult = Result<(), Box<dyn Error>>;

fn load(toml: &str) -> Result<nprsched::config::ConfigFile, SchedError> {
    load_with(toml, &ConfigOverrides::default())
}

fn load_with(toml: &str, overrides: &ConfigOverrides) -> Result<nprsched::config::ConfigFile, SchedError> {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{toml}").unwrap();
    load_and_validate(file.path(), overrides)
}

const MINIMAL: &str = r#"
[config]
max_cores = 4
schedule_time = "1s"
execution = "detached"

[thread.og1]
root = "align"

[task.align]
kind = "alg"
size = 42
spawns = ["tree"]
outputs = { alignment = "{taskdir}/alg.fa" }

[[task.align.job]]
name = "clustalo"
cmd = "clustalo -i seqs.fa -o {taskdir}/alg.fa --threads {cores}"
cores = 2
inputs = { "seqs.fa" = "inline:>a\nAC\n" }

[task.tree]
kind = "tree"
outputs = { tree = "{taskdir}/tree.nw" }

[[task.tree.job]]
name = "fasttree"
cmd = "fasttree {taskdir}/alg.fa > {taskdir}/tree.nw"
"#;

#[test]
fn minimal_config_loads_with_defaults() -> TestResult {
    let cfg = load(MINIMAL)?;
    assert_eq!(cfg.config.max_cores, 4);
    assert_eq!(cfg.config.execution, ExecutionMode::Detached);
    assert_eq!(cfg.timing.schedule_time, Duration::from_secs(1));
    assert_eq!(cfg.timing.submit_time, Duration::from_millis(200));
    assert_eq!(cfg.config.max_iters, 1);
    assert_eq!(cfg.task["align"].kind, TaskKind::Alg);
    assert_eq!(cfg.task["align"].jobs[0].cores, 2);
    assert_eq!(cfg.task["tree"].jobs[0].cores, 1);
    assert_eq!(cfg.thread_outpath("og1"), std::path::PathBuf::from("npr_out/og1"));
    assert!(cfg.report_interval.is_none());
    Ok(())
}

#[test]
fn overrides_take_precedence() -> TestResult {
    let overrides = ConfigOverrides {
        max_cores: Some(8),
        execution: Some(ExecutionMode::Local),
        no_render: true,
    };
    let cfg = load_with(&format!("{MINIMAL}\n"), &overrides)?;
    assert_eq!(cfg.config.max_cores, 8);
    assert_eq!(cfg.config.execution, ExecutionMode::Local);
    assert!(cfg.config.render_cmd.is_none());
    Ok(())
}

#[test]
fn unknown_root_is_a_config_error() {
    let toml = MINIMAL.replace(r#"root = "align""#, r#"root = "nope""#);
    match load(&toml) {
        Err(SchedError::Config(msg)) => assert!(msg.contains("unknown root task 'nope'")),
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn job_asking_for_too_many_cores_is_rejected() {
    let toml = MINIMAL.replace("cores = 2", "cores = 16");
    match load(&toml) {
        Err(SchedError::InsufficientCores { job, requested, total }) => {
            assert_eq!(job, "align.clustalo");
            assert_eq!(requested, 16);
            assert_eq!(total, 4);
        }
        other => panic!("expected InsufficientCores, got {other:?}"),
    }
}

#[test]
fn bad_duration_is_reported_with_its_field() {
    let toml = MINIMAL.replace(r#"schedule_time = "1s""#, r#"schedule_time = "soon""#);
    match load(&toml) {
        Err(SchedError::Config(msg)) => assert!(msg.contains("schedule_time")),
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn unknown_execution_mode_fails_to_parse() {
    let toml = MINIMAL.replace(r#"execution = "detached""#, r#"execution = "cloud""#);
    assert!(matches!(load(&toml), Err(SchedError::Toml(_))));
}

#[test]
fn spawn_cycles_are_rejected_except_through_tree_merges() {
    let job = || JobTemplateBuilder::new("run", "true").build();

    let looping = ConfigFileBuilder::new()
        .with_thread("t", "a")
        .with_task("a", TaskTemplateBuilder::new(TaskKind::Alg).spawns("b").job(job()).build())
        .with_task("b", TaskTemplateBuilder::new(TaskKind::Tree).spawns("a").job(job()).build())
        .try_build();
    assert!(matches!(looping, Err(SchedError::SpawnCycle(_))));

    let npr = ConfigFileBuilder::new()
        .with_thread("t", "a")
        .with_task("a", TaskTemplateBuilder::new(TaskKind::Alg).spawns("m").job(job()).build())
        .with_task("m", TaskTemplateBuilder::new(TaskKind::TreeMerger).spawns("a").job(job()).build())
        .try_build();
    assert!(npr.is_ok(), "{npr:?}");
}

#[test]
fn job_dependencies_are_checked() {
    let deps_on = |dep: &str| {
        ConfigFileBuilder::new()
            .with_thread("t", "a")
            .with_task(
                "a",
                TaskTemplateBuilder::new(TaskKind::Other)
                    .job(JobTemplateBuilder::new("one", "true").after("two").build())
                    .job(JobTemplateBuilder::new("two", "true").after(dep).build())
                    .build(),
            )
            .try_build()
    };

    // one -> two -> one
    assert!(matches!(deps_on("one"), Err(SchedError::Config(msg)) if msg.contains("cycle")));
    assert!(matches!(deps_on("ghost"), Err(SchedError::Config(msg)) if msg.contains("unknown dependency")));
    assert!(matches!(deps_on("two"), Err(SchedError::Config(msg)) if msg.contains("itself")));
}

#[test]
fn empty_and_zero_values_are_rejected() {
    let no_jobs = ConfigFileBuilder::new()
        .with_thread("t", "a")
        .with_task("a", TaskTemplateBuilder::new(TaskKind::Other).build())
        .try_build();
    assert!(matches!(no_jobs, Err(SchedError::Config(_))));

    let no_threads = ConfigFileBuilder::new()
        .with_task("a", TaskTemplateBuilder::new(TaskKind::Other).job(JobTemplateBuilder::new("j", "true").build()).build())
        .try_build();
    assert!(matches!(no_threads, Err(SchedError::Config(_))));

    let zero_cores = ConfigFileBuilder::new()
        .with_thread("t", "a")
        .with_task("a", TaskTemplateBuilder::new(TaskKind::Other).job(JobTemplateBuilder::new("j", "true").cores(0).build()).build())
        .try_build();
    assert!(matches!(zero_cores, Err(SchedError::Config(_))));
}

#[test]
fn input_descriptors() {
    assert_eq!(InputSpec::parse("file:a/b.fa"), Ok(InputSpec::File("a/b.fa".into())));
    assert_eq!(InputSpec::parse("plain.fa"), Ok(InputSpec::File("plain.fa".into())));
    assert_eq!(InputSpec::parse("artifact:alignment"), Ok(InputSpec::Artifact("alignment".into())));
    assert_eq!(InputSpec::parse("inline:"), Ok(InputSpec::Inline(String::new())));
    assert!(InputSpec::parse("artifact:").is_err());
    assert!(InputSpec::parse("").is_err());
}

#[test]
fn sge_ack_pattern_needs_a_capture_group() {
    let toml = format!("{MINIMAL}\n[sge]\nack_pattern = 'submitted'\n");
    assert!(matches!(load(&toml), Err(SchedError::Config(msg)) if msg.contains("capture group")));
}
