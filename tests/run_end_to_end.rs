// tests/run_end_to_end.rs

use std::error::Error;
use std::fs;

use nprsched::cli::CliArgs;
use nprsched::config::ConfigFile;
use nprsched::context::RunContext;
use nprsched::engine::{COMMAND_LOG, Finalizer, RunSummary, Scheduler, SchedulerCore, SchedulerOptions};
use nprsched::backend::LocalBackend;
use nprsched::launcher::spawn_launcher;
use nprsched::notify::{NotifyEvent, Reporter};
use nprsched::policy::{StaticPolicy, WorkflowPolicy};
use nprsched::task::TaskKind;
use nprsched_test_utils::builders::{ConfigFileBuilder, JobTemplateBuilder, TaskTemplateBuilder};
use nprsched_test_utils::fakes::RecordingNotifier;
use nprsched_test_utils::{init_tracing, with_timeout};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

type TestResult = Result<(), Box<dyn Error>>;

/// Two threads: `og1` runs align -> tree -> merge for two NPR iterations,
/// `og2` has a single job that always fails.
fn pipeline(out: &std::path::Path) -> ConfigFile {
    ConfigFileBuilder::new()
        .max_cores(2)
        .max_iters(2)
        .output_dir(out)
        .render_cmd("cp {tree} {image}")
        .with_thread("og1", "align")
        .with_thread("og2", "broken")
        .with_task(
            "align",
            TaskTemplateBuilder::new(TaskKind::Alg)
                .spawns("tree")
                .output("alignment", "{taskdir}/alg.fa")
                .job(
                    JobTemplateBuilder::new("align", "cp seqs.fa {taskdir}/alg.fa")
                        .input("seqs.fa", "inline:>a\nACGT\n>b\nACGA\n")
                        .build(),
                )
                .build(),
        )
        .with_task(
            "tree",
            TaskTemplateBuilder::new(TaskKind::Tree)
                .spawns("merge")
                .output("tree", "{taskdir}/tree.nw")
                .job(
                    JobTemplateBuilder::new("build", "test -s alg.fa && printf '(a,b);' > {taskdir}/tree.nw")
                        .cores(2)
                        .input("alg.fa", "artifact:alignment")
                        .build(),
                )
                .build(),
        )
        .with_task(
            "merge",
            TaskTemplateBuilder::new(TaskKind::TreeMerger)
                .spawns("align")
                .output("tree", "{taskdir}/merged.nw")
                .job(JobTemplateBuilder::new("merge", "printf '(b,a);' > {taskdir}/merged.nw").build())
                .build(),
        )
        .with_task(
            "broken",
            TaskTemplateBuilder::new(TaskKind::Other)
                .job(JobTemplateBuilder::new("fail", "echo oops >&2; exit 3").build())
                .build(),
        )
        .build()
}

async fn run_pipeline(cfg: &ConfigFile, notifier: RecordingNotifier) -> nprsched::errors::Result<RunSummary> {
    let mut ctx = RunContext::from_config(cfg);
    let mut policy = StaticPolicy::from_config(cfg);
    let seeds = policy.seed(&mut ctx)?;

    let launcher = spawn_launcher(
        Box::new(LocalBackend::new()),
        cfg.config.max_cores,
        cfg.timing.launch_time,
        CancellationToken::new(),
    );
    let mut core = SchedulerCore::new(cfg.config.max_cores);
    core.add_tasks(seeds);

    Scheduler::new(
        core,
        ctx,
        policy,
        launcher,
        Finalizer::from_config(&cfg.config),
        SchedulerOptions::from_config(cfg),
    )
    .with_reporter(Reporter::new(Some("me@example.org".into()), Box::new(notifier)))
    .run()
    .await
}

#[tokio::test]
async fn pipeline_runs_to_completion_and_writes_final_tree() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let cfg = pipeline(dir.path());
    let notifier = RecordingNotifier::new();

    let summary = with_timeout(run_pipeline(&cfg, notifier.clone())).await?;

    // Both threads finish; only og2 has errors.
    let mut finished = summary.finished_threads.clone();
    finished.sort();
    assert_eq!(finished, vec!["og1".to_string(), "og2".to_string()]);
    assert!(!summary.is_clean());
    assert!(!summary.errors.contains_key("og1"));
    let og2 = &summary.errors["og2"];
    assert_eq!(og2.len(), 1, "only the job failure: {og2:?}");
    assert!(og2[0].job.as_deref().is_some_and(|j| j.ends_with(".fail")));

    // Final artifacts of og1.
    let out = dir.path().join("og1");
    assert_eq!(fs::read_to_string(out.join("result.final_tree.nw"))?.trim(), "(b,a);");
    assert_eq!(
        fs::read_to_string(out.join("result.final_tree.nwx"))?.trim(),
        "(b,a)[&&NHX:name=og1:iterations=2];"
    );
    assert_eq!(fs::read_to_string(out.join("result.final_tree.fa"))?, ">a\nACGT\n>b\nACGA\n");
    assert!(out.join("result.final_tree.png").is_file());
    assert!(!out.join("result.final_tree.trimmed.fa").exists());

    // Two iterations of three single-job tasks.
    let log = fs::read_to_string(out.join(COMMAND_LOG))?;
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 6);
    let first: Vec<&str> = lines[0].split('\t').collect();
    assert_eq!(first[0], "align");
    assert_eq!(first[1], "og1.align.1");
    assert_eq!(first[2], "align");
    assert_eq!(first[3], "og1.align.1.align");
    assert!(first[4].contains("cp seqs.fa"));

    let subjects = notifier.subjects();
    assert_eq!(subjects.first().map(String::as_str), Some(NotifyEvent::RunStarted.subject()));
    assert_eq!(subjects.last().map(String::as_str), Some(NotifyEvent::RunFinished.subject()));
    assert!(subjects.iter().any(|s| s == NotifyEvent::ErrorsFound.subject()));
    Ok(())
}

#[tokio::test]
async fn dry_run_executes_nothing() -> TestResult {
    let dir = tempdir()?;
    let config = dir.path().join("Nprsched.toml");
    fs::write(
        &config,
        format!(
            r#"
[config]
output_dir = "{}"

[thread.t]
root = "a"

[task.a]
kind = "other"

[[task.a.job]]
name = "j"
cmd = "touch should-not-exist"
"#,
            dir.path().join("out").display()
        ),
    )?;

    let args = CliArgs {
        config,
        log_level: None,
        dry_run: true,
        max_cores: None,
        execution: None,
        no_render: false,
        interactive: false,
        debug_task: None,
    };
    let summary = nprsched::run(args, None).await?;
    assert!(summary.is_clean());
    assert_eq!(summary.cycles, 0);
    assert!(!dir.path().join("out").exists());
    Ok(())
}
