// tests/static_policy.rs

use std::error::Error;

use nprsched::config::ConfigFile;
use nprsched::context::RunContext;
use nprsched::errors::SchedError;
use nprsched::job::ArtifactSource;
use nprsched::policy::{StaticPolicy, WorkflowPolicy};
use nprsched::task::TaskKind;
use nprsched::task::finish::ALIGNMENT;
use nprsched_test_utils::builders::{ConfigFileBuilder, JobTemplateBuilder, TaskTemplateBuilder};

type TestResult = Result<(), Box<dyn Error>>;

fn npr_config(max_iters: u32) -> ConfigFile {
    ConfigFileBuilder::new()
        .max_cores(4)
        .max_iters(max_iters)
        .output_dir(std::path::Path::new("/data/out"))
        .with_thread("og1", "align")
        .with_task(
            "align",
            TaskTemplateBuilder::new(TaskKind::Alg)
                .size(30)
                .spawns("merge")
                .output("alignment", "{taskdir}/alg.fa")
                .job(
                    JobTemplateBuilder::new("mafft", "mafft --thread {cores} in.fa > {taskdir}/alg.fa # {thread} {iter} {jobdir}")
                        .cores(2)
                        .input("in.fa", "file:{outpath}/seqs.fa")
                        .build(),
                )
                .job(JobTemplateBuilder::new("check", "test -s {taskdir}/alg.fa").after("mafft").build())
                .build(),
        )
        .with_task(
            "merge",
            TaskTemplateBuilder::new(TaskKind::TreeMerger)
                .spawns("align")
                .job(
                    JobTemplateBuilder::new("merge", "merge alg.fa")
                        .input("alg.fa", "artifact:alignment")
                        .build(),
                )
                .build(),
        )
        .build()
}

#[test]
fn seed_expands_templates() -> TestResult {
    let cfg = npr_config(1);
    let mut ctx = RunContext::from_config(&cfg);
    let mut policy = StaticPolicy::from_config(&cfg);

    let seeds = policy.seed(&mut ctx)?;
    assert_eq!(seeds.len(), 1);
    let task = &seeds[0];
    assert_eq!(task.id, "og1.align.1");
    assert_eq!(task.kind, TaskKind::Alg);
    assert_eq!(task.size, 30);
    assert_eq!(task.target, "og1");
    assert_eq!(task.dir, std::path::Path::new("/data/out/og1/tasks/og1.align.1"));
    assert_eq!(
        task.outputs[ALIGNMENT],
        std::path::Path::new("/data/out/og1/tasks/og1.align.1/alg.fa")
    );

    let mafft = task.job("og1.align.1.mafft").expect("mafft job");
    assert_eq!(mafft.cores, 2);
    assert_eq!(
        mafft.command,
        "mafft --thread 2 in.fa > /data/out/og1/tasks/og1.align.1/alg.fa # og1 0 /data/out/og1/tasks/og1.align.1/mafft"
    );
    assert_eq!(
        mafft.inputs[0].source,
        ArtifactSource::File("/data/out/og1/seqs.fa".into())
    );

    let check = task.job("og1.align.1.check").expect("check job");
    assert!(check.deps.contains("og1.align.1.mafft"));
    Ok(())
}

#[test]
fn artifact_inputs_need_a_recorded_artifact() -> TestResult {
    let cfg = npr_config(1);
    let mut ctx = RunContext::from_config(&cfg);
    let policy = StaticPolicy::from_config(&cfg);

    match policy.instantiate(&mut ctx, "og1", "merge") {
        Err(err @ SchedError::Task { .. }) => {
            assert!(!err.is_fatal());
            assert!(err.to_string().contains("alignment"));
        }
        other => panic!("expected task error, got {other:?}"),
    }

    let mut arts = nprsched::task::Artifacts::new();
    arts.insert(ALIGNMENT.to_string(), "/data/out/og1/alg.fa".into());
    ctx.record_artifacts("og1", &arts);
    let merge = policy.instantiate(&mut ctx, "og1", "merge")?;
    assert_eq!(
        merge.jobs[0].inputs[0].source,
        ArtifactSource::File("/data/out/og1/alg.fa".into())
    );
    Ok(())
}

#[test]
fn tree_merges_are_bounded_by_max_iters() -> TestResult {
    let cfg = npr_config(2);
    let mut ctx = RunContext::from_config(&cfg);
    let mut policy = StaticPolicy::from_config(&cfg);
    let mut arts = nprsched::task::Artifacts::new();
    arts.insert(ALIGNMENT.to_string(), "/data/out/og1/alg.fa".into());
    ctx.record_artifacts("og1", &arts);

    let align = policy.seed(&mut ctx)?.remove(0);
    let next = policy.process_task(&mut ctx, &align, "og1")?;
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].kind, TaskKind::TreeMerger);

    // First merge: iteration 1 of 2, another round starts.
    let again = policy.process_task(&mut ctx, &next[0], "og1")?;
    assert_eq!(ctx.thread("og1").map(|t| t.iteration), Some(1));
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].kind, TaskKind::Alg);

    // Second merge: bound reached.
    let merge2 = policy.instantiate(&mut ctx, "og1", "merge")?;
    let done = policy.process_task(&mut ctx, &merge2, "og1")?;
    assert!(done.is_empty());
    assert_eq!(ctx.thread("og1").map(|t| t.iteration), Some(2));
    assert!(!ctx.can_iterate("og1"));
    Ok(())
}
