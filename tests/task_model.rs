// tests/task_model.rs

use std::error::Error;
use std::fs;
use std::path::Path;

use nprsched::job::{Job, JobStatus};
use nprsched::task::finish::{ALIGNMENT, CLEAN_ALIGNMENT, MODEL, TREE, count_fasta_records, looks_like_newick};
use nprsched::task::{Task, TaskKind, TaskStatus, sort_for_check};
use nprsched_test_utils::builders::task_with_jobs;
use tempfile::tempdir;

type TestResult = Result<(), Box<dyn Error>>;

fn set(task: &mut Task, job: &str, path: &[JobStatus]) {
    let job = task.job_mut(job).expect("job exists");
    for st in path {
        assert!(job.advance(*st), "transition to {st} rejected");
    }
}

#[test]
fn task_status_aggregates_job_states() {
    use JobStatus::*;
    let dir = Path::new("/tmp/t");
    let mut task = task_with_jobs("t", "th", TaskKind::Alg, dir, &[("a", 1), ("b", 1)]);
    assert_eq!(task.status(), TaskStatus::Pending);

    set(&mut task, "t.a", &[Queued]);
    assert_eq!(task.status(), TaskStatus::Running);

    set(&mut task, "t.a", &[Running, Done]);
    assert_eq!(task.status(), TaskStatus::Running);

    set(&mut task, "t.b", &[Queued, Running, Done]);
    assert_eq!(task.status(), TaskStatus::Done);
}

#[test]
fn any_failed_job_fails_the_task() {
    use JobStatus::*;
    let mut task = task_with_jobs("t", "th", TaskKind::Tree, Path::new("/tmp/t"), &[("a", 1), ("b", 1)]);
    set(&mut task, "t.a", &[Queued, Running, Done]);
    set(&mut task, "t.b", &[Queued, Running, Lost]);
    assert_eq!(task.status(), TaskStatus::Error);
    assert_eq!(task.first_failure().map(|j| j.id.as_str()), Some("t.b"));
    assert_eq!(task.job_summary(), "1(D), 1(L)");
}

#[test]
fn ready_jobs_respect_dependencies() {
    use JobStatus::*;
    let dir = Path::new("/tmp/t");
    let mut task = Task::new("t", "th", TaskKind::Alg, dir)
        .with_job(Job::new("t.a", "a", "true", 1, dir.join("a")))
        .with_job(Job::new("t.b", "b", "true", 1, dir.join("b")).with_dep("t.a"))
        .with_job(Job::new("t.c", "c", "true", 1, dir.join("c")).with_dep("elsewhere.x"));

    assert_eq!(task.ready_jobs(), vec![0]);
    set(&mut task, "t.a", &[Queued, Running]);
    assert!(task.ready_jobs().is_empty());
    set(&mut task, "t.a", &[Done]);
    // `c` depends on a job outside the task and never becomes ready.
    assert_eq!(task.ready_jobs(), vec![1]);
}

#[test]
fn check_order_uses_priority_then_size_then_thread() {
    let d = Path::new("/tmp");
    let alg_small = Task::new("1", "t1", TaskKind::Alg, d).with_size(10);
    let alg_big = Task::new("2", "t1", TaskKind::Alg, d).with_size(500);
    let tree = Task::new("3", "t2", TaskKind::Tree, d).with_size(1);
    let merger = Task::new("4", "t9", TaskKind::TreeMerger, d);
    let other = Task::new("5", "t0", TaskKind::Other, d).with_size(10_000);
    let alg_same_b = Task::new("6", "tb", TaskKind::Alg, d).with_size(10);
    let alg_same_a = Task::new("7", "ta", TaskKind::Alg, d).with_size(10);

    let tasks = [alg_small, alg_big, tree, merger, other, alg_same_b, alg_same_a];
    let order: Vec<&str> = sort_for_check(tasks.iter()).iter().map(|t| t.id.as_str()).collect();
    assert_eq!(order, vec!["4", "3", "2", "1", "7", "6", "5"]);
}

#[test]
fn priority_table_matches_stage_kinds() {
    assert_eq!(TaskKind::TreeMerger.priority(), 1);
    assert_eq!(TaskKind::Tree.priority(), 2);
    assert_eq!(TaskKind::ModelChooser.priority(), 3);
    assert_eq!(TaskKind::Alg.priority(), 4);
    assert_eq!(TaskKind::ConcatAlg.priority(), 5);
    assert_eq!(TaskKind::AlgCleaner.priority(), 6);
    assert_eq!(TaskKind::Msf.priority(), 7);
    assert_eq!(TaskKind::CogSelector.priority(), 8);
    assert_eq!(TaskKind::Other.priority(), 100);

    assert_eq!("mchooser".parse::<TaskKind>(), Ok(TaskKind::ModelChooser));
    assert!("nonsense".parse::<TaskKind>().is_err());
}

#[test]
fn fasta_and_newick_checks() {
    assert_eq!(count_fasta_records(">a\nAC\nGT\n>b\nAAAA\n"), Ok(2));
    assert!(count_fasta_records("").is_err());
    assert!(count_fasta_records(">a\n>b\nAC\n").is_err());
    assert!(count_fasta_records("ACGT\n>a\nAC\n").is_err());

    assert!(looks_like_newick("((A,B),C);\n"));
    assert!(!looks_like_newick("(A,B)"));
    assert!(!looks_like_newick("not a tree;"));
}

#[test]
fn finish_records_artifacts_per_kind() -> TestResult {
    let dir = tempdir()?;
    let p = dir.path();
    fs::write(p.join("alg.fa"), ">a\nAC\n>b\nAG\n")?;
    fs::write(p.join("tree.nw"), "(a,b);\n")?;
    fs::write(p.join("model.txt"), "\nJTT\n")?;

    let alg = Task::new("alg", "t", TaskKind::Alg, p).with_output(ALIGNMENT, p.join("alg.fa"));
    let arts = alg.kind.finish(&alg)?;
    assert_eq!(arts.get(ALIGNMENT), Some(&p.join("alg.fa")));

    let clean = Task::new("cl", "t", TaskKind::AlgCleaner, p).with_output(ALIGNMENT, p.join("alg.fa"));
    let arts = clean.kind.finish(&clean)?;
    assert_eq!(arts.get(CLEAN_ALIGNMENT), Some(&p.join("alg.fa")));

    let tree = Task::new("tr", "t", TaskKind::Tree, p).with_output(TREE, p.join("tree.nw"));
    assert_eq!(tree.kind.finish(&tree)?.get(TREE), Some(&p.join("tree.nw")));

    let model = Task::new("m", "t", TaskKind::ModelChooser, p).with_output(MODEL, p.join("model.txt"));
    assert!(model.kind.finish(&model)?.contains_key(MODEL));

    let other = Task::new("o", "t", TaskKind::Other, p)
        .with_output("present", p.join("tree.nw"))
        .with_output("absent", p.join("missing.txt"));
    let arts = other.kind.finish(&other)?;
    assert!(arts.contains_key("present"));
    assert!(!arts.contains_key("absent"));
    Ok(())
}

#[test]
fn finish_rejects_bad_outputs() -> TestResult {
    let dir = tempdir()?;
    let p = dir.path();
    fs::write(p.join("tree.nw"), "garbage")?;

    let tree = Task::new("tr", "t", TaskKind::Tree, p).with_output(TREE, p.join("tree.nw"));
    let err = tree.kind.finish(&tree).unwrap_err();
    assert!(!err.is_fatal());

    let undeclared = Task::new("tr2", "t", TaskKind::Tree, p);
    assert!(undeclared.kind.finish(&undeclared).is_err());

    let missing = Task::new("a", "t", TaskKind::Alg, p).with_output(ALIGNMENT, p.join("nope.fa"));
    assert!(missing.kind.finish(&missing).is_err());
    Ok(())
}
