// tests/launcher.rs

use std::collections::BTreeMap;
use std::error::Error;
use std::path::Path;
use std::time::Duration;

use nprsched::backend::LocalBackend;
use nprsched::job::{Job, JobReport, JobStatus, JobSubmission, read_marker, write_marker};
use nprsched::launcher::{LauncherHandle, spawn_launcher};
use nprsched_test_utils::fakes::{Scripted, ScriptedBackend, launched_ids};
use nprsched_test_utils::{init_tracing, with_timeout};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

type TestResult = Result<(), Box<dyn Error>>;

const POLL: Duration = Duration::from_millis(10);

fn submission(dir: &Path, name: &str, cmd: &str, cores: u32) -> JobSubmission {
    Job::new(name, name, cmd, cores, dir.join(name)).submission()
}

/// Wait until every id in `ids` has a terminal report; returns the last
/// report per job.
async fn wait_terminal(handle: &mut LauncherHandle, ids: &[&str]) -> BTreeMap<String, JobReport> {
    let mut last: BTreeMap<String, JobReport> = BTreeMap::new();
    while !ids
        .iter()
        .all(|id| last.get(*id).is_some_and(|r| r.status.is_terminal()))
    {
        let report = handle.next_report().await.expect("launcher stopped early");
        last.insert(report.job_id.clone(), report);
    }
    last
}

async fn wait_running(handle: &mut LauncherHandle, id: &str) {
    loop {
        let report = handle.next_report().await.expect("launcher stopped early");
        if report.job_id == id && report.status == JobStatus::Running {
            return;
        }
    }
}

#[tokio::test]
async fn local_jobs_end_done_error_or_lost() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let mut handle = spawn_launcher(Box::new(LocalBackend::new()), 4, POLL, CancellationToken::new());

    handle.submit(submission(dir.path(), "ok", "echo fine", 1)).await?;
    handle.submit(submission(dir.path(), "fails", "exit 1", 1)).await?;
    handle.submit(submission(dir.path(), "dies", "kill -9 $$", 1)).await?;

    let reports = with_timeout(wait_terminal(&mut handle, &["ok", "fails", "dies"])).await;
    assert_eq!(reports["ok"].status, JobStatus::Done);
    assert_eq!(reports["fails"].status, JobStatus::Error);
    assert_eq!(reports["dies"].status, JobStatus::Lost);

    assert_eq!(read_marker(&dir.path().join("ok/__status__")), Some(JobStatus::Done));
    assert_eq!(read_marker(&dir.path().join("fails/__status__")), Some(JobStatus::Error));
    assert_eq!(read_marker(&dir.path().join("dies/__status__")), Some(JobStatus::Lost));
    assert_eq!(std::fs::read_to_string(dir.path().join("ok/stdout.log"))?, "fine\n");

    with_timeout(handle.close()).await;
    Ok(())
}

#[tokio::test]
async fn shutdown_terminates_running_jobs() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let mut handle = spawn_launcher(Box::new(LocalBackend::new()), 2, POLL, CancellationToken::new());

    handle.submit(submission(dir.path(), "slow", "sleep 30", 1)).await?;
    with_timeout(wait_running(&mut handle, "slow")).await;

    let reports = with_timeout(handle.shutdown()).await;
    let slow = reports
        .iter()
        .find(|r| r.job_id == "slow")
        .expect("shutdown report for the running job");
    assert_eq!(slow.status, JobStatus::Error);
    assert_eq!(slow.message.as_deref(), Some("terminated on shutdown"));
    assert_eq!(read_marker(&dir.path().join("slow/__status__")), Some(JobStatus::Error));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn shutdown_reports_jobs_that_already_finished() -> TestResult {
    let dir = tempdir()?;
    let backend = ScriptedBackend::new().on("quick", Scripted::Hang);
    let mut handle = spawn_launcher(Box::new(backend), 2, POLL, CancellationToken::new());

    handle.submit(submission(dir.path(), "quick", "true", 1)).await?;
    wait_running(&mut handle, "quick").await;

    // Finishes after the last poll but before shutdown.
    let marker = dir.path().join("quick/__status__");
    write_marker(&marker, JobStatus::Done)?;

    let reports = handle.shutdown().await;
    let quick = reports
        .iter()
        .find(|r| r.job_id == "quick")
        .expect("report for the finished job");
    assert_eq!(quick.status, JobStatus::Done);
    assert!(quick.message.is_none());
    assert_eq!(read_marker(&marker), Some(JobStatus::Done));
    Ok(())
}

#[tokio::test]
async fn cores_budget_limits_concurrent_launches() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let backend = ScriptedBackend::new().on("first", Scripted::Hang).on("second", Scripted::Hang);
    let batches = backend.batches();
    let mut handle = spawn_launcher(Box::new(backend), 3, POLL, CancellationToken::new());

    handle.submit(submission(dir.path(), "first", "true", 2)).await?;
    handle.submit(submission(dir.path(), "second", "true", 2)).await?;
    with_timeout(wait_running(&mut handle, "first")).await;
    tokio::time::sleep(POLL * 5).await;
    assert_eq!(launched_ids(&batches), vec!["first".to_string()]);

    let reports = with_timeout(handle.shutdown()).await;
    let second = reports
        .iter()
        .find(|r| r.job_id == "second")
        .expect("report for the queued job");
    assert_eq!(second.status, JobStatus::Error);
    Ok(())
}

#[tokio::test]
async fn launch_failure_and_duplicates() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let backend = ScriptedBackend::new().on("broken", Scripted::FailLaunch("no such queue".into()));
    let batches = backend.batches();
    let mut handle = spawn_launcher(Box::new(backend), 2, POLL, CancellationToken::new());

    handle.submit(submission(dir.path(), "broken", "true", 1)).await?;
    handle.submit(submission(dir.path(), "twice", "true", 1)).await?;
    handle.submit(submission(dir.path(), "twice", "true", 1)).await?;

    let reports = with_timeout(wait_terminal(&mut handle, &["broken", "twice"])).await;
    assert_eq!(reports["broken"].status, JobStatus::Error);
    assert!(reports["broken"].message.as_deref().is_some_and(|m| m.contains("no such queue")));
    assert_eq!(read_marker(&dir.path().join("broken/__status__")), Some(JobStatus::Error));
    assert_eq!(reports["twice"].status, JobStatus::Done);

    with_timeout(handle.close()).await;
    let launched = launched_ids(&batches);
    assert_eq!(launched.iter().filter(|id| *id == "twice").count(), 1);
    Ok(())
}

#[tokio::test]
async fn external_cancel_runs_shutdown() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let cancel = CancellationToken::new();
    let backend = ScriptedBackend::new().on("stuck", Scripted::Hang);
    let mut handle = spawn_launcher(Box::new(backend), 1, POLL, cancel.clone());

    handle.submit(submission(dir.path(), "stuck", "true", 1)).await?;
    with_timeout(wait_running(&mut handle, "stuck")).await;

    cancel.cancel();
    let reports = with_timeout(wait_terminal(&mut handle, &["stuck"])).await;
    assert_eq!(reports["stuck"].status, JobStatus::Error);
    assert_eq!(read_marker(&dir.path().join("stuck/__status__")), Some(JobStatus::Error));
    Ok(())
}
