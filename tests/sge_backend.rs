// tests/sge_backend.rs

use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::Path;

use nprsched::backend::sge::{DEFAULT_ACK_PATTERN, render_array_script, parse_submit_ack};
use nprsched::backend::{ExecutionBackend, Launched, SgeBackend};
use nprsched::config::SgeSection;
use nprsched::errors::SchedError;
use nprsched::job::JobSubmission;
use regex::Regex;
use tempfile::tempdir;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn array_script_runs_one_line_per_task_index() {
    let mut directives = BTreeMap::new();
    directives.insert("-pe".to_string(), "smp 2".to_string());
    directives.insert("-q".to_string(), "long".to_string());

    let script = render_array_script(
        &directives,
        Path::new("/work/sge"),
        Path::new("/work/sge/batch.cmds"),
        3,
        "SGE_TASK_ID",
    );

    let expected = "#!/bin/sh\n\
#$ -pe smp 2\n\
#$ -q long\n\
#$ -o /work/sge\n\
#$ -e /work/sge\n\
#$ -N NPR3jobs\n\
#$ -t 1-3\n\
SEEDFILE=/work/sge/batch.cmds\n\
sh -c \"`cat $SEEDFILE | head -n $SGE_TASK_ID | tail -n 1`\"\n";
    assert_eq!(script, expected);
}

#[test]
fn acknowledgement_yields_job_id() {
    let ack = Regex::new(DEFAULT_ACK_PATTERN).unwrap();
    let out = "Your job-array 81234.1-5:1 (\"NPR5jobs\") has been submitted\n";
    assert_eq!(parse_submit_ack(&ack, out).unwrap(), "81234");

    match parse_submit_ack(&ack, "qsub: Unable to run job: denied") {
        Err(SchedError::Submission(msg)) => assert!(msg.contains("denied")),
        other => panic!("expected submission error, got {other:?}"),
    }
}

fn sub(dir: &Path, id: &str, cores: u32) -> JobSubmission {
    JobSubmission {
        job_id: id.to_string(),
        cores,
        command: format!("echo {id}"),
        status_file: dir.join(id).join("__status__"),
    }
}

/// Write a fake `qsub` that prints `ack` and records its argument.
fn fake_qsub(dir: &Path, ack: &str) -> Result<String, Box<dyn Error>> {
    let path = dir.join("fake-qsub");
    fs::write(
        &path,
        format!(
            "#!/bin/sh\necho \"$1 $SGE_CELL\" >> {}\nprintf '%s\\n' '{ack}'\n",
            dir.join("qsub.calls").display()
        ),
    )?;
    Ok(format!("sh {}", path.display()))
}

#[tokio::test]
async fn jobs_are_grouped_by_cores_into_array_submissions() -> TestResult {
    let dir = tempdir()?;
    let cfg = SgeSection {
        cell: "mycell".to_string(),
        submit_cmd: fake_qsub(dir.path(), "Your job-array 77.1-2:1 (\"NPR2jobs\") has been submitted")?,
        work_dir: dir.path().join("sge"),
        ..SgeSection::default()
    };
    let mut backend = SgeBackend::new(cfg)?;

    let outcomes = backend
        .launch(vec![
            sub(dir.path(), "a", 1),
            sub(dir.path(), "b", 2),
            sub(dir.path(), "c", 1),
        ])
        .await;

    assert_eq!(outcomes.len(), 3);
    for outcome in &outcomes {
        match &outcome.result {
            Ok(Launched::Remote { remote_id }) => assert_eq!(remote_id, "77"),
            other => panic!("unexpected outcome for {}: {other:?}", outcome.job_id),
        }
    }

    let calls = fs::read_to_string(dir.path().join("qsub.calls"))?;
    let calls: Vec<&str> = calls.lines().collect();
    assert_eq!(calls.len(), 2, "one submission per core count");
    assert!(calls.iter().all(|c| c.ends_with(" mycell")));

    let mut cmds: Vec<String> = fs::read_dir(dir.path().join("sge"))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|x| x == "cmds"))
        .map(|p| fs::read_to_string(p).unwrap())
        .collect();
    cmds.sort();
    assert_eq!(cmds, vec!["echo a\necho c\n".to_string(), "echo b\n".to_string()]);
    Ok(())
}

#[tokio::test]
async fn unparseable_acknowledgement_fails_the_whole_group() -> TestResult {
    let dir = tempdir()?;
    let cfg = SgeSection {
        submit_cmd: fake_qsub(dir.path(), "something went wrong")?,
        work_dir: dir.path().join("sge"),
        ..SgeSection::default()
    };
    let mut backend = SgeBackend::new(cfg)?;

    let outcomes = backend
        .launch(vec![sub(dir.path(), "a", 1), sub(dir.path(), "b", 1)])
        .await;
    assert_eq!(outcomes.len(), 2);
    assert!(
        outcomes
            .iter()
            .all(|o| matches!(o.result, Err(SchedError::Submission(_))))
    );
    Ok(())
}
