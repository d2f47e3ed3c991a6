use crate::*;

use gantry_core::{ErrorKind, Severity};
use gantry_services::MonitorOutcome;

#[tokio::test]
async fn test_failed_job_notification() {
    let h = harness(&GantryConfig::default());
    let raw = job_state("job-9", "train-20250101-000000", "FAILED", Some("Essential container in task exited"));

    let outcome = h.services.monitor.handle(&raw).await.unwrap();
    assert!(matches!(outcome, MonitorOutcome::Notified { severity: Severity::Error, .. }));

    let published = h.memory.notifier.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].subject, "ML Job Failed: train-20250101-000000");
    assert!(published[0].body.contains("Essential container in task exited"));
    assert!(published[0].body.contains("Duration: 42.00 seconds"));
    assert!(h.memory.dead_letters.is_empty());
}

#[tokio::test]
async fn test_non_terminal_states_are_ignored() {
    let h = harness(&GantryConfig::default());
    for status in ["SUBMITTED", "PENDING", "RUNNABLE", "STARTING", "RUNNING"] {
        let outcome = h.services.monitor.handle(&job_state("j", "n", status, None)).await.unwrap();
        assert!(matches!(outcome, MonitorOutcome::Ignored { .. }), "{status}");
    }
    assert!(h.memory.notifier.published().is_empty());
    assert!(h.memory.dead_letters.is_empty());
}

/// Submit through the dispatcher, then complete the job: the success note
/// points at the prefix the container was given.
#[tokio::test]
async fn test_submitted_job_completes() {
    let h = harness(&GantryConfig::default());
    h.services
        .dispatcher
        .dispatch(br#"{"trigger_type":"batch_job","data":{"script_key":"jobs/train.py"}}"#)
        .await
        .unwrap();

    let (job_id, sub) = h.memory.batch.submissions().remove(0);
    let outcome = h
        .services
        .monitor
        .handle(&job_state(&job_id, &sub.job_name, "SUCCEEDED", None))
        .await
        .unwrap();
    assert!(matches!(outcome, MonitorOutcome::Notified { severity: Severity::Info, .. }));

    let published = h.memory.notifier.published();
    let expected = format!("s3://ml-output/{}", sub.env("OUTPUT_PREFIX").unwrap());
    assert!(published[0].body.contains(&expected), "{}", published[0].body);
}

#[tokio::test]
async fn test_publish_failure_dead_lettered() {
    let h = harness(&GantryConfig::default());
    h.memory.notifier.set_failing(true);

    let outcome = h
        .services
        .monitor
        .handle(&job_state("j", "n", "SUCCEEDED", None))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        MonitorOutcome::DeadLettered { error_kind: ErrorKind::PublishFailure, .. }
    ));
    assert_eq!(h.memory.dead_letters.len(), 1);
}

#[tokio::test]
async fn test_bare_detail_accepted() {
    let h = harness(&GantryConfig::default());
    let raw = br#"{"jobId":"j","jobName":"n","status":"FAILED"}"#;

    h.services.monitor.handle(raw).await.unwrap();
    let published = h.memory.notifier.published();
    assert!(published[0].body.contains("No reason provided"));
}

#[tokio::test]
async fn test_finished_job_summary_written() {
    let h = harness(&GantryConfig::default());
    h.services
        .monitor
        .handle(&job_state("job-9", "train-20250101-000000", "SUCCEEDED", None))
        .await
        .unwrap();
    h.services
        .monitor
        .handle(&job_state("job-10", "train-20250101-000000", "RUNNING", None))
        .await
        .unwrap();

    let stored = h.memory.summaries.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].bucket, "ml-output");
    assert_eq!(stored[0].summary.status, "SUCCEEDED");
    assert_eq!(stored[0].key, stored[0].summary.object_key());
    assert!(stored[0].key.ends_with("/train-20250101-000000-job-9.json"));
}
