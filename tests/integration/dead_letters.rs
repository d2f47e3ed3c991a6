use crate::*;

use gantry_core::{DispatchError, ErrorKind, EventSource, PayloadEncoding, Severity};

/// Missing script_key: one dead letter, no submission.
#[tokio::test]
async fn test_missing_script_key() {
    let h = harness(&GantryConfig::default());
    let raw = br#"{"trigger_type":"batch_job","data":{"compute_type":"cpu"}}"#;

    let report = h.services.dispatcher.dispatch(raw).await.unwrap();
    assert_eq!(report.dead_lettered, 1);
    assert_eq!(h.memory.batch.submission_count(), 0);

    let entries = h.memory.dead_letters.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].error_kind, ErrorKind::MalformedInput);
    assert_eq!(entries[0].source, EventSource::Trigger);
    assert_eq!(entries[0].original_payload.as_bytes(), &raw[..]);
}

#[tokio::test]
async fn test_unknown_trigger_type() {
    let h = harness(&GantryConfig::default());
    let raw = br#"{"trigger_type":"model_evaluation","data":{"model":"m"}}"#;

    h.services.dispatcher.dispatch(raw).await.unwrap();

    let entries = h.memory.dead_letters.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].error_kind, ErrorKind::UnknownTriggerType);
    assert!(entries[0].error_reason.contains("batch_job"));
    assert_eq!(h.memory.batch.submission_count(), 0);
}

#[tokio::test]
async fn test_invalid_resources_rejected_before_submission() {
    let h = harness(&GantryConfig::default());
    let raw = br#"{"trigger_type":"batch_job","data":{"script_key":"a.py","memory":64}}"#;

    h.services.dispatcher.dispatch(raw).await.unwrap();

    let entries = h.memory.dead_letters.entries();
    assert_eq!(entries[0].error_kind, ErrorKind::InvalidResourceSpec);
    assert_eq!(h.memory.batch.submission_count(), 0);
}

#[tokio::test]
async fn test_garbage_payload_preserved() {
    let h = harness(&GantryConfig::default());
    let raw = b"definitely { not json";

    let report = h.services.dispatcher.dispatch(raw).await.unwrap();
    assert_eq!(report.dead_lettered, 1);
    assert_eq!(h.memory.dead_letters.entries()[0].original_payload, "definitely { not json");
}

#[tokio::test]
async fn test_binary_payload_preserved_exactly() {
    let h = harness(&GantryConfig::default());
    let raw = b"\xff\xfe";

    h.services.dispatcher.dispatch(raw).await.unwrap();

    let entries = h.memory.dead_letters.entries();
    assert_eq!(entries[0].payload_encoding, PayloadEncoding::Base64);
    assert_eq!(entries[0].original_payload, "//4=");
    assert_eq!(entries[0].payload_bytes().unwrap(), raw.to_vec());
}

/// Backend rejection: dead letter with the backend's reason plus an error
/// notification.
#[tokio::test]
async fn test_backend_failure_dead_lettered_and_notified() {
    let h = harness(&notifying_config());
    h.memory.batch.set_rejection(Some("quota exceeded"));
    let raw = br#"{"trigger_type":"batch_job","data":{"script_key":"jobs/train.py"}}"#;

    let report = h.services.dispatcher.dispatch(raw).await.unwrap();
    assert_eq!((report.submitted, report.dead_lettered), (0, 1));

    let entries = h.memory.dead_letters.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].error_kind, ErrorKind::BackendSubmissionFailure);
    assert!(entries[0].error_reason.contains("quota exceeded"));
    assert_eq!(entries[0].original_payload.as_bytes(), &raw[..]);

    let published = h.memory.notifier.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].severity, Severity::Error);
    assert!(published[0].body.contains("quota exceeded"));
}

#[tokio::test]
async fn test_validation_failure_notifies_when_enabled() {
    let h = harness(&notifying_config());
    h.services.dispatcher.dispatch(br#"{"data":{}}"#).await.unwrap();

    let published = h.memory.notifier.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].subject, "ML Trigger Validation Error");
}

#[tokio::test]
async fn test_notification_failure_does_not_fail_invocation() {
    let h = harness(&notifying_config());
    h.memory.notifier.set_failing(true);

    let report = h.services.dispatcher.dispatch(br#"{"trigger_type":"nope"}"#).await.unwrap();
    assert_eq!(report.dead_lettered, 1);
    assert_eq!(h.memory.dead_letters.len(), 1);
}

/// A lost dead letter is the one failure the source must see.
#[tokio::test]
async fn test_dead_letter_write_failure_fails_invocation() {
    let h = harness(&GantryConfig::default());
    h.memory.dead_letters.set_failing(true);

    let err = h
        .services
        .dispatcher
        .dispatch(br#"{"trigger_type":"nope"}"#)
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::DeadLetterWrite(_)));
    assert_eq!(h.memory.batch.submission_count(), 0);
}
