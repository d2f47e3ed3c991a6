use crate::*;

use gantry_core::EnvVar;
use gantry_services::backend::{BatchSubmission, ResourceType};

fn only_submission(h: &Harness) -> BatchSubmission {
    let subs = h.memory.batch.submissions();
    assert_eq!(subs.len(), 1, "expected exactly one submission");
    subs[0].1.clone()
}

/// Custom GPU resources land verbatim in the submission.
#[tokio::test]
async fn test_gpu_job_with_custom_resources() {
    let h = harness(&GantryConfig::default());
    let raw = br#"{"trigger_type":"batch_job","data":{"script_key":"jobs/train.py","vcpus":16,"memory":65536,"gpus":4},"metadata":{"user":"x"}}"#;

    let report = h.services.dispatcher.dispatch(raw).await.unwrap();
    assert_eq!((report.submitted, report.dead_lettered), (1, 0));

    let sub = only_submission(&h);
    assert_eq!(sub.job_queue, "ml-gpu-job-queue");
    assert_eq!(sub.job_definition, "ml-python-job");
    assert_eq!(sub.requirement(ResourceType::Vcpu), Some(16));
    assert_eq!(sub.requirement(ResourceType::Memory), Some(65536));
    assert_eq!(sub.requirement(ResourceType::Gpu), Some(4));
    assert_eq!(sub.env("TRIGGER_USER"), Some("x"));
    assert_eq!(sub.env("COMPUTE_TYPE"), Some("gpu"));
    assert_eq!(sub.env("INPUT_KEY"), Some("jobs/train.py"));
    assert!(sub.job_name.starts_with("train-"));
}

/// CPU jobs go to the CPU queue with CPU defaults and no GPU requirement.
#[tokio::test]
async fn test_cpu_job_defaults() {
    let h = harness(&GantryConfig::default());
    let raw = br#"{"trigger_type":"batch_job","data":{"script_key":"jobs/cpu.py","compute_type":"cpu"}}"#;

    h.services.dispatcher.dispatch(raw).await.unwrap();

    let sub = only_submission(&h);
    assert_eq!(sub.job_queue, "ml-cpu-job-queue");
    assert_eq!(sub.job_definition, "ml-python-cpu-job");
    assert_eq!(sub.requirement(ResourceType::Vcpu), Some(2));
    assert_eq!(sub.requirement(ResourceType::Memory), Some(4096));
    assert_eq!(sub.requirement(ResourceType::Gpu), None);
    assert_eq!(sub.env("TRIGGER_USER"), Some("unknown"));
}

#[tokio::test]
async fn test_cpu_job_ignores_gpu_override() {
    let h = harness(&GantryConfig::default());
    let raw = br#"{"trigger_type":"batch_job","data":{"script_key":"jobs/cpu.py","compute_type":"cpu","gpus":4}}"#;

    h.services.dispatcher.dispatch(raw).await.unwrap();
    assert_eq!(only_submission(&h).requirement(ResourceType::Gpu), None);
}

#[tokio::test]
async fn test_gpu_is_default_compute() {
    let h = harness(&GantryConfig::default());
    let raw = br#"{"trigger_type":"batch_job","data":{"script_key":"jobs/train.py"}}"#;

    h.services.dispatcher.dispatch(raw).await.unwrap();

    let sub = only_submission(&h);
    assert_eq!(sub.requirement(ResourceType::Gpu), Some(1));
    assert_eq!(sub.timeout.map(|t| t.attempt_duration_seconds), Some(3600));
}

/// Extra env, args, and the output prefix reach the container.
#[tokio::test]
async fn test_environment_contract() {
    let h = harness(&GantryConfig::default());
    let raw = br#"{
        "trigger_type": "batch_job",
        "data": {
            "script_key": "jobs/train.py",
            "job_name": "nightly",
            "timeout": 0,
            "additional_env": {"EPOCHS": "10"},
            "args": {"lr": 0.001}
        },
        "metadata": {"user": "ana", "project": "vision", "experiment": "exp-7"}
    }"#;

    h.services.dispatcher.dispatch(raw).await.unwrap();

    let sub = only_submission(&h);
    assert_eq!(sub.job_name, "nightly");
    assert!(sub.timeout.is_none());
    assert_eq!(sub.env("INPUT_BUCKET"), Some("ml-input"));
    assert_eq!(sub.env("OUTPUT_BUCKET"), Some("ml-output"));
    assert_eq!(sub.env("TRIGGER_PROJECT"), Some("vision"));
    assert_eq!(sub.env("TRIGGER_EXPERIMENT"), Some("exp-7"));
    assert_eq!(sub.env("EPOCHS"), Some("10"));
    assert_eq!(sub.env("JOB_ARGS"), Some(r#"{"lr":0.001}"#));

    let prefix = sub.env("OUTPUT_PREFIX").unwrap();
    assert!(prefix.starts_with("results/"));
    assert!(prefix.ends_with("/nightly/"));

    let env = &sub.container_overrides.environment;
    assert_eq!(env.first(), Some(&EnvVar::new("INPUT_BUCKET", "ml-input")));
    assert_eq!(env.last().map(|e| e.name.as_str()), Some("JOB_ARGS"));
}

/// An upload-notification batch turns into one job per uploaded object.
#[tokio::test]
async fn test_object_upload_batch() {
    let mut config = GantryConfig::default();
    config.batch.notebook_job_definition = "ml-notebook-job".to_string();
    let h = harness(&config);

    let raw = serde_json::to_vec(&serde_json::json!({
        "Records": [
            {"s3": {"bucket": {"name": "uploads"}, "object": {"key": "scripts/prep+data.py", "size": 10}}},
            {"s3": {"bucket": {"name": "uploads"}, "object": {"key": "nb/explore.ipynb", "size": 20}}}
        ]
    }))
    .unwrap();

    let report = h.services.dispatcher.dispatch(&raw).await.unwrap();
    assert_eq!(report.submitted, 2);

    let subs = h.memory.batch.submissions();
    assert_eq!(subs[0].1.env("INPUT_BUCKET"), Some("uploads"));
    assert_eq!(subs[0].1.env("INPUT_KEY"), Some("scripts/prep data.py"));
    assert_eq!(subs[0].1.job_definition, "ml-python-job");
    assert!(subs[0].1.job_name.starts_with("prep-data-"));
    assert_eq!(subs[1].1.job_definition, "ml-notebook-job");
}

/// Pub/sub wrapped triggers are unwrapped before dispatch.
#[tokio::test]
async fn test_pubsub_envelope() {
    let h = harness(&GantryConfig::default());
    let message = r#"{"trigger_type":"batch_job","data":{"script_key":"jobs/a.py"}}"#;
    let raw = serde_json::to_vec(&serde_json::json!({
        "Records": [{"Sns": {"MessageId": "m-1", "Message": message}}]
    }))
    .unwrap();

    let report = h.services.dispatcher.dispatch(&raw).await.unwrap();
    assert_eq!(report.submitted, 1);
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["outcomes"][0]["status"], "submitted");
    assert_eq!(json["outcomes"][0]["message_id"], "m-1");
}

#[tokio::test]
async fn test_duplicates_submitted_without_dedup() {
    let h = harness(&GantryConfig::default());
    let raw = br#"{"trigger_type":"batch_job","data":{"script_key":"jobs/train.py"}}"#;

    h.services.dispatcher.dispatch(raw).await.unwrap();
    h.services.dispatcher.dispatch(raw).await.unwrap();
    assert_eq!(h.memory.batch.submission_count(), 2);
}

#[tokio::test]
async fn test_dedup_suppresses_redelivery() {
    let mut config = GantryConfig::default();
    config.dedup.enabled = true;
    let h = harness(&config);
    let raw = br#"{"trigger_type":"batch_job","data":{"script_key":"jobs/train.py"}}"#;

    h.services.dispatcher.dispatch(raw).await.unwrap();
    let second = h.services.dispatcher.dispatch(raw).await.unwrap();

    assert_eq!(second.duplicates, 1);
    assert_eq!(h.memory.batch.submission_count(), 1);
    assert!(h.memory.dead_letters.is_empty());
}
