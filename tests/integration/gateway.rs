//! HTTP collaborators against a stub gateway that records every request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::Router;

use gantry_core::config::BackendMode;
use gantry_services::backend::{BackendError, BatchBackend, HttpBatchBackend};
use gantry_services::{EventOutcome, MonitorOutcome};

use crate::*;

// ── Stub gateway ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Captured {
    method: Method,
    path: String,
    body: serde_json::Value,
}

#[derive(Default)]
struct Gateway {
    requests: Mutex<Vec<Captured>>,
    failing: AtomicBool,
}

impl Gateway {
    fn requests(&self) -> Vec<Captured> {
        self.requests.lock().unwrap().clone()
    }

    fn find(&self, method: Method, prefix: &str) -> Captured {
        self.requests()
            .into_iter()
            .find(|r| r.method == method && r.path.starts_with(prefix))
            .unwrap_or_else(|| panic!("no {method} {prefix}* in {:?}", self.requests()))
    }
}

async fn answer(
    State(gw): State<Arc<Gateway>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> (StatusCode, String) {
    let path = uri.path().to_string();
    gw.requests.lock().unwrap().push(Captured {
        method: method.clone(),
        path: path.clone(),
        body: serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null),
    });

    if gw.failing.load(Ordering::Relaxed) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "gateway down".to_string());
    }

    match (method, path.as_str()) {
        (Method::POST, "/jobs") => (StatusCode::OK, r#"{"jobId":"gw-1","jobName":"x"}"#.to_string()),
        (Method::GET, "/jobs/known") => (
            StatusCode::OK,
            serde_json::json!({
                "jobId": "known",
                "jobName": "train-20250101-000000",
                "status": "SUCCEEDED",
                "container": {"exitCode": 0}
            })
            .to_string(),
        ),
        (Method::GET, _) => (StatusCode::NOT_FOUND, "no such job".to_string()),
        _ => (StatusCode::OK, "{}".to_string()),
    }
}

/// Serve the stub on 127.0.0.1:0. Returns its base URL.
async fn spawn_gateway() -> Result<(String, Arc<Gateway>)> {
    let gw = Arc::new(Gateway::default());
    let app = Router::new().fallback(answer).with_state(gw.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://127.0.0.1:{port}"), gw))
}

fn http_config(base: &str) -> GantryConfig {
    let mut config = GantryConfig::default();
    config.backend.mode = BackendMode::Http;
    config.backend.batch_url = base.to_string();
    config.backend.publish_url = base.to_string();
    config.backend.dead_letter_url = base.to_string();
    config.backend.object_store_url = base.to_string();
    config
}

fn http_services(config: &GantryConfig) -> Services {
    let collaborators = Collaborators::from_config(config).expect("http collaborators");
    build(config, collaborators)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

/// The submit call carries the camelCase wire body.
#[tokio::test]
async fn test_submission_wire_format() -> Result<()> {
    let (base, gw) = spawn_gateway().await?;
    let services = http_services(&http_config(&base));

    let report = services
        .dispatcher
        .dispatch(br#"{"trigger_type":"batch_job","data":{"script_key":"jobs/train.py","compute_type":"cpu"}}"#)
        .await?;
    assert_eq!(report.submitted, 1);
    match &report.outcomes[0] {
        EventOutcome::Submitted { jobs, .. } => assert_eq!(jobs[0].job_id, "gw-1"),
        other => panic!("unexpected outcome {other:?}"),
    }

    let body = gw.find(Method::POST, "/jobs").body;
    assert_eq!(body["jobQueue"], "ml-cpu-job-queue");
    assert!(body["jobName"].as_str().unwrap().starts_with("train-"));
    let overrides = &body["containerOverrides"];
    assert!(overrides["resourceRequirements"].is_array());
    assert!(overrides["environment"]
        .as_array()
        .unwrap()
        .iter()
        .any(|e| e["name"] == "INPUT_KEY" && e["value"] == "jobs/train.py"));
    assert!(body.get("job_queue").is_none());
    Ok(())
}

#[tokio::test]
async fn test_describe_unknown_job_is_none() -> Result<()> {
    let (base, _gw) = spawn_gateway().await?;
    let backend = HttpBatchBackend::new(&base, Duration::from_secs(5))?;

    assert_eq!(backend.describe_job("missing").await, Ok(None));
    let known = backend.describe_job("known").await.unwrap().unwrap();
    assert_eq!(known.container.exit_code, Some(0));
    Ok(())
}

#[tokio::test]
async fn test_gateway_error_is_rejection() -> Result<()> {
    let (base, gw) = spawn_gateway().await?;
    gw.failing.store(true, Ordering::Relaxed);
    let backend = HttpBatchBackend::new(&base, Duration::from_secs(5))?;

    let err = backend.describe_job("known").await.unwrap_err();
    assert_eq!(
        err,
        BackendError::Rejected {
            status: 500,
            message: "gateway down".to_string()
        }
    );
    Ok(())
}

/// A rejected submit is dead-lettered through the queue gateway.
#[tokio::test]
async fn test_rejected_submit_reaches_dead_letter_gateway() -> Result<()> {
    let (base, gw) = spawn_gateway().await?;
    let config = http_config(&base);
    let services = http_services(&config);

    gw.failing.store(true, Ordering::Relaxed);
    // The queue write fails too, so the invocation must fail.
    let err = services
        .dispatcher
        .dispatch(br#"{"trigger_type":"batch_job","data":{"script_key":"a.py"}}"#)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), gantry_core::ErrorKind::DeadLetterWriteFailure);

    gw.failing.store(false, Ordering::Relaxed);
    let report = services.dispatcher.dispatch(b"{oops").await?;
    assert_eq!(report.dead_lettered, 1);

    let queue_path = format!("/queues/{}/messages", config.dead_letter.queue);
    let posted: Vec<_> = gw
        .requests()
        .into_iter()
        .filter(|r| r.method == Method::POST && r.path == queue_path)
        .collect();
    let last = &posted.last().expect("dead letter posted").body;
    assert_eq!(last["original_payload"], "{oops");
    assert_eq!(last["error_kind"], "malformed_input");
    assert_eq!(last["payload_encoding"], "utf8");
    Ok(())
}

/// A finished job: describe, publish, then the summary PUT.
#[tokio::test]
async fn test_job_event_over_http() -> Result<()> {
    let (base, gw) = spawn_gateway().await?;
    let config = http_config(&base);
    let services = http_services(&config);

    let outcome = services
        .monitor
        .handle(&job_state("j-1", "train-20250101-000000", "FAILED", Some("boom")))
        .await?;
    assert!(matches!(outcome, MonitorOutcome::Notified { .. }));

    let published = gw.find(Method::POST, "/topics/");
    assert_eq!(published.path, format!("/topics/{}/messages", config.notifications.topic));
    assert_eq!(published.body["topic"], config.notifications.topic);
    assert_eq!(published.body["subject"], "ML Job Failed: train-20250101-000000");
    assert_eq!(published.body["severity"], "error");

    let summary = gw.find(Method::PUT, "/buckets/");
    assert!(summary.path.starts_with("/buckets/ml-output/objects/job-summaries/"));
    assert!(summary.path.ends_with("/train-20250101-000000-j-1.json"));
    assert_eq!(summary.body["job_id"], "j-1");
    assert_eq!(summary.body["status"], "FAILED");

    // describe 404 fell back to the event.
    gw.find(Method::GET, "/jobs/j-1");
    assert_eq!(summary.body["details"]["statusReason"], "boom");
    Ok(())
}

/// A summary gateway outage changes nothing about the outcome.
#[tokio::test]
async fn test_summary_failure_is_logged_only() -> Result<()> {
    let (base, gw) = spawn_gateway().await?;
    let mut config = http_config(&base);
    // Everything except the object store is in memory.
    config.backend.object_store_url = "http://127.0.0.1:1".to_string();
    config.backend.request_timeout_secs = 1;
    let http = Collaborators::from_config(&config)?;
    let memory = MemoryCollaborators::default();
    let collaborators = Collaborators {
        batch: Arc::new(memory.batch.clone()),
        notifier: Arc::new(memory.notifier.clone()),
        dead_letters: Arc::new(memory.dead_letters.clone()),
        summaries: http.summaries,
        memory: Some(memory.clone()),
    };
    let services = build(&config, collaborators);

    let outcome = services
        .monitor
        .handle(&job_state("j", "n", "SUCCEEDED", None))
        .await?;
    assert!(matches!(outcome, MonitorOutcome::Notified { .. }));
    assert_eq!(memory.notifier.published().len(), 1);
    assert!(memory.dead_letters.is_empty());
    assert!(gw.requests().is_empty());
    Ok(())
}
