use crate::*;

use async_trait::async_trait;
use gantry_core::JobDetail;
use gantry_services::backend::{BackendError, BatchBackend, BatchSubmission, SubmitJobResponse};

async fn post(url: &str, body: &'static [u8]) -> Result<(u16, serde_json::Value)> {
    let resp = reqwest::Client::new()
        .post(url)
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await?;
    let status = resp.status().as_u16();
    let text = resp.text().await?;
    let json = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));
    Ok((status, json))
}

async fn get(url: &str) -> Result<serde_json::Value> {
    Ok(reqwest::get(url).await?.json().await?)
}

#[tokio::test]
async fn test_trigger_round_trip() -> Result<()> {
    let (base, memory) = spawn_api(&GantryConfig::default()).await?;

    let (status, report) = post(
        &format!("{base}/triggers"),
        br#"{"trigger_type":"batch_job","data":{"script_key":"jobs/train.py"}}"#,
    )
    .await?;
    assert_eq!(status, 200);
    assert_eq!(report["submitted"], 1);
    assert_eq!(memory.batch.submission_count(), 1);

    let subs = get(&format!("{base}/submissions")).await?;
    assert_eq!(subs["count"], 1);
    assert_eq!(subs["submissions"][0]["submission"]["jobQueue"], "ml-gpu-job-queue");
    Ok(())
}

/// Bad input still answers 200: the event is dead-lettered, not bounced.
#[tokio::test]
async fn test_bad_trigger_is_200_and_dead_lettered() -> Result<()> {
    let (base, _memory) = spawn_api(&GantryConfig::default()).await?;

    let (status, report) = post(&format!("{base}/triggers"), b"{oops").await?;
    assert_eq!(status, 200);
    assert_eq!(report["dead_lettered"], 1);
    assert_eq!(report["outcomes"][0]["status"], "dead_lettered");
    assert_eq!(report["outcomes"][0]["error_kind"], "malformed_input");

    let dl = get(&format!("{base}/dead-letters")).await?;
    assert_eq!(dl["count"], 1);
    assert_eq!(dl["entries"][0]["original_payload"], "{oops");
    Ok(())
}

#[tokio::test]
async fn test_dead_letter_outage_is_500() -> Result<()> {
    let (base, memory) = spawn_api(&GantryConfig::default()).await?;
    memory.dead_letters.set_failing(true);

    let (status, _) = post(&format!("{base}/triggers"), b"{oops").await?;
    assert_eq!(status, 500);

    let s = get(&format!("{base}/status")).await?;
    assert_eq!(s["invocations"]["failed"], 1);
    Ok(())
}

#[tokio::test]
async fn test_job_event_endpoint() -> Result<()> {
    let (base, _memory) = spawn_api(&GantryConfig::default()).await?;

    let (status, outcome) = post(
        &format!("{base}/job-events"),
        br#"{"detail":{"jobId":"j","jobName":"n","status":"FAILED","statusReason":"boom"}}"#,
    )
    .await?;
    assert_eq!(status, 200);
    assert_eq!(outcome["outcome"], "notified");
    assert_eq!(outcome["severity"], "error");

    let notes = get(&format!("{base}/notifications")).await?;
    assert_eq!(notes["count"], 1);
    assert_eq!(notes["notifications"][0]["subject"], "ML Job Failed: n");
    Ok(())
}

#[tokio::test]
async fn test_status_and_trigger_listing() -> Result<()> {
    let (base, _memory) = spawn_api(&GantryConfig::default()).await?;

    let status = get(&format!("{base}/status")).await?;
    assert_eq!(status["mode"], "memory");
    assert_eq!(status["trigger_types"], serde_json::json!(["batch_job", "object_upload"]));

    let triggers = get(&format!("{base}/triggers")).await?;
    let batch = &triggers["triggers"][0];
    assert_eq!(batch["trigger_type"], "batch_job");
    assert_eq!(batch["required_fields"], serde_json::json!(["script_key"]));
    assert_eq!(batch["optional_fields"]["compute_type"], "gpu");
    assert_eq!(batch["optional_fields"]["timeout"], 3600);
    Ok(())
}

/// Accepts submissions, but only after the invocation budget has passed.
struct SlowBackend;

#[async_trait]
impl BatchBackend for SlowBackend {
    async fn submit_job(&self, submission: &BatchSubmission) -> Result<SubmitJobResponse, BackendError> {
        tokio::time::sleep(Duration::from_secs(3)).await;
        Ok(SubmitJobResponse {
            job_id: "late".to_string(),
            job_name: submission.job_name.clone(),
        })
    }

    async fn describe_job(&self, _job_id: &str) -> Result<Option<JobDetail>, BackendError> {
        Ok(None)
    }
}

/// An invocation over budget answers 504 and is counted as timed out.
#[tokio::test]
async fn test_invocation_budget_is_504() -> Result<()> {
    let mut config = GantryConfig::default();
    config.server.invocation_timeout_secs = 1;
    let memory = MemoryCollaborators::default();
    let collaborators = Collaborators {
        batch: Arc::new(SlowBackend),
        notifier: Arc::new(memory.notifier.clone()),
        dead_letters: Arc::new(memory.dead_letters.clone()),
        summaries: Arc::new(memory.summaries.clone()),
        memory: Some(memory.clone()),
    };
    let base = spawn_api_with(&config, collaborators).await?;

    let started = Instant::now();
    let (status, body) = post(
        &format!("{base}/triggers"),
        br#"{"trigger_type":"batch_job","data":{"script_key":"jobs/train.py"}}"#,
    )
    .await?;
    assert_eq!(status, 504);
    assert!(body.as_str().unwrap_or_default().contains("budget"), "{body}");
    assert!(started.elapsed() < Duration::from_secs(3));

    let s = get(&format!("{base}/status")).await?;
    assert_eq!(s["invocations"]["timed_out"], 1);
    assert_eq!(s["invocations"]["failed"], 0);
    assert!(memory.dead_letters.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_summaries_endpoint() -> Result<()> {
    let (base, _memory) = spawn_api(&GantryConfig::default()).await?;

    post(
        &format!("{base}/job-events"),
        br#"{"detail":{"jobId":"j","jobName":"n","status":"SUCCEEDED"}}"#,
    )
    .await?;

    let summaries = get(&format!("{base}/summaries")).await?;
    assert_eq!(summaries["count"], 1);
    assert_eq!(summaries["summaries"][0]["bucket"], "ml-output");
    assert_eq!(summaries["summaries"][0]["summary"]["job_id"], "j");
    Ok(())
}
