//! gantry-ctl — command-line interface for the Gantry daemon.

use anyhow::{Context, Result, bail};
use serde::Deserialize;

const DEFAULT_PORT: u16 = 9100;

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StatusResponse {
    mode:          String,
    uptime_secs:   u64,
    trigger_types: Vec<String>,
    invocations:   InvocationInfo,
}

#[derive(Deserialize)]
struct InvocationInfo {
    triggers:   u64,
    job_events: u64,
    failed:     u64,
    timed_out:  u64,
}

#[derive(Deserialize)]
struct TriggersResponse {
    triggers: Vec<HandlerInfo>,
}

#[derive(Deserialize)]
struct HandlerInfo {
    trigger_type:    String,
    required_fields: Vec<String>,
    optional_fields: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct DeadLettersResponse {
    count:   usize,
    entries: Vec<DeadLetterEntry>,
}

#[derive(Deserialize)]
struct DeadLetterEntry {
    source:           String,
    error_kind:       String,
    error_reason:     String,
    dead_lettered_at: String,
    original_payload: String,
    #[serde(default)]
    payload_encoding: String,
}

#[derive(Deserialize)]
struct NotificationsResponse {
    count:         usize,
    notifications: Vec<NotificationEntry>,
}

#[derive(Deserialize)]
struct NotificationEntry {
    subject:  String,
    body:     String,
    severity: String,
}

#[derive(Deserialize)]
struct SubmissionsResponse {
    count:       usize,
    submissions: Vec<SubmissionEntry>,
}

#[derive(Deserialize)]
struct SubmissionEntry {
    job_id:     String,
    submission: Submission,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Submission {
    job_name:       String,
    job_queue:      String,
    job_definition: String,
}

#[derive(Deserialize)]
struct SummariesResponse {
    count:     usize,
    summaries: Vec<SummaryEntry>,
}

#[derive(Deserialize)]
struct SummaryEntry {
    bucket:  String,
    key:     String,
    summary: JobSummary,
}

#[derive(Deserialize)]
struct JobSummary {
    status:    String,
    timestamp: String,
}

// ── HTTP helpers ──────────────────────────────────────────────────────────────

fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}/api", port)
}

async fn get_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    reqwest::get(url)
    .await
    .with_context(|| format!("failed to connect to gantryd at {} — is it running?", url))?
    .json::<T>()
    .await
    .context("failed to parse response")
}

/// POST a raw JSON body. Non-2xx answers are errors carrying the server's text.
async fn post_raw(url: &str, body: String) -> Result<serde_json::Value> {
    let resp = reqwest::Client::new()
    .post(url)
    .header("content-type", "application/json")
    .body(body)
    .send()
    .await
    .with_context(|| format!("failed to connect to gantryd at {} — is it running?", url))?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        bail!("gantryd answered {}: {}", status, text);
    }
    resp.json().await.context("failed to parse response")
}

/// Inline JSON, or `@path` to read it from a file.
fn read_payload(arg: &str) -> Result<String> {
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path))?,
        None => arg.to_string(),
    };
    serde_json::from_str::<serde_json::Value>(&text).context("payload is not valid JSON")?;
    Ok(text)
}

// ── Subcommand handlers ───────────────────────────────────────────────────────

async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Gantry Daemon Status");
    println!("═══════════════════════════════════════");
    println!("  Backend mode   : {}", resp.mode);
    println!("  Uptime         : {}s", resp.uptime_secs);
    println!("  Trigger types  : {}", resp.trigger_types.join(", "));
    println!("  Triggers       : {}", resp.invocations.triggers);
    println!("  Job events     : {}", resp.invocations.job_events);
    println!("  Failed         : {}", resp.invocations.failed);
    println!("  Timed out      : {}", resp.invocations.timed_out);

    Ok(())
}

async fn cmd_triggers(port: u16) -> Result<()> {
    let resp: TriggersResponse = get_json(&format!("{}/triggers", base_url(port))).await?;

    for t in &resp.triggers {
        println!("  ┌─ {}", t.trigger_type);
        println!("  │  required : {}", t.required_fields.join(", "));
        let optional: Vec<String> = t
            .optional_fields
            .iter()
            .map(|(k, v)| if v.is_null() { k.clone() } else { format!("{}={}", k, v) })
            .collect();
        println!("  └─ optional : {}", optional.join(", "));
    }

    Ok(())
}

async fn cmd_post(port: u16, path: &str, arg: &str) -> Result<()> {
    let body = read_payload(arg)?;
    let resp = post_raw(&format!("{}/{}", base_url(port), path), body).await?;
    println!("{}", serde_json::to_string_pretty(&resp)?);
    Ok(())
}

async fn cmd_dead_letters(port: u16) -> Result<()> {
    let resp: DeadLettersResponse = get_json(&format!("{}/dead-letters", base_url(port))).await?;

    if resp.count == 0 {
        println!("Dead-letter queue is empty.");
        return Ok(());
    }

    println!("Dead letters ({}):", resp.count);
    for e in &resp.entries {
        println!("  ┌─ {} [{}] {}", e.dead_lettered_at, e.source, e.error_kind);
        println!("  │  reason  : {}", e.error_reason);
        if e.payload_encoding == "base64" {
            println!("  └─ payload : (base64) {}", e.original_payload);
        } else {
            println!("  └─ payload : {}", e.original_payload);
        }
    }

    Ok(())
}

async fn cmd_notifications(port: u16) -> Result<()> {
    let resp: NotificationsResponse = get_json(&format!("{}/notifications", base_url(port))).await?;

    if resp.count == 0 {
        println!("No notifications published.");
        return Ok(());
    }

    for n in &resp.notifications {
        println!("[{}] {}", n.severity, n.subject);
        for line in n.body.lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}

async fn cmd_submissions(port: u16) -> Result<()> {
    let resp: SubmissionsResponse = get_json(&format!("{}/submissions", base_url(port))).await?;

    if resp.count == 0 {
        println!("No jobs submitted.");
        return Ok(());
    }

    for s in &resp.submissions {
        println!("  ┌─ {}", s.job_id);
        println!("  │  name       : {}", s.submission.job_name);
        println!("  │  queue      : {}", s.submission.job_queue);
        println!("  └─ definition : {}", s.submission.job_definition);
    }

    Ok(())
}

async fn cmd_summaries(port: u16) -> Result<()> {
    let resp: SummariesResponse = get_json(&format!("{}/summaries", base_url(port))).await?;

    if resp.count == 0 {
        println!("No job summaries written.");
        return Ok(());
    }

    for s in &resp.summaries {
        println!("  {} {:<9} s3://{}/{}", s.summary.timestamp, s.summary.status, s.bucket, s.key);
    }

    Ok(())
}

fn print_usage() {
    println!("Usage: gantry-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status                    Show daemon status and invocation counts");
    println!("  triggers                  List registered trigger types");
    println!("  trigger <json|@file>      Send a trigger message");
    println!("  job-event <json|@file>    Send a job state change");
    println!("  dead-letters              Show dead-lettered events (memory mode)");
    println!("  notifications             Show published notifications (memory mode)");
    println!("  submissions               Show submitted jobs (memory mode)");
    println!("  summaries                 Show written job summaries (memory mode)");
    println!();
    println!("Options:");
    println!("  --port <port>   API port (default: {})", DEFAULT_PORT);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args.get(i)
            .context("--port requires a value")?
            .parse()
            .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | []                    => cmd_status(port).await,
        ["triggers"]                       => cmd_triggers(port).await,
        ["trigger", payload]               => cmd_post(port, "triggers", payload).await,
        ["job-event", payload]             => cmd_post(port, "job-events", payload).await,
        ["dead-letters"]                   => cmd_dead_letters(port).await,
        ["notifications"]                  => cmd_notifications(port).await,
        ["submissions"]                    => cmd_submissions(port).await,
        ["summaries"]                      => cmd_summaries(port).await,
        ["help"] | ["--help"] | ["-h"]     => { print_usage(); Ok(()) }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
