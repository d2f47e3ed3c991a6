//! /dead-letters, /notifications, /submissions, /summaries — contents of the
//! in-memory collaborators. Empty in http mode, where the real systems hold the data.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use gantry_core::{DeadLetterEnvelope, Notification};
use gantry_services::backend::BatchSubmission;
use gantry_services::StoredSummary;

use super::ApiState;

#[derive(Serialize)]
pub struct DeadLettersResponse {
    pub count: usize,
    pub entries: Vec<DeadLetterEnvelope>,
}

pub async fn handle_dead_letters(State(state): State<ApiState>) -> Json<DeadLettersResponse> {
    let entries = state
        .memory
        .as_ref()
        .map(|m| m.dead_letters.entries())
        .unwrap_or_default();
    Json(DeadLettersResponse {
        count: entries.len(),
        entries,
    })
}

#[derive(Serialize)]
pub struct NotificationsResponse {
    pub count: usize,
    pub notifications: Vec<Notification>,
}

pub async fn handle_notifications(State(state): State<ApiState>) -> Json<NotificationsResponse> {
    let notifications = state
        .memory
        .as_ref()
        .map(|m| m.notifier.published())
        .unwrap_or_default();
    Json(NotificationsResponse {
        count: notifications.len(),
        notifications,
    })
}

#[derive(Serialize)]
pub struct SubmissionInfo {
    pub job_id: String,
    pub submission: BatchSubmission,
}

#[derive(Serialize)]
pub struct SubmissionsResponse {
    pub count: usize,
    pub submissions: Vec<SubmissionInfo>,
}

pub async fn handle_submissions(State(state): State<ApiState>) -> Json<SubmissionsResponse> {
    let submissions: Vec<SubmissionInfo> = state
        .memory
        .as_ref()
        .map(|m| m.batch.submissions())
        .unwrap_or_default()
        .into_iter()
        .map(|(job_id, submission)| SubmissionInfo { job_id, submission })
        .collect();
    Json(SubmissionsResponse {
        count: submissions.len(),
        submissions,
    })
}

#[derive(Serialize)]
pub struct SummariesResponse {
    pub count: usize,
    pub summaries: Vec<StoredSummary>,
}

pub async fn handle_summaries(State(state): State<ApiState>) -> Json<SummariesResponse> {
    let summaries = state
        .memory
        .as_ref()
        .map(|m| m.summaries.stored())
        .unwrap_or_default();
    Json(SummariesResponse {
        count: summaries.len(),
        summaries,
    })
}
