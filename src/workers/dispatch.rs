use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use diesel::prelude::*;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    jobs::JOB_DISPATCH_WEBHOOK,
    lifecycle::{DispatchOutcome, DocumentStatus},
    models::Document,
    schema::documents,
    state::AppState,
};

use super::{JobExecution, JobHandler};

/// Transport failures are retried a bounded number of times; a non-2xx
/// answer is authoritative and terminal.
const MAX_DISPATCH_ATTEMPTS: i32 = 3;
const RETRY_BASE_DELAY_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct DispatchPayload {
    document_id: Uuid,
}

pub struct DispatchWebhookJob {
    client: Client,
}

impl DispatchWebhookJob {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build webhook client");
        Self { client }
    }
}

#[async_trait]
impl JobHandler for DispatchWebhookJob {
    fn job_type(&self) -> &'static str {
        JOB_DISPATCH_WEBHOOK
    }

    async fn handle(&self, state: Arc<AppState>, job: crate::models::Job) -> JobExecution {
        let payload: DispatchPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid dispatch payload: {err}"),
                }
            }
        };

        let document_id = payload.document_id;
        match dispatch_document(&self.client, &state, document_id, job.attempts).await {
            Ok(execution) => execution,
            Err(err) => {
                error!(%document_id, error = %err, "dispatch faulted");
                record_status(&state, document_id, DocumentStatus::Error, Some(err.clone()));
                JobExecution::Failed { error: err }
            }
        }
    }
}

async fn dispatch_document(
    client: &Client,
    state: &AppState,
    document_id: Uuid,
    attempt: i32,
) -> Result<JobExecution, String> {
    let document: Document = {
        let mut conn = state.db().map_err(|err| format!("{err:?}"))?;
        match documents::table.find(document_id).first(&mut conn) {
            Ok(document) => document,
            Err(diesel::result::Error::NotFound) => {
                // Deleted between upload and dispatch; nothing to notify.
                return Ok(JobExecution::Failed {
                    error: "document no longer exists".into(),
                });
            }
            Err(err) => return Err(format!("{err:?}")),
        }
    };

    let file_url = state.config.file_download_url(&document.original_path);
    let callback_token = state
        .jwt
        .generate_callback_token(document.id)
        .map_err(|err| format!("failed to generate callback token: {err}"))?;

    let body = json!({
        "doc_id": document.id,
        "filename": document.filename,
        "file_url": file_url,
        "original_path": document.original_path,
        "callback_url": state.config.callback_url(),
        "callback_token": callback_token,
    });

    info!(%document_id, %file_url, "notifying processing webhook");

    let outcome = match client
        .post(&state.config.webhook_url)
        .json(&body)
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => DispatchOutcome::Accepted,
        Ok(response) => DispatchOutcome::Rejected {
            status_code: response.status().as_u16(),
        },
        Err(err) => DispatchOutcome::Unreachable {
            error: err.to_string(),
        },
    };

    let (status, detail) = outcome.status();
    record_status(state, document_id, status, detail.clone());

    match outcome {
        DispatchOutcome::Accepted => Ok(JobExecution::Success),
        DispatchOutcome::Rejected { status_code } => {
            warn!(%document_id, status_code, "processing webhook rejected notification");
            Ok(JobExecution::Failed {
                error: format!("webhook returned status {status_code}"),
            })
        }
        DispatchOutcome::Unreachable { error } => {
            if attempt < MAX_DISPATCH_ATTEMPTS {
                Ok(JobExecution::Retry {
                    delay: Duration::from_secs(RETRY_BASE_DELAY_SECS * attempt.max(1) as u64),
                    error,
                })
            } else {
                warn!(%document_id, attempt, "dispatch attempts exhausted");
                Ok(JobExecution::Failed { error })
            }
        }
    }
}

fn record_status(
    state: &AppState,
    document_id: Uuid,
    status: DocumentStatus,
    detail: Option<String>,
) {
    let result = state.db().map_err(|err| format!("{err:?}")).and_then(|mut conn| {
        diesel::update(documents::table.find(document_id))
            .set((
                documents::status.eq(status.as_str()),
                documents::status_detail.eq(detail),
            ))
            .execute(&mut conn)
            .map_err(|err| format!("{err:?}"))
    });

    if let Err(err) = result {
        error!(%document_id, status = status.as_str(), error = %err, "failed to record document status");
    }
}
