//! Kolors virtual try-on: submit a job, then poll its task id.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, PollSettings, ProviderKind};
use crate::error::TryOnError;
use crate::models::job::{Job, PollOutcome};
use crate::models::tryon::{ResultImage, TryOnResult};
use crate::services::credentials::{CredentialError, CredentialIssuer};
use crate::services::poller::{self, QueryError, TaskQuery, TaskState};
use crate::services::provider::{required, TryOnJob, TryOnProvider};

const STATUS_SUCCESS: &str = "success";
const STATUS_ERROR: &str = "error";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitPayload<'a> {
    human_image: &'a str,
    cloth_image: &'a str,
    seed: u32,
}

#[derive(Deserialize)]
struct Envelope {
    result: VendorResult,
}

#[derive(Deserialize)]
struct VendorResult {
    status: String,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client bound to one base URL and one bearer token.
pub struct KolorsClient {
    http: Client,
    base_url: String,
    authorization: String,
}

impl KolorsClient {
    pub fn new(http: Client, base_url: &str, authorization: String) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            authorization,
        }
    }

    pub fn submit_url(&self) -> String {
        format!("{}/Submit", self.base_url)
    }

    pub fn query_url(&self) -> String {
        format!("{}/Query", self.base_url)
    }

    /// POST the two images and the seed; returns the accepted job.
    pub async fn submit(
        &self,
        human_image: &str,
        cloth_image: &str,
        seed: u32,
    ) -> Result<Job, TryOnError> {
        let payload = SubmitPayload {
            human_image,
            cloth_image,
            seed,
        };

        let response = self
            .http
            .post(self.submit_url())
            .header(AUTHORIZATION, &self.authorization)
            .json(&payload)
            .send()
            .await
            .map_err(|e| TryOnError::Unexpected(format!("submit request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TryOnError::Submission {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| TryOnError::Unexpected(format!("unreadable submit reply: {e}")))?;

        if envelope.result.status != STATUS_SUCCESS {
            return Err(TryOnError::Vendor(envelope.result.status));
        }

        let task_id = envelope
            .result
            .result
            .filter(|id| !id.is_empty())
            .ok_or_else(|| TryOnError::Unexpected("submit reply carried no task id".to_string()))?;

        Ok(Job::submitted(task_id, seed))
    }
}

#[async_trait]
impl TaskQuery for KolorsClient {
    async fn query(&self, task_id: &str) -> Result<TaskState, QueryError> {
        let response = self
            .http
            .get(self.query_url())
            .query(&[("taskId", task_id)])
            .header(AUTHORIZATION, &self.authorization)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(QueryError::Status(response.status().as_u16()));
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        Ok(classify(envelope.result))
    }
}

fn classify(result: VendorResult) -> TaskState {
    match result.status.as_str() {
        STATUS_SUCCESS => match result.result.filter(|r| !r.is_empty()) {
            Some(image) => TaskState::Succeeded(image),
            None => TaskState::Failed("Vendor reported success without an image".to_string()),
        },
        STATUS_ERROR => TaskState::Failed(
            result
                .message
                .or(result.result)
                .unwrap_or_else(|| "Error processing images".to_string()),
        ),
        _ => TaskState::Pending(result.status.clone()),
    }
}

/// Submit-and-poll provider backed by the Kolors API.
pub struct KolorsProvider {
    http: Client,
    base_url: Option<String>,
    access_key_id: Option<String>,
    access_key_secret: Option<String>,
    token_ttl: Duration,
    poll: PollSettings,
}

impl KolorsProvider {
    pub fn new(http: Client, config: &AppConfig) -> Self {
        Self {
            http,
            base_url: config.kolors_api_url.clone(),
            access_key_id: config.access_key_id.clone(),
            access_key_secret: config.access_key_secret.clone(),
            token_ttl: Duration::from_secs(config.token_ttl_secs),
            poll: config.poll_settings(),
        }
    }

    fn base_url(&self) -> Result<&str, TryOnError> {
        required(self.base_url.as_deref(), "KOLORS_API_URL")
    }

    fn issuer(&self) -> Result<CredentialIssuer, TryOnError> {
        CredentialIssuer::new(
            self.access_key_id.as_deref(),
            self.access_key_secret.as_deref(),
            self.token_ttl,
        )
        .map_err(|e| match e {
            CredentialError::Missing(_) => TryOnError::Configuration(e.to_string()),
            CredentialError::Sign(_) => TryOnError::Unexpected(e.to_string()),
        })
    }
}

#[async_trait]
impl TryOnProvider for KolorsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Kolors
    }

    fn check_configuration(&self) -> Result<(), TryOnError> {
        self.base_url()?;
        self.issuer()?;
        Ok(())
    }

    async fn generate(
        &self,
        job: TryOnJob<'_>,
        cancel: &CancellationToken,
    ) -> Result<TryOnResult, TryOnError> {
        let base_url = self.base_url()?;
        let authorization = self
            .issuer()?
            .bearer_header()
            .map_err(|e| TryOnError::Unexpected(e.to_string()))?;
        let client = KolorsClient::new(self.http.clone(), base_url, authorization);

        let mut submitted = client
            .submit(
                job.person.reference.as_payload(),
                job.garment.reference.as_payload(),
                job.seed,
            )
            .await?;

        tracing::info!(
            task_id = %submitted.task_id,
            seed = submitted.submitted_seed,
            "Try-on job submitted"
        );

        let report = poller::poll_until_done(&client, &submitted.task_id, &self.poll, cancel).await;
        submitted.status = report.outcome.job_status();
        metrics::histogram!("tryon_poll_attempts").record(report.attempts as f64);

        tracing::info!(
            task_id = %submitted.task_id,
            attempts = report.attempts,
            status = ?submitted.status,
            "Try-on job finished polling"
        );

        match report.outcome {
            PollOutcome::Succeeded(raw) => Ok(TryOnResult {
                image: ResultImage::from_vendor(raw),
                seed: submitted.submitted_seed,
                task_id: Some(submitted.task_id),
            }),
            PollOutcome::Failed(info) => Err(TryOnError::Query(info)),
            PollOutcome::TimedOut { last_info } => Err(TryOnError::Timeout {
                attempts: report.attempts,
                last_info,
            }),
            PollOutcome::Cancelled => Err(TryOnError::Cancelled),
        }
    }
}
