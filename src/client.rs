//! Worker-side client for the dispatcher control plane.
//!
//! Worker harnesses loop on [`DispatcherClient::get_work`], process each
//! batch, and push results back with [`DispatcherClient::submit_results`]
//! until they see [`WorkStatus::AllWorkComplete`]. Connection-level
//! failures are folded into [`WorkStatus::ServerUnavailable`] so a worker
//! can treat "dispatcher gone" as a normal exit condition rather than an
//! error.

use std::time::Duration;

use reqwest::Client;

use crate::error::DispatcherError;
use crate::protocol::{
    GetWorkRequest, GetWorkResponse, StatusResponse, SubmitResultRequest, SubmitResultResponse,
    WorkItem, WorkResult, WorkTimeoutRequest, WorkTimeoutResponse,
};

/// Outcome of a `get_work` call as seen by a worker.
#[derive(Debug)]
pub enum WorkStatus {
    /// Work to process.
    Ok(Vec<WorkItem>),
    /// Nothing issuable right now; ask again after `retry_in` seconds.
    Retry { retry_in: u64 },
    /// Every line has been persisted; the worker should exit.
    AllWorkComplete,
    /// Synthesized on connection failure. The server never sends this.
    ServerUnavailable,
}

pub struct DispatcherClient {
    base_url: String,
    http: Client,
}

impl DispatcherClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .expect("failed to build HTTP client");

        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url, http }
    }

    /// Request a batch of up to `batch_size` work items.
    pub async fn get_work(&self, batch_size: u64) -> Result<WorkStatus, DispatcherError> {
        let url = format!("{}/get_work", self.base_url);
        let response = match self
            .http
            .post(&url)
            .json(&GetWorkRequest { batch_size })
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_connect() => return Ok(WorkStatus::ServerUnavailable),
            Err(e) => return Err(e.into()),
        };

        let response = Self::check_status(response).await?;
        let parsed: GetWorkResponse = response.json().await?;
        Ok(match parsed {
            GetWorkResponse::Ok { items } => WorkStatus::Ok(items),
            GetWorkResponse::Retry { retry_in } => WorkStatus::Retry { retry_in },
            GetWorkResponse::AllWorkComplete => WorkStatus::AllWorkComplete,
        })
    }

    /// Submit completed results. Returns the number the dispatcher newly
    /// accepted; stale or duplicate ids are dropped server-side and not
    /// counted.
    pub async fn submit_results(&self, items: Vec<WorkResult>) -> Result<u64, DispatcherError> {
        let url = format!("{}/submit_result", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&SubmitResultRequest { items })
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        let parsed: SubmitResultResponse = response.json().await?;
        Ok(parsed.count)
    }

    /// Change the server's work timeout at runtime. Returns the new value.
    pub async fn set_work_timeout(&self, timeout: u64) -> Result<u64, DispatcherError> {
        let url = format!("{}/work_timeout", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&WorkTimeoutRequest { timeout })
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        let parsed: WorkTimeoutResponse = response.json().await?;
        Ok(parsed.timeout)
    }

    /// Fetch the queue counters.
    pub async fn status(&self) -> Result<StatusResponse, DispatcherError> {
        let url = format!("{}/status", self.base_url);
        let response = self.http.get(&url).send().await?;
        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn check_status(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, DispatcherError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let truncated: String = body.chars().take(500).collect();
        Err(DispatcherError::UnexpectedResponse {
            status: status.as_u16(),
            body: truncated,
        })
    }
}
