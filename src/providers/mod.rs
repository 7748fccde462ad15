pub mod ado;
pub mod jira;

use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::FetchError;
use crate::model::raw::{AdoWorkItem, JiraPage};

/// Id-then-batch source (ADO): enumerate every id, then fetch full records
/// for a bounded batch of ids at a time.
#[async_trait]
pub trait BatchSource: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch_ids(&self, project: &str) -> Result<Vec<i64>, FetchError>;
    async fn fetch_batch(&self, project: &str, ids: &[i64]) -> Result<Vec<AdoWorkItem>, FetchError>;
}

/// Offset-paginated source (Jira).
#[async_trait]
pub trait PageSource: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch_page(
        &self,
        project_key: &str,
        start_at: usize,
        page_size: usize,
    ) -> Result<JiraPage, FetchError>;
}

/// Turn a response into `T`, classifying failures for the retry controller.
pub(crate) async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, FetchError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(FetchError::from_status(status.as_u16(), &body));
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| FetchError::MalformedResponse {
        message: e.to_string(),
    })
}

pub(crate) fn http_client(timeout: std::time::Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}
