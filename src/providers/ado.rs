use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use serde_json::json;
use std::time::Duration;

use super::{http_client, read_json, BatchSource};
use crate::error::FetchError;
use crate::model::raw::{AdoBatchResponse, AdoWorkItem, WiqlResponse};

const API_VERSION: &str = "6.0";

pub struct AdoClient {
    org_base: String,
    auth_header: String,
    client: reqwest::Client,
}

impl AdoClient {
    /// `org_url` is the service root (e.g. `https://dev.azure.com`).
    pub fn new(org_url: &str, organization: &str, pat: &str, timeout: Duration) -> Result<Self> {
        // PATs go in as the password of an empty user name
        let encoded = base64::engine::general_purpose::STANDARD.encode(format!(":{pat}"));
        Ok(Self {
            org_base: format!(
                "{}/{}",
                org_url.trim_end_matches('/'),
                urlencoding::encode(organization)
            ),
            auth_header: format!("Basic {encoded}"),
            client: http_client(timeout)?,
        })
    }

    fn project_url(&self, project: &str, endpoint: &str) -> String {
        format!(
            "{}/{}/_apis/wit/{endpoint}?api-version={API_VERSION}",
            self.org_base,
            urlencoding::encode(project)
        )
    }
}

#[async_trait]
impl BatchSource for AdoClient {
    fn name(&self) -> &str {
        "ADO"
    }

    async fn fetch_ids(&self, project: &str) -> Result<Vec<i64>, FetchError> {
        let query = format!(
            "SELECT [System.Id] FROM workitems WHERE [System.TeamProject] = '{}'",
            project.replace('\'', "''")
        );
        let resp = self
            .client
            .post(self.project_url(project, "wiql"))
            .header("Authorization", &self.auth_header)
            .json(&json!({ "query": query }))
            .send()
            .await?;

        let wiql: WiqlResponse = read_json(resp).await?;
        Ok(wiql.work_items.into_iter().map(|w| w.id).collect())
    }

    async fn fetch_batch(&self, project: &str, ids: &[i64]) -> Result<Vec<AdoWorkItem>, FetchError> {
        let resp = self
            .client
            .post(self.project_url(project, "workitemsbatch"))
            .header("Authorization", &self.auth_header)
            .json(&json!({ "ids": ids }))
            .send()
            .await?;

        let batch: AdoBatchResponse = read_json(resp).await?;
        Ok(batch.value)
    }
}
