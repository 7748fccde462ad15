use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use std::time::Duration;

use super::{http_client, read_json, PageSource};
use crate::error::FetchError;
use crate::model::raw::JiraPage;

const SEARCH_FIELDS: &str =
    "key,summary,description,assignee,reporter,issuetype,timeestimate,timespent,duedate,created";

pub struct JiraClient {
    base_url: String,
    auth_header: String,
    client: reqwest::Client,
}

impl JiraClient {
    pub fn new(base_url: &str, email: &str, api_token: &str, timeout: Duration) -> Result<Self> {
        let creds = format!("{email}:{api_token}");
        let encoded = base64::engine::general_purpose::STANDARD.encode(creds);
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_header: format!("Basic {encoded}"),
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl PageSource for JiraClient {
    fn name(&self) -> &str {
        "Jira"
    }

    async fn fetch_page(
        &self,
        project_key: &str,
        start_at: usize,
        page_size: usize,
    ) -> Result<JiraPage, FetchError> {
        let jql = format!("project = {project_key}");
        let url = format!(
            "{}/rest/api/3/search?jql={}&fields={SEARCH_FIELDS}&startAt={start_at}&maxResults={page_size}",
            self.base_url,
            urlencoding::encode(&jql)
        );

        let resp = self
            .client
            .get(&url)
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .send()
            .await?;

        read_json(resp).await
    }
}
