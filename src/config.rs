use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::normalize::MalformedPolicy;
use crate::reconcile::LabelMapping;
use crate::retry::{self, RetryPolicy};

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    pub output_dir: Option<PathBuf>,
    pub parallel_projects: Option<usize>,
    pub run_timeout_secs: Option<u64>,
    pub run_by: Option<String>,
    #[serde(default)]
    pub malformed_records: MalformedPolicy,
    #[serde(default)]
    pub retry: RetryConfig,
    pub ado: Option<AdoConfig>,
    pub jira: Option<JiraConfig>,
    pub reconcile: Option<ReconcileConfig>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub rate_limit_delay_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct AdoConfig {
    #[serde(default)]
    pub projects: Vec<AdoProjectConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdoProjectConfig {
    pub name: String,
    pub organization: String,
    pub org_url: String,
    pub pat: String,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct JiraConfig {
    #[serde(default)]
    pub projects: Vec<JiraProjectConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JiraProjectConfig {
    pub name: String,
    pub base_url: String,
    pub key: String,
    pub username: String,
    pub api_token: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct ReconcileConfig {
    pub mapping: Option<BTreeMap<String, String>>,
}

impl AppConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        let r = &self.retry;
        RetryPolicy {
            max_attempts: r.max_attempts.unwrap_or(retry::DEFAULT_MAX_ATTEMPTS).max(1),
            retry_delay: r
                .retry_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(retry::DEFAULT_RETRY_DELAY),
            rate_limit_delay: r
                .rate_limit_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(retry::DEFAULT_RATE_LIMIT_DELAY),
            request_timeout: r
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(retry::DEFAULT_REQUEST_TIMEOUT),
        }
    }

    pub fn label_mapping(&self) -> LabelMapping {
        match self.reconcile.as_ref().and_then(|r| r.mapping.clone()) {
            Some(pairs) => LabelMapping::new(pairs),
            None => LabelMapping::default(),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("reports"))
    }

    pub fn parallel_projects(&self) -> usize {
        self.parallel_projects.unwrap_or(1).max(1)
    }

    pub fn run_by(&self) -> String {
        self.run_by
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .or_else(|| std::env::var("USERNAME").ok())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn ado_projects(&self) -> &[AdoProjectConfig] {
        self.ado.as_ref().map(|a| a.projects.as_slice()).unwrap_or(&[])
    }

    pub fn jira_projects(&self) -> &[JiraProjectConfig] {
        self.jira.as_ref().map(|j| j.projects.as_slice()).unwrap_or(&[])
    }
}

pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".workrecon")
}

fn default_config_path() -> PathBuf {
    data_dir().join("config.toml")
}

/// Load `path`, or the default location when none is given. Only the
/// default location may be absent.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => read_config(path, true),
        None => read_config(&default_config_path(), false),
    }
}

fn read_config(path: &Path, required: bool) -> Result<AppConfig> {
    if !path.exists() {
        if required {
            bail!("Config file {} does not exist", path.display());
        }
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    parse_config(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn parse_config(contents: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(contents)?;
    Ok(config)
}
