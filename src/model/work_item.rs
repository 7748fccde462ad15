use serde::{Deserialize, Serialize};
use std::fmt;

/// Source-native identifier: ADO uses integers, Jira uses strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(n) => write!(f, "{n}"),
            RecordId::Text(s) => f.write_str(s),
        }
    }
}

/// The canonical record both sources are normalized into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItemRecord {
    pub id: RecordId,
    pub project_name: String,
    /// Native key when the source has one, otherwise `<issue_type>-<id>`.
    pub key: String,
    pub summary: String,
    pub description: String,
    pub assignee: String,
    pub reporter: String,
    /// Reporter's time zone (Jira only; empty for ADO).
    pub reporter_time_zone: String,
    /// Label in the source's own vocabulary.
    pub issue_type: String,
    pub time_estimate_hours: f64,
    pub time_spent_hours: f64,
    pub due_date: Option<String>,
    pub created_date: Option<String>,
}

impl WorkItemRecord {
    pub fn derived_key(issue_type: &str, id: &RecordId) -> String {
        format!("{issue_type}-{id}")
    }
}
