use serde::{Deserialize, Serialize};
use std::fmt;

use super::work_item::WorkItemRecord;

/// One row of a statistics table. Serialized with the column names the
/// reconcile step reads back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueTypeCount {
    #[serde(rename = "Work Item Type")]
    pub issue_type: String,
    #[serde(rename = "Count")]
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStatus {
    Matched,
    Unmatched,
}

impl MatchStatus {
    pub fn of(a: u64, b: u64) -> Self {
        if a == b {
            MatchStatus::Matched
        } else {
            MatchStatus::Unmatched
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStatus::Matched => f.write_str("Matched"),
            MatchStatus::Unmatched => f.write_str("Unmatched"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationRow {
    pub label: String,
    pub count_source_a: u64,
    pub count_source_b: u64,
    pub status: MatchStatus,
}

impl ReconciliationRow {
    pub fn new(label: impl Into<String>, a: u64, b: u64) -> Self {
        Self {
            label: label.into(),
            count_source_a: a,
            count_source_b: b,
            status: MatchStatus::of(a, b),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// One row per canonical label, sorted by label.
    pub rows: Vec<ReconciliationRow>,
    pub total: ReconciliationRow,
}

impl ReconciliationReport {
    pub fn matched_rows(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| r.status == MatchStatus::Matched)
            .count()
    }

    pub fn unmatched_rows(&self) -> usize {
        self.rows.len() - self.matched_rows()
    }

    #[cfg(test)]
    pub fn row(&self, label: &str) -> Option<&ReconciliationRow> {
        self.rows.iter().find(|r| r.label == label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscoveryStatus {
    Completed,
    /// Some chunks/pages or records were skipped.
    Partial,
    /// Retrieval or normalization aborted; the report holds what was obtained.
    Failed,
}

/// Which system a project report was discovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Ado,
    Jira,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Ado => "ado",
            SourceKind::Jira => "jira",
        }
    }

    pub fn report_title(self) -> &'static str {
        match self {
            SourceKind::Ado => "ADO Discovery Report",
            SourceKind::Jira => "JIRA Discovery Report",
        }
    }
}

/// The "Report Details" block written ahead of every report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDetails {
    pub source: SourceKind,
    pub report_title: String,
    pub purpose: String,
    pub run_date: String,
    pub run_duration: String,
    pub run_by: String,
    pub total_issue_count: usize,
    pub status: DiscoveryStatus,
    pub project_name: String,
    pub base_url: String,
    pub username: String,
    pub project_key: String,
}

/// Everything the sink receives for one discovered project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectReport {
    pub details: RunDetails,
    pub records: Vec<WorkItemRecord>,
    pub statistics: Vec<IssueTypeCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationDetails {
    pub report_title: String,
    pub purpose: String,
    pub run_date: String,
    pub run_duration: String,
    pub run_by: String,
    pub jira_project: String,
    pub ado_project: String,
    pub total_rows: usize,
    pub matched_rows: usize,
    pub unmatched_rows: usize,
}
