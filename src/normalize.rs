//! Raw source records to canonical [`WorkItemRecord`]s.
//!
//! The two sources keep different defaults: a missing ADO
//! description is `""` while a missing Jira description is
//! `"no description"`; missing Jira people get `"Unassigned"`/`"Unknown"`
//! while ADO leaves them empty.

use chrono::DateTime;
use serde::Deserialize;
use tracing::warn;

use crate::error::NormalizeError;
use crate::model::raw::{AdoIdentity, AdoWorkItem, JiraIssue, RawRecord};
use crate::model::work_item::{RecordId, WorkItemRecord};
use crate::util::adf::extract_text_from_adf;
use crate::util::html::strip_html;

const JIRA_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";
const REPORT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const SECONDS_PER_HOUR: f64 = 3600.0;

/// What to do with a record that cannot be normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Stop at the first malformed record, keeping the ones before it.
    #[default]
    Abort,
    /// Log and drop the record.
    Skip,
}

pub fn normalize(raw: &RawRecord, project: &str) -> Result<WorkItemRecord, NormalizeError> {
    match raw {
        RawRecord::Ado(item) => normalize_ado(item, project),
        RawRecord::Jira(issue) => normalize_jira(issue, project),
    }
}

fn malformed(
    source_kind: &'static str,
    project: &str,
    record_id: Option<String>,
    reason: &str,
) -> NormalizeError {
    NormalizeError::MalformedRecord {
        source_kind,
        project: project.to_string(),
        record_id,
        reason: reason.to_string(),
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|s| !s.is_empty()).cloned()
}

fn normalize_ado(item: &AdoWorkItem, project: &str) -> Result<WorkItemRecord, NormalizeError> {
    let id = item
        .id
        .map(RecordId::Int)
        .ok_or_else(|| malformed("ADO", project, None, "missing id"))?;
    let fields = &item.fields;
    let issue_type = fields.work_item_type.clone().ok_or_else(|| {
        malformed(
            "ADO",
            project,
            Some(id.to_string()),
            "missing System.WorkItemType",
        )
    })?;

    let display = |identity: &Option<AdoIdentity>| {
        identity
            .as_ref()
            .and_then(|i| i.display_name.clone())
            .unwrap_or_default()
    };

    Ok(WorkItemRecord {
        key: WorkItemRecord::derived_key(&issue_type, &id),
        id,
        project_name: project.to_string(),
        summary: fields.title.clone().unwrap_or_default(),
        description: strip_html(fields.description.as_deref().unwrap_or_default()),
        assignee: display(&fields.assigned_to),
        reporter: display(&fields.created_by),
        reporter_time_zone: String::new(),
        issue_type,
        // already in hours
        time_estimate_hours: fields.original_estimate.unwrap_or(0.0),
        time_spent_hours: fields.completed_work.unwrap_or(0.0),
        due_date: non_empty(fields.due_date.as_ref()),
        created_date: non_empty(fields.created_date.as_ref()),
    })
}

fn normalize_jira(issue: &JiraIssue, project: &str) -> Result<WorkItemRecord, NormalizeError> {
    let key = issue
        .key
        .clone()
        .ok_or_else(|| malformed("Jira", project, issue.id.clone(), "missing key"))?;
    let fields = &issue.fields;
    let issue_type = fields
        .issuetype
        .as_ref()
        .and_then(|t| t.name.clone())
        .ok_or_else(|| malformed("Jira", project, Some(key.clone()), "missing issuetype"))?;

    let created_date = match fields.created.as_deref() {
        Some(raw) => Some(reformat_timestamp(raw).ok_or_else(|| {
            malformed(
                "Jira",
                project,
                Some(key.clone()),
                &format!("unparseable created timestamp '{raw}'"),
            )
        })?),
        None => None,
    };

    let hours = |seconds: Option<f64>| match seconds {
        Some(s) if s > 0.0 => s / SECONDS_PER_HOUR,
        _ => 0.0,
    };
    let reporter = fields.reporter.as_ref();

    Ok(WorkItemRecord {
        id: RecordId::Text(issue.id.clone().unwrap_or_else(|| key.clone())),
        project_name: project.to_string(),
        key,
        summary: fields.summary.clone().unwrap_or_default(),
        description: extract_text_from_adf(&fields.description),
        assignee: fields
            .assignee
            .as_ref()
            .and_then(|u| u.display_name.clone())
            .unwrap_or_else(|| "Unassigned".to_string()),
        reporter: reporter
            .and_then(|u| u.display_name.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        reporter_time_zone: reporter
            .and_then(|u| u.time_zone.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        issue_type,
        time_estimate_hours: hours(fields.timeestimate),
        time_spent_hours: hours(fields.timespent),
        due_date: non_empty(fields.duedate.as_ref()),
        created_date,
    })
}

/// `2024-05-06T09:15:30.000+0200` -> `2024-05-06 09:15:30` (offset dropped).
fn reformat_timestamp(raw: &str) -> Option<String> {
    DateTime::parse_from_str(raw, JIRA_TIMESTAMP_FORMAT)
        .ok()
        .map(|ts| ts.format(REPORT_TIMESTAMP_FORMAT).to_string())
}

#[derive(Debug, Default)]
pub struct Normalized {
    pub records: Vec<WorkItemRecord>,
    /// Records dropped under [`MalformedPolicy::Skip`].
    pub skipped: Vec<NormalizeError>,
    /// First malformed record under [`MalformedPolicy::Abort`].
    pub aborted: Option<NormalizeError>,
}

pub fn normalize_all(raw: &[RawRecord], project: &str, policy: MalformedPolicy) -> Normalized {
    let mut out = Normalized {
        records: Vec::with_capacity(raw.len()),
        ..Normalized::default()
    };
    for record in raw {
        match normalize(record, project) {
            Ok(item) => out.records.push(item),
            Err(err) => match policy {
                MalformedPolicy::Skip => {
                    warn!(project, source = record.source_kind(), error = %err, "skipping malformed record");
                    out.skipped.push(err);
                }
                MalformedPolicy::Abort => {
                    out.aborted = Some(err);
                    break;
                }
            },
        }
    }
    out
}
