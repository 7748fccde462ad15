//! Raw record shapes as returned by the two remote sources.
//!
//! Every field a source may omit is an `Option` so that a record with a
//! missing mandatory field still deserializes and can be reported by the
//! normalizer instead of failing the whole batch.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One raw record, tagged by the source it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawRecord {
    Ado(AdoWorkItem),
    Jira(JiraIssue),
}

impl RawRecord {
    pub fn source_kind(&self) -> &'static str {
        match self {
            RawRecord::Ado(_) => "ADO",
            RawRecord::Jira(_) => "Jira",
        }
    }

    /// The category label exactly as the source reports it.
    pub fn issue_type(&self) -> Option<&str> {
        match self {
            RawRecord::Ado(item) => item.fields.work_item_type.as_deref(),
            RawRecord::Jira(issue) => issue
                .fields
                .issuetype
                .as_ref()
                .and_then(|t| t.name.as_deref()),
        }
    }
}

// ---------------------------------------------------------------------------
// ADO (id-then-batch)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdoWorkItem {
    pub id: Option<i64>,
    #[serde(default)]
    pub fields: AdoFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdoFields {
    #[serde(rename = "System.WorkItemType")]
    pub work_item_type: Option<String>,
    #[serde(rename = "System.Title")]
    pub title: Option<String>,
    /// Pre-rendered HTML.
    #[serde(rename = "System.Description")]
    pub description: Option<String>,
    #[serde(rename = "System.AssignedTo")]
    pub assigned_to: Option<AdoIdentity>,
    #[serde(rename = "System.CreatedBy")]
    pub created_by: Option<AdoIdentity>,
    #[serde(rename = "Microsoft.VSTS.Scheduling.OriginalEstimate")]
    pub original_estimate: Option<f64>,
    #[serde(rename = "Microsoft.VSTS.Scheduling.CompletedWork")]
    pub completed_work: Option<f64>,
    #[serde(rename = "Microsoft.VSTS.Scheduling.DueDate")]
    pub due_date: Option<String>,
    #[serde(rename = "System.CreatedDate")]
    pub created_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdoIdentity {
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
}

/// Body of the WIQL query used to enumerate ids.
#[derive(Debug, Deserialize)]
pub struct WiqlResponse {
    #[serde(rename = "workItems", default)]
    pub work_items: Vec<WiqlRef>,
}

#[derive(Debug, Deserialize)]
pub struct WiqlRef {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct AdoBatchResponse {
    #[serde(default)]
    pub value: Vec<AdoWorkItem>,
}

// ---------------------------------------------------------------------------
// Jira (offset pagination)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JiraIssue {
    pub id: Option<String>,
    pub key: Option<String>,
    #[serde(default)]
    pub fields: JiraFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JiraFields {
    pub summary: Option<String>,
    /// Atlassian Document Format tree, or null.
    #[serde(default)]
    pub description: Value,
    pub assignee: Option<JiraUser>,
    pub reporter: Option<JiraUser>,
    pub issuetype: Option<JiraIssueType>,
    /// Seconds.
    pub timeestimate: Option<f64>,
    /// Seconds.
    pub timespent: Option<f64>,
    pub duedate: Option<String>,
    pub created: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraUser {
    pub display_name: Option<String>,
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JiraIssueType {
    pub name: Option<String>,
}

/// One page of the Jira search endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraPage {
    #[serde(default)]
    pub issues: Vec<JiraIssue>,
    pub total: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ado_item_with_missing_fields_still_parses() {
        let item: AdoWorkItem = serde_json::from_value(json!({
            "id": 7,
            "fields": { "System.WorkItemType": "Bug" }
        }))
        .unwrap();
        assert_eq!(item.id, Some(7));
        assert_eq!(item.fields.title, None);
        assert_eq!(RawRecord::Ado(item).issue_type(), Some("Bug"));
    }

    #[test]
    fn jira_issue_without_description_parses_as_null() {
        let issue: JiraIssue = serde_json::from_value(json!({
            "id": "10001",
            "key": "CAMPP-1",
            "fields": { "issuetype": { "name": "Story" }, "assignee": null }
        }))
        .unwrap();
        assert!(issue.fields.description.is_null());
        assert!(issue.fields.assignee.is_none());
        assert_eq!(RawRecord::Jira(issue).issue_type(), Some("Story"));
    }
}
