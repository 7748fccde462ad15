use std::collections::BTreeMap;

use crate::model::raw::RawRecord;
use crate::model::report::IssueTypeCount;

/// Occurrences per `issue_type` label, exactly as the source spells it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueTypeCounts(BTreeMap<String, u64>);

impl IssueTypeCounts {
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut counts = BTreeMap::new();
        for label in labels {
            *counts.entry(label.as_ref().to_string()).or_insert(0) += 1;
        }
        Self(counts)
    }

    /// Every raw record lands in exactly one bucket; a record without a
    /// type is counted under the empty label.
    pub fn from_raw(records: &[RawRecord]) -> Self {
        Self::from_labels(records.iter().map(|r| r.issue_type().unwrap_or_default()))
    }

    pub fn get(&self, label: &str) -> u64 {
        self.0.get(label).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn to_rows(&self) -> Vec<IssueTypeCount> {
        self.iter()
            .map(|(issue_type, count)| IssueTypeCount {
                issue_type: issue_type.to_string(),
                count,
            })
            .collect()
    }
}

impl FromIterator<(String, u64)> for IssueTypeCounts {
    /// Repeated labels are summed.
    fn from_iter<T: IntoIterator<Item = (String, u64)>>(iter: T) -> Self {
        let mut counts = BTreeMap::new();
        for (label, count) in iter {
            *counts.entry(label).or_insert(0) += count;
        }
        Self(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::tests::{ado_item, jira_issue};

    #[test]
    fn counts_sum_to_input_length() {
        let labels = ["Bug", "Task", "Bug", "Epic", "Task", "Bug"];
        let counts = IssueTypeCounts::from_labels(labels);
        assert_eq!(counts.total(), labels.len() as u64);
        assert_eq!(counts.get("Bug"), 3);
        assert_eq!(counts.get("Story"), 0);
        assert_eq!(counts.iter().count(), 3);
    }

    #[test]
    fn order_does_not_matter() {
        let a = IssueTypeCounts::from_labels(["Bug", "Task", "Bug"]);
        let b = IssueTypeCounts::from_labels(["Task", "Bug", "Bug"]);
        assert_eq!(a, b);
    }

    #[test]
    fn labels_are_not_normalized() {
        let counts = IssueTypeCounts::from_labels(["Story", "story", "User Story"]);
        assert_eq!(counts.iter().count(), 3);
    }

    #[test]
    fn raw_records_without_type_still_count() {
        let mut untyped = ado_item(3, "Bug");
        untyped.fields.work_item_type = None;
        let raw = vec![
            RawRecord::Ado(ado_item(1, "Bug")),
            RawRecord::Jira(jira_issue(2, "Story")),
            RawRecord::Ado(untyped),
        ];
        let counts = IssueTypeCounts::from_raw(&raw);
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.get(""), 1);
    }

    #[test]
    fn rows_are_sorted_by_label() {
        let rows = IssueTypeCounts::from_labels(["Task", "Bug"]).to_rows();
        let labels: Vec<&str> = rows.iter().map(|r| r.issue_type.as_str()).collect();
        assert_eq!(labels, vec!["Bug", "Task"]);
    }

    #[test]
    fn collecting_pairs_sums_duplicates() {
        let counts: IssueTypeCounts = vec![("Task".to_string(), 3), ("Task".to_string(), 2)]
            .into_iter()
            .collect();
        assert_eq!(counts.get("Task"), 5);
    }
}
