//! Align two per-source category count tables and report drift.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde_json::Value;

use crate::error::ReconciliationInputError;
use crate::model::report::{ReconciliationReport, ReconciliationRow};
use crate::stats::IssueTypeCounts;

pub const TYPE_COLUMN: &str = "Work Item Type";
pub const COUNT_COLUMN: &str = "Count";
pub const TOTAL_LABEL: &str = "Total";

/// One-directional rewrite of source labels toward canonical labels.
///
/// Rewrites are applied once, never chained: with `A -> B` and `B -> C`,
/// `A` becomes `B`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMapping(BTreeMap<String, String>);

impl LabelMapping {
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self(pairs.into_iter().collect())
    }

    pub fn apply<'a>(&'a self, label: &'a str) -> &'a str {
        self.0.get(label).map(String::as_str).unwrap_or(label)
    }

    /// Rewrite every label and group-sum the counts.
    pub fn canonicalize(&self, counts: &IssueTypeCounts) -> IssueTypeCounts {
        counts
            .iter()
            .map(|(label, count)| (self.apply(label).to_string(), count))
            .collect()
    }
}

impl Default for LabelMapping {
    /// Jira vocabulary toward ADO vocabulary.
    fn default() -> Self {
        Self::new([
            ("Story".to_string(), "User Story".to_string()),
            ("Sub-task".to_string(), "Task".to_string()),
        ])
    }
}

/// Compare source A against source B under `mapping`.
///
/// The mapping is applied to both tables before grouping. Rows come out
/// sorted by canonical label, followed by the total row, whose status is
/// computed on its own.
pub fn reconcile(
    source_a: &IssueTypeCounts,
    source_b: &IssueTypeCounts,
    mapping: &LabelMapping,
) -> ReconciliationReport {
    let a = mapping.canonicalize(source_a);
    let b = mapping.canonicalize(source_b);

    let labels: BTreeSet<&str> = a.iter().chain(b.iter()).map(|(label, _)| label).collect();
    let rows = labels
        .into_iter()
        .map(|label| ReconciliationRow::new(label, a.get(label), b.get(label)))
        .collect();

    ReconciliationReport {
        rows,
        total: ReconciliationRow::new(TOTAL_LABEL, a.total(), b.total()),
    }
}

/// Read a statistics table: an array of rows carrying the
/// `"Work Item Type"` and `"Count"` columns.
pub fn parse_statistics_table(
    table: &str,
    value: &Value,
) -> Result<IssueTypeCounts, ReconciliationInputError> {
    let rows = value
        .as_array()
        .ok_or_else(|| ReconciliationInputError::new(table, "expected an array of rows"))?;

    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let label = row
                .get(TYPE_COLUMN)
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ReconciliationInputError::new(
                        table,
                        format!("row {i}: missing '{TYPE_COLUMN}' column"),
                    )
                })?;
            let count = row.get(COUNT_COLUMN).ok_or_else(|| {
                ReconciliationInputError::new(table, format!("row {i}: missing '{COUNT_COLUMN}' column"))
            })?;
            let count = count.as_u64().ok_or_else(|| {
                ReconciliationInputError::new(
                    table,
                    format!("row {i}: '{COUNT_COLUMN}' must be a non-negative integer, got {count}"),
                )
            })?;
            Ok::<_, ReconciliationInputError>((label.to_string(), count))
        })
        .collect()
}

pub fn read_statistics_file(path: &Path) -> Result<IssueTypeCounts, ReconciliationInputError> {
    let table = path.display().to_string();
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ReconciliationInputError::new(&table, format!("cannot read: {e}")))?;
    let value: Value = serde_json::from_str(&contents)
        .map_err(|e| ReconciliationInputError::new(&table, format!("invalid JSON: {e}")))?;
    parse_statistics_table(&table, &value)
}
