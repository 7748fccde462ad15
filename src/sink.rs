use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::model::report::{
    IssueTypeCount, ProjectReport, ReconciliationDetails, ReconciliationReport, RunDetails,
    SourceKind,
};
use crate::model::work_item::WorkItemRecord;

/// Durable destination for a run's results.
///
/// Implementations must not share mutable state between projects; each
/// project writes only its own outputs.
pub trait ReportSink: Send + Sync {
    fn write_project(&self, report: &ProjectReport) -> Result<()>;
    fn write_reconciliation(
        &self,
        name: &str,
        details: &ReconciliationDetails,
        report: &ReconciliationReport,
    ) -> Result<PathBuf>;
}

/// Writes pretty-printed JSON files into one output directory. Project
/// files are prefixed with their source, so an ADO and a Jira project of
/// the same name never share a file.
pub struct JsonReportSink {
    dir: PathBuf,
}

#[derive(Serialize)]
struct DetailsFile<'a> {
    report: &'a RunDetails,
    records: &'a [WorkItemRecord],
}

#[derive(Serialize)]
struct ReconciliationFile<'a> {
    report: &'a ReconciliationDetails,
    rows: &'a ReconciliationReport,
}

impl JsonReportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn details_path(&self, source: SourceKind, project: &str) -> PathBuf {
        self.dir.join(format!(
            "{}_{}_details.json",
            source.as_str(),
            file_stem(project)
        ))
    }

    pub fn statistics_path(&self, source: SourceKind, project: &str) -> PathBuf {
        self.dir.join(format!(
            "{}_{}_statistics.json",
            source.as_str(),
            file_stem(project)
        ))
    }

    pub fn reconciliation_path(&self, name: &str) -> PathBuf {
        self.dir
            .join(format!("{}_reconciliation_report.json", file_stem(name)))
    }

    fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let json = serde_json::to_string_pretty(value)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

impl ReportSink for JsonReportSink {
    fn write_project(&self, report: &ProjectReport) -> Result<()> {
        let (source, project) = (report.details.source, &report.details.project_name);
        self.write_json(
            &self.details_path(source, project),
            &DetailsFile {
                report: &report.details,
                records: &report.records,
            },
        )?;
        self.write_json::<[IssueTypeCount]>(
            &self.statistics_path(source, project),
            &report.statistics,
        )?;
        Ok(())
    }

    fn write_reconciliation(
        &self,
        name: &str,
        details: &ReconciliationDetails,
        report: &ReconciliationReport,
    ) -> Result<PathBuf> {
        let path = self.reconciliation_path(name);
        self.write_json(
            &path,
            &ReconciliationFile {
                report: details,
                rows: report,
            },
        )?;
        Ok(path)
    }
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::report::{DiscoveryStatus, ReconciliationRow};
    use crate::reconcile::read_statistics_file;

    fn details(source: SourceKind, project: &str) -> RunDetails {
        RunDetails {
            source,
            report_title: source.report_title().into(),
            purpose: "test".into(),
            run_date: "01-Jan-2024 09:00 AM".into(),
            run_duration: "0:00:01".into(),
            run_by: "tester".into(),
            total_issue_count: 3,
            status: DiscoveryStatus::Completed,
            project_name: project.into(),
            base_url: "https://dev.azure.com".into(),
            username: String::new(),
            project_key: "acme".into(),
        }
    }

    #[test]
    fn statistics_file_round_trips_into_reconciler() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonReportSink::new(dir.path());
        let report = ProjectReport {
            details: details(SourceKind::Ado, "Newt CAMPP1"),
            records: Vec::new(),
            statistics: vec![
                IssueTypeCount {
                    issue_type: "Bug".into(),
                    count: 2,
                },
                IssueTypeCount {
                    issue_type: "Task".into(),
                    count: 1,
                },
            ],
        };
        sink.write_project(&report).unwrap();

        assert!(sink.details_path(SourceKind::Ado, "Newt CAMPP1").exists());
        let counts =
            read_statistics_file(&sink.statistics_path(SourceKind::Ado, "Newt CAMPP1")).unwrap();
        assert_eq!(counts.get("Bug"), 2);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn project_names_cannot_escape_output_dir() {
        let sink = JsonReportSink::new("/tmp/out");
        assert_eq!(
            sink.details_path(SourceKind::Jira, "a/b"),
            PathBuf::from("/tmp/out/jira_a_b_details.json")
        );
    }

    fn single_type_report(source: SourceKind, project: &str, issue_type: &str) -> ProjectReport {
        ProjectReport {
            details: details(source, project),
            records: Vec::new(),
            statistics: vec![IssueTypeCount {
                issue_type: issue_type.into(),
                count: 5,
            }],
        }
    }

    #[test]
    fn same_named_ado_and_jira_projects_keep_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonReportSink::new(dir.path());
        sink.write_project(&single_type_report(SourceKind::Jira, "Newt CAMPP", "Story"))
            .unwrap();
        sink.write_project(&single_type_report(SourceKind::Ado, "Newt CAMPP", "User Story"))
            .unwrap();

        let mut files: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(
            files,
            vec![
                "ado_Newt CAMPP_details.json",
                "ado_Newt CAMPP_statistics.json",
                "jira_Newt CAMPP_details.json",
                "jira_Newt CAMPP_statistics.json",
            ]
        );

        let jira =
            read_statistics_file(&sink.statistics_path(SourceKind::Jira, "Newt CAMPP")).unwrap();
        let ado =
            read_statistics_file(&sink.statistics_path(SourceKind::Ado, "Newt CAMPP")).unwrap();
        assert_eq!(jira.get("Story"), 5);
        assert_eq!(ado.get("User Story"), 5);
        assert_eq!(jira.get("User Story"), 0);
    }

    #[test]
    fn reconciliation_file_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonReportSink::new(dir.path().join("nested"));
        let report = ReconciliationReport {
            rows: vec![ReconciliationRow::new("Bug", 1, 1)],
            total: ReconciliationRow::new("Total", 1, 1),
        };
        let details = ReconciliationDetails {
            report_title: "Reconciliation Report".into(),
            purpose: "test".into(),
            run_date: String::new(),
            run_duration: String::new(),
            run_by: String::new(),
            jira_project: "J".into(),
            ado_project: "A".into(),
            total_rows: 1,
            matched_rows: 1,
            unmatched_rows: 0,
        };
        let path = sink.write_reconciliation("Newt", &details, &report).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written["rows"]["total"]["status"], "Matched");
        assert_eq!(written["report"]["matched_rows"], 1);
    }
}
