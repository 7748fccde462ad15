//! Per-project discovery runs and the reconciliation step.
//!
//! Each project gets its own [`RetryController`] and writes only its own
//! outputs; projects of one run share nothing but the cancel token.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::model::report::{
    DiscoveryStatus, ProjectReport, ReconciliationDetails, ReconciliationReport, RunDetails,
    SourceKind,
};
use crate::normalize::{normalize_all, MalformedPolicy};
use crate::providers::ado::AdoClient;
use crate::providers::jira::JiraClient;
use crate::providers::{BatchSource, PageSource};
use crate::reconcile::{read_statistics_file, reconcile, LabelMapping};
use crate::retrieval::{retrieve_batched, retrieve_paged, Retrieval};
use crate::retry::{CancelToken, RetryController, RetryPolicy, Sleeper};
use crate::sink::ReportSink;
use crate::stats::IssueTypeCounts;

const RUN_DATE_FORMAT: &str = "%d-%b-%Y %I:%M %p";
const RECONCILIATION_REPORT_TITLE: &str = "Reconciliation Report";

/// Shared, read-only settings for every project of one run.
#[derive(Clone)]
pub struct RunContext {
    pub policy: RetryPolicy,
    pub sleeper: Arc<dyn Sleeper>,
    pub cancel: CancelToken,
    pub sink: Arc<dyn ReportSink>,
    pub malformed: MalformedPolicy,
    pub run_by: String,
}

impl RunContext {
    fn controller(&self) -> RetryController {
        RetryController::new(self.policy.clone(), self.sleeper.clone(), self.cancel.clone())
    }
}

/// Identifies a project in its report header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    pub project_name: String,
    pub base_url: String,
    pub username: String,
    /// Organization for ADO, project key for Jira.
    pub project_key: String,
}

pub enum ProjectSource {
    Ado(Box<dyn BatchSource>),
    Jira(Box<dyn PageSource>),
}

pub struct ProjectJob {
    pub info: ProjectInfo,
    pub source: ProjectSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSummary {
    pub project: String,
    pub status: DiscoveryStatus,
    pub total_issue_count: usize,
    pub records: usize,
    pub skipped_units: usize,
    pub skipped_records: usize,
}

pub fn ado_jobs(config: &AppConfig) -> Result<Vec<ProjectJob>> {
    let timeout = config.retry_policy().request_timeout;
    config
        .ado_projects()
        .iter()
        .map(|p| -> Result<ProjectJob> {
            let client = AdoClient::new(&p.org_url, &p.organization, &p.pat, timeout)?;
            Ok(ProjectJob {
                info: ProjectInfo {
                    project_name: p.name.clone(),
                    base_url: p.org_url.clone(),
                    username: p.username.clone(),
                    project_key: p.organization.clone(),
                },
                source: ProjectSource::Ado(Box::new(client)),
            })
        })
        .collect()
}

pub fn jira_jobs(config: &AppConfig) -> Result<Vec<ProjectJob>> {
    let timeout = config.retry_policy().request_timeout;
    config
        .jira_projects()
        .iter()
        .map(|p| -> Result<ProjectJob> {
            let client = JiraClient::new(&p.base_url, &p.username, &p.api_token, timeout)?;
            Ok(ProjectJob {
                info: ProjectInfo {
                    project_name: p.name.clone(),
                    base_url: p.base_url.clone(),
                    username: p.username.clone(),
                    project_key: p.key.clone(),
                },
                source: ProjectSource::Jira(Box::new(client)),
            })
        })
        .collect()
}

pub async fn run_ado_project(
    ctx: &RunContext,
    source: &dyn BatchSource,
    info: &ProjectInfo,
) -> Result<ProjectSummary> {
    let started = Instant::now();
    info!(source = source.name(), project = %info.project_name, "starting discovery");
    let retrieval = retrieve_batched(source, &ctx.controller(), &info.project_name).await;
    let total = retrieval.enumerated.unwrap_or(retrieval.records.len());
    finish(ctx, info, SourceKind::Ado, started, retrieval, total)
}

pub async fn run_jira_project(
    ctx: &RunContext,
    source: &dyn PageSource,
    info: &ProjectInfo,
) -> Result<ProjectSummary> {
    let started = Instant::now();
    info!(source = source.name(), project = %info.project_name, "starting discovery");
    let retrieval = retrieve_paged(source, &ctx.controller(), &info.project_key).await;
    let total = retrieval.records.len();
    finish(ctx, info, SourceKind::Jira, started, retrieval, total)
}

/// Normalize, count, and persist whatever was retrieved. An aborted
/// project is still written out, marked failed, before its error is
/// returned.
fn finish(
    ctx: &RunContext,
    info: &ProjectInfo,
    source: SourceKind,
    started: Instant,
    mut retrieval: Retrieval,
    total_issue_count: usize,
) -> Result<ProjectSummary> {
    let project = info.project_name.as_str();
    let statistics = IssueTypeCounts::from_raw(&retrieval.records).to_rows();
    let mut normalized = normalize_all(&retrieval.records, project, ctx.malformed);

    let failure = match (retrieval.aborted.take(), normalized.aborted.take()) {
        (Some(err), _) => Some(anyhow::Error::new(err)),
        (None, Some(err)) => Some(anyhow::Error::new(err)),
        (None, None) => None,
    };
    let status = if failure.is_some() {
        DiscoveryStatus::Failed
    } else if !retrieval.is_complete() || !normalized.skipped.is_empty() {
        DiscoveryStatus::Partial
    } else {
        DiscoveryStatus::Completed
    };

    for unit in &retrieval.skipped {
        warn!(project, unit = %unit.unit, expected = ?unit.expected, reason = %unit.reason, "unit skipped");
    }

    let summary = ProjectSummary {
        project: project.to_string(),
        status,
        total_issue_count,
        records: normalized.records.len(),
        skipped_units: retrieval.skipped.len(),
        skipped_records: normalized.skipped.len(),
    };

    let report = ProjectReport {
        details: RunDetails {
            source,
            report_title: source.report_title().to_string(),
            purpose: format!("Inventory of work items in {project} for migration reconciliation"),
            run_date: run_date(),
            run_duration: format_duration(started.elapsed()),
            run_by: ctx.run_by.clone(),
            total_issue_count,
            status,
            project_name: project.to_string(),
            base_url: info.base_url.clone(),
            username: info.username.clone(),
            project_key: info.project_key.clone(),
        },
        records: normalized.records,
        statistics,
    };
    ctx.sink.write_project(&report)?;

    match failure {
        Some(err) => {
            error!(project, error = %err, records = summary.records, "discovery failed");
            Err(err.context(format!("Discovery of {project} failed")))
        }
        None => {
            info!(
                project,
                status = ?summary.status,
                records = summary.records,
                skipped_units = summary.skipped_units,
                units = retrieval.units,
                "discovery finished"
            );
            Ok(summary)
        }
    }
}

async fn run_job(ctx: &RunContext, job: &ProjectJob) -> Result<ProjectSummary> {
    match &job.source {
        ProjectSource::Ado(source) => run_ado_project(ctx, source.as_ref(), &job.info).await,
        ProjectSource::Jira(source) => run_jira_project(ctx, source.as_ref(), &job.info).await,
    }
}

/// Run every job with at most `parallel` projects in flight. One project's
/// failure does not stop the others.
pub async fn run_all(
    ctx: &RunContext,
    jobs: Vec<ProjectJob>,
    parallel: usize,
) -> Vec<(String, Result<ProjectSummary>)> {
    stream::iter(jobs)
        .map(|job| async move {
            let result = run_job(ctx, &job).await;
            (job.info.project_name, result)
        })
        .buffer_unordered(parallel.max(1))
        .collect()
        .await
}

/// Cancel `token` once `timeout` has elapsed. Abort the returned handle
/// when the run ends first.
pub fn spawn_deadline(token: CancelToken, timeout: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        warn!(?timeout, "run timeout reached, cancelling");
        token.cancel();
    })
}

pub struct ReconciliationRequest {
    pub name: String,
    /// Source A.
    pub jira_statistics: PathBuf,
    /// Source B.
    pub ado_statistics: PathBuf,
    pub jira_project: String,
    pub ado_project: String,
}

pub fn run_reconciliation(
    sink: &dyn ReportSink,
    mapping: &LabelMapping,
    run_by: &str,
    request: &ReconciliationRequest,
) -> Result<(ReconciliationReport, PathBuf)> {
    let started = Instant::now();
    let jira = read_statistics_file(&request.jira_statistics)?;
    let ado = read_statistics_file(&request.ado_statistics)?;
    if jira.is_empty() && ado.is_empty() {
        return Err(anyhow!("Both statistics tables are empty, nothing to reconcile"));
    }

    let report = reconcile(&jira, &ado, mapping);
    let details = ReconciliationDetails {
        report_title: RECONCILIATION_REPORT_TITLE.to_string(),
        purpose: format!(
            "Compare work item type counts of Jira {} against ADO {}",
            request.jira_project, request.ado_project
        ),
        run_date: run_date(),
        run_duration: format_duration(started.elapsed()),
        run_by: run_by.to_string(),
        jira_project: request.jira_project.clone(),
        ado_project: request.ado_project.clone(),
        total_rows: report.rows.len(),
        matched_rows: report.matched_rows(),
        unmatched_rows: report.unmatched_rows(),
    };
    let path = sink.write_reconciliation(&request.name, &details, &report)?;
    info!(
        name = %request.name,
        matched = details.matched_rows,
        unmatched = details.unmatched_rows,
        total = ?report.total.status,
        "reconciliation written"
    );
    Ok((report, path))
}

fn run_date() -> String {
    chrono::Local::now().format(RUN_DATE_FORMAT).to_string()
}

/// `H:MM:SS`, hours unbounded.
pub fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::model::report::MatchStatus;
    use crate::providers::tests::{MockBatchSource, MockPageSource};
    use crate::retry::RecordingSleeper;
    use crate::sink::JsonReportSink;

    #[derive(Default)]
    struct MemorySink {
        projects: Mutex<Vec<ProjectReport>>,
    }

    impl MemorySink {
        fn reports(&self) -> Vec<ProjectReport> {
            self.projects.lock().unwrap().clone()
        }
    }

    impl ReportSink for MemorySink {
        fn write_project(&self, report: &ProjectReport) -> Result<()> {
            self.projects.lock().unwrap().push(report.clone());
            Ok(())
        }

        fn write_reconciliation(
            &self,
            name: &str,
            _details: &ReconciliationDetails,
            _report: &ReconciliationReport,
        ) -> Result<PathBuf> {
            Ok(PathBuf::from(name))
        }
    }

    fn context(sink: Arc<MemorySink>, malformed: MalformedPolicy) -> RunContext {
        RunContext {
            policy: RetryPolicy::default(),
            sleeper: Arc::new(RecordingSleeper::new()),
            cancel: CancelToken::new(),
            sink,
            malformed,
            run_by: "tester".into(),
        }
    }

    fn info(name: &str) -> ProjectInfo {
        ProjectInfo {
            project_name: name.into(),
            base_url: "https://example.test".into(),
            username: "bot".into(),
            project_key: name.into(),
        }
    }

    #[tokio::test]
    async fn ado_project_completes_with_statistics() {
        let sink = Arc::new(MemorySink::default());
        let ctx = context(sink.clone(), MalformedPolicy::Abort);
        let source = MockBatchSource::with_ids(450);

        let summary = run_ado_project(&ctx, &source, &info("Newt")).await.unwrap();
        assert_eq!(summary.status, DiscoveryStatus::Completed);
        assert_eq!(summary.records, 450);
        assert_eq!(summary.total_issue_count, 450);

        let reports = sink.reports();
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.details.source, SourceKind::Ado);
        assert_eq!(report.details.report_title, "ADO Discovery Report");
        assert_eq!(report.details.run_by, "tester");
        let counted: u64 = report.statistics.iter().map(|r| r.count).sum();
        assert_eq!(counted, 450);
    }

    #[tokio::test]
    async fn skipped_chunk_marks_project_partial() {
        let sink = Arc::new(MemorySink::default());
        let ctx = context(sink.clone(), MalformedPolicy::Abort);
        let source = MockBatchSource::with_ids(450).failing_chunk(1, 3);

        let summary = run_ado_project(&ctx, &source, &info("Newt")).await.unwrap();
        assert_eq!(summary.status, DiscoveryStatus::Partial);
        assert_eq!(summary.records, 250);
        assert_eq!(summary.skipped_units, 1);
        // the header still reports every enumerated id
        assert_eq!(sink.reports()[0].details.total_issue_count, 450);
    }

    #[tokio::test]
    async fn aborted_project_is_persisted_then_reported() {
        let sink = Arc::new(MemorySink::default());
        let ctx = context(sink.clone(), MalformedPolicy::Abort);
        let source = MockBatchSource::with_ids(450).rejecting_chunk(1, 403);

        let err = run_ado_project(&ctx, &source, &info("Newt")).await.unwrap_err();
        assert!(err.to_string().contains("Newt"));

        let reports = sink.reports();
        assert_eq!(reports[0].details.status, DiscoveryStatus::Failed);
        assert_eq!(reports[0].records.len(), 200);
    }

    #[tokio::test]
    async fn jira_project_uses_page_totals() {
        let sink = Arc::new(MemorySink::default());
        let ctx = context(sink.clone(), MalformedPolicy::Abort);
        let source = MockPageSource::with_issues(150);

        let summary = run_jira_project(&ctx, &source, &info("CAMPP")).await.unwrap();
        assert_eq!(summary.status, DiscoveryStatus::Completed);
        assert_eq!(summary.total_issue_count, 150);

        let report = &sink.reports()[0];
        assert_eq!(report.details.source, SourceKind::Jira);
        assert_eq!(report.details.report_title, "JIRA Discovery Report");
        assert!(report
            .records
            .iter()
            .all(|r| !r.reporter_time_zone.is_empty()));
    }

    #[tokio::test]
    async fn run_all_runs_every_project_despite_failures() {
        let sink = Arc::new(MemorySink::default());
        let ctx = context(sink.clone(), MalformedPolicy::Abort);
        let jobs = vec![
            ProjectJob {
                info: info("A"),
                source: ProjectSource::Ado(Box::new(MockBatchSource::with_ids(10))),
            },
            ProjectJob {
                info: info("B"),
                source: ProjectSource::Ado(Box::new(MockBatchSource::with_ids(10).failing_ids())),
            },
            ProjectJob {
                info: info("C"),
                source: ProjectSource::Jira(Box::new(MockPageSource::with_issues(5))),
            },
        ];

        let mut results = run_all(&ctx, jobs, 2).await;
        results.sort_by(|a, b| a.0.cmp(&b.0));
        let names: Vec<&str> = results.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_err());
        assert!(results[2].1.is_ok());
        assert_eq!(sink.reports().len(), 3);
    }

    #[tokio::test]
    async fn cancelled_run_fails_remaining_projects() {
        let sink = Arc::new(MemorySink::default());
        let ctx = context(sink.clone(), MalformedPolicy::Abort);
        ctx.cancel.cancel();

        let err = run_ado_project(&ctx, &MockBatchSource::with_ids(10), &info("A"))
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("cancelled"));
        assert_eq!(sink.reports()[0].details.status, DiscoveryStatus::Failed);
    }

    #[tokio::test]
    async fn deadline_cancels_token() {
        let token = CancelToken::new();
        let handle = spawn_deadline(token.clone(), Duration::from_millis(10));
        handle.await.unwrap();
        assert!(token.is_cancelled());
    }

    #[test]
    fn durations_render_as_hours_minutes_seconds() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0:00:00");
        assert_eq!(format_duration(Duration::from_secs(3_725)), "1:02:05");
        assert_eq!(format_duration(Duration::from_secs(90_061)), "25:01:01");
    }

    #[test]
    fn reconciliation_reads_both_tables_and_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let jira = dir.path().join("jira_statistics.json");
        let ado = dir.path().join("ado_statistics.json");
        std::fs::write(
            &jira,
            r#"[{"Work Item Type":"Story","Count":5},{"Work Item Type":"Task","Count":3},{"Work Item Type":"Sub-task","Count":2}]"#,
        )
        .unwrap();
        std::fs::write(
            &ado,
            r#"[{"Work Item Type":"User Story","Count":5},{"Work Item Type":"Task","Count":4}]"#,
        )
        .unwrap();

        let sink = JsonReportSink::new(dir.path());
        let request = ReconciliationRequest {
            name: "Newt".into(),
            jira_statistics: jira,
            ado_statistics: ado,
            jira_project: "CAMPP".into(),
            ado_project: "Newt CAMPP1".into(),
        };
        let (report, path) =
            run_reconciliation(&sink, &LabelMapping::default(), "tester", &request).unwrap();

        assert_eq!(report.total.status, MatchStatus::Unmatched);
        assert_eq!(report.matched_rows(), 1);
        assert!(path.ends_with("Newt_reconciliation_report.json"));
        assert!(path.exists());
    }

    #[test]
    fn reconciliation_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, r#"[{"Type":"Bug","Count":1}]"#).unwrap();
        let request = ReconciliationRequest {
            name: "x".into(),
            jira_statistics: bad.clone(),
            ado_statistics: bad,
            jira_project: String::new(),
            ado_project: String::new(),
        };
        let sink = JsonReportSink::new(dir.path());
        let err = run_reconciliation(&sink, &LabelMapping::default(), "t", &request).unwrap_err();
        assert!(err.to_string().contains("Work Item Type"));
    }
}
