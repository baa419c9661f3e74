//! Batch reporting: one run, many results.

use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;
use testrail_core::{TestRail, TestResult, Transport};
use tracing::{info, warn};

/// Where results go and what happens to the run afterwards.
#[derive(Debug, Clone, Default)]
pub struct ReportPlan {
    /// Report into this existing run instead of creating one.
    pub run_id: Option<u64>,
    pub project_id: Option<u64>,
    pub milestone_id: Option<u64>,
    pub suite_id: Option<u64>,
    pub run_name: String,
    pub run_description: String,
    pub close_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSummary {
    pub run_id: u64,
    pub sent: usize,
    pub failed: usize,
    pub closed: bool,
}

/// Read results from a JSON file: an array, or an object with `results`.
pub fn load_results(path: &Path) -> anyhow::Result<Vec<TestResult>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ResultsFile {
        Bare(Vec<TestResult>),
        Wrapped { results: Vec<TestResult> },
    }

    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let parsed: ResultsFile =
        serde_json::from_str(&raw).with_context(|| format!("parsing results in {}", path.display()))?;
    match parsed {
        ResultsFile::Bare(results) | ResultsFile::Wrapped { results } => Ok(results),
    }
}

/// Case ids in first-seen order, without duplicates.
fn case_ids(results: &[TestResult]) -> Vec<u64> {
    let mut ids = Vec::with_capacity(results.len());
    for result in results {
        if !ids.contains(&result.case_id) {
            ids.push(result.case_id);
        }
    }
    ids
}

/// Send `results` in order. A run created here gets exactly the reported
/// cases; an existing run keeps its own case selection. Individual failures
/// are counted, not fatal. Failing to create the run is.
pub async fn report<T: Transport>(
    testrail: &TestRail<T>,
    plan: &ReportPlan,
    results: &[TestResult],
) -> anyhow::Result<ReportSummary> {
    let mut failed = 0;

    let run_id = match (plan.run_id, plan.project_id) {
        (Some(run_id), _) => run_id,
        (None, Some(project_id)) => {
            let run_id = testrail
                .create_run(
                    project_id,
                    plan.milestone_id,
                    plan.suite_id,
                    &plan.run_name,
                    &plan.run_description,
                )
                .await
                .context("creating TestRail run")?;
            if testrail.update_run(run_id, &case_ids(results)).await.is_err() {
                failed += 1;
            }
            run_id
        }
        (None, None) => bail!("either a run id or a project id is required"),
    };

    let mut sent = 0;
    let mut uploads = Vec::new();
    for result in results {
        match testrail.send_result(run_id, result).await {
            Ok(outcome) => {
                sent += 1;
                uploads.extend(outcome.screenshot_upload);
            }
            Err(_) => failed += 1,
        }
    }
    for upload in uploads {
        if let Err(e) = upload.await {
            warn!("screenshot upload task failed: {}", e);
        }
    }

    let mut closed = false;
    if plan.close_run {
        match testrail.close_run(run_id).await {
            Ok(()) => closed = true,
            Err(_) => failed += 1,
        }
    }

    info!(run_id, sent, failed, "TestRail report finished");
    Ok(ReportSummary {
        run_id,
        sent,
        failed,
        closed,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::SocketAddr;

    use mock_testrail::{Db, MockConfig};
    use testrail_core::status;

    use super::*;

    fn start_server() -> (SocketAddr, Db) {
        let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = std_listener.local_addr().unwrap();
        std_listener.set_nonblocking(true).unwrap();
        let db = Db::default();
        let server_db = db.clone();

        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
                mock_testrail::run(listener, MockConfig::default(), server_db).await
            })
            .unwrap();
        });

        (addr, db)
    }

    fn testrail(addr: SocketAddr) -> TestRail {
        TestRail::new(&format!("http://{addr}"), "ci@example.com", "secret", false)
    }

    #[test]
    fn load_results_accepts_both_layouts() {
        let mut bare = tempfile::NamedTempFile::new().unwrap();
        write!(bare, r#"[{{"case_id":1,"status_id":1,"elapsed":"0s"}}]"#).unwrap();
        let results = load_results(bare.path()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].elapsed, None);

        let mut wrapped = tempfile::NamedTempFile::new().unwrap();
        write!(
            wrapped,
            r#"{{"results":[{{"case_id":1,"status_id":5,"comment":"x"}},{{"case_id":2,"status_id":1}}]}}"#
        )
        .unwrap();
        assert_eq!(load_results(wrapped.path()).unwrap().len(), 2);
    }

    #[test]
    fn load_results_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"nope\":true}}").unwrap();
        assert!(load_results(file.path()).is_err());
    }

    #[test]
    fn case_ids_keep_first_seen_order() {
        let results = vec![
            TestResult::new(3, status::PASSED, ""),
            TestResult::new(1, status::PASSED, ""),
            TestResult::new(3, status::RETEST, ""),
        ];
        assert_eq!(case_ids(&results), vec![3, 1]);
    }

    #[tokio::test]
    async fn report_creates_fills_and_closes_run() {
        let (addr, db) = start_server();
        let plan = ReportPlan {
            project_id: Some(1),
            milestone_id: Some(4),
            run_name: "CI #12".to_string(),
            close_run: true,
            ..Default::default()
        };
        let results = vec![
            TestResult::new(10, status::PASSED, "ok"),
            TestResult::new(11, status::FAILED, "nope"),
        ];

        let summary = report(&testrail(addr), &plan, &results).await.unwrap();

        assert_eq!(summary.sent, 2);
        assert_eq!(summary.failed, 0);
        assert!(summary.closed);
        let store = db.read().await;
        let run = &store.runs[&summary.run_id];
        assert_eq!(run.name, "CI #12");
        assert_eq!(run.milestone_id, Some(4));
        assert_eq!(run.case_ids, vec![10, 11]);
        assert!(run.is_completed);
        assert_eq!(store.results.len(), 2);
    }

    #[tokio::test]
    async fn report_counts_failures_and_keeps_going() {
        let (addr, db) = start_server();
        let testrail = testrail(addr);
        let run_id = testrail.create_run(1, None, None, "existing", "").await.unwrap();
        testrail.update_run(run_id, &[10]).await.unwrap();

        let plan = ReportPlan {
            run_id: Some(run_id),
            ..Default::default()
        };
        // Case 99 is not part of the run and is rejected.
        let results = vec![
            TestResult::new(99, status::PASSED, ""),
            TestResult::new(10, status::PASSED, ""),
        ];

        let summary = report(&testrail, &plan, &results).await.unwrap();

        assert_eq!(summary.run_id, run_id);
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.failed, 1);
        assert!(!summary.closed);
        assert_eq!(db.read().await.results.len(), 1);
    }

    #[tokio::test]
    async fn report_needs_run_or_project() {
        let (addr, _db) = start_server();
        let err = report(&testrail(addr), &ReportPlan::default(), &[]).await.unwrap_err();
        assert!(err.to_string().contains("run id or a project id"));
    }

    #[tokio::test]
    async fn report_fails_when_run_cannot_be_created() {
        let (addr, _db) = start_server();
        let plan = ReportPlan {
            project_id: Some(404),
            run_name: "x".to_string(),
            ..Default::default()
        };
        assert!(report(&testrail(addr), &plan, &[]).await.is_err());
    }
}
