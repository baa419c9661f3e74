//! Run and result reporting on top of `ApiClient`.
//!
//! # Design
//! `TestRail` turns each reporting step into a single request: build the
//! payload, execute it on the blocking pool, parse the answer. Every
//! outcome is logged here, so callers can drop the returned `Result` and
//! still get a readable trace. Nothing is retried or queued, and no state
//! survives between calls apart from the client and transport.

use std::path::Path;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::client::ApiClient;
use crate::error::{ApiError, FailureDetail};
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::{Transport, UreqTransport};
use crate::types::{AddResults, AddRun, TestResult, UpdateRun};

/// Outcome of a successful `send_result`.
#[derive(Debug)]
pub struct SentResult {
    pub result_id: u64,
    /// Handle of the screenshot upload, when one was started. Awaiting it is
    /// optional; the upload logs its own outcome.
    pub screenshot_upload: Option<JoinHandle<()>>,
}

/// Reports runs and results to one TestRail instance.
pub struct TestRail<T: Transport = UreqTransport> {
    client: ApiClient,
    transport: Arc<T>,
    screenshots_enabled: bool,
}

impl TestRail<UreqTransport> {
    pub fn new(domain: &str, username: &str, password: &str, screenshots_enabled: bool) -> Self {
        Self::with_transport(
            ApiClient::new(domain, username, password),
            UreqTransport::default(),
            screenshots_enabled,
        )
    }
}

impl<T: Transport> TestRail<T> {
    pub fn with_transport(client: ApiClient, transport: T, screenshots_enabled: bool) -> Self {
        Self {
            client,
            transport: Arc::new(transport),
            screenshots_enabled,
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Create a run without cases in `project_id` and return its id.
    pub async fn create_run(
        &self,
        project_id: u64,
        milestone_id: Option<u64>,
        suite_id: Option<u64>,
        name: &str,
        description: &str,
    ) -> Result<u64, ApiError> {
        let payload = AddRun {
            name: name.to_string(),
            description: description.to_string(),
            include_all: false,
            case_ids: Vec::new(),
            milestone_id,
            suite_id,
        };
        let outcome = async {
            let request = self.client.build_add_run(project_id, &payload)?;
            let response = self.execute(request).await?;
            self.client.parse_run(response)
        }
        .await;

        match outcome {
            Ok(run) => {
                info!(run_id = run.id, "TestRun created in TestRail: {}", name);
                Ok(run.id)
            }
            Err(err) => {
                error!(
                    "Could not create TestRail run for project P{}: {} {} >> {}",
                    project_id,
                    err.status_code(),
                    err.status_text(),
                    err.error_text()
                );
                Err(err)
            }
        }
    }

    /// Replace the case list of a run.
    pub async fn update_run(&self, run_id: u64, case_ids: &[u64]) -> Result<(), ApiError> {
        let payload = UpdateRun {
            include_all: false,
            case_ids: case_ids.to_vec(),
        };
        let outcome = async {
            let request = self.client.build_update_run(run_id, &payload)?;
            let response = self.execute(request).await?;
            self.client.parse_run(response)
        }
        .await;

        match outcome {
            Ok(_) => {
                info!(run_id, cases = case_ids.len(), "TestRun updated in TestRail: R{}", run_id);
                Ok(())
            }
            Err(err) => {
                error!(
                    "Could not add TestRail test cases to run R{}: {} {} >> {}",
                    run_id,
                    err.status_code(),
                    err.status_text(),
                    err.error_text()
                );
                Err(err)
            }
        }
    }

    pub async fn close_run(&self, run_id: u64) -> Result<(), ApiError> {
        let outcome = async {
            let request = self.client.build_close_run(run_id)?;
            let response = self.execute(request).await?;
            self.client.parse_close_run(response)
        }
        .await;

        match outcome {
            Ok(()) => {
                info!(run_id, "TestRun closed in TestRail: R{}", run_id);
                Ok(())
            }
            Err(err) => {
                error!(
                    "Could not close TestRail run R{}: {} {} >> {}",
                    run_id,
                    err.status_code(),
                    err.status_text(),
                    err.error_text()
                );
                Err(err)
            }
        }
    }

    /// Submit one result. When screenshots are enabled and the result has a
    /// screenshot, its upload is started in the background.
    pub async fn send_result(&self, run_id: u64, result: &TestResult) -> Result<SentResult, ApiError> {
        let payload = AddResults {
            results: vec![result.to_entry()],
        };
        let outcome = async {
            let request = self.client.build_add_results(run_id, &payload)?;
            let response = self.execute(request).await?;
            let added = self.client.parse_add_results(response)?;
            added
                .first()
                .map(|first| first.id)
                .ok_or_else(|| ApiError::Deserialization("empty results array".to_string()))
        }
        .await;

        let result_id = match outcome {
            Ok(id) => id,
            Err(err) => {
                log_result_failure(result.case_id, &err);
                return Err(err);
            }
        };

        info!(
            result_id,
            case_id = result.case_id,
            "TestRail result {} sent for TestCase C{}",
            result_id,
            result.case_id
        );

        let screenshot_upload = match result.screenshot_path() {
            Some(path) if self.screenshots_enabled => {
                debug!("sending screenshot to TestRail for TestCase C{}", result.case_id);
                Some(self.spawn_screenshot_upload(result.case_id, result_id, path.to_string()))
            }
            _ => None,
        };

        Ok(SentResult {
            result_id,
            screenshot_upload,
        })
    }

    fn spawn_screenshot_upload(&self, case_id: u64, result_id: u64, path: String) -> JoinHandle<()> {
        let client = self.client.clone();
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            let upload = tokio::task::spawn_blocking(move || {
                let request = client.build_add_attachment(result_id, Path::new(&path))?;
                let response = transport.execute(request)?;
                client.parse_add_attachment(response)
            })
            .await;

            match upload {
                Ok(Ok(attachment)) => debug!(
                    attachment_id = attachment.attachment_id,
                    "screenshot attached to TestRail result {} for TestCase C{}",
                    result_id,
                    case_id
                ),
                Ok(Err(err)) => error!(
                    "Could not attach screenshot to TestRail result {} for TestCase C{}: {}",
                    result_id, case_id, err
                ),
                Err(join) => error!("screenshot upload for TestCase C{} aborted: {}", case_id, join),
            }
        })
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let transport = Arc::clone(&self.transport);
        let method = request.method;
        let url = request.url.clone();
        tokio::task::spawn_blocking(move || transport.execute(request))
            .await
            .map_err(|e| ApiError::NoResponse {
                method,
                url,
                message: format!("transport task failed: {e}"),
            })?
    }
}

fn log_result_failure(case_id: u64, err: &ApiError) {
    error!(
        "Could not send TestRail result for case C{}: {} {} >> {}",
        case_id,
        err.status_code(),
        err.status_text(),
        err.error_text()
    );
    error!("underlying error: {}", err);
    if let Some(url) = err.url() {
        error!("TestRail URL: {}", url);
    }

    match err.detail() {
        FailureDetail::Response { body, status, headers } => {
            error!("response body: {}", body);
            error!("response status: {}", status);
            error!("response headers: {:?}", headers);
        }
        FailureDetail::Request { method, url } => {
            error!("request sent without response: {} {}", method, url);
        }
        FailureDetail::Message(message) => {
            error!("error message: {}", message);
        }
    }
}
