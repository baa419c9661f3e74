//! Stateless HTTP request builder and response parser for the TestRail API.
//!
//! # Design
//! `ApiClient` holds the base URL and the precomputed Basic auth header and
//! carries no mutable state between calls. Each endpoint is split into a
//! `build_*` method that produces an `HttpRequest` and a `parse_*` method
//! that consumes an `HttpResponse`; a `Transport` sits in between.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{AddResults, AddRun, AddedResult, Attachment, Run, UpdateRun};

const API_PREFIX: &str = "/index.php?/api/v2";

/// Request builder and response parser bound to one TestRail instance.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    authorization: String,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// `domain` is a host such as `acme.testrail.io`, or a full origin with
    /// scheme, which is used as is.
    pub fn new(domain: &str, username: &str, password: &str) -> Self {
        let domain = domain.trim().trim_end_matches('/');
        let origin = if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else {
            format!("https://{domain}")
        };
        let credentials = STANDARD.encode(format!("{username}:{password}"));
        Self {
            base_url: format!("{origin}{API_PREFIX}"),
            authorization: format!("Basic {credentials}"),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build an authenticated JSON POST to `path`, relative to the API root.
    pub fn build_send_data<T: Serialize>(&self, path: &str, payload: &T) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_vec(payload).map_err(|e| ApiError::Serialization(e.to_string()))?;
        Ok(HttpRequest {
            method: HttpMethod::Post,
            url: self.url(path),
            headers: vec![
                ("authorization".to_string(), self.authorization.clone()),
                ("content-type".to_string(), "application/json".to_string()),
            ],
            body: Some(body),
        })
    }

    pub fn build_add_run(&self, project_id: u64, payload: &AddRun) -> Result<HttpRequest, ApiError> {
        self.build_send_data(&format!("/add_run/{project_id}"), payload)
    }

    pub fn build_update_run(&self, run_id: u64, payload: &UpdateRun) -> Result<HttpRequest, ApiError> {
        self.build_send_data(&format!("/update_run/{run_id}"), payload)
    }

    pub fn build_close_run(&self, run_id: u64) -> Result<HttpRequest, ApiError> {
        self.build_send_data(&format!("/close_run/{run_id}"), &serde_json::json!({}))
    }

    pub fn build_add_results(&self, run_id: u64, payload: &AddResults) -> Result<HttpRequest, ApiError> {
        self.build_send_data(&format!("/add_results_for_cases/{run_id}"), payload)
    }

    /// Build a multipart upload of the file at `path` for a result.
    ///
    /// Reading the file happens here, so a missing screenshot surfaces as
    /// `ApiError::Request` before anything is sent.
    pub fn build_add_attachment(&self, result_id: u64, path: &Path) -> Result<HttpRequest, ApiError> {
        let url = self.url(&format!("/add_attachment_to_result/{result_id}"));
        let contents = std::fs::read(path).map_err(|e| ApiError::Request {
            url: url.clone(),
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        let filename = path
            .file_name()
            .map(|name| quote_filename(&name.to_string_lossy()))
            .unwrap_or_else(|| "attachment".to_string());
        let boundary = format!("----testrail-{}", uuid::Uuid::new_v4().simple());

        let mut body = Vec::with_capacity(contents.len() + 256);
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"attachment\"; filename=\"{filename}\"\r\n")
                .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type_for(path)).as_bytes());
        body.extend_from_slice(&contents);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Ok(HttpRequest {
            method: HttpMethod::Post,
            url,
            headers: vec![
                ("authorization".to_string(), self.authorization.clone()),
                (
                    "content-type".to_string(),
                    format!("multipart/form-data; boundary={boundary}"),
                ),
            ],
            body: Some(body),
        })
    }

    pub fn parse_run(&self, response: HttpResponse) -> Result<Run, ApiError> {
        parse_json(response)
    }

    /// Parse the `add_results_for_cases` answer. TestRail returns a bare
    /// array; a `{"data": [...]}` envelope is accepted too.
    pub fn parse_add_results(&self, response: HttpResponse) -> Result<Vec<AddedResult>, ApiError> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Results {
            Bare(Vec<AddedResult>),
            Wrapped { data: Vec<AddedResult> },
        }

        match parse_json(response)? {
            Results::Bare(results) | Results::Wrapped { data: results } => Ok(results),
        }
    }

    pub fn parse_close_run(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response)
    }

    pub fn parse_add_attachment(&self, response: HttpResponse) -> Result<Attachment, ApiError> {
        parse_json(response)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

fn parse_json<T: DeserializeOwned>(response: HttpResponse) -> Result<T, ApiError> {
    check_status(&response)?;
    serde_json::from_str(&response.body).map_err(|e| ApiError::Deserialization(e.to_string()))
}

/// Map a non-2xx status to `ApiError::Response`.
fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    Err(ApiError::Response {
        url: response.url.clone(),
        status: response.status,
        status_text: response.status_text.clone(),
        error_text: error_text(response),
        body: response.body.clone(),
        headers: response.headers.clone(),
    })
}

/// TestRail reports failures as `{"error": "..."}`.
fn error_text(response: &HttpResponse) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: String,
    }

    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(&response.body) {
        return parsed.error;
    }
    let raw = response.body.trim();
    if raw.is_empty() {
        response.status_text.clone()
    } else {
        raw.to_string()
    }
}

/// Percent-encode the characters that would break a quoted
/// `Content-Disposition` parameter, as browsers do for form uploads.
fn quote_filename(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '"' => quoted.push_str("%22"),
            '\r' => quoted.push_str("%0D"),
            '\n' => quoted.push_str("%0A"),
            other => quoted.push(other),
        }
    }
    quoted
}

fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("txt") | Some("log") => "text/plain",
        _ => "application/octet-stream",
    }
}
