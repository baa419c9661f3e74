//! Executes `HttpRequest`s against the network.
//!
//! # Design
//! The client only describes requests; a `Transport` performs them. The
//! production implementation uses a blocking `ureq` agent with status-code
//! errors disabled, so 4xx/5xx answers come back as data and the client
//! decides what they mean. Tests plug in scripted transports.

use std::time::Duration;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A synchronous request executor.
///
/// Implementations return `ApiError::NoResponse` when the request went out
/// without an answer and `ApiError::Request` when it could not be sent.
pub trait Transport: Send + Sync + 'static {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

/// `ureq`-backed transport.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    /// `timeout` bounds the whole call; `None` waits indefinitely.
    pub fn new(timeout: Option<Duration>) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(Some(DEFAULT_TIMEOUT))
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let sent = match method {
            HttpMethod::Post => {
                let mut builder = self.agent.post(&url);
                for (name, value) in &headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                match body {
                    Some(bytes) => builder.send(&bytes[..]),
                    None => builder.send_empty(),
                }
            }
        };
        let mut response = sent.map_err(|e| classify(method, &url, e))?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| classify(method, &url, e))?;

        Ok(HttpResponse {
            url,
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

/// Requests rejected before hitting the wire are `Request` errors; anything
/// that fails after dispatch (DNS, connect, I/O, timeout) is `NoResponse`.
fn classify(method: HttpMethod, url: &str, err: ureq::Error) -> ApiError {
    match err {
        ureq::Error::BadUri(_) | ureq::Error::Http(_) => {
            ApiError::Request {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
        other => ApiError::NoResponse {
            method,
            url: url.to_string(),
            message: other.to_string(),
        },
    }
}
