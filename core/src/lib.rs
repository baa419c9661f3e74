//! Reporting client core for the TestRail API.
//!
//! # Overview
//! Creates, updates and closes test runs and submits results (with optional
//! screenshot attachments) through TestRail's REST API v2.
//!
//! # Design
//! - `ApiClient` builds `HttpRequest` values and parses `HttpResponse`
//!   values without touching the network (host-does-IO pattern).
//! - `Transport` executes requests; `UreqTransport` is the real one.
//! - `TestRail` runs one request per reporting step on tokio's blocking
//!   pool, logs the outcome through `tracing`, and returns it.
//! - `ReporterConfig` gathers credentials and run settings from a JSON file.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod testrail;
pub mod transport;
pub mod types;

pub use client::ApiClient;
pub use config::{ConfigError, ReporterConfig};
pub use error::{ApiError, FailureDetail};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use testrail::{SentResult, TestRail};
pub use transport::{Transport, UreqTransport};
pub use types::{format_elapsed, status, AddResults, AddRun, AddedResult, Attachment, Run, TestResult, UpdateRun};
