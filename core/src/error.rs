//! Error types for the TestRail API client.
//!
//! # Design
//! The variants follow what is known about a failed call: the server
//! answered with a non-2xx status (`Response`), the request went out but no
//! answer came back (`NoResponse`), or the request never left the process
//! (`Request`). Codec failures keep their own variants, as before.

use thiserror::Error;

use crate::http::HttpMethod;

/// Errors returned by `ApiClient` parse methods and by transports.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server returned a non-2xx status.
    #[error("HTTP {status} {status_text}: {error_text}")]
    Response {
        url: String,
        status: u16,
        status_text: String,
        /// The `error` field of a TestRail error body, or the raw body.
        error_text: String,
        body: String,
        headers: Vec<(String, String)>,
    },

    /// The request was sent but no response arrived.
    #[error("no response from {method} {url}: {message}")]
    NoResponse {
        method: HttpMethod,
        url: String,
        message: String,
    },

    /// The request could not be built or sent.
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

/// What a failure log can say beyond the summary line.
#[derive(Debug, PartialEq, Eq)]
pub enum FailureDetail<'a> {
    /// The server responded.
    Response {
        body: &'a str,
        status: u16,
        headers: &'a [(String, String)],
    },
    /// The request went out and nothing came back.
    Request { method: HttpMethod, url: &'a str },
    /// Neither a request nor a response is available.
    Message(String),
}

impl ApiError {
    /// Status code, `0` when no response was received.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Response { status, .. } => *status,
            _ => 0,
        }
    }

    pub fn status_text(&self) -> &str {
        match self {
            ApiError::Response { status_text, .. } => status_text,
            _ => "",
        }
    }

    /// Human readable reason, the TestRail `error` field when present.
    pub fn error_text(&self) -> String {
        match self {
            ApiError::Response { error_text, .. } => error_text.clone(),
            ApiError::NoResponse { message, .. } | ApiError::Request { message, .. } => {
                message.clone()
            }
            ApiError::Deserialization(msg) | ApiError::Serialization(msg) => msg.clone(),
        }
    }

    /// URL of the failed request, if one was built.
    pub fn url(&self) -> Option<&str> {
        match self {
            ApiError::Response { url, .. }
            | ApiError::NoResponse { url, .. }
            | ApiError::Request { url, .. } => Some(url),
            ApiError::Deserialization(_) | ApiError::Serialization(_) => None,
        }
    }

    pub fn detail(&self) -> FailureDetail<'_> {
        match self {
            ApiError::Response {
                body,
                status,
                headers,
                ..
            } => FailureDetail::Response {
                body,
                status: *status,
                headers,
            },
            ApiError::NoResponse { method, url, .. } => FailureDetail::Request {
                method: *method,
                url,
            },
            other => FailureDetail::Message(other.error_text()),
        }
    }
}
