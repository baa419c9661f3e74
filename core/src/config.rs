//! Reporter settings.
//!
//! Read from a JSON file holding either a bare settings object or a
//! `cypress.env.json`-style document with the settings under `testrail`.
//! Keys are camelCase. Ids may be numbers or strings, with an optional
//! one-letter prefix as shown in the TestRail UI (`P12`, `M3`, `S1`, `R40`);
//! an empty string means "not set".

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::client::ApiClient;
use crate::testrail::TestRail;
use crate::transport::{UreqTransport, DEFAULT_TIMEOUT};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("missing required setting `{0}`")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReporterConfig {
    pub domain: String,
    pub username: String,
    pub password: String,
    #[serde(deserialize_with = "optional_id")]
    pub project_id: Option<u64>,
    #[serde(deserialize_with = "optional_id")]
    pub milestone_id: Option<u64>,
    #[serde(deserialize_with = "optional_id")]
    pub suite_id: Option<u64>,
    #[serde(deserialize_with = "optional_id")]
    pub run_id: Option<u64>,
    pub run_name: Option<String>,
    pub run_description: Option<String>,
    pub screenshots: bool,
    pub close_run: bool,
    pub timeout_secs: Option<u64>,
}

impl ReporterConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let mut value: serde_json::Value = serde_json::from_str(raw)?;
        if let Some(nested) = value.get_mut("testrail") {
            value = nested.take();
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Check that credentials are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domain.trim().is_empty() {
            return Err(ConfigError::Missing("domain"));
        }
        if self.username.is_empty() {
            return Err(ConfigError::Missing("username"));
        }
        if self.password.is_empty() {
            return Err(ConfigError::Missing("password"));
        }
        Ok(())
    }

    /// `timeoutSecs`, or the transport default when unset.
    pub fn timeout(&self) -> Duration {
        self.timeout_secs.map_or(DEFAULT_TIMEOUT, Duration::from_secs)
    }

    pub fn testrail(&self) -> Result<TestRail<UreqTransport>, ConfigError> {
        self.validate()?;
        Ok(TestRail::with_transport(
            ApiClient::new(&self.domain, &self.username, &self.password),
            UreqTransport::new(Some(self.timeout())),
            self.screenshots,
        ))
    }
}

/// Parse `42`, `"42"`, `"P42"` or `""`.
pub fn parse_id(raw: &str) -> Result<Option<u64>, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let digits = trimmed
        .strip_prefix(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(trimmed);
    digits
        .parse::<u64>()
        .map(Some)
        .map_err(|_| format!("`{raw}` is not a TestRail id"))
}

fn optional_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(id)) => Ok(Some(id)),
        Some(Raw::Text(text)) => parse_id(&text).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_nested_cypress_env() {
        let config = ReporterConfig::from_json_str(
            r#"{
                "baseUrl": "ignored",
                "testrail": {
                    "domain": "acme.testrail.io",
                    "username": "ci",
                    "password": "key",
                    "projectId": "P4",
                    "milestoneId": "",
                    "suiteId": 2,
                    "screenshots": true,
                    "closeRun": true
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.domain, "acme.testrail.io");
        assert_eq!(config.project_id, Some(4));
        assert_eq!(config.milestone_id, None);
        assert_eq!(config.suite_id, Some(2));
        assert_eq!(config.run_id, None);
        assert!(config.screenshots);
        assert!(config.close_run);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn reads_bare_object_with_defaults() {
        let config = ReporterConfig::from_json_str(r#"{"domain":"d","username":"u","password":"p","runId":"R17"}"#)
            .unwrap();
        assert_eq!(config.run_id, Some(17));
        assert!(!config.screenshots);
        assert!(!config.close_run);
        assert_eq!(config.timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn explicit_timeout_wins_over_default() {
        let config = ReporterConfig::from_json_str(r#"{"timeoutSecs":5}"#).unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(ReporterConfig::default().timeout(), Duration::from_secs(30));
    }

    #[test]
    fn rejects_non_numeric_id() {
        let err = ReporterConfig::from_json_str(r#"{"projectId":"abc"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validate_reports_first_missing_setting() {
        let config = ReporterConfig {
            domain: "d".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Missing("username"))));
        assert!(matches!(ReporterConfig::default().validate(), Err(ConfigError::Missing("domain"))));
    }

    #[test]
    fn parse_id_accepts_prefixes_and_empty() {
        assert_eq!(parse_id("C123"), Ok(Some(123)));
        assert_eq!(parse_id(" 9 "), Ok(Some(9)));
        assert_eq!(parse_id(""), Ok(None));
        assert!(parse_id("P").is_err());
    }

    #[test]
    fn from_path_missing_file_is_io_error() {
        let err = ReporterConfig::from_path(Path::new("/no/such/cypress.env.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
