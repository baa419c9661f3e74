//! Domain DTOs for the TestRail API.
//!
//! # Design
//! Request payloads serialize to the exact field names TestRail expects.
//! Optional fields are `Option`s skipped when `None`, never empty strings
//! or zero durations: TestRail rejects `"elapsed": "0s"`.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

/// TestRail's built-in result status ids.
pub mod status {
    pub const PASSED: u32 = 1;
    pub const BLOCKED: u32 = 2;
    pub const UNTESTED: u32 = 3;
    pub const RETEST: u32 = 4;
    pub const FAILED: u32 = 5;
}

/// Payload for `add_run`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddRun {
    pub name: String,
    pub description: String,
    pub include_all: bool,
    pub case_ids: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suite_id: Option<u64>,
}

/// Payload for `update_run`. The case id list replaces the run's cases.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateRun {
    pub include_all: bool,
    pub case_ids: Vec<u64>,
}

/// Payload for `add_results_for_cases`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddResults {
    pub results: Vec<ResultEntry>,
}

/// One element of `AddResults::results`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultEntry {
    pub case_id: u64,
    pub status_id: u32,
    pub comment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<String>,
}

/// A run as returned by `add_run`, `update_run` and `close_run`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Run {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_completed: bool,
}

/// A result as returned by `add_results_for_cases`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddedResult {
    pub id: u64,
    #[serde(default)]
    pub test_id: Option<u64>,
}

/// Response of `add_attachment_to_result`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub attachment_id: u64,
}

/// The outcome of one test case, as handed over by the test runner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestResult {
    pub case_id: u64,
    pub status_id: u32,
    #[serde(default)]
    pub comment: String,
    /// TestRail timespan such as `"1m 5s"`; `None` leaves `elapsed` out.
    #[serde(default, deserialize_with = "non_zero_elapsed")]
    pub elapsed: Option<String>,
    #[serde(default, alias = "screenshot_path", deserialize_with = "non_empty")]
    pub screenshot: Option<String>,
}

impl TestResult {
    pub fn new(case_id: u64, status_id: u32, comment: impl Into<String>) -> Self {
        Self {
            case_id,
            status_id,
            comment: comment.into(),
            elapsed: None,
            screenshot: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.elapsed = format_elapsed(duration);
        self
    }

    /// Set a preformatted timespan. Zero and empty values leave it unset.
    pub fn with_elapsed(mut self, elapsed: impl Into<String>) -> Self {
        let elapsed = elapsed.into();
        self.elapsed = if is_zero_elapsed(&elapsed) { None } else { Some(elapsed) };
        self
    }

    pub fn with_screenshot(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.screenshot = if path.is_empty() { None } else { Some(path) };
        self
    }

    /// The single `results` entry sent for this outcome.
    pub fn to_entry(&self) -> ResultEntry {
        ResultEntry {
            case_id: self.case_id,
            status_id: self.status_id,
            comment: self.comment.trim().to_string(),
            elapsed: self.elapsed.clone().filter(|elapsed| !is_zero_elapsed(elapsed)),
        }
    }

    /// Screenshot path to upload, if there is one.
    pub fn screenshot_path(&self) -> Option<&str> {
        self.screenshot.as_deref().filter(|path| !path.is_empty())
    }
}

/// Format a duration as a TestRail timespan, rounded to whole seconds.
///
/// Returns `None` for anything that rounds to zero seconds.
pub fn format_elapsed(duration: Duration) -> Option<String> {
    let total = (duration.as_millis() + 500) / 1000;
    if total == 0 {
        return None;
    }
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    let parts: Vec<String> = [(hours, "h"), (minutes, "m"), (seconds, "s")]
        .iter()
        .filter(|(value, _)| *value > 0)
        .map(|(value, unit)| format!("{value}{unit}"))
        .collect();
    Some(parts.join(" "))
}

fn is_zero_elapsed(value: &str) -> bool {
    matches!(value.trim(), "" | "0" | "0s" | "0 seconds")
}

fn non_zero_elapsed<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !is_zero_elapsed(v)))
}

fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_run_omits_absent_milestone_and_suite() {
        let payload = AddRun {
            name: "Nightly".to_string(),
            description: "".to_string(),
            include_all: false,
            case_ids: Vec::new(),
            milestone_id: None,
            suite_id: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("milestone_id").is_none());
        assert!(json.get("suite_id").is_none());
        assert_eq!(json["include_all"], false);
        assert_eq!(json["case_ids"], serde_json::json!([]));
    }

    #[test]
    fn add_run_includes_present_milestone_and_suite() {
        let payload = AddRun {
            name: "Nightly".to_string(),
            description: "smoke".to_string(),
            include_all: false,
            case_ids: Vec::new(),
            milestone_id: Some(3),
            suite_id: Some(9),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["milestone_id"], 3);
        assert_eq!(json["suite_id"], 9);
    }

    #[test]
    fn entry_trims_comment_and_keeps_elapsed() {
        let mut result = TestResult::new(12, status::FAILED, "  boom \n");
        result.elapsed = Some("1m 5s".to_string());
        let json = serde_json::to_value(result.to_entry()).unwrap();
        assert_eq!(json["comment"], "boom");
        assert_eq!(json["elapsed"], "1m 5s");
        assert_eq!(json["case_id"], 12);
        assert_eq!(json["status_id"], 5);
    }

    #[test]
    fn entry_without_elapsed_omits_field() {
        let result = TestResult::new(12, status::PASSED, "ok");
        let json = serde_json::to_value(result.to_entry()).unwrap();
        assert!(json.get("elapsed").is_none());
    }

    #[test]
    fn entry_drops_zero_elapsed_set_directly() {
        for zero in ["0s", "0 seconds", " 0 ", ""] {
            let mut result = TestResult::new(1, status::PASSED, "");
            result.elapsed = Some(zero.to_string());
            let json = serde_json::to_value(result.to_entry()).unwrap();
            assert!(json.get("elapsed").is_none(), "{zero:?} should be omitted");
        }
    }

    #[test]
    fn deserialize_drops_zero_seconds_sentinel() {
        let result: TestResult =
            serde_json::from_str(r#"{"case_id":4,"status_id":1,"elapsed":"0 seconds"}"#).unwrap();
        assert_eq!(result.elapsed, None);
        assert_eq!(
            TestResult::new(1, status::PASSED, "").with_elapsed("0 seconds").elapsed,
            None
        );
    }

    #[test]
    fn format_elapsed_rounds_and_drops_zero_units() {
        assert_eq!(format_elapsed(Duration::from_millis(0)), None);
        assert_eq!(format_elapsed(Duration::from_millis(499)), None);
        assert_eq!(format_elapsed(Duration::from_millis(500)), Some("1s".to_string()));
        assert_eq!(format_elapsed(Duration::from_secs(65)), Some("1m 5s".to_string()));
        assert_eq!(format_elapsed(Duration::from_secs(3600)), Some("1h".to_string()));
        assert_eq!(format_elapsed(Duration::from_secs(3723)), Some("1h 2m 3s".to_string()));
    }

    #[test]
    fn with_duration_zero_leaves_elapsed_unset() {
        let result = TestResult::new(1, status::PASSED, "").with_duration(Duration::ZERO);
        assert!(result.elapsed.is_none());
    }

    #[test]
    fn deserialize_normalises_legacy_sentinels() {
        let result: TestResult = serde_json::from_str(
            r#"{"case_id":4,"status_id":1,"comment":"x","elapsed":"0s","screenshot":""}"#,
        )
        .unwrap();
        assert_eq!(result.elapsed, None);
        assert_eq!(result.screenshot, None);

        let result: TestResult = serde_json::from_str(
            r#"{"case_id":4,"status_id":1,"elapsed":"2s","screenshot_path":"shots/a.png"}"#,
        )
        .unwrap();
        assert_eq!(result.elapsed.as_deref(), Some("2s"));
        assert_eq!(result.screenshot_path(), Some("shots/a.png"));
        assert_eq!(result.comment, "");
    }

    #[test]
    fn with_elapsed_drops_zero_values() {
        assert_eq!(TestResult::new(1, status::PASSED, "").with_elapsed("0s").elapsed, None);
        assert_eq!(TestResult::new(1, status::PASSED, "").with_elapsed(" ").elapsed, None);
        assert_eq!(
            TestResult::new(1, status::PASSED, "").with_elapsed("3s").elapsed.as_deref(),
            Some("3s")
        );
    }

    #[test]
    fn with_screenshot_ignores_empty_path() {
        let result = TestResult::new(1, status::PASSED, "").with_screenshot("");
        assert_eq!(result.screenshot_path(), None);
    }
}
