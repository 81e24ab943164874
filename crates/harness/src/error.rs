//! Error types for the verification harness

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Browser failed to launch: {0}")]
    Launch(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Timed out after {}ms waiting for {condition}", .timeout.as_millis())]
    WaitTimeout { condition: String, timeout: Duration },

    #[error("Locator {locator} did not resolve within {}ms", .timeout.as_millis())]
    LocatorNotFound { locator: String, timeout: Duration },

    #[error("Element {locator} cannot accept {action}: {reason}")]
    ElementNotInteractable {
        locator: String,
        action: String,
        reason: String,
    },

    #[error("Assertion failed: expected {expected}, observed {observed}")]
    AssertionFailed {
        expected: String,
        observed: String,
        screenshot: Option<PathBuf>,
    },

    #[error("Browser session is closed")]
    SessionClosed,

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid mock pattern '{pattern}': {reason}")]
    MockPattern { pattern: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type HarnessResult<T> = Result<T, HarnessError>;

/// Stable classification of a failure, recorded in run results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Launch,
    Navigation,
    WaitTimeout,
    LocatorNotFound,
    ElementNotInteractable,
    AssertionFailed,
    SessionClosed,
    Driver,
    Config,
    Io,
}

impl HarnessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HarnessError::Launch(_) => ErrorKind::Launch,
            HarnessError::Navigation { .. } | HarnessError::Http(_) => ErrorKind::Navigation,
            HarnessError::WaitTimeout { .. } => ErrorKind::WaitTimeout,
            HarnessError::LocatorNotFound { .. } => ErrorKind::LocatorNotFound,
            HarnessError::ElementNotInteractable { .. } => ErrorKind::ElementNotInteractable,
            HarnessError::AssertionFailed { .. } => ErrorKind::AssertionFailed,
            HarnessError::SessionClosed => ErrorKind::SessionClosed,
            HarnessError::Driver(_) | HarnessError::Json(_) => ErrorKind::Driver,
            HarnessError::Config(_) | HarnessError::MockPattern { .. } => ErrorKind::Config,
            HarnessError::Io(_) | HarnessError::Image(_) => ErrorKind::Io,
        }
    }

    /// Path of the diagnostic screenshot already taken for this failure, if any.
    pub fn diagnostic_screenshot(&self) -> Option<&PathBuf> {
        match self {
            HarnessError::AssertionFailed { screenshot, .. } => screenshot.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_timeout_message_includes_millis() {
        let err = HarnessError::WaitTimeout {
            condition: "visible role=button[name=\"Login\"]".to_string(),
            timeout: Duration::from_millis(1500),
        };
        assert_eq!(
            err.to_string(),
            "Timed out after 1500ms waiting for visible role=button[name=\"Login\"]"
        );
        assert_eq!(err.kind(), ErrorKind::WaitTimeout);
    }

    #[test]
    fn test_assertion_carries_screenshot() {
        let err = HarnessError::AssertionFailed {
            expected: "hidden css=[role=\"dialog\"]".to_string(),
            observed: "visible".to_string(),
            screenshot: Some(PathBuf::from("failure-step-3.png")),
        };
        assert_eq!(err.kind(), ErrorKind::AssertionFailed);
        assert_eq!(
            err.diagnostic_screenshot(),
            Some(&PathBuf::from("failure-step-3.png"))
        );
        assert!(HarnessError::SessionClosed.diagnostic_screenshot().is_none());
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::LocatorNotFound).unwrap();
        assert_eq!(json, "\"locator_not_found\"");
    }
}
