//! Scenario steps: conditions, actions and the step vocabulary

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::locator::Locator;

/// A boolean statement about the current page.
///
/// Used both as a wait condition (failure is a timeout) and as an assertion
/// predicate (failure is an assertion error with a diagnostic screenshot).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Visible(Locator),
    /// Hidden or not attached at all
    Hidden(Locator),
    /// Some element with this text is visible
    TextVisible(String),
    TextContains { locator: Locator, text: String },
    /// Form control value contains the text
    ValueContains { locator: Locator, text: String },
    /// Page URL equals this URL (relative URLs resolve against the session base)
    UrlIs(String),
    Count { locator: Locator, count: usize },
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Visible(loc) => write!(f, "visible {}", loc),
            Condition::Hidden(loc) => write!(f, "hidden {}", loc),
            Condition::TextVisible(text) => write!(f, "text \"{}\" visible", text),
            Condition::TextContains { locator, text } => {
                write!(f, "{} containing text \"{}\"", locator, text)
            }
            Condition::ValueContains { locator, text } => {
                write!(f, "{} with value containing \"{}\"", locator, text)
            }
            Condition::UrlIs(url) => write!(f, "url {}", url),
            Condition::Count { locator, count } => write!(f, "{} matching {} element(s)", locator, count),
        }
    }
}

/// In-memory file injected into a file input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePayload {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl FilePayload {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }
}

/// User input simulated against a resolved element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Click(Locator),
    Fill { locator: Locator, value: String },
    SelectOption { locator: Locator, value: String },
    /// Sets files directly on an `<input type="file">`, bypassing the native dialog
    SetInputFiles { locator: Locator, files: Vec<FilePayload> },
}

impl Action {
    pub fn locator(&self) -> &Locator {
        match self {
            Action::Click(locator)
            | Action::Fill { locator, .. }
            | Action::SelectOption { locator, .. }
            | Action::SetInputFiles { locator, .. } => locator,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Action::Click(_) => "click",
            Action::Fill { .. } => "fill",
            Action::SelectOption { .. } => "select",
            Action::SetInputFiles { .. } => "set files",
        }
    }
}

/// How long a step may take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Budget {
    /// The configured default for the step type
    #[default]
    Default,
    /// The configured long-operation budget (AI analysis and the like)
    LongOperation,
    Exactly(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Navigate { url: String, budget: Budget },
    WaitFor { condition: Condition, budget: Budget },
    Perform { action: Action, budget: Budget },
    /// Fixed delay for a known debounce window
    Pause { duration: Duration, reason: String },
    Expect { condition: Condition, budget: Budget },
    Screenshot { path: PathBuf, full_page: bool },
}

impl Step {
    pub fn navigate(url: impl Into<String>) -> Self {
        Step::Navigate {
            url: url.into(),
            budget: Budget::Default,
        }
    }

    pub fn wait_for(condition: Condition) -> Self {
        Step::WaitFor {
            condition,
            budget: Budget::Default,
        }
    }

    pub fn wait_visible(locator: Locator) -> Self {
        Self::wait_for(Condition::Visible(locator))
    }

    pub fn wait_hidden(locator: Locator) -> Self {
        Self::wait_for(Condition::Hidden(locator))
    }

    pub fn wait_text(text: impl Into<String>) -> Self {
        Self::wait_for(Condition::TextVisible(text.into()))
    }

    pub fn wait_url(url: impl Into<String>) -> Self {
        Self::wait_for(Condition::UrlIs(url.into()))
    }

    pub fn perform(action: Action) -> Self {
        Step::Perform {
            action,
            budget: Budget::Default,
        }
    }

    pub fn click(locator: Locator) -> Self {
        Self::perform(Action::Click(locator))
    }

    pub fn fill(locator: Locator, value: impl Into<String>) -> Self {
        Self::perform(Action::Fill {
            locator,
            value: value.into(),
        })
    }

    pub fn select(locator: Locator, value: impl Into<String>) -> Self {
        Self::perform(Action::SelectOption {
            locator,
            value: value.into(),
        })
    }

    pub fn upload(locator: Locator, files: Vec<FilePayload>) -> Self {
        Self::perform(Action::SetInputFiles { locator, files })
    }

    pub fn pause(duration: Duration, reason: impl Into<String>) -> Self {
        Step::Pause {
            duration,
            reason: reason.into(),
        }
    }

    pub fn expect(condition: Condition) -> Self {
        Step::Expect {
            condition,
            budget: Budget::Default,
        }
    }

    pub fn expect_visible(locator: Locator) -> Self {
        Self::expect(Condition::Visible(locator))
    }

    pub fn expect_hidden(locator: Locator) -> Self {
        Self::expect(Condition::Hidden(locator))
    }

    pub fn expect_text(locator: Locator, text: impl Into<String>) -> Self {
        Self::expect(Condition::TextContains {
            locator,
            text: text.into(),
        })
    }

    pub fn expect_value(locator: Locator, text: impl Into<String>) -> Self {
        Self::expect(Condition::ValueContains {
            locator,
            text: text.into(),
        })
    }

    pub fn expect_url(url: impl Into<String>) -> Self {
        Self::expect(Condition::UrlIs(url.into()))
    }

    /// Viewport screenshot; relative paths land in the run's evidence directory
    pub fn screenshot(path: impl Into<PathBuf>) -> Self {
        Step::Screenshot {
            path: path.into(),
            full_page: false,
        }
    }

    pub fn full_page_screenshot(path: impl Into<PathBuf>) -> Self {
        Step::Screenshot {
            path: path.into(),
            full_page: true,
        }
    }

    /// Override the time budget. No effect on pauses and screenshots.
    pub fn within(self, duration: Duration) -> Self {
        self.with_budget(Budget::Exactly(duration))
    }

    pub fn long_running(self) -> Self {
        self.with_budget(Budget::LongOperation)
    }

    fn with_budget(mut self, new: Budget) -> Self {
        match &mut self {
            Step::Navigate { budget, .. }
            | Step::WaitFor { budget, .. }
            | Step::Perform { budget, .. }
            | Step::Expect { budget, .. } => *budget = new,
            Step::Pause { .. } | Step::Screenshot { .. } => {}
        }
        self
    }

    /// Mark as optional and skip together with the rest of `group` on failure
    pub fn optional_in(self, group: impl Into<String>) -> ScenarioStep {
        ScenarioStep {
            step: self,
            policy: StepPolicy::Optional {
                group: Some(group.into()),
            },
        }
    }

    pub fn optional(self) -> ScenarioStep {
        ScenarioStep {
            step: self,
            policy: StepPolicy::Optional { group: None },
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Step::Navigate { url, .. } => format!("navigate:{}", url),
            Step::WaitFor { condition, .. } => format!("wait:{}", condition),
            Step::Perform { action, .. } => format!("{}:{}", action.verb(), action.locator()),
            Step::Pause { duration, reason } => {
                format!("pause:{}ms ({})", duration.as_millis(), reason)
            }
            Step::Expect { condition, .. } => format!("expect:{}", condition),
            Step::Screenshot { path, .. } => format!("screenshot:{}", path.display()),
        }
    }
}

/// What a failure of this step means for the run
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum StepPolicy {
    /// Failure aborts the run
    #[default]
    Required,
    /// Failure is recorded as a skip; later steps of the same group are skipped too
    Optional { group: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioStep {
    pub step: Step,
    pub policy: StepPolicy,
}

impl ScenarioStep {
    pub fn is_optional(&self) -> bool {
        matches!(self.policy, StepPolicy::Optional { .. })
    }

    pub fn group(&self) -> Option<&str> {
        match &self.policy {
            StepPolicy::Optional { group } => group.as_deref(),
            StepPolicy::Required => None,
        }
    }
}

impl From<Step> for ScenarioStep {
    fn from(step: Step) -> Self {
        ScenarioStep {
            step,
            policy: StepPolicy::Required,
        }
    }
}
