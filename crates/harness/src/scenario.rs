//! Scenario definition

use crate::mock::{MockRule, MockTable};
use crate::step::{ScenarioStep, Step};

/// An ordered script of UI actions and assertions against one application.
///
/// Built once from static data and never mutated while it runs.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// Unique name; also names the evidence directory
    pub name: String,

    pub description: String,

    /// Origin of the application under test, e.g. `http://127.0.0.1:8080`
    pub base_url: String,

    /// Path (or absolute URL) opened when the session starts
    pub start_path: String,

    /// Installed before the first navigation, consulted in order
    pub mocks: Vec<MockRule>,

    pub steps: Vec<ScenarioStep>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            base_url: base_url.into(),
            start_path: "/".to_string(),
            mocks: Vec::new(),
            steps: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn start_at(mut self, path: impl Into<String>) -> Self {
        self.start_path = path.into();
        self
    }

    pub fn mock(mut self, rule: MockRule) -> Self {
        self.mocks.push(rule);
        self
    }

    pub fn step(mut self, step: impl Into<ScenarioStep>) -> Self {
        self.steps.push(step.into());
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps.extend(steps.into_iter().map(ScenarioStep::from));
        self
    }

    /// Steps that are skipped together as soon as one of them fails
    pub fn optional_group(
        mut self,
        group: &str,
        steps: impl IntoIterator<Item = Step>,
    ) -> Self {
        self.steps
            .extend(steps.into_iter().map(|step| step.optional_in(group)));
        self
    }

    /// URL the session navigates to when it opens
    pub fn start_url(&self) -> String {
        if self.start_path.contains("://") {
            return self.start_path.clone();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.start_path.trim_start_matches('/')
        )
    }

    pub fn mock_table(&self) -> MockTable {
        MockTable::new(self.mocks.clone())
    }
}
