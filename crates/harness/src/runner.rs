//! Scenario runner: one browser session per run, fail-fast, one result per run

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::HarnessConfig;
use crate::driver::Launcher;
use crate::error::{ErrorKind, HarnessError, HarnessResult};
use crate::evidence::{EvidenceDir, Screenshot};
use crate::mock::MockHit;
use crate::preflight;
use crate::scenario::Scenario;
use crate::session::Session;

/// Lifecycle of a run. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    NotStarted,
    Running,
    Passed,
    Failed,
}

impl RunStatus {
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::NotStarted, RunStatus::Running)
                | (RunStatus::Running, RunStatus::Passed)
                | (RunStatus::Running, RunStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Passed | RunStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Passed,
    Failed,
    /// Optional step that failed, or a later step of its group
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub index: usize,
    pub description: String,
    pub outcome: StepOutcome,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Where a failed run stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedStep {
    /// Index into the scenario's steps; `None` for setup (launch, first navigation)
    pub index: Option<usize>,
    pub description: String,
}

/// Outcome of running one scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub scenario: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub failed_step: Option<FailedStep>,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
    pub steps: Vec<StepResult>,
    pub screenshots: Vec<Screenshot>,
    pub mock_hits: Vec<MockHit>,
    pub evidence_dir: PathBuf,
}

impl RunResult {
    fn new(scenario: &Scenario) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            scenario: scenario.name.clone(),
            status: RunStatus::NotStarted,
            started_at: Utc::now(),
            duration_ms: 0,
            failed_step: None,
            error_kind: None,
            error: None,
            steps: Vec::new(),
            screenshots: Vec::new(),
            mock_hits: Vec::new(),
            evidence_dir: PathBuf::new(),
        }
    }

    fn advance(&mut self, next: RunStatus) {
        debug_assert!(self.status.can_transition_to(next), "{:?} -> {:?}", self.status, next);
        self.status = next;
    }

    pub fn passed(&self) -> bool {
        self.status == RunStatus::Passed
    }

    pub fn skipped(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.outcome == StepOutcome::Skipped)
            .count()
    }

    fn record(&mut self, index: usize, description: String, outcome: StepOutcome, started: Instant, error: Option<String>) {
        self.steps.push(StepResult {
            index,
            description,
            outcome,
            duration_ms: started.elapsed().as_millis() as u64,
            error,
        });
    }
}

/// Results of a batch of runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<RunResult>,
}

impl SuiteResult {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Write `suite-results.json` into `dir`
    pub fn write(&self, dir: &Path) -> HarnessResult<PathBuf> {
        let path = EvidenceDir::at(dir)?.write_json("suite-results.json", self)?;
        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

struct Failure {
    step: FailedStep,
    error: HarnessError,
}

impl Failure {
    fn setup(description: &str, error: HarnessError) -> Self {
        Self {
            step: FailedStep {
                index: None,
                description: description.to_string(),
            },
            error,
        }
    }

    fn label(&self) -> String {
        match self.step.index {
            Some(i) => format!("step-{}", i + 1),
            None => "navigation".to_string(),
        }
    }
}

/// Runs scenarios, each in its own browser session
pub struct ScenarioRunner<L: Launcher> {
    launcher: Arc<L>,
    config: HarnessConfig,
}

impl<L: Launcher> ScenarioRunner<L> {
    pub fn new(launcher: L, config: HarnessConfig) -> Self {
        Self {
            launcher: Arc::new(launcher),
            config,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run one scenario to completion.
    ///
    /// Never returns an error: every failure, including launch and setup
    /// failures, is reported in the returned [`RunResult`]. The browser is
    /// closed before this returns whenever it was launched.
    pub async fn run(&self, scenario: &Scenario) -> RunResult {
        let start = Instant::now();
        let mut result = RunResult::new(scenario);
        info!(scenario = %scenario.name, run_id = %result.run_id, "Starting run");
        result.advance(RunStatus::Running);

        match self.execute(scenario, &mut result).await {
            Ok(()) => result.advance(RunStatus::Passed),
            Err(failure) => {
                result.error_kind = Some(failure.error.kind());
                result.error = Some(failure.error.to_string());
                result.failed_step = Some(failure.step);
                result.advance(RunStatus::Failed);
            }
        }
        result.duration_ms = start.elapsed().as_millis() as u64;

        if result.evidence_dir.as_os_str().is_empty() {
            debug!("No evidence directory, result.json not written");
        } else {
            let written = EvidenceDir::at(&result.evidence_dir)
                .and_then(|dir| dir.write_json("result.json", &result));
            if let Err(e) = written {
                warn!("Failed to write result.json: {}", e);
            }
        }

        if result.passed() {
            info!("✓ {} ({} ms)", result.scenario, result.duration_ms);
        } else {
            error!(
                "✗ {} - {}",
                result.scenario,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        result
    }

    /// Run scenarios with up to `concurrency` sessions at once; results keep input order
    pub async fn run_all(&self, scenarios: &[Scenario], concurrency: usize) -> SuiteResult {
        let start = Instant::now();
        info!("Running {} scenario(s)...", scenarios.len());

        let results: Vec<RunResult> = stream::iter(scenarios)
            .map(|scenario| self.run(scenario))
            .buffered(concurrency.max(1))
            .collect()
            .await;

        let passed = results.iter().filter(|r| r.passed()).count();
        let failed = results.len() - passed;
        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Scenario results: {} passed, {} failed ({} ms)",
            passed, failed, duration_ms
        );

        SuiteResult {
            total: results.len(),
            passed,
            failed,
            duration_ms,
            results,
        }
    }

    async fn execute(&self, scenario: &Scenario, result: &mut RunResult) -> Result<(), Failure> {
        let evidence = EvidenceDir::create(&self.config.evidence.root, &scenario.name, &result.run_id)
            .map_err(|e| Failure::setup("create evidence directory", e))?;
        result.evidence_dir = evidence.path().to_path_buf();

        if self.config.preflight {
            preflight::wait_until_reachable(
                &scenario.start_url(),
                self.config.timeouts.navigation(),
                Duration::from_millis(250),
            )
            .await
            .map_err(|e| Failure::setup("preflight", e))?;
        }

        let mut session = Session::launch(
            self.launcher.as_ref(),
            &self.config,
            scenario.mock_table(),
            evidence,
        )
        .await
        .map_err(|e| Failure::setup("launch browser", e))?;

        let outcome = self.drive(&mut session, scenario, result).await;

        match &outcome {
            Ok(()) if session.screenshots().is_empty() => {
                if let Err(e) = session.capture(Path::new("final.png"), false).await {
                    warn!("Final screenshot failed: {}", e);
                }
            }
            Ok(()) => {}
            Err(failure) if failure.error.diagnostic_screenshot().is_none() => {
                session.diagnostic(&failure.label()).await;
            }
            Err(_) => {}
        }

        result.screenshots = session.screenshots().to_vec();
        result.mock_hits = session.mock_hits();
        if let Err(e) = session.close().await {
            warn!("Failed to close browser: {}", e);
        }
        outcome
    }

    async fn drive(
        &self,
        session: &mut Session<L::Driver>,
        scenario: &Scenario,
        result: &mut RunResult,
    ) -> Result<(), Failure> {
        let start_url = scenario.start_url();
        session
            .navigate(&start_url, self.config.timeouts.navigation())
            .await
            .map_err(|e| Failure::setup(&format!("navigate:{}", start_url), e))?;

        let mut abandoned: HashSet<&str> = HashSet::new();

        for (index, entry) in scenario.steps.iter().enumerate() {
            let description = entry.step.describe();
            let started = Instant::now();

            if let Some(group) = entry.group() {
                if abandoned.contains(group) {
                    debug!(step = index, group, "Skipping step of abandoned group");
                    result.record(index, description, StepOutcome::Skipped, started, None);
                    continue;
                }
            }

            debug!(step = index, %description, "Executing step");
            match session.execute(&entry.step).await {
                Ok(()) => {
                    result.record(index, description, StepOutcome::Passed, started, None);
                }
                // A closed session cannot run anything else, optional or not
                Err(e) if entry.is_optional() && !matches!(e, HarnessError::SessionClosed) => {
                    warn!(step = index, %description, "Optional step failed, skipping: {}", e);
                    if let Some(group) = entry.group() {
                        abandoned.insert(group);
                    }
                    result.record(index, description, StepOutcome::Skipped, started, Some(e.to_string()));
                }
                Err(e) => {
                    result.record(
                        index,
                        description.clone(),
                        StepOutcome::Failed,
                        started,
                        Some(e.to_string()),
                    );
                    return Err(Failure {
                        step: FailedStep {
                            index: Some(index),
                            description,
                        },
                        error: e,
                    });
                }
            }
        }
        Ok(())
    }
}
