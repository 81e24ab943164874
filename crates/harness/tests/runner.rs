//! Run lifecycle: fail-fast, optional groups, evidence and exactly-once close.

use std::time::Duration;

use carecheck_harness::error::ErrorKind;
use carecheck_harness::fake::{FakeApp, FakeElement};
use carecheck_harness::{
    HarnessConfig, Locator, RunStatus, Scenario, ScenarioRunner, Step, StepOutcome,
};
use tempfile::TempDir;

fn config(dir: &TempDir) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.evidence.root = dir.path().to_path_buf();
    config
}

fn login() -> Locator {
    Locator::role_named("button", "Login")
}

fn scripted_app() -> FakeApp {
    let app = FakeApp::new();
    app.show(login(), FakeElement::visible())
        .on_click(login(), |p| p.show_text("Welcome back"));
    app
}

#[tokio::test(start_paused = true)]
async fn passing_run_records_evidence_and_closes_once() {
    let dir = tempfile::tempdir().unwrap();
    let app = scripted_app();
    let runner = ScenarioRunner::new(app.launcher(), config(&dir));

    let scenario = Scenario::new("login", "http://app.test").steps([
        Step::click(login()),
        Step::wait_text("Welcome back"),
    ]);
    let result = runner.run(&scenario).await;

    assert_eq!(result.status, RunStatus::Passed, "{:?}", result.error);
    assert!(result.failed_step.is_none());
    assert_eq!(result.steps.len(), 2);
    assert!(result.steps.iter().all(|s| s.outcome == StepOutcome::Passed));

    // No explicit screenshot step, so a final one is taken
    assert_eq!(result.screenshots.len(), 1);
    assert!(result.screenshots[0].path.ends_with("final.png"));
    assert!(result.screenshots[0].path.exists());
    assert!(result.evidence_dir.join("result.json").exists());

    let stats = app.stats();
    assert_eq!(stats.launches, 1);
    assert_eq!(stats.closes, 1);
}

#[tokio::test(start_paused = true)]
async fn first_failing_step_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let app = scripted_app();
    let runner = ScenarioRunner::new(app.launcher(), config(&dir));

    let scenario = Scenario::new("fail fast", "http://app.test").steps([
        Step::click(login()),
        Step::click(Locator::role_named("button", "Send OTP")).within(Duration::from_millis(300)),
        Step::click(login()),
    ]);
    let result = runner.run(&scenario).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.error_kind, Some(ErrorKind::LocatorNotFound));
    let failed = result.failed_step.as_ref().unwrap();
    assert_eq!(failed.index, Some(1));
    assert!(failed.description.contains("Send OTP"));

    // The third step never ran
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.steps[1].outcome, StepOutcome::Failed);
    assert_eq!(app.stats().actions, 1);

    let diagnostic = result
        .screenshots
        .iter()
        .find(|s| s.diagnostic)
        .expect("diagnostic screenshot");
    assert!(diagnostic.path.ends_with("failure-step-2.png"));
    assert!(diagnostic.path.exists());
    assert_eq!(app.stats().closes, 1);
}

#[tokio::test(start_paused = true)]
async fn failed_assertion_is_screenshotted_once() {
    let dir = tempfile::tempdir().unwrap();
    let app = scripted_app();
    let runner = ScenarioRunner::new(app.launcher(), config(&dir));

    let scenario = Scenario::new("modal", "http://app.test").step(
        Step::expect_visible(Locator::css("[role=\"dialog\"]")).within(Duration::from_millis(200)),
    );
    let result = runner.run(&scenario).await;

    assert_eq!(result.error_kind, Some(ErrorKind::AssertionFailed));
    assert_eq!(result.screenshots.len(), 1);
    assert_eq!(app.stats().screenshots, 1);
    assert_eq!(app.stats().closes, 1);
}

#[tokio::test(start_paused = true)]
async fn launch_failure_is_reported_not_raised() {
    let dir = tempfile::tempdir().unwrap();
    let app = FakeApp::new();
    app.fail_launch("browser executable not found");
    let runner = ScenarioRunner::new(app.launcher(), config(&dir));

    let result = runner
        .run(&Scenario::new("launch", "http://app.test").step(Step::click(login())))
        .await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.error_kind, Some(ErrorKind::Launch));
    assert_eq!(result.failed_step.as_ref().unwrap().index, None);
    assert!(result.steps.is_empty());
    assert!(result.screenshots.is_empty());
    assert_eq!(app.stats().closes, 0);
}

#[tokio::test(start_paused = true)]
async fn start_navigation_failure_gets_screenshot_and_close() {
    let dir = tempfile::tempdir().unwrap();
    let app = scripted_app();
    app.fail_navigation("net::ERR_CONNECTION_REFUSED");
    let runner = ScenarioRunner::new(app.launcher(), config(&dir));

    let result = runner
        .run(&Scenario::new("unreachable", "http://app.test").step(Step::click(login())))
        .await;

    assert_eq!(result.error_kind, Some(ErrorKind::Navigation));
    assert!(result
        .failed_step
        .as_ref()
        .unwrap()
        .description
        .starts_with("navigate:"));
    assert_eq!(result.screenshots.len(), 1);
    assert!(result.screenshots[0].path.ends_with("failure-navigation.png"));
    assert_eq!(app.stats().closes, 1);
}

#[tokio::test(start_paused = true)]
async fn failing_optional_step_skips_rest_of_its_group() {
    let dir = tempfile::tempdir().unwrap();
    let app = scripted_app();
    let book = Locator::role_named("button", "Book Consultation");
    app.show(book.clone(), FakeElement::visible());
    let runner = ScenarioRunner::new(app.launcher(), config(&dir));

    let scenario = Scenario::new("optional", "http://app.test")
        .step(Step::click(login()))
        .optional_group(
            "consultation",
            [
                Step::click(Locator::role_named("button", "Consultation")).within(Duration::from_millis(200)),
                Step::click(book),
            ],
        )
        .step(Step::wait_text("Welcome back"));
    let result = runner.run(&scenario).await;

    assert_eq!(result.status, RunStatus::Passed, "{:?}", result.error);
    let outcomes: Vec<StepOutcome> = result.steps.iter().map(|s| s.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            StepOutcome::Passed,
            StepOutcome::Skipped,
            StepOutcome::Skipped,
            StepOutcome::Passed
        ]
    );
    assert!(result.steps[1].error.is_some());
    assert!(result.steps[2].error.is_none());
    assert_eq!(result.skipped(), 2);
    // Only the login click happened
    assert_eq!(app.stats().actions, 1);
}

#[tokio::test(start_paused = true)]
async fn browser_exit_aborts_even_optional_steps() {
    let dir = tempfile::tempdir().unwrap();
    let app = scripted_app();
    let share = Locator::role_named("button", "Share");
    app.show(share.clone(), FakeElement::visible())
        .on_click(share.clone(), |p| p.crash());
    let runner = ScenarioRunner::new(app.launcher(), config(&dir));

    let scenario = Scenario::new("crash", "http://app.test")
        .step(Step::click(share))
        .optional_group("extras", [Step::wait_text("Shared with your doctor")])
        .step(Step::click(login()));
    let result = runner.run(&scenario).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.error_kind, Some(ErrorKind::SessionClosed));
    assert_eq!(result.failed_step.as_ref().unwrap().index, Some(1));
    let outcomes: Vec<StepOutcome> = result.steps.iter().map(|s| s.outcome).collect();
    assert_eq!(outcomes, vec![StepOutcome::Passed, StepOutcome::Failed]);
    assert_eq!(app.stats().actions, 1);

    // The failed close of the dead browser is logged, not reported
    let error = result.error.as_deref().unwrap();
    assert_eq!(error, "Browser session is closed");
    assert!(result.screenshots.is_empty());
    assert_eq!(app.stats().closes, 1);

    let written: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(result.evidence_dir.join("result.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(written["error_kind"], "session_closed");
}

#[tokio::test(start_paused = true)]
async fn run_all_reports_each_scenario_once_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let app = scripted_app();
    let runner = ScenarioRunner::new(app.launcher(), config(&dir));

    let scenarios = vec![
        Scenario::new("passes", "http://app.test").step(Step::click(login())),
        Scenario::new("fails", "http://app.test")
            .step(Step::wait_text("Never shown").within(Duration::from_millis(100))),
        Scenario::new("also passes", "http://app.test").step(Step::screenshot("home.png")),
    ];
    let suite = runner.run_all(&scenarios, 2).await;

    assert_eq!(suite.total, 3);
    assert_eq!(suite.passed, 2);
    assert_eq!(suite.failed, 1);
    assert!(!suite.all_passed());
    let names: Vec<&str> = suite.results.iter().map(|r| r.scenario.as_str()).collect();
    assert_eq!(names, vec!["passes", "fails", "also passes"]);
    assert_eq!(suite.results[1].error_kind, Some(ErrorKind::WaitTimeout));

    // Every launched session was closed exactly once
    let stats = app.stats();
    assert_eq!(stats.launches, 3);
    assert_eq!(stats.closes, 3);

    let path = suite.write(dir.path()).unwrap();
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(written["failed"], 1);
    assert_eq!(written["results"][1]["status"], "failed");
}
