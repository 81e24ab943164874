//! AI symptom checker

use carecheck_harness::{Locator, Scenario, Step};

pub const SYMPTOMS: [&str; 2] = ["Headache", "Fever"];

pub fn heading(name: &str) -> Locator {
    Locator::role_named("heading", name)
}

pub fn gender_select() -> Locator {
    Locator::css("button[id=\"gender\"]")
}

pub fn symptom_input() -> Locator {
    Locator::css("input[id=\"symptom\"]")
}

pub fn add_symptom_button() -> Locator {
    Locator::css("input[id=\"symptom\"] + button")
}

pub fn analyze_button() -> Locator {
    Locator::role_named("button", "Analyze Symptoms")
}

pub fn analysis_heading() -> Locator {
    heading("Preliminary Analysis").exact()
}

pub fn symptom_checker(base_url: &str) -> Scenario {
    let mut scenario = Scenario::new("symptom_checker", base_url)
        .description("Describe a patient and symptoms, then wait for the AI analysis")
        .start_at("/symptom-checker")
        .steps([
            Step::expect_visible(heading("AI Symptom Checker")),
            Step::fill(Locator::css("input[id=\"age\"]"), "35"),
            Step::click(gender_select()),
            Step::click(Locator::role_named("option", "Male").exact()),
            Step::fill(Locator::css("input[id=\"duration\"]"), "2 days"),
        ]);

    for symptom in SYMPTOMS {
        scenario = scenario.steps([
            Step::fill(symptom_input(), symptom),
            Step::click(add_symptom_button()),
        ]);
    }

    scenario.steps([
        Step::click(analyze_button()),
        // Model inference, not page rendering
        Step::expect_visible(analysis_heading()).long_running(),
        Step::screenshot("symptom-checker.png"),
    ])
}
