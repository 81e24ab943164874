//! Test-result search with a mocked backend, and the per-test detail dialog

use carecheck_harness::{HarnessResult, Locator, MockRule, Scenario, Step};
use serde_json::{json, Value};

/// Edge function the search form calls
pub const SEARCH_ENDPOINT: &str = "*search-test-results*";

/// Canned search response: patient name -> test records
pub fn search_results() -> Value {
    json!({
        "John Doe": [
            {
                "testId": "TR001",
                "patientName": "John Doe",
                "testDate": "2024-01-15",
                "testType": "Complete Blood Count",
                "status": "completed",
                "reportDate": "2024-01-16",
                "testResult": "All within normal range."
            },
            {
                "testId": "TR002",
                "patientName": "John Doe",
                "testDate": "2024-01-10",
                "testType": "Lipid Profile",
                "status": "processing",
                "reportDate": null,
                "testResult": "Pending"
            }
        ]
    })
}

pub fn search_input() -> Locator {
    Locator::label("Phone Number or Booking ID")
}

pub fn search_button() -> Locator {
    Locator::role_named("button", "Search")
}

/// The n-th result row; each row is a dialog trigger
pub fn result_row(index: usize) -> Locator {
    Locator::css("button[aria-haspopup=\"dialog\"]").nth(index)
}

pub fn dialog() -> Locator {
    Locator::css("[role=\"dialog\"]")
}

pub fn dialog_close() -> Locator {
    dialog().locate(Locator::css("[aria-label=\"Close\"]"))
}

pub fn test_results_modal(base_url: &str) -> HarnessResult<Scenario> {
    let results = search_results();
    let records = results["John Doe"].as_array().cloned().unwrap_or_default();

    let mut scenario = Scenario::new("test_results_modal", base_url)
        .description("Search test results and open each record's detail dialog")
        .start_at("/track-test-results")
        .mock(MockRule::json(SEARCH_ENDPOINT, &results)?)
        .steps([
            Step::fill(search_input(), "1234567890"),
            Step::click(search_button()),
            Step::wait_text("John Doe"),
        ]);

    let last = records.len().saturating_sub(1);
    for (index, record) in records.iter().enumerate() {
        let test_type = record["testType"].as_str().unwrap_or_default();
        let result = record["testResult"].as_str().unwrap_or_default();

        scenario = scenario.steps([
            Step::click(result_row(index)),
            Step::expect_visible(dialog()),
            Step::expect_visible(dialog().locate(Locator::text(test_type))),
            Step::expect_visible(dialog().locate(Locator::text(result))),
        ]);
        // The last dialog stays open for the screenshot
        if index < last {
            scenario = scenario.steps([Step::click(dialog_close()), Step::expect_hidden(dialog())]);
        }
    }

    Ok(scenario.step(Step::screenshot("test-results-modal.png")))
}
