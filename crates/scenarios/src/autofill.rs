//! Keyword-driven advice autofill in the EMR and consultation forms.
//!
//! Setup registers the keyword "fever" through the `@` shortcut in the
//! medicine field. Typing the keyword into complaints should then fill the
//! advice field once the lookup debounce has passed. The consultation half
//! needs a patient booked on the chosen day, so it is optional.

use std::time::Duration;

use carecheck_harness::{Locator, Scenario, Step};

pub const KEYWORD: &str = "fever";
pub const ADVICE: &str = "Drink plenty of fluids";

/// Complaints lookup debounce in the EMR and consultation forms
pub const DEBOUNCE: Duration = Duration::from_secs(1);

pub const CONSULTATION_GROUP: &str = "consultation";

pub fn medicine_name_field() -> Locator {
    Locator::css("input[placeholder=\"Enter medicine name\"]")
}

pub fn medicine_name_input() -> Locator {
    Locator::label("Medicine Name").first()
}

pub fn keyword_modal_title() -> Locator {
    Locator::css("h3:has-text(\"Add New Keyword\")")
}

pub fn new_keywords_input() -> Locator {
    Locator::css("input#new-keywords")
}

pub fn medicine_checkbox() -> Locator {
    Locator::css("div.max-h-40 input[type=\"checkbox\"]").first()
}

pub fn keyword_advice_input() -> Locator {
    Locator::css("textarea#advice")
}

pub fn add_keyword_button() -> Locator {
    Locator::css("button:has-text(\"Add Keyword\")")
}

pub fn complaints() -> Locator {
    Locator::css("#complaints")
}

pub fn advice() -> Locator {
    Locator::css("#advice")
}

pub fn calendar_button() -> Locator {
    Locator::css("button:has(svg.lucide-calendar)")
}

pub fn open_day() -> Locator {
    Locator::css("div[role=gridcell]:not([aria-selected=true])").first()
}

pub fn first_patient() -> Locator {
    Locator::css("div.space-y-2.mt-2 > button").first()
}

pub fn medical_information_title() -> Locator {
    Locator::css("h3:has-text(\"Medical Information for\")")
}

fn autofill_steps() -> [Step; 3] {
    [
        Step::fill(complaints(), KEYWORD),
        Step::pause(DEBOUNCE, "complaints keyword lookup is debounced"),
        Step::expect_value(advice(), ADVICE),
    ]
}

pub fn keyword_autofill(base_url: &str) -> Scenario {
    let setup = [
        Step::wait_visible(medicine_name_field()),
        Step::fill(medicine_name_input(), "@"),
        Step::wait_visible(keyword_modal_title()),
        Step::fill(new_keywords_input(), KEYWORD),
        Step::click(medicine_checkbox()),
        Step::fill(keyword_advice_input(), ADVICE),
        Step::click(add_keyword_button()),
        Step::wait_text("Keyword added successfully"),
        Step::click(Locator::role_named("button", "Close")),
    ];

    let consultation = [
        Step::wait_visible(first_patient()).within(Duration::from_secs(5)),
        Step::click(first_patient()),
        Step::wait_visible(medical_information_title()),
    ]
    .into_iter()
    .chain(autofill_steps());

    Scenario::new("keyword_autofill", base_url)
        .description("A registered keyword autofills advice in EMR and consultation forms")
        .start_at("/emr")
        .steps(setup)
        .steps([Step::navigate("/emr")])
        .steps(autofill_steps())
        .steps([
            Step::navigate("/consultation"),
            Step::click(calendar_button()),
            Step::click(open_day()),
            Step::pause(DEBOUNCE, "patient list reloads after a date change"),
        ])
        .optional_group(CONSULTATION_GROUP, consultation)
        .step(Step::screenshot("keyword-autofill.png"))
}
