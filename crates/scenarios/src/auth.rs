//! Header login button and the phone/OTP sign-in flow

use std::time::Duration;

use carecheck_harness::{Locator, Scenario, Step};

use crate::loader;

/// Session restore can take a while on a cold dev server
const LOADER_BUDGET: Duration = Duration::from_secs(10);

pub fn login_button() -> Locator {
    Locator::role_named("button", "Login")
}

pub fn logout_button() -> Locator {
    Locator::role_named("button", "Logout")
}

pub fn phone_input() -> Locator {
    Locator::label("Phone Number")
}

pub fn send_otp_button() -> Locator {
    Locator::role_named("button", "Send OTP")
}

pub fn otp_form() -> Locator {
    Locator::test_id("otp-form")
}

pub fn otp_input() -> Locator {
    Locator::label("Enter OTP")
}

pub fn verify_otp_button() -> Locator {
    Locator::role_named("button", "Verify OTP")
}

/// Signed-out header shows a Login button once loading finishes
pub fn header_login(base_url: &str) -> Scenario {
    Scenario::new("header_login", base_url)
        .description("Header shows Login for a signed-out visitor")
        .start_at("/")
        .steps([
            Step::wait_hidden(loader()).within(LOADER_BUDGET),
            Step::expect_visible(login_button()),
            Step::screenshot("header.png"),
        ])
}

/// Sign in with a phone number and OTP, land on home, then sign out again
pub fn auth_flow(base_url: &str) -> Scenario {
    Scenario::new("auth_flow", base_url)
        .description("OTP sign-in lands on home with Logout; logout restores Login")
        .start_at("/auth")
        .steps([
            Step::wait_hidden(loader()).within(LOADER_BUDGET),
            Step::expect_visible(login_button()),
            Step::fill(phone_input(), "1234567890"),
            Step::click(send_otp_button()),
            Step::wait_visible(otp_form()),
            Step::fill(otp_input(), "123456"),
            Step::click(verify_otp_button()),
            Step::wait_url("/"),
            Step::expect_visible(logout_button()),
            Step::screenshot("logout-visible.png"),
            Step::click(logout_button()),
            Step::wait_visible(login_button()),
            Step::screenshot("login-visible.png"),
        ])
}
