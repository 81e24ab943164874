//! CareCheck verification scenarios
//!
//! Each module builds one [`Scenario`] against the health-services web app:
//! pharmacy cart, header and OTP authentication, rich-text image upload,
//! test-result dialogs, the AI symptom checker and keyword autofill in the
//! EMR and consultation forms.

use carecheck_harness::{HarnessError, HarnessResult, Locator, Scenario};

pub mod auth;
pub mod autofill;
pub mod pharmacy;
pub mod rich_text;
pub mod symptom_checker;
pub mod test_results;

/// Where the app's dev server listens by default
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";

/// Full-page loading spinner shown while the session is restored
pub fn loader() -> Locator {
    Locator::css("svg.lucide-loader-circle")
}

/// Every scenario, in a stable order
pub fn catalog(base_url: &str) -> HarnessResult<Vec<Scenario>> {
    Ok(vec![
        pharmacy::pharmacy_cart(base_url),
        auth::header_login(base_url),
        auth::auth_flow(base_url),
        rich_text::rich_text_image(base_url)?,
        test_results::test_results_modal(base_url)?,
        symptom_checker::symptom_checker(base_url),
        autofill::keyword_autofill(base_url),
    ])
}

/// Scenarios with the given names, or all of them when `names` is empty
pub fn select(base_url: &str, names: &[String]) -> HarnessResult<Vec<Scenario>> {
    let all = catalog(base_url)?;
    if names.is_empty() {
        return Ok(all);
    }

    let unknown: Vec<&str> = names
        .iter()
        .filter(|n| !all.iter().any(|s| &s.name == *n))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(HarnessError::Config(format!(
            "unknown scenario(s): {}",
            unknown.join(", ")
        )));
    }

    Ok(all
        .into_iter()
        .filter(|s| names.contains(&s.name))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use carecheck_harness::Step;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_names_are_unique() {
        let all = catalog(DEFAULT_BASE_URL).unwrap();
        let names: HashSet<&str> = all.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names.len(), all.len());
        assert_eq!(all.len(), 7);
    }

    #[test]
    fn test_every_scenario_leaves_evidence() {
        for scenario in catalog(DEFAULT_BASE_URL).unwrap() {
            assert!(
                scenario
                    .steps
                    .iter()
                    .any(|s| matches!(s.step, Step::Screenshot { .. })),
                "{} takes no screenshot",
                scenario.name
            );
            assert!(!scenario.description.is_empty());
        }
    }

    #[test]
    fn test_select_by_name() {
        let picked = select(DEFAULT_BASE_URL, &["auth_flow".to_string()]).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].start_url(), "http://127.0.0.1:8080/auth");

        let err = select(DEFAULT_BASE_URL, &["checkout".to_string()]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid configuration: unknown scenario(s): checkout");

        assert_eq!(select(DEFAULT_BASE_URL, &[]).unwrap().len(), 7);
    }
}
