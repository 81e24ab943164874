//! Pharmacy catalogue: buy a medicine by the unit

use carecheck_harness::{Locator, Scenario, Step};

pub fn product_grid() -> Locator {
    Locator::css(".grid-cols-1.md\\:grid-cols-2.lg\\:grid-cols-3")
}

pub fn by_unit_option() -> Locator {
    Locator::css("label:has-text(\"Unit\")").first()
}

pub fn add_to_cart_button() -> Locator {
    Locator::css("button:has-text(\"Add to Cart\")").first()
}

/// Quantity stepper buttons: minus, then plus
pub fn quantity_button(index: usize) -> Locator {
    Locator::css(".flex.items-center.gap-3 > button").nth(index)
}

/// Units of the product currently in the cart, shown between the stepper buttons
pub fn quantity_display() -> Locator {
    Locator::css(".flex.items-center.gap-3 > span.font-medium").first()
}

pub fn pharmacy_cart(base_url: &str) -> Scenario {
    Scenario::new("pharmacy_cart", base_url)
        .description("Add DOLO 650 to the cart by unit and raise the quantity to two")
        .start_at("/pharmacy")
        .steps([
            Step::wait_visible(product_grid()),
            Step::expect_visible(Locator::text("DOLO 650").first()),
            Step::click(by_unit_option()),
            Step::click(add_to_cart_button()),
            Step::expect_text(quantity_display(), "1"),
            Step::click(quantity_button(1)),
            Step::expect_text(quantity_display(), "2"),
            Step::screenshot("pharmacy-cart.png"),
        ])
}
