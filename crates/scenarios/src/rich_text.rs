//! Rich-text editor image embedding.
//!
//! The toolbar's Image button opens a native file dialog, which a headless
//! browser cannot drive. The scenario never clicks it: the image is set on
//! the hidden file input directly.

use std::io::Cursor;

use carecheck_harness::{FilePayload, HarnessResult, Locator, Scenario, Step};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};

pub fn editor() -> Locator {
    Locator::css(".prose").first()
}

pub fn image_button() -> Locator {
    Locator::css("button[title=\"Image\"]")
}

pub fn file_input() -> Locator {
    Locator::css("input[type=\"file\"]")
}

pub fn embedded_image() -> Locator {
    editor().locate(Locator::css("img"))
}

pub fn bubble_menu() -> Locator {
    Locator::css(".tiptap-bubble-menu")
}

/// Small solid PNG, generated so the upload is a decodable image
pub fn placeholder_png() -> HarnessResult<FilePayload> {
    let img = RgbImage::from_pixel(64, 48, Rgb([76, 141, 246]));
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img).write_to(&mut bytes, ImageOutputFormat::Png)?;
    Ok(FilePayload::new("placeholder.png", "image/png", bytes.into_inner()))
}

pub fn rich_text_image(base_url: &str) -> HarnessResult<Scenario> {
    Ok(Scenario::new("rich_text_image", base_url)
        .description("Upload an image into the post editor and open its bubble menu")
        .start_at("/create-post")
        .steps([
            Step::expect_visible(editor()),
            Step::expect_visible(image_button()),
            Step::expect_hidden(file_input()),
            Step::upload(file_input(), vec![placeholder_png()?]),
            Step::expect_visible(embedded_image()),
            Step::click(embedded_image()),
            Step::expect_visible(bubble_menu()),
            Step::screenshot("rich-text-image.png"),
        ]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_is_a_png() {
        let payload = placeholder_png().unwrap();
        assert_eq!(payload.mime_type, "image/png");
        let decoded = image::load_from_memory(&payload.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn test_image_button_is_never_clicked() {
        let scenario = rich_text_image("http://127.0.0.1:5173").unwrap();
        assert!(!scenario
            .steps
            .iter()
            .any(|s| s.step == Step::click(image_button())));
    }
}
