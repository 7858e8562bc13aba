mod common;

use common::{page_operators, page_strings, paged_document};
use folio::{
    Alignment, AssemblyConfiguration, Color, Compositor, ContextError, HeaderFooter, Overlay,
    PageContext, PageHook, RenderedDocument, VerticalAlignment,
};

/// Stamps a rectangle in the bottom right corner of the last page only.
struct LastPageStamp;

impl PageHook for LastPageStamp {
    fn overlays_for_page(&self, context: &PageContext) -> Result<Vec<Overlay>, ContextError> {
        if context.page_number < context.page_count {
            return Ok(Vec::new());
        }
        Ok(vec![Overlay::rectangle(60.0, 30.0, Color::RED)
            .with_alignment(Alignment::Right, VerticalAlignment::Bottom)
            .with_opacity(0.8)])
    }
}

fn count(strings: &[String], text: &str) -> usize {
    strings.iter().filter(|string| *string == text).count()
}

#[test]
fn hooks_and_overlays_are_stamped_after_the_content() {
    let compositor = Compositor::new(AssemblyConfiguration::default())
        .unwrap()
        .with_page_hook(HeaderFooter::new().with_header("Minutes"))
        .with_page_hook(LastPageStamp)
        .with_overlay(Overlay::watermark("DRAFT"));
    let composition = compositor
        .compose(&paged_document("Minutes", &["Opening", "Votes", "Closing"]))
        .unwrap();
    assert!(composition.warnings.is_empty(), "{:?}", composition.warnings);

    let document = composition.document;
    for page_number in 1..=3 {
        similar_asserts::assert_eq!(
            page_strings(&document, page_number)[1..].to_vec(),
            vec![
                "Minutes".to_string(),
                format!("Page {} of 3", page_number),
                "DRAFT".to_string()
            ]
        );
        let rectangles = page_operators(&document, page_number)
            .into_iter()
            .filter(|operator| operator == "re")
            .count();
        assert_eq!(rectangles, usize::from(page_number == 3));
    }
}

#[test]
fn overlays_applied_after_composition_are_additive() {
    let compositor = Compositor::new(AssemblyConfiguration::default())
        .unwrap()
        .with_overlay(Overlay::watermark("COPY"));
    let mut document = compositor
        .compose(&paged_document("Copies", &["one", "two"]))
        .unwrap()
        .document;

    let warnings = document.apply_overlay(&Overlay::watermark("COPY")).unwrap();
    assert!(warnings.is_empty());
    let reloaded_document = RenderedDocument::from_bytes(&document.save_to_bytes().unwrap()).unwrap();

    for page_number in 1..=2 {
        assert_eq!(count(&page_strings(&reloaded_document, page_number), "COPY"), 2);
    }
}

#[test]
fn invalid_overlays_are_rejected_before_stamping() {
    let mut document = common::compose(&paged_document("Plain", &["only"]));
    let error = document
        .apply_overlay(&Overlay::text("faded").with_opacity(1.5))
        .unwrap_err();

    assert!(error.is_validation());
    assert_eq!(page_strings(&document, 1), vec!["only"]);
}
