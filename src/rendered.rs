use lopdf::{Object, ObjectId};
use std::collections::HashMap;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::document::{PageSize, Rotation};
use crate::error::{ContextError, ErrorKind, RenderWarning};
use crate::fonts::{FontRegistry, LoadedFont, STANDARD_FONT_FAMILY};
use crate::overlay::{stamp_overlay, Overlay};

/// The maximum depth walked up the page tree when looking for an inherited attribute.
const MAXIMUM_PAGE_TREE_DEPTH: usize = 32;

/// A PDF document ready to be serialized: either the output of the compositor or of the merger,
/// or an existing PDF loaded from bytes or from a file.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    inner_document: lopdf::Document,
    /// The font objects added by overlays, by font family, shared by later overlays.
    overlay_font_ids: HashMap<String, ObjectId>,
}

impl RenderedDocument {
    pub(crate) fn new(inner_document: lopdf::Document) -> Self {
        RenderedDocument {
            inner_document,
            overlay_font_ids: HashMap::new(),
        }
    }

    /// Parses PDF bytes, failing with a resource error if they are not a readable PDF document.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ContextError> {
        let inner_document = lopdf::Document::load_mem(bytes).map_err(|error| {
            ContextError::with_error(ErrorKind::Resource, "Failed to parse the PDF document", &error)
        })?;
        if inner_document.catalog().is_err() {
            return Err(ContextError::resource(
                "The PDF document has no catalog",
            ));
        }

        Ok(RenderedDocument::new(inner_document))
    }

    pub fn from_path(pdf_file_path: &Path) -> Result<Self, ContextError> {
        let bytes = std::fs::read(pdf_file_path).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Resource,
                format!("Failed to read the PDF file {:?}", pdf_file_path),
                &error,
            )
        })?;
        RenderedDocument::from_bytes(&bytes).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Resource,
                format!("Failed to load the PDF file {:?}", pdf_file_path),
                &error,
            )
        })
    }

    pub fn page_count(&self) -> usize {
        self.inner_document.get_pages().len()
    }

    /// The identifiers of the page objects, in page order.
    pub fn page_ids(&self) -> Vec<ObjectId> {
        self.inner_document.get_pages().into_values().collect()
    }

    /// The size of a page as given by its (possibly inherited) media box.
    pub fn page_size(&self, page_number: usize) -> Result<PageSize, ContextError> {
        let page_id = self.page_id(page_number)?;
        let [x_origin, y_origin, x_end, y_end] = page_media_box(&self.inner_document, page_id);
        Ok(PageSize::new(x_end - x_origin, y_end - y_origin))
    }

    pub fn inner(&self) -> &lopdf::Document {
        &self.inner_document
    }

    pub fn into_inner(self) -> lopdf::Document {
        self.inner_document
    }

    /// Stamps the overlay on every page. A page that cannot be stamped is reported as a warning
    /// and the remaining pages are still stamped; an invalid overlay is an error.
    ///
    /// Only the standard font is known here: a text overlay naming another family falls back to
    /// it with a warning. Use [`RenderedDocument::apply_overlay_with_font`] to stamp text with an
    /// embedded font.
    pub fn apply_overlay(&mut self, overlay: &Overlay) -> Result<Vec<RenderWarning>, ContextError> {
        overlay.validate()?;
        let fonts = FontRegistry::default();
        let (font, mut warnings) = resolve_overlay_font(&fonts, overlay, None);
        warnings.extend(self.apply_overlay_with_font(overlay, font)?);

        Ok(warnings)
    }

    /// Stamps the overlay on every page, writing its text with the given font.
    pub fn apply_overlay_with_font(
        &mut self,
        overlay: &Overlay,
        font: &LoadedFont,
    ) -> Result<Vec<RenderWarning>, ContextError> {
        overlay.validate()?;
        let mut warnings = Vec::new();
        for page_number in 1..=self.page_count() {
            match self.apply_overlay_to_page_with_font(page_number, overlay, font) {
                Ok(page_warnings) => warnings.extend(page_warnings),
                Err(error) => warnings.push(RenderWarning::new(
                    Some(page_number),
                    format!("Failed to apply the overlay: {}", error),
                )),
            }
        }
        log::debug!(
            "Applied an overlay to {} pages with {} warnings",
            self.page_count(),
            warnings.len()
        );

        Ok(warnings)
    }

    /// Stamps the overlay on the page with the given 1-based number only, resolving its font
    /// family like [`RenderedDocument::apply_overlay`].
    pub fn apply_overlay_to_page(
        &mut self,
        page_number: usize,
        overlay: &Overlay,
    ) -> Result<Vec<RenderWarning>, ContextError> {
        let fonts = FontRegistry::default();
        let (font, mut warnings) = resolve_overlay_font(&fonts, overlay, Some(page_number));
        warnings.extend(self.apply_overlay_to_page_with_font(page_number, overlay, font)?);

        Ok(warnings)
    }

    pub fn apply_overlay_to_page_with_font(
        &mut self,
        page_number: usize,
        overlay: &Overlay,
        font: &LoadedFont,
    ) -> Result<Vec<RenderWarning>, ContextError> {
        let page_id = self.page_id(page_number)?;
        let mut font_id = self
            .overlay_font_ids
            .get(font.family())
            .copied()
            .filter(|font_id| self.inner_document.objects.contains_key(font_id));
        let warnings = stamp_overlay(
            &mut self.inner_document,
            page_id,
            page_number,
            overlay,
            font,
            &mut font_id,
        )?;
        if let Some(font_id) = font_id {
            self.overlay_font_ids
                .insert(font.family().to_string(), font_id);
        }

        Ok(warnings)
    }

    /// Sets the display rotation of every page.
    pub fn set_rotation(&mut self, rotation: Rotation) -> Result<(), ContextError> {
        for page_id in self.page_ids() {
            let page = self
                .inner_document
                .get_object_mut(page_id)
                .and_then(Object::as_dict_mut)
                .map_err(|error| {
                    ContextError::with_error(
                        ErrorKind::Resource,
                        format!("Failed to access the page object {:?}", page_id),
                        &error,
                    )
                })?;
            page.set("Rotate", Object::Integer(rotation.degrees()));
        }

        Ok(())
    }

    /// Optimize the PDF document (only superficially).
    pub fn optimize(&mut self) {
        // Renumbering invalidates the identifiers of the overlay fonts
        self.overlay_font_ids.clear();
        self.inner_document.prune_objects();
        self.inner_document.delete_zero_length_streams();
        self.inner_document.renumber_objects();
        self.inner_document.compress();
    }

    /// Save the document to bytes in order for it to be written to a file or further processed.
    pub fn save_to_bytes(&mut self) -> Result<Vec<u8>, ContextError> {
        let mut pdf_document_bytes = Vec::new();
        let mut writer = BufWriter::new(&mut pdf_document_bytes);
        self.inner_document.save_to(&mut writer).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Resource,
                "Failed to save the PDF document to bytes",
                &error,
            )
        })?;
        drop(writer);

        Ok(pdf_document_bytes)
    }

    /// Writes the document to an intermediate `.swp` file next to the target, then renames it.
    /// If anything fails the intermediate file is removed, so the target is either fully written
    /// or left as it was.
    pub fn save(&mut self, pdf_file_path: &Path) -> Result<(), ContextError> {
        let swap_file_path = PathBuf::from(format!("{}.swp", pdf_file_path.display()));
        let result = self.save_to_bytes().and_then(|bytes| {
            std::fs::write(&swap_file_path, bytes).map_err(|error| {
                ContextError::with_error(
                    ErrorKind::Resource,
                    format!("Failed to write the PDF file {:?}", swap_file_path),
                    &error,
                )
            })?;
            std::fs::rename(&swap_file_path, pdf_file_path).map_err(|error| {
                ContextError::with_error(
                    ErrorKind::Resource,
                    format!("Failed to rename the PDF file to {:?}", pdf_file_path),
                    &error,
                )
            })
        });
        if result.is_err() && swap_file_path.exists() {
            if let Err(error) = std::fs::remove_file(&swap_file_path) {
                log::error!("Failed to remove {:?}: {}", swap_file_path, error);
            }
        }
        if result.is_ok() {
            log::debug!("Saved the PDF document to {:?}", pdf_file_path);
        }

        result
    }

    fn page_id(&self, page_number: usize) -> Result<ObjectId, ContextError> {
        u32::try_from(page_number)
            .ok()
            .and_then(|page_number| self.inner_document.get_pages().get(&page_number).copied())
            .ok_or(ContextError::validation(format!(
                "Page {} does not exist in a document of {} pages",
                page_number,
                self.page_count()
            )))
    }
}

/// Resolves the font family of an overlay, falling back to the standard font with a warning
/// when the registry does not know it.
pub(crate) fn resolve_overlay_font<'a>(
    fonts: &'a FontRegistry,
    overlay: &Overlay,
    page_number: Option<usize>,
) -> (&'a LoadedFont, Vec<RenderWarning>) {
    let (font, unknown_family) = fonts.resolve(overlay.font_family());
    let warnings = unknown_family
        .map(|unknown_family| {
            RenderWarning::new(
                page_number,
                format!(
                    "Unknown overlay font family {:?}, falling back to {}",
                    unknown_family, STANDARD_FONT_FAMILY
                ),
            )
        })
        .into_iter()
        .collect();

    (font, warnings)
}

/// Looks up a page attribute, walking up the page tree for the inheritable ones
/// (`Resources`, `MediaBox`, `CropBox` and `Rotate`).
pub(crate) fn inherited_attribute(
    inner_document: &lopdf::Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<Object> {
    let mut node_id = page_id;
    for _ in 0..MAXIMUM_PAGE_TREE_DEPTH {
        let node = inner_document.get_dictionary(node_id).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        node_id = node.get(b"Parent").and_then(Object::as_reference).ok()?;
    }

    None
}

/// A copy of the dictionary, resolved if the object is a reference to it.
pub(crate) fn resolve_dictionary(
    inner_document: &lopdf::Document,
    object: &Object,
) -> Option<lopdf::Dictionary> {
    match object {
        Object::Dictionary(dictionary) => Some(dictionary.clone()),
        Object::Reference(object_id) => inner_document.get_dictionary(*object_id).ok().cloned(),
        _ => None,
    }
}

/// The media box of a page as `[x0, y0, x1, y1]`, US Letter when it is missing or malformed.
pub(crate) fn page_media_box(inner_document: &lopdf::Document, page_id: ObjectId) -> [f32; 4] {
    let media_box = inherited_attribute(inner_document, page_id, b"MediaBox").and_then(|media_box| {
        let array = match media_box {
            Object::Array(array) => array,
            Object::Reference(object_id) => inner_document
                .get_object(object_id)
                .and_then(Object::as_array)
                .ok()?
                .clone(),
            _ => return None,
        };
        let values: Vec<f32> = array
            .iter()
            .filter_map(|value| match value {
                Object::Integer(value) => Some(*value as f32),
                Object::Real(value) => Some(*value),
                _ => None,
            })
            .collect();
        <[f32; 4]>::try_from(values).ok()
    });

    media_box.unwrap_or([0.0, 0.0, PageSize::LETTER.width, PageSize::LETTER.height])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Color, DocumentMetadata};
    use crate::fonts::LoadedFont;
    use crate::pdf::PdfDocument;
    use lopdf::content::Content;
    use rand::{distributions::Alphanumeric, Rng as _};

    fn two_page_document() -> RenderedDocument {
        let mut pdf_document = PdfDocument::new(DocumentMetadata::default());
        let font = LoadedFont::helvetica();
        let font_name = pdf_document.register_font(&font);
        for text in ["first", "second"] {
            let page_index = pdf_document.add_page(300.0, 400.0, Rotation::Upright);
            pdf_document
                .write_text(
                    page_index,
                    &font_name,
                    12.0,
                    Color::BLACK,
                    [20.0, 20.0],
                    font.encode(text).into_object(),
                )
                .unwrap();
        }
        RenderedDocument::new(pdf_document.write_all().unwrap())
    }

    fn text_operands(document: &RenderedDocument, page_number: usize) -> Vec<Vec<u8>> {
        let page_id = document.page_id(page_number).unwrap();
        let content = document.inner().get_page_content(page_id).unwrap();
        Content::decode(&content)
            .unwrap()
            .operations
            .into_iter()
            .filter(|operation| operation.operator == "Tj")
            .filter_map(|operation| operation.operands.first()?.as_str().ok().map(<[u8]>::to_vec))
            .collect()
    }

    fn temporary_path(extension: &str) -> PathBuf {
        let name: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(12)
            .map(char::from)
            .collect();
        std::env::temp_dir().join(format!("folio-{}.{}", name, extension))
    }

    #[test]
    fn corrupt_bytes_are_a_resource_error() {
        let error = RenderedDocument::from_bytes(b"%PDF-1.7 garbage").unwrap_err();
        assert!(error.is_resource());
    }

    #[test]
    fn overlays_are_additive() {
        let mut document = two_page_document();
        let watermark = Overlay::watermark("DRAFT");
        assert!(document.apply_overlay(&watermark).unwrap().is_empty());
        assert!(document.apply_overlay(&watermark).unwrap().is_empty());

        for page_number in 1..=2 {
            let marks = text_operands(&document, page_number)
                .into_iter()
                .filter(|operand| operand == b"DRAFT")
                .count();
            assert_eq!(marks, 2);
        }

        // Each application uses its own resource names
        let page = document.inner().get_dictionary(document.page_ids()[0]).unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let fonts = resources.get(b"Font").unwrap().as_dict().unwrap();
        assert!(fonts.has(b"F0") && fonts.has(b"FOverlay0") && fonts.has(b"FOverlay1"));
        let graphics_states = resources.get(b"ExtGState").unwrap().as_dict().unwrap();
        assert_eq!(graphics_states.len(), 2);
    }

    #[test]
    fn stamped_documents_survive_a_round_trip() {
        let mut document = two_page_document();
        document.apply_overlay(&Overlay::text("Confidential")).unwrap();
        let bytes = document.save_to_bytes().unwrap();
        let reloaded = RenderedDocument::from_bytes(&bytes).unwrap();

        assert_eq!(reloaded.page_count(), 2);
        assert_eq!(
            text_operands(&reloaded, 2),
            vec![b"second".to_vec(), b"Confidential".to_vec()]
        );
    }

    #[test]
    fn unsupported_overlay_characters_raise_warnings() {
        let mut document = two_page_document();
        let warnings = document.apply_overlay(&Overlay::text("機密")).unwrap();

        assert_eq!(warnings.len(), 4);
        assert_eq!(warnings[3].page_number, Some(2));
        assert!(document
            .apply_overlay(&Overlay::text("x").with_opacity(-1.0))
            .is_err());
    }

    #[test]
    fn overlays_with_an_embedded_font_write_glyph_identifiers() {
        let font_bytes = std::fs::read(
            Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/watermark-glyphs.ttf"),
        )
        .unwrap();
        let font = LoadedFont::from_ttf_bytes("Watermark Glyphs", font_bytes).unwrap();
        let mut document = two_page_document();
        let watermark = Overlay::watermark("水印示例").with_font_family("Watermark Glyphs");

        let warnings = document.apply_overlay_with_font(&watermark, &font).unwrap();
        assert!(warnings.is_empty());
        for page_number in 1..=2 {
            assert_eq!(
                text_operands(&document, page_number)[1],
                vec![0, 3, 0, 2, 0, 4, 0, 1]
            );
        }

        // Both pages share a single embedded font object
        let font_references: Vec<ObjectId> = document
            .page_ids()
            .into_iter()
            .map(|page_id| {
                let page = document.inner().get_dictionary(page_id).unwrap();
                let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
                let fonts = resources.get(b"Font").unwrap().as_dict().unwrap();
                fonts.get(b"FOverlay0").unwrap().as_reference().unwrap()
            })
            .collect();
        assert_eq!(font_references[0], font_references[1]);
    }

    #[test]
    fn unknown_overlay_font_families_fall_back_with_a_warning() {
        let mut document = two_page_document();
        let warnings = document
            .apply_overlay(&Overlay::text("DRAFT").with_font_family("Missing Sans"))
            .unwrap();

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].page_number, None);
        assert!(warnings[0].message.contains("Missing Sans"));
        assert_eq!(text_operands(&document, 1)[1], b"DRAFT".to_vec());
    }

    #[test]
    fn rotation_is_set_on_every_page() {
        let mut document = two_page_document();
        document.set_rotation(Rotation::ThreeQuarters).unwrap();
        for page_id in document.page_ids() {
            let page = document.inner().get_dictionary(page_id).unwrap();
            assert_eq!(page.get(b"Rotate").unwrap().as_i64().unwrap(), 270);
        }
        assert_eq!(document.page_size(1).unwrap(), PageSize::new(300.0, 400.0));
        assert!(document.page_size(3).unwrap_err().is_validation());
    }

    #[test]
    fn saving_leaves_no_swap_file_behind() {
        let pdf_file_path = temporary_path("pdf");
        let mut document = two_page_document();
        document.save(&pdf_file_path).unwrap();

        assert_eq!(RenderedDocument::from_path(&pdf_file_path).unwrap().page_count(), 2);
        assert!(!PathBuf::from(format!("{}.swp", pdf_file_path.display())).exists());
        std::fs::remove_file(&pdf_file_path).unwrap();
    }

    #[test]
    fn failed_saves_are_resource_errors() {
        let pdf_file_path = temporary_path("missing").join("output.pdf");
        let error = two_page_document().save(&pdf_file_path).unwrap_err();

        assert!(error.is_resource());
        assert!(!pdf_file_path.exists());
    }

    #[test]
    fn inherited_media_box_is_resolved_from_the_page_tree() {
        let mut inner_document = lopdf::Document::with_version("1.5");
        let pages_id = inner_document.new_object_id();
        let page_id = inner_document.add_object(lopdf::Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
        ]));
        inner_document.objects.insert(
            pages_id,
            Object::Dictionary(lopdf::Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Pages".to_vec())),
                ("Kids", Object::Array(vec![Object::Reference(page_id)])),
                ("Count", Object::Integer(1)),
                (
                    "MediaBox",
                    Object::Array(vec![0.into(), 0.into(), 200.into(), Object::Real(100.5)]),
                ),
            ])),
        );

        assert_eq!(
            page_media_box(&inner_document, page_id),
            [0.0, 0.0, 200.0, 100.5]
        );
        assert!(inherited_attribute(&inner_document, page_id, b"Rotate").is_none());
    }
}
