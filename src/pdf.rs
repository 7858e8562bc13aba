use lopdf::content::Operation;
use lopdf::Object;
use rand::{distributions::Alphanumeric, Rng as _};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use time::OffsetDateTime;

use crate::document::{Color, DocumentMetadata, Rotation};
use crate::error::{ContextError, ErrorKind};
use crate::fonts::LoadedFont;

/// The low-level image representation for a PDF document: 8 bits per component RGB samples,
/// with an optional alpha channel written as a soft mask.
#[derive(Debug, Clone)]
pub struct ImageXObject {
    /// Width of the image in pixels (original width, not scaled width).
    pub width: u32,
    /// Height of the image in pixels (original height, not scaled height).
    pub height: u32,
    pub rgb_samples: Vec<u8>,
    pub alpha_samples: Option<Vec<u8>>,
}

impl ImageXObject {
    /// Decodes PNG bytes into an image XObject.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ContextError> {
        let image = image::load_from_memory(bytes).map_err(|error| {
            ContextError::with_error(ErrorKind::Resource, "Failed to decode the image", &error)
        })?;
        let alpha_samples = image.color().has_alpha().then(|| {
            image
                .to_rgba8()
                .pixels()
                .map(|pixel| pixel.0[3])
                .collect::<Vec<u8>>()
        });

        Ok(ImageXObject {
            width: image.width(),
            height: image.height(),
            rgb_samples: image.to_rgb8().into_raw(),
            alpha_samples,
        })
    }

    /// Width divided by height, used to scale the image into its target box.
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    fn insert_into_document(&self, inner_document: &mut lopdf::Document) -> lopdf::ObjectId {
        use lopdf::Object::*;

        let mut image_dictionary = lopdf::Dictionary::from_iter(vec![
            ("Type", Name("XObject".into())),
            ("Subtype", Name("Image".into())),
            ("Width", Integer(self.width as i64)),
            ("Height", Integer(self.height as i64)),
            ("ColorSpace", Name("DeviceRGB".into())),
            ("BitsPerComponent", Integer(8)),
            ("Interpolate", Boolean(true)),
        ]);

        // The transparency is carried by a separate grayscale image, see the soft mask section of the PDF reference
        if let Some(alpha_samples) = &self.alpha_samples {
            let soft_mask = lopdf::Stream::new(
                lopdf::Dictionary::from_iter(vec![
                    ("Type", Name("XObject".into())),
                    ("Subtype", Name("Image".into())),
                    ("Width", Integer(self.width as i64)),
                    ("Height", Integer(self.height as i64)),
                    ("ColorSpace", Name("DeviceGray".into())),
                    ("BitsPerComponent", Integer(8)),
                ]),
                alpha_samples.clone(),
            );
            let soft_mask_id = inner_document.add_object(soft_mask);
            image_dictionary.set("SMask", Reference(soft_mask_id));
        }

        inner_document.add_object(lopdf::Stream::new(
            image_dictionary,
            self.rgb_samples.clone(),
        ))
    }
}

/// The representation of a PDF page before it is written: its size, rotation, the operations
/// of its content stream and the names of the resources those operations use.
#[derive(Debug, Clone)]
pub struct PdfPage {
    /// The 1-based number of the page in the document.
    pub number: usize,
    /// Page width in points.
    pub width: f32,
    /// Page height in points.
    pub height: f32,
    pub rotation: Rotation,
    pub operations: Vec<Operation>,
    fonts: BTreeSet<String>,
    images: BTreeSet<String>,
}

/// This struct is the PDF primitives layer used by the compositor: pages are created and written
/// to through indices, and nothing touches the underlying `lopdf::Document` until `write_all`.
///
/// Fonts and images are stored once for the whole document and referenced by resource name
/// (`F0`, `F1`, ... and `Im0`, `Im1`, ...) from the pages that use them.
pub struct PdfDocument {
    metadata: DocumentMetadata,
    /// The association between the font resource names and the fonts.
    fonts: BTreeMap<String, LoadedFont>,
    /// The association between the font families and their resource names.
    font_names: HashMap<String, String>,
    images: BTreeMap<String, ImageXObject>,
    pages: Vec<PdfPage>,
}

impl PdfDocument {
    pub fn new(metadata: DocumentMetadata) -> Self {
        PdfDocument {
            metadata,
            fonts: BTreeMap::new(),
            font_names: HashMap::new(),
            images: BTreeMap::new(),
            pages: Vec::new(),
        }
    }

    /// Adds an empty page of the given size in points and returns its index, to be passed
    /// to the writing functions.
    pub fn add_page(&mut self, width: f32, height: f32, rotation: Rotation) -> usize {
        self.pages.push(PdfPage {
            number: self.pages.len() + 1,
            width,
            height,
            rotation,
            operations: Vec::new(),
            fonts: BTreeSet::new(),
            images: BTreeSet::new(),
        });

        self.pages.len() - 1
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn pages(&self) -> &[PdfPage] {
        &self.pages
    }

    /// Registers a font once and returns the resource name under which text can be written with it.
    pub fn register_font(&mut self, font: &LoadedFont) -> String {
        if let Some(font_name) = self.font_names.get(font.family()) {
            return font_name.clone();
        }
        let font_name = format!("F{}", self.fonts.len());
        self.fonts.insert(font_name.clone(), font.clone());
        self.font_names
            .insert(font.family().to_string(), font_name.clone());

        font_name
    }

    /// Registers an image and returns the resource name under which it can be drawn.
    pub fn add_image(&mut self, image: ImageXObject) -> String {
        let image_name = format!("Im{}", self.images.len());
        self.images.insert(image_name.clone(), image);
        image_name
    }

    /// Writes already encoded text with its baseline starting at the given position in points.
    #[allow(clippy::too_many_arguments)]
    pub fn write_text(
        &mut self,
        page_index: usize,
        font_name: &str,
        font_size: f32,
        color: Color,
        position: [f32; 2],
        text: Object,
    ) -> Result<(), ContextError> {
        if !self.fonts.contains_key(font_name) {
            return Err(ContextError::validation(format!(
                "Failed to find the font {} among the registered fonts",
                font_name
            )));
        }
        let [r, g, b] = color.components();
        let [x, y] = position;
        let page = self.get_mut_page(page_index)?;
        page.fonts.insert(font_name.to_string());
        page.operations.extend(vec![
            Operation::new("q", vec![]),
            Operation::new("rg", vec![r.into(), g.into(), b.into()]),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(font_name.into()), font_size.into()]),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new("Tj", vec![text]),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ]);

        Ok(())
    }

    /// Draws a rectangle given as `[x, y, width, height]`, filled and/or stroked with a line width.
    pub fn write_rectangle(
        &mut self,
        page_index: usize,
        rectangle: [f32; 4],
        fill: Option<Color>,
        stroke: Option<(Color, f32)>,
    ) -> Result<(), ContextError> {
        let painting_operator = match (fill, stroke) {
            (Some(_), Some(_)) => "B",
            (Some(_), None) => "f",
            (None, Some(_)) => "S",
            (None, None) => return Ok(()),
        };
        let [x, y, width, height] = rectangle;
        let mut operations = vec![Operation::new("q", vec![])];
        if let Some(fill) = fill {
            let [r, g, b] = fill.components();
            operations.push(Operation::new("rg", vec![r.into(), g.into(), b.into()]));
        }
        if let Some((stroke, line_width)) = stroke {
            let [r, g, b] = stroke.components();
            operations.push(Operation::new("RG", vec![r.into(), g.into(), b.into()]));
            operations.push(Operation::new("w", vec![line_width.into()]));
        }
        operations.push(Operation::new(
            "re",
            vec![x.into(), y.into(), width.into(), height.into()],
        ));
        operations.push(Operation::new(painting_operator, vec![]));
        operations.push(Operation::new("Q", vec![]));

        self.get_mut_page(page_index)?.operations.extend(operations);

        Ok(())
    }

    /// Draws a registered image stretched over the box `[x, y, width, height]`.
    pub fn write_image(
        &mut self,
        page_index: usize,
        image_name: &str,
        image_box: [f32; 4],
    ) -> Result<(), ContextError> {
        if !self.images.contains_key(image_name) {
            return Err(ContextError::validation(format!(
                "Failed to find the image {} among the registered images",
                image_name
            )));
        }
        let [x, y, width, height] = image_box;
        let page = self.get_mut_page(page_index)?;
        page.images.insert(image_name.to_string());
        // Images are drawn in the unit square, so the transformation matrix scales them to their box
        page.operations.extend(vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width.into(),
                    0.into(),
                    0.into(),
                    height.into(),
                    x.into(),
                    y.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(image_name.into())]),
            Operation::new("Q", vec![]),
        ]);

        Ok(())
    }

    /// Writes the pages, fonts, images, catalog and info dictionary into a new `lopdf::Document`.
    pub fn write_all(self) -> Result<lopdf::Document, ContextError> {
        use lopdf::Object::*;
        use lopdf::StringFormat::*;

        let mut inner_document = lopdf::Document::with_version("1.7");
        let identifier = self
            .metadata
            .identifier
            .clone()
            .unwrap_or_else(generate_identifier);
        let timestamp = to_pdf_timestamp_format(&self.metadata.creation_date);

        let mut document_info = lopdf::Dictionary::from_iter(vec![
            ("Creator", String(b"folio".to_vec(), Literal)),
            ("Producer", String(b"folio".to_vec(), Literal)),
            ("CreationDate", String(timestamp.clone().into_bytes(), Literal)),
            ("ModDate", String(timestamp.into_bytes(), Literal)),
        ]);
        let optional_entries = [
            ("Title", &self.metadata.title),
            ("Author", &self.metadata.author),
            ("Subject", &self.metadata.subject),
        ];
        for (key, value) in optional_entries {
            if let Some(value) = value {
                document_info.set(key, String(value.clone().into_bytes(), Literal));
            }
        }
        let document_info_id = inner_document.add_object(Dictionary(document_info));

        let font_ids: HashMap<&str, lopdf::ObjectId> = self
            .fonts
            .iter()
            .map(|(font_name, font)| {
                let font_dictionary = font.insert_into_document(&mut inner_document, font_name);
                (font_name.as_str(), inner_document.add_object(font_dictionary))
            })
            .collect();
        let image_ids: HashMap<&str, lopdf::ObjectId> = self
            .images
            .iter()
            .map(|(image_name, image)| {
                (
                    image_name.as_str(),
                    image.insert_into_document(&mut inner_document),
                )
            })
            .collect();

        let pages_id = inner_document.new_object_id();
        let mut page_ids = Vec::<Object>::new();
        for page in &self.pages {
            let mut resources = lopdf::Dictionary::new();
            if !page.fonts.is_empty() {
                let fonts: lopdf::Dictionary = page
                    .fonts
                    .iter()
                    .filter_map(|font_name| {
                        font_ids
                            .get(font_name.as_str())
                            .map(|font_id| (font_name.clone(), Reference(*font_id)))
                    })
                    .collect();
                resources.set("Font", Dictionary(fonts));
            }
            if !page.images.is_empty() {
                let images: lopdf::Dictionary = page
                    .images
                    .iter()
                    .filter_map(|image_name| {
                        image_ids
                            .get(image_name.as_str())
                            .map(|image_id| (image_name.clone(), Reference(*image_id)))
                    })
                    .collect();
                resources.set("XObject", Dictionary(images));
            }

            let content = lopdf::content::Content {
                operations: page.operations.clone(),
            }
            .encode()
            .map_err(|error| {
                ContextError::with_error(
                    ErrorKind::Resource,
                    format!("Failed to encode the content of page {}", page.number),
                    &error,
                )
            })?;
            let content_id = inner_document.add_object(lopdf::Stream::new(
                lopdf::Dictionary::new(),
                content,
            ));

            let media_box: Object = vec![0.into(), 0.into(), page.width.into(), page.height.into()].into();
            let page_dictionary = lopdf::Dictionary::from_iter(vec![
                ("Type", "Page".into()),
                ("Parent", Reference(pages_id)),
                ("MediaBox", media_box.clone()),
                ("CropBox", media_box),
                ("Rotate", Integer(page.rotation.degrees())),
                ("Resources", Dictionary(resources)),
                ("Contents", Reference(content_id)),
            ]);
            page_ids.push(Reference(inner_document.add_object(page_dictionary)));
        }

        let pages = lopdf::Dictionary::from_iter(vec![
            ("Type", "Pages".into()),
            ("Count", Integer(page_ids.len() as i64)),
            ("Kids", Array(page_ids)),
        ]);
        inner_document.objects.insert(pages_id, Dictionary(pages));

        let mut catalog = lopdf::Dictionary::from_iter(vec![
            ("Type", "Catalog".into()),
            ("PageLayout", "OneColumn".into()),
            ("Pages", Reference(pages_id)),
        ]);
        if let Some(language) = &self.metadata.language {
            catalog.set("Lang", String(language.clone().into_bytes(), Literal));
        }
        if self.metadata.tagged {
            catalog.set(
                "MarkInfo",
                Dictionary(lopdf::Dictionary::from_iter(vec![("Marked", Boolean(true))])),
            );
            catalog.set(
                "ViewerPreferences",
                Dictionary(lopdf::Dictionary::from_iter(vec![(
                    "DisplayDocTitle",
                    Boolean(true),
                )])),
            );
        }
        let catalog_id = inner_document.add_object(catalog);

        inner_document.trailer.set("Root", Reference(catalog_id));
        inner_document.trailer.set("Info", Reference(document_info_id));
        inner_document.trailer.set(
            "ID",
            Array(vec![
                String(identifier.clone().into_bytes(), Literal),
                String(identifier.into_bytes(), Literal),
            ]),
        );
        log::debug!(
            "Wrote {} pages, {} fonts and {} images",
            self.pages.len(),
            self.fonts.len(),
            self.images.len()
        );

        Ok(inner_document)
    }

    fn get_mut_page(&mut self, page_index: usize) -> Result<&mut PdfPage, ContextError> {
        self.pages
            .get_mut(page_index)
            .ok_or(ContextError::validation(format!(
                "Failed to find the page with index {}",
                page_index
            )))
    }
}

/// A random 32 characters-long identifier, used when the metadata does not provide one.
fn generate_identifier() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Formats the given time so that it matches what the PDF format expects.
/// An example of it is the following: D:20170505150224+02'00'.
pub fn to_pdf_timestamp_format(date: &OffsetDateTime) -> String {
    let offset = date.offset();
    let offset_sign = if offset.is_negative() { '-' } else { '+' };
    format!(
        "D:{:04}{:02}{:02}{:02}{:02}{:02}{offset_sign}{:02}'{:02}'",
        date.year(),
        u8::from(date.month()),
        date.day(),
        date.hour(),
        date.minute(),
        date.second(),
        offset.whole_hours().abs(),
        offset.minutes_past_hour().abs(),
    )
}
