use lopdf::content::{Content, Operation};
use lopdf::{Object, ObjectId};
use nalgebra_glm as glm;

use crate::document::{Alignment, Color, PageSize};
use crate::error::{ContextError, ErrorKind, RenderWarning};
use crate::fonts::LoadedFont;
use crate::rendered::{inherited_attribute, page_media_box, resolve_dictionary};

/// Vertical placement of an overlay on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerticalAlignment {
    Top,
    #[default]
    Middle,
    Bottom,
}

/// What an overlay draws.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayContent {
    /// A single line of text, written with the standard font unless a family is given.
    Text {
        text: String,
        font_size: f32,
        color: Color,
        font_family: Option<String>,
    },
    /// A filled rectangle of the given size in points.
    Rectangle { width: f32, height: f32, color: Color },
}

/// Content stamped on top of a page after layout, such as a watermark, a stamp or a page number.
/// It never takes part in the flow: it is positioned relative to the page box.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub content: OverlayContent,
    pub horizontal_alignment: Alignment,
    pub vertical_alignment: VerticalAlignment,
    /// Counter-clockwise rotation around the overlay center, in degrees.
    pub rotation_degrees: f32,
    /// From 0 (invisible) to 1 (opaque).
    pub opacity: f32,
    /// Distance in points kept from the page edges the overlay is aligned to.
    pub margin: f32,
}

impl Overlay {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Overlay {
            content: OverlayContent::Text {
                text: text.into(),
                font_size: 12.0,
                color: Color::BLACK,
                font_family: None,
            },
            horizontal_alignment: Alignment::Center,
            vertical_alignment: VerticalAlignment::Middle,
            rotation_degrees: 0.0,
            opacity: 1.0,
            margin: 20.0,
        }
    }

    pub fn rectangle(width: f32, height: f32, color: Color) -> Self {
        Overlay {
            content: OverlayContent::Rectangle {
                width,
                height,
                color,
            },
            ..Overlay::text("")
        }
    }

    /// Large, light and diagonal text across the middle of the page.
    pub fn watermark<S: Into<String>>(text: S) -> Self {
        Overlay::text(text)
            .with_font_size(50.0)
            .with_color(Color::LIGHT_GRAY)
            .with_rotation(45.0)
            .with_opacity(0.5)
    }

    /// Only affects text overlays.
    pub fn with_font_size(mut self, new_font_size: f32) -> Self {
        if let OverlayContent::Text { font_size, .. } = &mut self.content {
            *font_size = new_font_size;
        }
        self
    }

    /// Only affects text overlays. The family is resolved by whoever stamps the overlay, and
    /// an unknown family falls back to the standard font with a warning.
    pub fn with_font_family<S: Into<String>>(mut self, new_font_family: S) -> Self {
        if let OverlayContent::Text { font_family, .. } = &mut self.content {
            *font_family = Some(new_font_family.into());
        }
        self
    }

    pub fn font_family(&self) -> Option<&str> {
        match &self.content {
            OverlayContent::Text { font_family, .. } => font_family.as_deref(),
            OverlayContent::Rectangle { .. } => None,
        }
    }

    pub fn with_color(mut self, new_color: Color) -> Self {
        match &mut self.content {
            OverlayContent::Text { color, .. } | OverlayContent::Rectangle { color, .. } => {
                *color = new_color
            }
        }
        self
    }

    pub fn with_alignment(
        mut self,
        horizontal_alignment: Alignment,
        vertical_alignment: VerticalAlignment,
    ) -> Self {
        self.horizontal_alignment = horizontal_alignment;
        self.vertical_alignment = vertical_alignment;
        self
    }

    pub fn with_rotation(mut self, rotation_degrees: f32) -> Self {
        self.rotation_degrees = rotation_degrees;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_margin(mut self, margin: f32) -> Self {
        self.margin = margin;
        self
    }

    pub fn validate(&self) -> Result<(), ContextError> {
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(ContextError::validation(format!(
                "Invalid overlay opacity {} (expected a value between 0 and 1)",
                self.opacity
            )));
        }
        if !(self.margin >= 0.0) {
            return Err(ContextError::validation(format!(
                "Invalid overlay margin {}",
                self.margin
            )));
        }
        if !self.rotation_degrees.is_finite() {
            return Err(ContextError::validation(format!(
                "Invalid overlay rotation {}",
                self.rotation_degrees
            )));
        }
        match &self.content {
            OverlayContent::Text { font_size, .. } if !(*font_size > 0.0) => Err(
                ContextError::validation(format!("Invalid overlay font size {}", font_size)),
            ),
            OverlayContent::Rectangle { width, height, .. } if !(*width > 0.0 && *height > 0.0) => {
                Err(ContextError::validation(format!(
                    "Invalid overlay rectangle {}x{}",
                    width, height
                )))
            }
            _ => Ok(()),
        }
    }
}

/// What a page hook knows about the page it is called for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageContext {
    /// The 1-based number of the page.
    pub page_number: usize,
    pub page_count: usize,
    pub page_size: PageSize,
}

/// A callback run once per page, in registration order, after the page content is fixed.
/// The overlays it returns are stamped on that page only.
pub trait PageHook {
    fn overlays_for_page(&self, context: &PageContext) -> Result<Vec<Overlay>, ContextError>;
}

/// Draws an optional header at the top of every page and a footer at the bottom. The
/// placeholders `{page}` and `{pages}` of the footer are replaced by the page number and count.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderFooter {
    pub header: Option<String>,
    pub footer: String,
    pub font_size: f32,
    pub color: Color,
    pub margin: f32,
    pub font_family: Option<String>,
}

impl Default for HeaderFooter {
    fn default() -> Self {
        HeaderFooter {
            header: None,
            footer: "Page {page} of {pages}".into(),
            font_size: 9.0,
            color: Color::DARK_GRAY,
            margin: 18.0,
            font_family: None,
        }
    }
}

impl HeaderFooter {
    pub fn new() -> Self {
        HeaderFooter::default()
    }

    pub fn with_header<S: Into<String>>(mut self, header: S) -> Self {
        self.header = Some(header.into());
        self
    }

    pub fn with_footer<S: Into<String>>(mut self, footer: S) -> Self {
        self.footer = footer.into();
        self
    }

    pub fn with_font_family<S: Into<String>>(mut self, font_family: S) -> Self {
        self.font_family = Some(font_family.into());
        self
    }

    fn overlay(&self, text: String, vertical_alignment: VerticalAlignment) -> Overlay {
        let overlay = Overlay::text(text)
            .with_font_size(self.font_size)
            .with_color(self.color)
            .with_alignment(Alignment::Center, vertical_alignment)
            .with_margin(self.margin);
        match &self.font_family {
            Some(font_family) => overlay.with_font_family(font_family.clone()),
            None => overlay,
        }
    }
}

impl PageHook for HeaderFooter {
    fn overlays_for_page(&self, context: &PageContext) -> Result<Vec<Overlay>, ContextError> {
        let mut overlays = Vec::new();
        if let Some(header) = &self.header {
            overlays.push(self.overlay(header.clone(), VerticalAlignment::Top));
        }
        let footer = self
            .footer
            .replace("{page}", &context.page_number.to_string())
            .replace("{pages}", &context.page_count.to_string());
        overlays.push(self.overlay(footer, VerticalAlignment::Bottom));

        Ok(overlays)
    }
}

/// The transformation that maps the overlay box, drawn with its lower-left corner at the origin,
/// onto the page: a rotation followed by the translation that aligns the rotated bounding box.
pub fn overlay_transform(
    overlay: &Overlay,
    box_width: f32,
    box_height: f32,
    media_box: [f32; 4],
) -> glm::Mat3 {
    let rotation = glm::rotation2d(overlay.rotation_degrees.to_radians());
    let corners = [
        glm::vec3(0.0, 0.0, 1.0),
        glm::vec3(box_width, 0.0, 1.0),
        glm::vec3(0.0, box_height, 1.0),
        glm::vec3(box_width, box_height, 1.0),
    ]
    .map(|corner| rotation * corner);
    let (mut min_x, mut min_y) = (f32::INFINITY, f32::INFINITY);
    let (mut max_x, mut max_y) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
    for corner in corners {
        min_x = min_x.min(corner.x);
        min_y = min_y.min(corner.y);
        max_x = max_x.max(corner.x);
        max_y = max_y.max(corner.y);
    }
    let (bounding_width, bounding_height) = (max_x - min_x, max_y - min_y);

    let [x_origin, y_origin, x_end, y_end] = media_box;
    let (page_width, page_height) = (x_end - x_origin, y_end - y_origin);
    let left = x_origin
        + match overlay.horizontal_alignment {
            Alignment::Left => overlay.margin,
            Alignment::Center => (page_width - bounding_width) / 2.0,
            Alignment::Right => page_width - overlay.margin - bounding_width,
        };
    let bottom = y_origin
        + match overlay.vertical_alignment {
            VerticalAlignment::Bottom => overlay.margin,
            VerticalAlignment::Middle => (page_height - bounding_height) / 2.0,
            VerticalAlignment::Top => page_height - overlay.margin - bounding_height,
        };

    glm::translation2d(&glm::vec2(left - min_x, bottom - min_y)) * rotation
}

/// Stamps the overlay on top of the existing content of a page of a lopdf document.
///
/// The existing content is isolated between a `q`/`Q` pair so that its graphics state does not
/// leak into the overlay, and the overlay gets a new content stream and resource names that do
/// not collide with those already on the page. Stamping the same overlay twice draws it twice.
///
/// Text is written with `font`. Its font object is added to the document the first time and its
/// identifier stored in `font_id`, so that later stampings with the same font reuse it.
pub fn stamp_overlay(
    inner_document: &mut lopdf::Document,
    page_id: ObjectId,
    page_number: usize,
    overlay: &Overlay,
    font: &LoadedFont,
    font_id: &mut Option<ObjectId>,
) -> Result<Vec<RenderWarning>, ContextError> {
    overlay.validate()?;
    let media_box = page_media_box(inner_document, page_id);
    let mut resources = inherited_attribute(inner_document, page_id, b"Resources")
        .and_then(|resources| resolve_dictionary(inner_document, &resources))
        .unwrap_or_else(lopdf::Dictionary::new);
    let mut warnings = Vec::new();

    // Restores the graphics state of the page content, then isolates the overlay
    let mut operations = vec![Operation::new("Q", vec![]), Operation::new("q", vec![])];

    if overlay.opacity < 1.0 {
        let mut graphics_states = sub_dictionary(inner_document, &resources, b"ExtGState");
        let graphics_state_name = unique_name(&graphics_states, "GsOverlay");
        let graphics_state_id = inner_document.add_object(lopdf::Dictionary::from_iter(vec![
            ("Type", Object::Name("ExtGState".into())),
            ("ca", Object::Real(overlay.opacity)),
            ("CA", Object::Real(overlay.opacity)),
        ]));
        graphics_states.set(graphics_state_name.clone(), Object::Reference(graphics_state_id));
        resources.set("ExtGState", Object::Dictionary(graphics_states));
        operations.push(Operation::new(
            "gs",
            vec![Object::Name(graphics_state_name.into_bytes())],
        ));
    }

    match &overlay.content {
        OverlayContent::Text {
            text,
            font_size,
            color,
            ..
        } => {
            let encoded_text = font.encode(text);
            for missing_character in &encoded_text.missing_characters {
                warnings.push(RenderWarning::new(
                    Some(page_number),
                    format!(
                        "The overlay character {:?} is not supported by {} and was replaced",
                        missing_character,
                        font.family()
                    ),
                ));
            }

            let mut fonts = sub_dictionary(inner_document, &resources, b"Font");
            let font_name = unique_name(&fonts, "FOverlay");
            let font_object_id = match *font_id {
                Some(font_object_id) => font_object_id,
                None => {
                    let font_dictionary = font.insert_into_document(inner_document, &font_name);
                    let font_object_id = inner_document.add_object(font_dictionary);
                    *font_id = Some(font_object_id);
                    font_object_id
                }
            };
            fonts.set(font_name.clone(), Object::Reference(font_object_id));
            resources.set("Font", Object::Dictionary(fonts));

            let box_width = font.text_width(text, *font_size);
            let box_height = font_size * (font.ascent() + font.descent());
            let [r, g, b] = color.components();
            operations.extend(vec![
                transformation_operation(&overlay_transform(overlay, box_width, box_height, media_box)),
                Operation::new("rg", vec![r.into(), g.into(), b.into()]),
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Object::Name(font_name.into_bytes()), (*font_size).into()]),
                Operation::new("Td", vec![0.into(), (font_size * font.descent()).into()]),
                Operation::new("Tj", vec![encoded_text.into_object()]),
                Operation::new("ET", vec![]),
            ]);
        }
        OverlayContent::Rectangle {
            width,
            height,
            color,
        } => {
            let [r, g, b] = color.components();
            operations.extend(vec![
                transformation_operation(&overlay_transform(overlay, *width, *height, media_box)),
                Operation::new("rg", vec![r.into(), g.into(), b.into()]),
                Operation::new(
                    "re",
                    vec![0.into(), 0.into(), (*width).into(), (*height).into()],
                ),
                Operation::new("f", vec![]),
            ]);
        }
    }
    operations.push(Operation::new("Q", vec![]));

    let encoded_content = Content { operations }.encode().map_err(|error| {
        ContextError::with_error(
            ErrorKind::Resource,
            format!("Failed to encode the overlay of page {}", page_number),
            &error,
        )
    })?;
    let save_state_id = inner_document.add_object(lopdf::Stream::new(
        lopdf::Dictionary::new(),
        b"q\n".to_vec(),
    ));
    let overlay_id = inner_document.add_object(lopdf::Stream::new(
        lopdf::Dictionary::new(),
        encoded_content,
    ));

    let page = inner_document
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|error| {
            ContextError::with_error(
                ErrorKind::Resource,
                format!("Failed to access page {}", page_number),
                &error,
            )
        })?;
    let mut contents = vec![Object::Reference(save_state_id)];
    match page.get(b"Contents") {
        Ok(Object::Array(existing_contents)) => contents.extend(existing_contents.iter().cloned()),
        Ok(existing_content @ Object::Reference(_)) => contents.push(existing_content.clone()),
        _ => {}
    }
    contents.push(Object::Reference(overlay_id));
    page.set("Contents", Object::Array(contents));
    // The resources are copied onto the page so that pages sharing them are left untouched
    page.set("Resources", Object::Dictionary(resources));

    Ok(warnings)
}

fn transformation_operation(transform: &glm::Mat3) -> Operation {
    Operation::new(
        "cm",
        vec![
            transform[(0, 0)].into(),
            transform[(1, 0)].into(),
            transform[(0, 1)].into(),
            transform[(1, 1)].into(),
            transform[(0, 2)].into(),
            transform[(1, 2)].into(),
        ],
    )
}

/// A copy of a dictionary nested in the resources, resolved if it is a reference.
fn sub_dictionary(
    inner_document: &lopdf::Document,
    resources: &lopdf::Dictionary,
    key: &[u8],
) -> lopdf::Dictionary {
    resources
        .get(key)
        .ok()
        .and_then(|object| resolve_dictionary(inner_document, object))
        .unwrap_or_else(lopdf::Dictionary::new)
}

/// The first name made of the prefix and an index that is not yet a key of the dictionary.
fn unique_name(dictionary: &lopdf::Dictionary, prefix: &str) -> String {
    let mut index = 0;
    loop {
        let name = format!("{}{}", prefix, index);
        if !dictionary.has(name.as_bytes()) {
            return name;
        }
        index += 1;
    }
}
