use std::collections::HashMap;

use crate::configuration::AssemblyConfiguration;
use crate::document::{Alignment, Block, Color, Document, TableBlock};
use crate::error::{ContextError, RenderWarning};
use crate::fonts::{FontRegistry, LoadedFont};
use crate::layout::{
    layout_document, Fragment, LayoutOutcome, LineSegment, PageLayout, RowPlacement, TextLine,
};
use crate::overlay::{Overlay, PageContext, PageHook};
use crate::pdf::{ImageXObject, PdfDocument};
use crate::rendered::{resolve_overlay_font, RenderedDocument};

/// Width of the lines drawn around table cells, in points.
const CELL_BORDER_WIDTH: f32 = 0.5;

/// The result of a composition: the rendered document, the layout it was rendered from and
/// every warning raised along the way.
#[derive(Debug)]
pub struct Composition {
    pub document: RenderedDocument,
    pub layout: Vec<PageLayout>,
    pub warnings: Vec<RenderWarning>,
}

/// Lays a finalized document out onto pages, renders every page, runs the page hooks and
/// stamps the overlays.
pub struct Compositor {
    configuration: AssemblyConfiguration,
    fonts: FontRegistry,
    overlays: Vec<Overlay>,
    page_hooks: Vec<Box<dyn PageHook>>,
}

impl Compositor {
    /// Validates the configuration and loads the fonts it associates with font families.
    pub fn new(configuration: AssemblyConfiguration) -> Result<Self, ContextError> {
        configuration.validate()?;
        let fonts = FontRegistry::from_configuration(&configuration)?;

        Ok(Compositor {
            configuration,
            fonts,
            overlays: Vec::new(),
            page_hooks: Vec::new(),
        })
    }

    pub fn configuration(&self) -> &AssemblyConfiguration {
        &self.configuration
    }

    /// Makes an already loaded font available under its family name.
    pub fn with_font(mut self, font: LoadedFont) -> Self {
        self.fonts.register(font);
        self
    }

    /// Registers an overlay stamped on every page of every composed document.
    pub fn with_overlay(mut self, overlay: Overlay) -> Self {
        self.overlays.push(overlay);
        self
    }

    /// Registers a hook run once per page, after the hooks registered before it.
    pub fn with_page_hook<H: PageHook + 'static>(mut self, page_hook: H) -> Self {
        self.page_hooks.push(Box::new(page_hook));
        self
    }

    /// Runs only the flow algorithm, without rendering anything.
    pub fn layout(&self, document: &Document) -> Result<LayoutOutcome, ContextError> {
        layout_document(document, &self.configuration, &self.fonts)
    }

    pub fn compose(&self, document: &Document) -> Result<Composition, ContextError> {
        let LayoutOutcome {
            pages,
            mut warnings,
        } = self.layout(document)?;
        let blocks: Vec<&Block> = document.blocks().collect();

        let mut page_renderer = PageRenderer {
            configuration: &self.configuration,
            fonts: &self.fonts,
            pdf_document: PdfDocument::new(document.metadata().clone()),
            image_names: HashMap::new(),
            warnings: Vec::new(),
        };
        for page in &pages {
            page_renderer.render_page(page, &blocks)?;
        }
        warnings.append(&mut page_renderer.warnings);
        let mut rendered_document = RenderedDocument::new(page_renderer.pdf_document.write_all()?);

        let page_count = rendered_document.page_count();
        for page in &pages {
            let context = PageContext {
                page_number: page.number,
                page_count,
                page_size: page.size,
            };
            for page_hook in &self.page_hooks {
                match page_hook.overlays_for_page(&context) {
                    Ok(overlays) => {
                        for overlay in overlays {
                            let (font, font_warnings) =
                                resolve_overlay_font(&self.fonts, &overlay, Some(page.number));
                            warnings.extend(font_warnings);
                            match rendered_document.apply_overlay_to_page_with_font(
                                page.number,
                                &overlay,
                                font,
                            ) {
                                Ok(overlay_warnings) => warnings.extend(overlay_warnings),
                                Err(error) => warnings.push(RenderWarning::new(
                                    Some(page.number),
                                    format!("Failed to apply an overlay of a page hook: {}", error),
                                )),
                            }
                        }
                    }
                    Err(error) => warnings.push(RenderWarning::new(
                        Some(page.number),
                        format!("The page hook failed: {}", error),
                    )),
                }
            }
        }

        for overlay in &self.overlays {
            let (font, font_warnings) = resolve_overlay_font(&self.fonts, overlay, None);
            warnings.extend(font_warnings);
            match rendered_document.apply_overlay_with_font(overlay, font) {
                Ok(overlay_warnings) => warnings.extend(overlay_warnings),
                Err(error) => warnings.push(RenderWarning::new(
                    None,
                    format!("Failed to apply an overlay: {}", error),
                )),
            }
        }
        log::debug!(
            "Composed {} pages with {} warnings",
            page_count,
            warnings.len()
        );

        Ok(Composition {
            document: rendered_document,
            layout: pages,
            warnings,
        })
    }
}

/// Turns the placements of each page into drawing operations of the PDF document.
struct PageRenderer<'a> {
    configuration: &'a AssemblyConfiguration,
    fonts: &'a FontRegistry,
    pdf_document: PdfDocument,
    /// The resource names of the images already registered, by block index.
    image_names: HashMap<usize, String>,
    warnings: Vec<RenderWarning>,
}

impl<'a> PageRenderer<'a> {
    fn render_page(&mut self, page: &PageLayout, blocks: &[&Block]) -> Result<(), ContextError> {
        let page_index = self
            .pdf_document
            .add_page(page.size.width, page.size.height, page.rotation);
        // The top of the content area, in PDF coordinates which grow upwards
        let content_top = page.size.height - self.configuration.margins.top;
        let content_width =
            page.size.width - self.configuration.margins.left - self.configuration.margins.right;

        for placement in &page.placements {
            let block_index = placement.fragment.block_index();
            let top = content_top - placement.top;
            match (&placement.fragment, blocks.get(block_index)) {
                (Fragment::Text { lines, .. }, Some(Block::Text(text_block))) => self.render_lines(
                    page_index,
                    page.number,
                    [top, content_width],
                    text_block.alignment,
                    text_block.style.font_family.as_deref(),
                    lines,
                )?,
                (Fragment::Text { lines, .. }, Some(Block::List(list_block))) => self.render_lines(
                    page_index,
                    page.number,
                    [top, content_width],
                    Alignment::Left,
                    list_block.style.font_family.as_deref(),
                    lines,
                )?,
                (
                    Fragment::TableSlice {
                        header_heights,
                        rows,
                        ..
                    },
                    Some(Block::Table(table_block)),
                ) => self.render_table_slice(
                    page_index,
                    page.number,
                    [top, content_width],
                    table_block,
                    header_heights,
                    rows,
                )?,
                (Fragment::Image { width, height, .. }, Some(Block::Image(image_block))) => {
                    let image_name = match self.image_names.get(&block_index) {
                        Some(image_name) => image_name.clone(),
                        None => {
                            let image = ImageXObject::from_bytes(&image_block.bytes)?;
                            let image_name = self.pdf_document.add_image(image);
                            self.image_names.insert(block_index, image_name.clone());
                            image_name
                        }
                    };
                    self.pdf_document.write_image(
                        page_index,
                        &image_name,
                        [self.configuration.margins.left, top - height, *width, *height],
                    )?;
                }
                (fragment, _) => {
                    return Err(ContextError::validation(format!(
                        "The fragment {:?} does not match the block at index {}",
                        fragment, block_index
                    )))
                }
            }
        }

        Ok(())
    }

    /// Draws the lines of a text block or a list. List markers start at the left of the line and
    /// the segments after its indent.
    fn render_lines(
        &mut self,
        page_index: usize,
        page_number: usize,
        [top, content_width]: [f32; 2],
        alignment: Alignment,
        font_family: Option<&str>,
        lines: &[TextLine],
    ) -> Result<(), ContextError> {
        let mut line_top = top;
        for line in lines {
            let baseline = line_top - line.baseline_offset;
            let left = self.configuration.margins.left
                + alignment_offset(alignment, content_width, line.width);
            if let Some(marker) = &line.marker {
                self.write_segment(page_index, page_number, font_family, marker, [left, baseline])?;
            }
            let mut x = left + line.indent;
            for segment in &line.segments {
                self.write_segment(page_index, page_number, font_family, segment, [x, baseline])?;
                x += segment.width;
            }
            line_top -= line.height;
        }

        Ok(())
    }

    /// Writes a segment with the font of its style, registering that font on first use.
    fn write_segment(
        &mut self,
        page_index: usize,
        page_number: usize,
        font_family: Option<&str>,
        segment: &LineSegment,
        position: [f32; 2],
    ) -> Result<(), ContextError> {
        let fonts = self.fonts;
        let font = fonts.resolve_styled(font_family, segment.font_style);
        let font_name = self.pdf_document.register_font(font);
        self.write_text(
            page_index,
            page_number,
            font,
            &font_name,
            segment.font_size,
            segment.color,
            position,
            &segment.text,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn render_table_slice(
        &mut self,
        page_index: usize,
        page_number: usize,
        [top, content_width]: [f32; 2],
        table_block: &TableBlock,
        header_heights: &[f32],
        rows: &[RowPlacement],
    ) -> Result<(), ContextError> {
        let header_rows = table_block.header_rows()?;
        let body_rows = table_block.body_rows()?;
        let column_widths = table_block.resolved_column_widths(content_width);
        let font_size = table_block
            .style
            .font_size
            .unwrap_or(self.configuration.default_font_size);
        let (font, _) = self.fonts.resolve(table_block.style.font_family.as_deref());
        let font_name = self.pdf_document.register_font(font);

        let header = header_rows
            .iter()
            .zip(header_heights.iter().copied())
            .map(|(row, height)| (row, height, Some(Color::LIGHT_GRAY)));
        let body = rows.iter().filter_map(|row_placement| {
            body_rows
                .get(row_placement.index)
                .map(|row| (row, row_placement.height, None))
        });

        let mut row_top = top;
        for (row, row_height, default_background) in header.chain(body).collect::<Vec<_>>() {
            let mut cell_left = self.configuration.margins.left;
            let mut column = 0;
            for cell in row {
                let cell_width: f32 = column_widths.iter().skip(column).take(cell.colspan).sum();
                column += cell.colspan;
                let cell_box = [cell_left, row_top - row_height, cell_width, row_height];
                self.pdf_document.write_rectangle(
                    page_index,
                    cell_box,
                    cell.background.or(default_background),
                    Some((Color::BLACK, CELL_BORDER_WIDTH)),
                )?;

                let line_height = font_size * self.configuration.line_spacing;
                let padding = self.configuration.cell_padding;
                let baseline_offset =
                    (line_height + font_size * (font.ascent() - font.descent())) / 2.0;
                for (line_index, line) in cell.text.split('\n').enumerate() {
                    if line.is_empty() {
                        continue;
                    }
                    let line_width = font.text_width(line, font_size);
                    let x = cell_left
                        + padding
                        + alignment_offset(cell.alignment, cell_width - 2.0 * padding, line_width);
                    let baseline =
                        row_top - padding - line_index as f32 * line_height - baseline_offset;
                    self.write_text(
                        page_index,
                        page_number,
                        font,
                        &font_name,
                        font_size,
                        cell.color.unwrap_or(table_block.style.color),
                        [x, baseline],
                        line,
                    )?;
                }
                cell_left += cell_width;
            }
            row_top -= row_height;
        }

        Ok(())
    }

    /// Encodes and writes the text, reporting the characters the font cannot represent.
    #[allow(clippy::too_many_arguments)]
    fn write_text(
        &mut self,
        page_index: usize,
        page_number: usize,
        font: &LoadedFont,
        font_name: &str,
        font_size: f32,
        color: Color,
        position: [f32; 2],
        text: &str,
    ) -> Result<(), ContextError> {
        let encoded_text = font.encode(text);
        for missing_character in &encoded_text.missing_characters {
            self.warnings.push(RenderWarning::new(
                Some(page_number),
                format!(
                    "The character {:?} is not supported by the font {} and was replaced",
                    missing_character,
                    font.family()
                ),
            ));
        }
        self.pdf_document.write_text(
            page_index,
            font_name,
            font_size,
            color,
            position,
            encoded_text.into_object(),
        )
    }
}

/// The horizontal offset of content of the given width inside the available width.
/// Content wider than the available width is left aligned.
fn alignment_offset(alignment: Alignment, available_width: f32, content_width: f32) -> f32 {
    let free_width = (available_width - content_width).max(0.0);
    match alignment {
        Alignment::Left => 0.0,
        Alignment::Center => free_width / 2.0,
        Alignment::Right => free_width,
    }
}
