use crate::configuration::{AssemblyConfiguration, EmptyDocumentPolicy, TrailingPageBreakPolicy};
use crate::document::{
    Block, Color, Document, FlowItem, ImageBlock, ImageBox, ListBlock, PageSize, Rotation,
    TableBlock, TableRow, TextBlock,
};
use crate::error::{ContextError, RenderWarning};
use crate::fonts::{FontRegistry, FontStyle, LoadedFont, STANDARD_FONT_FAMILY};
use crate::pdf::ImageXObject;

/// A piece of a line sharing a single size and color.
#[derive(Debug, Clone, PartialEq)]
pub struct LineSegment {
    pub text: String,
    pub font_size: f32,
    pub color: Color,
    pub font_style: FontStyle,
    /// Width in points of the text at its font size.
    pub width: f32,
}

/// A line of a text block or of a list, measured with the font of the block.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    /// The marker of a list item, drawn at the start of the line.
    pub marker: Option<LineSegment>,
    /// Horizontal offset of the first segment.
    pub indent: f32,
    pub segments: Vec<LineSegment>,
    /// Width of the segments plus the indent.
    pub width: f32,
    pub height: f32,
    /// Distance from the top of the line to its baseline.
    pub baseline_offset: f32,
}

impl TextLine {
    fn new(
        segments: Vec<LineSegment>,
        marker: Option<LineSegment>,
        indent: f32,
        default_font_size: f32,
        font: &LoadedFont,
        line_spacing: f32,
    ) -> Self {
        let font_size = segments
            .iter()
            .chain(&marker)
            .map(|segment| segment.font_size)
            .reduce(f32::max)
            .unwrap_or(default_font_size);
        let height = font_size * line_spacing;

        TextLine {
            width: indent + segments.iter().map(|segment| segment.width).sum::<f32>(),
            height,
            baseline_offset: (height + font_size * (font.ascent() - font.descent())) / 2.0,
            marker,
            indent,
            segments,
        }
    }

    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|segment| segment.text.as_str())
            .collect()
    }
}

/// A body row of a table placed on a page, by index into `TableBlock::body_rows`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowPlacement {
    pub index: usize,
    pub height: f32,
}

/// The part of a block assigned to a page.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// Consecutive lines of the text block or list at `block_index`.
    Text { block_index: usize, lines: Vec<TextLine> },
    /// The header rows of a table followed by consecutive body rows.
    TableSlice {
        block_index: usize,
        header_heights: Vec<f32>,
        rows: Vec<RowPlacement>,
    },
    /// An image scaled to its final size in points.
    Image {
        block_index: usize,
        width: f32,
        height: f32,
    },
}

impl Fragment {
    pub fn block_index(&self) -> usize {
        match self {
            Fragment::Text { block_index, .. }
            | Fragment::TableSlice { block_index, .. }
            | Fragment::Image { block_index, .. } => *block_index,
        }
    }
}

/// A fragment and its vertical position, measured in points from the top of the content area.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub top: f32,
    pub height: f32,
    pub fragment: Fragment,
}

/// The content assigned to a single page by the flow algorithm.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    /// The 1-based number of the page.
    pub number: usize,
    pub size: PageSize,
    pub rotation: Rotation,
    pub placements: Vec<Placement>,
}

impl PageLayout {
    pub fn is_blank(&self) -> bool {
        self.placements.is_empty()
    }
}

/// The pages produced by the flow algorithm and the warnings raised while producing them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayoutOutcome {
    pub pages: Vec<PageLayout>,
    pub warnings: Vec<RenderWarning>,
}

/// Walks the flow of the document with a vertical cursor inside the content area and assigns
/// every block (or part of a block) to a page.
pub fn layout_document(
    document: &Document,
    configuration: &AssemblyConfiguration,
    fonts: &FontRegistry,
) -> Result<LayoutOutcome, ContextError> {
    let page_size = document.page_size();
    let content_width = page_size.width - configuration.margins.left - configuration.margins.right;
    let content_height = page_size.height - configuration.margins.top - configuration.margins.bottom;
    if content_width <= 0.0 || content_height <= 0.0 {
        return Err(ContextError::validation(format!(
            "The margins {:?} leave no content area on a {}x{} page",
            configuration.margins, page_size.width, page_size.height
        )));
    }

    let mut layouter = FlowLayouter {
        configuration,
        fonts,
        page_size,
        rotation: document.rotation(),
        content_width,
        content_height,
        pages: Vec::new(),
        current_page: None,
        cursor: 0.0,
        warnings: Vec::new(),
        pending_warnings: Vec::new(),
    };

    if document.is_empty() {
        match document.empty_document_policy() {
            EmptyDocumentPolicy::Reject => {
                return Err(ContextError::validation(
                    "The document is empty: no block was ever appended",
                ))
            }
            EmptyDocumentPolicy::EmitBlankPage => layouter.close_page(),
            EmptyDocumentPolicy::EmitNoPages => {}
        }
        return Ok(layouter.finish());
    }

    let mut block_index = 0;
    let mut ends_with_page_break = false;
    for item in document.flow() {
        ends_with_page_break = matches!(item, FlowItem::PageBreak);
        match item {
            // Closing a page that was never opened emits a blank page
            FlowItem::PageBreak => layouter.close_page(),
            FlowItem::Block(block) => {
                match block {
                    Block::Text(text_block) => layouter.place_text(block_index, text_block),
                    Block::List(list_block) => layouter.place_list(block_index, list_block),
                    Block::Table(table_block) => layouter.place_table(block_index, table_block)?,
                    Block::Image(image_block) => layouter.place_image(block_index, image_block)?,
                }
                block_index += 1;
            }
        }
    }

    if layouter.current_page.is_some() {
        layouter.close_page();
    } else if ends_with_page_break
        && configuration.trailing_page_break_policy == TrailingPageBreakPolicy::EmitBlankPage
    {
        layouter.close_page();
    }
    let outcome = layouter.finish();
    log::debug!(
        "Laid out {} blocks onto {} pages",
        block_index,
        outcome.pages.len()
    );

    Ok(outcome)
}

struct FlowLayouter<'a> {
    configuration: &'a AssemblyConfiguration,
    fonts: &'a FontRegistry,
    page_size: PageSize,
    rotation: Rotation,
    content_width: f32,
    content_height: f32,
    pages: Vec<PageLayout>,
    current_page: Option<PageLayout>,
    /// The height already used on the current page.
    cursor: f32,
    warnings: Vec<RenderWarning>,
    /// Warnings about a block raised before it is known on which page the block starts.
    pending_warnings: Vec<String>,
}

impl<'a> FlowLayouter<'a> {
    fn blank_page(&self) -> PageLayout {
        PageLayout {
            number: self.pages.len() + 1,
            size: self.page_size,
            rotation: self.rotation,
            placements: Vec::new(),
        }
    }

    /// Opens a page if none is open and returns the number of the current page.
    fn ensure_page(&mut self) -> usize {
        if self.current_page.is_none() {
            self.current_page = Some(self.blank_page());
            self.cursor = 0.0;
        }
        self.pages.len() + 1
    }

    fn close_page(&mut self) {
        let page = self
            .current_page
            .take()
            .unwrap_or_else(|| self.blank_page());
        self.pages.push(page);
        self.cursor = 0.0;
    }

    fn start_new_page(&mut self) {
        if self.current_page.is_some() {
            self.close_page();
        }
        self.ensure_page();
    }

    fn has_content(&self) -> bool {
        self.current_page
            .as_ref()
            .is_some_and(|page| !page.placements.is_empty())
    }

    fn remaining_height(&self) -> f32 {
        self.content_height - self.cursor
    }

    fn place(&mut self, height: f32, fragment: Fragment) {
        self.ensure_page_with_pending_warnings();
        let top = self.cursor;
        if let Some(page) = self.current_page.as_mut() {
            page.placements.push(Placement {
                top,
                height,
                fragment,
            });
        }
        self.cursor += height + self.configuration.paragraph_spacing;
    }

    /// Opens a page if none is open and raises the pending warnings on it. Only called once the
    /// page of the current block is decided.
    fn ensure_page_with_pending_warnings(&mut self) -> usize {
        let page_number = self.ensure_page();
        for message in std::mem::take(&mut self.pending_warnings) {
            self.warnings
                .push(RenderWarning::new(Some(page_number), message));
        }
        page_number
    }

    fn warn<S: Into<String>>(&mut self, message: S) {
        let page_number = self.ensure_page_with_pending_warnings();
        self.warnings
            .push(RenderWarning::new(Some(page_number), message));
    }

    /// Raises the warning on the page where the next fragment is placed.
    fn warn_on_next_placement<S: Into<String>>(&mut self, message: S) {
        self.pending_warnings.push(message.into());
    }

    fn resolve_font(&mut self, family: Option<&str>) -> &'a LoadedFont {
        let fonts = self.fonts;
        let (font, unknown_family) = fonts.resolve(family);
        if let Some(unknown_family) = unknown_family {
            self.warn_on_next_placement(format!(
                "Unknown font family {:?}, falling back to {}",
                unknown_family, STANDARD_FONT_FAMILY
            ));
        }
        font
    }

    fn place_text(&mut self, block_index: usize, text_block: &TextBlock) {
        self.resolve_font(text_block.style.font_family.as_deref());
        let lines = text_lines(text_block, self.fonts, self.configuration);
        self.place_lines(block_index, lines);
    }

    fn place_list(&mut self, block_index: usize, list_block: &ListBlock) {
        self.resolve_font(list_block.style.font_family.as_deref());
        let lines = list_lines(list_block, self.fonts, self.configuration);
        self.place_lines(block_index, lines);
    }

    /// Places the lines of a text block or a list, moving the whole block to a new page when it
    /// fits there, and splitting it between lines otherwise.
    fn place_lines(&mut self, block_index: usize, lines: Vec<TextLine>) {
        let total_height: f32 = lines.iter().map(|line| line.height).sum();

        // A block that fits on a fresh page is never split
        if total_height > self.remaining_height()
            && self.has_content()
            && total_height <= self.content_height
        {
            self.start_new_page();
        }

        let mut chunk = Vec::new();
        let mut chunk_height = 0.0;
        for line in lines {
            if self.cursor + chunk_height + line.height > self.content_height {
                if !chunk.is_empty() {
                    self.place(
                        chunk_height,
                        Fragment::Text {
                            block_index,
                            lines: std::mem::take(&mut chunk),
                        },
                    );
                    chunk_height = 0.0;
                    self.start_new_page();
                } else if self.has_content() {
                    self.start_new_page();
                }
                if line.height > self.content_height {
                    self.warn(format!(
                        "The line {:?} is taller than the content area",
                        line.text()
                    ));
                }
            }
            if line.width > self.content_width {
                self.warn(format!(
                    "The line {:?} is {:.1}pt wide and overflows the {:.1}pt content area",
                    line.text(),
                    line.width,
                    self.content_width
                ));
            }
            if let Some(marker) = line.marker.as_ref().filter(|marker| marker.width > line.indent) {
                self.warn(format!(
                    "The list marker {:?} is wider than the {:.1}pt indent",
                    marker.text, line.indent
                ));
            }
            chunk_height += line.height;
            chunk.push(line);
        }
        if !chunk.is_empty() {
            self.place(
                chunk_height,
                Fragment::Text {
                    block_index,
                    lines: chunk,
                },
            );
        }
    }

    fn place_table(&mut self, block_index: usize, table_block: &TableBlock) -> Result<(), ContextError> {
        let font = self.resolve_font(table_block.style.font_family.as_deref());
        let font_size = table_block
            .style
            .font_size
            .unwrap_or(self.configuration.default_font_size);
        let column_widths = table_block.resolved_column_widths(self.content_width);

        let mut header_heights = Vec::new();
        for row in table_block.header_rows()? {
            let (row_height, row_warnings) = self.measure_row(&row, &column_widths, font, font_size);
            header_heights.push(row_height);
            self.pending_warnings.extend(row_warnings);
        }
        let body_rows: Vec<(f32, Vec<String>)> = table_block
            .body_rows()?
            .iter()
            .map(|row| self.measure_row(row, &column_widths, font, font_size))
            .collect();
        let header_height: f32 = header_heights.iter().sum();

        if body_rows.is_empty() && header_height > self.remaining_height() && self.has_content() {
            self.start_new_page();
        }

        let mut rows = Vec::new();
        let mut slice_height = header_height;
        for (index, (row_height, row_warnings)) in body_rows.into_iter().enumerate() {
            if self.cursor + slice_height + row_height > self.content_height {
                if !rows.is_empty() {
                    self.place(
                        slice_height,
                        Fragment::TableSlice {
                            block_index,
                            header_heights: header_heights.clone(),
                            rows: std::mem::take(&mut rows),
                        },
                    );
                    self.start_new_page();
                    slice_height = header_height;
                } else if self.has_content() {
                    // The header and the first row do not fit, so the whole table moves
                    self.start_new_page();
                }
                if header_height + row_height > self.content_height {
                    self.warn(format!(
                        "Row {} of the table is taller than the content area and is placed alone",
                        index + 1
                    ));
                }
            }
            // The page of the row is known at this point
            for message in row_warnings {
                self.warn(message);
            }
            rows.push(RowPlacement {
                index,
                height: row_height,
            });
            slice_height += row_height;
        }
        self.place(
            slice_height,
            Fragment::TableSlice {
                block_index,
                header_heights,
                rows,
            },
        );

        Ok(())
    }

    /// The height of a row (its tallest cell plus the padding above and below) and the
    /// warnings about cells whose text overflows.
    fn measure_row(
        &self,
        row: &TableRow,
        column_widths: &[f32],
        font: &LoadedFont,
        font_size: f32,
    ) -> (f32, Vec<String>) {
        let padding = self.configuration.cell_padding;
        let mut column = 0;
        let mut line_count = 1;
        let mut warnings = Vec::new();
        for cell in row {
            let cell_width: f32 = column_widths
                .iter()
                .skip(column)
                .take(cell.colspan)
                .sum();
            column += cell.colspan;
            line_count = line_count.max(cell.text.split('\n').count());
            for line in cell.text.split('\n') {
                let line_width = font.text_width(line, font_size);
                if line_width > cell_width - 2.0 * padding {
                    warnings.push(format!(
                        "The cell text {:?} overflows its {:.1}pt wide cell",
                        line, cell_width
                    ));
                }
            }
        }

        (
            line_count as f32 * font_size * self.configuration.line_spacing + 2.0 * padding,
            warnings,
        )
    }

    fn place_image(&mut self, block_index: usize, image_block: &ImageBlock) -> Result<(), ContextError> {
        let image = ImageXObject::from_bytes(&image_block.bytes)?;
        let (width, height) = fit_image(
            image.width,
            image.height,
            image_block.target,
            self.content_width,
            self.content_height,
        );
        if height > self.remaining_height() && self.has_content() {
            self.start_new_page();
        }
        self.place(
            height,
            Fragment::Image {
                block_index,
                width,
                height,
            },
        );

        Ok(())
    }

    fn finish(self) -> LayoutOutcome {
        LayoutOutcome {
            pages: self.pages,
            warnings: self.warnings,
        }
    }
}

/// Splits the runs of a text block into lines at every `'\n'`. Each segment is measured with
/// the font of its style.
fn text_lines(
    text_block: &TextBlock,
    fonts: &FontRegistry,
    configuration: &AssemblyConfiguration,
) -> Vec<TextLine> {
    let family = text_block.style.font_family.as_deref();
    let (font, _) = fonts.resolve(family);
    let default_font_size = text_block
        .style
        .font_size
        .unwrap_or(configuration.default_font_size);
    let mut lines = vec![Vec::<LineSegment>::new()];

    for run in &text_block.runs {
        let font_size = run.font_size.unwrap_or(default_font_size);
        let color = run.color.unwrap_or(text_block.style.color);
        let font_style = run.font_style();
        let styled_font = fonts.resolve_styled(family, font_style);
        for (piece_index, piece) in run.text.split('\n').enumerate() {
            if piece_index > 0 {
                lines.push(Vec::new());
            }
            if piece.is_empty() {
                continue;
            }
            if let Some(line) = lines.last_mut() {
                line.push(LineSegment {
                    text: piece.to_string(),
                    font_size,
                    color,
                    font_style,
                    width: styled_font.text_width(piece, font_size),
                });
            }
        }
    }

    lines
        .into_iter()
        .map(|segments| {
            TextLine::new(
                segments,
                None,
                0.0,
                default_font_size,
                font,
                configuration.line_spacing,
            )
        })
        .collect()
}

/// One line per list item, plus one per `'\n'` inside an item. Only the first line of an item
/// carries its marker.
fn list_lines(
    list_block: &ListBlock,
    fonts: &FontRegistry,
    configuration: &AssemblyConfiguration,
) -> Vec<TextLine> {
    let (font, _) = fonts.resolve(list_block.style.font_family.as_deref());
    let font_size = list_block
        .style
        .font_size
        .unwrap_or(configuration.default_font_size);
    let indent = list_block.indent.unwrap_or(configuration.list_indent);
    let segment = |text: &str| LineSegment {
        text: text.to_string(),
        font_size,
        color: list_block.style.color,
        font_style: FontStyle::Regular,
        width: font.text_width(text, font_size),
    };

    let mut lines = Vec::new();
    for (item_index, item) in list_block.items.iter().enumerate() {
        for (piece_index, piece) in item.split('\n').enumerate() {
            let marker = (piece_index == 0).then(|| segment(&list_block.marker.for_item(item_index)));
            let segments = if piece.is_empty() {
                Vec::new()
            } else {
                vec![segment(piece)]
            };
            lines.push(TextLine::new(
                segments,
                marker,
                indent,
                font_size,
                font,
                configuration.line_spacing,
            ));
        }
    }

    lines
}

/// Scales an image of the given pixel dimensions to fit inside the target box, preserving its
/// aspect ratio, then shrinks it further if it exceeds the content area.
pub fn fit_image(
    pixel_width: u32,
    pixel_height: u32,
    target: ImageBox,
    content_width: f32,
    content_height: f32,
) -> (f32, f32) {
    let aspect_ratio = pixel_width.max(1) as f32 / pixel_height.max(1) as f32;
    let mut width = target.width.min(target.height * aspect_ratio);
    let mut height = width / aspect_ratio;
    if width > content_width {
        width = content_width;
        height = width / aspect_ratio;
    }
    if height > content_height {
        height = content_height;
        width = height * aspect_ratio;
    }

    (width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DocumentBuilder;
    use crate::configuration::Margins;
    use crate::document::{ListMarker, TableCell, TextRun};
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn small_page_configuration() -> AssemblyConfiguration {
        AssemblyConfiguration {
            page_width: 200.0,
            page_height: 100.0,
            margins: Margins::uniform(10.0),
            default_font_size: 10.0,
            line_spacing: 1.0,
            paragraph_spacing: 0.0,
            cell_padding: 0.0,
            ..Default::default()
        }
    }

    fn layout(builder: DocumentBuilder, configuration: &AssemblyConfiguration) -> LayoutOutcome {
        let document = builder.finalize().unwrap();
        layout_document(&document, configuration, &FontRegistry::default()).unwrap()
    }

    #[test]
    fn runs_are_split_into_lines_at_newlines() {
        let text_block = TextBlock::new("first ")
            .with_run(TextRun::new("line\nsecond").with_font_size(20.0))
            .with_run(TextRun::new(" line"));
        let lines = text_lines(&text_block, &FontRegistry::default(), &small_page_configuration());

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text(), "first line");
        assert_eq!(lines[1].text(), "second line");
        // The tallest segment decides the height of the line
        assert_eq!(lines[0].height, 20.0);
    }

    #[test]
    fn styled_runs_are_measured_with_their_own_font() {
        let text_block = TextBlock::new("Total ")
            .with_run(TextRun::new("Total ").bold())
            .with_run(TextRun::new("Total").bold().italic());
        let lines = text_lines(&text_block, &FontRegistry::default(), &small_page_configuration());
        let segments = &lines[0].segments;

        let styles: Vec<FontStyle> = segments.iter().map(|segment| segment.font_style).collect();
        assert_eq!(
            styles,
            vec![FontStyle::Regular, FontStyle::Bold, FontStyle::BoldItalic]
        );
        assert_eq!(
            segments[1].width,
            LoadedFont::standard(FontStyle::Bold).text_width("Total ", 10.0)
        );
        assert!(segments[1].width > segments[0].width);
    }

    #[test]
    fn list_items_start_at_the_indent_after_their_marker() {
        let configuration = small_page_configuration();
        let list_block = ListBlock::numbered()
            .add_item("first")
            .add_item("second\ncontinued")
            .with_indent(15.0);
        let lines = list_lines(&list_block, &FontRegistry::default(), &configuration);

        let markers: Vec<Option<&str>> = lines
            .iter()
            .map(|line| line.marker.as_ref().map(|marker| marker.text.as_str()))
            .collect();
        assert_eq!(markers, vec![Some("1."), Some("2."), None]);
        assert!(lines.iter().all(|line| line.indent == 15.0));
        assert_eq!(lines[2].text(), "continued");
        assert_eq!(
            lines[0].width,
            15.0 + LoadedFont::helvetica().text_width("first", 10.0)
        );

        let default_indent = list_lines(
            &ListBlock::new(ListMarker::Symbol("*".into())).add_item("item"),
            &FontRegistry::default(),
            &configuration,
        );
        assert_eq!(default_indent[0].indent, configuration.list_indent);
    }

    #[test]
    fn lists_flow_like_text_blocks() {
        let configuration = small_page_configuration();
        let mut list_block = ListBlock::default();
        for index in 0..10 {
            list_block = list_block.add_item(format!("item {}", index));
        }
        let mut builder = DocumentBuilder::from_configuration(&configuration);
        builder
            .append(TextBlock::new("intro"))
            .unwrap()
            .append(list_block)
            .unwrap();
        let outcome = layout(builder, &configuration);

        // Ten lines do not fit on a fresh page, so the list is split after the 7 lines that fit
        let line_counts: Vec<(usize, usize)> = outcome
            .pages
            .iter()
            .flat_map(|page| &page.placements)
            .map(|placement| match &placement.fragment {
                Fragment::Text { block_index, lines } => (*block_index, lines.len()),
                _ => (usize::MAX, 0),
            })
            .collect();
        assert_eq!(line_counts, vec![(0, 1), (1, 7), (1, 3)]);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn text_taller_than_a_page_is_split_between_lines() {
        let configuration = small_page_configuration();
        let mut builder = DocumentBuilder::from_configuration(&configuration);
        let text = vec!["line"; 20].join("\n");
        builder.append(TextBlock::new(text)).unwrap();
        let outcome = layout(builder, &configuration);

        // 80pt of content area holds 8 lines of 10pt
        assert_eq!(outcome.pages.len(), 3);
        let line_counts: Vec<usize> = outcome
            .pages
            .iter()
            .flat_map(|page| &page.placements)
            .map(|placement| match &placement.fragment {
                Fragment::Text { lines, .. } => lines.len(),
                _ => 0,
            })
            .collect();
        assert_eq!(line_counts, vec![8, 8, 4]);
    }

    #[test]
    fn block_not_fitting_the_remaining_space_starts_a_new_page() {
        let configuration = small_page_configuration();
        let mut builder = DocumentBuilder::from_configuration(&configuration);
        builder
            .append(TextBlock::new(vec!["a"; 6].join("\n")))
            .unwrap()
            .append(TextBlock::new(vec!["b"; 4].join("\n")))
            .unwrap();
        let outcome = layout(builder, &configuration);

        assert_eq!(outcome.pages.len(), 2);
        assert_eq!(outcome.pages[1].placements[0].top, 0.0);
        assert_eq!(outcome.pages[1].placements[0].fragment.block_index(), 1);
    }

    fn seven_lines_of_text() -> TextBlock {
        TextBlock::new(vec!["text"; 7].join("\n"))
    }

    #[test]
    fn table_not_fitting_below_text_moves_to_the_next_page() {
        let configuration = small_page_configuration();
        let table = TableBlock::new(2)
            .add_header_cell(TableCell::new("Name"))
            .add_header_cell(TableCell::new("Value"))
            .add_cell(TableCell::new("total"))
            .add_cell(TableCell::new("42"));
        let mut builder = DocumentBuilder::from_configuration(&configuration);
        builder
            .append(seven_lines_of_text())
            .unwrap()
            .append(table)
            .unwrap();
        let outcome = layout(builder, &configuration);

        // The header and the row need 20pt and only 10pt remain below the text
        assert_eq!(outcome.pages.len(), 2);
        let block_indices: Vec<Vec<usize>> = outcome
            .pages
            .iter()
            .map(|page| {
                page.placements
                    .iter()
                    .map(|placement| placement.fragment.block_index())
                    .collect()
            })
            .collect();
        assert_eq!(block_indices, vec![vec![0], vec![1]]);
        assert_eq!(outcome.pages[1].placements[0].top, 0.0);
    }

    #[test]
    fn image_not_fitting_below_text_moves_to_the_next_page() {
        let configuration = small_page_configuration();
        let mut bytes = Vec::new();
        RgbImage::from_pixel(20, 20, Rgb([40, 40, 40]))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        let mut builder = DocumentBuilder::from_configuration(&configuration);
        builder
            .append(seven_lines_of_text())
            .unwrap()
            .append(ImageBlock::new(bytes, 20.0, 20.0))
            .unwrap();
        let outcome = layout(builder, &configuration);

        assert_eq!(outcome.pages.len(), 2);
        assert_eq!(outcome.pages[0].placements.len(), 1);
        let placement = &outcome.pages[1].placements[0];
        assert_eq!(placement.top, 0.0);
        assert!(matches!(
            placement.fragment,
            Fragment::Image {
                block_index: 1,
                width,
                height,
            } if width == 20.0 && height == 20.0
        ));
    }

    #[test]
    fn warnings_name_the_page_the_block_moved_to() {
        let configuration = small_page_configuration();
        let table = TableBlock::new(1)
            .add_header_cell(TableCell::new("W".repeat(30)))
            .add_cell(TableCell::new("W".repeat(30)));
        let mut builder = DocumentBuilder::from_configuration(&configuration);
        builder
            .append(seven_lines_of_text())
            .unwrap()
            .append(TextBlock::new("moved\ntext").with_font_family("Missing Sans"))
            .unwrap()
            .append(TextBlock::new(vec!["text"; 5].join("\n")))
            .unwrap()
            .append(table)
            .unwrap();
        let outcome = layout(builder, &configuration);

        assert_eq!(outcome.pages.len(), 3);
        let warnings: Vec<(Option<usize>, bool)> = outcome
            .warnings
            .iter()
            .map(|warning| (warning.page_number, warning.message.contains("Missing Sans")))
            .collect();
        // The unknown family of the second block, then the header and the body cell of the table
        assert_eq!(
            warnings,
            vec![(Some(2), true), (Some(3), false), (Some(3), false)]
        );
    }

    #[test]
    fn page_breaks_follow_the_policies() {
        let mut configuration = small_page_configuration();
        let mut builder = DocumentBuilder::from_configuration(&configuration);
        builder
            .request_page_break()
            .append(TextBlock::new("a"))
            .unwrap()
            .request_page_break()
            .request_page_break()
            .append(TextBlock::new("b"))
            .unwrap()
            .request_page_break();
        let document = builder.finalize().unwrap();
        let fonts = FontRegistry::default();

        // Leading blank page, "a", blank page, "b", and the trailing break is dropped
        let pages = layout_document(&document, &configuration, &fonts).unwrap().pages;
        let blank_pages: Vec<bool> = pages.iter().map(PageLayout::is_blank).collect();
        assert_eq!(blank_pages, vec![true, false, true, false]);

        configuration.trailing_page_break_policy = TrailingPageBreakPolicy::EmitBlankPage;
        let pages = layout_document(&document, &configuration, &fonts).unwrap().pages;
        assert_eq!(pages.len(), 5);
        assert!(pages[4].is_blank());
        assert_eq!(pages[4].number, 5);
    }

    #[test]
    fn empty_documents_follow_the_policy() {
        let configuration = small_page_configuration();
        let fonts = FontRegistry::default();
        let blank = DocumentBuilder::from_configuration(&configuration)
            .with_empty_document_policy(EmptyDocumentPolicy::EmitBlankPage)
            .finalize()
            .unwrap();
        assert_eq!(layout_document(&blank, &configuration, &fonts).unwrap().pages.len(), 1);

        let no_pages = DocumentBuilder::from_configuration(&configuration)
            .with_empty_document_policy(EmptyDocumentPolicy::EmitNoPages)
            .finalize()
            .unwrap();
        assert!(layout_document(&no_pages, &configuration, &fonts).unwrap().pages.is_empty());
    }

    #[test]
    fn table_rows_are_never_split_and_headers_repeat() {
        let configuration = small_page_configuration();
        let mut table = TableBlock::new(2)
            .add_header_cell(TableCell::new("Name"))
            .add_header_cell(TableCell::new("Value"));
        for index in 0..10 {
            table = table
                .add_cell(TableCell::new(format!("row {}", index)))
                .add_cell(TableCell::new("x\ny"));
        }
        let mut builder = DocumentBuilder::from_configuration(&configuration);
        builder.append(table).unwrap();
        let outcome = layout(builder, &configuration);

        // Every row is 20pt high and the header 10pt: 3 rows per 80pt page
        let slices: Vec<Vec<usize>> = outcome
            .pages
            .iter()
            .flat_map(|page| &page.placements)
            .map(|placement| match &placement.fragment {
                Fragment::TableSlice {
                    header_heights,
                    rows,
                    ..
                } => {
                    assert_eq!(header_heights, &vec![10.0]);
                    rows.iter().map(|row| row.index).collect()
                }
                _ => Vec::new(),
            })
            .collect();
        assert_eq!(
            slices,
            vec![vec![0, 1, 2], vec![3, 4, 5], vec![6, 7, 8], vec![9]]
        );
    }

    #[test]
    fn oversized_row_is_placed_alone_with_a_warning() {
        let configuration = small_page_configuration();
        let table = TableBlock::new(1)
            .add_cell(TableCell::new("short"))
            .add_cell(TableCell::new(vec!["tall"; 12].join("\n")))
            .add_cell(TableCell::new("after"));
        let mut builder = DocumentBuilder::from_configuration(&configuration);
        builder.append(table).unwrap();
        let outcome = layout(builder, &configuration);

        assert_eq!(outcome.pages.len(), 3);
        assert!(outcome
            .warnings
            .iter()
            .any(|warning| warning.page_number == Some(2) && warning.message.contains("Row 2")));
    }

    #[test]
    fn overflowing_lines_and_unknown_fonts_raise_warnings() {
        let configuration = small_page_configuration();
        let mut builder = DocumentBuilder::from_configuration(&configuration);
        builder
            .append(TextBlock::new("W".repeat(40)).with_font_family("Missing Sans"))
            .unwrap();
        let outcome = layout(builder, &configuration);

        assert_eq!(outcome.warnings.len(), 2);
        assert!(outcome.warnings[0].message.contains("Missing Sans"));
        assert!(outcome.warnings[1].message.contains("overflows"));
    }

    #[test]
    fn images_are_scaled_to_fit_their_box_and_the_content_area() {
        let target = ImageBox {
            width: 100.0,
            height: 100.0,
        };
        assert_eq!(fit_image(200, 100, target, 500.0, 500.0), (100.0, 50.0));
        assert_eq!(fit_image(100, 200, target, 500.0, 500.0), (50.0, 100.0));
        assert_eq!(fit_image(200, 100, target, 40.0, 500.0), (40.0, 20.0));
        assert_eq!(fit_image(100, 200, target, 500.0, 30.0), (15.0, 30.0));
    }
}
