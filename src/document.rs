use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::configuration::EmptyDocumentPolicy;
use crate::error::ContextError;
use crate::fonts::FontStyle;

/// An RGB color whose components range from 0 to 1.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(transparent)]
pub struct Color(pub [f32; 3]);

impl Color {
    pub const BLACK: Color = Color([0.0, 0.0, 0.0]);
    pub const WHITE: Color = Color([1.0, 1.0, 1.0]);
    pub const GRAY: Color = Color([0.5, 0.5, 0.5]);
    pub const LIGHT_GRAY: Color = Color([0.75, 0.75, 0.75]);
    pub const DARK_GRAY: Color = Color([0.25, 0.25, 0.25]);
    pub const RED: Color = Color([1.0, 0.0, 0.0]);
    pub const GREEN: Color = Color([0.0, 1.0, 0.0]);
    pub const BLUE: Color = Color([0.0, 0.0, 1.0]);

    pub fn components(&self) -> [f32; 3] {
        let [r, g, b] = self.0;
        [r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0)]
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

/// The size of a page in points.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub const A4: PageSize = PageSize {
        width: 595.0,
        height: 842.0,
    };
    pub const LETTER: PageSize = PageSize {
        width: 612.0,
        height: 792.0,
    };

    pub fn new(width: f32, height: f32) -> Self {
        PageSize { width, height }
    }

    /// Builds a page size from dimensions given in millimeters, which are easier to reason about.
    pub fn from_millimeters(width: f32, height: f32) -> Self {
        PageSize {
            width: millimeters_to_points(width),
            height: millimeters_to_points(height),
        }
    }
}

/// Converts millimeters to points, the unit required by the PDF format.
pub fn millimeters_to_points(millimeters: f32) -> f32 {
    millimeters * 2.834646
}

/// The clockwise rotation applied to a page when it is displayed.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(try_from = "i64", into = "i64")]
pub enum Rotation {
    #[default]
    Upright,
    Quarter,
    Half,
    ThreeQuarters,
}

impl Rotation {
    pub fn degrees(&self) -> i64 {
        match self {
            Rotation::Upright => 0,
            Rotation::Quarter => 90,
            Rotation::Half => 180,
            Rotation::ThreeQuarters => 270,
        }
    }
}

impl TryFrom<i64> for Rotation {
    type Error = ContextError;

    fn try_from(degrees: i64) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::Upright),
            90 => Ok(Rotation::Quarter),
            180 => Ok(Rotation::Half),
            270 => Ok(Rotation::ThreeQuarters),
            _ => Err(ContextError::validation(format!(
                "Invalid page rotation {} (expected 0, 90, 180 or 270)",
                degrees
            ))),
        }
    }
}

impl From<Rotation> for i64 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

/// Horizontal alignment of text inside a block or a table cell.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

/// The style shared by all the runs of a text block, or all the cells of a table.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TextStyle {
    /// A font family registered in the configuration, the standard Helvetica font if `None`.
    pub font_family: Option<String>,
    /// The font size in points, the configured default if `None`.
    pub font_size: Option<f32>,
    pub color: Color,
}

/// A piece of text sharing one size and color. A `'\n'` inside the text starts a new line.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextRun {
    pub text: String,
    #[serde(default)]
    pub font_size: Option<f32>,
    #[serde(default)]
    pub color: Option<Color>,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
}

impl TextRun {
    pub fn new<S: Into<String>>(text: S) -> Self {
        TextRun {
            text: text.into(),
            font_size: None,
            color: None,
            bold: false,
            italic: false,
        }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    pub fn font_style(&self) -> FontStyle {
        FontStyle::from_flags(self.bold, self.italic)
    }

    pub fn with_font_size(mut self, font_size: f32) -> Self {
        self.font_size = Some(font_size);
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }
}

/// A paragraph: runs laid out one after the other, with explicit line breaks only.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextBlock {
    pub runs: Vec<TextRun>,
    pub alignment: Alignment,
    pub style: TextStyle,
}

impl TextBlock {
    pub fn new<S: Into<String>>(text: S) -> Self {
        TextBlock {
            runs: vec![TextRun::new(text)],
            ..Default::default()
        }
    }

    pub fn with_run(mut self, run: TextRun) -> Self {
        self.runs.push(run);
        self
    }

    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_font_size(mut self, font_size: f32) -> Self {
        self.style.font_size = Some(font_size);
        self
    }

    pub fn with_font_family<S: Into<String>>(mut self, font_family: S) -> Self {
        self.style.font_family = Some(font_family.into());
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.style.color = color;
        self
    }

    /// The text of all the runs, without styling.
    pub fn plain_text(&self) -> String {
        self.runs.iter().map(|run| run.text.as_str()).collect()
    }
}

/// A table cell, which may span several columns.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TableCell {
    pub text: String,
    #[serde(default = "default_colspan")]
    pub colspan: usize,
    #[serde(default)]
    pub alignment: Alignment,
    #[serde(default)]
    pub background: Option<Color>,
    #[serde(default)]
    pub color: Option<Color>,
}

fn default_colspan() -> usize {
    1
}

impl TableCell {
    pub fn new<S: Into<String>>(text: S) -> Self {
        TableCell {
            text: text.into(),
            colspan: 1,
            alignment: Alignment::Left,
            background: None,
            color: None,
        }
    }

    pub fn with_colspan(mut self, colspan: usize) -> Self {
        self.colspan = colspan;
        self
    }

    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_background(mut self, background: Color) -> Self {
        self.background = Some(background);
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }
}

/// A row of cells whose spans add up exactly to the number of columns of the table.
pub type TableRow = Vec<TableCell>;

/// A grid of cells added row by row. Header cells are repeated at the top of every page
/// the table continues onto.
#[derive(Debug, Clone, PartialEq)]
pub struct TableBlock {
    pub columns: usize,
    pub header: Vec<TableCell>,
    pub cells: Vec<TableCell>,
    /// Relative column widths, equal widths if `None`.
    pub column_widths: Option<Vec<f32>>,
    pub style: TextStyle,
}

impl TableBlock {
    pub fn new(columns: usize) -> Self {
        TableBlock {
            columns,
            header: Vec::new(),
            cells: Vec::new(),
            column_widths: None,
            style: TextStyle::default(),
        }
    }

    pub fn add_header_cell(mut self, cell: TableCell) -> Self {
        self.header.push(cell);
        self
    }

    pub fn add_cell(mut self, cell: TableCell) -> Self {
        self.cells.push(cell);
        self
    }

    pub fn with_column_widths(mut self, column_widths: Vec<f32>) -> Self {
        self.column_widths = Some(column_widths);
        self
    }

    pub fn with_font_size(mut self, font_size: f32) -> Self {
        self.style.font_size = Some(font_size);
        self
    }

    pub fn header_rows(&self) -> Result<Vec<TableRow>, ContextError> {
        group_cells_into_rows(&self.header, self.columns)
    }

    pub fn body_rows(&self) -> Result<Vec<TableRow>, ContextError> {
        group_cells_into_rows(&self.cells, self.columns)
    }

    /// The absolute width of each column once the table is stretched over `total_width` points.
    pub fn resolved_column_widths(&self, total_width: f32) -> Vec<f32> {
        match &self.column_widths {
            Some(weights) => {
                let total_weight: f32 = weights.iter().sum();
                weights
                    .iter()
                    .map(|weight| total_width * weight / total_weight)
                    .collect()
            }
            None => vec![total_width / self.columns as f32; self.columns],
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ContextError> {
        validate_font_size(self.style.font_size, "table")?;
        if self.columns == 0 {
            return Err(ContextError::validation("A table needs at least one column"));
        }
        if let Some(column_widths) = &self.column_widths {
            if column_widths.len() != self.columns
                || column_widths.iter().any(|width| *width <= 0.0)
            {
                return Err(ContextError::validation(format!(
                    "Expected {} positive column widths, found {:?}",
                    self.columns, column_widths
                )));
            }
        }
        self.header_rows()?;
        self.body_rows()?;

        Ok(())
    }
}

/// Font sizes must be positive numbers, which also rules out `NaN`.
fn validate_font_size(font_size: Option<f32>, context: &str) -> Result<(), ContextError> {
    match font_size {
        Some(font_size) if !(font_size > 0.0) => Err(ContextError::validation(format!(
            "Invalid font size {} for the {}",
            font_size, context
        ))),
        _ => Ok(()),
    }
}

/// Groups row-major cells into rows, padding the last row with empty cells.
fn group_cells_into_rows(cells: &[TableCell], columns: usize) -> Result<Vec<TableRow>, ContextError> {
    let mut rows = Vec::new();
    let mut current_row = TableRow::new();
    let mut used_columns = 0;

    for cell in cells {
        if cell.colspan == 0 || cell.colspan > columns - used_columns {
            return Err(ContextError::validation(format!(
                "The cell {:?} spans {} columns but only {} are left in its row",
                cell.text,
                cell.colspan,
                columns - used_columns
            )));
        }
        used_columns += cell.colspan;
        current_row.push(cell.clone());
        if used_columns == columns {
            rows.push(std::mem::take(&mut current_row));
            used_columns = 0;
        }
    }
    if !current_row.is_empty() {
        current_row.extend((used_columns..columns).map(|_| TableCell::new("")));
        rows.push(current_row);
    }

    Ok(rows)
}

/// The box an image is scaled to fit in, preserving its aspect ratio.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct ImageBox {
    pub width: f32,
    pub height: f32,
}

/// Raw PNG bytes and the box the image must fit in.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBlock {
    pub bytes: Vec<u8>,
    pub target: ImageBox,
}

impl ImageBlock {
    pub fn new(bytes: Vec<u8>, width: f32, height: f32) -> Self {
        ImageBlock {
            bytes,
            target: ImageBox { width, height },
        }
    }
}

/// What precedes each item of a list.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ListMarker {
    /// The same symbol before every item, such as `-` or `*`.
    Symbol(String),
    /// The 1-based position of the item followed by a period.
    Numbered,
}

impl Default for ListMarker {
    fn default() -> Self {
        ListMarker::Symbol("-".into())
    }
}

impl ListMarker {
    /// The marker of the item at the given 0-based index.
    pub fn for_item(&self, item_index: usize) -> String {
        match self {
            ListMarker::Symbol(symbol) => symbol.clone(),
            ListMarker::Numbered => format!("{}.", item_index + 1),
        }
    }
}

/// Items laid out one per line, each after its marker. The item text starts at the indent,
/// and a `'\n'` inside an item continues it on an indented line without a marker.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListBlock {
    pub items: Vec<String>,
    pub marker: ListMarker,
    /// Distance from the left margin to the item text, the configured list indent if `None`.
    pub indent: Option<f32>,
    pub style: TextStyle,
}

impl ListBlock {
    pub fn new(marker: ListMarker) -> Self {
        ListBlock {
            marker,
            ..Default::default()
        }
    }

    pub fn numbered() -> Self {
        ListBlock::new(ListMarker::Numbered)
    }

    pub fn add_item<S: Into<String>>(mut self, item: S) -> Self {
        self.items.push(item.into());
        self
    }

    pub fn with_indent(mut self, indent: f32) -> Self {
        self.indent = Some(indent);
        self
    }

    pub fn with_font_size(mut self, font_size: f32) -> Self {
        self.style.font_size = Some(font_size);
        self
    }

    pub fn with_font_family<S: Into<String>>(mut self, font_family: S) -> Self {
        self.style.font_family = Some(font_family.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ContextError> {
        validate_font_size(self.style.font_size, "list")?;
        if self.items.is_empty() {
            return Err(ContextError::validation("A list needs at least one item"));
        }
        if let Some(indent) = self.indent {
            if !(indent >= 0.0) {
                return Err(ContextError::validation(format!("Invalid list indent {}", indent)));
            }
        }
        Ok(())
    }
}

/// A unit of page content prior to layout.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Text(TextBlock),
    List(ListBlock),
    Table(TableBlock),
    Image(ImageBlock),
}

impl Block {
    pub(crate) fn validate(&self) -> Result<(), ContextError> {
        match self {
            Block::Text(text_block) => {
                let sizes = text_block
                    .runs
                    .iter()
                    .filter_map(|run| run.font_size)
                    .chain(text_block.style.font_size);
                for font_size in sizes {
                    validate_font_size(
                        Some(font_size),
                        &format!("text {:?}", text_block.plain_text()),
                    )?;
                }
                Ok(())
            }
            Block::List(list_block) => list_block.validate(),
            Block::Table(table_block) => table_block.validate(),
            Block::Image(image_block) => {
                if image_block.bytes.is_empty() {
                    return Err(ContextError::validation("An image block has no image data"));
                }
                if !(image_block.target.width > 0.0 && image_block.target.height > 0.0) {
                    return Err(ContextError::validation(format!(
                        "Invalid image box {:?}",
                        image_block.target
                    )));
                }
                Ok(())
            }
        }
    }
}

impl From<TextBlock> for Block {
    fn from(value: TextBlock) -> Self {
        Block::Text(value)
    }
}

impl From<ListBlock> for Block {
    fn from(value: ListBlock) -> Self {
        Block::List(value)
    }
}

impl From<TableBlock> for Block {
    fn from(value: TableBlock) -> Self {
        Block::Table(value)
    }
}

impl From<ImageBlock> for Block {
    fn from(value: ImageBlock) -> Self {
        Block::Image(value)
    }
}

/// An element of the logical flow of a document.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowItem {
    Block(Block),
    /// A forced boundary: the next block starts on a new page.
    PageBreak,
}

/// Document-level information written to the info dictionary and the catalog.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    /// A BCP 47 language tag such as `en-US`, written as the catalog `Lang`.
    pub language: Option<String>,
    /// Marks the document as tagged content for accessibility tools.
    pub tagged: bool,
    /// The permanent identifier written in the trailer `ID`, randomly generated if `None`.
    pub identifier: Option<String>,
    /// Defaults to the UNIX epoch so that the output is reproducible.
    #[serde(skip, default = "unix_epoch")]
    pub creation_date: OffsetDateTime,
}

fn unix_epoch() -> OffsetDateTime {
    OffsetDateTime::UNIX_EPOCH
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        DocumentMetadata {
            title: None,
            author: None,
            subject: None,
            language: None,
            tagged: false,
            identifier: None,
            creation_date: unix_epoch(),
        }
    }
}

/// A finalized document: the ordered flow of blocks and forced page breaks, ready to be composed.
/// It can only be produced by the `DocumentBuilder` and is immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub(crate) metadata: DocumentMetadata,
    pub(crate) page_size: PageSize,
    pub(crate) rotation: Rotation,
    pub(crate) empty_document_policy: EmptyDocumentPolicy,
    pub(crate) flow: Vec<FlowItem>,
}

impl Document {
    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn empty_document_policy(&self) -> EmptyDocumentPolicy {
        self.empty_document_policy
    }

    pub fn flow(&self) -> &[FlowItem] {
        &self.flow
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.flow.iter().filter_map(|item| match item {
            FlowItem::Block(block) => Some(block),
            FlowItem::PageBreak => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.blocks().next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_are_grouped_by_column_span() {
        let table = TableBlock::new(4)
            .add_cell(TableCell::new("Sales report").with_colspan(4))
            .add_cell(TableCell::new("A"))
            .add_cell(TableCell::new("Q1"))
            .add_cell(TableCell::new("12"));
        let rows = table.body_rows().unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 1);
        // The last row is padded with an empty cell
        assert_eq!(rows[1].len(), 4);
        assert_eq!(rows[1][3].text, "");
    }

    #[test]
    fn overflowing_span_is_rejected() {
        let table = TableBlock::new(3)
            .add_cell(TableCell::new("a"))
            .add_cell(TableCell::new("b").with_colspan(3));

        assert!(table.validate().unwrap_err().is_validation());
        assert!(TableBlock::new(0).validate().unwrap_err().is_validation());
        assert!(TableBlock::new(2)
            .add_cell(TableCell::new("a").with_colspan(0))
            .validate()
            .is_err());
    }

    #[test]
    fn column_widths_are_proportional() {
        let table = TableBlock::new(3).with_column_widths(vec![1.0, 2.0, 1.0]);
        assert_eq!(table.resolved_column_widths(400.0), vec![100.0, 200.0, 100.0]);
        assert_eq!(
            TableBlock::new(4).resolved_column_widths(400.0),
            vec![100.0; 4]
        );
    }

    #[test]
    fn rotation_accepts_only_right_angles() {
        assert_eq!(Rotation::try_from(90).unwrap(), Rotation::Quarter);
        assert_eq!(Rotation::try_from(270).unwrap().degrees(), 270);
        assert!(Rotation::try_from(45).unwrap_err().is_validation());

        let rotation: Rotation = serde_json::from_str("180").unwrap();
        assert_eq!(rotation, Rotation::Half);
        assert!(serde_json::from_str::<Rotation>("30").is_err());
    }

    #[test]
    fn invalid_blocks_fail_validation() {
        assert!(Block::Image(ImageBlock::new(Vec::new(), 10.0, 10.0))
            .validate()
            .is_err());
        assert!(Block::Image(ImageBlock::new(vec![1], 0.0, 10.0))
            .validate()
            .is_err());
        assert!(Block::Text(TextBlock::new("x").with_font_size(-1.0))
            .validate()
            .is_err());
        assert!(Block::Text(TextBlock::new("x")).validate().is_ok());
    }

    #[test]
    fn font_sizes_that_are_not_numbers_fail_validation() {
        let error = Block::Text(TextBlock::new("x").with_run(TextRun::new("y").with_font_size(f32::NAN)))
            .validate()
            .unwrap_err();
        assert!(error.is_validation());
        assert!(Block::Table(TableBlock::new(1).with_font_size(f32::NAN))
            .validate()
            .is_err());
        assert!(Block::List(ListBlock::default().add_item("a").with_font_size(f32::NAN))
            .validate()
            .is_err());
        assert!(Block::Image(ImageBlock::new(vec![1], f32::NAN, 10.0))
            .validate()
            .is_err());
    }

    #[test]
    fn lists_need_items_and_mark_them() {
        assert!(Block::List(ListBlock::default()).validate().is_err());
        assert!(Block::List(ListBlock::default().add_item("a").with_indent(-4.0))
            .validate()
            .is_err());

        let numbered = ListBlock::numbered().add_item("first").add_item("second");
        assert!(Block::List(numbered.clone()).validate().is_ok());
        assert_eq!(numbered.marker.for_item(1), "2.");
        assert_eq!(ListMarker::default().for_item(7), "-");

        let marker: ListMarker = serde_json::from_str(r#"{ "symbol": "*" }"#).unwrap();
        assert_eq!(marker, ListMarker::Symbol("*".into()));
        assert_eq!(serde_json::from_str::<ListMarker>(r#""numbered""#).unwrap(), ListMarker::Numbered);
    }
}
