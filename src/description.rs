use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::builder::DocumentBuilder;
use crate::configuration::AssemblyConfiguration;
use crate::document::{
    Alignment, Document, DocumentMetadata, ImageBlock, ListBlock, ListMarker, PageSize, Rotation,
    TableBlock, TableCell, TextBlock, TextRun, TextStyle,
};
use crate::error::{ContextError, ErrorKind};

/// A document written as JSON, replayed through the `DocumentBuilder` in order.
///
/// ```json
/// {
///     "metadata": { "title": "Invoice", "language": "en-US" },
///     "pageSize": { "width": 595, "height": 842 },
///     "contents": [
///         { "type": "text", "text": "Invoice", "alignment": "center", "style": { "fontSize": 24 } },
///         { "type": "text", "runs": [{ "text": "Due: " }, { "text": "30 days", "bold": true }] },
///         { "type": "list", "items": ["Paper", "Ink"], "marker": { "symbol": "*" } },
///         { "type": "table", "columns": 2, "header": [{ "text": "Item" }, { "text": "Price" }],
///           "cells": [{ "text": "Paper" }, { "text": "4.20" }] },
///         { "type": "pageBreak" },
///         { "type": "image", "path": "logo.png", "width": 120, "height": 60 }
///     ]
/// }
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDescription {
    #[serde(default)]
    pub metadata: DocumentMetadata,
    /// The page size of the configuration is used if `None`.
    #[serde(default)]
    pub page_size: Option<PageSize>,
    #[serde(default)]
    pub rotation: Rotation,
    pub contents: Vec<ContentDescription>,
    /// The directory image paths are relative to, the one of the JSON file when loaded from a path.
    #[serde(skip)]
    pub base_directory: PathBuf,
}

/// An element of the `contents` array of a document description.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentDescription {
    #[serde(rename_all = "camelCase")]
    Text {
        /// Shorthand for a single run, written before the `runs`.
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        runs: Vec<TextRun>,
        #[serde(default)]
        alignment: Alignment,
        #[serde(default)]
        style: TextStyle,
    },
    #[serde(rename_all = "camelCase")]
    List {
        items: Vec<String>,
        /// `{ "symbol": "-" }` or `"numbered"`.
        #[serde(default)]
        marker: ListMarker,
        #[serde(default)]
        indent: Option<f32>,
        #[serde(default)]
        style: TextStyle,
    },
    #[serde(rename_all = "camelCase")]
    Table {
        columns: usize,
        #[serde(default)]
        header: Vec<TableCell>,
        #[serde(default)]
        cells: Vec<TableCell>,
        #[serde(default)]
        column_widths: Option<Vec<f32>>,
        #[serde(default)]
        style: TextStyle,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        path: PathBuf,
        width: f32,
        height: f32,
    },
    PageBreak,
}

impl DocumentDescription {
    pub fn from_path(description_file_path: &Path) -> Result<Self, ContextError> {
        let description_file_contents = std::fs::read_to_string(description_file_path)
            .map_err(|error| {
                ContextError::with_error(
                    ErrorKind::Resource,
                    format!("Failed to read the document {:?}", description_file_path),
                    &error,
                )
            })?;
        let mut description = DocumentDescription::from_json(&description_file_contents).map_err(|error| {
            ContextError::with_error(
                error.kind,
                format!("Failed to parse the document {:?}", description_file_path),
                &error,
            )
        })?;
        description.base_directory = description_file_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Ok(description)
    }

    /// Parses a description whose image paths are relative to the current directory.
    pub fn from_json(json: &str) -> Result<Self, ContextError> {
        serde_json::from_str(json).map_err(|error| {
            ContextError::with_error(ErrorKind::Validation, "Invalid document description", &error)
        })
    }

    /// Replays the contents through a builder set up from the configuration, reading the images
    /// from disk, and finalizes the document.
    pub fn to_document(&self, configuration: &AssemblyConfiguration) -> Result<Document, ContextError> {
        let mut builder = DocumentBuilder::from_configuration(configuration)
            .with_metadata(self.metadata.clone())
            .with_rotation(self.rotation);
        if let Some(page_size) = self.page_size {
            builder = builder.with_page_size(page_size);
        }

        for (content_index, content) in self.contents.iter().enumerate() {
            let appended = match content {
                ContentDescription::Text {
                    text,
                    runs,
                    alignment,
                    style,
                } => builder.append(TextBlock {
                    runs: text.iter().cloned().map(TextRun::new).chain(runs.iter().cloned()).collect(),
                    alignment: *alignment,
                    style: style.clone(),
                }),
                ContentDescription::List {
                    items,
                    marker,
                    indent,
                    style,
                } => builder.append(ListBlock {
                    items: items.clone(),
                    marker: marker.clone(),
                    indent: *indent,
                    style: style.clone(),
                }),
                ContentDescription::Table {
                    columns,
                    header,
                    cells,
                    column_widths,
                    style,
                } => builder.append(TableBlock {
                    columns: *columns,
                    header: header.clone(),
                    cells: cells.clone(),
                    column_widths: column_widths.clone(),
                    style: style.clone(),
                }),
                ContentDescription::Image {
                    path,
                    width,
                    height,
                } => {
                    let image_path = self.base_directory.join(path);
                    let bytes = std::fs::read(&image_path).map_err(|error| {
                        ContextError::with_error(
                            ErrorKind::Resource,
                            format!("Failed to read the image {:?}", image_path),
                            &error,
                        )
                    })?;
                    builder.append(ImageBlock::new(bytes, *width, *height))
                }
                ContentDescription::PageBreak => Ok(builder.request_page_break()),
            };
            appended.map_err(|error| {
                ContextError::with_error(
                    error.kind,
                    format!("Invalid content at index {}", content_index),
                    &error,
                )
            })?;
        }

        builder.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Block, Color, FlowItem};
    use crate::fonts::FontStyle;

    const INVOICE: &str = r##"{
        "metadata": { "title": "Invoice", "tagged": true },
        "rotation": 90,
        "contents": [
            { "type": "text", "text": "Invoice ", "runs": [{ "text": "#42", "color": [1, 0, 0] }],
              "alignment": "center", "style": { "fontSize": 24 } },
            { "type": "pageBreak" },
            { "type": "table", "columns": 2, "columnWidths": [3, 1],
              "header": [{ "text": "Item" }, { "text": "Price", "alignment": "right" }],
              "cells": [{ "text": "Paper" }, { "text": "4.20" }, { "text": "Total", "colspan": 2 }] }
        ]
    }"##;

    #[test]
    fn descriptions_are_replayed_in_order() {
        let description = DocumentDescription::from_json(INVOICE).unwrap();
        let document = description
            .to_document(&AssemblyConfiguration::default())
            .unwrap();

        assert_eq!(document.metadata().title.as_deref(), Some("Invoice"));
        assert_eq!(document.rotation(), Rotation::Quarter);
        assert_eq!(document.page_size(), PageSize::A4);
        assert_eq!(document.flow().len(), 3);
        assert_eq!(document.flow()[1], FlowItem::PageBreak);
        match &document.flow()[0] {
            FlowItem::Block(Block::Text(text_block)) => {
                assert_eq!(text_block.plain_text(), "Invoice #42");
                assert_eq!(text_block.runs[1].color, Some(Color::RED));
                assert_eq!(text_block.style.font_size, Some(24.0));
            }
            item => panic!("Unexpected flow item {:?}", item),
        }
    }

    #[test]
    fn lists_and_styled_runs_are_read() {
        let description = DocumentDescription::from_json(
            r#"{ "contents": [
                { "type": "text", "runs": [{ "text": "Due: " }, { "text": "now", "bold": true, "italic": true }] },
                { "type": "list", "items": ["Paper", "Ink"], "marker": "numbered", "indent": 12 },
                { "type": "list", "items": ["Pens"], "marker": { "symbol": "*" } }
            ] }"#,
        )
        .unwrap();
        let document = description
            .to_document(&AssemblyConfiguration::default())
            .unwrap();
        let blocks: Vec<&Block> = document.blocks().collect();

        match blocks[0] {
            Block::Text(text_block) => {
                assert_eq!(text_block.runs[0].font_style(), FontStyle::Regular);
                assert_eq!(text_block.runs[1].font_style(), FontStyle::BoldItalic);
            }
            block => panic!("Unexpected block {:?}", block),
        }
        assert_eq!(
            blocks[1],
            &Block::List(ListBlock::numbered().add_item("Paper").add_item("Ink").with_indent(12.0))
        );
        assert_eq!(
            blocks[2],
            &Block::List(ListBlock::new(ListMarker::Symbol("*".into())).add_item("Pens"))
        );
    }

    #[test]
    fn invalid_contents_report_their_index() {
        let description = DocumentDescription::from_json(
            r#"{ "contents": [{ "type": "text", "text": "ok" }, { "type": "table", "columns": 0 }] }"#,
        )
        .unwrap();
        let error = description
            .to_document(&AssemblyConfiguration::default())
            .unwrap_err();

        assert!(error.is_validation());
        assert!(error.context.contains("index 1"));
    }

    #[test]
    fn unknown_content_types_are_rejected() {
        let error = DocumentDescription::from_json(r#"{ "contents": [{ "type": "video" }] }"#)
            .unwrap_err();
        assert!(error.is_validation());
    }

    #[test]
    fn missing_images_are_resource_errors() {
        let description = DocumentDescription::from_json(
            r#"{ "contents": [{ "type": "image", "path": "does/not/exist.png", "width": 10, "height": 10 }] }"#,
        )
        .unwrap();
        let error = description
            .to_document(&AssemblyConfiguration::default())
            .unwrap_err();

        assert!(error.is_resource());
    }
}
