use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ContextError, ErrorKind};

/// What `DocumentBuilder::finalize` and the compositor do with a document that has no blocks.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum EmptyDocumentPolicy {
    /// Finalizing a document without blocks is a validation error.
    #[default]
    Reject,
    /// An empty document is composed into a single blank page.
    EmitBlankPage,
    /// An empty document is composed into a document without pages.
    EmitNoPages,
}

/// What the compositor does with the empty page left behind by a page break at the end of the flow.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TrailingPageBreakPolicy {
    #[default]
    Drop,
    EmitBlankPage,
}

/// How the merger reacts to an entry whose source is unreadable or whose range is invalid.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum MergeFailurePolicy {
    /// Skip the entry, record a diagnostic and keep merging the remaining entries.
    #[default]
    BestEffort,
    /// Abort the whole merge with the first error.
    FailFast,
}

/// The space left blank around the content area of every page, in points.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Margins {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Margins {
    pub fn uniform(margin: f32) -> Self {
        Margins {
            top: margin,
            right: margin,
            bottom: margin,
            left: margin,
        }
    }
}

impl Default for Margins {
    fn default() -> Self {
        Margins::uniform(36.0)
    }
}

/// The association between a font family name used in text styles and the TTF file backing it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FontAssociation {
    pub font_family: String,
    pub font_file_path: PathBuf,
}

/// The settings shared by the builder, the compositor and the merger. It can be constructed
/// from code through `Default` or loaded from a JSON file with `from_path`; every field
/// missing from the file takes its default value.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AssemblyConfiguration {
    /// Page width in points.
    pub page_width: f32,
    /// Page height in points.
    pub page_height: f32,
    pub margins: Margins,
    pub default_font_size: f32,
    /// Line height expressed as a multiple of the largest font size on the line.
    pub line_spacing: f32,
    /// Vertical space inserted after every block, in points.
    pub paragraph_spacing: f32,
    /// Padding between a table cell border and its text, in points.
    pub cell_padding: f32,
    /// Distance from the left margin to the text of list items, in points.
    pub list_indent: f32,
    pub font_associations: Vec<FontAssociation>,
    pub empty_document_policy: EmptyDocumentPolicy,
    pub trailing_page_break_policy: TrailingPageBreakPolicy,
    pub merge_failure_policy: MergeFailurePolicy,
}

impl Default for AssemblyConfiguration {
    fn default() -> Self {
        AssemblyConfiguration {
            page_width: 595.0,
            page_height: 842.0,
            margins: Margins::default(),
            default_font_size: 12.0,
            line_spacing: 1.2,
            paragraph_spacing: 6.0,
            cell_padding: 4.0,
            list_indent: 18.0,
            font_associations: Vec::new(),
            empty_document_policy: EmptyDocumentPolicy::default(),
            trailing_page_break_policy: TrailingPageBreakPolicy::default(),
            merge_failure_policy: MergeFailurePolicy::default(),
        }
    }
}

impl AssemblyConfiguration {
    pub fn from_path(configuration_file_path: &Path) -> Result<Self, ContextError> {
        let configuration_file_contents = std::fs::read_to_string(configuration_file_path)
            .map_err(|error| {
                ContextError::with_error(
                    ErrorKind::Resource,
                    format!(
                        "Failed to read the configuration file {:?}",
                        configuration_file_path
                    ),
                    &error,
                )
            })?;
        let configuration: AssemblyConfiguration =
            serde_json::from_str(&configuration_file_contents).map_err(|error| {
                ContextError::with_error(
                    ErrorKind::Resource,
                    format!(
                        "Failed to parse the configuration file {:?}",
                        configuration_file_path
                    ),
                    &error,
                )
            })?;
        configuration.validate()?;

        Ok(configuration)
    }

    /// Checks that the page still has a usable content area and that the typographic settings are positive.
    pub fn validate(&self) -> Result<(), ContextError> {
        if !(self.content_width() > 0.0 && self.content_height() > 0.0) {
            return Err(ContextError::validation(format!(
                "The margins {:?} leave no content area on a {}x{} page",
                self.margins, self.page_width, self.page_height
            )));
        }
        if !(self.default_font_size > 0.0 && self.line_spacing > 0.0) {
            return Err(ContextError::validation(format!(
                "Invalid font size {} or line spacing {}",
                self.default_font_size, self.line_spacing
            )));
        }
        if !(self.paragraph_spacing >= 0.0 && self.cell_padding >= 0.0 && self.list_indent >= 0.0) {
            return Err(ContextError::validation(
                "Paragraph spacing, cell padding and list indent cannot be negative",
            ));
        }

        Ok(())
    }

    pub fn content_width(&self) -> f32 {
        self.page_width - self.margins.left - self.margins.right
    }

    pub fn content_height(&self) -> f32 {
        self.page_height - self.margins.top - self.margins.bottom
    }

    pub fn get_font_path(&self, font_family: &str) -> Option<PathBuf> {
        self.font_associations
            .iter()
            .find(|font_association| font_association.font_family == font_family)
            .map(|font_association| font_association.font_file_path.clone())
    }
}
