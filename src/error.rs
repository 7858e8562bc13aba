use serde::{Deserialize, Serialize};

/// The category of a `ContextError`, which decides how the pipeline reacts to it.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// The input is well-formed but violates a rule of the pipeline, such as an invalid
    /// page range, an empty document or a table without columns.
    Validation,
    /// An external resource could not be read or decoded, such as a missing file or corrupt PDF bytes.
    Resource,
}

/// A struct that represents an error with a kind, a context and possibly the propagated source error.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ContextError {
    pub kind: ErrorKind,
    pub context: String,
    pub source_error: Option<String>,
}

impl std::fmt::Display for ContextError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source_error {
            Some(source_error) => write!(
                formatter,
                "{}: {}",
                self.context,
                minimize_first_letter(source_error.to_string()),
            ),
            None => write!(formatter, "{}", self.context),
        }
    }
}

impl std::error::Error for ContextError {}

impl ContextError {
    /// Create a new `ContextError` of the given kind with the given context.
    pub fn with_context<S: Into<String>>(kind: ErrorKind, context: S) -> ContextError {
        ContextError {
            kind,
            context: context.into(),
            source_error: None,
        }
    }

    /// Create a new `ContextError` of the given kind with the given context and source error.
    pub fn with_error<S: Into<String>>(
        kind: ErrorKind,
        context: S,
        error: &dyn std::error::Error,
    ) -> ContextError {
        ContextError {
            kind,
            context: context.into(),
            source_error: Some(error.to_string()),
        }
    }

    /// Shorthand for a validation error without a source.
    pub fn validation<S: Into<String>>(context: S) -> ContextError {
        ContextError::with_context(ErrorKind::Validation, context)
    }

    /// Shorthand for a resource error without a source.
    pub fn resource<S: Into<String>>(context: S) -> ContextError {
        ContextError::with_context(ErrorKind::Resource, context)
    }

    pub fn is_validation(&self) -> bool {
        self.kind == ErrorKind::Validation
    }

    pub fn is_resource(&self) -> bool {
        self.kind == ErrorKind::Resource
    }
}

/// A non-fatal problem found while rendering, such as a glyph missing from a font or an
/// overlay that could not be stamped. Warnings are collected and returned next to the result.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RenderWarning {
    /// The 1-based number of the page the warning refers to, if any.
    pub page_number: Option<usize>,
    pub message: String,
}

impl RenderWarning {
    pub fn new<S: Into<String>>(page_number: Option<usize>, message: S) -> RenderWarning {
        let warning = RenderWarning {
            page_number,
            message: message.into(),
        };
        log::warn!("{}", warning);
        warning
    }
}

impl std::fmt::Display for RenderWarning {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.page_number {
            Some(page_number) => write!(formatter, "page {}: {}", page_number, self.message),
            None => write!(formatter, "{}", self.message),
        }
    }
}

/// Minimizes the first letter of a string, it is used for standardizing the error message.
fn minimize_first_letter(string: String) -> String {
    let mut characters = string.chars();
    match characters.next() {
        None => String::new(),
        Some(character) => character.to_lowercase().chain(characters).collect(),
    }
}
