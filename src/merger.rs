use lopdf::{Object, ObjectId};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;

use crate::configuration::{AssemblyConfiguration, MergeFailurePolicy};
use crate::error::{ContextError, ErrorKind};
use crate::rendered::{inherited_attribute, RenderedDocument};

/// The page attributes a page can inherit from its ancestors in the page tree.
const INHERITABLE_PAGE_ATTRIBUTES: [&str; 4] = ["Resources", "MediaBox", "CropBox", "Rotate"];

/// Where the pages of a merge entry come from.
#[derive(Debug, Clone)]
pub enum MergeSource {
    Rendered(RenderedDocument),
    /// The bytes of a PDF file.
    Bytes(Vec<u8>),
    /// The path of a PDF file, read when the merge runs.
    Path(PathBuf),
}

impl MergeSource {
    /// A copy of the source document, so that the source itself is never modified.
    fn load(&self) -> Result<lopdf::Document, ContextError> {
        match self {
            MergeSource::Rendered(rendered_document) => Ok(rendered_document.inner().clone()),
            MergeSource::Bytes(bytes) => RenderedDocument::from_bytes(bytes).map(RenderedDocument::into_inner),
            MergeSource::Path(pdf_file_path) => {
                RenderedDocument::from_path(pdf_file_path).map(RenderedDocument::into_inner)
            }
        }
    }
}

impl From<RenderedDocument> for MergeSource {
    fn from(value: RenderedDocument) -> Self {
        MergeSource::Rendered(value)
    }
}

impl From<Vec<u8>> for MergeSource {
    fn from(value: Vec<u8>) -> Self {
        MergeSource::Bytes(value)
    }
}

impl From<PathBuf> for MergeSource {
    fn from(value: PathBuf) -> Self {
        MergeSource::Path(value)
    }
}

/// The pages taken from a source, 1-based and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageRange {
    #[default]
    All,
    Span { first: usize, last: usize },
}

impl PageRange {
    pub fn single(page_number: usize) -> Self {
        PageRange::Span {
            first: page_number,
            last: page_number,
        }
    }

    pub fn span(first: usize, last: usize) -> Self {
        PageRange::Span { first, last }
    }

    /// The page numbers of the range for a document of the given page count. A range reaching
    /// outside of the document is a validation error, it is never clamped, and so is any range
    /// of a document without pages.
    pub fn resolve(&self, page_count: usize) -> Result<RangeInclusive<usize>, ContextError> {
        match *self {
            PageRange::All if page_count == 0 => Err(ContextError::validation(
                "The document has no pages to select",
            )),
            PageRange::All => Ok(1..=page_count),
            PageRange::Span { first, last } => {
                if first == 0 || first > last || last > page_count {
                    return Err(ContextError::validation(format!(
                        "Invalid page range {}-{} for a document of {} pages",
                        first, last, page_count
                    )));
                }
                Ok(first..=last)
            }
        }
    }
}

impl FromStr for PageRange {
    type Err = ContextError;

    /// Parses `all`, a single page number such as `3` or a span such as `2-5`.
    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let parse_page_number = |page_number: &str| {
            page_number.trim().parse::<usize>().map_err(|error| {
                ContextError::with_error(
                    ErrorKind::Validation,
                    format!("Invalid page number {:?}", page_number),
                    &error,
                )
            })
        };
        match string.trim() {
            "all" | "" => Ok(PageRange::All),
            range => match range.split_once('-') {
                Some((first, last)) => Ok(PageRange::span(
                    parse_page_number(first)?,
                    parse_page_number(last)?,
                )),
                None => Ok(PageRange::single(parse_page_number(range)?)),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct MergeEntry {
    pub source: MergeSource,
    pub pages: PageRange,
}

impl MergeEntry {
    pub fn new<S: Into<MergeSource>>(source: S, pages: PageRange) -> Self {
        MergeEntry {
            source: source.into(),
            pages,
        }
    }
}

/// The ordered list of page ranges to concatenate. The output follows the order of the entries,
/// and the pages of an entry keep their ascending order.
#[derive(Debug, Clone, Default)]
pub struct MergeSpec {
    pub entries: Vec<MergeEntry>,
}

impl MergeSpec {
    pub fn new() -> Self {
        MergeSpec::default()
    }

    pub fn with_entry<S: Into<MergeSource>>(mut self, source: S, pages: PageRange) -> Self {
        self.entries.push(MergeEntry::new(source, pages));
        self
    }
}

/// An entry skipped by a best-effort merge, together with the reason it was skipped.
#[derive(Debug, Clone)]
pub struct MergeDiagnostic {
    /// The 0-based index of the entry in the merge spec.
    pub entry_index: usize,
    pub error: ContextError,
}

impl std::fmt::Display for MergeDiagnostic {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "entry {}: {}", self.entry_index, self.error)
    }
}

#[derive(Debug)]
pub struct MergeOutcome {
    pub document: RenderedDocument,
    pub diagnostics: Vec<MergeDiagnostic>,
}

/// Concatenates page ranges of several PDF documents into a new one.
///
/// Each entry is copied into its own range of object identifiers and every copied page carries
/// its inherited attributes itself, so the resources of different sources never collide.
#[derive(Debug, Clone, Copy, Default)]
pub struct Merger {
    failure_policy: MergeFailurePolicy,
}

impl Merger {
    pub fn new(failure_policy: MergeFailurePolicy) -> Self {
        Merger { failure_policy }
    }

    pub fn from_configuration(configuration: &AssemblyConfiguration) -> Self {
        Merger::new(configuration.merge_failure_policy)
    }

    pub fn merge(&self, merge_spec: &MergeSpec) -> Result<MergeOutcome, ContextError> {
        if merge_spec.entries.is_empty() {
            return Err(ContextError::validation("The merge spec has no entries"));
        }

        let mut inner_document = lopdf::Document::with_version("1.7");
        let pages_id: ObjectId = (1, 0);
        let catalog_id: ObjectId = (2, 0);
        let mut next_id = 3;
        let mut kids = Vec::new();
        let mut diagnostics = Vec::new();

        for (entry_index, entry) in merge_spec.entries.iter().enumerate() {
            match copy_entry(entry, &mut inner_document, pages_id, &mut next_id) {
                Ok(page_ids) => {
                    log::debug!("Copied {} pages of entry {}", page_ids.len(), entry_index);
                    kids.extend(page_ids.into_iter().map(Object::Reference));
                }
                Err(error) => match self.failure_policy {
                    MergeFailurePolicy::FailFast => {
                        return Err(ContextError::with_error(
                            error.kind,
                            format!("Failed to merge the entry {}", entry_index),
                            &error,
                        ))
                    }
                    MergeFailurePolicy::BestEffort => {
                        let diagnostic = MergeDiagnostic { entry_index, error };
                        log::warn!("Skipped a merge entry, {}", diagnostic);
                        diagnostics.push(diagnostic);
                    }
                },
            }
        }
        if kids.is_empty() {
            return Err(ContextError::validation(format!(
                "None of the {} merge entries produced any page",
                merge_spec.entries.len()
            )));
        }

        let pages = lopdf::Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(kids.len() as i64)),
            ("Kids", Object::Array(kids)),
        ]);
        inner_document.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog = lopdf::Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]);
        inner_document.objects.insert(catalog_id, Object::Dictionary(catalog));
        inner_document.trailer.set("Root", Object::Reference(catalog_id));
        inner_document.max_id = next_id - 1;
        // The objects only reachable from the pages left out are dropped
        inner_document.prune_objects();

        let document = RenderedDocument::new(inner_document);
        log::debug!(
            "Merged {} pages with {} diagnostics",
            document.page_count(),
            diagnostics.len()
        );

        Ok(MergeOutcome {
            document,
            diagnostics,
        })
    }
}

/// Copies the selected pages of an entry, and every object they may reference, into the output
/// document. Returns the identifiers of the copied pages in page order.
fn copy_entry(
    entry: &MergeEntry,
    inner_document: &mut lopdf::Document,
    pages_id: ObjectId,
    next_id: &mut u32,
) -> Result<Vec<ObjectId>, ContextError> {
    let mut source_document = entry.source.load()?;
    let page_numbers = entry.pages.resolve(source_document.get_pages().len())?;

    source_document.renumber_objects_with(*next_id);
    *next_id = source_document.max_id + 1;

    let source_pages = source_document.get_pages();
    let mut copied_pages = Vec::new();
    for page_number in page_numbers {
        let page_id = u32::try_from(page_number)
            .ok()
            .and_then(|page_number| source_pages.get(&page_number))
            .copied()
            .ok_or(ContextError::resource(format!(
                "Failed to find page {} in the page tree",
                page_number
            )))?;
        let mut page = source_document
            .get_dictionary(page_id)
            .map_err(|error| {
                ContextError::with_error(
                    ErrorKind::Resource,
                    format!("Failed to read page {}", page_number),
                    &error,
                )
            })?
            .clone();
        for key in INHERITABLE_PAGE_ATTRIBUTES {
            if !page.has(key.as_bytes()) {
                if let Some(value) = inherited_attribute(&source_document, page_id, key.as_bytes()) {
                    page.set(key, value);
                }
            }
        }
        page.set("Parent", Object::Reference(pages_id));
        copied_pages.push((page_id, page));
    }

    for (object_id, object) in source_document.objects {
        match object_type(&object) {
            Some(b"Catalog" | b"Pages" | b"Page" | b"Outlines" | b"Outline") => {}
            _ => {
                inner_document.objects.insert(object_id, object);
            }
        }
    }

    Ok(copied_pages
        .into_iter()
        .map(|(page_id, page)| {
            inner_document.objects.insert(page_id, Object::Dictionary(page));
            page_id
        })
        .collect())
}

/// The `Type` entry of a dictionary or of a stream dictionary.
fn object_type(object: &Object) -> Option<&[u8]> {
    let dictionary = match object {
        Object::Dictionary(dictionary) => dictionary,
        Object::Stream(stream) => &stream.dict,
        _ => return None,
    };
    dictionary.get(b"Type").and_then(Object::as_name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_ranges_are_validated_not_clamped() {
        assert_eq!(PageRange::All.resolve(3).unwrap(), 1..=3);
        assert_eq!(PageRange::span(2, 3).resolve(3).unwrap(), 2..=3);
        assert!(PageRange::span(2, 4).resolve(3).unwrap_err().is_validation());
        assert!(PageRange::single(0).resolve(3).is_err());
        assert!(PageRange::span(3, 2).resolve(3).is_err());
    }

    #[test]
    fn no_range_selects_pages_of_an_empty_document() {
        assert!(PageRange::All.resolve(0).unwrap_err().is_validation());
        assert!(PageRange::single(1).resolve(0).unwrap_err().is_validation());
    }

    #[test]
    fn page_ranges_are_parsed_from_strings() {
        assert_eq!("all".parse::<PageRange>().unwrap(), PageRange::All);
        assert_eq!("4".parse::<PageRange>().unwrap(), PageRange::single(4));
        assert_eq!(" 2 - 5".parse::<PageRange>().unwrap(), PageRange::span(2, 5));
        assert!("two".parse::<PageRange>().unwrap_err().is_validation());
    }

    #[test]
    fn empty_spec_is_a_validation_error() {
        let error = Merger::default().merge(&MergeSpec::new()).unwrap_err();
        assert!(error.is_validation());
    }

    #[test]
    fn fail_fast_keeps_the_error_kind() {
        let merge_spec = MergeSpec::new().with_entry(b"not a pdf".to_vec(), PageRange::All);
        let error = Merger::new(MergeFailurePolicy::FailFast)
            .merge(&merge_spec)
            .unwrap_err();

        assert!(error.is_resource());
        assert!(error.to_string().starts_with("Failed to merge the entry 0"));
    }
}
