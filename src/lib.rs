//! Folio is a small document assembly pipeline built on top of `lopdf`: documents are described as
//! a flow of text, list, table and image blocks, laid out onto pages, rendered to PDF, decorated with
//! overlays and finally concatenated with other PDF documents.
//!
//! The pipeline has three stages which always run in this order for a given document:
//! the `DocumentBuilder` accumulates blocks into a finalized `Document`, the `Compositor` turns it
//! into a `RenderedDocument`, and the `Merger` concatenates page ranges of rendered documents or of
//! existing PDF files. Nothing in the pipeline is shared between documents, so independent
//! documents can be processed on different threads.
//!
//! Problems that do not prevent the output from being produced, such as a character missing from a
//! font or a page hook failing, are returned as `RenderWarning`s (or `MergeDiagnostic`s) next to the
//! result. Everything else is a `ContextError`.

/// The module where the `Document` data model is presented.
///
/// # Introduction
///
/// A `Document` is an ordered flow of blocks (`TextBlock`, `ListBlock`, `TableBlock` and `ImageBlock`) and
/// forced page breaks, together with its page size, rotation and metadata. Blocks carry no position:
/// the compositor decides on which page each of them lands. A document can only be obtained from the
/// `DocumentBuilder` and cannot be modified afterwards.
pub mod document;

/// This module contains the `DocumentBuilder`, the only way of producing a `Document`.
pub mod builder;

/// The module where JSON document descriptions are loaded and replayed through the builder.
pub mod description;

/// This module contains the `AssemblyConfiguration` shared by the stages of the pipeline, and the
/// policies deciding how the edge cases are handled (empty documents, trailing page breaks and
/// failing merge entries).
pub mod configuration;

/// This module contains the `ContextError` type which is the error type used throughout this library,
/// together with the non-fatal `RenderWarning`.
///
/// The reason why this type has been implemented is to uniform the error reporting without delving too deep
/// into specific error codes which for such library would be too many. Its `ErrorKind` tells apart
/// the inputs violating a rule of the pipeline from the external resources that could not be read.
pub mod error;

/// The fonts usable by the documents: the standard Helvetica font in its four styles, always
/// available, and the TrueType fonts loaded from the configuration, which are embedded into the output.
pub mod fonts;

/// The flow algorithm, which assigns blocks (or parts of blocks) to pages.
pub mod layout;

/// The module where the `Compositor` is presented.
///
/// # Introduction
///
/// The compositor lays a document out, renders every page through the `PdfDocument` primitives,
/// runs the registered `PageHook`s once per page in registration order and finally stamps the
/// registered overlays on every page.
pub mod compositor;

/// Overlays stamped on top of rendered pages, the `PageHook` trait and the bundled `HeaderFooter` hook.
pub mod overlay;

/// The module were the `PdfDocument` interface for writing PDF documents is presented.
///
/// # Introduction
///
/// The `PdfDocument` offers the drawing primitives used by the compositor: `add_page`, `register_font`,
/// `write_text`, `write_rectangle`, `add_image`, `write_image`, and finally `write_all`, which produces
/// the `lopdf` document with its catalog, page tree, info dictionary and identifier. The output is
/// deterministic: the creation date defaults to the UNIX epoch and the identifier can be fixed
/// through the document metadata.
pub mod pdf;

/// The `RenderedDocument`, a PDF document ready to be saved, stamped or merged.
pub mod rendered;

/// The module where the `Merger` is presented, which concatenates page ranges of PDF documents.
pub mod merger;

pub use builder::DocumentBuilder;
pub use compositor::{Composition, Compositor};
pub use configuration::{
    AssemblyConfiguration, EmptyDocumentPolicy, MergeFailurePolicy, TrailingPageBreakPolicy,
};
pub use description::DocumentDescription;
pub use document::{
    Alignment, Block, Color, Document, DocumentMetadata, ImageBlock, ListBlock, ListMarker,
    PageSize, Rotation, TableBlock, TableCell, TextBlock, TextRun,
};
pub use error::{ContextError, ErrorKind, RenderWarning};
pub use fonts::{FontStyle, LoadedFont};
pub use merger::{MergeDiagnostic, MergeEntry, MergeOutcome, MergeSource, MergeSpec, Merger, PageRange};
pub use overlay::{HeaderFooter, Overlay, PageContext, PageHook, VerticalAlignment};
pub use rendered::RenderedDocument;
