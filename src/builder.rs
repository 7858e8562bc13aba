use crate::configuration::{AssemblyConfiguration, EmptyDocumentPolicy};
use crate::document::{Block, Document, DocumentMetadata, FlowItem, PageSize, Rotation};
use crate::error::ContextError;

/// Accumulates blocks and forced page breaks into an append-only flow, then produces a `Document`.
///
/// The builder performs no I/O and assigns no pages: it only validates each block as it is
/// appended, so that an invalid table or image is reported at the point where it was added.
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    metadata: DocumentMetadata,
    page_size: PageSize,
    rotation: Rotation,
    empty_document_policy: EmptyDocumentPolicy,
    flow: Vec<FlowItem>,
    appended_blocks: usize,
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        DocumentBuilder::new()
    }
}

impl DocumentBuilder {
    pub fn new() -> Self {
        DocumentBuilder {
            metadata: DocumentMetadata::default(),
            page_size: PageSize::A4,
            rotation: Rotation::Upright,
            empty_document_policy: EmptyDocumentPolicy::Reject,
            flow: Vec::new(),
            appended_blocks: 0,
        }
    }

    /// Takes the page size and the empty document policy from the configuration.
    pub fn from_configuration(configuration: &AssemblyConfiguration) -> Self {
        DocumentBuilder::new()
            .with_page_size(PageSize::new(
                configuration.page_width,
                configuration.page_height,
            ))
            .with_empty_document_policy(configuration.empty_document_policy)
    }

    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_page_size(mut self, page_size: PageSize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_empty_document_policy(mut self, empty_document_policy: EmptyDocumentPolicy) -> Self {
        self.empty_document_policy = empty_document_policy;
        self
    }

    /// Adds a block to the end of the flow, failing if the block is invalid.
    pub fn append<B: Into<Block>>(&mut self, block: B) -> Result<&mut Self, ContextError> {
        let block = block.into();
        block.validate()?;
        self.flow.push(FlowItem::Block(block));
        self.appended_blocks += 1;

        Ok(self)
    }

    /// Marks a forced boundary: the next appended block starts on a new page.
    pub fn request_page_break(&mut self) -> &mut Self {
        self.flow.push(FlowItem::PageBreak);
        self
    }

    pub fn appended_blocks(&self) -> usize {
        self.appended_blocks
    }

    pub fn finalize(self) -> Result<Document, ContextError> {
        if !(self.page_size.width > 0.0 && self.page_size.height > 0.0) {
            return Err(ContextError::validation(format!(
                "Invalid page size {:?}",
                self.page_size
            )));
        }
        if self.appended_blocks == 0 && self.empty_document_policy == EmptyDocumentPolicy::Reject {
            return Err(ContextError::validation(
                "The document is empty: no block was ever appended",
            ));
        }
        log::debug!(
            "Finalized a document with {} blocks and {} page breaks",
            self.appended_blocks,
            self.flow.len() - self.appended_blocks
        );

        Ok(Document {
            metadata: self.metadata,
            page_size: self.page_size,
            rotation: self.rotation,
            empty_document_policy: self.empty_document_policy,
            flow: self.flow,
        })
    }
}
