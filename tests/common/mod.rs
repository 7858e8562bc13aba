#![allow(dead_code)]

use std::io::Cursor;
use std::path::PathBuf;

use folio::{Compositor, Document, DocumentBuilder, DocumentMetadata, RenderedDocument, TextBlock};
use image::{ImageFormat, Rgba, RgbaImage};
use lopdf::content::{Content, Operation};

/// The identifier given to every test document, so that their outputs are reproducible.
pub const DOCUMENT_IDENTIFIER: &str = "Cx9GzmYdTqW3bHkLa8VnR2sUe5PjfD7o";

pub fn fixture_path(file_name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join(file_name)
}

pub fn metadata(title: &str) -> DocumentMetadata {
    DocumentMetadata {
        title: Some(title.to_string()),
        identifier: Some(DOCUMENT_IDENTIFIER.to_string()),
        ..Default::default()
    }
}

/// A document with one text block per page, each page holding its own text.
pub fn paged_document(title: &str, page_texts: &[&str]) -> Document {
    let mut builder = DocumentBuilder::new().with_metadata(metadata(title));
    for (page_index, page_text) in page_texts.iter().enumerate() {
        if page_index > 0 {
            builder.request_page_break();
        }
        builder.append(TextBlock::new(*page_text)).unwrap();
    }
    builder.finalize().unwrap()
}

pub fn compose(document: &Document) -> RenderedDocument {
    Compositor::new(Default::default())
        .unwrap()
        .compose(document)
        .unwrap()
        .document
}

pub fn page_operations(document: &RenderedDocument, page_number: usize) -> Vec<Operation> {
    let page_id = document.page_ids()[page_number - 1];
    let content = document.inner().get_page_content(page_id).unwrap();
    Content::decode(&content).unwrap().operations
}

/// The operators of the content of a page, in order.
pub fn page_operators(document: &RenderedDocument, page_number: usize) -> Vec<String> {
    page_operations(document, page_number)
        .into_iter()
        .map(|operation| operation.operator)
        .collect()
}

/// The strings shown on a page, in the order they are drawn.
pub fn page_strings(document: &RenderedDocument, page_number: usize) -> Vec<String> {
    page_operations(document, page_number)
        .into_iter()
        .filter(|operation| operation.operator == "Tj")
        .filter_map(|operation| {
            let bytes = operation.operands.first()?.as_str().ok()?;
            Some(String::from_utf8_lossy(bytes).into_owned())
        })
        .collect()
}

/// Encodes a gradient image of the given size as PNG.
pub fn png_bytes(width: u32, height: u32, translucent: bool) -> Vec<u8> {
    let image = RgbaImage::from_fn(width, height, |x, y| {
        let alpha = if translucent && x % 2 == 0 { 96 } else { 255 };
        Rgba([(x * 255 / width) as u8, (y * 255 / height) as u8, 128, alpha])
    });
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// A path inside the temporary directory that is unique to the calling test.
pub fn temporary_path(file_name: &str) -> PathBuf {
    let directory = std::env::temp_dir().join(format!("folio-tests-{}", std::process::id()));
    std::fs::create_dir_all(&directory).unwrap();
    directory.join(file_name)
}
