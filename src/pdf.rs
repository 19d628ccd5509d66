//! Per-page PDF text extraction.
//!
//! Pages are returned 1-indexed and in order; pages with no extractable
//! text are dropped. Extraction is synchronous and CPU-bound — callers run
//! it on the blocking pool.

use anyhow::{Context, Result};
use std::path::Path;

/// Extract `(page_number, text)` pairs from a PDF file.
pub fn extract_pages(path: &Path) -> Result<Vec<(u32, String)>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read PDF file: {}", path.display()))?;
    extract_pages_from_bytes(&bytes)
}

/// Extract `(page_number, text)` pairs from in-memory PDF bytes.
pub fn extract_pages_from_bytes(bytes: &[u8]) -> Result<Vec<(u32, String)>> {
    let doc = lopdf::Document::load_mem(bytes).context("Failed to parse PDF")?;

    let mut page_numbers: Vec<u32> = doc.get_pages().keys().cloned().collect();
    page_numbers.sort();

    let mut pages = Vec::with_capacity(page_numbers.len());
    for page_num in page_numbers {
        let text = doc.extract_text(&[page_num]).unwrap_or_default();
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            pages.push((page_num, trimmed.to_string()));
        }
    }

    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Document, Object, Stream};

    /// Build a minimal single-page PDF containing `text`.
    pub(crate) fn minimal_pdf(text: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.4");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let content = lopdf::content::Content {
            operations: vec![
                lopdf::content::Operation::new("BT", vec![]),
                lopdf::content::Operation::new("Tf", vec!["F1".into(), 12.into()]),
                lopdf::content::Operation::new("Td", vec![72.into(), 720.into()]),
                lopdf::content::Operation::new(
                    "Tj",
                    vec![Object::string_literal(text)],
                ),
                lopdf::content::Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().unwrap(),
        ));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    #[test]
    fn extracts_text_from_single_page() {
        let bytes = minimal_pdf("quarterly planning notes");
        let pages = extract_pages_from_bytes(&bytes).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].0, 1);
        assert!(pages[0].1.contains("quarterly planning notes"));
    }

    #[test]
    fn rejects_garbage_bytes() {
        assert!(extract_pages_from_bytes(b"not a pdf at all").is_err());
    }
}
