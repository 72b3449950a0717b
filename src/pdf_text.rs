// src/pdf_text.rs

use crate::error::DecodeError;
use crate::heuristics;
use lopdf::{Dictionary, Document};
use std::path::Path;
use tracing::{info, warn};

/// Minimum number of non-whitespace characters we expect from a
/// "real" text PDF. Below this threshold the decode is a failure.
const MIN_TEXT_CHARS: usize = 30;

/// Ordered text fragments of one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageText {
    pub fragments: Vec<String>,
}

impl PageText {
    pub fn from_text(text: &str) -> Self {
        Self {
            fragments: text.lines().map(str::to_string).collect(),
        }
    }

    fn meaningful_chars(&self) -> usize {
        self.fragments
            .iter()
            .flat_map(|f| f.chars())
            .filter(|c| !c.is_whitespace())
            .count()
    }
}

/// Turns raw PDF bytes into page text.
pub trait PdfDecoder: Send + Sync {
    fn decode(&self, pdf_bytes: &[u8]) -> Result<Vec<PageText>, DecodeError>;
}

/// Fragments joined by newlines, each page terminated by a newline.
pub fn document_text(pages: &[PageText]) -> String {
    let mut text = String::new();
    for page in pages {
        text.push_str(&page.fragments.join("\n"));
        text.push('\n');
    }
    text
}

/// Text through `pdf-extract`, which breaks lines where the text
/// position moves. Per-page `lopdf` text is the fallback when that fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextDecoder;

impl PdfDecoder for PdfTextDecoder {
    fn decode(&self, pdf_bytes: &[u8]) -> Result<Vec<PageText>, DecodeError> {
        // --- Phase 1: structural check with lopdf ---
        let doc = Document::load_mem(pdf_bytes).map_err(|e| DecodeError::Parse(e.to_string()))?;

        if looks_like_scanned(&doc) {
            info!("PDF structural check: likely scanned / image-only");
            return Err(DecodeError::Scanned);
        }

        // --- Phase 2: full text extraction ---
        match pdf_extract::extract_text_from_mem(pdf_bytes) {
            Ok(text) => {
                let pages: Vec<PageText> = text.split('\u{c}').map(PageText::from_text).collect();
                let chars: usize = pages.iter().map(PageText::meaningful_chars).sum();
                if chars >= MIN_TEXT_CHARS {
                    info!(pages = pages.len(), chars, "Text extracted successfully");
                    return Ok(pages);
                }
                info!(chars, "Extracted text too short, trying lopdf");
            }
            Err(e) => warn!(error = %e, "pdf-extract failed, trying lopdf"),
        }

        // --- Phase 3: page by page with lopdf ---
        let pages = page_texts(&doc);
        let chars: usize = pages.iter().map(PageText::meaningful_chars).sum();
        if chars < MIN_TEXT_CHARS {
            info!(chars, "Extracted text too short");
            return Err(DecodeError::NoText);
        }
        info!(pages = pages.len(), chars, "Text extracted per page with lopdf");
        Ok(pages)
    }
}

/// `lopdf` only breaks lines at `ET`, so fragments inside one text
/// object come out joined.
fn page_texts(doc: &Document) -> Vec<PageText> {
    doc.get_pages()
        .keys()
        .map(|&page_num| match doc.extract_text(&[page_num]) {
            Ok(text) => PageText::from_text(&text),
            Err(e) => {
                warn!(page = page_num, error = %e, "Page text extraction failed");
                PageText::default()
            }
        })
        .collect()
}

/// Heuristic: inspect the PDF object tree for signs that every page
/// is just a single image with no text operators.
///
/// A page with XObject images but **no** Font resources is almost
/// certainly a scanned page.
fn looks_like_scanned(doc: &Document) -> bool {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return false; // can't tell, let text extraction try
    }

    let mut image_only_pages = 0;

    for object_id in pages.values() {
        let Ok(page_obj) = doc.get_object(*object_id) else {
            continue;
        };
        let Some(page_dict) = page_obj.as_dict().ok() else {
            continue;
        };

        let resources = page_dict
            .get(b"Resources")
            .ok()
            .and_then(|r| doc.dereference(r).ok())
            .and_then(|(_, resolved)| resolved.as_dict().ok());

        if has_resource(doc, resources, b"XObject") && !has_resource(doc, resources, b"Font") {
            image_only_pages += 1;
        }
    }

    let total = pages.len();
    let ratio = image_only_pages as f64 / total as f64;
    info!(
        total_pages = total,
        image_only = image_only_pages,
        ratio = format!("{ratio:.2}"),
        "Scanned-page analysis"
    );

    ratio >= 0.8
}

fn has_resource(doc: &Document, resources: Option<&Dictionary>, key: &[u8]) -> bool {
    resources
        .and_then(|res| res.get(key).ok())
        .and_then(|o| doc.dereference(o).ok())
        .and_then(|(_, resolved)| resolved.as_dict().ok())
        .is_some_and(|d| !d.is_empty())
}

/// Decode one PDF from disk and print every section's record.
///
/// Usage: `cargo run -- extract <file.pdf>`
pub fn inspect_pdf(
    path: impl AsRef<Path>,
    decoder: &dyn PdfDecoder,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    info!(path = %path.display(), bytes = bytes.len(), "Loaded PDF");

    let pages = decoder.decode(&bytes)?;
    let text = document_text(&pages);

    println!("\n--- Extracted Text (first 2000 chars) ---");
    println!("{}", text.chars().take(2000).collect::<String>());
    println!("--- End ---\n");

    let records = heuristics::extract_document(&text);
    info!(sections = records.len(), "Sections found");

    for (i, record) in records.iter().enumerate() {
        let (filled, total) = record.coverage();
        println!("--- Section {} ({filled}/{total} fields) ---", i + 1);
        println!("{}", serde_json::to_string_pretty(record)?);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{Object, Stream, dictionary};

    /// One page, every line shown with its own `Tj` inside a single `BT` block.
    fn one_block_pdf(lines: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 760.into()]),
        ];
        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                operations.push(Operation::new("Td", vec![0.into(), (-16).into()]));
            }
            operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
        }
        operations.push(Operation::new("ET", vec![]));
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_decoded_slip_keeps_lines() {
        let pdf = one_block_pdf(&[
            "PACKING LIST",
            "Ship To:",
            "DEPOT 9",
            "000123456789",
            "03/14/2024",
            "Costco Item",
            "Description",
            "11464583",
            "WIDGET PRO",
        ]);
        let pages = PdfTextDecoder.decode(&pdf).unwrap();
        let text = document_text(&pages);
        assert!(text.lines().any(|l| l.trim() == "000123456789"), "{text:?}");

        let records = heuristics::extract_document(&text);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.purchase_order.as_deref(), Some("000123456789"));
        assert_eq!(record.item_numbers, vec!["1464583"]);
        assert_eq!(record.quantities, vec!["1"]);
        assert_eq!(record.order_date.as_deref(), Some("03/14/2024"));
        assert_eq!(record.ship_to.as_deref(), Some("DEPOT 9"));
    }

    #[test]
    fn test_garbage_bytes() {
        let result = PdfTextDecoder.decode(b"this is not a pdf");
        assert!(matches!(result, Err(DecodeError::Parse(_))));
    }

    #[test]
    fn test_document_text_joins_pages() {
        let pages = vec![
            PageText {
                fragments: vec!["PACKING LIST".into(), "12345678".into()],
            },
            PageText {
                fragments: vec!["Description".into()],
            },
        ];
        assert_eq!(document_text(&pages), "PACKING LIST\n12345678\nDescription\n");
        assert_eq!(document_text(&[]), "");
    }

    #[test]
    fn test_page_from_text_keeps_blank_fragments() {
        let page = PageText::from_text("a\n\nb");
        assert_eq!(page.fragments, vec!["a", "", "b"]);
        assert_eq!(page.meaningful_chars(), 2);
    }
}
