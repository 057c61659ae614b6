//! File-type detection and raw text extraction for uploaded documents.
//!
//! Supported formats: PDF (per page, via `pdf-extract`), DOCX (paragraph
//! runs from `word/document.xml`, via `zip` + `quick-xml`), and plain text
//! (UTF-8 with a Latin-1 fallback).
//!
//! Extraction returns a sequence of pages so the chunker can attach page
//! numbers to PDF chunks. DOCX and TXT content is a single unnumbered page.

use std::io::Read;

use crate::error::IngestError;
use crate::models::FileType;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb
/// protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Detect the document type from the filename extension.
pub fn detect_file_type(filename: &str) -> Result<FileType, IngestError> {
    let extension = filename
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    match extension.as_str() {
        "pdf" => Ok(FileType::Pdf),
        "docx" => Ok(FileType::Docx),
        "txt" => Ok(FileType::Txt),
        _ => Err(IngestError::UnsupportedType { extension }),
    }
}

/// Extract raw text as `(page_number, text)` pairs.
///
/// Fails with [`IngestError::ExtractionFailed`] when the document cannot be
/// parsed or yields no non-whitespace text at all. Individual blank pages
/// are kept; the chunker skips them.
pub fn extract_pages(
    bytes: &[u8],
    file_type: FileType,
) -> Result<Vec<(Option<u32>, String)>, IngestError> {
    let pages = match file_type {
        FileType::Pdf => extract_pdf(bytes)?,
        FileType::Docx => vec![(None, extract_docx(bytes)?)],
        FileType::Txt => vec![(None, extract_txt(bytes)?)],
    };

    if pages.iter().all(|(_, text)| text.trim().is_empty()) {
        return Err(IngestError::ExtractionFailed(format!(
            "no text could be extracted from {} content",
            file_type
        )));
    }

    Ok(pages)
}

fn extract_pdf(bytes: &[u8]) -> Result<Vec<(Option<u32>, String)>, IngestError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| IngestError::ExtractionFailed(format!("PDF: {}", e)))?;
    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(i, text)| (Some(i as u32 + 1), text))
        .collect())
}

fn extract_docx(bytes: &[u8]) -> Result<String, IngestError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| IngestError::ExtractionFailed(format!("DOCX: {}", e)))?;

    let mut doc_xml = Vec::new();
    {
        let entry = archive
            .by_name("word/document.xml")
            .map_err(|_| IngestError::ExtractionFailed("DOCX: word/document.xml not found".into()))?;
        entry
            .take(MAX_XML_ENTRY_BYTES)
            .read_to_end(&mut doc_xml)
            .map_err(|e| IngestError::ExtractionFailed(format!("DOCX: {}", e)))?;
        if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
            return Err(IngestError::ExtractionFailed(
                "DOCX: word/document.xml exceeds size limit".into(),
            ));
        }
    }

    extract_paragraph_text(&doc_xml)
}

/// Pull the text runs (`w:t`) out of a DOCX body, one line per paragraph
/// (`w:p`). Run text is kept verbatim: runs routinely start or end with a
/// space when Word splits a sentence across runs. Only the assembled
/// paragraph is trimmed.
fn extract_paragraph_text(xml: &[u8]) -> Result<String, IngestError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut paragraph = String::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        paragraph.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"p" && !paragraph.trim().is_empty() {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(paragraph.trim());
                    paragraph.clear();
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(IngestError::ExtractionFailed(format!("DOCX: {}", e))),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// Decode plain text as UTF-8, falling back to Latin-1 for legacy files.
fn extract_txt(bytes: &[u8]) -> Result<String, IngestError> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(text.to_string()),
        // Latin-1 maps every byte to the code point of the same value.
        Err(_) => Ok(bytes.iter().map(|&b| b as char).collect()),
    }
}
