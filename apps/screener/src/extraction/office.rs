//! Crude office-document extraction, used after (or instead of) the conversion
//! service.
//!
//! `.docx`: read `word/document.xml` out of the zip container, turn paragraph and
//! break elements into newlines and strip the remaining XML. A file that is not a
//! zip is only accepted as flat WordprocessingML text; anything else is corrupt.
//! `.doc`: the binary format is not parsed; printable runs are scanned out of the
//! byte stream as both 8-bit and UTF-16LE text and the longer result is kept.

use std::io::{Cursor, Read};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use zip::ZipArchive;

use crate::extraction::markup::decode_entities;
use crate::extraction::strategy::{quality_of, ExtractedText, ExtractionStrategy};
use crate::extraction::{
    normalize_whitespace, CandidateDocument, DocumentType, ExtractionError, ExtractionMethod,
};

/// Printable runs shorter than this are binary noise, not words.
const MIN_RUN_CHARS: usize = 4;
/// Upper bound on the decompressed size of `word/document.xml`.
const MAX_DOCUMENT_XML_BYTES: u64 = 20 * 1024 * 1024;

pub struct OfficeStripStrategy;

#[async_trait]
impl ExtractionStrategy for OfficeStripStrategy {
    fn name(&self) -> &'static str {
        "office_strip"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Fallback
    }

    async fn extract(&self, doc: &CandidateDocument) -> Result<ExtractedText, ExtractionError> {
        let bytes = doc.bytes.clone();
        let doc_type = doc.doc_type;
        let text = tokio::task::spawn_blocking(move || match doc_type {
            DocumentType::Docx => {
                docx_text(&bytes).or_else(|e| flat_ooxml_text(&bytes).ok_or(e))
            }
            _ => Ok(legacy_doc_text(&bytes)),
        })
        .await
        .map_err(|e| ExtractionError::Corrupt(format!("office extraction task failed: {e}")))??;

        if text.is_empty() {
            return Err(ExtractionError::Empty);
        }
        Ok(ExtractedText { text, pages: None })
    }
}

fn ooxml_breaks() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"</w:p>|<w:br\s*/>|<w:cr\s*/>").expect("valid regex"))
}

fn ooxml_tabs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<w:tab\s*/>").expect("valid regex"))
}

fn xml_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid regex"))
}

/// Extracts paragraph text from a `.docx` container.
pub fn docx_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    docx_text_within(bytes, MAX_DOCUMENT_XML_BYTES)
}

fn docx_text_within(bytes: &[u8], limit: u64) -> Result<String, ExtractionError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExtractionError::Corrupt(format!("invalid docx container: {e}")))?;

    let mut entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractionError::Corrupt(format!("docx has no document body: {e}")))?;
    if entry.size() > limit {
        return Err(ExtractionError::Corrupt(format!(
            "docx body expands to {} bytes, over the {limit} byte limit",
            entry.size()
        )));
    }

    // the declared size can lie, so the read itself is bounded too
    let mut xml = String::new();
    (&mut entry)
        .take(limit + 1)
        .read_to_string(&mut xml)
        .map_err(|e| ExtractionError::Corrupt(format!("docx body unreadable: {e}")))?;
    if xml.len() as u64 > limit {
        return Err(ExtractionError::Corrupt(format!(
            "docx body exceeds the {limit} byte limit"
        )));
    }

    Ok(ooxml_to_text(&xml))
}

/// Flat WordprocessingML saved with a `.docx` name: UTF-8 text carrying `<w:`
/// elements. Binary content returns `None`.
fn flat_ooxml_text(bytes: &[u8]) -> Option<String> {
    std::str::from_utf8(bytes)
        .ok()
        .filter(|xml| xml.contains("<w:"))
        .map(ooxml_to_text)
}

fn ooxml_to_text(xml: &str) -> String {
    let with_breaks = ooxml_breaks().replace_all(xml, "\n");
    let with_tabs = ooxml_tabs().replace_all(&with_breaks, " ");
    let without_tags = xml_tag().replace_all(&with_tabs, "");
    normalize_whitespace(&decode_entities(&without_tags))
}

/// Scans a legacy binary document for readable text.
pub fn legacy_doc_text(bytes: &[u8]) -> String {
    let narrow = printable_runs(bytes.iter().map(|&b| b as u16));
    let wide = printable_runs(
        bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]])),
    );
    if quality_of(&wide) > quality_of(&narrow) {
        wide
    } else {
        narrow
    }
}

fn printable_runs(units: impl Iterator<Item = u16>) -> String {
    let mut out = String::new();
    let mut run = String::new();

    for unit in units {
        match char::from_u32(u32::from(unit)) {
            Some(c) if c == ' ' || c == '\t' || is_text_char(c) => run.push(c),
            _ => flush_run(&mut run, &mut out),
        }
    }
    flush_run(&mut run, &mut out);

    normalize_whitespace(&out)
}

fn flush_run(run: &mut String, out: &mut String) {
    let trimmed = run.trim();
    if trimmed.chars().count() >= MIN_RUN_CHARS {
        out.push_str(trimmed);
        out.push('\n');
    }
    run.clear();
}

fn is_text_char(c: char) -> bool {
    c.is_alphanumeric() || c.is_ascii_punctuation() || matches!(c, '•' | '–' | '—' | '’' | '“' | '”')
}
