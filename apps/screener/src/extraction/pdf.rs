//! Direct PDF text extraction.
//!
//! Two local strategies run side by side and the selector keeps the longer text:
//! - `PdfExtractStrategy` delegates to `pdf-extract`, which understands font
//!   encodings but sometimes loses line structure. It is registered first, so it
//!   wins ties.
//! - `PdfLayoutStrategy` walks each page's content stream, records every text
//!   fragment with its position and rebuilds lines from vertical jumps. It only
//!   handles simple fonts and declines documents whose fonts need a ToUnicode map,
//!   a Differences array or CID tables.
//!
//! Both are CPU-bound and run inside `tokio::task::spawn_blocking`; a panic inside
//! a PDF parser surfaces as a join error instead of taking the worker down.

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object};
use tracing::debug;

use crate::extraction::strategy::{ExtractedText, ExtractionStrategy};
use crate::extraction::{
    normalize_whitespace, CandidateDocument, ExtractionError, ExtractionMethod,
};

/// Vertical movement, as a fraction of the font size, that starts a new line.
const LINE_BREAK_FACTOR: f64 = 0.5;
/// Vertical movement, as a multiple of the font size, that starts a new paragraph.
const PARAGRAPH_FACTOR: f64 = 1.8;
/// TJ adjustments (thousandths of an em) more negative than this are word gaps.
const TJ_SPACE_THRESHOLD: f64 = -250.0;
/// Average glyph width as a fraction of the font size, used to estimate where a
/// fragment ends.
const AVG_GLYPH_WIDTH: f64 = 0.5;
/// Share of undecodable bytes above which the layout result is rejected.
const MAX_UNDECODABLE_RATIO: f64 = 0.3;

/// One run of text drawn by a single text-showing operator.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub page: u32,
    pub x: f64,
    pub y: f64,
    /// Estimated x where the fragment ends.
    pub end_x: f64,
    pub font_size: f64,
    pub text: String,
}

pub struct PdfLayoutStrategy;

#[async_trait]
impl ExtractionStrategy for PdfLayoutStrategy {
    fn name(&self) -> &'static str {
        "pdf_layout"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Direct
    }

    async fn extract(&self, doc: &CandidateDocument) -> Result<ExtractedText, ExtractionError> {
        let bytes = doc.bytes.clone();
        tokio::task::spawn_blocking(move || layout_text(&bytes))
            .await
            .map_err(|e| ExtractionError::Corrupt(format!("PDF layout task failed: {e}")))?
    }
}

pub struct PdfExtractStrategy;

#[async_trait]
impl ExtractionStrategy for PdfExtractStrategy {
    fn name(&self) -> &'static str {
        "pdf_extract"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Direct
    }

    async fn extract(&self, doc: &CandidateDocument) -> Result<ExtractedText, ExtractionError> {
        let bytes = doc.bytes.clone();
        let raw = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| ExtractionError::Corrupt(format!("pdf-extract task failed: {e}")))?
            .map_err(|e| ExtractionError::Corrupt(format!("{e:?}")))?;

        let text = normalize_whitespace(&raw);
        if text.is_empty() {
            return Err(ExtractionError::Empty);
        }
        Ok(ExtractedText { text, pages: None })
    }
}

/// Loads the PDF, walks every page and rebuilds the text from positioned fragments.
pub fn layout_text(bytes: &[u8]) -> Result<ExtractedText, ExtractionError> {
    let document =
        Document::load_mem(bytes).map_err(|e| ExtractionError::Corrupt(e.to_string()))?;
    if document.is_encrypted() {
        return Err(ExtractionError::Encrypted);
    }

    let pages = document.get_pages();
    for (page_number, page_id) in &pages {
        if let Some(name) = document
            .get_page_fonts(*page_id)
            .into_iter()
            .find_map(|(name, font)| needs_font_tables(font).then_some(name))
        {
            return Err(ExtractionError::Corrupt(format!(
                "page {page_number}: font {} needs font tables to decode",
                String::from_utf8_lossy(&name)
            )));
        }
    }

    let mut fragments = Vec::new();
    let mut stats = DecodeStats::default();

    for (page_number, page_id) in &pages {
        let raw = match document.get_page_content(*page_id) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("page {page_number}: unreadable content stream: {e}");
                continue;
            }
        };
        match Content::decode(&raw) {
            Ok(content) => fragments.extend(fragments_from_operations(
                *page_number,
                &content.operations,
                &mut stats,
            )),
            Err(e) => debug!("page {page_number}: content stream did not decode: {e}"),
        }
    }

    if stats.total > 0 && stats.undecodable as f64 / stats.total as f64 > MAX_UNDECODABLE_RATIO {
        return Err(ExtractionError::Corrupt(format!(
            "{} of {} text bytes use a font encoding that needs font tables",
            stats.undecodable, stats.total
        )));
    }

    let text = assemble_lines(&fragments);
    if text.is_empty() {
        return Err(ExtractionError::Empty);
    }

    Ok(ExtractedText {
        text,
        pages: Some(pages.len() as u32),
    })
}

/// Composite fonts and fonts with their own code-to-character mapping can't be
/// decoded byte by byte.
fn needs_font_tables(font: &Dictionary) -> bool {
    let composite = font
        .get(b"Subtype")
        .and_then(Object::as_name)
        .is_ok_and(|subtype| subtype == b"Type0");
    let custom_encoding = font
        .get(b"Encoding")
        .is_ok_and(|encoding| encoding.as_name().is_err());
    composite || custom_encoding || font.has(b"ToUnicode")
}

/// Joins fragments in drawing order. A vertical jump larger than half the font size
/// starts a new line, a large one a new paragraph, and a horizontal gap on the same
/// line becomes a space.
pub fn assemble_lines(fragments: &[TextFragment]) -> String {
    let mut out = String::new();
    let mut previous: Option<&TextFragment> = None;

    for fragment in fragments.iter().filter(|f| !f.text.is_empty()) {
        if let Some(prev) = previous {
            let line_height = prev.font_size.max(fragment.font_size).max(1.0);
            let dy = (fragment.y - prev.y).abs();

            if fragment.page != prev.page {
                out.push_str("\n\n");
            } else if dy > line_height * LINE_BREAK_FACTOR {
                out.push('\n');
                if dy > line_height * PARAGRAPH_FACTOR {
                    out.push('\n');
                }
            } else if fragment.x - prev.end_x > line_height * 0.2
                && !out.ends_with(char::is_whitespace)
                && !fragment.text.starts_with(char::is_whitespace)
            {
                out.push(' ');
            }
        }
        out.push_str(&fragment.text);
        previous = Some(fragment);
    }

    normalize_whitespace(&out)
}

#[derive(Debug, Default)]
struct DecodeStats {
    total: usize,
    undecodable: usize,
}

/// Text-space state tracked while walking a content stream.
struct TextState {
    /// Text matrix [a b c d e f].
    tm: [f64; 6],
    /// Text line matrix.
    tlm: [f64; 6],
    font_size: f64,
    leading: f64,
}

const IDENTITY: [f64; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

impl TextState {
    fn new() -> Self {
        Self {
            tm: IDENTITY,
            tlm: IDENTITY,
            font_size: 12.0,
            leading: 0.0,
        }
    }

    fn move_line(&mut self, tx: f64, ty: f64) {
        let [a, b, c, d, e, f] = self.tlm;
        self.tlm = [a, b, c, d, e + tx * a + ty * c, f + tx * b + ty * d];
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        let leading = self.leading;
        self.move_line(0.0, -leading);
    }

    fn effective_font_size(&self) -> f64 {
        let scale = self.tm[2].hypot(self.tm[3]);
        let scale = if scale > 0.0 { scale } else { 1.0 };
        (self.font_size * scale).abs()
    }

    /// Records a fragment at the current position and advances past it.
    fn show(&mut self, page: u32, text: String) -> TextFragment {
        let size = self.effective_font_size();
        let x = self.tm[4];
        let width = text.chars().count() as f64 * size * AVG_GLYPH_WIDTH;
        self.tm[4] += width;
        TextFragment {
            page,
            x,
            y: self.tm[5],
            end_x: x + width,
            font_size: size,
            text,
        }
    }
}

fn fragments_from_operations(
    page: u32,
    operations: &[Operation],
    stats: &mut DecodeStats,
) -> Vec<TextFragment> {
    let mut state = TextState::new();
    let mut fragments = Vec::new();

    for op in operations {
        let operands = &op.operands;
        match op.operator.as_str() {
            "BT" => {
                state.tm = IDENTITY;
                state.tlm = IDENTITY;
            }
            "Tf" => {
                if let Some(size) = operands.get(1).and_then(as_number) {
                    state.font_size = size;
                }
            }
            "TL" => {
                if let Some(leading) = operands.first().and_then(as_number) {
                    state.leading = leading;
                }
            }
            "Td" | "TD" => {
                let tx = operands.first().and_then(as_number).unwrap_or(0.0);
                let ty = operands.get(1).and_then(as_number).unwrap_or(0.0);
                if op.operator == "TD" {
                    state.leading = -ty;
                }
                state.move_line(tx, ty);
            }
            "Tm" => {
                let values: Vec<f64> = operands.iter().filter_map(as_number).collect();
                if let [a, b, c, d, e, f] = values[..] {
                    state.tlm = [a, b, c, d, e, f];
                    state.tm = state.tlm;
                }
            }
            "T*" => state.next_line(),
            "Tj" | "'" | "\"" => {
                if op.operator != "Tj" {
                    state.next_line();
                }
                // `"` carries word and character spacing before the string
                if let Some(bytes) = operands.iter().rev().find_map(as_string_bytes) {
                    let text = decode_pdf_string(bytes, stats);
                    fragments.push(state.show(page, text));
                }
            }
            "TJ" => {
                let Some(Object::Array(items)) = operands.first() else {
                    continue;
                };
                let mut text = String::new();
                for item in items {
                    if let Some(bytes) = as_string_bytes(item) {
                        text.push_str(&decode_pdf_string(bytes, stats));
                    } else if as_number(item).is_some_and(|n| n < TJ_SPACE_THRESHOLD) {
                        text.push(' ');
                    }
                }
                fragments.push(state.show(page, text));
            }
            _ => {}
        }
    }

    fragments
}

fn as_number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

fn as_string_bytes(obj: &Object) -> Option<&[u8]> {
    match obj {
        Object::String(bytes, _) => Some(bytes.as_slice()),
        _ => None,
    }
}

/// Decodes a PDF string without font tables: UTF-16BE when it carries a BOM,
/// Latin-1 otherwise. Control bytes are dropped and counted.
fn decode_pdf_string(bytes: &[u8], stats: &mut DecodeStats) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        stats.total += units.len();
        return String::from_utf16_lossy(&units);
    }

    let mut text = String::with_capacity(bytes.len());
    for &b in bytes {
        stats.total += 1;
        match b {
            b'\t' => text.push(' '),
            // WinAnsi punctuation commonly found in CVs
            0x91 | 0x92 => text.push('\''),
            0x93 | 0x94 => text.push('"'),
            0x95 => text.push('•'),
            0x96 | 0x97 => text.push('-'),
            0x00..=0x1F | 0x7F..=0x9F => stats.undecodable += 1,
            _ => text.push(b as char),
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Stream, StringFormat};

    fn fragment(page: u32, x: f64, y: f64, text: &str) -> TextFragment {
        TextFragment {
            page,
            x,
            y,
            end_x: x + text.len() as f64 * 6.0,
            font_size: 12.0,
            text: text.to_string(),
        }
    }

    fn literal(text: &str) -> Object {
        Object::String(text.as_bytes().to_vec(), StringFormat::Literal)
    }

    #[test]
    fn test_vertical_jump_starts_new_line() {
        let fragments = vec![
            fragment(1, 72.0, 700.0, "Jane Doe"),
            fragment(1, 72.0, 686.0, "Backend Engineer"),
        ];
        assert_eq!(assemble_lines(&fragments), "Jane Doe\nBackend Engineer");
    }

    #[test]
    fn test_large_gap_starts_paragraph() {
        let fragments = vec![
            fragment(1, 72.0, 700.0, "Jane Doe"),
            fragment(1, 72.0, 650.0, "EXPERIENCE"),
        ];
        assert_eq!(assemble_lines(&fragments), "Jane Doe\n\nEXPERIENCE");
    }

    #[test]
    fn test_same_line_fragments_joined_with_space_on_gap() {
        let fragments = vec![
            fragment(1, 72.0, 700.0, "Skills:"),
            fragment(1, 130.0, 700.5, "Go"),
            fragment(1, 142.0, 700.0, ","),
        ];
        assert_eq!(assemble_lines(&fragments), "Skills: Go,");
    }

    #[test]
    fn test_page_change_separates_paragraphs() {
        let fragments = vec![fragment(1, 72.0, 100.0, "page one"), fragment(2, 72.0, 700.0, "page two")];
        assert_eq!(assemble_lines(&fragments), "page one\n\npage two");
    }

    #[test]
    fn test_decode_latin1_and_utf16() {
        let mut stats = DecodeStats::default();
        assert_eq!(decode_pdf_string(b"Caf\xe9", &mut stats), "Café");
        assert_eq!(
            decode_pdf_string(&[0xFE, 0xFF, 0x00, 0x47, 0x00, 0x6F], &mut stats),
            "Go"
        );
        assert_eq!(stats.undecodable, 0);
    }

    #[test]
    fn test_decode_counts_control_bytes() {
        let mut stats = DecodeStats::default();
        let text = decode_pdf_string(&[0x00, 0x2C, 0x00, 0x33], &mut stats);
        assert_eq!(text, ",3");
        assert_eq!(stats.undecodable, 2);
        assert_eq!(stats.total, 4);
    }

    #[test]
    fn test_operations_track_positions() {
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
            Operation::new("Td", vec![Object::Integer(72), Object::Integer(700)]),
            Operation::new("Tj", vec![literal("Jane Doe")]),
            Operation::new("TL", vec![Object::Integer(14)]),
            Operation::new("T*", vec![]),
            Operation::new(
                "TJ",
                vec![Object::Array(vec![
                    literal("Go"),
                    Object::Integer(-400),
                    literal("Kubernetes"),
                ])],
            ),
            Operation::new("ET", vec![]),
        ];
        let mut stats = DecodeStats::default();
        let fragments = fragments_from_operations(1, &ops, &mut stats);

        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].y, 700.0);
        assert_eq!(fragments[1].y, 686.0);
        assert_eq!(fragments[1].x, 72.0);
        assert_eq!(fragments[1].text, "Go Kubernetes");
        assert_eq!(assemble_lines(&fragments), "Jane Doe\nGo Kubernetes");
    }

    fn generated_pdf(font: Dictionary) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(font);
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
                Operation::new("Td", vec![Object::Integer(72), Object::Integer(720)]),
                Operation::new("Tj", vec![literal("Jane Doe")]),
                Operation::new("Td", vec![Object::Integer(0), Object::Integer(-14)]),
                Operation::new("Tj", vec![literal("Senior Backend Engineer")]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
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
    fn test_layout_text_reads_generated_pdf() {
        let bytes = generated_pdf(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });

        let extracted = layout_text(&bytes).unwrap();
        assert_eq!(extracted.text, "Jane Doe\nSenior Backend Engineer");
        assert_eq!(extracted.pages, Some(1));
    }

    #[test]
    fn test_layout_declines_fonts_with_custom_encodings() {
        let differences = generated_pdf(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Custom",
            "Encoding" => dictionary! {
                "Type" => "Encoding",
                "Differences" => vec![Object::Integer(65), Object::Name(b"Z".to_vec())],
            },
        });
        let composite = generated_pdf(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => "Custom",
        });
        let mapped = generated_pdf(dictionary! {
            "Type" => "Font",
            "Subtype" => "TrueType",
            "BaseFont" => "Custom",
            "ToUnicode" => Object::Null,
        });

        for bytes in [differences, composite, mapped] {
            assert!(matches!(
                layout_text(&bytes),
                Err(ExtractionError::Corrupt(msg)) if msg.contains("F1")
            ));
        }
    }

    #[test]
    fn test_layout_text_rejects_garbage() {
        assert!(matches!(
            layout_text(b"definitely not a pdf"),
            Err(ExtractionError::Corrupt(_))
        ));
    }
}
