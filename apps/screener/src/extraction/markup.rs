//! Plain-text and markup extraction: strip tags, decode entities, collapse
//! whitespace. No network tier is needed for these types.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use crate::extraction::strategy::{ExtractedText, ExtractionStrategy};
use crate::extraction::{
    normalize_whitespace, CandidateDocument, ExtractionError, ExtractionMethod,
};

pub struct PlainTextStrategy;

#[async_trait]
impl ExtractionStrategy for PlainTextStrategy {
    fn name(&self) -> &'static str {
        "plain_text"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Direct
    }

    async fn extract(&self, doc: &CandidateDocument) -> Result<ExtractedText, ExtractionError> {
        let raw = String::from_utf8_lossy(&doc.bytes);
        let text = normalize_whitespace(raw.trim_start_matches('\u{feff}'));
        if text.is_empty() {
            return Err(ExtractionError::Empty);
        }
        Ok(ExtractedText { text, pages: None })
    }
}

pub struct MarkupStrategy;

#[async_trait]
impl ExtractionStrategy for MarkupStrategy {
    fn name(&self) -> &'static str {
        "markup"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Direct
    }

    async fn extract(&self, doc: &CandidateDocument) -> Result<ExtractedText, ExtractionError> {
        let text = strip_markup(&String::from_utf8_lossy(&doc.bytes));
        if text.is_empty() {
            return Err(ExtractionError::Empty);
        }
        Ok(ExtractedText { text, pages: None })
    }
}

fn invisible_blocks() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<!--.*?-->|<script\b.*?</script\s*>|<style\b.*?</style\s*>|<head\b.*?</head\s*>")
            .expect("valid regex")
    })
}

fn block_boundaries() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)<br\s*/?>|</?(p|div|li|ul|ol|tr|table|section|article|h[1-6]|header|footer|blockquote|pre)\b[^>]*>")
            .expect("valid regex")
    })
}

fn any_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid regex"))
}

fn entity() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});").expect("valid regex"))
}

/// Removes scripts, styles and comments, turns block-level tags into line breaks,
/// drops every other tag, decodes entities and collapses whitespace. Blank lines
/// carry no meaning in markup and are dropped.
pub fn strip_markup(html: &str) -> String {
    let without_invisible = invisible_blocks().replace_all(html, " ");
    let with_breaks = block_boundaries().replace_all(&without_invisible, "\n");
    let without_tags = any_tag().replace_all(&with_breaks, " ");
    normalize_whitespace(&decode_entities(&without_tags))
        .lines()
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decodes numeric entities and the named entities that show up in CVs.
/// Unknown entities are left as written.
pub fn decode_entities(text: &str) -> String {
    entity()
        .replace_all(text, |caps: &regex::Captures| {
            let name = &caps[1];
            let decoded = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                named_entity(name)
            };
            decoded.map(String::from).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "ndash" => '–',
        "mdash" => '—',
        "bull" => '•',
        "middot" => '·',
        "hellip" => '…',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        "eacute" => 'é',
        "egrave" => 'è',
        "uuml" => 'ü',
        "ouml" => 'ö',
        "auml" => 'ä',
        _ => return None,
    };
    Some(c)
}
