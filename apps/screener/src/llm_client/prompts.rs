// Shared prompt constants and prompt-building utilities.
// Each service that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// Fixed instruction for vision-based text extraction of scanned CVs.
pub const OCR_SYSTEM: &str = "You are an OCR engine for CVs and resumes. \
    Return only the text content of the document, preserving reading order and line breaks. \
    Do NOT summarise, translate, comment or add headings of your own.";

pub const OCR_PROMPT: &str = "Extract all text from this CV document. \
    Return clean CV text only, nothing else.";
