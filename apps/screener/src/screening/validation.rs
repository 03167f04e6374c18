use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::extraction::is_extraction_failure;

/// Verdict on whether extracted text is worth sending to the scoring provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub valid: bool,
    pub reason: Option<String>,
    pub warning: Option<String>,
}

impl ValidationVerdict {
    fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
            warning: None,
        }
    }

    fn invalid(reason: String) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            warning: None,
        }
    }

    fn warn(warning: String) -> Self {
        Self {
            valid: true,
            reason: None,
            warning: Some(warning),
        }
    }
}

const EXPERIENCE_TERMS: &[&str] = &[
    "experience",
    "employment",
    "work history",
    "professional background",
    "responsibilities",
    "worked",
    "managed",
    "developed",
    "engineer",
    "developer",
    "manager",
    "intern",
];

const SKILLS_TERMS: &[&str] = &[
    "skills",
    "proficient",
    "proficiency",
    "technologies",
    "tools",
    "competencies",
    "expertise",
    "languages",
    "frameworks",
    "certified",
];

const EDUCATION_TERMS: &[&str] = &[
    "education",
    "university",
    "college",
    "degree",
    "bachelor",
    "master",
    "phd",
    "diploma",
    "b.sc",
    "m.sc",
    "bsc",
    "msc",
    "graduated",
    "school",
];

const CONTACT_TERMS: &[&str] = &["email", "e-mail", "phone", "mobile", "linkedin", "github.com", "address"];

/// Categories a CV normally covers. Fewer than this many present earns a warning.
const MIN_CATEGORIES: usize = 2;

fn email_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\w.+-]+@[\w-]+\.[\w.-]+").expect("valid regex"))
}

fn phone_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\+?\d[\d\s().-]{7,}\d").expect("valid regex"))
}

/// Cheap heuristic gate in front of the scoring provider.
#[derive(Debug, Clone)]
pub struct ContentValidator {
    /// Texts shorter than this (in characters, after trimming) are rejected.
    pub min_chars: usize,
}

impl Default for ContentValidator {
    fn default() -> Self {
        Self { min_chars: 200 }
    }
}

impl ContentValidator {
    pub fn new(min_chars: usize) -> Self {
        Self { min_chars }
    }

    /// Checks, in order:
    /// 1. the extraction failure sentinel → invalid
    /// 2. fewer than `min_chars` characters → invalid
    /// 3. fewer than two of experience / skills / education / contact signals →
    ///    valid with a warning
    pub fn validate(&self, text: &str, filename: &str) -> ValidationVerdict {
        if is_extraction_failure(text) {
            return ValidationVerdict::invalid(format!(
                "Extraction failed for '{filename}': the file could not be read. \
                 Please re-enter the CV text manually."
            ));
        }

        let length = text.trim().chars().count();
        if length < self.min_chars {
            return ValidationVerdict::invalid(format!(
                "Insufficient content in '{filename}': only {length} characters extracted \
                 (minimum {}).",
                self.min_chars
            ));
        }

        let present = present_categories(text);
        if present.len() < MIN_CATEGORIES {
            return ValidationVerdict::warn(format!(
                "'{filename}' may not be a complete CV: found {} of 4 expected sections{}.",
                present.len(),
                if present.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", present.join(", "))
                }
            ));
        }

        ValidationVerdict::valid()
    }
}

fn present_categories(text: &str) -> Vec<&'static str> {
    let lower = text.to_lowercase();
    let has_any = |terms: &[&str]| terms.iter().any(|t| lower.contains(t));

    let mut present = Vec::new();
    if has_any(EXPERIENCE_TERMS) {
        present.push("experience");
    }
    if has_any(SKILLS_TERMS) {
        present.push("skills");
    }
    if has_any(EDUCATION_TERMS) {
        present.push("education");
    }
    if has_any(CONTACT_TERMS) || email_pattern().is_match(text) || phone_pattern().is_match(text) {
        present.push("contact");
    }
    present
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::failure_sentinel;

    const FULL_CV: &str = "Jane Doe — jane.doe@example.com — +44 20 7946 0958\n\
        EXPERIENCE\nSenior Backend Engineer, Acme Corp (2019 – present). Built Go services \
        on Kubernetes handling 20k requests per second.\n\
        SKILLS\nGo, Rust, Kubernetes, PostgreSQL, Terraform\n\
        EDUCATION\nBSc Computer Science, University of Leeds";

    fn padded(text: &str) -> String {
        format!("{text} {}", "lorem ipsum dolor sit amet ".repeat(10))
    }

    #[test]
    fn test_sentinel_rejected_before_length_check() {
        let v = ContentValidator::default().validate(&failure_sentinel("scan.pdf", "scanned"), "scan.pdf");
        assert!(!v.valid);
        assert!(v.reason.unwrap().starts_with("Extraction failed"));
    }

    #[test]
    fn test_short_text_rejected() {
        let v = ContentValidator::default().validate("Jane Doe, engineer", "cv.txt");
        assert!(!v.valid);
        let reason = v.reason.unwrap();
        assert!(reason.starts_with("Insufficient content"));
        assert!(reason.contains("18 characters"));
    }

    #[test]
    fn test_full_cv_is_valid_without_warning() {
        let v = ContentValidator::default().validate(FULL_CV, "cv.txt");
        assert_eq!(v, ValidationVerdict::valid());
    }

    #[test]
    fn test_single_category_warns() {
        let text = padded("My education: university of somewhere.");
        let v = ContentValidator::default().validate(&text, "essay.txt");
        assert!(v.valid);
        assert!(v.warning.unwrap().contains("may not be a complete CV"));
    }

    #[test]
    fn test_no_categories_warns() {
        let v = ContentValidator::default().validate(&padded("Once upon a time"), "story.txt");
        assert!(v.valid);
        assert!(v.warning.is_some());
    }

    #[test]
    fn test_contact_detected_by_email_pattern() {
        assert!(present_categories("reach me at jd@mail.io").contains(&"contact"));
        assert!(present_categories("call +1 (555) 010-9999").contains(&"contact"));
        assert!(!present_categories("version 1.2").contains(&"contact"));
    }

    #[test]
    fn test_custom_minimum() {
        let v = ContentValidator::new(10).validate("Skills: Go. Education: BSc.", "cv.txt");
        assert!(v.valid);
        assert!(v.warning.is_none());
    }
}
