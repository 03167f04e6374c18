// Screening LLM prompt templates.
// All prompts for the screening module are defined here.

pub const SCORING_SYSTEM: &str = "\
You are a rigorous technical recruiter screening CVs against a job description. \
Score only on evidence present in the CV; never assume skills that are not stated. \
A required skill the CV does not demonstrate belongs in missing_skills. \
You MUST respond with valid JSON only — no markdown fences, no explanations.";

pub const SCORING_PROMPT: &str = r#"Evaluate the candidate below against the job description.

JOB DESCRIPTION:
{job_description}

CANDIDATE CV:
{candidate_text}

OUTPUT SCHEMA (return exactly this structure):
{
  "score": number,                     // 0 - 100, equal to the sum of the breakdown
  "recommendation": "interview" | "maybe" | "pass",
  "summary": "string",                 // two or three sentences
  "matched_skills": ["string"],         // required skills clearly demonstrated
  "missing_skills": ["string"],         // required skills not demonstrated at all
  "partial_skills": ["string"],         // required skills with adjacent or shallow evidence
  "concerns": ["string"],
  "interview_questions": ["string"],    // three to five, targeted at gaps and concerns
  "years_experience": number,
  "confidence": number,                 // 0.0 - 1.0
  "breakdown": {
    "technical": number,                // out of 35
    "experience": number,               // out of 25
    "education": number,                // out of 15
    "career_progression": number,       // out of 15
    "communication": number             // out of 10
  }
}

RULES:
- Required skills come from the job description, not from your own expectations.
- Do not penalise missing nice-to-have skills as heavily as missing required ones.
- Return ONLY the JSON object."#;

pub const BATCH_SCORING_PROMPT: &str = r#"Evaluate EACH candidate below independently against the job description.

JOB DESCRIPTION:
{job_description}

CANDIDATES:
{candidates}

Return a JSON array with exactly one object per candidate. Each object has the
structure below, where candidate_index is the number shown in the candidate's header:
{
  "candidate_index": number,
  "score": number,                     // 0 - 100, equal to the sum of the breakdown
  "recommendation": "interview" | "maybe" | "pass",
  "summary": "string",
  "matched_skills": ["string"],
  "missing_skills": ["string"],
  "partial_skills": ["string"],
  "concerns": ["string"],
  "interview_questions": ["string"],
  "years_experience": number,
  "confidence": number,                 // 0.0 - 1.0
  "breakdown": {
    "technical": number,                // out of 35
    "experience": number,               // out of 25
    "education": number,                // out of 15
    "career_progression": number,       // out of 15
    "communication": number             // out of 10
  }
}

RULES:
- Never compare candidates with each other; score each on its own evidence.
- Return ONLY the JSON array."#;

/// Fills the single-candidate template.
pub fn scoring_prompt(job_description: &str, candidate_text: &str) -> String {
    SCORING_PROMPT
        .replace("{job_description}", job_description)
        .replace("{candidate_text}", candidate_text)
}

/// Fills the aggregated template. Candidates are numbered from 1.
pub fn batch_scoring_prompt(job_description: &str, candidate_texts: &[String]) -> String {
    let candidates = candidate_texts
        .iter()
        .enumerate()
        .map(|(i, text)| format!("=== CANDIDATE {} ===\n{}", i + 1, text))
        .collect::<Vec<_>>()
        .join("\n\n");
    BATCH_SCORING_PROMPT
        .replace("{job_description}", job_description)
        .replace("{candidates}", &candidates)
}
