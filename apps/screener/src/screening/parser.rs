//! Tolerant decoding of scoring replies.
//!
//! The provider is asked for a single JSON value but may wrap it in prose or a
//! fenced block. The block is located first, then decoded as loose JSON so that a
//! missing or mistyped field falls back to its empty value instead of failing the
//! whole reply. A reply with no decodable block becomes a degraded result.
//!
//! The gating penalty is applied here and only here.

use serde_json::Value;

use crate::screening::models::{Recommendation, ScoreBreakdown, ScoringResult};

/// Score given to a reply that could not be decoded at all.
const DEGRADED_SCORE: u32 = 50;
/// Characters of raw reply kept in a degraded summary.
const DEGRADED_SUMMARY_CHARS: usize = 500;

/// Maximum final score allowed for a given number of missing required skills.
pub fn gating_cap(missing_required: usize) -> u32 {
    match missing_required {
        0 => 100,
        1 => 75,
        2 => 55,
        _ => 40,
    }
}

/// Applies the gating cap to `result.score`. Breakdown sub-scores and
/// `raw_score` keep the provider's values. When the cap bites, a recommendation
/// stronger than the capped score supports is downgraded.
pub fn apply_gating_penalty(result: &mut ScoringResult) {
    let cap = gating_cap(result.missing_skills.len());
    if result.score > cap {
        result.score = cap;
        result.recommendation = result
            .recommendation
            .min(Recommendation::for_score(cap));
    }
}

/// Locates the first JSON value opening with `open` (`{` or `[`) inside `text`
/// and returns its span together with the decoded value. A fenced block is
/// searched first, then the whole text. Each `open` offset is tried in turn, so
/// braces or brackets in the surrounding prose are skipped. Applying this to the
/// returned span yields the same span.
pub fn extract_structured_block(text: &str, open: char) -> Option<(&str, Value)> {
    fenced_body(text)
        .and_then(|inner| first_value(inner, open))
        .or_else(|| first_value(text, open))
}

fn first_value(body: &str, open: char) -> Option<(&str, Value)> {
    body.match_indices(open).find_map(|(start, _)| {
        let rest = &body[start..];
        let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
        let value = stream.next()?.ok()?;
        let end = stream.byte_offset();
        is_structured(&value).then(|| (&rest[..end], value))
    })
}

/// Objects, and arrays that are empty or hold at least one object. A bare list of
/// scalars such as `[1]` in prose is not a reply.
fn is_structured(value: &Value) -> bool {
    match value {
        Value::Object(_) => true,
        Value::Array(items) => items.is_empty() || items.iter().any(Value::is_object),
        _ => false,
    }
}

/// Content of the first ``` fence, without its language tag.
fn fenced_body(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let tag_len = after
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(after.len());
    let rest = &after[tag_len..];
    let end = rest.find("```")?;
    Some(rest[..end].trim())
}

/// Decodes a single-candidate reply. Never fails.
pub fn parse_scoring_reply(raw: &str) -> ScoringResult {
    match extract_structured_block(raw, '{') {
        Some((_, value)) => result_from_value(&value),
        None => degraded_result(raw),
    }
}

/// Decodes an aggregated reply: an array (possibly under `results`) of result
/// objects each carrying a 1-based `candidate_index`. Returns 0-based indices;
/// entries outside `0..expected` are dropped.
pub fn parse_batch_reply(raw: &str, expected: usize) -> Result<Vec<(usize, ScoringResult)>, String> {
    let Some((_, Value::Array(items))) = extract_structured_block(raw, '[') else {
        return Err("no JSON array of results found in aggregated reply".to_string());
    };

    let mut results = Vec::with_capacity(items.len());
    for item in items.iter().filter(|v| v.is_object()) {
        let Some(position) = number_field(item, &["candidate_index", "candidateIndex", "index"])
        else {
            continue;
        };
        if position < 1.0 || position.fract() != 0.0 {
            continue;
        }
        let index = position as usize - 1;
        if index < expected && !results.iter().any(|(i, _)| *i == index) {
            results.push((index, result_from_value(item)));
        }
    }
    Ok(results)
}

fn result_from_value(value: &Value) -> ScoringResult {
    let raw_score = number_field(value, &["score", "overall_score", "overallScore"])
        .map(|s| s.round().clamp(0.0, 100.0) as u32)
        .unwrap_or(0);

    let recommendation = string_field(value, &["recommendation"])
        .and_then(|r| Recommendation::parse(&r))
        .unwrap_or_else(|| Recommendation::for_score(raw_score));

    let confidence = number_field(value, &["confidence"]).map(|c| {
        // some replies use a percentage
        let c = if c > 1.0 { c / 100.0 } else { c };
        c.clamp(0.0, 1.0) as f32
    });

    let mut result = ScoringResult {
        score: raw_score,
        recommendation,
        summary: string_field(value, &["summary"]).unwrap_or_default(),
        matched_skills: list_field(value, &["matched_skills", "matchedSkills"]),
        missing_skills: list_field(
            value,
            &["missing_skills", "missingSkills", "missing_required_skills"],
        ),
        partial_skills: list_field(value, &["partial_skills", "partialSkills"]),
        concerns: list_field(value, &["concerns", "red_flags", "redFlags"]),
        interview_questions: list_field(value, &["interview_questions", "interviewQuestions"]),
        years_experience: number_field(
            value,
            &["years_experience", "yearsExperience", "years_of_experience"],
        )
        .map(|y| y.max(0.0) as f32)
        .unwrap_or(0.0),
        confidence,
        breakdown: field(value, &["breakdown", "score_breakdown", "scoreBreakdown"])
            .filter(|b| b.is_object())
            .map(breakdown_from_value),
        raw_score,
        degraded: false,
    };

    apply_gating_penalty(&mut result);
    result
}

fn breakdown_from_value(value: &Value) -> ScoreBreakdown {
    let sub = |keys: &[&str], max: u32| {
        field(value, keys)
            .and_then(|v| as_number(v).or_else(|| v.get("score").and_then(as_number)))
            .map(|n| n.round().clamp(0.0, max as f64) as u32)
            .unwrap_or(0)
    };
    ScoreBreakdown {
        technical: sub(
            &["technical", "technical_skills", "technicalSkills"],
            ScoreBreakdown::MAX_TECHNICAL,
        ),
        experience: sub(&["experience"], ScoreBreakdown::MAX_EXPERIENCE),
        education: sub(&["education"], ScoreBreakdown::MAX_EDUCATION),
        career_progression: sub(
            &["career_progression", "careerProgression"],
            ScoreBreakdown::MAX_CAREER_PROGRESSION,
        ),
        communication: sub(&["communication"], ScoreBreakdown::MAX_COMMUNICATION),
    }
}

fn degraded_result(raw: &str) -> ScoringResult {
    let excerpt: String = raw.trim().chars().take(DEGRADED_SUMMARY_CHARS).collect();
    let mut result = ScoringResult::rejected(format!(
        "Automated scoring reply could not be parsed; manual review recommended. Reply: {excerpt}"
    ));
    result.score = DEGRADED_SCORE;
    result.raw_score = DEGRADED_SCORE;
    result.recommendation = Recommendation::Maybe;
    result.degraded = true;
    result
}

fn field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|k| value.get(*k))
        .filter(|v| !v.is_null())
}

fn as_number(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().trim_end_matches('%').parse().ok()))
}

fn number_field(value: &Value, keys: &[&str]) -> Option<f64> {
    field(value, keys).and_then(as_number)
}

fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    field(value, keys).and_then(|v| v.as_str()).map(|s| s.trim().to_string())
}

/// Reads a list of strings. Accepts an array of strings, an array of objects with
/// a `skill`/`name`/`question`/`text` member, or one comma-separated string.
fn list_field(value: &Value, keys: &[&str]) -> Vec<String> {
    let Some(v) = field(value, keys) else {
        return Vec::new();
    };

    let items: Vec<String> = match v {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(_) => ["skill", "name", "question", "text"]
                    .iter()
                    .find_map(|k| item.get(*k).and_then(|s| s.as_str()))
                    .map(String::from),
                _ => None,
            })
            .collect(),
        Value::String(s) => s.split(',').map(String::from).collect(),
        _ => Vec::new(),
    };

    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
