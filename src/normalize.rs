// Copyright © 2025 lituus-io <spicyzhug@gmail.com>
// All Rights Reserved.
// Licensed under PolyForm Noncommercial 1.0.0

//! Evaluation report normalization.
//!
//! Judge models have emitted several incompatible report schemas over
//! time: a summary/dimension shape on a 5-point scale, a criteria
//! array or scores map on a 10-point scale, free text with inline
//! `label: score/max` tuples, and assorted ad hoc JSON. [`Normalizer`]
//! converts any of them into one canonical [`NormalizedReport`].
//!
//! Shape sniffing is an ordered chain of total matcher functions, each
//! returning `Option<NormalizedReport>`; the first match wins. The
//! chain never raises: total failure yields a zero-valued report whose
//! suggestions carry a diagnostic note, and the matched [`ReportShape`]
//! records how far down the chain resolution fell.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;

/// One scored dimension within a normalized report.
///
/// Invariant: `0 <= score <= max_score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    /// Human-readable dimension name.
    pub name: String,
    /// Achieved score.
    pub score: f64,
    /// Scale ceiling for this dimension.
    pub max_score: f64,
    /// Judge commentary for this dimension, possibly empty.
    pub comment: String,
}

impl Criterion {
    /// Create a criterion, clamping the score into `0..=max_score`.
    ///
    /// Non-finite or non-positive ceilings fall back to the 10-point
    /// default scale.
    pub fn new(
        name: impl Into<String>,
        score: f64,
        max_score: f64,
        comment: impl Into<String>,
    ) -> Self {
        let max_score = if max_score.is_finite() && max_score > 0.0 {
            max_score
        } else {
            10.0
        };
        let score = if score.is_finite() {
            score.clamp(0.0, max_score)
        } else {
            0.0
        };
        Self {
            name: name.into(),
            score,
            max_score,
            comment: comment.into(),
        }
    }
}

/// Severity of a judge-reported risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Minor or cosmetic concern.
    Low,
    /// Worth addressing before use.
    Medium,
    /// Likely to cause bad downstream output.
    High,
}

impl RiskLevel {
    /// Parse a level from free-form judge wording; unknown wording is Low.
    pub fn parse(raw: &str) -> Self {
        let lower = raw.to_lowercase();
        if lower.contains("high") || lower.contains('高') {
            Self::High
        } else if lower.contains("medium") || lower.contains("mid") || lower.contains('中') {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// A potential risk attached to a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    /// Severity level.
    pub level: RiskLevel,
    /// Judge description of the risk.
    pub description: String,
}

/// Which matcher in the chain produced a report.
///
/// Later variants mean lower-confidence resolution; this is how parse
/// degradation is surfaced without ever being an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportShape {
    /// `evaluation_summary` + `dimension_scores`, 5-point scale.
    DimensionScores,
    /// `criteria` array or `scores` map, 10-point default scale.
    Criteria,
    /// Free text with regex-extracted score tuples.
    FreeText,
    /// Generic top-level numeric fields.
    Generic,
    /// Nothing usable; zero-valued diagnostic report.
    Empty,
}

/// Canonical scored report produced by [`Normalizer::normalize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedReport {
    /// Overall score; mean of criterion scores when the judge gave none.
    pub overall_score: f64,
    /// Per-dimension scores.
    pub criteria: SmallVec<[Criterion; 6]>,
    /// Improvement suggestions, one per entry.
    pub suggestions: Vec<String>,
    /// Judge summary of the main strengths.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_strengths: Option<String>,
    /// Judge summary of the main weaknesses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_weaknesses: Option<String>,
    /// Highest-priority risk reported by the judge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub potential_risk: Option<Risk>,
    /// Which shape matcher resolved this report.
    pub shape: ReportShape,
}

impl NormalizedReport {
    fn empty(diagnostic: impl Into<String>) -> Self {
        Self {
            overall_score: 0.0,
            criteria: SmallVec::new(),
            suggestions: vec![format!(
                "unable to parse evaluation report: {}",
                diagnostic.into()
            )],
            main_strengths: None,
            main_weaknesses: None,
            potential_risk: None,
            shape: ReportShape::Empty,
        }
    }

    fn mean_score(&self) -> f64 {
        if self.criteria.is_empty() {
            0.0
        } else {
            self.criteria.iter().map(|c| c.score).sum::<f64>() / self.criteria.len() as f64
        }
    }
}

/// Evaluation report normalizer with compiled free-text patterns.
///
/// Pure and reentrant; safe to share across sessions.
#[derive(Debug)]
pub struct Normalizer {
    tuple_re: Regex,
    overall_re: Regex,
    suggestion_re: Regex,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    /// Create a normalizer.
    pub fn new() -> Self {
        Self {
            tuple_re: Regex::new(
                r"(?m)^\s*\*{0,2}([^:：\n]{1,60}?)\*{0,2}\s*[:：]\s*(\d+(?:\.\d+)?)\s*/\s*(\d+(?:\.\d+)?)\s*(?:[-–—]\s*(.*\S))?\s*$",
            )
            .expect("tuple pattern"),
            overall_re: Regex::new(
                r"(?i)(?:整体评分|总体评分|总分|overall\s*_?score)\s*[:：]?\s*(\d+(?:\.\d+)?)",
            )
            .expect("overall pattern"),
            suggestion_re: Regex::new(r"(?m)^\s*(?:改进)?(?:建议|suggestions?)\s*[:：]\s*(\S[^\n]*)$")
                .expect("suggestion pattern"),
        }
    }

    /// Normalize a raw evaluator payload of any supported shape.
    ///
    /// Never fails: unrecognized input degrades to a zero-valued report
    /// carrying a diagnostic suggestion.
    pub fn normalize(&self, raw: &Value) -> NormalizedReport {
        match raw {
            Value::Null => NormalizedReport::empty("evaluator returned no data"),
            Value::String(text) => self.normalize_text(text),
            other => self.normalize_value(other),
        }
    }

    /// Normalize raw evaluator text.
    ///
    /// JSON buried in noise is located by stripping a ```json fence or
    /// slicing from the first `{` to the last `}`; anything that still
    /// fails to parse goes down the free-text path.
    pub fn normalize_text(&self, raw: &str) -> NormalizedReport {
        if let Ok(value) = serde_json::from_str::<Value>(json_slice(raw)) {
            if value.is_object() {
                return self.normalize_value(&value);
            }
        }
        self.shape_free_text(raw)
            .unwrap_or_else(|| NormalizedReport::empty("unrecognized evaluation text"))
    }

    fn normalize_value(&self, value: &Value) -> NormalizedReport {
        shape_dimension_scores(value)
            .or_else(|| shape_criteria(value))
            .or_else(|| shape_generic(value))
            .unwrap_or_else(|| NormalizedReport::empty("unrecognized evaluation shape"))
    }

    /// Shape (c): free text with `label: score/max - comment` tuples.
    fn shape_free_text(&self, text: &str) -> Option<NormalizedReport> {
        let mut criteria: SmallVec<[Criterion; 6]> = SmallVec::new();
        for caps in self.tuple_re.captures_iter(text) {
            let label = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
            if label.is_empty() || self.overall_re.is_match(label) {
                continue;
            }
            let (Some(score), Some(max)) = (
                caps.get(2).and_then(|m| m.as_str().parse::<f64>().ok()),
                caps.get(3).and_then(|m| m.as_str().parse::<f64>().ok()),
            ) else {
                continue;
            };
            let comment = caps.get(4).map(|m| m.as_str().trim()).unwrap_or("");
            criteria.push(Criterion::new(label, score, max, comment));
        }

        let overall = self
            .overall_re
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok());

        if criteria.is_empty() && overall.is_none() {
            return None;
        }

        let suggestions = self
            .suggestion_re
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .collect();

        let mut report = NormalizedReport {
            overall_score: 0.0,
            criteria,
            suggestions,
            main_strengths: None,
            main_weaknesses: None,
            potential_risk: None,
            shape: ReportShape::FreeText,
        };
        report.overall_score = overall.unwrap_or_else(|| report.mean_score());
        Some(report)
    }
}

/// Locate the JSON payload inside noisy evaluator text.
fn json_slice(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Shape (a): `evaluation_summary` + `dimension_scores`, 5-point scale.
fn shape_dimension_scores(value: &Value) -> Option<NormalizedReport> {
    let summary = value.get("evaluation_summary").filter(|v| v.is_object());
    let dimensions = value.get("dimension_scores").filter(|v| v.is_object());
    if summary.is_none() && dimensions.is_none() {
        return None;
    }

    let mut criteria: SmallVec<[Criterion; 6]> = SmallVec::new();
    if let Some(map) = dimensions.and_then(Value::as_object) {
        for (key, entry) in map {
            let score = entry.get("score").and_then(as_f64).unwrap_or(0.0);
            let comment = entry
                .get("justification")
                .or_else(|| entry.get("comment"))
                .and_then(Value::as_str)
                .unwrap_or("");
            criteria.push(Criterion::new(title_case(key), score, 5.0, comment));
        }
    }

    let overall = summary.and_then(|s| s.get("overall_score")).and_then(as_f64);
    let main_strengths = summary
        .and_then(|s| s.get("main_strengths"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let main_weaknesses = summary
        .and_then(|s| s.get("main_weaknesses"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut report = NormalizedReport {
        overall_score: 0.0,
        criteria,
        suggestions: string_list(value.get("suggestions_for_improvement")),
        main_strengths,
        main_weaknesses,
        potential_risk: risk_from(value.get("potential_risks")),
        shape: ReportShape::DimensionScores,
    };
    report.overall_score = overall.unwrap_or_else(|| report.mean_score());
    Some(report)
}

/// Shape (b): `criteria` array or flat `scores` map, 10-point default.
fn shape_criteria(value: &Value) -> Option<NormalizedReport> {
    let mut criteria: SmallVec<[Criterion; 6]> = SmallVec::new();

    if let Some(items) = value.get("criteria").and_then(Value::as_array) {
        for item in items {
            let name = item
                .get("name")
                .or_else(|| item.get("criterion"))
                .or_else(|| item.get("category"))
                .and_then(Value::as_str)
                .unwrap_or("unnamed");
            let score = item.get("score").and_then(as_f64).unwrap_or(0.0);
            let max = item
                .get("max_score")
                .or_else(|| item.get("maxScore"))
                .and_then(as_f64)
                .unwrap_or(10.0);
            let comment = item
                .get("comment")
                .or_else(|| item.get("feedback"))
                .or_else(|| item.get("description"))
                .and_then(Value::as_str)
                .unwrap_or("");
            criteria.push(Criterion::new(name, score, max, comment));
        }
    } else if let Some(map) = value.get("scores").and_then(Value::as_object) {
        for (key, entry) in map {
            let score = as_f64(entry).or_else(|| entry.get("score").and_then(as_f64));
            if let Some(score) = score {
                criteria.push(Criterion::new(title_case(key), score, 10.0, ""));
            }
        }
    } else {
        return None;
    }

    let overall = value
        .get("overall_score")
        .or_else(|| value.get("overallScore"))
        .and_then(as_f64);

    let mut report = NormalizedReport {
        overall_score: 0.0,
        criteria,
        suggestions: string_list(value.get("suggestions")),
        main_strengths: first_string(value, &["main_strengths", "strengths"]),
        main_weaknesses: first_string(value, &["main_weaknesses", "weaknesses"]),
        potential_risk: risk_from(value.get("potential_risks").or_else(|| value.get("risks"))),
        shape: ReportShape::Criteria,
    };
    report.overall_score = overall.unwrap_or_else(|| report.mean_score());
    Some(report)
}

/// Shape (d): every top-level numeric field that is not an overall
/// score or a comment/feedback companion becomes a criterion.
fn shape_generic(value: &Value) -> Option<NormalizedReport> {
    let map = value.as_object()?;

    let mut criteria: SmallVec<[Criterion; 6]> = SmallVec::new();
    let mut overall = None;
    for (key, entry) in map {
        let Some(number) = as_f64(entry) else {
            continue;
        };
        if is_overall_key(key) {
            overall = Some(number);
            continue;
        }
        if key.ends_with("_comment") || key.ends_with("_feedback") {
            continue;
        }
        let comment = map
            .get(&format!("{key}_comment"))
            .or_else(|| map.get(&format!("{key}_feedback")))
            .and_then(Value::as_str)
            .unwrap_or("");
        criteria.push(Criterion::new(title_case(key), number, 10.0, comment));
    }

    if criteria.is_empty() && overall.is_none() {
        return None;
    }

    let mut report = NormalizedReport {
        overall_score: 0.0,
        criteria,
        suggestions: string_list(map.get("suggestions")),
        main_strengths: None,
        main_weaknesses: None,
        potential_risk: None,
        shape: ReportShape::Generic,
    };
    report.overall_score = overall.unwrap_or_else(|| report.mean_score());
    Some(report)
}

fn is_overall_key(key: &str) -> bool {
    matches!(
        key,
        "overall_score" | "overallScore" | "overall" | "total_score" | "total"
    )
}

/// Accept numbers and numeric strings; judges are not consistent.
fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| value.get(k))
        .find_map(Value::as_str)
        .map(str::to_string)
}

/// Suggestions arrive as an array, a newline-joined string, or nothing.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => s
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn risk_from(value: Option<&Value>) -> Option<Risk> {
    let value = value?;
    if !value.is_object() {
        return None;
    }
    let level = value
        .get("level")
        .and_then(Value::as_str)
        .map(RiskLevel::parse)
        .unwrap_or(RiskLevel::Low);
    let description = value
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    Some(Risk { level, description })
}

/// `internal_placeholder_usage` -> `Internal Placeholder Usage`.
fn title_case(key: &str) -> String {
    key.split(['_', ' ', '-'])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dimension_scores_shape() {
        let raw = json!({
            "evaluation_summary": {
                "overall_score": 4.2,
                "main_strengths": "clear role framing",
                "main_weaknesses": "vague output format"
            },
            "dimension_scores": {
                "clarity": {"score": 4, "justification": "ok"}
            },
            "potential_risks": {"level": "Medium", "description": "may over-constrain"},
            "suggestions_for_improvement": ["name the output format"]
        });
        let report = Normalizer::new().normalize(&raw);

        assert_eq!(report.shape, ReportShape::DimensionScores);
        assert_eq!(report.overall_score, 4.2);
        assert_eq!(report.criteria.len(), 1);
        assert_eq!(report.criteria[0].name, "Clarity");
        assert_eq!(report.criteria[0].score, 4.0);
        assert_eq!(report.criteria[0].max_score, 5.0);
        assert_eq!(report.criteria[0].comment, "ok");
        assert_eq!(report.main_strengths.as_deref(), Some("clear role framing"));
        assert_eq!(
            report.potential_risk.as_ref().map(|r| r.level),
            Some(RiskLevel::Medium)
        );
        assert_eq!(report.suggestions, vec!["name the output format"]);
    }

    #[test]
    fn test_dimension_scores_mean_fallback() {
        let raw = json!({
            "dimension_scores": {
                "clarity": {"score": 4},
                "fidelity": {"score": 2}
            }
        });
        let report = Normalizer::new().normalize(&raw);
        assert_eq!(report.overall_score, 3.0);
    }

    #[test]
    fn test_criteria_array_shape() {
        let raw = json!({
            "overall_score": 7.5,
            "criteria": [
                {"name": "clarity", "score": 8, "max_score": 10, "comment": "good"},
                {"criterion": "structure", "score": 7, "feedback": "loose"}
            ],
            "suggestions": "tighten the intro\nname the audience"
        });
        let report = Normalizer::new().normalize(&raw);

        assert_eq!(report.shape, ReportShape::Criteria);
        assert_eq!(report.overall_score, 7.5);
        assert_eq!(report.criteria[1].name, "structure");
        assert_eq!(report.criteria[1].max_score, 10.0);
        assert_eq!(report.criteria[1].comment, "loose");
        assert_eq!(
            report.suggestions,
            vec!["tighten the intro", "name the audience"]
        );
    }

    #[test]
    fn test_scores_map_shape() {
        let raw = json!({"scores": {"clarity": 8, "brevity": 6}});
        let report = Normalizer::new().normalize(&raw);

        assert_eq!(report.shape, ReportShape::Criteria);
        assert_eq!(report.criteria.len(), 2);
        assert_eq!(report.overall_score, 7.0);
    }

    #[test]
    fn test_generic_shape_with_comments() {
        let raw = json!({
            "clarity": 8,
            "clarity_comment": "crisp",
            "coverage": "6",
            "overall_score": 7,
            "verdict": "ship it"
        });
        let report = Normalizer::new().normalize(&raw);

        assert_eq!(report.shape, ReportShape::Generic);
        assert_eq!(report.overall_score, 7.0);
        assert_eq!(report.criteria.len(), 2);
        let clarity = report.criteria.iter().find(|c| c.name == "Clarity").unwrap();
        assert_eq!(clarity.comment, "crisp");
    }

    #[test]
    fn test_free_text_tuples() {
        let text = "评估结果\n清晰度：4/5 - 结构清楚\n覆盖度：3/5\n整体评分：3.5\n建议：补充输出格式";
        let report = Normalizer::new().normalize_text(text);

        assert_eq!(report.shape, ReportShape::FreeText);
        assert_eq!(report.overall_score, 3.5);
        assert_eq!(report.criteria.len(), 2);
        assert_eq!(report.criteria[0].name, "清晰度");
        assert_eq!(report.criteria[0].comment, "结构清楚");
        assert_eq!(report.suggestions, vec!["补充输出格式"]);
    }

    #[test]
    fn test_json_wrapped_in_noise() {
        let text = "Here is my evaluation:\n```json\n{\"scores\": {\"clarity\": 9}}\n```\nDone.";
        let report = Normalizer::new().normalize_text(text);
        assert_eq!(report.shape, ReportShape::Criteria);
        assert_eq!(report.overall_score, 9.0);
    }

    #[test]
    fn test_json_brace_slice() {
        let text = "noise before {\"overall_score\": 6, \"clarity\": 5} noise after";
        let report = Normalizer::new().normalize_text(text);
        assert_eq!(report.shape, ReportShape::Generic);
        assert_eq!(report.overall_score, 6.0);
    }

    #[test]
    fn test_garbage_never_errors() {
        let normalizer = Normalizer::new();
        let report = normalizer.normalize_text("not json at all");
        assert_eq!(report.overall_score, 0.0);
        assert!(report.criteria.is_empty());
        assert_eq!(report.shape, ReportShape::Empty);
        assert!(!report.suggestions.is_empty());

        let report = normalizer.normalize(&Value::Null);
        assert_eq!(report.shape, ReportShape::Empty);
    }

    #[test]
    fn test_score_clamped_into_range() {
        let raw = json!({"dimension_scores": {"clarity": {"score": 11}}});
        let report = Normalizer::new().normalize(&raw);
        assert_eq!(report.criteria[0].score, 5.0);

        let criterion = Criterion::new("x", -3.0, 0.0, "");
        assert_eq!(criterion.score, 0.0);
        assert_eq!(criterion.max_score, 10.0);
    }

    #[test]
    fn test_risk_level_parse() {
        assert_eq!(RiskLevel::parse("HIGH risk"), RiskLevel::High);
        assert_eq!(RiskLevel::parse("中等"), RiskLevel::Medium);
        assert_eq!(RiskLevel::parse("whatever"), RiskLevel::Low);
    }
}
