//! Learned pattern records ("deltas").
//!
//! A delta captures one correction or preference: the situation it applies
//! to (`condition`), what went wrong (`problem`), and what to do instead
//! (`content`). Its `confidence` rises and falls with feedback and decides
//! whether it stays in the active set.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Workflow,
    CodeStyle,
    Testing,
    Tooling,
    Communication,
    #[default]
    General,
}

impl Category {
    pub fn all() -> &'static [Category] {
        &[
            Category::Workflow,
            Category::CodeStyle,
            Category::Testing,
            Category::Tooling,
            Category::Communication,
            Category::General,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Workflow => "workflow",
            Category::CodeStyle => "code_style",
            Category::Testing => "testing",
            Category::Tooling => "tooling",
            Category::Communication => "communication",
            Category::General => "general",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = Category::all().iter().map(|c| c.as_str()).collect();
                format!("unknown category '{s}' (expected one of: {})", names.join(", "))
            })
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Provenance of a delta. Decides its starting confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Authored deliberately by a person.
    Explicit,
    /// Inferred from a correction during a session.
    #[default]
    Implicit,
}

// ---------------------------------------------------------------------------
// ArchiveReason
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveReason {
    BelowFloor,
    Capacity,
}

impl fmt::Display for ArchiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveReason::BelowFloor => f.write_str("below floor"),
            ArchiveReason::Capacity => f.write_str("capacity"),
        }
    }
}

// ---------------------------------------------------------------------------
// Delta
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub id: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill: Option<String>,
    pub condition: String,
    #[serde(default)]
    pub problem: String,
    #[serde(default)]
    pub content: String,
    pub confidence: f64,
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub helpful_count: u32,
    #[serde(default)]
    pub not_helpful_count: u32,
    #[serde(default)]
    pub human_feedback_count: u32,
    pub first_seen: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_decayed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_reason: Option<ArchiveReason>,
}

static SKILL_RE: OnceLock<Regex> = OnceLock::new();

fn skill_re() -> &'static Regex {
    SKILL_RE.get_or_init(|| Regex::new(r"(?:^|\s)/([A-Za-z0-9][A-Za-z0-9:_\-]*)").unwrap())
}

impl Delta {
    /// Grouping label for reports: the explicit `skill`, else the first
    /// `/command` token in `condition`, else `general`.
    pub fn skill_label(&self) -> String {
        if let Some(skill) = self.skill.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            return skill.trim_start_matches('/').to_string();
        }
        skill_re()
            .captures(&self.condition)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| "general".to_string())
    }

    /// Confidence as a whole percentage, the form shown in the target document.
    pub fn percent(&self) -> u32 {
        (self.confidence.clamp(0.0, 1.0) * 100.0).round() as u32
    }

    pub(crate) fn set_confidence(&mut self, value: f64) {
        self.confidence = normalize_confidence(value);
    }

    pub(crate) fn mark_archived(&mut self, reason: ArchiveReason, now: DateTime<Utc>) {
        self.archived = true;
        self.archived_at = Some(now);
        self.archive_reason = Some(reason);
    }
}

/// Clamp to [0, 1] and round to four decimals so repeated steps don't
/// accumulate float noise (0.4 + 0.1 + 0.1 stays 0.6).
pub fn normalize_confidence(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    (value.clamp(0.0, 1.0) * 10_000.0).round() / 10_000.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::days(day as i64)
    }

    pub(crate) fn delta(id: &str, confidence: f64) -> Delta {
        Delta {
            id: id.to_string(),
            category: Category::Workflow,
            skill: None,
            condition: format!("when running /commit for {id}"),
            problem: "Committed without running tests".to_string(),
            content: "Run the test suite before committing".to_string(),
            confidence,
            source: Source::Implicit,
            helpful_count: 0,
            not_helpful_count: 0,
            human_feedback_count: 0,
            first_seen: at(0),
            last_used: at(0),
            last_decayed: None,
            archived: false,
            archived_at: None,
            archive_reason: None,
        }
    }

    #[test]
    fn skill_label_prefers_explicit_field() {
        let mut d = delta("d1", 0.5);
        d.skill = Some("/review".to_string());
        assert_eq!(d.skill_label(), "review");
    }

    #[test]
    fn skill_label_parses_condition_for_legacy_records() {
        let d = delta("d1", 0.5);
        assert_eq!(d.skill_label(), "commit");

        let mut plain = delta("d2", 0.5);
        plain.condition = "any time a file path is mentioned".to_string();
        assert_eq!(plain.skill_label(), "general");

        let mut path_like = delta("d3", 0.5);
        path_like.condition = "editing src/main.rs".to_string();
        assert_eq!(path_like.skill_label(), "general");
    }

    #[test]
    fn normalize_clamps_and_rounds() {
        assert_eq!(normalize_confidence(0.4 + 0.1 + 0.1), 0.6);
        assert_eq!(normalize_confidence(1.7), 1.0);
        assert_eq!(normalize_confidence(-0.2), 0.0);
        assert_eq!(normalize_confidence(f64::NAN), 0.0);
    }

    #[test]
    fn percent_rounds() {
        assert_eq!(delta("d", 0.6).percent(), 60);
        assert_eq!(delta("d", 0.156).percent(), 16);
        assert_eq!(delta("d", 0.8).percent(), 80);
    }

    #[test]
    fn legacy_json_without_optional_fields() {
        let json = r#"{
            "id": "old-1",
            "condition": "/deploy to staging",
            "confidence": 0.55,
            "first_seen": "2025-06-01T00:00:00Z",
            "last_used": "2025-06-02T00:00:00Z"
        }"#;
        let d: Delta = serde_json::from_str(json).unwrap();
        assert_eq!(d.category, Category::General);
        assert_eq!(d.source, Source::Implicit);
        assert!(!d.archived);
        assert_eq!(d.skill_label(), "deploy");
    }

    #[test]
    fn category_parse() {
        assert_eq!("code_style".parse::<Category>().unwrap(), Category::CodeStyle);
        assert!("nope".parse::<Category>().is_err());
    }
}
