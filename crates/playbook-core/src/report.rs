//! Read-only aggregation over the active deltas and the feedback log.

use crate::delta::Delta;
use crate::event::{Event, Outcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
pub struct TopEntry {
    pub id: String,
    pub category: String,
    pub skill: String,
    pub condition: String,
    pub confidence: f64,
    pub percent: u32,
    pub helpful_count: u32,
    pub not_helpful_count: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EventSummary {
    pub total: usize,
    pub helpful: usize,
    pub not_helpful: usize,
    pub human_confirmed: usize,
    pub last_event: Option<DateTime<Utc>>,
}

impl EventSummary {
    fn from_events(events: &[Event]) -> Self {
        let mut summary = Self {
            total: events.len(),
            ..Self::default()
        };
        for event in events {
            match event.outcome {
                Outcome::Helpful => summary.helpful += 1,
                Outcome::NotHelpful => summary.not_helpful += 1,
                Outcome::HumanConfirmed => summary.human_confirmed += 1,
            }
            summary.last_event = summary.last_event.max(Some(event.timestamp));
        }
        summary
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub active: usize,
    pub max_deltas: usize,
    pub capacity_pct: f64,
    pub avg_confidence: f64,
    pub helpful: u64,
    pub not_helpful: u64,
    pub human_feedback: u64,
    pub archived: usize,
    pub top: Vec<TopEntry>,
    pub by_skill: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub events: EventSummary,
}

impl Report {
    pub fn build(
        deltas: &[Delta],
        archived: usize,
        events: &[Event],
        max_deltas: usize,
        top_n: usize,
    ) -> Self {
        let active = deltas.len();
        let capacity_pct = if max_deltas == 0 {
            0.0
        } else {
            round1(active as f64 * 100.0 / max_deltas as f64)
        };
        let avg_confidence = if active == 0 {
            0.0
        } else {
            let sum: f64 = deltas.iter().map(|d| d.confidence).sum();
            (sum / active as f64 * 1000.0).round() / 1000.0
        };

        let mut by_skill = BTreeMap::new();
        let mut by_category = BTreeMap::new();
        for d in deltas {
            *by_skill.entry(d.skill_label()).or_insert(0) += 1;
            *by_category.entry(d.category.to_string()).or_insert(0) += 1;
        }

        // sort_by is stable, so equal confidences keep store order.
        let mut ranked: Vec<&Delta> = deltas.iter().collect();
        ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        let top = ranked
            .into_iter()
            .take(top_n)
            .map(|d| TopEntry {
                id: d.id.clone(),
                category: d.category.to_string(),
                skill: d.skill_label(),
                condition: d.condition.clone(),
                confidence: d.confidence,
                percent: d.percent(),
                helpful_count: d.helpful_count,
                not_helpful_count: d.not_helpful_count,
            })
            .collect();

        Self {
            active,
            max_deltas,
            capacity_pct,
            avg_confidence,
            helpful: deltas.iter().map(|d| u64::from(d.helpful_count)).sum(),
            not_helpful: deltas.iter().map(|d| u64::from(d.not_helpful_count)).sum(),
            human_feedback: deltas.iter().map(|d| u64::from(d.human_feedback_count)).sum(),
            archived,
            top,
            by_skill,
            by_category,
            events: EventSummary::from_events(events),
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
