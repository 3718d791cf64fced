//! Trend and comparison computation over completed assessments.
//!
//! Works purely on committed results: drafts never feed into a trend. The
//! engine only produces numeric series and deltas; rendering them as line or
//! radar charts is a consumer concern.

use crate::scoring::Assessment;
use crate::store::CompletedAssessment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Direction of change for one domain between two sequential assessments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improved,
    Declined,
    Same,
}

/// Score change for one domain between two sequential assessments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainDelta {
    pub domain_id: String,
    pub previous_score: u32,
    pub current_score: u32,
    /// `previous - current`; positive means improvement, since lower scores
    /// are healthier.
    pub delta: i64,
    pub trend: Trend,
}

/// One point of a per-domain score series.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub completed_at: DateTime<Utc>,
    pub score: u32,
    pub max_score: u32,
}

/// Score history for one domain across a subject's completed assessments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSeries {
    pub domain_id: String,
    /// Oldest first, one point per assessment in which the domain appears.
    pub points: Vec<SeriesPoint>,
}

fn domain_score(assessment: &Assessment, domain_id: &str) -> Option<u32> {
    assessment
        .domain_results
        .iter()
        .find(|result| result.domain_id == domain_id)
        .map(|result| result.score)
}

fn classify_delta(delta: i64) -> Trend {
    match delta.cmp(&0) {
        std::cmp::Ordering::Greater => Trend::Improved,
        std::cmp::Ordering::Less => Trend::Declined,
        std::cmp::Ordering::Equal => Trend::Same,
    }
}

/// Compares two sequential assessments domain by domain.
///
/// The union of domains from both assessments is compared, ordered as in
/// `current` with domains only present in `previous` appended. A domain
/// absent from one side scores 0 there — a documented approximation (the
/// domain reads as fully healthy rather than "no data"), accepted because
/// committed assessments normally cover the full catalog.
pub fn compare(previous: &Assessment, current: &Assessment) -> Vec<DomainDelta> {
    let mut ordered_ids: Vec<&str> = current
        .domain_results
        .iter()
        .map(|result| result.domain_id.as_str())
        .collect();
    let known: BTreeSet<&str> = ordered_ids.iter().copied().collect();
    for result in &previous.domain_results {
        if !known.contains(result.domain_id.as_str()) {
            ordered_ids.push(result.domain_id.as_str());
        }
    }

    ordered_ids
        .into_iter()
        .map(|domain_id| {
            let previous_score = domain_score(previous, domain_id).unwrap_or(0);
            let current_score = domain_score(current, domain_id).unwrap_or(0);
            let delta = i64::from(previous_score) - i64::from(current_score);
            DomainDelta {
                domain_id: domain_id.to_string(),
                previous_score,
                current_score,
                delta,
                trend: classify_delta(delta),
            }
        })
        .collect()
}

/// Compares the latest completed assessment against the one before it.
///
/// `history` is expected newest first, as returned by
/// [`crate::store::DraftStore::fetch_latest_completed`]. Returns `None` with
/// fewer than two assessments.
pub fn latest_comparison(history: &[CompletedAssessment]) -> Option<Vec<DomainDelta>> {
    let current = history.first()?;
    let previous = history.get(1)?;
    Some(compare(&previous.assessment, &current.assessment))
}

/// Builds per-domain score series for visualization.
///
/// `history` is expected newest first; points come out oldest first. Domains
/// are emitted in order of first appearance across the history, and an
/// assessment that does not cover a domain simply contributes no point for
/// it.
pub fn series(history: &[CompletedAssessment]) -> Vec<DomainSeries> {
    let mut ordered_ids: Vec<String> = Vec::new();
    let mut seen = BTreeSet::new();
    for completed in history.iter().rev() {
        for result in &completed.assessment.domain_results {
            if seen.insert(result.domain_id.clone()) {
                ordered_ids.push(result.domain_id.clone());
            }
        }
    }

    ordered_ids
        .into_iter()
        .map(|domain_id| {
            let points = history
                .iter()
                .rev()
                .filter_map(|completed| {
                    completed
                        .assessment
                        .domain_results
                        .iter()
                        .find(|result| result.domain_id == domain_id)
                        .map(|result| SeriesPoint {
                            completed_at: completed.completed_at,
                            score: result.score,
                            max_score: result.max_score,
                        })
                })
                .collect();
            DomainSeries { domain_id, points }
        })
        .collect()
}
