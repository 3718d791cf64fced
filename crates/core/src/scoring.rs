//! Domain scoring and risk aggregation.
//!
//! All functions in this module are pure: identical inputs always yield
//! identical results, and nothing here touches shared state, so everything is
//! safe to call concurrently.
//!
//! Responsibilities:
//! - Classify a domain score into a risk level
//! - Score a domain from an answer map (final or preview)
//! - Report the missing question ids that gate a workflow step
//! - Fold per-domain results into an overall risk level
//! - Assemble a full [`Assessment`] from an answer map

use crate::catalog::{Catalog, Domain};
use crate::flags;
use crate::recommend::{self, Recommendation};
use chrono::NaiveDate;
use hra_types::AnswerValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Answers for one domain: question id → severity value.
pub type DomainAnswers = BTreeMap<String, AnswerValue>;

/// Answers for a whole assessment: domain id → question id → severity value.
///
/// Ordered maps keep serialized draft snapshots deterministic, which in turn
/// keeps the idempotent-upsert retry contract simple (identical payloads
/// serialize identically).
pub type AnswerMap = BTreeMap<String, DomainAnswers>;

/// Risk classification for a domain or a whole assessment.
///
/// The derive order gives the severity ordering used everywhere:
/// `Healthy < AtRisk < Intervention`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Healthy,
    AtRisk,
    Intervention,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RiskLevel::Healthy => "healthy",
            RiskLevel::AtRisk => "at_risk",
            RiskLevel::Intervention => "intervention",
        };
        write!(f, "{label}")
    }
}

/// Scored outcome for one domain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainResult {
    pub domain_id: String,
    pub score: u32,
    pub max_score: u32,
    pub risk_level: RiskLevel,
    /// Set by the domain's flag predicate, independent of `risk_level`.
    pub flagged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// The complete scored assessment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    pub overall_risk: RiskLevel,
    /// Per-domain results in catalog order.
    pub domain_results: Vec<DomainResult>,
    pub total_score: u32,
    pub max_total_score: u32,
    pub recommendations: Vec<Recommendation>,
    /// Display names of every flagged domain, in catalog order. Consumed by
    /// the intervention-creation flow to prefill follow-up records.
    pub flagged_domain_names: Vec<String>,
}

/// Score below which a domain is healthy.
const AT_RISK_THRESHOLD: u32 = 2;
/// Score at which a domain needs intervention.
const INTERVENTION_THRESHOLD: u32 = 4;

/// Classifies a domain score into a risk level.
///
/// The partition is exhaustive: `score <= 1` is healthy, `2..=3` is at risk
/// and `>= 4` needs intervention. A domain that reaches its own ceiling is
/// always classified as intervention, so a short domain (one question,
/// `max_score == 2`) scoring its maximum is treated as severely as a long
/// domain scoring 4.
pub fn classify(score: u32, max_score: u32) -> RiskLevel {
    if score >= INTERVENTION_THRESHOLD || (score == max_score && score >= AT_RISK_THRESHOLD) {
        RiskLevel::Intervention
    } else if score >= AT_RISK_THRESHOLD {
        RiskLevel::AtRisk
    } else {
        RiskLevel::Healthy
    }
}

/// Scores one domain from an answer map.
///
/// Missing answers contribute 0 to the score. That makes the result usable as
/// a live *preview* while a draft is partially filled in, but a preview score
/// must never stand in for the completeness check that gates a forward
/// workflow transition — use [`missing_question_ids`] for that.
///
/// The flag predicate is evaluated strictly against the supplied answers (not
/// the zero-filled preview); its value is only meaningful once the domain is
/// fully answered.
///
/// Question ids in `answers` that the domain does not define are ignored, so
/// stored drafts written against an older catalog degrade to "unanswered"
/// rather than failing.
pub fn score_domain(
    domain: &Domain,
    answers: Option<&DomainAnswers>,
    notes: Option<&str>,
) -> DomainResult {
    static EMPTY: std::sync::OnceLock<DomainAnswers> = std::sync::OnceLock::new();
    let answers = answers.unwrap_or_else(|| EMPTY.get_or_init(DomainAnswers::new));

    let score: u32 = domain
        .questions
        .iter()
        .filter_map(|question| answers.get(&question.id))
        .map(|value| u32::from(*value))
        .sum();
    let max_score = domain.max_score();
    let flagged = flags::evaluate(&domain.id, answers);

    DomainResult {
        domain_id: domain.id.clone(),
        score,
        max_score,
        risk_level: classify(score, max_score),
        flagged,
        trigger_action: flagged.then(|| domain.trigger_action.clone()).flatten(),
        notes: notes.map(str::to_string),
    }
}

/// Returns the ids of the domain's questions that have no answer yet.
///
/// This, not the preview score, is the completeness gate for forward
/// workflow transitions.
pub fn missing_question_ids(domain: &Domain, answers: Option<&DomainAnswers>) -> Vec<String> {
    domain
        .questions
        .iter()
        .filter(|question| !answers.is_some_and(|a| a.contains_key(&question.id)))
        .map(|question| question.id.clone())
        .collect()
}

/// Folds per-domain results into the overall risk level.
///
/// The overall risk is the highest severity present. An empty result list is
/// the documented degenerate case and aggregates to [`RiskLevel::Healthy`];
/// refusing to *commit* such an assessment is the workflow's job, not this
/// function's.
pub fn aggregate_risk(results: &[DomainResult]) -> RiskLevel {
    results
        .iter()
        .map(|result| result.risk_level)
        .max()
        .unwrap_or(RiskLevel::Healthy)
}

/// Assembles a full [`Assessment`] from an answer map.
///
/// Domains are scored in catalog order; domains absent from the answer map
/// score as unanswered previews. `today` anchors recommendation due dates.
pub fn compute_assessment(
    catalog: &Catalog,
    answers: &AnswerMap,
    domain_notes: &BTreeMap<String, String>,
    today: NaiveDate,
) -> Assessment {
    let domain_results: Vec<DomainResult> = catalog
        .domains()
        .iter()
        .map(|domain| {
            score_domain(
                domain,
                answers.get(&domain.id),
                domain_notes.get(&domain.id).map(String::as_str),
            )
        })
        .collect();

    let overall_risk = aggregate_risk(&domain_results);
    let total_score = domain_results.iter().map(|r| r.score).sum();
    let max_total_score = domain_results.iter().map(|r| r.max_score).sum();
    let flagged_domain_names = domain_results
        .iter()
        .filter(|result| result.flagged)
        .filter_map(|result| catalog.domain(&result.domain_id))
        .map(|domain| domain.name.clone())
        .collect();
    let recommendations = recommend::generate(overall_risk, &domain_results, catalog, today);

    Assessment {
        overall_risk,
        domain_results,
        total_score,
        max_total_score,
        recommendations,
        flagged_domain_names,
    }
}
