//! Recommendation generation.
//!
//! Recommendations are produced by a two-tier lookup: a generic set keyed by
//! the overall risk level is emitted first, then domain-specific entries
//! keyed by (domain id, that domain's risk level) from a sparse table. The
//! sparse table is a total function — any unmapped combination yields an
//! empty slice, never an error.
//!
//! Post-processing sorts by priority (most urgent first) and deduplicates by
//! id keeping the first occurrence, so a generic recommendation wins over a
//! domain-specific entry sharing its id.

use crate::catalog::{self, Catalog};
use crate::scoring::{DomainResult, RiskLevel};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How soon a recommendation should be acted on.
///
/// The derive order gives the sort order: `Urgent` first, `Low` last.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgent,
    High,
    Medium,
    Low,
}

/// The kind of action a recommendation describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    FollowUp,
    Referral,
    Intervention,
    Monitoring,
    Lifestyle,
}

/// A single generated recommendation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub priority: Priority,
    pub category: Category,
    pub title: String,
    pub description: String,
    /// Display name of the originating domain; `None` for generic entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
    /// Derived from `timeframe` at generation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

impl Recommendation {
    /// Whether this recommendation is eligible for conversion into an
    /// actionable follow-up or intervention record. Medium and low priority
    /// entries stay advisory-only.
    pub fn is_actionable(&self) -> bool {
        matches!(self.priority, Priority::Urgent | Priority::High)
    }
}

/// Maps a timeframe string to a due-date offset in days.
///
/// Unrecognised timeframes carry no due date.
pub fn due_date_offset_days(timeframe: &str) -> Option<i64> {
    match timeframe {
        "48 hours" | "Immediately" => Some(2),
        "1 week" => Some(7),
        "2 weeks" => Some(14),
        "1 month" => Some(30),
        _ => None,
    }
}

struct Template {
    id: &'static str,
    priority: Priority,
    category: Category,
    title: &'static str,
    description: &'static str,
    timeframe: Option<&'static str>,
}

const GENERIC_HEALTHY: &[Template] = &[
    Template {
        id: "gen_healthy_review",
        priority: Priority::Low,
        category: Category::Monitoring,
        title: "Routine reassessment",
        description: "Repeat the health check at the next scheduled review.",
        timeframe: None,
    },
    Template {
        id: "gen_healthy_lifestyle",
        priority: Priority::Low,
        category: Category::Lifestyle,
        title: "Maintain activity and diet",
        description: "Encourage current physical activity and a balanced diet.",
        timeframe: None,
    },
];

const GENERIC_AT_RISK: &[Template] = &[
    Template {
        id: "gen_at_risk_followup",
        priority: Priority::High,
        category: Category::FollowUp,
        title: "Practice follow-up",
        description: "Book a follow-up to recheck the at-risk domains.",
        timeframe: Some("2 weeks"),
    },
    Template {
        id: "gen_at_risk_monitoring",
        priority: Priority::Medium,
        category: Category::Monitoring,
        title: "Interval monitoring",
        description: "Track the at-risk domains until the follow-up appointment.",
        timeframe: Some("1 month"),
    },
];

const GENERIC_INTERVENTION: &[Template] = &[
    Template {
        id: "gen_intervention_review",
        priority: Priority::Urgent,
        category: Category::FollowUp,
        title: "Urgent clinical review",
        description: "Arrange an urgent review with the responsible clinician.",
        timeframe: Some("48 hours"),
    },
    Template {
        id: "gen_intervention_plan",
        priority: Priority::High,
        category: Category::Intervention,
        title: "Update the care plan",
        description: "Revise the care plan to address the intervention-level domains.",
        timeframe: Some("1 week"),
    },
];

fn generic_templates(overall: RiskLevel) -> &'static [Template] {
    match overall {
        RiskLevel::Healthy => GENERIC_HEALTHY,
        RiskLevel::AtRisk => GENERIC_AT_RISK,
        RiskLevel::Intervention => GENERIC_INTERVENTION,
    }
}

/// Sparse (domain id, risk level) → recommendation templates table.
///
/// Total by construction: unmapped combinations, including every
/// (domain, healthy) pair and unknown domain ids, return an empty slice.
fn domain_templates(domain_id: &str, risk: RiskLevel) -> &'static [Template] {
    use RiskLevel::{AtRisk, Intervention};

    match (domain_id, risk) {
        (catalog::COGNITION, AtRisk) => &[Template {
            id: "cog_memory_clinic",
            priority: Priority::High,
            category: Category::Referral,
            title: "Memory clinic referral",
            description: "Refer for a structured memory assessment.",
            timeframe: Some("2 weeks"),
        }],
        (catalog::COGNITION, Intervention) => &[Template {
            id: "cog_urgent_assessment",
            priority: Priority::Urgent,
            category: Category::Referral,
            title: "Urgent cognitive assessment",
            description: "Arrange an immediate cognitive assessment and safety review.",
            timeframe: Some("Immediately"),
        }],
        (catalog::MOOD, AtRisk) => &[Template {
            id: "mood_screen",
            priority: Priority::Medium,
            category: Category::FollowUp,
            title: "Structured mood screen",
            description: "Complete a structured depression screen at follow-up.",
            timeframe: Some("2 weeks"),
        }],
        (catalog::MOOD, Intervention) => &[Template {
            id: "mood_mental_health",
            priority: Priority::Urgent,
            category: Category::Referral,
            title: "Mental health referral",
            description: "Refer to the community mental health team.",
            timeframe: Some("48 hours"),
        }],
        (catalog::MOBILITY, AtRisk) => &[Template {
            id: "mob_physio",
            priority: Priority::High,
            category: Category::Referral,
            title: "Physiotherapy referral",
            description: "Refer for gait and balance assessment.",
            timeframe: Some("2 weeks"),
        }],
        (catalog::MOBILITY, Intervention) => &[Template {
            id: "mob_falls_clinic",
            priority: Priority::Urgent,
            category: Category::Referral,
            title: "Falls clinic referral",
            description: "Refer to the falls clinic for multifactorial assessment.",
            timeframe: Some("48 hours"),
        }],
        (catalog::NUTRITION, AtRisk) => &[Template {
            id: "nut_dietitian",
            priority: Priority::High,
            category: Category::Referral,
            title: "Dietitian review",
            description: "Refer for dietary assessment and a nutrition plan.",
            timeframe: Some("2 weeks"),
        }],
        (catalog::NUTRITION, Intervention) => &[Template {
            id: "nut_dietitian",
            priority: Priority::Urgent,
            category: Category::Referral,
            title: "Dietitian review",
            description: "Refer urgently for dietary assessment and a nutrition plan.",
            timeframe: Some("1 week"),
        }],
        (catalog::VISION, AtRisk) => &[Template {
            id: "vis_optometry",
            priority: Priority::Medium,
            category: Category::Referral,
            title: "Optometry check",
            description: "Arrange a sight test and spectacle review.",
            timeframe: Some("1 month"),
        }],
        (catalog::VISION, Intervention) => &[Template {
            id: "vis_optometry",
            priority: Priority::High,
            category: Category::Referral,
            title: "Optometry check",
            description: "Arrange a prompt sight test and spectacle review.",
            timeframe: Some("2 weeks"),
        }],
        (catalog::HEARING, AtRisk) => &[Template {
            id: "hear_audiology",
            priority: Priority::Medium,
            category: Category::Referral,
            title: "Audiology assessment",
            description: "Arrange a hearing assessment.",
            timeframe: Some("1 month"),
        }],
        (catalog::HEARING, Intervention) => &[Template {
            id: "hear_audiology",
            priority: Priority::High,
            category: Category::Referral,
            title: "Audiology assessment",
            description: "Arrange a prompt hearing assessment.",
            timeframe: Some("2 weeks"),
        }],
        (catalog::CONTINENCE, AtRisk) => &[Template {
            id: "con_review",
            priority: Priority::Medium,
            category: Category::FollowUp,
            title: "Continence review",
            description: "Review continence symptoms and reversible causes.",
            timeframe: Some("1 month"),
        }],
        (catalog::CONTINENCE, Intervention) => &[Template {
            id: "con_service",
            priority: Priority::High,
            category: Category::Referral,
            title: "Continence service referral",
            description: "Refer to the continence service.",
            timeframe: Some("2 weeks"),
        }],
        (catalog::DAILY_LIVING, AtRisk) => &[Template {
            id: "adl_ot",
            priority: Priority::Medium,
            category: Category::Referral,
            title: "Occupational therapy assessment",
            description: "Assess for aids and adaptations at home.",
            timeframe: Some("1 month"),
        }],
        (catalog::DAILY_LIVING, Intervention) => &[
            // Shares an id with the generic intervention entry; the generic
            // one is added first and wins during deduplication.
            Template {
                id: "gen_intervention_plan",
                priority: Priority::High,
                category: Category::Intervention,
                title: "Update the care plan",
                description: "Revise the care plan to address the intervention-level domains.",
                timeframe: Some("1 week"),
            },
            Template {
                id: "adl_care_package",
                priority: Priority::High,
                category: Category::Intervention,
                title: "Home care package review",
                description: "Review the home care package against current dependency.",
                timeframe: Some("1 week"),
            },
        ],
        _ => &[],
    }
}

fn instantiate(template: &Template, domain_name: Option<&str>, today: NaiveDate) -> Recommendation {
    let due_date = template
        .timeframe
        .and_then(due_date_offset_days)
        .map(|days| today + Duration::days(days));

    Recommendation {
        id: template.id.to_string(),
        priority: template.priority,
        category: template.category,
        title: template.title.to_string(),
        description: template.description.to_string(),
        domain_name: domain_name.map(str::to_string),
        timeframe: template.timeframe.map(str::to_string),
        due_date,
    }
}

/// Generates the deduplicated, priority-ordered recommendation list.
///
/// Generic recommendations for `overall` come first, then domain-specific
/// entries for each result. The list is stably sorted by priority (most
/// urgent first) and deduplicated by id keeping the first occurrence.
///
/// # Arguments
///
/// * `overall` - The aggregated risk level.
/// * `results` - Per-domain results, in catalog order.
/// * `catalog` - Used to resolve domain display names; results referencing
///   unknown domains simply carry no domain label.
/// * `today` - Anchor date for due-date derivation.
pub fn generate(
    overall: RiskLevel,
    results: &[DomainResult],
    catalog: &Catalog,
    today: NaiveDate,
) -> Vec<Recommendation> {
    let mut recommendations: Vec<Recommendation> = generic_templates(overall)
        .iter()
        .map(|template| instantiate(template, None, today))
        .collect();

    for result in results {
        let domain_name = catalog
            .domain(&result.domain_id)
            .map(|domain| domain.name.as_str());
        for template in domain_templates(&result.domain_id, result.risk_level) {
            recommendations.push(instantiate(template, domain_name, today));
        }
    }

    // Stable sort keeps the generic-first insertion order within a priority.
    recommendations.sort_by_key(|recommendation| recommendation.priority);

    let mut seen = BTreeSet::new();
    recommendations.retain(|recommendation| seen.insert(recommendation.id.clone()));

    recommendations
}
