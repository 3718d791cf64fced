//! Flag predicate strategy table.
//!
//! A flag trigger marks a domain for clinical action independent of its
//! numeric score (for example, a single fall in the past year flags the
//! mobility domain even when the aggregate score is still healthy). The
//! predicates are executable logic and therefore live here, keyed by domain
//! id, rather than inside the serializable catalog records.
//!
//! Predicates are evaluated strictly against the supplied answer map: they
//! are only meaningful once the domain's questions are fully answered, and
//! callers must not rely on their value for a partial map.

use crate::catalog;
use crate::scoring::DomainAnswers;

/// A flag predicate over one domain's answers.
pub type FlagPredicate = fn(&DomainAnswers) -> bool;

/// Looks up the flag predicate for a domain id.
///
/// Domains without a predicate (most of the catalog) return `None`; unknown
/// domain ids fail closed the same way.
pub fn flag_predicate(domain_id: &str) -> Option<FlagPredicate> {
    match domain_id {
        catalog::COGNITION => Some(cognitive_impairment_likely),
        catalog::MOOD => Some(persistent_low_mood),
        catalog::MOBILITY => Some(fell_in_past_year),
        catalog::NUTRITION => Some(unintended_weight_loss),
        _ => None,
    }
}

/// Evaluates the flag for a domain, treating domains without a predicate as
/// never flagged.
pub fn evaluate(domain_id: &str, answers: &DomainAnswers) -> bool {
    flag_predicate(domain_id).is_some_and(|predicate| predicate(answers))
}

fn answer_value(answers: &DomainAnswers, question_id: &str) -> u8 {
    answers.get(question_id).map_or(0, |value| value.value())
}

fn cognitive_impairment_likely(answers: &DomainAnswers) -> bool {
    answer_value(answers, "cog_1") == 2
}

fn persistent_low_mood(answers: &DomainAnswers) -> bool {
    answer_value(answers, "mood_1") == 2 && answer_value(answers, "mood_2") == 2
}

// Fires on "Once" as well as "More than once".
fn fell_in_past_year(answers: &DomainAnswers) -> bool {
    answer_value(answers, "mob_2") >= 1
}

fn unintended_weight_loss(answers: &DomainAnswers) -> bool {
    answer_value(answers, "nut_1") == 2
}
