//! The health domain catalog.
//!
//! The catalog is the ordered, read-only registry of every health domain the
//! assessment covers, each with its questions and answer options. It is
//! resolved once at process start (either the built-in default or a versioned
//! YAML file, see [`crate::config::CoreConfig`]) and never mutated afterwards.
//!
//! Responsibilities:
//! - Define the serializable `Domain`/`Question`/`StepGroup` records
//! - Provide the built-in default catalog
//! - Parse and validate catalog YAML
//! - Provide fail-closed lookups: an unknown id returns `None`, never panics
//!
//! Flag predicates are deliberately *not* part of the catalog data so that the
//! catalog stays serializable and versionable; they live in [`crate::flags`],
//! keyed by domain id.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

/// Points awarded by the most severe option of a question.
pub const MAX_ANSWER_VALUE: u8 = 2;

/// Number of options every question must offer.
pub const OPTIONS_PER_QUESTION: usize = 3;

// Domain ids are referenced from the flag table and the recommendation
// tables, so they are named constants rather than repeated literals.
pub const COGNITION: &str = "cognition";
pub const MOOD: &str = "mood";
pub const MOBILITY: &str = "mobility";
pub const NUTRITION: &str = "nutrition";
pub const VISION: &str = "vision";
pub const HEARING: &str = "hearing";
pub const CONTINENCE: &str = "continence";
pub const DAILY_LIVING: &str = "daily_living";

/// One selectable answer for a question.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuestionOption {
    /// Human-readable option text.
    pub label: String,
    /// Severity value, 0 (no concern) to 2 (significant concern).
    pub value: u8,
}

/// One question within a domain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Question {
    /// Identifier, unique within the whole catalog (e.g. `mob_2`).
    pub id: String,
    /// The question text shown to the assessor.
    pub prompt: String,
    /// Exactly three options with values 0, 1, 2 in ascending severity.
    pub options: Vec<QuestionOption>,
}

/// One health dimension assessed (e.g. cognition, mobility).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Domain {
    /// Stable identifier (e.g. `mobility`).
    pub id: String,
    /// Display name (e.g. `Mobility`).
    pub name: String,
    /// Ordered questions.
    pub questions: Vec<Question>,
    /// Action text surfaced when this domain's flag predicate fires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_action: Option<String>,
}

impl Domain {
    /// The highest score this domain can reach.
    pub fn max_score(&self) -> u32 {
        self.questions.len() as u32 * u32::from(MAX_ANSWER_VALUE)
    }

    /// Looks up a question by id. Unknown ids return `None`.
    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }
}

/// One data-entry step of the draft workflow, covering one or more domains.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepGroup {
    /// Step title shown in the workflow (e.g. `Mobility & falls`).
    pub title: String,
    /// Domains covered by this step, in catalog order.
    pub domain_ids: Vec<String>,
}

/// The immutable domain catalog.
///
/// Catalog order is stable and is also the canonical step order for the
/// draft workflow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Catalog {
    domains: Vec<Domain>,
    steps: Vec<StepGroup>,
}

impl Catalog {
    /// Parses a catalog from YAML text and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CatalogParse`] if the YAML does not match the
    /// catalog schema (unknown keys are rejected), or
    /// [`EngineError::InvalidInput`] if the parsed catalog violates a
    /// structural rule (see [`Catalog::validate`]).
    pub fn from_yaml(yaml_text: &str) -> EngineResult<Self> {
        let catalog: Catalog =
            serde_yaml::from_str(yaml_text).map_err(EngineError::CatalogParse)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Ordered list of all domains.
    pub fn domains(&self) -> &[Domain] {
        &self.domains
    }

    /// Looks up a domain by id. Unknown ids return `None` (fail closed).
    pub fn domain(&self, domain_id: &str) -> Option<&Domain> {
        self.domains.iter().find(|d| d.id == domain_id)
    }

    /// Ordered workflow step groups.
    pub fn steps(&self) -> &[StepGroup] {
        &self.steps
    }

    /// Looks up a step group by index.
    pub fn step(&self, index: usize) -> Option<&StepGroup> {
        self.steps.get(index)
    }

    /// Total number of questions across all domains.
    pub fn question_count(&self) -> usize {
        self.domains.iter().map(|d| d.questions.len()).sum()
    }

    /// Validates the structural rules of the catalog.
    ///
    /// Rules:
    /// - at least one domain, each with at least one question
    /// - domain ids and question ids are unique across the catalog
    /// - every question offers exactly three options valued 0, 1, 2 ascending
    /// - every domain appears in exactly one step group, in catalog order
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] describing the first violation.
    pub fn validate(&self) -> EngineResult<()> {
        if self.domains.is_empty() {
            return Err(EngineError::InvalidInput(
                "catalog must define at least one domain".into(),
            ));
        }

        let mut seen_domains = std::collections::BTreeSet::new();
        let mut seen_questions = std::collections::BTreeSet::new();

        for domain in &self.domains {
            if !seen_domains.insert(domain.id.as_str()) {
                return Err(EngineError::InvalidInput(format!(
                    "duplicate domain id '{}'",
                    domain.id
                )));
            }
            if domain.questions.is_empty() {
                return Err(EngineError::InvalidInput(format!(
                    "domain '{}' has no questions",
                    domain.id
                )));
            }

            for question in &domain.questions {
                if !seen_questions.insert(question.id.as_str()) {
                    return Err(EngineError::InvalidInput(format!(
                        "duplicate question id '{}'",
                        question.id
                    )));
                }
                if question.options.len() != OPTIONS_PER_QUESTION {
                    return Err(EngineError::InvalidInput(format!(
                        "question '{}' must have exactly {} options",
                        question.id, OPTIONS_PER_QUESTION
                    )));
                }
                for (expected, option) in question.options.iter().enumerate() {
                    if usize::from(option.value) != expected {
                        return Err(EngineError::InvalidInput(format!(
                            "question '{}' options must carry values 0, 1, 2 in ascending order",
                            question.id
                        )));
                    }
                }
            }
        }

        // Step groups must cover every domain exactly once.
        let mut stepped = std::collections::BTreeSet::new();
        for step in &self.steps {
            if step.domain_ids.is_empty() {
                return Err(EngineError::InvalidInput(format!(
                    "step '{}' covers no domains",
                    step.title
                )));
            }
            for domain_id in &step.domain_ids {
                if !seen_domains.contains(domain_id.as_str()) {
                    return Err(EngineError::InvalidInput(format!(
                        "step '{}' references unknown domain '{}'",
                        step.title, domain_id
                    )));
                }
                if !stepped.insert(domain_id.as_str()) {
                    return Err(EngineError::InvalidInput(format!(
                        "domain '{}' appears in more than one step",
                        domain_id
                    )));
                }
            }
        }
        if stepped.len() != seen_domains.len() {
            return Err(EngineError::InvalidInput(
                "every domain must appear in a step group".into(),
            ));
        }

        Ok(())
    }

    /// The built-in default catalog.
    ///
    /// Eight domains covering a general health check, grouped into five
    /// workflow steps. Projects that need a different question set supply a
    /// YAML catalog via configuration instead.
    pub fn builtin() -> Self {
        fn frequency_options() -> Vec<QuestionOption> {
            options(&["No difficulty", "Some difficulty", "Frequent difficulty"])
        }

        fn options(labels: &[&str; 3]) -> Vec<QuestionOption> {
            labels
                .iter()
                .enumerate()
                .map(|(value, label)| QuestionOption {
                    label: (*label).to_string(),
                    value: value as u8,
                })
                .collect()
        }

        fn question(id: &str, prompt: &str, options: Vec<QuestionOption>) -> Question {
            Question {
                id: id.to_string(),
                prompt: prompt.to_string(),
                options,
            }
        }

        fn domain(
            id: &str,
            name: &str,
            questions: Vec<Question>,
            trigger_action: Option<&str>,
        ) -> Domain {
            Domain {
                id: id.to_string(),
                name: name.to_string(),
                questions,
                trigger_action: trigger_action.map(str::to_string),
            }
        }

        fn step(title: &str, domain_ids: &[&str]) -> StepGroup {
            StepGroup {
                title: title.to_string(),
                domain_ids: domain_ids.iter().map(|id| (*id).to_string()).collect(),
            }
        }

        let domains = vec![
            domain(
                COGNITION,
                "Cognition",
                vec![question(
                    "cog_1",
                    "Does the person have trouble remembering recent events or staying oriented?",
                    options(&[
                        "No difficulty",
                        "Occasional lapses",
                        "Frequent or worsening difficulty",
                    ]),
                )],
                Some("Arrange a structured cognitive assessment"),
            ),
            domain(
                MOOD,
                "Mood",
                vec![
                    question(
                        "mood_1",
                        "Over the past month, has the person felt down, depressed or hopeless?",
                        options(&["Rarely or never", "Some days", "Most days"]),
                    ),
                    question(
                        "mood_2",
                        "Has the person lost interest or pleasure in their usual activities?",
                        options(&["Rarely or never", "Some days", "Most days"]),
                    ),
                ],
                Some("Same-week mental health follow-up"),
            ),
            domain(
                MOBILITY,
                "Mobility",
                vec![
                    question(
                        "mob_1",
                        "Does the person have difficulty walking, or problems with balance?",
                        options(&["None", "Some difficulty", "Unable without help"]),
                    ),
                    question(
                        "mob_2",
                        "How many times has the person fallen in the past year?",
                        options(&["None", "Once", "More than once"]),
                    ),
                ],
                Some("Falls risk review and home hazard check"),
            ),
            domain(
                NUTRITION,
                "Nutrition",
                vec![
                    question(
                        "nut_1",
                        "Has the person lost weight without trying in the past six months?",
                        options(&["No", "A little (under 3 kg)", "More than 3 kg"]),
                    ),
                    question(
                        "nut_2",
                        "How is the person's appetite?",
                        options(&["Normal", "Reduced", "Poor"]),
                    ),
                ],
                Some("Dietitian referral for unintended weight loss"),
            ),
            domain(
                VISION,
                "Vision",
                vec![question(
                    "vis_1",
                    "Does the person have difficulty reading or recognising faces, even with glasses?",
                    frequency_options(),
                )],
                None,
            ),
            domain(
                HEARING,
                "Hearing",
                vec![question(
                    "hear_1",
                    "Does the person have difficulty following a conversation, even in a quiet room?",
                    frequency_options(),
                )],
                None,
            ),
            domain(
                CONTINENCE,
                "Continence",
                vec![question(
                    "con_1",
                    "Does the person have bladder or bowel accidents?",
                    options(&["Never", "Occasionally", "Frequently"]),
                )],
                None,
            ),
            domain(
                DAILY_LIVING,
                "Daily Living",
                vec![
                    question(
                        "adl_1",
                        "Does the person need help with bathing, dressing or grooming?",
                        options(&["No help needed", "Needs some help", "Fully dependent"]),
                    ),
                    question(
                        "adl_2",
                        "Does the person need help managing meals or medicines?",
                        options(&["No help needed", "Needs some help", "Fully dependent"]),
                    ),
                ],
                None,
            ),
        ];

        let steps = vec![
            step("Mind & memory", &[COGNITION, MOOD]),
            step("Mobility & falls", &[MOBILITY]),
            step("Nutrition", &[NUTRITION]),
            step("Sensory", &[VISION, HEARING]),
            step("Continence & daily living", &[CONTINENCE, DAILY_LIVING]),
        ];

        let catalog = Catalog { domains, steps };
        debug_assert!(catalog.validate().is_ok());
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_valid() {
        let catalog = Catalog::builtin();
        assert!(catalog.validate().is_ok());
        assert_eq!(catalog.domains().len(), 8);
        assert_eq!(catalog.steps().len(), 5);
        assert_eq!(catalog.question_count(), 12);
    }

    #[test]
    fn test_builtin_catalog_max_scores() {
        let catalog = Catalog::builtin();
        let cognition = catalog.domain(COGNITION).expect("cognition exists");
        assert_eq!(cognition.max_score(), 2);
        let mobility = catalog.domain(MOBILITY).expect("mobility exists");
        assert_eq!(mobility.max_score(), 4);
    }

    #[test]
    fn test_unknown_domain_lookup_fails_closed() {
        let catalog = Catalog::builtin();
        assert!(catalog.domain("astral_projection").is_none());
    }

    #[test]
    fn test_steps_cover_every_domain_once() {
        let catalog = Catalog::builtin();
        let stepped: Vec<&String> = catalog
            .steps()
            .iter()
            .flat_map(|s| s.domain_ids.iter())
            .collect();
        assert_eq!(stepped.len(), catalog.domains().len());
    }

    #[test]
    fn test_catalog_round_trips_through_yaml() {
        let catalog = Catalog::builtin();
        let yaml = serde_yaml::to_string(&catalog).expect("serialize");
        let back = Catalog::from_yaml(&yaml).expect("parse");
        assert_eq!(back, catalog);
    }

    #[test]
    fn test_from_yaml_rejects_unknown_keys() {
        let yaml = r#"
domains:
  - id: cognition
    name: Cognition
    surprise: true
    questions: []
steps: []
"#;
        let err = Catalog::from_yaml(yaml).expect_err("should reject unknown key");
        assert!(matches!(err, EngineError::CatalogParse(_)));
    }

    #[test]
    fn test_validate_rejects_bad_option_values() {
        let yaml = r#"
domains:
  - id: cognition
    name: Cognition
    questions:
      - id: cog_1
        prompt: "Memory trouble?"
        options:
          - { label: "No", value: 0 }
          - { label: "Sometimes", value: 2 }
          - { label: "Often", value: 1 }
steps:
  - title: Mind
    domain_ids: [cognition]
"#;
        let err = Catalog::from_yaml(yaml).expect_err("should reject option order");
        assert!(
            matches!(err, EngineError::InvalidInput(msg) if msg.contains("ascending order"))
        );
    }

    #[test]
    fn test_validate_rejects_domain_missing_from_steps() {
        let yaml = r#"
domains:
  - id: cognition
    name: Cognition
    questions:
      - id: cog_1
        prompt: "Memory trouble?"
        options:
          - { label: "No", value: 0 }
          - { label: "Sometimes", value: 1 }
          - { label: "Often", value: 2 }
  - id: mood
    name: Mood
    questions:
      - id: mood_1
        prompt: "Feeling down?"
        options:
          - { label: "No", value: 0 }
          - { label: "Sometimes", value: 1 }
          - { label: "Often", value: 2 }
steps:
  - title: Mind
    domain_ids: [cognition]
"#;
        let err = Catalog::from_yaml(yaml).expect_err("should reject uncovered domain");
        assert!(
            matches!(err, EngineError::InvalidInput(msg) if msg.contains("step group"))
        );
    }
}
