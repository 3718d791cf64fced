//! The draft workflow controller.
//!
//! A linear state machine over the data-entry session for one subject:
//! subject binding (the [`DraftWorkflow::start`] constructor), the ordered
//! domain-group steps defined by the catalog, a review step and a terminal
//! committed state.
//!
//! Behavioural contract:
//! - A forward transition is permitted only when every question in the
//!   current step's domains has an answer; otherwise it is blocked and the
//!   exact set of missing question ids is returned.
//! - Every successful forward transition computes a preview assessment and
//!   persists a draft snapshot before the step pointer moves. A persistence
//!   failure leaves the step pointer and the in-memory answers untouched and
//!   is returned as a recoverable error; resubmitting is safe because the
//!   store upsert is idempotent (see [`crate::store::apply_upsert`]).
//! - A backward transition never validates and never persists.
//! - Re-selecting a subject with an open draft yields a [`ResumePrompt`]
//!   offering exactly two resolutions: `Continue` restores the saved step and
//!   answers verbatim; `StartOver` restores the answers as editable prefill
//!   but re-anchors the step pointer to the first step. Neither clears
//!   answers, and the controller never picks one silently.
//! - Committing is only reachable from the review step and, by policy,
//!   requires every catalog question to be answered.

use crate::catalog::{Catalog, StepGroup};
use crate::error::{EngineError, EngineResult};
use crate::scoring::{self, AnswerMap, Assessment};
use crate::store::{CompletedAssessment, DraftSession, DraftStatus, DraftStore};
use chrono::Utc;
use hra_types::{AnswerValue, NonEmptyText};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Where the workflow currently is.
///
/// Subject selection is not represented here: a workflow only exists once a
/// subject is bound via [`DraftWorkflow::start`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkflowState {
    /// Entering answers for the step group at this index.
    Step(usize),
    /// All step groups visited; awaiting confirmation.
    Review,
    /// Terminal: the assessment has been committed.
    Committed,
}

impl WorkflowState {
    fn name(&self) -> &'static str {
        match self {
            WorkflowState::Step(_) => "step",
            WorkflowState::Review => "review",
            WorkflowState::Committed => "committed",
        }
    }
}

/// Result of a forward transition attempt.
#[derive(Debug)]
pub enum NextOutcome {
    /// The current step is incomplete; the step pointer did not move.
    Blocked { missing: Vec<String> },
    /// Snapshot persisted and step advanced; `preview` reflects all answers
    /// entered so far.
    Advanced { preview: Assessment },
}

/// Result of a commit attempt from the review step.
#[derive(Debug)]
pub enum CompleteOutcome {
    /// The catalog is not fully answered; nothing was persisted.
    Blocked { missing: Vec<String> },
    /// The assessment was committed and the draft closed.
    Committed(CompletedAssessment),
}

/// Outcome of binding a subject: either a fresh session or a prompt to
/// resolve an existing open draft.
pub enum WorkflowStart<'a, S: DraftStore> {
    Fresh(DraftWorkflow<'a, S>),
    Resumable(ResumePrompt<'a, S>),
}

/// An open draft was found for the subject; the caller must choose how to
/// resume. There is deliberately no third option and no default.
pub struct ResumePrompt<'a, S: DraftStore> {
    catalog: &'a Catalog,
    store: &'a S,
    assessor_id: Uuid,
    saved: DraftSession,
}

impl<'a, S: DraftStore> ResumePrompt<'a, S> {
    /// The step index the draft was parked at.
    pub fn saved_step(&self) -> usize {
        self.saved.current_step
    }

    /// When the draft was last snapshotted.
    pub fn saved_at(&self) -> chrono::DateTime<Utc> {
        self.saved.updated_at
    }

    /// Resumes exactly where the draft left off.
    pub fn continue_session(self) -> DraftWorkflow<'a, S> {
        let state = if self.saved.current_step >= self.catalog.steps().len() {
            WorkflowState::Review
        } else {
            WorkflowState::Step(self.saved.current_step)
        };
        self.into_workflow(state)
    }

    /// Re-anchors the step pointer to the first step while keeping every
    /// saved answer visible and editable. This is not a reset: no answers are
    /// cleared.
    pub fn start_over(self) -> DraftWorkflow<'a, S> {
        self.into_workflow(WorkflowState::Step(0))
    }

    fn into_workflow(self, state: WorkflowState) -> DraftWorkflow<'a, S> {
        let answers = sanitize_answers(self.catalog, self.saved.answers);
        DraftWorkflow {
            catalog: self.catalog,
            store: self.store,
            subject_id: self.saved.subject_id,
            assessor_id: self.assessor_id,
            state,
            answers,
            domain_notes: self.saved.domain_notes,
            general_notes: self.saved.general_notes,
            version: self.saved.version,
            created_at: self.saved.created_at,
            completion_id: None,
        }
    }
}

/// Drops stored answers that reference ids the current catalog does not
/// define. Schema drift fails closed per domain: the affected entries become
/// "unanswered" and the rest of the draft remains usable.
fn sanitize_answers(catalog: &Catalog, answers: AnswerMap) -> AnswerMap {
    let mut sanitized = AnswerMap::new();
    for (domain_id, domain_answers) in answers {
        let Some(domain) = catalog.domain(&domain_id) else {
            tracing::warn!(domain = %domain_id, "dropping answers for unknown domain");
            continue;
        };
        let mut kept = scoring::DomainAnswers::new();
        for (question_id, value) in domain_answers {
            if domain.question(&question_id).is_some() {
                kept.insert(question_id, value);
            } else {
                tracing::warn!(
                    domain = %domain_id,
                    question = %question_id,
                    "dropping answer for unknown question"
                );
            }
        }
        if !kept.is_empty() {
            sanitized.insert(domain_id, kept);
        }
    }
    sanitized
}

/// The stateful draft workflow for one subject.
pub struct DraftWorkflow<'a, S: DraftStore> {
    catalog: &'a Catalog,
    store: &'a S,
    subject_id: Uuid,
    assessor_id: Uuid,
    state: WorkflowState,
    answers: AnswerMap,
    domain_notes: BTreeMap<String, String>,
    general_notes: Option<String>,
    version: u64,
    created_at: chrono::DateTime<Utc>,
    /// Allocated on the first commit attempt and reused on retry, so the
    /// store can tell a replayed promotion from a new one.
    completion_id: Option<Uuid>,
}

impl<'a, S: DraftStore> DraftWorkflow<'a, S> {
    /// Binds a subject and assessor to a workflow session.
    ///
    /// If the subject already has an open draft, a [`ResumePrompt`] is
    /// returned so the caller can choose between continuing and starting
    /// over; the controller never resolves that choice itself.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the open-draft lookup fails.
    pub fn start(
        catalog: &'a Catalog,
        store: &'a S,
        subject_id: Uuid,
        assessor_id: Uuid,
    ) -> EngineResult<WorkflowStart<'a, S>> {
        match store.fetch_open_draft(subject_id)? {
            Some(saved) => Ok(WorkflowStart::Resumable(ResumePrompt {
                catalog,
                store,
                assessor_id,
                saved,
            })),
            None => Ok(WorkflowStart::Fresh(DraftWorkflow {
                catalog,
                store,
                subject_id,
                assessor_id,
                state: WorkflowState::Step(0),
                answers: AnswerMap::new(),
                domain_notes: BTreeMap::new(),
                general_notes: None,
                version: 0,
                created_at: Utc::now(),
                completion_id: None,
            })),
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn subject_id(&self) -> Uuid {
        self.subject_id
    }

    pub fn answers(&self) -> &AnswerMap {
        &self.answers
    }

    /// The step group currently being entered, if the workflow is on a step.
    pub fn current_step(&self) -> Option<(usize, &StepGroup)> {
        match self.state {
            WorkflowState::Step(index) => self.catalog.step(index).map(|step| (index, step)),
            _ => None,
        }
    }

    /// Records an answer. Answers for any catalog question may be edited at
    /// any point before commit (the review step and a started-over session
    /// both edit earlier answers), so this does not restrict to the current
    /// step.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownDomain`] / [`EngineError::UnknownQuestion`]
    /// for ids the catalog does not define, and
    /// [`EngineError::InvalidTransition`] once committed.
    pub fn set_answer(
        &mut self,
        domain_id: &str,
        question_id: &str,
        value: AnswerValue,
    ) -> EngineResult<()> {
        self.ensure_editable("record an answer")?;
        let domain = self
            .catalog
            .domain(domain_id)
            .ok_or_else(|| EngineError::UnknownDomain(domain_id.to_string()))?;
        if domain.question(question_id).is_none() {
            return Err(EngineError::UnknownQuestion {
                domain: domain_id.to_string(),
                question: question_id.to_string(),
            });
        }

        self.answers
            .entry(domain_id.to_string())
            .or_default()
            .insert(question_id.to_string(), value);
        Ok(())
    }

    /// Attaches free-text notes to a domain.
    pub fn set_domain_notes(
        &mut self,
        domain_id: &str,
        notes: NonEmptyText,
    ) -> EngineResult<()> {
        self.ensure_editable("edit notes")?;
        if self.catalog.domain(domain_id).is_none() {
            return Err(EngineError::UnknownDomain(domain_id.to_string()));
        }
        self.domain_notes
            .insert(domain_id.to_string(), notes.into_string());
        Ok(())
    }

    pub fn clear_domain_notes(&mut self, domain_id: &str) {
        self.domain_notes.remove(domain_id);
    }

    pub fn set_general_notes(&mut self, notes: Option<NonEmptyText>) {
        self.general_notes = notes.map(NonEmptyText::into_string);
    }

    /// Computes a live preview assessment over all answers entered so far.
    /// Unanswered questions score 0; this is display-only and never gates a
    /// transition.
    pub fn preview(&self) -> Assessment {
        scoring::compute_assessment(
            self.catalog,
            &self.answers,
            &self.domain_notes,
            Utc::now().date_naive(),
        )
    }

    /// Question ids in the current step's domains that are still unanswered.
    pub fn missing_in_current_step(&self) -> Vec<String> {
        match self.state {
            WorkflowState::Step(index) => self.missing_in_step(index),
            _ => Vec::new(),
        }
    }

    fn missing_in_step(&self, index: usize) -> Vec<String> {
        let Some(step) = self.catalog.step(index) else {
            return Vec::new();
        };
        step.domain_ids
            .iter()
            .filter_map(|domain_id| self.catalog.domain(domain_id))
            .flat_map(|domain| {
                scoring::missing_question_ids(domain, self.answers.get(&domain.id))
            })
            .collect()
    }

    fn missing_overall(&self) -> Vec<String> {
        self.catalog
            .domains()
            .iter()
            .flat_map(|domain| {
                scoring::missing_question_ids(domain, self.answers.get(&domain.id))
            })
            .collect()
    }

    /// Attempts the forward transition.
    ///
    /// Blocked if any question in the current step's domains is unanswered.
    /// Otherwise a snapshot is persisted and the step pointer advances (to
    /// the next step, or to review after the last step).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTransition`] when not on a step, and
    /// [`EngineError::Store`] when the snapshot could not be persisted — in
    /// which case the step pointer and all in-memory answers are unchanged
    /// and the call may be retried as-is.
    pub fn next(&mut self) -> EngineResult<NextOutcome> {
        let WorkflowState::Step(index) = self.state else {
            return Err(EngineError::InvalidTransition {
                state: self.state.name(),
                action: "advance",
            });
        };

        let missing = self.missing_in_step(index);
        if !missing.is_empty() {
            return Ok(NextOutcome::Blocked { missing });
        }

        let preview = self.preview();
        let snapshot = self.snapshot(index + 1, preview.overall_risk);
        let stored = self.store.upsert_draft(&snapshot)?;
        self.version = stored.version;
        self.created_at = stored.created_at;

        self.state = if index + 1 >= self.catalog.steps().len() {
            WorkflowState::Review
        } else {
            WorkflowState::Step(index + 1)
        };
        tracing::debug!(
            subject = %self.subject_id,
            step = index + 1,
            "draft snapshot persisted, step advanced"
        );

        Ok(NextOutcome::Advanced { preview })
    }

    /// Moves back one step. Never validates, never persists.
    ///
    /// Returns `false` when already at the first step (or committed).
    pub fn previous(&mut self) -> bool {
        match self.state {
            WorkflowState::Step(0) | WorkflowState::Committed => false,
            WorkflowState::Step(index) => {
                self.state = WorkflowState::Step(index - 1);
                true
            }
            WorkflowState::Review => {
                self.state = WorkflowState::Step(self.catalog.steps().len() - 1);
                true
            }
        }
    }

    /// Commits the assessment from the review step.
    ///
    /// Policy: a commit requires every catalog question to be answered; a
    /// degenerate or partial assessment cannot be committed even though the
    /// aggregator would happily score it.
    ///
    /// On success exactly one completed record is persisted and the subject
    /// has no open draft afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTransition`] when not at review, and
    /// [`EngineError::Store`] if persisting the completed assessment fails —
    /// the workflow then stays at review and can retry. A retried commit
    /// reuses the same assessment id, so a promotion that was applied before
    /// the failure surfaced is never appended twice.
    pub fn complete(&mut self) -> EngineResult<CompleteOutcome> {
        if self.state != WorkflowState::Review {
            return Err(EngineError::InvalidTransition {
                state: self.state.name(),
                action: "commit",
            });
        }

        let missing = self.missing_overall();
        if !missing.is_empty() {
            return Ok(CompleteOutcome::Blocked { missing });
        }

        // Every answer is present, so this preview is the authoritative
        // final result.
        let assessment = self.preview();
        let assessment_id = *self.completion_id.get_or_insert_with(Uuid::new_v4);
        let completed = CompletedAssessment {
            assessment_id,
            subject_id: self.subject_id,
            assessor_id: self.assessor_id,
            assessment,
            general_notes: self.general_notes.clone(),
            completed_at: Utc::now(),
        };
        self.store.promote_draft(self.subject_id, &completed)?;
        self.state = WorkflowState::Committed;
        tracing::debug!(subject = %self.subject_id, "assessment committed");

        Ok(CompleteOutcome::Committed(completed))
    }

    fn snapshot(&self, next_step: usize, overall_risk: scoring::RiskLevel) -> DraftSession {
        let now = Utc::now();
        DraftSession {
            subject_id: self.subject_id,
            assessor_id: self.assessor_id,
            current_step: next_step,
            answers: self.answers.clone(),
            domain_notes: self.domain_notes.clone(),
            general_notes: self.general_notes.clone(),
            overall_risk,
            status: DraftStatus::Draft,
            version: self.version,
            created_at: self.created_at,
            updated_at: now,
        }
    }

    fn ensure_editable(&self, action: &'static str) -> EngineResult<()> {
        if self.state == WorkflowState::Committed {
            return Err(EngineError::InvalidTransition {
                state: self.state.name(),
                action,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::RiskLevel;
    use crate::store::{MemoryDraftStore, StoreError, StoreResult};
    use std::cell::Cell;

    fn answer(value: u8) -> AnswerValue {
        AnswerValue::new(value).expect("valid answer")
    }

    fn fresh<'a>(
        catalog: &'a Catalog,
        store: &'a MemoryDraftStore,
        subject: Uuid,
    ) -> DraftWorkflow<'a, MemoryDraftStore> {
        match DraftWorkflow::start(catalog, store, subject, Uuid::new_v4()).expect("start") {
            WorkflowStart::Fresh(workflow) => workflow,
            WorkflowStart::Resumable(_) => panic!("expected a fresh session"),
        }
    }

    /// Answers every question of every domain in the given step with `value`.
    fn fill_step(workflow: &mut DraftWorkflow<'_, impl DraftStore>, index: usize, value: u8) {
        let catalog = Catalog::builtin();
        let step = catalog.step(index).expect("step exists").clone();
        for domain_id in &step.domain_ids {
            let domain = catalog.domain(domain_id).expect("domain exists").clone();
            for question in &domain.questions {
                workflow
                    .set_answer(domain_id, &question.id, answer(value))
                    .expect("answer accepted");
            }
        }
    }

    #[test]
    fn test_blocked_next_reports_exact_missing_ids_and_keeps_step() {
        let catalog = Catalog::builtin();
        let store = MemoryDraftStore::new();
        let mut workflow = fresh(&catalog, &store, Uuid::new_v4());

        fill_step(&mut workflow, 0, 0);
        match workflow.next().expect("next") {
            NextOutcome::Advanced { .. } => {}
            NextOutcome::Blocked { missing } => panic!("unexpected block: {missing:?}"),
        }

        // Mobility step: answer one of two questions.
        workflow
            .set_answer("mobility", "mob_1", answer(1))
            .expect("answer accepted");
        match workflow.next().expect("next") {
            NextOutcome::Blocked { missing } => {
                assert_eq!(missing, vec!["mob_2".to_string()]);
            }
            NextOutcome::Advanced { .. } => panic!("should have been blocked"),
        }
        assert_eq!(workflow.state(), WorkflowState::Step(1));
    }

    #[test]
    fn test_current_step_and_missing_ids_track_the_workflow_position() {
        let catalog = Catalog::builtin();
        let store = MemoryDraftStore::new();
        let mut workflow = fresh(&catalog, &store, Uuid::new_v4());

        let (index, step) = workflow.current_step().expect("on a step");
        assert_eq!(index, 0);
        assert_eq!(step.domain_ids, vec!["cognition", "mood"]);
        assert_eq!(
            workflow.missing_in_current_step(),
            vec!["cog_1".to_string(), "mood_1".to_string(), "mood_2".to_string()]
        );

        workflow
            .set_answer("cognition", "cog_1", answer(0))
            .expect("answer accepted");
        assert_eq!(
            workflow.missing_in_current_step(),
            vec!["mood_1".to_string(), "mood_2".to_string()]
        );

        for step in 0..catalog.steps().len() {
            fill_step(&mut workflow, step, 0);
            workflow.next().expect("next");
        }
        assert_eq!(workflow.state(), WorkflowState::Review);
        assert!(workflow.current_step().is_none());
        assert!(workflow.missing_in_current_step().is_empty());
    }

    #[test]
    fn test_walkthrough_to_commit() {
        let catalog = Catalog::builtin();
        let store = MemoryDraftStore::new();
        let subject = Uuid::new_v4();
        let mut workflow = fresh(&catalog, &store, subject);

        for step in 0..catalog.steps().len() {
            fill_step(&mut workflow, step, 0);
            match workflow.next().expect("next") {
                NextOutcome::Advanced { .. } => {}
                NextOutcome::Blocked { missing } => panic!("blocked at {step}: {missing:?}"),
            }
        }
        assert_eq!(workflow.state(), WorkflowState::Review);

        let completed = match workflow.complete().expect("complete") {
            CompleteOutcome::Committed(completed) => completed,
            CompleteOutcome::Blocked { missing } => panic!("blocked: {missing:?}"),
        };
        assert_eq!(workflow.state(), WorkflowState::Committed);
        assert_eq!(completed.assessment.overall_risk, RiskLevel::Healthy);

        // Exactly one completed record, no open draft.
        assert!(store.fetch_open_draft(subject).expect("fetch").is_none());
        let history = store.fetch_latest_completed(subject, 10).expect("history");
        assert_eq!(history.len(), 1);

        // The stored per-domain results reproduce the committed overall risk.
        let reconstructed =
            scoring::aggregate_risk(&history[0].assessment.domain_results);
        assert_eq!(reconstructed, completed.assessment.overall_risk);
    }

    #[test]
    fn test_commit_requires_review_state() {
        let catalog = Catalog::builtin();
        let store = MemoryDraftStore::new();
        let mut workflow = fresh(&catalog, &store, Uuid::new_v4());

        let err = workflow.complete().expect_err("should refuse");
        assert!(matches!(
            err,
            EngineError::InvalidTransition {
                state: "step",
                action: "commit"
            }
        ));
    }

    #[test]
    fn test_previous_never_persists_and_stops_at_first_step() {
        let catalog = Catalog::builtin();
        let store = MemoryDraftStore::new();
        let subject = Uuid::new_v4();
        let mut workflow = fresh(&catalog, &store, subject);

        assert!(!workflow.previous());

        fill_step(&mut workflow, 0, 1);
        workflow.next().expect("next");
        assert_eq!(workflow.state(), WorkflowState::Step(1));

        let saved = store
            .fetch_open_draft(subject)
            .expect("fetch")
            .expect("draft exists");
        assert!(workflow.previous());
        assert_eq!(workflow.state(), WorkflowState::Step(0));

        // Going back did not touch the stored snapshot.
        let after = store
            .fetch_open_draft(subject)
            .expect("fetch")
            .expect("draft exists");
        assert_eq!(after, saved);
    }

    #[test]
    fn test_resume_continue_restores_saved_position() {
        let catalog = Catalog::builtin();
        let store = MemoryDraftStore::new();
        let subject = Uuid::new_v4();

        let started = Utc::now();
        let mut workflow = fresh(&catalog, &store, subject);
        fill_step(&mut workflow, 0, 2);
        workflow.next().expect("next");
        fill_step(&mut workflow, 1, 1);
        workflow.next().expect("next");
        drop(workflow);

        let prompt = match DraftWorkflow::start(&catalog, &store, subject, Uuid::new_v4())
            .expect("start")
        {
            WorkflowStart::Resumable(prompt) => prompt,
            WorkflowStart::Fresh(_) => panic!("expected an open draft"),
        };
        assert_eq!(prompt.saved_step(), 2);
        assert!(prompt.saved_at() >= started);

        let resumed = prompt.continue_session();
        assert_eq!(resumed.state(), WorkflowState::Step(2));
        assert_eq!(
            resumed.answers()["mobility"]["mob_2"],
            answer(1)
        );
    }

    #[test]
    fn test_resume_start_over_keeps_answers_but_resets_step() {
        let catalog = Catalog::builtin();
        let store = MemoryDraftStore::new();
        let subject = Uuid::new_v4();

        let mut workflow = fresh(&catalog, &store, subject);
        fill_step(&mut workflow, 0, 2);
        workflow.next().expect("next");
        drop(workflow);

        let prompt = match DraftWorkflow::start(&catalog, &store, subject, Uuid::new_v4())
            .expect("start")
        {
            WorkflowStart::Resumable(prompt) => prompt,
            WorkflowStart::Fresh(_) => panic!("expected an open draft"),
        };
        let restarted = prompt.start_over();
        assert_eq!(restarted.state(), WorkflowState::Step(0));
        // Prior answers stay visible and editable.
        assert_eq!(restarted.answers()["cognition"]["cog_1"], answer(2));
    }

    #[test]
    fn test_resume_drops_answers_unknown_to_the_catalog() {
        let catalog = Catalog::builtin();
        let store = MemoryDraftStore::new();
        let subject = Uuid::new_v4();

        let mut workflow = fresh(&catalog, &store, subject);
        fill_step(&mut workflow, 0, 1);
        workflow.next().expect("next");
        drop(workflow);

        // Simulate a draft written by an older catalog revision.
        let mut drifted = store
            .fetch_open_draft(subject)
            .expect("fetch")
            .expect("draft exists");
        drifted
            .answers
            .entry("cognition".into())
            .or_default()
            .insert("cog_99".into(), answer(2));
        drifted
            .answers
            .insert("phrenology".into(), [("phr_1".to_string(), answer(2))].into());
        store.upsert_draft(&drifted).expect("upsert drifted");

        let prompt = match DraftWorkflow::start(&catalog, &store, subject, Uuid::new_v4())
            .expect("start")
        {
            WorkflowStart::Resumable(prompt) => prompt,
            WorkflowStart::Fresh(_) => panic!("expected an open draft"),
        };
        let resumed = prompt.continue_session();

        assert!(!resumed.answers().contains_key("phrenology"));
        assert!(!resumed.answers()["cognition"].contains_key("cog_99"));
        assert!(resumed.answers()["cognition"].contains_key("cog_1"));
    }

    #[test]
    fn test_set_answer_rejects_unknown_ids() {
        let catalog = Catalog::builtin();
        let store = MemoryDraftStore::new();
        let mut workflow = fresh(&catalog, &store, Uuid::new_v4());

        let err = workflow
            .set_answer("phrenology", "phr_1", answer(1))
            .expect_err("unknown domain");
        assert!(matches!(err, EngineError::UnknownDomain(_)));

        let err = workflow
            .set_answer("cognition", "cog_99", answer(1))
            .expect_err("unknown question");
        assert!(matches!(err, EngineError::UnknownQuestion { .. }));
    }

    /// Fails the first upsert, then behaves like the inner memory store.
    struct FlakyStore {
        inner: MemoryDraftStore,
        fail_next: Cell<bool>,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: MemoryDraftStore::new(),
                fail_next: Cell::new(true),
            }
        }
    }

    impl DraftStore for FlakyStore {
        fn fetch_open_draft(&self, subject_id: Uuid) -> StoreResult<Option<DraftSession>> {
            self.inner.fetch_open_draft(subject_id)
        }

        fn upsert_draft(&self, draft: &DraftSession) -> StoreResult<DraftSession> {
            if self.fail_next.replace(false) {
                return Err(StoreError::FileWrite(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk unavailable",
                )));
            }
            self.inner.upsert_draft(draft)
        }

        fn promote_draft(
            &self,
            subject_id: Uuid,
            completed: &CompletedAssessment,
        ) -> StoreResult<()> {
            self.inner.promote_draft(subject_id, completed)
        }

        fn fetch_latest_completed(
            &self,
            subject_id: Uuid,
            n: usize,
        ) -> StoreResult<Vec<CompletedAssessment>> {
            self.inner.fetch_latest_completed(subject_id, n)
        }
    }

    #[test]
    fn test_persistence_failure_keeps_state_and_retry_succeeds() {
        let catalog = Catalog::builtin();
        let store = FlakyStore::new();
        let mut workflow = match DraftWorkflow::start(
            &catalog,
            &store,
            Uuid::new_v4(),
            Uuid::new_v4(),
        )
        .expect("start")
        {
            WorkflowStart::Fresh(workflow) => workflow,
            WorkflowStart::Resumable(_) => panic!("expected a fresh session"),
        };

        fill_step(&mut workflow, 0, 1);
        let err = workflow.next().expect_err("first attempt fails");
        assert!(matches!(err, EngineError::Store(_)));

        // Step pointer and answers survive the failure.
        assert_eq!(workflow.state(), WorkflowState::Step(0));
        assert_eq!(workflow.answers()["cognition"]["cog_1"], answer(1));

        // The identical resubmission goes through.
        match workflow.next().expect("retry") {
            NextOutcome::Advanced { .. } => {}
            NextOutcome::Blocked { missing } => panic!("blocked: {missing:?}"),
        }
        assert_eq!(workflow.state(), WorkflowState::Step(1));
    }

    /// Applies each promotion to the inner store but reports the first one
    /// as failed, like a write that lands before the error surfaces.
    struct LatePromoteFailureStore {
        inner: MemoryDraftStore,
        fail_next_promote: Cell<bool>,
    }

    impl LatePromoteFailureStore {
        fn new() -> Self {
            Self {
                inner: MemoryDraftStore::new(),
                fail_next_promote: Cell::new(true),
            }
        }
    }

    impl DraftStore for LatePromoteFailureStore {
        fn fetch_open_draft(&self, subject_id: Uuid) -> StoreResult<Option<DraftSession>> {
            self.inner.fetch_open_draft(subject_id)
        }

        fn upsert_draft(&self, draft: &DraftSession) -> StoreResult<DraftSession> {
            self.inner.upsert_draft(draft)
        }

        fn promote_draft(
            &self,
            subject_id: Uuid,
            completed: &CompletedAssessment,
        ) -> StoreResult<()> {
            self.inner.promote_draft(subject_id, completed)?;
            if self.fail_next_promote.replace(false) {
                return Err(StoreError::FileWrite(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk unavailable",
                )));
            }
            Ok(())
        }

        fn fetch_latest_completed(
            &self,
            subject_id: Uuid,
            n: usize,
        ) -> StoreResult<Vec<CompletedAssessment>> {
            self.inner.fetch_latest_completed(subject_id, n)
        }
    }

    #[test]
    fn test_commit_retry_after_applied_promotion_keeps_one_record() {
        let catalog = Catalog::builtin();
        let store = LatePromoteFailureStore::new();
        let subject = Uuid::new_v4();
        let mut workflow =
            match DraftWorkflow::start(&catalog, &store, subject, Uuid::new_v4()).expect("start") {
                WorkflowStart::Fresh(workflow) => workflow,
                WorkflowStart::Resumable(_) => panic!("expected a fresh session"),
            };

        for step in 0..catalog.steps().len() {
            fill_step(&mut workflow, step, 1);
            workflow.next().expect("next");
        }

        // The promotion is applied but reported as failed; the workflow
        // stays at review and must be safe to retry.
        let err = workflow.complete().expect_err("first commit fails");
        assert!(matches!(err, EngineError::Store(_)));
        assert_eq!(workflow.state(), WorkflowState::Review);

        let committed = match workflow.complete().expect("retry") {
            CompleteOutcome::Committed(completed) => completed,
            CompleteOutcome::Blocked { missing } => panic!("blocked: {missing:?}"),
        };
        assert_eq!(workflow.state(), WorkflowState::Committed);

        // The retry replays the same commit; exactly one terminal record.
        let history = store.fetch_latest_completed(subject, 10).expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].assessment_id, committed.assessment_id);
    }

    #[test]
    fn test_commit_blocked_when_drift_leaves_a_question_unanswered() {
        let catalog = Catalog::builtin();
        let store = MemoryDraftStore::new();
        let subject = Uuid::new_v4();
        let mut workflow = fresh(&catalog, &store, subject);

        for step in 0..catalog.steps().len() {
            fill_step(&mut workflow, step, 0);
            workflow.next().expect("next");
        }
        assert_eq!(workflow.state(), WorkflowState::Review);
        drop(workflow);

        // A draft parked at review whose stored cognition answer no longer
        // matches the catalog: on resume it degrades to unanswered, so the
        // commit gate must block rather than commit a partial catalog.
        let mut drifted = store
            .fetch_open_draft(subject)
            .expect("fetch")
            .expect("draft exists");
        let cognition = drifted.answers.get_mut("cognition").expect("present");
        cognition.remove("cog_1");
        cognition.insert("cog_1_v2".into(), answer(0));
        store.upsert_draft(&drifted).expect("upsert drifted");

        let prompt = match DraftWorkflow::start(&catalog, &store, subject, Uuid::new_v4())
            .expect("start")
        {
            WorkflowStart::Resumable(prompt) => prompt,
            WorkflowStart::Fresh(_) => panic!("expected an open draft"),
        };
        let mut resumed = prompt.continue_session();
        assert_eq!(resumed.state(), WorkflowState::Review);

        match resumed.complete().expect("complete") {
            CompleteOutcome::Blocked { missing } => {
                assert_eq!(missing, vec!["cog_1".to_string()]);
            }
            CompleteOutcome::Committed(_) => panic!("should have been blocked"),
        }
        assert_eq!(resumed.state(), WorkflowState::Review);
    }

    #[test]
    fn test_notes_flow_into_results_and_committed_record() {
        let catalog = Catalog::builtin();
        let store = MemoryDraftStore::new();
        let mut workflow = fresh(&catalog, &store, Uuid::new_v4());

        workflow
            .set_domain_notes(
                "mobility",
                NonEmptyText::new("uses a walking frame").expect("valid notes"),
            )
            .expect("notes accepted");
        workflow.set_general_notes(Some(
            NonEmptyText::new("seen at home").expect("valid notes"),
        ));

        let preview = workflow.preview();
        let mobility = preview
            .domain_results
            .iter()
            .find(|result| result.domain_id == "mobility")
            .expect("mobility scored");
        assert_eq!(mobility.notes.as_deref(), Some("uses a walking frame"));

        for step in 0..catalog.steps().len() {
            fill_step(&mut workflow, step, 0);
            workflow.next().expect("next");
        }
        let completed = match workflow.complete().expect("complete") {
            CompleteOutcome::Committed(completed) => completed,
            CompleteOutcome::Blocked { missing } => panic!("blocked: {missing:?}"),
        };
        assert_eq!(completed.general_notes.as_deref(), Some("seen at home"));
    }

    #[test]
    fn test_cleared_domain_notes_leave_the_result_bare() {
        let catalog = Catalog::builtin();
        let store = MemoryDraftStore::new();
        let mut workflow = fresh(&catalog, &store, Uuid::new_v4());

        workflow
            .set_domain_notes(
                "mobility",
                NonEmptyText::new("uses a walking frame").expect("valid notes"),
            )
            .expect("notes accepted");
        workflow.clear_domain_notes("mobility");

        let mobility = workflow
            .preview()
            .domain_results
            .into_iter()
            .find(|result| result.domain_id == "mobility")
            .expect("mobility scored");
        assert_eq!(mobility.notes, None);
    }

    #[test]
    fn test_preview_scores_partial_answers_without_gating() {
        let catalog = Catalog::builtin();
        let store = MemoryDraftStore::new();
        let mut workflow = fresh(&catalog, &store, Uuid::new_v4());

        workflow
            .set_answer("cognition", "cog_1", answer(2))
            .expect("answer accepted");
        let preview = workflow.preview();
        assert_eq!(preview.overall_risk, RiskLevel::Intervention);
        assert_eq!(preview.total_score, 2);

        // The preview does not unlock the step: mood is still unanswered.
        match workflow.next().expect("next") {
            NextOutcome::Blocked { missing } => {
                assert_eq!(missing, vec!["mood_1".to_string(), "mood_2".to_string()]);
            }
            NextOutcome::Advanced { .. } => panic!("should have been blocked"),
        }
    }
}
