//! Draft and completed-assessment persistence contracts.
//!
//! The engine never talks to storage directly; the workflow controller works
//! against the [`DraftStore`] trait defined here. A sharded JSON
//! implementation lives in the `hra-store` crate, and [`MemoryDraftStore`]
//! provides an in-process implementation for tests and ephemeral use.
//!
//! Concurrency policy: a `DraftSession` carries an optimistic `version`
//! counter. An upsert whose version does not match the stored row is rejected
//! with [`StoreError::Conflict`] rather than applied last-write-wins, so two
//! concurrent editing sessions for the same subject cannot silently clobber
//! each other. Replaying an identical, already-applied payload is accepted
//! unchanged, which makes retries after a lost response safe.
//!
//! The same applies to commits: a [`CompletedAssessment`] carries an
//! `assessment_id` that stays stable across retries of the same commit, and
//! [`DraftStore::promote_draft`] must treat a payload whose id matches the
//! newest stored record as already applied — finishing any leftover draft
//! cleanup instead of appending a second terminal record.

use crate::scoring::{AnswerMap, Assessment, RiskLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to write assessment file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read assessment file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to serialize assessment data: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize assessment data: {0}")]
    Deserialization(serde_json::Error),
    #[error("draft version conflict: expected {expected}, found {found}")]
    Conflict { expected: u64, found: u64 },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Lifecycle status of a draft row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    Draft,
    Completed,
}

/// A resumable, partially entered assessment session.
///
/// One open draft is expected per subject; the store upserts against the
/// subject id rather than creating duplicates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftSession {
    pub subject_id: Uuid,
    pub assessor_id: Uuid,
    /// Index into the catalog's step groups; equal to the step count when the
    /// draft is parked at the review step.
    pub current_step: usize,
    pub answers: AnswerMap,
    /// Free-text notes per domain id.
    #[serde(default)]
    pub domain_notes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub general_notes: Option<String>,
    /// Preview overall risk at the time of the last snapshot.
    pub overall_risk: RiskLevel,
    pub status: DraftStatus,
    /// Optimistic concurrency counter, bumped by the store on every applied
    /// upsert. A new, never-persisted draft carries 0.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DraftSession {
    /// Whether two drafts carry the same content, ignoring the bookkeeping
    /// fields (`version`, `created_at`, `updated_at`, `status`).
    pub fn same_content(&self, other: &DraftSession) -> bool {
        self.subject_id == other.subject_id
            && self.assessor_id == other.assessor_id
            && self.current_step == other.current_step
            && self.answers == other.answers
            && self.domain_notes == other.domain_notes
            && self.general_notes == other.general_notes
            && self.overall_risk == other.overall_risk
    }
}

/// An immutable, committed assessment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedAssessment {
    /// Identity of this commit. The workflow allocates it once per commit
    /// attempt and reuses it on retry, so stores can recognise a replayed
    /// promotion and keep exactly one terminal record.
    pub assessment_id: Uuid,
    pub subject_id: Uuid,
    pub assessor_id: Uuid,
    pub assessment: Assessment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub general_notes: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Persistence operations the draft workflow requires.
///
/// Implementations must be safe to retry: see [`apply_upsert`] for the exact
/// version-reconciliation contract.
pub trait DraftStore {
    /// Fetches the open draft for a subject, if any.
    fn fetch_open_draft(&self, subject_id: Uuid) -> StoreResult<Option<DraftSession>>;

    /// Creates or updates the subject's draft row and returns the stored row
    /// (with its bumped version).
    fn upsert_draft(&self, draft: &DraftSession) -> StoreResult<DraftSession>;

    /// Promotes the subject's draft to a completed assessment: persists
    /// `completed` immutably and removes the open draft, so that exactly one
    /// terminal record results and no draft remains open for the subject.
    ///
    /// Must be idempotent under retry: when the newest stored record already
    /// carries `completed.assessment_id`, the promotion was applied before
    /// the caller saw the failure, and the implementation only finishes the
    /// draft cleanup instead of appending a duplicate.
    fn promote_draft(
        &self,
        subject_id: Uuid,
        completed: &CompletedAssessment,
    ) -> StoreResult<()>;

    /// Fetches up to `n` completed assessments for a subject, newest first.
    fn fetch_latest_completed(
        &self,
        subject_id: Uuid,
        n: usize,
    ) -> StoreResult<Vec<CompletedAssessment>>;
}

/// Reconciles an incoming draft against the stored row and returns the row to
/// persist.
///
/// Shared by store implementations so they all honour the same contract:
///
/// - no stored row: the incoming draft is stored with version 1
/// - incoming version equals the stored version: the update applies and the
///   version is bumped
/// - incoming version is one behind the stored version *and* the content is
///   identical: the payload was already applied (a retry after a lost
///   response) and the stored row is returned unchanged
/// - anything else: [`StoreError::Conflict`]
///
/// # Arguments
///
/// * `existing` - The currently stored row, if any.
/// * `incoming` - The draft the caller wants to persist.
/// * `now` - Timestamp for `updated_at` on an applied write.
pub fn apply_upsert(
    existing: Option<&DraftSession>,
    incoming: &DraftSession,
    now: DateTime<Utc>,
) -> StoreResult<DraftSession> {
    let Some(existing) = existing else {
        let mut stored = incoming.clone();
        stored.version = 1;
        stored.updated_at = now;
        return Ok(stored);
    };

    if incoming.version == existing.version {
        let mut stored = incoming.clone();
        stored.version = existing.version + 1;
        stored.created_at = existing.created_at;
        stored.updated_at = now;
        return Ok(stored);
    }

    if incoming.version + 1 == existing.version && existing.same_content(incoming) {
        // Idempotent replay of an already-applied snapshot.
        return Ok(existing.clone());
    }

    Err(StoreError::Conflict {
        expected: existing.version,
        found: incoming.version,
    })
}

/// In-memory [`DraftStore`] backed by mutexed maps.
///
/// Intended for tests and ephemeral single-process use; durable storage is
/// provided by the `hra-store` crate.
#[derive(Default)]
pub struct MemoryDraftStore {
    drafts: std::sync::Mutex<BTreeMap<Uuid, DraftSession>>,
    completed: std::sync::Mutex<BTreeMap<Uuid, Vec<CompletedAssessment>>>,
}

impl MemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DraftStore for MemoryDraftStore {
    fn fetch_open_draft(&self, subject_id: Uuid) -> StoreResult<Option<DraftSession>> {
        let drafts = self.drafts.lock().expect("draft map lock poisoned");
        Ok(drafts
            .get(&subject_id)
            .filter(|draft| draft.status == DraftStatus::Draft)
            .cloned())
    }

    fn upsert_draft(&self, draft: &DraftSession) -> StoreResult<DraftSession> {
        let mut drafts = self.drafts.lock().expect("draft map lock poisoned");
        let stored = apply_upsert(drafts.get(&draft.subject_id), draft, Utc::now())?;
        drafts.insert(draft.subject_id, stored.clone());
        Ok(stored)
    }

    fn promote_draft(
        &self,
        subject_id: Uuid,
        completed: &CompletedAssessment,
    ) -> StoreResult<()> {
        let mut drafts = self.drafts.lock().expect("draft map lock poisoned");
        drafts.remove(&subject_id);
        drop(drafts);

        let mut history = self.completed.lock().expect("completed map lock poisoned");
        let records = history.entry(subject_id).or_default();
        let already_applied = records
            .last()
            .is_some_and(|latest| latest.assessment_id == completed.assessment_id);
        if !already_applied {
            records.push(completed.clone());
        }
        Ok(())
    }

    fn fetch_latest_completed(
        &self,
        subject_id: Uuid,
        n: usize,
    ) -> StoreResult<Vec<CompletedAssessment>> {
        let history = self.completed.lock().expect("completed map lock poisoned");
        let mut latest: Vec<CompletedAssessment> =
            history.get(&subject_id).cloned().unwrap_or_default();
        latest.sort_by_key(|completed| completed.completed_at);
        latest.reverse();
        latest.truncate(n);
        Ok(latest)
    }
}
