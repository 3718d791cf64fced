//! # HRA Store
//!
//! Durable, file-backed implementation of the core persistence traits.
//!
//! Assessment data is stored as sharded JSON under a base directory:
//!
//! ```text
//! <data_dir>/<s1>/<s2>/<32hex-subject-uuid>/draft.json
//! <data_dir>/<s1>/<s2>/<32hex-subject-uuid>/completed/<seq>.json
//! ```
//!
//! where `s1`/`s2` are the first 4 hex characters of the subject UUID. The
//! draft file is a mutable upserted row guarded by the optimistic version
//! counter (see [`hra_core::store::apply_upsert`]); completed assessments are
//! immutable, sequence-numbered files that are only ever appended. A
//! promotion whose `assessment_id` matches the newest completed file is a
//! replay of an already-applied commit and only finishes the draft cleanup.
//!
//! The store assumes a single writer process per data directory: the version
//! check in `upsert_draft` is a read-check-write without a filesystem lock,
//! so it guards concurrent editing *sessions*, not concurrent writer
//! processes racing on the same draft file.

use hra_core::store::{
    apply_upsert, CompletedAssessment, DraftSession, DraftStatus, DraftStore, StoreError,
    StoreResult,
};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const DRAFT_FILE_NAME: &str = "draft.json";
const COMPLETED_DIR_NAME: &str = "completed";

/// File-backed [`DraftStore`].
#[derive(Clone, Debug)]
pub struct FileDraftStore {
    root: PathBuf,
}

impl FileDraftStore {
    /// Creates a store rooted at the given data directory. The directory is
    /// created lazily on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The sharded directory for a subject:
    /// `<root>/<s1>/<s2>/<32hex-uuid>`.
    fn subject_dir(&self, subject_id: Uuid) -> PathBuf {
        let hex = subject_id.simple().to_string();
        self.root.join(&hex[0..2]).join(&hex[2..4]).join(hex)
    }

    fn draft_path(&self, subject_id: Uuid) -> PathBuf {
        self.subject_dir(subject_id).join(DRAFT_FILE_NAME)
    }

    fn completed_dir(&self, subject_id: Uuid) -> PathBuf {
        self.subject_dir(subject_id).join(COMPLETED_DIR_NAME)
    }

    fn read_draft(&self, subject_id: Uuid) -> StoreResult<Option<DraftSession>> {
        let path = self.draft_path(subject_id);
        if !path.is_file() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path).map_err(StoreError::FileRead)?;
        let draft: DraftSession =
            serde_json::from_str(&contents).map_err(StoreError::Deserialization)?;
        Ok(Some(draft))
    }

    fn write_json(path: &Path, value: &impl serde::Serialize) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(StoreError::StorageDirCreation)?;
        }
        let json = serde_json::to_string_pretty(value).map_err(StoreError::Serialization)?;
        fs::write(path, json).map_err(StoreError::FileWrite)
    }

    /// Next sequence number for a completed assessment file.
    fn next_completed_seq(&self, subject_id: Uuid) -> StoreResult<u32> {
        let dir = self.completed_dir(subject_id);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(1),
            Err(e) => return Err(StoreError::FileRead(e)),
        };

        let mut highest = 0u32;
        for entry in entries.flatten() {
            if let Some(seq) = parse_seq(&entry.path()) {
                highest = highest.max(seq);
            }
        }
        Ok(highest + 1)
    }
}

fn parse_seq(path: &Path) -> Option<u32> {
    path.file_stem()?.to_str()?.parse().ok()
}

impl DraftStore for FileDraftStore {
    fn fetch_open_draft(&self, subject_id: Uuid) -> StoreResult<Option<DraftSession>> {
        Ok(self
            .read_draft(subject_id)?
            .filter(|draft| draft.status == DraftStatus::Draft))
    }

    fn upsert_draft(&self, draft: &DraftSession) -> StoreResult<DraftSession> {
        let existing = self.read_draft(draft.subject_id)?;
        let stored = apply_upsert(existing.as_ref(), draft, chrono::Utc::now())?;
        Self::write_json(&self.draft_path(draft.subject_id), &stored)?;
        Ok(stored)
    }

    fn promote_draft(
        &self,
        subject_id: Uuid,
        completed: &CompletedAssessment,
    ) -> StoreResult<()> {
        let newest = self.fetch_latest_completed(subject_id, 1)?;
        let already_applied = newest
            .first()
            .is_some_and(|latest| latest.assessment_id == completed.assessment_id);
        if !already_applied {
            let seq = self.next_completed_seq(subject_id)?;
            let path = self
                .completed_dir(subject_id)
                .join(format!("{seq:04}.json"));
            Self::write_json(&path, completed)?;
            tracing::debug!(subject = %subject_id, seq, "draft promoted to completed assessment");
        }

        match fs::remove_file(self.draft_path(subject_id)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::FileWrite(e)),
        }
        Ok(())
    }

    fn fetch_latest_completed(
        &self,
        subject_id: Uuid,
        n: usize,
    ) -> StoreResult<Vec<CompletedAssessment>> {
        let dir = self.completed_dir(subject_id);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::FileRead(e)),
        };

        let mut sequenced: Vec<(u32, PathBuf)> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                parse_seq(&path).map(|seq| (seq, path))
            })
            .collect();
        sequenced.sort_by(|a, b| b.0.cmp(&a.0));

        let mut latest = Vec::new();
        for (_, path) in sequenced.into_iter().take(n) {
            let contents = fs::read_to_string(&path).map_err(StoreError::FileRead)?;
            match serde_json::from_str::<CompletedAssessment>(&contents) {
                Ok(completed) => latest.push(completed),
                Err(_) => {
                    // An unreadable historical file must not take the whole
                    // history down with it.
                    tracing::warn!("failed to parse completed assessment: {}", path.display());
                }
            }
        }
        Ok(latest)
    }
}
