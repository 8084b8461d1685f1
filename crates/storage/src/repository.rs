use async_trait::async_trait;
use chrono::{DateTime, Utc};
use course_core::model::{
    CompletionStatus, Concept, ConceptId, ConceptProgress, Course, CourseId, ProgressError, UserId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── PROGRESS RECORD ───────────────────────────────────────────────────────────
//

/// Persisted shape of a learner's per-concept progress.
///
/// Mirrors the domain `ConceptProgress` so repositories can read and
/// write rows without leaking storage concerns into the domain layer;
/// converting back re-runs the domain invariant checks.
#[derive(Debug, Clone)]
pub struct ProgressRecord {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub concept_id: ConceptId,
    pub mastery_score: Option<u8>,
    pub description_read: bool,
    pub video_watched: bool,
    pub quiz_passed: bool,
    pub attempts: u32,
    pub status: CompletionStatus,
    pub last_accessed_at: DateTime<Utc>,
}

impl ProgressRecord {
    #[must_use]
    pub fn from_progress(course_id: CourseId, progress: &ConceptProgress) -> Self {
        Self {
            user_id: progress.user_id(),
            course_id,
            concept_id: progress.concept_id(),
            mastery_score: progress.mastery_score(),
            description_read: progress.description_read(),
            video_watched: progress.video_watched(),
            quiz_passed: progress.quiz_passed(),
            attempts: progress.attempts(),
            status: progress.status(),
            last_accessed_at: progress.last_accessed_at(),
        }
    }

    /// Convert the record back into a domain `ConceptProgress`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the persisted fields violate the
    /// progress-record invariants.
    pub fn into_progress(self) -> Result<ConceptProgress, ProgressError> {
        ConceptProgress::from_persisted(
            self.user_id,
            self.concept_id,
            self.mastery_score,
            self.description_read,
            self.video_watched,
            self.quiz_passed,
            self.attempts,
            self.status,
            self.last_accessed_at,
        )
    }
}

//
// ─── REPOSITORY TRAITS ─────────────────────────────────────────────────────────
//

/// Repository contract for course aggregates.
#[async_trait]
pub trait CourseRepository: Send + Sync {
    /// Persist or update a course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the course cannot be stored.
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError>;

    /// Fetch a course by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_course(&self, id: CourseId) -> Result<Course, StorageError>;
}

/// Repository contract for a course's concepts.
#[async_trait]
pub trait ConceptRepository: Send + Sync {
    /// Persist or update a concept, including its prerequisite list.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the concept cannot be stored.
    async fn upsert_concept(&self, concept: &Concept) -> Result<(), StorageError>;

    /// All concepts of a course, ordered by course position.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on lookup failure.
    async fn list_concepts(&self, course_id: CourseId) -> Result<Vec<Concept>, StorageError>;

    /// Fetch specific concepts of a course by IDs.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if any are missing, or other storage errors.
    async fn get_concepts(
        &self,
        course_id: CourseId,
        ids: &[ConceptId],
    ) -> Result<Vec<Concept>, StorageError>;
}

/// Repository contract for per-(user, concept) progress.
///
/// The core treats this as a key-value store keyed by (user, concept);
/// a reset is persisted as an upsert of the cleared record, not a
/// physical delete, so the attempts history survives.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Persist or update one progress record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn upsert_progress(
        &self,
        course_id: CourseId,
        progress: &ConceptProgress,
    ) -> Result<(), StorageError>;

    /// Fetch one record; `None` when the learner has never touched the
    /// concept.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on lookup failure or an invariant-violating row.
    async fn get_progress(
        &self,
        user_id: UserId,
        concept_id: ConceptId,
    ) -> Result<Option<ConceptProgress>, StorageError>;

    /// The learner's course-wide mastery map. Only concepts holding a
    /// mastery score (passed since their last reset) appear.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on lookup failure.
    async fn mastery_map(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<HashMap<ConceptId, u8>, StorageError>;

    /// Every progress record the learner holds in a course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on lookup failure or an invariant-violating row.
    async fn list_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Vec<ConceptProgress>, StorageError>;
}

//
// ─── IN-MEMORY IMPLEMENTATION ──────────────────────────────────────────────────
//

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    courses: Arc<Mutex<HashMap<CourseId, Course>>>,
    concepts: Arc<Mutex<HashMap<(CourseId, ConceptId), Concept>>>,
    progress: Arc<Mutex<HashMap<(UserId, ConceptId), ProgressRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CourseRepository for InMemoryRepository {
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        let mut guard = self
            .courses
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(course.id(), course.clone());
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Course, StorageError> {
        let guard = self
            .courses
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl ConceptRepository for InMemoryRepository {
    async fn upsert_concept(&self, concept: &Concept) -> Result<(), StorageError> {
        let mut guard = self
            .concepts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert((concept.course_id(), concept.id()), concept.clone());
        Ok(())
    }

    async fn list_concepts(&self, course_id: CourseId) -> Result<Vec<Concept>, StorageError> {
        let guard = self
            .concepts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut found: Vec<Concept> = guard
            .iter()
            .filter(|((cid, _), _)| *cid == course_id)
            .map(|(_, concept)| concept.clone())
            .collect();
        found.sort_by_key(|c| (c.position(), c.id()));
        Ok(found)
    }

    async fn get_concepts(
        &self,
        course_id: CourseId,
        ids: &[ConceptId],
    ) -> Result<Vec<Concept>, StorageError> {
        let guard = self
            .concepts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            match guard.get(&(course_id, *id)) {
                Some(concept) => found.push(concept.clone()),
                None => return Err(StorageError::NotFound),
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn upsert_progress(
        &self,
        course_id: CourseId,
        progress: &ConceptProgress,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(
            (progress.user_id(), progress.concept_id()),
            ProgressRecord::from_progress(course_id, progress),
        );
        Ok(())
    }

    async fn get_progress(
        &self,
        user_id: UserId,
        concept_id: ConceptId,
    ) -> Result<Option<ConceptProgress>, StorageError> {
        let guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .get(&(user_id, concept_id))
            .cloned()
            .map(|record| {
                record
                    .into_progress()
                    .map_err(|e| StorageError::Serialization(e.to_string()))
            })
            .transpose()
    }

    async fn mastery_map(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<HashMap<ConceptId, u8>, StorageError> {
        let guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .iter()
            .filter(|((uid, _), record)| *uid == user_id && record.course_id == course_id)
            .filter_map(|((_, cid), record)| record.mastery_score.map(|score| (*cid, score)))
            .collect())
    }

    async fn list_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Vec<ConceptProgress>, StorageError> {
        let guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut found = Vec::new();
        for ((uid, _), record) in guard.iter() {
            if *uid == user_id && record.course_id == course_id {
                found.push(
                    record
                        .clone()
                        .into_progress()
                        .map_err(|e| StorageError::Serialization(e.to_string()))?,
                );
            }
        }
        found.sort_by_key(ConceptProgress::concept_id);
        Ok(found)
    }
}

//
// ─── STORAGE AGGREGATE ─────────────────────────────────────────────────────────
//

/// Aggregates the course, concept and progress repositories behind
/// trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub courses: Arc<dyn CourseRepository>,
    pub concepts: Arc<dyn ConceptRepository>,
    pub progress: Arc<dyn ProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let courses: Arc<dyn CourseRepository> = Arc::new(repo.clone());
        let concepts: Arc<dyn ConceptRepository> = Arc::new(repo.clone());
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo);
        Self {
            courses,
            concepts,
            progress,
        }
    }
}
