use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::info;

use course_core::model::{Concept, ConceptId, ConceptProgress, Course, CourseId, UserId};
use course_core::{Clock, PrerequisiteGraph};
use storage::repository::{Storage, StorageError};

use crate::error::{CourseServiceError, EngineError};
use crate::progress_engine::{CourseOverview, ProgressEngine, ProgressEvent, UpdatedProgress};

//
// ─── COURSE SERVICE ────────────────────────────────────────────────────────────
//

/// Loads courses into servable form.
///
/// Loading fetches the course and its concepts once, builds the
/// prerequisite graph, and wires up a `ProgressEngine`; the resulting
/// [`LoadedCourse`] is shared read-only across requests. A graph
/// validation failure is fatal: the course stays unservable until its
/// configuration is fixed.
pub struct CourseService {
    clock: Clock,
    storage: Storage,
}

impl CourseService {
    #[must_use]
    pub fn new(clock: Clock, storage: Storage) -> Self {
        Self { clock, storage }
    }

    /// Load a course and build its prerequisite graph.
    ///
    /// # Errors
    ///
    /// - `CourseServiceError::CourseNotFound` if the course does not exist.
    /// - `CourseServiceError::Graph` for a cyclic or dangling
    ///   prerequisite configuration.
    /// - `CourseServiceError::Storage` for repository failures.
    pub async fn load(&self, course_id: CourseId) -> Result<LoadedCourse, CourseServiceError> {
        let course = match self.storage.courses.get_course(course_id).await {
            Ok(course) => course,
            Err(StorageError::NotFound) => {
                return Err(CourseServiceError::CourseNotFound(course_id));
            }
            Err(other) => return Err(other.into()),
        };

        let concepts = self.storage.concepts.list_concepts(course_id).await?;
        let graph = PrerequisiteGraph::build(&concepts)?;
        info!(
            course = %course_id,
            concepts = concepts.len(),
            "course loaded, prerequisite graph built"
        );

        let index: HashMap<ConceptId, Concept> =
            concepts.into_iter().map(|c| (c.id(), c)).collect();

        let engine = ProgressEngine::new(
            self.clock,
            course_id,
            course.settings(),
            Arc::new(graph),
            Arc::new(index),
            Arc::clone(&self.storage.progress),
        );

        Ok(LoadedCourse { course, engine })
    }
}

//
// ─── LOADED COURSE ─────────────────────────────────────────────────────────────
//

/// A servable course: metadata plus the engine driving learner state.
///
/// The host keeps one of these per active course and routes learner
/// actions through it; everything here delegates to the engine.
#[derive(Debug)]
pub struct LoadedCourse {
    course: Course,
    engine: ProgressEngine,
}

impl LoadedCourse {
    #[must_use]
    pub fn course(&self) -> &Course {
        &self.course
    }

    #[must_use]
    pub fn engine(&self) -> &ProgressEngine {
        &self.engine
    }

    #[must_use]
    pub fn graph(&self) -> &PrerequisiteGraph {
        self.engine.graph()
    }

    /// See [`ProgressEngine::apply_event`].
    ///
    /// # Errors
    ///
    /// Propagates `EngineError` from the engine.
    pub async fn apply_event(
        &self,
        user_id: UserId,
        concept_id: ConceptId,
        event: ProgressEvent,
    ) -> Result<UpdatedProgress, EngineError> {
        self.engine.apply_event(user_id, concept_id, event).await
    }

    /// See [`ProgressEngine::can_attempt`].
    ///
    /// # Errors
    ///
    /// Propagates `EngineError` from the engine.
    pub async fn can_attempt(
        &self,
        user_id: UserId,
        concept_id: ConceptId,
    ) -> Result<bool, EngineError> {
        self.engine.can_attempt(user_id, concept_id).await
    }

    /// See [`ProgressEngine::current_eligible_set`].
    ///
    /// # Errors
    ///
    /// Propagates `EngineError` from the engine.
    pub async fn current_eligible_set(
        &self,
        user_id: UserId,
    ) -> Result<HashSet<ConceptId>, EngineError> {
        self.engine.current_eligible_set(user_id).await
    }

    /// See [`ProgressEngine::reset_progress`].
    ///
    /// # Errors
    ///
    /// Propagates `EngineError` from the engine.
    pub async fn reset_progress(
        &self,
        user_id: UserId,
        concept_id: ConceptId,
    ) -> Result<ConceptProgress, EngineError> {
        self.engine.reset_progress(user_id, concept_id).await
    }

    /// See [`ProgressEngine::overview`].
    ///
    /// # Errors
    ///
    /// Propagates `EngineError` from the engine.
    pub async fn overview(&self, user_id: UserId) -> Result<CourseOverview, EngineError> {
        self.engine.overview(user_id).await
    }

    /// See [`ProgressEngine::next_concept`].
    ///
    /// # Errors
    ///
    /// Propagates `EngineError` from the engine.
    pub async fn next_concept(&self, user_id: UserId) -> Result<Option<ConceptId>, EngineError> {
        self.engine.next_concept(user_id).await
    }
}
