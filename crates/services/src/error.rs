//! Shared error types for the services crate.

use thiserror::Error;

use course_core::graph::GraphError;
use course_core::model::{ConceptId, CourseId, ProgressError, QuizError};
use storage::repository::StorageError;

/// Errors emitted by `ProgressEngine`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The concept id does not belong to the loaded course.
    #[error("concept {0} is not part of this course")]
    UnknownConcept(ConceptId),

    /// Prerequisites are not yet mastered; the host shows this as a
    /// "locked" message. No state was mutated.
    #[error("concept {0} is locked: prerequisites not yet mastered")]
    ConceptNotAttemptable(ConceptId),

    /// A quiz submission arrived for a concept that has no quiz. A
    /// caller/configuration error; no state was mutated.
    #[error("concept {0} has no quiz defined")]
    QuizNotDefined(ConceptId),

    #[error(transparent)]
    Quiz(#[from] QuizError),

    #[error(transparent)]
    Progress(#[from] ProgressError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `CourseService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CourseServiceError {
    #[error("course {0} not found")]
    CourseNotFound(CourseId),

    /// The course's prerequisite graph is misconfigured (cycle or
    /// dangling edge). Fatal: the course cannot be served until fixed.
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
