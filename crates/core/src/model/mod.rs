mod concept;
mod content;
mod course;
mod ids;
mod progress;
mod quiz;

pub use ids::{ConceptId, CourseId, UserId};

pub use concept::{Concept, ConceptError};
pub use content::{ConceptContent, ContentError, ContentSection};
pub use course::{Course, CourseError, CourseSettings};
pub use progress::{CompletionStatus, ConceptProgress, ProgressError};
pub use quiz::{Quiz, QuizError, QuizQuestion, QuizScore};
