use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::content::ConceptContent;
use crate::model::ids::{ConceptId, CourseId};
use crate::model::quiz::Quiz;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConceptError {
    #[error("concept title cannot be empty")]
    EmptyTitle,

    #[error("complexity must be at least 1")]
    InvalidComplexity,

    #[error("estimated learning hours must be positive and finite")]
    InvalidLearningHours,

    #[error("concept {0} cannot be its own prerequisite")]
    SelfPrerequisite(ConceptId),
}

//
// ─── CONCEPT ───────────────────────────────────────────────────────────────────
//

/// The smallest unit of course content, gated by its prerequisites.
///
/// Concepts are authored once per course and immutable from the
/// learner's perspective; all per-learner state lives in
/// [`ConceptProgress`](crate::model::ConceptProgress).
///
/// Complexity is an open-ended ordinal: 1–2 reads as easy, 3–4 as
/// medium, 5 and above as hard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    id: ConceptId,
    course_id: CourseId,
    title: String,
    description: Option<String>,
    complexity: u8,
    est_learning_hours: f32,
    position: u32,
    prerequisites: Vec<ConceptId>,
    content: Option<ConceptContent>,
    quiz: Option<Quiz>,
}

impl Concept {
    /// Validates and creates a concept.
    ///
    /// Duplicate prerequisite ids are dropped, keeping first-seen order.
    ///
    /// # Errors
    ///
    /// Returns `ConceptError` for a blank title, zero complexity,
    /// non-positive learning hours, or a self-referential prerequisite.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ConceptId,
        course_id: CourseId,
        title: impl Into<String>,
        description: Option<String>,
        complexity: u8,
        est_learning_hours: f32,
        position: u32,
        prerequisites: Vec<ConceptId>,
        content: Option<ConceptContent>,
        quiz: Option<Quiz>,
    ) -> Result<Self, ConceptError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(ConceptError::EmptyTitle);
        }
        if complexity == 0 {
            return Err(ConceptError::InvalidComplexity);
        }
        if !est_learning_hours.is_finite() || est_learning_hours <= 0.0 {
            return Err(ConceptError::InvalidLearningHours);
        }
        if prerequisites.contains(&id) {
            return Err(ConceptError::SelfPrerequisite(id));
        }

        let mut deduped = Vec::with_capacity(prerequisites.len());
        for prereq in prerequisites {
            if !deduped.contains(&prereq) {
                deduped.push(prereq);
            }
        }

        Ok(Self {
            id,
            course_id,
            title,
            description,
            complexity,
            est_learning_hours,
            position,
            prerequisites: deduped,
            content,
            quiz,
        })
    }

    #[must_use]
    pub fn id(&self) -> ConceptId {
        self.id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn complexity(&self) -> u8 {
        self.complexity
    }

    #[must_use]
    pub fn est_learning_hours(&self) -> f32 {
        self.est_learning_hours
    }

    /// Ordering of this concept within its course.
    #[must_use]
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Direct prerequisites only; transitive requirements are the
    /// graph's concern.
    #[must_use]
    pub fn prerequisites(&self) -> &[ConceptId] {
        &self.prerequisites
    }

    #[must_use]
    pub fn content(&self) -> Option<&ConceptContent> {
        self.content.as_ref()
    }

    #[must_use]
    pub fn quiz(&self) -> Option<&Quiz> {
        self.quiz.as_ref()
    }

    #[must_use]
    pub fn has_quiz(&self) -> bool {
        self.quiz.is_some()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn concept(id: u64, prereqs: Vec<ConceptId>) -> Result<Concept, ConceptError> {
        Concept::new(
            ConceptId::new(id),
            CourseId::new(1),
            format!("Concept {id}"),
            None,
            2,
            1.5,
            u32::try_from(id).unwrap(),
            prereqs,
            None,
            None,
        )
    }

    #[test]
    fn blank_title_is_rejected() {
        let err = Concept::new(
            ConceptId::new(1),
            CourseId::new(1),
            " ",
            None,
            1,
            1.0,
            0,
            Vec::new(),
            None,
            None,
        )
        .unwrap_err();
        assert_eq!(err, ConceptError::EmptyTitle);
    }

    #[test]
    fn zero_complexity_is_rejected() {
        let err = Concept::new(
            ConceptId::new(1),
            CourseId::new(1),
            "t",
            None,
            0,
            1.0,
            0,
            Vec::new(),
            None,
            None,
        )
        .unwrap_err();
        assert_eq!(err, ConceptError::InvalidComplexity);
    }

    #[test]
    fn non_positive_hours_are_rejected() {
        let err = Concept::new(
            ConceptId::new(1),
            CourseId::new(1),
            "t",
            None,
            1,
            0.0,
            0,
            Vec::new(),
            None,
            None,
        )
        .unwrap_err();
        assert_eq!(err, ConceptError::InvalidLearningHours);
    }

    #[test]
    fn self_prerequisite_is_rejected() {
        let err = concept(3, vec![ConceptId::new(3)]).unwrap_err();
        assert_eq!(err, ConceptError::SelfPrerequisite(ConceptId::new(3)));
    }

    #[test]
    fn duplicate_prerequisites_are_deduped_in_order() {
        let c = concept(
            5,
            vec![ConceptId::new(2), ConceptId::new(1), ConceptId::new(2)],
        )
        .unwrap();
        assert_eq!(c.prerequisites(), &[ConceptId::new(2), ConceptId::new(1)]);
    }
}
