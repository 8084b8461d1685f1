use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::CourseId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CourseError {
    #[error("course title cannot be empty")]
    EmptyTitle,

    #[error("mastery threshold must be between 1 and 100")]
    InvalidMasteryThreshold,

    #[error("quiz pass threshold must be between 1 and 100")]
    InvalidQuizPassThreshold,
}

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

/// Per-course tuning for the two mastery gates.
///
/// Both values are percentages compared against quiz-derived mastery
/// scores. They are configuration, not constants: a course author can
/// tighten or loosen them without touching the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CourseSettings {
    mastery_threshold: u8,
    quiz_pass_threshold: u8,
}

impl CourseSettings {
    /// Creates custom settings.
    ///
    /// # Errors
    ///
    /// Returns an error if either threshold falls outside 1..=100.
    pub fn new(mastery_threshold: u8, quiz_pass_threshold: u8) -> Result<Self, CourseError> {
        if !(1..=100).contains(&mastery_threshold) {
            return Err(CourseError::InvalidMasteryThreshold);
        }
        if !(1..=100).contains(&quiz_pass_threshold) {
            return Err(CourseError::InvalidQuizPassThreshold);
        }
        Ok(Self {
            mastery_threshold,
            quiz_pass_threshold,
        })
    }

    /// A prerequisite counts as satisfied at this mastery score or above.
    #[must_use]
    pub fn mastery_threshold(&self) -> u8 {
        self.mastery_threshold
    }

    /// A quiz submission passes at this percentage or above.
    #[must_use]
    pub fn quiz_pass_threshold(&self) -> u8 {
        self.quiz_pass_threshold
    }
}

impl Default for CourseSettings {
    /// The platform defaults: 70 to satisfy a prerequisite, 75 to pass a quiz.
    fn default() -> Self {
        Self {
            mastery_threshold: 70,
            quiz_pass_threshold: 75,
        }
    }
}

//
// ─── COURSE ────────────────────────────────────────────────────────────────────
//

/// A course aggregate: identity, authored metadata and gate settings.
///
/// Concepts belong to a course but are stored and loaded separately
/// through their own repository.
#[derive(Debug, Clone, PartialEq)]
pub struct Course {
    id: CourseId,
    title: String,
    description: Option<String>,
    settings: CourseSettings,
    created_at: DateTime<Utc>,
}

impl Course {
    /// Creates a course with a validated title.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::EmptyTitle` for a blank title.
    pub fn new(
        id: CourseId,
        title: impl Into<String>,
        description: Option<String>,
        settings: CourseSettings,
        created_at: DateTime<Utc>,
    ) -> Result<Self, CourseError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(CourseError::EmptyTitle);
        }
        Ok(Self {
            id,
            title,
            description,
            settings,
            created_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> CourseId {
        self.id
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
    pub fn settings(&self) -> CourseSettings {
        self.settings
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
