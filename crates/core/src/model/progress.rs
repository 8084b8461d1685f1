use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::{ConceptId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("invalid completion status: {0}")]
    InvalidStatus(String),

    #[error("invalid persisted progress state: {0}")]
    InvalidPersistedState(String),
}

//
// ─── COMPLETION STATUS ─────────────────────────────────────────────────────────
//

/// Lifecycle of a learner's work on one concept.
///
/// The only regression is `Completed` → `NotStarted`, and only through a
/// full reset (failed quiz or explicit host request).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl CompletionStatus {
    /// Stable string form used by storage adapters.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CompletionStatus::NotStarted => "not_started",
            CompletionStatus::InProgress => "in_progress",
            CompletionStatus::Completed => "completed",
        }
    }

    /// Parses the stable string form.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidStatus` for anything else.
    pub fn parse(s: &str) -> Result<Self, ProgressError> {
        match s {
            "not_started" => Ok(CompletionStatus::NotStarted),
            "in_progress" => Ok(CompletionStatus::InProgress),
            "completed" => Ok(CompletionStatus::Completed),
            other => Err(ProgressError::InvalidStatus(other.to_owned())),
        }
    }
}

//
// ─── CONCEPT PROGRESS ──────────────────────────────────────────────────────────
//

/// Per-(user, concept) progress record.
///
/// Mutated exclusively through the transition methods below; the
/// presentation layer only ever reads a projection of it. Records are
/// created lazily on a learner's first interaction with a concept.
///
/// Invariants, preserved by every transition and re-checked on load:
/// - `quiz_passed`, `status == Completed` and `mastery_score.is_some()`
///   are all equivalent.
/// - `status == NotStarted` implies no flag is set.
/// - `attempts` never decreases and survives every reset, so total
///   effort stays auditable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConceptProgress {
    user_id: UserId,
    concept_id: ConceptId,
    mastery_score: Option<u8>,
    description_read: bool,
    video_watched: bool,
    quiz_passed: bool,
    attempts: u32,
    status: CompletionStatus,
    last_accessed_at: DateTime<Utc>,
}

impl ConceptProgress {
    /// A fresh, untouched record.
    #[must_use]
    pub fn new(user_id: UserId, concept_id: ConceptId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            concept_id,
            mastery_score: None,
            description_read: false,
            video_watched: false,
            quiz_passed: false,
            attempts: 0,
            status: CompletionStatus::NotStarted,
            last_accessed_at: now,
        }
    }

    /// Rebuilds a record from persisted fields.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidPersistedState` if the fields
    /// violate the record invariants (for example `quiz_passed` with
    /// status `not_started`, or a mastery score above 100).
    #[allow(clippy::too_many_arguments, clippy::fn_params_excessive_bools)]
    pub fn from_persisted(
        user_id: UserId,
        concept_id: ConceptId,
        mastery_score: Option<u8>,
        description_read: bool,
        video_watched: bool,
        quiz_passed: bool,
        attempts: u32,
        status: CompletionStatus,
        last_accessed_at: DateTime<Utc>,
    ) -> Result<Self, ProgressError> {
        if let Some(score) = mastery_score {
            if score > 100 {
                return Err(ProgressError::InvalidPersistedState(format!(
                    "mastery score {score} exceeds 100"
                )));
            }
        }
        if quiz_passed != (status == CompletionStatus::Completed) {
            return Err(ProgressError::InvalidPersistedState(
                "quiz_passed and completed status must agree".into(),
            ));
        }
        if quiz_passed != mastery_score.is_some() {
            return Err(ProgressError::InvalidPersistedState(
                "mastery score must be present exactly when the quiz is passed".into(),
            ));
        }
        if status == CompletionStatus::NotStarted
            && (description_read || video_watched || quiz_passed)
        {
            return Err(ProgressError::InvalidPersistedState(
                "a not-started record cannot carry progress flags".into(),
            ));
        }

        Ok(Self {
            user_id,
            concept_id,
            mastery_score,
            description_read,
            video_watched,
            quiz_passed,
            attempts,
            status,
            last_accessed_at,
        })
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn concept_id(&self) -> ConceptId {
        self.concept_id
    }

    /// Score from the most recent passing quiz attempt, if any since
    /// the last reset.
    #[must_use]
    pub fn mastery_score(&self) -> Option<u8> {
        self.mastery_score
    }

    #[must_use]
    pub fn description_read(&self) -> bool {
        self.description_read
    }

    #[must_use]
    pub fn video_watched(&self) -> bool {
        self.video_watched
    }

    #[must_use]
    pub fn quiz_passed(&self) -> bool {
        self.quiz_passed
    }

    /// Total scored quiz submissions, pass or fail, across resets.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn status(&self) -> CompletionStatus {
        self.status
    }

    #[must_use]
    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        self.last_accessed_at
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == CompletionStatus::Completed
    }

    //
    // ─── TRANSITIONS ───────────────────────────────────────────────────────────
    //

    /// Marks the written material as read. Idempotent: re-marking only
    /// bumps the access timestamp.
    pub fn mark_description_read(&mut self, now: DateTime<Utc>) {
        self.description_read = true;
        self.touch(now);
    }

    /// Marks the video as watched. Idempotent like
    /// [`mark_description_read`](Self::mark_description_read).
    pub fn mark_video_watched(&mut self, now: DateTime<Utc>) {
        self.video_watched = true;
        self.touch(now);
    }

    /// Records a passing quiz submission with the rounded percentage
    /// score. Counts the attempt and completes the concept.
    pub fn record_pass(&mut self, percent: u8, now: DateTime<Utc>) {
        self.attempts += 1;
        self.mastery_score = Some(percent);
        self.quiz_passed = true;
        self.status = CompletionStatus::Completed;
        self.last_accessed_at = now;
    }

    /// Records a failing quiz submission: the attempt counts, then the
    /// record is fully reset so the learner re-engages with the
    /// material before retrying.
    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.attempts += 1;
        self.clear(now);
    }

    /// Host-requested retry from scratch. Same reset as a failed quiz,
    /// but nothing was submitted, so attempts stay untouched.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.clear(now);
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        if self.status == CompletionStatus::NotStarted {
            self.status = CompletionStatus::InProgress;
        }
        self.last_accessed_at = now;
    }

    fn clear(&mut self, now: DateTime<Utc>) {
        self.mastery_score = None;
        self.description_read = false;
        self.video_watched = false;
        self.quiz_passed = false;
        self.status = CompletionStatus::NotStarted;
        self.last_accessed_at = now;
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn fresh() -> ConceptProgress {
        ConceptProgress::new(UserId::random(), ConceptId::new(1), fixed_now())
    }

    #[test]
    fn marking_description_starts_progress() {
        let mut p = fresh();
        assert_eq!(p.status(), CompletionStatus::NotStarted);

        p.mark_description_read(fixed_now());
        assert!(p.description_read());
        assert_eq!(p.status(), CompletionStatus::InProgress);
    }

    #[test]
    fn mark_events_are_idempotent() {
        let mut p = fresh();
        p.mark_description_read(fixed_now());
        let once = p.clone();

        p.mark_description_read(fixed_now());
        assert_eq!(p, once);
        assert_eq!(p.attempts(), 0);
    }

    #[test]
    fn passing_completes_and_records_mastery() {
        let mut p = fresh();
        p.mark_description_read(fixed_now());
        p.record_pass(80, fixed_now());

        assert!(p.quiz_passed());
        assert_eq!(p.mastery_score(), Some(80));
        assert_eq!(p.status(), CompletionStatus::Completed);
        assert_eq!(p.attempts(), 1);
    }

    #[test]
    fn failure_resets_everything_but_attempts() {
        let mut p = fresh();
        p.mark_description_read(fixed_now());
        p.mark_video_watched(fixed_now());
        p.record_pass(90, fixed_now());

        p.record_failure(fixed_now());

        assert!(!p.description_read());
        assert!(!p.video_watched());
        assert!(!p.quiz_passed());
        assert_eq!(p.mastery_score(), None);
        assert_eq!(p.status(), CompletionStatus::NotStarted);
        assert_eq!(p.attempts(), 2);
    }

    #[test]
    fn repeated_failures_accumulate_attempts_only() {
        let mut p = fresh();
        for expected in 1..=3 {
            p.mark_description_read(fixed_now());
            p.record_failure(fixed_now());
            assert_eq!(p.attempts(), expected);
            assert_eq!(p.status(), CompletionStatus::NotStarted);
            assert!(!p.description_read());
        }
    }

    #[test]
    fn explicit_reset_preserves_attempts() {
        let mut p = fresh();
        p.mark_video_watched(fixed_now());
        p.record_pass(100, fixed_now());

        let later = fixed_now() + Duration::hours(1);
        p.reset(later);

        assert_eq!(p.attempts(), 1);
        assert_eq!(p.mastery_score(), None);
        assert_eq!(p.status(), CompletionStatus::NotStarted);
        assert_eq!(p.last_accessed_at(), later);
    }

    #[test]
    fn persisted_state_must_be_consistent() {
        let user = UserId::random();

        // passed flag without completed status
        let err = ConceptProgress::from_persisted(
            user,
            ConceptId::new(1),
            Some(80),
            false,
            false,
            true,
            1,
            CompletionStatus::NotStarted,
            fixed_now(),
        )
        .unwrap_err();
        assert!(matches!(err, ProgressError::InvalidPersistedState(_)));

        // completed without a mastery score
        let err = ConceptProgress::from_persisted(
            user,
            ConceptId::new(1),
            None,
            true,
            true,
            true,
            1,
            CompletionStatus::Completed,
            fixed_now(),
        )
        .unwrap_err();
        assert!(matches!(err, ProgressError::InvalidPersistedState(_)));

        // a valid completed record loads fine
        let ok = ConceptProgress::from_persisted(
            user,
            ConceptId::new(1),
            Some(95),
            true,
            true,
            true,
            4,
            CompletionStatus::Completed,
            fixed_now(),
        )
        .unwrap();
        assert_eq!(ok.attempts(), 4);
    }

    #[test]
    fn status_string_roundtrip() {
        for status in [
            CompletionStatus::NotStarted,
            CompletionStatus::InProgress,
            CompletionStatus::Completed,
        ] {
            assert_eq!(CompletionStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(CompletionStatus::parse("done").is_err());
    }
}
