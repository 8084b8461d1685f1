use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use course_core::model::{
    Concept, ConceptId, ConceptProgress, CourseId, CourseSettings, QuizScore, UserId,
};
use course_core::{Clock, PrerequisiteGraph};
use storage::repository::ProgressRepository;

use crate::error::EngineError;

//
// ─── EVENTS ────────────────────────────────────────────────────────────────────
//

/// A learner action against one concept.
///
/// The wire shape matches what hosts post (`{"action":
/// "mark_description_read"}`, `{"action": "submit_quiz", "answers":
/// [...]}`), so route handlers can deserialize straight into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ProgressEvent {
    MarkDescriptionRead,
    MarkVideoWatched,
    SubmitQuiz { answers: Vec<usize> },
}

//
// ─── RESULTS ───────────────────────────────────────────────────────────────────
//

/// What a transition produced: the new record, the quiz score when the
/// event was a submission, and any concepts the learner just unlocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedProgress {
    pub progress: ConceptProgress,
    pub quiz: Option<QuizScore>,
    pub newly_eligible: Vec<ConceptId>,
}

/// Course-wide completion summary for a learner's dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CourseOverview {
    pub completed: usize,
    pub total: usize,
    pub percent: u8,
}

//
// ─── KEYED LOCKS ───────────────────────────────────────────────────────────────
//

/// One async mutex per (user, concept) key.
///
/// Transitions on the same key run strictly one at a time; different
/// keys (other concepts, other learners) proceed in parallel.
#[derive(Default)]
struct KeyedLocks {
    inner: Mutex<HashMap<(UserId, ConceptId), Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    async fn acquire(&self, user_id: UserId, concept_id: ConceptId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut map = self.inner.lock().await;
            Arc::clone(map.entry((user_id, concept_id)).or_default())
        };
        slot.lock_owned().await
    }
}

//
// ─── ENGINE ────────────────────────────────────────────────────────────────────
//

/// Per-course driver of the per-(user, concept) state machine.
///
/// Holds the immutable prerequisite graph and the course's thresholds,
/// and funnels every mutation of a learner's progress through
/// [`apply_event`](Self::apply_event) / [`reset_progress`](Self::reset_progress)
/// so the record invariants always hold. The mastery map consulted for
/// gating is a point-in-time snapshot: concurrent writes to a learner's
/// *other* concepts can momentarily stale an eligibility view, which is
/// acceptable; writes to the *same* concept are serialized.
pub struct ProgressEngine {
    clock: Clock,
    course_id: CourseId,
    settings: CourseSettings,
    graph: Arc<PrerequisiteGraph>,
    concepts: Arc<HashMap<ConceptId, Concept>>,
    progress: Arc<dyn ProgressRepository>,
    locks: KeyedLocks,
}

impl std::fmt::Debug for ProgressEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressEngine")
            .field("clock", &self.clock)
            .field("course_id", &self.course_id)
            .field("settings", &self.settings)
            .field("graph", &self.graph)
            .field("concepts", &self.concepts)
            .finish_non_exhaustive()
    }
}

impl ProgressEngine {
    #[must_use]
    pub fn new(
        clock: Clock,
        course_id: CourseId,
        settings: CourseSettings,
        graph: Arc<PrerequisiteGraph>,
        concepts: Arc<HashMap<ConceptId, Concept>>,
        progress: Arc<dyn ProgressRepository>,
    ) -> Self {
        Self {
            clock,
            course_id,
            settings,
            graph,
            concepts,
            progress,
            locks: KeyedLocks::default(),
        }
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn settings(&self) -> CourseSettings {
        self.settings
    }

    #[must_use]
    pub fn graph(&self) -> &PrerequisiteGraph {
        &self.graph
    }

    /// Whether the learner may currently work on the concept.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` if the mastery map cannot be read.
    pub async fn can_attempt(
        &self,
        user_id: UserId,
        concept_id: ConceptId,
    ) -> Result<bool, EngineError> {
        let mastery = self.progress.mastery_map(user_id, self.course_id).await?;
        Ok(self
            .graph
            .can_attempt(concept_id, &mastery, self.settings.mastery_threshold()))
    }

    /// Every concept the learner may currently attempt.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` if the mastery map cannot be read.
    pub async fn current_eligible_set(
        &self,
        user_id: UserId,
    ) -> Result<HashSet<ConceptId>, EngineError> {
        let mastery = self.progress.mastery_map(user_id, self.course_id).await?;
        let threshold = self.settings.mastery_threshold();
        Ok(self
            .concepts
            .keys()
            .copied()
            .filter(|id| self.graph.can_attempt(*id, &mastery, threshold))
            .collect())
    }

    /// Applies one learner event to one concept.
    ///
    /// The record is created lazily on first interaction. Gating is
    /// checked before any mutation; a locked concept leaves no trace.
    /// For quiz submissions the attempt is only counted once the
    /// submission is scoreable, and a pass reports which dependent
    /// concepts became attemptable as a result.
    ///
    /// # Errors
    ///
    /// - `EngineError::UnknownConcept` for an id outside this course.
    /// - `EngineError::ConceptNotAttemptable` when prerequisites are unmet.
    /// - `EngineError::QuizNotDefined` for a submission without a quiz.
    /// - `EngineError::Quiz` for an answer-count mismatch (no attempts
    ///   increment, no mutation).
    /// - `EngineError::Storage` / `EngineError::Progress` from the
    ///   repository.
    pub async fn apply_event(
        &self,
        user_id: UserId,
        concept_id: ConceptId,
        event: ProgressEvent,
    ) -> Result<UpdatedProgress, EngineError> {
        let concept = self
            .concepts
            .get(&concept_id)
            .ok_or(EngineError::UnknownConcept(concept_id))?;

        let _guard = self.locks.acquire(user_id, concept_id).await;

        let mastery_before = self.progress.mastery_map(user_id, self.course_id).await?;
        if !self.graph.can_attempt(
            concept_id,
            &mastery_before,
            self.settings.mastery_threshold(),
        ) {
            return Err(EngineError::ConceptNotAttemptable(concept_id));
        }

        let now = self.clock.now();
        let mut record = match self.progress.get_progress(user_id, concept_id).await? {
            Some(record) => record,
            None => ConceptProgress::new(user_id, concept_id, now),
        };

        let mut quiz_result = None;
        match event {
            ProgressEvent::MarkDescriptionRead => record.mark_description_read(now),
            ProgressEvent::MarkVideoWatched => record.mark_video_watched(now),
            ProgressEvent::SubmitQuiz { answers } => {
                let quiz = concept
                    .quiz()
                    .ok_or(EngineError::QuizNotDefined(concept_id))?;
                let score = quiz.score(&answers)?;
                if score.passes(self.settings.quiz_pass_threshold()) {
                    record.record_pass(score.rounded_percent(), now);
                    info!(
                        user = %user_id,
                        concept = %concept_id,
                        percent = score.rounded_percent(),
                        attempts = record.attempts(),
                        "quiz passed"
                    );
                } else {
                    record.record_failure(now);
                    info!(
                        user = %user_id,
                        concept = %concept_id,
                        attempts = record.attempts(),
                        "quiz failed, progress reset"
                    );
                }
                quiz_result = Some(score);
            }
        }

        self.progress
            .upsert_progress(self.course_id, &record)
            .await?;

        let newly_eligible = if quiz_result.is_some() && record.quiz_passed() {
            self.unlocked_by(concept_id, &mastery_before, &record)
        } else {
            Vec::new()
        };
        if !newly_eligible.is_empty() {
            debug!(
                user = %user_id,
                concept = %concept_id,
                unlocked = newly_eligible.len(),
                "downstream concepts unlocked"
            );
        }

        Ok(UpdatedProgress {
            progress: record,
            quiz: quiz_result,
            newly_eligible,
        })
    }

    /// Host-requested retry from scratch: same full reset as a failed
    /// quiz, without counting an attempt. Resetting a concept the
    /// learner never touched persists nothing and just returns the
    /// fresh-record view.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::UnknownConcept` for an id outside this
    /// course, or `EngineError::Storage` from the repository.
    pub async fn reset_progress(
        &self,
        user_id: UserId,
        concept_id: ConceptId,
    ) -> Result<ConceptProgress, EngineError> {
        if !self.concepts.contains_key(&concept_id) {
            return Err(EngineError::UnknownConcept(concept_id));
        }

        let _guard = self.locks.acquire(user_id, concept_id).await;

        let now = self.clock.now();
        match self.progress.get_progress(user_id, concept_id).await? {
            Some(mut record) => {
                record.reset(now);
                self.progress
                    .upsert_progress(self.course_id, &record)
                    .await?;
                info!(user = %user_id, concept = %concept_id, "progress reset by host");
                Ok(record)
            }
            None => Ok(ConceptProgress::new(user_id, concept_id, now)),
        }
    }

    /// Completion summary across the whole course.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` if records cannot be listed.
    pub async fn overview(&self, user_id: UserId) -> Result<CourseOverview, EngineError> {
        let records = self.progress.list_progress(user_id, self.course_id).await?;
        let completed = records.iter().filter(|r| r.is_completed()).count();
        let total = self.concepts.len();
        let percent = if total == 0 {
            0
        } else {
            u8::try_from(completed * 100 / total).unwrap_or(100)
        };
        Ok(CourseOverview {
            completed,
            total,
            percent,
        })
    }

    /// The learner's current concept: first in dependency order that is
    /// attemptable and not yet completed. `None` once the course is
    /// finished.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` if records cannot be listed.
    pub async fn next_concept(&self, user_id: UserId) -> Result<Option<ConceptId>, EngineError> {
        let records = self.progress.list_progress(user_id, self.course_id).await?;
        let completed: HashSet<ConceptId> = records
            .iter()
            .filter(|r| r.is_completed())
            .map(ConceptProgress::concept_id)
            .collect();
        let mastery: HashMap<ConceptId, u8> = records
            .iter()
            .filter_map(|r| r.mastery_score().map(|score| (r.concept_id(), score)))
            .collect();

        let threshold = self.settings.mastery_threshold();
        Ok(self.graph.topological_order().find(|id| {
            !completed.contains(id) && self.graph.can_attempt(*id, &mastery, threshold)
        }))
    }

    fn unlocked_by(
        &self,
        concept_id: ConceptId,
        before: &HashMap<ConceptId, u8>,
        record: &ConceptProgress,
    ) -> Vec<ConceptId> {
        let mut after = before.clone();
        if let Some(score) = record.mastery_score() {
            after.insert(concept_id, score);
        }
        let threshold = self.settings.mastery_threshold();
        self.graph
            .dependents_of(concept_id)
            .iter()
            .copied()
            .filter(|dep| {
                self.graph.can_attempt(*dep, &after, threshold)
                    && !self.graph.can_attempt(*dep, before, threshold)
            })
            .collect()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::fixed_clock;
    use course_core::model::{CompletionStatus, Quiz, QuizError, QuizQuestion};
    use storage::repository::InMemoryRepository;

    // Every question's correct option is 0, so `correct_answers(n)` and
    // friends below read naturally in the scenarios.
    fn five_question_quiz() -> Quiz {
        Quiz::new(
            (0..5)
                .map(|i| QuizQuestion {
                    prompt: format!("q{i}"),
                    options: vec!["right".into(), "wrong".into(), "also wrong".into()],
                    answer: 0,
                    explanation: None,
                })
                .collect(),
        )
        .unwrap()
    }

    fn concept(id: u64, position: u32, prereqs: &[u64], quiz: Option<Quiz>) -> Concept {
        Concept::new(
            ConceptId::new(id),
            CourseId::new(1),
            format!("Concept {id}"),
            None,
            2,
            1.0,
            position,
            prereqs.iter().map(|&p| ConceptId::new(p)).collect(),
            None,
            quiz,
        )
        .unwrap()
    }

    /// A -> B -> C chain; A and B carry quizzes, C has none.
    fn engine() -> ProgressEngine {
        let concepts = vec![
            concept(1, 0, &[], Some(five_question_quiz())),
            concept(2, 1, &[1], Some(five_question_quiz())),
            concept(3, 2, &[2], None),
        ];
        let graph = PrerequisiteGraph::build(&concepts).unwrap();
        let index: HashMap<ConceptId, Concept> =
            concepts.into_iter().map(|c| (c.id(), c)).collect();

        ProgressEngine::new(
            fixed_clock(),
            CourseId::new(1),
            CourseSettings::default(),
            Arc::new(graph),
            Arc::new(index),
            Arc::new(InMemoryRepository::new()),
        )
    }

    fn passing_answers() -> Vec<usize> {
        vec![0, 0, 0, 0, 0] // 100%
    }

    fn eighty_percent_answers() -> Vec<usize> {
        vec![0, 0, 0, 0, 1] // 4/5
    }

    fn failing_answers() -> Vec<usize> {
        vec![0, 0, 1, 1, 1] // 2/5
    }

    #[tokio::test]
    async fn locked_concept_rejects_events_without_mutation() {
        let engine = engine();
        let user = UserId::random();

        let err = engine
            .apply_event(user, ConceptId::new(2), ProgressEvent::MarkDescriptionRead)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ConceptNotAttemptable(c) if c == ConceptId::new(2)));

        // no record was created for the locked concept
        let progress = engine.reset_progress(user, ConceptId::new(2)).await.unwrap();
        assert_eq!(progress.status(), CompletionStatus::NotStarted);
        assert_eq!(progress.attempts(), 0);
    }

    #[tokio::test]
    async fn passing_quiz_unlocks_direct_dependent() {
        let engine = engine();
        let user = UserId::random();

        assert!(engine.can_attempt(user, ConceptId::new(1)).await.unwrap());
        assert!(!engine.can_attempt(user, ConceptId::new(2)).await.unwrap());

        let updated = engine
            .apply_event(
                user,
                ConceptId::new(1),
                ProgressEvent::SubmitQuiz {
                    answers: eighty_percent_answers(),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.progress.mastery_score(), Some(80));
        assert_eq!(updated.progress.status(), CompletionStatus::Completed);
        assert_eq!(updated.newly_eligible, vec![ConceptId::new(2)]);
        assert!(engine.can_attempt(user, ConceptId::new(2)).await.unwrap());
    }

    #[tokio::test]
    async fn failing_quiz_resets_marks_and_counts_attempt() {
        let engine = engine();
        let user = UserId::random();
        let concept = ConceptId::new(1);

        engine
            .apply_event(user, concept, ProgressEvent::MarkDescriptionRead)
            .await
            .unwrap();
        engine
            .apply_event(user, concept, ProgressEvent::MarkVideoWatched)
            .await
            .unwrap();

        let updated = engine
            .apply_event(
                user,
                concept,
                ProgressEvent::SubmitQuiz {
                    answers: failing_answers(),
                },
            )
            .await
            .unwrap();

        let progress = &updated.progress;
        assert!(!progress.description_read());
        assert!(!progress.video_watched());
        assert!(!progress.quiz_passed());
        assert_eq!(progress.mastery_score(), None);
        assert_eq!(progress.status(), CompletionStatus::NotStarted);
        assert_eq!(progress.attempts(), 1);
        assert!(updated.newly_eligible.is_empty());
    }

    #[tokio::test]
    async fn three_failures_accumulate_attempts_without_partial_progress() {
        let engine = engine();
        let user = UserId::random();
        let concept = ConceptId::new(1);

        for expected in 1..=3_u32 {
            engine
                .apply_event(user, concept, ProgressEvent::MarkDescriptionRead)
                .await
                .unwrap();
            let updated = engine
                .apply_event(
                    user,
                    concept,
                    ProgressEvent::SubmitQuiz {
                        answers: failing_answers(),
                    },
                )
                .await
                .unwrap();
            assert_eq!(updated.progress.attempts(), expected);
            assert!(!updated.progress.description_read());
        }
    }

    #[tokio::test]
    async fn mark_events_are_idempotent_through_the_engine() {
        let engine = engine();
        let user = UserId::random();
        let concept = ConceptId::new(1);

        let first = engine
            .apply_event(user, concept, ProgressEvent::MarkDescriptionRead)
            .await
            .unwrap();
        let second = engine
            .apply_event(user, concept, ProgressEvent::MarkDescriptionRead)
            .await
            .unwrap();

        assert_eq!(first.progress, second.progress);
        assert_eq!(second.progress.attempts(), 0);
    }

    #[tokio::test]
    async fn submit_without_quiz_is_a_configuration_error() {
        let engine = engine();
        let user = UserId::random();

        // complete the chain up to C
        for id in [1, 2] {
            engine
                .apply_event(
                    user,
                    ConceptId::new(id),
                    ProgressEvent::SubmitQuiz {
                        answers: passing_answers(),
                    },
                )
                .await
                .unwrap();
        }

        let err = engine
            .apply_event(
                user,
                ConceptId::new(3),
                ProgressEvent::SubmitQuiz {
                    answers: passing_answers(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::QuizNotDefined(c) if c == ConceptId::new(3)));
    }

    #[tokio::test]
    async fn malformed_submission_counts_nothing() {
        let engine = engine();
        let user = UserId::random();
        let concept = ConceptId::new(1);

        engine
            .apply_event(user, concept, ProgressEvent::MarkDescriptionRead)
            .await
            .unwrap();

        let err = engine
            .apply_event(
                user,
                concept,
                ProgressEvent::SubmitQuiz {
                    answers: vec![0, 0],
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Quiz(QuizError::AnswerCountMismatch {
                expected: 5,
                got: 2
            })
        ));

        // record untouched: still in progress, zero attempts
        let updated = engine
            .apply_event(user, concept, ProgressEvent::MarkDescriptionRead)
            .await
            .unwrap();
        assert_eq!(updated.progress.attempts(), 0);
        assert!(updated.progress.description_read());
    }

    #[tokio::test]
    async fn unknown_concept_is_rejected() {
        let engine = engine();
        let err = engine
            .apply_event(
                UserId::random(),
                ConceptId::new(99),
                ProgressEvent::MarkDescriptionRead,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownConcept(c) if c == ConceptId::new(99)));
    }

    #[tokio::test]
    async fn eligible_set_grows_as_quizzes_pass() {
        let engine = engine();
        let user = UserId::random();

        let eligible = engine.current_eligible_set(user).await.unwrap();
        assert_eq!(eligible, HashSet::from([ConceptId::new(1)]));

        engine
            .apply_event(
                user,
                ConceptId::new(1),
                ProgressEvent::SubmitQuiz {
                    answers: passing_answers(),
                },
            )
            .await
            .unwrap();

        let eligible = engine.current_eligible_set(user).await.unwrap();
        assert_eq!(
            eligible,
            HashSet::from([ConceptId::new(1), ConceptId::new(2)])
        );
    }

    #[tokio::test]
    async fn concurrent_submissions_on_one_key_serialize() {
        let engine = Arc::new(engine());
        let user = UserId::random();
        let concept = ConceptId::new(1);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                engine
                    .apply_event(
                        user,
                        concept,
                        ProgressEvent::SubmitQuiz {
                            answers: failing_answers(),
                        },
                    )
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // every submission was counted exactly once
        let updated = engine
            .apply_event(user, concept, ProgressEvent::MarkDescriptionRead)
            .await
            .unwrap();
        assert_eq!(updated.progress.attempts(), 8);
    }

    #[test]
    fn events_deserialize_from_host_wire_shape() {
        let read: ProgressEvent =
            serde_json::from_str(r#"{"action":"mark_description_read"}"#).unwrap();
        assert_eq!(read, ProgressEvent::MarkDescriptionRead);

        let submit: ProgressEvent =
            serde_json::from_str(r#"{"action":"submit_quiz","answers":[0,2,1]}"#).unwrap();
        assert_eq!(
            submit,
            ProgressEvent::SubmitQuiz {
                answers: vec![0, 2, 1]
            }
        );
    }
}
